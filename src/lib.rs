//! `switchbot-listener` library.
//!
//! The binary (`src/main.rs`) is responsible for CLI parsing, logging setup and
//! process exit codes. The collection cycle lives in [`crate::app`] where it can
//! be tested deterministically with an injected scanner, transport and output streams.

pub mod app;
pub mod decoder;
pub mod device;
pub mod duration;
pub mod mac_address;
pub mod output;
pub mod publish;
pub mod reading;
pub mod registry;
pub mod scanner;
pub mod session;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types at the crate root
pub use decoder::{DecodeError, RawFrame, decode};
pub use device::{DeviceDescriptor, DeviceType, parse_device};
pub use mac_address::MacAddress;
pub use output::OutputFormatter;
pub use output::console::ConsoleFormatter;
pub use output::influxdb::InfluxDbFormatter;
pub use publish::{PublishConfig, Publisher};
pub use reading::SensorReading;
pub use registry::DeviceRegistry;
pub use scanner::{Advertisement, Backend, ScanError, Scanner};
pub use session::{ScanSession, ScanSnapshot, SessionError};
