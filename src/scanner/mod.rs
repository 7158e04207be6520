//! BLE discovery for SwitchBot beacons.
//!
//! Backends push every advertisement they observe into a channel as an
//! [`Advertisement`]. The consumer owns the receiving end; dropping it is the
//! signal for the backend to stop discovery and release the adapter.

#[cfg(feature = "bluer")]
pub mod bluer;

#[cfg(feature = "hci")]
pub mod hci;

use crate::decoder::RawFrame;
use crate::mac_address::MacAddress;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::{Uuid, uuid};

/// Error type for scanner operations.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Bluetooth/adapter related error
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
}

// Ref: https://github.com/OpenWonderLabs/SwitchBotAPI-BLE/blob/2bd727ecf7c0898b25ac2df58a4886b5930c9138/README.md?plain=1#L44
pub const SWITCHBOT_COMPANY_ID: u16 = 0x0969;

/// Service data UUIDs used by SwitchBot devices (current and legacy).
pub const SWITCHBOT_SERVICE_UUIDS: [Uuid; 2] = [
    uuid!("0000fd3d-0000-1000-8000-00805f9b34fb"),
    uuid!("00000d00-0000-1000-8000-00805f9b34fb"),
];

/// Channel buffer size for advertisements.
pub const ADVERTISEMENT_CHANNEL_BUFFER_SIZE: usize = 100;

/// One observed broadcast.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Advertisement {
    pub address: MacAddress,
    /// Advertised local name, if the broadcast carried one
    pub name: Option<String>,
    /// Manufacturer data keyed by company identifier
    pub manufacturer_data: HashMap<u16, Vec<u8>>,
    /// Service data keyed by service UUID
    pub service_data: HashMap<Uuid, Vec<u8>>,
}

impl Advertisement {
    /// Pick the payloads to decode.
    ///
    /// The SwitchBot entries are preferred. Without one, a payload is only
    /// used when it is the single entry of its kind.
    pub fn frame(&self) -> RawFrame {
        RawFrame {
            manufacturer: select(&self.manufacturer_data, &[SWITCHBOT_COMPANY_ID]),
            service: select(&self.service_data, &SWITCHBOT_SERVICE_UUIDS),
        }
    }
}

fn select<K: Eq + std::hash::Hash>(entries: &HashMap<K, Vec<u8>>, preferred: &[K]) -> Option<Vec<u8>> {
    preferred
        .iter()
        .find_map(|key| entries.get(key))
        .or_else(|| match entries.len() {
            1 => entries.values().next(),
            _ => None,
        })
        .cloned()
}

/// Expand a 16-bit Bluetooth SIG UUID onto the base UUID.
pub fn uuid_from_u16(short: u16) -> Uuid {
    Uuid::from_u128(0x0000_0000_0000_1000_8000_0080_5f9b_34fb | (u128::from(short) << 96))
}

/// Available scanner backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// BlueZ D-Bus backend (requires bluetoothd daemon)
    #[cfg(feature = "bluer")]
    Bluer,
    /// Raw HCI socket backend (direct kernel access, no daemon required)
    #[cfg(feature = "hci")]
    Hci,
}

impl Default for Backend {
    fn default() -> Self {
        #[cfg(feature = "bluer")]
        return Backend::Bluer;
        #[cfg(all(feature = "hci", not(feature = "bluer")))]
        return Backend::Hci;
        #[cfg(not(any(feature = "bluer", feature = "hci")))]
        compile_error!("At least one backend feature must be enabled");
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "bluer")]
            Backend::Bluer => write!(f, "bluer"),
            #[cfg(feature = "hci")]
            Backend::Hci => write!(f, "hci"),
        }
    }
}

/// Future returned by [`Scanner::start_scan`].
pub type StartScan<'a> =
    Pin<Box<dyn Future<Output = Result<mpsc::Receiver<Advertisement>, ScanError>> + Send + 'a>>;

/// Discovery abstraction to enable deterministic tests without Bluetooth hardware.
pub trait Scanner: Send + Sync {
    /// Start discovery. Advertisements arrive on the returned channel until it is dropped.
    fn start_scan(&self) -> StartScan<'_>;
}

/// Scanner that delegates to a compiled-in backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealScanner {
    pub backend: Backend,
}

impl RealScanner {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }
}

impl Scanner for RealScanner {
    fn start_scan(&self) -> StartScan<'_> {
        let backend = self.backend;
        Box::pin(async move { start_scan(backend).await })
    }
}

/// Start discovery using the specified backend.
pub async fn start_scan(backend: Backend) -> Result<mpsc::Receiver<Advertisement>, ScanError> {
    debug!(%backend, "starting discovery");
    match backend {
        #[cfg(feature = "bluer")]
        Backend::Bluer => bluer::start_scan().await,
        #[cfg(feature = "hci")]
        Backend::Hci => hci::start_scan().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TEST_MAC, meter_payload};

    #[test]
    fn test_frame_prefers_switchbot_entries() {
        let mut adv = Advertisement {
            address: TEST_MAC,
            ..Default::default()
        };
        adv.manufacturer_data.insert(0x004C, vec![0x02, 0x15]);
        adv.manufacturer_data
            .insert(SWITCHBOT_COMPANY_ID, meter_payload(0x05, 0x16, 0xB2));
        adv.service_data.insert(uuid_from_u16(0xFE9F), vec![0; 4]);
        adv.service_data
            .insert(SWITCHBOT_SERVICE_UUIDS[0], vec![0x77, 0x00, 0x4B]);

        let frame = adv.frame();
        assert_eq!(frame.manufacturer, Some(meter_payload(0x05, 0x16, 0xB2)));
        assert_eq!(frame.service, Some(vec![0x77, 0x00, 0x4B]));
    }

    #[test]
    fn test_frame_uses_single_foreign_entry() {
        let mut adv = Advertisement::default();
        adv.manufacturer_data.insert(0x1234, vec![1, 2, 3]);
        adv.service_data.insert(SWITCHBOT_SERVICE_UUIDS[1], vec![4, 5, 6]);

        let frame = adv.frame();
        assert_eq!(frame.manufacturer, Some(vec![1, 2, 3]));
        assert_eq!(frame.service, Some(vec![4, 5, 6]));
    }

    #[test]
    fn test_frame_ambiguous_foreign_entries() {
        let mut adv = Advertisement::default();
        adv.manufacturer_data.insert(0x1234, vec![1]);
        adv.manufacturer_data.insert(0x5678, vec![2]);

        assert_eq!(adv.frame(), RawFrame::default());
    }

    #[test]
    fn test_uuid_from_u16() {
        assert_eq!(uuid_from_u16(0xFD3D), SWITCHBOT_SERVICE_UUIDS[0]);
        assert_eq!(uuid_from_u16(0x0D00), SWITCHBOT_SERVICE_UUIDS[1]);
    }

    #[test]
    fn test_scan_error_display() {
        let err = ScanError::Bluetooth("adapter not found".to_string());
        assert_eq!(format!("{}", err), "Bluetooth error: adapter not found");
    }

    #[test]
    fn test_backend_display() {
        #[cfg(feature = "bluer")]
        assert_eq!(format!("{}", Backend::Bluer), "bluer");
        #[cfg(feature = "hci")]
        assert_eq!(format!("{}", Backend::Hci), "hci");
    }

    #[test]
    fn test_backend_parses_compiled_in_values() {
        use clap::ValueEnum;
        #[cfg(feature = "bluer")]
        assert_eq!(Backend::from_str("bluer", false), Ok(Backend::Bluer));
        #[cfg(feature = "hci")]
        assert_eq!(Backend::from_str("HCI", true), Ok(Backend::Hci));
        assert!(Backend::from_str("bluez", false).is_err());
    }
}
