//! Output formatters for collected readings.
//!
//! Every device that produced a valid reading during a scan window is written
//! as one line, either in InfluxDB line protocol or as a human-readable
//! console line.

pub mod console;
pub mod influxdb;

use crate::session::SnapshotEntry;

/// Trait for formatting a collected reading into an output line.
pub trait OutputFormatter: Send + Sync {
    /// Format one snapshot entry as a single line without trailing newline.
    fn format(&self, entry: &SnapshotEntry) -> String;
}

/// Formats selectable for stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable line per device
    #[default]
    Console,
    /// InfluxDB line protocol (Telegraf compatible)
    Influxdb,
}
