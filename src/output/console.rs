//! Human-readable console output.

use crate::output::OutputFormatter;
use crate::session::SnapshotEntry;
use chrono::{DateTime, Local};
use std::fmt::Write as _;

/// Name shown for devices that did not advertise one.
const FALLBACK_NAME: &str = "SwitchBot";

/// One line per device:
/// `[2025-01-01 12:00:00] WoSensorTH (aa:bb:..) @ bedroom - temperature: 22.5°C, humidity: 50%, battery: 75%`
#[derive(Debug, Clone, Default)]
pub struct ConsoleFormatter;

impl OutputFormatter for ConsoleFormatter {
    fn format(&self, entry: &SnapshotEntry) -> String {
        let seen_at: DateTime<Local> = entry.seen_at.into();
        let reading = &entry.reading;

        let mut line = format!(
            "[{}] {} ({}) @ {} - temperature: {:.1}°C, humidity: {}%",
            seen_at.format("%Y-%m-%d %H:%M:%S"),
            entry.name.as_deref().unwrap_or(FALLBACK_NAME),
            entry.descriptor.address,
            entry.descriptor.location,
            reading.temperature,
            reading.humidity,
        );
        if let Some(battery) = reading.battery {
            let _ = write!(line, ", battery: {battery}%");
        }
        if let Some(co2) = reading.co2 {
            let _ = write!(line, ", co2: {co2}ppm");
        }
        line
    }
}
