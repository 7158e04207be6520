//! InfluxDB line protocol output formatter.
//!
//! The record layout is fixed so downstream ingestion stays byte-stable:
//!
//! ```text
//! sensor,location=<loc>,mac_address=<addr>,device_type=<type> temperature=<f>,humidity=<f>[,battery_pct=<f>][,co2_ppm=<f>]
//! ```
//!
//! Every field is written as a float, including the logically integer ones.
//! Tag values are not escaped.

use crate::device::DeviceDescriptor;
use crate::output::OutputFormatter;
use crate::reading::SensorReading;
use crate::session::SnapshotEntry;
use std::fmt;

/// Default measurement name.
pub const DEFAULT_MEASUREMENT: &str = "sensor";

/// Field values for InfluxDB line protocol
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Float(f64),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            // Debug keeps the decimal point on integral values (50 -> "50.0")
            FieldValue::Float(num) => write!(f, "{num:?}"),
        }
    }
}

/// Data point in InfluxDB line protocol.
///
/// Tags and fields are written in insertion order.
#[derive(Debug)]
pub struct DataPoint {
    pub measurement: String,
    pub tag_set: Vec<(&'static str, String)>,
    pub field_set: Vec<(&'static str, FieldValue)>,
}

fn fmt_tags(data_point: &DataPoint, fmt: &mut fmt::Formatter) -> fmt::Result {
    data_point
        .tag_set
        .iter()
        .try_for_each(|(key, value)| write!(fmt, ",{key}={value}"))
}

fn fmt_fields(data_point: &DataPoint, fmt: &mut fmt::Formatter) -> fmt::Result {
    for (i, (key, value)) in data_point.field_set.iter().enumerate() {
        let separator = if i == 0 { "" } else { "," };
        write!(fmt, "{separator}{key}={value}")?;
    }
    Ok(())
}

impl fmt::Display for DataPoint {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}", self.measurement)?;
        fmt_tags(self, fmt)?;
        write!(fmt, " ")?;
        fmt_fields(self, fmt)
    }
}

/// InfluxDB line protocol formatter.
#[derive(Debug, Clone)]
pub struct InfluxDbFormatter {
    /// The measurement name in InfluxDB
    measurement_name: String,
}

impl Default for InfluxDbFormatter {
    fn default() -> Self {
        Self::new(DEFAULT_MEASUREMENT.to_string())
    }
}

impl InfluxDbFormatter {
    pub fn new(measurement_name: String) -> Self {
        Self { measurement_name }
    }

    /// Tags in fixed order: location, mac_address, device_type.
    fn tag_set(descriptor: &DeviceDescriptor) -> Vec<(&'static str, String)> {
        vec![
            ("location", descriptor.location.clone()),
            ("mac_address", descriptor.address.to_string()),
            ("device_type", descriptor.device_type.to_string()),
        ]
    }

    /// Fields in fixed order: temperature, humidity, battery_pct, co2_ppm.
    ///
    /// Optional fields without a value are omitted.
    fn field_set(reading: &SensorReading) -> Vec<(&'static str, FieldValue)> {
        let mut fields = vec![
            ("temperature", FieldValue::Float(reading.temperature)),
            ("humidity", FieldValue::Float(f64::from(reading.humidity))),
        ];
        if let Some(battery) = reading.battery {
            fields.push(("battery_pct", FieldValue::Float(f64::from(battery))));
        }
        if let Some(co2) = reading.co2 {
            fields.push(("co2_ppm", FieldValue::Float(f64::from(co2))));
        }
        fields
    }

    pub fn to_data_point(&self, descriptor: &DeviceDescriptor, reading: &SensorReading) -> DataPoint {
        DataPoint {
            measurement: self.measurement_name.clone(),
            tag_set: Self::tag_set(descriptor),
            field_set: Self::field_set(reading),
        }
    }

    /// Encode one reading as a newline-free line protocol record.
    pub fn encode(&self, descriptor: &DeviceDescriptor, reading: &SensorReading) -> String {
        self.to_data_point(descriptor, reading).to_string()
    }
}

impl OutputFormatter for InfluxDbFormatter {
    fn format(&self, entry: &SnapshotEntry) -> String {
        self.encode(&entry.descriptor, &entry.reading)
    }
}
