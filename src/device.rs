//! Known beacon descriptors.
//!
//! A descriptor ties a hardware address to the tags written alongside every
//! reading of that device: where it is installed and what kind of sensor it is.

use crate::mac_address::MacAddress;
use std::fmt;
use std::str::FromStr;

/// Kind of SwitchBot sensor behind an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, clap::ValueEnum)]
pub enum DeviceType {
    /// Thermo-hygrometer (indoor/outdoor meter)
    #[default]
    Meter,
    /// CO2 meter (temperature, humidity and CO2)
    Co2,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Meter => "meter",
            DeviceType::Co2 => "co2",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "meter" => Ok(DeviceType::Meter),
            "co2" => Ok(DeviceType::Co2),
            _ => Err(format!("unknown device type: {s} (expected meter or co2)")),
        }
    }
}

/// Identity and tag metadata for one known beacon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub address: MacAddress,
    /// Operator-assigned location tag (e.g. "bedroom")
    pub location: String,
    pub device_type: DeviceType,
}

impl DeviceDescriptor {
    pub fn new(address: MacAddress, location: impl Into<String>, device_type: DeviceType) -> Self {
        Self {
            address,
            location: location.into(),
            device_type,
        }
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} @ {})", self.address, self.device_type, self.location)
    }
}

/// Check that a location can be written as a line-protocol tag value unescaped.
pub fn validate_location(location: &str) -> Result<(), String> {
    if location.is_empty() {
        return Err("location must not be empty".into());
    }
    if let Some(c) = location.chars().find(|c| matches!(c, ',' | ' ' | '=')) {
        return Err(format!("location {location:?} must not contain {c:?}"));
    }
    Ok(())
}

/// Parse a device entry in the format "MAC=LOCATION[,TYPE]".
///
/// # Example
/// ```
/// use switchbot_listener::device::{DeviceType, parse_device};
///
/// let device = parse_device("AA:BB:CC:DD:EE:FF=workroom,co2").unwrap();
/// assert_eq!(device.address.to_string(), "aa:bb:cc:dd:ee:ff");
/// assert_eq!(device.location, "workroom");
/// assert_eq!(device.device_type, DeviceType::Co2);
/// ```
pub fn parse_device(src: &str) -> Result<DeviceDescriptor, String> {
    let (address, rest) = src
        .split_once('=')
        .ok_or_else(|| "invalid device: expected format MAC=LOCATION[,TYPE]".to_string())?;

    let address: MacAddress = address.parse().map_err(|e| format!("{e}"))?;

    let (location, device_type) = match rest.split_once(',') {
        Some((location, kind)) => (location, kind.parse()?),
        None => (rest, DeviceType::default()),
    };
    validate_location(location)?;

    Ok(DeviceDescriptor::new(address, location, device_type))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device_with_type() {
        let device = parse_device("aa:bb:cc:dd:ee:ff=workroom,co2").unwrap();
        assert_eq!(device.address, MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]));
        assert_eq!(device.location, "workroom");
        assert_eq!(device.device_type, DeviceType::Co2);
    }

    #[test]
    fn test_parse_device_defaults_to_meter() {
        let device = parse_device("AA:BB:CC:DD:EE:FF=bedroom").unwrap();
        assert_eq!(device.device_type, DeviceType::Meter);
        assert_eq!(device.location, "bedroom");
    }

    #[test]
    fn test_parse_device_invalid() {
        assert!(parse_device("no-equals-sign").is_err());
        assert!(parse_device("AA:BB:CC=bedroom").is_err());
        assert!(parse_device("AA:BB:CC:DD:EE:FF=").is_err());
        assert!(parse_device("AA:BB:CC:DD:EE:FF=living room").is_err());
        assert!(parse_device("AA:BB:CC:DD:EE:FF=bedroom,thermostat").is_err());
    }

    #[test]
    fn test_device_type_from_str() {
        assert_eq!("meter".parse::<DeviceType>().unwrap(), DeviceType::Meter);
        assert_eq!("CO2".parse::<DeviceType>().unwrap(), DeviceType::Co2);
        assert!("hub".parse::<DeviceType>().is_err());
    }

    #[test]
    fn test_device_type_display() {
        assert_eq!(DeviceType::Meter.to_string(), "meter");
        assert_eq!(DeviceType::Co2.to_string(), "co2");
    }

    #[test]
    fn test_descriptor_display() {
        let device = DeviceDescriptor::new(
            MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]),
            "bedroom",
            DeviceType::Meter,
        );
        assert_eq!(device.to_string(), "aa:bb:cc:dd:ee:ff (meter @ bedroom)");
    }
}
