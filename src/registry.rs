//! Registry of the beacons this listener reports on.
//!
//! The registry is built once at startup and only read afterwards. Events from
//! addresses that are not registered are ignored by the scan session.

use crate::device::{DeviceDescriptor, DeviceType};
use crate::mac_address::MacAddress;
use std::collections::BTreeMap;

/// Devices used when none are configured explicitly.
const BUILTIN_DEVICES: [(MacAddress, &str, DeviceType); 2] = [
    (
        MacAddress([0xC4, 0x7C, 0x8D, 0x6A, 0x2B, 0x01]),
        "bedroom",
        DeviceType::Meter,
    ),
    (
        MacAddress([0xC4, 0x7C, 0x8D, 0x6A, 0x2B, 0x02]),
        "workroom",
        DeviceType::Co2,
    ),
];

/// Immutable mapping from normalized address to device descriptor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceRegistry {
    devices: BTreeMap<MacAddress, DeviceDescriptor>,
}

impl DeviceRegistry {
    /// Build a registry from explicit descriptors.
    ///
    /// A later descriptor for an address already present replaces the earlier one.
    pub fn new(descriptors: impl IntoIterator<Item = DeviceDescriptor>) -> Self {
        let devices = descriptors
            .into_iter()
            .map(|d| (d.address, d))
            .collect();
        Self { devices }
    }

    /// The built-in device set.
    pub fn builtin() -> Self {
        Self::new(
            BUILTIN_DEVICES
                .iter()
                .map(|&(address, location, kind)| DeviceDescriptor::new(address, location, kind)),
        )
    }

    /// Use `descriptors` when any are given, otherwise fall back to [`DeviceRegistry::builtin`].
    pub fn from_descriptors_or_builtin(descriptors: Vec<DeviceDescriptor>) -> Self {
        if descriptors.is_empty() {
            Self::builtin()
        } else {
            Self::new(descriptors)
        }
    }

    /// Look up a device by its textual address in any supported spelling.
    pub fn lookup(&self, address: &str) -> Option<&DeviceDescriptor> {
        let address: MacAddress = address.parse().ok()?;
        self.get(&address)
    }

    pub fn get(&self, address: &MacAddress) -> Option<&DeviceDescriptor> {
        self.devices.get(address)
    }

    /// Registered devices in address order.
    pub fn iter(&self) -> impl Iterator<Item = &DeviceDescriptor> {
        self.devices.values()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
