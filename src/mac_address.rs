//! Hardware address type for Bluetooth beacons.
//!
//! Addresses are stored as six raw bytes, so two spellings of the same
//! address (`AA:BB:..` and `aa-bb-..`) compare equal once parsed. The
//! `Display` form is the normalized spelling used everywhere else in the
//! crate: lower-case hex separated by colons.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A Bluetooth hardware address stored as a compact 6-byte array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MacAddress(pub [u8; 6]);

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

/// Why a string is not a hardware address.
#[derive(Error, Debug, PartialEq)]
pub enum ParseMacError {
    #[error("invalid MAC address: expected 6 octets, got {0}")]
    InvalidLength(usize),
    #[error("invalid MAC address: octet {0} must be two hex digits")]
    InvalidPartLength(usize),
    #[error("invalid MAC address: {0:?} is not a hex octet")]
    InvalidHex(String),
}

fn parse_octet(index: usize, part: &str) -> Result<u8, ParseMacError> {
    if part.len() != 2 {
        return Err(ParseMacError::InvalidPartLength(index));
    }
    if !part.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ParseMacError::InvalidHex(part.to_string()));
    }
    u8::from_str_radix(part, 16).map_err(|_| ParseMacError::InvalidHex(part.to_string()))
}

impl FromStr for MacAddress {
    type Err = ParseMacError;

    /// Parse `AA:BB:CC:DD:EE:FF` or `aa-bb-cc-dd-ee-ff` (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parts: Vec<&str> = s.split([':', '-']).collect();
        let [a, b, c, d, e, f] = parts[..] else {
            return Err(ParseMacError::InvalidLength(parts.len()));
        };

        let mut bytes = [0u8; 6];
        for (index, (byte, part)) in bytes.iter_mut().zip([a, b, c, d, e, f]).enumerate() {
            *byte = parse_octet(index, part)?;
        }
        Ok(MacAddress(bytes))
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

#[cfg(feature = "bluer")]
impl From<bluer::Address> for MacAddress {
    fn from(addr: bluer::Address) -> Self {
        Self(addr.0)
    }
}
