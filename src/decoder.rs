//! SwitchBot advertisement frame decoder.
//!
//! Two manufacturer data layouts are known, told apart by length:
//!
//! | length | device             | sign bit          | CO2            |
//! |--------|--------------------|-------------------|----------------|
//! | 12     | thermo-hygrometer  | bit 7 of byte 10  | -              |
//! | 16     | CO2 meter          | bit 7 of byte 9   | bytes 13..=14  |
//!
//! In both layouts byte 8 carries tenths of a degree in its low nibble, byte 9
//! the integer degrees in its low seven bits and byte 10 the humidity in its
//! low seven bits. A set sign bit means the temperature is positive.
//!
//! Battery level is the last byte of the service data payload.

use crate::reading::SensorReading;
use thiserror::Error;

/// Minimum manufacturer payload carrying temperature and humidity.
pub const MIN_MANUFACTURER_LEN: usize = 12;

/// Manufacturer payload length of the thermo-hygrometer layout.
pub const METER_FRAME_LEN: usize = 12;

/// Manufacturer payload length of the CO2 meter layout.
pub const CO2_FRAME_LEN: usize = 16;

/// Minimum service payload carrying the battery level.
pub const MIN_SERVICE_LEN: usize = 3;

const TENTHS_INDEX: usize = 8;
const DEGREES_INDEX: usize = 9;
const HUMIDITY_INDEX: usize = 10;
const CO2_HIGH_INDEX: usize = 13;
const CO2_LOW_INDEX: usize = 14;

const SIGN_MASK: u8 = 0x80;
const SEVEN_BITS: u8 = 0x7F;
const LOW_NIBBLE: u8 = 0x0F;

/// Raw payloads taken from one advertisement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFrame {
    /// Manufacturer specific data, without the company identifier
    pub manufacturer: Option<Vec<u8>>,
    /// Service data, without the service UUID
    pub service: Option<Vec<u8>>,
}

/// Reasons a frame does not produce a reading.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("no manufacturer data")]
    MissingManufacturerData,
    #[error("manufacturer data too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },
    #[error("unknown frame length {0}: temperature sign bit position is undetermined")]
    UnknownFrameLength(usize),
}

/// Decode a frame, or `None` when it carries no valid reading.
///
/// Never panics, whatever the payload lengths.
pub fn decode(frame: &RawFrame) -> Option<SensorReading> {
    decode_frame(frame).ok()
}

/// Decode a frame, reporting why it carries no valid reading.
pub fn decode_frame(frame: &RawFrame) -> Result<SensorReading, DecodeError> {
    let manufacturer = frame
        .manufacturer
        .as_deref()
        .ok_or(DecodeError::MissingManufacturerData)?;

    let temperature = decode_temperature(manufacturer)?;
    let humidity = decode_humidity(manufacturer)?;
    let co2 = decode_co2(manufacturer);
    let battery = frame.service.as_deref().and_then(decode_battery);

    Ok(SensorReading {
        temperature,
        humidity,
        battery,
        co2,
    })
}

fn require_len(data: &[u8]) -> Result<(), DecodeError> {
    if data.len() < MIN_MANUFACTURER_LEN {
        return Err(DecodeError::TooShort {
            expected: MIN_MANUFACTURER_LEN,
            actual: data.len(),
        });
    }
    Ok(())
}

/// Temperature in Celsius from manufacturer data.
pub fn decode_temperature(data: &[u8]) -> Result<f64, DecodeError> {
    require_len(data)?;

    let sign_byte = match data.len() {
        METER_FRAME_LEN => data[HUMIDITY_INDEX],
        CO2_FRAME_LEN => data[DEGREES_INDEX],
        other => return Err(DecodeError::UnknownFrameLength(other)),
    };

    let tenths = i32::from(data[TENTHS_INDEX] & LOW_NIBBLE);
    let degrees = i32::from(data[DEGREES_INDEX] & SEVEN_BITS);
    let magnitude = f64::from(degrees * 10 + tenths) / 10.0;

    if sign_byte & SIGN_MASK != 0 {
        Ok(magnitude)
    } else {
        Ok(-magnitude)
    }
}

/// Relative humidity in percent from manufacturer data.
pub fn decode_humidity(data: &[u8]) -> Result<u8, DecodeError> {
    require_len(data)?;
    Ok(data[HUMIDITY_INDEX] & SEVEN_BITS)
}

/// CO2 in ppm, present only in the 16-byte layout.
pub fn decode_co2(data: &[u8]) -> Option<u16> {
    (data.len() == CO2_FRAME_LEN)
        .then(|| u16::from_be_bytes([data[CO2_HIGH_INDEX], data[CO2_LOW_INDEX]]))
}

/// Battery percentage from service data; the value is not range-checked.
pub fn decode_battery(data: &[u8]) -> Option<u8> {
    if data.len() < MIN_SERVICE_LEN {
        return None;
    }
    data.last().copied()
}
