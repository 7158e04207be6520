//! Decoded SwitchBot sensor reading.

/// A reading decoded from one advertisement.
///
/// Temperature and humidity are always present; a frame that does not yield
/// both never becomes a `SensorReading`. Battery and CO2 depend on which
/// payloads the advertisement carried.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    /// Temperature in Celsius, 0.1 degree resolution
    pub temperature: f64,
    /// Relative humidity in percent (0-100)
    pub humidity: u8,
    /// Battery level in percent, from the service data payload
    pub battery: Option<u8>,
    /// Carbon dioxide concentration in ppm (CO2 meters only)
    pub co2: Option<u16>,
}
