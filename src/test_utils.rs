use crate::mac_address::MacAddress;
use crate::reading::SensorReading;
use crate::scanner::{Advertisement, SWITCHBOT_COMPANY_ID};

/// A stable MAC address for unit tests.
pub const TEST_MAC: MacAddress = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

/// 12-byte thermo-hygrometer manufacturer payload with the given bytes 8, 9 and 10.
pub fn meter_payload(tenths: u8, degrees: u8, humidity: u8) -> Vec<u8> {
    let mut payload = vec![0xB0, 0xE9, 0xFE, 0x12, 0x34, 0x56, 0x3A, 0x64, 0, 0, 0, 0x00];
    payload[8] = tenths;
    payload[9] = degrees;
    payload[10] = humidity;
    payload
}

/// 16-byte CO2 meter manufacturer payload with the given bytes 8, 9, 10 and 13..=14.
pub fn co2_payload(tenths: u8, degrees: u8, humidity: u8, co2: [u8; 2]) -> Vec<u8> {
    let mut payload = meter_payload(tenths, degrees, humidity);
    payload.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
    payload[13] = co2[0];
    payload[14] = co2[1];
    payload
}

/// Advertisement carrying only SwitchBot manufacturer data.
pub fn meter_advertisement(address: MacAddress, manufacturer: Vec<u8>) -> Advertisement {
    let mut advertisement = Advertisement {
        address,
        ..Default::default()
    };
    advertisement
        .manufacturer_data
        .insert(SWITCHBOT_COMPANY_ID, manufacturer);
    advertisement
}

/// 22.5°C, 50% humidity, 75% battery.
pub fn base_reading() -> SensorReading {
    SensorReading {
        temperature: 22.5,
        humidity: 50,
        battery: Some(75),
        co2: None,
    }
}
