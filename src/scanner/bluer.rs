//! BlueZ D-Bus backend.
//!
//! This backend uses the `bluer` crate to communicate with the BlueZ daemon
//! via D-Bus. It requires the `bluetoothd` daemon to be running.

use super::{ADVERTISEMENT_CHANNEL_BUFFER_SIZE, Advertisement, SWITCHBOT_COMPANY_ID, ScanError};
use bluer::monitor::{Monitor, MonitorEvent, Pattern};
use bluer::{Adapter, Address, Session};
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// AD type of manufacturer specific data.
const MANUFACTURER_DATA_TYPE: u8 = 0xFF;

impl From<bluer::Error> for ScanError {
    fn from(err: bluer::Error) -> Self {
        ScanError::Bluetooth(err.to_string())
    }
}

/// Matches advertisements whose manufacturer data starts with the SwitchBot company identifier.
fn switchbot_pattern() -> Pattern {
    Pattern {
        data_type: MANUFACTURER_DATA_TYPE,
        start_position: 0,
        content: SWITCHBOT_COMPANY_ID.to_le_bytes().to_vec(),
    }
}

/// Start watching for SwitchBot advertisements through a BlueZ advertisement monitor.
///
/// The monitor only reports devices while they are advertising, so properties
/// BlueZ cached from earlier scans never reach the channel. Monitoring stops
/// as soon as the returned receiver is dropped.
pub async fn start_scan() -> Result<mpsc::Receiver<Advertisement>, ScanError> {
    let session = Session::new().await?;
    let adapter = session.default_adapter().await?;
    adapter.set_powered(true).await?;

    let monitor_manager = adapter.monitor().await?;
    let mut monitor_handle = monitor_manager
        .register(Monitor {
            patterns: Some(vec![switchbot_pattern()]),
            ..Default::default()
        })
        .await?;
    info!(adapter = %adapter.name(), "bluez advertisement monitor registered");

    let (tx, rx) = mpsc::channel(ADVERTISEMENT_CHANNEL_BUFFER_SIZE);

    // Spawn a task that owns all Bluetooth state and runs the event loop
    tokio::spawn(async move {
        let _session = session;
        let _monitor_manager = monitor_manager;

        loop {
            let address = tokio::select! {
                _ = tx.closed() => break,
                event = monitor_handle.next() => match event {
                    Some(MonitorEvent::DeviceFound(device_id)) => device_id.device,
                    Some(_) => continue,
                    None => break,
                },
            };

            match read_advertisement(&adapter, address).await {
                Ok(advertisement) => {
                    if tx.send(advertisement).await.is_err() {
                        break;
                    }
                }
                Err(e) => debug!(address = %address, error = %e, "failed to read device properties"),
            }
        }

        // Dropping the monitor handle unregisters the monitor
        debug!("bluez advertisement monitor stopped");
    });

    Ok(rx)
}

/// Read the advertised properties of a discovered device.
async fn read_advertisement(adapter: &Adapter, address: Address) -> Result<Advertisement, ScanError> {
    let device = adapter.device(address)?;

    Ok(Advertisement {
        address: address.into(),
        name: device.name().await?,
        manufacturer_data: device.manufacturer_data().await?.unwrap_or_default(),
        service_data: device.service_data().await?.unwrap_or_default(),
    })
}
