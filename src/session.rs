//! One bounded collection window.
//!
//! A [`ScanSession`] moves `Idle -> Scanning -> Closed`. While scanning it
//! folds advertisements from registered devices into a [`ScanSnapshot`],
//! keeping only the latest valid reading per address.

use crate::decoder::{self, DecodeError};
use crate::device::DeviceDescriptor;
use crate::mac_address::MacAddress;
use crate::reading::SensorReading;
use crate::registry::DeviceRegistry;
use crate::scanner::{Advertisement, ScanError, Scanner};
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info};

/// Default length of the collection window.
pub const DEFAULT_SCAN_DURATION: Duration = Duration::from_secs(10);

/// Deadline used when `duration` does not fit on the clock, roughly 30 years out.
fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86400 * 365 * 30)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Scanning,
    Closed,
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("invalid session transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: SessionState,
        to: SessionState,
    },
    #[error(transparent)]
    Scan(#[from] ScanError),
}

/// What happened to an observed advertisement.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// The reading replaced the snapshot entry for its address
    Recorded,
    /// The address is not in the registry
    Unregistered,
    /// The frames carried no valid reading
    Undecodable(DecodeError),
    /// The session is not scanning
    Rejected,
}

/// Latest reading of one device within a window.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotEntry {
    pub descriptor: DeviceDescriptor,
    pub reading: SensorReading,
    /// Advertised name carried by the recorded event
    pub name: Option<String>,
    pub seen_at: SystemTime,
}

/// Latest valid reading per address, in address order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanSnapshot {
    entries: BTreeMap<MacAddress, SnapshotEntry>,
}

impl ScanSnapshot {
    pub fn get(&self, address: &MacAddress) -> Option<&SnapshotEntry> {
        self.entries.get(address)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SnapshotEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for ScanSnapshot {
    type Item = SnapshotEntry;
    type IntoIter = std::collections::btree_map::IntoValues<MacAddress, SnapshotEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_values()
    }
}

fn hex(data: Option<&[u8]>) -> String {
    data.map(|d| d.iter().map(|b| format!("{b:02x}")).collect())
        .unwrap_or_else(|| "-".into())
}

/// Single-writer aggregation state for one window.
#[derive(Debug)]
pub struct ScanSession<'a> {
    registry: &'a DeviceRegistry,
    state: SessionState,
    snapshot: ScanSnapshot,
}

impl<'a> ScanSession<'a> {
    pub fn new(registry: &'a DeviceRegistry) -> Self {
        Self {
            registry,
            state: SessionState::Idle,
            snapshot: ScanSnapshot::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, from: SessionState, to: SessionState) -> Result<(), SessionError> {
        if self.state != from {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        debug!(from = ?from, to = ?to, "scan session transition");
        self.state = to;
        Ok(())
    }

    /// Begin accepting advertisements.
    pub fn start(&mut self) -> Result<(), SessionError> {
        self.transition(SessionState::Idle, SessionState::Scanning)
    }

    /// Fold one advertisement into the snapshot.
    ///
    /// Does bounded synchronous work only: a registry lookup, a decode and a map write.
    pub fn observe(&mut self, advertisement: &Advertisement) -> Observation {
        if self.state != SessionState::Scanning {
            return Observation::Rejected;
        }

        let address = advertisement.address;
        let Some(descriptor) = self.registry.get(&address) else {
            debug!(%address, "ignoring unregistered device");
            return Observation::Unregistered;
        };

        let frame = advertisement.frame();
        match decoder::decode_frame(&frame) {
            Ok(reading) => {
                debug!(%address, ?reading, "reading recorded");
                self.snapshot.entries.insert(
                    address,
                    SnapshotEntry {
                        descriptor: descriptor.clone(),
                        reading,
                        name: advertisement.name.clone(),
                        seen_at: SystemTime::now(),
                    },
                );
                Observation::Recorded
            }
            Err(e) => {
                debug!(
                    %address,
                    name = ?advertisement.name,
                    manufacturer = %hex(frame.manufacturer.as_deref()),
                    service = %hex(frame.service.as_deref()),
                    error = %e,
                    "no reading in advertisement"
                );
                Observation::Undecodable(e)
            }
        }
    }

    /// Stop accepting advertisements and hand over the snapshot.
    pub fn close(&mut self) -> Result<ScanSnapshot, SessionError> {
        self.transition(SessionState::Scanning, SessionState::Closed)?;
        Ok(std::mem::take(&mut self.snapshot))
    }

    /// Run one window of `duration` against `scanner` and return the snapshot.
    ///
    /// Only failing to start discovery is an error. Discovery is stopped when
    /// the window closes by dropping the advertisement channel, so nothing
    /// arriving after the deadline is folded in.
    pub async fn run_once(
        &mut self,
        scanner: &dyn Scanner,
        duration: Duration,
    ) -> Result<ScanSnapshot, SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to: SessionState::Scanning,
            });
        }
        let mut advertisements = scanner.start_scan().await?;
        self.start()?;

        let deadline = Instant::now()
            .checked_add(duration)
            .unwrap_or_else(far_future);
        info!(duration = ?duration, devices = self.registry.len(), "scan window opened");

        let mut observed = 0usize;
        loop {
            match timeout_at(deadline, advertisements.recv()).await {
                Ok(Some(advertisement)) => {
                    observed += 1;
                    self.observe(&advertisement);
                }
                Ok(None) => {
                    debug!("discovery ended before the window closed");
                    break;
                }
                Err(_elapsed) => break,
            }
        }
        drop(advertisements);

        let snapshot = self.close()?;
        info!(observed, devices = snapshot.len(), "scan window closed");
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceType;
    use crate::scanner::StartScan;
    use crate::test_utils::{TEST_MAC, co2_payload, meter_advertisement, meter_payload};
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    const OTHER_MAC: MacAddress = MacAddress([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
    const UNKNOWN_MAC: MacAddress = MacAddress([0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);

    fn registry() -> DeviceRegistry {
        DeviceRegistry::new([
            DeviceDescriptor::new(TEST_MAC, "bedroom", DeviceType::Meter),
            DeviceDescriptor::new(OTHER_MAC, "workroom", DeviceType::Co2),
        ])
    }

    /// Emits each advertisement after its delay, then keeps the channel open.
    struct FakeScanner {
        script: Mutex<Vec<(Duration, Advertisement)>>,
    }

    impl FakeScanner {
        fn new(script: Vec<(Duration, Advertisement)>) -> Self {
            Self {
                script: Mutex::new(script),
            }
        }
    }

    impl Scanner for FakeScanner {
        fn start_scan(&self) -> StartScan<'_> {
            let script = self.script.lock().unwrap().clone();
            Box::pin(async move {
                let (tx, rx) = mpsc::channel(16);
                tokio::spawn(async move {
                    for (delay, advertisement) in script {
                        tokio::time::sleep(delay).await;
                        if tx.send(advertisement).await.is_err() {
                            return;
                        }
                    }
                    tx.closed().await;
                });
                Ok(rx)
            })
        }
    }

    /// Discovery that ends immediately.
    struct ClosedScanner;

    impl Scanner for ClosedScanner {
        fn start_scan(&self) -> StartScan<'_> {
            Box::pin(async {
                let (_tx, rx) = mpsc::channel(1);
                Ok(rx)
            })
        }
    }

    struct FailingScanner;

    impl Scanner for FailingScanner {
        fn start_scan(&self) -> StartScan<'_> {
            Box::pin(async { Err(ScanError::Bluetooth("no adapter".into())) })
        }
    }

    #[test]
    fn test_state_machine() {
        let registry = registry();
        let mut session = ScanSession::new(&registry);
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.close().is_err());

        session.start().unwrap();
        assert_eq!(session.state(), SessionState::Scanning);
        assert!(matches!(
            session.start(),
            Err(SessionError::InvalidTransition {
                from: SessionState::Scanning,
                to: SessionState::Scanning
            })
        ));

        session.close().unwrap();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.start().is_err());
    }

    #[test]
    fn test_observe_outside_scanning_is_rejected() {
        let registry = registry();
        let mut session = ScanSession::new(&registry);
        let adv = meter_advertisement(TEST_MAC, meter_payload(0x05, 0x16, 0xB2));

        assert_eq!(session.observe(&adv), Observation::Rejected);
        session.start().unwrap();
        session.close().unwrap();
        assert_eq!(session.observe(&adv), Observation::Rejected);
    }

    #[test]
    fn test_unregistered_and_undecodable_are_skipped() {
        let registry = registry();
        let mut session = ScanSession::new(&registry);
        session.start().unwrap();

        let unknown = meter_advertisement(UNKNOWN_MAC, meter_payload(0x05, 0x16, 0xB2));
        assert_eq!(session.observe(&unknown), Observation::Unregistered);

        let short = meter_advertisement(TEST_MAC, vec![0; 8]);
        assert!(matches!(
            session.observe(&short),
            Observation::Undecodable(DecodeError::TooShort { .. })
        ));

        assert!(session.close().unwrap().is_empty());
    }

    #[test]
    fn test_last_write_wins() {
        let registry = registry();
        let mut session = ScanSession::new(&registry);
        session.start().unwrap();

        let mut first = meter_advertisement(TEST_MAC, meter_payload(0x05, 0x16, 0xB2));
        first.name = Some("first".into());
        let second = meter_advertisement(TEST_MAC, meter_payload(0x01, 0x14, 0xAD));
        assert_eq!(session.observe(&first), Observation::Recorded);
        assert_eq!(session.observe(&second), Observation::Recorded);

        // A later invalid frame does not clear the entry
        let broken = meter_advertisement(TEST_MAC, vec![0; 14]);
        assert!(matches!(session.observe(&broken), Observation::Undecodable(_)));

        let snapshot = session.close().unwrap();
        assert_eq!(snapshot.len(), 1);
        let entry = snapshot.get(&TEST_MAC).unwrap();
        assert_eq!(entry.reading.temperature, 20.1);
        assert_eq!(entry.reading.humidity, 45);
        assert_eq!(entry.name, None);
        assert_eq!(entry.descriptor.location, "bedroom");
    }

    #[test]
    fn test_entries_are_not_merged() {
        let registry = registry();
        let mut session = ScanSession::new(&registry);
        session.start().unwrap();

        let mut with_battery = meter_advertisement(TEST_MAC, meter_payload(0x05, 0x16, 0xB2));
        with_battery
            .service_data
            .insert(crate::scanner::SWITCHBOT_SERVICE_UUIDS[0], vec![0x77, 0x00, 0x4B]);
        session.observe(&with_battery);
        session.observe(&meter_advertisement(TEST_MAC, meter_payload(0x05, 0x16, 0xB2)));

        let snapshot = session.close().unwrap();
        assert_eq!(snapshot.get(&TEST_MAC).unwrap().reading.battery, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_once_collects_within_window() {
        let registry = registry();
        let scanner = FakeScanner::new(vec![
            (
                Duration::from_secs(1),
                meter_advertisement(TEST_MAC, meter_payload(0x05, 0x16, 0xB2)),
            ),
            (
                Duration::from_secs(1),
                meter_advertisement(OTHER_MAC, co2_payload(0x05, 0x96, 0x32, [0x01, 0x90])),
            ),
            (
                Duration::from_secs(1),
                meter_advertisement(UNKNOWN_MAC, meter_payload(0x05, 0x16, 0xB2)),
            ),
        ]);

        let mut session = ScanSession::new(&registry);
        let snapshot = session
            .run_once(&scanner, DEFAULT_SCAN_DURATION)
            .await
            .unwrap();

        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(snapshot.len(), 2);
        let addresses: Vec<MacAddress> = snapshot.iter().map(|e| e.descriptor.address).collect();
        assert_eq!(addresses, vec![OTHER_MAC, TEST_MAC]);
        assert_eq!(snapshot.get(&OTHER_MAC).unwrap().reading.co2, Some(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_once_ignores_events_after_deadline() {
        let registry = registry();
        let scanner = FakeScanner::new(vec![
            (
                Duration::from_secs(2),
                meter_advertisement(TEST_MAC, meter_payload(0x05, 0x16, 0xB2)),
            ),
            (
                Duration::from_secs(20),
                meter_advertisement(TEST_MAC, meter_payload(0x05, 0x16, 0x32)),
            ),
        ]);

        let mut session = ScanSession::new(&registry);
        let snapshot = session
            .run_once(&scanner, Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get(&TEST_MAC).unwrap().reading.temperature, 22.5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_once_stops_when_discovery_ends() {
        let registry = registry();
        let scanner = ClosedScanner;
        let mut session = ScanSession::new(&registry);

        let started = Instant::now();
        let snapshot = session
            .run_once(&scanner, Duration::from_secs(10))
            .await
            .unwrap();
        assert!(snapshot.is_empty());
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_once_accepts_duration_beyond_clock_range() {
        let registry = registry();
        let mut session = ScanSession::new(&registry);

        let snapshot = session.run_once(&ClosedScanner, Duration::MAX).await.unwrap();
        assert!(snapshot.is_empty());
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_run_once_propagates_start_failure() {
        let registry = registry();
        let mut session = ScanSession::new(&registry);

        let result = session.run_once(&FailingScanner, Duration::from_secs(10)).await;
        assert!(matches!(
            result,
            Err(SessionError::Scan(ScanError::Bluetooth(_)))
        ));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_run_once_is_not_reusable() {
        let registry = registry();
        let mut session = ScanSession::new(&registry);
        session
            .run_once(&ClosedScanner, Duration::from_secs(1))
            .await
            .unwrap();

        let again = session.run_once(&ClosedScanner, Duration::from_secs(1)).await;
        assert!(matches!(
            again,
            Err(SessionError::InvalidTransition {
                from: SessionState::Closed,
                ..
            })
        ));
    }
}
