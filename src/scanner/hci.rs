//! Raw HCI socket backend.
//!
//! This backend uses raw Linux HCI sockets to receive LE advertising reports
//! without requiring the BlueZ daemon. It requires CAP_NET_RAW and
//! CAP_NET_ADMIN capabilities or root privileges.

use super::{ADVERTISEMENT_CHANNEL_BUFFER_SIZE, Advertisement, ScanError, uuid_from_u16};
use crate::mac_address::MacAddress;
use libc::{AF_BLUETOOTH, SOCK_CLOEXEC, SOCK_RAW, c_int, c_void, sockaddr, socklen_t};
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use tokio::io::unix::AsyncFd;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

// HCI protocol constants
const BTPROTO_HCI: c_int = 1;
const SOL_HCI: c_int = 0;
const HCI_FILTER: c_int = 2;
const HCI_CHANNEL_RAW: u16 = 0;
const HCI_DEV: u16 = 0;

// HCI packet types
const HCI_COMMAND_PKT: u8 = 0x01;
const HCI_EVENT_PKT: u8 = 0x04;

// HCI events
const EVT_LE_META_EVENT: u8 = 0x3E;
const EVT_LE_ADVERTISING_REPORT: u8 = 0x02;

// HCI commands
const OGF_LE_CTL: u16 = 0x08;
const OCF_LE_SET_SCAN_PARAMETERS: u16 = 0x000B;
const OCF_LE_SET_SCAN_ENABLE: u16 = 0x000C;

// Passive scan, 10ms interval and window (0.625ms units), public address, accept all
const LE_SCAN_PARAMETERS: [u8; 7] = [0x00, 0x10, 0x00, 0x10, 0x00, 0x00, 0x00];

// AD types
const AD_TYPE_SHORT_NAME: u8 = 0x08;
const AD_TYPE_COMPLETE_NAME: u8 = 0x09;
const AD_TYPE_SERVICE_DATA_16: u8 = 0x16;
const AD_TYPE_MANUFACTURER_DATA: u8 = 0xFF;

// Max HCI event size
const HCI_MAX_EVENT_SIZE: usize = 260;

/// HCI socket address structure
#[repr(C)]
struct SockaddrHci {
    hci_family: u16,
    hci_dev: u16,
    hci_channel: u16,
}

/// HCI filter structure for raw sockets
#[repr(C)]
#[derive(Default)]
struct HciFilter {
    type_mask: u32,
    event_mask: [u32; 2],
    opcode: u16,
}

impl HciFilter {
    fn set_ptype(&mut self, ptype: u8) {
        self.type_mask |= 1 << u32::from(ptype);
    }

    fn set_event(&mut self, event: u8) {
        let bit = usize::from(event);
        self.event_mask[bit / 32] |= 1 << (bit % 32);
    }
}

fn os_error(action: &str) -> ScanError {
    ScanError::Bluetooth(format!("{action}: {}", io::Error::last_os_error()))
}

/// Build an HCI command packet.
fn hci_command_packet(ogf: u16, ocf: u16, params: &[u8]) -> Vec<u8> {
    let opcode = (ogf << 10) | ocf;
    let mut packet = Vec::with_capacity(4 + params.len());
    packet.push(HCI_COMMAND_PKT);
    packet.extend_from_slice(&opcode.to_le_bytes());
    packet.push(params.len() as u8);
    packet.extend_from_slice(params);
    packet
}

/// A raw HCI socket bound to one controller.
struct HciSocket {
    fd: OwnedFd,
}

impl HciSocket {
    /// Open a non-blocking raw socket bound to `dev_id`.
    fn open(dev_id: u16) -> Result<Self, ScanError> {
        // SOCK_NONBLOCK is required for AsyncFd
        let fd = unsafe {
            libc::socket(
                AF_BLUETOOTH,
                SOCK_RAW | SOCK_CLOEXEC | libc::SOCK_NONBLOCK,
                BTPROTO_HCI,
            )
        };
        if fd < 0 {
            return Err(os_error("Failed to create HCI socket"));
        }
        let socket = Self {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
        };

        let addr = SockaddrHci {
            hci_family: AF_BLUETOOTH as u16,
            hci_dev: dev_id,
            hci_channel: HCI_CHANNEL_RAW,
        };
        let ret = unsafe {
            libc::bind(
                socket.fd.as_raw_fd(),
                &addr as *const SockaddrHci as *const sockaddr,
                mem::size_of::<SockaddrHci>() as socklen_t,
            )
        };
        if ret < 0 {
            return Err(os_error("Failed to bind HCI socket"));
        }

        Ok(socket)
    }

    /// Only deliver LE meta events to this socket.
    fn filter_le_meta_events(&self) -> Result<(), ScanError> {
        let mut filter = HciFilter::default();
        filter.set_ptype(HCI_EVENT_PKT);
        filter.set_event(EVT_LE_META_EVENT);

        let ret = unsafe {
            libc::setsockopt(
                self.fd.as_raw_fd(),
                SOL_HCI,
                HCI_FILTER,
                &filter as *const HciFilter as *const c_void,
                mem::size_of::<HciFilter>() as socklen_t,
            )
        };
        if ret < 0 {
            return Err(os_error("Failed to set HCI filter"));
        }
        Ok(())
    }

    fn send_command(&self, ocf: u16, params: &[u8]) -> Result<(), ScanError> {
        let packet = hci_command_packet(OGF_LE_CTL, ocf, params);
        let ret = unsafe {
            libc::write(
                self.fd.as_raw_fd(),
                packet.as_ptr() as *const c_void,
                packet.len(),
            )
        };
        if ret < 0 {
            return Err(os_error("Failed to send HCI command"));
        }
        Ok(())
    }

    fn enable_scan(&self) -> Result<(), ScanError> {
        self.send_command(OCF_LE_SET_SCAN_PARAMETERS, &LE_SCAN_PARAMETERS)?;
        // Duplicates are not filtered: repeated broadcasts carry fresh readings
        self.send_command(OCF_LE_SET_SCAN_ENABLE, &[0x01, 0x00])
    }

    fn disable_scan(&self) -> Result<(), ScanError> {
        self.send_command(OCF_LE_SET_SCAN_ENABLE, &[0x00, 0x00])
    }
}

/// Split AD structures into name, manufacturer data and 16-bit service data.
fn parse_ad_structures(address: MacAddress, mut ad: &[u8]) -> Advertisement {
    let mut advertisement = Advertisement {
        address,
        ..Default::default()
    };

    while let [len, rest @ ..] = ad {
        let len = usize::from(*len);
        if len == 0 || len > rest.len() {
            break;
        }
        let (structure, tail) = rest.split_at(len);
        ad = tail;

        let (ad_type, value) = (structure[0], &structure[1..]);
        match ad_type {
            AD_TYPE_SHORT_NAME | AD_TYPE_COMPLETE_NAME => {
                advertisement.name = Some(String::from_utf8_lossy(value).into_owned());
            }
            AD_TYPE_MANUFACTURER_DATA if value.len() >= 2 => {
                let company = u16::from_le_bytes([value[0], value[1]]);
                advertisement
                    .manufacturer_data
                    .insert(company, value[2..].to_vec());
            }
            AD_TYPE_SERVICE_DATA_16 if value.len() >= 2 => {
                let uuid = uuid_from_u16(u16::from_le_bytes([value[0], value[1]]));
                advertisement.service_data.insert(uuid, value[2..].to_vec());
            }
            _ => {}
        }
    }

    advertisement
}

/// Parse the reports of an LE advertising report event.
///
/// `params` starts after the sub-event code: number of reports followed by
/// each report's event type, address type, address, data length, data and RSSI.
fn parse_advertising_reports(params: &[u8]) -> Vec<Advertisement> {
    let Some((&count, mut reports)) = params.split_first() else {
        return Vec::new();
    };

    let mut advertisements = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        // event type (1) + address type (1) + address (6) + data length (1)
        if reports.len() < 9 {
            break;
        }
        let mut addr = [0u8; 6];
        addr.copy_from_slice(&reports[2..8]);
        addr.reverse(); // HCI uses little-endian address

        let data_len = usize::from(reports[8]);
        // data + RSSI (1)
        if reports.len() < 9 + data_len + 1 {
            break;
        }
        let ad = &reports[9..9 + data_len];
        advertisements.push(parse_ad_structures(MacAddress(addr), ad));
        reports = &reports[9 + data_len + 1..];
    }

    advertisements
}

/// Extract advertisements from one HCI event packet.
fn parse_event_packet(packet: &[u8]) -> Vec<Advertisement> {
    // packet type (1) + event code (1) + parameter length (1) + sub-event (1)
    match packet {
        [HCI_EVENT_PKT, EVT_LE_META_EVENT, _, EVT_LE_ADVERTISING_REPORT, params @ ..] => {
            parse_advertising_reports(params)
        }
        _ => Vec::new(),
    }
}

fn read_packet(fd: &OwnedFd, buf: &mut [u8]) -> io::Result<usize> {
    let ret = unsafe { libc::read(fd.as_raw_fd(), buf.as_mut_ptr() as *mut c_void, buf.len()) };
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret as usize)
    }
}

/// Start passive LE scanning on hci0 using raw HCI sockets.
///
/// Scanning is disabled again once the returned receiver is dropped.
///
/// # Requirements
/// - CAP_NET_RAW and CAP_NET_ADMIN capabilities or root privileges
/// - An available HCI device (typically hci0)
pub async fn start_scan() -> Result<mpsc::Receiver<Advertisement>, ScanError> {
    let events = HciSocket::open(HCI_DEV)?;
    events.filter_le_meta_events()?;

    // A separate socket is used for sending commands
    let commands = HciSocket::open(HCI_DEV)?;
    commands.enable_scan()?;
    info!(device = HCI_DEV, "hci scan enabled");

    let async_fd = AsyncFd::new(events.fd)
        .map_err(|e| ScanError::Bluetooth(format!("Failed to create async fd: {e}")))?;

    let (tx, rx) = mpsc::channel(ADVERTISEMENT_CHANNEL_BUFFER_SIZE);

    tokio::spawn(async move {
        let mut buf = [0u8; HCI_MAX_EVENT_SIZE];

        'events: loop {
            let mut guard = tokio::select! {
                _ = tx.closed() => break,
                readable = async_fd.readable() => match readable {
                    Ok(guard) => guard,
                    Err(_) => break,
                },
            };

            // Drain all available packets before waiting again
            loop {
                let n = match guard.try_io(|inner| read_packet(inner.get_ref(), &mut buf)) {
                    Ok(Ok(n)) if n > 0 => n,
                    Ok(_) => break 'events,
                    Err(_would_block) => break,
                };

                for advertisement in parse_event_packet(&buf[..n]) {
                    if tx.send(advertisement).await.is_err() {
                        break 'events;
                    }
                }
            }
        }

        match commands.disable_scan() {
            Ok(()) => debug!("hci scan disabled"),
            Err(e) => warn!(error = %e, "failed to disable hci scan"),
        }
    });

    Ok(rx)
}
