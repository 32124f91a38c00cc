//! Thin abstraction over the G2's three USB endpoints.
//!
//! `spec.md` §6: vendor `0x0ffc`, product `0x0002`; endpoint `0x81`
//! interrupt IN, `0x82` bulk IN ("extended"), `0x03` bulk OUT.

use crate::error::TransportError;
use std::time::Duration;

pub const VENDOR_ID: u16 = 0x0ffc;
pub const PRODUCT_ID: u16 = 0x0002;

pub const EP_INTERRUPT_IN: u8 = 0x81;
pub const EP_EXTENDED_IN: u8 = 0x82;
pub const EP_BULK_OUT: u8 = 0x03;

/// Default per-I/O timeout (`spec.md` §4.6 `receive_one`).
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// A single USB device able to move bytes on the three G2 endpoints.
///
/// Mirrors `rusb::DeviceHandle`'s read/write shape rather than wrapping
/// it 1:1, so `SessionMachine` can be driven by a scripted fake in tests
/// (`mocks::ScriptedTransport`) without a real device attached.
pub trait Transport {
    fn bulk_out(&mut self, endpoint: u8, bytes: &[u8], timeout_ms: u64) -> Result<usize, TransportError>;
    fn bulk_in(&mut self, endpoint: u8, buf: &mut [u8], timeout_ms: u64) -> Result<usize, TransportError>;
}

/// The real transport, backed by `rusb` (libusb bindings) — same crate
/// the teacher CLI (`ergodox-cli`) uses to talk to its Teensy bootloader.
pub struct RusbTransport {
    handle: rusb::DeviceHandle<rusb::GlobalContext>,
}

impl RusbTransport {
    /// Enumerate, open, reset and claim interface 0 of the first G2
    /// found. `spec.md` §4.7 `open()`.
    pub fn open() -> Result<Self, TransportError> {
        let devices = rusb::devices()?;
        for device in devices.iter() {
            let desc = device.device_descriptor()?;
            if desc.vendor_id() == VENDOR_ID && desc.product_id() == PRODUCT_ID {
                let mut handle = device.open()?;
                // Best-effort: some platforms refuse a reset on a device
                // that's already idle; a failed reset isn't fatal here.
                let _ = handle.reset();
                handle.claim_interface(0)?;
                log::info!("opened G2 (bus {}, address {})", device.bus_number(), device.address());
                return Ok(RusbTransport { handle });
            }
        }
        Err(TransportError::NoDevice)
    }
}

impl Transport for RusbTransport {
    fn bulk_out(&mut self, endpoint: u8, bytes: &[u8], timeout_ms: u64) -> Result<usize, TransportError> {
        self.handle
            .write_bulk(endpoint, bytes, Duration::from_millis(timeout_ms))
            .map_err(Into::into)
    }

    fn bulk_in(&mut self, endpoint: u8, buf: &mut [u8], timeout_ms: u64) -> Result<usize, TransportError> {
        let timeout = Duration::from_millis(timeout_ms);
        if endpoint == EP_INTERRUPT_IN {
            self.handle.read_interrupt(endpoint, buf, timeout).map_err(Into::into)
        } else {
            self.handle.read_bulk(endpoint, buf, timeout).map_err(Into::into)
        }
    }
}

/// Test doubles for driving `SessionMachine` without real hardware.
pub mod mocks {
    use super::*;
    use std::collections::VecDeque;

    /// One scripted response to a `bulk_in` call, or a forced error.
    #[derive(Debug, Clone)]
    pub enum ScriptedRead {
        Bytes(Vec<u8>),
        Empty,
        NoDevice,
    }

    /// Replays canned `bulk_in`/`bulk_out` sequences against
    /// `SessionMachine`, the way `cotton-usb-host`'s `mocks.rs` fakes its
    /// host-controller trait for unit tests.
    #[derive(Default)]
    pub struct ScriptedTransport {
        reads: HashMapQueue,
        pub sent: Vec<(u8, Vec<u8>)>,
    }

    #[derive(Default)]
    struct HashMapQueue {
        by_endpoint: std::collections::HashMap<u8, VecDeque<ScriptedRead>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_read(&mut self, endpoint: u8, read: ScriptedRead) {
            self.reads.by_endpoint.entry(endpoint).or_default().push_back(read);
        }
    }

    impl Transport for ScriptedTransport {
        fn bulk_out(&mut self, endpoint: u8, bytes: &[u8], _timeout_ms: u64) -> Result<usize, TransportError> {
            self.sent.push((endpoint, bytes.to_vec()));
            Ok(bytes.len())
        }

        fn bulk_in(&mut self, endpoint: u8, buf: &mut [u8], _timeout_ms: u64) -> Result<usize, TransportError> {
            let queue = self.reads.by_endpoint.entry(endpoint).or_default();
            match queue.pop_front() {
                Some(ScriptedRead::Bytes(bytes)) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    Ok(n)
                }
                Some(ScriptedRead::Empty) | None => Ok(0),
                Some(ScriptedRead::NoDevice) => Err(TransportError::NoDevice),
            }
        }
    }
}
