//! Transfer proxy — validate a descriptor, find the device, run one control transfer.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::device::{ControlSetup, DeviceKey, Pipe, UsbBus, UsbDevice};
use crate::locator::{self, DeviceId};
use crate::protocol::*;
use crate::xfer::TransferDescriptor;

// ── Error type ──

/// Why a proxied transfer did not happen or did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyError {
    /// Requested length exceeds the descriptor's data capacity.
    InvalidArgument,
    /// No attached device matches the target identifiers.
    DeviceNotFound,
    /// The scratch buffer could not be allocated.
    ResourceExhausted,
    /// The descriptor could not be fully copied across the boundary.
    BoundaryFault,
    /// The boundary request named an operation other than the control transfer.
    UnknownCommand,
    /// The control transfer failed with this (negative) status.
    TransferFailed(i32),
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyError::InvalidArgument => {
                write!(f, "Transfer length exceeds {XFER_DATA_CAPACITY} bytes")
            }
            ProxyError::DeviceNotFound => write!(f, "Wave:3 not found"),
            ProxyError::ResourceExhausted => write!(f, "Out of memory for transfer buffer"),
            ProxyError::BoundaryFault => write!(f, "Transfer descriptor could not be copied"),
            ProxyError::UnknownCommand => write!(f, "Unsupported proxy command"),
            ProxyError::TransferFailed(code) => write!(f, "Control transfer failed: status {code}"),
        }
    }
}

impl std::error::Error for ProxyError {}

impl ProxyError {
    /// Boundary status code (negated errno) for this error.
    pub fn status(&self) -> i32 {
        match self {
            ProxyError::InvalidArgument => STATUS_EINVAL,
            ProxyError::DeviceNotFound => STATUS_ENODEV,
            ProxyError::ResourceExhausted => STATUS_ENOMEM,
            ProxyError::BoundaryFault => STATUS_EFAULT,
            ProxyError::UnknownCommand => STATUS_ENOTTY,
            ProxyError::TransferFailed(code) => *code,
        }
    }

    /// Decode a non-zero boundary status.
    ///
    /// A transfer that itself failed with one of the reserved codes (e.g. a
    /// disconnect reported as `-19`) decodes as the matching proxy error.
    pub fn from_status(status: i32) -> Self {
        match status {
            STATUS_EINVAL => ProxyError::InvalidArgument,
            STATUS_ENODEV => ProxyError::DeviceNotFound,
            STATUS_ENOMEM => ProxyError::ResourceExhausted,
            STATUS_EFAULT => ProxyError::BoundaryFault,
            STATUS_ENOTTY => ProxyError::UnknownCommand,
            code => ProxyError::TransferFailed(code),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;

// ── Proxy ──

/// Issues control transfers to the target device on behalf of callers.
///
/// Holds no device state between calls: every [`execute`](Self::execute)
/// scans the bus afresh.
pub struct TransferProxy<B: UsbBus> {
    bus: B,
    target: DeviceId,
    timeout: Duration,
    /// Per-device transfer locks; `None` leaves ordering to the transport.
    locks: Option<Mutex<HashMap<DeviceKey, Arc<Mutex<()>>>>>,
}

impl<B: UsbBus> TransferProxy<B> {
    /// Proxy for `target` with the default timeout and per-device serialization.
    pub fn new(bus: B, target: DeviceId) -> Self {
        TransferProxy {
            bus,
            target,
            timeout: Duration::from_millis(USB_TIMEOUT_MS),
            locks: Some(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enable or disable per-device serialization of transfers.
    pub fn with_serialized_transfers(mut self, serialize: bool) -> Self {
        self.locks = serialize.then(|| Mutex::new(HashMap::new()));
        self
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn target(&self) -> DeviceId {
        self.target
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn device_lock(&self, key: DeviceKey) -> Option<Arc<Mutex<()>>> {
        let table = self.locks.as_ref()?;
        let mut table = table.lock().unwrap_or_else(PoisonError::into_inner);
        Some(Arc::clone(table.entry(key).or_default()))
    }

    /// Give back a lock from [`device_lock`](Self::device_lock), dropping its
    /// table entry once no other transfer holds it.
    ///
    /// Clones are only taken under the table lock, so the count is exact here.
    fn release_lock(&self, key: DeviceKey, lock: Arc<Mutex<()>>) {
        let Some(table) = self.locks.as_ref() else {
            return;
        };
        let mut table = table.lock().unwrap_or_else(PoisonError::into_inner);
        if Arc::strong_count(&lock) == 2 {
            table.remove(&key);
        }
    }

    /// Devices with a live entry in the lock table.
    pub fn locked_devices(&self) -> usize {
        self.locks.as_ref().map_or(0, |table| {
            table.lock().unwrap_or_else(PoisonError::into_inner).len()
        })
    }

    /// Run one control transfer described by `desc`.
    ///
    /// Host-to-device success returns `desc` unchanged. Device-to-host success
    /// returns it with `length` set to the bytes received and those bytes in
    /// `data`. On failure nothing is returned; the caller's copy is untouched.
    pub fn execute(&self, desc: TransferDescriptor) -> Result<TransferDescriptor> {
        let len = desc.length as usize;
        if len > XFER_DATA_CAPACITY {
            return Err(ProxyError::InvalidArgument);
        }

        let dev = locator::find(&self.bus, self.target).ok_or(ProxyError::DeviceNotFound)?;
        let mut scratch = alloc_scratch(len)?;

        let pipe = if desc.is_in() {
            Pipe::ControlIn
        } else {
            scratch.copy_from_slice(&desc.data[..len]);
            Pipe::ControlOut
        };
        let setup = ControlSetup {
            request_type: desc.request_type,
            request: desc.request,
            value: desc.value,
            index: desc.index,
        };

        log::debug!(
            "{} {pipe:?} bmRequestType=0x{:02X} bRequest=0x{:02X} wValue=0x{:04X} wIndex=0x{:04X} wLength={len}",
            dev.key(),
            setup.request_type,
            setup.request,
            setup.value,
            setup.index,
        );

        let key = dev.key();
        let lock = self.device_lock(key);
        let status = {
            let _serial = lock
                .as_ref()
                .map(|m| m.lock().unwrap_or_else(PoisonError::into_inner));
            dev.control_transfer(pipe, setup, &mut scratch, self.timeout)
        };
        if let Some(lock) = lock {
            self.release_lock(key, lock);
        }
        let n = status.map_err(|code| {
            log::debug!("{} transfer failed: status {code}", dev.key());
            ProxyError::TransferFailed(code)
        })?;

        match pipe {
            Pipe::ControlOut => Ok(desc),
            Pipe::ControlIn => {
                let n = n.min(len);
                let mut out = desc;
                out.length = n as u16;
                out.data[..n].copy_from_slice(&scratch[..n]);
                Ok(out)
            }
        }
    }
}

/// Zeroed staging buffer of exactly `len` bytes.
fn alloc_scratch(len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| ProxyError::ResourceExhausted)?;
    buf.resize(len, 0);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock::{MockBus, MockReply, MockUsbDevice};

    fn proxy_with_wave3() -> (TransferProxy<MockBus>, Arc<MockUsbDevice>) {
        let bus = MockBus::new();
        let dev = bus.attach(MockUsbDevice::new(WAVE3_VID, WAVE3_PID, 1, 4));
        (TransferProxy::new(bus, DeviceId::WAVE3), dev)
    }

    fn out_desc(payload: &[u8]) -> TransferDescriptor {
        TransferDescriptor::control_out(BM_REQUEST_OUT, UAC_SET_CUR, 0x0100, 0x0600, payload)
            .unwrap()
    }

    #[test]
    fn length_at_capacity_passes_validation() {
        let (proxy, dev) = proxy_with_wave3();
        let desc = out_desc(&[0x11; XFER_DATA_CAPACITY]);
        assert!(proxy.execute(desc).is_ok());
        assert_eq!(dev.transfers()[0].requested, XFER_DATA_CAPACITY);
    }

    #[test]
    fn length_over_capacity_is_rejected_before_lookup() {
        let (proxy, dev) = proxy_with_wave3();
        for length in [XFER_DATA_CAPACITY as u16 + 1, 1000, u16::MAX] {
            let desc = TransferDescriptor {
                length,
                ..Default::default()
            };
            assert_eq!(proxy.execute(desc), Err(ProxyError::InvalidArgument));
        }
        assert_eq!(proxy.bus().scans(), 0);
        assert_eq!(dev.transfer_count(), 0);
    }

    #[test]
    fn out_transfer_sends_exact_payload() {
        let (proxy, dev) = proxy_with_wave3();
        let mut desc = out_desc(&[1, 2, 3]);
        // Bytes past `length` must not reach the device.
        desc.data[3] = 0xEE;
        proxy.execute(desc).unwrap();
        let t = &dev.transfers()[0];
        assert_eq!(t.pipe, Pipe::ControlOut);
        assert_eq!(t.requested, 3);
        assert_eq!(t.buffer, vec![1, 2, 3]);
    }

    #[test]
    fn out_transfer_returns_descriptor_unchanged() {
        let (proxy, _dev) = proxy_with_wave3();
        let desc = out_desc(&[0xAA, 0xBB]);
        let result = proxy.execute(desc.clone()).unwrap();
        assert_eq!(result, desc);
    }

    #[test]
    fn out_transfer_ignores_short_byte_count() {
        let (proxy, dev) = proxy_with_wave3();
        dev.push_reply(MockReply::Data(vec![]));
        let desc = out_desc(&[1, 2]);
        assert_eq!(proxy.execute(desc.clone()).unwrap(), desc);
    }

    #[test]
    fn in_transfer_reports_short_read() {
        let (proxy, dev) = proxy_with_wave3();
        dev.push_reply(MockReply::Data(vec![0x34, 0x12]));
        let desc = TransferDescriptor::control_in(BM_REQUEST_IN, UAC_GET_CUR, 0x0200, 0x0500, 8);
        let out = proxy.execute(desc).unwrap();
        assert_eq!(out.length, 2);
        assert_eq!(out.payload(), &[0x34, 0x12]);
        let t = &dev.transfers()[0];
        assert_eq!(t.pipe, Pipe::ControlIn);
        assert_eq!(t.requested, 8);
        // Inbound scratch starts zeroed, never caller data.
        assert_eq!(t.buffer, vec![0; 8]);
    }

    #[test]
    fn in_transfer_does_not_leak_caller_bytes_into_request() {
        let (proxy, dev) = proxy_with_wave3();
        let mut desc = TransferDescriptor::control_in(BM_REQUEST_IN, UAC_GET_CUR, 0, 0, 4);
        desc.data[..4].copy_from_slice(&[9, 9, 9, 9]);
        proxy.execute(desc).unwrap();
        assert_eq!(dev.transfers()[0].buffer, vec![0; 4]);
    }

    #[test]
    fn setup_fields_pass_through_uninterpreted() {
        let (proxy, dev) = proxy_with_wave3();
        let desc = TransferDescriptor {
            request_type: 0x43,
            request: 0xFE,
            value: 0xBEEF,
            index: 0xCAFE,
            length: 0,
            ..Default::default()
        };
        proxy.execute(desc).unwrap();
        let t = &dev.transfers()[0];
        assert_eq!(
            t.setup,
            ControlSetup {
                request_type: 0x43,
                request: 0xFE,
                value: 0xBEEF,
                index: 0xCAFE,
            }
        );
    }

    #[test]
    fn timeout_is_forwarded() {
        let (proxy, dev) = proxy_with_wave3();
        let proxy = proxy.with_timeout(Duration::from_millis(250));
        proxy.execute(out_desc(&[1])).unwrap();
        assert_eq!(dev.transfers()[0].timeout, Duration::from_millis(250));
    }

    #[test]
    fn default_timeout_is_one_second() {
        let (proxy, _dev) = proxy_with_wave3();
        assert_eq!(proxy.timeout(), Duration::from_millis(1000));
    }

    #[test]
    fn transfer_failure_carries_status() {
        let (proxy, dev) = proxy_with_wave3();
        dev.push_reply(MockReply::Status(STATUS_EPIPE));
        assert_eq!(
            proxy.execute(out_desc(&[1])),
            Err(ProxyError::TransferFailed(STATUS_EPIPE))
        );
    }

    #[test]
    fn device_reference_released_on_every_path() {
        let (proxy, dev) = proxy_with_wave3();
        let baseline = Arc::strong_count(&dev);

        let _ = proxy.execute(out_desc(&[1]));
        assert_eq!(Arc::strong_count(&dev), baseline);

        dev.push_reply(MockReply::Status(-1));
        let _ = proxy.execute(out_desc(&[1]));
        assert_eq!(Arc::strong_count(&dev), baseline);

        let bad = TransferDescriptor {
            length: 65,
            ..Default::default()
        };
        let _ = proxy.execute(bad);
        assert_eq!(Arc::strong_count(&dev), baseline);
    }

    #[test]
    fn one_transfer_per_invocation() {
        let (proxy, dev) = proxy_with_wave3();
        proxy.execute(out_desc(&[1])).unwrap();
        proxy
            .execute(TransferDescriptor::control_in(BM_REQUEST_IN, UAC_GET_CUR, 0, 0, 1))
            .unwrap();
        assert_eq!(dev.transfer_count(), 2);
        assert_eq!(proxy.bus().scans(), 2);
    }

    #[test]
    fn lookup_runs_fresh_each_call() {
        let (proxy, dev) = proxy_with_wave3();
        proxy.execute(out_desc(&[1])).unwrap();
        proxy.bus().detach(dev.key());
        assert_eq!(
            proxy.execute(out_desc(&[1])),
            Err(ProxyError::DeviceNotFound)
        );
    }

    #[test]
    fn unserialized_proxy_still_transfers() {
        let (proxy, dev) = proxy_with_wave3();
        let proxy = proxy.with_serialized_transfers(false);
        proxy.execute(out_desc(&[1])).unwrap();
        assert_eq!(dev.transfer_count(), 1);
    }

    #[test]
    fn lock_table_does_not_grow_across_replugs() {
        let (proxy, dev) = proxy_with_wave3();
        proxy.execute(out_desc(&[1])).unwrap();
        assert_eq!(proxy.locked_devices(), 0);

        // Each replug comes back at a new address.
        proxy.bus().detach(dev.key());
        for address in 5..10 {
            let dev = proxy
                .bus()
                .attach(MockUsbDevice::new(WAVE3_VID, WAVE3_PID, 1, address));
            proxy.execute(out_desc(&[1])).unwrap();
            proxy.bus().detach(dev.key());
        }
        assert_eq!(proxy.locked_devices(), 0);
    }

    #[test]
    fn lock_entry_survives_while_another_transfer_holds_it() {
        let (proxy, dev) = proxy_with_wave3();
        let key = dev.key();
        let held = proxy.device_lock(key).unwrap();
        proxy.execute(out_desc(&[1])).unwrap();
        assert_eq!(proxy.locked_devices(), 1);
        proxy.release_lock(key, held);
        assert_eq!(proxy.locked_devices(), 0);
    }

    #[test]
    fn status_codes_round_trip_for_proxy_errors() {
        for e in [
            ProxyError::InvalidArgument,
            ProxyError::DeviceNotFound,
            ProxyError::ResourceExhausted,
            ProxyError::BoundaryFault,
            ProxyError::UnknownCommand,
            ProxyError::TransferFailed(-1),
            ProxyError::TransferFailed(STATUS_ETIMEDOUT),
        ] {
            assert_eq!(ProxyError::from_status(e.status()), e);
        }
    }

    #[test]
    fn display_messages() {
        assert_eq!(ProxyError::DeviceNotFound.to_string(), "Wave:3 not found");
        assert_eq!(
            ProxyError::TransferFailed(-110).to_string(),
            "Control transfer failed: status -110"
        );
        assert_eq!(
            ProxyError::InvalidArgument.to_string(),
            "Transfer length exceeds 64 bytes"
        );
    }

    #[test]
    fn alloc_scratch_exact_length() {
        assert_eq!(alloc_scratch(0).unwrap().len(), 0);
        assert_eq!(alloc_scratch(64).unwrap(), vec![0u8; 64]);
    }
}
