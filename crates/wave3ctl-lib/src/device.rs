//! USB device registry — traits + nusb backend.
//!
//! The proxy never talks to a global registry directly: it asks a [`UsbBus`]
//! for a snapshot of attached devices and issues transfers through the
//! [`UsbDevice`] it picked. Production uses [`PlatformBus`]; tests use
//! [`mock::MockBus`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

// ── Transfer primitive types ──

/// Control pipe of endpoint zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pipe {
    /// Device-to-host.
    ControlIn,
    /// Host-to-device.
    ControlOut,
}

/// Setup-packet fields passed through to the device uninterpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlSetup {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
}

/// Result of the transfer primitive: bytes transferred, or a negative status.
pub type TransferStatus = std::result::Result<usize, i32>;

/// Identity of one physical device on the bus (stable while it stays attached).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DeviceKey {
    pub bus: u8,
    pub address: u8,
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "usb:{:03}/{:03}", self.bus, self.address)
    }
}

// ── Traits ──

/// One attached USB device.
pub trait UsbDevice: Send + Sync {
    /// `idVendor` exactly as stored in the device descriptor (little-endian).
    fn id_vendor_raw(&self) -> u16;
    /// `idProduct` exactly as stored in the device descriptor (little-endian).
    fn id_product_raw(&self) -> u16;
    fn key(&self) -> DeviceKey;

    /// Issue one control transfer on endpoint zero.
    ///
    /// `buf.len()` is the requested length. For [`Pipe::ControlOut`] the buffer
    /// holds the outbound payload; for [`Pipe::ControlIn`] it receives data.
    fn control_transfer(
        &self,
        pipe: Pipe,
        setup: ControlSetup,
        buf: &mut [u8],
        timeout: Duration,
    ) -> TransferStatus;

    fn product_string(&self) -> Option<String> {
        None
    }

    fn serial_number(&self) -> Option<String> {
        None
    }
}

/// Enumerable collection of currently attached devices.
pub trait UsbBus: Send + Sync {
    type Device: UsbDevice;

    /// Snapshot of attached devices in host enumeration order.
    ///
    /// Each entry is a shared reference; holding one keeps the device object
    /// alive, dropping it releases it.
    fn devices(&self) -> std::io::Result<Vec<Arc<Self::Device>>>;
}

/// A device seen during enumeration (listing only, never opened).
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredDevice {
    pub path: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub product: Option<String>,
    pub serial: Option<String>,
}

// ── Linux implementation ──

#[cfg(target_os = "linux")]
mod linux_impl {
    use super::*;

    use nusb::transfer::{Control, ControlType, Recipient, TransferError};

    use crate::protocol::{
        STATUS_EBUSY, STATUS_EIO, STATUS_ENODEV, STATUS_EOPNOTSUPP, STATUS_EPIPE, STATUS_EPROTO,
        STATUS_ETIMEDOUT, USB_RECIP_MASK, USB_TYPE_MASK,
    };

    /// Live registry backed by `nusb::list_devices()`.
    #[derive(Debug, Default)]
    pub struct NusbBus;

    pub struct NusbDevice {
        info: nusb::DeviceInfo,
    }

    /// Split `bmRequestType` into nusb's typed fields.
    ///
    /// The reserved type (3) and recipients above 3 have no nusb equivalent;
    /// they fail with `EOPNOTSUPP`, outside the codes the proxy reserves.
    pub fn decode_request_type(
        request_type: u8,
    ) -> std::result::Result<(ControlType, Recipient), i32> {
        let control_type = match (request_type & USB_TYPE_MASK) >> 5 {
            0 => ControlType::Standard,
            1 => ControlType::Class,
            2 => ControlType::Vendor,
            _ => return Err(STATUS_EOPNOTSUPP),
        };
        let recipient = match request_type & USB_RECIP_MASK {
            0 => Recipient::Device,
            1 => Recipient::Interface,
            2 => Recipient::Endpoint,
            3 => Recipient::Other,
            _ => return Err(STATUS_EOPNOTSUPP),
        };
        Ok((control_type, recipient))
    }

    /// Map a usbfs transfer error to a boundary status.
    ///
    /// usbfs claims the addressed interface before forwarding an interface or
    /// endpoint request. While a kernel driver (snd-usb-audio) is bound that
    /// claim fails with `EBUSY`, which nusb only reports as `Unknown`.
    pub fn transfer_status(e: TransferError, recipient: Recipient) -> i32 {
        let claims_interface = matches!(recipient, Recipient::Interface | Recipient::Endpoint);
        #[allow(unreachable_patterns)]
        match e {
            // Blocking transfers are cancelled when the timeout expires.
            TransferError::Cancelled => STATUS_ETIMEDOUT,
            TransferError::Stall => STATUS_EPIPE,
            TransferError::Disconnected => STATUS_ENODEV,
            TransferError::Fault => STATUS_EPROTO,
            TransferError::Unknown if claims_interface => STATUS_EBUSY,
            _ => STATUS_EIO,
        }
    }

    impl UsbBus for NusbBus {
        type Device = NusbDevice;

        fn devices(&self) -> std::io::Result<Vec<Arc<NusbDevice>>> {
            Ok(nusb::list_devices()?
                .map(|info| Arc::new(NusbDevice { info }))
                .collect())
        }
    }

    impl UsbDevice for NusbDevice {
        fn id_vendor_raw(&self) -> u16 {
            // nusb reports host order; re-encode to descriptor order.
            self.info.vendor_id().to_le()
        }

        fn id_product_raw(&self) -> u16 {
            self.info.product_id().to_le()
        }

        fn key(&self) -> DeviceKey {
            DeviceKey {
                bus: self.info.bus_number(),
                address: self.info.device_address(),
            }
        }

        fn control_transfer(
            &self,
            pipe: Pipe,
            setup: ControlSetup,
            buf: &mut [u8],
            timeout: Duration,
        ) -> TransferStatus {
            let (control_type, recipient) = decode_request_type(setup.request_type)?;
            let control = Control {
                control_type,
                recipient,
                request: setup.request,
                value: setup.value,
                index: setup.index,
            };

            // Device-level handle. The bound audio driver is left attached, so
            // usbfs refuses interface requests while it holds interface 0.
            let device = self.info.open().map_err(|e| {
                log::debug!("open {}: {e}", self.key());
                e.raw_os_error().map(|code| -code).unwrap_or(STATUS_ENODEV)
            })?;

            match pipe {
                Pipe::ControlIn => device.control_in_blocking(control, buf, timeout),
                Pipe::ControlOut => device.control_out_blocking(control, buf, timeout),
            }
            .map_err(|e| {
                let status = transfer_status(e, recipient);
                if status == STATUS_EBUSY {
                    log::warn!(
                        "{}: interface 0x{:02X} is held by a kernel driver",
                        self.key(),
                        setup.index & 0xFF
                    );
                }
                status
            })
        }

        fn product_string(&self) -> Option<String> {
            self.info.product_string().map(|s| s.to_string())
        }

        fn serial_number(&self) -> Option<String> {
            self.info.serial_number().map(|s| s.to_string())
        }
    }
}

#[cfg(target_os = "linux")]
pub use linux_impl::{NusbBus, NusbDevice, decode_request_type, transfer_status};

// ── Stub bus for unsupported platforms ──

/// Registry that never has any devices.
/// Enables compilation and `cargo test` on unsupported hosts.
#[cfg(not(target_os = "linux"))]
#[derive(Debug, Default)]
pub struct StubBus;

/// Uninhabited: the stub bus never yields a device.
#[cfg(not(target_os = "linux"))]
pub enum StubDevice {}

#[cfg(not(target_os = "linux"))]
impl UsbDevice for StubDevice {
    fn id_vendor_raw(&self) -> u16 {
        match *self {}
    }
    fn id_product_raw(&self) -> u16 {
        match *self {}
    }
    fn key(&self) -> DeviceKey {
        match *self {}
    }
    fn control_transfer(
        &self,
        _pipe: Pipe,
        _setup: ControlSetup,
        _buf: &mut [u8],
        _timeout: Duration,
    ) -> TransferStatus {
        match *self {}
    }
}

#[cfg(not(target_os = "linux"))]
impl UsbBus for StubBus {
    type Device = StubDevice;

    fn devices(&self) -> std::io::Result<Vec<Arc<StubDevice>>> {
        Ok(Vec::new())
    }
}

/// Concrete registry type for the current platform.
#[cfg(target_os = "linux")]
pub type PlatformBus = NusbBus;
#[cfg(not(target_os = "linux"))]
pub type PlatformBus = StubBus;

/// The platform registry.
pub fn platform_bus() -> PlatformBus {
    PlatformBus::default()
}

// ── Mock bus for testing ──

/// In-memory registry and devices for unit and integration tests.
///
/// Always compiled (zero runtime cost), hidden from public docs.
#[doc(hidden)]
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Scripted outcome of one `control_transfer` call.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum MockReply {
        /// Accept the whole buffer (returns `buf.len()`).
        Accept,
        /// Produce these bytes (truncated to the buffer) and return their count.
        Data(Vec<u8>),
        /// Fail with this negative status.
        Status(i32),
    }

    /// One recorded call to the transfer primitive.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct RecordedTransfer {
        pub pipe: Pipe,
        pub setup: ControlSetup,
        /// Requested length (`buf.len()`).
        pub requested: usize,
        /// Buffer contents at call time.
        pub buffer: Vec<u8>,
        pub timeout: Duration,
    }

    pub struct MockUsbDevice {
        vendor_id: u16,
        product_id: u16,
        key: DeviceKey,
        /// Replies popped in order; `Accept` once exhausted.
        pub replies: Mutex<VecDeque<MockReply>>,
        /// Recorded transfers.
        pub transfers: Mutex<Vec<RecordedTransfer>>,
        /// If set, each transfer sleeps this long (for concurrency tests).
        pub delay: Mutex<Option<Duration>>,
        in_flight: AtomicUsize,
        /// Highest number of transfers observed in flight at once.
        pub max_in_flight: AtomicUsize,
    }

    impl MockUsbDevice {
        /// Device with host-order ids at the given bus address.
        pub fn new(vendor_id: u16, product_id: u16, bus: u8, address: u8) -> Self {
            MockUsbDevice {
                vendor_id,
                product_id,
                key: DeviceKey { bus, address },
                replies: Mutex::new(VecDeque::new()),
                transfers: Mutex::new(Vec::new()),
                delay: Mutex::new(None),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }

        /// Queue a reply for the next transfer.
        pub fn push_reply(&self, reply: MockReply) {
            self.replies.lock().unwrap().push_back(reply);
        }

        pub fn set_delay(&self, delay: Duration) {
            *self.delay.lock().unwrap() = Some(delay);
        }

        pub fn transfers(&self) -> Vec<RecordedTransfer> {
            self.transfers.lock().unwrap().clone()
        }

        pub fn transfer_count(&self) -> usize {
            self.transfers.lock().unwrap().len()
        }
    }

    impl UsbDevice for MockUsbDevice {
        fn id_vendor_raw(&self) -> u16 {
            self.vendor_id.to_le()
        }

        fn id_product_raw(&self) -> u16 {
            self.product_id.to_le()
        }

        fn key(&self) -> DeviceKey {
            self.key
        }

        fn control_transfer(
            &self,
            pipe: Pipe,
            setup: ControlSetup,
            buf: &mut [u8],
            timeout: Duration,
        ) -> TransferStatus {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            self.transfers.lock().unwrap().push(RecordedTransfer {
                pipe,
                setup,
                requested: buf.len(),
                buffer: buf.to_vec(),
                timeout,
            });
            let delay = *self.delay.lock().unwrap();
            if let Some(d) = delay {
                std::thread::sleep(d);
            }
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(MockReply::Accept);

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            match reply {
                MockReply::Accept => Ok(buf.len()),
                MockReply::Data(bytes) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    Ok(n)
                }
                MockReply::Status(code) => Err(code),
            }
        }

        fn product_string(&self) -> Option<String> {
            Some("Mock Wave:3".into())
        }

        fn serial_number(&self) -> Option<String> {
            Some(format!("MOCK{:03}", self.key.address))
        }
    }

    /// In-memory registry. Counts snapshots so tests can assert "no lookup".
    #[derive(Default)]
    pub struct MockBus {
        pub attached: Mutex<Vec<Arc<MockUsbDevice>>>,
        scans: AtomicUsize,
        /// If true, `devices()` returns an I/O error.
        pub fail_enumeration: AtomicBool,
    }

    impl MockBus {
        pub fn new() -> Self {
            Self::default()
        }

        /// Attach a device and return a handle to it.
        pub fn attach(&self, dev: MockUsbDevice) -> Arc<MockUsbDevice> {
            let dev = Arc::new(dev);
            self.attached.lock().unwrap().push(Arc::clone(&dev));
            dev
        }

        /// Detach every device with the given key.
        pub fn detach(&self, key: DeviceKey) {
            self.attached.lock().unwrap().retain(|d| d.key() != key);
        }

        /// Number of `devices()` snapshots taken so far.
        pub fn scans(&self) -> usize {
            self.scans.load(Ordering::SeqCst)
        }
    }

    impl UsbBus for MockBus {
        type Device = MockUsbDevice;

        fn devices(&self) -> std::io::Result<Vec<Arc<MockUsbDevice>>> {
            self.scans.fetch_add(1, Ordering::SeqCst);
            if self.fail_enumeration.load(Ordering::SeqCst) {
                return Err(std::io::Error::other("mock: enumeration failure injected"));
            }
            Ok(self.attached.lock().unwrap().clone())
        }
    }
}
