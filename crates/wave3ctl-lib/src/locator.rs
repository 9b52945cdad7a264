//! Device locator — find the target device on the bus.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::device::{DiscoveredDevice, UsbBus, UsbDevice};
use crate::protocol::{WAVE3_PID, WAVE3_VID};

/// Vendor/product pair identifying one peripheral model (host byte order).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceId {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl DeviceId {
    pub const WAVE3: DeviceId = DeviceId {
        vendor_id: WAVE3_VID,
        product_id: WAVE3_PID,
    };

    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        DeviceId {
            vendor_id,
            product_id,
        }
    }

    /// Whether `dev` reports these identifiers.
    pub fn matches(&self, dev: &impl UsbDevice) -> bool {
        u16::from_le(dev.id_vendor_raw()) == self.vendor_id
            && u16::from_le(dev.id_product_raw()) == self.product_id
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

/// A held reference to one matched device.
///
/// Acquired by [`find`]; the reference is released when the guard drops.
pub struct DeviceRef<D: UsbDevice> {
    dev: Arc<D>,
}

impl<D: UsbDevice> DeviceRef<D> {
    /// Whether both guards refer to the same device object.
    pub fn same_device(&self, other: &DeviceRef<D>) -> bool {
        Arc::ptr_eq(&self.dev, &other.dev)
    }
}

impl<D: UsbDevice> Deref for DeviceRef<D> {
    type Target = D;

    fn deref(&self) -> &D {
        &self.dev
    }
}

impl<D: UsbDevice> Drop for DeviceRef<D> {
    fn drop(&mut self) {
        log::trace!("released {}", self.dev.key());
    }
}

/// First device in `devices` matching `target`. Later matches are never examined.
pub fn find_in<D: UsbDevice>(
    devices: impl IntoIterator<Item = Arc<D>>,
    target: DeviceId,
) -> Option<DeviceRef<D>> {
    let dev = devices.into_iter().find(|d| target.matches(&**d))?;
    log::trace!("acquired {} ({target})", dev.key());
    Some(DeviceRef { dev })
}

/// Scan the bus for `target`.
///
/// Absence is `None`, including when the registry cannot be enumerated.
pub fn find<B: UsbBus>(bus: &B, target: DeviceId) -> Option<DeviceRef<B::Device>> {
    match bus.devices() {
        Ok(devices) => find_in(devices, target),
        Err(e) => {
            log::warn!("USB enumeration failed: {e}");
            None
        }
    }
}

/// Every attached device matching `target`, for listing.
pub fn enumerate_matching<B: UsbBus>(bus: &B, target: DeviceId) -> Vec<DiscoveredDevice> {
    let Ok(devices) = bus.devices() else {
        return Vec::new();
    };
    devices
        .into_iter()
        .filter(|d| target.matches(&**d))
        .map(|d| DiscoveredDevice {
            path: d.key().to_string(),
            vendor_id: target.vendor_id,
            product_id: target.product_id,
            product: d.product_string(),
            serial: d.serial_number(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock::{MockBus, MockUsbDevice};

    #[test]
    fn finds_matching_device() {
        let bus = MockBus::new();
        bus.attach(MockUsbDevice::new(0x046d, 0xc52b, 1, 2));
        let wave = bus.attach(MockUsbDevice::new(WAVE3_VID, WAVE3_PID, 1, 5));
        let found = find(&bus, DeviceId::WAVE3).unwrap();
        assert_eq!(found.key(), wave.key());
    }

    #[test]
    fn empty_bus_is_not_found() {
        let bus = MockBus::new();
        assert!(find(&bus, DeviceId::WAVE3).is_none());
    }

    #[test]
    fn no_match_is_not_found() {
        let bus = MockBus::new();
        bus.attach(MockUsbDevice::new(WAVE3_VID, 0x0071, 1, 2));
        bus.attach(MockUsbDevice::new(0x0fda, WAVE3_PID, 1, 3));
        assert!(find(&bus, DeviceId::WAVE3).is_none());
    }

    #[test]
    fn first_match_wins() {
        let bus = MockBus::new();
        let first = bus.attach(MockUsbDevice::new(WAVE3_VID, WAVE3_PID, 1, 7));
        bus.attach(MockUsbDevice::new(WAVE3_VID, WAVE3_PID, 2, 3));
        let found = find(&bus, DeviceId::WAVE3).unwrap();
        assert_eq!(found.key(), first.key());
    }

    #[test]
    fn repeated_lookups_return_same_device() {
        let bus = MockBus::new();
        bus.attach(MockUsbDevice::new(WAVE3_VID, WAVE3_PID, 1, 2));
        let a = find(&bus, DeviceId::WAVE3).unwrap();
        let b = find(&bus, DeviceId::WAVE3).unwrap();
        assert!(a.same_device(&b));
    }

    #[test]
    fn reference_is_released_on_drop() {
        let bus = MockBus::new();
        let dev = bus.attach(MockUsbDevice::new(WAVE3_VID, WAVE3_PID, 1, 2));
        let baseline = Arc::strong_count(&dev);
        let found = find(&bus, DeviceId::WAVE3).unwrap();
        assert_eq!(Arc::strong_count(&dev), baseline + 1);
        drop(found);
        assert_eq!(Arc::strong_count(&dev), baseline);
    }

    #[test]
    fn miss_holds_no_reference() {
        let bus = MockBus::new();
        let other = bus.attach(MockUsbDevice::new(0x1234, 0x5678, 1, 2));
        let baseline = Arc::strong_count(&other);
        assert!(find(&bus, DeviceId::WAVE3).is_none());
        assert_eq!(Arc::strong_count(&other), baseline);
    }

    #[test]
    fn enumeration_failure_is_not_found() {
        let bus = MockBus::new();
        bus.attach(MockUsbDevice::new(WAVE3_VID, WAVE3_PID, 1, 2));
        bus.fail_enumeration
            .store(true, std::sync::atomic::Ordering::SeqCst);
        assert!(find(&bus, DeviceId::WAVE3).is_none());
    }

    #[test]
    fn find_in_pure_snapshot() {
        let devices = vec![
            Arc::new(MockUsbDevice::new(1, 1, 1, 1)),
            Arc::new(MockUsbDevice::new(2, 2, 1, 2)),
        ];
        let found = find_in(devices, DeviceId::new(2, 2)).unwrap();
        assert_eq!(found.key().address, 2);
    }

    #[test]
    fn enumerate_matching_lists_only_target() {
        let bus = MockBus::new();
        bus.attach(MockUsbDevice::new(WAVE3_VID, WAVE3_PID, 1, 2));
        bus.attach(MockUsbDevice::new(0x1234, 0x5678, 1, 3));
        bus.attach(MockUsbDevice::new(WAVE3_VID, WAVE3_PID, 3, 9));
        let listed = enumerate_matching(&bus, DeviceId::WAVE3);
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].path, "usb:001/002");
        assert_eq!(listed[1].serial.as_deref(), Some("MOCK009"));
    }

    #[test]
    fn device_id_display() {
        assert_eq!(DeviceId::WAVE3.to_string(), "0fd9:0070");
    }
}
