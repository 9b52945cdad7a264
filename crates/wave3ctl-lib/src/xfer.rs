//! Transfer descriptor — the unit of work carried across the privilege boundary.

use std::fmt;

use crate::protocol::{USB_DIR_IN, XFER_DATA_CAPACITY, XFER_WIRE_SIZE};

/// One control request plus its inline payload.
///
/// `length` is dual-purpose: on input the maximum number of payload bytes, on
/// output (device-to-host only) the number actually transferred.
#[derive(Clone, PartialEq, Eq)]
pub struct TransferDescriptor {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
    pub data: [u8; XFER_DATA_CAPACITY],
}

impl Default for TransferDescriptor {
    fn default() -> Self {
        TransferDescriptor {
            request_type: 0,
            request: 0,
            value: 0,
            index: 0,
            length: 0,
            data: [0; XFER_DATA_CAPACITY],
        }
    }
}

impl fmt::Debug for TransferDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Only the meaningful prefix of the payload.
        let shown = (self.length as usize).min(XFER_DATA_CAPACITY);
        f.debug_struct("TransferDescriptor")
            .field("request_type", &format_args!("0x{:02X}", self.request_type))
            .field("request", &format_args!("0x{:02X}", self.request))
            .field("value", &format_args!("0x{:04X}", self.value))
            .field("index", &format_args!("0x{:04X}", self.index))
            .field("length", &self.length)
            .field("data", &&self.data[..shown])
            .finish()
    }
}

impl TransferDescriptor {
    /// Descriptor for a device-to-host request reading up to `length` bytes.
    pub fn control_in(request_type: u8, request: u8, value: u16, index: u16, length: u16) -> Self {
        TransferDescriptor {
            request_type: request_type | USB_DIR_IN,
            request,
            value,
            index,
            length,
            ..Default::default()
        }
    }

    /// Descriptor for a host-to-device request carrying `payload`.
    ///
    /// Returns `None` if the payload does not fit the inline buffer.
    pub fn control_out(
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        payload: &[u8],
    ) -> Option<Self> {
        if payload.len() > XFER_DATA_CAPACITY {
            return None;
        }
        let mut data = [0u8; XFER_DATA_CAPACITY];
        data[..payload.len()].copy_from_slice(payload);
        Some(TransferDescriptor {
            request_type: request_type & !USB_DIR_IN,
            request,
            value,
            index,
            length: payload.len() as u16,
            data,
        })
    }

    /// Whether the direction bit selects device-to-host.
    pub fn is_in(&self) -> bool {
        self.request_type & USB_DIR_IN != 0
    }

    /// The payload prefix `data[0..length)`, clamped to the buffer capacity.
    pub fn payload(&self) -> &[u8] {
        &self.data[..(self.length as usize).min(XFER_DATA_CAPACITY)]
    }

    /// Serialize to the packed little-endian wire layout.
    pub fn to_wire(&self) -> [u8; XFER_WIRE_SIZE] {
        let mut buf = [0u8; XFER_WIRE_SIZE];
        buf[0] = self.request_type;
        buf[1] = self.request;
        buf[2..4].copy_from_slice(&self.value.to_le_bytes());
        buf[4..6].copy_from_slice(&self.index.to_le_bytes());
        buf[6..8].copy_from_slice(&self.length.to_le_bytes());
        buf[8..].copy_from_slice(&self.data);
        buf
    }

    /// Parse the packed little-endian wire layout.
    pub fn from_wire(buf: &[u8; XFER_WIRE_SIZE]) -> Self {
        let mut data = [0u8; XFER_DATA_CAPACITY];
        data.copy_from_slice(&buf[8..]);
        TransferDescriptor {
            request_type: buf[0],
            request: buf[1],
            value: u16::from_le_bytes([buf[2], buf[3]]),
            index: u16::from_le_bytes([buf[4], buf[5]]),
            length: u16::from_le_bytes([buf[6], buf[7]]),
            data,
        }
    }
}
