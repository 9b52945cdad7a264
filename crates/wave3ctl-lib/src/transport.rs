//! Control transport — "issue one control request" as seen by the caller side.

use crate::device::UsbBus;
use crate::error::{Result, Wave3Error};
use crate::protocol::XFER_DATA_CAPACITY;
use crate::proxy::{ProxyError, TransferProxy};
use crate::xfer::TransferDescriptor;

/// Data phase of a control request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Device-to-host: read up to this many bytes.
    In(u16),
    /// Host-to-device: send these bytes.
    Out(Vec<u8>),
}

impl Payload {
    /// Build the descriptor for this request.
    ///
    /// An outbound payload larger than the inline buffer is `InvalidArgument`.
    pub fn descriptor(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
    ) -> Result<TransferDescriptor> {
        match self {
            Payload::In(len) => Ok(TransferDescriptor::control_in(
                request_type,
                request,
                value,
                index,
                *len,
            )),
            Payload::Out(bytes) => {
                TransferDescriptor::control_out(request_type, request, value, index, bytes)
                    .ok_or_else(|| {
                        log::debug!(
                            "payload of {} bytes exceeds {XFER_DATA_CAPACITY}",
                            bytes.len()
                        );
                        Wave3Error::Proxy(ProxyError::InvalidArgument)
                    })
            }
        }
    }
}

/// Something that can carry one control request to the Wave:3.
pub trait ControlTransport {
    /// Issue a control request. Returns the inbound bytes for [`Payload::In`]
    /// and an empty vector for [`Payload::Out`].
    fn ctrl_transfer(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        payload: Payload,
    ) -> Result<Vec<u8>>;
}

/// In-process transport: call the proxy directly (no privilege boundary).
impl<B: UsbBus> ControlTransport for TransferProxy<B> {
    fn ctrl_transfer(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        payload: Payload,
    ) -> Result<Vec<u8>> {
        let desc = payload.descriptor(request_type, request, value, index)?;
        let out = self.execute(desc)?;
        Ok(match payload {
            Payload::In(_) => out.payload().to_vec(),
            Payload::Out(_) => Vec::new(),
        })
    }
}
