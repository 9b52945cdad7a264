//! Proxy client — the unprivileged side of the boundary socket.

use std::cell::RefCell;
use std::io::Write;
use std::os::unix::net::UnixStream;
use std::path::Path;

use crate::error::{Result, Wave3Error};
use crate::frame::{self, FrameRead};
use crate::protocol::{RESPONSE_FRAME_SIZE, STATUS_OK, WAVE3_CTL};
use crate::proxy::ProxyError;
use crate::transport::{ControlTransport, Payload};
use crate::xfer::TransferDescriptor;

/// Connection to a running `wave3ctld`.
///
/// One request is in flight at a time; the stream is reused across requests.
pub struct ProxyClient {
    stream: RefCell<UnixStream>,
}

impl ProxyClient {
    pub fn connect(path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(path)?;
        log::debug!("connected to {}", path.display());
        Ok(Self::from_stream(stream))
    }

    pub fn from_stream(stream: UnixStream) -> Self {
        ProxyClient {
            stream: RefCell::new(stream),
        }
    }

    /// Send one descriptor and wait for the daemon's answer.
    ///
    /// Returns the descriptor as updated by the daemon, or the decoded error.
    pub fn exchange(&self, desc: &TransferDescriptor) -> Result<TransferDescriptor> {
        let mut stream = self.stream.borrow_mut();
        stream.write_all(&frame::encode_request(WAVE3_CTL, desc))?;
        stream.flush()?;

        let (status, out) = match frame::read_frame::<RESPONSE_FRAME_SIZE>(&mut *stream)? {
            FrameRead::Frame(buf) => frame::decode_response(&buf),
            FrameRead::Closed => {
                return Err(Wave3Error::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "daemon closed the connection",
                )));
            }
            FrameRead::Truncated { got } => {
                return Err(Wave3Error::Protocol(format!(
                    "response truncated at {got} of {RESPONSE_FRAME_SIZE} bytes"
                )));
            }
        };
        if status != STATUS_OK {
            return Err(ProxyError::from_status(status).into());
        }
        Ok(out)
    }
}

impl ControlTransport for ProxyClient {
    fn ctrl_transfer(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        payload: Payload,
    ) -> Result<Vec<u8>> {
        let desc = payload.descriptor(request_type, request, value, index)?;
        let out = self.exchange(&desc)?;
        Ok(match payload {
            Payload::In(_) => out.payload().to_vec(),
            Payload::Out(_) => Vec::new(),
        })
    }
}
