//! Boundary framing — request and response frames on the proxy socket.
//!
//! Request:  `[command: u32 LE][descriptor: 72]`
//! Response: `[status: i32 LE][descriptor: 72]`

use std::io::{self, Read};

use crate::protocol::{REQUEST_FRAME_SIZE, RESPONSE_FRAME_SIZE, XFER_WIRE_SIZE};
use crate::xfer::TransferDescriptor;

/// Outcome of reading one fixed-size frame.
#[derive(Debug)]
pub enum FrameRead<const N: usize> {
    /// A complete frame.
    Frame([u8; N]),
    /// The peer closed the stream, or went idle, before sending any byte of a frame.
    Closed,
    /// The peer closed the stream, or stalled past the read timeout, after `got` bytes.
    Truncated { got: usize },
}

fn timed_out(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

/// Read exactly one `N`-byte frame, distinguishing clean close from truncation.
///
/// A read timeout on the stream counts as the peer going away.
pub fn read_frame<const N: usize>(r: &mut impl Read) -> io::Result<FrameRead<N>> {
    let mut buf = [0u8; N];
    let mut got = 0;
    while got < N {
        match r.read(&mut buf[got..]) {
            Ok(0) if got == 0 => return Ok(FrameRead::Closed),
            Ok(0) => return Ok(FrameRead::Truncated { got }),
            Ok(n) => got += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if timed_out(&e) && got == 0 => return Ok(FrameRead::Closed),
            Err(e) if timed_out(&e) => return Ok(FrameRead::Truncated { got }),
            Err(e) => return Err(e),
        }
    }
    Ok(FrameRead::Frame(buf))
}

fn split_descriptor(frame: &[u8]) -> TransferDescriptor {
    let mut wire = [0u8; XFER_WIRE_SIZE];
    wire.copy_from_slice(&frame[4..4 + XFER_WIRE_SIZE]);
    TransferDescriptor::from_wire(&wire)
}

pub fn encode_request(command: u32, desc: &TransferDescriptor) -> [u8; REQUEST_FRAME_SIZE] {
    let mut frame = [0u8; REQUEST_FRAME_SIZE];
    frame[..4].copy_from_slice(&command.to_le_bytes());
    frame[4..].copy_from_slice(&desc.to_wire());
    frame
}

pub fn decode_request(frame: &[u8; REQUEST_FRAME_SIZE]) -> (u32, TransferDescriptor) {
    let command = u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
    (command, split_descriptor(frame))
}

pub fn encode_response(status: i32, desc: &TransferDescriptor) -> [u8; RESPONSE_FRAME_SIZE] {
    let mut frame = [0u8; RESPONSE_FRAME_SIZE];
    frame[..4].copy_from_slice(&status.to_le_bytes());
    frame[4..].copy_from_slice(&desc.to_wire());
    frame
}

pub fn decode_response(frame: &[u8; RESPONSE_FRAME_SIZE]) -> (i32, TransferDescriptor) {
    let status = i32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
    (status, split_descriptor(frame))
}
