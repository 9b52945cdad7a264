//! Protocol constants for the Elgato Wave:3 control proxy.
//!
//! Two groups live here: the proxy's own boundary constants (descriptor
//! capacity, wire sizes, command word, status codes) and the USB Audio Class
//! 1.0 request values the controller sends through it. The Feature Unit
//! entity IDs were taken from USB captures of the vendor software.

// ── Target device ──

/// Elgato Systems vendor ID.
pub const WAVE3_VID: u16 = 0x0fd9;

/// Wave:3 product ID.
pub const WAVE3_PID: u16 = 0x0070;

// ── Transfer descriptor ──

/// Capacity of the descriptor's inline data buffer (bytes).
pub const XFER_DATA_CAPACITY: usize = 64;

/// Packed descriptor size on the wire: `u8 u8 u16 u16 u16 [u8; 64]`.
pub const XFER_WIRE_SIZE: usize = 8 + XFER_DATA_CAPACITY;

/// Default control-transfer timeout (ms).
pub const USB_TIMEOUT_MS: u64 = 1000;

/// Direction bit of `bmRequestType`: set = device-to-host.
pub const USB_DIR_IN: u8 = 0x80;

/// `bmRequestType` bits 6..5: request type.
pub const USB_TYPE_MASK: u8 = 0x60;

/// `bmRequestType` bits 4..0: recipient.
pub const USB_RECIP_MASK: u8 = 0x1f;

// ── Boundary framing ──

/// The single supported boundary command, laid out like `_IOWR('W', 0, xfer)`.
pub const WAVE3_CTL: u32 = (3 << 30) | ((XFER_WIRE_SIZE as u32) << 16) | ((b'W' as u32) << 8);

/// Request frame: `[command: u32][descriptor: 72]`.
pub const REQUEST_FRAME_SIZE: usize = 4 + XFER_WIRE_SIZE;

/// Response frame: `[status: i32][descriptor: 72]`.
pub const RESPONSE_FRAME_SIZE: usize = 4 + XFER_WIRE_SIZE;

/// Default socket path of the privileged daemon.
pub const DEFAULT_SOCKET_PATH: &str = "/run/wave3ctl.sock";

/// Default socket file mode (world read/write, like a misc device node).
pub const DEFAULT_SOCKET_MODE: u32 = 0o666;

// ── Boundary status codes (negated errno values) ──

pub const STATUS_OK: i32 = 0;
pub const STATUS_ENODEV: i32 = -19;
pub const STATUS_ENOMEM: i32 = -12;
pub const STATUS_EFAULT: i32 = -14;
pub const STATUS_EINVAL: i32 = -22;
pub const STATUS_ENOTTY: i32 = -25;

/// Status codes the USB backend reports for transport failures.
pub const STATUS_EIO: i32 = -5;
/// usbfs could not claim the request's interface (a kernel driver holds it).
pub const STATUS_EBUSY: i32 = -16;
pub const STATUS_EPIPE: i32 = -32;
pub const STATUS_EPROTO: i32 = -71;
pub const STATUS_EOPNOTSUPP: i32 = -95;
pub const STATUS_ETIMEDOUT: i32 = -110;

// ── USB Audio Class 1.0 ──

pub const UAC_SET_CUR: u8 = 0x01;
pub const UAC_GET_CUR: u8 = 0x81;
pub const UAC_GET_MIN: u8 = 0x82;
pub const UAC_GET_MAX: u8 = 0x83;
pub const UAC_GET_RES: u8 = 0x84;

/// IN | Class | Interface.
pub const BM_REQUEST_IN: u8 = 0xA1;

/// OUT | Class | Interface.
pub const BM_REQUEST_OUT: u8 = 0x21;

/// Feature Unit control selector: mute (1 byte).
pub const FU_MUTE: u8 = 0x01;

/// Feature Unit control selector: volume (2 bytes, signed 1/256 dB).
pub const FU_VOLUME: u8 = 0x02;

/// Headphone output Feature Unit.
pub const HP_FEATURE_UNIT: u8 = 5;

/// Microphone input Feature Unit.
pub const MIC_FEATURE_UNIT: u8 = 6;

/// AudioControl interface number.
pub const AC_INTERFACE: u8 = 0;

/// Build `wValue` for a Feature Unit request.
pub fn fu_value(selector: u8, channel: u8) -> u16 {
    ((selector as u16) << 8) | channel as u16
}

/// Build `wIndex` for a Feature Unit request.
pub fn fu_index(entity: u8) -> u16 {
    ((entity as u16) << 8) | AC_INTERFACE as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_word_matches_iowr_layout() {
        assert_eq!(WAVE3_CTL, 0xC048_5700);
    }

    #[test]
    fn wire_size_is_72() {
        assert_eq!(XFER_WIRE_SIZE, 72);
    }

    #[test]
    fn request_types_share_class_interface_bits() {
        assert_eq!(BM_REQUEST_IN & !USB_DIR_IN, BM_REQUEST_OUT);
        assert_ne!(BM_REQUEST_IN & USB_DIR_IN, 0);
        assert_eq!(BM_REQUEST_OUT & USB_DIR_IN, 0);
    }

    #[test]
    fn feature_unit_addressing() {
        assert_eq!(fu_value(FU_VOLUME, 0), 0x0200);
        assert_eq!(fu_value(FU_MUTE, 1), 0x0101);
        assert_eq!(fu_index(MIC_FEATURE_UNIT), 0x0600);
        assert_eq!(fu_index(HP_FEATURE_UNIT), 0x0500);
    }
}
