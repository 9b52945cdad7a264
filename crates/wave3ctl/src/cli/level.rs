//! `volume` / `gain` subcommands — read or set a level in percent.

use wave3ctl_lib::transport::ControlTransport;

use super::{Ctx, Level, Result, Wave3, format_level};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Control {
    /// Headphone volume (unit 5).
    Volume,
    /// Microphone gain (unit 6).
    Gain,
}

impl Control {
    fn label(self) -> &'static str {
        match self {
            Control::Volume => "Volume",
            Control::Gain => "Gain",
        }
    }

    fn read<T: ControlTransport>(self, w: &Wave3<T>) -> Result<Level> {
        match self {
            Control::Volume => w.volume(),
            Control::Gain => w.mic_gain(),
        }
    }

    fn write<T: ControlTransport>(self, w: &Wave3<T>, pct: u8) -> Result<()> {
        match self {
            Control::Volume => w.set_volume_pct(pct),
            Control::Gain => w.set_mic_gain_pct(pct),
        }
    }
}

/// Set when `pct` is given, otherwise read. Returns the line to print.
fn run_level<T: ControlTransport>(w: &Wave3<T>, control: Control, pct: Option<u8>) -> Result<String> {
    match pct {
        Some(pct) => {
            control.write(w, pct)?;
            Ok(format!("{} -> {pct}%", control.label()))
        }
        None => {
            let level = control.read(w)?;
            Ok(format!("{}: {}", control.label(), format_level(&level)))
        }
    }
}

pub(super) fn cmd_level(ctx: &Ctx, control: Control, pct: Option<u8>) -> Result<()> {
    let w = ctx.connect()?;
    println!("{}", run_level(&w, control, pct)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use wave3ctl_lib::device::mock::{MockBus, MockReply, MockUsbDevice};
    use wave3ctl_lib::locator::DeviceId;
    use wave3ctl_lib::protocol::*;
    use wave3ctl_lib::proxy::TransferProxy;

    /// Both units report a -64..0 dB range.
    fn setup() -> (Wave3<TransferProxy<MockBus>>, Arc<MockUsbDevice>) {
        let bus = MockBus::new();
        let dev = bus.attach(MockUsbDevice::new(WAVE3_VID, WAVE3_PID, 1, 1));
        dev.push_reply(MockReply::Data(vec![0]));
        for _ in 0..2 {
            dev.push_reply(MockReply::Data((-0x4000i16).to_le_bytes().to_vec()));
            dev.push_reply(MockReply::Data(vec![0, 0]));
            dev.push_reply(MockReply::Data(vec![0x80, 0]));
        }
        let w = Wave3::new(TransferProxy::new(bus, DeviceId::WAVE3)).unwrap();
        (w, dev)
    }

    #[test]
    fn read_volume() {
        let (w, dev) = setup();
        dev.push_reply(MockReply::Data((-0x1000i16).to_le_bytes().to_vec()));
        assert_eq!(
            run_level(&w, Control::Volume, None).unwrap(),
            "Volume: 75% (-16.0 dB)"
        );
        assert_eq!(dev.transfers().pop().unwrap().setup.index, 0x0500);
    }

    #[test]
    fn set_gain() {
        let (w, dev) = setup();
        assert_eq!(run_level(&w, Control::Gain, Some(25)).unwrap(), "Gain -> 25%");
        let last = dev.transfers().pop().unwrap();
        assert_eq!(last.setup.index, 0x0600);
        assert_eq!(last.buffer, (-0x3000i16).to_le_bytes().to_vec());
    }

    #[test]
    fn read_failure_propagates() {
        let (w, dev) = setup();
        dev.push_reply(MockReply::Status(STATUS_EPIPE));
        assert!(run_level(&w, Control::Gain, None).is_err());
    }
}
