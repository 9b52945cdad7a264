//! `mute` subcommand — set or toggle the microphone mute.

use wave3ctl_lib::transport::ControlTransport;

use super::{Ctx, Result, Wave3};

/// Apply `target` (or toggle when `None`). Returns the resulting state.
fn apply_mute<T: ControlTransport>(w: &Wave3<T>, target: Option<bool>) -> Result<bool> {
    match target {
        Some(muted) => {
            w.set_mic_mute(muted)?;
            Ok(muted)
        }
        None => w.toggle_mic_mute(),
    }
}

pub(super) fn cmd_mute(ctx: &Ctx, target: Option<bool>) -> Result<()> {
    let w = ctx.connect()?;
    let muted = apply_mute(&w, target)?;
    println!("Mic: {}", if muted { "MUTED" } else { "LIVE" });
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

    fn setup() -> (Wave3<TransferProxy<MockBus>>, Arc<MockUsbDevice>) {
        let bus = MockBus::new();
        let dev = bus.attach(MockUsbDevice::new(WAVE3_VID, WAVE3_PID, 1, 1));
        let w = Wave3::new(TransferProxy::new(bus, DeviceId::WAVE3)).unwrap();
        (w, dev)
    }

    #[test]
    fn explicit_state_is_written_without_read() {
        let (w, dev) = setup();
        let before = dev.transfer_count();
        assert!(apply_mute(&w, Some(true)).unwrap());
        let t = dev.transfers();
        assert_eq!(t.len(), before + 1);
        assert_eq!(t[before].setup.request, UAC_SET_CUR);
        assert_eq!(t[before].buffer, vec![1]);
    }

    #[test]
    fn toggle_reads_then_writes() {
        let (w, dev) = setup();
        dev.push_reply(MockReply::Data(vec![1]));
        assert!(!apply_mute(&w, None).unwrap());
        let last = dev.transfers().pop().unwrap();
        assert_eq!(last.buffer, vec![0]);
    }
}
