//! `monitor` subcommand — print control changes as they happen.

use std::sync::atomic::Ordering;

use wave3ctl_lib::hooks;
use wave3ctl_lib::monitor::{Change, StateTracker};
use wave3ctl_lib::reconnect::{self, ReconnectState};
use wave3ctl_lib::transport::ControlTransport;

use super::{Ctx, RUNNING, Result, Wave3, Wave3State, format_level};

/// State for the `monitor` loop.
struct MonitorCtx<T: ControlTransport> {
    device: Option<Wave3<T>>,
    tracker: StateTracker,
    reconnect: ReconnectState,
}

impl<T: ControlTransport> MonitorCtx<T> {
    fn new(device: Wave3<T>) -> Self {
        let tracker = StateTracker::new(device.snapshot());
        MonitorCtx {
            device: Some(device),
            tracker,
            reconnect: ReconnectState::with_defaults(),
        }
    }

    /// One poll cycle: reconnect if needed, read, diff.
    fn step(&mut self, connect: impl FnOnce() -> Result<Wave3<T>>) -> Vec<Change> {
        let Some(dev) = &self.device else {
            if let Some(dev) = reconnect::try_reconnect(&mut self.reconnect, connect) {
                println!("[device] reconnected");
                // Changes while disconnected are reported against the old baseline.
                let changes = self.tracker.update(dev.snapshot());
                self.device = Some(dev);
                return changes;
            }
            return Vec::new();
        };
        match dev.poll() {
            Ok(state) => self.tracker.update(state),
            Err(e) => {
                log::warn!("[device] {e}; will attempt reconnection...");
                println!("[device] disconnected");
                self.device = None;
                Vec::new()
            }
        }
    }
}

fn describe(change: &Change) -> String {
    match change {
        Change::MicMute(m) => format!("Mic    -> {}", if *m { "MUTED" } else { "LIVE" }),
        Change::HpMute(m) => format!("HP     -> {}", if *m { "MUTED" } else { "ON" }),
        Change::Volume(l) => format!("Volume -> {}", format_level(l)),
        Change::Gain(l) => format!("Gain   -> {}", format_level(l)),
    }
}

fn print_initial(state: &Wave3State) {
    println!("Current state:");
    if let Some(m) = state.mic_muted {
        println!("  Mic:    {}", if m { "MUTED" } else { "LIVE" });
    }
    if let Some(g) = &state.mic_gain {
        println!("  Gain:   {}", format_level(g));
    }
    if let Some(m) = state.hp_muted {
        println!("  HP:     {}", if m { "MUTED" } else { "ON" });
    }
    if let Some(v) = &state.volume {
        println!("  Volume: {}", format_level(v));
    }
    println!();
}

pub(super) fn cmd_monitor(ctx: &Ctx) -> Result<()> {
    let mut mctx = MonitorCtx::new(ctx.connect()?);
    let interval = ctx.config.poll_interval();

    println!("Monitoring Wave:3 — Ctrl+C to stop");
    println!();
    print_initial(mctx.tracker.current());

    while RUNNING.load(Ordering::SeqCst) {
        std::thread::sleep(interval);
        for change in mctx.step(|| ctx.connect()) {
            println!("  {}", describe(&change));
            hooks::run_action_hook(change.action(), &ctx.config);
        }
    }

    println!();
    println!("Stopped.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use wave3ctl_lib::device::UsbDevice;
    use wave3ctl_lib::device::mock::{MockBus, MockReply, MockUsbDevice};
    use wave3ctl_lib::error::Wave3Error;
    use wave3ctl_lib::locator::DeviceId;
    use wave3ctl_lib::protocol::*;
    use wave3ctl_lib::proxy::{ProxyError, TransferProxy};
    use wave3ctl_lib::wave3::{Level, VolumeRange};

    type MockWave3 = Wave3<TransferProxy<MockBus>>;

    fn controller() -> (MockWave3, Arc<MockUsbDevice>) {
        let bus = MockBus::new();
        let dev = bus.attach(MockUsbDevice::new(WAVE3_VID, WAVE3_PID, 1, 1));
        (Wave3::new(TransferProxy::new(bus, DeviceId::WAVE3)).unwrap(), dev)
    }

    fn never() -> Result<MockWave3> {
        panic!("connect must not be called while the device is present")
    }

    #[test]
    fn mute_change_is_reported() {
        let (w, dev) = controller();
        let mut mctx = MonitorCtx::new(w);
        assert!(mctx.step(never).is_empty());

        dev.push_reply(MockReply::Data(vec![1]));
        assert_eq!(mctx.step(never), vec![Change::MicMute(true)]);
    }

    #[test]
    fn disconnect_then_reconnect() {
        let (w, dev) = controller();
        let mut mctx = MonitorCtx::new(w);
        mctx.device
            .as_ref()
            .unwrap()
            .transport()
            .bus()
            .detach(dev.key());

        assert!(mctx.step(never).is_empty());
        assert!(mctx.device.is_none());

        // First retry fails and starts the backoff.
        let none = mctx.step(|| Err(Wave3Error::Proxy(ProxyError::DeviceNotFound)));
        assert!(none.is_empty());
        assert_eq!(mctx.reconnect.consecutive_failures(), 1);
        assert!(mctx.device.is_none());
    }

    #[test]
    fn reconnect_reports_changes_since_disconnect() {
        let (w, dev) = controller();
        let mut mctx = MonitorCtx::new(w);
        mctx.device
            .as_ref()
            .unwrap()
            .transport()
            .bus()
            .detach(dev.key());
        mctx.step(never);

        let (fresh, fresh_dev) = controller();
        fresh_dev.push_reply(MockReply::Data(vec![1]));
        let changes = mctx.step(|| Ok(fresh));
        assert_eq!(changes, vec![Change::MicMute(true)]);
        assert!(mctx.device.is_some());
    }

    #[test]
    fn describe_lines() {
        let range = VolumeRange {
            min: -0x4000,
            max: 0,
            res: 1,
        };
        assert_eq!(describe(&Change::MicMute(true)), "Mic    -> MUTED");
        assert_eq!(describe(&Change::HpMute(false)), "HP     -> ON");
        assert_eq!(
            describe(&Change::Gain(Level::from_raw(-0x2000, &range))),
            "Gain   -> 50% (-32.0 dB)"
        );
    }
}
