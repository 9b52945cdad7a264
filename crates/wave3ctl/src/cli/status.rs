//! `status` subcommand — show mic and headphone state.

use wave3ctl_lib::transport::ControlTransport;

use super::{
    Ctx, DeviceStatusJson, Result, StatusOutput, Wave3, format_level, friendly_message, kv,
    kv_indent, kv_width, print_json,
};

fn collect_device_status<T: ControlTransport>(w: &Wave3<T>) -> DeviceStatusJson {
    DeviceStatusJson {
        state: w.snapshot(),
        hp_range: w.hp_range(),
        mic_range: w.mic_range(),
    }
}

fn or_unavailable(value: Option<String>) -> String {
    value.unwrap_or_else(|| "(unavailable)".into())
}

fn print_status(output: &StatusOutput, json: bool) -> Result<()> {
    if json {
        return print_json(output);
    }

    let w = kv_width(
        &["Version:", "Socket:", "Device:"],
        &["Mic:", "Mic gain:", "Headphone:", "HP volume:"],
    );
    kv("Version:", &output.version, w);
    kv("Socket:", &output.socket, w);
    println!();

    let Some(dev) = &output.device else {
        kv("Device:", "NOT CONNECTED", w);
        if let Some(err) = &output.error {
            for line in err.lines() {
                println!("  {line}");
            }
        }
        return Ok(());
    };

    let s = &dev.state;
    kv("Device:", "CONNECTED", w);
    kv_indent(
        "Mic:",
        or_unavailable(s.mic_muted.map(|m| if m { "MUTED" } else { "LIVE" }.to_string())),
        w,
    );
    kv_indent("Mic gain:", or_unavailable(s.mic_gain.as_ref().map(format_level)), w);
    kv_indent(
        "Headphone:",
        or_unavailable(s.hp_muted.map(|m| if m { "MUTED" } else { "ON" }.to_string())),
        w,
    );
    kv_indent("HP volume:", or_unavailable(s.volume.as_ref().map(format_level)), w);
    Ok(())
}

pub(super) fn cmd_status(ctx: &Ctx) -> Result<()> {
    let (device, error) = match ctx.connect() {
        Ok(w) => (Some(collect_device_status(&w)), None),
        Err(e) => {
            log::debug!("status: {e}");
            (None, Some(friendly_message(&e)))
        }
    };
    let output = StatusOutput {
        version: env!("CARGO_PKG_VERSION").to_string(),
        socket: ctx.socket.display().to_string(),
        device,
        error,
    };
    print_status(&output, ctx.json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wave3ctl_lib::device::mock::{MockBus, MockReply, MockUsbDevice};
    use wave3ctl_lib::locator::DeviceId;
    use wave3ctl_lib::protocol::{WAVE3_PID, WAVE3_VID};
    use wave3ctl_lib::proxy::TransferProxy;

    fn mock_controller() -> Wave3<TransferProxy<MockBus>> {
        let bus = MockBus::new();
        let dev = bus.attach(MockUsbDevice::new(WAVE3_VID, WAVE3_PID, 1, 1));
        dev.push_reply(MockReply::Data(vec![1]));
        Wave3::new(TransferProxy::new(bus, DeviceId::WAVE3)).unwrap()
    }

    fn output(device: Option<DeviceStatusJson>) -> StatusOutput {
        StatusOutput {
            version: "0.1.0".into(),
            socket: "/run/wave3ctl.sock".into(),
            device,
            error: None,
        }
    }

    #[test]
    fn collect_device_status_from_mock() {
        let status = collect_device_status(&mock_controller());
        // Unscripted replies are zero-filled.
        assert_eq!(status.state.mic_muted, Some(false));
        assert_eq!(status.state.volume.map(|l| l.raw), Some(0));
    }

    #[test]
    fn print_status_without_device_succeeds() {
        let mut out = output(None);
        out.error = Some("cannot reach wave3ctld\n  hint".into());
        assert!(print_status(&out, false).is_ok());
        assert!(print_status(&out, true).is_ok());
    }

    #[test]
    fn print_status_with_mock_device_succeeds() {
        let out = output(Some(collect_device_status(&mock_controller())));
        assert!(print_status(&out, false).is_ok());
        assert!(print_status(&out, true).is_ok());
    }
}
