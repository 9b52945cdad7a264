//! `discover` subcommand — list the Feature Units and their volume ranges.

use wave3ctl_lib::protocol::{FU_MUTE, FU_VOLUME, HP_FEATURE_UNIT, MIC_FEATURE_UNIT};
use wave3ctl_lib::transport::ControlTransport;
use wave3ctl_lib::wave3::raw_to_db;

use super::{Ctx, Level, Result, VolumeRange, Wave3, format_level, kv_indent, kv_width};

struct UnitReport {
    label: &'static str,
    muted: Option<bool>,
    level: Option<Level>,
    range: VolumeRange,
}

fn read_unit<T: ControlTransport>(
    w: &Wave3<T>,
    label: &'static str,
    entity: u8,
    range: VolumeRange,
) -> UnitReport {
    let muted = w
        .get_cur(entity, FU_MUTE, 1)
        .ok()
        .and_then(|d| d.first().map(|&b| b != 0));
    let level = w
        .get_cur(entity, FU_VOLUME, 2)
        .ok()
        .and_then(|d| match d[..] {
            [lo, hi, ..] => Some(Level::from_raw(i16::from_le_bytes([lo, hi]), &range)),
            _ => None,
        });
    UnitReport {
        label,
        muted,
        level,
        range,
    }
}

fn collect<T: ControlTransport>(w: &Wave3<T>) -> [UnitReport; 2] {
    [
        read_unit(w, "Headphone (unit 5)", HP_FEATURE_UNIT, w.hp_range()),
        read_unit(w, "Microphone (unit 6)", MIC_FEATURE_UNIT, w.mic_range()),
    ]
}

fn print_units(units: &[UnitReport]) {
    let w = kv_width(&[], &["Mute:", "Volume:", "Range:"]);
    for unit in units {
        println!("{}:", unit.label);
        match unit.muted {
            Some(m) => kv_indent("Mute:", if m { "ON" } else { "OFF" }, w),
            None => kv_indent("Mute:", "(unavailable)", w),
        }
        match &unit.level {
            Some(level) => {
                kv_indent("Volume:", format_level(level), w);
                kv_indent(
                    "Range:",
                    format_args!(
                        "{:.1} .. {:.1} dB  (step {:.2} dB)",
                        raw_to_db(unit.range.min),
                        raw_to_db(unit.range.max),
                        raw_to_db(unit.range.res)
                    ),
                    w,
                );
            }
            None => kv_indent("Volume:", "(unavailable)", w),
        }
        println!();
    }
}

pub(super) fn cmd_discover(ctx: &Ctx) -> Result<()> {
    let w = ctx.connect()?;
    println!("Elgato Wave:3 — USB Audio Class Feature Units");
    println!();
    print_units(&collect(&w));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wave3ctl_lib::device::mock::{MockBus, MockReply, MockUsbDevice};
    use wave3ctl_lib::locator::DeviceId;
    use wave3ctl_lib::protocol::*;
    use wave3ctl_lib::proxy::TransferProxy;

    #[test]
    fn unavailable_controls_are_none() {
        let bus = MockBus::new();
        let dev = bus.attach(MockUsbDevice::new(WAVE3_VID, WAVE3_PID, 1, 1));
        let w = Wave3::new(TransferProxy::new(bus, DeviceId::WAVE3)).unwrap();

        dev.push_reply(MockReply::Status(STATUS_EPIPE)); // hp mute
        dev.push_reply(MockReply::Data(vec![0x00, 0xF0])); // hp volume
        dev.push_reply(MockReply::Data(vec![1])); // mic mute
        dev.push_reply(MockReply::Data(vec![0x01])); // mic volume, short
        let [hp, mic] = collect(&w);

        assert_eq!(hp.muted, None);
        assert_eq!(hp.level.map(|l| l.raw), Some(-0x1000));
        assert_eq!(mic.muted, Some(true));
        assert!(mic.level.is_none());
        print_units(&[hp, mic]);
    }
}
