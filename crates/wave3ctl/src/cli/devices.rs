//! `devices` subcommand — list attached Wave:3 devices from the USB registry.
//!
//! Enumeration needs no daemon and no device access rights.

use wave3ctl_lib::device::{self, UsbBus};
use wave3ctl_lib::locator::{self, DeviceId};

use super::{Ctx, DevicesOutput, Result, print_json};

fn collect(bus: &impl UsbBus, target: DeviceId) -> DevicesOutput {
    let devices = locator::enumerate_matching(bus, target);
    DevicesOutput {
        target: target.to_string(),
        count: devices.len(),
        devices,
    }
}

fn print_devices(output: &DevicesOutput, json: bool) -> Result<()> {
    if json {
        return print_json(output);
    }

    if output.devices.is_empty() {
        println!("No Wave:3 devices found ({}).", output.target);
        return Ok(());
    }

    println!(
        "Found {} device{} matching {}:",
        output.count,
        if output.count == 1 { "" } else { "s" },
        output.target
    );
    println!();
    for (i, dev) in output.devices.iter().enumerate() {
        println!(
            "  [{}] {}  {}",
            i + 1,
            dev.path,
            dev.product.as_deref().unwrap_or("(unnamed)")
        );
        if let Some(serial) = &dev.serial {
            println!("      Serial: {serial}");
        }
    }
    Ok(())
}

pub(super) fn cmd_devices(ctx: &Ctx) -> Result<()> {
    let output = collect(&device::platform_bus(), ctx.config.device_id());
    print_devices(&output, ctx.json)
}
