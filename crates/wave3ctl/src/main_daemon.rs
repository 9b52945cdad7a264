//! wave3ctld — privileged Wave:3 control-transfer proxy.
//!
//! Owns USB access to the device and serves fixed-size transfer frames to
//! unprivileged `wave3ctl` clients over a Unix socket.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;

use wave3ctl_lib::config::Config;
use wave3ctl_lib::device;
use wave3ctl_lib::proxy::TransferProxy;
use wave3ctl_lib::server::ProxyServer;

/// Shared shutdown flag — set by Ctrl+C / SIGTERM handler.
static RUNNING: AtomicBool = AtomicBool::new(true);

#[derive(Parser)]
#[command(
    name = "wave3ctld",
    version,
    about = "Privileged USB control-transfer proxy for the Elgato Wave:3"
)]
struct Args {
    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Use this config file instead of the default
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Listen on this socket (overrides config)
    #[arg(long, value_name = "PATH")]
    socket: Option<PathBuf>,

    /// Socket file mode in octal, e.g. 660 (overrides config)
    #[arg(long, value_name = "OCTAL", value_parser = parse_mode)]
    mode: Option<u32>,
}

fn parse_mode(s: &str) -> Result<u32, String> {
    let digits = s.trim_start_matches("0o");
    match u32::from_str_radix(digits, 8) {
        Ok(m) if m <= 0o777 => Ok(m),
        Ok(m) => Err(format!("mode {m:#o} has bits outside 0o777")),
        Err(e) => Err(format!("'{s}' is not an octal mode: {e}")),
    }
}

fn load_config(args: &Args) -> Config {
    let mut config = match &args.config {
        Some(p) => {
            let (config, warnings) = Config::load_from(p);
            for w in &warnings {
                log::warn!("{w}");
            }
            config
        }
        None => Config::load(),
    };
    if let Some(socket) = &args.socket {
        config.socket_path = socket.clone();
    }
    if let Some(mode) = args.mode {
        config.socket_mode = mode;
    }
    config
}

fn run(config: &Config) -> std::io::Result<()> {
    let proxy = TransferProxy::new(device::platform_bus(), config.device_id())
        .with_timeout(config.timeout())
        .with_serialized_transfers(config.serialize_transfers);
    let server = ProxyServer::bind(&config.socket_path, config.socket_mode, proxy)?;
    server.run(&RUNNING)
}

fn main() {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_target(false)
        .init();

    ctrlc::set_handler(move || {
        RUNNING.store(false, Ordering::SeqCst);
    })
    .ok();

    let config = load_config(&args);
    if let Err(errors) = config.validate() {
        for e in &errors {
            log::error!("{e}");
        }
        std::process::exit(2);
    }

    if let Err(e) = run(&config) {
        log::error!("{}: {e}", config.socket_path.display());
        std::process::exit(1);
    }
}
