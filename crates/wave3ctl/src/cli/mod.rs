//! CLI subcommands — device status, mute and level control, monitoring.

mod config_cmd;
mod devices;
mod discover;
mod level;
mod monitor;
mod mute;
mod status;

use std::io;
use std::path::{Path, PathBuf};

use clap::Subcommand;
use serde::Serialize;

pub(super) use crate::RUNNING;
pub(super) use wave3ctl_lib::client::ProxyClient;
pub(super) use wave3ctl_lib::config::Config;
pub(super) use wave3ctl_lib::device::DiscoveredDevice;
pub(super) use wave3ctl_lib::error::{Result, Wave3Error};
pub(super) use wave3ctl_lib::protocol::STATUS_EBUSY;
pub(super) use wave3ctl_lib::proxy::ProxyError;
pub(super) use wave3ctl_lib::wave3::{Level, VolumeRange, Wave3, Wave3State};

const PADDING: usize = 2;

/// Compute alignment width for a command's key-value output.
/// Ensures at least PADDING spaces after the longest key in either level,
/// with top-level and indent values aligned to the same column.
pub(super) fn kv_width(top: &[&str], indent: &[&str]) -> usize {
    let top_max = top.iter().map(|k| k.len()).max().unwrap_or(0);
    let indent_max = indent.iter().map(|k| k.len()).max().unwrap_or(0);
    let top_need = if top.is_empty() { 0 } else { top_max + PADDING };
    // Indent keys lose 2 chars of inner width to the "  " prefix
    let indent_need = if indent.is_empty() {
        0
    } else {
        indent_max + PADDING + 2
    };
    top_need.max(indent_need)
}

pub(super) fn format_kv(key: &str, value: impl std::fmt::Display, w: usize) -> String {
    format!("{key:<width$}{value}", width = w)
}

pub(super) fn kv(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("{}", format_kv(key, value, w));
}

pub(super) fn kv_indent(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("  {key:<width$}{value}", width = w - 2);
}

/// `"42% (-12.5 dB)"`
pub(super) fn format_level(level: &Level) -> String {
    format!("{}% ({:+.1} dB)", level.pct, level.db)
}

pub(super) fn print_json(value: &impl Serialize) -> Result<()> {
    let s = serde_json::to_string_pretty(value)
        .map_err(|e| Wave3Error::Config(format!("JSON serialization failed: {e}")))?;
    println!("{s}");
    Ok(())
}

// ── JSON output structs ──

#[derive(Serialize)]
pub(super) struct StatusOutput {
    pub version: String,
    pub socket: String,
    pub device: Option<DeviceStatusJson>,
    pub error: Option<String>,
}

#[derive(Serialize)]
pub(super) struct DeviceStatusJson {
    #[serde(flatten)]
    pub state: Wave3State,
    pub hp_range: VolumeRange,
    pub mic_range: VolumeRange,
}

#[derive(Serialize)]
pub(super) struct ConfigOutput {
    pub config_file: Option<String>,
    pub config_file_exists: bool,
    pub settings: Config,
    pub problems: Vec<String>,
}

#[derive(Serialize)]
pub(super) struct ConfigInitOutput {
    pub config_file: String,
    pub written: bool,
}

#[derive(Serialize)]
pub(super) struct DevicesOutput {
    pub target: String,
    pub count: usize,
    pub devices: Vec<DiscoveredDevice>,
}

// ── Shared context ──

/// Flags that apply to every subcommand.
pub struct GlobalOpts {
    pub json: bool,
    pub config: Option<PathBuf>,
    pub socket: Option<PathBuf>,
}

/// Resolved per-invocation settings.
pub(super) struct Ctx {
    pub json: bool,
    pub config: Config,
    /// Explicit `--config` path, if any.
    pub config_path: Option<PathBuf>,
    pub socket: PathBuf,
}

impl Ctx {
    fn new(opts: &GlobalOpts) -> Self {
        let config = load_config(opts.config.as_deref());
        let socket = opts
            .socket
            .clone()
            .unwrap_or_else(|| config.socket_path.clone());
        Ctx {
            json: opts.json,
            config,
            config_path: opts.config.clone(),
            socket,
        }
    }

    /// Connect to the daemon and open the controller.
    pub fn connect(&self) -> Result<Wave3<ProxyClient>> {
        let client =
            ProxyClient::connect(&self.socket).map_err(|e| with_socket_path(e, &self.socket))?;
        Wave3::new(client)
    }
}

/// Load from `path` when given, else from the default location. Parse
/// problems are logged and defaults used.
pub(super) fn load_config(path: Option<&Path>) -> Config {
    match path {
        Some(p) => {
            let (config, warnings) = Config::load_from(p);
            for w in &warnings {
                log::warn!("{w}");
            }
            config
        }
        None => Config::load(),
    }
}

fn with_socket_path(e: Wave3Error, path: &Path) -> Wave3Error {
    match e {
        Wave3Error::Io(io) => {
            Wave3Error::Io(io::Error::new(io.kind(), format!("{}: {io}", path.display())))
        }
        other => other,
    }
}

/// Error text with a hint for the failures users actually hit.
pub fn friendly_message(e: &Wave3Error) -> String {
    match e {
        Wave3Error::Proxy(ProxyError::DeviceNotFound) => {
            "Wave:3 not found — is it connected?".to_string()
        }
        Wave3Error::Proxy(ProxyError::TransferFailed(STATUS_EBUSY)) => format!(
            "{e}\n  The Wave:3 audio interface is held by the kernel sound driver, so usbfs \
             refuses class requests to it. Unbind snd-usb-audio from the device to use wave3ctl."
        ),
        Wave3Error::Io(io)
            if matches!(
                io.kind(),
                io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused
            ) =>
        {
            format!("cannot reach wave3ctld ({io})\n  Is the daemon running? Start it with `sudo wave3ctld`.")
        }
        Wave3Error::Io(io) if io.kind() == io::ErrorKind::PermissionDenied => {
            format!("{io}\n  The daemon socket does not allow this user; check `socket_mode` in the daemon's config.")
        }
        other => other.to_string(),
    }
}

/// Accepts on/true/1 and off/false/0 (case-insensitive).
pub(super) fn parse_on_off(s: &str) -> std::result::Result<bool, String> {
    match s.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        _ => Err(format!("'{s}' is not on/off")),
    }
}

pub(super) fn clamp_pct(value: i64) -> u8 {
    value.clamp(0, 100) as u8
}

#[derive(Subcommand)]
pub enum Command {
    /// Show mic mute, gain, headphone mute and volume
    Status,

    /// Set or toggle the microphone mute
    Mute {
        /// on/off (also true/false, 1/0); toggles when omitted
        #[arg(value_parser = parse_on_off)]
        state: Option<bool>,
    },

    /// Show or set headphone volume
    Volume {
        /// Percent, clamped to 0-100
        #[arg(allow_negative_numbers = true)]
        percent: Option<i64>,
    },

    /// Show or set microphone gain
    Gain {
        /// Percent, clamped to 0-100
        #[arg(allow_negative_numbers = true)]
        percent: Option<i64>,
    },

    /// Print control changes as they happen
    Monitor,

    /// List the audio feature units and their ranges
    Discover,

    /// List attached Wave:3 devices (reads the USB registry directly)
    Devices,

    /// Show current configuration and file paths
    Config {
        /// Write a config file with the default settings
        #[arg(long)]
        init: bool,

        /// With --init, overwrite an existing file
        #[arg(long, requires = "init")]
        force: bool,
    },
}

/// Warn if `--json` was passed to a command that doesn't support it.
fn warn_json_unsupported(cmd_name: &str) {
    log::warn!("--json is not supported for `{cmd_name}` (ignored)");
}

pub fn run(cmd: Command, opts: &GlobalOpts) -> Result<()> {
    let ctx = Ctx::new(opts);
    match cmd {
        Command::Status => status::cmd_status(&ctx),
        Command::Config { init: false, .. } => config_cmd::cmd_config(&ctx),
        Command::Config { init: true, force } => config_cmd::cmd_config_init(&ctx, force),
        Command::Devices => devices::cmd_devices(&ctx),
        other => {
            if ctx.json {
                warn_json_unsupported(other.name());
            }
            match other {
                Command::Mute { state } => mute::cmd_mute(&ctx, state),
                Command::Volume { percent } => {
                    level::cmd_level(&ctx, level::Control::Volume, percent.map(clamp_pct))
                }
                Command::Gain { percent } => {
                    level::cmd_level(&ctx, level::Control::Gain, percent.map(clamp_pct))
                }
                Command::Monitor => monitor::cmd_monitor(&ctx),
                Command::Discover => discover::cmd_discover(&ctx),
                Command::Status | Command::Config { .. } | Command::Devices => Ok(()),
            }
        }
    }
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Status => "status",
            Command::Mute { .. } => "mute",
            Command::Volume { .. } => "volume",
            Command::Gain { .. } => "gain",
            Command::Monitor => "monitor",
            Command::Discover => "discover",
            Command::Devices => "devices",
            Command::Config { .. } => "config",
        }
    }
}
