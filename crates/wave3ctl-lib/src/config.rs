//! Configuration — TOML file shared by `wave3ctl` and `wave3ctld`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::locator::DeviceId;
use crate::protocol::{DEFAULT_SOCKET_MODE, DEFAULT_SOCKET_PATH, USB_TIMEOUT_MS, WAVE3_PID, WAVE3_VID};

/// Header comment prepended to saved config files.
const CONFIG_HEADER: &str = "# wave3ctl configuration\n\n";

/// Shortest accepted monitor poll interval.
pub const MIN_POLL_INTERVAL_MS: u64 = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Boundary socket path. Default: `/run/wave3ctl.sock`.
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// File mode applied to the socket by the daemon. Default: `0o666`.
    #[serde(default = "default_socket_mode")]
    pub socket_mode: u32,

    #[serde(default = "default_vendor_id")]
    pub vendor_id: u16,

    #[serde(default = "default_product_id")]
    pub product_id: u16,

    /// Per-transfer USB timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Serialize transfers to the same device in the daemon.
    #[serde(default = "default_true")]
    pub serialize_transfers: bool,

    /// `monitor` poll interval in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Command to run when the mic becomes muted. Empty = disabled.
    #[serde(default)]
    pub on_mute_command: String,

    /// Command to run when the mic becomes unmuted. Empty = disabled.
    #[serde(default)]
    pub on_unmute_command: String,
}

fn default_socket_path() -> PathBuf {
    PathBuf::from(DEFAULT_SOCKET_PATH)
}
fn default_socket_mode() -> u32 {
    DEFAULT_SOCKET_MODE
}
fn default_vendor_id() -> u16 {
    WAVE3_VID
}
fn default_product_id() -> u16 {
    WAVE3_PID
}
fn default_timeout_ms() -> u64 {
    USB_TIMEOUT_MS
}
fn default_poll_interval_ms() -> u64 {
    200
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Config {
            socket_path: default_socket_path(),
            socket_mode: default_socket_mode(),
            vendor_id: default_vendor_id(),
            product_id: default_product_id(),
            timeout_ms: default_timeout_ms(),
            serialize_transfers: true,
            poll_interval_ms: default_poll_interval_ms(),
            on_mute_command: String::new(),
            on_unmute_command: String::new(),
        }
    }
}

/// Validation errors that [`Config::validate`] can return.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// `socket_path` is empty or not absolute.
    InvalidSocketPath(String),
    /// `socket_mode` has bits outside `0o777`.
    InvalidSocketMode(u32),
    /// `vendor_id` or `product_id` is zero.
    InvalidDeviceId { field: &'static str },
    /// `timeout_ms` is zero.
    ZeroTimeout,
    /// `poll_interval_ms` is below [`MIN_POLL_INTERVAL_MS`].
    PollIntervalTooShort(u64),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::InvalidSocketPath(p) => {
                write!(f, "Invalid socket_path: \"{p}\" must be an absolute path")
            }
            ValidationError::InvalidSocketMode(m) => {
                write!(f, "Invalid socket_mode: {m:#o} (must be within 0o777)")
            }
            ValidationError::InvalidDeviceId { field } => write!(f, "{field} cannot be 0"),
            ValidationError::ZeroTimeout => write!(f, "timeout_ms cannot be 0"),
            ValidationError::PollIntervalTooShort(ms) => write!(
                f,
                "poll_interval_ms {ms} is too short (minimum {MIN_POLL_INTERVAL_MS})"
            ),
        }
    }
}

impl Config {
    /// Platform-specific config directory.
    pub fn dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("wave3ctl"))
    }

    /// Full path to config file.
    pub fn path() -> Option<PathBuf> {
        Self::dir().map(|d| d.join("config.toml"))
    }

    /// Load config from disk, or return defaults if not found.
    pub fn load() -> Self {
        let (config, warnings) = Self::load_with_warnings();
        for w in &warnings {
            log::warn!("{w}");
        }
        config
    }

    /// Save config to an arbitrary path atomically (write to temp file, then rename).
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let serialized = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        let contents = format!("{CONFIG_HEADER}{serialized}");
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, &contents)?;
        match std::fs::rename(&tmp, path) {
            Ok(()) => Ok(()),
            Err(_) => {
                // Rename can fail across filesystems
                let result = std::fs::write(path, &contents);
                let _ = std::fs::remove_file(&tmp);
                result
            }
        }
    }

    /// Load config from an arbitrary path, returning the config and any parse warnings.
    ///
    /// Returns `(defaults, [])` if the file doesn't exist.
    /// Returns `(defaults, [warning])` if the file exists but can't be parsed.
    pub fn load_from(path: &Path) -> (Self, Vec<String>) {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => (config, vec![]),
                Err(e) => {
                    let warning = format!(
                        "config parse error ({}), using defaults: {e}",
                        path.display()
                    );
                    (Self::default(), vec![warning])
                }
            },
            Err(_) => (Self::default(), vec![]),
        }
    }

    /// Load config from the default path, returning the config and any parse warnings.
    pub fn load_with_warnings() -> (Self, Vec<String>) {
        let Some(path) = Self::path() else {
            return (Self::default(), vec![]);
        };
        Self::load_from(&path)
    }

    pub fn device_id(&self) -> DeviceId {
        DeviceId::new(self.vendor_id, self.product_id)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Validate the entire config, collecting all errors.
    pub fn validate(&self) -> std::result::Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if !self.socket_path.is_absolute() {
            errors.push(ValidationError::InvalidSocketPath(
                self.socket_path.display().to_string(),
            ));
        }
        if self.socket_mode & !0o777 != 0 {
            errors.push(ValidationError::InvalidSocketMode(self.socket_mode));
        }
        if self.vendor_id == 0 {
            errors.push(ValidationError::InvalidDeviceId { field: "vendor_id" });
        }
        if self.product_id == 0 {
            errors.push(ValidationError::InvalidDeviceId {
                field: "product_id",
            });
        }
        if self.timeout_ms == 0 {
            errors.push(ValidationError::ZeroTimeout);
        }
        if self.poll_interval_ms < MIN_POLL_INTERVAL_MS {
            errors.push(ValidationError::PollIntervalTooShort(self.poll_interval_ms));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
