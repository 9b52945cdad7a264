//! Mic mute hooks — user commands run by `monitor` on mute/unmute.
//!
//! Commands run through `sh -c` with `WAVE3_MIC_MUTED` set to `1` or `0`.

use std::io;
use std::process::{Command, ExitStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::config::Config;
use crate::monitor::MonitorAction;

/// Set while a hook is running; mute and unmute hooks share it.
static HOOK_RUNNING: AtomicBool = AtomicBool::new(false);

const HOOK_TIMEOUT: Duration = Duration::from_secs(30);

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Pick the configured command for `action`, if any.
pub fn command_for(action: MonitorAction, config: &Config) -> Option<&str> {
    let cmd = match action {
        MonitorAction::ApplyMute => &config.on_mute_command,
        MonitorAction::ClearMute => &config.on_unmute_command,
        MonitorAction::NoChange => return None,
    };
    let cmd = cmd.trim();
    (!cmd.is_empty()).then_some(cmd)
}

/// Run the hook for `action` on a background thread.
///
/// Skipped (with a warning) while a previous hook is still running.
/// Returns whether a command was started.
pub fn run_action_hook(action: MonitorAction, config: &Config) -> bool {
    let Some(command) = command_for(action, config) else {
        return false;
    };
    if HOOK_RUNNING
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        log::warn!("hook skipped (previous hook still running): {command}");
        return false;
    }
    let muted = action == MonitorAction::ApplyMute;
    let command = command.to_string();
    std::thread::spawn(move || {
        let result = run_with_timeout(&command, muted, HOOK_TIMEOUT);
        HOOK_RUNNING.store(false, Ordering::SeqCst);
        match result {
            Ok(s) if !s.success() => log::warn!("hook exited with {s}: {command}"),
            Err(e) => log::warn!("hook failed: {e}: {command}"),
            Ok(_) => log::debug!("hook finished: {command}"),
        }
    });
    true
}

/// Run `command` and kill it if it outlives `timeout`.
fn run_with_timeout(command: &str, muted: bool, timeout: Duration) -> io::Result<ExitStatus> {
    let mut child = Command::new("sh")
        .args(["-c", command])
        .env("WAVE3_MIC_MUTED", if muted { "1" } else { "0" })
        .spawn()?;

    let polls = (timeout.as_millis() / POLL_INTERVAL.as_millis()).max(1);
    for _ in 0..polls {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    log::warn!("hook timed out after {timeout:?}, killing: {command}");
    let _ = child.kill();
    child.wait()
}
