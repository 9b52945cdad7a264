//! Monitor state machine — change detection over polled [`Wave3State`] snapshots.
//!
//! The CLI polls the device and feeds each snapshot to [`StateTracker::update`];
//! the returned [`Change`] list drives output and mute hooks. Readings that
//! failed (`None`) are skipped and never count as a change.

use serde::Serialize;

use crate::wave3::{Level, Wave3State};

/// Action to take after a mic-mute change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorAction {
    /// The mic became muted.
    ApplyMute,
    /// The mic became live.
    ClearMute,
    /// No state change — do nothing.
    NoChange,
}

/// One observed change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "control", content = "value", rename_all = "snake_case")]
pub enum Change {
    MicMute(bool),
    HpMute(bool),
    Volume(Level),
    Gain(Level),
}

impl Change {
    /// Hook action for this change.
    pub fn action(&self) -> MonitorAction {
        match self {
            Change::MicMute(true) => MonitorAction::ApplyMute,
            Change::MicMute(false) => MonitorAction::ClearMute,
            _ => MonitorAction::NoChange,
        }
    }
}

/// Tracks the last known value of every control.
#[derive(Debug, Default)]
pub struct StateTracker {
    last: Wave3State,
}

impl StateTracker {
    /// Start from an initial snapshot (reported once, not as changes).
    pub fn new(initial: Wave3State) -> Self {
        Self { last: initial }
    }

    pub fn current(&self) -> &Wave3State {
        &self.last
    }

    /// Feed a fresh snapshot. Returns changes in poll order:
    /// mic mute, headphone mute, volume, gain.
    pub fn update(&mut self, next: Wave3State) -> Vec<Change> {
        let mut changes = Vec::new();

        if let Some(m) = next.mic_muted
            && self.last.mic_muted != Some(m)
        {
            self.last.mic_muted = Some(m);
            changes.push(Change::MicMute(m));
        }
        if let Some(m) = next.hp_muted
            && self.last.hp_muted != Some(m)
        {
            self.last.hp_muted = Some(m);
            changes.push(Change::HpMute(m));
        }
        if let Some(v) = next.volume
            && level_changed(self.last.volume, v)
        {
            self.last.volume = Some(v);
            changes.push(Change::Volume(v));
        }
        if let Some(g) = next.mic_gain
            && level_changed(self.last.mic_gain, g)
        {
            self.last.mic_gain = Some(g);
            changes.push(Change::Gain(g));
        }
        changes
    }

    /// Replace the baseline, e.g. after a reconnect.
    pub fn reset(&mut self, baseline: Wave3State) {
        self.last = baseline;
    }
}

fn level_changed(last: Option<Level>, next: Level) -> bool {
    last.is_none_or(|l| l.raw != next.raw)
}
