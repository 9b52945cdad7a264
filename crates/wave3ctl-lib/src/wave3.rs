//! Wave:3 controller — USB Audio Class Feature Unit requests over a [`ControlTransport`].
//!
//! Mute is a one-byte boolean; volume is a signed 16-bit value in 1/256 dB.
//! Percentages are mapped linearly onto each unit's `[GET_MIN, GET_MAX]`
//! range, which is read once at construction.

use serde::Serialize;

use crate::error::{Result, Wave3Error};
use crate::protocol::*;
use crate::transport::{ControlTransport, Payload};

/// `(min, max, resolution)` of a volume control, raw units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VolumeRange {
    pub min: i16,
    pub max: i16,
    pub res: i16,
}

impl VolumeRange {
    /// Used when the device does not answer range queries.
    pub const UNKNOWN: VolumeRange = VolumeRange {
        min: 0,
        max: 0,
        res: 1,
    };

    /// Raw value → percentage, clamped to 0..=100.
    pub fn raw_to_pct(&self, raw: i16) -> u8 {
        let lo = self.min as f64;
        let span = (self.max as f64 - lo).max(1.0);
        ((raw as f64 - lo) / span * 100.0).round().clamp(0.0, 100.0) as u8
    }

    /// Percentage (clamped) → raw value, truncated toward zero.
    pub fn pct_to_raw(&self, pct: u8) -> i16 {
        let pct = pct.min(100) as f64;
        let lo = self.min as f64;
        let hi = self.max as f64;
        (lo + (hi - lo) * pct / 100.0) as i16
    }
}

/// Raw value → dB.
pub fn raw_to_db(raw: i16) -> f64 {
    raw as f64 / 256.0
}

/// A volume or gain reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Level {
    pub raw: i16,
    pub pct: u8,
    pub db: f64,
}

impl Level {
    pub fn from_raw(raw: i16, range: &VolumeRange) -> Self {
        Level {
            raw,
            pct: range.raw_to_pct(raw),
            db: raw_to_db(raw),
        }
    }
}

/// Controller for one Wave:3 reached through `T`.
pub struct Wave3<T: ControlTransport> {
    transport: T,
    hp_range: VolumeRange,
    mic_range: VolumeRange,
}

fn parse_i16(data: &[u8]) -> Result<i16> {
    match data {
        [lo, hi, ..] => Ok(i16::from_le_bytes([*lo, *hi])),
        _ => Err(Wave3Error::Protocol(format!(
            "expected 2 bytes, got {}",
            data.len()
        ))),
    }
}

fn parse_bool(data: &[u8]) -> Result<bool> {
    data.first()
        .map(|&b| b != 0)
        .ok_or_else(|| Wave3Error::Protocol("expected 1 byte, got 0".into()))
}

impl<T: ControlTransport> Wave3<T> {
    /// Verify the device answers, then cache both volume ranges.
    pub fn new(transport: T) -> Result<Self> {
        let mut w = Wave3 {
            transport,
            hp_range: VolumeRange::UNKNOWN,
            mic_range: VolumeRange::UNKNOWN,
        };
        w.get_cur(MIC_FEATURE_UNIT, FU_MUTE, 1)?;
        // Ranges are fixed in firmware.
        w.hp_range = w.read_range(HP_FEATURE_UNIT);
        w.mic_range = w.read_range(MIC_FEATURE_UNIT);
        log::debug!("ranges: hp {:?}, mic {:?}", w.hp_range, w.mic_range);
        Ok(w)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn hp_range(&self) -> VolumeRange {
        self.hp_range
    }

    pub fn mic_range(&self) -> VolumeRange {
        self.mic_range
    }

    // ── Raw Feature Unit requests ──

    pub fn get_cur(&self, entity: u8, selector: u8, length: u16) -> Result<Vec<u8>> {
        self.transport.ctrl_transfer(
            BM_REQUEST_IN,
            UAC_GET_CUR,
            fu_value(selector, 0),
            fu_index(entity),
            Payload::In(length),
        )
    }

    pub fn set_cur(&self, entity: u8, selector: u8, data: &[u8]) -> Result<()> {
        self.transport.ctrl_transfer(
            BM_REQUEST_OUT,
            UAC_SET_CUR,
            fu_value(selector, 0),
            fu_index(entity),
            Payload::Out(data.to_vec()),
        )?;
        Ok(())
    }

    fn get_volume_attr(&self, request: u8, entity: u8) -> Result<i16> {
        let data = self.transport.ctrl_transfer(
            BM_REQUEST_IN,
            request,
            fu_value(FU_VOLUME, 0),
            fu_index(entity),
            Payload::In(2),
        )?;
        parse_i16(&data)
    }

    /// Read `GET_MIN`/`GET_MAX`/`GET_RES`; [`VolumeRange::UNKNOWN`] if any fails.
    pub fn read_range(&self, entity: u8) -> VolumeRange {
        let read = || -> Result<VolumeRange> {
            Ok(VolumeRange {
                min: self.get_volume_attr(UAC_GET_MIN, entity)?,
                max: self.get_volume_attr(UAC_GET_MAX, entity)?,
                res: self.get_volume_attr(UAC_GET_RES, entity)?.max(1),
            })
        };
        read().unwrap_or_else(|e| {
            log::debug!("range query for unit {entity} failed: {e}");
            VolumeRange::UNKNOWN
        })
    }

    fn get_mute(&self, entity: u8) -> Result<bool> {
        parse_bool(&self.get_cur(entity, FU_MUTE, 1)?)
    }

    fn set_mute(&self, entity: u8, muted: bool) -> Result<()> {
        self.set_cur(entity, FU_MUTE, &[muted as u8])
    }

    fn get_level(&self, entity: u8, range: &VolumeRange) -> Result<Level> {
        let raw = parse_i16(&self.get_cur(entity, FU_VOLUME, 2)?)?;
        Ok(Level::from_raw(raw, range))
    }

    fn set_level_pct(&self, entity: u8, range: &VolumeRange, pct: u8) -> Result<()> {
        let raw = range.pct_to_raw(pct);
        self.set_cur(entity, FU_VOLUME, &raw.to_le_bytes())
    }

    // ── Microphone (unit 6) ──

    pub fn mic_mute(&self) -> Result<bool> {
        self.get_mute(MIC_FEATURE_UNIT)
    }

    pub fn set_mic_mute(&self, muted: bool) -> Result<()> {
        self.set_mute(MIC_FEATURE_UNIT, muted)
    }

    /// Flip the mic mute state. Returns the new state.
    pub fn toggle_mic_mute(&self) -> Result<bool> {
        let target = !self.mic_mute()?;
        self.set_mic_mute(target)?;
        Ok(target)
    }

    pub fn mic_gain(&self) -> Result<Level> {
        self.get_level(MIC_FEATURE_UNIT, &self.mic_range)
    }

    pub fn set_mic_gain_pct(&self, pct: u8) -> Result<()> {
        self.set_level_pct(MIC_FEATURE_UNIT, &self.mic_range, pct)
    }

    // ── Headphone (unit 5) ──

    pub fn hp_mute(&self) -> Result<bool> {
        self.get_mute(HP_FEATURE_UNIT)
    }

    pub fn set_hp_mute(&self, muted: bool) -> Result<()> {
        self.set_mute(HP_FEATURE_UNIT, muted)
    }

    pub fn volume(&self) -> Result<Level> {
        self.get_level(HP_FEATURE_UNIT, &self.hp_range)
    }

    pub fn set_volume_pct(&self, pct: u8) -> Result<()> {
        self.set_level_pct(HP_FEATURE_UNIT, &self.hp_range, pct)
    }

    /// Read every control; unreadable ones are `None`.
    pub fn snapshot(&self) -> Wave3State {
        Wave3State {
            mic_muted: self.mic_mute().ok(),
            mic_gain: self.mic_gain().ok(),
            hp_muted: self.hp_mute().ok(),
            volume: self.volume().ok(),
        }
    }

    /// Like [`snapshot`](Self::snapshot), but a disconnect aborts the poll.
    pub fn poll(&self) -> Result<Wave3State> {
        Ok(Wave3State {
            mic_muted: transient(self.mic_mute())?,
            mic_gain: transient(self.mic_gain())?,
            hp_muted: transient(self.hp_mute())?,
            volume: transient(self.volume())?,
        })
    }
}

/// `None` for a failed read unless the failure is a disconnect.
fn transient<V>(r: Result<V>) -> Result<Option<V>> {
    match r {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.is_disconnect() => Err(e),
        Err(e) => {
            log::debug!("read skipped: {e}");
            Ok(None)
        }
    }
}

/// Point-in-time state of the device's controls.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Wave3State {
    pub mic_muted: Option<bool>,
    pub mic_gain: Option<Level>,
    pub hp_muted: Option<bool>,
    pub volume: Option<Level>,
}
