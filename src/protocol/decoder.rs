//! Telemetry frame decoder.
//!
//! Pure functions: one notified buffer in, one [`MetricsDelta`] out.
//! Each frame kind is identified by the characteristic it arrived on and is
//! length-checked before any field is read.  Short buffers yield `None`
//! (torn notification, dropped silently by the caller).
//!
//! Field layout (all integers little-endian):
//!
//! | Frame                  | Min | Offset | Width | Field            | Scale | Accepted   |
//! |------------------------|-----|--------|-------|------------------|-------|------------|
//! | General Status         | 19  | 0      | 3     | elapsed time (s) | /100  | always     |
//! |                        |     | 3      | 3     | distance (m)     | /10   | always     |
//! |                        |     | 18     | 1     | drag factor      |       | always     |
//! | Additional Status 1    | 9   | 3      | 2     | stroke count     |       | always     |
//! |                        |     | 5      | 1     | stroke rate      |       | (0, 100)   |
//! |                        |     | 6      | 3     | pace (s/500m)    | /100  | (0, 600)   |
//! | Stroke Data            | 16  | 12     | 2     | peak force       | /10   | (0, 500)   |
//! |                        |     | 14     | 2     | average force    | /10   | always     |
//! | Additional Stroke Data | 5   | 3      | 2     | power (W)        |       | (0, 2000)  |
//! | Additional Status 2    | 6   | 4      | 2     | average power (W)|       | (0, 2000)  |
//!
//! The open-interval gates discard stale or torn values seen during
//! subscription churn; a discarded field leaves the snapshot untouched.

use serde::{Deserialize, Serialize};

use super::{
    CHAR_ADDITIONAL_STATUS_1, CHAR_ADDITIONAL_STATUS_2, CHAR_ADDITIONAL_STROKE_DATA,
    CHAR_GENERAL_STATUS, CHAR_STROKE_DATA,
};

// ── Range gates (exclusive bounds) ────────────────────────────

const STROKE_RATE_MAX: u8 = 100;
const PACE_MAX_SECS: f32 = 600.0;
const PEAK_FORCE_MAX: f32 = 500.0;
const POWER_MAX_W: u16 = 2000;

/// The five telemetry frame formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameKind {
    GeneralStatus,
    AdditionalStatus1,
    AdditionalStatus2,
    StrokeData,
    AdditionalStrokeData,
}

impl FrameKind {
    pub const ALL: [FrameKind; 5] = [
        FrameKind::GeneralStatus,
        FrameKind::AdditionalStatus1,
        FrameKind::AdditionalStatus2,
        FrameKind::StrokeData,
        FrameKind::AdditionalStrokeData,
    ];

    /// Minimum buffer length before any field is read.
    pub const fn min_len(self) -> usize {
        match self {
            Self::GeneralStatus => 19,
            Self::AdditionalStatus1 => 9,
            Self::AdditionalStatus2 => 6,
            Self::StrokeData => 16,
            Self::AdditionalStrokeData => 5,
        }
    }

    /// Characteristic this frame is notified on.
    pub const fn characteristic(self) -> u128 {
        match self {
            Self::GeneralStatus => CHAR_GENERAL_STATUS,
            Self::AdditionalStatus1 => CHAR_ADDITIONAL_STATUS_1,
            Self::AdditionalStatus2 => CHAR_ADDITIONAL_STATUS_2,
            Self::StrokeData => CHAR_STROKE_DATA,
            Self::AdditionalStrokeData => CHAR_ADDITIONAL_STROKE_DATA,
        }
    }

    pub fn from_characteristic(uuid: u128) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.characteristic() == uuid)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::GeneralStatus => "general-status",
            Self::AdditionalStatus1 => "additional-status-1",
            Self::AdditionalStatus2 => "additional-status-2",
            Self::StrokeData => "stroke-data",
            Self::AdditionalStrokeData => "additional-stroke-data",
        }
    }
}

/// Fields decoded from a single frame.  `None` means "not carried by this
/// frame, or discarded by its range gate".
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricsDelta {
    pub elapsed_secs: Option<f64>,
    pub distance_m: Option<f64>,
    pub drag_factor: Option<u8>,
    pub stroke_rate: Option<u8>,
    pub stroke_count: Option<u16>,
    pub pace_secs: Option<f32>,
    pub peak_force: Option<f32>,
    pub avg_force: Option<f32>,
    pub power_w: Option<u16>,
    pub avg_power_w: Option<u16>,
    /// Number of fields discarded by a range gate.
    pub rejected: u8,
}

impl MetricsDelta {
    /// Keep `value` if `accept` holds, otherwise count a rejection.
    fn gate<T>(&mut self, value: T, accept: bool) -> Option<T> {
        if accept {
            Some(value)
        } else {
            self.rejected += 1;
            None
        }
    }
}

// ── Byte helpers ──────────────────────────────────────────────

fn le16(data: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([data[at], data[at + 1]])
}

fn le24(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], 0])
}

// ── Decoders ──────────────────────────────────────────────────

/// Decode a buffer of known frame kind.
///
/// Returns `None` when the buffer is shorter than [`FrameKind::min_len`].
pub fn decode(kind: FrameKind, data: &[u8]) -> Option<MetricsDelta> {
    if data.len() < kind.min_len() {
        return None;
    }

    let mut delta = MetricsDelta::default();
    match kind {
        FrameKind::GeneralStatus => {
            delta.elapsed_secs = Some(f64::from(le24(data, 0)) / 100.0);
            delta.distance_m = Some(f64::from(le24(data, 3)) / 10.0);
            delta.drag_factor = Some(data[18]);
        }
        FrameKind::AdditionalStatus1 => {
            delta.stroke_count = Some(le16(data, 3));

            let rate = data[5];
            delta.stroke_rate = delta.gate(rate, rate > 0 && rate < STROKE_RATE_MAX);

            let pace = le24(data, 6) as f32 / 100.0;
            delta.pace_secs = delta.gate(pace, pace > 0.0 && pace < PACE_MAX_SECS);
        }
        FrameKind::StrokeData => {
            let peak = f32::from(le16(data, 12)) / 10.0;
            delta.peak_force = delta.gate(peak, peak > 0.0 && peak < PEAK_FORCE_MAX);
            delta.avg_force = Some(f32::from(le16(data, 14)) / 10.0);
        }
        FrameKind::AdditionalStrokeData => {
            let power = le16(data, 3);
            delta.power_w = delta.gate(power, power > 0 && power < POWER_MAX_W);
        }
        FrameKind::AdditionalStatus2 => {
            let avg = le16(data, 4);
            delta.avg_power_w = delta.gate(avg, avg > 0 && avg < POWER_MAX_W);
        }
    }
    Some(delta)
}

/// Decode a buffer tagged by the characteristic it was notified on.
///
/// Returns `None` for characteristics that carry no telemetry and for
/// short buffers; the two cases are distinguishable through
/// [`FrameKind::from_characteristic`].
pub fn decode_notification(characteristic: u128, data: &[u8]) -> Option<(FrameKind, MetricsDelta)> {
    let kind = FrameKind::from_characteristic(characteristic)?;
    decode(kind, data).map(|delta| (kind, delta))
}
