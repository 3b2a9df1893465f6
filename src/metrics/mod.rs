//! Metrics aggregation.
//!
//! [`MetricsAggregator`] merges decoded [`MetricsDelta`]s into the current
//! [`MetricsSnapshot`].  Updates are partial: each frame only overwrites
//! the fields it carries, so the snapshot is never "all fresh" and never
//! needs to be.
//!
//! Accepted peak-force samples are also appended to the bounded
//! [`ForceHistory`].

pub mod history;

use serde::{Deserialize, Serialize};

pub use history::{FORCE_HISTORY_CAPACITY, ForceHistory, ForceTrend};

use crate::protocol::decoder::{FrameKind, MetricsDelta};

/// Unified telemetry record handed to collaborators by value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Elapsed workout time (s).
    pub elapsed_secs: f64,
    /// Distance rowed (m).
    pub distance_m: f64,
    /// Current pace (s / 500 m).
    pub pace_secs: f32,
    /// Strokes per minute.
    pub stroke_rate: u8,
    pub stroke_count: u16,
    /// Instantaneous stroke power (W).
    pub power_w: u16,
    /// Average power (W).
    pub avg_power_w: u16,
    pub peak_force: f32,
    pub avg_force: f32,
    pub drag_factor: u8,
    /// Session-clock time of the last General Status frame (ms).
    pub captured_at_ms: Option<u64>,
}

/// Owns the live snapshot and the force history.
#[derive(Debug, Clone, Default)]
pub struct MetricsAggregator {
    snapshot: MetricsSnapshot,
    history: ForceHistory,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one decoded frame.  `now_ms` stamps General Status frames.
    pub fn apply(&mut self, kind: FrameKind, delta: &MetricsDelta, now_ms: u64) {
        let s = &mut self.snapshot;

        if let Some(v) = delta.elapsed_secs {
            s.elapsed_secs = v;
        }
        if let Some(v) = delta.distance_m {
            s.distance_m = v;
        }
        if let Some(v) = delta.drag_factor {
            s.drag_factor = v;
        }
        if let Some(v) = delta.stroke_rate {
            s.stroke_rate = v;
        }
        if let Some(v) = delta.stroke_count {
            s.stroke_count = v;
        }
        if let Some(v) = delta.pace_secs {
            s.pace_secs = v;
        }
        if let Some(v) = delta.peak_force {
            s.peak_force = v;
            self.history.push(v);
        }
        if let Some(v) = delta.avg_force {
            s.avg_force = v;
        }
        if let Some(v) = delta.power_w {
            s.power_w = v;
        }
        if let Some(v) = delta.avg_power_w {
            s.avg_power_w = v;
            // Seed instantaneous power until a stroke frame supplies it.
            if s.power_w == 0 {
                s.power_w = v;
            }
        }

        if kind == FrameKind::GeneralStatus {
            s.captured_at_ms = Some(now_ms);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.snapshot
    }

    pub fn history(&self) -> &ForceHistory {
        &self.history
    }

    /// Clear snapshot and history without touching the session.
    pub fn reset(&mut self) {
        self.snapshot = MetricsSnapshot::default();
        self.history.clear();
    }
}
