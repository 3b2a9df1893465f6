//! Runtime diagnostics.
//!
//! The session never fails loudly: short frames, out-of-range values,
//! stale link events and commands issued while not ready are all dropped.
//! These counters make the silent paths visible.  A snapshot is
//! serializable with `postcard` for relaying alongside telemetry.

use serde::{Deserialize, Serialize};

/// Counters for every silent-drop path in the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub frames_decoded: u32,
    /// Notifications shorter than their frame's minimum length.
    pub frames_dropped_short: u32,
    /// Notifications on characteristics that carry no telemetry.
    pub frames_unrecognised: u32,
    /// Individual fields discarded by a range gate.
    pub values_rejected: u32,
    /// Events referencing a link the session no longer owns.
    pub stale_events: u32,
    pub commands_dropped_not_ready: u32,
    pub commands_written: u32,
    pub transport_errors: u32,
    pub inbox_overflows: u32,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode for relaying.  Never fails in practice; an empty buffer is
    /// returned if it somehow does.
    pub fn to_bytes(&self) -> Vec<u8> {
        postcard::to_allocvec(self).unwrap_or_default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        postcard::from_bytes(bytes).ok()
    }

    /// Total of every drop counter.
    pub fn total_dropped(&self) -> u32 {
        self.frames_dropped_short
            .saturating_add(self.frames_unrecognised)
            .saturating_add(self.values_rejected)
            .saturating_add(self.stale_events)
            .saturating_add(self.commands_dropped_not_ready)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Count one more occurrence.  Counters stick at `u32::MAX`.
pub fn bump(counter: &mut u32) {
    *counter = counter.saturating_add(1);
}
