//! Bounded drive-force history.
//!
//! Keeps the most recent accepted peak-force samples in arrival order.
//! When full, the oldest sample is evicted to make room for the newest.

use heapless::Deque;
use serde::Serialize;

/// Number of peak-force samples retained.
pub const FORCE_HISTORY_CAPACITY: usize = 20;

/// FIFO ring of recent peak-force samples.
#[derive(Debug, Clone, Default)]
pub struct ForceHistory {
    samples: Deque<f32, FORCE_HISTORY_CAPACITY>,
}

/// Short-term trend over the newest samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ForceTrend {
    /// Mean of the window.
    pub mean: f32,
    /// Largest sample in the window.
    pub max: f32,
    /// Newest sample minus the mean of the samples before it.
    pub delta: f32,
}

impl ForceHistory {
    pub const fn new() -> Self {
        Self {
            samples: Deque::new(),
        }
    }

    /// Append a sample, evicting the oldest when at capacity.
    pub fn push(&mut self, sample: f32) {
        if self.samples.is_full() {
            self.samples.pop_front();
        }
        // Cannot fail: a slot was freed above if needed.
        let _ = self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<f32> {
        self.samples.back().copied()
    }

    /// Samples oldest → newest.
    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        self.samples.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.iter().collect()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Trend over the newest `window` samples.  `None` until at least two
    /// samples exist.
    pub fn trend(&self, window: usize) -> Option<ForceTrend> {
        let window = window.clamp(2, FORCE_HISTORY_CAPACITY);
        let n = self.samples.len().min(window);
        if n < 2 {
            return None;
        }

        let recent = self.samples.iter().skip(self.samples.len() - n).copied();
        let (sum, max) = recent.fold((0.0f32, f32::MIN), |(s, m), x| (s + x, m.max(x)));
        let newest = self.latest()?;
        let prior_mean = (sum - newest) / (n - 1) as f32;

        Some(ForceTrend {
            mean: sum / n as f32,
            max,
            delta: newest - prior_mean,
        })
    }
}
