//! Engine configuration parameters
//!
//! All tunable parameters for a rowlink session.  Values can be loaded from
//! JSON or postcard blobs by the embedding application.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Longest model token accepted by [`EngineConfig::validate`].
pub const MAX_MODEL_TOKEN_LEN: usize = 16;

/// Core engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    // --- Discovery ---
    /// Substring (case-insensitive) an advertised name must contain
    pub model_token: heapless::String<MAX_MODEL_TOKEN_LEN>,

    // --- Commands ---
    /// Wait between the reset and configure-workout writes (milliseconds)
    pub settle_delay_ms: u32,

    // --- Force history ---
    /// Number of newest samples the force trend summary looks at
    pub trend_window: u8,

    // --- Control loop ---
    /// Messages handled per wake-up before deadlines are polled again
    pub inbox_drain_budget: u16,
    /// Idle wake-up interval when no message arrives (milliseconds)
    pub idle_tick_ms: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let mut model_token = heapless::String::new();
        // "PM5" always fits in MAX_MODEL_TOKEN_LEN.
        let _ = model_token.push_str("PM5");

        Self {
            model_token,

            settle_delay_ms: 500,

            trend_window: 5,

            inbox_drain_budget: 32,
            idle_tick_ms: 20, // 50 Hz
        }
    }
}

impl EngineConfig {
    /// Reject values the session cannot run with.
    pub fn validate(&self) -> Result<(), Error> {
        if self.model_token.trim().is_empty() {
            return Err(Error::Config("model_token must not be empty"));
        }
        if self.idle_tick_ms == 0 {
            return Err(Error::Config("idle_tick_ms must be non-zero"));
        }
        if self.inbox_drain_budget == 0 {
            return Err(Error::Config("inbox_drain_budget must be non-zero"));
        }
        if self.trend_window < 2 {
            return Err(Error::Config("trend_window must cover at least 2 samples"));
        }
        Ok(())
    }

    /// Builder-style override of the model token.  Tokens longer than
    /// [`MAX_MODEL_TOKEN_LEN`] are rejected.
    pub fn with_model_token(mut self, token: &str) -> Result<Self, Error> {
        let mut s = heapless::String::new();
        s.push_str(token)
            .map_err(|()| Error::Config("model_token too long"))?;
        self.model_token = s;
        Ok(self)
    }

    /// Builder-style override of the settle delay.
    pub fn with_settle_delay_ms(mut self, ms: u32) -> Self {
        self.settle_delay_ms = ms;
        self
    }
}
