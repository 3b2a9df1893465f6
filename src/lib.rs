//! rowlink: device-protocol engine for PM5-class rowing ergometers.
//!
//! Manages the wireless session with the monitor (scan, connect, service
//! discovery, notification subscription), decodes the five telemetry frame
//! formats into one [`metrics::MetricsSnapshot`], and encodes CSAFE
//! command frames for workout control.
//!
//! The engine is transport-agnostic: a radio stack plugs in through
//! [`app::ports::Transport`] and hands its callbacks to the control loop
//! through [`channels::Inbox`].

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod channels;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod fsm;
pub mod metrics;
pub mod protocol;
pub mod runtime;

pub use app::service::RowerService;
pub use error::{Error, Result};
