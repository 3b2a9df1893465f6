//! Application core: session orchestration, zero I/O.
//!
//! This module contains the rules for an ergometer session: state machine
//! orchestration, frame routing, metrics aggregation and command
//! sequencing.  All interaction with the radio stack happens through
//! **port traits** defined in [`ports`], keeping this layer fully testable
//! without a real BLE adapter.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
