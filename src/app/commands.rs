//! Inbound commands to the session service.
//!
//! These represent actions requested by collaborators (UI, race relay)
//! that the [`RowerService`](super::service::RowerService) interprets and
//! acts upon.

use super::ports::DeviceId;

/// Commands that collaborators can send into the session core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCommand {
    /// Start scanning for machines (ignored while the radio is off).
    StartScan,

    StopScan,

    /// Connect to a previously discovered machine.
    Connect(DeviceId),

    /// Drop the current link, or abandon a pending connection.
    Disconnect,

    /// Clear the snapshot and force history without touching the link.
    ResetMetrics,

    /// Reset the machine, then configure a single-distance piece.
    ConfigureWorkout { distance_m: u32 },

    /// End the running workout and return the machine to idle.
    ResetWorkout,
}
