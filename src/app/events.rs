//! Outbound application events.
//!
//! The [`RowerService`](super::service::RowerService) emits these through
//! the [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them: log to the console, relay over the
//! network, refresh a view.

use crate::fsm::StateId;
use crate::metrics::MetricsSnapshot;
use crate::protocol::csafe::CommandKind;
use crate::protocol::decoder::FrameKind;

use super::ports::{DeviceId, LinkHandle};

/// Structured events emitted by the session core.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// The service has started (carries the initial state).
    Started(StateId),

    /// The session state machine transitioned between states.
    StateChanged { from: StateId, to: StateId },

    /// A machine matching the model token was added to the device list.
    DeviceDiscovered { id: DeviceId, rssi: Option<i8> },

    /// A telemetry frame was merged into the snapshot.
    MetricsUpdated {
        source: FrameKind,
        snapshot: MetricsSnapshot,
    },

    /// A command frame was handed to the transport.
    CommandWritten { kind: CommandKind, len: usize },

    /// The link went away without being asked to.
    LinkLost(LinkHandle),
}
