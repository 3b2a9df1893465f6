//! Inbox: the handoff into the control context.
//!
//! Transport adapters deliver results from their own thread or callback
//! context, and collaborators issue commands from theirs.  Neither touches
//! session state directly; both post a [`Message`] into the inbox and the
//! control loop drains it.
//!
//! ```text
//! ┌────────────────┐  Transport(ev)  ┌───────────┐
//! │ Transport cbs  │────────────────▶│           │
//! └────────────────┘                 │   Inbox   │──▶ control loop
//! ┌────────────────┐  User(cmd)      │ (bounded) │    (RowerService)
//! │ UI / relay     │────────────────▶│           │
//! └────────────────┘                 └───────────┘
//! ```
//!
//! Posting never blocks.  The inbox is two lanes: telemetry notifications
//! go to a deep lane that may be shed under load, everything else
//! (commands, link lifecycle, discovery results, shutdown) goes to a
//! control lane that is always drained first.  A notification flood can
//! therefore never push out the `Disconnected` that ends it.  A full lane
//! drops the message, logs a warning and counts the overflow.

use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use futures_lite::FutureExt;
use log::warn;

use crate::app::commands::UserCommand;
use crate::app::ports::TransportEvent;

/// Telemetry lane depth.
pub const INBOX_DEPTH: usize = 64;

/// Control lane depth.
pub const CONTROL_DEPTH: usize = 32;

/// Everything the control loop can be woken with.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    User(UserCommand),
    Transport(TransportEvent),
    /// Stop the control loop after the current batch.
    Shutdown,
}

impl Message {
    /// Only telemetry may be dropped when the loop falls behind.
    pub fn is_sheddable(&self) -> bool {
        matches!(
            self,
            Message::Transport(TransportEvent::Notification { .. })
        )
    }
}

pub struct Inbox {
    control: Channel<CriticalSectionRawMutex, Message, CONTROL_DEPTH>,
    telemetry: Channel<CriticalSectionRawMutex, Message, INBOX_DEPTH>,
    overflows: AtomicU32,
}

impl Default for Inbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Inbox {
    /// `const` so an inbox can live in a `static`.
    pub const fn new() -> Self {
        Self {
            control: Channel::new(),
            telemetry: Channel::new(),
            overflows: AtomicU32::new(0),
        }
    }

    /// Queue a message on its lane.  Returns `false` if that lane was full.
    pub fn post(&self, msg: Message) -> bool {
        let sent = if msg.is_sheddable() {
            self.telemetry.try_send(msg).is_ok()
        } else {
            self.control.try_send(msg).is_ok()
        };
        if !sent {
            let n = self.overflows.fetch_add(1, Ordering::Relaxed).saturating_add(1);
            warn!("inbox full, message dropped ({n} total)");
        }
        sent
    }

    pub fn post_event(&self, event: TransportEvent) -> bool {
        self.post(Message::Transport(event))
    }

    pub fn post_command(&self, cmd: UserCommand) -> bool {
        self.post(Message::User(cmd))
    }

    /// Next message, control lane first.
    pub fn try_recv(&self) -> Option<Message> {
        self.control
            .try_receive()
            .or_else(|_| self.telemetry.try_receive())
            .ok()
    }

    /// Wait for the next message.  When both lanes are ready the control
    /// lane wins.
    pub async fn recv(&self) -> Message {
        self.control.receive().or(self.telemetry.receive()).await
    }

    pub fn len(&self) -> usize {
        self.control.len() + self.telemetry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.control.is_empty() && self.telemetry.is_empty()
    }

    /// Messages dropped because their lane was full.
    pub fn overflow_count(&self) -> u32 {
        self.overflows.load(Ordering::Relaxed)
    }
}
