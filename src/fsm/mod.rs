//! Function-pointer finite state machine for the device session.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  StateTable                                                      │
//! │  ┌─────────────┬──────────┬──────────┬─────────────────────────┐ │
//! │  │ StateId     │ on_enter │ on_exit  │ on_event                │ │
//! │  ├─────────────┼──────────┼──────────┼─────────────────────────┤ │
//! │  │ Idle        │ fn(ctx)  │ -        │ fn(ctx, ev)->Option<>   │ │
//! │  │ Scanning    │ fn(ctx)  │ fn(ctx)  │ fn(ctx, ev)->Option<>   │ │
//! │  │ Connecting  │ fn(ctx)  │ -        │ fn(ctx, ev)->Option<>   │ │
//! │  │ Discovering │ fn(ctx)  │ -        │ fn(ctx, ev)->Option<>   │ │
//! │  │ Ready       │ fn(ctx)  │ -        │ fn(ctx, ev)->Option<>   │ │
//! │  └─────────────┴──────────┴──────────┴─────────────────────────┘ │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The session is event-driven rather than ticked: every user command and
//! transport event is dispatched to `on_event` of the **current** state.
//! If it returns `Some(next)` and `next` differs from the current state,
//! the engine runs `on_exit` for the current state, then `on_enter` for
//! the next.  Handlers only mutate [`SessionContext`]; transport calls are
//! queued as [`LinkAction`](context::LinkAction)s for the service to carry
//! out.

pub mod context;
pub mod states;

use context::{SessionContext, SessionEvent};
use log::info;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Session states.
/// Must stay in sync with the table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum StateId {
    Idle = 0,
    Scanning = 1,
    Connecting = 2,
    /// Connected, service surface still being enumerated.
    Discovering = 3,
    /// Connected, write target cached, notifications subscribed.
    Ready = 4,
}

impl StateId {
    pub const COUNT: usize = 5;

    /// Convert a table index back to `StateId`.  Out-of-range indices
    /// assert in debug builds and fall back to `Idle`.
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Idle,
            1 => Self::Scanning,
            2 => Self::Connecting,
            3 => Self::Discovering,
            4 => Self::Ready,
            _ => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::Idle
            }
        }
    }

    /// True while the session owns (or is acquiring) a link.
    pub fn holds_link(self) -> bool {
        matches!(self, Self::Connecting | Self::Discovering | Self::Ready)
    }
}

/// Coarse status reported to collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Idle,
    Scanning,
    Connecting,
    Connected,
}

impl From<StateId> for SessionStatus {
    fn from(state: StateId) -> Self {
        match state {
            StateId::Idle => Self::Idle,
            StateId::Scanning => Self::Scanning,
            StateId::Connecting | StateId::Discovering => Self::Connecting,
            StateId::Ready => Self::Connected,
        }
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// `on_enter` / `on_exit`: run exactly once per transition.
pub type StateActionFn = fn(&mut SessionContext);

/// Event handler.  Returns `Some(next)` to request a transition.
pub type StateEventFn = fn(&mut SessionContext, &SessionEvent<'_>) -> Option<StateId>;

/// One row of the state table.
pub struct StateDescriptor {
    pub id: StateId,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_event: StateEventFn,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

pub struct Fsm {
    /// Indexed by `StateId as usize`.
    table: [StateDescriptor; StateId::COUNT],
    current: usize,
    transitions: u32,
}

impl Fsm {
    pub fn new(table: [StateDescriptor; StateId::COUNT], initial: StateId) -> Self {
        Self {
            table,
            current: initial as usize,
            transitions: 0,
        }
    }

    /// Run the initial `on_enter`.  Call once before the first dispatch.
    pub fn start(&mut self, ctx: &mut SessionContext) {
        info!("session FSM starting in {}", self.table[self.current].name);
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Feed one event to the current state.  Returns `(from, to)` when the
    /// event caused a transition.
    pub fn dispatch(
        &mut self,
        ctx: &mut SessionContext,
        event: &SessionEvent<'_>,
    ) -> Option<(StateId, StateId)> {
        let next = (self.table[self.current].on_event)(ctx, event)?;
        let from = self.current_state();
        if next == from {
            return None;
        }
        self.transition(next, ctx);
        Some((from, next))
    }

    /// Jump straight to `next`, running exit/enter actions.  Used by the
    /// service when a transport call fails outright.
    pub fn force_transition(
        &mut self,
        next: StateId,
        ctx: &mut SessionContext,
    ) -> Option<(StateId, StateId)> {
        let from = self.current_state();
        if next == from {
            return None;
        }
        self.transition(next, ctx);
        Some((from, next))
    }

    pub fn current_state(&self) -> StateId {
        StateId::from_index(self.current)
    }

    pub fn state_name(&self) -> &'static str {
        self.table[self.current].name
    }

    /// Number of transitions taken since construction.
    pub fn transitions(&self) -> u32 {
        self.transitions
    }

    fn transition(&mut self, next_id: StateId, ctx: &mut SessionContext) {
        let next_idx = next_id as usize;

        info!(
            "session: {} -> {}",
            self.table[self.current].name, self.table[next_idx].name
        );

        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }

        self.current = next_idx;
        self.transitions = self.transitions.wrapping_add(1);

        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}
