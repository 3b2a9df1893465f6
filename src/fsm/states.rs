//! Concrete state handlers and the table builder.
//!
//! ```text
//!  IDLE ──[start scan, radio on]──▶ SCANNING ──[connect(dev)]──▶ CONNECTING
//!    ▲                                 │                           │
//!    │◀──────────[stop / radio off]────┘                      [connected]
//!    │                                                             ▼
//!    │◀──[connect failed]───────────────────────────────────  DISCOVERING
//!    │                                                             │
//!    │                                          [both groups enumerated,
//!    │                                           write target cached]
//!    │                                                             ▼
//!    └──────────[disconnect / remote drop / radio off]────────── READY
//! ```
//!
//! Radio-off and disconnect reach Idle from every link-holding state, and
//! entering Idle always releases the link and every per-link field.

use log::{debug, info, warn};

use super::context::{DeviceInsert, LinkAction, SessionContext, SessionEvent};
use super::{StateDescriptor, StateId};
use crate::app::ports::RadioState;
use crate::protocol::{self, ServiceGroup};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

pub fn build_state_table() -> [StateDescriptor; StateId::COUNT] {
    [
        // Index 0: Idle
        StateDescriptor {
            id: StateId::Idle,
            name: "Idle",
            on_enter: Some(idle_enter),
            on_exit: None,
            on_event: idle_event,
        },
        // Index 1: Scanning
        StateDescriptor {
            id: StateId::Scanning,
            name: "Scanning",
            on_enter: Some(scanning_enter),
            on_exit: Some(scanning_exit),
            on_event: scanning_event,
        },
        // Index 2: Connecting
        StateDescriptor {
            id: StateId::Connecting,
            name: "Connecting",
            on_enter: Some(connecting_enter),
            on_exit: None,
            on_event: connecting_event,
        },
        // Index 3: Discovering
        StateDescriptor {
            id: StateId::Discovering,
            name: "Discovering",
            on_enter: Some(discovering_enter),
            on_exit: None,
            on_event: discovering_event,
        },
        // Index 4: Ready
        StateDescriptor {
            id: StateId::Ready,
            name: "Ready",
            on_enter: Some(ready_enter),
            on_exit: None,
            on_event: ready_event,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  Shared guards
// ═══════════════════════════════════════════════════════════════════════════

/// Radio changes are handled the same way in every state.  Returns
/// `Some(Idle)` when the radio went off.
fn radio_guard(ctx: &mut SessionContext, event: &SessionEvent<'_>) -> Option<StateId> {
    let SessionEvent::Radio(state) = event else {
        return None;
    };
    ctx.radio = *state;
    match state {
        RadioState::On => {
            info!("radio on");
            None
        }
        RadioState::Off => {
            warn!("radio off, dropping {} discovered device(s)", ctx.devices.len());
            ctx.devices.clear();
            Some(StateId::Idle)
        }
    }
}

/// Disconnect handling shared by every link-holding state.
fn link_teardown(ctx: &mut SessionContext, event: &SessionEvent<'_>) -> Option<StateId> {
    match *event {
        SessionEvent::Disconnect => {
            if let Some(link) = ctx.link {
                info!("disconnect requested, cancelling {link}");
                ctx.push_action(LinkAction::Cancel(link));
            }
            Some(StateId::Idle)
        }
        SessionEvent::Disconnected(link) => {
            if ctx.owns(link) {
                warn!("{link} dropped by remote");
                Some(StateId::Idle)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Count link events that arrive when they cannot belong to us.
/// Disconnects are counted by [`link_teardown`] or the Idle/Scanning
/// handlers.
fn ignore_link_event(ctx: &mut SessionContext, event: &SessionEvent<'_>) {
    match *event {
        SessionEvent::Connected(link)
        | SessionEvent::ConnectFailed(link)
        | SessionEvent::ServicesDiscovered { link, .. }
        | SessionEvent::CharacteristicsDiscovered { link, .. } => {
            ctx.owns(link);
        }
        _ => {}
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  IDLE
// ═══════════════════════════════════════════════════════════════════════════

fn idle_enter(ctx: &mut SessionContext) {
    if let Some(link) = ctx.release_link() {
        info!("IDLE: released {link}");
        ctx.link_released = true;
    }
}

fn idle_event(ctx: &mut SessionContext, event: &SessionEvent<'_>) -> Option<StateId> {
    if matches!(event, SessionEvent::Radio(_)) {
        // Already idle; the guard still records the new radio state.
        radio_guard(ctx, event);
        return None;
    }

    match *event {
        SessionEvent::StartScan => {
            if ctx.radio == RadioState::On {
                Some(StateId::Scanning)
            } else {
                warn!("start scan ignored: radio off");
                None
            }
        }
        SessionEvent::Connect(id) => {
            if ctx.radio == RadioState::On && ctx.devices.contains(id) {
                ctx.target = Some(id);
                Some(StateId::Connecting)
            } else {
                warn!("connect to {id} ignored: not in device list");
                None
            }
        }
        SessionEvent::StopScan | SessionEvent::Disconnect => None,
        SessionEvent::Disconnected(link) => {
            ctx.owns(link);
            None
        }
        SessionEvent::Discovered(adv) => {
            debug!("advertisement from {} while idle", adv.id);
            None
        }
        _ => {
            ignore_link_event(ctx, event);
            None
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  SCANNING
// ═══════════════════════════════════════════════════════════════════════════

fn scanning_enter(ctx: &mut SessionContext) {
    ctx.devices.clear();
    ctx.push_action(LinkAction::StartScan);
    info!("SCANNING: looking for '{}'", ctx.config.model_token);
}

fn scanning_exit(ctx: &mut SessionContext) {
    if ctx.radio == RadioState::On {
        ctx.push_action(LinkAction::StopScan);
    }
}

fn scanning_event(ctx: &mut SessionContext, event: &SessionEvent<'_>) -> Option<StateId> {
    if let Some(next) = radio_guard(ctx, event) {
        return Some(next);
    }

    match *event {
        SessionEvent::StopScan => Some(StateId::Idle),
        SessionEvent::Discovered(adv) => {
            match ctx.devices.offer(adv, &ctx.config.model_token) {
                DeviceInsert::Added => info!("found {} '{}'", adv.id, adv.name),
                DeviceInsert::Updated | DeviceInsert::Filtered => {}
                DeviceInsert::Full => warn!("device list full, dropping {}", adv.id),
            }
            None
        }
        SessionEvent::Connect(id) => {
            if ctx.devices.contains(id) {
                ctx.target = Some(id);
                Some(StateId::Connecting)
            } else {
                warn!("connect to {id} ignored: not discovered");
                None
            }
        }
        SessionEvent::Disconnected(link) => {
            ctx.owns(link);
            None
        }
        _ => {
            ignore_link_event(ctx, event);
            None
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  CONNECTING
// ═══════════════════════════════════════════════════════════════════════════

fn connecting_enter(ctx: &mut SessionContext) {
    if let Some(id) = ctx.target {
        info!("CONNECTING: {id}");
        ctx.push_action(LinkAction::Connect(id));
    }
}

fn connecting_event(ctx: &mut SessionContext, event: &SessionEvent<'_>) -> Option<StateId> {
    if let Some(next) = radio_guard(ctx, event) {
        return Some(next);
    }
    if let Some(next) = link_teardown(ctx, event) {
        return Some(next);
    }

    match *event {
        SessionEvent::Connected(link) if ctx.owns(link) => Some(StateId::Discovering),
        SessionEvent::ConnectFailed(link) if ctx.owns(link) => {
            warn!("connect failed on {link}");
            Some(StateId::Idle)
        }
        SessionEvent::Connected(_) | SessionEvent::ConnectFailed(_) => None,
        _ => {
            ignore_link_event(ctx, event);
            None
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  DISCOVERING
// ═══════════════════════════════════════════════════════════════════════════

fn discovering_enter(ctx: &mut SessionContext) {
    ctx.discovery = Default::default();
    ctx.control_write = None;
    if let Some(link) = ctx.link {
        info!("DISCOVERING: enumerating services on {link}");
        ctx.push_action(LinkAction::DiscoverServices(link));
    }
}

fn discovering_event(ctx: &mut SessionContext, event: &SessionEvent<'_>) -> Option<StateId> {
    if let Some(next) = radio_guard(ctx, event) {
        return Some(next);
    }
    if let Some(next) = link_teardown(ctx, event) {
        return Some(next);
    }

    match *event {
        SessionEvent::ServicesDiscovered { link, services } if ctx.owns(link) => {
            for &uuid in services {
                match ServiceGroup::from_uuid(uuid) {
                    Some(group) => ctx.push_action(LinkAction::DiscoverCharacteristics(link, group)),
                    None => debug!("ignoring service {}", protocol::format_uuid(uuid)),
                }
            }
            None
        }
        SessionEvent::CharacteristicsDiscovered {
            link,
            service,
            characteristics,
        } if ctx.owns(link) => {
            let Some(group) = ServiceGroup::from_uuid(service) else {
                debug!("characteristics for unknown service {}", protocol::format_uuid(service));
                return None;
            };
            let wanted = group.characteristics();
            for c in characteristics.iter().filter(|c| wanted.contains(&c.uuid)) {
                if c.uuid == protocol::CHAR_CONTROL_RECEIVE && c.props.can_write() {
                    ctx.control_write = Some(c.uuid);
                }
                if c.props.can_notify() {
                    ctx.push_action(LinkAction::Subscribe(link, c.uuid));
                }
            }
            ctx.discovery.mark(group);

            if !ctx.discovery.is_complete() {
                return None;
            }
            if ctx.control_write.is_some() {
                Some(StateId::Ready)
            } else {
                warn!("discovery complete but no writable control characteristic");
                None
            }
        }
        SessionEvent::ServicesDiscovered { .. } | SessionEvent::CharacteristicsDiscovered { .. } => {
            None
        }
        _ => {
            ignore_link_event(ctx, event);
            None
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  READY
// ═══════════════════════════════════════════════════════════════════════════

fn ready_enter(ctx: &mut SessionContext) {
    if let (Some(link), Some(target)) = (ctx.link, ctx.control_write) {
        info!("READY: {link}, commands via {}", protocol::format_uuid(target));
    }
}

fn ready_event(ctx: &mut SessionContext, event: &SessionEvent<'_>) -> Option<StateId> {
    if let Some(next) = radio_guard(ctx, event) {
        return Some(next);
    }
    if let Some(next) = link_teardown(ctx, event) {
        return Some(next);
    }
    ignore_link_event(ctx, event);
    None
}
