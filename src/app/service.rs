//! Session service: the hexagonal core.
//!
//! [`RowerService`] owns the session FSM, the metrics aggregator and the
//! transport handle.  Every input (user command, transport event, deadline)
//! enters through one of its `&mut self` methods, so all state changes are
//! serialized in whatever context calls it.
//!
//! ```text
//!  UserCommand ──▶ ┌──────────────────────────────┐ ──▶ EventSink
//!                  │         RowerService         │
//! TransportEvent ─▶│ FSM · Decoder · Aggregator   │ ──▶ Transport
//!                  └──────────────────────────────┘
//! ```

use log::{debug, info, warn};

use crate::config::EngineConfig;
use crate::diagnostics::{Diagnostics, bump};
use crate::error::{CommandError, Error, Result, TransportError};
use crate::fsm::context::{DiscoveredDevice, LinkAction, SessionContext, SessionEvent};
use crate::fsm::states::build_state_table;
use crate::fsm::{Fsm, SessionStatus, StateId};
use crate::metrics::{ForceHistory, ForceTrend, MetricsAggregator, MetricsSnapshot};
use crate::protocol::csafe::{self, CommandKind, CONFIGURE_FRAME_LEN};
use crate::protocol::decoder::{self, FrameKind};
use crate::protocol::{self, CHAR_CONTROL_TRANSMIT};

use super::commands::UserCommand;
use super::events::AppEvent;
use super::ports::{Clock, DeviceId, EventSink, LinkHandle, Transport, TransportEvent};

/// A configure-workout frame waiting out the settle delay.
#[derive(Debug, Clone, Copy)]
struct PendingConfigure {
    due_ms: u64,
    distance_m: u32,
    frame: [u8; CONFIGURE_FRAME_LEN],
}

// ───────────────────────────────────────────────────────────────
// RowerService
// ───────────────────────────────────────────────────────────────

pub struct RowerService<T: Transport, C: Clock> {
    transport: T,
    clock: C,
    fsm: Fsm,
    ctx: SessionContext,
    metrics: MetricsAggregator,
    diag: Diagnostics,
    pending: Option<PendingConfigure>,
}

impl<T: Transport, C: Clock> RowerService<T, C> {
    /// Does **not** start the FSM; call [`start`](Self::start) next.
    pub fn new(config: EngineConfig, transport: T, clock: C) -> Self {
        Self {
            transport,
            clock,
            fsm: Fsm::new(build_state_table(), StateId::Idle),
            ctx: SessionContext::new(config),
            metrics: MetricsAggregator::new(),
            diag: Diagnostics::new(),
            pending: None,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    pub fn start(&mut self, sink: &mut impl EventSink) {
        self.ctx.radio = self.transport.radio_state();
        self.fsm.start(&mut self.ctx);
        sink.emit(&AppEvent::Started(self.fsm.current_state()));
        info!(
            "RowerService started in {:?} (radio {:?})",
            self.fsm.current_state(),
            self.ctx.radio
        );
    }

    // ── Inputs ────────────────────────────────────────────────

    /// Process a collaborator command.  Command writes issued while the
    /// session is not ready are dropped and counted.
    pub fn handle_command(&mut self, cmd: UserCommand, sink: &mut impl EventSink) {
        match cmd {
            UserCommand::StartScan => self.start_scan(sink),
            UserCommand::StopScan => self.stop_scan(sink),
            UserCommand::Connect(id) => {
                self.dispatch(&SessionEvent::Connect(id), sink);
            }
            UserCommand::Disconnect => self.disconnect(sink),
            UserCommand::ResetMetrics => self.reset_metrics(),
            UserCommand::ConfigureWorkout { distance_m } => {
                let _ = self.configure_workout(distance_m, sink);
            }
            UserCommand::ResetWorkout => {
                let _ = self.reset_workout(sink);
            }
        }
    }

    /// Process one asynchronous transport result.
    pub fn handle_transport_event(&mut self, event: &TransportEvent, sink: &mut impl EventSink) {
        match event {
            TransportEvent::Notification {
                link,
                characteristic,
                data,
            } => self.on_notification(*link, *characteristic, data, sink),
            TransportEvent::RadioStateChanged(state) => {
                self.dispatch(&SessionEvent::Radio(*state), sink);
            }
            TransportEvent::DeviceDiscovered(adv) => {
                let known = self.ctx.devices.contains(adv.id);
                self.dispatch(&SessionEvent::Discovered(adv), sink);
                if !known {
                    if let Some(dev) = self.ctx.devices.get(adv.id) {
                        sink.emit(&AppEvent::DeviceDiscovered {
                            id: dev.id,
                            rssi: dev.rssi,
                        });
                    }
                }
            }
            TransportEvent::Connected(link) => {
                self.dispatch(&SessionEvent::Connected(*link), sink);
            }
            TransportEvent::ConnectFailed(link) => {
                self.dispatch(&SessionEvent::ConnectFailed(*link), sink);
            }
            TransportEvent::ServicesDiscovered { link, services } => {
                self.dispatch(
                    &SessionEvent::ServicesDiscovered {
                        link: *link,
                        services,
                    },
                    sink,
                );
            }
            TransportEvent::CharacteristicsDiscovered {
                link,
                service,
                characteristics,
            } => {
                self.dispatch(
                    &SessionEvent::CharacteristicsDiscovered {
                        link: *link,
                        service: *service,
                        characteristics,
                    },
                    sink,
                );
            }
            TransportEvent::Disconnected(link) => {
                let t = self.dispatch(&SessionEvent::Disconnected(*link), sink);
                if matches!(t, Some((_, StateId::Idle))) {
                    sink.emit(&AppEvent::LinkLost(*link));
                }
            }
        }
    }

    /// Fire any deadline that has passed.  Call after every batch of
    /// inputs and on idle wake-ups.
    pub fn poll(&mut self, sink: &mut impl EventSink) {
        let Some(p) = self.pending else {
            return;
        };
        if self.clock.now_ms() < p.due_ms {
            return;
        }
        self.pending = None;
        debug!("settle delay elapsed, configuring {} m", p.distance_m);
        let kind = CommandKind::ConfigureWorkout {
            distance_m: p.distance_m,
        };
        let _ = self.write_command(kind, &p.frame, sink);
    }

    /// Session-clock time of the next deadline, if one is pending.
    pub fn next_deadline_ms(&self) -> Option<u64> {
        self.pending.map(|p| p.due_ms)
    }

    // ── Commands ──────────────────────────────────────────────

    pub fn start_scan(&mut self, sink: &mut impl EventSink) {
        self.dispatch(&SessionEvent::StartScan, sink);
    }

    pub fn stop_scan(&mut self, sink: &mut impl EventSink) {
        self.dispatch(&SessionEvent::StopScan, sink);
    }

    pub fn connect(&mut self, device: DeviceId, sink: &mut impl EventSink) {
        self.dispatch(&SessionEvent::Connect(device), sink);
    }

    pub fn disconnect(&mut self, sink: &mut impl EventSink) {
        self.dispatch(&SessionEvent::Disconnect, sink);
    }

    /// Clear the snapshot and force history.  The link is untouched.
    pub fn reset_metrics(&mut self) {
        self.metrics.reset();
        info!("metrics reset");
    }

    /// End the running workout and return the machine to idle.
    pub fn reset_workout(&mut self, sink: &mut impl EventSink) -> Result<()> {
        self.write_command(CommandKind::Reset, &csafe::reset_command(), sink)
    }

    /// Reset the machine now and configure a single-distance piece once
    /// the settle delay has passed.  A newer request replaces an older
    /// one still waiting.
    pub fn configure_workout(&mut self, distance_m: u32, sink: &mut impl EventSink) -> Result<()> {
        self.write_command(CommandKind::Reset, &csafe::reset_command(), sink)?;

        let due_ms = self.clock.now_ms() + u64::from(self.ctx.config.settle_delay_ms);
        let next = PendingConfigure {
            due_ms,
            distance_m,
            frame: csafe::configure_workout_command(distance_m),
        };
        if let Some(prev) = self.pending.replace(next) {
            debug!("pending configure of {} m replaced", prev.distance_m);
        }
        Ok(())
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn force_history(&self) -> &ForceHistory {
        self.metrics.history()
    }

    /// Trend over the configured window of newest force samples.
    pub fn force_trend(&self) -> Option<ForceTrend> {
        self.metrics
            .history()
            .trend(usize::from(self.ctx.config.trend_window))
    }

    pub fn status(&self) -> SessionStatus {
        self.fsm.current_state().into()
    }

    pub fn state(&self) -> StateId {
        self.fsm.current_state()
    }

    pub fn devices(&self) -> &[DiscoveredDevice] {
        self.ctx.devices.as_slice()
    }

    pub fn is_ready(&self) -> bool {
        self.fsm.current_state() == StateId::Ready && self.ctx.is_control_ready()
    }

    /// The link this session currently owns.
    pub fn link(&self) -> Option<LinkHandle> {
        self.ctx.link
    }

    /// Cached control write target, once discovered.
    pub fn control_write_target(&self) -> Option<u128> {
        self.ctx.control_write
    }

    /// Distance of the configure-workout frame waiting on the settle delay.
    pub fn pending_configure(&self) -> Option<u32> {
        self.pending.map(|p| p.distance_m)
    }

    pub fn diagnostics(&self) -> Diagnostics {
        let mut d = self.diag;
        d.stale_events = d.stale_events.saturating_add(self.ctx.stale_events);
        d
    }

    /// Record the inbox's overflow count (the inbox lives outside the
    /// service).
    pub fn note_inbox_overflows(&mut self, total: u32) {
        self.diag.inbox_overflows = total;
    }

    pub fn config(&self) -> &EngineConfig {
        &self.ctx.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    // ── Internal ──────────────────────────────────────────────

    /// Feed one event to the FSM, report the transition and carry out
    /// the transport calls it queued.
    fn dispatch(
        &mut self,
        event: &SessionEvent<'_>,
        sink: &mut impl EventSink,
    ) -> Option<(StateId, StateId)> {
        let t = self.fsm.dispatch(&mut self.ctx, event);
        if let Some((from, to)) = t {
            self.after_transition(from, to, sink);
        }
        self.apply_actions(sink);
        t
    }

    fn force_idle(&mut self, sink: &mut impl EventSink) {
        if let Some((from, to)) = self.fsm.force_transition(StateId::Idle, &mut self.ctx) {
            self.after_transition(from, to, sink);
        }
    }

    fn after_transition(&mut self, from: StateId, to: StateId, sink: &mut impl EventSink) {
        sink.emit(&AppEvent::StateChanged { from, to });
        let released = core::mem::take(&mut self.ctx.link_released);
        if to == StateId::Idle && (released || from.holds_link()) {
            self.metrics.reset();
            if let Some(p) = self.pending.take() {
                debug!("dropping pending configure of {} m", p.distance_m);
            }
        }
    }

    /// Drain the FSM's queued transport calls.  A failed call that leaves
    /// the session unable to progress sends it back to Idle.
    fn apply_actions(&mut self, sink: &mut impl EventSink) {
        while let Some(action) = self.ctx.actions.pop_front() {
            let Err(e) = self.perform(action) else {
                continue;
            };
            bump(&mut self.diag.transport_errors);
            warn!("transport call {:?} failed: {}", action, e);

            if matches!(action, LinkAction::StopScan | LinkAction::Cancel(_)) {
                continue;
            }
            self.ctx.actions.clear();
            if let Some(link) = self.ctx.link {
                self.cancel_link(link);
            }
            self.force_idle(sink);
        }
    }

    /// Best-effort teardown after a failed call.  The session goes idle
    /// whether or not the stack accepts the cancel.
    fn cancel_link(&mut self, link: LinkHandle) {
        if let Err(e) = self.transport.cancel(link) {
            bump(&mut self.diag.transport_errors);
            warn!("cancel of {link} failed: {e}");
        }
    }

    fn perform(&mut self, action: LinkAction) -> core::result::Result<(), T::Error> {
        match action {
            LinkAction::StartScan => self.transport.start_scan(&protocol::SCAN_SERVICES),
            LinkAction::StopScan => self.transport.stop_scan(),
            LinkAction::Connect(id) => {
                let link = self.transport.connect(id)?;
                info!("connecting to {id} on {link}");
                self.ctx.link = Some(link);
                Ok(())
            }
            LinkAction::Cancel(link) => self.transport.cancel(link),
            LinkAction::DiscoverServices(link) => self
                .transport
                .discover_services(link, &protocol::DISCOVERY_SERVICES),
            LinkAction::DiscoverCharacteristics(link, group) => {
                self.transport
                    .discover_characteristics(link, group.uuid(), group.characteristics())
            }
            LinkAction::Subscribe(link, characteristic) => {
                debug!("subscribing to {}", protocol::format_uuid(characteristic));
                self.transport.subscribe(link, characteristic)
            }
        }
    }

    fn on_notification(
        &mut self,
        link: LinkHandle,
        characteristic: u128,
        data: &[u8],
        sink: &mut impl EventSink,
    ) {
        let connected = matches!(
            self.fsm.current_state(),
            StateId::Discovering | StateId::Ready
        );
        if !connected || self.ctx.link != Some(link) {
            bump(&mut self.diag.stale_events);
            debug!("notification on stale {link} dropped");
            return;
        }

        if characteristic == CHAR_CONTROL_TRANSMIT {
            match csafe::parse_frame(data) {
                Ok(payload) => debug!("control response: {} payload byte(s)", payload.len()),
                Err(e) => debug!("control response not a frame: {e}"),
            }
            return;
        }

        let Some(kind) = FrameKind::from_characteristic(characteristic) else {
            bump(&mut self.diag.frames_unrecognised);
            debug!("no decoder for {}", protocol::format_uuid(characteristic));
            return;
        };
        let Some(delta) = decoder::decode(kind, data) else {
            bump(&mut self.diag.frames_dropped_short);
            debug!(
                "{} frame of {} byte(s) dropped (need {})",
                kind.name(),
                data.len(),
                kind.min_len()
            );
            return;
        };

        bump(&mut self.diag.frames_decoded);
        if delta.rejected > 0 {
            self.diag.values_rejected = self
                .diag
                .values_rejected
                .saturating_add(u32::from(delta.rejected));
            debug!("{}: {} value(s) out of range", kind.name(), delta.rejected);
        }
        self.metrics.apply(kind, &delta, self.clock.now_ms());
        sink.emit(&AppEvent::MetricsUpdated {
            source: kind,
            snapshot: self.metrics.snapshot(),
        });
    }

    /// Write a command frame through the cached control target.
    fn write_command(
        &mut self,
        kind: CommandKind,
        frame: &[u8],
        sink: &mut impl EventSink,
    ) -> Result<()> {
        let target = match (self.fsm.current_state(), self.ctx.link, self.ctx.control_write) {
            (StateId::Ready, Some(link), Some(target)) => (link, target),
            _ => {
                bump(&mut self.diag.commands_dropped_not_ready);
                warn!("{:?} dropped: session not ready", kind);
                return Err(CommandError::NotReady.into());
            }
        };

        if let Err(e) = self.transport.write(target.0, target.1, frame) {
            bump(&mut self.diag.transport_errors);
            warn!("{:?} write failed: {}", kind, e);
            self.cancel_link(target.0);
            self.force_idle(sink);
            return Err(Error::Transport(TransportError::WriteFailed));
        }

        bump(&mut self.diag.commands_written);
        info!("wrote {:?} ({} bytes)", kind, frame.len());
        sink.emit(&AppEvent::CommandWritten {
            kind,
            len: frame.len(),
        });
        Ok(())
    }
}
