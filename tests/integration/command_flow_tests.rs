//! Integration tests for the command path: readiness gating, exact frame
//! bytes on the wire and the settle delay between reset and configure.

use super::mock_transport::{Call, PM5, advertise, make_service, make_service_with, to_ready};

use rowlink::app::commands::UserCommand;
use rowlink::app::events::AppEvent;
use rowlink::app::ports::TransportEvent;
use rowlink::config::EngineConfig;
use rowlink::error::{CommandError, Error, TransportError};
use rowlink::fsm::StateId;
use rowlink::protocol::CHAR_CONTROL_RECEIVE;
use rowlink::protocol::csafe::{self, CommandKind};

const RESET_FRAME: [u8; 5] = [0xF1, 0x86, 0x87, 0x01, 0xF2];

// ── Readiness gating ──────────────────────────────────────────

#[test]
fn commands_before_ready_are_dropped() {
    let (mut svc, _clock, mut sink) = make_service();

    assert_eq!(
        svc.reset_workout(&mut sink),
        Err(Error::Command(CommandError::NotReady))
    );
    assert_eq!(
        svc.configure_workout(2_000, &mut sink),
        Err(Error::Command(CommandError::NotReady))
    );

    assert!(svc.transport().writes().is_empty());
    assert_eq!(svc.pending_configure(), None);
    assert_eq!(svc.diagnostics().commands_dropped_not_ready, 2);
}

#[test]
fn commands_while_discovering_are_dropped() {
    let (mut svc, _clock, mut sink) = make_service();
    svc.start_scan(&mut sink);
    advertise(&mut svc, &mut sink, PM5, "PM5 430012345");
    svc.connect(PM5, &mut sink);
    let link = svc.link().expect("link issued");
    svc.handle_transport_event(&TransportEvent::Connected(link), &mut sink);
    assert_eq!(svc.state(), StateId::Discovering);

    svc.handle_command(UserCommand::ResetWorkout, &mut sink);

    assert!(svc.transport().writes().is_empty());
    assert_eq!(svc.state(), StateId::Discovering);
}

// ── Frame bytes ───────────────────────────────────────────────

#[test]
fn reset_workout_writes_exact_frame() {
    let (mut svc, _clock, mut sink) = make_service();
    let link = to_ready(&mut svc, &mut sink);

    svc.reset_workout(&mut sink).expect("ready session accepts reset");

    assert_eq!(
        svc.transport().calls.last(),
        Some(&Call::Write(link, CHAR_CONTROL_RECEIVE, RESET_FRAME.to_vec()))
    );
    assert_eq!(
        sink.count(|e| matches!(
            e,
            AppEvent::CommandWritten {
                kind: CommandKind::Reset,
                len: 5
            }
        )),
        1
    );
}

#[test]
fn configure_waits_out_settle_delay() {
    let (mut svc, clock, mut sink) = make_service();
    to_ready(&mut svc, &mut sink);
    clock.set(1_000);

    svc.reset_workout(&mut sink).expect("reset");
    svc.configure_workout(2_000, &mut sink).expect("configure");

    // Two resets so far; the configure frame is parked.
    assert_eq!(svc.transport().writes(), vec![RESET_FRAME.to_vec(); 2]);
    assert_eq!(svc.pending_configure(), Some(2_000));
    assert_eq!(svc.next_deadline_ms(), Some(1_500));

    clock.advance(499);
    svc.poll(&mut sink);
    assert_eq!(svc.transport().writes().len(), 2);

    clock.advance(1);
    svc.poll(&mut sink);
    let writes = svc.transport().writes();
    assert_eq!(writes.len(), 3);
    assert_eq!(
        writes[2],
        vec![0xF1, 0x1A, 0x07, 0x01, 0x01, 0x03, 0xD0, 0x07, 0x00, 0x00, 0xC9, 0xF2]
    );
    assert_eq!(
        csafe::identify(&writes[2]),
        Ok(CommandKind::ConfigureWorkout { distance_m: 2_000 })
    );
    assert_eq!(svc.pending_configure(), None);
    assert_eq!(svc.next_deadline_ms(), None);

    // Nothing left to fire.
    clock.advance(10_000);
    svc.poll(&mut sink);
    assert_eq!(svc.transport().writes().len(), 3);
}

#[test]
fn settle_delay_follows_config() {
    let config = EngineConfig::default().with_settle_delay_ms(50);
    let (mut svc, clock, mut sink) = make_service_with(config);
    to_ready(&mut svc, &mut sink);

    svc.configure_workout(500, &mut sink).expect("configure");
    clock.advance(50);
    svc.poll(&mut sink);

    assert_eq!(svc.transport().writes().len(), 2);
}

#[test]
fn newer_configure_replaces_pending_one() {
    let (mut svc, clock, mut sink) = make_service();
    to_ready(&mut svc, &mut sink);

    svc.configure_workout(2_000, &mut sink).expect("first");
    clock.advance(200);
    svc.configure_workout(5_000, &mut sink).expect("second");
    assert_eq!(svc.pending_configure(), Some(5_000));

    clock.advance(300);
    svc.poll(&mut sink);
    assert_eq!(svc.transport().writes().len(), 2, "deadline moved with the newer request");

    clock.advance(200);
    svc.poll(&mut sink);
    let writes = svc.transport().writes();
    assert_eq!(writes.len(), 3);
    assert_eq!(
        csafe::identify(&writes[2]),
        Ok(CommandKind::ConfigureWorkout { distance_m: 5_000 })
    );
}

#[test]
fn pending_configure_dropped_on_disconnect() {
    let (mut svc, clock, mut sink) = make_service();
    let link = to_ready(&mut svc, &mut sink);

    svc.configure_workout(1_000, &mut sink).expect("configure");
    svc.handle_transport_event(&TransportEvent::Disconnected(link), &mut sink);
    assert_eq!(svc.pending_configure(), None);

    clock.advance(1_000);
    svc.poll(&mut sink);
    assert_eq!(svc.transport().writes().len(), 1, "only the reset went out");
    assert_eq!(svc.diagnostics().commands_dropped_not_ready, 0);
}

// ── Failures ──────────────────────────────────────────────────

#[test]
fn write_failure_tears_down_session() {
    let (mut svc, _clock, mut sink) = make_service();
    let link = to_ready(&mut svc, &mut sink);
    svc.transport_mut().fail_write = true;

    assert_eq!(
        svc.configure_workout(2_000, &mut sink),
        Err(Error::Transport(TransportError::WriteFailed))
    );

    assert_eq!(svc.state(), StateId::Idle);
    assert_eq!(svc.link(), None);
    assert_eq!(svc.pending_configure(), None);
    assert!(svc.transport().calls.contains(&Call::Cancel(link)));
    assert_eq!(svc.diagnostics().transport_errors, 1);
}

#[test]
fn failed_cancel_after_write_failure_is_counted() {
    let (mut svc, _clock, mut sink) = make_service();
    let link = to_ready(&mut svc, &mut sink);
    svc.transport_mut().fail_write = true;
    svc.transport_mut().fail_cancel = true;

    assert!(svc.configure_workout(2_000, &mut sink).is_err());

    assert_eq!(svc.state(), StateId::Idle);
    assert_eq!(svc.link(), None);
    assert!(svc.transport().calls.contains(&Call::Cancel(link)));
    assert_eq!(svc.diagnostics().transport_errors, 2);
}

// ── UserCommand routing ───────────────────────────────────────

#[test]
fn user_commands_drive_whole_session() {
    let (mut svc, clock, mut sink) = make_service();

    svc.handle_command(UserCommand::StartScan, &mut sink);
    advertise(&mut svc, &mut sink, PM5, "PM5 430012345");
    svc.handle_command(UserCommand::Connect(PM5), &mut sink);
    assert_eq!(svc.state(), StateId::Connecting);
    svc.handle_command(UserCommand::Disconnect, &mut sink);
    assert_eq!(svc.state(), StateId::Idle);

    to_ready(&mut svc, &mut sink);
    svc.handle_command(
        UserCommand::ConfigureWorkout { distance_m: 1_000 },
        &mut sink,
    );
    clock.advance(u64::from(svc.config().settle_delay_ms));
    svc.poll(&mut sink);

    let kinds: Vec<CommandKind> = svc
        .transport()
        .writes()
        .iter()
        .map(|w| csafe::identify(w).expect("frames we built parse"))
        .collect();
    assert_eq!(
        kinds,
        vec![
            CommandKind::Reset,
            CommandKind::ConfigureWorkout { distance_m: 1_000 }
        ]
    );

    svc.handle_command(UserCommand::ResetMetrics, &mut sink);
    assert!(svc.is_ready());
    svc.handle_command(UserCommand::StopScan, &mut sink);
    assert_eq!(svc.state(), StateId::Ready, "stop scan means nothing once connected");
}
