//! Integration tests for the connection lifecycle: scan → connect →
//! discover → ready → teardown, plus telemetry flowing into the snapshot.
//!
//! The mock transport only records calls; every asynchronous result is
//! injected by the test, so orderings the radio stack might produce can be
//! replayed exactly.

use super::mock_transport::{
    Call, PM5, advertise, group_characteristics, make_service, notify, to_connecting, to_ready,
    to_ready_in_order,
};

use rowlink::adapters::sim::frames;
use rowlink::app::events::AppEvent;
use rowlink::app::ports::{DeviceId, LinkHandle, RadioState, TransportEvent};
use rowlink::channels::{INBOX_DEPTH, Inbox};
use rowlink::fsm::{SessionStatus, StateId};
use rowlink::protocol::decoder::FrameKind;
use rowlink::runtime;
use rowlink::protocol::{
    self, CHAR_ADDITIONAL_STATUS_1, CHAR_ADDITIONAL_STATUS_2, CHAR_ADDITIONAL_STROKE_DATA,
    CHAR_CONTROL_RECEIVE, CHAR_CONTROL_TRANSMIT, CHAR_GENERAL_STATUS, CHAR_STROKE_DATA,
    CONTROL_SERVICE, ROWING_SERVICE, ServiceGroup,
};

// ── Start-up and scanning ─────────────────────────────────────

#[test]
fn starts_idle_with_nothing_issued() {
    let (svc, _clock, sink) = make_service();

    assert_eq!(svc.state(), StateId::Idle);
    assert_eq!(svc.status(), SessionStatus::Idle);
    assert!(svc.transport().calls.is_empty());
    assert!(matches!(sink.events[0], AppEvent::Started(StateId::Idle)));
}

#[test]
fn scan_requires_radio_on() {
    let (mut svc, _clock, mut sink) = make_service();
    svc.handle_transport_event(&TransportEvent::RadioStateChanged(RadioState::Off), &mut sink);

    svc.start_scan(&mut sink);
    assert_eq!(svc.state(), StateId::Idle);
    assert!(svc.transport().calls.is_empty(), "no scan with the radio off");

    svc.handle_transport_event(&TransportEvent::RadioStateChanged(RadioState::On), &mut sink);
    svc.start_scan(&mut sink);
    assert_eq!(svc.state(), StateId::Scanning);
    assert_eq!(svc.transport().calls, vec![Call::StartScan]);
}

#[test]
fn scan_keeps_only_matching_names() {
    let (mut svc, _clock, mut sink) = make_service();
    svc.start_scan(&mut sink);

    advertise(&mut svc, &mut sink, DeviceId(1), "HRM-Pro 4411");
    advertise(&mut svc, &mut sink, DeviceId(2), "pm5 430099");
    advertise(&mut svc, &mut sink, PM5, "PM5 430012345");
    advertise(&mut svc, &mut sink, DeviceId(3), "");

    let ids: Vec<DeviceId> = svc.devices().iter().map(|d| d.id).collect();
    assert_eq!(ids, vec![DeviceId(2), PM5], "case-insensitive match, order kept");
}

#[test]
fn repeated_advertisement_reported_once() {
    let (mut svc, _clock, mut sink) = make_service();
    svc.start_scan(&mut sink);

    for _ in 0..3 {
        advertise(&mut svc, &mut sink, PM5, "PM5 430012345");
    }

    assert_eq!(svc.devices().len(), 1);
    let reported = sink.count(|e| matches!(e, AppEvent::DeviceDiscovered { id, .. } if *id == PM5));
    assert_eq!(reported, 1);
}

#[test]
fn new_scan_clears_device_list() {
    let (mut svc, _clock, mut sink) = make_service();
    svc.start_scan(&mut sink);
    advertise(&mut svc, &mut sink, PM5, "PM5 430012345");
    svc.stop_scan(&mut sink);
    assert_eq!(svc.state(), StateId::Idle);
    assert_eq!(svc.devices().len(), 1, "list survives stop");

    svc.start_scan(&mut sink);
    assert!(svc.devices().is_empty());
    assert_eq!(
        svc.transport().calls,
        vec![Call::StartScan, Call::StopScan, Call::StartScan]
    );
}

#[test]
fn connect_to_unknown_device_is_ignored() {
    let (mut svc, _clock, mut sink) = make_service();
    svc.start_scan(&mut sink);

    svc.connect(DeviceId(0xDEAD), &mut sink);
    assert_eq!(svc.state(), StateId::Scanning);
    assert!(
        !svc.transport()
            .calls
            .iter()
            .any(|c| matches!(c, Call::Connect(_)))
    );
}

// ── Connect and discovery ─────────────────────────────────────

#[test]
fn full_connect_reaches_ready_with_expected_calls() {
    let (mut svc, _clock, mut sink) = make_service();
    let link = to_ready(&mut svc, &mut sink);

    assert_eq!(svc.state(), StateId::Ready);
    assert_eq!(svc.status(), SessionStatus::Connected);
    assert!(svc.is_ready());
    assert_eq!(svc.control_write_target(), Some(CHAR_CONTROL_RECEIVE));

    let calls = &svc.transport().calls;
    assert_eq!(
        calls[..6],
        [
            Call::StartScan,
            Call::StopScan,
            Call::Connect(PM5),
            Call::DiscoverServices(link),
            Call::DiscoverCharacteristics(link, ROWING_SERVICE),
            Call::DiscoverCharacteristics(link, CONTROL_SERVICE),
        ]
    );

    let subs = svc.transport().subscriptions();
    assert_eq!(
        subs,
        vec![
            CHAR_GENERAL_STATUS,
            CHAR_ADDITIONAL_STATUS_1,
            CHAR_ADDITIONAL_STATUS_2,
            CHAR_STROKE_DATA,
            CHAR_ADDITIONAL_STROKE_DATA,
            CHAR_CONTROL_TRANSMIT,
        ]
    );

    assert_eq!(
        sink.transitions(),
        vec![
            (StateId::Idle, StateId::Scanning),
            (StateId::Scanning, StateId::Connecting),
            (StateId::Connecting, StateId::Discovering),
            (StateId::Discovering, StateId::Ready),
        ]
    );
}

#[test]
fn discovery_results_in_either_order_reach_ready() {
    let (mut svc, _clock, mut sink) = make_service();
    to_ready_in_order(
        &mut svc,
        &mut sink,
        [ServiceGroup::Control, ServiceGroup::Telemetry],
    );
    assert!(svc.is_ready());
    assert_eq!(svc.transport().subscriptions().len(), 6);
}

#[test]
fn one_group_alone_does_not_make_ready() {
    let (mut svc, _clock, mut sink) = make_service();
    let link = to_connecting(&mut svc, &mut sink);
    svc.handle_transport_event(&TransportEvent::Connected(link), &mut sink);
    svc.handle_transport_event(
        &TransportEvent::services(link, &protocol::DISCOVERY_SERVICES),
        &mut sink,
    );
    svc.handle_transport_event(
        &TransportEvent::characteristics(
            link,
            CONTROL_SERVICE,
            &group_characteristics(ServiceGroup::Control),
        ),
        &mut sink,
    );

    assert_eq!(svc.state(), StateId::Discovering);
    assert_eq!(svc.status(), SessionStatus::Connecting);
    assert!(!svc.is_ready());
}

#[test]
fn missing_write_target_keeps_discovering() {
    let (mut svc, _clock, mut sink) = make_service();
    let link = to_connecting(&mut svc, &mut sink);
    svc.handle_transport_event(&TransportEvent::Connected(link), &mut sink);
    svc.handle_transport_event(
        &TransportEvent::services(link, &protocol::DISCOVERY_SERVICES),
        &mut sink,
    );
    svc.handle_transport_event(
        &TransportEvent::characteristics(
            link,
            ROWING_SERVICE,
            &group_characteristics(ServiceGroup::Telemetry),
        ),
        &mut sink,
    );
    // Control group reported without its receive characteristic.
    let control: Vec<_> = group_characteristics(ServiceGroup::Control)
        .into_iter()
        .filter(|c| c.uuid != CHAR_CONTROL_RECEIVE)
        .collect();
    svc.handle_transport_event(
        &TransportEvent::characteristics(link, CONTROL_SERVICE, &control),
        &mut sink,
    );

    assert_eq!(svc.state(), StateId::Discovering);
    assert_eq!(svc.control_write_target(), None);
}

#[test]
fn connect_failed_returns_to_clean_idle() {
    let (mut svc, _clock, mut sink) = make_service();
    let link = to_connecting(&mut svc, &mut sink);

    svc.handle_transport_event(&TransportEvent::ConnectFailed(link), &mut sink);

    assert_eq!(svc.state(), StateId::Idle);
    assert_eq!(svc.link(), None);
    assert_eq!(svc.control_write_target(), None);
    assert!(svc.force_history().is_empty());
    assert_eq!(svc.snapshot(), Default::default());
}

#[test]
fn connect_call_error_returns_to_idle() {
    let (mut svc, _clock, mut sink) = make_service();
    svc.transport_mut().fail_connect = true;

    svc.start_scan(&mut sink);
    advertise(&mut svc, &mut sink, PM5, "PM5 430012345");
    svc.connect(PM5, &mut sink);

    assert_eq!(svc.state(), StateId::Idle);
    assert_eq!(svc.link(), None);
    assert_eq!(svc.diagnostics().transport_errors, 1);
}

#[test]
fn subscribe_and_cancel_errors_are_both_counted() {
    let (mut svc, _clock, mut sink) = make_service();
    svc.transport_mut().fail_subscribe = true;
    svc.transport_mut().fail_cancel = true;

    let link = to_ready(&mut svc, &mut sink);

    assert_eq!(svc.state(), StateId::Idle);
    assert_eq!(svc.link(), None);
    assert!(svc.transport().calls.contains(&Call::Cancel(link)));
    assert_eq!(svc.diagnostics().transport_errors, 2);
}

#[test]
fn subscribe_error_tears_down_link() {
    let (mut svc, _clock, mut sink) = make_service();
    svc.transport_mut().fail_subscribe = true;

    let link = to_ready(&mut svc, &mut sink);

    assert_eq!(svc.state(), StateId::Idle);
    assert_eq!(svc.link(), None);
    assert!(svc.transport().calls.contains(&Call::Cancel(link)));
}

#[test]
fn connect_from_idle_uses_remembered_device() {
    let (mut svc, _clock, mut sink) = make_service();
    svc.start_scan(&mut sink);
    advertise(&mut svc, &mut sink, PM5, "PM5 430012345");
    svc.stop_scan(&mut sink);

    svc.connect(PM5, &mut sink);
    assert_eq!(svc.state(), StateId::Connecting);
    assert_eq!(svc.transport().calls.last(), Some(&Call::Connect(PM5)));
}

// ── Teardown ──────────────────────────────────────────────────

#[test]
fn disconnect_survives_a_notification_flood() {
    let (mut svc, _clock, mut sink) = make_service();
    let link = to_ready(&mut svc, &mut sink);
    let inbox = Inbox::new();
    let frame = frames::general_status(30.0, 120.0, 110);

    for _ in 0..INBOX_DEPTH {
        assert!(inbox.post_event(TransportEvent::notification(link, CHAR_GENERAL_STATUS, &frame)));
    }
    assert!(!inbox.post_event(TransportEvent::notification(link, CHAR_GENERAL_STATUS, &frame)));
    assert!(inbox.post_event(TransportEvent::Disconnected(link)));

    while !inbox.is_empty() {
        assert!(runtime::drain_once(&mut svc, &inbox, &mut sink).is_continue());
    }

    assert_eq!(svc.state(), StateId::Idle);
    assert_eq!(svc.link(), None);
    assert_eq!(svc.snapshot(), Default::default());
    let diag = svc.diagnostics();
    assert_eq!(diag.inbox_overflows, 1);
    assert_eq!(diag.frames_decoded, 0, "disconnect is handled before the backlog");
    assert_eq!(diag.stale_events, INBOX_DEPTH as u32);
}

#[test]
fn remote_disconnect_resets_metrics_and_reports_link_lost() {
    let (mut svc, _clock, mut sink) = make_service();
    let link = to_ready(&mut svc, &mut sink);
    notify(
        &mut svc,
        &mut sink,
        link,
        CHAR_GENERAL_STATUS,
        &frames::general_status(30.0, 120.0, 110),
    );
    assert!(svc.snapshot().distance_m > 0.0);

    svc.handle_transport_event(&TransportEvent::Disconnected(link), &mut sink);

    assert_eq!(svc.state(), StateId::Idle);
    assert_eq!(svc.link(), None);
    assert_eq!(svc.control_write_target(), None);
    assert_eq!(svc.snapshot(), Default::default());
    assert_eq!(sink.count(|e| matches!(e, AppEvent::LinkLost(l) if *l == link)), 1);
    assert!(
        !svc.transport().calls.contains(&Call::Cancel(link)),
        "remote drop needs no cancel"
    );
}

#[test]
fn explicit_disconnect_cancels_link() {
    let (mut svc, _clock, mut sink) = make_service();
    let link = to_ready(&mut svc, &mut sink);

    svc.disconnect(&mut sink);

    assert_eq!(svc.state(), StateId::Idle);
    assert_eq!(svc.transport().calls.last(), Some(&Call::Cancel(link)));
    assert!(!svc.is_ready());
}

#[test]
fn disconnect_while_connecting_abandons_attempt() {
    let (mut svc, _clock, mut sink) = make_service();
    let link = to_connecting(&mut svc, &mut sink);

    svc.disconnect(&mut sink);
    assert_eq!(svc.state(), StateId::Idle);
    assert_eq!(svc.transport().calls.last(), Some(&Call::Cancel(link)));

    // The abandoned link finishing late changes nothing.
    svc.handle_transport_event(&TransportEvent::Connected(link), &mut sink);
    assert_eq!(svc.state(), StateId::Idle);
    assert_eq!(svc.diagnostics().stale_events, 1);
}

#[test]
fn radio_off_in_ready_drops_everything() {
    let (mut svc, _clock, mut sink) = make_service();
    to_ready(&mut svc, &mut sink);
    let calls_before = svc.transport().calls.len();

    svc.handle_transport_event(&TransportEvent::RadioStateChanged(RadioState::Off), &mut sink);

    assert_eq!(svc.state(), StateId::Idle);
    assert_eq!(svc.link(), None);
    assert!(svc.devices().is_empty());
    assert_eq!(
        svc.transport().calls.len(),
        calls_before,
        "no transport calls with the radio off"
    );
}

#[test]
fn radio_off_while_scanning_skips_stop_scan() {
    let (mut svc, _clock, mut sink) = make_service();
    svc.start_scan(&mut sink);

    svc.handle_transport_event(&TransportEvent::RadioStateChanged(RadioState::Off), &mut sink);

    assert_eq!(svc.state(), StateId::Idle);
    assert_eq!(svc.transport().calls, vec![Call::StartScan]);
}

// ── Stale events ──────────────────────────────────────────────

#[test]
fn events_for_other_links_are_ignored() {
    let (mut svc, _clock, mut sink) = make_service();
    let link = to_ready(&mut svc, &mut sink);
    let stranger = LinkHandle(link.0 + 40);

    svc.handle_transport_event(&TransportEvent::Disconnected(stranger), &mut sink);
    svc.handle_transport_event(&TransportEvent::Connected(stranger), &mut sink);
    notify(
        &mut svc,
        &mut sink,
        stranger,
        CHAR_GENERAL_STATUS,
        &frames::general_status(10.0, 40.0, 100),
    );

    assert_eq!(svc.state(), StateId::Ready);
    assert_eq!(svc.link(), Some(link));
    assert_eq!(svc.snapshot(), Default::default());
    assert_eq!(svc.diagnostics().stale_events, 3);
}

#[test]
fn notifications_after_teardown_are_dropped() {
    let (mut svc, _clock, mut sink) = make_service();
    let link = to_ready(&mut svc, &mut sink);
    svc.disconnect(&mut sink);

    notify(
        &mut svc,
        &mut sink,
        link,
        CHAR_STROKE_DATA,
        &frames::stroke_data(250.0, 120.0),
    );

    assert_eq!(svc.snapshot(), Default::default());
    assert!(svc.force_history().is_empty());
}

// ── Telemetry ─────────────────────────────────────────────────

#[test]
fn telemetry_frames_fill_snapshot() {
    let (mut svc, clock, mut sink) = make_service();
    let link = to_ready(&mut svc, &mut sink);
    clock.set(12_345);

    notify(
        &mut svc,
        &mut sink,
        link,
        CHAR_GENERAL_STATUS,
        &frames::general_status(125.5, 512.5, 118),
    );
    notify(
        &mut svc,
        &mut sink,
        link,
        CHAR_ADDITIONAL_STATUS_1,
        &frames::additional_status_1(26, 48, 118.5),
    );
    notify(
        &mut svc,
        &mut sink,
        link,
        CHAR_STROKE_DATA,
        &frames::stroke_data(310.0, 160.0),
    );
    notify(
        &mut svc,
        &mut sink,
        link,
        CHAR_ADDITIONAL_STROKE_DATA,
        &frames::additional_stroke_data(240),
    );
    notify(
        &mut svc,
        &mut sink,
        link,
        CHAR_ADDITIONAL_STATUS_2,
        &frames::additional_status_2(225),
    );

    let s = svc.snapshot();
    assert!((s.elapsed_secs - 125.5).abs() < 0.01);
    assert!((s.distance_m - 512.5).abs() < 0.01);
    assert_eq!(s.drag_factor, 118);
    assert_eq!(s.stroke_rate, 26);
    assert_eq!(s.stroke_count, 48);
    assert!((s.pace_secs - 118.5).abs() < 0.01);
    assert!((s.peak_force - 310.0).abs() < 0.01);
    assert!((s.avg_force - 160.0).abs() < 0.01);
    assert_eq!(s.power_w, 240);
    assert_eq!(s.avg_power_w, 225);
    assert_eq!(s.captured_at_ms, Some(12_345));

    assert_eq!(svc.force_history().to_vec(), vec![310.0]);
    assert_eq!(svc.diagnostics().frames_decoded, 5);

    let sources: Vec<FrameKind> = sink
        .events
        .iter()
        .filter_map(|e| match e {
            AppEvent::MetricsUpdated { source, .. } => Some(*source),
            _ => None,
        })
        .collect();
    assert_eq!(sources.len(), 5);
    assert_eq!(sources[0], FrameKind::GeneralStatus);
}

#[test]
fn telemetry_accepted_while_discovering() {
    let (mut svc, _clock, mut sink) = make_service();
    let link = to_connecting(&mut svc, &mut sink);
    svc.handle_transport_event(&TransportEvent::Connected(link), &mut sink);
    assert_eq!(svc.state(), StateId::Discovering);

    notify(
        &mut svc,
        &mut sink,
        link,
        CHAR_GENERAL_STATUS,
        &frames::general_status(5.0, 20.0, 100),
    );
    assert!((svc.snapshot().distance_m - 20.0).abs() < 0.01);
}

#[test]
fn short_frames_are_dropped_and_counted() {
    let (mut svc, _clock, mut sink) = make_service();
    let link = to_ready(&mut svc, &mut sink);

    let full = frames::general_status(60.0, 250.0, 120);
    notify(&mut svc, &mut sink, link, CHAR_GENERAL_STATUS, &full[..18]);
    notify(&mut svc, &mut sink, link, CHAR_STROKE_DATA, &[]);

    assert_eq!(svc.snapshot(), Default::default());
    let d = svc.diagnostics();
    assert_eq!(d.frames_dropped_short, 2);
    assert_eq!(d.frames_decoded, 0);
}

#[test]
fn out_of_range_values_leave_snapshot_untouched() {
    let (mut svc, _clock, mut sink) = make_service();
    let link = to_ready(&mut svc, &mut sink);

    notify(
        &mut svc,
        &mut sink,
        link,
        CHAR_ADDITIONAL_STATUS_1,
        &frames::additional_status_1(24, 10, 121.0),
    );
    // Rate 0, pace beyond ten minutes.
    notify(
        &mut svc,
        &mut sink,
        link,
        CHAR_ADDITIONAL_STATUS_1,
        &frames::additional_status_1(0, 11, 700.0),
    );
    // Peak force above the gate.
    notify(
        &mut svc,
        &mut sink,
        link,
        CHAR_STROKE_DATA,
        &frames::stroke_data(612.0, 150.0),
    );

    let s = svc.snapshot();
    assert_eq!(s.stroke_rate, 24);
    assert!((s.pace_secs - 121.0).abs() < 0.01);
    assert_eq!(s.stroke_count, 11, "ungated fields still update");
    assert_eq!(s.peak_force, 0.0);
    assert!(svc.force_history().is_empty());
    assert_eq!(svc.diagnostics().values_rejected, 3);
}

#[test]
fn unknown_characteristic_is_counted() {
    let (mut svc, _clock, mut sink) = make_service();
    let link = to_ready(&mut svc, &mut sink);

    notify(&mut svc, &mut sink, link, protocol::pm5_uuid(0x0080), &[1, 2, 3]);

    assert_eq!(svc.diagnostics().frames_unrecognised, 1);
    assert_eq!(svc.snapshot(), Default::default());
}

#[test]
fn force_history_keeps_newest_twenty() {
    let (mut svc, _clock, mut sink) = make_service();
    let link = to_ready(&mut svc, &mut sink);

    for i in 1..=25u16 {
        let peak = 100.0 + f32::from(i);
        notify(
            &mut svc,
            &mut sink,
            link,
            CHAR_STROKE_DATA,
            &frames::stroke_data(peak, 80.0),
        );
    }

    let history = svc.force_history().to_vec();
    assert_eq!(history.len(), 20);
    assert!((history[0] - 106.0).abs() < 0.01);
    assert!((history[19] - 125.0).abs() < 0.01);

    let trend = svc.force_trend().expect("enough samples for a trend");
    assert!((trend.max - 125.0).abs() < 0.01);
    assert!(trend.delta > 0.0, "steadily rising force");
}

#[test]
fn reset_metrics_is_idempotent_and_keeps_link() {
    let (mut svc, _clock, mut sink) = make_service();
    let link = to_ready(&mut svc, &mut sink);
    notify(
        &mut svc,
        &mut sink,
        link,
        CHAR_STROKE_DATA,
        &frames::stroke_data(220.0, 110.0),
    );

    svc.reset_metrics();
    svc.reset_metrics();

    assert_eq!(svc.snapshot(), Default::default());
    assert!(svc.force_history().is_empty());
    assert!(svc.is_ready());
    assert_eq!(svc.link(), Some(link));
}
