//! Mock transport and event sink for integration tests.
//!
//! `MockTransport` records every call and never produces events on its
//! own; tests script the radio stack's answers by feeding
//! `TransportEvent`s to the service, in whatever order they want.

use rowlink::RowerService;
use rowlink::adapters::time::ManualClock;
use rowlink::app::events::AppEvent;
use rowlink::app::ports::{
    Advertisement, CharProps, CharacteristicInfo, DeviceId, EventSink, LinkHandle, RadioState,
    Transport, TransportEvent,
};
use rowlink::config::EngineConfig;
use rowlink::error::TransportError;
use rowlink::fsm::StateId;
use rowlink::protocol::{self, CHAR_CONTROL_RECEIVE, ServiceGroup};

// ── Transport call record ─────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    StartScan,
    StopScan,
    Connect(DeviceId),
    Cancel(LinkHandle),
    DiscoverServices(LinkHandle),
    DiscoverCharacteristics(LinkHandle, u128),
    Subscribe(LinkHandle, u128),
    Write(LinkHandle, u128, Vec<u8>),
}

// ── MockTransport ─────────────────────────────────────────────

pub struct MockTransport {
    pub calls: Vec<Call>,
    pub radio: RadioState,
    pub next_link: u32,
    pub fail_scan: bool,
    pub fail_connect: bool,
    pub fail_subscribe: bool,
    pub fail_write: bool,
    pub fail_cancel: bool,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            radio: RadioState::On,
            next_link: 1,
            fail_scan: false,
            fail_connect: false,
            fail_subscribe: false,
            fail_write: false,
            fail_cancel: false,
        }
    }

    /// Every buffer written, oldest first.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Write(_, _, data) => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn subscriptions(&self) -> Vec<u128> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Subscribe(_, uuid) => Some(*uuid),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }
}

impl Transport for MockTransport {
    type Error = TransportError;

    fn radio_state(&self) -> RadioState {
        self.radio
    }

    fn start_scan(&mut self, _services: &[u128]) -> Result<(), TransportError> {
        self.calls.push(Call::StartScan);
        if self.fail_scan {
            return Err(TransportError::ScanFailed);
        }
        Ok(())
    }

    fn stop_scan(&mut self) -> Result<(), TransportError> {
        self.calls.push(Call::StopScan);
        Ok(())
    }

    fn connect(&mut self, device: DeviceId) -> Result<LinkHandle, TransportError> {
        self.calls.push(Call::Connect(device));
        if self.fail_connect {
            return Err(TransportError::UnknownDevice);
        }
        let link = LinkHandle(self.next_link);
        self.next_link += 1;
        Ok(link)
    }

    fn cancel(&mut self, link: LinkHandle) -> Result<(), TransportError> {
        self.calls.push(Call::Cancel(link));
        if self.fail_cancel {
            return Err(TransportError::NotConnected);
        }
        Ok(())
    }

    fn discover_services(
        &mut self,
        link: LinkHandle,
        _services: &[u128],
    ) -> Result<(), TransportError> {
        self.calls.push(Call::DiscoverServices(link));
        Ok(())
    }

    fn discover_characteristics(
        &mut self,
        link: LinkHandle,
        service: u128,
        _characteristics: &[u128],
    ) -> Result<(), TransportError> {
        self.calls.push(Call::DiscoverCharacteristics(link, service));
        Ok(())
    }

    fn subscribe(&mut self, link: LinkHandle, characteristic: u128) -> Result<(), TransportError> {
        self.calls.push(Call::Subscribe(link, characteristic));
        if self.fail_subscribe {
            return Err(TransportError::SubscribeFailed);
        }
        Ok(())
    }

    fn write(
        &mut self,
        link: LinkHandle,
        characteristic: u128,
        data: &[u8],
    ) -> Result<(), TransportError> {
        self.calls
            .push(Call::Write(link, characteristic, data.to_vec()));
        if self.fail_write {
            return Err(TransportError::WriteFailed);
        }
        Ok(())
    }
}

// ── RecordingSink ─────────────────────────────────────────────

pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn transitions(&self) -> Vec<(StateId, StateId)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::StateChanged { from, to } => Some((*from, *to)),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Session harness ───────────────────────────────────────────

pub type Service = RowerService<MockTransport, ManualClock>;

pub const PM5: DeviceId = DeviceId(0x0000_5EED_0005);

#[allow(dead_code)]
pub fn make_service() -> (Service, ManualClock, RecordingSink) {
    make_service_with(EngineConfig::default())
}

pub fn make_service_with(config: EngineConfig) -> (Service, ManualClock, RecordingSink) {
    let clock = ManualClock::new();
    let mut svc = RowerService::new(config, MockTransport::new(), clock.clone());
    let mut sink = RecordingSink::new();
    svc.start(&mut sink);
    (svc, clock, sink)
}

pub fn advertise(svc: &mut Service, sink: &mut RecordingSink, id: DeviceId, name: &str) {
    let adv = Advertisement::new(id, name, Some(-60));
    svc.handle_transport_event(&TransportEvent::DeviceDiscovered(adv), sink);
}

/// Characteristics a real PM5 reports for `group`.
pub fn group_characteristics(group: ServiceGroup) -> Vec<CharacteristicInfo> {
    group
        .characteristics()
        .iter()
        .map(|&uuid| CharacteristicInfo {
            uuid,
            props: if uuid == CHAR_CONTROL_RECEIVE {
                CharProps::WRITE
            } else {
                CharProps::NOTIFY
            },
        })
        .collect()
}

/// Scan, find the PM5 and connect; stops once the connect call is issued.
#[allow(dead_code)]
pub fn to_connecting(svc: &mut Service, sink: &mut RecordingSink) -> LinkHandle {
    svc.start_scan(sink);
    advertise(svc, sink, PM5, "PM5 430012345");
    svc.connect(PM5, sink);
    svc.link().expect("connect call should have issued a link")
}

/// Drive a full session up to Ready, answering discovery in `order`.
pub fn to_ready_in_order(
    svc: &mut Service,
    sink: &mut RecordingSink,
    order: [ServiceGroup; 2],
) -> LinkHandle {
    let link = to_connecting(svc, sink);
    svc.handle_transport_event(&TransportEvent::Connected(link), sink);
    svc.handle_transport_event(
        &TransportEvent::services(link, &protocol::DISCOVERY_SERVICES),
        sink,
    );
    for group in order {
        svc.handle_transport_event(
            &TransportEvent::characteristics(link, group.uuid(), &group_characteristics(group)),
            sink,
        );
    }
    link
}

#[allow(dead_code)]
pub fn to_ready(svc: &mut Service, sink: &mut RecordingSink) -> LinkHandle {
    to_ready_in_order(svc, sink, ServiceGroup::ALL)
}

#[allow(dead_code)]
pub fn notify(svc: &mut Service, sink: &mut RecordingSink, link: LinkHandle, uuid: u128, data: &[u8]) {
    svc.handle_transport_event(&TransportEvent::notification(link, uuid, data), sink);
}
