//! Simulated ergometer transport.
//!
//! [`SimErg`] implements [`Transport`] in-process.  It advertises one PM5,
//! accepts connections, answers discovery with the real GATT layout and,
//! once subscribed, streams telemetry frames from a background thread at a
//! steady pace.  Every result is posted into the [`Inbox`], exactly as a
//! real radio stack's callbacks would be.
//!
//! Written commands are parsed back with [`csafe::identify`]: a reset
//! restarts the simulated piece, a configure-workout sets its target
//! distance.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};

use crate::app::ports::{
    Advertisement, CharProps, CharacteristicInfo, DeviceId, LinkHandle, RadioState, Transport,
    TransportEvent,
};
use crate::channels::Inbox;
use crate::error::TransportError;
use crate::protocol::csafe::{self, CommandKind};
use crate::protocol::{self, CHAR_CONTROL_RECEIVE, CHAR_CONTROL_TRANSMIT, ServiceGroup};

/// Telemetry frame builders, the inverse of the decoder.
pub mod frames {
    fn put_le16(buf: &mut [u8], at: usize, v: u16) {
        buf[at..at + 2].copy_from_slice(&v.to_le_bytes());
    }

    fn put_le24(buf: &mut [u8], at: usize, v: u32) {
        buf[at..at + 3].copy_from_slice(&v.to_le_bytes()[..3]);
    }

    /// Elapsed time in seconds, distance in meters.
    pub fn general_status(elapsed_secs: f64, distance_m: f64, drag_factor: u8) -> [u8; 19] {
        let mut f = [0u8; 19];
        put_le24(&mut f, 0, (elapsed_secs * 100.0) as u32);
        put_le24(&mut f, 3, (distance_m * 10.0) as u32);
        f[18] = drag_factor;
        f
    }

    pub fn additional_status_1(stroke_rate: u8, stroke_count: u16, pace_secs: f32) -> [u8; 9] {
        let mut f = [0u8; 9];
        put_le16(&mut f, 3, stroke_count);
        f[5] = stroke_rate;
        put_le24(&mut f, 6, (pace_secs * 100.0) as u32);
        f
    }

    pub fn additional_status_2(avg_power_w: u16) -> [u8; 6] {
        let mut f = [0u8; 6];
        put_le16(&mut f, 4, avg_power_w);
        f
    }

    /// Forces in the monitor's native unit.
    pub fn stroke_data(peak_force: f32, avg_force: f32) -> [u8; 16] {
        let mut f = [0u8; 16];
        put_le16(&mut f, 12, (peak_force * 10.0) as u16);
        put_le16(&mut f, 14, (avg_force * 10.0) as u16);
        f
    }

    pub fn additional_stroke_data(power_w: u16) -> [u8; 5] {
        let mut f = [0u8; 5];
        put_le16(&mut f, 3, power_w);
        f
    }
}

/// Simulated machine parameters.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub device: DeviceId,
    pub name: String,
    pub rssi: i8,
    /// Steady pace (s / 500 m).
    pub pace_secs: f32,
    pub stroke_rate: u8,
    pub drag_factor: u8,
    /// Interval between telemetry bursts.
    pub frame_interval: Duration,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            device: DeviceId(0x00A0_C0FF_EE05),
            name: "PM5 430012345 Row".to_string(),
            rssi: -58,
            pace_secs: 120.0,
            stroke_rate: 24,
            drag_factor: 115,
            frame_interval: Duration::from_millis(100),
        }
    }
}

/// State shared with the telemetry thread.
#[derive(Default)]
struct Shared {
    running: AtomicBool,
    restart: AtomicBool,
    target_m: AtomicU32,
}

struct Worker {
    shared: Arc<Shared>,
    handle: JoinHandle<()>,
}

pub struct SimErg {
    inbox: Arc<Inbox>,
    config: SimConfig,
    radio: RadioState,
    next_link: u32,
    link: Option<LinkHandle>,
    subscribed: Vec<u128>,
    written: Vec<CommandKind>,
    fail_next_connect: bool,
    shared: Arc<Shared>,
    worker: Option<Worker>,
}

impl SimErg {
    pub fn new(inbox: Arc<Inbox>) -> Self {
        Self::with_config(inbox, SimConfig::default())
    }

    pub fn with_config(inbox: Arc<Inbox>, config: SimConfig) -> Self {
        Self {
            inbox,
            config,
            radio: RadioState::On,
            next_link: 1,
            link: None,
            subscribed: Vec::new(),
            written: Vec::new(),
            fail_next_connect: false,
            shared: Arc::new(Shared::default()),
            worker: None,
        }
    }

    pub fn device(&self) -> DeviceId {
        self.config.device
    }

    /// Commands the machine received, oldest first.
    pub fn written(&self) -> &[CommandKind] {
        &self.written
    }

    /// Target distance of the configured piece, if any.
    pub fn workout_distance(&self) -> Option<u32> {
        match self.shared.target_m.load(Ordering::Relaxed) {
            0 => None,
            m => Some(m),
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.worker.is_some()
    }

    /// Make the next `connect` report failure asynchronously.
    pub fn fail_next_connect(&mut self) {
        self.fail_next_connect = true;
    }

    /// Flip the radio and report it, as a host OS would.
    pub fn set_radio(&mut self, state: RadioState) {
        self.radio = state;
        if state == RadioState::Off {
            self.stop_worker();
            self.link = None;
        }
        self.inbox.post_event(TransportEvent::RadioStateChanged(state));
    }

    /// Drop the link from the machine's side.
    pub fn drop_link(&mut self) {
        self.stop_worker();
        if let Some(link) = self.link.take() {
            info!("sim: dropping {link}");
            self.inbox.post_event(TransportEvent::Disconnected(link));
        }
    }

    fn check_link(&self, link: LinkHandle) -> Result<(), TransportError> {
        if self.radio == RadioState::Off {
            return Err(TransportError::RadioOff);
        }
        if self.link != Some(link) {
            return Err(TransportError::NotConnected);
        }
        Ok(())
    }

    fn start_worker(&mut self, link: LinkHandle) {
        if self.worker.is_some() {
            return;
        }
        let shared = Arc::clone(&self.shared);
        shared.running.store(true, Ordering::Release);
        let inbox = Arc::clone(&self.inbox);
        let cfg = self.config.clone();
        let thread_shared = Arc::clone(&shared);
        let handle = thread::spawn(move || stream_telemetry(inbox, link, cfg, thread_shared));
        self.worker = Some(Worker { shared, handle });
    }

    fn stop_worker(&mut self) {
        self.subscribed.clear();
        if let Some(worker) = self.worker.take() {
            worker.shared.running.store(false, Ordering::Release);
            if worker.handle.join().is_err() {
                warn!("sim: telemetry thread panicked");
            }
        }
    }
}

impl Drop for SimErg {
    fn drop(&mut self) {
        self.stop_worker();
    }
}

/// Body of the telemetry thread.  One burst of all five frames per
/// interval, one stroke every `60 / stroke_rate` seconds.
fn stream_telemetry(inbox: Arc<Inbox>, link: LinkHandle, cfg: SimConfig, shared: Arc<Shared>) {
    let dt = cfg.frame_interval.as_secs_f64();
    let speed = 500.0 / f64::from(cfg.pace_secs);
    let stroke_period = 60.0 / f64::from(cfg.stroke_rate.max(1));
    // Standard pace-to-watts conversion.
    let power = (2.80 / (f64::from(cfg.pace_secs) / 500.0).powi(3)) as u16;

    let (mut elapsed, mut distance, mut since_stroke) = (0.0f64, 0.0f64, 0.0f64);
    let mut strokes: u16 = 0;

    while shared.running.load(Ordering::Acquire) {
        if shared.restart.swap(false, Ordering::AcqRel) {
            elapsed = 0.0;
            distance = 0.0;
            since_stroke = 0.0;
            strokes = 0;
        }

        elapsed += dt;
        let target = f64::from(shared.target_m.load(Ordering::Relaxed));
        if target == 0.0 || distance < target {
            distance += speed * dt;
        }
        since_stroke += dt;

        let post = |c: u128, bytes: &[u8]| inbox.post_event(TransportEvent::notification(link, c, bytes));
        post(
            protocol::CHAR_GENERAL_STATUS,
            &frames::general_status(elapsed, distance, cfg.drag_factor),
        );
        post(
            protocol::CHAR_ADDITIONAL_STATUS_1,
            &frames::additional_status_1(cfg.stroke_rate, strokes, cfg.pace_secs),
        );
        post(protocol::CHAR_ADDITIONAL_STATUS_2, &frames::additional_status_2(power));

        if since_stroke >= stroke_period {
            since_stroke -= stroke_period;
            strokes = strokes.wrapping_add(1);
            // Vary peak force a little stroke to stroke.
            let peak = 180.0 + f32::from(strokes % 7) * 4.0;
            post(protocol::CHAR_STROKE_DATA, &frames::stroke_data(peak, peak * 0.55));
            post(
                protocol::CHAR_ADDITIONAL_STROKE_DATA,
                &frames::additional_stroke_data(power),
            );
        }

        thread::sleep(cfg.frame_interval);
    }
    debug!("sim: telemetry for {link} stopped");
}

impl Transport for SimErg {
    type Error = TransportError;

    fn radio_state(&self) -> RadioState {
        self.radio
    }

    fn start_scan(&mut self, services: &[u128]) -> Result<(), TransportError> {
        if self.radio == RadioState::Off {
            return Err(TransportError::RadioOff);
        }
        if !services.is_empty() && !services.contains(&protocol::ROWING_SERVICE) {
            return Ok(());
        }
        // A nearby device that does not match the model token.
        self.inbox
            .post_event(TransportEvent::DeviceDiscovered(Advertisement::new(
                DeviceId(0x0000_0000_BEEF),
                "HRM-Dual 1234",
                Some(-71),
            )));
        self.inbox
            .post_event(TransportEvent::DeviceDiscovered(Advertisement::new(
                self.config.device,
                &self.config.name,
                Some(self.config.rssi),
            )));
        Ok(())
    }

    fn stop_scan(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn connect(&mut self, device: DeviceId) -> Result<LinkHandle, TransportError> {
        if self.radio == RadioState::Off {
            return Err(TransportError::RadioOff);
        }
        if device != self.config.device {
            return Err(TransportError::UnknownDevice);
        }
        let link = LinkHandle(self.next_link);
        self.next_link += 1;

        if core::mem::take(&mut self.fail_next_connect) {
            self.inbox.post_event(TransportEvent::ConnectFailed(link));
        } else {
            self.link = Some(link);
            self.inbox.post_event(TransportEvent::Connected(link));
        }
        Ok(link)
    }

    fn cancel(&mut self, link: LinkHandle) -> Result<(), TransportError> {
        if self.link == Some(link) {
            self.stop_worker();
            self.link = None;
        }
        Ok(())
    }

    fn discover_services(
        &mut self,
        link: LinkHandle,
        services: &[u128],
    ) -> Result<(), TransportError> {
        self.check_link(link)?;
        let found: Vec<u128> = protocol::DISCOVERY_SERVICES
            .into_iter()
            .filter(|s| services.contains(s))
            .collect();
        self.inbox.post_event(TransportEvent::services(link, &found));
        Ok(())
    }

    fn discover_characteristics(
        &mut self,
        link: LinkHandle,
        service: u128,
        characteristics: &[u128],
    ) -> Result<(), TransportError> {
        self.check_link(link)?;
        let group = ServiceGroup::from_uuid(service).ok_or(TransportError::DiscoveryFailed)?;
        let infos: Vec<CharacteristicInfo> = group
            .characteristics()
            .iter()
            .filter(|c| characteristics.contains(*c))
            .map(|&uuid| CharacteristicInfo {
                uuid,
                props: if uuid == CHAR_CONTROL_RECEIVE {
                    CharProps::WRITE
                } else {
                    CharProps::NOTIFY
                },
            })
            .collect();
        self.inbox
            .post_event(TransportEvent::characteristics(link, service, &infos));
        Ok(())
    }

    fn subscribe(&mut self, link: LinkHandle, characteristic: u128) -> Result<(), TransportError> {
        self.check_link(link)?;
        if characteristic == CHAR_CONTROL_RECEIVE {
            return Err(TransportError::SubscribeFailed);
        }
        if !self.subscribed.contains(&characteristic) {
            self.subscribed.push(characteristic);
        }
        if characteristic != CHAR_CONTROL_TRANSMIT {
            self.start_worker(link);
        }
        Ok(())
    }

    fn write(
        &mut self,
        link: LinkHandle,
        characteristic: u128,
        data: &[u8],
    ) -> Result<(), TransportError> {
        self.check_link(link)?;
        if characteristic != CHAR_CONTROL_RECEIVE {
            return Err(TransportError::WriteFailed);
        }
        let kind = csafe::identify(data).map_err(|e| {
            warn!("sim: rejected command frame: {e}");
            TransportError::WriteFailed
        })?;

        match kind {
            CommandKind::Reset => {
                self.shared.restart.store(true, Ordering::Release);
                self.shared.target_m.store(0, Ordering::Relaxed);
            }
            CommandKind::ConfigureWorkout { distance_m } => {
                self.shared.restart.store(true, Ordering::Release);
                self.shared.target_m.store(distance_m, Ordering::Relaxed);
            }
        }
        info!("sim: received {:?}", kind);
        self.written.push(kind);

        if self.subscribed.contains(&CHAR_CONTROL_TRANSMIT) {
            // Bare status response.
            let ack = [csafe::FRAME_START, 0x81, 0x81, csafe::FRAME_STOP];
            self.inbox
                .post_event(TransportEvent::notification(link, CHAR_CONTROL_TRANSMIT, &ack));
        }
        Ok(())
    }
}
