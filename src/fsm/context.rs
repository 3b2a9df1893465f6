//! Shared mutable context threaded through every FSM handler.
//!
//! `SessionContext` is the single struct that state handlers read from and
//! write to.  It holds the discovered-device list, the owned link and
//! cached write target, discovery progress, and the queue of transport
//! actions the handlers request.  Handlers never call the transport
//! themselves; the service drains [`SessionContext::actions`] after each
//! dispatch.

use heapless::{Deque, String, Vec};
use log::{debug, warn};
use serde::Serialize;

use crate::app::ports::{
    Advertisement, CharacteristicInfo, DeviceId, LinkHandle, MAX_NAME_LEN, RadioState,
};
use crate::config::EngineConfig;
use crate::diagnostics::bump;
use crate::protocol::ServiceGroup;

/// Devices kept per scan.
pub const MAX_DEVICES: usize = 16;

/// Transport actions a single dispatch may queue.
pub const ACTION_QUEUE_CAP: usize = 16;

// ---------------------------------------------------------------------------
// Discovered devices
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredDevice {
    pub id: DeviceId,
    pub name: String<MAX_NAME_LEN>,
    pub rssi: Option<i8>,
}

/// Outcome of offering an advertisement to the [`DeviceList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceInsert {
    Added,
    /// Already known; RSSI refreshed.
    Updated,
    /// Name does not contain the model token.
    Filtered,
    /// List is at capacity.
    Full,
}

/// ASCII case-insensitive substring test.
pub fn contains_ignore_ascii_case(haystack: &str, needle: &str) -> bool {
    let (h, n) = (haystack.as_bytes(), needle.as_bytes());
    if n.is_empty() {
        return true;
    }
    h.windows(n.len()).any(|w| w.eq_ignore_ascii_case(n))
}

/// Machines seen during the current scan, keyed by transport identity.
#[derive(Debug, Clone, Default)]
pub struct DeviceList {
    devices: Vec<DiscoveredDevice, MAX_DEVICES>,
}

impl DeviceList {
    pub const fn new() -> Self {
        Self {
            devices: Vec::new(),
        }
    }

    /// Add `adv` if its name matches `token`; refresh RSSI if known.
    pub fn offer(&mut self, adv: &Advertisement, token: &str) -> DeviceInsert {
        if !contains_ignore_ascii_case(&adv.name, token) {
            return DeviceInsert::Filtered;
        }
        if let Some(known) = self.devices.iter_mut().find(|d| d.id == adv.id) {
            if adv.rssi.is_some() {
                known.rssi = adv.rssi;
            }
            return DeviceInsert::Updated;
        }
        let entry = DiscoveredDevice {
            id: adv.id,
            name: adv.name.clone(),
            rssi: adv.rssi,
        };
        match self.devices.push(entry) {
            Ok(()) => DeviceInsert::Added,
            Err(_) => DeviceInsert::Full,
        }
    }

    pub fn contains(&self, id: DeviceId) -> bool {
        self.devices.iter().any(|d| d.id == id)
    }

    pub fn get(&self, id: DeviceId) -> Option<&DiscoveredDevice> {
        self.devices.iter().find(|d| d.id == id)
    }

    pub fn as_slice(&self) -> &[DiscoveredDevice] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn clear(&mut self) {
        self.devices.clear();
    }
}

// ---------------------------------------------------------------------------
// Transport actions (handler output)
// ---------------------------------------------------------------------------

/// A transport call requested by a state handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAction {
    StartScan,
    StopScan,
    Connect(DeviceId),
    Cancel(LinkHandle),
    DiscoverServices(LinkHandle),
    DiscoverCharacteristics(LinkHandle, ServiceGroup),
    Subscribe(LinkHandle, u128),
}

// ---------------------------------------------------------------------------
// Discovery progress
// ---------------------------------------------------------------------------

/// Which service groups have had their characteristics enumerated.
/// Groups may complete in either order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoveryProgress {
    pub telemetry: bool,
    pub control: bool,
}

impl DiscoveryProgress {
    pub fn mark(&mut self, group: ServiceGroup) {
        match group {
            ServiceGroup::Telemetry => self.telemetry = true,
            ServiceGroup::Control => self.control = true,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.telemetry && self.control
    }
}

// ---------------------------------------------------------------------------
// FSM input
// ---------------------------------------------------------------------------

/// Everything that can move the session state machine.  Telemetry
/// notifications are not FSM input; the service routes them directly.
#[derive(Debug, Clone, Copy)]
pub enum SessionEvent<'a> {
    StartScan,
    StopScan,
    Connect(DeviceId),
    Disconnect,
    Radio(RadioState),
    Discovered(&'a Advertisement),
    Connected(LinkHandle),
    ConnectFailed(LinkHandle),
    ServicesDiscovered {
        link: LinkHandle,
        services: &'a [u128],
    },
    CharacteristicsDiscovered {
        link: LinkHandle,
        service: u128,
        characteristics: &'a [CharacteristicInfo],
    },
    Disconnected(LinkHandle),
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// The blackboard shared by every state handler.
pub struct SessionContext {
    pub config: EngineConfig,
    /// Last known wireless capability state.
    pub radio: RadioState,
    pub devices: DeviceList,
    /// Device a connection was requested for.
    pub target: Option<DeviceId>,
    /// The one link this session owns.
    pub link: Option<LinkHandle>,
    /// Cached control write target, once discovered.
    pub control_write: Option<u128>,
    pub discovery: DiscoveryProgress,
    /// Transport calls queued by handlers, drained by the service.
    pub actions: Deque<LinkAction, ACTION_QUEUE_CAP>,
    /// Set when entering Idle released a link; consumed by the service.
    pub link_released: bool,
    /// Events ignored because they referenced a link we no longer own.
    pub stale_events: u32,
}

impl SessionContext {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            radio: RadioState::Off,
            devices: DeviceList::new(),
            target: None,
            link: None,
            control_write: None,
            discovery: DiscoveryProgress::default(),
            actions: Deque::new(),
            link_released: false,
            stale_events: 0,
        }
    }

    /// Queue a transport call for the service to perform.
    pub fn push_action(&mut self, action: LinkAction) {
        if self.actions.push_back(action).is_err() {
            warn!("action queue full, dropping {:?}", action);
        }
    }

    /// True if `link` is the link this session currently owns.
    /// Anything else is stale and counted.
    pub fn owns(&mut self, link: LinkHandle) -> bool {
        if self.link == Some(link) {
            true
        } else {
            bump(&mut self.stale_events);
            debug!("ignoring event for stale {} (own {:?})", link, self.link);
            false
        }
    }

    /// Drop every per-link field.  Returns the released link, if any.
    pub fn release_link(&mut self) -> Option<LinkHandle> {
        self.target = None;
        self.control_write = None;
        self.discovery = DiscoveryProgress::default();
        self.link.take()
    }

    pub fn is_control_ready(&self) -> bool {
        self.link.is_some() && self.control_write.is_some()
    }
}
