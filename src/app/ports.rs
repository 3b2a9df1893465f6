//! Port traits: the hexagonal boundary between the session core and the
//! outside world.
//!
//! ```text
//!   Transport adapter ──▶ TransportEvent ──▶ Inbox ──▶ RowerService
//!   RowerService ──▶ Transport (fire-and-forget calls)
//!   RowerService ──▶ EventSink (UI, relay, log)
//! ```
//!
//! Transport calls never block and never deliver results directly: every
//! outcome (connected, discovered, notified, disconnected) comes back later
//! as a [`TransportEvent`] posted into the inbox from the transport's own
//! delivery context.

use core::fmt;

use heapless::{String, Vec};
use log::warn;
use serde::{Deserialize, Serialize};

// ───────────────────────────────────────────────────────────────
// Identities
// ───────────────────────────────────────────────────────────────

/// Transport-level identity of an advertising device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(pub u64);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dev-{:012x}", self.0)
    }
}

/// Handle for one connection attempt.  A new handle is issued for every
/// `connect` call so events from an abandoned link can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkHandle(pub u32);

impl fmt::Display for LinkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link#{}", self.0)
    }
}

/// Wireless capability state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RadioState {
    On,
    Off,
}

// ───────────────────────────────────────────────────────────────
// Event payloads
// ───────────────────────────────────────────────────────────────

pub const MAX_NAME_LEN: usize = 32;
pub const MAX_NOTIFY_LEN: usize = 64;
pub const MAX_SERVICES: usize = 8;
pub const MAX_CHARACTERISTICS: usize = 8;

/// One advertisement seen while scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub id: DeviceId,
    pub name: String<MAX_NAME_LEN>,
    pub rssi: Option<i8>,
}

impl Advertisement {
    /// Build an advertisement; names longer than [`MAX_NAME_LEN`] bytes are
    /// cut at the last char boundary that fits.
    pub fn new(id: DeviceId, name: &str, rssi: Option<i8>) -> Self {
        let mut end = name.len().min(MAX_NAME_LEN);
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        let mut s = String::new();
        let _ = s.push_str(&name[..end]);
        Self { id, name: s, rssi }
    }
}

/// GATT characteristic properties relevant to the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CharProps {
    pub read: bool,
    pub write: bool,
    pub write_without_response: bool,
    pub notify: bool,
    pub indicate: bool,
}

impl CharProps {
    pub const NOTIFY: Self = Self {
        read: true,
        write: false,
        write_without_response: false,
        notify: true,
        indicate: false,
    };

    pub const WRITE: Self = Self {
        read: false,
        write: true,
        write_without_response: true,
        notify: false,
        indicate: false,
    };

    pub fn can_write(self) -> bool {
        self.write || self.write_without_response
    }

    pub fn can_notify(self) -> bool {
        self.notify || self.indicate
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacteristicInfo {
    pub uuid: u128,
    pub props: CharProps,
}

/// Asynchronous results delivered by a transport adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    RadioStateChanged(RadioState),
    DeviceDiscovered(Advertisement),
    Connected(LinkHandle),
    ConnectFailed(LinkHandle),
    ServicesDiscovered {
        link: LinkHandle,
        services: Vec<u128, MAX_SERVICES>,
    },
    CharacteristicsDiscovered {
        link: LinkHandle,
        service: u128,
        characteristics: Vec<CharacteristicInfo, MAX_CHARACTERISTICS>,
    },
    Notification {
        link: LinkHandle,
        characteristic: u128,
        data: Vec<u8, MAX_NOTIFY_LEN>,
    },
    Disconnected(LinkHandle),
}

impl TransportEvent {
    /// Build a notification event.  Buffers longer than
    /// [`MAX_NOTIFY_LEN`] are truncated; every telemetry frame fits.
    pub fn notification(link: LinkHandle, characteristic: u128, bytes: &[u8]) -> Self {
        let mut data = Vec::new();
        let take = bytes.len().min(MAX_NOTIFY_LEN);
        if take < bytes.len() {
            warn!("notification of {} bytes truncated", bytes.len());
        }
        let _ = data.extend_from_slice(&bytes[..take]);
        Self::Notification {
            link,
            characteristic,
            data,
        }
    }

    /// Build a services-discovered event, keeping at most
    /// [`MAX_SERVICES`] entries.
    pub fn services(link: LinkHandle, services: &[u128]) -> Self {
        Self::ServicesDiscovered {
            link,
            services: services.iter().copied().take(MAX_SERVICES).collect(),
        }
    }

    /// Build a characteristics-discovered event, keeping at most
    /// [`MAX_CHARACTERISTICS`] entries.
    pub fn characteristics(
        link: LinkHandle,
        service: u128,
        characteristics: &[CharacteristicInfo],
    ) -> Self {
        Self::CharacteristicsDiscovered {
            link,
            service,
            characteristics: characteristics
                .iter()
                .copied()
                .take(MAX_CHARACTERISTICS)
                .collect(),
        }
    }

    /// The link this event refers to, if any.
    pub fn link(&self) -> Option<LinkHandle> {
        match self {
            Self::Connected(l) | Self::ConnectFailed(l) | Self::Disconnected(l) => Some(*l),
            Self::ServicesDiscovered { link, .. }
            | Self::CharacteristicsDiscovered { link, .. }
            | Self::Notification { link, .. } => Some(*link),
            Self::RadioStateChanged(_) | Self::DeviceDiscovered(_) => None,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Transport port (driven adapter: session → radio stack)
// ───────────────────────────────────────────────────────────────

/// Abstract wireless transport capability.
///
/// Every method is fire-and-forget: `Ok` means "request accepted", and the
/// outcome arrives later as a [`TransportEvent`].  An `Err` means the
/// request could not even be issued.
pub trait Transport {
    /// Error type for this transport.
    type Error: fmt::Display;

    /// Current wireless capability state.
    fn radio_state(&self) -> RadioState;

    /// Begin scanning for devices advertising any of `services`.
    fn start_scan(&mut self, services: &[u128]) -> Result<(), Self::Error>;

    fn stop_scan(&mut self) -> Result<(), Self::Error>;

    /// Start connecting.  The returned handle tags every later event for
    /// this link.
    fn connect(&mut self, device: DeviceId) -> Result<LinkHandle, Self::Error>;

    /// Tear down a link or abandon a pending connection.
    fn cancel(&mut self, link: LinkHandle) -> Result<(), Self::Error>;

    fn discover_services(&mut self, link: LinkHandle, services: &[u128])
    -> Result<(), Self::Error>;

    fn discover_characteristics(
        &mut self,
        link: LinkHandle,
        service: u128,
        characteristics: &[u128],
    ) -> Result<(), Self::Error>;

    fn subscribe(&mut self, link: LinkHandle, characteristic: u128) -> Result<(), Self::Error>;

    fn write(
        &mut self,
        link: LinkHandle,
        characteristic: u128,
        data: &[u8],
    ) -> Result<(), Self::Error>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: session → UI / relay / log)
// ───────────────────────────────────────────────────────────────

/// The session emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

impl<A: EventSink, B: EventSink> EventSink for (A, B) {
    fn emit(&mut self, event: &super::events::AppEvent) {
        self.0.emit(event);
        self.1.emit(event);
    }
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Monotonic milliseconds since an arbitrary session epoch.
pub trait Clock {
    fn now_ms(&self) -> u64;
}
