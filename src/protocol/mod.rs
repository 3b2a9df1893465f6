//! PM5 GATT surface and wire protocols.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Rowing service 0x0030 (telemetry group, notify)             │
//! │    0x0031 General Status        ──▶ decoder::FrameKind       │
//! │    0x0032 Additional Status 1   ──▶                          │
//! │    0x0033 Additional Status 2   ──▶                          │
//! │    0x0035 Stroke Data           ──▶                          │
//! │    0x0036 Additional Stroke Data──▶                          │
//! │                                                              │
//! │  Control service 0x0020 (command group)                      │
//! │    0x0021 Control Receive  (write)  ◀── csafe frames         │
//! │    0x0022 Control Transmit (notify) ──▶ command responses    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every identifier shares the base `CE06xxxx-43E5-11E4-916C-0800200C9A66`;
//! only the 16-bit field in the first group differs.

pub mod csafe;
pub mod decoder;

/// PM5 base UUID with the 16-bit short field cleared.
const PM5_BASE_UUID: u128 = 0xCE06_0000_43E5_11E4_916C_0800_200C_9A66;

/// Expand a PM5 short identifier into its full 128-bit UUID.
pub const fn pm5_uuid(short: u16) -> u128 {
    PM5_BASE_UUID | ((short as u128) << 96)
}

// ── Services ──────────────────────────────────────────────────

pub const ROWING_SERVICE: u128 = pm5_uuid(0x0030);
pub const CONTROL_SERVICE: u128 = pm5_uuid(0x0020);

// ── Telemetry characteristics ─────────────────────────────────

pub const CHAR_GENERAL_STATUS: u128 = pm5_uuid(0x0031);
pub const CHAR_ADDITIONAL_STATUS_1: u128 = pm5_uuid(0x0032);
pub const CHAR_ADDITIONAL_STATUS_2: u128 = pm5_uuid(0x0033);
pub const CHAR_STROKE_DATA: u128 = pm5_uuid(0x0035);
pub const CHAR_ADDITIONAL_STROKE_DATA: u128 = pm5_uuid(0x0036);

// ── Control characteristics ───────────────────────────────────

/// Host → machine command channel.
pub const CHAR_CONTROL_RECEIVE: u128 = pm5_uuid(0x0021);
/// Machine → host response channel.
pub const CHAR_CONTROL_TRANSMIT: u128 = pm5_uuid(0x0022);

/// Services requested during scan and discovery.
pub const SCAN_SERVICES: [u128; 1] = [ROWING_SERVICE];

/// The two logical service groups discovered after connecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceGroup {
    Telemetry,
    Control,
}

impl ServiceGroup {
    pub const ALL: [ServiceGroup; 2] = [ServiceGroup::Telemetry, ServiceGroup::Control];

    pub const fn uuid(self) -> u128 {
        match self {
            Self::Telemetry => ROWING_SERVICE,
            Self::Control => CONTROL_SERVICE,
        }
    }

    pub fn from_uuid(uuid: u128) -> Option<Self> {
        Self::ALL.into_iter().find(|g| g.uuid() == uuid)
    }

    /// Characteristics requested when enumerating this group.
    pub const fn characteristics(self) -> &'static [u128] {
        match self {
            Self::Telemetry => &[
                CHAR_GENERAL_STATUS,
                CHAR_ADDITIONAL_STATUS_1,
                CHAR_ADDITIONAL_STATUS_2,
                CHAR_STROKE_DATA,
                CHAR_ADDITIONAL_STROKE_DATA,
            ],
            Self::Control => &[CHAR_CONTROL_RECEIVE, CHAR_CONTROL_TRANSMIT],
        }
    }
}

/// Service UUIDs for every group, in discovery-request order.
pub const DISCOVERY_SERVICES: [u128; 2] = [ROWING_SERVICE, CONTROL_SERVICE];

/// Render a 128-bit UUID in canonical hyphenated form.
pub fn format_uuid(uuid: u128) -> heapless::String<36> {
    use core::fmt::Write;

    let mut s = heapless::String::new();
    let _ = write!(
        s,
        "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
        (uuid >> 96) as u32,
        (uuid >> 80) as u16,
        (uuid >> 64) as u16,
        (uuid >> 48) as u16,
        uuid & 0xFFFF_FFFF_FFFF,
    );
    s
}
