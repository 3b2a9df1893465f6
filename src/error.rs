//! Unified error types for the rowlink engine.
//!
//! A single `Error` enum that every subsystem can convert into, keeping the
//! control loop's error handling uniform.  All variants are `Copy` so they
//! can be passed through the session service and event sinks without
//! allocation.
//!
//! None of these are fatal: the service degrades every failure to "stay in
//! the last good state" or "return to Idle".

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level engine error
// ---------------------------------------------------------------------------

/// Every fallible operation in the engine funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The wireless transport reported a failure.
    Transport(TransportError),
    /// A command frame could not be built, parsed or issued.
    Command(CommandError),
    /// Configuration is invalid.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Command(e) => write!(f, "command: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// Wireless capability is off or unavailable.
    RadioOff,
    /// No such device is known to the transport.
    UnknownDevice,
    /// The link handle does not refer to a live connection.
    NotConnected,
    /// Scan could not be started or stopped.
    ScanFailed,
    /// Service or characteristic discovery could not be issued.
    DiscoveryFailed,
    /// Notification subscription could not be issued.
    SubscribeFailed,
    /// A characteristic write was rejected.
    WriteFailed,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RadioOff => write!(f, "radio off"),
            Self::UnknownDevice => write!(f, "unknown device"),
            Self::NotConnected => write!(f, "not connected"),
            Self::ScanFailed => write!(f, "scan failed"),
            Self::DiscoveryFailed => write!(f, "discovery failed"),
            Self::SubscribeFailed => write!(f, "subscribe failed"),
            Self::WriteFailed => write!(f, "write failed"),
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

// ---------------------------------------------------------------------------
// Command frame errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    /// The session is not ready to accept commands.
    NotReady,
    /// Buffer is shorter than the smallest valid frame.
    Truncated,
    /// Start or stop delimiter missing.
    BadDelimiter,
    /// Trailing checksum does not match the payload.
    ChecksumMismatch { expected: u8, found: u8 },
    /// The payload is not the command that was expected.
    UnexpectedPayload,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady => write!(f, "session not ready"),
            Self::Truncated => write!(f, "frame truncated"),
            Self::BadDelimiter => write!(f, "bad frame delimiter"),
            Self::ChecksumMismatch { expected, found } => {
                write!(f, "checksum mismatch (expected 0x{expected:02X}, found 0x{found:02X})")
            }
            Self::UnexpectedPayload => write!(f, "unexpected payload"),
        }
    }
}

impl From<CommandError> for Error {
    fn from(e: CommandError) -> Self {
        Self::Command(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Engine-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
