//! CSAFE command framing.
//!
//! Wire format:
//! ```text
//! ┌───────┬──────────────────────┬──────────┬──────┐
//! │ Start │ Payload (N bytes)    │ Checksum │ Stop │
//! │ 0xF1  │ opcodes + parameters │ XOR(pl)  │ 0xF2 │
//! └───────┴──────────────────────┴──────────┴──────┘
//! ```
//!
//! The checksum is the XOR of every payload byte (everything between the
//! start delimiter and the checksum itself).
//!
//! Two commands are built:
//!
//! - **Reset**: `0x86` (go finished) then `0x87` (go idle).
//! - **Configure workout**: wrapper `0x1A`, a length byte, then the
//!   sub-commands `0x01 0x01` (single-distance workout type) and
//!   `0x03 d0 d1 d2 d3` (distance in meters, little-endian).
//!
//! Builders return fixed-size arrays; they cannot fail.

use crate::error::CommandError;

pub const FRAME_START: u8 = 0xF1;
pub const FRAME_STOP: u8 = 0xF2;

/// End the running workout.
pub const CMD_GO_FINISHED: u8 = 0x86;
/// Return the monitor to its idle screen.
pub const CMD_GO_IDLE: u8 = 0x87;
/// Wrapper for the PM-specific configuration sub-commands.
pub const CMD_SET_USER_CFG1: u8 = 0x1A;

pub const PM_SET_WORKOUT_TYPE: u8 = 0x01;
pub const PM_SET_WORKOUT_DISTANCE: u8 = 0x03;

/// Workout-type parameter selecting a single-distance piece.
pub const WORKOUT_TYPE_FIXED_DISTANCE: u8 = 0x01;

/// Start, checksum and stop.
const FRAMING_OVERHEAD: usize = 3;

pub const RESET_FRAME_LEN: usize = 2 + FRAMING_OVERHEAD;

/// Sub-commands carried inside the configure wrapper.
const CONFIGURE_SUBCOMMANDS_LEN: usize = 2 + 1 + 4;
const CONFIGURE_PAYLOAD_LEN: usize = 2 + CONFIGURE_SUBCOMMANDS_LEN;
pub const CONFIGURE_FRAME_LEN: usize = CONFIGURE_PAYLOAD_LEN + FRAMING_OVERHEAD;

/// Commands the engine can issue.  Used for logging and event reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Reset,
    ConfigureWorkout { distance_m: u32 },
}

/// XOR of every byte in `payload`.
pub fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0, |acc, b| acc ^ b)
}

fn framed<const N: usize>(payload: &[u8]) -> [u8; N] {
    debug_assert_eq!(payload.len() + FRAMING_OVERHEAD, N);
    let mut out = [0u8; N];
    out[0] = FRAME_START;
    out[1..=payload.len()].copy_from_slice(payload);
    out[N - 2] = checksum(payload);
    out[N - 1] = FRAME_STOP;
    out
}

/// `F1 86 87 01 F2`
pub fn reset_command() -> [u8; RESET_FRAME_LEN] {
    framed(&[CMD_GO_FINISHED, CMD_GO_IDLE])
}

/// Configure a single-distance workout of `distance_m` meters.
pub fn configure_workout_command(distance_m: u32) -> [u8; CONFIGURE_FRAME_LEN] {
    let mut payload = [0u8; CONFIGURE_PAYLOAD_LEN];
    payload[0] = CMD_SET_USER_CFG1;

    let sub = &mut payload[2..];
    sub[0] = PM_SET_WORKOUT_TYPE;
    sub[1] = WORKOUT_TYPE_FIXED_DISTANCE;
    sub[2] = PM_SET_WORKOUT_DISTANCE;
    sub[3..7].copy_from_slice(&distance_m.to_le_bytes());

    // Length covers the sub-commands only, laid out after it.
    payload[1] = CONFIGURE_SUBCOMMANDS_LEN as u8;

    framed(&payload)
}

/// Validate delimiters and checksum, returning the payload.
pub fn parse_frame(frame: &[u8]) -> Result<&[u8], CommandError> {
    if frame.len() < FRAMING_OVERHEAD {
        return Err(CommandError::Truncated);
    }
    if frame[0] != FRAME_START || frame[frame.len() - 1] != FRAME_STOP {
        return Err(CommandError::BadDelimiter);
    }

    let payload = &frame[1..frame.len() - 2];
    let found = frame[frame.len() - 2];
    let expected = checksum(payload);
    if found != expected {
        return Err(CommandError::ChecksumMismatch { expected, found });
    }
    Ok(payload)
}

/// Identify a command frame produced by this module.
pub fn identify(frame: &[u8]) -> Result<CommandKind, CommandError> {
    let payload = parse_frame(frame)?;
    match payload {
        [CMD_GO_FINISHED, CMD_GO_IDLE] => Ok(CommandKind::Reset),
        [CMD_SET_USER_CFG1, ..] => Ok(CommandKind::ConfigureWorkout {
            distance_m: workout_distance(payload)?,
        }),
        _ => Err(CommandError::UnexpectedPayload),
    }
}

/// Extract the distance parameter from a configure-workout payload.
fn workout_distance(payload: &[u8]) -> Result<u32, CommandError> {
    let [CMD_SET_USER_CFG1, len, sub @ ..] = payload else {
        return Err(CommandError::UnexpectedPayload);
    };
    if usize::from(*len) != sub.len() {
        return Err(CommandError::UnexpectedPayload);
    }
    match sub {
        [
            PM_SET_WORKOUT_TYPE,
            WORKOUT_TYPE_FIXED_DISTANCE,
            PM_SET_WORKOUT_DISTANCE,
            d0,
            d1,
            d2,
            d3,
        ] => Ok(u32::from_le_bytes([*d0, *d1, *d2, *d3])),
        _ => Err(CommandError::UnexpectedPayload),
    }
}
