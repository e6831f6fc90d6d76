//! Binary record decoders and outgoing packet builders.
//!
//! The server sends fixed-layout, little-endian C structs with no version tag.
//! Decoders are tolerant: a truncated or malformed payload produces `None` (or
//! a documented placeholder string) instead of an error, so the receive loop
//! never stops on a single bad record.

use ysradar_math::{heading_from_velocity, ms_to_knots};

use crate::framing::Frame;
use crate::messages::MessageType;

/// Length of the fixed username field in the login packet.
pub const USERNAME_FIELD_LEN: usize = 16;

/// Longest username that still leaves room for a terminating NUL.
pub const MAX_USERNAME_LEN: usize = USERNAME_FIELD_LEN - 1;

/// Object-type code of scenery ground objects in `ADDOBJECT` records.
pub const GROUND_OBJECT_KIND: i32 = 65537;

/// Placeholder for name fields that are missing or not valid UTF-8.
pub const UNKNOWN_NAME: &str = "unknown";

/// Shortest ground-object payload carrying the fixed numeric fields.
const GROUND_OBJECT_MIN_LEN: usize = 36;

/// `info1` value whose record variant carries two extra bytes before the
/// position block.
const PADDED_FLIGHT_VARIANT: i16 = 3;

/// Bytes of the zeroed header that precedes chat text.
const CHAT_HEADER_LEN: usize = 8;

/// Errors raised while building outgoing packets.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// The username does not fit the fixed login field.
    #[error("username is {len} bytes, the login field allows at most {max}")]
    UsernameTooLong {
        /// Actual username length in bytes.
        len: usize,
        /// Maximum allowed length.
        max: usize,
    },
}

// ---------------------------------------------------------------------------
// Little-endian field readers
// ---------------------------------------------------------------------------

fn field<const N: usize>(buf: &[u8], offset: usize) -> Option<[u8; N]> {
    buf.get(offset..offset.checked_add(N)?)?.try_into().ok()
}

fn le_u32(buf: &[u8], offset: usize) -> Option<u32> {
    field(buf, offset).map(u32::from_le_bytes)
}

fn le_i32(buf: &[u8], offset: usize) -> Option<i32> {
    field(buf, offset).map(i32::from_le_bytes)
}

fn le_i16(buf: &[u8], offset: usize) -> Option<i16> {
    field(buf, offset).map(i16::from_le_bytes)
}

fn le_f32(buf: &[u8], offset: usize) -> Option<f32> {
    field(buf, offset).map(f32::from_le_bytes)
}

/// Decode a fixed-width text field, dropping every NUL byte.
fn fixed_text(bytes: &[u8]) -> Option<String> {
    let cleaned: Vec<u8> = bytes.iter().copied().filter(|b| *b != 0).collect();
    String::from_utf8(cleaned).ok()
}

// ---------------------------------------------------------------------------
// Flight state
// ---------------------------------------------------------------------------

/// One decoded `AIRPLANESTATE` record.
#[derive(Debug, Clone, PartialEq)]
pub struct FlightState {
    pub timer: u32,
    /// Aircraft identifier. Zero marks an invalid record.
    pub id: u32,
    /// Layout discriminator.
    pub info1: i16,
    pub x: f32,
    /// Altitude in meters.
    pub y: f32,
    /// North-south position, sign-inverted to a right-handed frame.
    pub z: f32,
    /// Yaw in native angle units, sign flipped to the display convention.
    pub yaw: i32,
    pub pitch: i16,
    pub roll: i16,
    /// Raw speed components in tenths of m/s.
    pub speed_raw: [i16; 3],
    pub fuel: i16,
}

impl FlightState {
    /// Speed components in m/s.
    pub fn velocity(&self) -> [f64; 3] {
        self.speed_raw.map(|s| f64::from(s) / 10.0)
    }

    /// Track derived from the horizontal speed components, in degrees.
    pub fn heading(&self) -> f64 {
        let [vx, _, vz] = self.velocity();
        heading_from_velocity(vx, vz)
    }

    /// Total speed in knots.
    pub fn speed_knots(&self) -> f64 {
        let [vx, vy, vz] = self.velocity();
        ms_to_knots((vx * vx + vy * vy + vz * vz).sqrt())
    }

    /// Ground speed in knots.
    pub fn horizontal_speed_knots(&self) -> f64 {
        let [vx, _, vz] = self.velocity();
        ms_to_knots((vx * vx + vz * vz).sqrt())
    }
}

/// Decode an `AIRPLANESTATE` payload.
///
/// When `info1 == 3` the two bytes at offset 8 are spliced out before the
/// position and attitude fields are read; every later offset is taken from the
/// shortened buffer. Returns `None` if the payload is too short.
pub fn decode_flight_state(payload: &[u8]) -> Option<FlightState> {
    let timer = le_u32(payload, 0)?;
    let id = le_u32(payload, 4)?;
    let info1 = le_i16(payload, 8)?;

    let spliced;
    let buf: &[u8] = if info1 == PADDED_FLIGHT_VARIANT {
        spliced = [&payload[..8], &payload[10..]].concat();
        &spliced
    } else {
        payload
    };

    Some(FlightState {
        timer,
        id,
        info1,
        x: le_f32(buf, 10)?,
        y: le_f32(buf, 14)?,
        z: -le_f32(buf, 18)?,
        yaw: -i32::from(le_i16(buf, 22)?),
        pitch: le_i16(buf, 24)?,
        roll: le_i16(buf, 26)?,
        speed_raw: [le_i16(buf, 28)?, le_i16(buf, 30)?, le_i16(buf, 32)?],
        fuel: le_i16(buf, 50)?,
    })
}

// ---------------------------------------------------------------------------
// Ground object
// ---------------------------------------------------------------------------

/// One decoded `ADDOBJECT` record.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundObject {
    /// Object-type code; [`GROUND_OBJECT_KIND`] for scenery ground objects.
    pub kind: i32,
    pub id: i32,
    pub iff: i32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Yaw in radians.
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
    /// Object template name, e.g. `ILS` or `VORDME`.
    pub name: String,
    /// Instance name set in the scenery editor, e.g. the beacon identifier.
    pub name2: String,
}

/// Decode an `ADDOBJECT` payload.
///
/// `name` is the 64-byte field at offset 36. `name2` is the 56-byte field
/// ending one byte before the end of the payload. Either falls back to
/// [`UNKNOWN_NAME`] when out of range or not UTF-8. Returns `None` below 36
/// bytes.
pub fn decode_ground_object(payload: &[u8]) -> Option<GroundObject> {
    if payload.len() < GROUND_OBJECT_MIN_LEN {
        return None;
    }

    let name = payload
        .get(36..100)
        .and_then(fixed_text)
        .unwrap_or_else(|| UNKNOWN_NAME.to_string());

    let len = payload.len();
    let name2 = len
        .checked_sub(57)
        .and_then(|start| payload.get(start..len - 1))
        .and_then(fixed_text)
        .unwrap_or_else(|| UNKNOWN_NAME.to_string());

    Some(GroundObject {
        kind: le_i32(payload, 0)?,
        id: le_i32(payload, 4)?,
        iff: le_i32(payload, 8)?,
        x: le_f32(payload, 12)?,
        y: le_f32(payload, 16)?,
        z: le_f32(payload, 20)?,
        yaw: le_f32(payload, 24)?,
        pitch: le_f32(payload, 28)?,
        roll: le_f32(payload, 32)?,
        name,
        name2,
    })
}

// ---------------------------------------------------------------------------
// User entry
// ---------------------------------------------------------------------------

/// One decoded `LISTUSER` roster entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEntry {
    /// Roster kind code; 1 and 3 mean the user is flying.
    pub kind_code: i16,
    pub iff: i16,
    pub id: i32,
    pub name: String,
}

/// Decode a `LISTUSER` payload.
///
/// The name runs from offset 12 to the second-to-last byte. Returns `None`
/// below 8 bytes or when the name is not UTF-8.
pub fn decode_user_entry(payload: &[u8]) -> Option<UserEntry> {
    if payload.len() < 8 {
        return None;
    }

    let name_bytes = payload.get(12..payload.len() - 1).unwrap_or_default();
    let name = std::str::from_utf8(name_bytes)
        .ok()?
        .trim_end_matches('\0')
        .to_string();

    Some(UserEntry {
        kind_code: le_i16(payload, 0)?,
        iff: le_i16(payload, 2)?,
        id: le_i32(payload, 4)?,
        name,
    })
}

// ---------------------------------------------------------------------------
// Small payloads
// ---------------------------------------------------------------------------

/// Extract the NUL-terminated field name from a `LOADFIELD` payload.
pub fn decode_field_name(payload: &[u8]) -> Option<String> {
    let raw = payload.split(|b| *b == 0).next().unwrap_or_default();
    std::str::from_utf8(raw).ok().map(str::to_string)
}

/// Aircraft id carried by a `REMOVEAIRPLANE` payload.
pub fn decode_removed_id(payload: &[u8]) -> Option<u32> {
    le_u32(payload, 0)
}

/// Ground object id carried by a `REMOVEGROUND` payload.
pub fn decode_removed_ground_id(payload: &[u8]) -> Option<i32> {
    le_i32(payload, 0)
}

/// Chat text from a `TEXTMESSAGE` payload.
///
/// Skips the zeroed header when present and trims the trailing NUL.
pub fn decode_chat_text(payload: &[u8]) -> String {
    let body = payload.get(CHAT_HEADER_LEN..).unwrap_or(payload);
    String::from_utf8_lossy(body)
        .trim_end_matches('\0')
        .to_string()
}

// ---------------------------------------------------------------------------
// Outgoing packets
// ---------------------------------------------------------------------------

/// Build the login frame: a 16-byte NUL-padded username and the version code.
pub fn build_login_packet(username: &str, version: u32) -> Result<Frame, RecordError> {
    let name = username.as_bytes();
    if name.len() > MAX_USERNAME_LEN {
        return Err(RecordError::UsernameTooLong {
            len: name.len(),
            max: MAX_USERNAME_LEN,
        });
    }

    let mut payload = vec![0u8; USERNAME_FIELD_LEN];
    payload[..name.len()].copy_from_slice(name);
    payload.extend_from_slice(&version.to_le_bytes());
    Ok(Frame::new(MessageType::Logon, payload))
}

/// Build an outgoing chat frame: zeroed 8-byte header, text, NUL.
pub fn build_chat_packet(text: &str) -> Frame {
    let mut payload = vec![0u8; CHAT_HEADER_LEN];
    payload.extend_from_slice(text.as_bytes());
    payload.push(0);
    Frame::new(MessageType::TextMessage, payload)
}

/// Roster request used as the periodic keepalive (header only).
pub fn build_keepalive() -> Frame {
    Frame::new(MessageType::ListUser, Vec::new())
}

/// Roster request sent once the handshake completes.
pub fn build_roster_request() -> Frame {
    Frame::new(MessageType::ListUser, 0u32.to_le_bytes().to_vec())
}

/// Request for the state of every aircraft, sent once the handshake completes.
pub fn build_query_air_state() -> Frame {
    Frame::new(MessageType::QueryAirState, 0u32.to_le_bytes().to_vec())
}
