//! Message-type and readback enumerations.
//!
//! The server addresses messages by index into a fixed table of 82 slots, most
//! of them reserved. [`MessageType`] names the slots this client dispatches or
//! sends; every other code maps to [`MessageType::Reserved`] or
//! [`MessageType::Unknown`] so lookups are total.

/// Number of slots in the server's message-type table.
pub const MESSAGE_TYPE_SLOTS: u32 = 82;

/// Readback code sent in reply to `VERSIONNOTIFY`.
pub const VERSION_ACK_CODE: i32 = 9;

// ---------------------------------------------------------------------------
// MessageType
// ---------------------------------------------------------------------------

/// Kind of a protocol frame, keyed by its wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Code 0. Also the type of the null sentinel frame.
    Null,
    /// Client login; also sent by some servers as log-on completion.
    Logon,
    Logoff,
    Error,
    /// Server announces the field (map) to load. Echoed back as read-back.
    LoadField,
    /// Ground object (scenery entity) record.
    AddObject,
    /// Universal acknowledgement frame.
    Readback,
    JoinRequest,
    JoinApproval,
    RejectJoinReq,
    /// Aircraft telemetry record.
    AirplaneState,
    Unjoin,
    RemoveAirplane,
    /// Final step of the handshake on most server versions.
    PrepareSimulation,
    RemoveGround,
    GroundState,
    VersionNotify,
    AirCmd,
    UseMissile,
    TextMessage,
    Environment,
    WeaponConfig,
    /// Roster entry (server → client) or roster request (client → server).
    ListUser,
    QueryAirState,
    UseUnguidedWeapon,
    CtrlShowUsername,
    ConfigString,
    List,
    ReportScore,
    ServerForceJoin,
    FogColor,
    SkyColor,
    GndColor,
    Nop,
    /// A slot inside the table that this client never handles. Build it with
    /// [`MessageType::from_code`]; a named code here is a logic error.
    Reserved(u32),
    /// A code beyond the end of the table.
    Unknown(u32),
}

impl MessageType {
    /// Map a wire code to a message type. Never fails.
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => Self::Null,
            1 => Self::Logon,
            2 => Self::Logoff,
            3 => Self::Error,
            4 => Self::LoadField,
            5 => Self::AddObject,
            6 => Self::Readback,
            8 => Self::JoinRequest,
            9 => Self::JoinApproval,
            10 => Self::RejectJoinReq,
            11 => Self::AirplaneState,
            12 => Self::Unjoin,
            13 => Self::RemoveAirplane,
            16 => Self::PrepareSimulation,
            19 => Self::RemoveGround,
            21 => Self::GroundState,
            29 => Self::VersionNotify,
            30 => Self::AirCmd,
            31 => Self::UseMissile,
            32 => Self::TextMessage,
            33 => Self::Environment,
            36 => Self::WeaponConfig,
            37 => Self::ListUser,
            38 => Self::QueryAirState,
            39 => Self::UseUnguidedWeapon,
            41 => Self::CtrlShowUsername,
            43 => Self::ConfigString,
            44 => Self::List,
            46 => Self::ReportScore,
            47 => Self::ServerForceJoin,
            48 => Self::FogColor,
            49 => Self::SkyColor,
            50 => Self::GndColor,
            81 => Self::Nop,
            c if c < MESSAGE_TYPE_SLOTS => Self::Reserved(c),
            c => Self::Unknown(c),
        }
    }

    /// Wire code of this message type.
    pub fn code(self) -> u32 {
        match self {
            Self::Null => 0,
            Self::Logon => 1,
            Self::Logoff => 2,
            Self::Error => 3,
            Self::LoadField => 4,
            Self::AddObject => 5,
            Self::Readback => 6,
            Self::JoinRequest => 8,
            Self::JoinApproval => 9,
            Self::RejectJoinReq => 10,
            Self::AirplaneState => 11,
            Self::Unjoin => 12,
            Self::RemoveAirplane => 13,
            Self::PrepareSimulation => 16,
            Self::RemoveGround => 19,
            Self::GroundState => 21,
            Self::VersionNotify => 29,
            Self::AirCmd => 30,
            Self::UseMissile => 31,
            Self::TextMessage => 32,
            Self::Environment => 33,
            Self::WeaponConfig => 36,
            Self::ListUser => 37,
            Self::QueryAirState => 38,
            Self::UseUnguidedWeapon => 39,
            Self::CtrlShowUsername => 41,
            Self::ConfigString => 43,
            Self::List => 44,
            Self::ReportScore => 46,
            Self::ServerForceJoin => 47,
            Self::FogColor => 48,
            Self::SkyColor => 49,
            Self::GndColor => 50,
            Self::Nop => 81,
            Self::Reserved(c) | Self::Unknown(c) => {
                debug_assert_eq!(
                    Self::from_code(c),
                    self,
                    "code {c} belongs to a named message type"
                );
                c
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Readback
// ---------------------------------------------------------------------------

/// Confirmation kinds carried in the `code` field of an acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Readback {
    AddAirplane = 0,
    AddGround = 1,
    RemoveAirplane = 2,
    RemoveGround = 3,
    Environment = 4,
    JoinRequest = 5,
    JoinApproval = 6,
    Prepare = 7,
    Unused = 8,
    UseMissile = 9,
    UseUnguidedWeapon = 10,
    CtrlShowUsername = 11,
}

impl Readback {
    /// Numeric code written on the wire.
    pub fn code(self) -> i32 {
        self as i32
    }
}
