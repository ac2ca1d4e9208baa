//! Q.931 message-level constants: protocol discriminators, message types,
//! and information element identifiers.

use crate::custom::PriError;

/// Q.931 user-network call control protocol discriminator.
pub const PROTOCOL_DISCRIMINATOR: u8 = 0x08;

/// AT&T maintenance protocol discriminator. Messages carrying it are
/// reflected back with the SERVICE byte turned into SERVICE ACKNOWLEDGE.
pub const MAINTENANCE_PROTOCOL_DISCRIMINATOR: u8 = 0x03;

/// The dummy call reference used by global and maintenance messages.
pub const DUMMY_CALL_REFERENCE: u16 = 0;

/// Bit set in a stored call reference when the call originated locally.
/// The wire sense is inverted at encode time (Q.931 §4.3: the flag is 0 in
/// messages from the originating side).
pub const CREF_ORIGINATOR: u16 = 0x8000;

/// Q.931 message types (Q.931 Table 4-2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Call is being alerted at the called user
    Alerting = 0x01,
    /// Call establishment has begun, no more info accepted
    CallProceeding = 0x02,
    /// In-band progress report
    Progress = 0x03,
    /// Call establishment request
    Setup = 0x05,
    /// Call has been answered
    Connect = 0x07,
    /// Setup received, more info may be required (overlap)
    SetupAcknowledge = 0x0d,
    /// Answer acknowledged
    ConnectAcknowledge = 0x0f,
    /// Call clearing request
    Disconnect = 0x45,
    /// Channel release request
    Release = 0x4d,
    /// Channel released
    ReleaseComplete = 0x5a,
    /// Channel or interface restart request
    Restart = 0x46,
    /// Restart performed
    RestartAcknowledge = 0x4e,
    /// Supplementary service invocation
    Facility = 0x62,
    /// Notification of call-related information
    Notify = 0x6e,
    /// Additional call information (overlap digits, keypad)
    Information = 0x7b,
    /// Solicited or unsolicited state report
    Status = 0x7d,
    /// State report request
    StatusEnquiry = 0x75,
}

impl TryFrom<u8> for MessageType {
    type Error = PriError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(MessageType::Alerting),
            0x02 => Ok(MessageType::CallProceeding),
            0x03 => Ok(MessageType::Progress),
            0x05 => Ok(MessageType::Setup),
            0x07 => Ok(MessageType::Connect),
            0x0d => Ok(MessageType::SetupAcknowledge),
            0x0f => Ok(MessageType::ConnectAcknowledge),
            0x45 => Ok(MessageType::Disconnect),
            0x4d => Ok(MessageType::Release),
            0x5a => Ok(MessageType::ReleaseComplete),
            0x46 => Ok(MessageType::Restart),
            0x4e => Ok(MessageType::RestartAcknowledge),
            0x62 => Ok(MessageType::Facility),
            0x6e => Ok(MessageType::Notify),
            0x7b => Ok(MessageType::Information),
            0x7d => Ok(MessageType::Status),
            0x75 => Ok(MessageType::StatusEnquiry),
            _ => Err(PriError::UnknownMessageType),
        }
    }
}

impl MessageType {
    /// Message name for traces.
    pub fn name(self) -> &'static str {
        match self {
            MessageType::Alerting => "ALERTING",
            MessageType::CallProceeding => "CALL PROCEEDING",
            MessageType::Progress => "PROGRESS",
            MessageType::Setup => "SETUP",
            MessageType::Connect => "CONNECT",
            MessageType::SetupAcknowledge => "SETUP ACKNOWLEDGE",
            MessageType::ConnectAcknowledge => "CONNECT ACKNOWLEDGE",
            MessageType::Disconnect => "DISCONNECT",
            MessageType::Release => "RELEASE",
            MessageType::ReleaseComplete => "RELEASE COMPLETE",
            MessageType::Restart => "RESTART",
            MessageType::RestartAcknowledge => "RESTART ACKNOWLEDGE",
            MessageType::Facility => "FACILITY",
            MessageType::Notify => "NOTIFY",
            MessageType::Information => "INFORMATION",
            MessageType::Status => "STATUS",
            MessageType::StatusEnquiry => "STATUS ENQUIRY",
        }
    }
}

/// Information element identifiers (Q.931 Table 4-3).
pub mod ie {
    /// Bearer Capability
    pub const BEARER_CAPABILITY: u8 = 0x04;
    /// Cause
    pub const CAUSE: u8 = 0x08;
    /// Call State
    pub const CALL_STATE: u8 = 0x14;
    /// Channel Identification
    pub const CHANNEL_IDENT: u8 = 0x18;
    /// Facility
    pub const FACILITY: u8 = 0x1c;
    /// Progress Indicator
    pub const PROGRESS_INDICATOR: u8 = 0x1e;
    /// Network-Specific Facilities
    pub const NETWORK_SPEC_FAC: u8 = 0x20;
    /// Notification Indicator
    pub const NOTIFY_IND: u8 = 0x27;
    /// Display
    pub const DISPLAY: u8 = 0x28;
    /// Keypad Facility
    pub const KEYPAD_FACILITY: u8 = 0x2c;
    /// Calling Party Number
    pub const CALLING_PARTY_NUMBER: u8 = 0x6c;
    /// Called Party Number
    pub const CALLED_PARTY_NUMBER: u8 = 0x70;
    /// Restart Indicator
    pub const RESTART_INDICATOR: u8 = 0x79;
    /// Sending Complete (single octet)
    pub const SENDING_COMPLETE: u8 = 0xa1;

    /// Single-octet IEs carry their content in the identifier octet itself.
    #[inline]
    pub fn is_single_octet(id: u8) -> bool {
        id & 0x80 != 0
    }
}

/// Restart Indicator classes (Q.931 §4.5.25).
pub mod restart {
    /// Restart the indicated channels only
    pub const INDICATED_CHANNEL: u8 = 0;
    /// Restart a single DS1 interface
    pub const SINGLE_DS1: u8 = 6;
    /// Restart all DS1 interfaces
    pub const ALL_DS1: u8 = 7;
}
