//! Call states and the typed per-call fields carried by Q.931 information
//! elements.

use heapless::String;

use crate::custom::PriError;

/// Maximum digits kept for a party number or overlap dial string.
pub const MAX_NUMBER_LEN: usize = 32;
/// Maximum characters kept from a Display IE.
pub const MAX_NAME_LEN: usize = 64;

/// Bounded number string.
pub type NumberString = String<MAX_NUMBER_LEN>;
/// Bounded display-name string.
pub type NameString = String<MAX_NAME_LEN>;

/// Q.931 call states (Q.931 §2, Table 2-1), including the network-side
/// restart states and the internal abort state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CallState {
    /// No call exists
    Null = 0,
    /// Outgoing SETUP sent
    CallInitiated = 1,
    /// Overlap digits being sent
    OverlapSending = 2,
    /// CALL PROCEEDING received for our SETUP
    OutgoingCallProceeding = 3,
    /// ALERTING received for our SETUP
    CallDelivered = 4,
    /// Incoming SETUP received
    CallPresent = 6,
    /// We have alerted the local user
    CallReceived = 7,
    /// We answered, awaiting CONNECT ACKNOWLEDGE
    ConnectRequest = 8,
    /// We sent CALL PROCEEDING for an incoming SETUP
    IncomingCallProceeding = 9,
    /// Call is up
    Active = 10,
    /// We sent DISCONNECT
    DisconnectRequest = 11,
    /// Peer sent DISCONNECT
    DisconnectIndication = 12,
    /// SUSPEND sent, awaiting acknowledgement
    SuspendRequest = 15,
    /// RESUME sent, awaiting acknowledgement
    ResumeRequest = 17,
    /// RELEASE sent, awaiting RELEASE COMPLETE
    ReleaseRequest = 19,
    /// Internal teardown state while aborting a broadcast call
    CallAbort = 22,
    /// Receiving overlap digits
    OverlapReceiving = 25,
    /// RESTART sent, awaiting RESTART ACKNOWLEDGE
    RestartRequest = 61,
    /// Restart in progress on the peer's request
    Restart = 62,
}

impl CallState {
    /// The six-bit value carried in the Call State IE.
    pub fn wire_value(self) -> u8 {
        self as u8 & 0x3f
    }
}

impl TryFrom<u8> for CallState {
    type Error = PriError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value & 0x3f {
            0 => Ok(CallState::Null),
            1 => Ok(CallState::CallInitiated),
            2 => Ok(CallState::OverlapSending),
            3 => Ok(CallState::OutgoingCallProceeding),
            4 => Ok(CallState::CallDelivered),
            6 => Ok(CallState::CallPresent),
            7 => Ok(CallState::CallReceived),
            8 => Ok(CallState::ConnectRequest),
            9 => Ok(CallState::IncomingCallProceeding),
            10 => Ok(CallState::Active),
            11 => Ok(CallState::DisconnectRequest),
            12 => Ok(CallState::DisconnectIndication),
            15 => Ok(CallState::SuspendRequest),
            17 => Ok(CallState::ResumeRequest),
            19 => Ok(CallState::ReleaseRequest),
            22 => Ok(CallState::CallAbort),
            25 => Ok(CallState::OverlapReceiving),
            61 => Ok(CallState::RestartRequest),
            62 => Ok(CallState::Restart),
            _ => Err(PriError::InvalidParameter),
        }
    }
}

/// Channel preference carried in the Channel Identification IE.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChanPref {
    /// No channel identification retrieved yet
    #[default]
    None,
    /// The indicated channel is preferred, alternatives acceptable
    Preferred,
    /// Only the indicated channel is acceptable
    Exclusive,
}

/// Decoded Channel Identification: an explicit B channel, a slot map, or an
/// explicit DS1, plus the exclusivity preference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelId {
    /// Explicit B-channel number, if identified that way
    pub channel: Option<u8>,
    /// Channel slot map (bit n-1 set selects channel n), if identified that way
    pub slotmap: Option<u32>,
    /// Explicitly identified DS1 interface
    pub ds1: Option<u8>,
    /// Exclusive/preferred flag
    pub pref: ChanPref,
}

impl ChannelId {
    /// True when no channel information has been retrieved.
    pub fn is_empty(&self) -> bool {
        self.pref == ChanPref::None
    }

    /// The channel number to report in events, -1 when unidentified.
    pub fn event_channel(&self) -> i32 {
        match self.channel {
            Some(ch) => ch as i32,
            None => -1,
        }
    }

    /// True when both sides name the same specific channel.
    pub fn collides_with(&self, other: &ChannelId) -> bool {
        self.channel.is_some() && self.channel == other.channel && self.ds1 == other.ds1
    }
}

/// Information transfer capabilities (Q.931 §4.5.5).
pub mod transfer_cap {
    /// Speech
    pub const SPEECH: u8 = 0x00;
    /// Unrestricted digital information
    pub const DIGITAL: u8 = 0x08;
    /// Restricted digital information
    pub const RESTRICTED_DIGITAL: u8 = 0x09;
    /// 3.1 kHz audio
    pub const AUDIO_3_1K: u8 = 0x10;
    /// Unrestricted digital with tones (7 kHz audio in older editions)
    pub const DIGITAL_W_TONES: u8 = 0x11;
    /// Video
    pub const VIDEO: u8 = 0x18;
    /// The 4ESS dialect code for 3.1 kHz audio
    pub const AUDIO_4ESS: u8 = 0x08;
}

/// Transfer mode and rate codings (Q.931 §4.5.5 octet 4).
pub mod transfer_mode {
    /// 64 kbit/s circuit mode
    pub const CIRCUIT_64: u8 = 0x10;
    /// 2x64 kbit/s circuit mode
    pub const CIRCUIT_2X64: u8 = 0x11;
    /// 384 kbit/s circuit mode
    pub const CIRCUIT_384: u8 = 0x13;
    /// 1536 kbit/s circuit mode
    pub const CIRCUIT_1536: u8 = 0x15;
    /// 1920 kbit/s circuit mode
    pub const CIRCUIT_1920: u8 = 0x17;
    /// Nx64 kbit/s multirate, multiplier follows
    pub const MULTIRATE: u8 = 0x18;
    /// Packet mode
    pub const PACKET: u8 = 0x40;
}

/// User information layer 1 protocols (Q.931 §4.5.5 octet 5).
pub mod layer1 {
    /// ITU rate adaption (V.110/X.30), adaption octet follows
    pub const ITU_RATE_ADAPT: u8 = 0x21;
    /// G.711 mu-law
    pub const ULAW: u8 = 0x22;
    /// G.711 A-law
    pub const ALAW: u8 = 0x23;
    /// G.721 ADPCM
    pub const G721: u8 = 0x24;
    /// G.722/G.725 7 kHz audio
    pub const G722_G725: u8 = 0x25;
    /// V.120 rate adaption
    pub const V120_RATE_ADAPT: u8 = 0x28;
}

/// Numbering plan identification octets (type of number | plan).
pub mod plan {
    /// Unknown number, unknown plan
    pub const UNKNOWN: u8 = 0x00;
    /// International number, ISDN plan
    pub const INTERNATIONAL_ISDN: u8 = 0x11;
    /// National number, ISDN plan
    pub const NATIONAL_ISDN: u8 = 0x21;
    /// Subscriber number, ISDN plan
    pub const LOCAL_ISDN: u8 = 0x41;
    /// Private numbering plan
    pub const PRIVATE: u8 = 0x49;
}

/// Presentation and screening indicators for the calling party number.
pub mod presentation {
    /// Presentation allowed, user-provided, not screened
    pub const ALLOWED_USER_NOT_SCREENED: u8 = 0x00;
    /// Presentation allowed, user-provided, passed screening
    pub const ALLOWED_USER_PASSED_SCREEN: u8 = 0x01;
    /// Presentation allowed, network-provided
    pub const ALLOWED_NETWORK_NUMBER: u8 = 0x03;
    /// Presentation prohibited, user-provided, not screened
    pub const PROHIB_USER_NOT_SCREENED: u8 = 0x20;
    /// Presentation prohibited, network-provided
    pub const PROHIB_NETWORK_NUMBER: u8 = 0x23;
    /// Number not available due to interworking
    pub const NUMBER_NOT_AVAILABLE: u8 = 0x43;
}

/// Progress descriptions (Q.931 §4.5.23).
pub mod progress {
    /// Call is not end-to-end ISDN, further information may be in-band
    pub const NOT_E2E_ISDN: u8 = 0x01;
    /// Called equipment is non-ISDN
    pub const CALLED_NOT_ISDN: u8 = 0x02;
    /// Calling equipment is non-ISDN
    pub const CALLER_NOT_ISDN: u8 = 0x03;
    /// In-band information or pattern now available
    pub const INBAND_AVAILABLE: u8 = 0x08;
    /// Delay in response at the called interface
    pub const DELAY_AT_INTERFACE: u8 = 0x0a;
}

/// Decoded Bearer Capability IE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bearer {
    /// Information transfer capability
    pub transfer_cap: u8,
    /// Transfer mode and rate
    pub mode_rate: u8,
    /// Rate multiplier, present only for multirate
    pub multiplier: Option<u8>,
    /// User information layer 1 protocol (circuit modes)
    pub userl1: Option<u8>,
    /// Rate adaption detail when layer 1 is ITU rate adaption
    pub rate_adaption: Option<u8>,
    /// User information layer 2 protocol (packet mode)
    pub userl2: Option<u8>,
    /// User information layer 3 protocol (packet mode)
    pub userl3: Option<u8>,
}

impl Bearer {
    /// 64 kbit/s speech with the given layer-1 coding, the common voice case.
    pub fn speech(userl1: u8) -> Bearer {
        Bearer {
            transfer_cap: transfer_cap::SPEECH,
            mode_rate: transfer_mode::CIRCUIT_64,
            multiplier: None,
            userl1: Some(userl1),
            rate_adaption: None,
            userl2: None,
            userl3: None,
        }
    }
}

/// Decoded Progress Indicator IE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Coding standard
    pub coding: u8,
    /// Location
    pub location: u8,
    /// Progress description
    pub description: u8,
}

/// Decoded Cause IE (without diagnostics).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CauseInfo {
    /// Coding standard
    pub coding: u8,
    /// Location
    pub location: u8,
    /// Q.850 cause value
    pub value: u8,
}

/// Calling party identification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallingParty {
    /// Digits
    pub number: NumberString,
    /// Type of number and numbering plan
    pub plan: u8,
    /// Presentation and screening
    pub presentation: u8,
}

/// Called party identification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalledParty {
    /// Digits
    pub number: NumberString,
    /// Type of number and numbering plan
    pub plan: u8,
}
