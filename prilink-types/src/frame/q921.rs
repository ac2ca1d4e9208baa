//! Q.921 (LAPD) frame octet layouts.
//!
//! Bit layouts follow ITU-T Q.921 §2.2 (address field) and §3.4 (control
//! field, extended mod-128 operation). Bitfield structs declare fields from
//! the least significant bit upward.

use bitfields::bitfield;

use crate::custom::PriError;

/// SAPI for call-control procedures (Q.931 payloads).
pub const SAPI_CALL_CTRL: u8 = 0;
/// SAPI for layer-2 management (TEI assignment).
pub const SAPI_MGMT: u8 = 63;

/// Broadcast/group TEI.
pub const TEI_GROUP: u8 = 127;
/// The single TEI used on point-to-point links.
pub const TEI_PTP: u8 = 0;
/// First TEI value the network assigns automatically.
pub const TEI_AUTO_FIRST: u8 = 64;

/// Sequence numbers are mod 128 in extended operation.
pub const SEQ_MOD: u8 = 128;

/// Increment a V(S)/V(A)/V(R) counter mod 128.
#[inline]
pub fn seq_inc(v: u8) -> u8 {
    (v + 1) % SEQ_MOD
}

/// `(a - b) mod 128`, the distance used for window checks.
#[inline]
pub fn seq_sub(a: u8, b: u8) -> u8 {
    a.wrapping_sub(b) % SEQ_MOD
}

/// First address octet: EA=0, C/R, SAPI.
#[bitfield(u8)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct AddressOctet0 {
    /// Address extension bit, always 0 in the first octet
    #[bits(1)]
    pub ea0: bool,
    /// Command/response bit
    #[bits(1)]
    pub c_r: bool,
    /// Service access point identifier
    #[bits(6)]
    pub sapi: u8,
}

/// Second address octet: EA=1, TEI.
#[bitfield(u8)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct AddressOctet1 {
    /// Address extension bit, always 1 in the final octet
    #[bits(1)]
    pub ea1: bool,
    /// Terminal endpoint identifier
    #[bits(7)]
    pub tei: u8,
}

/// First control octet of an I frame: bit 0 = 0, N(S).
#[bitfield(u8)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct IControl0 {
    /// Frame-type bit, 0 for information frames
    #[bits(1)]
    pub ft: bool,
    /// Send sequence number
    #[bits(7)]
    pub n_s: u8,
}

/// First control octet of an S frame: bits 0-1 = 01, supervisory function.
#[bitfield(u8)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SControl0 {
    /// Frame-type bits, 0b01 for supervisory frames
    #[bits(2)]
    pub ft: u8,
    /// Supervisory function (RR, RNR, REJ)
    #[bits(2)]
    pub ss: u8,
    #[bits(4)]
    __: u8,
}

/// Second control octet of I and S frames: P/F and N(R).
#[bitfield(u8)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct NrOctet {
    /// Poll/final bit
    #[bits(1)]
    pub p_f: bool,
    /// Receive sequence number
    #[bits(7)]
    pub n_r: u8,
}

/// Single control octet of a U frame: bits 0-1 = 11, M2, P/F, M3.
#[bitfield(u8)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct UControl {
    /// Frame-type bits, 0b11 for unnumbered frames
    #[bits(2)]
    pub ft: u8,
    /// Modifier bits M2
    #[bits(2)]
    pub m2: u8,
    /// Poll/final bit
    #[bits(1)]
    pub p_f: bool,
    /// Modifier bits M3
    #[bits(3)]
    pub m3: u8,
}

/// Supervisory frame kinds (Q.921 Table 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SFrame {
    /// Receive ready
    Rr,
    /// Receive not ready
    Rnr,
    /// Reject
    Rej,
}

impl SFrame {
    /// The two supervisory-function bits for this kind.
    pub fn ss_bits(self) -> u8 {
        match self {
            SFrame::Rr => 0,
            SFrame::Rnr => 1,
            SFrame::Rej => 2,
        }
    }
}

impl TryFrom<u8> for SFrame {
    type Error = PriError;

    fn try_from(ss: u8) -> Result<Self, Self::Error> {
        match ss {
            0 => Ok(SFrame::Rr),
            1 => Ok(SFrame::Rnr),
            2 => Ok(SFrame::Rej),
            _ => Err(PriError::MalformedFrame),
        }
    }
}

/// Unnumbered frame kinds (Q.921 Table 5), identified by (M3, M2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UFrame {
    /// Set asynchronous balanced mode extended
    Sabme,
    /// Unnumbered acknowledgement
    Ua,
    /// Disconnected mode
    Dm,
    /// Unnumbered information
    Ui,
    /// Disconnect
    Disc,
    /// Frame reject
    Frmr,
    /// Exchange identification
    Xid,
}

impl UFrame {
    /// The (M3, M2) modifier bits for this kind.
    pub fn modifier_bits(self) -> (u8, u8) {
        match self {
            UFrame::Sabme => (3, 3),
            UFrame::Ua => (3, 0),
            UFrame::Dm => (0, 3),
            UFrame::Ui => (0, 0),
            UFrame::Disc => (2, 0),
            UFrame::Frmr => (4, 1),
            UFrame::Xid => (5, 3),
        }
    }

    /// Classify (M3, M2) modifier bits.
    pub fn from_modifier_bits(m3: u8, m2: u8) -> Option<UFrame> {
        match (m3, m2) {
            (3, 3) => Some(UFrame::Sabme),
            (3, 0) => Some(UFrame::Ua),
            (0, 3) => Some(UFrame::Dm),
            (0, 0) => Some(UFrame::Ui),
            (2, 0) => Some(UFrame::Disc),
            (4, 1) => Some(UFrame::Frmr),
            (5, 3) => Some(UFrame::Xid),
            _ => None,
        }
    }
}

/// Layer management entity identifier carried first in every TEI
/// management UI frame (Q.921 Table 8).
pub const MGMT_ENTITY: u8 = 0x0f;

/// TEI management message types (Q.921 Table 8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TeiMgmtMsg {
    /// TE requests a TEI, Ai = 127
    IdentityRequest = 1,
    /// Network grants a TEI, Ai = assigned value
    IdentityAssigned = 2,
    /// Network refuses the request
    IdentityDenied = 3,
    /// Network audits assigned TEIs
    IdentityCheckRequest = 4,
    /// TE answers an audit
    IdentityCheckResponse = 5,
    /// Network withdraws a TEI
    IdentityRemove = 6,
    /// TE asks the network to audit its TEI
    IdentityVerify = 7,
}

impl TryFrom<u8> for TeiMgmtMsg {
    type Error = PriError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(TeiMgmtMsg::IdentityRequest),
            2 => Ok(TeiMgmtMsg::IdentityAssigned),
            3 => Ok(TeiMgmtMsg::IdentityDenied),
            4 => Ok(TeiMgmtMsg::IdentityCheckRequest),
            5 => Ok(TeiMgmtMsg::IdentityCheckResponse),
            6 => Ok(TeiMgmtMsg::IdentityRemove),
            7 => Ok(TeiMgmtMsg::IdentityVerify),
            _ => Err(PriError::MalformedFrame),
        }
    }
}
