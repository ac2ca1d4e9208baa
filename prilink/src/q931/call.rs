//! Call records and the per-span call pool.
//!
//! Calls are addressed by their 16-bit call-reference value (originator flag
//! embedded in bit 15), never by pointer: timers and subchannels hold the
//! reference and look the record up when they fire. A record is created on
//! receipt of a SETUP with a new reference or when the application places a
//! call, and destroyed on the transition back to Null once the peer has
//! acknowledged clearing.

use heapless::Vec;
use prilink_types::call::{
    Bearer, CallState, CalledParty, CallingParty, CauseInfo, ChannelId, NameString, NumberString,
    Progress,
};
use prilink_types::custom::{PriError, PriResult};
use prilink_types::frame::q931::MessageType;

use crate::sched::TimerId;

/// Maximum simultaneous calls on one span.
pub const MAX_CALLS: usize = 128;
/// Maximum queued facility APDUs per call.
pub const MAX_APDUS: usize = 4;
/// Maximum octets of one queued APDU.
pub const MAX_APDU_LEN: usize = 128;
/// Maximum terminals that can respond to one broadcast SETUP.
pub const MAX_SUBCALLS: usize = 8;

/// A facility APDU waiting to ride on the next message of its type.
#[derive(Debug)]
pub(crate) struct Apdu {
    /// Message type this APDU attaches to
    pub msgtype: MessageType,
    /// Raw component octets for the Facility IE
    pub data: Vec<u8, MAX_APDU_LEN>,
}

/// One terminal's leg of a broadcast SETUP on an NT PTMP span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SubCall {
    pub tei: u8,
    pub state: CallState,
}

/// One call on the span.
#[derive(Debug)]
pub(crate) struct Call {
    /// Call reference, originator flag in bit 15
    pub cref: u16,
    /// TEI the call's messages travel on (group TEI while broadcasting)
    pub tei: u8,
    pub alive: bool,
    pub send_hangup_ack: bool,
    pub proceeding_sent: bool,
    pub our_state: CallState,
    /// Call state the peer last reported in a STATUS
    pub peer_state: Option<CallState>,
    pub channel: ChannelId,
    pub bearer: Option<Bearer>,
    pub progress: Option<Progress>,
    pub cause: Option<CauseInfo>,
    pub calling: Option<CallingParty>,
    pub called: Option<CalledParty>,
    /// Restart Indicator class from a RESTART exchange
    pub restart_class: Option<u8>,
    /// Accumulated overlap dialled digits (received)
    pub overlap_digits: NumberString,
    /// Digits pending transmission in the next INFORMATION
    pub pending_digits: NumberString,
    /// Keypad digits from the last INFORMATION
    pub keypad_digits: NumberString,
    /// Calling name from a Display IE
    pub display: Option<NameString>,
    /// Notification description from a NOTIFY
    pub notify_info: Option<u8>,
    /// Peer indicated sending complete
    pub sending_complete: bool,
    pub non_isdn: bool,
    pub t303: TimerId,
    pub t305: TimerId,
    pub t308: TimerId,
    pub t310: TimerId,
    pub t316: TimerId,
    pub t303_count: u8,
    pub t308_count: u8,
    pub t316_count: u8,
    pub apdus: Vec<Apdu, MAX_APDUS>,
    /// Terminals that responded to a broadcast SETUP
    pub subcalls: Vec<SubCall, MAX_SUBCALLS>,
    /// TEI of the terminal that answered first
    pub winner_tei: Option<u8>,
}

impl Call {
    pub(crate) fn new(cref: u16, tei: u8) -> Self {
        Call {
            cref,
            tei,
            alive: false,
            send_hangup_ack: false,
            proceeding_sent: false,
            our_state: CallState::Null,
            peer_state: None,
            channel: ChannelId::default(),
            bearer: None,
            progress: None,
            cause: None,
            calling: None,
            called: None,
            restart_class: None,
            overlap_digits: NumberString::new(),
            pending_digits: NumberString::new(),
            keypad_digits: NumberString::new(),
            display: None,
            notify_info: None,
            sending_complete: false,
            non_isdn: false,
            t303: 0,
            t305: 0,
            t308: 0,
            t310: 0,
            t316: 0,
            t303_count: 0,
            t308_count: 0,
            t316_count: 0,
            apdus: Vec::new(),
            subcalls: Vec::new(),
            winner_tei: None,
        }
    }

    /// Record a responding terminal's leg of a broadcast SETUP.
    pub(crate) fn note_subcall(&mut self, tei: u8, state: CallState) {
        if let Some(sub) = self.subcalls.iter_mut().find(|s| s.tei == tei) {
            log::debug!(
                "call {:04x}: terminal {tei} {:?} -> {state:?}",
                self.cref,
                sub.state
            );
            sub.state = state;
        } else if self.subcalls.push(SubCall { tei, state }).is_err() {
            log::warn!("subcall table full for call {:04x}", self.cref);
        }
    }

    /// Cause value to report in events, defaulting to normal clearing.
    pub(crate) fn event_cause(&self) -> u8 {
        self.cause
            .map(|c| c.value)
            .unwrap_or(prilink_types::cause::CAUSE_NORMAL_CLEARING)
    }
}

/// The span's call pool.
#[derive(Default)]
pub(crate) struct CallPool {
    calls: Vec<Call, MAX_CALLS>,
}

impl CallPool {
    pub(crate) fn new() -> Self {
        CallPool { calls: Vec::new() }
    }

    pub(crate) fn get(&self, cref: u16) -> Option<&Call> {
        self.calls.iter().find(|c| c.cref == cref)
    }

    pub(crate) fn get_mut(&mut self, cref: u16) -> Option<&mut Call> {
        self.calls.iter_mut().find(|c| c.cref == cref)
    }

    /// Look a call up, creating a fresh record if the reference is new.
    pub(crate) fn get_or_create(&mut self, cref: u16, tei: u8) -> PriResult<&mut Call> {
        if let Some(pos) = self.calls.iter().position(|c| c.cref == cref) {
            return Ok(&mut self.calls[pos]);
        }
        log::debug!("making new call for cref {cref:04x}");
        self.calls
            .push(Call::new(cref, tei))
            .map_err(|_| PriError::BufferFull)?;
        let last = self.calls.len() - 1;
        Ok(&mut self.calls[last])
    }

    /// Remove a record from the pool, returning it for final cleanup.
    pub(crate) fn remove(&mut self, cref: u16) -> Option<Call> {
        let pos = self.calls.iter().position(|c| c.cref == cref)?;
        Some(self.calls.swap_remove(pos))
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Call> {
        self.calls.iter()
    }

    pub(crate) fn contains(&self, cref: u16) -> bool {
        self.get(cref).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_creates_and_finds_by_reference() {
        let mut pool = CallPool::new();
        pool.get_or_create(0x8001, 0).unwrap();
        assert!(pool.contains(0x8001));
        assert!(!pool.contains(0x0001));
    }

    #[test]
    fn remove_frees_the_reference() {
        let mut pool = CallPool::new();
        pool.get_or_create(0x8001, 0).unwrap();
        assert!(pool.remove(0x8001).is_some());
        assert!(!pool.contains(0x8001));
        assert!(pool.remove(0x8001).is_none());
    }
}
