//! Events delivered to the call-handling application.
//!
//! The controller holds at most one pending event at a time; the application
//! drains it through the event pump after every frame or timer tick.

use crate::call::{Bearer, CalledParty, CallingParty, NameString, NumberString};

/// Details of an incoming call, carried by [`Event::Ring`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingEvent {
    /// Call reference of the new call
    pub cref: u16,
    /// Offered B channel, -1 if none was identified
    pub channel: i32,
    /// True when the channel is negotiable (preferred, not exclusive)
    pub flexible: bool,
    /// Calling party identification
    pub calling: CallingParty,
    /// Called party identification
    pub called: CalledParty,
    /// Offered bearer capability
    pub bearer: Bearer,
    /// Calling name from a Display IE, when one was present
    pub calling_name: Option<NameString>,
}

/// Tagged event variants returned to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The D-channel data link is established
    DchanUp,
    /// The D-channel data link is down
    DchanDown,
    /// The peer restarted a channel (-1 = the whole interface)
    Restart {
        /// Restarted B channel, -1 for all
        channel: i32,
    },
    /// A configuration problem was detected
    ConfigError {
        /// What went wrong
        message: &'static str,
    },
    /// Incoming call
    Ring(RingEvent),
    /// The remote user is being alerted
    Ringing {
        /// B channel in use
        channel: i32,
        /// Call reference
        cref: u16,
    },
    /// The call was answered
    Answer {
        /// B channel in use
        channel: i32,
        /// Call reference
        cref: u16,
    },
    /// Call establishment is proceeding
    Proceeding {
        /// B channel in use
        channel: i32,
        /// Call reference
        cref: u16,
        /// Progress description, when one was signalled
        progress: Option<u8>,
    },
    /// SETUP acknowledged, more digits may be sent (overlap)
    SetupAck {
        /// B channel in use
        channel: i32,
        /// Call reference
        cref: u16,
    },
    /// The call was cleared
    Hangup {
        /// B channel in use
        channel: i32,
        /// Call reference
        cref: u16,
        /// Q.850 cause of clearing
        cause: u8,
    },
    /// Our clearing request was acknowledged
    HangupAck {
        /// B channel in use
        channel: i32,
        /// Call reference
        cref: u16,
    },
    /// The peer requests clearing but in-band information is available;
    /// the application should consume it, then call `hangup`
    HangupReq {
        /// B channel in use
        channel: i32,
        /// Call reference
        cref: u16,
        /// Q.850 cause of clearing
        cause: u8,
    },
    /// Our RESTART was acknowledged
    RestartAck {
        /// Restarted B channel, -1 for all
        channel: i32,
    },
    /// A calling name arrived on a facility or display element
    FacName {
        /// Call reference
        cref: u16,
        /// The name
        name: NameString,
    },
    /// Overlap digits received so far
    InfoReceived {
        /// Call reference
        cref: u16,
        /// Accumulated called-number digits
        digits: NumberString,
        /// True once the sender indicated sending complete
        complete: bool,
    },
    /// Keypad digits received in an INFORMATION message
    KeypadDigit {
        /// Call reference
        cref: u16,
        /// The keypad string
        digits: NumberString,
    },
    /// A NOTIFY arrived
    Notify {
        /// Call reference
        cref: u16,
        /// Notification description value
        info: u8,
    },
    /// A PROGRESS message arrived
    Progress {
        /// B channel in use
        channel: i32,
        /// Call reference
        cref: u16,
        /// Progress description
        progress: u8,
    },
}
