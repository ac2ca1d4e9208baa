//! ITU-T Q.850 cause values.
//!
//! Cause values travel in the Cause information element and in the `Hangup`
//! family of application events. Only the values the stack itself generates
//! or interprets are named here; any Q.850 value is accepted on the wire.

/// Unallocated (unassigned) number
pub const CAUSE_UNALLOCATED: u8 = 1;
/// No route to specified transit network
pub const CAUSE_NO_ROUTE_TRANSIT_NET: u8 = 2;
/// No route to destination
pub const CAUSE_NO_ROUTE_DESTINATION: u8 = 3;
/// Channel unacceptable
pub const CAUSE_CHANNEL_UNACCEPTABLE: u8 = 6;
/// Normal call clearing
pub const CAUSE_NORMAL_CLEARING: u8 = 16;
/// User busy
pub const CAUSE_USER_BUSY: u8 = 17;
/// No user responding
pub const CAUSE_NO_USER_RESPONSE: u8 = 18;
/// User alerting, no answer
pub const CAUSE_NO_ANSWER: u8 = 19;
/// Call rejected
pub const CAUSE_CALL_REJECTED: u8 = 21;
/// Non-selected user clearing (losing endpoints of a multipoint call)
pub const CAUSE_NONSELECTED_USER_CLEARING: u8 = 26;
/// Destination out of order
pub const CAUSE_DESTINATION_OUT_OF_ORDER: u8 = 27;
/// Invalid number format
pub const CAUSE_INVALID_NUMBER_FORMAT: u8 = 28;
/// Response to STATUS ENQUIRY
pub const CAUSE_RESPONSE_TO_STATUS_ENQUIRY: u8 = 30;
/// Normal, unspecified
pub const CAUSE_NORMAL_UNSPECIFIED: u8 = 31;
/// No circuit/channel available
pub const CAUSE_NORMAL_CIRCUIT_CONGESTION: u8 = 34;
/// Temporary failure
pub const CAUSE_NORMAL_TEMPORARY_FAILURE: u8 = 41;
/// Switching equipment congestion
pub const CAUSE_SWITCH_CONGESTION: u8 = 42;
/// Requested circuit/channel not available
pub const CAUSE_REQUESTED_CHAN_UNAVAIL: u8 = 44;
/// Bearer capability not authorized
pub const CAUSE_BEARERCAPABILITY_NOTAUTH: u8 = 57;
/// Bearer capability not implemented
pub const CAUSE_BEARERCAPABILITY_NOTIMPL: u8 = 65;
/// Invalid call reference value
pub const CAUSE_INVALID_CALL_REFERENCE: u8 = 81;
/// Incompatible destination
pub const CAUSE_INCOMPATIBLE_DESTINATION: u8 = 88;
/// Mandatory information element is missing
pub const CAUSE_MANDATORY_IE_MISSING: u8 = 96;
/// Message type non-existent or not implemented
pub const CAUSE_MESSAGE_TYPE_NONEXIST: u8 = 97;
/// Information element non-existent or not implemented
pub const CAUSE_IE_NONEXIST: u8 = 99;
/// Invalid information element contents
pub const CAUSE_INVALID_IE_CONTENTS: u8 = 100;
/// Message not compatible with call state
pub const CAUSE_WRONG_CALL_STATE: u8 = 101;
/// Recovery on timer expiry
pub const CAUSE_RECOVERY_ON_TIMER_EXPIRE: u8 = 102;
/// Protocol error, unspecified
pub const CAUSE_PROTOCOL_ERROR: u8 = 111;
/// Interworking, unspecified
pub const CAUSE_INTERWORKING: u8 = 127;

/// Coding standard: CCITT (ITU-T)
pub const CODE_CCITT: u8 = 0x0;

/// Location: user
pub const LOC_USER: u8 = 0x0;
/// Location: private network serving the local user
pub const LOC_PRIV_NET_LOCAL_USER: u8 = 0x1;
/// Location: public network serving the local user
pub const LOC_PUB_NET_LOCAL_USER: u8 = 0x2;
/// Location: transit network
pub const LOC_TRANSIT_NET: u8 = 0x3;
/// Location: public network serving the remote user
pub const LOC_PUB_NET_REMOTE_USER: u8 = 0x4;
/// Location: private network serving the remote user
pub const LOC_PRIV_NET_REMOTE_USER: u8 = 0x5;
/// Location: international network
pub const LOC_INTERNATIONAL_NETWORK: u8 = 0x7;
/// Location: network beyond the interworking point
pub const LOC_NETWORK_BEYOND_INTERWORKING: u8 = 0xa;

/// Human-readable name of a cause value, for traces.
pub fn cause_to_str(cause: u8) -> &'static str {
    match cause {
        CAUSE_UNALLOCATED => "Unallocated (unassigned) number",
        CAUSE_NO_ROUTE_TRANSIT_NET => "No route to specified transit network",
        CAUSE_NO_ROUTE_DESTINATION => "No route to destination",
        CAUSE_CHANNEL_UNACCEPTABLE => "Channel unacceptable",
        CAUSE_NORMAL_CLEARING => "Normal call clearing",
        CAUSE_USER_BUSY => "User busy",
        CAUSE_NO_USER_RESPONSE => "No user responding",
        CAUSE_NO_ANSWER => "User alerting, no answer",
        CAUSE_CALL_REJECTED => "Call rejected",
        CAUSE_NONSELECTED_USER_CLEARING => "Non-selected user clearing",
        CAUSE_DESTINATION_OUT_OF_ORDER => "Destination out of order",
        CAUSE_INVALID_NUMBER_FORMAT => "Invalid number format",
        CAUSE_RESPONSE_TO_STATUS_ENQUIRY => "Response to STATUS ENQUIRY",
        CAUSE_NORMAL_UNSPECIFIED => "Normal, unspecified",
        CAUSE_NORMAL_CIRCUIT_CONGESTION => "Circuit/channel congestion",
        CAUSE_NORMAL_TEMPORARY_FAILURE => "Temporary failure",
        CAUSE_SWITCH_CONGESTION => "Switching equipment congestion",
        CAUSE_REQUESTED_CHAN_UNAVAIL => "Requested channel not available",
        CAUSE_BEARERCAPABILITY_NOTAUTH => "Bearer capability not authorized",
        CAUSE_BEARERCAPABILITY_NOTIMPL => "Bearer capability not implemented",
        CAUSE_INVALID_CALL_REFERENCE => "Invalid call reference value",
        CAUSE_INCOMPATIBLE_DESTINATION => "Incompatible destination",
        CAUSE_MANDATORY_IE_MISSING => "Mandatory information element is missing",
        CAUSE_MESSAGE_TYPE_NONEXIST => "Message type nonexistent",
        CAUSE_IE_NONEXIST => "Information element nonexistent or not implemented",
        CAUSE_INVALID_IE_CONTENTS => "Invalid information element contents",
        CAUSE_WRONG_CALL_STATE => "Message not compatible with call state",
        CAUSE_RECOVERY_ON_TIMER_EXPIRE => "Recovery on timer expiry",
        CAUSE_PROTOCOL_ERROR => "Protocol error, unspecified",
        CAUSE_INTERWORKING => "Interworking, unspecified",
        _ => "Unknown cause",
    }
}

/// Name of a cause class (Q.850 Table 1, upper three bits of the value).
pub fn cause_class_to_str(cause: u8) -> &'static str {
    match (cause & 0x7f) >> 4 {
        0 | 1 => "Normal event",
        2 => "Network congestion",
        3 => "Service or option not available",
        4 => "Service or option not implemented",
        5 => "Invalid message",
        6 => "Protocol error",
        _ => "Interworking",
    }
}
