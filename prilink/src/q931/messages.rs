//! Per-message descriptors.
//!
//! Each Q.931 message type carries a descriptor naming the call fields its
//! pre-handle resets (so stale values from an earlier exchange cannot leak
//! into this one), the information elements that are mandatory on receipt,
//! and the ordered IE list used for outbound composition. The post-handle
//! transitions live in the call engine itself.

use prilink_types::call::ChannelId;
use prilink_types::frame::q931::{MessageType, ie};

use crate::q931::call::Call;

/// Pre-handle and mandatory-IE rules for one message type.
pub(crate) struct MsgDescriptor {
    pub msg: MessageType,
    /// IEs that must be present, by identifier
    pub mandatory: &'static [u8],
    /// Field resets applied before IE processing
    pub pre_handle: Option<fn(&mut Call)>,
}

fn reset_for_restart(call: &mut Call) {
    call.channel = ChannelId::default();
    call.restart_class = None;
}

fn reset_for_setup(call: &mut Call) {
    call.channel = ChannelId::default();
    call.restart_class = None;
    call.bearer = None;
    call.calling = None;
    call.called = None;
    call.display = None;
    call.sending_complete = false;
    call.overlap_digits.clear();
}

fn reset_progress(call: &mut Call) {
    call.progress = None;
}

fn reset_cause(call: &mut Call) {
    call.cause = None;
}

fn reset_cause_and_state(call: &mut Call) {
    call.cause = None;
    call.peer_state = None;
}

fn reset_info(call: &mut Call) {
    call.keypad_digits.clear();
    call.display = None;
}

fn reset_notify(call: &mut Call) {
    call.notify_info = None;
}

static DESCRIPTORS: &[MsgDescriptor] = &[
    MsgDescriptor {
        msg: MessageType::Restart,
        mandatory: &[ie::RESTART_INDICATOR],
        pre_handle: Some(reset_for_restart),
    },
    MsgDescriptor {
        msg: MessageType::RestartAcknowledge,
        mandatory: &[ie::RESTART_INDICATOR],
        pre_handle: Some(reset_for_restart),
    },
    MsgDescriptor {
        msg: MessageType::Setup,
        mandatory: &[ie::BEARER_CAPABILITY],
        pre_handle: Some(reset_for_setup),
    },
    MsgDescriptor {
        msg: MessageType::SetupAcknowledge,
        mandatory: &[],
        pre_handle: None,
    },
    MsgDescriptor {
        msg: MessageType::CallProceeding,
        mandatory: &[],
        pre_handle: Some(reset_progress),
    },
    MsgDescriptor {
        msg: MessageType::Alerting,
        mandatory: &[],
        pre_handle: Some(reset_progress),
    },
    MsgDescriptor {
        msg: MessageType::Progress,
        mandatory: &[ie::PROGRESS_INDICATOR],
        pre_handle: Some(reset_progress),
    },
    MsgDescriptor {
        msg: MessageType::Connect,
        mandatory: &[],
        pre_handle: Some(reset_progress),
    },
    MsgDescriptor {
        msg: MessageType::ConnectAcknowledge,
        mandatory: &[],
        pre_handle: None,
    },
    MsgDescriptor {
        msg: MessageType::Disconnect,
        mandatory: &[ie::CAUSE],
        pre_handle: Some(reset_cause),
    },
    MsgDescriptor {
        msg: MessageType::Release,
        mandatory: &[],
        pre_handle: Some(reset_cause),
    },
    MsgDescriptor {
        msg: MessageType::ReleaseComplete,
        mandatory: &[],
        pre_handle: Some(reset_cause),
    },
    MsgDescriptor {
        msg: MessageType::Status,
        mandatory: &[ie::CAUSE, ie::CALL_STATE],
        pre_handle: Some(reset_cause_and_state),
    },
    MsgDescriptor {
        msg: MessageType::StatusEnquiry,
        mandatory: &[],
        pre_handle: None,
    },
    MsgDescriptor {
        msg: MessageType::Information,
        mandatory: &[],
        pre_handle: Some(reset_info),
    },
    MsgDescriptor {
        msg: MessageType::Facility,
        mandatory: &[],
        pre_handle: None,
    },
    MsgDescriptor {
        msg: MessageType::Notify,
        mandatory: &[ie::NOTIFY_IND],
        pre_handle: Some(reset_notify),
    },
];

static DEFAULT_DESCRIPTOR: MsgDescriptor = MsgDescriptor {
    msg: MessageType::StatusEnquiry,
    mandatory: &[],
    pre_handle: None,
};

/// Descriptor for a message type.
pub(crate) fn descriptor(msg: MessageType) -> &'static MsgDescriptor {
    DESCRIPTORS
        .iter()
        .find(|d| d.msg == msg)
        .unwrap_or(&DEFAULT_DESCRIPTOR)
}

/// Ordered IE identifiers for outbound composition. Transmitters decide for
/// themselves whether they apply (switch dialect, field presence), so these
/// lists are supersets.
pub(crate) fn outbound_ies(msg: MessageType) -> &'static [u8] {
    match msg {
        MessageType::Setup => &[
            ie::BEARER_CAPABILITY,
            ie::CHANNEL_IDENT,
            ie::NETWORK_SPEC_FAC,
            ie::PROGRESS_INDICATOR,
            ie::CALLING_PARTY_NUMBER,
            ie::CALLED_PARTY_NUMBER,
            ie::SENDING_COMPLETE,
        ],
        MessageType::SetupAcknowledge => &[ie::CHANNEL_IDENT],
        MessageType::CallProceeding => &[ie::CHANNEL_IDENT],
        MessageType::Alerting => &[ie::CHANNEL_IDENT, ie::PROGRESS_INDICATOR],
        MessageType::Progress => &[ie::PROGRESS_INDICATOR],
        MessageType::Connect => &[ie::CHANNEL_IDENT, ie::PROGRESS_INDICATOR],
        MessageType::ConnectAcknowledge => &[],
        MessageType::Disconnect => &[ie::CAUSE],
        MessageType::Release => &[ie::CAUSE],
        MessageType::ReleaseComplete => &[ie::CAUSE],
        MessageType::Restart => &[ie::CHANNEL_IDENT, ie::RESTART_INDICATOR],
        MessageType::RestartAcknowledge => &[ie::CHANNEL_IDENT, ie::RESTART_INDICATOR],
        MessageType::Status => &[ie::CAUSE, ie::CALL_STATE],
        MessageType::StatusEnquiry => &[],
        MessageType::Information => &[ie::CALLED_PARTY_NUMBER, ie::KEYPAD_FACILITY],
        MessageType::Facility => &[],
        MessageType::Notify => &[],
    }
}
