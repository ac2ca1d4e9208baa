//! Information element registry.
//!
//! A flat table maps each IE identifier to up to three functions: `dump`
//! (trace), `receive` (parse into the call record), and `transmit` (compose
//! from the call record). New IEs plug in by adding a row. Transmit returns
//! the number of content octets written, `0` meaning "this IE does not apply
//! to this call" (a legitimate omission), and for single-octet IEs a return
//! of 1 asks for the identifier octet alone.
//!
//! The Channel Identification parser follows the octet rules of Q.931
//! §4.5.13 for both basic and primary interfaces.

use prilink_types::call::{
    Bearer, CallState, CalledParty, CallingParty, CauseInfo, ChanPref, ChannelId, NameString,
    NumberString, Progress, layer1, plan, presentation, transfer_cap, transfer_mode,
};
use prilink_types::cause::cause_to_str;
use prilink_types::custom::{PriError, PriResult};
use prilink_types::frame::q931::{MessageType, ie};
use prilink_types::switch::SwitchVariant;

use crate::q931::call::Call;
use crate::SpanConfig;

/// Parse an inbound IE's content into the call record.
pub(crate) type IeReceiveFn = fn(&SpanConfig, &mut Call, MessageType, &[u8]) -> PriResult<()>;
/// Compose an IE's content from the call record; 0 = omit.
pub(crate) type IeTransmitFn = fn(&SpanConfig, &Call, MessageType, &mut [u8]) -> PriResult<usize>;
/// Trace an IE's content.
pub(crate) type IeDumpFn = fn(&[u8]);

/// One registry row.
pub(crate) struct IeHandler {
    pub id: u8,
    pub name: &'static str,
    pub dump: Option<IeDumpFn>,
    pub receive: Option<IeReceiveFn>,
    pub transmit: Option<IeTransmitFn>,
}

/// Find the registry row for an identifier.
pub(crate) fn handler_for(id: u8) -> Option<&'static IeHandler> {
    IES.iter().find(|h| h.id == id)
}

/// Name of an IE for diagnostics.
pub(crate) fn ie_name(id: u8) -> &'static str {
    handler_for(id).map(|h| h.name).unwrap_or("Unknown IE")
}

fn set_digits(dst: &mut NumberString, src: &[u8]) {
    dst.clear();
    append_digits(dst, src);
}

fn append_digits(dst: &mut NumberString, src: &[u8]) {
    for &b in src {
        if !b.is_ascii() || b == 0 {
            continue;
        }
        if dst.push(b as char).is_err() {
            log::warn!("number too long, truncating");
            break;
        }
    }
}

// --- Bearer Capability ---------------------------------------------------

fn receive_bearer_capability(
    cfg: &SpanConfig,
    call: &mut Call,
    _msg: MessageType,
    data: &[u8],
) -> PriResult<()> {
    if data.len() < 2 {
        return Err(PriError::MalformedIe);
    }
    if data[0] & 0x60 != 0 {
        log::warn!("non-ITU coding standard in bearer capability");
        return Err(PriError::InvalidParameter);
    }
    let mut cap = data[0] & 0x1f;
    // The 4ESS puts 3.1 kHz audio on its own capability code
    if cfg.switch == SwitchVariant::Att4Ess && cap == transfer_cap::AUDIO_4ESS {
        cap = transfer_cap::AUDIO_3_1K;
    }
    let mode_rate = data[1] & 0x7f;
    let mut pos = 2;
    let mut bearer = Bearer {
        transfer_cap: cap,
        mode_rate,
        multiplier: None,
        userl1: None,
        rate_adaption: None,
        userl2: None,
        userl3: None,
    };
    if mode_rate == transfer_mode::MULTIRATE {
        if pos >= data.len() {
            return Err(PriError::MalformedIe);
        }
        bearer.multiplier = Some(data[pos] & 0x7f);
        pos += 1;
    }
    if mode_rate != transfer_mode::PACKET {
        if pos < data.len() {
            let l1 = data[pos] & 0x7f;
            bearer.userl1 = Some(l1);
            if l1 == layer1::ITU_RATE_ADAPT && pos + 1 < data.len() {
                bearer.rate_adaption = Some(data[pos + 1] & 0x7f);
            }
        }
    } else {
        if pos + 1 >= data.len() {
            return Err(PriError::MalformedIe);
        }
        bearer.userl2 = Some(data[pos] & 0x7f);
        bearer.userl3 = Some(data[pos + 1] & 0x7f);
    }
    call.bearer = Some(bearer);
    Ok(())
}

fn transmit_bearer_capability(
    cfg: &SpanConfig,
    call: &Call,
    _msg: MessageType,
    buf: &mut [u8],
) -> PriResult<usize> {
    let Some(bearer) = call.bearer else {
        return Ok(0);
    };
    let mut cap = bearer.transfer_cap;
    if cfg.switch == SwitchVariant::Att4Ess && cap == transfer_cap::AUDIO_3_1K {
        cap = transfer_cap::AUDIO_4ESS;
    }
    buf[0] = 0x80 | cap;
    buf[1] = 0x80 | bearer.mode_rate;
    let mut pos = 2;
    if bearer.mode_rate == transfer_mode::MULTIRATE {
        if let Some(m) = bearer.multiplier {
            buf[pos] = 0x80 | m;
            pos += 1;
        }
    }
    if bearer.mode_rate != transfer_mode::PACKET {
        // The 4ESS wants no layer-1 octet at all
        if cfg.switch == SwitchVariant::Att4Ess {
            return Ok(pos);
        }
        let l1 = bearer.userl1.unwrap_or(layer1::ULAW);
        buf[pos] = 0x80 | l1;
        pos += 1;
        if l1 == layer1::ITU_RATE_ADAPT {
            buf[pos] = 0x80 | bearer.rate_adaption.unwrap_or(0);
            pos += 1;
        }
    } else {
        buf[pos] = 0x80 | bearer.userl2.unwrap_or(0);
        buf[pos + 1] = 0x80 | bearer.userl3.unwrap_or(0);
        pos += 2;
    }
    Ok(pos)
}

fn dump_bearer_capability(data: &[u8]) {
    if data.len() >= 2 {
        log::debug!(
            "  Bearer Capability [cap {:#04x} mode/rate {:#04x}]",
            data[0] & 0x1f,
            data[1] & 0x7f
        );
    }
}

// --- Channel Identification ----------------------------------------------

/// Timeslot on the wire for a logical B-channel number. With logical
/// mapping on an E1 span the stack skips the slot 16 signalling channel on
/// the caller's behalf; otherwise channel numbers are timeslot numbers.
fn e1_wire_channel(cfg: &SpanConfig, channel: u8) -> u8 {
    if cfg.chan_mapping_logical && cfg.switch.is_e1() && channel >= 16 {
        channel + 1
    } else {
        channel
    }
}

fn e1_logical_channel(cfg: &SpanConfig, wire: u8) -> u8 {
    if cfg.chan_mapping_logical && cfg.switch.is_e1() && wire >= 17 {
        wire - 1
    } else {
        wire
    }
}

fn receive_channel_id(
    cfg: &SpanConfig,
    call: &mut Call,
    _msg: MessageType,
    data: &[u8],
) -> PriResult<()> {
    if data.is_empty() {
        return Err(PriError::MalformedIe);
    }
    let o3 = data[0];
    let mut chan = ChannelId {
        pref: if o3 & 0x08 != 0 { ChanPref::Exclusive } else { ChanPref::Preferred },
        ..ChannelId::default()
    };
    let primary = o3 & 0x20 != 0;
    let selection = o3 & 0x03;
    let mut pos = 1;
    if o3 & 0x40 != 0 {
        // Interface explicitly identified
        if pos >= data.len() {
            return Err(PriError::MalformedIe);
        }
        chan.ds1 = Some(data[pos] & 0x7f);
        pos += 1;
    }
    if primary {
        match selection {
            0 => {}
            1 => {
                if pos >= data.len() {
                    return Err(PriError::MalformedIe);
                }
                let o32 = data[pos];
                if o32 & 0x60 != 0 {
                    log::warn!("non-ITU coding in channel identification");
                    return Err(PriError::InvalidParameter);
                }
                if o32 & 0x0f != 3 {
                    log::warn!("unexpected channel unit type {}", o32 & 0x0f);
                    return Err(PriError::InvalidParameter);
                }
                pos += 1;
                if o32 & 0x10 != 0 {
                    // Slot map
                    if pos + 3 > data.len() {
                        return Err(PriError::MalformedIe);
                    }
                    let mut map: u32 = 0;
                    for x in 0..3 {
                        map = (map << 8) | data[pos + x] as u32;
                    }
                    chan.slotmap = Some(map);
                } else {
                    if pos >= data.len() {
                        return Err(PriError::MalformedIe);
                    }
                    chan.channel = Some(e1_logical_channel(cfg, data[pos] & 0x7f));
                }
            }
            3 => {
                // Any channel acceptable
            }
            _ => {
                log::warn!("unexpected channel selection {selection}");
                return Err(PriError::InvalidParameter);
            }
        }
    } else {
        // Basic interface: the selection bits name B1/B2 directly
        match selection {
            1 => chan.channel = Some(1),
            2 => chan.channel = Some(2),
            _ => {}
        }
    }
    call.channel = chan;
    Ok(())
}

fn transmit_channel_id(
    cfg: &SpanConfig,
    call: &Call,
    _msg: MessageType,
    buf: &mut [u8],
) -> PriResult<usize> {
    let ch = &call.channel;
    if ch.is_empty() {
        return Ok(0);
    }
    let excl = if ch.pref == ChanPref::Exclusive { 0x08 } else { 0x00 };

    if cfg.bri {
        let selection = match ch.channel {
            Some(1) => 1,
            Some(2) => 2,
            _ => 3,
        };
        buf[0] = 0x80 | excl | selection;
        return Ok(1);
    }

    buf[0] = 0xa1 | excl;
    let mut pos = 1;
    if let Some(ds1) = ch.ds1 {
        buf[0] |= 0x40;
        buf[pos] = 0x80 | ds1;
        pos += 1;
    }
    if let Some(channel) = ch.channel {
        buf[pos] = 0x83;
        buf[pos + 1] = 0x80 | e1_wire_channel(cfg, channel);
        return Ok(pos + 2);
    }
    if let Some(map) = ch.slotmap {
        buf[pos] = 0x93;
        buf[pos + 1] = (map >> 16) as u8;
        buf[pos + 2] = (map >> 8) as u8;
        buf[pos + 3] = map as u8;
        return Ok(pos + 4);
    }
    if ch.ds1.is_some() {
        return Ok(pos);
    }
    log::error!("no slot map, channel, or DS1 to identify");
    Err(PriError::InvalidParameter)
}

fn dump_channel_id(data: &[u8]) {
    if let Some(&o3) = data.first() {
        log::debug!(
            "  Channel ID [{} {} sel {}]",
            if o3 & 0x20 != 0 { "primary" } else { "basic" },
            if o3 & 0x08 != 0 { "exclusive" } else { "preferred" },
            o3 & 0x03
        );
    }
}

// --- Cause ---------------------------------------------------------------

fn receive_cause(
    _cfg: &SpanConfig,
    call: &mut Call,
    _msg: MessageType,
    data: &[u8],
) -> PriResult<()> {
    if data.len() < 2 {
        return Err(PriError::MalformedIe);
    }
    call.cause = Some(CauseInfo {
        coding: (data[0] & 0x60) >> 5,
        location: data[0] & 0x0f,
        value: data[1] & 0x7f,
    });
    Ok(())
}

fn transmit_cause(
    _cfg: &SpanConfig,
    call: &Call,
    _msg: MessageType,
    buf: &mut [u8],
) -> PriResult<usize> {
    let Some(cause) = call.cause else {
        return Ok(0);
    };
    buf[0] = 0x80 | (cause.coding << 5) | cause.location;
    buf[1] = 0x80 | cause.value;
    Ok(2)
}

fn dump_cause(data: &[u8]) {
    if data.len() >= 2 {
        let value = data[1] & 0x7f;
        log::debug!("  Cause [{} ({})]", cause_to_str(value), value);
    }
}

// --- Progress Indicator --------------------------------------------------

fn receive_progress_indicator(
    _cfg: &SpanConfig,
    call: &mut Call,
    _msg: MessageType,
    data: &[u8],
) -> PriResult<()> {
    if data.len() < 2 {
        return Err(PriError::MalformedIe);
    }
    call.progress = Some(Progress {
        coding: (data[0] & 0x60) >> 5,
        location: data[0] & 0x0f,
        description: data[1] & 0x7f,
    });
    Ok(())
}

fn transmit_progress_indicator(
    _cfg: &SpanConfig,
    call: &Call,
    _msg: MessageType,
    buf: &mut [u8],
) -> PriResult<usize> {
    let Some(progress) = call.progress else {
        // Omitted entirely when no progress applies
        return Ok(0);
    };
    buf[0] = 0x80 | (progress.coding << 5) | progress.location;
    buf[1] = 0x80 | progress.description;
    Ok(2)
}

// --- Party numbers -------------------------------------------------------

fn receive_called_party_number(
    _cfg: &SpanConfig,
    call: &mut Call,
    msg: MessageType,
    data: &[u8],
) -> PriResult<()> {
    if data.is_empty() {
        return Err(PriError::MalformedIe);
    }
    let num_plan = data[0] & 0x7f;
    if msg == MessageType::Information {
        // Overlap receiving: digits accumulate across messages
        append_digits(&mut call.overlap_digits, &data[1..]);
        return Ok(());
    }
    let mut called = CalledParty { number: NumberString::new(), plan: num_plan };
    set_digits(&mut called.number, &data[1..]);
    set_digits(&mut call.overlap_digits, &data[1..]);
    call.called = Some(called);
    Ok(())
}

fn transmit_called_party_number(
    _cfg: &SpanConfig,
    call: &Call,
    msg: MessageType,
    buf: &mut [u8],
) -> PriResult<usize> {
    let (digits, num_plan) = if msg == MessageType::Information {
        if call.pending_digits.is_empty() {
            return Ok(0);
        }
        (
            call.pending_digits.as_str(),
            call.called.as_ref().map(|c| c.plan).unwrap_or(plan::UNKNOWN),
        )
    } else {
        let Some(called) = call.called.as_ref() else {
            return Ok(0);
        };
        (called.number.as_str(), called.plan)
    };
    buf[0] = 0x80 | num_plan;
    let bytes = digits.as_bytes();
    if 1 + bytes.len() > buf.len() {
        return Err(PriError::BufferFull);
    }
    buf[1..1 + bytes.len()].copy_from_slice(bytes);
    Ok(1 + bytes.len())
}

fn receive_calling_party_number(
    _cfg: &SpanConfig,
    call: &mut Call,
    _msg: MessageType,
    data: &[u8],
) -> PriResult<()> {
    if data.is_empty() {
        return Err(PriError::MalformedIe);
    }
    let mut calling = CallingParty {
        number: NumberString::new(),
        plan: data[0] & 0x7f,
        presentation: presentation::ALLOWED_USER_NOT_SCREENED,
    };
    let digits_from = if data[0] & 0x80 != 0 {
        // No octet 3a: number follows directly
        1
    } else {
        if data.len() < 2 {
            return Err(PriError::MalformedIe);
        }
        calling.presentation = data[1] & 0x7f;
        2
    };
    set_digits(&mut calling.number, &data[digits_from..]);
    call.calling = Some(calling);
    Ok(())
}

fn transmit_calling_party_number(
    _cfg: &SpanConfig,
    call: &Call,
    _msg: MessageType,
    buf: &mut [u8],
) -> PriResult<usize> {
    let Some(calling) = call.calling.as_ref() else {
        return Ok(0);
    };
    buf[0] = calling.plan;
    buf[1] = 0x80 | calling.presentation;
    let bytes = calling.number.as_bytes();
    if 2 + bytes.len() > buf.len() {
        return Err(PriError::BufferFull);
    }
    buf[2..2 + bytes.len()].copy_from_slice(bytes);
    Ok(2 + bytes.len())
}

fn dump_called_party_number(data: &[u8]) {
    if !data.is_empty() {
        let mut digits = NumberString::new();
        append_digits(&mut digits, &data[1..]);
        log::debug!("  Called Number [plan {:#04x} '{}']", data[0] & 0x7f, digits);
    }
}

fn dump_calling_party_number(data: &[u8]) {
    if !data.is_empty() {
        let from = if data[0] & 0x80 != 0 { 1 } else { 2 };
        let mut digits = NumberString::new();
        if data.len() > from {
            append_digits(&mut digits, &data[from..]);
        }
        log::debug!("  Calling Number [plan {:#04x} '{}']", data[0] & 0x7f, digits);
    }
}

// --- Restart Indicator ---------------------------------------------------

fn receive_restart_indicator(
    _cfg: &SpanConfig,
    call: &mut Call,
    _msg: MessageType,
    data: &[u8],
) -> PriResult<()> {
    if data.is_empty() {
        return Err(PriError::MalformedIe);
    }
    call.restart_class = Some(data[0] & 0x07);
    Ok(())
}

fn transmit_restart_indicator(
    _cfg: &SpanConfig,
    call: &Call,
    _msg: MessageType,
    buf: &mut [u8],
) -> PriResult<usize> {
    let Some(class) = call.restart_class else {
        return Ok(0);
    };
    match class {
        0 | 6 | 7 => {
            buf[0] = 0x80 | class;
            Ok(1)
        }
        _ => {
            log::error!("invalid restart indicator class {class}");
            Err(PriError::InvalidParameter)
        }
    }
}

// --- Call State ----------------------------------------------------------

fn receive_call_state(
    _cfg: &SpanConfig,
    call: &mut Call,
    _msg: MessageType,
    data: &[u8],
) -> PriResult<()> {
    if data.is_empty() {
        return Err(PriError::MalformedIe);
    }
    call.peer_state = CallState::try_from(data[0] & 0x3f).ok();
    Ok(())
}

fn transmit_call_state(
    _cfg: &SpanConfig,
    call: &Call,
    _msg: MessageType,
    buf: &mut [u8],
) -> PriResult<usize> {
    buf[0] = call.our_state.wire_value();
    Ok(1)
}

// --- Display, Keypad, Notification ---------------------------------------

fn receive_display(
    _cfg: &SpanConfig,
    call: &mut Call,
    _msg: MessageType,
    data: &[u8],
) -> PriResult<()> {
    let mut name = NameString::new();
    for &b in data {
        if b.is_ascii() && b != 0 {
            if name.push(b as char).is_err() {
                break;
            }
        }
    }
    call.display = Some(name);
    Ok(())
}

fn receive_keypad_facility(
    _cfg: &SpanConfig,
    call: &mut Call,
    _msg: MessageType,
    data: &[u8],
) -> PriResult<()> {
    set_digits(&mut call.keypad_digits, data);
    Ok(())
}

fn transmit_keypad_facility(
    _cfg: &SpanConfig,
    call: &Call,
    msg: MessageType,
    buf: &mut [u8],
) -> PriResult<usize> {
    if msg != MessageType::Information || call.keypad_digits.is_empty() {
        return Ok(0);
    }
    let bytes = call.keypad_digits.as_bytes();
    if bytes.len() > buf.len() {
        return Err(PriError::BufferFull);
    }
    buf[..bytes.len()].copy_from_slice(bytes);
    Ok(bytes.len())
}

fn receive_notify_ind(
    _cfg: &SpanConfig,
    call: &mut Call,
    _msg: MessageType,
    data: &[u8],
) -> PriResult<()> {
    if data.is_empty() {
        return Err(PriError::MalformedIe);
    }
    call.notify_info = Some(data[0] & 0x7f);
    Ok(())
}

fn receive_facility(
    _cfg: &SpanConfig,
    _call: &mut Call,
    _msg: MessageType,
    data: &[u8],
) -> PriResult<()> {
    // ROSE components are decoded by supplementary-service plugins; the core
    // only carries them.
    log::debug!("facility IE with {} octets passed through", data.len());
    Ok(())
}

// --- Network-Specific Facilities & Sending Complete ----------------------

fn transmit_network_spec_fac(
    cfg: &SpanConfig,
    _call: &Call,
    msg: MessageType,
    buf: &mut [u8],
) -> PriResult<usize> {
    let Some(nsf) = cfg.nsf else {
        return Ok(0);
    };
    if msg != MessageType::Setup {
        return Ok(0);
    }
    buf[0] = 0xa0 | (nsf & 0x0f);
    Ok(1)
}

fn receive_sending_complete(
    _cfg: &SpanConfig,
    call: &mut Call,
    _msg: MessageType,
    _data: &[u8],
) -> PriResult<()> {
    call.sending_complete = true;
    Ok(())
}

fn transmit_sending_complete(
    cfg: &SpanConfig,
    _call: &Call,
    msg: MessageType,
    _buf: &mut [u8],
) -> PriResult<usize> {
    if cfg.switch.is_euroisdn() && msg == MessageType::Setup {
        // Single-octet IE: the identifier is the whole element
        return Ok(1);
    }
    Ok(0)
}

/// The registry. Rows without handlers are recognized (named in traces,
/// skipped) but not processed.
pub(crate) static IES: &[IeHandler] = &[
    IeHandler {
        id: ie::BEARER_CAPABILITY,
        name: "Bearer Capability",
        dump: Some(dump_bearer_capability),
        receive: Some(receive_bearer_capability),
        transmit: Some(transmit_bearer_capability),
    },
    IeHandler {
        id: ie::CAUSE,
        name: "Cause",
        dump: Some(dump_cause),
        receive: Some(receive_cause),
        transmit: Some(transmit_cause),
    },
    IeHandler {
        id: ie::CALL_STATE,
        name: "Call State",
        dump: None,
        receive: Some(receive_call_state),
        transmit: Some(transmit_call_state),
    },
    IeHandler {
        id: ie::CHANNEL_IDENT,
        name: "Channel Identification",
        dump: Some(dump_channel_id),
        receive: Some(receive_channel_id),
        transmit: Some(transmit_channel_id),
    },
    IeHandler {
        id: ie::FACILITY,
        name: "Facility",
        dump: None,
        receive: Some(receive_facility),
        transmit: None,
    },
    IeHandler {
        id: ie::PROGRESS_INDICATOR,
        name: "Progress Indicator",
        dump: None,
        receive: Some(receive_progress_indicator),
        transmit: Some(transmit_progress_indicator),
    },
    IeHandler {
        id: ie::NETWORK_SPEC_FAC,
        name: "Network-Specific Facilities",
        dump: None,
        receive: None,
        transmit: Some(transmit_network_spec_fac),
    },
    IeHandler {
        id: ie::NOTIFY_IND,
        name: "Notification Indicator",
        dump: None,
        receive: Some(receive_notify_ind),
        transmit: None,
    },
    IeHandler {
        id: ie::DISPLAY,
        name: "Display",
        dump: None,
        receive: Some(receive_display),
        transmit: None,
    },
    IeHandler {
        id: ie::KEYPAD_FACILITY,
        name: "Keypad Facility",
        dump: None,
        receive: Some(receive_keypad_facility),
        transmit: Some(transmit_keypad_facility),
    },
    IeHandler {
        id: ie::CALLING_PARTY_NUMBER,
        name: "Calling Party Number",
        dump: Some(dump_calling_party_number),
        receive: Some(receive_calling_party_number),
        transmit: Some(transmit_calling_party_number),
    },
    IeHandler {
        id: 0x6d,
        name: "Calling Party Subaddress",
        dump: None,
        receive: None,
        transmit: None,
    },
    IeHandler {
        id: ie::CALLED_PARTY_NUMBER,
        name: "Called Party Number",
        dump: Some(dump_called_party_number),
        receive: Some(receive_called_party_number),
        transmit: Some(transmit_called_party_number),
    },
    IeHandler {
        id: 0x71,
        name: "Called Party Subaddress",
        dump: None,
        receive: None,
        transmit: None,
    },
    IeHandler {
        id: 0x74,
        name: "Redirecting Number",
        dump: None,
        receive: None,
        transmit: None,
    },
    IeHandler {
        id: ie::RESTART_INDICATOR,
        name: "Restart Indicator",
        dump: None,
        receive: Some(receive_restart_indicator),
        transmit: Some(transmit_restart_indicator),
    },
    IeHandler {
        id: 0x7c,
        name: "Low-layer Compatibility",
        dump: None,
        receive: None,
        transmit: None,
    },
    IeHandler {
        id: 0x7d,
        name: "High-layer Compatibility",
        dump: None,
        receive: None,
        transmit: None,
    },
    IeHandler {
        id: ie::SENDING_COMPLETE,
        name: "Sending Complete",
        dump: None,
        receive: Some(receive_sending_complete),
        transmit: Some(transmit_sending_complete),
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use prilink_types::switch::{DebugFlags, NodeType};
    use prilink_types::timers::default_timers;

    fn cfg(switch: SwitchVariant) -> SpanConfig {
        SpanConfig {
            node: NodeType::Network,
            switch,
            bri: false,
            ptmp: false,
            debug: DebugFlags::default(),
            timers: default_timers(),
            overlap_dial: false,
            nsf: None,
            chan_mapping_logical: false,
        }
    }

    fn call() -> Call {
        Call::new(0x8001, 0)
    }

    #[test]
    fn bearer_capability_round_trip() {
        let cfg = cfg(SwitchVariant::Ni2);
        let mut c = call();
        c.bearer = Some(Bearer::speech(layer1::ULAW));
        let mut buf = [0u8; 16];
        let n = transmit_bearer_capability(&cfg, &c, MessageType::Setup, &mut buf).unwrap();
        assert_eq!(&buf[..n], &[0x80, 0x90, 0xa2]);

        let mut rx = call();
        receive_bearer_capability(&cfg, &mut rx, MessageType::Setup, &buf[..n]).unwrap();
        assert_eq!(rx.bearer, c.bearer);
    }

    #[test]
    fn bearer_capability_4ess_audio_substitution() {
        let cfg = cfg(SwitchVariant::Att4Ess);
        let mut c = call();
        c.bearer = Some(Bearer {
            transfer_cap: transfer_cap::AUDIO_3_1K,
            ..Bearer::speech(layer1::ULAW)
        });
        let mut buf = [0u8; 16];
        let n = transmit_bearer_capability(&cfg, &c, MessageType::Setup, &mut buf).unwrap();
        // Dialect code on the wire, and no layer-1 octet for the 4ESS
        assert_eq!(&buf[..n], &[0x80 | transfer_cap::AUDIO_4ESS, 0x90]);

        let mut rx = call();
        receive_bearer_capability(&cfg, &mut rx, MessageType::Setup, &buf[..n]).unwrap();
        // Normalized back to the canonical capability
        assert_eq!(rx.bearer.unwrap().transfer_cap, transfer_cap::AUDIO_3_1K);
    }

    #[test]
    fn channel_id_explicit_channel_round_trip() {
        let cfg = cfg(SwitchVariant::Ni2);
        let mut c = call();
        c.channel = ChannelId {
            channel: Some(17),
            slotmap: None,
            ds1: None,
            pref: ChanPref::Exclusive,
        };
        let mut buf = [0u8; 16];
        let n = transmit_channel_id(&cfg, &c, MessageType::Setup, &mut buf).unwrap();
        let mut rx = call();
        receive_channel_id(&cfg, &mut rx, MessageType::Setup, &buf[..n]).unwrap();
        assert_eq!(rx.channel, c.channel);
    }

    #[test]
    fn channel_id_slotmap_round_trip() {
        let cfg = cfg(SwitchVariant::Ni2);
        let mut c = call();
        c.channel = ChannelId {
            channel: None,
            slotmap: Some(0x00be77),
            ds1: Some(2),
            pref: ChanPref::Preferred,
        };
        let mut buf = [0u8; 16];
        let n = transmit_channel_id(&cfg, &c, MessageType::Restart, &mut buf).unwrap();
        let mut rx = call();
        receive_channel_id(&cfg, &mut rx, MessageType::Restart, &buf[..n]).unwrap();
        assert_eq!(rx.channel, c.channel);
    }

    #[test]
    fn e1_logical_mapping_skips_the_signalling_slot() {
        let mut e1 = cfg(SwitchVariant::EuroIsdnE1);
        e1.chan_mapping_logical = true;
        let mut c = call();
        c.channel = ChannelId {
            channel: Some(16),
            slotmap: None,
            ds1: None,
            pref: ChanPref::Exclusive,
        };
        let mut buf = [0u8; 16];
        let n = transmit_channel_id(&e1, &c, MessageType::Setup, &mut buf).unwrap();
        // Logical B16 rides timeslot 17 on the wire
        assert_eq!(buf[n - 1] & 0x7f, 17);

        let mut rx = call();
        receive_channel_id(&e1, &mut rx, MessageType::Setup, &buf[..n]).unwrap();
        assert_eq!(rx.channel.channel, Some(16));
    }

    #[test]
    fn calling_number_without_screening_octet() {
        let cfg = cfg(SwitchVariant::Ni2);
        let mut c = call();
        // Ext bit set on the plan octet: no presentation octet follows
        receive_calling_party_number(&cfg, &mut c, MessageType::Setup, b"\xa15550000")
            .unwrap();
        let calling = c.calling.unwrap();
        assert_eq!(calling.number.as_str(), "5550000");
        assert_eq!(calling.plan, 0x21);
        assert_eq!(calling.presentation, presentation::ALLOWED_USER_NOT_SCREENED);
    }

    #[test]
    fn overlap_digits_accumulate_on_information() {
        let cfg = cfg(SwitchVariant::EuroIsdnE1);
        let mut c = call();
        receive_called_party_number(&cfg, &mut c, MessageType::Setup, b"\x81555").unwrap();
        receive_called_party_number(&cfg, &mut c, MessageType::Information, b"\x811212")
            .unwrap();
        assert_eq!(c.overlap_digits.as_str(), "5551212");
        assert_eq!(c.called.as_ref().unwrap().number.as_str(), "555");
    }

    #[test]
    fn sending_complete_is_euroisdn_only() {
        let mut buf = [0u8; 4];
        let c = call();
        let euro = cfg(SwitchVariant::EuroIsdnE1);
        assert_eq!(
            transmit_sending_complete(&euro, &c, MessageType::Setup, &mut buf).unwrap(),
            1
        );
        let ni = cfg(SwitchVariant::Ni2);
        assert_eq!(
            transmit_sending_complete(&ni, &c, MessageType::Setup, &mut buf).unwrap(),
            0
        );
    }
}
