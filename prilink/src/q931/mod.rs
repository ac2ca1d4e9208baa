//! Q.931 call-control engine.
//!
//! Inbound messages locate (or create) their call record by call reference,
//! run the per-message pre-handle resets, dispatch each information element
//! through the registry, check the mandatory-IE set, and finish in the
//! post-handle that advances the call state, answers the peer, and queues at
//! most one application event. Outbound primitives compose messages from the
//! call record through the same registry and hand them to the Q.921 engine.

pub(crate) mod call;
pub(crate) mod ie;
pub(crate) mod messages;

use heapless::Vec;
use prilink_types::call::{
    Bearer, CallState, CalledParty, CallingParty, CauseInfo, ChanPref, ChannelId, layer1, plan,
    presentation, progress, transfer_mode,
};
use prilink_types::cause::{
    CAUSE_BEARERCAPABILITY_NOTIMPL, CAUSE_INTERWORKING, CAUSE_MANDATORY_IE_MISSING,
    CAUSE_MESSAGE_TYPE_NONEXIST, CAUSE_NONSELECTED_USER_CLEARING, CAUSE_RECOVERY_ON_TIMER_EXPIRE,
    CAUSE_REQUESTED_CHAN_UNAVAIL, CAUSE_RESPONSE_TO_STATUS_ENQUIRY, CAUSE_WRONG_CALL_STATE,
    CODE_CCITT, LOC_PRIV_NET_LOCAL_USER,
};
use prilink_types::custom::{PriError, PriResult};
use prilink_types::event::{Event, RingEvent};
use prilink_types::frame::q921::TEI_GROUP;
use prilink_types::frame::q931::{
    DUMMY_CALL_REFERENCE, MAINTENANCE_PROTOCOL_DISCRIMINATOR, MessageType,
    PROTOCOL_DISCRIMINATOR, ie as ie_ids, restart,
};
use prilink_types::switch::{DebugFlags, SwitchVariant};
use prilink_types::timers::TimerIdx;
use prilink_types::MonoTime;
use prilink_util::frame_format::q931 as codec;
use prilink_util::frame_format::q931::IeIter;

use crate::dev::DchanDevice;
use crate::q931::call::{Apdu, MAX_CALLS};
use crate::sched::{CallTimer, TimerEvent};
use crate::DchanController;

/// Scratch size for one composed Q.931 message.
const MSG_BUF: usize = 512;
/// Scratch size for one composed IE's content.
const IE_BUF: usize = 64;

/// Parameters of an outgoing call, handed to [`DchanController::setup`].
#[derive(Debug, Clone, Copy)]
pub struct SetupParams<'a> {
    /// Information transfer capability (speech, digital, ...)
    pub transfer_cap: u8,
    /// Requested B channel
    pub channel: u8,
    /// Only that channel is acceptable
    pub exclusive: bool,
    /// The calling equipment is not ISDN (dialect-dependent progress)
    pub non_isdn: bool,
    /// Calling number, if one is presented
    pub caller: Option<&'a str>,
    /// Calling type-of-number and plan
    pub caller_plan: u8,
    /// Calling presentation and screening
    pub caller_pres: u8,
    /// Called number
    pub called: &'a str,
    /// Called type-of-number and plan
    pub called_plan: u8,
    /// User information layer 1 coding; mu-law when absent
    pub userl1: Option<u8>,
}

impl DchanController {
    // --- inbound ---------------------------------------------------------

    /// Handle one verified layer-3 payload delivered by Q.921.
    pub(crate) fn q931_receive(
        &mut self,
        dev: &mut impl DchanDevice,
        now: MonoTime,
        tei: u8,
        data: &[u8],
    ) -> PriResult<()> {
        let (hdr, ie_off) = match codec::decode_header(data) {
            Ok(v) => v,
            Err(e) => {
                log::error!("undecodable Q.931 header: {e:?}");
                return Ok(());
            }
        };

        if hdr.protocol == MAINTENANCE_PROTOCOL_DISCRIMINATOR {
            // AT&T maintenance: reflect the message back with byte 4 turned
            // from SERVICE into SERVICE ACKNOWLEDGE.
            if data.len() < 4 || data.len() > MSG_BUF {
                return Ok(());
            }
            let mut buf = [0u8; MSG_BUF];
            buf[..data.len()].copy_from_slice(data);
            buf[3] = buf[3].wrapping_sub(0x08);
            return self.q921_transmit_iframe(dev, now, tei, &buf[..data.len()]);
        }
        if hdr.protocol != PROTOCOL_DISCRIMINATOR {
            log::warn!("unknown protocol discriminator {:#04x}", hdr.protocol);
            return Ok(());
        }

        let cref = hdr.cref;
        let msg = match MessageType::try_from(hdr.msg_type) {
            Ok(m) => m,
            Err(_) => {
                log::warn!("message type {:#04x} nonexistent", hdr.msg_type);
                return self.q931_status(dev, now, cref, tei, CAUSE_MESSAGE_TYPE_NONEXIST);
            }
        };

        if self.cfg.debug.contains(DebugFlags::Q931_DUMP) {
            log::debug!("< {} cref {:04x} tei {}", msg.name(), cref, tei);
        }

        let desc = messages::descriptor(msg);
        {
            let call = self.calls.get_or_create(cref, tei)?;
            if let Some(pre) = desc.pre_handle {
                pre(call);
            }
        }

        let mut seen: Vec<u8, 32> = Vec::new();
        for item in IeIter::new(&data[ie_off..]) {
            let raw = match item {
                Ok(raw) => raw,
                Err(_) => {
                    log::error!("IE length overruns frame, {} discarded", msg.name());
                    return Ok(());
                }
            };
            let _ = seen.push(raw.id);
            let Some(handler) = ie::handler_for(raw.id) else {
                log::warn!("unknown IE {:#04x} skipped", raw.id);
                continue;
            };
            if self.cfg.debug.contains(DebugFlags::Q931_DUMP) {
                if let Some(dump) = handler.dump {
                    dump(raw.data);
                }
            }
            let Some(receive) = handler.receive else {
                log::debug!("no receive handler for {}", handler.name);
                continue;
            };
            let Some(call) = self.calls.get_mut(cref) else {
                return Ok(());
            };
            if let Err(e) = receive(&self.cfg, call, msg, raw.data) {
                log::warn!("error parsing {}: {e:?}", handler.name);
            }
        }

        if let Some(missing) = desc
            .mandatory
            .iter()
            .copied()
            .find(|id| !seen.contains(id))
        {
            log::warn!(
                "mandatory IE {} missing in {}",
                ie::ie_name(missing),
                msg.name()
            );
            if msg == MessageType::Setup {
                self.set_call_cause(cref, CAUSE_MANDATORY_IE_MISSING);
                self.q931_send_message(dev, now, cref, MessageType::ReleaseComplete)?;
                self.destroy_call(cref);
            } else if msg != MessageType::Status {
                // Never answer a defective STATUS with another STATUS
                self.q931_status(dev, now, cref, tei, CAUSE_MANDATORY_IE_MISSING)?;
            }
            return Ok(());
        }

        self.q931_post_handle(dev, now, cref, tei, msg)
    }

    fn q931_post_handle(
        &mut self,
        dev: &mut impl DchanDevice,
        now: MonoTime,
        cref: u16,
        tei: u8,
        msg: MessageType,
    ) -> PriResult<()> {
        match msg {
            MessageType::Setup => self.post_setup(dev, now, cref, tei),
            MessageType::SetupAcknowledge => {
                self.stop_call_timer(cref, CallTimer::T303);
                let channel = self.with_call(cref, |c| {
                    c.our_state = CallState::OverlapSending;
                    c.channel.event_channel()
                })?;
                self.push_event(Event::SetupAck { channel, cref });
                Ok(())
            }
            MessageType::CallProceeding => {
                self.stop_call_timer(cref, CallTimer::T303);
                self.start_call_timer(now, cref, CallTimer::T310);
                let (channel, prog) = self.with_call(cref, |c| {
                    c.our_state = CallState::OutgoingCallProceeding;
                    c.note_subcall(tei, CallState::OutgoingCallProceeding);
                    (c.channel.event_channel(), c.progress.map(|p| p.description))
                })?;
                self.push_event(Event::Proceeding { channel, cref, progress: prog });
                Ok(())
            }
            MessageType::Alerting => {
                self.stop_call_timer(cref, CallTimer::T303);
                self.stop_call_timer(cref, CallTimer::T310);
                let channel = self.with_call(cref, |c| {
                    c.our_state = CallState::CallDelivered;
                    c.note_subcall(tei, CallState::CallDelivered);
                    c.channel.event_channel()
                })?;
                self.push_event(Event::Ringing { channel, cref });
                Ok(())
            }
            MessageType::Progress => {
                let (channel, desc) = self.with_call(cref, |c| {
                    (c.channel.event_channel(), c.progress.map(|p| p.description))
                })?;
                if let Some(description) = desc {
                    self.push_event(Event::Progress { channel, cref, progress: description });
                }
                Ok(())
            }
            MessageType::Connect => self.post_connect(dev, now, cref, tei),
            MessageType::ConnectAcknowledge => {
                let answered = self.with_call(cref, |c| {
                    if c.our_state == CallState::ConnectRequest {
                        c.our_state = CallState::Active;
                        Some(c.channel.event_channel())
                    } else {
                        None
                    }
                })?;
                if let Some(channel) = answered {
                    self.push_event(Event::Answer { channel, cref });
                }
                Ok(())
            }
            MessageType::Disconnect => self.post_disconnect(dev, now, cref),
            MessageType::Release => {
                self.stop_all_call_timers(cref);
                let (channel, cause, alive, ack) = self.with_call(cref, |c| {
                    let r = (c.channel.event_channel(), c.event_cause(), c.alive, c.send_hangup_ack);
                    c.alive = false;
                    c.cause = None;
                    r
                })?;
                if alive {
                    self.push_event(Event::Hangup { channel, cref, cause });
                } else if ack {
                    self.push_event(Event::HangupAck { channel, cref });
                }
                self.q931_send_message(dev, now, cref, MessageType::ReleaseComplete)?;
                self.destroy_call(cref);
                Ok(())
            }
            MessageType::ReleaseComplete => {
                self.stop_all_call_timers(cref);
                let (channel, cause, alive, acked) = self.with_call(cref, |c| {
                    (
                        c.channel.event_channel(),
                        c.event_cause(),
                        c.alive,
                        c.send_hangup_ack || c.our_state == CallState::ReleaseRequest,
                    )
                })?;
                if alive {
                    self.push_event(Event::Hangup { channel, cref, cause });
                } else if acked {
                    self.push_event(Event::HangupAck { channel, cref });
                }
                self.destroy_call(cref);
                Ok(())
            }
            MessageType::Restart => self.post_restart(dev, now, cref),
            MessageType::RestartAcknowledge => {
                self.stop_call_timer(cref, CallTimer::T316);
                let channel = self.with_call(cref, |c| match c.restart_class {
                    Some(restart::INDICATED_CHANNEL) => c.channel.event_channel(),
                    _ => -1,
                })?;
                self.push_event(Event::RestartAck { channel });
                self.destroy_call(cref);
                Ok(())
            }
            MessageType::Status => self.post_status(cref),
            MessageType::StatusEnquiry => {
                let fresh = self
                    .calls
                    .get(cref)
                    .map(|c| !c.alive && c.our_state == CallState::Null)
                    .unwrap_or(true);
                self.set_call_cause(cref, CAUSE_RESPONSE_TO_STATUS_ENQUIRY);
                self.q931_send_message(dev, now, cref, MessageType::Status)?;
                if fresh {
                    self.destroy_call(cref);
                } else {
                    self.with_call(cref, |c| c.cause = None)?;
                }
                Ok(())
            }
            MessageType::Information => {
                let (digits, complete, keypad) = self.with_call(cref, |c| {
                    (c.overlap_digits.clone(), c.sending_complete, c.keypad_digits.clone())
                })?;
                if !keypad.is_empty() {
                    self.push_event(Event::KeypadDigit { cref, digits: keypad });
                } else {
                    self.push_event(Event::InfoReceived { cref, digits, complete });
                }
                Ok(())
            }
            MessageType::Facility => {
                let name = self.with_call(cref, |c| c.display.take())?;
                if let Some(name) = name {
                    self.push_event(Event::FacName { cref, name });
                }
                Ok(())
            }
            MessageType::Notify => {
                let info = self.with_call(cref, |c| c.notify_info)?;
                if let Some(info) = info {
                    self.push_event(Event::Notify { cref, info });
                }
                Ok(())
            }
        }
    }

    fn post_setup(
        &mut self,
        dev: &mut impl DchanDevice,
        now: MonoTime,
        cref: u16,
        tei: u8,
    ) -> PriResult<()> {
        let (state, mode_rate, new_channel) = self.with_call(cref, |c| {
            (
                c.our_state,
                c.bearer.map(|b| b.mode_rate),
                c.channel,
            )
        })?;
        if state != CallState::Null {
            log::warn!("SETUP retransmission for live call {cref:04x} ignored");
            return Ok(());
        }
        if mode_rate != Some(transfer_mode::CIRCUIT_64) {
            self.set_call_cause(cref, CAUSE_BEARERCAPABILITY_NOTIMPL);
            self.q931_send_message(dev, now, cref, MessageType::ReleaseComplete)?;
            self.destroy_call(cref);
            return Ok(());
        }
        // Glare: both sides claiming the same channel exclusively
        let glare = new_channel.pref == ChanPref::Exclusive
            && self.calls.iter().any(|c| {
                c.cref != cref
                    && c.alive
                    && c.channel.pref == ChanPref::Exclusive
                    && c.channel.collides_with(&new_channel)
            });
        if glare {
            self.set_call_cause(cref, CAUSE_REQUESTED_CHAN_UNAVAIL);
            self.q931_send_message(dev, now, cref, MessageType::ReleaseComplete)?;
            self.destroy_call(cref);
            return Ok(());
        }

        let overlap = self.cfg.overlap_dial;
        let needs_digits = self.with_call(cref, |c| {
            c.alive = true;
            c.tei = tei;
            c.our_state = CallState::CallPresent;
            overlap && !c.sending_complete
        })?;
        if needs_digits {
            // Overlap receiving: acknowledge the SETUP and collect further
            // digits from INFORMATION messages
            self.with_call(cref, |c| c.our_state = CallState::OverlapReceiving)?;
            self.q931_send_message(dev, now, cref, MessageType::SetupAcknowledge)?;
        }
        let ring = self.with_call(cref, |c| {
            RingEvent {
                cref,
                channel: c.channel.event_channel(),
                flexible: c.channel.pref != ChanPref::Exclusive,
                calling: c.calling.clone().unwrap_or_default(),
                called: c.called.clone().unwrap_or_default(),
                bearer: c.bearer.unwrap_or(Bearer::speech(layer1::ULAW)),
                calling_name: c.display.clone(),
            }
        })?;
        self.push_event(Event::Ring(ring));
        Ok(())
    }

    fn post_connect(
        &mut self,
        dev: &mut impl DchanDevice,
        now: MonoTime,
        cref: u16,
        tei: u8,
    ) -> PriResult<()> {
        self.stop_call_timer(cref, CallTimer::T303);
        self.stop_call_timer(cref, CallTimer::T310);

        // Broadcast SETUP fan-out: the first terminal to answer wins, the
        // rest are cleared with "non-selected user clearing".
        let mut losers: Vec<u8, { call::MAX_SUBCALLS }> = Vec::new();
        let already_won = self.with_call(cref, |c| {
            if c.tei == TEI_GROUP && c.winner_tei.is_none() {
                c.winner_tei = Some(tei);
                c.tei = tei;
                for sub in c.subcalls.iter() {
                    if sub.tei != tei {
                        let _ = losers.push(sub.tei);
                    }
                }
                false
            } else {
                c.winner_tei.is_some() && c.winner_tei != Some(tei)
            }
        })?;
        if already_won {
            // A losing terminal answered after the race was over
            self.set_call_cause(cref, CAUSE_NONSELECTED_USER_CLEARING);
            self.q931_send_message_to_tei(dev, now, cref, MessageType::Release, Some(tei))?;
            self.with_call(cref, |c| c.cause = None)?;
            return Ok(());
        }
        for loser in losers {
            self.set_call_cause(cref, CAUSE_NONSELECTED_USER_CLEARING);
            self.q931_send_message_to_tei(dev, now, cref, MessageType::Release, Some(loser))?;
        }
        let channel = self.with_call(cref, |c| {
            c.cause = None;
            c.our_state = CallState::Active;
            c.channel.event_channel()
        })?;
        self.push_event(Event::Answer { channel, cref });
        self.q931_send_message(dev, now, cref, MessageType::ConnectAcknowledge)
    }

    fn post_disconnect(
        &mut self,
        dev: &mut impl DchanDevice,
        now: MonoTime,
        cref: u16,
    ) -> PriResult<()> {
        self.stop_call_timer(cref, CallTimer::T303);
        self.stop_call_timer(cref, CallTimer::T310);
        let (channel, cause, alive, inband) = self.with_call(cref, |c| {
            c.our_state = CallState::DisconnectIndication;
            (
                c.channel.event_channel(),
                c.event_cause(),
                c.alive,
                c.progress
                    .map(|p| p.description == progress::INBAND_AVAILABLE)
                    .unwrap_or(false),
            )
        })?;
        if inband && alive {
            // In-band announcement available: leave the release to the
            // application so it can consume the audio first.
            self.push_event(Event::HangupReq { channel, cref, cause });
            return Ok(());
        }
        if alive {
            self.push_event(Event::Hangup { channel, cref, cause });
        }
        self.with_call(cref, |c| {
            c.alive = false;
            c.cause = None;
            c.our_state = CallState::ReleaseRequest;
        })?;
        self.q931_send_message(dev, now, cref, MessageType::Release)?;
        self.start_call_timer(now, cref, CallTimer::T308);
        Ok(())
    }

    fn post_restart(
        &mut self,
        dev: &mut impl DchanDevice,
        now: MonoTime,
        cref: u16,
    ) -> PriResult<()> {
        let (class, channel, ds1) = self.with_call(cref, |c| {
            (
                c.restart_class.unwrap_or(restart::INDICATED_CHANNEL),
                c.channel.channel,
                c.channel.ds1,
            )
        })?;

        // Clear affected live calls locally; the peer has already forgotten
        // them.
        let doomed: Vec<u16, MAX_CALLS> = self
            .calls
            .iter()
            .filter(|c| {
                c.cref != cref
                    && c.alive
                    && match class {
                        restart::INDICATED_CHANNEL => {
                            c.channel.channel == channel && c.channel.ds1 == ds1
                        }
                        _ => true,
                    }
            })
            .map(|c| c.cref)
            .collect();
        for cr in doomed {
            log::debug!("clearing call {cr:04x} for restart");
            self.destroy_call(cr);
        }

        self.q931_send_message(dev, now, cref, MessageType::RestartAcknowledge)?;
        let event_channel = match class {
            restart::INDICATED_CHANNEL => channel.map(|c| c as i32).unwrap_or(-1),
            _ => -1,
        };
        self.push_event(Event::Restart { channel: event_channel });
        self.destroy_call(cref);
        Ok(())
    }

    fn post_status(&mut self, cref: u16) -> PriResult<()> {
        let (channel, cause, peer, ours) = self.with_call(cref, |c| {
            (c.channel.event_channel(), c.cause, c.peer_state, c.our_state)
        })?;
        if cause.map(|c| c.value) == Some(CAUSE_INTERWORKING) {
            return Ok(());
        }
        if peer == Some(CallState::Null) && ours != CallState::Null {
            // The peer has no such call; recover by clearing ours
            let value = cause.map(|c| c.value).unwrap_or(CAUSE_WRONG_CALL_STATE);
            self.stop_all_call_timers(cref);
            self.push_event(Event::Hangup { channel, cref, cause: value });
            self.destroy_call(cref);
        } else if self.cfg.debug.contains(DebugFlags::Q931_STATE) {
            log::debug!(
                "unsolicited STATUS: peer state {peer:?}, cause {:?}",
                cause.map(|c| c.value)
            );
        }
        Ok(())
    }

    // --- composition -----------------------------------------------------

    fn q931_send_message(
        &mut self,
        dev: &mut impl DchanDevice,
        now: MonoTime,
        cref: u16,
        msg: MessageType,
    ) -> PriResult<()> {
        self.q931_send_message_to_tei(dev, now, cref, msg, None)
    }

    fn q931_send_message_to_tei(
        &mut self,
        dev: &mut impl DchanDevice,
        now: MonoTime,
        cref: u16,
        msg: MessageType,
        tei_override: Option<u8>,
    ) -> PriResult<()> {
        let mut buf = [0u8; MSG_BUF];
        let mut pos = codec::encode_header(&mut buf, cref, msg as u8)?;

        {
            let call = self.calls.get(cref).ok_or(PriError::NoSuchCall)?;
            for &id in messages::outbound_ies(msg) {
                let Some(handler) = ie::handler_for(id) else {
                    continue;
                };
                let Some(transmit) = handler.transmit else {
                    log::error!("no transmitter for IE {}", handler.name);
                    return Err(PriError::InvalidParameter);
                };
                let mut tmp = [0u8; IE_BUF];
                let n = transmit(&self.cfg, call, msg, &mut tmp)?;
                if n == 0 {
                    continue;
                }
                if ie_ids::is_single_octet(id) {
                    pos = codec::put_ie(&mut buf, pos, id, &[])?;
                } else {
                    pos = codec::put_ie(&mut buf, pos, id, &tmp[..n])?;
                }
            }
        }

        let tei = {
            let call = self.calls.get_mut(cref).ok_or(PriError::NoSuchCall)?;
            let mut i = 0;
            while i < call.apdus.len() {
                if call.apdus[i].msgtype == msg {
                    let apdu = call.apdus.remove(i);
                    pos = codec::put_ie(&mut buf, pos, ie_ids::FACILITY, &apdu.data)?;
                } else {
                    i += 1;
                }
            }
            tei_override.unwrap_or(call.tei)
        };

        if self.cfg.debug.contains(DebugFlags::Q931_DUMP) {
            log::debug!("> {} cref {:04x} tei {}", msg.name(), cref, tei);
        }
        if tei == TEI_GROUP && self.cfg.bri_nt_ptmp() {
            self.q921_transmit_uiframe(dev, tei, &buf[..pos])
        } else {
            self.q921_transmit_iframe(dev, now, tei, &buf[..pos])
        }
    }

    /// Send a STATUS with the given cause on a call reference, leaving no
    /// stray record behind if one had to be conjured up for the reply.
    fn q931_status(
        &mut self,
        dev: &mut impl DchanDevice,
        now: MonoTime,
        cref: u16,
        tei: u8,
        cause: u8,
    ) -> PriResult<()> {
        let fresh = !self.calls.contains(cref);
        self.calls.get_or_create(cref, tei)?;
        self.set_call_cause(cref, cause);
        self.q931_send_message(dev, now, cref, MessageType::Status)?;
        if fresh {
            self.destroy_call(cref);
        } else {
            self.with_call(cref, |c| c.cause = None)?;
        }
        Ok(())
    }

    // --- application-facing primitives -----------------------------------

    /// Allocate a call record for an outgoing call, returning its reference.
    pub fn new_call(&mut self) -> PriResult<u16> {
        let cref = self.new_call_ref()?;
        let tei = if self.cfg.bri_nt_ptmp() { TEI_GROUP } else { self.links[0].tei };
        self.calls.get_or_create(cref, tei)?;
        Ok(cref)
    }

    /// Place the outgoing call: compose and send the SETUP, arm T303.
    pub fn setup(
        &mut self,
        dev: &mut impl DchanDevice,
        now: MonoTime,
        cref: u16,
        params: &SetupParams<'_>,
    ) -> PriResult<()> {
        if params.channel == 0 || params.called.is_empty() {
            return Err(PriError::InvalidParameter);
        }
        let switch = self.cfg.switch;
        self.with_call(cref, |c| {
            c.bearer = Some(Bearer {
                transfer_cap: params.transfer_cap,
                mode_rate: transfer_mode::CIRCUIT_64,
                multiplier: None,
                userl1: Some(params.userl1.unwrap_or(layer1::ULAW)),
                rate_adaption: None,
                userl2: None,
                userl3: None,
            });
            c.channel = ChannelId {
                channel: Some(params.channel),
                slotmap: None,
                ds1: None,
                pref: if params.exclusive { ChanPref::Exclusive } else { ChanPref::Preferred },
            };
            c.non_isdn = params.non_isdn;
            if let Some(caller) = params.caller {
                let mut pres = params.caller_pres;
                if switch.restricts_presentation() && pres & 0x7c == 0 {
                    // These switches only accept network-provided numbers
                    pres = presentation::ALLOWED_NETWORK_NUMBER;
                }
                let mut calling = CallingParty {
                    number: Default::default(),
                    plan: params.caller_plan,
                    presentation: pres,
                };
                let _ = calling.number.push_str(caller);
                c.calling = Some(calling);
            } else {
                c.calling = Some(CallingParty {
                    number: Default::default(),
                    plan: plan::UNKNOWN,
                    presentation: presentation::NUMBER_NOT_AVAILABLE,
                });
            }
            let mut called = CalledParty { number: Default::default(), plan: params.called_plan };
            let _ = called.number.push_str(params.called);
            c.called = Some(called);
            c.progress = if params.non_isdn && switch == SwitchVariant::Ni2 {
                Some(prilink_types::call::Progress {
                    coding: CODE_CCITT,
                    location: LOC_PRIV_NET_LOCAL_USER,
                    description: progress::CALLER_NOT_ISDN,
                })
            } else {
                None
            };
        })?;
        self.q931_send_message(dev, now, cref, MessageType::Setup)?;
        self.with_call(cref, |c| {
            c.alive = true;
            c.t303_count = 0;
            c.our_state = CallState::CallInitiated;
        })?;
        self.start_call_timer(now, cref, CallTimer::T303);
        Ok(())
    }

    /// Acknowledge an incoming call with CALL PROCEEDING.
    pub fn proceeding(
        &mut self,
        dev: &mut impl DchanDevice,
        now: MonoTime,
        cref: u16,
        channel: Option<u8>,
    ) -> PriResult<()> {
        self.with_call(cref, |c| {
            if let Some(ch) = channel {
                c.channel.channel = Some(ch);
            }
            c.channel.pref = ChanPref::Exclusive;
            c.proceeding_sent = true;
            c.our_state = CallState::IncomingCallProceeding;
        })?;
        self.q931_send_message(dev, now, cref, MessageType::CallProceeding)
    }

    /// Report that the called user is being alerted.
    pub fn alerting(
        &mut self,
        dev: &mut impl DchanDevice,
        now: MonoTime,
        cref: u16,
        channel: Option<u8>,
        inband_info: bool,
    ) -> PriResult<()> {
        if !self.with_call(cref, |c| c.proceeding_sent)? {
            self.proceeding(dev, now, cref, channel)?;
        }
        self.with_call(cref, |c| {
            if let Some(ch) = channel {
                c.channel.channel = Some(ch);
            }
            c.channel.pref = ChanPref::Exclusive;
            c.progress = if inband_info {
                Some(prilink_types::call::Progress {
                    coding: CODE_CCITT,
                    location: LOC_PRIV_NET_LOCAL_USER,
                    description: progress::INBAND_AVAILABLE,
                })
            } else {
                None
            };
            c.our_state = CallState::CallReceived;
        })?;
        self.q931_send_message(dev, now, cref, MessageType::Alerting)
    }

    /// Answer an incoming call.
    pub fn answer(
        &mut self,
        dev: &mut impl DchanDevice,
        now: MonoTime,
        cref: u16,
        channel: Option<u8>,
        non_isdn: bool,
    ) -> PriResult<()> {
        let switch = self.cfg.switch;
        self.with_call(cref, |c| {
            if let Some(ch) = channel {
                c.channel.channel = Some(ch);
            }
            c.channel.pref = ChanPref::Exclusive;
            // The DMS-100 rejects a progress indicator on CONNECT
            c.progress = if non_isdn && switch != SwitchVariant::Dms100 {
                Some(prilink_types::call::Progress {
                    coding: CODE_CCITT,
                    location: LOC_PRIV_NET_LOCAL_USER,
                    description: progress::CALLED_NOT_ISDN,
                })
            } else {
                None
            };
            c.non_isdn = non_isdn;
            c.alive = true;
            c.our_state = CallState::ConnectRequest;
        })?;
        self.q931_send_message(dev, now, cref, MessageType::Connect)
    }

    /// Send overlap dialling digits in an INFORMATION message.
    pub fn information(
        &mut self,
        dev: &mut impl DchanDevice,
        now: MonoTime,
        cref: u16,
        digits: &str,
    ) -> PriResult<()> {
        self.with_call(cref, |c| {
            c.pending_digits.clear();
            c.keypad_digits.clear();
            let _ = c.pending_digits.push_str(digits);
        })?;
        self.q931_send_message(dev, now, cref, MessageType::Information)?;
        self.with_call(cref, |c| c.pending_digits.clear())
    }

    /// Send keypad information in an INFORMATION message.
    pub fn keypad(
        &mut self,
        dev: &mut impl DchanDevice,
        now: MonoTime,
        cref: u16,
        digits: &str,
    ) -> PriResult<()> {
        self.with_call(cref, |c| {
            c.pending_digits.clear();
            c.keypad_digits.clear();
            let _ = c.keypad_digits.push_str(digits);
        })?;
        self.q931_send_message(dev, now, cref, MessageType::Information)?;
        self.with_call(cref, |c| c.keypad_digits.clear())
    }

    /// Queue a facility APDU to ride on the next message of `msgtype`.
    pub fn facility_enqueue(
        &mut self,
        cref: u16,
        msgtype: MessageType,
        apdu: &[u8],
    ) -> PriResult<()> {
        let call = self.calls.get_mut(cref).ok_or(PriError::NoSuchCall)?;
        let mut data = Vec::new();
        data.extend_from_slice(apdu).map_err(|_| PriError::BufferFull)?;
        call.apdus
            .push(Apdu { msgtype, data })
            .map_err(|_| PriError::QueueFull)
    }

    /// Clear a call: DISCONNECT while it is alive, RELEASE when the peer has
    /// already disconnected, RELEASE COMPLETE in the setup phase.
    pub fn hangup(
        &mut self,
        dev: &mut impl DchanDevice,
        now: MonoTime,
        cref: u16,
        cause: u8,
    ) -> PriResult<()> {
        let state = self.with_call(cref, |c| c.our_state)?;
        match state {
            CallState::Null => Err(PriError::InvalidState),
            CallState::CallPresent | CallState::CallInitiated => {
                self.set_call_cause(cref, cause);
                self.with_call(cref, |c| c.alive = false)?;
                self.q931_send_message(dev, now, cref, MessageType::ReleaseComplete)?;
                self.destroy_call(cref);
                Ok(())
            }
            CallState::DisconnectIndication => {
                self.set_call_cause(cref, cause);
                self.with_call(cref, |c| {
                    c.alive = false;
                    c.send_hangup_ack = true;
                    c.our_state = CallState::ReleaseRequest;
                })?;
                self.q931_send_message(dev, now, cref, MessageType::Release)?;
                self.start_call_timer(now, cref, CallTimer::T308);
                Ok(())
            }
            CallState::ReleaseRequest => Ok(()),
            _ => {
                self.set_call_cause(cref, cause);
                self.with_call(cref, |c| {
                    c.alive = false;
                    c.send_hangup_ack = true;
                    c.our_state = CallState::DisconnectRequest;
                })?;
                self.q931_send_message(dev, now, cref, MessageType::Disconnect)?;
                self.start_call_timer(now, cref, CallTimer::T305);
                Ok(())
            }
        }
    }

    /// Restart one B channel (`channel >= 0`) or the whole interface
    /// (`channel < 0`) and await the acknowledgement.
    pub fn reset(
        &mut self,
        dev: &mut impl DchanDevice,
        now: MonoTime,
        channel: i32,
    ) -> PriResult<()> {
        let tei = if self.cfg.bri_nt_ptmp() { TEI_GROUP } else { self.links[0].tei };
        let cref = DUMMY_CALL_REFERENCE;
        self.calls.get_or_create(cref, tei)?;
        self.with_call(cref, |c| {
            if channel >= 0 {
                c.restart_class = Some(restart::INDICATED_CHANNEL);
                c.channel = ChannelId {
                    channel: Some(channel as u8),
                    slotmap: None,
                    ds1: None,
                    pref: ChanPref::Exclusive,
                };
            } else {
                c.restart_class = Some(restart::ALL_DS1);
                c.channel = ChannelId::default();
            }
            c.t316_count = 0;
            c.our_state = CallState::RestartRequest;
        })?;
        self.q931_send_message(dev, now, cref, MessageType::Restart)?;
        self.start_call_timer(now, cref, CallTimer::T316);
        Ok(())
    }

    // --- timers ----------------------------------------------------------

    pub(crate) fn q931_call_timer_expire(
        &mut self,
        dev: &mut impl DchanDevice,
        now: MonoTime,
        cref: u16,
        timer: CallTimer,
    ) -> PriResult<()> {
        if !self.calls.contains(cref) {
            return Ok(());
        }
        match timer {
            CallTimer::T303 => {
                let count = self.with_call(cref, |c| {
                    c.t303_count += 1;
                    c.t303_count
                })?;
                if count < 2 {
                    // One SETUP retransmission before giving up
                    self.q931_send_message(dev, now, cref, MessageType::Setup)?;
                    self.start_call_timer(now, cref, CallTimer::T303);
                } else {
                    let channel = self.with_call(cref, |c| c.channel.event_channel())?;
                    self.push_event(Event::Hangup {
                        channel,
                        cref,
                        cause: CAUSE_RECOVERY_ON_TIMER_EXPIRE,
                    });
                    self.destroy_call(cref);
                }
            }
            CallTimer::T305 => {
                self.set_call_cause(cref, CAUSE_RECOVERY_ON_TIMER_EXPIRE);
                self.with_call(cref, |c| c.our_state = CallState::ReleaseRequest)?;
                self.q931_send_message(dev, now, cref, MessageType::Release)?;
                self.start_call_timer(now, cref, CallTimer::T308);
            }
            CallTimer::T308 => {
                let count = self.with_call(cref, |c| {
                    c.t308_count += 1;
                    c.t308_count
                })?;
                if count < 2 {
                    self.q931_send_message(dev, now, cref, MessageType::Release)?;
                    self.start_call_timer(now, cref, CallTimer::T308);
                } else {
                    log::warn!("no RELEASE COMPLETE for call {cref:04x}, freeing it");
                    let channel = self.with_call(cref, |c| c.channel.event_channel())?;
                    self.push_event(Event::HangupAck { channel, cref });
                    self.destroy_call(cref);
                }
            }
            CallTimer::T310 => {
                let channel = self.with_call(cref, |c| c.channel.event_channel())?;
                self.push_event(Event::Hangup {
                    channel,
                    cref,
                    cause: CAUSE_RECOVERY_ON_TIMER_EXPIRE,
                });
                self.set_call_cause(cref, CAUSE_RECOVERY_ON_TIMER_EXPIRE);
                self.with_call(cref, |c| {
                    c.alive = false;
                    c.send_hangup_ack = true;
                    c.our_state = CallState::DisconnectRequest;
                })?;
                self.q931_send_message(dev, now, cref, MessageType::Disconnect)?;
                self.start_call_timer(now, cref, CallTimer::T305);
            }
            CallTimer::T316 => {
                let count = self.with_call(cref, |c| {
                    c.t316_count += 1;
                    c.t316_count
                })?;
                let n316 = self.cfg.timer(TimerIdx::N316) as u8;
                if count < n316 {
                    self.q931_send_message(dev, now, cref, MessageType::Restart)?;
                    self.start_call_timer(now, cref, CallTimer::T316);
                } else {
                    log::error!("RESTART never acknowledged");
                    self.push_event(Event::ConfigError {
                        message: "restart not acknowledged by peer",
                    });
                    self.destroy_call(cref);
                }
            }
        }
        Ok(())
    }

    fn start_call_timer(&mut self, now: MonoTime, cref: u16, timer: CallTimer) {
        let idx = match timer {
            CallTimer::T303 => TimerIdx::T303,
            CallTimer::T305 => TimerIdx::T305,
            CallTimer::T308 => TimerIdx::T308,
            CallTimer::T310 => TimerIdx::T310,
            CallTimer::T316 => TimerIdx::T316,
        };
        let ms = self.cfg.timer(idx);
        self.stop_call_timer(cref, timer);
        let id = self.sched.schedule(now, ms, TimerEvent::Q931 { cref, timer });
        if let Some(call) = self.calls.get_mut(cref) {
            match timer {
                CallTimer::T303 => call.t303 = id,
                CallTimer::T305 => call.t305 = id,
                CallTimer::T308 => call.t308 = id,
                CallTimer::T310 => call.t310 = id,
                CallTimer::T316 => call.t316 = id,
            }
        }
    }

    pub(crate) fn stop_call_timer(&mut self, cref: u16, timer: CallTimer) {
        let Some(call) = self.calls.get_mut(cref) else {
            return;
        };
        let slot = match timer {
            CallTimer::T303 => &mut call.t303,
            CallTimer::T305 => &mut call.t305,
            CallTimer::T308 => &mut call.t308,
            CallTimer::T310 => &mut call.t310,
            CallTimer::T316 => &mut call.t316,
        };
        let id = core::mem::take(slot);
        self.sched.cancel(id);
    }

    /// Forget a fired timer's id without touching the (already freed) slot.
    pub(crate) fn clear_fired_call_timer(&mut self, cref: u16, timer: CallTimer) {
        if let Some(call) = self.calls.get_mut(cref) {
            match timer {
                CallTimer::T303 => call.t303 = 0,
                CallTimer::T305 => call.t305 = 0,
                CallTimer::T308 => call.t308 = 0,
                CallTimer::T310 => call.t310 = 0,
                CallTimer::T316 => call.t316 = 0,
            }
        }
    }

    fn stop_all_call_timers(&mut self, cref: u16) {
        for timer in [
            CallTimer::T303,
            CallTimer::T305,
            CallTimer::T308,
            CallTimer::T310,
            CallTimer::T316,
        ] {
            self.stop_call_timer(cref, timer);
        }
    }

    /// Cancel a call's timers, drain its APDU queue, and drop the record.
    /// Safe to call for a reference that is already gone.
    pub fn destroy_call(&mut self, cref: u16) {
        self.stop_all_call_timers(cref);
        if self.calls.remove(cref).is_none() {
            log::debug!("asked to destroy unknown call {cref:04x}");
        } else if self.cfg.debug.contains(DebugFlags::Q931_STATE) {
            log::debug!("destroyed call {cref:04x}");
        }
    }

    // --- helpers ---------------------------------------------------------

    /// Run a closure against a call record, or fail with `NoSuchCall`.
    fn with_call<R>(&mut self, cref: u16, f: impl FnOnce(&mut call::Call) -> R) -> PriResult<R> {
        let call = self.calls.get_mut(cref).ok_or(PriError::NoSuchCall)?;
        Ok(f(call))
    }

    fn set_call_cause(&mut self, cref: u16, value: u8) {
        if let Some(call) = self.calls.get_mut(cref) {
            call.cause = Some(CauseInfo {
                coding: CODE_CCITT,
                location: LOC_PRIV_NET_LOCAL_USER,
                value,
            });
        }
    }

    /// Allocate a fresh call reference: a monotonic 15-bit counter with the
    /// originator flag, skipping values still held by live calls.
    fn new_call_ref(&mut self) -> PriResult<u16> {
        for _ in 0..0x7fff {
            self.cref_counter += 1;
            if self.cref_counter > 0x7fff {
                self.cref_counter = 1;
            }
            let candidate = self.cref_counter | 0x8000;
            if !self.calls.contains(candidate) {
                return Ok(candidate);
            }
        }
        Err(PriError::BufferFull)
    }
}
