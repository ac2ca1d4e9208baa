//! Q.921 (LAPD) data-link engine.
//!
//! One [`LapdLink`] exists per (SAPI, TEI) pair. The engine implements the
//! ITU-T Q.921 state machine for extended (mod-128) operation: link
//! establishment with SABME/UA, acknowledged I-frame transfer with the
//! V(S)/V(A)/V(R) counters and a k-frame window, REJ-based go-back-N
//! recovery, and the T200/T203 timer pair. TEI assignment for
//! point-to-multipoint spans lives in [`tei`].

pub mod tei;

use heapless::Vec;
use prilink_types::custom::{PriError, PriResult};
use prilink_types::event::Event;
use prilink_types::frame::q921::{
    SAPI_CALL_CTRL, SAPI_MGMT, SFrame, TEI_GROUP, UFrame, seq_inc, seq_sub,
};
use prilink_types::switch::{DebugFlags, NodeType};
use prilink_types::timers::TimerIdx;
use prilink_types::MonoTime;
use prilink_util::frame_format::q921 as codec;
use prilink_util::frame_format::q921::Frame;
use prilink_util::{log_mdl_error, log_state_transition, log_unexpected_event};

use crate::dev::DchanDevice;
use crate::sched::{LinkTimer, TimerEvent, TimerId};
use crate::DchanController;

/// Maximum number of links on one span (master plus assigned TEIs).
pub const MAX_LINKS: usize = 8;
/// Maximum frames held in one retransmit queue.
pub const TXQUEUE_CAP: usize = 32;
/// Largest layer-3 payload carried in one I frame (default N201).
pub const MAX_PAYLOAD: usize = 260;
/// Scratch size for a complete encoded frame.
pub(crate) const FRAME_BUF: usize = MAX_PAYLOAD + codec::HEADER_LEN_IS;

/// Q.921 data-link states (Q.921 Figure B.2 through B.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Q921State {
    /// PTMP terminal without a TEI
    TeiUnassigned,
    /// TEI identity request outstanding
    AssignAwaitingTei,
    /// TEI identity request outstanding with layer-3 data queued
    EstablishAwaitingTei,
    /// TEI valid, multi-frame operation not established
    TeiAssigned,
    /// SABME outstanding
    AwaitingEstablishment,
    /// DISC outstanding
    AwaitingRelease,
    /// Link is up
    MultiFrameEstablished,
    /// Enquiry outstanding after T200 expiry
    TimerRecovery,
}

/// One queued I frame. N(S) is fixed at first transmission; N(R) is stamped
/// from the current V(R) each time the frame goes out.
#[derive(Debug)]
pub(crate) struct TxFrame {
    pub n_s: u8,
    pub transmitted: bool,
    pub payload: Vec<u8, MAX_PAYLOAD>,
}

/// Per-(SAPI, TEI) data-link state.
#[derive(Debug)]
pub(crate) struct LapdLink {
    pub sapi: u8,
    pub tei: u8,
    pub state: Q921State,
    /// Next send sequence number
    pub v_s: u8,
    /// Oldest unacknowledged sequence number
    pub v_a: u8,
    /// Next expected receive sequence number
    pub v_r: u8,
    /// Retransmission counter
    pub rc: u8,
    pub peer_rx_busy: bool,
    pub own_rx_busy: bool,
    pub reject_exception: bool,
    pub acknowledge_pending: bool,
    pub l3_initiated: bool,
    pub t200: TimerId,
    pub t202: TimerId,
    pub t203: TimerId,
    pub n202_count: u8,
    /// Reference number of the outstanding TEI identity request
    pub ri: u16,
    pub txqueue: Vec<TxFrame, TXQUEUE_CAP>,
}

impl LapdLink {
    pub(crate) fn new(sapi: u8, tei: u8) -> Self {
        LapdLink {
            sapi,
            tei,
            state: Q921State::TeiAssigned,
            v_s: 0,
            v_a: 0,
            v_r: 0,
            rc: 0,
            peer_rx_busy: false,
            own_rx_busy: false,
            reject_exception: false,
            acknowledge_pending: false,
            l3_initiated: false,
            t200: 0,
            t202: 0,
            t203: 0,
            n202_count: 0,
            ri: 0,
            txqueue: Vec::new(),
        }
    }

    /// N(R) is valid when it falls in [V(A), V(S)] mod 128.
    fn n_r_is_valid(&self, n_r: u8) -> bool {
        let mut x = self.v_a;
        while x != self.v_s && x != n_r {
            x = seq_inc(x);
        }
        x == n_r
    }
}

impl DchanController {
    /// Start layer 2 on the span (Q.921 §5.1).
    pub(crate) fn q921_start(
        &mut self,
        dev: &mut impl DchanDevice,
        now: MonoTime,
    ) -> PriResult<()> {
        if self.cfg.bri_te_ptmp() {
            self.q921_setstate(0, Q921State::AssignAwaitingTei);
            self.tei_request(dev, now, 0)
        } else if self.cfg.bri_nt_ptmp() {
            self.q921_setstate(0, Q921State::TeiUnassigned);
            // The network side has no link to bring up until a terminal
            // requests a TEI, but the D channel itself is usable now.
            self.sched.schedule(now, 0, TimerEvent::NtDchanUp);
            Ok(())
        } else {
            self.q921_establish_data_link(dev, now, 0);
            self.links[0].l3_initiated = true;
            self.q921_setstate(0, Q921State::AwaitingEstablishment);
            Ok(())
        }
    }

    /// Feed one FCS-stripped frame from the device into the engine.
    pub(crate) fn q921_receive(
        &mut self,
        dev: &mut impl DchanDevice,
        now: MonoTime,
        raw: &[u8],
    ) -> PriResult<()> {
        let frame = codec::decode(raw)?;
        let (sapi, tei) = frame.address();

        if self.cfg.debug.contains(DebugFlags::Q921_DUMP) {
            log::debug!("< q921 frame sapi/tei {sapi}/{tei}: {frame:?}");
        }

        if sapi == SAPI_MGMT {
            if let Frame::U { kind: UFrame::Ui, payload, .. } = frame {
                return self.tei_receive_mdl(dev, now, payload);
            }
            log::warn!("non-UI frame on the management SAPI");
            return Ok(());
        }
        if sapi != SAPI_CALL_CTRL {
            log::warn!("frame with unhandled SAPI {sapi} discarded");
            return Ok(());
        }

        let idx = match self.link_idx_by_tei(tei) {
            Some(idx) => idx,
            None if self.cfg.bri_te_ptmp() && tei == TEI_GROUP => 0,
            None => {
                // NT-PTMP: an unrecognized TEI gets removed so the terminal
                // re-requests one (Q.921 §5.3.2 corrective action).
                if self.cfg.bri_nt_ptmp() {
                    self.tei_remove_unknown(dev, tei)?;
                }
                return Ok(());
            }
        };

        self.q921_receive_qualified(dev, now, idx, &frame)?;
        self.q921_statemachine_check(dev, now, idx);
        Ok(())
    }

    fn q921_receive_qualified(
        &mut self,
        dev: &mut impl DchanDevice,
        now: MonoTime,
        idx: usize,
        frame: &Frame<'_>,
    ) -> PriResult<()> {
        match *frame {
            Frame::I { n_s, n_r, p_f, payload, .. } => {
                self.q921_iframe_rx(dev, now, idx, n_s, n_r, p_f, payload)
            }
            Frame::S { kind: SFrame::Rr, n_r, p_f, c_r, .. } => {
                self.q921_rr_rx(dev, now, idx, n_r, p_f, c_r)
            }
            Frame::S { kind: SFrame::Rej, n_r, p_f, c_r, .. } => {
                self.q921_rej_rx(dev, now, idx, n_r, p_f, c_r)
            }
            Frame::S { kind: SFrame::Rnr, n_r, p_f, c_r, .. } => {
                self.q921_rnr_rx(dev, now, idx, n_r, p_f, c_r)
            }
            Frame::U { kind: UFrame::Sabme, p_f, .. } => self.q921_sabme_rx(dev, now, idx, p_f),
            Frame::U { kind: UFrame::Ua, p_f, .. } => self.q921_ua_rx(dev, now, idx, p_f),
            Frame::U { kind: UFrame::Disc, p_f, .. } => self.q921_disc_rx(dev, now, idx, p_f),
            Frame::U { kind: UFrame::Dm, p_f, .. } => self.q921_dm_rx(dev, now, idx, p_f),
            Frame::U { kind: UFrame::Ui, payload, tei, .. } => {
                // Broadcast layer-3 traffic (PTMP SETUP fan-out)
                self.q931_receive(dev, now, tei, payload)
            }
            Frame::U { kind, .. } => {
                log::warn!("unsupported U frame {kind:?} discarded");
                Ok(())
            }
        }
    }

    /// After every inbound frame: push out anything the window now allows
    /// and answer any deferred acknowledgement (Q.921 Figure B.7).
    fn q921_statemachine_check(
        &mut self,
        dev: &mut impl DchanDevice,
        now: MonoTime,
        idx: usize,
    ) {
        if self.links[idx].state == Q921State::MultiFrameEstablished {
            let _ = self.q921_send_queued_iframes(dev, now, idx);
            if self.links[idx].acknowledge_pending {
                self.links[idx].acknowledge_pending = false;
                self.q921_rr(dev, idx, false, false);
            }
        }
    }

    // --- DL-DATA request path -------------------------------------------

    /// Queue a layer-3 message for acknowledged transfer (DL-DATA request,
    /// the I-frame-queued-up path of Q.921 Figure B.7).
    pub(crate) fn q921_transmit_iframe(
        &mut self,
        dev: &mut impl DchanDevice,
        now: MonoTime,
        tei: u8,
        payload: &[u8],
    ) -> PriResult<()> {
        let idx = if self.cfg.bri_nt_ptmp() {
            if tei == TEI_GROUP {
                log::error!("cannot send an I frame on the group TEI");
                return Err(PriError::InvalidParameter);
            }
            self.link_idx_by_tei(tei).ok_or(PriError::NoSuchCall)?
        } else if self.cfg.bri_te_ptmp() {
            if self.links[0].state == Q921State::TeiUnassigned {
                self.tei_request(dev, now, 0)?;
                self.q921_setstate(0, Q921State::EstablishAwaitingTei);
            }
            0
        } else {
            0
        };

        match self.links[idx].state {
            Q921State::TeiAssigned => {
                self.q921_establish_data_link(dev, now, idx);
                self.links[idx].l3_initiated = true;
                self.q921_setstate(idx, Q921State::AwaitingEstablishment);
            }
            Q921State::TeiUnassigned
            | Q921State::EstablishAwaitingTei
            | Q921State::AssignAwaitingTei
            | Q921State::TimerRecovery
            | Q921State::AwaitingEstablishment
            | Q921State::MultiFrameEstablished => {}
            state => {
                log::error!("cannot queue I frame in state {state:?}");
                return Err(PriError::InvalidState);
            }
        }

        let link = &mut self.links[idx];
        let mut copy = Vec::new();
        copy.extend_from_slice(payload).map_err(|_| PriError::BufferFull)?;
        link.txqueue
            .push(TxFrame { n_s: 0, transmitted: false, payload: copy })
            .map_err(|_| PriError::QueueFull)?;

        if self.links[idx].state == Q921State::MultiFrameEstablished {
            self.q921_send_queued_iframes(dev, now, idx)?;
        }
        Ok(())
    }

    /// Send a DL-UNIT-DATA request as a UI frame.
    pub(crate) fn q921_transmit_uiframe(
        &mut self,
        dev: &mut impl DchanDevice,
        tei: u8,
        payload: &[u8],
    ) -> PriResult<()> {
        let mut buf = [0u8; FRAME_BUF];
        let cr = self.cmd_bit(true);
        let len = codec::encode_u(&mut buf, SAPI_CALL_CTRL, tei, cr, UFrame::Ui, false, payload)?;
        dev.write(&buf[..len])?;
        Ok(())
    }

    /// Transmit every untransmitted queued frame the window allows.
    fn q921_send_queued_iframes(
        &mut self,
        dev: &mut impl DchanDevice,
        now: MonoTime,
        idx: usize,
    ) -> PriResult<usize> {
        let k = self.cfg.timer(TimerIdx::K) as u8;
        let cr = self.cmd_bit(true);
        let mut frames_txd = 0usize;

        loop {
            let link = &mut self.links[idx];
            if link.peer_rx_busy || seq_sub(link.v_s, link.v_a) >= k {
                if frames_txd == 0 && self.cfg.debug.contains(DebugFlags::Q921_DUMP) {
                    log::debug!("window shut or peer busy, leaving I frames queued");
                }
                break;
            }
            let Some(f) = link.txqueue.iter_mut().find(|f| !f.transmitted) else {
                break;
            };
            f.transmitted = true;
            f.n_s = link.v_s;
            let (sapi, tei, n_s, n_r) = (link.sapi, link.tei, link.v_s, link.v_r);
            let mut buf = [0u8; FRAME_BUF];
            let len = codec::encode_i(&mut buf, sapi, tei, cr, n_s, n_r, false, &f.payload)?;
            link.v_s = seq_inc(link.v_s);
            link.acknowledge_pending = false;
            dev.write(&buf[..len])?;
            frames_txd += 1;
        }

        if frames_txd > 0 && self.links[idx].t200 == 0 {
            self.stop_t203(idx);
            self.start_t200(now, idx);
        }
        Ok(frames_txd)
    }

    // --- inbound frame handlers -----------------------------------------

    fn q921_iframe_rx(
        &mut self,
        dev: &mut impl DchanDevice,
        now: MonoTime,
        idx: usize,
        n_s: u8,
        n_r: u8,
        p_f: bool,
        payload: &[u8],
    ) -> PriResult<()> {
        match self.links[idx].state {
            Q921State::MultiFrameEstablished | Q921State::TimerRecovery => {}
            state => {
                log_unexpected_event!(module_path!(), "I frame", state);
                return Ok(());
            }
        }

        let mut deliver = false;
        {
            let link = &mut self.links[idx];
            if n_s == link.v_r {
                link.v_r = seq_inc(link.v_r);
                link.reject_exception = false;
                deliver = true;
                if p_f {
                    link.acknowledge_pending = false;
                } else {
                    link.acknowledge_pending = true;
                }
            }
        }
        if deliver {
            if p_f {
                self.q921_rr(dev, idx, true, false);
            }
        } else {
            // Out-of-sequence: one REJ per gap (Q.921 §5.8.4)
            if self.links[idx].reject_exception {
                if p_f {
                    self.q921_rr(dev, idx, true, false);
                    self.links[idx].acknowledge_pending = false;
                }
            } else {
                self.links[idx].reject_exception = true;
                self.q921_reject(dev, idx, p_f);
                self.links[idx].acknowledge_pending = false;
            }
        }

        if !self.links[idx].n_r_is_valid(n_r) {
            self.n_r_error_recovery(dev, now, idx);
            self.q921_setstate(idx, Q921State::AwaitingEstablishment);
        } else if self.links[idx].state == Q921State::TimerRecovery {
            self.update_v_a(idx, n_r);
        } else if self.links[idx].peer_rx_busy {
            self.update_v_a(idx, n_r);
        } else if n_r == self.links[idx].v_s {
            self.update_v_a(idx, n_r);
            self.stop_t200(idx);
            self.start_t203(now, idx);
        } else if n_r != self.links[idx].v_a {
            self.update_v_a(idx, n_r);
            self.restart_t200(now, idx);
        }

        if deliver {
            let tei = self.links[idx].tei;
            // In-sequence payload goes up to Q.931; borrow it out of the
            // receive buffer, not the link.
            self.q931_receive(dev, now, tei, payload)?;
        }
        Ok(())
    }

    /// RR/REJ handling common to the TIMER_RECOVERY state
    /// (Q.921 Figure B.7 page 74).
    fn timer_recovery_rr_rej_rx(
        &mut self,
        dev: &mut impl DchanDevice,
        now: MonoTime,
        idx: usize,
        n_r: u8,
        p_f: bool,
        c_r: bool,
    ) -> PriResult<()> {
        self.links[idx].peer_rx_busy = false;
        if self.is_command(c_r) {
            if p_f {
                self.q921_enquiry_response(dev, idx);
            }
            if self.links[idx].n_r_is_valid(n_r) {
                self.update_v_a(idx, n_r);
            } else {
                self.n_r_error_recovery(dev, now, idx);
                self.q921_setstate(idx, Q921State::AwaitingEstablishment);
            }
        } else if !p_f {
            if self.links[idx].n_r_is_valid(n_r) {
                self.update_v_a(idx, n_r);
            } else {
                self.n_r_error_recovery(dev, now, idx);
                self.q921_setstate(idx, Q921State::AwaitingEstablishment);
            }
        } else if self.links[idx].n_r_is_valid(n_r) {
            self.update_v_a(idx, n_r);
            self.stop_t200(idx);
            self.start_t203(now, idx);
            self.q921_invoke_retransmission(dev, idx, n_r)?;
            self.q921_setstate(idx, Q921State::MultiFrameEstablished);
        } else {
            self.n_r_error_recovery(dev, now, idx);
            self.q921_setstate(idx, Q921State::AwaitingEstablishment);
        }
        Ok(())
    }

    fn q921_rr_rx(
        &mut self,
        dev: &mut impl DchanDevice,
        now: MonoTime,
        idx: usize,
        n_r: u8,
        p_f: bool,
        c_r: bool,
    ) -> PriResult<()> {
        match self.links[idx].state {
            Q921State::TimerRecovery => {
                return self.timer_recovery_rr_rej_rx(dev, now, idx, n_r, p_f, c_r);
            }
            Q921State::MultiFrameEstablished => {}
            state => {
                log_unexpected_event!(module_path!(), "RR", state);
                return Ok(());
            }
        }

        self.links[idx].peer_rx_busy = false;
        if self.is_command(c_r) {
            if p_f {
                self.q921_enquiry_response(dev, idx);
            }
        } else if p_f {
            log_mdl_error!('A', "RR response with F=1 in multi-frame established");
        }

        if !self.links[idx].n_r_is_valid(n_r) {
            self.n_r_error_recovery(dev, now, idx);
            self.q921_setstate(idx, Q921State::AwaitingEstablishment);
        } else if n_r == self.links[idx].v_s {
            self.update_v_a(idx, n_r);
            self.stop_t200(idx);
            self.start_t203(now, idx);
        } else if n_r != self.links[idx].v_a {
            self.update_v_a(idx, n_r);
            self.restart_t200(now, idx);
        }
        Ok(())
    }

    fn q921_rej_rx(
        &mut self,
        dev: &mut impl DchanDevice,
        now: MonoTime,
        idx: usize,
        n_r: u8,
        p_f: bool,
        c_r: bool,
    ) -> PriResult<()> {
        if self.cfg.debug.contains(DebugFlags::Q921_STATE) {
            log::debug!("got REJ for frame {n_r} in state {:?}", self.links[idx].state);
        }
        match self.links[idx].state {
            Q921State::TimerRecovery => self.timer_recovery_rr_rej_rx(dev, now, idx, n_r, p_f, c_r),
            Q921State::MultiFrameEstablished => {
                self.links[idx].peer_rx_busy = false;
                if self.is_command(c_r) {
                    if p_f {
                        self.q921_enquiry_response(dev, idx);
                    }
                } else if p_f {
                    log_mdl_error!('A', "REJ response with F=1 in multi-frame established");
                }
                if !self.links[idx].n_r_is_valid(n_r) {
                    self.n_r_error_recovery(dev, now, idx);
                    self.q921_setstate(idx, Q921State::AwaitingEstablishment);
                } else {
                    self.update_v_a(idx, n_r);
                    self.stop_t200(idx);
                    self.start_t203(now, idx);
                    self.q921_invoke_retransmission(dev, idx, n_r)?;
                }
                Ok(())
            }
            state => {
                log_unexpected_event!(module_path!(), "REJ", state);
                Ok(())
            }
        }
    }

    fn q921_rnr_rx(
        &mut self,
        dev: &mut impl DchanDevice,
        now: MonoTime,
        idx: usize,
        n_r: u8,
        p_f: bool,
        c_r: bool,
    ) -> PriResult<()> {
        match self.links[idx].state {
            Q921State::MultiFrameEstablished | Q921State::TimerRecovery => {}
            state => {
                log_unexpected_event!(module_path!(), "RNR", state);
                return Ok(());
            }
        }
        self.links[idx].peer_rx_busy = true;
        if self.is_command(c_r) && p_f {
            self.q921_enquiry_response(dev, idx);
        }
        if !self.links[idx].n_r_is_valid(n_r) {
            self.n_r_error_recovery(dev, now, idx);
            self.q921_setstate(idx, Q921State::AwaitingEstablishment);
        } else {
            self.update_v_a(idx, n_r);
            self.stop_t203(idx);
            self.restart_t200(now, idx);
        }
        Ok(())
    }

    fn q921_sabme_rx(
        &mut self,
        dev: &mut impl DchanDevice,
        now: MonoTime,
        idx: usize,
        p_f: bool,
    ) -> PriResult<()> {
        match self.links[idx].state {
            Q921State::TimerRecovery | Q921State::MultiFrameEstablished => {
                self.q921_send_ua(dev, idx, p_f);
                self.q921_clear_exception_conditions(idx);
                log_mdl_error!('F', "SABME in state {:?}", self.links[idx].state);
                if self.links[idx].v_s != self.links[idx].v_a {
                    self.q921_discard_iqueue(idx);
                    self.push_event(Event::DchanUp);
                }
                self.stop_t200(idx);
                self.start_t203(now, idx);
                let link = &mut self.links[idx];
                link.v_s = 0;
                link.v_a = 0;
                link.v_r = 0;
                self.q921_setstate(idx, Q921State::MultiFrameEstablished);
            }
            Q921State::TeiAssigned => {
                self.q921_send_ua(dev, idx, p_f);
                self.q921_clear_exception_conditions(idx);
                let link = &mut self.links[idx];
                link.v_s = 0;
                link.v_a = 0;
                link.v_r = 0;
                self.push_event(Event::DchanUp);
                self.start_t203(now, idx);
                self.q921_setstate(idx, Q921State::MultiFrameEstablished);
            }
            Q921State::AwaitingEstablishment => {
                self.q921_send_ua(dev, idx, p_f);
            }
            state => {
                log_unexpected_event!(module_path!(), "SABME", state);
            }
        }
        Ok(())
    }

    fn q921_ua_rx(
        &mut self,
        dev: &mut impl DchanDevice,
        now: MonoTime,
        idx: usize,
        p_f: bool,
    ) -> PriResult<()> {
        let _ = dev;
        match self.links[idx].state {
            Q921State::AwaitingEstablishment => {
                if !p_f {
                    log_mdl_error!('D', "UA with F=0 while awaiting establishment");
                    return Ok(());
                }
                {
                    let link = &mut self.links[idx];
                    if !link.l3_initiated {
                        if link.v_s != link.v_a {
                            link.txqueue.clear();
                        }
                    } else {
                        link.l3_initiated = false;
                        link.v_r = 0;
                    }
                    link.v_s = 0;
                    link.v_a = 0;
                }
                self.push_event(Event::DchanUp);
                self.stop_t200(idx);
                self.start_t203(now, idx);
                self.q921_setstate(idx, Q921State::MultiFrameEstablished);
            }
            Q921State::AwaitingRelease => {
                if !p_f {
                    log_mdl_error!('D', "UA with F=0 while awaiting release");
                } else {
                    self.stop_t200(idx);
                    self.q921_setstate(idx, Q921State::TeiAssigned);
                }
            }
            state => {
                log_mdl_error!('C', "unsolicited UA in state {:?}", state);
            }
        }
        Ok(())
    }

    fn q921_disc_rx(
        &mut self,
        dev: &mut impl DchanDevice,
        _now: MonoTime,
        idx: usize,
        p_f: bool,
    ) -> PriResult<()> {
        match self.links[idx].state {
            Q921State::AwaitingRelease => {
                self.q921_send_ua(dev, idx, p_f);
            }
            Q921State::MultiFrameEstablished | Q921State::TimerRecovery => {
                let was_established = self.links[idx].state == Q921State::MultiFrameEstablished;
                self.q921_discard_iqueue(idx);
                self.q921_send_ua(dev, idx, p_f);
                self.stop_t200(idx);
                if was_established {
                    self.stop_t203(idx);
                }
                self.q921_setstate(idx, Q921State::TeiAssigned);
                self.push_event(Event::DchanDown);
            }
            state => {
                log_unexpected_event!(module_path!(), "DISC", state);
            }
        }
        Ok(())
    }

    fn q921_dm_rx(
        &mut self,
        dev: &mut impl DchanDevice,
        now: MonoTime,
        idx: usize,
        p_f: bool,
    ) -> PriResult<()> {
        match self.links[idx].state {
            Q921State::AwaitingEstablishment if p_f => {
                self.q921_discard_iqueue(idx);
                self.stop_t200(idx);
                if self.cfg.ptp() {
                    // Keep trying to come back up on a point-to-point span
                    self.q921_establish_data_link(dev, now, idx);
                } else {
                    self.q921_setstate(idx, Q921State::TeiAssigned);
                }
                self.push_event(Event::DchanDown);
            }
            state => {
                log::debug!("ignoring DM (F={p_f}) in state {state:?}");
            }
        }
        Ok(())
    }

    // --- acknowledgement bookkeeping ------------------------------------

    /// Remove the acknowledged frame with N(S) == `num` from the queue.
    fn q921_ack_packet(&mut self, idx: usize, num: u8) -> bool {
        let link = &mut self.links[idx];
        if let Some(pos) = link
            .txqueue
            .iter()
            .position(|f| f.transmitted && f.n_s == num)
        {
            link.txqueue.remove(pos);
            if self.cfg.debug.contains(DebugFlags::Q921_DUMP) {
                log::debug!("acked packet {num}, {} left in queue", self.links[idx].txqueue.len());
            }
            true
        } else {
            false
        }
    }

    /// Acknowledge every frame in [V(A), N(R)) and advance V(A).
    fn update_v_a(&mut self, idx: usize, n_r: u8) {
        let mut ideal = 0usize;
        let mut real = 0usize;
        let mut x = self.links[idx].v_a;
        while x != n_r {
            ideal += 1;
            if self.q921_ack_packet(idx, x) {
                real += 1;
            }
            x = seq_inc(x);
        }
        if ideal != real {
            log::error!("should have acked {ideal} frames but actually acked {real}");
        }
        self.links[idx].v_a = n_r;
    }

    /// Retransmit every already-sent frame from N(R) onward (go-back-N).
    fn q921_invoke_retransmission(
        &mut self,
        dev: &mut impl DchanDevice,
        idx: usize,
        n_r: u8,
    ) -> PriResult<usize> {
        let cr = self.cmd_bit(true);
        let mut frames_txd = 0usize;
        let mut pos = {
            let link = &self.links[idx];
            match link.txqueue.iter().position(|f| f.n_s == n_r) {
                Some(p) => p,
                None => return Ok(0),
            }
        };
        loop {
            let link = &self.links[idx];
            let Some(f) = link.txqueue.get(pos) else { break };
            if f.transmitted {
                if self.cfg.debug.contains(DebugFlags::Q921_STATE) {
                    log::debug!("retransmitting frame {}", f.n_s);
                }
                let mut buf = [0u8; FRAME_BUF];
                let len = codec::encode_i(
                    &mut buf, link.sapi, link.tei, cr, f.n_s, link.v_r, false, &f.payload,
                )?;
                dev.write(&buf[..len])?;
                frames_txd += 1;
            }
            pos += 1;
        }
        Ok(frames_txd)
    }

    // --- frame emitters --------------------------------------------------

    /// C/R bit for a command (or response) from our side of the interface.
    fn cmd_bit(&self, cmd: bool) -> bool {
        (self.cfg.node == NodeType::Network) == cmd
    }

    /// Was this received frame a command from the peer?
    fn is_command(&self, c_r: bool) -> bool {
        match self.cfg.node {
            NodeType::Network => !c_r,
            NodeType::Cpe => c_r,
        }
    }

    fn q921_send_sabme(&mut self, dev: &mut impl DchanDevice, idx: usize) {
        let link = &self.links[idx];
        let mut buf = [0u8; 8];
        let cr = self.cmd_bit(true);
        match codec::encode_u(&mut buf, link.sapi, link.tei, cr, UFrame::Sabme, true, &[]) {
            Ok(len) => {
                let _ = dev.write(&buf[..len]);
            }
            Err(e) => log::error!("failed to encode SABME: {e:?}"),
        }
    }

    fn q921_send_ua(&mut self, dev: &mut impl DchanDevice, idx: usize, fbit: bool) {
        let link = &self.links[idx];
        let mut buf = [0u8; 8];
        let cr = self.cmd_bit(false);
        match codec::encode_u(&mut buf, link.sapi, link.tei, cr, UFrame::Ua, fbit, &[]) {
            Ok(len) => {
                let _ = dev.write(&buf[..len]);
            }
            Err(e) => log::error!("failed to encode UA: {e:?}"),
        }
    }

    fn q921_rr(&mut self, dev: &mut impl DchanDevice, idx: usize, pbit: bool, cmd: bool) {
        let link = &self.links[idx];
        let mut buf = [0u8; 8];
        let cr = self.cmd_bit(cmd);
        match codec::encode_s(&mut buf, link.sapi, link.tei, cr, SFrame::Rr, link.v_r, pbit) {
            Ok(len) => {
                if self.cfg.debug.contains(DebugFlags::Q921_DUMP) {
                    log::debug!("sending RR({})", link.v_r);
                }
                let _ = dev.write(&buf[..len]);
            }
            Err(e) => log::error!("failed to encode RR: {e:?}"),
        }
    }

    fn q921_reject(&mut self, dev: &mut impl DchanDevice, idx: usize, pf: bool) {
        let link = &self.links[idx];
        let mut buf = [0u8; 8];
        let cr = self.cmd_bit(false);
        match codec::encode_s(&mut buf, link.sapi, link.tei, cr, SFrame::Rej, link.v_r, pf) {
            Ok(len) => {
                if self.cfg.debug.contains(DebugFlags::Q921_DUMP) {
                    log::debug!("sending REJ({})", link.v_r);
                }
                let _ = dev.write(&buf[..len]);
            }
            Err(e) => log::error!("failed to encode REJ: {e:?}"),
        }
    }

    fn q921_enquiry_response(&mut self, dev: &mut impl DchanDevice, idx: usize) {
        if self.links[idx].own_rx_busy {
            // Own-receiver-busy would answer RNR here; the stack never sets
            // own_rx_busy because delivery upward cannot block.
            log::error!("own receiver busy not implemented");
        } else {
            self.q921_rr(dev, idx, true, false);
        }
        self.links[idx].acknowledge_pending = false;
    }

    fn transmit_enquiry(&mut self, dev: &mut impl DchanDevice, now: MonoTime, idx: usize) {
        self.q921_rr(dev, idx, true, true);
        self.links[idx].acknowledge_pending = false;
        self.start_t200(now, idx);
    }

    fn n_r_error_recovery(&mut self, dev: &mut impl DchanDevice, now: MonoTime, idx: usize) {
        log_mdl_error!('J', "N(R) sequence error");
        self.q921_establish_data_link(dev, now, idx);
        self.links[idx].l3_initiated = false;
    }

    fn q921_establish_data_link(&mut self, dev: &mut impl DchanDevice, now: MonoTime, idx: usize) {
        self.q921_clear_exception_conditions(idx);
        self.links[idx].rc = 0;
        self.stop_t203(idx);
        self.restart_t200(now, idx);
        self.q921_send_sabme(dev, idx);
    }

    fn q921_clear_exception_conditions(&mut self, idx: usize) {
        let link = &mut self.links[idx];
        link.own_rx_busy = false;
        link.peer_rx_busy = false;
        link.reject_exception = false;
        link.acknowledge_pending = false;
    }

    fn q921_discard_iqueue(&mut self, idx: usize) {
        self.links[idx].txqueue.clear();
    }

    fn q921_setstate(&mut self, idx: usize, newstate: Q921State) {
        let link = &mut self.links[idx];
        if link.state != newstate && self.cfg.debug.contains(DebugFlags::Q921_STATE) {
            log_state_transition!(module_path!(), "q921", link.state, newstate);
        }
        link.state = newstate;
    }

    // --- timers ----------------------------------------------------------

    pub(crate) fn q921_t200_expire(
        &mut self,
        dev: &mut impl DchanDevice,
        now: MonoTime,
        idx: usize,
    ) -> PriResult<()> {
        match self.links[idx].state {
            Q921State::MultiFrameEstablished => {
                self.links[idx].rc = 0;
                self.transmit_enquiry(dev, now, idx);
                self.links[idx].rc = 1;
                self.q921_setstate(idx, Q921State::TimerRecovery);
            }
            Q921State::TimerRecovery => {
                let n200 = self.cfg.timer(TimerIdx::N200) as u8;
                if self.links[idx].rc != n200 {
                    self.transmit_enquiry(dev, now, idx);
                    self.links[idx].rc += 1;
                } else {
                    log_mdl_error!('I', "T200 expired N200 times in timer recovery");
                    self.q921_establish_data_link(dev, now, idx);
                    self.links[idx].l3_initiated = false;
                    self.q921_setstate(idx, Q921State::AwaitingEstablishment);
                }
            }
            Q921State::AwaitingEstablishment => {
                let n200 = self.cfg.timer(TimerIdx::N200) as u8;
                if self.links[idx].rc != n200 {
                    self.links[idx].rc += 1;
                    self.q921_send_sabme(dev, idx);
                    self.start_t200(now, idx);
                } else {
                    self.q921_discard_iqueue(idx);
                    log_mdl_error!('G', "T200 expired N200 times awaiting establishment");
                    if self.cfg.ptp() {
                        // Deviation from the SDL kept from the original
                        // engine: keep trying to reach multi-frame
                        // operation on point-to-point spans.
                        self.links[idx].rc = 0;
                        self.q921_send_sabme(dev, idx);
                        self.start_t200(now, idx);
                    } else {
                        self.q921_setstate(idx, Q921State::TeiAssigned);
                    }
                    self.push_event(Event::DchanDown);
                }
            }
            state => {
                log::error!("cannot handle T200 expiry in state {state:?}");
            }
        }
        Ok(())
    }

    pub(crate) fn q921_t203_expire(
        &mut self,
        dev: &mut impl DchanDevice,
        now: MonoTime,
        idx: usize,
    ) -> PriResult<()> {
        match self.links[idx].state {
            Q921State::MultiFrameEstablished => {
                self.transmit_enquiry(dev, now, idx);
                self.links[idx].rc = 0;
                self.q921_setstate(idx, Q921State::TimerRecovery);
            }
            state => {
                log::debug!("T203 expired in unexpected state {state:?}");
            }
        }
        Ok(())
    }

    pub(crate) fn start_t200(&mut self, now: MonoTime, idx: usize) {
        let tei = self.links[idx].tei;
        let old = self.links[idx].t200;
        if old != 0 {
            log::debug!("T200 requested to start without stopping first");
            self.sched.cancel(old);
        }
        let ms = self.cfg.timer(TimerIdx::T200);
        self.links[idx].t200 =
            self.sched
                .schedule(now, ms, TimerEvent::Q921 { tei, timer: LinkTimer::T200 });
    }

    pub(crate) fn stop_t200(&mut self, idx: usize) {
        let old = self.links[idx].t200;
        if old != 0 {
            self.sched.cancel(old);
            self.links[idx].t200 = 0;
        }
    }

    pub(crate) fn restart_t200(&mut self, now: MonoTime, idx: usize) {
        self.stop_t200(idx);
        self.start_t200(now, idx);
    }

    pub(crate) fn start_t203(&mut self, now: MonoTime, idx: usize) {
        let tei = self.links[idx].tei;
        let old = self.links[idx].t203;
        if old != 0 {
            log::debug!("T203 requested to start without stopping first");
            self.sched.cancel(old);
        }
        let ms = self.cfg.timer(TimerIdx::T203);
        self.links[idx].t203 =
            self.sched
                .schedule(now, ms, TimerEvent::Q921 { tei, timer: LinkTimer::T203 });
    }

    pub(crate) fn stop_t203(&mut self, idx: usize) {
        let old = self.links[idx].t203;
        if old != 0 {
            self.sched.cancel(old);
            self.links[idx].t203 = 0;
        }
    }

    /// Index of the link bound to `tei`, if one exists.
    pub(crate) fn link_idx_by_tei(&self, tei: u8) -> Option<usize> {
        self.links.iter().position(|l| l.tei == tei)
    }

    /// Snapshot of a link's data-link state, for diagnostics and test
    /// harnesses. `tei = None` reads the master link.
    pub fn link_status(&self, tei: Option<u8>) -> Option<LinkStatus> {
        let link = match tei {
            Some(tei) => &self.links[self.link_idx_by_tei(tei)?],
            None => self.links.first()?,
        };
        Some(LinkStatus {
            state: link.state,
            tei: link.tei,
            v_s: link.v_s,
            v_a: link.v_a,
            v_r: link.v_r,
            queue_len: link.txqueue.len(),
            t200_running: link.t200 != 0,
            t203_running: link.t203 != 0,
        })
    }
}

/// Read-only view of one link's state (the fields `q921_dump` prints).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkStatus {
    /// Current data-link state
    pub state: Q921State,
    /// TEI bound to the link
    pub tei: u8,
    /// Next send sequence number V(S)
    pub v_s: u8,
    /// Oldest unacknowledged sequence number V(A)
    pub v_a: u8,
    /// Next expected receive sequence number V(R)
    pub v_r: u8,
    /// Frames in the retransmit queue
    pub queue_len: usize,
    /// T200 currently armed
    pub t200_running: bool,
    /// T203 currently armed
    pub t203_running: bool,
}
