//! TEI management (Q.921 §5.3) for point-to-multipoint spans.
//!
//! The network side assigns TEIs from 64 upward and audits or removes them;
//! the terminal side requests one at startup (or lazily when layer 3 already
//! has data queued) and matches the assignment against its outstanding
//! reference number Ri.

use prilink_types::custom::{PriError, PriResult};
use prilink_types::event::Event;
use prilink_types::frame::q921::{SAPI_CALL_CTRL, TEI_AUTO_FIRST, TEI_GROUP, TeiMgmtMsg};
use prilink_types::timers::TimerIdx;
use prilink_types::MonoTime;
use prilink_util::frame_format::q921::{TeiMgmt, decode_tei_mgmt, encode_tei_mgmt};
use prilink_util::log_state_transition;

use crate::dev::DchanDevice;
use crate::q921::{LapdLink, Q921State};
use crate::sched::{LinkTimer, TimerEvent};
use crate::DchanController;

impl DchanController {
    /// A fresh pseudo-random reference number for a TEI identity request.
    fn next_ri(&mut self) -> u16 {
        self.ri_seed = self.ri_seed.wrapping_mul(25173).wrapping_add(13849);
        self.ri_seed
    }

    fn send_tei(&mut self, dev: &mut impl DchanDevice, msg: TeiMgmtMsg, ri: u16, ai: u8) {
        let mut buf = [0u8; 16];
        let mgmt = TeiMgmt { msg, ri, ai };
        let cr = self.cmd_bit(true);
        match encode_tei_mgmt(&mut buf, &mgmt, cr) {
            Ok(len) => {
                let _ = dev.write(&buf[..len]);
            }
            Err(e) => log::error!("failed to encode TEI management frame: {e:?}"),
        }
    }

    /// Send (or resend) a TEI identity request and arm T202.
    pub(crate) fn tei_request(
        &mut self,
        dev: &mut impl DchanDevice,
        now: MonoTime,
        idx: usize,
    ) -> PriResult<()> {
        let ri = self.next_ri();
        self.links[idx].ri = ri;
        self.links[idx].n202_count += 1;
        self.send_tei(dev, TeiMgmtMsg::IdentityRequest, ri, TEI_GROUP);
        let tei = self.links[idx].tei;
        let old = self.links[idx].t202;
        self.sched.cancel(old);
        let ms = self.cfg.timer(TimerIdx::T202);
        self.links[idx].t202 =
            self.sched
                .schedule(now, ms, TimerEvent::Q921 { tei, timer: LinkTimer::T202 });
        Ok(())
    }

    /// T202 expiry: retry the identity request up to N202 times.
    pub(crate) fn q921_t202_expire(
        &mut self,
        dev: &mut impl DchanDevice,
        now: MonoTime,
        idx: usize,
    ) -> PriResult<()> {
        let n202 = self.cfg.timer(TimerIdx::N202) as u8;
        if self.links[idx].n202_count < n202 {
            return self.tei_request(dev, now, idx);
        }
        log::error!("no TEI assignment after {n202} identity requests");
        self.links[idx].n202_count = 0;
        self.q921_setstate(idx, Q921State::TeiUnassigned);
        self.push_event(Event::DchanDown);
        Ok(())
    }

    /// Handle a layer-2 management UI payload.
    pub(crate) fn tei_receive_mdl(
        &mut self,
        dev: &mut impl DchanDevice,
        now: MonoTime,
        payload: &[u8],
    ) -> PriResult<()> {
        if !self.cfg.bri_nt_ptmp() && !self.cfg.bri_te_ptmp() {
            log::error!("TEI management message on a point-to-point span");
            return Ok(());
        }
        let mgmt = match decode_tei_mgmt(payload) {
            Ok(m) => m,
            Err(e) => {
                log::error!("undecodable TEI management message: {e:?}");
                return Ok(());
            }
        };

        match mgmt.msg {
            TeiMgmtMsg::IdentityRequest => self.tei_identity_request(dev, mgmt),
            TeiMgmtMsg::IdentityAssigned => self.tei_identity_assigned(dev, now, mgmt),
            TeiMgmtMsg::IdentityCheckRequest => self.tei_identity_check(dev, mgmt),
            TeiMgmtMsg::IdentityRemove => self.tei_identity_remove(dev, now, mgmt),
            other => {
                log::debug!("ignoring TEI management message {other:?}");
                Ok(())
            }
        }
    }

    /// Network side: grant the first free TEI from 64.
    fn tei_identity_request(
        &mut self,
        dev: &mut impl DchanDevice,
        mgmt: TeiMgmt,
    ) -> PriResult<()> {
        if !self.cfg.bri_nt_ptmp() {
            return Ok(());
        }
        if mgmt.ai != TEI_GROUP {
            log::error!("TEI identity request with invalid Ai {}", mgmt.ai);
            self.send_tei(dev, TeiMgmtMsg::IdentityDenied, mgmt.ri, mgmt.ai);
            return Ok(());
        }
        let mut tei = TEI_AUTO_FIRST;
        while self.link_idx_by_tei(tei).is_some() {
            tei += 1;
        }
        if tei >= TEI_GROUP {
            log::error!("TEI quota reached, cannot assign a new TEI");
            return Ok(());
        }
        let mut link = LapdLink::new(SAPI_CALL_CTRL, tei);
        link.state = Q921State::TeiAssigned;
        if self.links.push(link).is_err() {
            log::error!("subchannel table full, cannot assign TEI {tei}");
            return Err(PriError::BufferFull);
        }
        self.send_tei(dev, TeiMgmtMsg::IdentityAssigned, mgmt.ri, tei);
        Ok(())
    }

    /// Terminal side: take the granted TEI if the Ri matches ours.
    fn tei_identity_assigned(
        &mut self,
        dev: &mut impl DchanDevice,
        now: MonoTime,
        mgmt: TeiMgmt,
    ) -> PriResult<()> {
        if !self.cfg.bri_te_ptmp() {
            return Ok(());
        }
        let idx = 0;
        match self.links[idx].state {
            Q921State::AssignAwaitingTei | Q921State::EstablishAwaitingTei => {}
            _ => {
                log::debug!("ignoring unrequested TEI assignment");
                return Ok(());
            }
        }
        if mgmt.ri != self.links[idx].ri {
            log::debug!(
                "TEI assignment for Ri {:04x}, ours is {:04x}",
                mgmt.ri,
                self.links[idx].ri
            );
            return Ok(());
        }
        let old = self.links[idx].t202;
        self.sched.cancel(old);
        self.links[idx].t202 = 0;
        self.links[idx].n202_count = 0;
        self.links[idx].tei = mgmt.ai;
        log_state_transition!(module_path!(), "tei assigned", TEI_GROUP, mgmt.ai);

        match self.links[idx].state {
            Q921State::AssignAwaitingTei => {
                self.q921_setstate(idx, Q921State::TeiAssigned);
                self.push_event(Event::DchanUp);
            }
            Q921State::EstablishAwaitingTei => {
                self.q921_establish_data_link(dev, now, idx);
                self.links[idx].l3_initiated = true;
                self.q921_setstate(idx, Q921State::AwaitingEstablishment);
            }
            _ => unreachable!(),
        }
        Ok(())
    }

    /// Terminal side: answer a TEI audit addressed to us or the group.
    fn tei_identity_check(&mut self, dev: &mut impl DchanDevice, mgmt: TeiMgmt) -> PriResult<()> {
        if !self.cfg.bri_te_ptmp() {
            return Ok(());
        }
        let link = &self.links[0];
        if matches!(
            link.state,
            Q921State::TeiUnassigned | Q921State::AssignAwaitingTei | Q921State::EstablishAwaitingTei
        ) {
            return Ok(());
        }
        let our_tei = link.tei;
        if mgmt.ai == TEI_GROUP || mgmt.ai == our_tei {
            let ri = self.next_ri();
            self.send_tei(dev, TeiMgmtMsg::IdentityCheckResponse, ri, our_tei);
        }
        Ok(())
    }

    /// Terminal side: our TEI was withdrawn; fall back and re-request.
    fn tei_identity_remove(
        &mut self,
        dev: &mut impl DchanDevice,
        now: MonoTime,
        mgmt: TeiMgmt,
    ) -> PriResult<()> {
        if !self.cfg.bri_te_ptmp() {
            return Ok(());
        }
        if matches!(
            self.links[0].state,
            Q921State::TeiUnassigned | Q921State::AssignAwaitingTei
        ) {
            // Nothing assigned to remove
            return Ok(());
        }
        let our_tei = self.links[0].tei;
        if mgmt.ai == TEI_GROUP || mgmt.ai == our_tei {
            self.stop_t200(0);
            self.stop_t203(0);
            self.links[0].txqueue.clear();
            self.links[0].tei = TEI_GROUP;
            self.q921_setstate(0, Q921State::TeiUnassigned);
            self.push_event(Event::DchanDown);
            // Immediately try to get a TEI back
            self.q921_setstate(0, Q921State::AssignAwaitingTei);
            self.tei_request(dev, now, 0)?;
        }
        Ok(())
    }

    /// Network side: force an unknown TEI to re-request. The removal is sent
    /// twice in case of link corruption (Q.921 §5.3.2 note).
    pub(crate) fn tei_remove_unknown(
        &mut self,
        dev: &mut impl DchanDevice,
        tei: u8,
    ) -> PriResult<()> {
        if tei < TEI_AUTO_FIRST {
            log::error!("fixed TEI range is not supported, discarding frame for TEI {tei}");
            return Ok(());
        }
        log::debug!("sending TEI remove for unknown TEI {tei}");
        self.send_tei(dev, TeiMgmtMsg::IdentityRemove, 0, tei);
        self.send_tei(dev, TeiMgmtMsg::IdentityRemove, 0, tei);
        Ok(())
    }
}
