#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]
//! # PriLink
//!
//! A Q.921/Q.931 signalling stack for the D channel of an ISDN PRI or BRI
//! span. The stack sits between a raw HDLC-framed device and a call-handling
//! application: it runs the LAPD acknowledged transfer service, manages TEI
//! assignment on point-to-multipoint spans, and drives one Q.931 state
//! machine per call.
//!
//! ## Architecture
//!
//! - **Q.921 engine**: per-(SAPI, TEI) link state machines with the
//!   retransmit queue, V(S)/V(A)/V(R) counters, and the T200/T203 timers.
//! - **Q.931 engine**: per-call records, a table-driven information-element
//!   registry, per-message descriptors, and the per-call timers.
//! - **Scheduler**: one fixed-capacity table of one-shot timers owned by the
//!   master controller.
//!
//! ## Scheduling model
//!
//! Single-threaded and cooperative. Every entry point is synchronous and
//! non-blocking; the application drives the controller from its own poll
//! loop:
//!
//! ```ignore
//! let mut ctrl = DchanController::new(NodeType::Network, SwitchVariant::Ni2)?;
//! ctrl.start(&mut dev, clock.now())?;
//! loop {
//!     let timeout = ctrl.schedule_next();
//!     wait_for_readable_or(timeout);
//!     if let Some(event) = ctrl.check_event(&mut dev, clock.now())? {
//!         handle(event);
//!     }
//!     if let Some(event) = ctrl.schedule_run(&mut dev, clock.now())? {
//!         handle(event);
//!     }
//! }
//! ```

pub mod dev;
pub mod q921;
pub mod q931;
pub mod sched;

use heapless::Vec;
use prilink_types::custom::{PriError, PriResult};
use prilink_types::event::Event;
use prilink_types::frame::q921::{SAPI_CALL_CTRL, TEI_GROUP, TEI_PTP};
use prilink_types::switch::{DebugFlags, NodeType, SwitchVariant};
use prilink_types::timers::{MAX_TIMERS, TimerIdx, default_timers};
use prilink_types::MonoTime;

pub use dev::DchanDevice;
pub use prilink_types::call;
pub use prilink_types::cause;
pub use prilink_types::event;
pub use prilink_types::frame;
pub use prilink_types::switch;
pub use prilink_types::timers;
pub use prilink_types::{MonoTime as Time, PriError as Error};
pub use q921::{LinkStatus, Q921State};
pub use q931::SetupParams;

use q921::{LapdLink, MAX_LINKS};
use q931::call::CallPool;
use sched::{LinkTimer, TimerEvent, TimerTable};

/// Receive scratch size: the largest frame the stack will accept.
const RECV_BUF: usize = 1024;

/// Static configuration of one span.
pub(crate) struct SpanConfig {
    pub node: NodeType,
    pub switch: SwitchVariant,
    /// Basic-rate (2B+D) span
    pub bri: bool,
    /// Point-to-multipoint configuration
    pub ptmp: bool,
    pub debug: DebugFlags,
    pub timers: [i32; MAX_TIMERS],
    pub overlap_dial: bool,
    /// Network-specific facility code included in SETUP, when set
    pub nsf: Option<u8>,
    /// Map channel numbers logically instead of skipping E1 slot 16
    pub chan_mapping_logical: bool,
}

impl SpanConfig {
    pub(crate) fn timer(&self, idx: TimerIdx) -> i32 {
        self.timers[idx as usize]
    }

    pub(crate) fn ptp(&self) -> bool {
        !self.ptmp
    }

    pub(crate) fn bri_nt_ptmp(&self) -> bool {
        self.ptmp && self.node == NodeType::Network
    }

    pub(crate) fn bri_te_ptmp(&self) -> bool {
        self.ptmp && self.node == NodeType::Cpe
    }
}

/// One D-channel controller.
///
/// Owns the Q.921 link(s), the call pool, the timer table, and the single
/// pending-event slot. On a point-to-multipoint network span the link list
/// grows one entry per assigned TEI; all of them share this controller's
/// call pool and schedule.
pub struct DchanController {
    pub(crate) cfg: SpanConfig,
    pub(crate) sched: TimerTable,
    pub(crate) links: Vec<LapdLink, MAX_LINKS>,
    pub(crate) calls: CallPool,
    pub(crate) pending_event: Option<Event>,
    pub(crate) cref_counter: u16,
    pub(crate) ri_seed: u16,
}

impl DchanController {
    /// A primary-rate (point-to-point) controller.
    pub fn new(node: NodeType, switch: SwitchVariant) -> PriResult<Self> {
        Self::build(node, switch, false, false)
    }

    /// A basic-rate point-to-multipoint controller.
    pub fn bri(node: NodeType, switch: SwitchVariant) -> PriResult<Self> {
        Self::build(node, switch, true, true)
    }

    fn build(node: NodeType, switch: SwitchVariant, bri: bool, ptmp: bool) -> PriResult<Self> {
        let mut links = Vec::new();
        let tei = if ptmp { TEI_GROUP } else { TEI_PTP };
        links
            .push(LapdLink::new(SAPI_CALL_CTRL, tei))
            .map_err(|_| PriError::BufferFull)?;
        Ok(DchanController {
            cfg: SpanConfig {
                node,
                switch,
                bri,
                ptmp,
                debug: DebugFlags::default(),
                timers: default_timers(),
                overlap_dial: false,
                nsf: None,
                chan_mapping_logical: false,
            },
            sched: TimerTable::new(),
            links,
            calls: CallPool::new(),
            pending_event: None,
            cref_counter: 0,
            ri_seed: 0x1cf3,
        })
    }

    // --- configuration ---------------------------------------------------

    /// Set the debug trace mask.
    pub fn set_debug(&mut self, debug: DebugFlags) {
        self.cfg.debug = debug;
    }

    /// Override one timer or counter before (or after) starting the span.
    pub fn set_timer(&mut self, idx: TimerIdx, value: i32) -> PriResult<()> {
        if value < 0 {
            return Err(PriError::InvalidParameter);
        }
        self.cfg.timers[idx as usize] = value;
        Ok(())
    }

    /// Current value of one timer or counter.
    pub fn get_timer(&self, idx: TimerIdx) -> i32 {
        self.cfg.timer(idx)
    }

    /// Enable overlap dialling (digits sent in INFORMATION messages).
    pub fn set_overlap_dial(&mut self, enabled: bool) {
        self.cfg.overlap_dial = enabled;
    }

    /// Set the network-specific facility code carried in SETUP.
    pub fn set_nsf(&mut self, nsf: Option<u8>) {
        self.cfg.nsf = nsf;
    }

    /// Number channels logically instead of skipping E1 slot 16.
    pub fn set_chan_mapping_logical(&mut self, logical: bool) {
        self.cfg.chan_mapping_logical = logical;
    }

    // --- event pump ------------------------------------------------------

    /// Bring up layer 2. On PTMP terminals this requests a TEI; on
    /// point-to-point spans it begins SABME establishment.
    pub fn start(&mut self, dev: &mut impl DchanDevice, now: MonoTime) -> PriResult<()> {
        // Spread the TEI reference-number sequence across spans
        self.ri_seed = self.ri_seed.wrapping_add(now.usec as u16).wrapping_add(now.sec as u16);
        self.q921_start(dev, now)
    }

    /// Feed one frame that arrived out-of-band (custom I/O integration).
    pub fn receive(
        &mut self,
        dev: &mut impl DchanDevice,
        now: MonoTime,
        frame: &[u8],
    ) -> PriResult<Option<Event>> {
        self.q921_receive(dev, now, frame)?;
        Ok(self.pending_event.take())
    }

    /// Return the pending event, reading and dispatching one frame from the
    /// device if none is queued yet.
    pub fn check_event(
        &mut self,
        dev: &mut impl DchanDevice,
        now: MonoTime,
    ) -> PriResult<Option<Event>> {
        if let Some(event) = self.pending_event.take() {
            return Ok(Some(event));
        }
        let mut buf = [0u8; RECV_BUF];
        let len = dev.read(&mut buf)?;
        if len == 0 {
            return Ok(None);
        }
        self.q921_receive(dev, now, &buf[..len])?;
        Ok(self.pending_event.take())
    }

    /// Deadline of the next timer, for the application's poll timeout.
    pub fn schedule_next(&self) -> Option<MonoTime> {
        self.sched.next_expiry()
    }

    /// Fire every due timer, returning the first event one of them produced.
    pub fn schedule_run(
        &mut self,
        dev: &mut impl DchanDevice,
        now: MonoTime,
    ) -> PriResult<Option<Event>> {
        while let Some(timer_event) = self.sched.pop_expired(now) {
            self.dispatch_timer(dev, now, timer_event)?;
            if self.pending_event.is_some() {
                break;
            }
        }
        Ok(self.pending_event.take())
    }

    fn dispatch_timer(
        &mut self,
        dev: &mut impl DchanDevice,
        now: MonoTime,
        timer_event: TimerEvent,
    ) -> PriResult<()> {
        match timer_event {
            TimerEvent::NtDchanUp => {
                self.push_event(Event::DchanUp);
                Ok(())
            }
            TimerEvent::Q921 { tei, timer } => {
                let Some(idx) = self.link_idx_by_tei(tei) else {
                    return Ok(());
                };
                match timer {
                    LinkTimer::T200 => {
                        self.links[idx].t200 = 0;
                        self.q921_t200_expire(dev, now, idx)
                    }
                    LinkTimer::T202 => {
                        self.links[idx].t202 = 0;
                        self.q921_t202_expire(dev, now, idx)
                    }
                    LinkTimer::T203 => {
                        self.links[idx].t203 = 0;
                        self.q921_t203_expire(dev, now, idx)
                    }
                }
            }
            TimerEvent::Q931 { cref, timer } => {
                self.clear_fired_call_timer(cref, timer);
                self.q931_call_timer_expire(dev, now, cref, timer)
            }
        }
    }

    /// Queue an event for the application. The slot holds one event; a
    /// second one produced in the same cycle is logged and dropped.
    pub(crate) fn push_event(&mut self, event: Event) {
        if self.pending_event.is_some() {
            log::warn!("event slot occupied, dropping {event:?}");
        } else {
            self.pending_event = Some(event);
        }
    }

    /// High-water mark of the timer table, for diagnostics.
    pub fn sched_high_water(&self) -> usize {
        self.sched.high_water()
    }
}
