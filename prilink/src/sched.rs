//! One-shot timer table.
//!
//! A fixed-capacity table of (deadline, event) pairs. Ids are slot+1 so that
//! 0 can mean "no timer" everywhere a timer id is stored; cancelling id 0 is
//! a no-op. The table belongs to the master controller: subchannels schedule
//! through it.
//!
//! Instead of a callback pointer, each entry carries a [`TimerEvent`] value
//! that the controller dispatches after the slot has been cleared, so a
//! handler is free to schedule a replacement for the timer that just fired.

use prilink_types::MonoTime;

/// Capacity of the timer table.
pub const MAX_SCHED: usize = 384;

/// Identifier of a scheduled timer; 0 means none.
pub type TimerId = u16;

/// Q.921 link timers, keyed by the link's TEI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTimer {
    /// Acknowledgement timer
    T200,
    /// TEI identity request retry timer
    T202,
    /// Idle timer
    T203,
}

/// Q.931 per-call timers, keyed by call reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallTimer {
    /// SETUP response wait
    T303,
    /// DISCONNECT to RELEASE wait
    T305,
    /// RELEASE to RELEASE COMPLETE wait
    T308,
    /// CALL PROCEEDING to further progress wait
    T310,
    /// RESTART cycle
    T316,
}

/// What to do when a timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// A Q.921 timer on the link with this TEI
    Q921 {
        /// TEI of the owning link
        tei: u8,
        /// Which timer
        timer: LinkTimer,
    },
    /// A Q.931 timer on the call with this reference
    Q931 {
        /// Call reference of the owning call
        cref: u16,
        /// Which timer
        timer: CallTimer,
    },
    /// Report the D channel up once the poll loop runs (PTMP network start)
    NtDchanUp,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    when: MonoTime,
    event: TimerEvent,
}

/// Fixed-capacity one-shot timer table.
pub struct TimerTable {
    slots: [Option<Slot>; MAX_SCHED],
    /// Most slots ever occupied at once, for diagnostics
    high_water: usize,
}

impl TimerTable {
    /// An empty table.
    pub fn new() -> Self {
        TimerTable { slots: [None; MAX_SCHED], high_water: 0 }
    }

    /// Schedule `event` to fire `ms` milliseconds after `now`.
    ///
    /// Returns the timer id, or 0 if the table is full.
    pub fn schedule(&mut self, now: MonoTime, ms: i32, event: TimerEvent) -> TimerId {
        for (x, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(Slot { when: now.add_ms(ms), event });
                if x + 1 > self.high_water {
                    self.high_water = x + 1;
                }
                return (x + 1) as TimerId;
            }
        }
        log::error!("no more room in scheduler");
        0
    }

    /// Cancel a scheduled timer. Id 0 is ignored.
    pub fn cancel(&mut self, id: TimerId) {
        let id = id as usize;
        if 0 < id && id <= MAX_SCHED {
            self.slots[id - 1] = None;
        } else if id != 0 {
            log::error!("asked to delete sched id {id}");
        }
    }

    /// Deadline of the earliest scheduled timer, if any.
    pub fn next_expiry(&self) -> Option<MonoTime> {
        self.slots
            .iter()
            .flatten()
            .map(|s| s.when)
            .min()
    }

    /// Remove and return one expired entry. The slot is cleared before the
    /// event is handed back, so the handler may schedule new timers freely.
    pub fn pop_expired(&mut self, now: MonoTime) -> Option<TimerEvent> {
        for slot in self.slots.iter_mut() {
            if let Some(s) = slot {
                if s.when <= now {
                    let event = s.event;
                    *slot = None;
                    return Some(event);
                }
            }
        }
        None
    }

    /// Most slots ever occupied at once.
    pub fn high_water(&self) -> usize {
        self.high_water
    }
}

impl Default for TimerTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EV: TimerEvent = TimerEvent::NtDchanUp;

    #[test]
    fn ids_start_at_one() {
        let mut t = TimerTable::new();
        assert_eq!(t.schedule(MonoTime::ZERO, 100, EV), 1);
        assert_eq!(t.schedule(MonoTime::ZERO, 100, EV), 2);
    }

    #[test]
    fn cancel_of_zero_is_a_noop() {
        let mut t = TimerTable::new();
        t.cancel(0);
        let id = t.schedule(MonoTime::ZERO, 100, EV);
        t.cancel(id);
        assert_eq!(t.next_expiry(), None);
    }

    #[test]
    fn next_expiry_is_earliest() {
        let mut t = TimerTable::new();
        t.schedule(MonoTime::ZERO, 500, EV);
        t.schedule(MonoTime::ZERO, 100, EV);
        t.schedule(MonoTime::ZERO, 900, EV);
        assert_eq!(t.next_expiry(), Some(MonoTime::ZERO.add_ms(100)));
    }

    #[test]
    fn pop_expired_clears_before_returning() {
        let mut t = TimerTable::new();
        t.schedule(MonoTime::ZERO, 100, EV);
        let now = MonoTime::ZERO.add_ms(100);
        assert_eq!(t.pop_expired(now), Some(EV));
        // Slot was freed: a handler rescheduling gets the same slot back
        assert_eq!(t.schedule(now, 100, EV), 1);
        assert_eq!(t.pop_expired(now), None);
    }

    #[test]
    fn full_table_returns_zero() {
        let mut t = TimerTable::new();
        for _ in 0..MAX_SCHED {
            assert_ne!(t.schedule(MonoTime::ZERO, 10, EV), 0);
        }
        assert_eq!(t.schedule(MonoTime::ZERO, 10, EV), 0);
        assert_eq!(t.high_water(), MAX_SCHED);
    }
}
