//! Protocol timer indices, retry counters, and their default values.
//!
//! Timers and counters share one per-controller table, indexed by
//! [`TimerIdx`], so that any of them can be overridden individually before
//! the span is started. Values are milliseconds for timers and bare counts
//! for the N-series entries and the window size K.

/// Size of the per-controller timer/counter table.
pub const MAX_TIMERS: usize = 20;

/// Index into the controller's timer/counter table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum TimerIdx {
    /// Maximum number of Q.921 retransmissions
    N200 = 0,
    /// Maximum number of octets in an information field
    N201,
    /// Maximum number of TEI identity request transmissions
    N202,
    /// Maximum number of outstanding I-frames (window size)
    K,
    /// Q.921 acknowledgement timer
    T200,
    /// Minimum time between TEI identity check retransmissions
    T201,
    /// Minimum time between TEI identity request transmissions
    T202,
    /// Q.921 maximum idle time without exchanging frames
    T203,
    /// Maximum time to respond to an ALERTING
    T301,
    /// Overlap-receiving inter-digit timeout
    T302,
    /// Maximum wait for a response to a sent SETUP
    T303,
    /// DISCONNECT sent, waiting for RELEASE
    T305,
    /// RELEASE sent, waiting for RELEASE COMPLETE
    T308,
    /// CALL PROCEEDING received, waiting for further call progress
    T310,
    /// CONNECT sent, waiting for CONNECT ACKNOWLEDGE
    T313,
    /// RESTART sent, waiting for RESTART ACKNOWLEDGE
    T316,
    /// Maximum number of RESTART cycles before giving up
    N316,
}

/// Default timer/counter table per Q.921 §5.9 and Q.931 Table 9-1.
pub fn default_timers() -> [i32; MAX_TIMERS] {
    let mut t = [0i32; MAX_TIMERS];
    t[TimerIdx::N200 as usize] = 3;
    t[TimerIdx::N201 as usize] = 260;
    t[TimerIdx::N202 as usize] = 3;
    t[TimerIdx::K as usize] = 7;
    t[TimerIdx::T200 as usize] = 1000;
    t[TimerIdx::T201 as usize] = 1000;
    t[TimerIdx::T202 as usize] = 2000;
    t[TimerIdx::T203 as usize] = 10_000;
    t[TimerIdx::T301 as usize] = 180_000;
    t[TimerIdx::T302 as usize] = 10_000;
    t[TimerIdx::T303 as usize] = 4000;
    t[TimerIdx::T305 as usize] = 30_000;
    t[TimerIdx::T308 as usize] = 4000;
    t[TimerIdx::T310 as usize] = 30_000;
    t[TimerIdx::T313 as usize] = 4000;
    t[TimerIdx::T316 as usize] = 120_000;
    t[TimerIdx::N316 as usize] = 2;
    t
}
