//! Octet layouts and protocol constants for the two wire formats the stack
//! speaks: Q.921 (LAPD) frames and Q.931 call-control messages.

pub mod q921;
pub mod q931;
