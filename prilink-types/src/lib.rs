#![no_std]
#![warn(missing_docs)]
//! # prilink-types
//!
//! Core types for the PriLink ISDN D-channel stack: wire-level constants and
//! octet layouts for Q.921 (LAPD) and Q.931, Q.850 cause values, call-state
//! and switch-variant enums, the application event type, and the shared error
//! and time types.
//!
//! This crate is `no_std` and allocation-free; every bounded buffer is a
//! `heapless` collection.
//!
//! ## Modules
//! - [`custom`]: library error and result types.
//! - [`frame`]: Q.921 and Q.931 octet layouts and protocol constants.
//! - [`cause`]: ITU-T Q.850 cause values.
//! - [`call`]: call states and per-call field types.
//! - [`event`]: events delivered to the call-handling application.
//! - [`switch`]: node roles and switch dialect variants.
//! - [`timers`]: protocol timer indices, counters, and defaults.
//! - [`time`]: monotonic time-of-day arithmetic.

pub mod call;
pub mod cause;
pub mod custom;
pub mod event;
pub mod frame;
pub mod switch;
pub mod time;
pub mod timers;

pub use custom::{PriError, PriResult};
pub use time::MonoTime;
