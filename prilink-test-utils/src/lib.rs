//! Test utilities for the PriLink stack: a capture-and-inject fake
//! D-channel device, a hand-cranked clock, and builders for the Q.921 and
//! Q.931 frames the integration tests feed in.
//!
//! The integration tests themselves live in this crate's `tests/` directory
//! so they exercise the stack strictly through its public API.

pub mod fake_dchan;
pub mod frames;

pub use fake_dchan::{FakeClock, FakeDchan};
