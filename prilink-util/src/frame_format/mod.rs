//! Octet-level frame encoders and decoders.
//!
//! These are pure functions over byte slices; the engines own all state.
//! Decoders validate structure (extension bits, minimum lengths, declared
//! IE lengths) and reject anything that overruns its buffer.

pub mod q921;
pub mod q931;
