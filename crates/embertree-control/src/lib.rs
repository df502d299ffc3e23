//! Embertree Control - writes to remote parameters
//!
//! Absolute, expression, step and toggle writes, each checked against the
//! target's declared type and range before a single write is dispatched.

pub mod mutation;

pub use mutation::{Direction, MutationEngine, MutationOutcome, SetValue, Target, Write};
