//! Error taxonomy shared by all embertree crates
//!
//! None of these are fatal: every operation that produces one logs it and
//! becomes a no-op.

use thiserror::Error;

use crate::value::ParameterType;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmberError {
    /// Path or index resolution failure
    #[error("Parameter {0} not found")]
    NotFound(String),
    /// Declared type disagrees with the requested operation
    #[error("Node {path} is not of type {expected} (is {actual})")]
    TypeMismatch {
        path: String,
        expected: String,
        actual: ParameterType,
    },
    /// Operation needs a capability the target lacks
    #[error("Node {path}: {reason}")]
    NotApplicable { path: String, reason: String },
    /// External lookup, write or subscribe was rejected
    #[error("Transport failure: {0}")]
    TransportFailure(String),
}

impl EmberError {
    pub fn not_applicable(path: &str, reason: impl Into<String>) -> Self {
        Self::NotApplicable {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

/// Registry insertion errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Monitored set is full ({0} entries)")]
    Full(usize),
    #[error("Registration belongs to generation {held}, registry is at {current}")]
    Stale { held: u64, current: u64 },
}
