//! Feedback predicates over the monitor registry
//!
//! Pure functions keyed by label. A missing entry reads as the empty
//! string, which counts as zero numerically and false as a boolean.

use serde::{Deserialize, Serialize};

use crate::registry::MonitorRegistry;

/// Configured feedback criteria
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Feedback {
    /// Cached value equals a number
    ParameterEquals { label: String, value: f64 },
    /// Cached value equals a boolean
    BooleanEquals { label: String, value: bool },
    /// Cached value equals a string (enumeration entries)
    EnumEquals { label: String, value: String },
    /// Cached value is above a threshold
    HitThreshold { label: String, threshold: f64 },
    /// Cached value is below a threshold
    BelowThreshold { label: String, threshold: f64 },
}

impl Feedback {
    pub fn label(&self) -> &str {
        match self {
            Feedback::ParameterEquals { label, .. }
            | Feedback::BooleanEquals { label, .. }
            | Feedback::EnumEquals { label, .. }
            | Feedback::HitThreshold { label, .. }
            | Feedback::BelowThreshold { label, .. } => label,
        }
    }

    pub fn evaluate(&self, registry: &MonitorRegistry) -> bool {
        match self {
            Feedback::ParameterEquals { label, value } => number_equals(registry, label, *value),
            Feedback::BooleanEquals { label, value } => boolean_equals(registry, label, *value),
            Feedback::EnumEquals { label, value } => string_equals(registry, label, value),
            Feedback::HitThreshold { label, threshold } => above_threshold(registry, label, *threshold),
            Feedback::BelowThreshold { label, threshold } => below_threshold(registry, label, *threshold),
        }
    }
}

fn cached<'a>(registry: &'a MonitorRegistry, label: &str) -> &'a str {
    registry.value(label).unwrap_or("")
}

/// Numeric reading of a cached value; blank reads as zero, garbage as none
fn as_number(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Some(0.0);
    }
    match trimmed {
        "true" => Some(1.0),
        "false" => Some(0.0),
        _ => trimmed.parse().ok(),
    }
}

fn as_bool(value: &str) -> bool {
    match value.trim() {
        "true" => true,
        other => other.parse::<f64>().map(|n| n != 0.0).unwrap_or(false),
    }
}

pub fn number_equals(registry: &MonitorRegistry, label: &str, target: f64) -> bool {
    as_number(cached(registry, label)) == Some(target)
}

pub fn boolean_equals(registry: &MonitorRegistry, label: &str, target: bool) -> bool {
    as_bool(cached(registry, label)) == target
}

pub fn string_equals(registry: &MonitorRegistry, label: &str, target: &str) -> bool {
    cached(registry, label) == target
}

pub fn above_threshold(registry: &MonitorRegistry, label: &str, threshold: f64) -> bool {
    as_number(cached(registry, label)).is_some_and(|v| v > threshold)
}

pub fn below_threshold(registry: &MonitorRegistry, label: &str, threshold: f64) -> bool {
    as_number(cached(registry, label)).is_some_and(|v| v < threshold)
}
