//! Raw parameter values and their display normalization
//!
//! A provider reports parameter values in one of four shapes (integer, real,
//! string, boolean) together with type metadata. The normalizer turns a
//! value plus that metadata into the string cached in the monitor registry:
//! - enumeration text wins: the raw integer indexes the newline-separated list
//! - otherwise a scaling factor divides the raw number
//! - otherwise the raw value is stringified as-is

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::tree::Parameter;

/// A raw value as carried by the tree protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Bool(bool),
    Int(i64),
    Real(f64),
    Str(String),
}

impl RawValue {
    /// Numeric view used for arithmetic and scaling (integers and reals only)
    pub fn as_number(&self) -> Option<f64> {
        match self {
            RawValue::Int(v) => Some(*v as f64),
            RawValue::Real(v) => Some(*v),
            RawValue::Bool(_) | RawValue::Str(_) => None,
        }
    }

    /// Boolean view; only an actual boolean qualifies
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            RawValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The parameter type this value would be written as
    pub fn kind(&self) -> ParameterType {
        match self {
            RawValue::Bool(_) => ParameterType::Boolean,
            RawValue::Int(_) => ParameterType::Integer,
            RawValue::Real(_) => ParameterType::Real,
            RawValue::Str(_) => ParameterType::String,
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Bool(b) => write!(f, "{}", b),
            RawValue::Int(v) => write!(f, "{}", v),
            RawValue::Real(v) => f.write_str(&format_number(*v)),
            RawValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RawValue {
    fn from(v: i64) -> Self {
        RawValue::Int(v)
    }
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        RawValue::Real(v)
    }
}

impl From<bool> for RawValue {
    fn from(v: bool) -> Self {
        RawValue::Bool(v)
    }
}

impl From<&str> for RawValue {
    fn from(v: &str) -> Self {
        RawValue::Str(v.to_string())
    }
}

/// Declared parameter type (Ember+ parameter types)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    Null,
    Integer,
    Real,
    String,
    Boolean,
    Trigger,
    Enum,
    Octets,
}

impl ParameterType {
    /// Integer, real and enum parameters accept numeric writes
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            ParameterType::Integer | ParameterType::Real | ParameterType::Enum
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ParameterType::Null => "null",
            ParameterType::Integer => "integer",
            ParameterType::Real => "real",
            ParameterType::String => "string",
            ParameterType::Boolean => "boolean",
            ParameterType::Trigger => "trigger",
            ParameterType::Enum => "enum",
            ParameterType::Octets => "octets",
        }
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParameterType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "null" => Ok(ParameterType::Null),
            "integer" | "int" => Ok(ParameterType::Integer),
            "real" => Ok(ParameterType::Real),
            "string" => Ok(ParameterType::String),
            "boolean" | "bool" => Ok(ParameterType::Boolean),
            "trigger" => Ok(ParameterType::Trigger),
            "enum" => Ok(ParameterType::Enum),
            "octets" => Ok(ParameterType::Octets),
            other => Err(format!("unknown parameter type '{}'", other)),
        }
    }
}

/// Normalize a parameter's current value into its cached display string
pub fn normalize(parameter: &Parameter) -> String {
    if let Some(enumeration) = &parameter.enumeration {
        return parameter
            .value
            .as_ref()
            .and_then(|value| enumeration_entry(enumeration, value))
            .unwrap_or_default();
    }

    match (&parameter.value, parameter.factor) {
        (Some(value), Some(factor)) if factor != 0.0 => match value.as_number() {
            Some(raw) => format_number(raw / factor),
            None => value.to_string(),
        },
        (Some(value), _) => value.to_string(),
        (None, _) => String::new(),
    }
}

/// Look up the enumeration entry indexed by a raw value
pub fn enumeration_entry(enumeration: &str, value: &RawValue) -> Option<String> {
    let index = match value {
        RawValue::Int(v) if *v >= 0 => usize::try_from(*v).ok()?,
        RawValue::Real(v) if v.is_finite() && *v >= 0.0 => v.trunc() as usize,
        _ => return None,
    };
    enumeration.split('\n').nth(index).map(str::to_string)
}

/// Format a number the way the provider's display layer does:
/// integral values without a fractional part, shortest round-trip otherwise
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        let sign = if value > 0.0 { "" } else { "-" };
        format!("{}Infinity", sign)
    } else if value == 0.0 {
        "0".to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enumeration_lookup() {
        let param = Parameter::new(RawValue::Int(1)).with_enumeration("Off\nOn");
        assert_eq!(normalize(&param), "On");

        let param = Parameter::new(RawValue::Int(5)).with_enumeration("Off\nOn");
        assert_eq!(normalize(&param), "");

        let param = Parameter::new(RawValue::Int(-1)).with_enumeration("Off\nOn");
        assert_eq!(normalize(&param), "");
    }

    #[test]
    fn test_enumeration_wins_over_factor() {
        let param = Parameter::new(RawValue::Int(0))
            .with_enumeration("Mute\nLive")
            .with_factor(100.0);
        assert_eq!(normalize(&param), "Mute");
    }

    #[test]
    fn test_factor_scaling() {
        let param = Parameter::new(RawValue::Int(1500)).with_factor(100.0);
        assert_eq!(normalize(&param), "15");

        let param = Parameter::new(RawValue::Int(-255)).with_factor(10.0);
        assert_eq!(normalize(&param), "-25.5");
    }

    #[test]
    fn test_zero_factor_is_ignored() {
        let param = Parameter::new(RawValue::Int(42)).with_factor(0.0);
        assert_eq!(normalize(&param), "42");
    }

    #[test]
    fn test_raw_passthrough() {
        assert_eq!(normalize(&Parameter::new(RawValue::Bool(true))), "true");
        assert_eq!(normalize(&Parameter::new(RawValue::Real(0.5))), "0.5");
        assert_eq!(normalize(&Parameter::new(RawValue::from("CH 1"))), "CH 1");
        assert_eq!(normalize(&Parameter::default()), "");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(15.0), "15");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(2.25), "2.25");
        assert_eq!(format_number(f64::INFINITY), "Infinity");
    }

    #[test]
    fn test_raw_value_deserialize() {
        let values: Vec<RawValue> = serde_json::from_str(r#"[true, 3, 2.5, "abc"]"#).unwrap();
        assert_eq!(
            values,
            vec![
                RawValue::Bool(true),
                RawValue::Int(3),
                RawValue::Real(2.5),
                RawValue::from("abc"),
            ]
        );
    }

    #[test]
    fn test_parameter_type_parse() {
        assert_eq!("Integer".parse::<ParameterType>().unwrap(), ParameterType::Integer);
        assert_eq!("bool".parse::<ParameterType>().unwrap(), ParameterType::Boolean);
        assert!("matrix".parse::<ParameterType>().is_err());
    }
}
