//! Log value type definitions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Value type of a time-series log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogValueType {
    /// Integer-valued process variable (also unsigned and enum variables)
    Int,
    /// Floating point process variable
    Double,
    /// String process variable
    String,
}

impl LogValueType {
    /// Map a device descriptor `pv_type` to a log value type.
    ///
    /// Returns `None` for types the listener does not record.
    pub fn from_pv_type(pv_type: &str) -> Option<Self> {
        let normalized = pv_type.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "double" | "float" => Some(LogValueType::Double),
            "integer" | "int" | "unsigned" | "unsigned integer" => Some(LogValueType::Int),
            "string" => Some(LogValueType::String),
            other if other.starts_with("enum") => Some(LogValueType::Int),
            _ => None,
        }
    }
}

impl fmt::Display for LogValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogValueType::Int => "int",
            LogValueType::Double => "double",
            LogValueType::String => "string",
        };
        f.write_str(name)
    }
}

/// A single log sample value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogValue {
    Int(i64),
    Double(f64),
    String(String),
}

impl LogValue {
    pub fn value_type(&self) -> LogValueType {
        match self {
            LogValue::Int(_) => LogValueType::Int,
            LogValue::Double(_) => LogValueType::Double,
            LogValue::String(_) => LogValueType::String,
        }
    }

    /// Convert this value for storage in a log of type `target`.
    ///
    /// Integers widen into double logs; every other mismatch is rejected.
    pub fn coerce(self, target: LogValueType) -> Option<LogValue> {
        match (self, target) {
            (LogValue::Int(v), LogValueType::Int) => Some(LogValue::Int(v)),
            (LogValue::Int(v), LogValueType::Double) => Some(LogValue::Double(v as f64)),
            (LogValue::Double(v), LogValueType::Double) => Some(LogValue::Double(v)),
            (LogValue::String(v), LogValueType::String) => Some(LogValue::String(v)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            LogValue::Int(v) => Some(*v as f64),
            LogValue::Double(v) => Some(*v),
            LogValue::String(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            LogValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pv_types_map_to_log_types() {
        assert_eq!(LogValueType::from_pv_type("double"), Some(LogValueType::Double));
        assert_eq!(LogValueType::from_pv_type("Float"), Some(LogValueType::Double));
        assert_eq!(LogValueType::from_pv_type("unsigned integer"), Some(LogValueType::Int));
        assert_eq!(LogValueType::from_pv_type("enum_MotorState"), Some(LogValueType::Int));
        assert_eq!(LogValueType::from_pv_type("string"), Some(LogValueType::String));
        assert_eq!(LogValueType::from_pv_type("int array"), None);
    }

    #[test]
    fn integers_widen_into_double_logs() {
        assert_eq!(LogValue::Int(3).coerce(LogValueType::Double), Some(LogValue::Double(3.0)));
        assert_eq!(LogValue::Double(1.5).coerce(LogValueType::Int), None);
        assert_eq!(LogValue::String("x".into()).coerce(LogValueType::Double), None);
    }
}
