//! Time-series logs

use serde::{Deserialize, Serialize};

use crate::{LogValue, LogValueType, Timestamp};

/// A named, typed, insertion-ordered series of `(time, value)` samples.
///
/// Duplicate timestamps are allowed; the last appended sample is the most recent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesLog {
    name: String,
    value_type: LogValueType,
    units: Option<String>,
    samples: Vec<(Timestamp, LogValue)>,
}

impl TimeSeriesLog {
    pub fn new(name: impl Into<String>, value_type: LogValueType, units: Option<String>) -> Self {
        Self { name: name.into(), value_type, units, samples: Vec::new() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_type(&self) -> LogValueType {
        self.value_type
    }

    pub fn units(&self) -> Option<&str> {
        self.units.as_deref()
    }

    /// Append a sample, coercing it to the log's type.
    ///
    /// Returns `false` without modifying the log when the value cannot be stored.
    pub fn append(&mut self, time: Timestamp, value: LogValue) -> bool {
        match value.coerce(self.value_type) {
            Some(value) => {
                self.samples.push((time, value));
                true
            }
            None => false,
        }
    }

    pub fn samples(&self) -> &[(Timestamp, LogValue)] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn last(&self) -> Option<&(Timestamp, LogValue)> {
        self.samples.last()
    }

    pub fn last_value(&self) -> Option<&LogValue> {
        self.samples.last().map(|(_, value)| value)
    }

    /// Numeric view of the samples; empty for string logs.
    pub fn values_f64(&self) -> Vec<f64> {
        self.samples.iter().filter_map(|(_, value)| value.as_f64()).collect()
    }

    /// Copy of this log holding only its most recent sample.
    pub fn latest_only(&self) -> Self {
        Self {
            name: self.name.clone(),
            value_type: self.value_type,
            units: self.units.clone(),
            samples: self.samples.last().cloned().into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_coerces_and_rejects() {
        let mut log = TimeSeriesLog::new("temp", LogValueType::Double, Some("K".into()));
        assert!(log.append(Timestamp::new(1, 0), LogValue::Int(300)));
        assert!(log.append(Timestamp::new(1, 0), LogValue::Double(301.5)));
        assert!(!log.append(Timestamp::new(2, 0), LogValue::String("hot".into())));

        assert_eq!(log.len(), 2);
        assert_eq!(log.values_f64(), vec![300.0, 301.5]);
        assert_eq!(log.units(), Some("K"));
    }

    #[test]
    fn latest_only_keeps_most_recent_sample() {
        let mut log = TimeSeriesLog::new("scan_index", LogValueType::Int, None);
        for i in 0..5 {
            log.append(Timestamp::new(i, 0), LogValue::Int(i as i64));
        }
        let trimmed = log.latest_only();
        assert_eq!(trimmed.samples(), &[(Timestamp::new(4, 0), LogValue::Int(4))]);

        let empty = TimeSeriesLog::new("pause", LogValueType::Int, None).latest_only();
        assert!(empty.is_empty());
    }
}
