//! Pulse timestamps on the EPICS epoch

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Seconds between the Unix epoch and the EPICS epoch (1990-01-01T00:00:00Z).
pub const EPICS_EPOCH_OFFSET: u64 = 631_152_000;

const NANOS_PER_SECOND: u32 = 1_000_000_000;

/// A pulse or sample time: seconds and nanoseconds since 1990-01-01T00:00:00Z.
///
/// Ordering compares seconds first, then nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Timestamp {
    pub seconds: u32,
    pub nanoseconds: u32,
}

impl Timestamp {
    /// Start time meaning "from now": no historical data is requested.
    pub const ZERO: Timestamp = Timestamp { seconds: 0, nanoseconds: 0 };

    /// Start time meaning "from the start of the current run".
    pub const START_OF_RUN: Timestamp = Timestamp { seconds: 1, nanoseconds: 0 };

    pub const fn new(seconds: u32, nanoseconds: u32) -> Self {
        Self { seconds, nanoseconds }
    }

    /// Current wall-clock time on the EPICS epoch.
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Convert a UTC time; instants before the EPICS epoch clamp to [`Timestamp::ZERO`].
    pub fn from_datetime(time: DateTime<Utc>) -> Self {
        let secs = time.timestamp() - EPICS_EPOCH_OFFSET as i64;
        if secs < 0 {
            return Self::ZERO;
        }
        let seconds = u32::try_from(secs).unwrap_or(u32::MAX);
        Self { seconds, nanoseconds: time.timestamp_subsec_nanos().min(NANOS_PER_SECOND - 1) }
    }

    /// Convert to a UTC time.
    pub fn to_datetime(self) -> DateTime<Utc> {
        let unix = self.seconds as i64 + EPICS_EPOCH_OFFSET as i64;
        DateTime::from_timestamp(unix, self.nanoseconds).unwrap_or_default()
    }

    /// Pulse identifier as used to correlate event packets with their RTDL packet.
    pub const fn pulse_id(self) -> u64 {
        ((self.seconds as u64) << 32) | self.nanoseconds as u64
    }

    /// Inverse of [`Timestamp::pulse_id`].
    pub const fn from_pulse_id(pulse_id: u64) -> Self {
        Self { seconds: (pulse_id >> 32) as u32, nanoseconds: pulse_id as u32 }
    }

    /// Seconds since the EPICS epoch as a float.
    pub fn as_secs_f64(self) -> f64 {
        self.seconds as f64 + self.nanoseconds as f64 / NANOS_PER_SECOND as f64
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_datetime().to_rfc3339())
    }
}
