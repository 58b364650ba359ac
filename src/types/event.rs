use serde::{Deserialize, Serialize};

use super::Timestamp;

/// A single detected neutron (or monitor hit).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Detector pixel id (monitor id for monitor events)
    pub pixel_id: u32,
    /// Time of flight in microseconds
    pub tof: f64,
    /// Pulse the event belongs to
    pub pulse_time: Timestamp,
}

impl EventRecord {
    pub fn new(pixel_id: u32, tof: f64, pulse_time: Timestamp) -> Self {
        Self { pixel_id, tof, pulse_time }
    }
}
