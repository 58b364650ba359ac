//! Event accumulation buffer
//!
//! An [`EventBuffer`] holds everything collected between two extractions:
//! per-detector event lists, time-series logs, run metadata, running monitor
//! counts and a nested buffer for beam monitor events. The listener keeps
//! exactly one live buffer and hands detached buffers to the consumer.

mod detector;
mod log;

pub use detector::DetectorIndexMap;
pub use log::TimeSeriesLog;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::{EventRecord, LogValue, LogValueType, Timestamp};

/// Per-pulse proton charge, in picocoulombs.
pub const PROTON_CHARGE_LOG: &str = "proton_charge";
/// 1 while the run is paused, 0 otherwise.
pub const PAUSE_LOG: &str = "pause";
/// Current scan index, 0 outside a scan.
pub const SCAN_INDEX_LOG: &str = "scan_index";

/// Name of the log holding the running event count of monitor `monitor_id`.
pub fn monitor_counts_log(monitor_id: u32) -> String {
    format!("monitor{}_counts", monitor_id)
}

/// Run number and start time for the data in a buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_number: Option<u32>,
    pub run_start: Option<Timestamp>,
}

/// Accumulated events and logs for one extraction window.
#[derive(Debug, Clone, Default)]
pub struct EventBuffer {
    detectors: DetectorIndexMap,
    events: Vec<Vec<EventRecord>>,
    logs: BTreeMap<String, TimeSeriesLog>,
    run: RunMetadata,
    monitor_counts: BTreeMap<u32, u64>,
    monitors: Option<Box<EventBuffer>>,
    initialized: bool,
}

impl EventBuffer {
    /// An uninitialized buffer with no logs.
    pub fn new() -> Self {
        Self::default()
    }

    /// An uninitialized buffer with the charge, pause and scan-index logs declared.
    pub fn with_baseline_logs() -> Self {
        let mut buffer = Self::new();
        buffer.declare_log(PROTON_CHARGE_LOG, LogValueType::Double, Some("pC"));
        buffer.declare_log(PAUSE_LOG, LogValueType::Int, None);
        buffer.declare_log(SCAN_INDEX_LOG, LogValueType::Int, None);
        buffer
    }

    /// Size the buffer for the instrument's detectors and create the monitor sub-buffer.
    ///
    /// Does nothing if the buffer is already initialized.
    pub fn initialize(&mut self, detectors: DetectorIndexMap, monitors: DetectorIndexMap) {
        if self.initialized {
            return;
        }
        self.events = vec![Vec::new(); detectors.len()];
        self.detectors = detectors;

        let mut monitor_buffer = EventBuffer::new();
        monitor_buffer.events = vec![Vec::new(); monitors.len()];
        monitor_buffer.detectors = monitors;
        monitor_buffer.initialized = true;
        self.monitors = Some(Box::new(monitor_buffer));

        self.initialized = true;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Append an event for `pixel_id`; returns `false` for unknown detectors.
    pub fn add_event(&mut self, pixel_id: u32, tof: f64, pulse_time: Timestamp) -> bool {
        match self.detectors.slot(pixel_id as i64) {
            Some(slot) => {
                self.events[slot].push(EventRecord::new(pixel_id, tof, pulse_time));
                true
            }
            None => false,
        }
    }

    /// Append a monitor event; monitor `n` is detector id `-n` in the instrument.
    pub fn add_monitor_event(&mut self, monitor_id: u32, tof: f64, pulse_time: Timestamp) -> bool {
        let Some(monitors) = self.monitors.as_mut() else {
            return false;
        };
        match monitors.detectors.slot(-(monitor_id as i64)) {
            Some(slot) => {
                monitors.events[slot].push(EventRecord::new(monitor_id, tof, pulse_time));
                true
            }
            None => false,
        }
    }

    /// Add `count` events to a monitor's running total and record the new
    /// total in its [`monitor_counts_log`] at `time`.
    pub fn add_monitor_counts(&mut self, monitor_id: u32, count: u64, time: Timestamp) {
        let total = self.monitor_counts.entry(monitor_id).or_insert(0);
        *total += count;
        let total = *total;

        let name = monitor_counts_log(monitor_id);
        self.declare_log(&name, LogValueType::Int, None);
        self.append_log(&name, time, LogValue::Int(total as i64));
    }

    /// Running event totals per monitor id since the last extraction.
    ///
    /// The same totals are logged as `monitor<N>_counts`.
    pub fn monitor_counts(&self) -> &BTreeMap<u32, u64> {
        &self.monitor_counts
    }

    /// Declare a log; re-declaring an existing name keeps the existing log.
    pub fn declare_log(&mut self, name: &str, value_type: LogValueType, units: Option<&str>) -> bool {
        if self.logs.contains_key(name) {
            return false;
        }
        self.logs.insert(
            name.to_string(),
            TimeSeriesLog::new(name, value_type, units.map(str::to_string)),
        );
        true
    }

    /// Append a sample to a declared log.
    ///
    /// Returns `false` if the log is missing or the value has the wrong type.
    pub fn append_log(&mut self, name: &str, time: Timestamp, value: LogValue) -> bool {
        match self.logs.get_mut(name) {
            Some(log) => log.append(time, value),
            None => false,
        }
    }

    pub fn has_log(&self, name: &str) -> bool {
        self.logs.contains_key(name)
    }

    pub fn log(&self, name: &str) -> Option<&TimeSeriesLog> {
        self.logs.get(name)
    }

    pub fn logs(&self) -> impl Iterator<Item = &TimeSeriesLog> {
        self.logs.values()
    }

    pub fn run_metadata(&self) -> RunMetadata {
        self.run
    }

    pub fn has_run_number(&self) -> bool {
        self.run.run_number.is_some()
    }

    pub fn set_run_metadata(&mut self, run_number: u32, run_start: Timestamp) {
        self.run = RunMetadata { run_number: Some(run_number), run_start: Some(run_start) };
    }

    pub fn detector_map(&self) -> &DetectorIndexMap {
        &self.detectors
    }

    pub fn detector_count(&self) -> usize {
        self.detectors.len()
    }

    pub fn events_in_slot(&self, slot: usize) -> &[EventRecord] {
        self.events.get(slot).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn events_for_pixel(&self, pixel_id: u32) -> &[EventRecord] {
        match self.detectors.slot(pixel_id as i64) {
            Some(slot) => self.events_in_slot(slot),
            None => &[],
        }
    }

    /// Total number of events across all detector slots.
    pub fn total_events(&self) -> usize {
        self.events.iter().map(Vec::len).sum()
    }

    pub fn monitor_buffer(&self) -> Option<&EventBuffer> {
        self.monitors.as_deref()
    }

    /// The buffer that replaces this one at extraction time.
    ///
    /// Same detector and monitor shape with no events, every log trimmed to its
    /// most recent sample, run metadata carried over and monitor counts reset.
    pub fn successor(&self) -> EventBuffer {
        // Monitor totals restart with the new buffer, so their logs do too
        let counted: BTreeSet<String> = self.monitor_counts.keys().map(|id| monitor_counts_log(*id)).collect();
        EventBuffer {
            detectors: self.detectors.clone(),
            events: vec![Vec::new(); self.events.len()],
            logs: self
                .logs
                .iter()
                .filter(|(name, _)| !counted.contains(name.as_str()))
                .map(|(name, log)| (name.clone(), log.latest_only()))
                .collect(),
            run: self.run,
            monitor_counts: BTreeMap::new(),
            monitors: self.monitors.as_ref().map(|m| Box::new(m.successor())),
            initialized: self.initialized,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn initialized_buffer() -> EventBuffer {
        let mut buffer = EventBuffer::with_baseline_logs();
        buffer.initialize(DetectorIndexMap::from_ids(1..=4), DetectorIndexMap::from_ids([-1, -2]));
        buffer
    }

    #[test]
    fn baseline_logs_are_declared() {
        let buffer = EventBuffer::with_baseline_logs();
        assert!(buffer.has_log(PROTON_CHARGE_LOG));
        assert!(buffer.has_log(PAUSE_LOG));
        assert!(buffer.has_log(SCAN_INDEX_LOG));
        assert!(!buffer.is_initialized());
    }

    #[test]
    fn events_land_in_their_slot() {
        let mut buffer = initialized_buffer();
        let pulse = Timestamp::new(10, 0);
        assert!(buffer.add_event(2, 1.5, pulse));
        assert!(buffer.add_event(2, 2.5, pulse));
        assert!(!buffer.add_event(99, 1.0, pulse));

        assert_eq!(buffer.total_events(), 2);
        assert_eq!(buffer.events_for_pixel(2).len(), 2);
        assert_eq!(buffer.events_in_slot(0).len(), 0);
    }

    #[test]
    fn monitor_events_use_negative_ids() {
        let mut buffer = initialized_buffer();
        assert!(buffer.add_monitor_event(2, 3.0, Timestamp::ZERO));
        assert!(!buffer.add_monitor_event(3, 3.0, Timestamp::ZERO));

        let monitors = buffer.monitor_buffer().expect("monitor buffer exists");
        assert_eq!(monitors.total_events(), 1);
        assert_eq!(buffer.total_events(), 0);
    }

    #[test]
    fn redeclaring_a_log_is_a_no_op() {
        let mut buffer = EventBuffer::new();
        assert!(buffer.declare_log("motor", LogValueType::Double, Some("mm")));
        buffer.append_log("motor", Timestamp::ZERO, LogValue::Double(1.0));
        assert!(!buffer.declare_log("motor", LogValueType::String, None));

        let log = buffer.log("motor").expect("declared");
        assert_eq!(log.value_type(), LogValueType::Double);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn initialize_is_idempotent() {
        let mut buffer = initialized_buffer();
        buffer.add_event(1, 1.0, Timestamp::ZERO);
        buffer.initialize(DetectorIndexMap::from_ids(1..=100), DetectorIndexMap::new());
        assert_eq!(buffer.detector_count(), 4);
        assert_eq!(buffer.total_events(), 1);
    }

    #[test]
    fn successor_keeps_shape_and_latest_log_values() {
        let mut buffer = initialized_buffer();
        buffer.set_run_metadata(42, Timestamp::new(5, 0));
        buffer.add_event(1, 1.0, Timestamp::ZERO);
        buffer.add_monitor_event(1, 1.0, Timestamp::ZERO);
        buffer.add_monitor_counts(1, 7, Timestamp::new(1, 0));
        assert_eq!(buffer.log("monitor1_counts").and_then(TimeSeriesLog::last_value), Some(&LogValue::Int(7)));
        buffer.append_log(PAUSE_LOG, Timestamp::new(1, 0), LogValue::Int(1));
        buffer.append_log(PAUSE_LOG, Timestamp::new(2, 0), LogValue::Int(0));

        let next = buffer.successor();
        assert!(next.is_initialized());
        assert_eq!(next.detector_count(), 4);
        assert_eq!(next.total_events(), 0);
        assert_eq!(next.monitor_buffer().map(EventBuffer::total_events), Some(0));
        assert!(next.monitor_counts().is_empty());
        assert!(!next.has_log("monitor1_counts"));
        assert_eq!(next.run_metadata().run_number, Some(42));
        assert_eq!(next.log(PAUSE_LOG).map(TimeSeriesLog::len), Some(1));
        assert_eq!(next.log(PAUSE_LOG).and_then(TimeSeriesLog::last_value), Some(&LogValue::Int(0)));
    }
}
