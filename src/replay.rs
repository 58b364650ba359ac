//! Historical start filter and variable replay cache
//!
//! When a consumer asks for data from a point in the past, the server replays
//! its history and the listener discards packets until the requested start is
//! reached. Process variables change rarely, so their last value before the
//! start is still the current value afterwards: those packets are withheld in
//! a [`ReplayCache`] (latest value per variable) and replayed once the
//! [`StartFilter`] opens.

use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::Timestamp;
use crate::protocol::{PacketHeader, RunStatusCode, VariableValuePacket};

/// What the filter is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    /// Nothing is filtered
    Inactive,
    /// Discard packets stamped before the given time
    UntilTime(Timestamp),
    /// Discard everything until the next run starts
    UntilRunStart,
}

/// Outcome of asking the filter about one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    /// Drop (or withhold) the packet
    Ignore,
    /// Process the packet normally
    Pass,
    /// This packet opened the filter; process it after replaying the cache
    Opened,
}

/// Monotonic start gate: once open it stays open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartFilter {
    mode: FilterMode,
}

impl Default for StartFilter {
    fn default() -> Self {
        Self::inactive()
    }
}

impl StartFilter {
    /// Filter for a requested start time.
    ///
    /// [`Timestamp::ZERO`] requests live data only and arms nothing;
    /// [`Timestamp::START_OF_RUN`] waits for the next new-run status packet.
    pub fn new(start: Timestamp) -> Self {
        let mode = if start == Timestamp::ZERO {
            FilterMode::Inactive
        } else if start == Timestamp::START_OF_RUN {
            FilterMode::UntilRunStart
        } else {
            FilterMode::UntilTime(start)
        };
        Self { mode }
    }

    pub fn inactive() -> Self {
        Self { mode: FilterMode::Inactive }
    }

    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    pub fn is_active(&self) -> bool {
        self.mode != FilterMode::Inactive
    }

    pub fn filter_until_run_start(&self) -> bool {
        self.mode == FilterMode::UntilRunStart
    }

    /// Decide whether a packet stamped `timestamp` (carrying `status` if it is a
    /// run status packet) is discarded.
    pub fn check(&mut self, timestamp: Timestamp, status: Option<RunStatusCode>) -> FilterDecision {
        let opens = match self.mode {
            FilterMode::Inactive => return FilterDecision::Pass,
            FilterMode::UntilRunStart => status == Some(RunStatusCode::NewRun),
            FilterMode::UntilTime(start) => timestamp >= start,
        };

        if opens {
            info!(mode = ?self.mode, %timestamp, "Start condition reached, filtering disabled");
            self.mode = FilterMode::Inactive;
            FilterDecision::Opened
        } else {
            FilterDecision::Ignore
        }
    }
}

/// A withheld variable-value packet.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedVariable {
    pub header: PacketHeader,
    pub packet: VariableValuePacket,
}

/// Latest withheld value per `(device id, variable id)`.
///
/// Holds at most one entry per variable key, so its size is bounded by the
/// number of process variables the server publishes.
#[derive(Debug, Clone, Default)]
pub struct ReplayCache {
    entries: BTreeMap<(u32, u32), CachedVariable>,
}

impl ReplayCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Withhold `packet`, replacing any earlier value for the same variable.
    pub fn stash(&mut self, header: PacketHeader, packet: VariableValuePacket) {
        let key = packet.key();
        let replaced = self.entries.insert(key, CachedVariable { header, packet }).is_some();
        debug!(device_id = key.0, variable_id = key.1, replaced, "Withheld variable value for replay");
    }

    pub fn get(&self, device_id: u32, variable_id: u32) -> Option<&CachedVariable> {
        self.entries.get(&(device_id, variable_id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove and return every entry in key order.
    pub fn take_all(&mut self) -> Vec<CachedVariable> {
        std::mem::take(&mut self.entries).into_values().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
