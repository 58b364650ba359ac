//! Run lifecycle as reported to the consumer

use serde::{Deserialize, Serialize};
use std::fmt;

/// Run state reported by [`LiveListener::run_status`](crate::LiveListener::run_status).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RunStatus {
    /// No run in progress
    #[default]
    NoRun,
    /// A run has started since the last status call
    BeginRun,
    /// A run is in progress
    Running,
    /// The run ended since the last status call
    EndRun,
}

impl RunStatus {
    /// Whether this status marks a run boundary the consumer must act on.
    pub fn is_boundary(self) -> bool {
        matches!(self, RunStatus::BeginRun | RunStatus::EndRun)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStatus::NoRun => "NoRun",
            RunStatus::BeginRun => "BeginRun",
            RunStatus::Running => "Running",
            RunStatus::EndRun => "EndRun",
        };
        f.write_str(name)
    }
}
