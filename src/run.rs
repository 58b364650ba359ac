//! Run transition state machine
//!
//! Run status packets move the tracker into `BeginRun` or `EndRun`; the
//! consumer's next [`LiveListener::run_status`](crate::LiveListener::run_status)
//! call observes the boundary and advances it to `Running` or `NoRun`. While a
//! boundary is waiting to be observed the background reader is paused so data
//! from two runs never lands in the same buffer.

use tracing::{debug, info};

use crate::{RunStatus, Timestamp};

/// Run number and start time announced by a run status packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunDetails {
    pub run_number: u32,
    pub run_start: Timestamp,
}

/// Result of advancing the tracker from a consumer poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunTransition {
    /// Status before the call; what the consumer is told
    pub previous: RunStatus,
    /// Status after the call
    pub current: RunStatus,
    /// Details deferred at the new-run packet, released on `BeginRun`
    pub details: Option<RunDetails>,
}

#[derive(Debug, Clone, Default)]
pub struct RunTracker {
    status: RunStatus,
    pause_reads: bool,
    deferred: Option<RunDetails>,
}

impl RunTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// Whether the background reader must hold off consuming packets.
    pub fn reads_paused(&self) -> bool {
        self.pause_reads
    }

    /// A new run started.
    ///
    /// With an initialized buffer the boundary is reported as `BeginRun` and
    /// reads pause until the consumer observes it. Without one, pausing would
    /// hold back the geometry and metadata packets initialization still
    /// needs, so the run goes straight to `Running`.
    pub fn new_run(&mut self, buffer_initialized: bool) {
        if buffer_initialized {
            self.status = RunStatus::BeginRun;
            self.pause_reads = true;
            info!("New run started, pausing reads until the boundary is observed");
        } else {
            self.status = RunStatus::Running;
            info!("New run started before initialization, continuing without pause");
        }
    }

    /// The current run ended; reads pause until the consumer observes it.
    pub fn end_run(&mut self) {
        self.status = RunStatus::EndRun;
        self.pause_reads = true;
        info!("Run ended, pausing reads until the boundary is observed");
    }

    /// Hold run details until the `BeginRun` boundary is observed.
    pub fn defer_details(&mut self, details: RunDetails) {
        debug!(run_number = details.run_number, "Deferring run details until run boundary");
        self.deferred = Some(details);
    }

    /// Advance past an observed boundary and re-open reads.
    pub fn advance(&mut self) -> RunTransition {
        let previous = self.status;
        let mut details = None;
        match previous {
            RunStatus::BeginRun => {
                self.status = RunStatus::Running;
                details = self.deferred.take();
            }
            RunStatus::EndRun => self.status = RunStatus::NoRun,
            RunStatus::NoRun | RunStatus::Running => {}
        }
        self.pause_reads = false;
        RunTransition { previous, current: self.status, details }
    }
}
