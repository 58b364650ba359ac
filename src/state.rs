//! Shared listener state
//!
//! Everything the background reader and the foreground API both touch lives
//! in one [`ListenerState`] behind a single mutex. Packet handlers (see
//! `handlers.rs`) run with the lock held for one packet at a time; the
//! foreground holds it only for swaps and run transitions.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{error, info};

use crate::buffer::EventBuffer;
use crate::instrument::InstrumentLoader;
use crate::registry::VariableRegistry;
use crate::replay::{ReplayCache, StartFilter};
use crate::run::RunTracker;
use crate::{ListenerError, Result, RunStatus, Timestamp};

pub(crate) struct ListenerState {
    pub(crate) buffer: EventBuffer,
    pub(crate) registry: VariableRegistry,
    pub(crate) replay: ReplayCache,
    pub(crate) filter: StartFilter,
    pub(crate) run: RunTracker,
    pub(crate) instrument_name: Option<String>,
    pub(crate) geometry_xml: Option<String>,
    pub(crate) required_logs: BTreeSet<String>,
    /// Pulse id of the most recent RTDL packet
    pub(crate) rtdl_pulse_id: Option<u64>,
    pub(crate) run_paused: bool,
    pub(crate) keep_paused_events: bool,
    pub(crate) started: bool,
    pub(crate) connected: bool,
    deferred_error: Option<ListenerError>,
    failure_reason: Option<String>,
    loader: Arc<dyn InstrumentLoader>,
}

impl ListenerState {
    pub(crate) fn new(keep_paused_events: bool, loader: Arc<dyn InstrumentLoader>) -> Self {
        Self {
            buffer: EventBuffer::with_baseline_logs(),
            registry: VariableRegistry::new(),
            replay: ReplayCache::new(),
            filter: StartFilter::inactive(),
            run: RunTracker::new(),
            instrument_name: None,
            geometry_xml: None,
            required_logs: BTreeSet::new(),
            rtdl_pulse_id: None,
            run_paused: false,
            keep_paused_events,
            started: false,
            connected: false,
            deferred_error: None,
            failure_reason: None,
            loader,
        }
    }

    /// Arm the start filter for a new streaming session.
    pub(crate) fn begin_streaming(&mut self, start_time: Timestamp) {
        self.filter = StartFilter::new(start_time);
        self.replay.clear();
        self.started = true;
        info!(%start_time, filter = ?self.filter.mode(), "Streaming requested");
    }

    /// Store a background failure for the next foreground call.
    pub(crate) fn record_background_failure(&mut self, err: ListenerError) {
        error!(error = %err, "Background reader failed, listener disconnected");
        self.connected = false;
        self.failure_reason = Some(err.to_string());
        self.deferred_error = Some(err);
    }

    /// Mark the listener as shut down by its owner.
    pub(crate) fn mark_stopped(&mut self) {
        self.connected = false;
        if self.failure_reason.is_none() {
            self.failure_reason = Some("listener stopped".to_string());
        }
    }

    /// Surface a background failure: the original error once, then `Disconnected`.
    pub(crate) fn check_background(&mut self) -> Result<()> {
        if let Some(err) = self.deferred_error.take() {
            return Err(err);
        }
        match &self.failure_reason {
            Some(reason) => Err(ListenerError::disconnected(reason.clone())),
            None => Ok(()),
        }
    }

    /// Whether name, geometry and every required log are available.
    pub(crate) fn ready_to_initialize(&self) -> bool {
        if self.instrument_name.is_none() || self.geometry_xml.is_none() {
            return false;
        }
        self.required_logs
            .iter()
            .all(|name| self.buffer.log(name).is_some_and(|log| !log.is_empty()))
    }

    /// Initialize the buffer from the instrument layout once everything it needs arrived.
    ///
    /// Returns whether initialization happened on this call. Loader failures are fatal.
    pub(crate) fn initialize_if_ready(&mut self) -> Result<bool> {
        if self.buffer.is_initialized() || !self.ready_to_initialize() {
            return Ok(false);
        }
        let (Some(name), Some(xml)) = (self.instrument_name.as_deref(), self.geometry_xml.as_deref()) else {
            return Ok(false);
        };

        let layout = self.loader.load(name, xml)?;
        let detectors = layout.detector_map();
        let monitors = layout.monitor_map();
        info!(
            instrument = name,
            detectors = detectors.len(),
            monitors = monitors.len(),
            "Event buffer initialized"
        );
        self.buffer.initialize(detectors, monitors);
        Ok(true)
    }

    /// Detach the live buffer, leaving its successor in place.
    pub(crate) fn try_extract(&mut self) -> Result<EventBuffer> {
        self.check_background()?;
        if !self.buffer.is_initialized() {
            return Err(ListenerError::not_ready(
                "event buffer not initialized; waiting for geometry, beamline info and required logs",
            ));
        }
        if self.filter.is_active() {
            return Err(ListenerError::not_ready("still discarding data before the requested start"));
        }

        let successor = self.buffer.successor();
        Ok(std::mem::replace(&mut self.buffer, successor))
    }

    /// Report the run status and perform run-boundary side effects.
    ///
    /// Returns the status from before any transition.
    pub(crate) fn advance_run_status(&mut self) -> Result<RunStatus> {
        self.check_background()?;

        let transition = self.run.advance();
        if transition.previous.is_boundary() {
            self.instrument_name = None;
            self.geometry_xml = None;
            self.required_logs.clear();
            self.registry.clear();
            self.buffer = EventBuffer::with_baseline_logs();
            if let Some(details) = transition.details {
                self.buffer.set_run_metadata(details.run_number, details.run_start);
            }
            info!(
                previous = %transition.previous,
                current = %transition.current,
                run_number = ?self.buffer.run_metadata().run_number,
                "Run boundary observed, buffer reset"
            );
        }

        Ok(transition.previous)
    }
}
