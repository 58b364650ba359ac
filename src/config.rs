//! Listener configuration.
//!
//! Values are read once when a [`LiveListener`](crate::LiveListener) is
//! constructed. Configuration can be built in code, loaded from YAML, and the
//! `keep paused events` flag can be overridden from the environment.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::{ListenerError, Result};

/// Environment variable overriding [`ListenerConfig::keep_paused_events`].
pub const KEEP_PAUSED_EVENTS_ENV: &str = "ADARA_KEEP_PAUSED_EVENTS";

/// Tunables for the live listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Keep neutron events that arrive while the run is paused
    pub keep_paused_events: bool,
    /// Upper bound on establishing the TCP connection
    pub connect_timeout_ms: u64,
    /// Receive timeout for a single socket read
    pub receive_timeout_ms: u64,
    /// Sleep after a loop iteration that decoded no packets
    pub idle_sleep_ms: u64,
    /// Sleep while reads are paused at a run boundary
    pub pause_poll_ms: u64,
    /// Total time `extract_data` waits for the buffer to be initialized
    pub extract_wait_ms: u64,
    /// Poll interval inside the `extract_data` wait
    pub extract_poll_ms: u64,
    /// Bound on joining the background task during shutdown
    pub join_timeout_ms: u64,
    /// Size of a single socket read
    pub read_chunk_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            keep_paused_events: false,
            connect_timeout_ms: 5_000,
            receive_timeout_ms: 30_000,
            idle_sleep_ms: 10,
            pause_poll_ms: 10,
            extract_wait_ms: 10_000,
            extract_poll_ms: 100,
            join_timeout_ms: 35_000,
            read_chunk_size: 64 * 1024,
        }
    }
}

impl ListenerConfig {
    /// Parse configuration from a YAML document.
    ///
    /// Missing keys take their default value.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ListenerConfig = serde_yaml_ng::from_str(yaml)
            .map_err(|e| ListenerError::config(format!("Failed to parse YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(value) = std::env::var(KEEP_PAUSED_EVENTS_ENV) {
            match parse_flag(&value) {
                Some(flag) => {
                    debug!(flag, "keep_paused_events overridden from environment");
                    self.keep_paused_events = flag;
                }
                None => debug!(value = %value, "Ignoring unrecognised {}", KEEP_PAUSED_EVENTS_ENV),
            }
        }
        self
    }

    /// Validate that every interval is usable.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("receive_timeout_ms", self.receive_timeout_ms),
            ("idle_sleep_ms", self.idle_sleep_ms),
            ("pause_poll_ms", self.pause_poll_ms),
            ("extract_poll_ms", self.extract_poll_ms),
            ("join_timeout_ms", self.join_timeout_ms),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(ListenerError::config(format!("{} must be greater than zero", name)));
            }
        }
        if self.read_chunk_size == 0 {
            return Err(ListenerError::config("read_chunk_size must be greater than zero"));
        }
        if self.join_timeout_ms < self.receive_timeout_ms {
            return Err(ListenerError::config(format!(
                "join_timeout_ms ({}) must not be shorter than receive_timeout_ms ({})",
                self.join_timeout_ms, self.receive_timeout_ms
            )));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    pub fn idle_sleep(&self) -> Duration {
        Duration::from_millis(self.idle_sleep_ms)
    }

    pub fn pause_poll(&self) -> Duration {
        Duration::from_millis(self.pause_poll_ms)
    }

    pub fn extract_wait(&self) -> Duration {
        Duration::from_millis(self.extract_wait_ms)
    }

    pub fn extract_poll(&self) -> Duration {
        Duration::from_millis(self.extract_poll_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
