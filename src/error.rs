//! Error types for the live listener.
//!
//! All errors implement the `std::error::Error` trait and carry structured
//! context for debugging and recovery guidance.
//!
//! ## Error Categories
//!
//! - **Connection Errors**: the stream service could not be reached
//! - **Framing Errors**: the byte stream no longer lines up with packet boundaries
//! - **Parse Errors**: a packet payload is internally inconsistent
//! - **Not Ready**: the buffer is not initialized yet or the start filter is still active
//! - **Disconnected**: the background reader stopped and the listener is unusable
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use adara_listener::ListenerError;
//!
//! let error = ListenerError::not_ready("waiting for geometry");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::time::Duration;
use thiserror::Error;

/// Result type alias for listener operations.
pub type Result<T, E = ListenerError> = std::result::Result<T, E>;

/// Main error type for listener operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ListenerError {
    #[error("Failed to connect to {address}: {reason}")]
    Connection {
        address: String,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Packet framing error (type {packet_type:?}): {details}")]
    Framing { packet_type: Option<u32>, details: String },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },

    #[error("Listener not ready: {reason}")]
    NotReady { reason: String },

    #[error("Listener disconnected: {reason}")]
    Disconnected { reason: String },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Instrument '{instrument}' could not be loaded: {details}")]
    Instrument { instrument: String, details: String },

    #[error("Invalid configuration: {details}")]
    Config { details: String },

    #[error("I/O error during {operation}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid listener state: {details}")]
    InvalidState { details: String },

    #[error("Background reader did not stop within {duration:?}")]
    ShutdownTimeout { duration: Duration },

    #[error("Background reader failed: {details}")]
    BackgroundTask { details: String },
}

impl ListenerError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            ListenerError::Connection { .. } => true,
            ListenerError::NotReady { .. } => true,
            ListenerError::Timeout { .. } => true,
            ListenerError::Framing { .. } => false,
            ListenerError::Parse { .. } => false,
            ListenerError::Disconnected { .. } => false,
            ListenerError::Instrument { .. } => false,
            ListenerError::Config { .. } => false,
            ListenerError::Io { .. } => false,
            ListenerError::InvalidState { .. } => false,
            ListenerError::ShutdownTimeout { .. } => false,
            ListenerError::BackgroundTask { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            ListenerError::Connection { .. } => vec![
                "Check that the stream management service is running",
                "Verify the host name and port",
                "Retry the connection from the caller",
            ],
            ListenerError::Framing { .. } => vec![
                "Verify the server speaks a compatible ADARA protocol version",
                "Reconnect to resynchronize the packet stream",
            ],
            ListenerError::Parse { .. } => vec![
                "Check data format compatibility",
                "Verify source data integrity",
                "Reconnect to resynchronize the packet stream",
            ],
            ListenerError::NotReady { .. } => vec![
                "Call extract_data again after a short delay",
                "Check that geometry and beamline info are being published",
            ],
            ListenerError::Disconnected { .. } => vec![
                "Create a new listener and connect again",
                "Inspect the logs for the background failure",
            ],
            ListenerError::Timeout { .. } => vec![
                "Increase timeout duration",
                "Check network latency to the stream service",
            ],
            ListenerError::Instrument { .. } => vec![
                "Check the instrument definition published by the server",
                "Verify the instrument loader supports this beamline",
            ],
            ListenerError::Config { .. } => vec![
                "Check configuration values are positive durations",
                "Compare the configuration file against the documented defaults",
            ],
            ListenerError::Io { .. } => vec![
                "Check network connectivity",
                "Verify the remote service is still running",
            ],
            ListenerError::InvalidState { .. } => vec![
                "Call connect before start",
                "Call start before extracting data",
            ],
            ListenerError::ShutdownTimeout { .. } => vec![
                "Report the hang with the listener logs attached",
                "Restart the process hosting the listener",
            ],
            ListenerError::BackgroundTask { .. } => vec![
                "Inspect the logs for the failing packet",
                "Create a new listener and connect again",
            ],
        }
    }

    /// Helper constructor for connection errors.
    pub fn connection_failed(address: impl Into<String>, reason: impl Into<String>) -> Self {
        ListenerError::Connection { address: address.into(), reason: reason.into(), source: None }
    }

    /// Helper constructor for connection errors with source.
    pub fn connection_failed_with_source(
        address: impl Into<String>,
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        ListenerError::Connection {
            address: address.into(),
            reason: reason.into(),
            source: Some(source),
        }
    }

    /// Helper constructor for background task failures.
    pub fn background_task(details: impl Into<String>) -> Self {
        ListenerError::BackgroundTask { details: details.into() }
    }

    /// Helper constructor for framing errors.
    pub fn framing(packet_type: Option<u32>, details: impl Into<String>) -> Self {
        ListenerError::Framing { packet_type, details: details.into() }
    }

    /// Helper constructor for payload parse errors.
    pub fn parse(context: impl Into<String>, details: impl Into<String>) -> Self {
        ListenerError::Parse { context: context.into(), details: details.into() }
    }

    /// Helper constructor for retryable not-ready conditions.
    pub fn not_ready(reason: impl Into<String>) -> Self {
        ListenerError::NotReady { reason: reason.into() }
    }

    /// Helper constructor for disconnection errors.
    pub fn disconnected(reason: impl Into<String>) -> Self {
        ListenerError::Disconnected { reason: reason.into() }
    }

    /// Helper constructor for I/O errors with operation context.
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        ListenerError::Io { operation: operation.into(), source }
    }

    /// Helper constructor for instrument loading errors.
    pub fn instrument(instrument: impl Into<String>, details: impl Into<String>) -> Self {
        ListenerError::Instrument { instrument: instrument.into(), details: details.into() }
    }

    /// Helper constructor for invalid configuration.
    pub fn config(details: impl Into<String>) -> Self {
        ListenerError::Config { details: details.into() }
    }

    /// Helper constructor for calls made in the wrong order.
    pub fn invalid_state(details: impl Into<String>) -> Self {
        ListenerError::InvalidState { details: details.into() }
    }
}

impl From<std::io::Error> for ListenerError {
    fn from(err: std::io::Error) -> Self {
        ListenerError::Io { operation: "<unknown>".to_string(), source: err }
    }
}
