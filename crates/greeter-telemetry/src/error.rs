//! Telemetry error types

use thiserror::Error;

/// Errors raised while building or tearing down the telemetry pipeline
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// Trace pipeline could not be built
    #[error("Trace pipeline error: {0}")]
    Trace(String),

    /// Metrics pipeline could not be built
    #[error("Metrics pipeline error: {0}")]
    Metrics(String),

    /// Prometheus registry or encoder failure
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    /// Log subscriber could not be installed
    #[error("Logging error: {0}")]
    Logging(String),

    /// Flush or shutdown failed
    #[error("Shutdown error: {0}")]
    Shutdown(String),
}

/// A gauge sampling function failed to produce a value.
///
/// The observation for that collection is dropped; the reporter keeps going.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Sample failed: {0}")]
pub struct SampleFailure(pub String);

impl SampleFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Result type for telemetry operations
pub type Result<T> = std::result::Result<T, TelemetryError>;
