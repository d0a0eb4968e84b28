//! Telemetry for the greeter components
//!
//! This crate includes:
//! - An explicit telemetry pipeline object ([`Telemetry`]) built once by the entry point
//! - A span model whose spans are closed exactly once ([`Tracer`], [`ActiveSpan`])
//! - Pull-based gauge reporting ([`GaugeReporter`])
//! - Process memory sampling and log subscriber setup

pub mod config;
pub mod context;
pub mod error;
pub mod gauge;
pub mod logging;
pub mod process;
pub mod span;

pub use config::TelemetryConfig;
pub use context::{init_telemetry, Telemetry};
pub use error::{Result, SampleFailure, TelemetryError};
pub use gauge::{GaugeObservation, GaugeReporter, Sample};
pub use logging::{init_logging, LogFormat};
pub use process::{register_process_memory_gauges, MemorySnapshot, ProcessMemorySampler};
pub use span::{
    ActiveSpan, InMemorySpanSink, LogSpanSink, OtelSpanSink, SpanContext, SpanOutcome,
    SpanRecord, SpanSink, Tracer,
};
