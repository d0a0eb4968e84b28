//! Span model and span sinks
//!
//! A [`Tracer`] opens [`ActiveSpan`]s. An active span is closed exactly once:
//! either explicitly through [`ActiveSpan::finish`], or by its `Drop` impl
//! with [`SpanOutcome::Unknown`] when the owning call unwinds or is cancelled.
//! Closed spans are handed to a [`SpanSink`].

use opentelemetry::trace::{Span as _, SpanId, SpanKind, Status, TraceId, Tracer as _};
use opentelemetry::KeyValue;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};

/// Outcome code attached to a closed span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpanOutcome {
    Ok,
    Unavailable,
    DeadlineExceeded,
    InvalidArgument,
    Unknown,
}

impl SpanOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpanOutcome::Ok => "OK",
            SpanOutcome::Unavailable => "UNAVAILABLE",
            SpanOutcome::DeadlineExceeded => "DEADLINE_EXCEEDED",
            SpanOutcome::InvalidArgument => "INVALID_ARGUMENT",
            SpanOutcome::Unknown => "UNKNOWN",
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, SpanOutcome::Ok)
    }
}

impl fmt::Display for SpanOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Span context for distributed tracing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpanContext {
    /// Trace ID
    pub trace_id: TraceId,

    /// Span ID
    pub span_id: SpanId,
}

impl SpanContext {
    /// Create a fresh root context with random, non-zero ids
    pub fn new_root() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            trace_id: TraceId::from_bytes(rng.gen_range(1..=u128::MAX).to_be_bytes()),
            span_id: SpanId::from_bytes(rng.gen_range(1..=u64::MAX).to_be_bytes()),
        }
    }

    /// W3C `traceparent` header value for this context (sampled)
    pub fn traceparent(&self) -> String {
        format!("00-{}-{}-01", self.trace_id, self.span_id)
    }
}

/// A span that has been closed
#[derive(Debug, Clone)]
pub struct SpanRecord {
    /// Span context
    pub context: SpanContext,

    /// Operation name
    pub name: String,

    /// Instrumentation scope of the tracer that opened the span
    pub scope: String,

    /// Start time
    pub start_time: SystemTime,

    /// End time
    pub end_time: SystemTime,

    /// Outcome code
    pub outcome: SpanOutcome,

    /// Span attributes
    pub attributes: HashMap<String, String>,
}

impl SpanRecord {
    /// Get span duration
    pub fn duration(&self) -> Duration {
        self.end_time
            .duration_since(self.start_time)
            .unwrap_or_default()
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// Destination for closed spans
pub trait SpanSink: Send + Sync {
    /// Record a closed span
    fn record_span(&self, span: SpanRecord);
}

/// Tracer scoped to one component
#[derive(Clone)]
pub struct Tracer {
    scope: String,
    sink: Arc<dyn SpanSink>,
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer").field("scope", &self.scope).finish()
    }
}

impl Tracer {
    pub fn new(scope: impl Into<String>, sink: Arc<dyn SpanSink>) -> Self {
        Self {
            scope: scope.into(),
            sink,
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Start a new root span
    pub fn start_span(&self, name: impl Into<String>) -> ActiveSpan {
        ActiveSpan {
            context: SpanContext::new_root(),
            name: name.into(),
            scope: self.scope.clone(),
            start_time: SystemTime::now(),
            attributes: HashMap::new(),
            sink: Some(self.sink.clone()),
        }
    }
}

/// An open span owned by the operation it measures
pub struct ActiveSpan {
    context: SpanContext,
    name: String,
    scope: String,
    start_time: SystemTime,
    attributes: HashMap<String, String>,
    sink: Option<Arc<dyn SpanSink>>,
}

impl ActiveSpan {
    pub fn context(&self) -> &SpanContext {
        &self.context
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set an attribute
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// Close the span with the given outcome
    pub fn finish(mut self, outcome: SpanOutcome) {
        self.close(outcome);
    }

    fn close(&mut self, outcome: SpanOutcome) {
        let Some(sink) = self.sink.take() else {
            return;
        };

        sink.record_span(SpanRecord {
            context: self.context,
            name: std::mem::take(&mut self.name),
            scope: std::mem::take(&mut self.scope),
            start_time: self.start_time,
            end_time: SystemTime::now(),
            outcome,
            attributes: std::mem::take(&mut self.attributes),
        });
    }
}

impl Drop for ActiveSpan {
    fn drop(&mut self) {
        self.close(SpanOutcome::Unknown);
    }
}

/// In-memory sink for testing and development
#[derive(Default)]
pub struct InMemorySpanSink {
    spans: RwLock<Vec<SpanRecord>>,
}

impl InMemorySpanSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded spans
    pub fn spans(&self) -> Vec<SpanRecord> {
        self.spans
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Clear all spans
    pub fn clear(&self) {
        self.spans
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

impl SpanSink for InMemorySpanSink {
    fn record_span(&self, span: SpanRecord) {
        self.spans
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(span);
    }
}

/// Writes closed spans to the log when no exporter is configured
#[derive(Debug, Default)]
pub struct LogSpanSink;

impl SpanSink for LogSpanSink {
    fn record_span(&self, span: SpanRecord) {
        tracing::debug!(
            trace_id = %span.context.trace_id,
            span_id = %span.context.span_id,
            scope = %span.scope,
            outcome = %span.outcome,
            duration_ms = span.duration().as_millis() as u64,
            "span closed: {}",
            span.name
        );
    }
}

/// Attribute carrying the span outcome on exported spans
pub const OUTCOME_ATTRIBUTE: &str = "greeter.outcome";

/// Forwards closed spans to an OpenTelemetry SDK tracer
pub struct OtelSpanSink {
    tracer: opentelemetry_sdk::trace::Tracer,
}

impl OtelSpanSink {
    pub fn new(tracer: opentelemetry_sdk::trace::Tracer) -> Self {
        Self { tracer }
    }
}

impl SpanSink for OtelSpanSink {
    fn record_span(&self, span: SpanRecord) {
        let mut attributes: Vec<KeyValue> = span
            .attributes
            .into_iter()
            .map(|(key, value)| KeyValue::new(key, value))
            .collect();
        attributes.push(KeyValue::new(OUTCOME_ATTRIBUTE, span.outcome.as_str()));

        let mut otel_span = self
            .tracer
            .span_builder(span.name)
            .with_kind(SpanKind::Client)
            .with_trace_id(span.context.trace_id)
            .with_span_id(span.context.span_id)
            .with_start_time(span.start_time)
            .with_attributes(attributes)
            .start(&self.tracer);

        match span.outcome {
            SpanOutcome::Ok => otel_span.set_status(Status::Ok),
            failed => otel_span.set_status(Status::error(failed.as_str())),
        }
        otel_span.end_with_timestamp(span.end_time);
    }
}
