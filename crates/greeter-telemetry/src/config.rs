//! Telemetry pipeline settings

use std::time::Duration;

/// Which pipelines [`crate::init_telemetry`] builds and where they export.
///
/// Entry points usually derive this from their own configuration and adjust
/// individual fields with struct update syntax.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryConfig {
    /// Reported as `service.name` on every span and metric
    pub service_name: String,

    /// Reported as `service.version`
    pub service_version: String,

    /// Build the meter provider (Prometheus reader, plus OTLP with an endpoint)
    pub metrics: bool,

    /// Export spans over OTLP; ignored without an endpoint
    pub tracing: bool,

    /// OTLP/gRPC collector, e.g. `http://localhost:4317`
    pub otlp_endpoint: Option<String>,

    /// Push interval of the OTLP metric reader
    pub metrics_interval: Duration,
}

impl TelemetryConfig {
    /// Metrics and tracing on, no collector
    pub fn for_service(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            service_name: name.into(),
            service_version: version.into(),
            metrics: true,
            tracing: true,
            otlp_endpoint: None,
            metrics_interval: Duration::from_secs(60),
        }
    }

    /// Whether closed spans leave the process
    pub fn exports_spans(&self) -> bool {
        self.tracing && self.otlp_endpoint.is_some()
    }
}
