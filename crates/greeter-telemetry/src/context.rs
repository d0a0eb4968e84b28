//! OpenTelemetry pipeline lifecycle
//!
//! [`init_telemetry`] builds the span and metric pipelines once, at process
//! start. The returned [`Telemetry`] is passed explicitly to every component
//! that emits data and is shut down once, at process exit. Nothing here is
//! installed as global state.

use crate::config::TelemetryConfig;
use crate::error::{Result, TelemetryError};
use crate::span::{LogSpanSink, OtelSpanSink, SpanSink, Tracer};
use opentelemetry::metrics::{Meter, MeterProvider as _};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::trace::TracerProvider;
use opentelemetry_sdk::{runtime, Resource};
use opentelemetry_semantic_conventions::resource::{SERVICE_NAME, SERVICE_VERSION};
use prometheus::{Encoder, TextEncoder};
use std::fmt;
use std::sync::Arc;

/// Initialized telemetry pipeline
pub struct Telemetry {
    config: TelemetryConfig,

    /// Tracer provider (present when spans are exported over OTLP)
    tracer_provider: Option<TracerProvider>,

    /// Meter provider (present when metrics are enabled)
    meter_provider: Option<SdkMeterProvider>,

    /// Registry read by the Prometheus exporter
    prometheus_registry: Option<prometheus::Registry>,

    /// Replaces span export, used by tests
    span_sink: Option<Arc<dyn SpanSink>>,
}

impl fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Telemetry")
            .field("service_name", &self.config.service_name)
            .field("tracing", &self.tracer_provider.is_some())
            .field("metrics", &self.meter_provider.is_some())
            .field("custom_sink", &self.span_sink.is_some())
            .finish()
    }
}

impl Telemetry {
    /// Telemetry with no exporters; spans go to the log, meters are absent
    pub fn disabled() -> Self {
        Self {
            config: TelemetryConfig {
                metrics: false,
                tracing: false,
                ..TelemetryConfig::for_service("greeter", env!("CARGO_PKG_VERSION"))
            },
            tracer_provider: None,
            meter_provider: None,
            prometheus_registry: None,
            span_sink: None,
        }
    }

    /// Route every span to `sink` instead of the configured exporter
    pub fn with_span_sink(mut self, sink: Arc<dyn SpanSink>) -> Self {
        self.span_sink = Some(sink);
        self
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    /// Get a tracer for the given instrumentation scope
    pub fn tracer(&self, scope: &str) -> Tracer {
        let sink: Arc<dyn SpanSink> = match (&self.span_sink, &self.tracer_provider) {
            (Some(sink), _) => sink.clone(),
            (None, Some(provider)) => Arc::new(OtelSpanSink::new(provider.tracer(scope.to_string()))),
            (None, None) => Arc::new(LogSpanSink),
        };
        Tracer::new(scope, sink)
    }

    /// Get a meter for recording metrics, if metrics are enabled
    pub fn meter(&self, scope: &'static str) -> Option<Meter> {
        self.meter_provider
            .as_ref()
            .map(|provider| provider.meter(scope))
    }

    /// Get Prometheus metrics in text format.
    ///
    /// Each call is a collection: observable gauge callbacks run here.
    pub fn render_metrics(&self) -> Result<String> {
        let Some(registry) = &self.prometheus_registry else {
            return Ok("# Metrics disabled\n".to_string());
        };

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }

    /// Flush and shut down every pipeline (call on application exit)
    pub fn shutdown(self) -> Result<()> {
        let mut failures = Vec::new();

        if let Some(provider) = self.tracer_provider {
            if let Err(e) = provider.shutdown() {
                failures.push(format!("tracer provider: {}", e));
            }
        }

        if let Some(provider) = self.meter_provider {
            if let Err(e) = provider.shutdown() {
                failures.push(format!("meter provider: {}", e));
            }
        }

        if failures.is_empty() {
            tracing::info!("Telemetry shut down");
            Ok(())
        } else {
            Err(TelemetryError::Shutdown(failures.join("; ")))
        }
    }
}

/// Initialize the telemetry pipeline with the given configuration.
///
/// An OTLP endpoint requires a running Tokio runtime; the Prometheus reader
/// does not.
pub fn init_telemetry(config: TelemetryConfig) -> Result<Telemetry> {
    // Create resource with service information
    let resource = Resource::new(vec![
        KeyValue::new(SERVICE_NAME, config.service_name.clone()),
        KeyValue::new(SERVICE_VERSION, config.service_version.clone()),
    ]);

    let tracer_provider = match (&config.otlp_endpoint, config.tracing) {
        (Some(endpoint), true) => {
            tracing::info!(endpoint = %endpoint, "Initializing OTLP span exporter");

            let exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint.clone())
                .build()
                .map_err(|e| TelemetryError::Trace(e.to_string()))?;

            Some(
                TracerProvider::builder()
                    .with_batch_exporter(exporter, runtime::Tokio)
                    .with_resource(resource.clone())
                    .build(),
            )
        }
        (None, true) => {
            tracing::warn!("OTLP endpoint not configured, spans will only be logged");
            None
        }
        (_, false) => None,
    };

    let (meter_provider, prometheus_registry) = if config.metrics {
        let registry = prometheus::Registry::new();
        let prometheus_exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;

        let mut builder = SdkMeterProvider::builder()
            .with_reader(prometheus_exporter)
            .with_resource(resource);

        if let Some(endpoint) = &config.otlp_endpoint {
            let exporter = opentelemetry_otlp::MetricExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint.clone())
                .build()
                .map_err(|e| TelemetryError::Metrics(e.to_string()))?;

            let reader = PeriodicReader::builder(exporter, runtime::Tokio)
                .with_interval(config.metrics_interval)
                .build();
            builder = builder.with_reader(reader);
        }

        tracing::info!("Prometheus metrics reader initialized");
        (Some(builder.build()), Some(registry))
    } else {
        (None, None)
    };

    tracing::info!(
        service_name = %config.service_name,
        metrics_enabled = config.metrics,
        spans_exported = tracer_provider.is_some(),
        "OpenTelemetry initialized"
    );

    Ok(Telemetry {
        config,
        tracer_provider,
        meter_provider,
        prometheus_registry,
        span_sink: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gauge::{GaugeReporter, Sample};
    use crate::span::{InMemorySpanSink, SpanOutcome};

    #[test]
    fn test_init_metrics_only() {
        let config = TelemetryConfig {
            tracing: false,
            ..TelemetryConfig::for_service("test-metrics", "0.0.0")
        };

        let telemetry = init_telemetry(config).expect("Failed to initialize");
        assert!(telemetry.meter("test").is_some());

        let metrics = telemetry.render_metrics().expect("Failed to get metrics");
        assert!(!metrics.contains("Metrics disabled"));

        telemetry.shutdown().expect("Failed to shutdown");
    }

    #[test]
    fn test_disabled_telemetry() {
        let telemetry = Telemetry::disabled();
        assert!(telemetry.meter("test").is_none());
        assert_eq!(telemetry.render_metrics().unwrap(), "# Metrics disabled\n");
        telemetry.shutdown().expect("Failed to shutdown");
    }

    #[test]
    fn test_span_sink_override() {
        let sink = Arc::new(InMemorySpanSink::new());
        let telemetry = Telemetry::disabled().with_span_sink(sink.clone());

        let tracer = telemetry.tracer("test.scope");
        assert_eq!(tracer.scope(), "test.scope");
        tracer.start_span("op").finish(SpanOutcome::Ok);

        assert_eq!(sink.spans().len(), 1);
        assert_eq!(sink.spans()[0].scope, "test.scope");
    }

    #[test]
    fn test_gauge_exported_through_prometheus() {
        let config = TelemetryConfig::for_service("test-gauges", "0.0.0");
        let telemetry = init_telemetry(config).expect("Failed to initialize");

        let reporter = GaugeReporter::new(&telemetry, "greeter.test");
        reporter.register_gauge("test_constant_gauge", "byte", "Always 42", || {
            Ok(Sample::new(42.0))
        });

        for _ in 0..2 {
            let metrics = telemetry.render_metrics().expect("Failed to get metrics");
            let line = metrics
                .lines()
                .find(|line| line.starts_with("test_constant_gauge_bytes"))
                .expect("gauge line carries its unit");
            assert!(line.ends_with(" 42"), "unexpected line: {}", line);
        }

        telemetry.shutdown().expect("Failed to shutdown");
    }
}
