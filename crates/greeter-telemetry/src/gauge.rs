//! Gauge registration and pull-based collection
//!
//! A [`GaugeReporter`] only stores sampling functions. Whoever drives the
//! collection cadence (the OpenTelemetry reader, a Prometheus scrape, or a
//! caller of [`GaugeReporter::collect`]) invokes them; the reporter never owns
//! a thread or timer.

use crate::error::SampleFailure;
use crate::Telemetry;
use opentelemetry::metrics::{AsyncInstrument, Meter, ObservableGauge};
use opentelemetry::KeyValue;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, RwLock};

/// A single sampled value with optional labels
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub value: f64,
    pub labels: Vec<(String, String)>,
}

impl Sample {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            labels: Vec::new(),
        }
    }

    /// Attach a label
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push((key.into(), value.into()));
        self
    }
}

impl From<f64> for Sample {
    fn from(value: f64) -> Self {
        Sample::new(value)
    }
}

impl From<u64> for Sample {
    fn from(value: u64) -> Self {
        Sample::new(value as f64)
    }
}

/// One observation produced by a pull
#[derive(Debug, Clone, PartialEq)]
pub struct GaugeObservation {
    pub name: String,
    pub unit: String,
    pub description: String,
    pub value: f64,
    pub labels: Vec<(String, String)>,
}

/// UCUM unit code understood by OpenTelemetry exporters
fn ucum_unit(unit: &str) -> &str {
    match unit {
        "byte" | "bytes" => "By",
        "second" | "seconds" => "s",
        "millisecond" | "milliseconds" => "ms",
        other => other,
    }
}

type SampleFn = dyn Fn() -> Result<Sample, SampleFailure> + Send + Sync;

struct GaugeEntry {
    name: String,
    unit: String,
    description: String,
    sampler: Box<SampleFn>,
}

impl GaugeEntry {
    /// Run the sampler once; failures and panics are logged and dropped
    fn observe(&self) -> Option<GaugeObservation> {
        match catch_unwind(AssertUnwindSafe(|| (self.sampler)())) {
            Ok(Ok(sample)) => Some(GaugeObservation {
                name: self.name.clone(),
                unit: self.unit.clone(),
                description: self.description.clone(),
                value: sample.value,
                labels: sample.labels,
            }),
            Ok(Err(err)) => {
                tracing::warn!(gauge = %self.name, "Dropping observation: {}", err);
                None
            }
            Err(_) => {
                tracing::warn!(gauge = %self.name, "Dropping observation: sampler panicked");
                None
            }
        }
    }
}

/// Registry of gauge sampling functions
pub struct GaugeReporter {
    entries: RwLock<Vec<Arc<GaugeEntry>>>,
    meter: Option<Meter>,
    instruments: Mutex<Vec<ObservableGauge<f64>>>,
}

impl fmt::Debug for GaugeReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GaugeReporter")
            .field("gauges", &self.len())
            .field("exported", &self.meter.is_some())
            .finish()
    }
}

impl GaugeReporter {
    /// Create a reporter bound to the telemetry's meter (if metrics are enabled)
    pub fn new(telemetry: &Telemetry, scope: &'static str) -> Self {
        Self::with_meter(telemetry.meter(scope))
    }

    /// Create a reporter that is only read through [`GaugeReporter::collect`]
    pub fn detached() -> Self {
        Self::with_meter(None)
    }

    fn with_meter(meter: Option<Meter>) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            meter,
            instruments: Mutex::new(Vec::new()),
        }
    }

    /// Register a gauge.
    ///
    /// Registering the same name twice creates two independent gauges.
    /// `sample_fn` may run concurrently with itself and should be cheap.
    pub fn register_gauge<F>(
        &self,
        name: impl Into<String>,
        unit: impl Into<String>,
        description: impl Into<String>,
        sample_fn: F,
    ) where
        F: Fn() -> Result<Sample, SampleFailure> + Send + Sync + 'static,
    {
        let entry = Arc::new(GaugeEntry {
            name: name.into(),
            unit: unit.into(),
            description: description.into(),
            sampler: Box::new(sample_fn),
        });

        if let Some(meter) = &self.meter {
            let observed = entry.clone();
            let instrument = meter
                .f64_observable_gauge(entry.name.clone())
                .with_unit(ucum_unit(&entry.unit).to_string())
                .with_description(entry.description.clone())
                .with_callback(move |observer: &dyn AsyncInstrument<f64>| {
                    if let Some(observation) = observed.observe() {
                        let attributes: Vec<KeyValue> = observation
                            .labels
                            .into_iter()
                            .map(|(key, value)| KeyValue::new(key, value))
                            .collect();
                        observer.observe(observation.value, &attributes);
                    }
                })
                .build();

            self.instruments
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(instrument);
        }

        tracing::debug!(gauge = %entry.name, unit = %entry.unit, "Registered gauge");

        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(entry);
    }

    /// Sample every registered gauge once, in registration order
    pub fn collect(&self) -> Vec<GaugeObservation> {
        let entries: Vec<Arc<GaugeEntry>> = self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        entries.iter().filter_map(|entry| entry.observe()).collect()
    }

    /// Number of registered gauges
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn test_constant_gauge_does_not_drift() {
        let reporter = GaugeReporter::detached();
        reporter.register_gauge("test.constant", "byte", "Always 42", || Ok(Sample::new(42.0)));

        for _ in 0..3 {
            let observations = reporter.collect();
            assert_eq!(observations.len(), 1);
            assert_eq!(observations[0].value, 42.0);
            assert_eq!(observations[0].unit, "byte");
            assert_eq!(observations[0].name, "test.constant");
            assert_eq!(observations[0].description, "Always 42");
        }
    }

    #[test]
    fn test_sampler_invoked_once_per_collect() {
        let calls = Arc::new(AtomicU64::new(0));
        let counter = calls.clone();

        let reporter = GaugeReporter::detached();
        reporter.register_gauge("test.calls", "1", "Invocation count", move || {
            Ok(Sample::from(counter.fetch_add(1, Ordering::SeqCst) + 1))
        });

        assert_eq!(reporter.collect()[0].value, 1.0);
        assert_eq!(reporter.collect()[0].value, 2.0);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_ucum_unit() {
        assert_eq!(ucum_unit("byte"), "By");
        assert_eq!(ucum_unit("seconds"), "s");
        assert_eq!(ucum_unit("1"), "1");
        assert_eq!(ucum_unit("{request}"), "{request}");
    }

    #[test]
    fn test_duplicate_names_are_independent() {
        let reporter = GaugeReporter::detached();
        reporter.register_gauge("test.dup", "byte", "first", || Ok(Sample::new(1.0)));
        reporter.register_gauge("test.dup", "byte", "second", || Ok(Sample::new(2.0)));

        assert_eq!(reporter.len(), 2);
        let observations = reporter.collect();
        assert_eq!(observations.len(), 2);
        assert_eq!(observations[0].value, 1.0);
        assert_eq!(observations[1].value, 2.0);
    }

    #[test]
    fn test_failed_sample_is_dropped() {
        let reporter = GaugeReporter::detached();
        reporter.register_gauge("test.failing", "byte", "Fails", || {
            Err(SampleFailure::new("unavailable"))
        });
        reporter.register_gauge("test.ok", "byte", "Works", || Ok(Sample::new(7.0)));

        let observations = reporter.collect();
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].name, "test.ok");
    }

    #[test]
    fn test_panicking_sample_is_dropped() {
        let reporter = GaugeReporter::detached();
        reporter.register_gauge("test.panics", "byte", "Panics", || panic!("sampler bug"));
        reporter.register_gauge("test.ok", "byte", "Works", || Ok(Sample::new(3.0)));

        let observations = reporter.collect();
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].value, 3.0);

        // Still usable after a panic
        assert_eq!(reporter.collect().len(), 1);
    }

    #[test]
    fn test_labels_pass_through() {
        let reporter = GaugeReporter::detached();
        reporter.register_gauge("test.labelled", "byte", "Labelled", || {
            Ok(Sample::new(5.0).with_label("pool", "heap"))
        });

        let observations = reporter.collect();
        assert_eq!(
            observations[0].labels,
            vec![("pool".to_string(), "heap".to_string())]
        );
    }

    #[test]
    fn test_empty_reporter() {
        let reporter = GaugeReporter::detached();
        assert!(reporter.is_empty());
        assert!(reporter.collect().is_empty());
    }
}
