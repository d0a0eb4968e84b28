//! Gauge example
//!
//! Registers process memory gauges and drives collection on a fixed interval,
//! the way an external metrics scheduler would. Gauges are useful for
//! measurements too expensive to compute on every request.

use anyhow::Result;
use clap::Parser;
use greeter_telemetry::{
    init_logging, init_telemetry, register_process_memory_gauges, GaugeReporter, LogFormat,
    TelemetryConfig,
};
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "gauge-example")]
#[command(about = "Reports process memory through observable gauges", long_about = None)]
struct Cli {
    /// Seconds between collections
    #[arg(long, default_value_t = 5)]
    interval_secs: u64,

    /// Number of collections before exiting
    #[arg(long, default_value_t = 3)]
    collections: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging("gauge_example=info,greeter_telemetry=info", LogFormat::Text)?;

    let otlp_endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok();
    if let Some(endpoint) = &otlp_endpoint {
        info!("Using OTLP endpoint: {}", endpoint);
    }
    let telemetry = init_telemetry(TelemetryConfig {
        tracing: false,
        otlp_endpoint,
        metrics_interval: Duration::from_secs(cli.interval_secs.max(1)),
        ..TelemetryConfig::for_service("gauge-example", env!("CARGO_PKG_VERSION"))
    })?;

    let reporter = GaugeReporter::new(&telemetry, "greeter.metrics");
    register_process_memory_gauges(&reporter)?;

    let mut ticker = tokio::time::interval(Duration::from_secs(cli.interval_secs.max(1)));
    for _ in 0..cli.collections {
        ticker.tick().await;

        for observation in reporter.collect() {
            info!(
                gauge = %observation.name,
                unit = %observation.unit,
                value = observation.value,
                "Collected gauge"
            );
        }
        println!("{}", telemetry.render_metrics()?);
    }

    telemetry.shutdown()?;
    Ok(())
}
