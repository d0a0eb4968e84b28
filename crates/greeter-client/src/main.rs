//! Greeter client
//!
//! Greets a server once. The first argument is the name to greet, the second
//! the target server.

use anyhow::{anyhow, Result};
use clap::Parser;
use greeter_client::{ClientConfig, InstrumentedClient, SecurityMode};
use greeter_telemetry::{init_logging, init_telemetry, Telemetry, TelemetryError};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "greeter-client")]
#[command(about = "Sends one traced greeting to a greeter server", long_about = None)]
struct Cli {
    /// Name to greet
    #[arg(default_value = "world")]
    name: String,

    /// Target server as host:port (defaults to configuration, localhost:50051)
    target: Option<String>,

    /// Use transport security
    #[arg(long)]
    tls: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = ClientConfig::load()?;
    if let Some(target) = &cli.target {
        config.set_target(target)?;
    }
    if cli.tls {
        config.security = SecurityMode::Tls;
    }

    init_logging(&config.log_level, config.log_format)?;
    info!("Loaded configuration: {:?}", config);

    let telemetry = init_telemetry(config.telemetry_config("greeter-client"))?;

    let result = run(&config, &telemetry, &cli.name).await;
    settle(result, telemetry.shutdown())
}

async fn run(config: &ClientConfig, telemetry: &Telemetry, name: &str) -> Result<()> {
    let client = InstrumentedClient::connect(config, telemetry).await?;

    let greeting = tokio::spawn({
        let client = client.clone();
        let name = name.to_string();
        async move {
            client.greet(&name).await;
        }
    });
    let greeted = greeting.await;

    // The channel holds connections and background tasks; release it even
    // when the greeting panicked
    client.shutdown(config.shutdown_timeout()).await;

    greeted.map_err(|e| anyhow!("Greeting task failed: {}", e))
}

/// Combine the run result with telemetry shutdown; the run error wins
fn settle(result: Result<()>, flushed: Result<(), TelemetryError>) -> Result<()> {
    match (result, flushed) {
        (Ok(()), flushed) => Ok(flushed?),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(flush_error)) => {
            error!("Telemetry shutdown failed: {}", flush_error);
            Err(e.context(format!("telemetry shutdown also failed: {}", flush_error)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settle_ok() {
        assert!(settle(Ok(()), Ok(())).is_ok());
    }

    #[test]
    fn test_settle_reports_shutdown_failure() {
        let err = settle(Ok(()), Err(TelemetryError::Shutdown("flush".to_string()))).unwrap_err();
        assert!(err.to_string().contains("flush"));
    }

    #[test]
    fn test_settle_run_error_takes_priority() {
        let err = settle(
            Err(anyhow!("connect failed")),
            Err(TelemetryError::Shutdown("flush".to_string())),
        )
        .unwrap_err();

        assert_eq!(err.root_cause().to_string(), "connect failed");
        assert!(format!("{:#}", err).contains("flush"));
    }

    #[tokio::test]
    async fn test_run_releases_channel_after_failed_greeting() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = ClientConfig {
            host: addr.ip().to_string(),
            port: addr.port(),
            ..Default::default()
        };

        // Unreachable server: greet swallows the failure and run still returns
        run(&config, &Telemetry::disabled(), "world").await.unwrap();
    }
}
