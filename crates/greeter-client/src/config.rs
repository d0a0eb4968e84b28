//! Client configuration

use crate::error::ClientError;
use greeter_telemetry::{LogFormat, TelemetryConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Transport security of the channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityMode {
    #[default]
    Plaintext,
    Tls,
}

impl SecurityMode {
    pub fn scheme(&self) -> &'static str {
        match self {
            SecurityMode::Plaintext => "http",
            SecurityMode::Tls => "https",
        }
    }
}

/// Client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Transport security
    pub security: SecurityMode,

    /// TLS domain name, defaults to `host`
    pub tls_domain: Option<String>,

    /// Per-call deadline in milliseconds
    pub request_timeout_ms: u64,

    /// Connection establishment timeout in milliseconds
    pub connect_timeout_ms: u64,

    /// How long shutdown waits for in-flight calls, in seconds
    pub shutdown_timeout_secs: u64,

    /// Enable metrics
    pub enable_metrics: bool,

    /// Enable tracing
    pub enable_tracing: bool,

    /// OTLP collector endpoint
    pub otlp_endpoint: Option<String>,

    /// Log level
    pub log_level: String,

    /// Log output format
    pub log_format: LogFormat,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 50051,
            security: SecurityMode::Plaintext,
            tls_domain: None,
            request_timeout_ms: 5000,
            connect_timeout_ms: 3000,
            shutdown_timeout_secs: 5,
            enable_metrics: true,
            enable_tracing: true,
            otlp_endpoint: None,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

impl ClientConfig {
    /// Load configuration from `.env`, `config/client.*` and `GREETER_*` variables
    pub fn load() -> Result<Self, ClientError> {
        // Load .env file if exists
        dotenvy::dotenv().ok();

        config::Config::builder()
            .add_source(config::File::with_name("config/client").required(false))
            .add_source(config::Environment::with_prefix("GREETER").try_parsing(true))
            .build()
            .and_then(|cfg| cfg.try_deserialize())
            .map_err(|e| ClientError::Config(format!("Failed to load config: {}", e)))
    }

    /// Override host and port from a `host:port` target
    pub fn set_target(&mut self, target: &str) -> Result<(), ClientError> {
        let (host, port) = target
            .rsplit_once(':')
            .ok_or_else(|| ClientError::ConnectionSetup(format!("Target '{}' is not host:port", target)))?;

        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(ClientError::ConnectionSetup(format!(
                "Target '{}' has no host",
                target
            )));
        }

        self.port = port
            .parse()
            .map_err(|_| ClientError::ConnectionSetup(format!("Invalid port in target '{}'", target)))?;
        self.host = host.to_string();
        Ok(())
    }

    /// Endpoint URI for the configured target
    pub fn endpoint_uri(&self) -> String {
        if self.host.contains(':') {
            format!("{}://[{}]:{}", self.security.scheme(), self.host, self.port)
        } else {
            format!("{}://{}:{}", self.security.scheme(), self.host, self.port)
        }
    }

    pub fn tls_domain(&self) -> &str {
        self.tls_domain.as_deref().unwrap_or(&self.host)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Telemetry settings derived from this configuration
    pub fn telemetry_config(&self, service_name: &str) -> TelemetryConfig {
        TelemetryConfig {
            metrics: self.enable_metrics,
            tracing: self.enable_tracing,
            otlp_endpoint: self.otlp_endpoint.clone(),
            ..TelemetryConfig::for_service(service_name, env!("CARGO_PKG_VERSION"))
        }
    }
}
