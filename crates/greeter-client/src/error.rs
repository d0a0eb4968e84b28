//! Client error types

use greeter_telemetry::SpanOutcome;
use thiserror::Error;
use tonic::Code;

/// Errors that make the client unusable
#[derive(Error, Debug)]
pub enum ClientError {
    /// Channel cannot be constructed (malformed address, resolution or TLS failure)
    #[error("Connection setup failed: {0}")]
    ConnectionSetup(String),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),
}

/// A single remote call failed at the protocol level
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("RPC failed with {code:?}: {message}")]
pub struct RpcStatusError {
    pub code: Code,
    pub outcome: SpanOutcome,
    pub message: String,
}

impl RpcStatusError {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            outcome: outcome_for(code),
            message: message.into(),
        }
    }

    /// Returned for calls made after the channel was shut down
    pub fn shut_down() -> Self {
        Self::new(Code::Unavailable, "channel shut down")
    }
}

impl From<tonic::Status> for RpcStatusError {
    fn from(status: tonic::Status) -> Self {
        Self::new(status.code(), status.message())
    }
}

/// Map a gRPC status code to the span outcome reported for it
pub fn outcome_for(code: Code) -> SpanOutcome {
    match code {
        Code::Ok => SpanOutcome::Ok,
        Code::Unavailable => SpanOutcome::Unavailable,
        Code::DeadlineExceeded => SpanOutcome::DeadlineExceeded,
        Code::InvalidArgument => SpanOutcome::InvalidArgument,
        _ => SpanOutcome::Unknown,
    }
}
