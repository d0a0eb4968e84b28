//! Telemetry-instrumented gRPC greeter client
//!
//! Provides the instrumented client, its configuration and error types, and
//! an echo server used as a test double.

pub mod client;
pub mod config;
pub mod error;
pub mod server;

// Include the generated protobuf code
pub mod pb {
    tonic::include_proto!("helloworld");
}

pub use client::{InstrumentedClient, SAY_HELLO_SPAN, TRACER_SCOPE};
pub use config::{ClientConfig, SecurityMode};
pub use error::{outcome_for, ClientError, RpcStatusError};
pub use server::EchoGreeter;
