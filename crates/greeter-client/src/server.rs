//! Echo greeter server
//!
//! Test double for the client, also served by the `greeter-server` demo.

use crate::pb::greeter_server::{Greeter, GreeterServer};
use crate::pb::{HelloReply, HelloRequest};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::{Request, Response, Status};
use tracing::info;

/// Replies `Hello, <name>` to every request
#[derive(Debug, Clone, Default)]
pub struct EchoGreeter {
    delay: Option<Duration>,
    traceparents: Option<Arc<Mutex<Vec<String>>>>,
}

impl EchoGreeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Greeter that keeps every received `traceparent` header.
    ///
    /// The headers are never evicted; meant for short-lived test servers.
    pub fn recording() -> Self {
        Self {
            traceparents: Some(Arc::default()),
            ..Self::default()
        }
    }

    /// Wait `delay` before replying
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// `traceparent` headers received so far, in arrival order.
    ///
    /// Always empty unless built with [`EchoGreeter::recording`].
    pub fn traceparents(&self) -> Vec<String> {
        match &self.traceparents {
            Some(received) => received
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clone(),
            None => Vec::new(),
        }
    }
}

#[tonic::async_trait]
impl Greeter for EchoGreeter {
    async fn say_hello(
        &self,
        request: Request<HelloRequest>,
    ) -> Result<Response<HelloReply>, Status> {
        let traceparent = request
            .metadata()
            .get("traceparent")
            .and_then(|value| value.to_str().ok());

        if let (Some(received), Some(traceparent)) = (&self.traceparents, traceparent) {
            received
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(traceparent.to_string());
        }

        let name = request.into_inner().name;
        info!("Received greeting request for {}", name);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        Ok(Response::new(HelloReply {
            message: format!("Hello, {}", name),
        }))
    }
}

/// Serve `greeter` on an already-bound listener until `shutdown` resolves
pub async fn serve<F>(
    listener: TcpListener,
    greeter: EchoGreeter,
    shutdown: F,
) -> Result<(), tonic::transport::Error>
where
    F: Future<Output = ()>,
{
    tonic::transport::Server::builder()
        .add_service(GreeterServer::new(greeter))
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
        .await
}
