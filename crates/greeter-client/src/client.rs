//! Instrumented greeter client
//!
//! Every `SayHello` call opens exactly one span, injects its W3C trace
//! context into the request metadata, and closes the span with the call's
//! outcome before returning.

use crate::config::{ClientConfig, SecurityMode};
use crate::error::{ClientError, RpcStatusError};
use crate::pb::{greeter_client::GreeterClient, HelloReply, HelloRequest};
use greeter_telemetry::{ActiveSpan, SpanOutcome, Telemetry, Tracer};
use opentelemetry_semantic_conventions::trace::{
    RPC_GRPC_STATUS_CODE, RPC_METHOD, RPC_SERVICE, RPC_SYSTEM, SERVER_ADDRESS, SERVER_PORT,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tonic::metadata::{Ascii, MetadataValue};
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tonic::Request;
use tracing::{debug, info, warn, Instrument};

/// Instrumentation scope of the client's tracer
pub const TRACER_SCOPE: &str = "greeter_client.InstrumentedClient";

/// Name of the span opened for each call
pub const SAY_HELLO_SPAN: &str = "helloworld.Greeter/SayHello";

const TRACEPARENT_HEADER: &str = "traceparent";

/// Channel state shared by all clones of a client
#[derive(Default)]
struct ChannelState {
    closed: AtomicBool,
    in_flight: AtomicUsize,
    drained: Notify,
}

impl ChannelState {
    fn enter(self: &Arc<Self>) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        InFlightGuard(self.clone())
    }

    async fn wait_drained(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

struct InFlightGuard(Arc<ChannelState>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.0.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.drained.notify_waiters();
        }
    }
}

/// gRPC greeter client that traces every call
#[derive(Clone)]
pub struct InstrumentedClient {
    inner: GreeterClient<Channel>,
    tracer: Tracer,
    host: String,
    port: u16,
    request_timeout: Duration,
    state: Arc<ChannelState>,
}

impl std::fmt::Debug for InstrumentedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentedClient")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tracer", &self.tracer)
            .finish()
    }
}

impl InstrumentedClient {
    /// Build the channel to the configured target.
    ///
    /// The address must resolve, but no connection is made yet: an
    /// unreachable server surfaces as `UNAVAILABLE` on the first call.
    pub async fn connect(config: &ClientConfig, telemetry: &Telemetry) -> Result<Self, ClientError> {
        let uri = config.endpoint_uri();
        let mut endpoint = Endpoint::from_shared(uri.clone())
            .map_err(|e| ClientError::ConnectionSetup(format!("Invalid address {}: {}", uri, e)))?
            .connect_timeout(config.connect_timeout());

        let resolved = tokio::net::lookup_host((config.host.as_str(), config.port))
            .await
            .map_err(|e| ClientError::ConnectionSetup(format!("Cannot resolve {}: {}", uri, e)))?
            .count();
        if resolved == 0 {
            return Err(ClientError::ConnectionSetup(format!(
                "No addresses found for {}",
                uri
            )));
        }

        if config.security == SecurityMode::Tls {
            let tls = ClientTlsConfig::new()
                .domain_name(config.tls_domain())
                .with_native_roots();
            endpoint = endpoint
                .tls_config(tls)
                .map_err(|e| ClientError::ConnectionSetup(format!("TLS setup failed: {}", e)))?;
        }

        let channel = endpoint.connect_lazy();
        info!(target_uri = %uri, addresses = resolved, "Channel created");

        Ok(Self {
            inner: GreeterClient::new(channel),
            tracer: telemetry.tracer(TRACER_SCOPE),
            host: config.host.clone(),
            port: config.port,
            request_timeout: config.request_timeout(),
            state: Arc::new(ChannelState::default()),
        })
    }

    /// Issue one `SayHello` call and return its typed result.
    ///
    /// Exactly one span is recorded per call, including calls made after
    /// shutdown.
    pub async fn say_hello(&self, name: &str) -> Result<HelloReply, RpcStatusError> {
        let _in_flight = self.state.enter();

        let mut span = self.tracer.start_span(SAY_HELLO_SPAN);
        span.set_attribute(RPC_SYSTEM, "grpc");
        span.set_attribute(RPC_SERVICE, "helloworld.Greeter");
        span.set_attribute(RPC_METHOD, "SayHello");
        span.set_attribute(SERVER_ADDRESS, self.host.clone());
        span.set_attribute(SERVER_PORT, self.port.to_string());

        let log_span = tracing::info_span!(
            "say_hello",
            trace_id = %span.context().trace_id,
            server = %format!("{}:{}", self.host, self.port),
        );
        let result = self.call(name, &span).instrument(log_span).await;

        match &result {
            Ok(_) => {
                span.set_attribute(RPC_GRPC_STATUS_CODE, (tonic::Code::Ok as i32).to_string());
                span.finish(SpanOutcome::Ok);
            }
            Err(err) => {
                span.set_attribute(RPC_GRPC_STATUS_CODE, (err.code as i32).to_string());
                span.finish(err.outcome);
            }
        }

        result
    }

    async fn call(&self, name: &str, span: &ActiveSpan) -> Result<HelloReply, RpcStatusError> {
        if self.state.closed.load(Ordering::SeqCst) {
            return Err(RpcStatusError::shut_down());
        }

        let mut request = Request::new(HelloRequest {
            name: name.to_string(),
        });

        match span.context().traceparent().parse::<MetadataValue<Ascii>>() {
            Ok(value) => {
                request.metadata_mut().insert(TRACEPARENT_HEADER, value);
            }
            Err(e) => debug!("Skipping trace context propagation: {}", e),
        }

        let mut client = self.inner.clone();
        match tokio::time::timeout(self.request_timeout, client.say_hello(request)).await {
            Ok(Ok(response)) => Ok(response.into_inner()),
            Ok(Err(status)) => Err(RpcStatusError::from(status)),
            Err(_) => Err(RpcStatusError::new(
                tonic::Code::DeadlineExceeded,
                format!("no reply within {:?}", self.request_timeout),
            )),
        }
    }

    /// Greet the server, logging the reply or the failure.
    ///
    /// RPC failures are logged at warn and swallowed; `None` is returned.
    pub async fn greet(&self, name: &str) -> Option<HelloReply> {
        debug!("Will try to greet {} ...", name);

        match self.say_hello(name).await {
            Ok(reply) => {
                info!("Greeting: {}", reply.message);
                Some(reply)
            }
            Err(err) => {
                warn!(code = ?err.code, outcome = %err.outcome, "RPC failed: {}", err.message);
                None
            }
        }
    }

    /// Close the channel and wait for in-flight calls to drain.
    ///
    /// Returns `true` if every call finished before `timeout`. In-flight
    /// calls are never cancelled; calls started afterwards on any clone
    /// fail with `UNAVAILABLE`.
    pub async fn shutdown(self, timeout: Duration) -> bool {
        self.state.closed.store(true, Ordering::SeqCst);

        let drained = tokio::time::timeout(timeout, self.state.wait_drained())
            .await
            .is_ok();

        if drained {
            info!(host = %self.host, port = self.port, "Channel shut down");
        } else {
            warn!(
                in_flight = self.state.in_flight.load(Ordering::SeqCst),
                "Channel shutdown timed out after {:?}", timeout
            );
        }

        drained
    }
}
