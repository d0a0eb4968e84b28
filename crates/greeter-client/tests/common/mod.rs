//! Shared helpers for client integration tests

#![allow(dead_code)]

use greeter_client::server::serve;
use greeter_client::{ClientConfig, EchoGreeter, InstrumentedClient};
use greeter_telemetry::{InMemorySpanSink, Telemetry};
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

/// Echo server running on an ephemeral local port
pub struct TestServer {
    pub addr: SocketAddr,
    pub greeter: EchoGreeter,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start(greeter: EchoGreeter) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let (tx, rx) = oneshot::channel::<()>();

        let handle = tokio::spawn({
            let greeter = greeter.clone();
            async move {
                serve(listener, greeter, async {
                    rx.await.ok();
                })
                .await
                .expect("serve");
            }
        });

        Self {
            addr,
            greeter,
            shutdown: Some(tx),
            handle,
        }
    }

    /// Stop the server and wait until it has released its port
    pub async fn kill(mut self) {
        if let Some(tx) = self.shutdown.take() {
            tx.send(()).ok();
        }
        self.handle.await.expect("server task");
    }
}

/// Address of a local port with nothing listening on it
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    listener.local_addr().expect("local addr")
}

pub fn config_for(addr: SocketAddr) -> ClientConfig {
    ClientConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        request_timeout_ms: 2000,
        connect_timeout_ms: 1000,
        ..Default::default()
    }
}

/// Client wired to an in-memory span sink
pub async fn traced_client(addr: SocketAddr) -> (InstrumentedClient, Arc<InMemorySpanSink>) {
    let sink = Arc::new(InMemorySpanSink::new());
    let telemetry = Telemetry::disabled().with_span_sink(sink.clone());
    let client = InstrumentedClient::connect(&config_for(addr), &telemetry)
        .await
        .expect("connect");
    (client, sink)
}

/// Log events captured by [`capture_logs`]
#[derive(Clone, Default)]
pub struct CapturedLogs {
    events: Arc<Mutex<Vec<(Level, String)>>>,
}

impl CapturedLogs {
    pub fn at(&self, level: Level) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, message)| message.clone())
            .collect()
    }
}

#[derive(Default)]
struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{:?}", value);
        }
    }
}

impl<S: Subscriber> Layer<S> for CapturedLogs {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.events
            .lock()
            .unwrap()
            .push((*event.metadata().level(), visitor.0));
    }
}

/// Capture log events on the current thread until the guard is dropped
pub fn capture_logs() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::registry().with(logs.clone());
    let guard = tracing::subscriber::set_default(subscriber);
    (logs, guard)
}
