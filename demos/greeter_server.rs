//! Echo greeter server for trying out the client

use anyhow::Result;
use clap::Parser;
use greeter_client::server::serve;
use greeter_client::EchoGreeter;
use greeter_telemetry::{init_logging, LogFormat};
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser)]
#[command(name = "greeter-server")]
#[command(about = "Replies Hello, <name> to every SayHello call", long_about = None)]
struct Cli {
    /// Address to listen on
    #[arg(default_value = "0.0.0.0:50051")]
    addr: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging("greeter_server=info,greeter_client=info", LogFormat::Text)?;

    let listener = TcpListener::bind(&cli.addr).await?;
    info!("✓ Greeter listening on {}", listener.local_addr()?);

    serve(listener, EchoGreeter::new(), async {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down");
    })
    .await?;

    Ok(())
}
