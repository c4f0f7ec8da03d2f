//! Mock JSON-RPC server binary for local demos
//!
//! Serves the in-process mock over WebSocket until interrupted, so the flows
//! in `demos/` can be run without a real node.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use rpcflow::common::logging;
use rpcflow::mock::{serve, MockState};

#[derive(Parser)]
#[command(name = "rpcflow-mock-server", about = "Mock JSON-RPC server over WebSocket")]
#[command(version, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, short = 'H', default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(long, short = 'P', default_value_t = 51233)]
    port: u16,
}

#[tokio::main]
async fn main() {
    logging::init_cli(None);
    let args = Args::parse();

    let addr: SocketAddr = match format!("{}:{}", args.host, args.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            eprintln!("Error: invalid listen address: {e}");
            std::process::exit(1);
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Error: cannot listen on {addr}: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(%addr, "Mock server listening");
    serve(listener, Arc::new(MockState::new()), async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await;
}
