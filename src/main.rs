//! rpcflow - flow-driven integration test runner
//!
//! Runs declarative request/response flows against a JSON-RPC server over
//! persistent WebSocket connections and validates every response.

use clap::Parser;
use rpcflow::common::{config::Config, logging};
use rpcflow::{cli, commands::Commands};

#[derive(Parser)]
#[command(name = "rpcflow", about = "Flow-driven JSON-RPC/WebSocket integration test runner")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

fn main() {
    let cli = Cli::parse();

    let log_file = match &cli.command {
        Commands::Run { log_file, .. } => log_file.clone(),
        Commands::List { .. } => None,
    };
    logging::init_cli(log_file.as_deref());

    let result = Config::load().and_then(|config| cli::dispatch(cli.command, &config));

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
