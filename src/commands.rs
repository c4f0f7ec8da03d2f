//! CLI command definitions
//!
//! Defines the clap commands for the flow runner CLI.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run every flow under <PATH>/flows against a server
    Run {
        /// Directory containing the `flows` sub directory
        path: PathBuf,

        /// Server host (default: 127.0.0.1)
        #[arg(long, short = 'H')]
        host: Option<String>,

        /// Server port (default: 51233)
        #[arg(long, short = 'P')]
        port: Option<u16>,

        /// WebSocket resource path on the server (default: /)
        #[arg(long)]
        ws_path: Option<String>,

        /// Only run flows whose name contains this substring
        #[arg(long, short, default_value = "")]
        filter: String,

        /// Report verbosity: 0 silent, 1 progress, 2 payloads (default: 1)
        #[arg(long, short)]
        verbose: Option<u8>,

        /// Number of pooled WebSocket sessions (default: 4)
        #[arg(long)]
        pool_size: Option<usize>,

        /// Connect and handshake timeout in seconds (default: 10)
        #[arg(long)]
        connect_timeout: Option<u64>,

        /// Also write diagnostics to this file
        #[arg(long)]
        log_file: Option<PathBuf>,
    },

    /// Discover and load flows without connecting to a server
    List {
        /// Directory containing the `flows` sub directory
        path: PathBuf,

        /// Only list flows whose name contains this substring
        #[arg(long, short, default_value = "")]
        filter: String,
    },
}
