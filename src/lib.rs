//! rpcflow - flow-driven integration test runner for JSON-RPC servers
//!
//! Flows are directories of templated request/expectation files driven by a
//! `script.yaml`. They run over a bounded pool of persistent WebSocket
//! sessions and every response is validated structurally against its
//! expectation document.

pub mod cli;
pub mod commands;
pub mod common;
pub mod crawler;
pub mod flow;
pub mod mock;
pub mod render;
pub mod reporting;
pub mod scheduler;
pub mod transport;
pub mod validation;

// Re-export commonly used types for tests
pub use common::{Error, FlowFailure, Result};
pub use flow::{FlowFactory, FlowRunner, Services, Store};
pub use scheduler::{RunSummary, Scheduler};
pub use transport::{ConnectionPool, Endpoint};
