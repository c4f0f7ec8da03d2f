//! Common utilities shared by the runner and the mock server

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, FlowFailure, Result, NO_DATA};
