//! Error types for the flow runner
//!
//! Two layers of failure exist: [`FlowFailure`] is scoped to a single flow and
//! is recovered by the scheduler, everything else in [`Error`] is treated as
//! fatal for the whole run.

use std::io;
use thiserror::Error;

use crate::validation::{Issue, IssueKind};

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Placeholder used as the "last response" when a step failed before anything was received
pub const NO_DATA: &str = "No data";

/// Main error type for the flow runner
#[derive(Error, Debug)]
pub enum Error {
    // === Flow Errors ===
    #[error(transparent)]
    Flow(#[from] FlowFailure),

    #[error("Invalid flow descriptor '{path}': {reason}")]
    Descriptor { path: String, reason: String },

    #[error("Template '{path}' failed to render: {message}")]
    Template { path: String, message: String },

    // === Connection Errors ===
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Connection pool is stopped, no connection can be borrowed")]
    PoolStopped,

    #[error("HTTP fetch of '{url}' failed: {reason}")]
    Fetch { url: String, reason: String },

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a descriptor error for the given file
    pub fn descriptor(path: impl AsRef<std::path::Path>, reason: impl Into<String>) -> Self {
        Self::Descriptor {
            path: path.as_ref().display().to_string(),
            reason: reason.into(),
        }
    }

    /// Create a template rendering error
    pub fn template(path: impl AsRef<std::path::Path>, message: impl Into<String>) -> Self {
        Self::Template {
            path: path.as_ref().display().to_string(),
            message: message.into(),
        }
    }

    /// Create a fetch error
    pub fn fetch(url: &str, reason: impl std::fmt::Display) -> Self {
        Self::Fetch {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether the scheduler may record this error against a single flow and move on
    pub fn is_flow_scoped(&self) -> bool {
        matches!(
            self,
            Error::Flow(_) | Error::Descriptor { .. } | Error::Template { .. }
        )
    }

    /// Convert a flow-scoped error into a [`FlowFailure`]
    ///
    /// Errors that are not flow-scoped are handed back unchanged.
    pub fn into_flow_failure(self, path: &str) -> std::result::Result<FlowFailure, Error> {
        match self {
            Error::Flow(failure) => Ok(failure),
            e @ (Error::Descriptor { .. } | Error::Template { .. }) => {
                Ok(FlowFailure::logic(path, e.to_string(), NO_DATA))
            }
            other => Err(other),
        }
    }
}

/// A failure scoped to one flow execution
///
/// Carries the template path of the failing step, every accumulated issue and
/// the last raw response seen by that step.
#[derive(Error, Debug, Clone)]
#[error("Flow failed at '{path}' with {} issue(s)", issues.len())]
pub struct FlowFailure {
    pub path: String,
    pub issues: Vec<Issue>,
    pub response: String,
}

impl FlowFailure {
    pub fn new(path: impl Into<String>, issues: Vec<Issue>, response: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            issues,
            response: response.into(),
        }
    }

    /// Failure made of a single `LOGIC_ERROR` issue
    pub fn logic(path: &str, message: impl Into<String>, response: impl Into<String>) -> Self {
        Self::new(path, vec![Issue::logic(path, message)], response)
    }

    /// Same as [`FlowFailure::logic`], with extra detail attached to the issue
    pub fn logic_with_detail(
        path: &str,
        message: impl Into<String>,
        detail: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        Self::new(
            path,
            vec![Issue::logic(path, message).with_detail(detail)],
            response,
        )
    }

    /// Re-raise a nested failure under `path`, prepending one synthetic `LOGIC_ERROR`
    pub fn wrap(self, path: &str, message: &str) -> Self {
        let mut issues = Vec::with_capacity(self.issues.len() + 1);
        issues.push(Issue::new(IssueKind::LogicError, path, message));
        issues.extend(self.issues);

        Self {
            path: path.to_string(),
            issues,
            response: self.response,
        }
    }
}
