//! Validation issues
//!
//! An issue is one discrepancy found while running a flow: a missing key, an
//! unequal value, a failed type sentinel or a logic error around the exchange.

use serde::{Deserialize, Serialize};

/// Kind of discrepancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueKind {
    /// Expected key is absent from the response
    NoMatch,
    /// Scalar value differs
    NotEqual,
    /// Type sentinel predicate failed
    TypeCheck,
    /// Template/parse failure, bad step ordering or a wrapped nested failure
    LogicError,
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoMatch => write!(f, "NO_MATCH"),
            Self::NotEqual => write!(f, "NOT_EQUAL"),
            Self::TypeCheck => write!(f, "TYPE_CHECK"),
            Self::LogicError => write!(f, "LOGIC_ERROR"),
        }
    }
}

/// One structured discrepancy with a dotted path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub kind: IssueKind,
    pub path: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Issue {
    pub fn new(kind: IssueKind, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            message: message.into(),
            detail: None,
        }
    }

    pub fn logic(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(IssueKind::LogicError, path, message)
    }

    /// Attach free-form detail, e.g. the rendered text that failed to parse
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl std::fmt::Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]: {}", self.kind, self.path, self.message)
    }
}
