//! Response validation
//!
//! Pure comparison of an expectation document against a received payload.

mod issue;
mod validator;

pub use issue::{Issue, IssueKind};
pub use validator::{validate, Validation};
