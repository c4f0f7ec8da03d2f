//! Template rendering
//!
//! Request and expectation files are templates rendered against the store
//! right before they are used.

mod jinja;

pub use jinja::TemplateRenderer;

use std::path::Path;

use crate::common::Result;
use crate::flow::Store;

/// Turns a template file into text using the store as context
pub trait Renderer: Send + Sync {
    fn render(&self, template: &Path, store: &Store) -> Result<String>;
}
