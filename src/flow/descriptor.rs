//! Flow descriptor types
//!
//! Defines the data structures for deserializing `script.yaml`.

use serde::Deserialize;
use std::path::Path;

use crate::common::{Error, Result};

/// Name of the descriptor file inside every flow directory
pub const SCRIPT_FILE: &str = "script.yaml";

/// A complete flow script loaded from `script.yaml`
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct FlowScript {
    /// Optional descriptive header
    #[serde(default)]
    pub meta: Option<FlowMeta>,
    /// The sequence of steps to execute
    pub steps: Vec<StepDescriptor>,
}

/// Descriptive header of a flow, never used for execution
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct FlowMeta {
    pub subject: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub created_on: Option<String>,
    pub last_update: Option<String>,
    #[serde(default)]
    pub revisions: Vec<String>,
}

/// A single step record
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepDescriptor {
    /// Send a rendered request template
    Request {
        /// Template path relative to the flow directory
        file: String,
    },
    /// Read one response and validate it against an expectation template
    Response {
        /// Template path relative to the flow directory
        file: String,
    },
    /// Run a sibling flow sharing the current store
    RunFlow {
        /// Directory name of the sibling flow
        name: String,
    },
    /// Run nested steps several times
    Block {
        steps: Vec<StepDescriptor>,
        #[serde(default = "default_repeat")]
        repeat: u32,
    },
}

fn default_repeat() -> u32 {
    1
}

impl FlowScript {
    /// Parse a script document; `origin` is only used for error messages
    pub fn parse(text: &str, origin: &Path) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| Error::descriptor(origin, e.to_string()))
    }

    /// Read and parse `<dir>/script.yaml`
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(SCRIPT_FILE);
        let text = std::fs::read_to_string(&path)
            .map_err(|e| Error::descriptor(&path, format!("cannot read file: {e}")))?;
        Self::parse(&text, &path)
    }
}
