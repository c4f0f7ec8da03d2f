//! Shared variable store
//!
//! One JSON object per top-level flow execution. Template callbacks write into
//! it and the engine injects the response under validation as `$res`. Clones
//! share the same document.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::common::{Error, Result};

/// Optional file in a flow directory that seeds the store
pub const ENV_FILE: &str = "env.json";

/// Key holding the response currently being validated
pub const RESPONSE_KEY: &str = "$res";

#[derive(Debug, Clone, Default)]
pub struct Store {
    data: Arc<Mutex<Map<String, Value>>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from a JSON object
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self {
                data: Arc::new(Mutex::new(map)),
            }),
            other => Err(Error::Config(format!(
                "Store seed must be a JSON object, got {other}"
            ))),
        }
    }

    /// Create a store for a flow, seeded from `<flow_dir>/env.json` when present
    pub fn for_flow(flow_dir: &Path) -> Result<Self> {
        let path = flow_dir.join(ENV_FILE);
        if !path.is_file() {
            return Ok(Self::new());
        }

        let text = std::fs::read_to_string(&path).map_err(|e| Error::descriptor(&path, e.to_string()))?;
        let value: Value =
            serde_json::from_str(&text).map_err(|e| Error::descriptor(&path, e.to_string()))?;
        Self::from_value(value).map_err(|e| Error::descriptor(&path, e.to_string()))
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.data.lock().insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.data.lock().get(key).cloned()
    }

    /// Copy of the whole document
    pub fn snapshot(&self) -> Value {
        Value::Object(self.data.lock().clone())
    }

    pub fn inject_response(&self, response: Value) {
        self.set(RESPONSE_KEY, response);
    }
}
