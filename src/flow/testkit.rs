//! Test helpers: flow directory fixtures and an in-memory connection source

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};

use super::{FlowFactory, Services, SCRIPT_FILE};
use crate::common::{Error, Result};
use crate::render::TemplateRenderer;
use crate::reporting::EventLog;
use crate::transport::{ConnectionSource, Fetcher, Link};

/// Temporary `<root>/flows/...` tree
pub(crate) struct FlowTree {
    root: tempfile::TempDir,
}

impl FlowTree {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("flows")).unwrap();
        Self { root }
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Write `flows/<name>/script.yaml` plus the given `(file, content)` pairs
    pub fn flow(&self, name: &str, script: &str, files: &[(&str, &str)]) -> PathBuf {
        let dir = self.root.path().join("flows").join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(SCRIPT_FILE), script).unwrap();
        for (file, content) in files {
            fs::write(dir.join(file), content).unwrap();
        }
        dir
    }

    pub fn services(
        &self,
        connections: Arc<ScriptedConnections>,
    ) -> (Services, Arc<EventLog>, Arc<ScriptedConnections>) {
        let log = Arc::new(EventLog::new());
        let services = Services {
            renderer: Arc::new(TemplateRenderer::new(log.clone(), Arc::new(OfflineFetcher))),
            connections: connections.clone(),
            reporter: log.clone(),
            factory: Arc::new(FlowFactory::new()),
        };
        (services, log, connections)
    }
}

/// Fetcher that refuses every request
pub(crate) struct OfflineFetcher;

impl Fetcher for OfflineFetcher {
    fn get(&self, url: &str) -> Result<String> {
        Err(Error::fetch(url, "offline"))
    }

    fn post(&self, url: &str) -> Result<String> {
        Err(Error::fetch(url, "offline"))
    }
}

type Responder = Arc<dyn Fn(&Value) -> String + Send + Sync>;

/// Connection source answering every written request through a closure
pub(crate) struct ScriptedConnections {
    responder: Responder,
    sent: Arc<Mutex<Vec<String>>>,
    outstanding: Arc<AtomicUsize>,
    stopped: AtomicBool,
}

impl ScriptedConnections {
    /// Replies `{"id": <request id>, "result": <request>}`
    pub fn echo() -> Arc<Self> {
        Self::with_responder(|request| {
            json!({"id": request.get("id").cloned().unwrap_or(Value::Null), "result": request})
                .to_string()
        })
    }

    pub fn with_responder(responder: impl Fn(&Value) -> String + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            responder: Arc::new(responder),
            sent: Arc::new(Mutex::new(Vec::new())),
            outstanding: Arc::new(AtomicUsize::new(0)),
            stopped: AtomicBool::new(false),
        })
    }

    /// Every frame written so far, in order
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Links currently borrowed
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

impl ConnectionSource for ScriptedConnections {
    fn borrow(&self) -> Result<Box<dyn Link>> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(Error::PoolStopped);
        }

        self.outstanding.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedLink {
            responder: Arc::clone(&self.responder),
            sent: Arc::clone(&self.sent),
            outstanding: Arc::clone(&self.outstanding),
            pending: VecDeque::new(),
        }))
    }
}

struct ScriptedLink {
    responder: Responder,
    sent: Arc<Mutex<Vec<String>>>,
    outstanding: Arc<AtomicUsize>,
    pending: VecDeque<String>,
}

impl Link for ScriptedLink {
    fn write(&mut self, data: String) -> Result<()> {
        let request: Value = serde_json::from_str(&data)?;
        self.pending.push_back((self.responder)(&request));
        self.sent.lock().push(data);
        Ok(())
    }

    fn read_one(&mut self) -> Result<String> {
        self.pending.pop_front().ok_or(Error::ConnectionClosed)
    }
}

impl Drop for ScriptedLink {
    fn drop(&mut self) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}
