//! Execution events and the sinks that consume them
//!
//! Events describe what a run did (flows found, requests sent, responses
//! checked, verdicts). They are separate from `tracing` diagnostics.

mod console;

pub use console::ConsoleReporter;

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::validation::Issue;

/// Something observable that happened during a run
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A flow directory was discovered
    Detect { name: String },
    /// A request is about to be sent
    Request {
        path: String,
        store: Value,
        payload: String,
    },
    /// A response was received and is about to be validated
    Response {
        path: String,
        response: String,
        expectations: String,
    },
    /// A top-level flow finished without issues
    Success { flow: String },
    /// A top-level flow failed
    Failure {
        flow: String,
        path: String,
        issues: Vec<Issue>,
        response: String,
    },
    /// Free-form labelled message (RUNNING, REPEAT, CUSTOM, FETCH, ...)
    Custom { label: String, message: String },
}

impl Event {
    pub fn custom(label: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Custom {
            label: label.into(),
            message: message.into(),
        }
    }

    /// Short label used when rendering the event
    pub fn label(&self) -> &str {
        match self {
            Self::Detect { .. } => "DETECT FLOW",
            Self::Request { .. } => "REQUEST",
            Self::Response { .. } => "RESPONSE",
            Self::Success { .. } => "SUCCESS",
            Self::Failure { .. } => "FAIL",
            Self::Custom { label, .. } => label,
        }
    }
}

/// Consumer of run events
pub trait ReportSink: Send + Sync {
    fn record(&self, event: Event);
}

/// Sink that keeps every event in memory
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<Event>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Labels of recorded events, in order
    pub fn labels(&self) -> Vec<String> {
        self.events.lock().iter().map(|e| e.label().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReportSink for EventLog {
    fn record(&self, event: Event) {
        self.events.lock().push(event);
    }
}

/// Sink that forwards every event to several others
pub struct Fanout {
    sinks: Vec<Arc<dyn ReportSink>>,
}

impl Fanout {
    pub fn new(sinks: Vec<Arc<dyn ReportSink>>) -> Self {
        Self { sinks }
    }
}

impl ReportSink for Fanout {
    fn record(&self, event: Event) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.record(event.clone());
            }
            last.record(event);
        }
    }
}
