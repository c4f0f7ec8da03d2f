//! Flow runner

use std::sync::Arc;

use super::flow::Flow;
use super::step::{Cursor, StepContext};
use super::{Services, Store};
use crate::common::Result;
use crate::reporting::Event;

/// Drives the steps of one flow
pub struct FlowRunner<'a> {
    services: &'a Services,
    name: String,
    flow: Arc<Flow>,
}

impl<'a> FlowRunner<'a> {
    pub fn new(services: &'a Services, name: impl Into<String>, flow: Arc<Flow>) -> Self {
        Self {
            services,
            name: name.into(),
            flow,
        }
    }

    /// Run as a top-level flow with a fresh store seeded from `env.json`
    ///
    /// Returns the store as it was left by the last step.
    pub fn run(&self) -> Result<Store> {
        let store = Store::for_flow(self.flow.dir())?;
        self.run_with(&store)?;
        Ok(store)
    }

    /// Run against an existing store, as nested flows do
    pub fn run_with(&self, store: &Store) -> Result<()> {
        tracing::debug!(flow = %self.name, steps = self.flow.steps().len(), "Running flow");
        self.services
            .reporter
            .record(Event::custom("RUNNING", self.name.as_str()));

        let context = StepContext {
            services: self.services,
            store,
        };
        let mut cursor: Cursor = None;
        context.run_steps(self.flow.steps(), &mut cursor)
    }
}
