//! Step executors
//!
//! A step either succeeds or fails the whole flow with a [`FlowFailure`].
//! Only a stopped pool escapes as a fatal error.

use std::path::Path;

use serde_json::Value;

use super::flow::Step;
use super::runner::FlowRunner;
use super::{Services, Store};
use crate::common::{Error, FlowFailure, Result, NO_DATA};
use crate::reporting::Event;
use crate::transport::Link;
use crate::validation::validate;

/// The connection of the last Request in the current step sequence
pub(crate) type Cursor = Option<Box<dyn Link>>;

/// Everything a step needs while one flow executes
pub(crate) struct StepContext<'a> {
    pub services: &'a Services,
    pub store: &'a Store,
}

impl<'a> StepContext<'a> {
    /// Run `steps` in order, stopping at the first failure
    pub fn run_steps(&self, steps: &[Step], cursor: &mut Cursor) -> Result<()> {
        for step in steps {
            self.run_step(step, cursor)?;
        }
        Ok(())
    }

    fn run_step(&self, step: &Step, cursor: &mut Cursor) -> Result<()> {
        match step {
            Step::Request { template } => self.request(template, cursor),
            Step::Response { template } => match cursor.as_mut() {
                Some(link) => self.response(template, &mut **link),
                None => Err(FlowFailure::logic(
                    &template.display().to_string(),
                    "Response can't come before Request step",
                    NO_DATA,
                )
                .into()),
            },
            Step::RunFlow { dir } => self.run_flow(dir),
            Step::Block { dir, steps, repeat } => self.repeat_block(dir, steps, *repeat),
        }
    }

    fn request(&self, template: &Path, cursor: &mut Cursor) -> Result<()> {
        let path = template.display().to_string();

        let rendered = self
            .services
            .renderer
            .render(template, self.store)
            .map_err(|e| contain(e, &path, NO_DATA))?;

        let payload: Value = serde_json::from_str(&rendered).map_err(|e| {
            FlowFailure::logic_with_detail(
                &path,
                format!("Rendered request is not valid JSON: {e}"),
                rendered.as_str(),
                NO_DATA,
            )
        })?;

        self.services.reporter.record(Event::Request {
            path: path.clone(),
            store: self.store.snapshot(),
            payload: pretty(&payload),
        });

        // Release the previous connection first so a small pool cannot starve us
        cursor.take();

        let mut link = self.services.connections.borrow()?;
        link.write(payload.to_string())
            .map_err(|e| contain(e, &path, NO_DATA))?;

        *cursor = Some(link);
        Ok(())
    }

    fn response(&self, template: &Path, link: &mut dyn Link) -> Result<()> {
        let path = template.display().to_string();

        let raw = link.read_one().map_err(|e| contain(e, &path, NO_DATA))?;
        let incoming: Value = serde_json::from_str(&raw).map_err(|e| {
            FlowFailure::logic_with_detail(
                &path,
                format!("Received response is not valid JSON: {e}"),
                raw.as_str(),
                raw.as_str(),
            )
        })?;
        let received = pretty(&incoming);

        self.store.inject_response(incoming.clone());

        let rendered = self
            .services
            .renderer
            .render(template, self.store)
            .map_err(|e| contain(e, &path, &received))?;

        let expectations: Value = serde_json::from_str(&rendered).map_err(|e| {
            FlowFailure::logic_with_detail(
                &path,
                format!("Rendered expectations are not valid JSON: {e}"),
                rendered.as_str(),
                received.as_str(),
            )
        })?;

        self.services.reporter.record(Event::Response {
            path: path.clone(),
            response: received.clone(),
            expectations: pretty(&expectations),
        });

        let validation = validate(&expectations, &incoming);
        if !validation.valid {
            tracing::debug!(path = %path, issues = validation.issues.len(), "Response did not match");
            return Err(FlowFailure::new(path, validation.issues, received).into());
        }

        Ok(())
    }

    fn run_flow(&self, dir: &Path) -> Result<()> {
        let path = dir.display().to_string();

        self.services
            .factory
            .load(dir)
            .and_then(|flow| {
                FlowRunner::new(self.services, format!("subflow[{path}]"), flow).run_with(self.store)
            })
            .map_err(|e| wrap(e, &path, "Subflow execution failed"))
    }

    fn repeat_block(&self, dir: &Path, steps: &[Step], repeat: u32) -> Result<()> {
        let path = dir.display().to_string();

        for iteration in 1..=repeat {
            self.services.reporter.record(Event::custom(
                "REPEAT",
                format!("[{iteration}] Running all steps in block"),
            ));

            let mut cursor: Cursor = None;
            self.run_steps(steps, &mut cursor)
                .map_err(|e| wrap(e, &path, "Block execution failed"))?;
        }

        Ok(())
    }
}

/// Turn any step error into a flow failure, except a stopped pool
fn contain(err: Error, path: &str, response: &str) -> Error {
    match err {
        Error::PoolStopped | Error::Flow(_) => err,
        other => FlowFailure::logic(path, other.to_string(), response).into(),
    }
}

/// Re-raise a nested flow-scoped error under `path` with one extra `LOGIC_ERROR`
fn wrap(err: Error, path: &str, message: &str) -> Error {
    match err.into_flow_failure(path) {
        Ok(failure) => failure.wrap(path, message).into(),
        Err(fatal) => fatal,
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
