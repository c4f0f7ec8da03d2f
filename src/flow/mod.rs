//! Flow execution engine
//!
//! A flow is a directory holding `script.yaml` plus the request and
//! expectation templates it references. [`FlowFactory`] turns directories
//! into immutable [`Flow`]s and [`FlowRunner`] executes them step by step.

mod descriptor;
#[allow(clippy::module_inception)]
mod flow;
mod runner;
mod step;
mod store;

#[cfg(test)]
pub(crate) mod testkit;

pub use descriptor::{FlowMeta, FlowScript, StepDescriptor, SCRIPT_FILE};
pub use flow::{Flow, FlowFactory, Step};
pub use runner::FlowRunner;
pub use store::{Store, ENV_FILE, RESPONSE_KEY};

use std::sync::Arc;

use crate::render::Renderer;
use crate::reporting::ReportSink;
use crate::transport::ConnectionSource;

/// Collaborators shared by every step of a run
#[derive(Clone)]
pub struct Services {
    pub renderer: Arc<dyn Renderer>,
    pub connections: Arc<dyn ConnectionSource>,
    pub reporter: Arc<dyn ReportSink>,
    pub factory: Arc<FlowFactory>,
}
