//! Scheduler
//!
//! Runs every discovered flow in isolation. A flow failure is reported and
//! the next flow starts; only errors outside a single flow abort the run.

use crate::common::Result;
use crate::crawler::{Crawler, DiscoveredFlow};
use crate::flow::{FlowRunner, Services};
use crate::reporting::Event;

/// Outcome of one scheduling pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub passed: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.passed + self.failed
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

pub struct Scheduler {
    services: Services,
    crawler: Crawler,
}

impl Scheduler {
    pub fn new(services: Services, crawler: Crawler) -> Self {
        Self { services, crawler }
    }

    /// Discover and run all flows sequentially
    pub fn run(&self) -> Result<RunSummary> {
        let flows = self.crawler.crawl(self.services.reporter.as_ref())?;
        let mut summary = RunSummary::default();

        for flow in &flows {
            match self.run_flow(flow) {
                Ok(()) => {
                    tracing::info!(flow = %flow.name, "Flow passed");
                    self.services.reporter.record(Event::Success {
                        flow: flow.name.clone(),
                    });
                    summary.passed += 1;
                }
                Err(e) => {
                    let failure = e.into_flow_failure(&flow.dir.display().to_string())?;
                    tracing::info!(flow = %flow.name, issues = failure.issues.len(), "Flow failed");
                    self.services.reporter.record(Event::Failure {
                        flow: flow.name.clone(),
                        path: failure.path,
                        issues: failure.issues,
                        response: failure.response,
                    });
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }

    fn run_flow(&self, flow: &DiscoveredFlow) -> Result<()> {
        let loaded = self.services.factory.load(&flow.dir)?;
        FlowRunner::new(&self.services, flow.name.as_str(), loaded).run()?;
        Ok(())
    }
}
