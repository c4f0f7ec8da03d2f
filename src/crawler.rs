//! Flow discovery
//!
//! Walks `<root>/flows` and returns every sub-directory holding a
//! `script.yaml`, sorted by name.

use std::path::{Path, PathBuf};

use crate::common::{Error, Result};
use crate::flow::SCRIPT_FILE;
use crate::reporting::{Event, ReportSink};

/// Directory under the root that holds one sub-directory per flow
pub const FLOWS_DIR: &str = "flows";

/// A flow directory found by the crawler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFlow {
    pub name: String,
    pub dir: PathBuf,
}

pub struct Crawler {
    root: PathBuf,
    filter: String,
}

impl Crawler {
    /// `filter` is a substring a flow name must contain; empty matches everything
    pub fn new(root: impl Into<PathBuf>, filter: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            filter: filter.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Discover flows, emitting a `Detect` event for every flow directory
    pub fn crawl(&self, reporter: &dyn ReportSink) -> Result<Vec<DiscoveredFlow>> {
        let flows_dir = self.root.join(FLOWS_DIR);
        if !flows_dir.is_dir() {
            return Err(Error::Config(format!(
                "'{}' does not appear to be valid: missing '{}' sub directory",
                self.root.display(),
                FLOWS_DIR
            )));
        }

        let mut dirs: Vec<(String, PathBuf)> = std::fs::read_dir(&flows_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .filter_map(|path| {
                let name = path.file_name()?.to_string_lossy().into_owned();
                Some((name, path))
            })
            .collect();
        dirs.sort();

        let mut flows = Vec::new();
        for (name, dir) in dirs {
            reporter.record(Event::Detect { name: name.clone() });

            if !dir.join(SCRIPT_FILE).is_file() {
                tracing::debug!(flow = %name, "Skipping directory without {}", SCRIPT_FILE);
                continue;
            }
            if !name.contains(&self.filter) {
                tracing::debug!(flow = %name, filter = %self.filter, "Skipping filtered flow");
                continue;
            }

            flows.push(DiscoveredFlow { name, dir });
        }

        tracing::info!(count = flows.len(), root = %self.root.display(), "Flows discovered");
        Ok(flows)
    }
}
