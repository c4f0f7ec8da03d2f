//! Executable flows and the factory that loads them

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use super::descriptor::{FlowMeta, FlowScript, StepDescriptor, SCRIPT_FILE};
use crate::common::{Error, Result};

/// One executable step with every path already resolved
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Render `template`, send it on a freshly borrowed connection
    Request { template: PathBuf },
    /// Read one frame from the current connection, validate it against `template`
    Response { template: PathBuf },
    /// Run the flow in `dir` sharing the current store
    RunFlow { dir: PathBuf },
    /// Run `steps` `repeat` times; `dir` is the owning flow directory
    Block {
        dir: PathBuf,
        steps: Vec<Step>,
        repeat: u32,
    },
}

/// Immutable, ready to run flow
#[derive(Debug)]
pub struct Flow {
    name: String,
    dir: PathBuf,
    meta: Option<FlowMeta>,
    steps: Vec<Step>,
}

impl Flow {
    /// Build a flow from its parsed script
    ///
    /// Templates resolve against `dir`, `run_flow` names against its parent.
    /// Every referenced template must exist.
    pub fn from_script(dir: &Path, script: FlowScript) -> Result<Self> {
        let script_path = dir.join(SCRIPT_FILE);
        let steps = build_steps(dir, &script_path, &script.steps)?;

        Ok(Self {
            name: flow_name(dir),
            dir: dir.to_path_buf(),
            meta: script.meta,
            steps,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn meta(&self) -> Option<&FlowMeta> {
        self.meta.as_ref()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Directories of every flow this one runs, nested blocks included
    pub fn sub_flows(&self) -> Vec<&Path> {
        fn collect<'a>(steps: &'a [Step], out: &mut Vec<&'a Path>) {
            for step in steps {
                match step {
                    Step::RunFlow { dir } => out.push(dir),
                    Step::Block { steps, .. } => collect(steps, out),
                    Step::Request { .. } | Step::Response { .. } => {}
                }
            }
        }

        let mut dirs = Vec::new();
        collect(&self.steps, &mut dirs);
        dirs
    }
}

fn flow_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.display().to_string())
}

fn build_steps(dir: &Path, script_path: &Path, steps: &[StepDescriptor]) -> Result<Vec<Step>> {
    steps
        .iter()
        .map(|step| {
            Ok(match step {
                StepDescriptor::Request { file } => Step::Request {
                    template: template_path(dir, script_path, file)?,
                },
                StepDescriptor::Response { file } => Step::Response {
                    template: template_path(dir, script_path, file)?,
                },
                StepDescriptor::RunFlow { name } => Step::RunFlow {
                    dir: dir.parent().unwrap_or(dir).join(name),
                },
                StepDescriptor::Block { steps, repeat } => Step::Block {
                    dir: dir.to_path_buf(),
                    steps: build_steps(dir, script_path, steps)?,
                    repeat: *repeat,
                },
            })
        })
        .collect()
}

fn template_path(dir: &Path, script_path: &Path, file: &str) -> Result<PathBuf> {
    let path = dir.join(file);
    if !path.is_file() {
        return Err(Error::descriptor(
            script_path,
            format!("template '{}' does not exist", path.display()),
        ));
    }
    Ok(path)
}

/// Loads flows by directory and caches them
///
/// Sub-flows are loaded eagerly so a broken or cyclic reference is reported
/// when the referencing flow is loaded, not halfway through running it.
#[derive(Default)]
pub struct FlowFactory {
    cache: Mutex<HashMap<PathBuf, Arc<Flow>>>,
}

impl FlowFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the flow in `dir`, reusing a cached copy when available
    pub fn load(&self, dir: &Path) -> Result<Arc<Flow>> {
        let mut chain = Vec::new();
        self.load_checked(dir, &mut chain)
    }

    /// Number of flows loaded so far
    pub fn cached(&self) -> usize {
        self.cache.lock().len()
    }

    fn load_checked(&self, dir: &Path, chain: &mut Vec<PathBuf>) -> Result<Arc<Flow>> {
        if let Some(flow) = self.cache.lock().get(dir) {
            return Ok(Arc::clone(flow));
        }

        if chain.iter().any(|p| p == dir) {
            let cycle: Vec<String> = chain
                .iter()
                .chain(std::iter::once(&dir.to_path_buf()))
                .map(|p| flow_name(p))
                .collect();
            return Err(Error::descriptor(
                dir.join(SCRIPT_FILE),
                format!("flow cycle detected: {}", cycle.join(" -> ")),
            ));
        }

        tracing::debug!(dir = %dir.display(), "Loading flow");
        let script = FlowScript::load(dir)?;
        let flow = Flow::from_script(dir, script)?;

        chain.push(dir.to_path_buf());
        for sub in flow.sub_flows() {
            self.load_checked(sub, chain)?;
        }
        chain.pop();

        let flow = Arc::new(flow);
        self.cache
            .lock()
            .insert(dir.to_path_buf(), Arc::clone(&flow));
        Ok(flow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_flow(root: &Path, name: &str, script: &str, templates: &[&str]) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(SCRIPT_FILE), script).unwrap();
        for t in templates {
            fs::write(dir.join(t), "{}").unwrap();
        }
        dir
    }

    #[test]
    fn test_paths_resolve_against_flow_and_siblings() {
        let root = tempfile::tempdir().unwrap();
        write_flow(root.path(), "login", "steps: []\n", &[]);
        let dir = write_flow(
            root.path(),
            "main",
            "steps:\n  - type: request\n    file: req.json\n  - type: run_flow\n    name: login\n",
            &["req.json"],
        );

        let factory = FlowFactory::new();
        let flow = factory.load(&dir).unwrap();

        assert_eq!(flow.name(), "main");
        assert_eq!(
            flow.steps(),
            &[
                Step::Request {
                    template: dir.join("req.json")
                },
                Step::RunFlow {
                    dir: root.path().join("login")
                },
            ]
        );
        // the sibling was validated and cached too
        assert_eq!(factory.cached(), 2);
    }

    #[test]
    fn test_cache_returns_same_flow() {
        let root = tempfile::tempdir().unwrap();
        let dir = write_flow(root.path(), "a", "steps: []\n", &[]);

        let factory = FlowFactory::new();
        let first = factory.load(&dir).unwrap();
        let second = factory.load(&dir).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_missing_template_is_descriptor_error() {
        let root = tempfile::tempdir().unwrap();
        let dir = write_flow(
            root.path(),
            "a",
            "steps:\n  - type: response\n    file: missing.json\n",
            &[],
        );

        let err = FlowFactory::new().load(&dir).unwrap_err();
        assert!(matches!(err, Error::Descriptor { .. }));
        assert!(err.to_string().contains("missing.json"));
    }

    #[test]
    fn test_missing_sub_flow_is_reported_at_load() {
        let root = tempfile::tempdir().unwrap();
        let dir = write_flow(
            root.path(),
            "a",
            "steps:\n  - type: block\n    steps:\n      - type: run_flow\n        name: ghost\n",
            &[],
        );

        let err = FlowFactory::new().load(&dir).unwrap_err();
        assert!(err.is_flow_scoped());
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_cycle_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        let a = write_flow(root.path(), "a", "steps:\n  - type: run_flow\n    name: b\n", &[]);
        write_flow(root.path(), "b", "steps:\n  - type: run_flow\n    name: a\n", &[]);

        let err = FlowFactory::new().load(&a).unwrap_err();
        assert!(err.to_string().contains("flow cycle detected: a -> b -> a"));
    }
}
