//! CLI command handling
//!
//! Wires configuration, transport, rendering and reporting together and
//! dispatches the parsed command.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;

use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::Result;
use crate::crawler::Crawler;
use crate::flow::{FlowFactory, Services};
use crate::render::TemplateRenderer;
use crate::reporting::{ConsoleReporter, Event, EventLog, Fanout, ReportSink};
use crate::scheduler::{RunSummary, Scheduler};
use crate::transport::{ConnectionPool, Endpoint, HttpFetcher};

/// Timeout for the `fetch` template helpers
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Effective settings of a `run`, config file values overridden by flags
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub endpoint: Endpoint,
    pub verbosity: u8,
    pub pool_size: usize,
    pub connect_timeout: Duration,
}

impl RunSettings {
    pub fn resolve(
        config: &Config,
        host: Option<String>,
        port: Option<u16>,
        ws_path: Option<String>,
        verbosity: Option<u8>,
        pool_size: Option<usize>,
        connect_timeout: Option<u64>,
    ) -> Self {
        let endpoint = Endpoint::new(
            host.unwrap_or_else(|| config.server.host.clone()),
            port.unwrap_or(config.server.port),
        )
        .with_path(ws_path.unwrap_or_else(|| config.server.path.clone()));

        Self {
            endpoint,
            verbosity: verbosity.unwrap_or(config.output.verbosity),
            pool_size: pool_size.unwrap_or(config.pool.size).max(1),
            connect_timeout: connect_timeout
                .map(Duration::from_secs)
                .unwrap_or_else(|| config.pool.connect_timeout()),
        }
    }
}

/// Dispatch a CLI command
pub fn dispatch(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Run {
            path,
            host,
            port,
            ws_path,
            filter,
            verbose,
            pool_size,
            connect_timeout,
            log_file: _,
        } => {
            let settings = RunSettings::resolve(
                config,
                host,
                port,
                ws_path,
                verbose,
                pool_size,
                connect_timeout,
            );
            let report = run(&path, &filter, &settings)?;

            if settings.verbosity > 0 {
                print_summary(&report);
            }
            Ok(())
        }

        Commands::List { path, filter } => list(&path, &filter),
    }
}

/// Outcome of a `run`: the counts plus every failed flow with its failing template
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub summary: RunSummary,
    pub failures: Vec<(String, String)>,
}

/// Run all flows under `root` against the configured server
pub fn run(root: &Path, filter: &str, settings: &RunSettings) -> Result<RunReport> {
    tracing::info!(
        root = %root.display(),
        endpoint = %settings.endpoint,
        pool_size = settings.pool_size,
        "Starting run"
    );

    let (reporter, log) = reporters(settings.verbosity);
    let fetcher = Arc::new(HttpFetcher::new(FETCH_TIMEOUT)?);
    let pool = Arc::new(ConnectionPool::connect(
        settings.endpoint.clone(),
        settings.pool_size,
        settings.connect_timeout,
    )?);

    let services = Services {
        renderer: Arc::new(TemplateRenderer::new(Arc::clone(&reporter), fetcher)),
        connections: pool.clone(),
        reporter,
        factory: Arc::new(FlowFactory::new()),
    };

    let outcome = Scheduler::new(services, Crawler::new(root, filter)).run();
    pool.stop();

    Ok(RunReport {
        summary: outcome?,
        failures: failures(&log),
    })
}

/// Console output plus an in-memory copy of every event for the final summary
fn reporters(verbosity: u8) -> (Arc<dyn ReportSink>, Arc<EventLog>) {
    let log = Arc::new(EventLog::new());
    let console: Arc<dyn ReportSink> = Arc::new(ConsoleReporter::new(verbosity));
    let recorder: Arc<dyn ReportSink> = log.clone();
    (Arc::new(Fanout::new(vec![console, recorder])), log)
}

fn failures(log: &EventLog) -> Vec<(String, String)> {
    log.events()
        .into_iter()
        .filter_map(|event| match event {
            Event::Failure { flow, path, .. } => Some((flow, path)),
            _ => None,
        })
        .collect()
}

fn list(root: &Path, filter: &str) -> Result<()> {
    let crawler = Crawler::new(root, filter);
    let flows = crawler.crawl(&ConsoleReporter::new(0))?;
    let factory = FlowFactory::new();

    println!("\n{} {}", "Flows in".blue().bold(), root.display().to_string().white().bold());

    let mut broken = 0;
    for flow in &flows {
        match factory.load(&flow.dir) {
            Ok(loaded) => {
                let subject = loaded
                    .meta()
                    .and_then(|m| m.subject.as_deref())
                    .unwrap_or("");
                println!(
                    "  {} {} {} {}",
                    "✓".green(),
                    flow.name.white().bold(),
                    format!("({} steps)", loaded.steps().len()).dimmed(),
                    subject.dimmed()
                );
            }
            Err(e) => {
                broken += 1;
                println!("  {} {}: {}", "✗".red(), flow.name.white().bold(), e);
            }
        }
    }

    println!(
        "\n{} flow(s), {} with errors",
        flows.len(),
        if broken > 0 {
            broken.to_string().red().bold()
        } else {
            broken.to_string().green()
        }
    );
    Ok(())
}

fn print_summary(report: &RunReport) {
    let summary = &report.summary;
    let verdict = if summary.all_passed() {
        "All flows passed".green().bold()
    } else {
        "Some flows failed".red().bold()
    };

    println!(
        "\n{} ({} passed, {} failed, {} total)",
        verdict,
        summary.passed.to_string().green(),
        summary.failed.to_string().red(),
        summary.total()
    );

    for (flow, path) in &report.failures {
        println!("  {} {} {}", "✗".red(), flow.white().bold(), format!("at {path}").dimmed());
    }
}
