//! Colored console rendering of run events

use colored::Colorize;

use super::{Event, ReportSink};
use crate::validation::{Issue, IssueKind};

/// Prints events to stdout
///
/// Verbosity 0 prints nothing, 1 prints discovery, progress and verdicts,
/// 2 also prints request and response payloads.
pub struct ConsoleReporter {
    verbosity: u8,
}

impl ConsoleReporter {
    pub fn new(verbosity: u8) -> Self {
        Self { verbosity }
    }

    pub fn verbosity(&self) -> u8 {
        self.verbosity
    }

    /// Render an event, or `None` when it is filtered out at this verbosity
    pub fn format(&self, event: &Event) -> Option<String> {
        let required = match event {
            Event::Request { .. } | Event::Response { .. } => 2,
            _ => 1,
        };
        if self.verbosity < required {
            return None;
        }

        let text = match event {
            Event::Detect { name } => simple_line(event.label(), name),
            Event::Custom { label, message } => simple_line(label, message),
            Event::Success { flow } => format!(
                "{} {} {}",
                "+ |".white(),
                "SUCCESS".green().bold(),
                flow.cyan().bold()
            ),
            Event::Failure {
                flow,
                path,
                issues,
                response,
            } => {
                let issues: Vec<String> = issues.iter().map(format_issue).collect();
                format!(
                    "{} {} '{}':\n [-] Failed '{}':\n\nIssues:\n{}\n\nLive response:\n---\n{}\n---",
                    "- |".white(),
                    "FAIL".red().bold(),
                    flow.cyan().bold(),
                    path.magenta().bold(),
                    issues.join("\n"),
                    response.purple().italic()
                )
            }
            Event::Request {
                path,
                store,
                payload,
            } => {
                let store = serde_json::to_string_pretty(store).unwrap_or_else(|_| store.to_string());
                format!(
                    "{}\nRequest data:\n---\n{}\n---\nStore state:\n---\n{}\n---",
                    simple_line(event.label(), path),
                    payload.cyan().italic(),
                    store.blue().italic()
                )
            }
            Event::Response {
                path,
                response,
                expectations,
            } => format!(
                "{}\nResponse:\n---\n{}\n---\nExpectations:\n---\n{}\n---",
                simple_line(event.label(), path),
                response.cyan().italic(),
                expectations.blue().italic()
            ),
        };

        Some(text)
    }
}

impl ReportSink for ConsoleReporter {
    fn record(&self, event: Event) {
        if let Some(text) = self.format(&event) {
            println!("{}", text);
        }
    }
}

fn simple_line(label: &str, message: &str) -> String {
    format!(
        "{} {} {}",
        "? |".white(),
        label.green().bold(),
        message.cyan().bold()
    )
}

fn format_issue(issue: &Issue) -> String {
    let kind = match issue.kind {
        IssueKind::LogicError => "LOGIC".bright_red().bold(),
        IssueKind::NoMatch => "NO MATCH".red().bold(),
        IssueKind::NotEqual => "NOT EQUAL".red().bold(),
        IssueKind::TypeCheck => "WRONG TYPE".red().bold(),
    };

    let mut line = format!(
        "  {} {} [{}]: {}",
        "-".red().bold(),
        kind,
        issue.path.cyan().bold(),
        issue.message
    );
    if let Some(detail) = &issue.detail {
        line.push_str(&format!("\n\nExtra detail:\n---\n{}\n---\n", detail));
    }
    line
}
