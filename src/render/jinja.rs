//! Jinja template renderer with store callbacks

use std::path::Path;
use std::sync::Arc;

use minijinja::{AutoEscape, Environment, Error as JinjaError, ErrorKind, Value};

use super::Renderer;
use crate::common::{Error, Result};
use crate::flow::Store;
use crate::reporting::{Event, ReportSink};
use crate::transport::Fetcher;

/// Renders flow templates with minijinja
///
/// The template context is a snapshot of the store taken when rendering
/// starts; the `load` callback always reads the live store.
pub struct TemplateRenderer {
    reporter: Arc<dyn ReportSink>,
    fetcher: Arc<dyn Fetcher>,
}

impl TemplateRenderer {
    pub fn new(reporter: Arc<dyn ReportSink>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self { reporter, fetcher }
    }

    /// Render template source directly; `name` only shows up in error messages
    pub fn render_source(&self, name: &str, source: &str, store: &Store) -> Result<String> {
        let env = self.environment(store);
        env.render_named_str(name, source, store.snapshot())
            .map_err(|e| Error::template(name, describe(&e)))
    }

    fn environment(&self, store: &Store) -> Environment<'static> {
        let mut env = Environment::new();
        // Templates are named after their files; `.json` must not switch on JSON escaping
        env.set_auto_escape_callback(|_| AutoEscape::None);

        let target = store.clone();
        env.add_function("store", move |value: Value, name: String| -> std::result::Result<Value, JinjaError> {
            target.set(name, to_json(&value)?);
            Ok(Value::UNDEFINED)
        });

        let target = store.clone();
        env.add_function(
            "storeAndReturn",
            move |value: Value, name: String| -> std::result::Result<Value, JinjaError> {
                target.set(name, to_json(&value)?);
                Ok(value)
            },
        );

        let source = store.clone();
        env.add_function("load", move |name: String| -> Value {
            source
                .get(&name)
                .map(|v| Value::from_serialize(&v))
                .unwrap_or(Value::UNDEFINED)
        });

        env.add_function("combine", |a: Value, b: Value| -> std::result::Result<Value, JinjaError> {
            let combined = combine(to_json(&a)?, to_json(&b)?)?;
            Ok(Value::from_serialize(&combined))
        });

        env.add_function("equal", |a: Value, b: Value| -> std::result::Result<bool, JinjaError> {
            Ok(to_json(&a)? == to_json(&b)?)
        });

        env.add_function("assert", |condition: Value, message: String| -> std::result::Result<Value, JinjaError> {
            if condition.is_true() {
                Ok(Value::UNDEFINED)
            } else {
                Err(JinjaError::new(ErrorKind::InvalidOperation, message))
            }
        });

        let reporter = Arc::clone(&self.reporter);
        env.add_function("report", move |message: Value| -> Value {
            let text = match message.as_str() {
                Some(s) => s.to_string(),
                None => message.to_string(),
            };
            reporter.record(Event::custom("CUSTOM", text));
            Value::UNDEFINED
        });

        let reporter = Arc::clone(&self.reporter);
        let fetcher = Arc::clone(&self.fetcher);
        let target = store.clone();
        env.add_function("fetch", move |url: String, name: String| -> std::result::Result<Value, JinjaError> {
            reporter.record(Event::custom("FETCH", format!("{url} into {name}")));
            let body = fetcher
                .get(&url)
                .map_err(|e| JinjaError::new(ErrorKind::InvalidOperation, e.to_string()))?;
            if !body.is_empty() {
                target.set(name, serde_json::Value::String(body));
            }
            Ok(Value::UNDEFINED)
        });

        let reporter = Arc::clone(&self.reporter);
        let fetcher = Arc::clone(&self.fetcher);
        let target = store.clone();
        env.add_function(
            "fetch_json",
            move |url: String, name: String| -> std::result::Result<Value, JinjaError> {
                reporter.record(Event::custom("FETCH JSON", format!("{url} into {name}")));
                let body = fetcher
                    .post(&url)
                    .map_err(|e| JinjaError::new(ErrorKind::InvalidOperation, e.to_string()))?;
                if !body.is_empty() {
                    let parsed: serde_json::Value = serde_json::from_str(&body).map_err(|e| {
                        JinjaError::new(
                            ErrorKind::InvalidOperation,
                            format!("response of {url} is not JSON: {e}"),
                        )
                    })?;
                    target.set(name, parsed);
                }
                Ok(Value::UNDEFINED)
            },
        );

        env
    }
}

impl Renderer for TemplateRenderer {
    fn render(&self, template: &Path, store: &Store) -> Result<String> {
        let source = std::fs::read_to_string(template)
            .map_err(|e| Error::template(template, format!("cannot read template: {e}")))?;
        self.render_source(&template.display().to_string(), &source, store)
    }
}

fn to_json(value: &Value) -> std::result::Result<serde_json::Value, JinjaError> {
    serde_json::to_value(value).map_err(|e| {
        JinjaError::new(
            ErrorKind::InvalidOperation,
            format!("value is not representable as JSON: {e}"),
        )
    })
}

/// Concatenate two arrays or merge two objects, the right side winning on conflicts
fn combine(
    a: serde_json::Value,
    b: serde_json::Value,
) -> std::result::Result<serde_json::Value, JinjaError> {
    use serde_json::Value as Json;

    match (a, b) {
        (Json::Array(mut left), Json::Array(right)) => {
            left.extend(right);
            Ok(Json::Array(left))
        }
        (Json::Object(mut left), Json::Object(right)) => {
            left.extend(right);
            Ok(Json::Object(left))
        }
        (a, b) => Err(JinjaError::new(
            ErrorKind::InvalidOperation,
            format!("cannot combine {a} with {b}"),
        )),
    }
}

/// Error text including the chain of causes
fn describe(err: &JinjaError) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(&format!(": {cause}"));
        source = cause.source();
    }
    message
}
