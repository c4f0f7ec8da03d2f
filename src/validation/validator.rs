//! Structural response validator
//!
//! Expectations describe a required subset of the response. Objects are
//! matched key by key, `$`-prefixed strings are type sentinels and anything
//! else must be equal. Every discrepancy is collected, the walk never stops at
//! the first one.

use serde_json::Value;

use super::issue::{Issue, IssueKind};

/// Outcome of one validation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validation {
    pub valid: bool,
    pub issues: Vec<Issue>,
}

/// Validate `incoming` against `expectations`
pub fn validate(expectations: &Value, incoming: &Value) -> Validation {
    let mut issues = Vec::new();
    walk("", expectations, incoming, &mut issues);

    Validation {
        valid: issues.is_empty(),
        issues,
    }
}

fn walk(path: &str, expectations: &Value, incoming: &Value, issues: &mut Vec<Issue>) {
    if is_wildcard(expectations) {
        return;
    }

    match expectations {
        Value::Object(expected) => {
            for (key, expected_value) in expected {
                let full_path = join_path(path, key);
                match incoming.as_object().and_then(|obj| obj.get(key)) {
                    Some(actual) => walk(&full_path, expected_value, actual, issues),
                    None => issues.push(Issue::new(
                        IssueKind::NoMatch,
                        full_path,
                        "Key is not present in the response",
                    )),
                }
            }
        }
        Value::String(sentinel) if sentinel.starts_with('$') => {
            if !check_sentinel(sentinel, incoming) {
                issues.push(Issue::new(
                    IssueKind::TypeCheck,
                    path,
                    format!("{} is not met for value '{}'", expectations, incoming),
                ));
            }
        }
        _ => {
            if !json_eq(expectations, incoming) {
                issues.push(Issue::new(
                    IssueKind::NotEqual,
                    path,
                    format!("{} != {}", expectations, incoming),
                ));
            }
        }
    }
}

/// `null`, `{}` and `[]` accept anything
fn is_wildcard(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn join_path(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

/// Evaluate a `$`-prefixed sentinel against the runtime type of `incoming`
fn check_sentinel(sentinel: &str, incoming: &Value) -> bool {
    match sentinel {
        "$bool" => incoming.is_boolean(),
        "$string" => incoming.is_string(),
        "$double" => incoming.is_f64(),
        "$int" => incoming.is_i64() || incoming.is_u64(),
        "$uint" => incoming.is_u64(),
        "$object" => incoming.is_object(),
        "$array" => incoming.is_array(),
        other => match other
            .strip_prefix("$array=")
            .and_then(|n| n.trim().parse::<usize>().ok())
        {
            Some(len) => incoming.as_array().map_or(false, |items| items.len() == len),
            None => incoming.as_str() == Some(other),
        },
    }
}

/// JSON equality where numbers compare by value, so `5` equals `5.0`
fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                x == y
            } else if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
                x == y
            } else {
                x.as_f64() == y.as_f64()
            }
        }
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| json_eq(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(key, x)| ys.get(key).map_or(false, |y| json_eq(x, y)))
        }
        _ => a == b,
    }
}
