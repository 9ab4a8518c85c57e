// Variable bindings and loosely-typed value semantics

//! # Variables
//!
//! The execution's variable map is a plain JSON object. Policy authors write
//! graphs against loosely-typed application data (numbers arrive as strings,
//! flags as `0`/`1`), so comparisons and rendering follow the coercion rules
//! those authors already expect from JavaScript-style tooling:
//!
//! - [`to_number`]: `Number()`-style coercion
//! - [`loose_eq`]: `==`-style equality
//! - [`compare`]: relational ordering (`<`, `>`, ...)
//! - [`render`]: `String()`-style rendering for reason templates
//!
//! The map keeps insertion order (`serde_json` is built with `preserve_order`).

use serde_json::{Map, Number, Value};
use std::cmp::Ordering;

/// Insertion-ordered name -> value bindings for one execution
pub type Variables = Map<String, Value>;

/// Resolve a configured operand against the variable map
///
/// A string that names an existing variable is replaced by that variable's
/// current value; anything else is used literally.
pub fn resolve_operand(operand: &Value, variables: &Variables) -> Value {
    match operand {
        Value::String(name) => variables
            .get(name)
            .cloned()
            .unwrap_or_else(|| operand.clone()),
        other => other.clone(),
    }
}

/// Coerce a value to a number; `NaN` when no numeric reading exists
pub fn to_number(value: &Value) -> f64 {
    match value {
        Value::Null => 0.0,
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                trimmed.parse::<f64>().unwrap_or(f64::NAN)
            }
        }
        Value::Array(_) | Value::Object(_) => f64::NAN,
    }
}

/// Loose equality between two resolved operands
pub fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Number(_), Value::Number(_))
        | (Value::Number(_), Value::String(_))
        | (Value::String(_), Value::Number(_))
        | (Value::Bool(_), _)
        | (_, Value::Bool(_))
            if is_primitive(left) && is_primitive(right) =>
        {
            to_number(left) == to_number(right)
        }
        _ => left == right,
    }
}

/// Strict equality used for membership tests
pub fn strict_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

/// Relational ordering; `None` when the operands are not comparable
pub fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => to_number(left).partial_cmp(&to_number(right)),
    }
}

fn is_primitive(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

/// Render a value the way it should appear inside reason text
pub fn render(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => render_number(n),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => render(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

fn render_number(n: &Number) -> String {
    if n.is_i64() || n.is_u64() {
        return n.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}

/// Convert an arithmetic result into a JSON number
///
/// Integral results are stored as integers so that `2000` renders as `2000`
/// rather than `2000.0`. Returns `None` for NaN and infinities.
pub fn number_value(value: f64) -> Option<Value> {
    if !value.is_finite() {
        return None;
    }
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        return Some(Value::from(value as i64));
    }
    Number::from_f64(value).map(Value::Number)
}

/// Serialize a value with object keys sorted at every level
///
/// Two parameter sets that differ only in key order produce the same text,
/// which makes the output usable as a cache key.
pub fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let body = keys
                .into_iter()
                .map(|key| {
                    format!(
                        "{}:{}",
                        Value::String(key.clone()),
                        canonical_json(&map[key.as_str()])
                    )
                })
                .collect::<Vec<_>>()
                .join(",");
            format!("{{{}}}", body)
        }
        Value::Array(items) => {
            let body = items
                .iter()
                .map(canonical_json)
                .collect::<Vec<_>>()
                .join(",");
            format!("[{}]", body)
        }
        other => other.to_string(),
    }
}

/// Look up a dot-separated path (`report.score`, `accounts.0.balance`)
pub fn value_at_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index)),
            _ => None,
        })
}
