//! Runtime values shared by the evaluator, interpolation, and the execution context.
//!
//! [`Value`] is a closed set of shapes. Automation documents and run logs speak JSON, so
//! conversions in both directions are provided; a [`Value::Placeholder`] stands in for the
//! result of a capability call that an external operator has not realized yet.

use std::fmt;

use indexmap::IndexMap;
use serde_json::{Map as JsonMap, Number as JsonNumber, Value as JsonValue};

/// Key used when a placeholder is rendered as JSON.
pub const PLACEHOLDER_KEY: &str = "_placeholder";

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Object(IndexMap<String, Value>),
    /// Opaque stand-in for a capability result, carrying a human-readable description.
    Placeholder(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(flag) => *flag,
            Value::Number(number) => *number != 0.0 && !number.is_nan(),
            Value::String(text) => !text.is_empty(),
            Value::Array(_) | Value::Object(_) | Value::Placeholder(_) => true,
        }
    }

    /// Result of the `typeof` operator.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Null | Value::Array(_) | Value::Object(_) | Value::Placeholder(_) => "object",
        }
    }

    /// Numeric coercion used by arithmetic and relational operators.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Null => 0.0,
            Value::Bool(flag) => f64::from(u8::from(*flag)),
            Value::Number(number) => *number,
            Value::String(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse::<f64>().unwrap_or(f64::NAN)
                }
            }
            Value::Array(items) if items.is_empty() => 0.0,
            Value::Array(items) if items.len() == 1 => items[0].to_number(),
            Value::Array(_) | Value::Object(_) | Value::Placeholder(_) => f64::NAN,
        }
    }

    /// String coercion used by `+`, template literals, and `String(...)`.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(flag) => flag.to_string(),
            Value::Number(number) => format_number(*number),
            Value::String(text) => text.clone(),
            Value::Array(items) => items
                .iter()
                .map(|item| if item.is_null() { String::new() } else { item.to_display_string() })
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) => "[object Object]".to_string(),
            Value::Placeholder(_) => self.to_json().to_string(),
        }
    }

    /// Text substituted for a `${...}` placeholder: structures render as compact JSON.
    pub fn render(&self) -> String {
        match self {
            Value::Array(_) | Value::Object(_) | Value::Placeholder(_) => self.to_json().to_string(),
            other => other.to_display_string(),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(flag) => JsonValue::Bool(*flag),
            Value::Number(number) => number_to_json(*number),
            Value::String(text) => JsonValue::String(text.clone()),
            Value::Array(items) => JsonValue::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(entries) => {
                JsonValue::Object(entries.iter().map(|(key, value)| (key.clone(), value.to_json())).collect())
            }
            Value::Placeholder(description) => {
                let mut map = JsonMap::new();
                map.insert(PLACEHOLDER_KEY.to_string(), JsonValue::String(description.clone()));
                JsonValue::Object(map)
            }
        }
    }

    /// Strict (`===`) equality. Structures compare by content.
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(left), Value::Number(right)) => left == right,
            _ => self == other,
        }
    }

    /// Loose (`==`) equality with primitive coercion between numbers, strings, and booleans.
    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Null, _) | (_, Value::Null) => false,
            (
                Value::Number(_) | Value::String(_) | Value::Bool(_),
                Value::Number(_) | Value::String(_) | Value::Bool(_),
            ) if std::mem::discriminant(self) != std::mem::discriminant(other) => self.to_number() == other.to_number(),
            _ => self.strict_equals(other),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<&JsonValue> for Value {
    fn from(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(flag) => Value::Bool(*flag),
            JsonValue::Number(number) => Value::Number(number.as_f64().unwrap_or(f64::NAN)),
            JsonValue::String(text) => Value::String(text.clone()),
            JsonValue::Array(items) => Value::Array(items.iter().map(Value::from).collect()),
            JsonValue::Object(entries) => {
                Value::Object(entries.iter().map(|(key, value)| (key.clone(), Value::from(value))).collect())
            }
        }
    }
}

impl From<JsonValue> for Value {
    fn from(value: JsonValue) -> Self {
        Value::from(&value)
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::String(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::String(text)
    }
}

impl From<f64> for Value {
    fn from(number: f64) -> Self {
        Value::Number(number)
    }
}

impl From<bool> for Value {
    fn from(flag: bool) -> Self {
        Value::Bool(flag)
    }
}

/// Largest magnitude at which every integer is exactly representable as `f64`.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Formats a number the way scripts expect: integral values print without a fraction.
pub fn format_number(number: f64) -> String {
    if number.is_nan() {
        return "NaN".to_string();
    }
    if number.is_infinite() {
        return if number > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if number == 0.0 {
        return "0".to_string();
    }
    if number.fract() == 0.0 && number.abs() < 1e21 {
        return format!("{number:.0}");
    }
    number.to_string()
}

fn number_to_json(number: f64) -> JsonValue {
    if number.fract() == 0.0 && number.abs() <= MAX_SAFE_INTEGER {
        return JsonValue::Number(JsonNumber::from(number as i64));
    }
    JsonNumber::from_f64(number).map(JsonValue::Number).unwrap_or(JsonValue::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_round_trip_keeps_integers_integral() {
        let source = json!({"count": 42, "ratio": 0.5, "tags": ["a", null], "ok": true});
        let value = Value::from(&source);
        assert_eq!(value.to_json(), source);
        assert_eq!(Value::Number(f64::NAN).to_json(), JsonValue::Null);
    }

    #[test]
    fn number_formatting() {
        assert_eq!(format_number(42.0), "42");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(format_number(f64::INFINITY), "Infinity");
        assert_eq!(format_number(1.5), "1.5");
    }

    #[test]
    fn rendering_for_interpolation() {
        assert_eq!(Value::from("plain").render(), "plain");
        assert_eq!(Value::Null.render(), "null");
        assert_eq!(Value::from(&json!([1, 2])).render(), "[1,2]");
        assert_eq!(Value::from(&json!({"a": 1})).render(), r#"{"a":1}"#);
        assert_eq!(
            Value::Placeholder("Result of feeds.list".into()).render(),
            r#"{"_placeholder":"Result of feeds.list"}"#
        );
    }

    #[test]
    fn truthiness_and_equality() {
        assert!(!Value::from("").is_truthy());
        assert!(Value::Array(Vec::new()).is_truthy());
        assert!(!Value::Number(f64::NAN).is_truthy());
        assert!(Value::from("5").loose_equals(&Value::Number(5.0)));
        assert!(!Value::from("5").strict_equals(&Value::Number(5.0)));
        assert!(!Value::Null.loose_equals(&Value::Number(0.0)));
        assert!(Value::Bool(true).loose_equals(&Value::Number(1.0)));
    }
}
