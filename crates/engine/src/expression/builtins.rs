//! Operators, member access, and the built-in functions available to expressions.
//!
//! Everything here is pure: values in, value out. Methods that take callbacks
//! (`map`, `filter`, ...) live in the interpreter because they evaluate code.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Value as JsonValue, ser::PrettyFormatter};

use super::{
    ExpressionError,
    ast::{BinaryOp, UnaryOp},
};
use crate::value::{Value, format_number};

const NAMESPACES: [&str; 4] = ["JSON", "Math", "Object", "Array"];
const GLOBAL_FUNCTIONS: [&str; 5] = ["Number", "String", "Boolean", "parseInt", "parseFloat"];

static FLOAT_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?(?:Infinity|(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?)").expect("valid regex"));

pub fn is_namespace(name: &str) -> bool {
    NAMESPACES.contains(&name)
}

pub fn is_global_function(name: &str) -> bool {
    GLOBAL_FUNCTIONS.contains(&name)
}

fn type_error(message: impl Into<String>) -> ExpressionError {
    ExpressionError::Type { message: message.into() }
}

pub fn unary(op: UnaryOp, operand: &Value) -> Value {
    match op {
        UnaryOp::Not => Value::Bool(!operand.is_truthy()),
        UnaryOp::Negate => Value::Number(-operand.to_number()),
        UnaryOp::Plus => Value::Number(operand.to_number()),
        UnaryOp::TypeOf => Value::String(operand.type_name().to_string()),
    }
}

pub fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, ExpressionError> {
    let value = match op {
        BinaryOp::Add => {
            if is_primitive_number_like(left) && is_primitive_number_like(right) {
                Value::Number(left.to_number() + right.to_number())
            } else {
                Value::String(format!("{}{}", left.to_display_string(), right.to_display_string()))
            }
        }
        BinaryOp::Subtract => Value::Number(left.to_number() - right.to_number()),
        BinaryOp::Multiply => Value::Number(left.to_number() * right.to_number()),
        BinaryOp::Divide | BinaryOp::Remainder => {
            let divisor = right.to_number();
            if divisor == 0.0 {
                return Err(ExpressionError::DivisionByZero);
            }
            let dividend = left.to_number();
            Value::Number(if op == BinaryOp::Divide { dividend / divisor } else { dividend % divisor })
        }
        BinaryOp::Power => Value::Number(left.to_number().powf(right.to_number())),
        BinaryOp::Less => Value::Bool(compare(left, right, |ordering| ordering.is_lt())),
        BinaryOp::LessEqual => Value::Bool(compare(left, right, |ordering| ordering.is_le())),
        BinaryOp::Greater => Value::Bool(compare(left, right, |ordering| ordering.is_gt())),
        BinaryOp::GreaterEqual => Value::Bool(compare(left, right, |ordering| ordering.is_ge())),
        BinaryOp::Equal => Value::Bool(left.loose_equals(right)),
        BinaryOp::NotEqual => Value::Bool(!left.loose_equals(right)),
        BinaryOp::StrictEqual => Value::Bool(left.strict_equals(right)),
        BinaryOp::StrictNotEqual => Value::Bool(!left.strict_equals(right)),
    };
    Ok(value)
}

fn is_primitive_number_like(value: &Value) -> bool {
    matches!(value, Value::Null | Value::Bool(_) | Value::Number(_))
}

/// Strings compare lexicographically; everything else numerically, with NaN never ordered.
fn compare(left: &Value, right: &Value, accept: impl Fn(std::cmp::Ordering) -> bool) -> bool {
    let ordering = match (left, right) {
        (Value::String(left), Value::String(right)) => Some(left.cmp(right)),
        _ => left.to_number().partial_cmp(&right.to_number()),
    };
    ordering.is_some_and(accept)
}

fn array_index(key: &Value) -> Option<usize> {
    match key {
        Value::Number(number) if number.fract() == 0.0 && *number >= 0.0 => Some(*number as usize),
        Value::String(text) => text.parse::<usize>().ok(),
        _ => None,
    }
}

/// Property read. Missing keys and out-of-range indexes yield null.
pub fn get_member(object: &Value, key: &Value) -> Result<Value, ExpressionError> {
    let value = match object {
        Value::Null => {
            return Err(type_error(format!(
                "cannot read properties of null (reading '{}')",
                key.to_display_string()
            )));
        }
        Value::Placeholder(description) => {
            return Err(type_error(format!(
                "cannot read '{}' of pending capability result ({description})",
                key.to_display_string()
            )));
        }
        Value::Object(entries) => entries.get(&key.to_display_string()).cloned().unwrap_or_default(),
        Value::Array(items) => match key {
            Value::String(name) if name == "length" => Value::Number(items.len() as f64),
            _ => array_index(key).and_then(|index| items.get(index).cloned()).unwrap_or_default(),
        },
        Value::String(text) => match key {
            Value::String(name) if name == "length" => Value::Number(text.chars().count() as f64),
            _ => array_index(key)
                .and_then(|index| text.chars().nth(index))
                .map(|found| Value::String(found.to_string()))
                .unwrap_or_default(),
        },
        Value::Bool(_) | Value::Number(_) => Value::Null,
    };
    Ok(value)
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

fn string_arg(args: &[Value], index: usize) -> String {
    match args.get(index) {
        Some(Value::Null) | None => String::new(),
        Some(value) => value.to_display_string(),
    }
}

/// Resolves `start`/`end` as used by `slice`: negative values count from the end.
fn slice_bounds(length: usize, start: Option<&Value>, end: Option<&Value>) -> (usize, usize) {
    let resolve = |value: Option<&Value>, default: usize| -> usize {
        match value {
            None | Some(Value::Null) => default,
            Some(value) => {
                let raw = value.to_number();
                if raw.is_nan() {
                    0
                } else if raw < 0.0 {
                    length.saturating_sub((-raw) as usize)
                } else {
                    (raw as usize).min(length)
                }
            }
        }
    };
    let start = resolve(start, 0);
    let end = resolve(end, length);
    (start, end.max(start))
}

/// Non-callback method call on a value.
pub fn call_method(receiver: &Value, method: &str, args: &[Value]) -> Result<Value, ExpressionError> {
    if method == "toString" {
        return Ok(Value::String(receiver.to_display_string()));
    }
    match receiver {
        Value::String(text) => string_method(text, method, args),
        Value::Array(items) => array_method(items, method, args),
        Value::Number(number) if method == "toFixed" => to_fixed(*number, &arg(args, 0)),
        Value::Null => Err(type_error(format!("cannot read properties of null (reading '{method}')"))),
        Value::Placeholder(description) => Err(type_error(format!(
            "cannot call '{method}' on pending capability result ({description})"
        ))),
        other => Err(type_error(format!("{method} is not a function on {}", other.type_name()))),
    }
}

fn string_method(text: &str, method: &str, args: &[Value]) -> Result<Value, ExpressionError> {
    let value = match method {
        "includes" => Value::Bool(text.contains(&string_arg(args, 0))),
        "startsWith" => Value::Bool(text.starts_with(&string_arg(args, 0))),
        "endsWith" => Value::Bool(text.ends_with(&string_arg(args, 0))),
        "toUpperCase" => Value::String(text.to_uppercase()),
        "toLowerCase" => Value::String(text.to_lowercase()),
        "trim" => Value::String(text.trim().to_string()),
        "indexOf" => {
            let needle = string_arg(args, 0);
            let index = text.find(&needle).map(|byte| text[..byte].chars().count() as f64);
            Value::Number(index.unwrap_or(-1.0))
        }
        "slice" => {
            let chars: Vec<char> = text.chars().collect();
            let (start, end) = slice_bounds(chars.len(), args.first(), args.get(1));
            Value::String(chars[start..end].iter().collect())
        }
        "split" => {
            let parts: Vec<Value> = match args.first() {
                None | Some(Value::Null) => vec![Value::String(text.to_string())],
                Some(separator) => {
                    let separator = separator.to_display_string();
                    if separator.is_empty() {
                        text.chars().map(|c| Value::String(c.to_string())).collect()
                    } else {
                        text.split(separator.as_str()).map(Value::from).collect()
                    }
                }
            };
            match args.get(1).map(Value::to_number) {
                Some(limit) if limit >= 0.0 => Value::Array(parts.into_iter().take(limit as usize).collect()),
                _ => Value::Array(parts),
            }
        }
        "replace" => Value::String(text.replacen(&string_arg(args, 0), &string_arg(args, 1), 1)),
        _ => return Err(type_error(format!("{method} is not a function on string"))),
    };
    Ok(value)
}

fn array_method(items: &[Value], method: &str, args: &[Value]) -> Result<Value, ExpressionError> {
    let value = match method {
        "includes" => {
            let needle = arg(args, 0);
            Value::Bool(items.iter().any(|item| item.strict_equals(&needle)))
        }
        "indexOf" => {
            let needle = arg(args, 0);
            let index = items.iter().position(|item| item.strict_equals(&needle));
            Value::Number(index.map(|index| index as f64).unwrap_or(-1.0))
        }
        "join" => {
            let separator = match args.first() {
                None | Some(Value::Null) => ",".to_string(),
                Some(separator) => separator.to_display_string(),
            };
            let rendered: Vec<String> = items
                .iter()
                .map(|item| if item.is_null() { String::new() } else { item.to_display_string() })
                .collect();
            Value::String(rendered.join(&separator))
        }
        "slice" => {
            let (start, end) = slice_bounds(items.len(), args.first(), args.get(1));
            Value::Array(items[start..end].to_vec())
        }
        "concat" => {
            let mut joined = items.to_vec();
            for extra in args {
                match extra {
                    Value::Array(more) => joined.extend(more.iter().cloned()),
                    other => joined.push(other.clone()),
                }
            }
            Value::Array(joined)
        }
        _ => return Err(type_error(format!("{method} is not a function on array"))),
    };
    Ok(value)
}

fn to_fixed(number: f64, digits: &Value) -> Result<Value, ExpressionError> {
    let digits = if digits.is_null() { 0.0 } else { digits.to_number() };
    if !(0.0..=100.0).contains(&digits) || digits.fract() != 0.0 {
        return Err(type_error("toFixed() digits argument must be between 0 and 100"));
    }
    if !number.is_finite() {
        return Ok(Value::String(format_number(number)));
    }
    let digits = digits as usize;
    let scale = 10f64.powi(digits as i32);
    let scaled = number * scale;
    let rendered = if (scaled.fract().abs() - 0.5).abs() < f64::EPSILON {
        format!("{:.*}", digits, scaled.round() / scale)
    } else {
        format!("{number:.digits$}")
    };
    Ok(Value::String(rendered))
}

/// `Math.PI` and friends.
pub fn namespace_constant(namespace: &str, name: &str) -> Result<Value, ExpressionError> {
    match (namespace, name) {
        ("Math", "PI") => Ok(Value::Number(std::f64::consts::PI)),
        ("Math", "E") => Ok(Value::Number(std::f64::consts::E)),
        _ => Err(ExpressionError::Unsupported {
            message: format!("{namespace}.{name} is not available"),
        }),
    }
}

pub fn call_namespace(namespace: &str, function: &str, args: &[Value]) -> Result<Value, ExpressionError> {
    match (namespace, function) {
        ("JSON", "stringify") => json_stringify(&arg(args, 0), args.get(2)),
        ("JSON", "parse") => serde_json::from_str::<JsonValue>(&string_arg(args, 0))
            .map(Value::from)
            .map_err(|error| type_error(format!("JSON.parse: {error}"))),
        ("Math", "max") => Ok(Value::Number(fold_numbers(args, f64::NEG_INFINITY, f64::max))),
        ("Math", "min") => Ok(Value::Number(fold_numbers(args, f64::INFINITY, f64::min))),
        ("Math", "round") => Ok(Value::Number((arg(args, 0).to_number() + 0.5).floor())),
        ("Math", "floor") => Ok(Value::Number(arg(args, 0).to_number().floor())),
        ("Math", "ceil") => Ok(Value::Number(arg(args, 0).to_number().ceil())),
        ("Math", "abs") => Ok(Value::Number(arg(args, 0).to_number().abs())),
        ("Object", "keys" | "values" | "entries") => object_listing(function, &arg(args, 0)),
        ("Array", "isArray") => Ok(Value::Bool(matches!(args.first(), Some(Value::Array(_))))),
        _ => Err(ExpressionError::Unsupported {
            message: format!("{namespace}.{function} is not available"),
        }),
    }
}

fn fold_numbers(args: &[Value], initial: f64, pick: fn(f64, f64) -> f64) -> f64 {
    let mut result = initial;
    for value in args {
        let number = value.to_number();
        if number.is_nan() {
            return f64::NAN;
        }
        result = pick(result, number);
    }
    result
}

fn json_stringify(value: &Value, indent: Option<&Value>) -> Result<Value, ExpressionError> {
    let json = value.to_json();
    let indent = match indent {
        Some(Value::Number(width)) if *width >= 1.0 => " ".repeat((*width as usize).min(10)),
        Some(Value::String(text)) => text.chars().take(10).collect(),
        _ => String::new(),
    };
    if indent.is_empty() {
        return Ok(Value::String(json.to_string()));
    }

    let mut buffer = Vec::new();
    let formatter = PrettyFormatter::with_indent(indent.as_bytes());
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    serde::Serialize::serialize(&json, &mut serializer).map_err(|error| type_error(format!("JSON.stringify: {error}")))?;
    String::from_utf8(buffer)
        .map(Value::String)
        .map_err(|error| type_error(format!("JSON.stringify: {error}")))
}

fn object_listing(function: &str, target: &Value) -> Result<Value, ExpressionError> {
    let entries: Vec<(String, Value)> = match target {
        Value::Object(map) => map.iter().map(|(key, value)| (key.clone(), value.clone())).collect(),
        Value::Array(items) => items.iter().enumerate().map(|(index, value)| (index.to_string(), value.clone())).collect(),
        Value::Null => return Err(type_error("cannot convert null to object")),
        _ => Vec::new(),
    };
    let listed = entries
        .into_iter()
        .map(|(key, value)| match function {
            "keys" => Value::String(key),
            "values" => value,
            _ => Value::Array(vec![Value::String(key), value]),
        })
        .collect();
    Ok(Value::Array(listed))
}

pub fn call_global(function: &str, args: &[Value]) -> Result<Value, ExpressionError> {
    match function {
        "Number" => Ok(Value::Number(args.first().map(Value::to_number).unwrap_or(0.0))),
        "String" => Ok(Value::String(args.first().map(Value::to_display_string).unwrap_or_default())),
        "Boolean" => Ok(Value::Bool(args.first().is_some_and(Value::is_truthy))),
        "parseInt" => Ok(Value::Number(parse_int(&string_arg(args, 0), args.get(1)))),
        "parseFloat" => Ok(Value::Number(parse_float(&string_arg(args, 0)))),
        _ => Err(ExpressionError::Unsupported {
            message: format!("{function} is not available"),
        }),
    }
}

fn parse_int(text: &str, radix: Option<&Value>) -> f64 {
    let mut rest = text.trim_start();
    let negative = rest.starts_with('-');
    if let Some(stripped) = rest.strip_prefix(['-', '+']) {
        rest = stripped;
    }

    let mut radix = match radix.map(Value::to_number) {
        Some(radix) if radix.is_finite() && radix != 0.0 => radix as u32,
        _ => 10,
    };
    if (radix == 16 || radix == 10) && (rest.starts_with("0x") || rest.starts_with("0X")) {
        rest = &rest[2..];
        radix = 16;
    }
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }

    let digits: String = rest.chars().take_while(|c| c.is_digit(radix)).collect();
    if digits.is_empty() {
        return f64::NAN;
    }
    let magnitude = digits
        .chars()
        .filter_map(|c| c.to_digit(radix))
        .fold(0f64, |accumulated, digit| accumulated * f64::from(radix) + f64::from(digit));
    if negative { -magnitude } else { magnitude }
}

fn parse_float(text: &str) -> f64 {
    let trimmed = text.trim_start();
    FLOAT_PREFIX
        .find(trimmed)
        .and_then(|found| {
            let literal = found.as_str();
            match literal.trim_start_matches(['+', '-']) {
                "Infinity" if literal.starts_with('-') => Some(f64::NEG_INFINITY),
                "Infinity" => Some(f64::INFINITY),
                _ => literal.parse::<f64>().ok(),
            }
        })
        .unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn values(source: JsonValue) -> Vec<Value> {
        match Value::from(source) {
            Value::Array(items) => items,
            other => vec![other],
        }
    }

    #[test]
    fn addition_concatenates_when_either_side_is_text() {
        assert_eq!(binary(BinaryOp::Add, &Value::Number(40.0), &Value::Number(2.0)).unwrap(), Value::Number(42.0));
        assert_eq!(binary(BinaryOp::Add, &Value::from("n="), &Value::Number(2.0)).unwrap(), Value::from("n=2"));
        assert_eq!(
            binary(BinaryOp::Add, &Value::from(&json!([1, 2])), &Value::from("!")).unwrap(),
            Value::from("1,2!")
        );
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert_eq!(
            binary(BinaryOp::Divide, &Value::Number(1.0), &Value::Number(0.0)),
            Err(ExpressionError::DivisionByZero)
        );
        assert_eq!(
            binary(BinaryOp::Remainder, &Value::Number(7.0), &Value::Number(4.0)).unwrap(),
            Value::Number(3.0)
        );
    }

    #[test]
    fn comparisons_order_strings_and_numbers() {
        assert_eq!(binary(BinaryOp::Less, &Value::from("apple"), &Value::from("banana")).unwrap(), Value::Bool(true));
        assert_eq!(binary(BinaryOp::GreaterEqual, &Value::from("10"), &Value::Number(9.0)).unwrap(), Value::Bool(true));
        assert_eq!(binary(BinaryOp::Less, &Value::Number(f64::NAN), &Value::Number(1.0)).unwrap(), Value::Bool(false));
    }

    #[test]
    fn member_access_rules() {
        let record = Value::from(&json!({"items": [1, 2, 3], "title": "héllo"}));
        let items = get_member(&record, &Value::from("items")).unwrap();
        assert_eq!(get_member(&items, &Value::from("length")).unwrap(), Value::Number(3.0));
        assert_eq!(get_member(&items, &Value::Number(5.0)).unwrap(), Value::Null);
        assert_eq!(get_member(&record, &Value::from("missing")).unwrap(), Value::Null);
        let title = get_member(&record, &Value::from("title")).unwrap();
        assert_eq!(get_member(&title, &Value::from("length")).unwrap(), Value::Number(5.0));
        assert!(matches!(get_member(&Value::Null, &Value::from("x")), Err(ExpressionError::Type { .. })));
        assert!(matches!(
            get_member(&Value::Placeholder("Result of a.b".into()), &Value::from("x")),
            Err(ExpressionError::Type { .. })
        ));
    }

    #[test]
    fn string_methods() {
        let text = "Hello, World";
        assert_eq!(string_method(text, "slice", &[Value::Number(-5.0)]).unwrap(), Value::from("World"));
        assert_eq!(string_method(text, "indexOf", &[Value::from("World")]).unwrap(), Value::Number(7.0));
        assert_eq!(
            string_method("a,b,c", "split", &[Value::from(",")]).unwrap(),
            Value::from(&json!(["a", "b", "c"]))
        );
        assert_eq!(
            string_method("a-a", "replace", &[Value::from("a"), Value::from("b")]).unwrap(),
            Value::from("b-a")
        );
    }

    #[test]
    fn array_methods() {
        let items = values(json!([1, null, "x"]));
        assert_eq!(array_method(&items, "join", &[Value::from("|")]).unwrap(), Value::from("1||x"));
        assert_eq!(array_method(&items, "includes", &[Value::from("x")]).unwrap(), Value::Bool(true));
        assert_eq!(
            array_method(&items, "concat", &[Value::from(&json!([2])), Value::Number(3.0)]).unwrap(),
            Value::from(&json!([1, null, "x", 2, 3]))
        );
        assert_eq!(array_method(&items, "slice", &[Value::Number(1.0)]).unwrap(), Value::from(&json!([null, "x"])));
    }

    #[test]
    fn to_fixed_rounds_half_up() {
        assert_eq!(to_fixed(2.5, &Value::Number(0.0)).unwrap(), Value::from("3"));
        assert_eq!(to_fixed(3.14159, &Value::Number(2.0)).unwrap(), Value::from("3.14"));
        assert_eq!(to_fixed(1.0, &Value::Null).unwrap(), Value::from("1"));
    }

    #[test]
    fn namespace_functions() {
        assert_eq!(
            call_namespace("JSON", "stringify", &[Value::from(&json!({"a": [1]}))]).unwrap(),
            Value::from(r#"{"a":[1]}"#)
        );
        assert_eq!(
            call_namespace("JSON", "stringify", &[Value::from(&json!({"a": 1})), Value::Null, Value::Number(2.0)]).unwrap(),
            Value::from("{\n  \"a\": 1\n}")
        );
        assert_eq!(
            call_namespace("JSON", "parse", &[Value::from(r#"{"n": 2}"#)]).unwrap(),
            Value::from(&json!({"n": 2}))
        );
        assert_eq!(call_namespace("Math", "max", &values(json!([1, 9, 3]))).unwrap(), Value::Number(9.0));
        assert_eq!(call_namespace("Math", "round", &[Value::Number(-2.5)]).unwrap(), Value::Number(-2.0));
        assert_eq!(
            call_namespace("Object", "entries", &[Value::from(&json!({"a": 1}))]).unwrap(),
            Value::from(&json!([["a", 1]]))
        );
        assert!(matches!(call_namespace("Math", "random", &[]), Err(ExpressionError::Unsupported { .. })));
    }

    #[test]
    fn global_conversions() {
        assert_eq!(call_global("parseInt", &[Value::from("42px")]).unwrap(), Value::Number(42.0));
        assert_eq!(call_global("parseInt", &[Value::from("ff"), Value::Number(16.0)]).unwrap(), Value::Number(255.0));
        assert_eq!(call_global("parseFloat", &[Value::from(" 3.5e1 apples")]).unwrap(), Value::Number(35.0));
        assert!(matches!(call_global("parseInt", &[Value::from("abc")]).unwrap(), Value::Number(n) if n.is_nan()));
        assert_eq!(call_global("Boolean", &[Value::from("")]).unwrap(), Value::Bool(false));
        assert_eq!(call_global("String", &[Value::Number(7.0)]).unwrap(), Value::from("7"));
    }
}
