//! # Template interpolation
//!
//! Replaces `${ expr }` placeholders inside strings, recursing through arrays and objects.
//! Interpolation never fails as a whole:
//!
//! - a placeholder whose expression fails keeps its original `${...}` text;
//! - arrays, objects, and pending capability results render as compact JSON;
//! - numbers, booleans, and null outside of strings are returned unchanged.
//!
//! ```rust
//! use capflow_engine::{ExecutionContext, ScriptEvaluator, Value, interpolate_value};
//! use serde_json::json;
//!
//! let mut context = ExecutionContext::new();
//! context.bind("user", Value::from(json!({"name": "ada", "langs": ["rust"]})));
//!
//! let rendered = interpolate_value(
//!     &json!({"greeting": "hi ${user.name}", "langs": "${user.langs}", "broken": "${nope}", "n": 3}),
//!     &context,
//!     &ScriptEvaluator,
//! );
//! assert_eq!(rendered, json!({"greeting": "hi ada", "langs": "[\"rust\"]", "broken": "${nope}", "n": 3}));
//! ```

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::{
    context::ExecutionContext,
    expression::Evaluator,
};

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").expect("valid regex"));

/// Interpolates every string inside `template`.
pub fn interpolate_value(template: &JsonValue, context: &ExecutionContext, evaluator: &dyn Evaluator) -> JsonValue {
    match template {
        JsonValue::String(text) => JsonValue::String(interpolate_string(text, context, evaluator)),
        JsonValue::Array(items) => JsonValue::Array(
            items
                .iter()
                .map(|item| interpolate_value(item, context, evaluator))
                .collect(),
        ),
        JsonValue::Object(entries) => JsonValue::Object(
            entries
                .iter()
                .map(|(key, value)| (key.clone(), interpolate_value(value, context, evaluator)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Substitutes each `${expr}` in `input` with the rendered value of `expr`.
pub fn interpolate_string(input: &str, context: &ExecutionContext, evaluator: &dyn Evaluator) -> String {
    if !input.contains("${") {
        return input.to_string();
    }
    PLACEHOLDER
        .replace_all(input, |captures: &Captures<'_>| {
            let expression = captures[1].trim();
            match evaluator.evaluate(expression, context) {
                Ok(value) => value.render(),
                Err(error) => {
                    debug!(%expression, %error, "placeholder left unresolved");
                    captures[0].to_string()
                }
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{expression::ScriptEvaluator, value::Value};
    use serde_json::json;

    fn context() -> ExecutionContext {
        let mut context = ExecutionContext::with_config(json!({"channel": "general"}).as_object().unwrap());
        context.bind("x", Value::Number(42.0));
        context.bind("videos", Value::Placeholder("Result of youtube-data.get_videos".into()));
        context
    }

    #[test]
    fn substitutes_nested_structures() {
        let template = json!({
            "channel": "#${config.channel}",
            "lines": ["total ${x}", "${x * 2} doubled", true, null],
            "nested": {"flag": "${x > 40}"},
            "count": 7
        });
        assert_eq!(
            interpolate_value(&template, &context(), &ScriptEvaluator),
            json!({
                "channel": "#general",
                "lines": ["total 42", "84 doubled", true, null],
                "nested": {"flag": "true"},
                "count": 7
            })
        );
    }

    #[test]
    fn failed_placeholders_keep_literal_text() {
        let context = context();
        assert_eq!(
            interpolate_string("a ${missing.value} b ${x}", &context, &ScriptEvaluator),
            "a ${missing.value} b 42"
        );
        assert_eq!(interpolate_string("${videos.length}", &context, &ScriptEvaluator), "${videos.length}");
        assert_eq!(interpolate_string("unterminated ${x", &context, &ScriptEvaluator), "unterminated ${x");
    }

    #[test]
    fn placeholders_render_as_json() {
        assert_eq!(
            interpolate_string("${videos}", &context(), &ScriptEvaluator),
            r#"{"_placeholder":"Result of youtube-data.get_videos"}"#
        );
    }

    #[test]
    fn strings_without_placeholders_are_unchanged() {
        let context = context();
        for text in ["plain", "cost: $5 {braces}", "", "$ {x}"] {
            assert_eq!(interpolate_string(text, &context, &ScriptEvaluator), text);
        }
    }
}
