use indexmap::IndexMap;
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::value::Value;

/// Name under which resolved config defaults are bound.
pub const CONFIG_BINDING: &str = "config";

/// Variable bindings shared across one run.
///
/// Seeded with the automation's config defaults and extended by each step's `capture`.
/// Evaluations borrow it immutably; only the step loop binds new values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionContext {
    bindings: IndexMap<String, Value>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context holding `config` bound to the given defaults.
    pub fn with_config(defaults: &JsonMap<String, JsonValue>) -> Self {
        let mut context = Self::new();
        let config = defaults.iter().map(|(key, value)| (key.clone(), Value::from(value))).collect();
        context.bind(CONFIG_BINDING, Value::Object(config));
        context
    }

    /// Binds `name`, replacing any earlier value.
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.bindings.iter().map(|(name, value)| (name.as_str(), value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn config_defaults_are_bound_under_config() {
        let defaults = json!({"limit": 3, "channel": "general"});
        let context = ExecutionContext::with_config(defaults.as_object().unwrap());
        assert_eq!(context.get(CONFIG_BINDING).unwrap().to_json(), defaults);
    }

    #[test]
    fn bind_replaces_previous_value() {
        let mut context = ExecutionContext::new();
        context.bind("x", Value::Number(1.0));
        context.bind("x", Value::from("two"));
        assert_eq!(context.len(), 1);
        assert_eq!(context.get("x"), Some(&Value::from("two")));
    }
}
