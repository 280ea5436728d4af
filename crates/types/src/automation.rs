//! Strongly typed automation documents shared across the registry, engine, and CLI.
//!
//! Automations are authored as a flat YAML list of steps where the presence of
//! `capability` or `action` decides what a step does. The decoded model is tagged instead:
//! every [`Step`] carries an optional condition plus exactly one [`StepBody`]. Conversion
//! happens through [`StepDocument`], so malformed steps are rejected when a document is
//! loaded rather than halfway through a run.

use std::{fmt, str::FromStr};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use thiserror::Error;

/// Reason recorded when a step is skipped because its condition did not hold.
pub const SKIP_REASON_CONDITION: &str = "condition not met";
/// Reason recorded when a failed condition terminates the run.
pub const SKIP_REASON_EXIT: &str = "condition not met, exit";

/// A decoded automation, immutable for the duration of a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Automation {
    /// Display name; callers fall back to the file stem when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Optional descriptive copy shown by `list` and at run start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Schedule metadata. Decoded for display only; the engine never schedules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<Trigger>,
    /// Configuration entries keyed by name, preserving authoring order.
    #[serde(default)]
    pub config: IndexMap<String, ConfigEntry>,
    /// Capabilities that must resolve to a provider before any step executes.
    #[serde(default)]
    pub requires: Vec<Requirement>,
    /// Ordered workflow steps.
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Automation {
    /// Resolves every config entry to its default value.
    ///
    /// ```rust
    /// use capflow_types::Automation;
    ///
    /// let automation: Automation = serde_json::from_value(serde_json::json!({
    ///     "config": { "limit": 5, "channel": { "default": "general", "description": "Slack channel" } }
    /// })).unwrap();
    /// let defaults = automation.config_defaults();
    /// assert_eq!(defaults["limit"], 5);
    /// assert_eq!(defaults["channel"], "general");
    /// ```
    pub fn config_defaults(&self) -> JsonMap<String, JsonValue> {
        self.config
            .iter()
            .map(|(key, entry)| (key.clone(), entry.default_value().clone()))
            .collect()
    }

    /// Capability names named by `requires`, in declaration order.
    pub fn required_capabilities(&self) -> impl Iterator<Item = &str> {
        self.requires.iter().map(Requirement::capability)
    }

    /// Returns the declared name or the provided fallback.
    pub fn display_name<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.name.as_deref().filter(|name| !name.trim().is_empty()).unwrap_or(fallback)
    }
}

/// Trigger metadata attached to an automation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Trigger {
    /// Cron-like schedule expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
}

/// A configuration entry: either a bare literal or a structure carrying `default`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "JsonValue", into = "JsonValue")]
pub enum ConfigEntry {
    /// The literal value is the default.
    Literal(JsonValue),
    /// Structured entry; `metadata` keeps every key other than `default`.
    Detailed { default: JsonValue, metadata: JsonMap<String, JsonValue> },
}

impl ConfigEntry {
    /// The value seeded into the run context.
    pub fn default_value(&self) -> &JsonValue {
        match self {
            ConfigEntry::Literal(value) => value,
            ConfigEntry::Detailed { default, .. } => default,
        }
    }
}

impl From<JsonValue> for ConfigEntry {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Object(mut map) if map.contains_key("default") => {
                let default = map.remove("default").unwrap_or(JsonValue::Null);
                ConfigEntry::Detailed { default, metadata: map }
            }
            other => ConfigEntry::Literal(other),
        }
    }
}

impl From<ConfigEntry> for JsonValue {
    fn from(entry: ConfigEntry) -> Self {
        match entry {
            ConfigEntry::Literal(value) => value,
            ConfigEntry::Detailed { default, mut metadata } => {
                metadata.insert("default".into(), default);
                JsonValue::Object(metadata)
            }
        }
    }
}

/// A declared capability requirement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Requirement {
    /// Shorthand capability name (for example, `youtube-data`).
    Name(String),
    /// Structured entry carrying the capability plus arbitrary metadata.
    Detailed {
        capability: String,
        #[serde(flatten)]
        metadata: IndexMap<String, JsonValue>,
    },
}

impl Requirement {
    pub fn capability(&self) -> &str {
        match self {
            Requirement::Name(name) => name,
            Requirement::Detailed { capability, .. } => capability,
        }
    }
}

/// Policy applied when a step's condition evaluates to false.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OnFalse {
    /// Record the skip and terminate the run normally.
    Exit,
    /// Jump forward to the first step carrying this name.
    SkipTo(String),
}

impl FromStr for OnFalse {
    type Err = StepDecodeError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed == "exit" {
            return Ok(OnFalse::Exit);
        }
        if let Some(target) = trimmed.strip_prefix("skip-to:") {
            return Ok(OnFalse::SkipTo(target.trim().to_string()));
        }
        Err(StepDecodeError::UnsupportedOnFalse(raw.to_string()))
    }
}

impl fmt::Display for OnFalse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OnFalse::Exit => f.write_str("exit"),
            OnFalse::SkipTo(target) => write!(f, "skip-to:{target}"),
        }
    }
}

/// One unit of an automation's ordered workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StepDocument", into = "StepDocument")]
pub struct Step {
    /// Declared name; see [`Step::label`] for the positional fallback.
    pub name: Option<String>,
    /// Optional gating expression.
    pub condition: Option<String>,
    /// Branch policy applied when `condition` is false.
    pub on_false: Option<OnFalse>,
    /// What the step does once its condition holds.
    pub body: StepBody,
}

impl Step {
    /// Name used in narration and records: the declared name or `step-<index + 1>`.
    /// Only declared names are `skip-to` targets.
    pub fn label(&self, index: usize) -> String {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("step-{}", index + 1),
        }
    }
}

/// The single effect a step performs.
#[derive(Debug, Clone, PartialEq)]
pub enum StepBody {
    /// Condition-only step; passing it records nothing beyond the step name.
    Gate,
    Capability(CapabilityCall),
    Notify(NotifyAction),
    Template(TemplateAction),
    Evaluate(EvaluateAction),
}

impl StepBody {
    /// Short kind label used in narration.
    pub fn kind(&self) -> &'static str {
        match self {
            StepBody::Gate => "gate",
            StepBody::Capability(_) => "capability",
            StepBody::Notify(_) => "notify",
            StepBody::Template(_) => "template",
            StepBody::Evaluate(_) => "evaluate",
        }
    }
}

/// Invocation of a provider-backed capability.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityCall {
    pub name: String,
    pub method: String,
    /// Argument template interpolated against the context at call time.
    pub args: JsonValue,
    pub capture: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotifyAction {
    pub message: String,
    pub attachments: Option<JsonValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateAction {
    pub template: String,
    pub capture: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluateAction {
    pub expression: String,
    pub capture: Option<String>,
}

/// Errors raised while converting an authored step into the tagged model.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StepDecodeError {
    #[error("step '{step}' declares both capability '{capability}' and action '{action}'; a step carries one body")]
    ConflictingBodies { step: String, capability: String, action: String },
    #[error("step '{step}' uses unknown action '{action}' (expected notify, template, or evaluate)")]
    UnknownAction { step: String, action: String },
    #[error("capability step '{step}' is missing a method")]
    MissingMethod { step: String },
    #[error("unsupported onFalse policy '{0}' (expected 'exit' or 'skip-to:<step>')")]
    UnsupportedOnFalse(String),
}

/// Flat on-disk shape of a step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, alias = "on_false", skip_serializing_if = "Option::is_none")]
    pub on_false: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

impl TryFrom<StepDocument> for Step {
    type Error = StepDecodeError;

    fn try_from(document: StepDocument) -> Result<Self, Self::Error> {
        let step_label = document.name.clone().unwrap_or_else(|| "<unnamed>".to_string());
        let on_false = document.on_false.as_deref().map(OnFalse::from_str).transpose()?;

        let body = match (document.capability, document.action) {
            (Some(capability), Some(action)) => {
                return Err(StepDecodeError::ConflictingBodies {
                    step: step_label,
                    capability,
                    action,
                });
            }
            (Some(name), None) => {
                let method = document
                    .method
                    .filter(|method| !method.trim().is_empty())
                    .ok_or_else(|| StepDecodeError::MissingMethod { step: step_label.clone() })?;
                StepBody::Capability(CapabilityCall {
                    name,
                    method,
                    args: document.args.unwrap_or_else(|| JsonValue::Object(JsonMap::new())),
                    capture: document.capture,
                })
            }
            (None, Some(action)) => match action.as_str() {
                "notify" => StepBody::Notify(NotifyAction {
                    message: document.message.unwrap_or_default(),
                    attachments: document.attachments,
                }),
                "template" => StepBody::Template(TemplateAction {
                    template: document.template.unwrap_or_default(),
                    capture: document.capture,
                }),
                "evaluate" => StepBody::Evaluate(EvaluateAction {
                    expression: document.expression.unwrap_or_default(),
                    capture: document.capture,
                }),
                _ => return Err(StepDecodeError::UnknownAction { step: step_label, action }),
            },
            (None, None) => StepBody::Gate,
        };

        Ok(Step {
            name: document.name,
            condition: document.condition.filter(|condition| !condition.trim().is_empty()),
            on_false,
            body,
        })
    }
}

impl From<Step> for StepDocument {
    fn from(step: Step) -> Self {
        let mut document = StepDocument {
            name: step.name,
            condition: step.condition,
            on_false: step.on_false.map(|policy| policy.to_string()),
            ..Default::default()
        };
        match step.body {
            StepBody::Gate => {}
            StepBody::Capability(call) => {
                document.capability = Some(call.name);
                document.method = Some(call.method);
                document.args = Some(call.args);
                document.capture = call.capture;
            }
            StepBody::Notify(notify) => {
                document.action = Some("notify".into());
                document.message = Some(notify.message);
                document.attachments = notify.attachments;
            }
            StepBody::Template(template) => {
                document.action = Some("template".into());
                document.template = Some(template.template);
                document.capture = template.capture;
            }
            StepBody::Evaluate(evaluate) => {
                document.action = Some("evaluate".into());
                document.expression = Some(evaluate.expression);
                document.capture = evaluate.capture;
            }
        }
        document
    }
}
