//! Execution trace model.
//!
//! A [`Trace`] is the ordered, append-only record of one automation run. The engine appends
//! exactly one [`StepRecord`] per visited step and finalizes the trace once, when the run
//! terminates normally. The serialized layout is the run-log file format:
//!
//! ```json
//! {
//!   "automation": "tracker",
//!   "startedAt": "2026-01-01T00:00:00Z",
//!   "completedAt": "2026-01-01T00:00:01Z",
//!   "dryRun": false,
//!   "steps": [
//!     { "name": "gate", "skipped": true, "reason": "condition not met" },
//!     { "name": "fetch", "capability": "youtube-data", "method": "get_videos", "args": {} },
//!     { "name": "calc", "action": "evaluate", "result": 42 }
//!   ]
//! }
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trace {
    automation: String,
    started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    dry_run: bool,
    #[serde(default)]
    steps: Vec<StepRecord>,
}

impl Trace {
    /// Opens a trace stamped with the current time.
    pub fn start(automation: impl Into<String>, dry_run: bool) -> Self {
        Self::start_at(automation, dry_run, Utc::now())
    }

    pub fn start_at(automation: impl Into<String>, dry_run: bool, started_at: DateTime<Utc>) -> Self {
        Self {
            automation: automation.into(),
            started_at,
            completed_at: None,
            dry_run,
            steps: Vec::new(),
        }
    }

    /// Appends a record. Records already appended are never modified.
    ///
    /// Appending to a finalized trace is ignored.
    pub fn push(&mut self, record: StepRecord) {
        if self.completed_at.is_none() {
            self.steps.push(record);
        }
    }

    /// Sets `completedAt` to now. Returns `false` when the trace was already finalized.
    pub fn finalize(&mut self) -> bool {
        self.finalize_at(Utc::now())
    }

    pub fn finalize_at(&mut self, completed_at: DateTime<Utc>) -> bool {
        if self.completed_at.is_some() {
            return false;
        }
        self.completed_at = Some(completed_at);
        true
    }

    pub fn automation(&self) -> &str {
        &self.automation
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn is_finalized(&self) -> bool {
        self.completed_at.is_some()
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    /// Records that were neither skipped nor dry-run previews.
    pub fn completed_count(&self) -> usize {
        self.steps.iter().filter(|record| !record.is_skipped() && !record.is_dry_run()).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.steps.iter().filter(|record| record.is_skipped()).count()
    }

    /// Wall-clock duration of a finalized run.
    pub fn duration(&self) -> Option<Duration> {
        self.completed_at.map(|completed_at| completed_at - self.started_at)
    }
}

/// One entry per visited step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

impl StepRecord {
    pub fn skipped(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcome: StepOutcome::Skipped {
                skipped: true,
                reason: reason.into(),
            },
        }
    }

    pub fn passed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcome: StepOutcome::Passed {},
        }
    }

    pub fn capability(
        name: impl Into<String>,
        capability: impl Into<String>,
        method: impl Into<String>,
        args: JsonValue,
        dry_run: bool,
    ) -> Self {
        Self {
            name: name.into(),
            outcome: StepOutcome::Capability {
                capability: capability.into(),
                method: method.into(),
                args,
                dry_run,
            },
        }
    }

    pub fn notify(name: impl Into<String>, message: impl Into<String>, attachments: Option<JsonValue>) -> Self {
        Self::action(
            name,
            ActionOutcome::Notify {
                message: message.into(),
                attachments,
            },
        )
    }

    pub fn template(name: impl Into<String>, output_length: usize) -> Self {
        Self::action(name, ActionOutcome::Template { output_length })
    }

    pub fn evaluated(name: impl Into<String>, result: JsonValue) -> Self {
        Self::action(name, ActionOutcome::Evaluate(EvaluationOutcome::Succeeded { result }))
    }

    pub fn evaluation_failed(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self::action(name, ActionOutcome::Evaluate(EvaluationOutcome::Failed { error: error.into() }))
    }

    fn action(name: impl Into<String>, outcome: ActionOutcome) -> Self {
        Self {
            name: name.into(),
            outcome: StepOutcome::Action(outcome),
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, StepOutcome::Skipped { .. })
    }

    pub fn is_dry_run(&self) -> bool {
        matches!(self.outcome, StepOutcome::Capability { dry_run: true, .. })
    }

    /// Skip reason, when the step was skipped.
    pub fn reason(&self) -> Option<&str> {
        match &self.outcome {
            StepOutcome::Skipped { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

/// What happened at a visited step.
///
/// Variant order matters for decoding: the untagged representation tries each shape in turn
/// and `Passed` matches any remaining map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepOutcome {
    Skipped {
        skipped: bool,
        reason: String,
    },
    Capability {
        capability: String,
        method: String,
        args: JsonValue,
        #[serde(rename = "dryRun", default, skip_serializing_if = "is_false")]
        dry_run: bool,
    },
    Action(ActionOutcome),
    Passed {},
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ActionOutcome {
    Notify {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attachments: Option<JsonValue>,
    },
    Template {
        #[serde(rename = "outputLength")]
        output_length: usize,
    },
    Evaluate(EvaluationOutcome),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EvaluationOutcome {
    Failed { error: String },
    Succeeded { result: JsonValue },
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn records_serialize_to_run_log_shapes() {
        assert_eq!(
            serde_json::to_value(StepRecord::skipped("gate", "condition not met")).unwrap(),
            json!({"name": "gate", "skipped": true, "reason": "condition not met"})
        );
        assert_eq!(
            serde_json::to_value(StepRecord::capability("fetch", "yt", "list", json!({"q": 1}), true)).unwrap(),
            json!({"name": "fetch", "capability": "yt", "method": "list", "args": {"q": 1}, "dryRun": true})
        );
        assert_eq!(
            serde_json::to_value(StepRecord::capability("fetch", "yt", "list", json!({}), false)).unwrap(),
            json!({"name": "fetch", "capability": "yt", "method": "list", "args": {}})
        );
        assert_eq!(
            serde_json::to_value(StepRecord::template("render", 12)).unwrap(),
            json!({"name": "render", "action": "template", "outputLength": 12})
        );
        assert_eq!(
            serde_json::to_value(StepRecord::evaluated("calc", json!(42))).unwrap(),
            json!({"name": "calc", "action": "evaluate", "result": 42})
        );
        assert_eq!(
            serde_json::to_value(StepRecord::evaluation_failed("calc", "boom")).unwrap(),
            json!({"name": "calc", "action": "evaluate", "error": "boom"})
        );
        assert_eq!(serde_json::to_value(StepRecord::passed("gate")).unwrap(), json!({"name": "gate"}));
    }

    #[test]
    fn trace_decodes_from_run_log() {
        let trace: Trace = serde_json::from_value(json!({
            "automation": "tracker",
            "startedAt": "2026-01-01T00:00:00Z",
            "completedAt": "2026-01-01T00:00:01.500Z",
            "dryRun": false,
            "steps": [
                {"name": "gate", "skipped": true, "reason": "condition not met"},
                {"name": "fetch", "capability": "yt", "method": "list", "args": {}},
                {"name": "say", "action": "notify", "message": "hi"},
                {"name": "calc", "action": "evaluate", "error": "bad"},
                {"name": "pass"}
            ]
        }))
        .expect("trace decodes");

        assert_eq!(trace.steps().len(), 5);
        assert_eq!(trace.skipped_count(), 1);
        assert_eq!(trace.completed_count(), 4);
        assert_eq!(trace.duration().map(|duration| duration.num_milliseconds()), Some(1500));
        assert_eq!(trace.steps()[2].outcome, StepOutcome::Action(ActionOutcome::Notify {
            message: "hi".into(),
            attachments: None
        }));
        assert_eq!(trace.steps()[4].outcome, StepOutcome::Passed {});
    }

    #[test]
    fn finalize_happens_once_and_freezes_steps() {
        let mut trace = Trace::start("demo", false);
        trace.push(StepRecord::passed("a"));
        assert!(trace.finalize());
        let first = trace.completed_at();
        assert!(!trace.finalize());
        assert_eq!(trace.completed_at(), first);

        trace.push(StepRecord::passed("b"));
        assert_eq!(trace.steps().len(), 1);
    }
}
