//! Step-execution state machine.
//!
//! A run walks the automation's steps in order against a single [`ExecutionContext`]:
//!
//! - requirements are checked against the [`CapabilityIndex`] before any step is visited
//! - each visited step appends exactly one [`StepRecord`] to the [`Trace`]
//! - a false condition branches through [`branch::on_false_branch`]
//! - only unmet requirements and a capability without a provider abort the run
//!
//! Nothing here performs I/O. Live capability calls produce operator instructions through the
//! [`Narrator`] and bind a placeholder for the eventual result.

use capflow_registry::CapabilityIndex;
use capflow_types::{
    Automation, CapabilityCall, EvaluateAction, NotifyAction, Step, StepBody, StepRecord, TemplateAction, Trace,
    automation::{SKIP_REASON_CONDITION, SKIP_REASON_EXIT},
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    context::ExecutionContext,
    expression::{Evaluator, ScriptEvaluator},
    interpolate::{interpolate_string, interpolate_value},
    value::Value,
};

pub mod branch;
pub mod narration;

pub use branch::{Branch, on_false_branch};
pub use narration::{ConsoleNarrator, Narrator, SilentNarrator};

/// Name used for traces of automations that declare none.
const FALLBACK_AUTOMATION_NAME: &str = "automation";

/// Options accepted by a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Record intended capability calls without producing live instructions.
    pub dry_run: bool,
}

impl RunOptions {
    pub fn dry_run() -> Self {
        Self { dry_run: true }
    }

    pub fn live() -> Self {
        Self { dry_run: false }
    }
}

/// Fatal outcomes of a run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("missing required capabilities: {}", missing.join(", "))]
    UnmetRequirements { missing: Vec<String> },
    #[error("step '{step}' uses capability '{capability}' but no provider fulfills it")]
    UnresolvedCapability {
        step: String,
        capability: String,
        /// Records of the steps visited before the abort.
        trace: Box<Trace>,
    },
}

/// Runs `automation` with the built-in evaluator and no narration.
pub fn run_automation(automation: &Automation, index: &CapabilityIndex, options: RunOptions) -> Result<Trace, RunError> {
    run_automation_with(automation, index, options, &ScriptEvaluator, &mut SilentNarrator)
}

/// Runs `automation`, evaluating expressions with `evaluator` and reporting progress to `narrator`.
///
/// # Errors
///
/// - [`RunError::UnmetRequirements`] before any step when a `requires` entry has no provider.
/// - [`RunError::UnresolvedCapability`] at the first visited capability step without a provider.
pub fn run_automation_with(
    automation: &Automation,
    index: &CapabilityIndex,
    options: RunOptions,
    evaluator: &dyn Evaluator,
    narrator: &mut dyn Narrator,
) -> Result<Trace, RunError> {
    let name = automation.display_name(FALLBACK_AUTOMATION_NAME);
    let check = index.check_requirements(&automation.requires);
    if !check.is_satisfied() {
        let missing: Vec<String> = check.missing.into_iter().collect();
        warn!(automation = %name, missing = ?missing, "automation requirements not met");
        return Err(RunError::UnmetRequirements { missing });
    }

    info!(automation = %name, dry_run = options.dry_run, steps = automation.steps.len(), "starting automation run");
    narrator.run_started(name, automation.description.as_deref(), options.dry_run);

    let mut run = StepRun {
        steps: &automation.steps,
        index,
        dry_run: options.dry_run,
        evaluator,
        narrator,
        context: ExecutionContext::with_config(&automation.config_defaults()),
        trace: Trace::start(name, options.dry_run),
    };
    run.drive()?;

    let StepRun { mut trace, narrator, .. } = run;
    trace.finalize();
    info!(
        automation = %name,
        visited = trace.steps().len(),
        skipped = trace.skipped_count(),
        "automation run completed"
    );
    narrator.run_completed(&trace);
    Ok(trace)
}

/// Mutable state of one run.
struct StepRun<'a> {
    steps: &'a [Step],
    index: &'a CapabilityIndex,
    dry_run: bool,
    evaluator: &'a dyn Evaluator,
    narrator: &'a mut dyn Narrator,
    context: ExecutionContext,
    trace: Trace,
}

impl StepRun<'_> {
    fn drive(&mut self) -> Result<(), RunError> {
        let steps = self.steps;
        let total = steps.len();
        let mut cursor = 0;
        while let Some(step) = steps.get(cursor) {
            let label = step.label(cursor);
            debug!(step = %label, position = cursor + 1, kind = step.body.kind(), "visiting step");
            self.narrator.step_started(cursor + 1, total, &label, step.body.kind());

            if let Some(condition) = step.condition.as_deref()
                && !self.condition_holds(condition)
            {
                self.narrator.condition_not_met(condition);
                match on_false_branch(steps, cursor) {
                    Branch::Exit => {
                        self.trace.push(StepRecord::skipped(label, SKIP_REASON_EXIT));
                        self.narrator.exiting();
                        return Ok(());
                    }
                    Branch::SkipTo { index, target } => {
                        self.trace.push(StepRecord::skipped(label, format!("skip-to {target}")));
                        self.narrator.skipping_to(&target);
                        cursor = index;
                    }
                    Branch::Skip => {
                        self.trace.push(StepRecord::skipped(label, SKIP_REASON_CONDITION));
                        cursor += 1;
                    }
                }
                continue;
            }

            let record = match &step.body {
                StepBody::Gate => StepRecord::passed(label),
                StepBody::Capability(call) => self.call_capability(label, call)?,
                StepBody::Notify(action) => self.notify(label, action),
                StepBody::Template(action) => self.render_template(label, action),
                StepBody::Evaluate(action) => self.evaluate(label, action),
            };
            self.trace.push(record);
            cursor += 1;
        }
        Ok(())
    }

    /// Condition errors count as false.
    fn condition_holds(&mut self, condition: &str) -> bool {
        match self.evaluator.evaluate(condition, &self.context) {
            Ok(value) => value.is_truthy(),
            Err(error) => {
                warn!(%condition, %error, "condition evaluation failed; treating as false");
                self.narrator.condition_failed(condition, &error);
                false
            }
        }
    }

    fn call_capability(&mut self, label: String, call: &CapabilityCall) -> Result<StepRecord, RunError> {
        let Some(provider) = self.index.get(&call.name) else {
            warn!(step = %label, capability = %call.name, "no provider for capability; aborting run");
            return Err(RunError::UnresolvedCapability {
                step: label,
                capability: call.name.clone(),
                trace: Box::new(self.trace.clone()),
            });
        };
        self.narrator.capability_resolved(&call.name, &call.method, provider);

        let args = interpolate_value(&call.args, &self.context, self.evaluator);
        if self.dry_run {
            self.narrator.dry_run_args(&args);
        } else {
            let instructions = provider.instructions_for(&call.name, &call.method);
            self.narrator.live_instructions(provider, &args, &instructions);
            // Dry runs leave the capture unbound.
            if let Some(capture) = call.capture.as_deref() {
                let pending = Value::Placeholder(format!("Result of {}.{}", call.name, call.method));
                self.context.bind(capture, pending);
                self.narrator.captured(capture);
            }
        }
        debug!(
            step = %label,
            capability = %call.name,
            method = %call.method,
            provider = %provider.provider_id,
            dry_run = self.dry_run,
            "capability step recorded"
        );
        Ok(StepRecord::capability(label, &call.name, &call.method, args, self.dry_run))
    }

    fn notify(&mut self, label: String, action: &NotifyAction) -> StepRecord {
        let message = interpolate_string(&action.message, &self.context, self.evaluator);
        let attachments = action
            .attachments
            .as_ref()
            .map(|attachments| interpolate_value(attachments, &self.context, self.evaluator));
        self.narrator.notify(&message, self.dry_run);
        StepRecord::notify(label, message, attachments)
    }

    fn render_template(&mut self, label: String, action: &TemplateAction) -> StepRecord {
        let rendered = interpolate_string(&action.template, &self.context, self.evaluator);
        let length = rendered.chars().count();
        self.narrator.template_rendered(length);
        if let Some(capture) = action.capture.as_deref() {
            self.context.bind(capture, Value::String(rendered));
            self.narrator.captured(capture);
        }
        StepRecord::template(label, length)
    }

    fn evaluate(&mut self, label: String, action: &EvaluateAction) -> StepRecord {
        match self.evaluator.evaluate(&action.expression, &self.context) {
            Ok(result) => {
                self.narrator.evaluated(&result);
                let record = StepRecord::evaluated(label, result.to_json());
                if let Some(capture) = action.capture.as_deref() {
                    self.context.bind(capture, result);
                    self.narrator.captured(capture);
                }
                record
            }
            Err(error) => {
                debug!(step = %label, %error, "evaluate action failed");
                self.narrator.evaluation_failed(&error);
                StepRecord::evaluation_failed(label, error.to_string())
            }
        }
    }
}
