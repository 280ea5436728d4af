//! Shared type definitions for Capflow.
//!
//! Two families of types live here:
//!
//! - [`automation`]: the decoded shape of an automation document (config, requirements and the
//!   ordered step list) consumed by the engine.
//! - [`trace`]: the append-only execution trace the engine produces, persisted by the run-log
//!   store and summarised by the CLI.

pub mod automation;
pub mod trace;

pub use automation::{
    Automation, CapabilityCall, ConfigEntry, EvaluateAction, NotifyAction, OnFalse, Requirement, Step, StepBody, StepDecodeError,
    TemplateAction, Trigger,
};
pub use trace::{ActionOutcome, EvaluationOutcome, StepOutcome, StepRecord, Trace};
