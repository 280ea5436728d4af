//! # Capflow Engine
//!
//! Executes decoded automations step by step against a capability index and produces an
//! append-only [`Trace`](capflow_types::Trace) of what happened.
//!
//! - **Values**: the closed [`Value`] domain every binding and expression result lives in
//! - **Expressions**: a restricted expression language behind the [`Evaluator`] trait
//! - **Interpolation**: `${ expr }` substitution through nested JSON templates
//! - **Executor**: the step loop, branch policies, and [`Narrator`] progress events
//!
//! ## Usage
//!
//! ```rust
//! use capflow_engine::{RunOptions, run_automation};
//! use capflow_registry::{CapabilityIndex, parse_automation};
//!
//! let automation = parse_automation(
//!     r#"
//! name: answer
//! steps:
//!   - name: compute
//!     action: evaluate
//!     expression: "40 + 2"
//!     capture: x
//!   - name: announce
//!     action: notify
//!     message: "the answer is ${x}"
//! "#,
//! )?;
//!
//! let trace = run_automation(&automation, &CapabilityIndex::new(), RunOptions::dry_run())?;
//! assert_eq!(trace.steps().len(), 2);
//! assert!(trace.is_finalized());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod context;
pub mod executor;
pub mod expression;
pub mod interpolate;
pub mod value;

pub use context::{CONFIG_BINDING, ExecutionContext};
pub use executor::{ConsoleNarrator, Narrator, RunError, RunOptions, SilentNarrator, run_automation, run_automation_with};
pub use expression::{Evaluator, ExpressionError, ScriptEvaluator, is_snippet};
pub use interpolate::{interpolate_string, interpolate_value};
pub use value::Value;
