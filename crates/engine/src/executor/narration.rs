//! Progress narration emitted while a run executes.
//!
//! Narration is advisory output for whoever is watching the run (a human at a terminal or an
//! agent reading stdout). It is not part of the trace contract.

use std::io::{self, Write};

use capflow_registry::ProviderEntry;
use capflow_types::Trace;
use serde_json::Value as JsonValue;

use crate::{expression::ExpressionError, value::Value};

/// Receives run lifecycle events. Every method defaults to a no-op.
pub trait Narrator {
    fn run_started(&mut self, _automation: &str, _description: Option<&str>, _dry_run: bool) {}
    fn step_started(&mut self, _position: usize, _total: usize, _label: &str, _kind: &str) {}
    fn condition_failed(&mut self, _condition: &str, _error: &ExpressionError) {}
    fn condition_not_met(&mut self, _condition: &str) {}
    fn exiting(&mut self) {}
    fn skipping_to(&mut self, _target: &str) {}
    fn capability_resolved(&mut self, _capability: &str, _method: &str, _provider: &ProviderEntry) {}
    fn dry_run_args(&mut self, _args: &JsonValue) {}
    /// Instructions the operator executes to fulfill a live capability call.
    fn live_instructions(&mut self, _provider: &ProviderEntry, _args: &JsonValue, _instructions: &str) {}
    fn captured(&mut self, _name: &str) {}
    fn notify(&mut self, _message: &str, _dry_run: bool) {}
    fn template_rendered(&mut self, _length: usize) {}
    fn evaluated(&mut self, _result: &Value) {}
    fn evaluation_failed(&mut self, _error: &ExpressionError) {}
    fn run_completed(&mut self, _trace: &Trace) {}
}

/// Discards all narration.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentNarrator;

impl Narrator for SilentNarrator {}

/// Writes narration as plain text lines.
pub struct ConsoleNarrator<W: Write = io::Stdout> {
    out: W,
}

impl ConsoleNarrator {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write> ConsoleNarrator<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    // Narration is best effort; a closed pipe must not abort the run.
    fn line(&mut self, text: impl AsRef<str>) {
        let _ = writeln!(self.out, "{}", text.as_ref());
    }
}

impl<W: Write> Narrator for ConsoleNarrator<W> {
    fn run_started(&mut self, automation: &str, description: Option<&str>, dry_run: bool) {
        let mode = if dry_run { " (dry run)" } else { "" };
        self.line(format!("Running {automation}{mode}"));
        if let Some(description) = description {
            self.line(format!("  {description}"));
        }
        self.line("");
    }

    fn step_started(&mut self, position: usize, total: usize, label: &str, kind: &str) {
        self.line(format!("[{position}/{total}] {label} ({kind})"));
    }

    fn condition_failed(&mut self, condition: &str, error: &ExpressionError) {
        self.line(format!("  condition error in `{condition}`: {error}"));
    }

    fn condition_not_met(&mut self, condition: &str) {
        self.line(format!("  skipped: condition not met ({condition})"));
    }

    fn exiting(&mut self) {
        self.line("  exiting automation");
    }

    fn skipping_to(&mut self, target: &str) {
        self.line(format!("  skipping to {target}"));
    }

    fn capability_resolved(&mut self, capability: &str, method: &str, provider: &ProviderEntry) {
        self.line(format!("  capability: {capability}.{method}"));
        self.line(format!("  provider: {}", provider.provider_id));
    }

    fn dry_run_args(&mut self, args: &JsonValue) {
        self.line(format!("  args: {args}"));
        self.line("  (dry run, not executed)");
    }

    fn live_instructions(&mut self, provider: &ProviderEntry, args: &JsonValue, instructions: &str) {
        self.line(format!("  execute with provider {}:", provider.provider_id));
        self.line(format!("  location: {}", provider.location.display()));
        self.line(format!("  args: {args}"));
        for instruction in instructions.lines() {
            self.line(format!("    {instruction}"));
        }
    }

    fn captured(&mut self, name: &str) {
        self.line(format!("  captured as `{name}`"));
    }

    fn notify(&mut self, message: &str, dry_run: bool) {
        self.line(format!("  notify: {message}"));
        if !dry_run {
            self.line("  send this message to the user");
        }
    }

    fn template_rendered(&mut self, length: usize) {
        self.line(format!("  rendered template ({length} chars)"));
    }

    fn evaluated(&mut self, result: &Value) {
        self.line(format!("  result: {}", result.render()));
    }

    fn evaluation_failed(&mut self, error: &ExpressionError) {
        self.line(format!("  evaluation error: {error}"));
    }

    fn run_completed(&mut self, trace: &Trace) {
        self.line("");
        self.line(format!(
            "Completed {}: {} steps, {} skipped",
            trace.automation(),
            trace.steps().len(),
            trace.skipped_count()
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn console_narration_writes_lines() {
        let mut narrator = ConsoleNarrator::new(Vec::new());
        narrator.step_started(1, 3, "fetch", "capability");
        narrator.live_instructions(
            &ProviderEntry {
                provider_id: "youtube".into(),
                location: PathBuf::from("/providers/youtube"),
                manifest: None,
            },
            &serde_json::json!({"limit": 5}),
            "Call the API.\nReturn ids.",
        );
        narrator.notify("hello", true);

        let output = String::from_utf8(narrator.into_inner()).unwrap();
        assert_eq!(
            output,
            "[1/3] fetch (capability)\n  execute with provider youtube:\n  location: /providers/youtube\n  args: {\"limit\":5}\n    Call the API.\n    Return ids.\n  notify: hello\n"
        );
    }
}
