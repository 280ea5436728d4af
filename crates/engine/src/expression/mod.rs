//! Restricted expression language used by conditions, `evaluate` actions, and `${...}`
//! placeholders.
//!
//! Two input forms are accepted:
//!
//! - a single expression, whose value is the result;
//! - a snippet (any text containing a newline, or starting with `const`/`let`/`var`), run
//!   as a block whose explicit `return` value is the result.
//!
//! Every context binding is addressable by name (`videos.length`, `config.limit`). There is
//! no I/O and no access to anything outside the context and the built-in functions.
//!
//! ```rust
//! use capflow_engine::{Evaluator, ExecutionContext, ScriptEvaluator, Value};
//!
//! let mut context = ExecutionContext::new();
//! context.bind("items", Value::from(serde_json::json!([3, 4])));
//! let total = ScriptEvaluator.evaluate("items.reduce((sum, n) => sum + n, 0)", &context).unwrap();
//! assert_eq!(total, Value::Number(7.0));
//! ```

mod ast;
mod builtins;
mod interpreter;
mod lexer;
mod parser;

use thiserror::Error;
use tracing::trace;

use crate::{context::ExecutionContext, value::Value};
use interpreter::Interpreter;

const DECLARATION_KEYWORDS: [&str; 3] = ["const", "let", "var"];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },
    #[error("{name} is not defined")]
    UndefinedVariable { name: String },
    #[error("type error: {message}")]
    Type { message: String },
    #[error("division by zero")]
    DivisionByZero,
    #[error("unsupported: {message}")]
    Unsupported { message: String },
}

/// Evaluates expression text against a context snapshot.
///
/// Implementations must not retain state between calls.
pub trait Evaluator {
    fn evaluate(&self, text: &str, context: &ExecutionContext) -> Result<Value, ExpressionError>;
}

/// The built-in interpreter for the restricted language.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptEvaluator;

impl Evaluator for ScriptEvaluator {
    fn evaluate(&self, text: &str, context: &ExecutionContext) -> Result<Value, ExpressionError> {
        let source = text.trim();
        let mut interpreter = Interpreter::new(context);
        if is_snippet(source) {
            trace!(length = source.len(), "evaluating snippet");
            let program = parser::parse_program(source)?;
            interpreter.run_program(&program)
        } else {
            let expression = parser::parse_expression(source)?;
            interpreter.evaluate(&expression)
        }
    }
}

/// Whether text is run as a statement block rather than a single expression.
pub fn is_snippet(text: &str) -> bool {
    let text = text.trim_start();
    if text.contains('\n') {
        return true;
    }
    DECLARATION_KEYWORDS.iter().any(|keyword| {
        text.strip_prefix(keyword)
            .is_some_and(|rest| rest.starts_with(|c: char| c.is_whitespace()))
    })
}
