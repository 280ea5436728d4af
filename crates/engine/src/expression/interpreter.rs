//! Tree-walking interpreter.
//!
//! Local declarations live in a stack of scopes layered over the borrowed
//! [`ExecutionContext`]. The context is never written: assigning to (or pushing onto) a context
//! binding copies it into the outermost local scope first, so every evaluation starts from the
//! same snapshot.

use indexmap::IndexMap;

use super::{
    ExpressionError,
    ast::{ArrowBody, ArrowFunction, AssignOp, BinaryOp, Expr, LogicalOp, MemberKey, Stmt, TemplatePart, UnaryOp},
    builtins,
};
use crate::{context::ExecutionContext, value::Value};

const CALLBACK_METHODS: [&str; 8] = ["map", "filter", "find", "findIndex", "some", "every", "reduce", "forEach"];

#[derive(Debug)]
struct Binding {
    value: Value,
    mutable: bool,
}

#[derive(Debug, Default)]
struct Scope {
    bindings: IndexMap<String, Binding>,
}

enum Flow {
    Continue,
    Return(Value),
}

pub struct Interpreter<'ctx> {
    context: &'ctx ExecutionContext,
    scopes: Vec<Scope>,
}

impl<'ctx> Interpreter<'ctx> {
    pub fn new(context: &'ctx ExecutionContext) -> Self {
        Self {
            context,
            scopes: vec![Scope::default()],
        }
    }

    /// Runs a snippet. The result is the value of the first executed `return`, or the value of
    /// the snippet itself when it is a single expression statement.
    pub fn run_program(&mut self, program: &[Stmt]) -> Result<Value, ExpressionError> {
        if let [Stmt::Expr(expression)] = program {
            return self.evaluate(expression);
        }
        match self.exec_statements(program)? {
            Flow::Return(value) => Ok(value),
            Flow::Continue => Ok(Value::Null),
        }
    }

    fn exec_statements(&mut self, statements: &[Stmt]) -> Result<Flow, ExpressionError> {
        for statement in statements {
            if let Flow::Return(value) = self.exec(statement)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Continue)
    }

    fn exec_scoped(&mut self, statements: &[Stmt], seed: Option<(&str, Value)>) -> Result<Flow, ExpressionError> {
        let mut scope = Scope::default();
        if let Some((name, value)) = seed {
            scope.bindings.insert(name.to_string(), Binding { value, mutable: false });
        }
        self.scopes.push(scope);
        let flow = self.exec_statements(statements);
        self.scopes.pop();
        flow
    }

    fn exec(&mut self, statement: &Stmt) -> Result<Flow, ExpressionError> {
        match statement {
            Stmt::Declare { name, init, mutable } => {
                let value = match init {
                    Some(init) => self.evaluate(init)?,
                    None => Value::Null,
                };
                let scope = self.current_scope();
                if scope.bindings.contains_key(name) {
                    return Err(ExpressionError::Type {
                        message: format!("identifier '{name}' has already been declared"),
                    });
                }
                scope.bindings.insert(name.clone(), Binding { value, mutable: *mutable });
            }
            Stmt::Assign { target, op, value } => {
                let value = self.evaluate(value)?;
                self.assign(target, *op, value)?;
            }
            Stmt::Expr(expression) => {
                self.evaluate(expression)?;
            }
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                if self.evaluate(test)?.is_truthy() {
                    return self.exec_scoped(consequent, None);
                }
                if let Some(alternate) = alternate {
                    return self.exec_scoped(alternate, None);
                }
            }
            Stmt::ForOf { binding, iterable, body } => {
                let items = match self.evaluate(iterable)? {
                    Value::Array(items) => items,
                    Value::String(text) => text.chars().map(|c| Value::String(c.to_string())).collect(),
                    other => {
                        return Err(ExpressionError::Type {
                            message: format!("{} is not iterable", other.type_name()),
                        });
                    }
                };
                for item in items {
                    if let Flow::Return(value) = self.exec_scoped(body, Some((binding.as_str(), item)))? {
                        return Ok(Flow::Return(value));
                    }
                }
            }
            Stmt::Return(value) => {
                let value = match value {
                    Some(value) => self.evaluate(value)?,
                    None => Value::Null,
                };
                return Ok(Flow::Return(value));
            }
            Stmt::Block(statements) => return self.exec_scoped(statements, None),
        }
        Ok(Flow::Continue)
    }

    fn current_scope(&mut self) -> &mut Scope {
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }

    fn assign(&mut self, target: &str, op: AssignOp, value: Value) -> Result<(), ExpressionError> {
        if let Some(binding) = self.local_binding(target)
            && !binding.mutable
        {
            return Err(ExpressionError::Type {
                message: format!("assignment to constant variable '{target}'"),
            });
        }
        let slot = self.local_slot(target)?;
        *slot = match op {
            AssignOp::Assign => value,
            AssignOp::AddAssign => builtins::binary(BinaryOp::Add, slot, &value)?,
            AssignOp::SubtractAssign => builtins::binary(BinaryOp::Subtract, slot, &value)?,
        };
        Ok(())
    }

    fn local_binding(&self, name: &str) -> Option<&Binding> {
        self.scopes.iter().rev().find_map(|scope| scope.bindings.get(name))
    }

    /// Mutable slot for `name`, copying a context binding into the outermost scope on first write.
    fn local_slot(&mut self, name: &str) -> Result<&mut Value, ExpressionError> {
        let undefined = || ExpressionError::UndefinedVariable { name: name.to_string() };
        if let Some(index) = self.scopes.iter().rposition(|scope| scope.bindings.contains_key(name)) {
            return self.scopes[index]
                .bindings
                .get_mut(name)
                .map(|binding| &mut binding.value)
                .ok_or_else(undefined);
        }
        let value = self.context.get(name).cloned().ok_or_else(undefined)?;
        let binding = self.scopes[0]
            .bindings
            .entry(name.to_string())
            .or_insert(Binding { value, mutable: true });
        Ok(&mut binding.value)
    }

    fn lookup(&self, name: &str) -> Option<&Value> {
        self.local_binding(name).map(|binding| &binding.value).or_else(|| self.context.get(name))
    }

    fn is_bound(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn evaluate(&mut self, expression: &Expr) -> Result<Value, ExpressionError> {
        match expression {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Template(parts) => {
                let mut rendered = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Text(text) => rendered.push_str(text),
                        TemplatePart::Expr(inner) => rendered.push_str(&self.evaluate(inner)?.to_display_string()),
                    }
                }
                Ok(Value::String(rendered))
            }
            Expr::Identifier(name) => match self.lookup(name) {
                Some(value) => Ok(value.clone()),
                None if builtins::is_namespace(name) || builtins::is_global_function(name) => Err(ExpressionError::Unsupported {
                    message: format!("'{name}' can only be used to call its functions"),
                }),
                None => Err(ExpressionError::UndefinedVariable { name: name.clone() }),
            },
            Expr::Array(items) => items
                .iter()
                .map(|item| self.evaluate(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Expr::Object(entries) => {
                let mut object = IndexMap::new();
                for (key, value) in entries {
                    let value = self.evaluate(value)?;
                    object.insert(key.clone(), value);
                }
                Ok(Value::Object(object))
            }
            Expr::Member { .. } | Expr::Call { .. } => Ok(self.evaluate_chain(expression)?.unwrap_or_default()),
            Expr::Unary { op, operand } => {
                if *op == UnaryOp::TypeOf
                    && let Expr::Identifier(name) = operand.as_ref()
                    && !self.is_bound(name)
                {
                    return Ok(Value::from("undefined"));
                }
                let operand = self.evaluate(operand)?;
                Ok(builtins::unary(*op, &operand))
            }
            Expr::Binary { op, left, right } => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                builtins::binary(*op, &left, &right)
            }
            Expr::Logical { op, left, right } => {
                let left = self.evaluate(left)?;
                let short_circuit = match op {
                    LogicalOp::And => !left.is_truthy(),
                    LogicalOp::Or => left.is_truthy(),
                    LogicalOp::Coalesce => !left.is_null(),
                };
                if short_circuit { Ok(left) } else { self.evaluate(right) }
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.evaluate(test)?.is_truthy() {
                    self.evaluate(consequent)
                } else {
                    self.evaluate(alternate)
                }
            }
            Expr::Arrow(_) => Err(ExpressionError::Unsupported {
                message: "arrow functions can only be passed as callbacks".to_string(),
            }),
        }
    }

    /// Evaluates member and call chains. `None` means an optional link (`?.`) short-circuited.
    fn evaluate_chain(&mut self, expression: &Expr) -> Result<Option<Value>, ExpressionError> {
        match expression {
            Expr::Member { object, key, optional } => {
                if let (Expr::Identifier(namespace), MemberKey::Named(name)) = (object.as_ref(), key)
                    && builtins::is_namespace(namespace)
                    && !self.is_bound(namespace)
                {
                    return builtins::namespace_constant(namespace, name).map(Some);
                }
                let Some(target) = self.evaluate_chain(object)? else {
                    return Ok(None);
                };
                if *optional && target.is_null() {
                    return Ok(None);
                }
                let key = self.member_key(key)?;
                builtins::get_member(&target, &key).map(Some)
            }
            Expr::Call { callee, args } => self.call(callee, args),
            other => self.evaluate(other).map(Some),
        }
    }

    fn member_key(&mut self, key: &MemberKey) -> Result<Value, ExpressionError> {
        match key {
            MemberKey::Named(name) => Ok(Value::String(name.clone())),
            MemberKey::Computed(expression) => self.evaluate(expression),
        }
    }

    fn call(&mut self, callee: &Expr, args: &[Expr]) -> Result<Option<Value>, ExpressionError> {
        match callee {
            Expr::Identifier(function) if builtins::is_global_function(function) && !self.is_bound(function) => {
                let args = self.evaluate_args(args)?;
                builtins::call_global(function, &args).map(Some)
            }
            Expr::Member {
                object,
                key: MemberKey::Named(method),
                optional,
            } => {
                if let Expr::Identifier(namespace) = object.as_ref()
                    && builtins::is_namespace(namespace)
                    && !self.is_bound(namespace)
                {
                    let args = self.evaluate_args(args)?;
                    return builtins::call_namespace(namespace, method, &args).map(Some);
                }
                if method == "push" && !*optional {
                    return self.push(object, args).map(Some);
                }

                let Some(receiver) = self.evaluate_chain(object)? else {
                    return Ok(None);
                };
                if *optional && receiver.is_null() {
                    return Ok(None);
                }
                if CALLBACK_METHODS.contains(&method.as_str()) {
                    return self.call_with_callback(&receiver, method, args).map(Some);
                }
                let args = self.evaluate_args(args)?;
                builtins::call_method(&receiver, method, &args).map(Some)
            }
            Expr::Member { .. } => Err(ExpressionError::Unsupported {
                message: "computed method calls are not supported".to_string(),
            }),
            Expr::Identifier(name) if !self.is_bound(name) => Err(ExpressionError::UndefinedVariable { name: name.clone() }),
            other => {
                let value = self.evaluate(other)?;
                Err(ExpressionError::Type {
                    message: format!("{} is not a function", value.type_name()),
                })
            }
        }
    }

    fn evaluate_args(&mut self, args: &[Expr]) -> Result<Vec<Value>, ExpressionError> {
        args.iter().map(|arg| self.evaluate(arg)).collect()
    }

    fn call_with_callback(&mut self, receiver: &Value, method: &str, args: &[Expr]) -> Result<Value, ExpressionError> {
        let Value::Array(items) = receiver else {
            let type_name = if let Value::Placeholder(_) = receiver { "pending capability result" } else { receiver.type_name() };
            return Err(ExpressionError::Type {
                message: format!("{method} is not a function on {type_name}"),
            });
        };
        let Some(Expr::Arrow(callback)) = args.first() else {
            return Err(ExpressionError::Type {
                message: format!("{method} expects an arrow function callback"),
            });
        };

        match method {
            "map" => {
                let mut mapped = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    mapped.push(self.invoke(callback, vec![item.clone(), index_value(index)])?);
                }
                Ok(Value::Array(mapped))
            }
            "filter" => {
                let mut kept = Vec::new();
                for (index, item) in items.iter().enumerate() {
                    if self.invoke(callback, vec![item.clone(), index_value(index)])?.is_truthy() {
                        kept.push(item.clone());
                    }
                }
                Ok(Value::Array(kept))
            }
            "find" | "findIndex" => {
                for (index, item) in items.iter().enumerate() {
                    if self.invoke(callback, vec![item.clone(), index_value(index)])?.is_truthy() {
                        return Ok(if method == "find" { item.clone() } else { index_value(index) });
                    }
                }
                Ok(if method == "find" { Value::Null } else { Value::Number(-1.0) })
            }
            "some" | "every" => {
                let wanted = method == "some";
                for (index, item) in items.iter().enumerate() {
                    if self.invoke(callback, vec![item.clone(), index_value(index)])?.is_truthy() == wanted {
                        return Ok(Value::Bool(wanted));
                    }
                }
                Ok(Value::Bool(!wanted))
            }
            "reduce" => {
                let (mut accumulator, start) = match args.get(1) {
                    Some(initial) => (self.evaluate(initial)?, 0),
                    None => match items.first() {
                        Some(first) => (first.clone(), 1),
                        None => {
                            return Err(ExpressionError::Type {
                                message: "reduce of empty array with no initial value".to_string(),
                            });
                        }
                    },
                };
                for (index, item) in items.iter().enumerate().skip(start) {
                    accumulator = self.invoke(callback, vec![accumulator, item.clone(), index_value(index)])?;
                }
                Ok(accumulator)
            }
            _ => {
                for (index, item) in items.iter().enumerate() {
                    self.invoke(callback, vec![item.clone(), index_value(index)])?;
                }
                Ok(Value::Null)
            }
        }
    }

    fn invoke(&mut self, callback: &ArrowFunction, args: Vec<Value>) -> Result<Value, ExpressionError> {
        let mut scope = Scope::default();
        let mut args = args.into_iter();
        for param in &callback.params {
            let value = args.next().unwrap_or_default();
            scope.bindings.insert(param.clone(), Binding { value, mutable: true });
        }
        self.scopes.push(scope);
        let result = match &callback.body {
            ArrowBody::Expr(body) => self.evaluate(body),
            ArrowBody::Block(statements) => self.exec_statements(statements).map(|flow| match flow {
                Flow::Return(value) => value,
                Flow::Continue => Value::Null,
            }),
        };
        self.scopes.pop();
        result
    }

    /// `target.push(...)`: appends in place and returns the new length.
    fn push(&mut self, target: &Expr, args: &[Expr]) -> Result<Value, ExpressionError> {
        let values = self.evaluate_args(args)?;
        let slot = self.place(target)?;
        match slot {
            Value::Array(items) => {
                items.extend(values);
                Ok(index_value(items.len()))
            }
            other => Err(ExpressionError::Type {
                message: format!("push is not a function on {}", other.type_name()),
            }),
        }
    }

    /// Resolves an identifier or property path to a mutable slot.
    fn place(&mut self, target: &Expr) -> Result<&mut Value, ExpressionError> {
        let mut keys = Vec::new();
        let mut cursor = target;
        let root = loop {
            match cursor {
                Expr::Identifier(name) => break name,
                Expr::Member { object, key, .. } => {
                    keys.push(key);
                    cursor = object;
                }
                _ => {
                    return Err(ExpressionError::Unsupported {
                        message: "push requires a variable or property path".to_string(),
                    });
                }
            }
        };
        let mut path = Vec::with_capacity(keys.len());
        for key in keys.into_iter().rev() {
            path.push(self.member_key(key)?);
        }

        let mut slot = self.local_slot(root)?;
        for key in path {
            let missing = || ExpressionError::Type {
                message: format!("cannot push onto missing property '{}'", key.to_display_string()),
            };
            slot = match slot {
                Value::Object(entries) => entries.get_mut(&key.to_display_string()).ok_or_else(missing)?,
                Value::Array(items) => match key {
                    Value::Number(number) if number >= 0.0 && number.fract() == 0.0 => {
                        items.get_mut(number as usize).ok_or_else(missing)?
                    }
                    _ => return Err(missing()),
                },
                _ => return Err(missing()),
            };
        }
        Ok(slot)
    }
}

fn index_value(index: usize) -> Value {
    Value::Number(index as f64)
}

#[cfg(test)]
mod tests {
    use super::super::parser::{parse_expression, parse_program};
    use super::*;
    use serde_json::json;

    fn context() -> ExecutionContext {
        let mut context = ExecutionContext::new();
        context.bind("videos", Value::from(&json!([{"title": "a", "views": 10}, {"title": "b", "views": 30}])));
        context.bind("config", Value::from(&json!({"threshold": 20})));
        context
    }

    fn eval(source: &str) -> Result<Value, ExpressionError> {
        let context = context();
        Interpreter::new(&context).evaluate(&parse_expression(source)?)
    }

    fn run(source: &str, context: &ExecutionContext) -> Result<Value, ExpressionError> {
        Interpreter::new(context).run_program(&parse_program(source)?)
    }

    #[test]
    fn evaluates_context_bindings_directly() {
        assert_eq!(eval("videos.length > 0").unwrap(), Value::Bool(true));
        assert_eq!(eval("videos[1].views >= config.threshold").unwrap(), Value::Bool(true));
        assert_eq!(eval("`${videos[0].title}!`").unwrap(), Value::from("a!"));
    }

    #[test]
    fn callbacks_see_enclosing_bindings() {
        assert_eq!(
            eval("videos.filter(v => v.views > config.threshold).map(v => v.title)").unwrap(),
            Value::from(&json!(["b"]))
        );
        assert_eq!(eval("videos.reduce((sum, v) => sum + v.views, 0)").unwrap(), Value::Number(40.0));
        assert_eq!(eval("videos.some(v => v.title === 'b')").unwrap(), Value::Bool(true));
        assert_eq!(eval("videos.find(v => v.views > 100)").unwrap(), Value::Null);
    }

    #[test]
    fn optional_chaining_short_circuits_the_chain() {
        assert_eq!(eval("config.missing?.deep.deeper").unwrap(), Value::Null);
        assert!(matches!(eval("config.missing.deep"), Err(ExpressionError::Type { .. })));
        assert_eq!(eval("config.missing ?? 'fallback'").unwrap(), Value::from("fallback"));
    }

    #[test]
    fn undefined_names_error_except_under_typeof() {
        assert_eq!(eval("nope"), Err(ExpressionError::UndefinedVariable { name: "nope".into() }));
        assert_eq!(eval("typeof nope").unwrap(), Value::from("undefined"));
        assert!(matches!(eval("Math"), Err(ExpressionError::Unsupported { .. })));
    }

    #[test]
    fn snippets_return_explicit_values() {
        let context = context();
        let snippet = "const titles = [];\nfor (const v of videos) {\n  if (v.views > 5) titles.push(v.title.toUpperCase());\n}\nlet total = 0\ntotal += titles.length\nreturn { titles, total }";
        assert_eq!(run(snippet, &context).unwrap(), Value::from(&json!({"titles": ["A", "B"], "total": 2})));
        assert_eq!(run("const x = 1\n", &context).unwrap(), Value::Null);
    }

    #[test]
    fn writes_never_reach_the_context() {
        let context = context();
        assert_eq!(run("videos.push(1)\nreturn videos.length", &context).unwrap(), Value::Number(3.0));
        assert_eq!(run("config = 5\nreturn config", &context).unwrap(), Value::Number(5.0));
        assert_eq!(context, self::context());
    }

    #[test]
    fn constants_cannot_be_reassigned() {
        let context = context();
        assert!(matches!(run("const a = 1\na = 2", &context), Err(ExpressionError::Type { .. })));
        assert!(matches!(run("b = 2", &context), Err(ExpressionError::UndefinedVariable { .. })));
    }

    #[test]
    fn push_into_nested_local_paths() {
        let context = context();
        assert_eq!(
            run("const acc = { items: [] };\nacc.items.push(1, 2);\nreturn acc", &context).unwrap(),
            Value::from(&json!({"items": [1, 2]}))
        );
    }
}
