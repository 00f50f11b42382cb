//! Tree-walking interpreter.
//!
//! Statements evaluate to a [`Flow`] so `break`, `continue` and `return`
//! travel outward as ordinary values instead of unwinding. Every recursive
//! step is boxed so the async call graph has a finite size; host commands
//! are awaited in place, which lets `wait` suspend a script without blocking
//! the runtime. Statement and expression polls grow the native stack on
//! demand, so only `max_call_depth` bounds recursion.

use std::collections::VecDeque;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ast::*;
use crate::builtins::{BuiltinRegistry, NativeFn};
use crate::environment::{EnvId, Environments};
use crate::error::{ErrorKind, RuntimeError};
use crate::events::{Event, EventBus};
use crate::host::{Host, HostCommand};
use crate::operators;
use crate::stack::GrowStack;
use crate::value::{Closure, Value};

/// Default limit on nested function calls.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 256;

/// Receives each line written by `print`.
pub type OutputCallback = Rc<dyn Fn(&str)>;

/// How control leaves a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Normal,
    Break(Position),
    Continue(Position),
    Return(Value),
}

#[derive(Clone)]
struct Handler {
    event: String,
    body: Rc<Block>,
    env: EnvId,
}

enum Callee {
    User(Rc<Closure>),
    Native(NativeFn),
}

/// One step of a `set` target path, with index expressions already evaluated.
enum PathKey {
    Member(String),
    Index(Value),
}

type Eval<'a, T> = std::pin::Pin<Box<dyn std::future::Future<Output = Result<T, RuntimeError>> + 'a>>;

pub struct Interpreter {
    id: Uuid,
    envs: Environments,
    builtins: BuiltinRegistry,
    host: Rc<dyn Host>,
    bus: Option<EventBus>,
    handlers: Vec<Handler>,
    pending: VecDeque<Event>,
    output: Vec<String>,
    on_output: Option<OutputCallback>,
    call_depth: usize,
    max_call_depth: usize,
}

impl Interpreter {
    pub fn new(builtins: BuiltinRegistry, host: Rc<dyn Host>) -> Self {
        Self {
            id: Uuid::new_v4(),
            envs: Environments::new(),
            builtins,
            host,
            bus: None,
            handlers: Vec::new(),
            pending: VecDeque::new(),
            output: Vec::new(),
            on_output: None,
            call_depth: 0,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    /// Routes `emit` to `bus` instead of the local queue.
    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_output(mut self, callback: OutputCallback) -> Self {
        self.on_output = Some(callback);
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn define_global(&mut self, name: impl Into<String>, value: Value) {
        let root = self.envs.root();
        self.envs.define(root, name, value);
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.envs.get(self.envs.root(), name).cloned()
    }

    /// Top-level bindings in the order they were created.
    pub fn variables(&self) -> IndexMap<String, Value> {
        self.envs.bindings(self.envs.root())
    }

    /// Every line printed so far.
    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Number of environments still allocated, root included.
    pub fn live_environments(&self) -> usize {
        self.envs.live_frames()
    }

    /// Takes the oldest locally emitted event that has not been dispatched.
    pub fn next_pending(&mut self) -> Option<Event> {
        self.pending.pop_front()
    }

    /// Runs a parsed script's top-level block in the root environment.
    ///
    /// A top-level `return` ends the script successfully.
    pub async fn run_main(&mut self, program: &Block) -> Result<(), RuntimeError> {
        let root = self.envs.root();
        let flow = self.exec_block(program, root).await;
        self.envs.collect();
        match flow? {
            Flow::Break(pos) => Err(break_outside(pos)),
            Flow::Continue(pos) => Err(continue_outside(pos)),
            Flow::Normal | Flow::Return(_) => Ok(()),
        }
    }

    /// Runs every handler registered for `event.name`, in registration order.
    ///
    /// A failing handler does not stop the others; all failures are returned.
    pub async fn dispatch(&mut self, event: &Event) -> Vec<RuntimeError> {
        let matching: Vec<Handler> = self
            .handlers
            .iter()
            .filter(|h| h.event == event.name)
            .cloned()
            .collect();
        debug!(event = %event.name, handlers = matching.len(), "dispatching event");

        let payload = event.payload_value();
        let mut errors = Vec::new();
        for handler in matching {
            let env = self.envs.child(handler.env);
            self.envs.define(env, "event", payload.clone());
            let result = self.exec_block(&handler.body, env).await;
            self.envs.release(env);

            let outcome = match result {
                Ok(Flow::Break(pos)) => Err(break_outside(pos)),
                Ok(Flow::Continue(pos)) => Err(continue_outside(pos)),
                Ok(_) => Ok(()),
                Err(e) => Err(e),
            };
            if let Err(err) = outcome {
                warn!(event = %event.name, error = %err, "event handler failed");
                errors.push(err);
            }
        }
        errors
    }

    fn print(&mut self, line: String) {
        if let Some(callback) = &self.on_output {
            callback(&line);
        }
        self.output.push(line);
    }

    fn exec_block<'a>(&'a mut self, block: &'a Block, env: EnvId) -> Eval<'a, Flow> {
        Box::pin(async move {
            for stmt in &block.statements {
                match self.exec_stmt(stmt, env).await? {
                    Flow::Normal => {}
                    flow => return Ok(flow),
                }
            }
            Ok(Flow::Normal)
        })
    }

    fn exec_stmt<'a>(&'a mut self, stmt: &'a Statement, env: EnvId) -> Eval<'a, Flow> {
        Box::pin(async move {
            GrowStack(self.exec_stmt_inner(stmt, env))
                .await
                .map_err(|e| e.at(stmt.pos))
        })
    }

    fn exec_stmt_inner<'a>(&'a mut self, stmt: &'a Statement, env: EnvId) -> Eval<'a, Flow> {
        Box::pin(async move {
            let pos = stmt.pos;
            match &stmt.kind {
                StmtKind::Block(block) => self.exec_block(block, env).await,

                StmtKind::Set { target, value } => {
                    let value = self.eval(value, env).await?;
                    self.assign(target, value, env).await?;
                    Ok(Flow::Normal)
                }

                StmtKind::Print(expr) => {
                    let value = self.eval(expr, env).await?;
                    self.print(value.as_string());
                    Ok(Flow::Normal)
                }

                StmtKind::If { condition, then_block, else_block } => {
                    if self.eval(condition, env).await?.is_truthy() {
                        self.exec_block(then_block, env).await
                    } else if let Some(else_block) = else_block {
                        self.exec_block(else_block, env).await
                    } else {
                        Ok(Flow::Normal)
                    }
                }

                StmtKind::Loop { count, body } => {
                    let count = loop_count(&self.eval(count, env).await?);
                    for i in 0..count {
                        let iteration = self.envs.child(env);
                        self.envs.define(iteration, "i", Value::Number(i as f64));
                        let result = self.exec_block(body, iteration).await;
                        self.envs.release(iteration);
                        match result? {
                            Flow::Break(_) => break,
                            Flow::Normal | Flow::Continue(_) => {}
                            flow @ Flow::Return(_) => return Ok(flow),
                        }
                    }
                    Ok(Flow::Normal)
                }

                StmtKind::While { condition, body } => {
                    while self.eval(condition, env).await?.is_truthy() {
                        let iteration = self.envs.child(env);
                        let result = self.exec_block(body, iteration).await;
                        self.envs.release(iteration);
                        match result? {
                            Flow::Break(_) => break,
                            Flow::Normal | Flow::Continue(_) => {}
                            flow @ Flow::Return(_) => return Ok(flow),
                        }
                    }
                    Ok(Flow::Normal)
                }

                StmtKind::ForEach { variable, collection, body } => {
                    let items = match self.eval(collection, env).await? {
                        Value::Array(items) => items,
                        Value::Object(fields) => fields.into_keys().map(Value::String).collect(),
                        Value::String(s) => s.chars().map(|c| Value::String(c.to_string())).collect(),
                        other => {
                            return Err(RuntimeError::type_mismatch(format!(
                                "Cannot iterate over {}",
                                other.type_name()
                            ))
                            .at(collection.pos))
                        }
                    };
                    for (index, item) in items.into_iter().enumerate() {
                        let iteration = self.envs.child(env);
                        self.envs.define(iteration, variable.as_str(), item);
                        self.envs.define(iteration, "index", Value::Number(index as f64));
                        let result = self.exec_block(body, iteration).await;
                        self.envs.release(iteration);
                        match result? {
                            Flow::Break(_) => break,
                            Flow::Normal | Flow::Continue(_) => {}
                            flow @ Flow::Return(_) => return Ok(flow),
                        }
                    }
                    Ok(Flow::Normal)
                }

                StmtKind::Break => Ok(Flow::Break(pos)),
                StmtKind::Continue => Ok(Flow::Continue(pos)),

                StmtKind::Return(expr) => {
                    let value = match expr {
                        Some(expr) => self.eval(expr, env).await?,
                        None => Value::Null,
                    };
                    Ok(Flow::Return(value))
                }

                StmtKind::FunctionDef(def) => {
                    let function = self.envs.close_over(Rc::clone(def), env);
                    self.envs.define(env, def.name.as_str(), function);
                    Ok(Flow::Normal)
                }

                StmtKind::Call(call) => {
                    self.call(call, env, pos).await?;
                    Ok(Flow::Normal)
                }

                StmtKind::TryCatch { try_block, error_var, catch_block } => {
                    match self.exec_block(try_block, env).await {
                        Ok(flow) => Ok(flow),
                        Err(err) => {
                            debug!(line = pos.line, error = %err, "caught runtime error");
                            let catch_env = self.envs.child(env);
                            self.envs.define(catch_env, error_var.as_str(), err.to_value());
                            let result = self.exec_block(catch_block, catch_env).await;
                            self.envs.release(catch_env);
                            result
                        }
                    }
                }

                StmtKind::Throw(expr) => {
                    let value = self.eval(expr, env).await?;
                    let message = match &value {
                        Value::Object(fields) => fields
                            .get("message")
                            .map(Value::as_string)
                            .unwrap_or_else(|| value.to_string()),
                        other => other.as_string(),
                    };
                    Err(RuntimeError::custom(message))
                }

                StmtKind::On { event, body } => {
                    self.envs.pin(env);
                    self.handlers.push(Handler { event: event.clone(), body: Rc::clone(body), env });
                    debug!(line = pos.line, event = %event, "registered event handler");
                    Ok(Flow::Normal)
                }

                StmtKind::Emit { event, payload } => {
                    let payload = match payload {
                        Some(expr) => self.eval(expr, env).await?.to_json(),
                        None => serde_json::Value::Null,
                    };
                    let event = Event::new(event.as_str(), payload).with_source(self.id);
                    match &self.bus {
                        Some(bus) => {
                            let receivers = bus.publish(event);
                            debug!(line = pos.line, receivers, "published event");
                        }
                        None => self.pending.push_back(event),
                    }
                    Ok(Flow::Normal)
                }

                StmtKind::Host(host) => {
                    self.exec_host(host, env, pos).await?;
                    Ok(Flow::Normal)
                }
            }
        })
    }

    fn exec_host<'a>(&'a mut self, stmt: &'a HostStatement, env: EnvId, pos: Position) -> Eval<'a, ()> {
        Box::pin(async move {
            let mut args = Vec::with_capacity(stmt.args.len());
            for arg in &stmt.args {
                args.push(self.eval(arg, env).await?);
            }
            let command = HostCommand::from_args(stmt.verb, &args)?;
            let line = pos.line;
            info!(line, command = command.name(), "executing host command");

            let host = Rc::clone(&self.host);
            let result = host.execute(command).await.map_err(|e| {
                RuntimeError::new(
                    ErrorKind::HostOperationFailed,
                    format!("{} failed: {}", stmt.verb.name(), e),
                )
            })?;

            if let Some(binding) = &stmt.binding {
                self.envs.set(env, binding, result);
            }
            Ok(())
        })
    }

    fn assign<'a>(&'a mut self, target: &'a AssignTarget, value: Value, env: EnvId) -> Eval<'a, ()> {
        Box::pin(async move {
            if target.path.is_empty() {
                self.envs.set(env, &target.name, value);
                return Ok(());
            }

            let mut keys = Vec::with_capacity(target.path.len());
            for accessor in &target.path {
                keys.push(match accessor {
                    Accessor::Member(name) => PathKey::Member(name.clone()),
                    Accessor::Index(expr) => PathKey::Index(self.eval(expr, env).await?),
                });
            }

            let slot = self.envs.get_mut(env, &target.name).ok_or_else(|| {
                RuntimeError::new(
                    ErrorKind::UndefinedVariable,
                    format!("Undefined variable: ${}", target.name),
                )
            })?;
            assign_path(slot, &keys, value)
        })
    }

    fn eval<'a>(&'a mut self, expr: &'a Expression, env: EnvId) -> Eval<'a, Value> {
        Box::pin(async move {
            GrowStack(self.eval_inner(expr, env))
                .await
                .map_err(|e| e.at(expr.pos))
        })
    }

    fn eval_inner<'a>(&'a mut self, expr: &'a Expression, env: EnvId) -> Eval<'a, Value> {
        Box::pin(async move {
            match &expr.kind {
                ExprKind::Literal(literal) => Ok(match literal {
                    Literal::Null => Value::Null,
                    Literal::Bool(b) => Value::Bool(*b),
                    Literal::Number(n) => Value::Number(*n),
                    Literal::String(s) => Value::String(s.clone()),
                }),

                ExprKind::Variable(name) => self.lookup(name, env),

                ExprKind::Binary { op: BinaryOp::And, left, right } => {
                    let left = self.eval(left, env).await?;
                    if !left.is_truthy() {
                        return Ok(left);
                    }
                    self.eval(right, env).await
                }

                ExprKind::Binary { op: BinaryOp::Or, left, right } => {
                    let left = self.eval(left, env).await?;
                    if left.is_truthy() {
                        return Ok(left);
                    }
                    self.eval(right, env).await
                }

                ExprKind::Binary { op, left, right } => {
                    let left = self.eval(left, env).await?;
                    let right = self.eval(right, env).await?;
                    operators::binary(*op, &left, &right)
                }

                ExprKind::Unary { op, operand } => {
                    let operand = self.eval(operand, env).await?;
                    operators::unary(*op, &operand)
                }

                ExprKind::Call(call) => self.call(call, env, expr.pos).await,

                ExprKind::Array(items) => {
                    let mut values = Vec::with_capacity(items.len());
                    for item in items {
                        values.push(self.eval(item, env).await?);
                    }
                    Ok(Value::Array(values))
                }

                ExprKind::Object(fields) => {
                    let mut values = IndexMap::with_capacity(fields.len());
                    for (key, value) in fields {
                        let value = self.eval(value, env).await?;
                        values.insert(key.clone(), value);
                    }
                    Ok(Value::Object(values))
                }

                ExprKind::Member { object, property } => {
                    let object = self.eval(object, env).await?;
                    member(&object, property)
                }

                ExprKind::Index { object, index } => {
                    let object = self.eval(object, env).await?;
                    let index = self.eval(index, env).await?;
                    index_value(&object, &index)
                }

                ExprKind::Grouping(inner) => self.eval(inner, env).await,

                ExprKind::Interpolated(parts) => {
                    let mut text = String::new();
                    for part in parts {
                        match part {
                            StringPart::Text(t) => text.push_str(t),
                            StringPart::Variable(name) => text.push_str(&self.lookup(name, env)?.as_string()),
                        }
                    }
                    Ok(Value::String(text))
                }
            }
        })
    }

    fn lookup(&self, name: &str, env: EnvId) -> Result<Value, RuntimeError> {
        self.envs.get(env, name).cloned().ok_or_else(|| {
            RuntimeError::new(ErrorKind::UndefinedVariable, format!("Undefined variable: ${}", name))
        })
    }

    fn resolve_callee(&self, name: &str, env: EnvId) -> Result<Callee, RuntimeError> {
        match self.envs.get(env, name) {
            Some(Value::Function(closure)) => Ok(Callee::User(Rc::clone(closure))),
            bound => match self.builtins.get(name) {
                Some(native) => Ok(Callee::Native(native)),
                None => match bound {
                    Some(other) => Err(RuntimeError::type_mismatch(format!(
                        "'{}' is a {}, not a function",
                        name,
                        other.type_name()
                    ))),
                    None => Err(RuntimeError::new(
                        ErrorKind::UndefinedFunction,
                        format!("Undefined function: {}", name),
                    )),
                },
            },
        }
    }

    fn call<'a>(&'a mut self, call: &'a CallExpr, env: EnvId, pos: Position) -> Eval<'a, Value> {
        Box::pin(async move {
            // The callee is resolved before any argument is evaluated
            let callee = self.resolve_callee(&call.name, env).map_err(|e| e.at(pos))?;

            let mut args = Vec::with_capacity(call.args.len());
            for arg in &call.args {
                args.push(self.eval(arg, env).await?);
            }
            debug!(line = pos.line, function = %call.name, args = args.len(), "calling function");

            match callee {
                Callee::Native(native) => native(&args).map_err(|e| e.at(pos)),
                Callee::User(closure) => {
                    if self.call_depth >= self.max_call_depth {
                        return Err(RuntimeError::new(
                            ErrorKind::RecursionLimit,
                            format!("Maximum call depth of {} exceeded in {}", self.max_call_depth, call.name),
                        )
                        .at(pos));
                    }

                    let frame = self.envs.child(closure.env);
                    let mut args = args.into_iter();
                    for param in &closure.def.params {
                        self.envs.define(frame, param.as_str(), args.next().unwrap_or(Value::Null));
                    }

                    self.call_depth += 1;
                    let body = Rc::clone(&closure.def.body);
                    let result = self.exec_block(&body, frame).await;
                    self.call_depth -= 1;
                    self.envs.release(frame);

                    match result? {
                        Flow::Return(value) => Ok(value),
                        Flow::Normal => Ok(Value::Null),
                        Flow::Break(pos) => Err(break_outside(pos)),
                        Flow::Continue(pos) => Err(continue_outside(pos)),
                    }
                }
            }
        })
    }
}

fn break_outside(pos: Position) -> RuntimeError {
    RuntimeError::new(ErrorKind::BreakOutsideLoop, "'break' used outside of a loop").at(pos)
}

fn continue_outside(pos: Position) -> RuntimeError {
    RuntimeError::new(ErrorKind::ContinueOutsideLoop, "'continue' used outside of a loop").at(pos)
}

/// Iteration count for `loop`: truncated toward zero. Non-finite counts run nothing.
fn loop_count(value: &Value) -> usize {
    match value.as_number() {
        Some(n) if n.is_finite() && n >= 1.0 => n.trunc() as usize,
        _ => 0,
    }
}

fn array_index(n: f64, len: usize) -> Result<usize, RuntimeError> {
    if n.fract() != 0.0 || n < 0.0 || n >= len as f64 {
        return Err(RuntimeError::new(
            ErrorKind::IndexOutOfRange,
            format!("Index {} out of range for length {}", Value::Number(n), len),
        ));
    }
    Ok(n as usize)
}

fn member(object: &Value, property: &str) -> Result<Value, RuntimeError> {
    match (object, property) {
        (Value::Array(items), "length") => Ok(Value::Number(items.len() as f64)),
        (Value::String(s), "length") => Ok(Value::Number(s.chars().count() as f64)),
        (Value::Object(fields), key) => Ok(fields.get(key).cloned().unwrap_or(Value::Null)),
        (other, _) => Err(RuntimeError::type_mismatch(format!(
            "Cannot read property '{}' of {}",
            property,
            other.type_name()
        ))),
    }
}

fn index_value(object: &Value, index: &Value) -> Result<Value, RuntimeError> {
    match (object, index) {
        (Value::Array(items), Value::Number(n)) => Ok(items[array_index(*n, items.len())?].clone()),
        (Value::String(s), Value::Number(n)) => {
            let chars: Vec<char> = s.chars().collect();
            let i = array_index(*n, chars.len())?;
            Ok(Value::String(chars[i].to_string()))
        }
        (Value::Object(fields), Value::String(key)) => {
            Ok(fields.get(key.as_str()).cloned().unwrap_or(Value::Null))
        }
        (Value::Array(_) | Value::String(_), other) => Err(RuntimeError::type_mismatch(format!(
            "Index must be a number, got {}",
            other.type_name()
        ))),
        (Value::Object(_), other) => Err(RuntimeError::type_mismatch(format!(
            "Object key must be a string, got {}",
            other.type_name()
        ))),
        (other, _) => Err(RuntimeError::type_mismatch(format!(
            "Cannot index into {}",
            other.type_name()
        ))),
    }
}

fn assign_path(slot: &mut Value, keys: &[PathKey], value: Value) -> Result<(), RuntimeError> {
    let Some((key, rest)) = keys.split_first() else {
        *slot = value;
        return Ok(());
    };
    match (slot, key) {
        (Value::Object(fields), PathKey::Member(name))
        | (Value::Object(fields), PathKey::Index(Value::String(name))) => {
            if rest.is_empty() {
                fields.insert(name.clone(), value);
                return Ok(());
            }
            match fields.get_mut(name.as_str()) {
                Some(next) => assign_path(next, rest, value),
                None => Err(RuntimeError::type_mismatch(format!(
                    "Cannot assign through missing key '{}'",
                    name
                ))),
            }
        }
        (Value::Array(items), PathKey::Index(Value::Number(n))) => {
            let i = array_index(*n, items.len())?;
            assign_path(&mut items[i], rest, value)
        }
        (Value::Array(_), _) => Err(RuntimeError::type_mismatch("Array index must be a number")),
        (Value::Object(_), _) => Err(RuntimeError::type_mismatch("Object key must be a string")),
        (other, PathKey::Member(name)) => Err(RuntimeError::type_mismatch(format!(
            "Cannot set property '{}' on {}",
            name,
            other.type_name()
        ))),
        (other, PathKey::Index(_)) => Err(RuntimeError::type_mismatch(format!(
            "Cannot index into {}",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{NullHost, RecordingHost};
    use crate::parser::parse_source;

    fn interpreter() -> Interpreter {
        Interpreter::new(BuiltinRegistry::standard(), Rc::new(NullHost))
    }

    async fn run(source: &str) -> (Interpreter, Result<(), RuntimeError>) {
        let program = parse_source(source).unwrap();
        let mut interp = interpreter();
        let result = interp.run_main(&program).await;
        (interp, result)
    }

    async fn output(source: &str) -> Vec<String> {
        let (interp, result) = run(source).await;
        result.unwrap();
        interp.output().to_vec()
    }

    async fn error_kind(source: &str) -> ErrorKind {
        let (_, result) = run(source).await;
        result.unwrap_err().kind
    }

    #[tokio::test]
    async fn test_arithmetic_print() {
        assert_eq!(output("set $x = 2\nset $y = 3\nprint $x + $y").await, vec!["5"]);
    }

    #[tokio::test]
    async fn test_loop_binds_i() {
        assert_eq!(output("loop 3 { print $i }").await, vec!["0", "1", "2"]);
    }

    #[tokio::test]
    async fn test_break_inside_if() {
        assert_eq!(
            output("loop 10 { if $i == 3 then { break } print $i }").await,
            vec!["0", "1", "2"]
        );
    }

    #[tokio::test]
    async fn test_continue_skips_iteration() {
        assert_eq!(
            output("loop 4 { if $i % 2 == 0 { continue }\nprint $i }").await,
            vec!["1", "3"]
        );
    }

    #[tokio::test]
    async fn test_function_call() {
        let src = "func add $a $b { return $a + $b }\nset $s = call add 2 3\nprint $s";
        assert_eq!(output(src).await, vec!["5"]);
    }

    #[tokio::test]
    async fn test_missing_args_are_null_and_extras_ignored() {
        let src = "func f $a $b { return type($b) }\nprint call f 1\nprint call f 1 2 3";
        assert_eq!(output(src).await, vec!["null", "number"]);
    }

    #[tokio::test]
    async fn test_falling_off_function_returns_null() {
        assert_eq!(output("func f { set $t = 1 }\nprint type(call f)").await, vec!["null"]);
    }

    #[tokio::test]
    async fn test_set_mutates_outer_binding() {
        let src = "set $x = 1\nloop 1 { set $x = 5 }\nprint $x";
        assert_eq!(output(src).await, vec!["5"]);
    }

    #[tokio::test]
    async fn test_set_in_iteration_is_local() {
        let (interp, result) = run("loop 2 { set $tmp = $i }").await;
        result.unwrap();
        assert_eq!(interp.global("tmp"), None);
    }

    #[tokio::test]
    async fn test_if_does_not_open_scope() {
        let (interp, result) = run("if true { set $made = 1 }").await;
        result.unwrap();
        assert_eq!(interp.global("made"), Some(Value::Number(1.0)));
    }

    #[tokio::test]
    async fn test_closure_sees_defining_environment() {
        let src = "set $greeting = \"hi\"\nfunc greet $n { return $greeting + \" \" + $n }\nprint call greet \"ann\"";
        assert_eq!(output(src).await, vec!["hi ann"]);
    }

    #[tokio::test]
    async fn test_closures_capture_each_iteration() {
        let src = "set $fns = []\nloop 3 {\n  func show { return $i }\n  set $fns = push($fns, $show)\n}\nforeach $f in $fns { print call $f }";
        assert_eq!(output(src).await, vec!["0", "1", "2"]);
    }

    #[tokio::test]
    async fn test_uncaptured_environments_are_freed() {
        let (interp, result) = run("func f $n { return $n * 2 }\nloop 5 { set $x = call f $i }\nforeach $c in \"abc\" { set $y = $c }").await;
        result.unwrap();
        assert_eq!(interp.live_environments(), 1);
    }

    #[tokio::test]
    async fn test_loop_defined_functions_are_freed() {
        let (interp, result) = run("loop 5000 { func f { return $i } }\nset $n = 0\nwhile $n < 50 { set $n = $n + 1\nfunc g { return $n } }").await;
        result.unwrap();
        assert_eq!(interp.live_environments(), 1);
    }

    #[tokio::test]
    async fn test_dropped_closure_releases_environment() {
        let src = "func counter {\n  set $n = 0\n  func next { set $n = $n + 1\nreturn $n }\n  return $next\n}\nset $c = call counter\ncall $c\nprint call $c";
        let (mut interp, result) = run(src).await;
        result.unwrap();
        assert_eq!(interp.output(), ["2"]);
        assert_eq!(interp.live_environments(), 2);

        let program = parse_source("set $c = null").unwrap();
        interp.run_main(&program).await.unwrap();
        assert_eq!(interp.live_environments(), 1);
    }

    #[tokio::test]
    async fn test_recursion() {
        let src = "func fact $n { if $n <= 1 { return 1 }\nreturn $n * call fact($n - 1) }\nprint call fact 5";
        assert_eq!(output(src).await, vec!["120"]);
    }

    #[tokio::test]
    async fn test_recursion_up_to_default_limit() {
        let src = format!(
            "func down $n {{ if $n <= 0 {{ return 0 }}\nreturn 1 + call down($n - 1) }}\nprint call down {}",
            DEFAULT_MAX_CALL_DEPTH - 1
        );
        assert_eq!(output(&src).await, vec![(DEFAULT_MAX_CALL_DEPTH - 1).to_string()]);

        let src = format!(
            "func down $n {{ if $n <= 0 {{ return 0 }}\nreturn 1 + call down($n - 1) }}\nprint call down {}",
            DEFAULT_MAX_CALL_DEPTH
        );
        assert_eq!(error_kind(&src).await, ErrorKind::RecursionLimit);
    }

    #[tokio::test]
    async fn test_deep_recursion_grows_stack() {
        let program = parse_source("func down $n { if $n <= 0 { return 0 }\nreturn 1 + call down($n - 1) }\nprint call down 4000").unwrap();
        let mut interp = interpreter().with_max_call_depth(5000);
        interp.run_main(&program).await.unwrap();
        assert_eq!(interp.output(), ["4000"]);
    }

    #[tokio::test]
    async fn test_recursion_limit() {
        let program = parse_source("func down $n { return call down($n + 1) }\ncall down 0").unwrap();
        let mut interp = interpreter().with_max_call_depth(16);
        let err = interp.run_main(&program).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::RecursionLimit);
    }

    #[tokio::test]
    async fn test_user_function_shadows_builtin() {
        assert_eq!(output("func len $x { return 99 }\nprint len(\"ab\")").await, vec!["99"]);
    }

    #[tokio::test]
    async fn test_undefined_function_and_variable() {
        assert_eq!(error_kind("call nope").await, ErrorKind::UndefinedFunction);
        assert_eq!(error_kind("print $missing + 1").await, ErrorKind::UndefinedVariable);
        assert_eq!(error_kind("set $x = 1\ncall x").await, ErrorKind::TypeMismatch);
    }

    #[tokio::test]
    async fn test_callee_resolved_before_arguments() {
        // The argument would raise UndefinedVariable if it were evaluated first
        assert_eq!(error_kind("call nope $missing").await, ErrorKind::UndefinedFunction);
    }

    #[tokio::test]
    async fn test_try_catch() {
        let src = "try { call undefinedFunc } catch $e { print \"caught\" }\nprint after";
        assert_eq!(output(src).await, vec!["caught", "after"]);
    }

    #[tokio::test]
    async fn test_catch_binds_error_object() {
        let src = "try {\n  set $x = 1 / 0\n} catch $e {\n  print $e.kind\n  print $e.line\n}";
        assert_eq!(output(src).await, vec!["DivisionByZero", "2"]);
    }

    #[tokio::test]
    async fn test_throw_custom() {
        let src = "try { throw \"bad input\" } catch { print $error.message + \"/\" + $error.kind }";
        assert_eq!(output(src).await, vec!["bad input/Custom"]);
        assert_eq!(error_kind("throw {message: \"x\"}").await, ErrorKind::Custom);
    }

    #[tokio::test]
    async fn test_error_position() {
        let (_, result) = run("set $a = 1\nset $b = $a / 0").await;
        let err = result.unwrap_err();
        assert_eq!(err.kind, ErrorKind::DivisionByZero);
        assert_eq!(err.line(), Some(2));
    }

    #[tokio::test]
    async fn test_break_outside_loop() {
        assert_eq!(error_kind("break").await, ErrorKind::BreakOutsideLoop);
        assert_eq!(error_kind("continue").await, ErrorKind::ContinueOutsideLoop);
        assert_eq!(
            error_kind("func f { break }\nloop 2 { call f }").await,
            ErrorKind::BreakOutsideLoop
        );
    }

    #[tokio::test]
    async fn test_top_level_return_ends_script() {
        assert_eq!(output("print a\nreturn\nprint b").await, vec!["a"]);
    }

    #[tokio::test]
    async fn test_loop_counts() {
        assert_eq!(output("loop 2.9 { print $i }").await, vec!["0", "1"]);
        assert_eq!(output("loop \"2\" { print $i }").await, vec!["0", "1"]);
        assert!(output("loop -3 { print $i }").await.is_empty());
        assert!(output("loop \"many\" { print $i }").await.is_empty());
        assert!(output("loop \"inf\" { print $i }").await.is_empty());
        assert!(output("loop \"NaN\" { print $i }").await.is_empty());
        assert!(output("loop \"-infinity\" { print $i }").await.is_empty());
        assert!(output("set $big = 10\nloop 9 { set $big = $big * $big }\nloop $big { print $i }").await.is_empty());
    }

    #[tokio::test]
    async fn test_while_loop() {
        assert_eq!(
            output("set $n = 0\nwhile $n < 3 { set $n = $n + 1 }\nprint $n").await,
            vec!["3"]
        );
    }

    #[tokio::test]
    async fn test_foreach_kinds() {
        assert_eq!(output("foreach $k in {a: 1, b: 2} { print $k }").await, vec!["a", "b"]);
        assert_eq!(output("foreach $c in \"hi\" { print $index + \":\" + $c }").await, vec!["0:h", "1:i"]);
        assert_eq!(error_kind("foreach $x in 5 { print $x }").await, ErrorKind::TypeMismatch);
    }

    #[tokio::test]
    async fn test_strict_equality() {
        assert_eq!(output("print \"5\" == 5\nprint 5 == 5").await, vec!["false", "true"]);
    }

    #[tokio::test]
    async fn test_member_and_index() {
        let src = "set $o = {items: [10, 20], name: \"win\"}\nprint $o.items[1]\nprint $o.items.length\nprint type($o.nope)\nprint $o[\"name\"]";
        assert_eq!(output(src).await, vec!["20", "2", "null", "win"]);
        assert_eq!(error_kind("set $a = [1]\nprint $a[1]").await, ErrorKind::IndexOutOfRange);
        assert_eq!(error_kind("set $n = 3\nprint $n.length").await, ErrorKind::TypeMismatch);
    }

    #[tokio::test]
    async fn test_nested_assignment() {
        let src = "set $o = {items: [1, 2]}\nset $o.items[0] = 9\nset $o.extra = true\nprint $o";
        assert_eq!(output(src).await, vec!["{items: [9, 2], extra: true}"]);
        assert_eq!(error_kind("set $a = []\nset $a[0] = 1").await, ErrorKind::IndexOutOfRange);
        assert_eq!(error_kind("set $q.x = 1").await, ErrorKind::UndefinedVariable);
    }

    #[tokio::test]
    async fn test_short_circuit() {
        assert_eq!(output("print false && call nope\nprint null || \"d\"").await, vec!["false", "d"]);
    }

    #[tokio::test]
    async fn test_print_text_mode_quirk() {
        assert_eq!(output("set $name = \"Ann\"\nprint Hello $name!").await, vec!["Hello Ann !"]);
        assert_eq!(output("set $n = 3\nprint Found $n items").await, vec!["Found 3 items"]);
        assert_eq!(output("set $name = \"Ann\"\nprint $name and Bob").await, vec!["Ann and Bob"]);
        assert_eq!(output("set $n = 3\nprint $n or more").await, vec!["3 or more"]);
    }

    #[tokio::test]
    async fn test_templates() {
        assert_eq!(output("set $who = \"Bo\"\nprint \"Hi $who!\"").await, vec!["Hi Bo!"]);
    }

    #[tokio::test]
    async fn test_host_commands_and_bindings() {
        let program = parse_source(
            "launch \"notepad\"\nprompt \"Name?\" into $name\nconfirm \"Sure?\"\nwrite \"out.txt\" \"hi \" + $name",
        )
        .unwrap();
        let host = Rc::new(RecordingHost::new());
        host.respond("prompt", Value::from("Zed"));
        host.respond("confirm", Value::Bool(true));
        let mut interp = Interpreter::new(BuiltinRegistry::standard(), host.clone());
        interp.run_main(&program).await.unwrap();

        assert_eq!(interp.global("name"), Some(Value::from("Zed")));
        assert_eq!(interp.global("result"), Some(Value::Bool(true)));
        assert_eq!(
            host.commands(),
            vec![
                HostCommand::Launch { target: "notepad".into() },
                HostCommand::Prompt { message: "Name?".into(), default: None },
                HostCommand::Confirm { message: "Sure?".into() },
                HostCommand::Write { path: "out.txt".into(), content: "hi Zed".into() },
            ]
        );
    }

    #[tokio::test]
    async fn test_host_failure_is_catchable() {
        let program = parse_source("try { read \"x\" } catch $e { print $e.kind }").unwrap();
        let host = Rc::new(RecordingHost::new());
        host.fail_on("read", "no such file");
        let mut interp = Interpreter::new(BuiltinRegistry::standard(), host);
        interp.run_main(&program).await.unwrap();
        assert_eq!(interp.output(), ["HostOperationFailed"]);
    }

    #[tokio::test]
    async fn test_wait_requires_number() {
        assert_eq!(error_kind("wait \"later\"").await, ErrorKind::TypeMismatch);
        assert_eq!(error_kind("wait \"inf\"").await, ErrorKind::TypeMismatch);
        assert_eq!(
            error_kind("set $big = 10\nloop 9 { set $big = $big * $big }\nwait $big").await,
            ErrorKind::TypeMismatch
        );
    }

    #[tokio::test]
    async fn test_num_rejects_non_finite_text() {
        assert_eq!(error_kind("print num(\"inf\")").await, ErrorKind::TypeMismatch);
        assert_eq!(output("print num(\" 2.5 \")").await, vec!["2.5"]);
    }

    #[tokio::test]
    async fn test_emit_queues_locally() {
        let (mut interp, result) = run("on ping { print \"got \" + $event.n }\nemit ping {n: 1}\nprint main done").await;
        result.unwrap();
        assert_eq!(interp.output(), ["main done"]);
        let event = interp.next_pending().unwrap();
        assert_eq!(event.source, Some(interp.id()));
        assert!(interp.dispatch(&event).await.is_empty());
        assert_eq!(interp.output(), ["main done", "got 1"]);
        assert!(interp.next_pending().is_none());
    }

    #[tokio::test]
    async fn test_handlers_run_in_registration_order() {
        let (mut interp, result) = run("on go { print first }\non go { print second }\non other { print never }").await;
        result.unwrap();
        assert_eq!(interp.handler_count(), 3);
        interp.dispatch(&Event::new("go", serde_json::Value::Null)).await;
        assert_eq!(interp.output(), ["first", "second"]);
    }

    #[tokio::test]
    async fn test_handler_errors_do_not_stop_other_handlers() {
        let (mut interp, result) = run("on go { call nope }\non go { print still }").await;
        result.unwrap();
        let errors = interp.dispatch(&Event::new("go", serde_json::Value::Null)).await;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ErrorKind::UndefinedFunction);
        assert_eq!(interp.output(), ["still"]);
    }

    #[tokio::test]
    async fn test_event_binding_is_handler_local() {
        let (mut interp, result) = run("on go { set $seen = $event }").await;
        result.unwrap();
        interp.dispatch(&Event::new("go", serde_json::json!("x"))).await;
        assert_eq!(interp.global("event"), None);
        assert_eq!(interp.global("seen"), None);
    }

    #[tokio::test]
    async fn test_output_callback() {
        let lines = Rc::new(std::cell::RefCell::new(Vec::new()));
        let sink = lines.clone();
        let program = parse_source("print one\nprint two").unwrap();
        let mut interp = interpreter().with_output(Rc::new(move |line: &str| sink.borrow_mut().push(line.to_string())));
        interp.run_main(&program).await.unwrap();
        assert_eq!(*lines.borrow(), vec!["one".to_string(), "two".to_string()]);
    }
}
