//! One-shot script execution.
//!
//! [`run`] parses a script, runs its main body, handles the events it emitted
//! and reports a [`RunOutcome`]. Every call builds a fresh interpreter, so
//! nothing leaks between runs.
//!
//! # Example
//!
//! ```
//! use retroscript_core::runner::{run_blocking, RunOptions};
//!
//! let outcome = run_blocking("set $x = 2\nprint $x * 21", RunOptions::default()).unwrap();
//! assert!(outcome.success);
//! assert_eq!(outcome.output, vec!["42"]);
//! ```

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::builtins::BuiltinRegistry;
use crate::config::RetroConfig;
use crate::context::ScriptContext;
use crate::error::ScriptError;
use crate::events::EventBus;
use crate::host::{Host, NullHost};
use crate::interpreter::{OutputCallback, DEFAULT_MAX_CALL_DEPTH};
use crate::parser::parse_source;
use crate::value::Value;

/// Receives every error a script reports, including handler failures.
pub type ErrorCallback = Rc<dyn Fn(&ScriptError)>;

/// Everything a script run can be configured with.
pub struct RunOptions {
    /// Globals defined before the script starts.
    pub variables: IndexMap<String, Value>,
    pub builtins: BuiltinRegistry,
    pub host: Rc<dyn Host>,
    pub on_output: Option<OutputCallback>,
    pub on_error: Option<ErrorCallback>,
    /// Shared bus; `emit` goes here instead of the local queue when set.
    pub bus: Option<EventBus>,
    pub max_call_depth: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            variables: IndexMap::new(),
            builtins: BuiltinRegistry::standard(),
            host: Rc::new(NullHost),
            on_output: None,
            on_error: None,
            bus: None,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

impl fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOptions")
            .field("variables", &self.variables)
            .field("builtins", &self.builtins)
            .field("bus", &self.bus.is_some())
            .field("max_call_depth", &self.max_call_depth)
            .finish_non_exhaustive()
    }
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with the limits taken from `config`.
    pub fn from_config(config: &RetroConfig) -> Self {
        Self {
            max_call_depth: config.max_call_depth,
            ..Self::default()
        }
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    pub fn with_builtins(mut self, builtins: BuiltinRegistry) -> Self {
        self.builtins = builtins;
        self
    }

    pub fn with_host(mut self, host: Rc<dyn Host>) -> Self {
        self.host = host;
        self
    }

    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn on_output(mut self, callback: impl Fn(&str) + 'static) -> Self {
        self.on_output = Some(Rc::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl Fn(&ScriptError) + 'static) -> Self {
        self.on_error = Some(Rc::new(callback));
        self
    }
}

/// The result of [`run`].
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub success: bool,
    /// Top-level variables when the script stopped.
    pub variables: IndexMap<String, Value>,
    /// The first error that made the run fail.
    pub error: Option<ScriptError>,
    /// Lines written by `print`, in order.
    pub output: Vec<String>,
}

impl RunOutcome {
    /// A run that never started: only the caller's initial bindings exist.
    fn failed(error: ScriptError, variables: IndexMap<String, Value>) -> Self {
        Self {
            success: false,
            variables,
            error: Some(error),
            output: Vec::new(),
        }
    }

    /// Source line of the error, when there is one.
    pub fn line(&self) -> Option<usize> {
        self.error.as_ref().and_then(ScriptError::line)
    }

    /// `{success, output, variables, error}` with error as `{message, kind, line}` or null.
    pub fn to_json(&self) -> serde_json::Value {
        let variables: serde_json::Map<String, serde_json::Value> = self
            .variables
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect();
        let error = match &self.error {
            Some(err) => serde_json::json!({
                "message": err.to_string(),
                "kind": error_kind_name(err),
                "line": err.line(),
            }),
            None => serde_json::Value::Null,
        };
        serde_json::json!({
            "success": self.success,
            "output": self.output,
            "variables": variables,
            "error": error,
        })
    }
}

fn error_kind_name(err: &ScriptError) -> &'static str {
    match err {
        ScriptError::Lex(_) => "LexError",
        ScriptError::Parse(_) => "ParseError",
        ScriptError::Runtime(e) => e.kind.name(),
        ScriptError::Cancelled => "Cancelled",
    }
}

/// Parses and runs `source`, then handles the events it emitted.
///
/// Errors never escape as `Err`: they are reported in the outcome and passed
/// to the error callback. A failing event handler also fails the run.
pub async fn run(source: &str, options: RunOptions) -> RunOutcome {
    let program = match parse_source(source) {
        Ok(program) => program,
        Err(err) => {
            if let Some(callback) = &options.on_error {
                callback(&err);
            }
            return RunOutcome::failed(err, options.variables);
        }
    };
    let mut context = ScriptContext::from_program(program, options);

    let error = match context.start().await {
        Err(err) => Some(err),
        Ok(()) => context.handler_errors().first().cloned().map(ScriptError::Runtime),
    };
    RunOutcome {
        success: error.is_none(),
        variables: context.variables(),
        error,
        output: context.output().to_vec(),
    }
}

/// Drives [`run`] to completion on a private current-thread runtime.
///
/// Fails only if the runtime cannot be created. Must not be called from
/// inside another Tokio runtime.
pub fn run_blocking(source: &str, options: RunOptions) -> std::io::Result<RunOutcome> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    Ok(runtime.block_on(run(source, options)))
}
