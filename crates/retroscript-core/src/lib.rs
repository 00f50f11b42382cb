//! # retroscript-core
//!
//! Core library for RetroScript, a small line-oriented scripting language for
//! automating a host application.
//!
//! Scripts are plain text: one statement per line, `$name` variables, blocks
//! in braces, functions, event handlers and a fixed set of host commands such
//! as `read`, `write`, `alert` and `wait`. The host decides what those
//! commands actually do by implementing [`host::Host`].
//!
//! ## Modules
//!
//! - [`lexer`] - Source text to tokens
//! - [`parser`] - Tokens to the syntax tree in [`ast`]
//! - [`interpreter`] - Tree-walking evaluator with scoped environments
//! - [`operators`] - Arithmetic, comparison and logical operators
//! - [`builtins`] - Registry of native functions (`len`, `upper`, `range`, ...)
//! - [`host`] - Host command types and the [`host::Host`] trait
//! - [`events`] - Events and the cross-script [`events::EventBus`]
//! - [`context`] - A running script with its event loop and cancellation
//! - [`runner`] - One-shot `run` entry point and its options
//! - [`config`] - Persistent settings in `~/.retroscript/config.json`
//!
//! ## Example
//!
//! ```
//! use retroscript_core::{run_blocking, RunOptions, Value};
//!
//! let options = RunOptions::new().with_variable("name", Value::from("world"));
//! let outcome = run_blocking("print \"Hello, $name!\"", options).unwrap();
//! assert_eq!(outcome.output, vec!["Hello, world!"]);
//! ```

pub mod ast;
pub mod builtins;
pub mod config;
pub mod context;
pub mod environment;
pub mod error;
pub mod events;
pub mod host;
pub mod interpreter;
pub mod lexer;
pub mod operators;
pub mod parser;
pub mod runner;
mod stack;
pub mod value;

pub use context::ScriptContext;
pub use error::{ErrorKind, RuntimeError, ScriptError};
pub use events::{Event, EventBus};
pub use host::{Host, HostCommand, HostError};
pub use runner::{run, run_blocking, RunOptions, RunOutcome};
pub use value::Value;
