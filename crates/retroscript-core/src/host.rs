//! The boundary between scripts and the world they drive.
//!
//! Every side-effecting statement (`launch`, `write`, `alert`, `wait`, ...)
//! is turned into a [`HostCommand`] carrying already-evaluated arguments and
//! handed to a [`Host`]. The interpreter itself never touches windows, files
//! or audio.
//!
//! Two hosts ship with the crate:
//!
//! - [`NullHost`]: the default. `wait` really sleeps, everything else is
//!   acknowledged and ignored.
//! - [`RecordingHost`]: records every command as a [`CommandLog`] and answers
//!   with scripted responses. Used by tests and the CLI's dry-run mode.
//!
//! # Example
//!
//! ```
//! use retroscript_core::host::{CommandLog, CommandResult, HostCommand};
//!
//! let command = HostCommand::Launch { target: "notepad".to_string() };
//! let log = CommandLog::new(command, CommandResult::Success);
//! println!("{} at {}", log.command.name(), log.timestamp);
//! ```

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::ast::HostVerb;
use crate::error::RuntimeError;
use crate::value::Value;

/// A side effect requested by a script.
///
/// Serialized with a `type` tag so command logs can be written as JSON lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HostCommand {
    /// Start an application or open a document.
    Launch { target: String },
    Close { target: String },
    Focus { target: String },
    Minimize { target: String },
    Maximize { target: String },

    /// Suspend the script. Never negative.
    Wait { seconds: f64 },

    Write { path: String, content: String },
    /// Answer: the file contents as a string.
    Read { path: String },
    Mkdir { path: String },
    Delete { path: String },

    Alert { message: String },
    /// Answer: a boolean.
    Confirm { message: String },
    /// Answer: the entered text, or `default` when nothing was entered.
    Prompt {
        message: String,
        default: Option<String>,
    },
    Notify {
        message: String,
        title: Option<String>,
    },

    Play { sound: String },
    /// Stops one sound, or all of them when `sound` is `None`.
    Stop { sound: Option<String> },
    Video { path: String },
}

impl HostCommand {
    /// Builds a command from a host statement's evaluated arguments.
    ///
    /// Argument counts were already checked by the parser; missing optional
    /// arguments become `None`.
    pub fn from_args(verb: HostVerb, args: &[Value]) -> Result<Self, RuntimeError> {
        let text = |i: usize| args.get(i).map(Value::as_string).unwrap_or_default();
        let optional = |i: usize| args.get(i).map(Value::as_string);

        let command = match verb {
            HostVerb::Launch => HostCommand::Launch { target: text(0) },
            HostVerb::Close => HostCommand::Close { target: text(0) },
            HostVerb::Focus => HostCommand::Focus { target: text(0) },
            HostVerb::Minimize => HostCommand::Minimize { target: text(0) },
            HostVerb::Maximize => HostCommand::Maximize { target: text(0) },
            HostVerb::Wait => {
                let arg = args.first().unwrap_or(&Value::Null);
                let seconds = arg.as_number().filter(|n| n.is_finite()).ok_or_else(|| {
                    RuntimeError::type_mismatch(format!(
                        "wait expects a finite number of seconds, got {}",
                        arg.as_string()
                    ))
                })?;
                let seconds = seconds.max(0.0);
                HostCommand::Wait { seconds }
            }
            HostVerb::Write => HostCommand::Write { path: text(0), content: text(1) },
            HostVerb::Read => HostCommand::Read { path: text(0) },
            HostVerb::Mkdir => HostCommand::Mkdir { path: text(0) },
            HostVerb::Delete => HostCommand::Delete { path: text(0) },
            HostVerb::Alert => HostCommand::Alert { message: text(0) },
            HostVerb::Confirm => HostCommand::Confirm { message: text(0) },
            HostVerb::Prompt => HostCommand::Prompt { message: text(0), default: optional(1) },
            HostVerb::Notify => HostCommand::Notify { message: text(0), title: optional(1) },
            HostVerb::Play => HostCommand::Play { sound: text(0) },
            HostVerb::Stop => HostCommand::Stop { sound: optional(0) },
            HostVerb::Video => HostCommand::Video { path: text(0) },
        };
        Ok(command)
    }

    /// Short static name, the statement keyword that produced the command.
    pub fn name(&self) -> &'static str {
        match self {
            HostCommand::Launch { .. } => "launch",
            HostCommand::Close { .. } => "close",
            HostCommand::Focus { .. } => "focus",
            HostCommand::Minimize { .. } => "minimize",
            HostCommand::Maximize { .. } => "maximize",
            HostCommand::Wait { .. } => "wait",
            HostCommand::Write { .. } => "write",
            HostCommand::Read { .. } => "read",
            HostCommand::Mkdir { .. } => "mkdir",
            HostCommand::Delete { .. } => "delete",
            HostCommand::Alert { .. } => "alert",
            HostCommand::Confirm { .. } => "confirm",
            HostCommand::Prompt { .. } => "prompt",
            HostCommand::Notify { .. } => "notify",
            HostCommand::Play { .. } => "play",
            HostCommand::Stop { .. } => "stop",
            HostCommand::Video { .. } => "video",
        }
    }

    /// The answer a host gives when it has nothing better to say.
    pub fn default_response(&self) -> Value {
        match self {
            HostCommand::Read { .. } => Value::String(String::new()),
            HostCommand::Confirm { .. } => Value::Bool(false),
            HostCommand::Prompt { default, .. } => {
                Value::String(default.clone().unwrap_or_default())
            }
            _ => Value::Null,
        }
    }
}

/// Errors a host reports back to the interpreter.
///
/// All of them surface in the script as `HostOperationFailed`.
#[derive(Error, Debug)]
pub enum HostError {
    #[error("Unsupported host command: {0}")]
    Unsupported(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Failed(String),
}

/// Executes host commands on behalf of a script.
///
/// Futures are not `Send`: hosts run on the same current-thread runtime as
/// the interpreter and may keep `Rc` / `RefCell` state.
#[async_trait(?Send)]
pub trait Host {
    async fn execute(&self, command: HostCommand) -> Result<Value, HostError>;
}

/// The outcome recorded for a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommandResult {
    Success,
    Failure(String),
}

/// A host command with an id and timestamp, as kept by [`RecordingHost`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandLog {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub command: HostCommand,
    pub result: CommandResult,
}

impl CommandLog {
    pub fn new(command: HostCommand, result: CommandResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            command,
            result,
        }
    }
}

/// Default host: sleeps for `wait`, acknowledges everything else.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHost;

#[async_trait(?Send)]
impl Host for NullHost {
    async fn execute(&self, command: HostCommand) -> Result<Value, HostError> {
        if let HostCommand::Wait { seconds } = command {
            let duration = Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX);
            tokio::time::sleep(duration).await;
            return Ok(Value::Null);
        }
        debug!(command = command.name(), "No host attached, ignoring command");
        Ok(command.default_response())
    }
}

/// Host that records commands instead of performing them.
///
/// Answers come from per-command queues filled with [`respond`](Self::respond),
/// falling back to [`HostCommand::default_response`]. `wait` returns at once.
#[derive(Debug, Default)]
pub struct RecordingHost {
    log: RefCell<Vec<CommandLog>>,
    responses: RefCell<HashMap<String, VecDeque<Value>>>,
    failures: RefCell<HashMap<String, String>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the answer for the next command named `command` (e.g. `"prompt"`).
    pub fn respond(&self, command: &str, value: Value) {
        self.responses
            .borrow_mut()
            .entry(command.to_string())
            .or_default()
            .push_back(value);
    }

    /// Makes every command named `command` fail with `message`.
    pub fn fail_on(&self, command: &str, message: &str) {
        self.failures
            .borrow_mut()
            .insert(command.to_string(), message.to_string());
    }

    pub fn commands(&self) -> Vec<HostCommand> {
        self.log.borrow().iter().map(|entry| entry.command.clone()).collect()
    }

    pub fn log(&self) -> Vec<CommandLog> {
        self.log.borrow().clone()
    }
}

#[async_trait(?Send)]
impl Host for RecordingHost {
    async fn execute(&self, command: HostCommand) -> Result<Value, HostError> {
        let name = command.name();
        let failure = self.failures.borrow().get(name).cloned();
        if let Some(message) = failure {
            self.log
                .borrow_mut()
                .push(CommandLog::new(command, CommandResult::Failure(message.clone())));
            return Err(HostError::Failed(message));
        }

        let queued = self
            .responses
            .borrow_mut()
            .get_mut(name)
            .and_then(VecDeque::pop_front);
        let answer = queued.unwrap_or_else(|| command.default_response());
        self.log
            .borrow_mut()
            .push(CommandLog::new(command, CommandResult::Success));
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_serialization_is_tagged() {
        let command = HostCommand::Write { path: "a.txt".into(), content: "hi".into() };
        let json = serde_json::to_value(&command).unwrap();
        assert_eq!(json, serde_json::json!({"type": "Write", "path": "a.txt", "content": "hi"}));
        let back: HostCommand = serde_json::from_value(json).unwrap();
        assert_eq!(back, command);
    }

    #[test]
    fn test_from_args_coerces_to_strings() {
        let command = HostCommand::from_args(
            HostVerb::Write,
            &[Value::from("n.txt"), Value::Number(42.0)],
        )
        .unwrap();
        assert_eq!(command, HostCommand::Write { path: "n.txt".into(), content: "42".into() });
    }

    #[test]
    fn test_wait_requires_number_and_clamps() {
        assert_eq!(
            HostCommand::from_args(HostVerb::Wait, &[Value::Number(-2.0)]).unwrap(),
            HostCommand::Wait { seconds: 0.0 }
        );
        assert_eq!(
            HostCommand::from_args(HostVerb::Wait, &[Value::from("1.5")]).unwrap(),
            HostCommand::Wait { seconds: 1.5 }
        );
        assert!(HostCommand::from_args(HostVerb::Wait, &[Value::from("soon")]).is_err());
    }

    #[test]
    fn test_optional_arguments() {
        assert_eq!(
            HostCommand::from_args(HostVerb::Stop, &[]).unwrap(),
            HostCommand::Stop { sound: None }
        );
        assert_eq!(
            HostCommand::from_args(HostVerb::Prompt, &[Value::from("Name?")]).unwrap(),
            HostCommand::Prompt { message: "Name?".into(), default: None }
        );
    }

    #[test]
    fn test_default_responses() {
        let prompt = HostCommand::Prompt { message: "q".into(), default: Some("d".into()) };
        assert_eq!(prompt.default_response(), Value::from("d"));
        assert_eq!(HostCommand::Confirm { message: "q".into() }.default_response(), Value::Bool(false));
        assert_eq!(HostCommand::Close { target: "x".into() }.default_response(), Value::Null);
    }

    #[tokio::test]
    async fn test_recording_host_queues_answers() {
        let host = RecordingHost::new();
        host.respond("confirm", Value::Bool(true));
        let first = host.execute(HostCommand::Confirm { message: "ok?".into() }).await.unwrap();
        let second = host.execute(HostCommand::Confirm { message: "ok?".into() }).await.unwrap();
        assert_eq!(first, Value::Bool(true));
        assert_eq!(second, Value::Bool(false));
        assert_eq!(host.commands().len(), 2);
    }

    #[tokio::test]
    async fn test_recording_host_failures_are_logged() {
        let host = RecordingHost::new();
        host.fail_on("read", "disk on fire");
        let err = host.execute(HostCommand::Read { path: "x".into() }).await.unwrap_err();
        assert_eq!(err.to_string(), "disk on fire");
        let log = host.log();
        assert_eq!(log[0].result, CommandResult::Failure("disk on fire".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_null_host_wait_sleeps() {
        let start = tokio::time::Instant::now();
        NullHost.execute(HostCommand::Wait { seconds: 3.0 }).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(3));
    }
}
