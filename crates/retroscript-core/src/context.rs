//! A running script and its event loop.
//!
//! A [`ScriptContext`] owns one interpreter and the parsed program. It runs
//! the main body once with [`start`](ScriptContext::start), then handles
//! events one at a time: events fired by the host with
//! [`dispatch`](ScriptContext::dispatch), events the script emitted itself,
//! and events arriving on a shared [`EventBus`] while
//! [`serve`](ScriptContext::serve) is running. A context is never re-entered:
//! an event that arrives while a handler runs waits its turn.
//!
//! Cancelling the context's token abandons whatever the script is awaiting
//! (typically a `wait`) and stops all further dispatch.

use std::rc::Rc;

use indexmap::IndexMap;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio_util::sync::CancellationToken;
use tracing::{info_span, warn, Instrument};
use uuid::Uuid;

use crate::ast::Block;
use crate::error::{RuntimeError, ScriptError};
use crate::events::Event;
use crate::interpreter::Interpreter;
use crate::parser::parse_source;
use crate::runner::{ErrorCallback, RunOptions};
use crate::value::Value;

pub struct ScriptContext {
    id: Uuid,
    interpreter: Interpreter,
    program: Rc<Block>,
    receiver: Option<broadcast::Receiver<Event>>,
    cancel: CancellationToken,
    on_error: Option<ErrorCallback>,
    handler_errors: Vec<RuntimeError>,
}

impl ScriptContext {
    /// Parses `source` and prepares a context. Nothing runs until [`start`](Self::start).
    pub fn new(source: &str, options: RunOptions) -> Result<Self, ScriptError> {
        let program = parse_source(source)?;
        Ok(Self::from_program(program, options))
    }

    /// Prepares a context for an already parsed program.
    ///
    /// When a bus is configured the context subscribes immediately, so events
    /// published from now on are not missed.
    pub fn from_program(program: Block, options: RunOptions) -> Self {
        let id = Uuid::new_v4();
        let mut interpreter = Interpreter::new(options.builtins, options.host)
            .with_id(id)
            .with_max_call_depth(options.max_call_depth);
        if let Some(callback) = options.on_output {
            interpreter = interpreter.with_output(callback);
        }
        let receiver = options.bus.as_ref().map(|bus| bus.subscribe());
        if let Some(bus) = options.bus {
            interpreter = interpreter.with_bus(bus);
        }
        for (name, value) in options.variables {
            interpreter.define_global(name, value);
        }

        Self {
            id,
            interpreter,
            program: Rc::new(program),
            receiver,
            cancel: CancellationToken::new(),
            on_error: options.on_error,
            handler_errors: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Token that cancels this context. Clones may be moved to other tasks.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn variables(&self) -> IndexMap<String, Value> {
        self.interpreter.variables()
    }

    pub fn output(&self) -> &[String] {
        self.interpreter.output()
    }

    /// Failures raised by event handlers so far.
    pub fn handler_errors(&self) -> &[RuntimeError] {
        &self.handler_errors
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    /// Runs the main body, then every event that is already waiting.
    pub async fn start(&mut self) -> Result<(), ScriptError> {
        let span = info_span!("run_script", script = %self.id);
        async {
            if self.cancel.is_cancelled() {
                return Err(ScriptError::Cancelled);
            }
            let program = Rc::clone(&self.program);
            let cancel = self.cancel.clone();
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ScriptError::Cancelled),
                result = self.interpreter.run_main(&program) => result,
            };
            if let Err(err) = result {
                let err = ScriptError::Runtime(err);
                if let Some(callback) = &self.on_error {
                    callback(&err);
                }
                return Err(err);
            }
            self.settle().await
        }
        .instrument(span)
        .await
    }

    /// Delivers a host event to this script's handlers.
    pub async fn dispatch(&mut self, event: Event) -> Result<(), ScriptError> {
        let span = info_span!("dispatch_event", script = %self.id, event = %event.name);
        async {
            self.handle(event).await?;
            self.settle().await
        }
        .instrument(span)
        .await
    }

    /// Handles bus events until the bus closes or the context is cancelled.
    ///
    /// Returns immediately when no bus is attached.
    pub async fn serve(&mut self) -> Result<(), ScriptError> {
        let Some(mut receiver) = self.receiver.take() else {
            return Ok(());
        };
        let cancel = self.cancel.clone();
        let span = info_span!("serve_events", script = %self.id);
        async {
            loop {
                let received = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(ScriptError::Cancelled),
                    received = receiver.recv() => received,
                };
                match received {
                    Ok(event) => {
                        self.handle(event).await?;
                        self.settle().await?;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "event receiver lagged, events were dropped");
                    }
                    Err(RecvError::Closed) => return Ok(()),
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Dispatches queued local events and any bus events already received.
    async fn settle(&mut self) -> Result<(), ScriptError> {
        loop {
            if let Some(event) = self.interpreter.next_pending() {
                self.handle(event).await?;
                continue;
            }
            let next = match self.receiver.as_mut() {
                Some(receiver) => match receiver.try_recv() {
                    Ok(event) => Some(event),
                    Err(TryRecvError::Lagged(skipped)) => {
                        warn!(skipped, "event receiver lagged, events were dropped");
                        continue;
                    }
                    Err(TryRecvError::Empty | TryRecvError::Closed) => None,
                },
                None => None,
            };
            match next {
                Some(event) => self.handle(event).await?,
                None => return Ok(()),
            }
        }
    }

    async fn handle(&mut self, event: Event) -> Result<(), ScriptError> {
        let cancel = self.cancel.clone();
        let errors = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ScriptError::Cancelled),
            errors = self.interpreter.dispatch(&event) => errors,
        };
        for err in errors {
            if let Some(callback) = &self.on_error {
                callback(&ScriptError::Runtime(err.clone()));
            }
            self.handler_errors.push(err);
        }
        Ok(())
    }
}
