//! Error types for every stage of the script pipeline.
//!
//! Lexing and parsing are fail-closed: the first [`LexError`] or
//! [`ParseError`] aborts the unit before anything runs. Runtime failures are
//! [`RuntimeError`]s, classified by [`ErrorKind`], which scripts may catch
//! with `try { … } catch $e { … }`. [`ScriptError`] unifies all of them for
//! callers that only care that a script failed and where.

use std::fmt;

use indexmap::IndexMap;
use thiserror::Error;

use crate::ast::Position;
use crate::value::Value;

/// A character sequence the lexer could not turn into a token.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Lex error at line {line}, column {column}: {message}")]
pub struct LexError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl LexError {
    pub(crate) fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self { message: message.into(), line, column }
    }
}

/// A syntax error. Parsing stops at the first one.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Parse error at line {line}, column {column}: {message}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl ParseError {
    pub(crate) fn new(message: impl Into<String>, pos: Position) -> Self {
        Self { message: message.into(), line: pos.line, column: pos.column }
    }
}

/// Classification of runtime failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    TypeMismatch,
    UndefinedVariable,
    UndefinedFunction,
    DivisionByZero,
    IndexOutOfRange,
    BreakOutsideLoop,
    ContinueOutsideLoop,
    HostOperationFailed,
    /// Raised by the script itself with `throw`.
    Custom,
    /// Function calls nested deeper than the configured limit.
    RecursionLimit,
}

impl ErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::TypeMismatch => "TypeMismatch",
            ErrorKind::UndefinedVariable => "UndefinedVariable",
            ErrorKind::UndefinedFunction => "UndefinedFunction",
            ErrorKind::DivisionByZero => "DivisionByZero",
            ErrorKind::IndexOutOfRange => "IndexOutOfRange",
            ErrorKind::BreakOutsideLoop => "BreakOutsideLoop",
            ErrorKind::ContinueOutsideLoop => "ContinueOutsideLoop",
            ErrorKind::HostOperationFailed => "HostOperationFailed",
            ErrorKind::Custom => "Custom",
            ErrorKind::RecursionLimit => "RecursionLimit",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn location(position: &Option<Position>) -> String {
    match position {
        Some(pos) => format!(" at line {}, column {}", pos.line, pos.column),
        None => String::new(),
    }
}

/// A failure raised while executing a script.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind}{}: {message}", location(.position))]
pub struct RuntimeError {
    pub kind: ErrorKind,
    pub message: String,
    pub position: Option<Position>,
}

impl RuntimeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), position: None }
    }

    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeMismatch, message)
    }

    pub fn custom(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Custom, message)
    }

    /// Attaches a position unless one is already recorded.
    ///
    /// Errors raised deep inside a call keep the innermost location.
    pub fn at(mut self, pos: Position) -> Self {
        if self.position.is_none() {
            self.position = Some(pos);
        }
        self
    }

    pub fn line(&self) -> Option<usize> {
        self.position.map(|p| p.line)
    }

    /// The value bound to a `catch` variable: `{message, kind, line, column}`.
    pub fn to_value(&self) -> Value {
        let mut fields = IndexMap::new();
        fields.insert("message".to_string(), Value::String(self.message.clone()));
        fields.insert("kind".to_string(), Value::String(self.kind.name().to_string()));
        let (line, column) = match self.position {
            Some(pos) => (Value::Number(pos.line as f64), Value::Number(pos.column as f64)),
            None => (Value::Null, Value::Null),
        };
        fields.insert("line".to_string(), line);
        fields.insert("column".to_string(), column);
        Value::Object(fields)
    }
}

/// Any failure that stops a script from completing.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScriptError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// The owning context was cancelled before the script finished.
    #[error("Script cancelled")]
    Cancelled,
}

impl ScriptError {
    /// Source line the failure points at, when known.
    pub fn line(&self) -> Option<usize> {
        match self {
            ScriptError::Lex(e) => Some(e.line),
            ScriptError::Parse(e) => Some(e.line),
            ScriptError::Runtime(e) => e.line(),
            ScriptError::Cancelled => None,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            ScriptError::Lex(_) | ScriptError::Parse(_) => 2,
            ScriptError::Runtime(_) => 3,
            ScriptError::Cancelled => 130,
        }
    }

    /// The runtime error kind, if this is a runtime failure.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ScriptError::Runtime(e) => Some(e.kind),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_error_display_with_position() {
        let err = RuntimeError::new(ErrorKind::DivisionByZero, "Division by zero")
            .at(Position::new(3, 7));
        assert_eq!(err.to_string(), "DivisionByZero at line 3, column 7: Division by zero");
    }

    #[test]
    fn runtime_error_display_without_position() {
        let err = RuntimeError::custom("boom");
        assert_eq!(err.to_string(), "Custom: boom");
    }

    #[test]
    fn at_keeps_innermost_position() {
        let err = RuntimeError::custom("inner")
            .at(Position::new(5, 1))
            .at(Position::new(1, 1));
        assert_eq!(err.line(), Some(5));
    }

    #[test]
    fn to_value_exposes_fields() {
        let err = RuntimeError::new(ErrorKind::UndefinedFunction, "Undefined function: nope")
            .at(Position::new(2, 4));
        match err.to_value() {
            Value::Object(fields) => {
                assert_eq!(fields["kind"], Value::String("UndefinedFunction".into()));
                assert_eq!(fields["line"], Value::Number(2.0));
            }
            other => panic!("Expected Object, got {:?}", other),
        }
    }

    #[test]
    fn exit_codes() {
        assert_eq!(ScriptError::from(LexError::new("x", 1, 1)).exit_code(), 2);
        assert_eq!(ScriptError::from(RuntimeError::custom("x")).exit_code(), 3);
        assert_eq!(ScriptError::Cancelled.exit_code(), 130);
    }

    #[test]
    fn script_error_line() {
        let err = ScriptError::from(ParseError::new("bad", Position::new(9, 2)));
        assert_eq!(err.line(), Some(9));
        assert_eq!(err.to_string(), "Parse error at line 9, column 2: bad");
    }
}
