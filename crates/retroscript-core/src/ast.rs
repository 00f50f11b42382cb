//! Syntax tree produced by the parser.
//!
//! Two disjoint families, [`Statement`] and [`Expression`], each a thin
//! wrapper pairing a kind enum with the source [`Position`] it came from.
//! The tree is immutable after parsing; function and handler bodies sit
//! behind `Rc` so closures can hold them without copying.

use std::fmt;
use std::rc::Rc;

/// A 1-based source location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A sequence of statements. The root of every parsed script is a block.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub statements: Vec<Statement>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StmtKind,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Block(Block),
    Set {
        target: AssignTarget,
        value: Expression,
    },
    Print(Expression),
    If {
        condition: Expression,
        then_block: Block,
        else_block: Option<Block>,
    },
    Loop {
        count: Expression,
        body: Block,
    },
    While {
        condition: Expression,
        body: Block,
    },
    ForEach {
        variable: String,
        collection: Expression,
        body: Block,
    },
    Break,
    Continue,
    Return(Option<Expression>),
    FunctionDef(Rc<FunctionDef>),
    Call(CallExpr),
    TryCatch {
        try_block: Block,
        error_var: String,
        catch_block: Block,
    },
    Throw(Expression),
    On {
        event: String,
        body: Rc<Block>,
    },
    Emit {
        event: String,
        payload: Option<Expression>,
    },
    Host(HostStatement),
}

/// `func name $a $b { … }`
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Rc<Block>,
}

/// Left-hand side of `set`: a variable optionally followed by member / index steps.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignTarget {
    pub name: String,
    pub path: Vec<Accessor>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Accessor {
    Member(String),
    Index(Expression),
}

/// A named call, used both as a statement and as an expression.
#[derive(Debug, Clone, PartialEq)]
pub struct CallExpr {
    pub name: String,
    pub args: Vec<Expression>,
}

/// Statements that only forward to the host.
#[derive(Debug, Clone, PartialEq)]
pub struct HostStatement {
    pub verb: HostVerb,
    pub args: Vec<Expression>,
    /// Variable receiving the host's answer (`read`, `confirm`, `prompt`).
    pub binding: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostVerb {
    Launch,
    Close,
    Focus,
    Minimize,
    Maximize,
    Wait,
    Write,
    Read,
    Mkdir,
    Delete,
    Alert,
    Confirm,
    Prompt,
    Notify,
    Play,
    Stop,
    Video,
}

impl HostVerb {
    pub fn name(&self) -> &'static str {
        match self {
            HostVerb::Launch => "launch",
            HostVerb::Close => "close",
            HostVerb::Focus => "focus",
            HostVerb::Minimize => "minimize",
            HostVerb::Maximize => "maximize",
            HostVerb::Wait => "wait",
            HostVerb::Write => "write",
            HostVerb::Read => "read",
            HostVerb::Mkdir => "mkdir",
            HostVerb::Delete => "delete",
            HostVerb::Alert => "alert",
            HostVerb::Confirm => "confirm",
            HostVerb::Prompt => "prompt",
            HostVerb::Notify => "notify",
            HostVerb::Play => "play",
            HostVerb::Stop => "stop",
            HostVerb::Video => "video",
        }
    }

    /// Accepted argument counts as `(min, max)`.
    pub fn arity(&self) -> (usize, usize) {
        match self {
            HostVerb::Write => (2, 2),
            HostVerb::Prompt | HostVerb::Notify => (1, 2),
            HostVerb::Stop => (0, 1),
            _ => (1, 1),
        }
    }

    /// Whether the host's answer is bound into a variable.
    pub fn binds_result(&self) -> bool {
        matches!(self, HostVerb::Read | HostVerb::Confirm | HostVerb::Prompt)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub kind: ExprKind,
    pub pos: Position,
}

impl Expression {
    pub fn new(kind: ExprKind, pos: Position) -> Self {
        Self { kind, pos }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    Variable(String),
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },
    Call(CallExpr),
    Array(Vec<Expression>),
    /// Key / value pairs in source order.
    Object(Vec<(String, Expression)>),
    Member {
        object: Box<Expression>,
        property: String,
    },
    Index {
        object: Box<Expression>,
        index: Box<Expression>,
    },
    Grouping(Box<Expression>),
    Interpolated(Vec<StringPart>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

/// A piece of an interpolated string: literal text or a variable reference.
#[derive(Debug, Clone, PartialEq)]
pub enum StringPart {
    Text(String),
    Variable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::LtEq => "<=",
            BinaryOp::GtEq => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
}
