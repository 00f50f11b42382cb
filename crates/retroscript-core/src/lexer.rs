//! Tokenizer for RetroScript source text.
//!
//! [`tokenize`] turns source into an ordered token stream terminated by
//! [`TokenKind::Eof`]. Keywords match case-insensitively; `$name` variable
//! references and bare identifiers keep their case. Punctuation is always
//! emitted as its own token, even when written flush against a word.

use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use crate::ast::Position;
use crate::error::LexError;

/// A segment of a double-quoted string: literal text or a `$name` reference.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Text(String),
    Variable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Set,
    Print,
    If,
    Then,
    Else,
    Loop,
    While,
    Foreach,
    In,
    Break,
    Continue,
    Return,
    Func,
    Call,
    Try,
    Catch,
    Throw,
    On,
    Emit,
    Into,
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
    True,
    False,
    Null,
    And,
    Or,
    Not,
}

impl Keyword {
    fn lookup(word: &str) -> Option<Keyword> {
        let kw = match word.to_ascii_lowercase().as_str() {
            "set" => Keyword::Set,
            "print" => Keyword::Print,
            "if" => Keyword::If,
            "then" => Keyword::Then,
            "else" => Keyword::Else,
            "loop" => Keyword::Loop,
            "while" => Keyword::While,
            "foreach" => Keyword::Foreach,
            "in" => Keyword::In,
            "break" => Keyword::Break,
            "continue" => Keyword::Continue,
            "return" => Keyword::Return,
            "func" | "function" => Keyword::Func,
            "call" => Keyword::Call,
            "try" => Keyword::Try,
            "catch" => Keyword::Catch,
            "throw" => Keyword::Throw,
            "on" => Keyword::On,
            "emit" => Keyword::Emit,
            "into" => Keyword::Into,
            "launch" => Keyword::Launch,
            "close" => Keyword::Close,
            "focus" => Keyword::Focus,
            "minimize" => Keyword::Minimize,
            "maximize" => Keyword::Maximize,
            "wait" => Keyword::Wait,
            "write" => Keyword::Write,
            "read" => Keyword::Read,
            "mkdir" => Keyword::Mkdir,
            "delete" => Keyword::Delete,
            "alert" => Keyword::Alert,
            "confirm" => Keyword::Confirm,
            "prompt" => Keyword::Prompt,
            "notify" => Keyword::Notify,
            "play" => Keyword::Play,
            "stop" => Keyword::Stop,
            "video" => Keyword::Video,
            "true" => Keyword::True,
            "false" => Keyword::False,
            "null" => Keyword::Null,
            "and" => Keyword::And,
            "or" => Keyword::Or,
            "not" => Keyword::Not,
            _ => return None,
        };
        Some(kw)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    String(String),
    Template(Vec<TemplatePart>),
    Ident(String),
    Variable(String),
    Keyword(Keyword),
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Colon,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Equals,
    DoubleEquals,
    NotEquals,
    Less,
    Greater,
    LessEquals,
    GreaterEquals,
    AndAnd,
    OrOr,
    Newline,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Source text the token was read from.
    pub lexeme: String,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn pos(&self) -> Position {
        Position::new(self.line, self.column)
    }

    /// Column just past the last character of the token.
    pub fn end_column(&self) -> usize {
        self.column + self.lexeme.chars().count()
    }

    pub fn is_keyword(&self, kw: Keyword) -> bool {
        self.kind == TokenKind::Keyword(kw)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match &self.kind {
            TokenKind::Number(_) => "number",
            TokenKind::String(_) => "string",
            TokenKind::Template(_) => "template",
            TokenKind::Ident(_) => "identifier",
            TokenKind::Variable(_) => "variable",
            TokenKind::Keyword(_) => "keyword",
            TokenKind::Newline => return write!(f, "{}:{} newline", self.line, self.column),
            TokenKind::Eof => return write!(f, "{}:{} end of input", self.line, self.column),
            _ => "punct",
        };
        write!(f, "{}:{} {} {}", self.line, self.column, label, self.lexeme)
    }
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
            column: 1,
            tokens: Vec::new(),
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn push(&mut self, kind: TokenKind, lexeme: impl Into<String>, line: usize, column: usize) {
        self.tokens.push(Token { kind, lexeme: lexeme.into(), line, column });
    }

    fn run(mut self) -> Result<Vec<Token>, LexError> {
        while let Some(ch) = self.peek() {
            let (line, column) = (self.line, self.column);
            match ch {
                '#' => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                '\n' | ';' => {
                    self.bump();
                    // Collapse runs of separators into one
                    if self.tokens.last().map_or(false, |t| t.kind != TokenKind::Newline) {
                        self.push(TokenKind::Newline, ch.to_string(), line, column);
                    }
                }
                ' ' | '\t' | '\r' => {
                    self.bump();
                }
                '(' => self.single(TokenKind::LParen, ch),
                ')' => self.single(TokenKind::RParen, ch),
                '{' => self.single(TokenKind::LBrace, ch),
                '}' => self.single(TokenKind::RBrace, ch),
                '[' => self.single(TokenKind::LBracket, ch),
                ']' => self.single(TokenKind::RBracket, ch),
                ',' => self.single(TokenKind::Comma, ch),
                '.' => self.single(TokenKind::Dot, ch),
                ':' => self.single(TokenKind::Colon, ch),
                '+' => self.single(TokenKind::Plus, ch),
                '-' => self.single(TokenKind::Minus, ch),
                '*' => self.single(TokenKind::Star, ch),
                '/' => self.single(TokenKind::Slash, ch),
                '%' => self.single(TokenKind::Percent, ch),
                '=' => self.either('=', TokenKind::DoubleEquals, TokenKind::Equals),
                '!' => self.either('=', TokenKind::NotEquals, TokenKind::Bang),
                '<' => self.either('=', TokenKind::LessEquals, TokenKind::Less),
                '>' => self.either('=', TokenKind::GreaterEquals, TokenKind::Greater),
                '&' => self.pair('&', TokenKind::AndAnd)?,
                '|' => self.pair('|', TokenKind::OrOr)?,
                '"' | '\'' => self.string(ch)?,
                '$' => self.variable()?,
                c if c.is_ascii_digit() => self.number()?,
                c if c.is_ascii_alphabetic() || c == '_' => self.word(),
                _ => {
                    return Err(LexError::new(
                        format!("Unexpected character: '{}'", ch),
                        line,
                        column,
                    ));
                }
            }
        }
        let (line, column) = (self.line, self.column);
        self.push(TokenKind::Eof, "", line, column);
        Ok(self.tokens)
    }

    fn single(&mut self, kind: TokenKind, ch: char) {
        let (line, column) = (self.line, self.column);
        self.bump();
        self.push(kind, ch.to_string(), line, column);
    }

    /// Two-character operator when `next` follows, otherwise the one-character form.
    fn either(&mut self, next: char, double: TokenKind, single: TokenKind) {
        let (line, column) = (self.line, self.column);
        let Some(first) = self.bump() else { return };
        if self.peek() == Some(next) {
            self.bump();
            self.push(double, format!("{}{}", first, next), line, column);
        } else {
            self.push(single, first.to_string(), line, column);
        }
    }

    /// Operators that only exist doubled (`&&`, `||`).
    fn pair(&mut self, ch: char, kind: TokenKind) -> Result<(), LexError> {
        let (line, column) = (self.line, self.column);
        self.bump();
        if self.peek() == Some(ch) {
            self.bump();
            self.push(kind, format!("{}{}", ch, ch), line, column);
            Ok(())
        } else {
            Err(LexError::new(format!("Unexpected character: '{}'", ch), line, column))
        }
    }

    fn take_name(&mut self) -> String {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                name.push(c);
                self.bump();
            } else {
                break;
            }
        }
        name
    }

    fn variable(&mut self) -> Result<(), LexError> {
        let (line, column) = (self.line, self.column);
        self.bump();
        let name = self.take_name();
        if name.is_empty() {
            return Err(LexError::new("Expected variable name after '$'", line, column));
        }
        let lexeme = format!("${}", name);
        self.push(TokenKind::Variable(name), lexeme, line, column);
        Ok(())
    }

    fn word(&mut self) {
        let (line, column) = (self.line, self.column);
        let word = self.take_name();
        let kind = match Keyword::lookup(&word) {
            Some(kw) => TokenKind::Keyword(kw),
            None => TokenKind::Ident(word.clone()),
        };
        self.push(kind, word, line, column);
    }

    fn number(&mut self) -> Result<(), LexError> {
        let (line, column) = (self.line, self.column);
        let mut text = String::new();
        while let Some(d) = self.peek() {
            if d.is_ascii_digit() {
                text.push(d);
                self.bump();
            } else {
                break;
            }
        }
        // Only treat '.' as a decimal point when a digit follows
        if self.peek() == Some('.') {
            let mut ahead = self.chars.clone();
            ahead.next();
            if ahead.peek().map_or(false, |c| c.is_ascii_digit()) {
                text.push('.');
                self.bump();
                while let Some(d) = self.peek() {
                    if d.is_ascii_digit() {
                        text.push(d);
                        self.bump();
                    } else {
                        break;
                    }
                }
            }
        }
        let n: f64 = text
            .parse()
            .map_err(|_| LexError::new(format!("Invalid number: {}", text), line, column))?;
        self.push(TokenKind::Number(n), text, line, column);
        Ok(())
    }

    fn string(&mut self, quote: char) -> Result<(), LexError> {
        let (line, column) = (self.line, self.column);
        let interpolate = quote == '"';
        let mut lexeme = String::new();
        lexeme.push(quote);
        self.bump();

        let mut s = String::new();
        let mut parts: Vec<TemplatePart> = Vec::new();
        let mut has_interpolation = false;
        loop {
            match self.peek() {
                Some('\\') => {
                    lexeme.push('\\');
                    self.bump();
                    let escaped = self
                        .bump()
                        .ok_or_else(|| LexError::new("Unterminated string", line, column))?;
                    lexeme.push(escaped);
                    match escaped {
                        'n' => s.push('\n'),
                        't' => s.push('\t'),
                        'r' => s.push('\r'),
                        '0' => s.push('\0'),
                        '\\' => s.push('\\'),
                        '$' => s.push('$'),
                        '"' => s.push('"'),
                        '\'' => s.push('\''),
                        c => {
                            s.push('\\');
                            s.push(c);
                        }
                    }
                }
                Some('$') if interpolate => {
                    lexeme.push('$');
                    self.bump();
                    let starts_name = self.peek().map_or(false, |c| c.is_ascii_alphabetic() || c == '_');
                    if starts_name {
                        let name = self.take_name();
                        lexeme.push_str(&name);
                        has_interpolation = true;
                        if !s.is_empty() {
                            parts.push(TemplatePart::Text(std::mem::take(&mut s)));
                        }
                        parts.push(TemplatePart::Variable(name));
                    } else {
                        s.push('$');
                    }
                }
                Some(c) if c == quote => {
                    lexeme.push(c);
                    self.bump();
                    break;
                }
                Some(c) => {
                    lexeme.push(c);
                    s.push(c);
                    self.bump();
                }
                None => return Err(LexError::new("Unterminated string", line, column)),
            }
        }

        if has_interpolation {
            if !s.is_empty() {
                parts.push(TemplatePart::Text(s));
            }
            self.push(TokenKind::Template(parts), lexeme, line, column);
        } else {
            self.push(TokenKind::String(s), lexeme, line, column);
        }
        Ok(())
    }
}

/// Converts source text into tokens, ending with [`TokenKind::Eof`].
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(source).run()
}
