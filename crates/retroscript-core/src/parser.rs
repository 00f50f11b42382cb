//! Recursive-descent parser producing the syntax tree.
//!
//! Statements are keyword-led and end at a newline, a `;`, a closing `}` or
//! right after a block. Binary expressions use precedence climbing, lowest
//! first: `or`, `and`, equality, comparison, `+ -`, `* / %`, unary, postfix.
//!
//! Postfix `.prop`, `[index]` and `name(args)` only bind when written flush
//! against the preceding token, so space-separated argument lists such as
//! `call add 2 3` or `write $path $text` stay unambiguous.

use std::rc::Rc;

use crate::ast::*;
use crate::error::{ParseError, ScriptError};
use crate::lexer::{tokenize, Keyword, TemplatePart, Token, TokenKind};
use crate::stack::ensure_sufficient_stack;

/// Catch variable used when `catch` names none.
pub const DEFAULT_ERROR_VAR: &str = "error";
/// Variable receiving `read` / `confirm` / `prompt` answers without `into`.
pub const DEFAULT_RESULT_VAR: &str = "result";
/// Deepest allowed nesting of blocks, `else if` chains and sub-expressions.
pub const MAX_NESTING_DEPTH: usize = 256;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    /// Bare identifiers read as variables so far; `print` uses it to tell
    /// prose from expressions.
    bare_names: usize,
}

impl Parser {
    fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.last().map_or(true, |t| t.kind != TokenKind::Eof) {
            let (line, column) = tokens.last().map_or((1, 1), |t| (t.line, t.end_column()));
            tokens.push(Token { kind: TokenKind::Eof, lexeme: String::new(), line, column });
        }
        Self { tokens, pos: 0, depth: 0, bare_names: 0 }
    }

    fn peek(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[self.pos.min(last)]
    }

    fn peek_next(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.pos + 1).min(last)]
    }

    fn kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.kind() == kind
    }

    fn check_kw(&self, kw: Keyword) -> bool {
        self.peek().is_keyword(kw)
    }

    fn error_here(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.peek().pos())
    }

    fn unexpected(&self, context: &str) -> ParseError {
        let token = self.peek();
        match token.kind {
            TokenKind::Eof => self.error_here(format!("Unexpected end of input {}", context)),
            TokenKind::Newline => self.error_here(format!("Unexpected end of line {}", context)),
            _ => self.error_here(format!("Unexpected token '{}' {}", token.lexeme, context)),
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&format!("(expected {})", what)))
        }
    }

    fn expect_kw(&mut self, kw: Keyword, what: &str) -> Result<Token, ParseError> {
        if self.check_kw(kw) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&format!("(expected '{}')", what)))
        }
    }

    /// Runs one nested production, failing once nesting exceeds [`MAX_NESTING_DEPTH`].
    fn nested<T>(
        &mut self,
        what: &str,
        f: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(self.error_here(format!("{} nested too deeply", what)));
        }
        self.depth += 1;
        let result = ensure_sufficient_stack(|| f(self));
        self.depth -= 1;
        result
    }

    fn skip_newlines(&mut self) {
        while self.check(&TokenKind::Newline) {
            self.advance();
        }
    }

    fn at_statement_end(&self) -> bool {
        matches!(self.kind(), TokenKind::Newline | TokenKind::RBrace | TokenKind::Eof)
    }

    /// True when the current token starts exactly where the previous one ended.
    fn adjacent(&self) -> bool {
        if self.pos == 0 {
            return false;
        }
        let prev = &self.tokens[self.pos - 1];
        let cur = self.peek();
        prev.line == cur.line && prev.end_column() == cur.column
    }

    /// A `-` with whitespace before it and its operand flush after it: `f 2 -3`.
    fn is_prefix_minus(&self) -> bool {
        if !self.check(&TokenKind::Minus) || self.adjacent() {
            return false;
        }
        let minus = self.peek();
        let next = self.peek_next();
        next.line == minus.line && next.column == minus.end_column()
    }

    fn parse_program(&mut self) -> Result<Block, ParseError> {
        let pos = self.peek().pos();
        let mut statements = Vec::new();
        self.skip_newlines();
        while !self.check(&TokenKind::Eof) {
            statements.push(self.parse_statement()?);
            self.end_statement()?;
        }
        Ok(Block { statements, pos })
    }

    /// Accepts a separator, a closing brace, end of input, or anything right after a block.
    fn end_statement(&mut self) -> Result<(), ParseError> {
        let after_block = self.pos > 0 && self.tokens[self.pos - 1].kind == TokenKind::RBrace;
        match self.kind() {
            TokenKind::Newline => {
                self.skip_newlines();
                Ok(())
            }
            TokenKind::RBrace | TokenKind::Eof => Ok(()),
            _ if after_block => Ok(()),
            _ => Err(self.unexpected("(expected end of statement)")),
        }
    }

    fn parse_block(&mut self) -> Result<Block, ParseError> {
        self.nested("Block", Self::parse_block_inner)
    }

    fn parse_block_inner(&mut self) -> Result<Block, ParseError> {
        self.skip_newlines();
        let open = self.expect(&TokenKind::LBrace, "'{'")?;
        let mut statements = Vec::new();
        self.skip_newlines();
        while !self.check(&TokenKind::RBrace) {
            if self.check(&TokenKind::Eof) {
                return Err(ParseError::new("Unclosed block, expected '}'", open.pos()));
            }
            statements.push(self.parse_statement()?);
            self.end_statement()?;
        }
        self.advance();
        Ok(Block { statements, pos: open.pos() })
    }

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        let pos = self.peek().pos();
        let kind = match self.kind().clone() {
            TokenKind::Keyword(kw) => match kw {
                Keyword::Set => {
                    self.advance();
                    self.parse_set()?
                }
                Keyword::Print => {
                    self.advance();
                    StmtKind::Print(self.parse_print(pos)?)
                }
                Keyword::If => self.parse_if()?,
                Keyword::Loop => {
                    self.advance();
                    let count = self.parse_expression()?;
                    let body = self.parse_block()?;
                    StmtKind::Loop { count, body }
                }
                Keyword::While => {
                    self.advance();
                    let condition = self.parse_expression()?;
                    let body = self.parse_block()?;
                    StmtKind::While { condition, body }
                }
                Keyword::Foreach => self.parse_foreach()?,
                Keyword::Break => {
                    self.advance();
                    StmtKind::Break
                }
                Keyword::Continue => {
                    self.advance();
                    StmtKind::Continue
                }
                Keyword::Return => {
                    self.advance();
                    if self.at_statement_end() {
                        StmtKind::Return(None)
                    } else {
                        StmtKind::Return(Some(self.parse_expression()?))
                    }
                }
                Keyword::Func => self.parse_function()?,
                Keyword::Call => {
                    self.advance();
                    StmtKind::Call(self.parse_call_tail()?)
                }
                Keyword::Try => self.parse_try()?,
                Keyword::Throw => {
                    self.advance();
                    StmtKind::Throw(self.parse_expression()?)
                }
                Keyword::On => {
                    self.advance();
                    let event = self.parse_event_name()?;
                    let body = self.parse_block()?;
                    StmtKind::On { event, body: Rc::new(body) }
                }
                Keyword::Emit => {
                    self.advance();
                    let event = self.parse_event_name()?;
                    let payload = if self.at_statement_end() {
                        None
                    } else {
                        Some(self.parse_expression()?)
                    };
                    StmtKind::Emit { event, payload }
                }
                other => match host_verb(other) {
                    Some(verb) => {
                        self.advance();
                        StmtKind::Host(self.parse_host(verb, pos)?)
                    }
                    None => return Err(self.unexpected("at start of statement")),
                },
            },
            TokenKind::Variable(_) => self.parse_set()?,
            TokenKind::Ident(name) if self.peek_next().kind == TokenKind::LParen => {
                self.advance();
                if !self.adjacent() {
                    return Err(self.unexpected("(expected '(' directly after function name)"));
                }
                let args = self.parse_paren_args()?;
                StmtKind::Call(CallExpr { name, args })
            }
            TokenKind::LBrace => StmtKind::Block(self.parse_block()?),
            _ => return Err(self.unexpected("at start of statement")),
        };
        Ok(Statement { kind, pos })
    }

    fn parse_set(&mut self) -> Result<StmtKind, ParseError> {
        let name = match self.kind() {
            TokenKind::Variable(name) | TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                name
            }
            _ => return Err(self.unexpected("(expected variable after 'set')")),
        };
        let mut path = Vec::new();
        loop {
            if self.check(&TokenKind::Dot) {
                self.advance();
                path.push(Accessor::Member(self.parse_property_name()?));
            } else if self.check(&TokenKind::LBracket) {
                self.advance();
                let index = self.parse_expression()?;
                self.expect(&TokenKind::RBracket, "']'")?;
                path.push(Accessor::Index(index));
            } else {
                break;
            }
        }
        self.expect(&TokenKind::Equals, "'='")?;
        let value = self.parse_expression()?;
        Ok(StmtKind::Set { target: AssignTarget { name, path }, value })
    }

    fn parse_property_name(&mut self) -> Result<String, ParseError> {
        match self.kind() {
            TokenKind::Ident(_) | TokenKind::Keyword(_) => Ok(self.advance().lexeme),
            _ => Err(self.unexpected("(expected property name)")),
        }
    }

    fn parse_print(&mut self, pos: Position) -> Result<Expression, ParseError> {
        if self.at_statement_end() {
            return Ok(Expression::new(ExprKind::Literal(Literal::String(String::new())), pos));
        }
        let quoted = matches!(
            self.kind(),
            TokenKind::String(_)
                | TokenKind::Template(_)
                | TokenKind::Number(_)
                | TokenKind::Keyword(Keyword::True)
                | TokenKind::Keyword(Keyword::False)
                | TokenKind::Keyword(Keyword::Null)
                | TokenKind::LParen
                | TokenKind::LBracket
                | TokenKind::LBrace
        );
        if quoted {
            return self.parse_expression();
        }

        let speculative = match self.kind() {
            TokenKind::Variable(_) | TokenKind::Keyword(Keyword::Call) => true,
            TokenKind::Ident(_) => self.peek_next().kind == TokenKind::LParen,
            _ => false,
        };
        if speculative {
            // Prose such as `$name and Bob` parses as an expression over the
            // bare name `Bob`; only expressions without bare names are kept.
            let save = self.pos;
            let bare_names = self.bare_names;
            if let Ok(expr) = self.parse_expression() {
                if self.at_statement_end() && self.bare_names == bare_names {
                    return Ok(expr);
                }
            }
            self.pos = save;
        }

        Ok(self.parse_print_text(pos))
    }

    /// Unquoted text mode: everything up to the end of the statement becomes an
    /// interpolated string. Tokens are re-joined with single spaces; a text run
    /// gains a trailing space before a variable and a leading space after one.
    fn parse_print_text(&mut self, pos: Position) -> Expression {
        let mut parts = Vec::new();
        let mut segment = String::new();
        let mut after_variable = false;

        fn push_text(segment: &mut String, after_variable: &mut bool, text: &str) {
            if segment.is_empty() {
                if *after_variable {
                    segment.push(' ');
                }
            } else {
                segment.push(' ');
            }
            segment.push_str(text);
            *after_variable = false;
        }

        fn push_variable(
            parts: &mut Vec<StringPart>,
            segment: &mut String,
            after_variable: &mut bool,
            name: String,
        ) {
            if !segment.is_empty() {
                segment.push(' ');
                parts.push(StringPart::Text(std::mem::take(segment)));
            }
            parts.push(StringPart::Variable(name));
            *after_variable = true;
        }

        while !self.at_statement_end() {
            let token = self.advance();
            match token.kind {
                TokenKind::Variable(name) => {
                    push_variable(&mut parts, &mut segment, &mut after_variable, name);
                }
                TokenKind::String(s) => push_text(&mut segment, &mut after_variable, &s),
                TokenKind::Template(pieces) => {
                    for piece in pieces {
                        match piece {
                            TemplatePart::Text(t) => push_text(&mut segment, &mut after_variable, &t),
                            TemplatePart::Variable(name) => {
                                push_variable(&mut parts, &mut segment, &mut after_variable, name)
                            }
                        }
                    }
                }
                _ => push_text(&mut segment, &mut after_variable, &token.lexeme),
            }
        }
        if !segment.is_empty() {
            parts.push(StringPart::Text(segment));
        }
        Expression::new(ExprKind::Interpolated(parts), pos)
    }

    fn parse_if(&mut self) -> Result<StmtKind, ParseError> {
        self.expect_kw(Keyword::If, "if")?;
        let condition = self.parse_expression()?;
        if self.check_kw(Keyword::Then) {
            self.advance();
        }
        let then_block = self.parse_block()?;

        let save = self.pos;
        self.skip_newlines();
        let else_block = if self.check_kw(Keyword::Else) {
            let else_pos = self.advance().pos();
            if self.check_kw(Keyword::If) {
                let nested_pos = self.peek().pos();
                let nested = self.nested("Block", Self::parse_if)?;
                Some(Block {
                    statements: vec![Statement { kind: nested, pos: nested_pos }],
                    pos: else_pos,
                })
            } else {
                Some(self.parse_block()?)
            }
        } else {
            self.pos = save;
            None
        };

        Ok(StmtKind::If { condition, then_block, else_block })
    }

    fn parse_foreach(&mut self) -> Result<StmtKind, ParseError> {
        self.expect_kw(Keyword::Foreach, "foreach")?;
        let variable = match self.kind() {
            TokenKind::Variable(name) | TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                name
            }
            _ => return Err(self.unexpected("(expected variable after 'foreach')")),
        };
        self.expect_kw(Keyword::In, "in")?;
        let collection = self.parse_expression()?;
        let body = self.parse_block()?;
        Ok(StmtKind::ForEach { variable, collection, body })
    }

    fn parse_function(&mut self) -> Result<StmtKind, ParseError> {
        self.expect_kw(Keyword::Func, "func")?;
        let name = match self.kind() {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                name
            }
            _ => return Err(self.unexpected("(expected function name)")),
        };

        let mut params = Vec::new();
        if self.check(&TokenKind::LParen) {
            self.advance();
            while !self.check(&TokenKind::RParen) {
                params.push(self.parse_param()?);
                if self.check(&TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
            self.expect(&TokenKind::RParen, "')'")?;
        } else {
            while matches!(self.kind(), TokenKind::Variable(_) | TokenKind::Ident(_)) {
                params.push(self.parse_param()?);
                if self.check(&TokenKind::Comma) {
                    self.advance();
                }
            }
        }

        let body = self.parse_block()?;
        Ok(StmtKind::FunctionDef(Rc::new(FunctionDef { name, params, body: Rc::new(body) })))
    }

    fn parse_param(&mut self) -> Result<String, ParseError> {
        match self.kind() {
            TokenKind::Variable(name) | TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected("(expected parameter name)")),
        }
    }

    fn parse_try(&mut self) -> Result<StmtKind, ParseError> {
        self.expect_kw(Keyword::Try, "try")?;
        let try_block = self.parse_block()?;
        self.skip_newlines();
        self.expect_kw(Keyword::Catch, "catch")?;
        let error_var = match self.kind() {
            TokenKind::Variable(name) | TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                name
            }
            _ => DEFAULT_ERROR_VAR.to_string(),
        };
        let catch_block = self.parse_block()?;
        Ok(StmtKind::TryCatch { try_block, error_var, catch_block })
    }

    fn parse_event_name(&mut self) -> Result<String, ParseError> {
        match self.kind() {
            TokenKind::Ident(_) | TokenKind::Keyword(_) => Ok(self.advance().lexeme),
            TokenKind::String(s) => {
                let s = s.clone();
                self.advance();
                Ok(s)
            }
            _ => Err(self.unexpected("(expected event name)")),
        }
    }

    fn parse_host(&mut self, verb: HostVerb, pos: Position) -> Result<HostStatement, ParseError> {
        let mut args = Vec::new();
        while !self.at_statement_end() && !self.check_kw(Keyword::Into) {
            args.push(self.parse_expression()?);
            if self.check(&TokenKind::Comma) {
                self.advance();
            }
        }

        let mut binding = None;
        if self.check_kw(Keyword::Into) {
            if !verb.binds_result() {
                return Err(self.error_here(format!("'{}' does not produce a value", verb.name())));
            }
            self.advance();
            match self.kind() {
                TokenKind::Variable(name) | TokenKind::Ident(name) => {
                    binding = Some(name.clone());
                    self.advance();
                }
                _ => return Err(self.unexpected("(expected variable after 'into')")),
            }
        }
        if verb.binds_result() && binding.is_none() {
            binding = Some(DEFAULT_RESULT_VAR.to_string());
        }

        let (min, max) = verb.arity();
        if args.len() < min || args.len() > max {
            let expected = if min == max {
                format!("{}", min)
            } else {
                format!("{} to {}", min, max)
            };
            return Err(ParseError::new(
                format!("'{}' expects {} argument(s), got {}", verb.name(), expected, args.len()),
                pos,
            ));
        }

        Ok(HostStatement { verb, args, binding })
    }

    /// After `call`: the callee name and either `(a, b)` or space-separated arguments.
    fn parse_call_tail(&mut self) -> Result<CallExpr, ParseError> {
        let name = match self.kind() {
            TokenKind::Ident(name) | TokenKind::Variable(name) => {
                let name = name.clone();
                self.advance();
                name
            }
            _ => return Err(self.unexpected("(expected function name after 'call')")),
        };

        if self.check(&TokenKind::LParen) && self.adjacent() {
            let args = self.parse_paren_args()?;
            return Ok(CallExpr { name, args });
        }

        let mut args = Vec::new();
        while self.starts_argument() {
            args.push(self.parse_unary()?);
            if self.check(&TokenKind::Comma) {
                self.advance();
            }
        }
        Ok(CallExpr { name, args })
    }

    fn starts_argument(&self) -> bool {
        match self.kind() {
            TokenKind::Number(_)
            | TokenKind::String(_)
            | TokenKind::Template(_)
            | TokenKind::Variable(_)
            | TokenKind::Ident(_)
            | TokenKind::LParen
            | TokenKind::LBracket
            | TokenKind::Bang => true,
            TokenKind::Keyword(kw) => matches!(
                kw,
                Keyword::True | Keyword::False | Keyword::Null | Keyword::Not | Keyword::Call
            ),
            TokenKind::Minus => self.is_prefix_minus(),
            _ => false,
        }
    }

    fn parse_paren_args(&mut self) -> Result<Vec<Expression>, ParseError> {
        self.expect(&TokenKind::LParen, "'('")?;
        let mut args = Vec::new();
        self.skip_newlines();
        while !self.check(&TokenKind::RParen) {
            args.push(self.parse_expression()?);
            self.skip_newlines();
            if self.check(&TokenKind::Comma) {
                self.advance();
                self.skip_newlines();
            } else {
                break;
            }
        }
        self.expect(&TokenKind::RParen, "')'")?;
        Ok(args)
    }

    fn parse_expression(&mut self) -> Result<Expression, ParseError> {
        self.nested("Expression", Self::parse_or)
    }

    fn binary(op: BinaryOp, left: Expression, right: Expression) -> Expression {
        let pos = left.pos;
        Expression::new(
            ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) },
            pos,
        )
    }

    fn parse_or(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_and()?;
        while matches!(self.kind(), TokenKind::OrOr | TokenKind::Keyword(Keyword::Or)) {
            self.advance();
            let right = self.parse_and()?;
            left = Self::binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_equality()?;
        while matches!(self.kind(), TokenKind::AndAnd | TokenKind::Keyword(Keyword::And)) {
            self.advance();
            let right = self.parse_equality()?;
            left = Self::binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_comparison()?;
        loop {
            let op = match self.kind() {
                TokenKind::DoubleEquals => BinaryOp::Eq,
                TokenKind::NotEquals => BinaryOp::NotEq,
                _ => break,
            };
            self.advance();
            let right = self.parse_comparison()?;
            left = Self::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.kind() {
                TokenKind::Less => BinaryOp::Lt,
                TokenKind::Greater => BinaryOp::Gt,
                TokenKind::LessEquals => BinaryOp::LtEq,
                TokenKind::GreaterEquals => BinaryOp::GtEq,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            left = Self::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_factor()?;
            left = Self::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.kind() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Self::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression, ParseError> {
        let pos = self.peek().pos();
        let op = match self.kind() {
            TokenKind::Bang | TokenKind::Keyword(Keyword::Not) => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Negate,
            _ => return self.parse_postfix(),
        };
        self.advance();
        let operand = self.nested("Expression", Self::parse_unary)?;
        Ok(Expression::new(ExprKind::Unary { op, operand: Box::new(operand) }, pos))
    }

    fn parse_postfix(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.check(&TokenKind::Dot) && self.adjacent() {
                self.advance();
                let property = self.parse_property_name()?;
                let pos = expr.pos;
                expr = Expression::new(ExprKind::Member { object: Box::new(expr), property }, pos);
            } else if self.check(&TokenKind::LBracket) && self.adjacent() {
                self.advance();
                self.skip_newlines();
                let index = self.parse_expression()?;
                self.skip_newlines();
                self.expect(&TokenKind::RBracket, "']'")?;
                let pos = expr.pos;
                expr = Expression::new(
                    ExprKind::Index { object: Box::new(expr), index: Box::new(index) },
                    pos,
                );
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expression, ParseError> {
        let pos = self.peek().pos();
        let kind = match self.kind().clone() {
            TokenKind::Number(n) => {
                self.advance();
                ExprKind::Literal(Literal::Number(n))
            }
            TokenKind::String(s) => {
                self.advance();
                ExprKind::Literal(Literal::String(s))
            }
            TokenKind::Template(pieces) => {
                self.advance();
                ExprKind::Interpolated(
                    pieces
                        .into_iter()
                        .map(|piece| match piece {
                            TemplatePart::Text(t) => StringPart::Text(t),
                            TemplatePart::Variable(v) => StringPart::Variable(v),
                        })
                        .collect(),
                )
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                ExprKind::Literal(Literal::Bool(true))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                ExprKind::Literal(Literal::Bool(false))
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.advance();
                ExprKind::Literal(Literal::Null)
            }
            TokenKind::Keyword(Keyword::Call) => {
                self.advance();
                ExprKind::Call(self.parse_call_tail()?)
            }
            TokenKind::Variable(name) => {
                self.advance();
                ExprKind::Variable(name)
            }
            TokenKind::Ident(name) => {
                self.advance();
                if self.check(&TokenKind::LParen) && self.adjacent() {
                    let args = self.parse_paren_args()?;
                    ExprKind::Call(CallExpr { name, args })
                } else {
                    self.bare_names += 1;
                    ExprKind::Variable(name)
                }
            }
            TokenKind::LParen => {
                self.advance();
                self.skip_newlines();
                let inner = self.parse_expression()?;
                self.skip_newlines();
                self.expect(&TokenKind::RParen, "')'")?;
                ExprKind::Grouping(Box::new(inner))
            }
            TokenKind::LBracket => {
                self.advance();
                ExprKind::Array(self.parse_array_items()?)
            }
            TokenKind::LBrace => {
                self.advance();
                ExprKind::Object(self.parse_object_fields()?)
            }
            _ => return Err(self.unexpected("in expression")),
        };
        Ok(Expression::new(kind, pos))
    }

    fn parse_array_items(&mut self) -> Result<Vec<Expression>, ParseError> {
        let mut items = Vec::new();
        self.skip_newlines();
        while !self.check(&TokenKind::RBracket) {
            items.push(self.parse_expression()?);
            self.skip_newlines();
            if self.check(&TokenKind::Comma) {
                self.advance();
                self.skip_newlines();
            } else {
                break;
            }
        }
        self.expect(&TokenKind::RBracket, "']'")?;
        Ok(items)
    }

    fn parse_object_fields(&mut self) -> Result<Vec<(String, Expression)>, ParseError> {
        let mut fields = Vec::new();
        self.skip_newlines();
        while !self.check(&TokenKind::RBrace) {
            let key = match self.kind().clone() {
                TokenKind::Ident(_) | TokenKind::Keyword(_) => self.advance().lexeme,
                TokenKind::String(s) => {
                    self.advance();
                    s
                }
                TokenKind::Number(_) => self.advance().lexeme,
                _ => return Err(self.unexpected("(expected object key)")),
            };
            self.expect(&TokenKind::Colon, "':'")?;
            self.skip_newlines();
            let value = self.parse_expression()?;
            fields.push((key, value));
            self.skip_newlines();
            if self.check(&TokenKind::Comma) {
                self.advance();
                self.skip_newlines();
            } else {
                break;
            }
        }
        self.expect(&TokenKind::RBrace, "'}'")?;
        Ok(fields)
    }
}

fn host_verb(kw: Keyword) -> Option<HostVerb> {
    let verb = match kw {
        Keyword::Launch => HostVerb::Launch,
        Keyword::Close => HostVerb::Close,
        Keyword::Focus => HostVerb::Focus,
        Keyword::Minimize => HostVerb::Minimize,
        Keyword::Maximize => HostVerb::Maximize,
        Keyword::Wait => HostVerb::Wait,
        Keyword::Write => HostVerb::Write,
        Keyword::Read => HostVerb::Read,
        Keyword::Mkdir => HostVerb::Mkdir,
        Keyword::Delete => HostVerb::Delete,
        Keyword::Alert => HostVerb::Alert,
        Keyword::Confirm => HostVerb::Confirm,
        Keyword::Prompt => HostVerb::Prompt,
        Keyword::Notify => HostVerb::Notify,
        Keyword::Play => HostVerb::Play,
        Keyword::Stop => HostVerb::Stop,
        Keyword::Video => HostVerb::Video,
        _ => return None,
    };
    Some(verb)
}

/// Parses a token stream into the script's root block.
pub fn parse(tokens: Vec<Token>) -> Result<Block, ParseError> {
    Parser::new(tokens).parse_program()
}

/// Tokenizes and parses in one step.
pub fn parse_source(source: &str) -> Result<Block, ScriptError> {
    let tokens = tokenize(source)?;
    Ok(parse(tokens)?)
}
