//! Recursive-descent parser for the policy language
//!
//! Precedence, lowest first: `or`, `and`, `not`, comparisons, `+ -`,
//! `* /`, unary `-`. Statements need no separator; every statement starts
//! with a keyword or a rule name, and an expression ends at the first token
//! that cannot continue it.

use crate::ast::{BinOp, Expr, Module, Statement};
use crate::error::{PolicyError, PolicyResult};
use crate::lexer::{tokenize, Token, TokenKind};
use serde_json::Value;

/// Name of the built-in rule collecting deny reasons
pub const DENY_REASONS: &str = "deny_reasons";

/// Root of fact references
pub const INPUT: &str = "input";

pub fn parse(input: &str) -> PolicyResult<Module> {
    let tokens = tokenize(input)?;
    let mut parser = Parser::new(tokens);
    parser.parse_module()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn parse_module(&mut self) -> PolicyResult<Module> {
        let mut statements = Vec::new();
        while !self.eof() {
            statements.push(self.parse_statement()?);
        }
        Ok(Module { statements })
    }

    fn parse_statement(&mut self) -> PolicyResult<Statement> {
        let line = self.line();
        match self.advance() {
            Some(TokenKind::Package) => {
                let name = self.expect_ident("package name")?;
                Ok(Statement::Package { name, line })
            }
            Some(TokenKind::Default) => {
                let name = self.expect_ident("rule name")?;
                self.expect(TokenKind::Assign)?;
                let value = self.parse_expr()?;
                Ok(Statement::Default { name, value, line })
            }
            Some(TokenKind::Deny) => {
                let reason = match self.advance() {
                    Some(TokenKind::Str(reason)) => reason,
                    other => return Err(self.unexpected(other, "deny reason string")),
                };
                self.expect(TokenKind::If)?;
                let condition = self.parse_expr()?;
                Ok(Statement::Deny {
                    reason,
                    condition,
                    line,
                })
            }
            Some(TokenKind::Ident(name)) => {
                self.expect(TokenKind::Assign)?;
                let value = self.parse_expr()?;
                let condition = if self.eat(&TokenKind::If) {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                Ok(Statement::Rule {
                    name,
                    value,
                    condition,
                    line,
                })
            }
            other => Err(self.unexpected(other, "statement")),
        }
    }

    fn parse_expr(&mut self) -> PolicyResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> PolicyResult<Expr> {
        let mut lhs = self.parse_and()?;
        while self.eat(&TokenKind::Or) {
            let rhs = self.parse_and()?;
            lhs = binary(BinOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> PolicyResult<Expr> {
        let mut lhs = self.parse_not()?;
        while self.eat(&TokenKind::And) {
            let rhs = self.parse_not()?;
            lhs = binary(BinOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> PolicyResult<Expr> {
        if self.eat(&TokenKind::Not) {
            let inner = self.parse_not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> PolicyResult<Expr> {
        let lhs = self.parse_additive()?;
        let op = match self.peek() {
            Some(TokenKind::Eq) => BinOp::Eq,
            Some(TokenKind::Ne) => BinOp::Ne,
            Some(TokenKind::Lt) => BinOp::Lt,
            Some(TokenKind::Le) => BinOp::Le,
            Some(TokenKind::Gt) => BinOp::Gt,
            Some(TokenKind::Ge) => BinOp::Ge,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.parse_additive()?;

        // Comparisons do not chain
        if matches!(
            self.peek(),
            Some(TokenKind::Eq | TokenKind::Ne | TokenKind::Lt | TokenKind::Le | TokenKind::Gt | TokenKind::Ge)
        ) {
            return Err(self.syntax_error("comparison operators cannot be chained"));
        }
        Ok(binary(op, lhs, rhs))
    }

    fn parse_additive(&mut self) -> PolicyResult<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Plus) => BinOp::Add,
                Some(TokenKind::Minus) => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.parse_multiplicative()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn parse_multiplicative(&mut self) -> PolicyResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Star) => BinOp::Mul,
                Some(TokenKind::Slash) => BinOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn parse_unary(&mut self) -> PolicyResult<Expr> {
        if self.eat(&TokenKind::Minus) {
            let inner = self.parse_unary()?;
            if let Expr::Literal(Value::Number(n)) = &inner {
                if let Some(folded) = negate_literal(n) {
                    return Ok(Expr::Literal(folded));
                }
            }
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> PolicyResult<Expr> {
        match self.advance() {
            Some(TokenKind::Int(i)) => Ok(Expr::Literal(Value::from(i))),
            Some(TokenKind::Float(f)) => Ok(Expr::Literal(Value::from(f))),
            Some(TokenKind::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(TokenKind::True) => Ok(Expr::Literal(Value::Bool(true))),
            Some(TokenKind::False) => Ok(Expr::Literal(Value::Bool(false))),
            Some(TokenKind::Null) => Ok(Expr::Literal(Value::Null)),
            Some(TokenKind::LParen) => {
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            Some(TokenKind::LBracket) => {
                let mut items = Vec::new();
                if !self.eat(&TokenKind::RBracket) {
                    loop {
                        items.push(self.parse_expr()?);
                        if self.eat(&TokenKind::Comma) {
                            // trailing comma
                            if self.eat(&TokenKind::RBracket) {
                                break;
                            }
                            continue;
                        }
                        self.expect(TokenKind::RBracket)?;
                        break;
                    }
                }
                Ok(Expr::Array(items))
            }
            Some(TokenKind::LBrace) => {
                let mut fields = Vec::new();
                if !self.eat(&TokenKind::RBrace) {
                    loop {
                        let key = match self.advance() {
                            Some(TokenKind::Str(key)) | Some(TokenKind::Ident(key)) => key,
                            other => return Err(self.unexpected(other, "object key")),
                        };
                        self.expect(TokenKind::Colon)?;
                        let value = self.parse_expr()?;
                        fields.push((key, value));
                        if self.eat(&TokenKind::Comma) {
                            if self.eat(&TokenKind::RBrace) {
                                break;
                            }
                            continue;
                        }
                        self.expect(TokenKind::RBrace)?;
                        break;
                    }
                }
                Ok(Expr::Object(fields))
            }
            Some(TokenKind::Ident(name)) if name == INPUT => {
                self.expect(TokenKind::Dot)?;
                let field = self.expect_ident("input field")?;
                Ok(Expr::Input(field))
            }
            Some(TokenKind::Ident(name)) if name == DENY_REASONS => Ok(Expr::DenyReasons),
            Some(TokenKind::Ident(name)) => Ok(Expr::Ref(name)),
            other => Err(self.unexpected(other, "expression")),
        }
    }

    // Token helpers

    fn eof(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn advance(&mut self) -> Option<TokenKind> {
        let token = self.tokens.get(self.pos).map(|t| t.kind.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> PolicyResult<()> {
        if self.eat(&kind) {
            return Ok(());
        }
        let found = self.advance();
        Err(self.unexpected(found, &kind.to_string()))
    }

    fn expect_ident(&mut self, what: &str) -> PolicyResult<String> {
        match self.advance() {
            Some(TokenKind::Ident(name)) => Ok(name),
            other => Err(self.unexpected(other, what)),
        }
    }

    /// Line of the current token, or of the last one at end of input
    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn syntax_error(&self, message: impl Into<String>) -> PolicyError {
        PolicyError::Syntax {
            line: self.line(),
            message: message.into(),
        }
    }

    fn unexpected(&self, found: Option<TokenKind>, expected: &str) -> PolicyError {
        // `found` was already consumed; report the line it came from
        let line = self
            .tokens
            .get(self.pos.saturating_sub(1))
            .map(|t| t.line)
            .unwrap_or(1);
        let message = match found {
            Some(kind) => format!("expected {}, found {}", expected, kind),
            None => format!("expected {}, found end of input", expected),
        };
        PolicyError::Syntax { line, message }
    }
}

fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

fn negate_literal(n: &serde_json::Number) -> Option<Value> {
    if let Some(i) = n.as_i64() {
        return i.checked_neg().map(Value::from);
    }
    n.as_f64()
        .and_then(|f| serde_json::Number::from_f64(-f))
        .map(Value::Number)
}
