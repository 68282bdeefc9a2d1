// src/lang/parser.rs

//! Recursive-descent parser for cell source.
//!
//! Precedence, lowest first: conditional, `or`, `and`, `not`, comparison,
//! additive, multiplicative, unary minus, `**` (right associative), postfix
//! call / index.

use std::sync::Arc;

use crate::lang::SyntaxError;
use crate::lang::ast::{BinaryOp, Expr, FnDef, Program, Rhs, Stmt, StmtKind, UnaryOp};
use crate::lang::lexer::{Token, TokenKind, tokenize};

/// Maximum expression nesting: parentheses, brackets, prefix operators and
/// operator chains all count one level each.
const MAX_NESTING: usize = 200;

/// Parse a whole unit body.
pub fn parse(source: &str) -> Result<Program, SyntaxError> {
    let tokens = tokenize(source)?;
    Parser {
        tokens,
        pos: 0,
        depth: 0,
    }
    .program()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // The lexer always terminates the stream with `Eof`.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn peek_second(&self) -> &TokenKind {
        &self.tokens[(self.pos + 1).min(self.tokens.len() - 1)].kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek_kind() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, SyntaxError> {
        if *self.peek_kind() == kind {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&format!("expected {kind}")))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, SyntaxError> {
        match self.peek_kind().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected(&format!("expected {what}"))),
        }
    }

    /// Enter one nesting level; fails once the tree would get too deep.
    fn enter(&mut self) -> Result<(), SyntaxError> {
        if self.depth >= MAX_NESTING {
            let token = self.peek();
            return Err(SyntaxError::new(
                "expression nested too deeply",
                token.line,
                token.column,
            ));
        }
        self.depth += 1;
        Ok(())
    }

    fn leave(&mut self, levels: usize) {
        self.depth -= levels;
    }

    fn unexpected(&self, context: &str) -> SyntaxError {
        let token = self.peek();
        SyntaxError::new(
            format!("{context}, found {}", token.kind),
            token.line,
            token.column,
        )
    }

    fn program(mut self) -> Result<Program, SyntaxError> {
        let mut statements = Vec::new();

        loop {
            while self.eat(&TokenKind::Sep) {}
            if *self.peek_kind() == TokenKind::Eof {
                break;
            }

            statements.push(self.statement()?);

            match self.peek_kind() {
                TokenKind::Sep | TokenKind::Eof => {}
                _ => return Err(self.unexpected("expected end of statement")),
            }
        }

        Ok(Program { statements })
    }

    fn statement(&mut self) -> Result<Stmt, SyntaxError> {
        let line = self.peek().line;

        if self.eat(&TokenKind::Fn) {
            let name = self.expect_ident("function name after 'fn'")?;
            self.expect(TokenKind::LParen)?;
            let mut params: Vec<String> = Vec::new();
            if !self.eat(&TokenKind::RParen) {
                loop {
                    let param = self.expect_ident("parameter name")?;
                    if params.contains(&param) {
                        let token = self.peek();
                        return Err(SyntaxError::new(
                            format!("duplicate parameter '{param}'"),
                            token.line,
                            token.column,
                        ));
                    }
                    params.push(param);
                    if self.eat(&TokenKind::RParen) {
                        break;
                    }
                    self.expect(TokenKind::Comma)?;
                }
            }
            self.expect(TokenKind::Assign)?;
            let body = self.expr()?;
            return Ok(Stmt {
                kind: StmtKind::FnDef(Arc::new(FnDef { name, params, body })),
                line,
            });
        }

        let is_assignment = matches!(self.peek_kind(), TokenKind::Ident(_))
            && *self.peek_second() == TokenKind::Assign;
        if is_assignment {
            let target = self.expect_ident("assignment target")?;
            self.advance();
            let value = self.rhs()?;
            return Ok(Stmt {
                kind: StmtKind::Assign { target, value },
                line,
            });
        }

        let value = self.rhs()?;
        Ok(Stmt {
            kind: StmtKind::Expr(value),
            line,
        })
    }

    fn rhs(&mut self) -> Result<Rhs, SyntaxError> {
        let awaited = self.eat(&TokenKind::Await);
        let expr = self.expr()?;
        if awaited && !matches!(expr, Expr::Call { .. }) {
            let token = self.peek();
            return Err(SyntaxError::new(
                "'await' must be applied to a call",
                token.line,
                token.column,
            ));
        }
        Ok(Rhs { expr, awaited })
    }

    fn expr(&mut self) -> Result<Expr, SyntaxError> {
        self.enter()?;
        let then = self.or_expr()?;
        let expr = if self.eat(&TokenKind::If) {
            let cond = self.or_expr()?;
            self.expect(TokenKind::Else)?;
            let otherwise = self.expr()?;
            Expr::Conditional {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            }
        } else {
            then
        };
        self.leave(1);
        Ok(expr)
    }

    fn or_expr(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.and_expr()?;
        let mut levels = 0;
        while self.eat(&TokenKind::Or) {
            self.enter()?;
            levels += 1;
            let rhs = self.and_expr()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        self.leave(levels);
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.not_expr()?;
        let mut levels = 0;
        while self.eat(&TokenKind::And) {
            self.enter()?;
            levels += 1;
            let rhs = self.not_expr()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        self.leave(levels);
        Ok(lhs)
    }

    fn not_expr(&mut self) -> Result<Expr, SyntaxError> {
        if self.eat(&TokenKind::Not) {
            self.enter()?;
            let inner = self.not_expr()?;
            self.leave(1);
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(inner)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, SyntaxError> {
        let lhs = self.additive()?;
        let op = match self.peek_kind() {
            TokenKind::EqEq => BinaryOp::Eq,
            TokenKind::NotEq => BinaryOp::NotEq,
            TokenKind::Lt => BinaryOp::Lt,
            TokenKind::LtEq => BinaryOp::LtEq,
            TokenKind::Gt => BinaryOp::Gt,
            TokenKind::GtEq => BinaryOp::GtEq,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.additive()?;
        Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
    }

    fn additive(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.term()?;
        let mut levels = 0;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            self.enter()?;
            levels += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        self.leave(levels);
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.unary()?;
        let mut levels = 0;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::SlashSlash => BinaryOp::FloorDiv,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            self.enter()?;
            levels += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        self.leave(levels);
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, SyntaxError> {
        if self.eat(&TokenKind::Minus) {
            self.enter()?;
            let inner = self.unary()?;
            self.leave(1);
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(inner)));
        }
        self.power()
    }

    fn power(&mut self) -> Result<Expr, SyntaxError> {
        let base = self.postfix()?;
        if self.eat(&TokenKind::StarStar) {
            self.enter()?;
            let exponent = self.unary()?;
            self.leave(1);
            return Ok(Expr::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.primary()?;
        let mut levels = 0;
        loop {
            if matches!(self.peek_kind(), TokenKind::LParen | TokenKind::LBracket) {
                self.enter()?;
                levels += 1;
            }
            if self.eat(&TokenKind::LParen) {
                let args = self.comma_list(TokenKind::RParen)?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else if self.eat(&TokenKind::LBracket) {
                let index = self.expr()?;
                self.expect(TokenKind::RBracket)?;
                expr = Expr::Index {
                    target: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                self.leave(levels);
                return Ok(expr);
            }
        }
    }

    /// Parse `a, b, c<close>` after the opening bracket was consumed.
    fn comma_list(&mut self, close: TokenKind) -> Result<Vec<Expr>, SyntaxError> {
        let mut items = Vec::new();
        if self.eat(&close) {
            return Ok(items);
        }
        loop {
            items.push(self.expr()?);
            if self.eat(&close) {
                return Ok(items);
            }
            self.expect(TokenKind::Comma)?;
            // Trailing comma.
            if self.eat(&close) {
                return Ok(items);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, SyntaxError> {
        let token = self.advance();
        match token.kind {
            TokenKind::Int(v) => Ok(Expr::Int(v)),
            TokenKind::Float(v) => Ok(Expr::Float(v)),
            TokenKind::Str(s) => Ok(Expr::Str(Arc::from(s))),
            TokenKind::True => Ok(Expr::Bool(true)),
            TokenKind::False => Ok(Expr::Bool(false)),
            TokenKind::None => Ok(Expr::None),
            TokenKind::Ident(name) => Ok(Expr::Name(name)),
            TokenKind::LParen => {
                let inner = self.expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::LBracket => Ok(Expr::List(self.comma_list(TokenKind::RBracket)?)),
            TokenKind::Await => Err(SyntaxError::new(
                "'await' is only allowed at the start of a statement or assignment value",
                token.line,
                token.column,
            )),
            other => Err(SyntaxError::new(
                format!("expected an expression, found {other}"),
                token.line,
                token.column,
            )),
        }
    }
}
