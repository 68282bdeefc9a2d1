// src/lang/ast.rs

//! Syntax tree for cell source.

use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    List(Vec<Expr>),
    Name(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    /// `then if cond else otherwise`
    Conditional {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
}

/// Right-hand side of a statement, optionally awaited.
#[derive(Debug, Clone, PartialEq)]
pub struct Rhs {
    pub expr: Expr,
    pub awaited: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FnDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Assign { target: String, value: Rhs },
    FnDef(Arc<FnDef>),
    Expr(Rhs),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: usize,
}

/// A parsed unit body.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

impl Program {
    /// Whether any statement suspends via `await`.
    pub fn is_async(&self) -> bool {
        self.statements.iter().any(|stmt| match &stmt.kind {
            StmtKind::Assign { value, .. } | StmtKind::Expr(value) => value.awaited,
            StmtKind::FnDef(_) => false,
        })
    }
}

/// Names starting with `_` never leave the unit that binds them.
pub fn is_private(name: &str) -> bool {
    name.starts_with('_')
}
