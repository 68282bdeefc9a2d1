// src/lang/mod.rs

//! The cell language.
//!
//! - [`lexer`] and [`parser`] turn unit source into an [`ast::Program`].
//! - [`interp`] evaluates a program against a set of input bindings.
//! - [`value`] and [`builtins`] define the runtime values and the functions
//!   every unit can call.
//!
//! Static analysis over the syntax tree lives in [`crate::analyze`].

pub mod ast;
pub mod builtins;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod value;

use serde::Serialize;
use thiserror::Error;

pub use ast::Program;
pub use interp::{Evaluation, Interruption, execute};
pub use parser::parse;
pub use value::Value;

/// Source that cannot be parsed or statically analysed.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("line {line}, column {column}: {message}")]
pub struct SyntaxError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }
}

/// A fault raised while evaluating a unit body.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{}", located(.line, .message))]
pub struct EvalError {
    pub message: String,
    pub line: Option<usize>,
}

impl EvalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
        }
    }

    /// Attach the statement line if none was recorded yet.
    pub fn at_line(mut self, line: usize) -> Self {
        self.line.get_or_insert(line);
        self
    }
}

fn located(line: &Option<usize>, message: &str) -> String {
    match line {
        Some(line) => format!("line {line}: {message}"),
        None => message.to_string(),
    }
}
