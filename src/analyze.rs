// src/analyze.rs

//! Static analysis of a single unit.
//!
//! Derives the names a unit defines and the free names it reads from other
//! units, without executing anything. The result feeds the dependency graph;
//! it is deterministic and safe to call on every keystroke.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use crate::lang::ast::{Expr, Program, StmtKind, is_private};
use crate::lang::{SyntaxError, builtins, parse};

/// Definitions and references extracted from one unit's source.
#[derive(Debug, Clone)]
pub struct Analysis {
    /// Public names bound at the top level, in first-definition order.
    pub defs: Vec<String>,
    /// Public names read before (or without) a local definition.
    pub refs: BTreeSet<String>,
    pub program: Arc<Program>,
}

impl Analysis {
    pub fn is_async(&self) -> bool {
        self.program.is_async()
    }
}

/// Parse `source` and compute its definitions and free references.
pub fn analyze(source: &str) -> Result<Analysis, SyntaxError> {
    let program = parse(source)?;

    let mut bound: HashSet<String> = HashSet::new();
    let mut defs: Vec<String> = Vec::new();
    let mut refs: BTreeSet<String> = BTreeSet::new();

    for stmt in &program.statements {
        let target = match &stmt.kind {
            StmtKind::Assign { target, value } => {
                free_names(&value.expr, &|name: &str| bound.contains(name), &mut refs);
                target
            }
            StmtKind::FnDef(def) => {
                let is_local = |name: &str| {
                    name == def.name || def.params.iter().any(|p| p == name) || bound.contains(name)
                };
                free_names(&def.body, &is_local, &mut refs);
                &def.name
            }
            StmtKind::Expr(value) => {
                free_names(&value.expr, &|name: &str| bound.contains(name), &mut refs);
                continue;
            }
        };

        if builtins::is_builtin(target) {
            return Err(SyntaxError::new(
                format!("cannot assign to builtin '{target}'"),
                stmt.line,
                1,
            ));
        }

        if bound.insert(target.clone()) && !is_private(target) {
            defs.push(target.clone());
        }
    }

    Ok(Analysis {
        defs,
        refs,
        program: Arc::new(program),
    })
}

/// Collect names read by `expr` that are not local, builtin or private.
fn free_names(expr: &Expr, is_local: &dyn Fn(&str) -> bool, out: &mut BTreeSet<String>) {
    match expr {
        Expr::None | Expr::Bool(_) | Expr::Int(_) | Expr::Float(_) | Expr::Str(_) => {}
        Expr::Name(name) => {
            if !is_local(name) && !is_private(name) && !builtins::is_builtin(name) {
                out.insert(name.clone());
            }
        }
        Expr::List(items) => {
            for item in items {
                free_names(item, is_local, out);
            }
        }
        Expr::Unary(_, inner) => free_names(inner, is_local, out),
        Expr::Binary(_, lhs, rhs) | Expr::And(lhs, rhs) | Expr::Or(lhs, rhs) => {
            free_names(lhs, is_local, out);
            free_names(rhs, is_local, out);
        }
        Expr::Conditional {
            cond,
            then,
            otherwise,
        } => {
            free_names(cond, is_local, out);
            free_names(then, is_local, out);
            free_names(otherwise, is_local, out);
        }
        Expr::Call { callee, args } => {
            free_names(callee, is_local, out);
            for arg in args {
                free_names(arg, is_local, out);
            }
        }
        Expr::Index { target, index } => {
            free_names(target, is_local, out);
            free_names(index, is_local, out);
        }
    }
}
