// src/lang/interp.rs

//! Tree-walking evaluator for a parsed unit body.
//!
//! Expressions evaluate synchronously. Statements whose value is awaited
//! suspend the unit on the Tokio timer; those are the only points where a
//! cancellation request can stop the body early.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::lang::EvalError;
use crate::lang::ast::{BinaryOp, Expr, Program, Rhs, StmtKind, UnaryOp, is_private};
use crate::lang::builtins;
use crate::lang::value::{Function, Value};

/// Maximum nesting of user function calls.
const MAX_CALL_DEPTH: usize = 200;

/// Maximum nesting of expression evaluation across all active calls.
const MAX_EVAL_DEPTH: usize = 1_000;

/// Upper bound on the byte length of a string built by `str * int`.
const MAX_REPEAT_BYTES: usize = 1 << 24;

/// Result of running a unit body to completion.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Final values of the unit's public top-level names, in definition order.
    pub bindings: Vec<(String, Value)>,
    /// Value of the trailing expression statement, or `none`.
    pub output: Value,
    /// Lines written by `print`.
    pub console: Vec<String>,
}

/// Why a unit body did not complete.
#[derive(Debug, Clone)]
pub enum Interruption {
    Raised { error: EvalError, console: Vec<String> },
    Cancelled,
}

/// Run `program` with `inputs` as its visible globals.
pub async fn execute(
    program: &Program,
    inputs: HashMap<String, Value>,
    cancel: &CancellationToken,
) -> Result<Evaluation, Interruption> {
    if cancel.is_cancelled() {
        return Err(Interruption::Cancelled);
    }

    let mut scope = inputs;
    let mut defined: Vec<String> = Vec::new();
    let mut console = Vec::new();
    let mut output = Value::None;

    for stmt in &program.statements {
        let result = match &stmt.kind {
            StmtKind::Assign { target, value } => {
                match eval_rhs(value, &scope, &mut console, cancel).await {
                    Ok(v) => {
                        if !defined.contains(target) {
                            defined.push(target.clone());
                        }
                        scope.insert(target.clone(), v);
                        Ok(Value::None)
                    }
                    Err(e) => Err(e),
                }
            }
            StmtKind::FnDef(def) => {
                let func = Function {
                    def: Arc::clone(def),
                    captured: scope.clone(),
                };
                if !defined.contains(&def.name) {
                    defined.push(def.name.clone());
                }
                scope.insert(def.name.clone(), Value::Function(Arc::new(func)));
                Ok(Value::None)
            }
            StmtKind::Expr(value) => eval_rhs(value, &scope, &mut console, cancel).await,
        };

        match result {
            Ok(value) => {
                output = value;
            }
            Err(StepError::Raised(error)) => {
                let error = error.at_line(stmt.line);
                return Err(Interruption::Raised { error, console });
            }
            Err(StepError::Cancelled) => return Err(Interruption::Cancelled),
        }
    }

    let bindings = defined
        .into_iter()
        .filter(|name| !is_private(name))
        .filter_map(|name| scope.remove(&name).map(|value| (name, value)))
        .collect();

    Ok(Evaluation {
        bindings,
        output,
        console,
    })
}

enum StepError {
    Raised(EvalError),
    Cancelled,
}

impl From<EvalError> for StepError {
    fn from(e: EvalError) -> Self {
        StepError::Raised(e)
    }
}

async fn eval_rhs(
    rhs: &Rhs,
    scope: &HashMap<String, Value>,
    console: &mut Vec<String>,
    cancel: &CancellationToken,
) -> Result<Value, StepError> {
    let mut evaluator = Evaluator {
        console,
        depth: 0,
        nesting: 0,
    };

    if !rhs.awaited {
        return Ok(evaluator.eval(&rhs.expr, scope)?);
    }

    let Expr::Call { callee, args } = &rhs.expr else {
        return Err(EvalError::new("'await' must be applied to a call").into());
    };

    let callee = evaluator.eval(callee, scope)?;
    let args = args
        .iter()
        .map(|a| evaluator.eval(a, scope))
        .collect::<Result<Vec<_>, _>>()?;

    let name = match callee {
        Value::Builtin(name) if builtins::is_async(name) => name,
        other => {
            return Err(EvalError::new(format!("{} is not awaitable", other.type_name())).into());
        }
    };

    let (duration, value) = builtins::suspension(name, args)?;
    trace!(builtin = name, ?duration, "unit suspended");

    tokio::select! {
        _ = cancel.cancelled() => Err(StepError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(value),
    }
}

struct Evaluator<'c> {
    console: &'c mut Vec<String>,
    /// Active user function calls.
    depth: usize,
    /// Active `eval` frames.
    nesting: usize,
}

impl Evaluator<'_> {
    fn eval(&mut self, expr: &Expr, scope: &HashMap<String, Value>) -> Result<Value, EvalError> {
        if self.nesting >= MAX_EVAL_DEPTH {
            return Err(EvalError::new("maximum recursion depth exceeded"));
        }
        self.nesting += 1;
        let result = self.eval_inner(expr, scope);
        self.nesting -= 1;
        result
    }

    fn eval_inner(
        &mut self,
        expr: &Expr,
        scope: &HashMap<String, Value>,
    ) -> Result<Value, EvalError> {
        match expr {
            Expr::None => Ok(Value::None),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Int(i) => Ok(Value::Int(*i)),
            Expr::Float(f) => Ok(Value::Float(*f)),
            Expr::Str(s) => Ok(Value::Str(Arc::clone(s))),
            Expr::List(items) => {
                let values = items
                    .iter()
                    .map(|item| self.eval(item, scope))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::list(values))
            }
            Expr::Name(name) => scope
                .get(name)
                .cloned()
                .or_else(|| builtins::lookup(name))
                .ok_or_else(|| EvalError::new(format!("name '{name}' is not defined"))),
            Expr::Unary(op, inner) => {
                let value = self.eval(inner, scope)?;
                unary(*op, value)
            }
            Expr::Binary(op, lhs, rhs) => {
                let lhs = self.eval(lhs, scope)?;
                let rhs = self.eval(rhs, scope)?;
                binary(*op, lhs, rhs)
            }
            Expr::And(lhs, rhs) => {
                let lhs = self.eval(lhs, scope)?;
                if lhs.truthy() { self.eval(rhs, scope) } else { Ok(lhs) }
            }
            Expr::Or(lhs, rhs) => {
                let lhs = self.eval(lhs, scope)?;
                if lhs.truthy() { Ok(lhs) } else { self.eval(rhs, scope) }
            }
            Expr::Conditional {
                cond,
                then,
                otherwise,
            } => {
                if self.eval(cond, scope)?.truthy() {
                    self.eval(then, scope)
                } else {
                    self.eval(otherwise, scope)
                }
            }
            Expr::Call { callee, args } => {
                let callee = self.eval(callee, scope)?;
                let args = args
                    .iter()
                    .map(|a| self.eval(a, scope))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call(callee, args)
            }
            Expr::Index { target, index } => {
                let target = self.eval(target, scope)?;
                let index = self.eval(index, scope)?;
                subscript(target, index)
            }
        }
    }

    fn call(&mut self, callee: Value, args: Vec<Value>) -> Result<Value, EvalError> {
        match callee {
            Value::Builtin(name) => builtins::call(name, args, self.console),
            Value::Function(func) => {
                let def = &func.def;
                if args.len() != def.params.len() {
                    return Err(EvalError::new(format!(
                        "{}() takes {} argument(s), got {}",
                        def.name,
                        def.params.len(),
                        args.len()
                    )));
                }
                if self.depth >= MAX_CALL_DEPTH {
                    return Err(EvalError::new("maximum recursion depth exceeded"));
                }

                let mut local = func.captured.clone();
                local.insert(def.name.clone(), Value::Function(Arc::clone(&func)));
                for (param, arg) in def.params.iter().zip(args) {
                    local.insert(param.clone(), arg);
                }

                self.depth += 1;
                let result = self.eval(&def.body, &local);
                self.depth -= 1;
                result
            }
            other => Err(EvalError::new(format!(
                "{} object is not callable",
                other.type_name()
            ))),
        }
    }
}

fn unary(op: UnaryOp, value: Value) -> Result<Value, EvalError> {
    match (op, value) {
        (UnaryOp::Not, v) => Ok(Value::Bool(!v.truthy())),
        (UnaryOp::Neg, Value::Int(i)) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| EvalError::new("integer overflow")),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Neg, other) => Err(EvalError::new(format!(
            "bad operand type for unary -: {}",
            other.type_name()
        ))),
    }
}

fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, EvalError> {
    use BinaryOp::*;

    match op {
        Eq => return Ok(Value::Bool(lhs == rhs)),
        NotEq => return Ok(Value::Bool(lhs != rhs)),
        Lt | LtEq | Gt | GtEq => {
            let ord = builtins::compare(&lhs, &rhs)?;
            let result = match op {
                Lt => ord.is_lt(),
                LtEq => ord.is_le(),
                Gt => ord.is_gt(),
                _ => ord.is_ge(),
            };
            return Ok(Value::Bool(result));
        }
        _ => {}
    }

    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => int_arith(op, a, b),
        (Value::Int(a), Value::Float(b)) => float_arith(op, a as f64, b),
        (Value::Float(a), Value::Int(b)) => float_arith(op, a, b as f64),
        (Value::Float(a), Value::Float(b)) => float_arith(op, a, b),
        (Value::Str(a), Value::Str(b)) if op == Add => Ok(Value::str(format!("{a}{b}"))),
        (Value::Str(s), Value::Int(n)) if op == Mul => {
            let n = usize::try_from(n).unwrap_or(0);
            match s.len().checked_mul(n) {
                Some(len) if len <= MAX_REPEAT_BYTES => Ok(Value::str(s.repeat(n))),
                _ => Err(EvalError::new("repeated string is too large")),
            }
        }
        (Value::List(a), Value::List(b)) if op == Add => {
            let mut items = a.as_ref().clone();
            items.extend(b.iter().cloned());
            Ok(Value::list(items))
        }
        (lhs, rhs) => Err(EvalError::new(format!(
            "unsupported operand types for {}: {} and {}",
            op_symbol(op),
            lhs.type_name(),
            rhs.type_name()
        ))),
    }
}

fn int_arith(op: BinaryOp, a: i64, b: i64) -> Result<Value, EvalError> {
    let overflow = || EvalError::new("integer overflow");
    match op {
        BinaryOp::Add => a.checked_add(b).map(Value::Int).ok_or_else(overflow),
        BinaryOp::Sub => a.checked_sub(b).map(Value::Int).ok_or_else(overflow),
        BinaryOp::Mul => a.checked_mul(b).map(Value::Int).ok_or_else(overflow),
        BinaryOp::Div => {
            if b == 0 {
                return Err(EvalError::new("division by zero"));
            }
            Ok(Value::Float(a as f64 / b as f64))
        }
        BinaryOp::FloorDiv => {
            if b == 0 {
                return Err(EvalError::new("integer division by zero"));
            }
            let q = a.checked_div(b).ok_or_else(overflow)?;
            let r = a.checked_rem(b).ok_or_else(overflow)?;
            // Round toward negative infinity.
            Ok(Value::Int(if r != 0 && ((r < 0) != (b < 0)) { q - 1 } else { q }))
        }
        BinaryOp::Mod => {
            if b == 0 {
                return Err(EvalError::new("integer modulo by zero"));
            }
            let r = a.checked_rem(b).ok_or_else(overflow)?;
            // Result takes the sign of the divisor.
            Ok(Value::Int(if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r }))
        }
        BinaryOp::Pow => {
            if b < 0 {
                return Ok(Value::Float((a as f64).powf(b as f64)));
            }
            let exp = u32::try_from(b).map_err(|_| overflow())?;
            a.checked_pow(exp).map(Value::Int).ok_or_else(overflow)
        }
        _ => unreachable!("comparison operators are handled by the caller"),
    }
}

fn float_arith(op: BinaryOp, a: f64, b: f64) -> Result<Value, EvalError> {
    match op {
        BinaryOp::Add => Ok(Value::Float(a + b)),
        BinaryOp::Sub => Ok(Value::Float(a - b)),
        BinaryOp::Mul => Ok(Value::Float(a * b)),
        BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod if b == 0.0 => {
            Err(EvalError::new("float division by zero"))
        }
        BinaryOp::Div => Ok(Value::Float(a / b)),
        BinaryOp::FloorDiv => Ok(Value::Float((a / b).floor())),
        BinaryOp::Mod => Ok(Value::Float(a - b * (a / b).floor())),
        BinaryOp::Pow => Ok(Value::Float(a.powf(b))),
        _ => unreachable!("comparison operators are handled by the caller"),
    }
}

fn subscript(target: Value, index: Value) -> Result<Value, EvalError> {
    let Value::Int(i) = index else {
        return Err(EvalError::new(format!(
            "indices must be integers, not {}",
            index.type_name()
        )));
    };

    let resolve = |len: usize| -> Option<usize> {
        let len = len as i64;
        let idx = if i < 0 { len + i } else { i };
        (0..len).contains(&idx).then_some(idx as usize)
    };

    match target {
        Value::List(items) => resolve(items.len())
            .map(|idx| items[idx].clone())
            .ok_or_else(|| EvalError::new("list index out of range")),
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            resolve(chars.len())
                .map(|idx| Value::str(chars[idx].to_string()))
                .ok_or_else(|| EvalError::new("string index out of range"))
        }
        other => Err(EvalError::new(format!(
            "{} object is not subscriptable",
            other.type_name()
        ))),
    }
}

fn op_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::FloorDiv => "//",
        BinaryOp::Mod => "%",
        BinaryOp::Pow => "**",
        BinaryOp::Eq => "==",
        BinaryOp::NotEq => "!=",
        BinaryOp::Lt => "<",
        BinaryOp::LtEq => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::GtEq => ">=",
    }
}
