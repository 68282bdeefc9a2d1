// src/lang/builtins.rs

//! Builtin functions available to every unit.

use std::time::Duration;

use crate::lang::EvalError;
use crate::lang::value::Value;

const SYNC_BUILTINS: &[&str] = &[
    "print", "len", "str", "int", "float", "abs", "min", "max", "sum", "range", "round", "fail",
];

/// Builtins that suspend the unit and must be awaited.
const ASYNC_BUILTINS: &[&str] = &["sleep", "delay"];

/// Upper bound on `range()` sizes.
const MAX_RANGE_LEN: i64 = 1_000_000;

pub fn is_builtin(name: &str) -> bool {
    SYNC_BUILTINS.contains(&name) || ASYNC_BUILTINS.contains(&name)
}

pub fn lookup(name: &str) -> Option<Value> {
    SYNC_BUILTINS
        .iter()
        .chain(ASYNC_BUILTINS.iter())
        .find(|b| **b == name)
        .map(|b| Value::Builtin(b))
}

pub fn is_async(name: &str) -> bool {
    ASYNC_BUILTINS.contains(&name)
}

/// Call a synchronous builtin.
pub fn call(name: &str, args: Vec<Value>, console: &mut Vec<String>) -> Result<Value, EvalError> {
    match name {
        "print" => {
            let line = args
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            console.push(line);
            Ok(Value::None)
        }
        "len" => {
            let [value] = exact::<1>(name, args)?;
            match value {
                Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
                Value::List(items) => Ok(Value::Int(items.len() as i64)),
                other => Err(type_error(name, &other)),
            }
        }
        "str" => {
            let [value] = exact::<1>(name, args)?;
            Ok(Value::str(value.to_string()))
        }
        "int" => {
            let [value] = exact::<1>(name, args)?;
            match value {
                Value::Int(i) => Ok(Value::Int(i)),
                Value::Bool(b) => Ok(Value::Int(b as i64)),
                Value::Float(f) if f.is_finite() => Ok(Value::Int(f.trunc() as i64)),
                Value::Str(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::Int)
                    .map_err(|_| EvalError::new(format!("int(): invalid literal '{s}'"))),
                other => Err(type_error(name, &other)),
            }
        }
        "float" => {
            let [value] = exact::<1>(name, args)?;
            match value {
                Value::Int(i) => Ok(Value::Float(i as f64)),
                Value::Float(f) => Ok(Value::Float(f)),
                Value::Str(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| EvalError::new(format!("float(): invalid literal '{s}'"))),
                other => Err(type_error(name, &other)),
            }
        }
        "abs" => {
            let [value] = exact::<1>(name, args)?;
            match value {
                Value::Int(i) => i
                    .checked_abs()
                    .map(Value::Int)
                    .ok_or_else(|| EvalError::new("integer overflow in abs()")),
                Value::Float(f) => Ok(Value::Float(f.abs())),
                other => Err(type_error(name, &other)),
            }
        }
        "min" | "max" => {
            let items = spread(name, args)?;
            let mut best: Option<Value> = None;
            for item in items {
                best = Some(match best {
                    None => item,
                    Some(current) => {
                        let ord = compare(&item, &current)?;
                        let take = if name == "min" { ord.is_lt() } else { ord.is_gt() };
                        if take { item } else { current }
                    }
                });
            }
            best.ok_or_else(|| EvalError::new(format!("{name}() of an empty sequence")))
        }
        "sum" => {
            let items = spread(name, args)?;
            let mut total = Value::Int(0);
            for item in items {
                total = match (total, item) {
                    (Value::Int(a), Value::Int(b)) => Value::Int(
                        a.checked_add(b)
                            .ok_or_else(|| EvalError::new("integer overflow in sum()"))?,
                    ),
                    (Value::Int(a), Value::Float(b)) => Value::Float(a as f64 + b),
                    (Value::Float(a), Value::Int(b)) => Value::Float(a + b as f64),
                    (Value::Float(a), Value::Float(b)) => Value::Float(a + b),
                    (_, other) => return Err(type_error(name, &other)),
                };
            }
            Ok(total)
        }
        "range" => {
            let (start, stop) = match args.as_slice() {
                [Value::Int(stop)] => (0, *stop),
                [Value::Int(start), Value::Int(stop)] => (*start, *stop),
                _ => return Err(EvalError::new("range() expects one or two integers")),
            };
            if stop.saturating_sub(start) > MAX_RANGE_LEN {
                return Err(EvalError::new("range() too large"));
            }
            Ok(Value::list((start..stop).map(Value::Int).collect()))
        }
        "round" => match args.as_slice() {
            [Value::Int(i)] => Ok(Value::Int(*i)),
            [Value::Float(f)] if f.is_finite() => Ok(Value::Int(f.round() as i64)),
            [Value::Float(f), Value::Int(digits)] => {
                let scale = 10f64.powi((*digits).clamp(0, 15) as i32);
                Ok(Value::Float((f * scale).round() / scale))
            }
            _ => Err(EvalError::new("round() expects a number and optional digits")),
        },
        "fail" => {
            let message = args
                .first()
                .map(|v| v.to_string())
                .unwrap_or_else(|| "fail() called".to_string());
            Err(EvalError::new(message))
        }
        _ if is_async(name) => Err(EvalError::new(format!("{name}() must be awaited"))),
        _ => Err(EvalError::new(format!("unknown builtin '{name}'"))),
    }
}

/// Resolve an awaited async builtin into its suspension time and result.
pub fn suspension(name: &str, args: Vec<Value>) -> Result<(Duration, Value), EvalError> {
    match (name, args.as_slice()) {
        ("sleep", [ms]) => Ok((millis(name, ms)?, Value::None)),
        ("delay", [ms, value]) => Ok((millis(name, ms)?, value.clone())),
        ("sleep", _) => Err(EvalError::new("sleep() expects one argument (milliseconds)")),
        ("delay", _) => Err(EvalError::new("delay() expects milliseconds and a value")),
        _ => Err(EvalError::new(format!("object returned by '{name}' is not awaitable"))),
    }
}

fn millis(name: &str, value: &Value) -> Result<Duration, EvalError> {
    match value {
        Value::Int(ms) if *ms >= 0 => Ok(Duration::from_millis(*ms as u64)),
        Value::Float(ms) if *ms >= 0.0 && ms.is_finite() => Duration::try_from_secs_f64(ms / 1000.0)
            .map_err(|_| EvalError::new(format!("{name}() duration is too large"))),
        other => Err(EvalError::new(format!(
            "{name}() expects a non-negative duration, got {}",
            other.type_name()
        ))),
    }
}

/// Ordering used by comparisons and `min`/`max`.
pub fn compare(a: &Value, b: &Value) -> Result<std::cmp::Ordering, EvalError> {
    let ord = match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (Value::Int(x), Value::Float(y)) => (*x as f64).partial_cmp(y),
        (Value::Float(x), Value::Int(y)) => x.partial_cmp(&(*y as f64)),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y),
        (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => {
            return Err(EvalError::new(format!(
                "cannot compare {} with {}",
                a.type_name(),
                b.type_name()
            )));
        }
    };
    ord.ok_or_else(|| EvalError::new("cannot compare NaN"))
}

fn exact<const N: usize>(name: &str, args: Vec<Value>) -> Result<[Value; N], EvalError> {
    let got = args.len();
    args.try_into().map_err(|_| {
        EvalError::new(format!("{name}() takes {N} argument(s), got {got}"))
    })
}

/// `max(xs)` and `max(a, b, c)` both work.
fn spread(name: &str, args: Vec<Value>) -> Result<Vec<Value>, EvalError> {
    match args.as_slice() {
        [Value::List(items)] => Ok(items.as_ref().clone()),
        [] => Err(EvalError::new(format!("{name}() expects at least one argument"))),
        _ => Ok(args),
    }
}

fn type_error(name: &str, value: &Value) -> EvalError {
    EvalError::new(format!(
        "{name}(): unsupported argument of type {}",
        value.type_name()
    ))
}
