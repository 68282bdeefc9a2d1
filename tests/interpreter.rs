// tests/interpreter.rs

use std::collections::HashMap;
use std::time::Duration;

use celldag::lang::{Interruption, Value, execute, parse};
use tokio_util::sync::CancellationToken;

fn inputs(pairs: &[(&str, i64)]) -> HashMap<String, Value> {
    pairs
        .iter()
        .map(|(name, v)| (name.to_string(), Value::Int(*v)))
        .collect()
}

#[tokio::test]
async fn binds_public_names_and_returns_trailing_value() {
    let program = parse("y = x * 3\n_scratch = 5\ny + 1").unwrap();
    let evaluation = execute(&program, inputs(&[("x", 2)]), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(evaluation.bindings, vec![("y".to_string(), Value::Int(6))]);
    assert_eq!(evaluation.output, Value::Int(7));
}

#[tokio::test]
async fn print_goes_to_console() {
    let program = parse("print(\"total\", 1 + 2)").unwrap();
    let evaluation = execute(&program, HashMap::new(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(evaluation.console, vec!["total 3".to_string()]);
    assert_eq!(evaluation.output, Value::None);
}

#[tokio::test]
async fn runtime_fault_keeps_console_and_line() {
    let program = parse("print(\"before\")\ny = 10 // x").unwrap();
    let result = execute(&program, inputs(&[("x", 0)]), &CancellationToken::new()).await;

    match result {
        Err(Interruption::Raised { error, console }) => {
            assert_eq!(error.line, Some(2));
            assert!(error.message.contains("by zero"));
            assert_eq!(console, vec!["before".to_string()]);
        }
        other => panic!("expected a raised fault, got {other:?}"),
    }
}

#[tokio::test]
async fn cancellation_stops_at_await() {
    let program = parse("y = await delay(5000, 1)").unwrap();
    let token = CancellationToken::new();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(2),
        execute(&program, HashMap::new(), &token),
    )
    .await
    .expect("cancelled body should stop promptly");

    assert!(matches!(result, Err(Interruption::Cancelled)));
}

#[tokio::test]
async fn functions_capture_their_defining_scope() {
    let program = parse("fn scale(v) = v * factor\nscale(4)").unwrap();
    let evaluation = execute(&program, inputs(&[("factor", 3)]), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(evaluation.output, Value::Int(12));
    assert_eq!(evaluation.bindings.len(), 1);
    assert_eq!(evaluation.bindings[0].0, "scale");
}

/// Evaluate `source` and return its output value, or the fault message.
async fn run(source: &str) -> Result<Value, String> {
    let program = parse(source).map_err(|e| format!("syntax: {e}"))?;
    match execute(&program, HashMap::new(), &CancellationToken::new()).await {
        Ok(evaluation) => Ok(evaluation.output),
        Err(Interruption::Raised { error, .. }) => Err(error.message),
        Err(Interruption::Cancelled) => Err("cancelled".to_string()),
    }
}

async fn check_values(cases: &[(&str, Value)]) {
    for (source, expected) in cases {
        match run(source).await {
            Ok(value) => assert_eq!(&value, expected, "source: {source}"),
            Err(message) => panic!("{source} raised: {message}"),
        }
    }
}

async fn check_faults(cases: &[(&str, &str)]) {
    for (source, fragment) in cases {
        match run(source).await {
            Ok(value) => panic!("{source} should fault, produced {value}"),
            Err(message) => assert!(
                message.contains(fragment),
                "{source}: {message:?} does not mention {fragment:?}"
            ),
        }
    }
}

#[tokio::test]
async fn operator_precedence() {
    check_values(&[
        ("1 + 2 * 3", Value::Int(7)),
        ("(1 + 2) * 3", Value::Int(9)),
        ("10 - 2 - 3", Value::Int(5)),
        ("2 * 3 ** 2", Value::Int(18)),
        ("-2 ** 2", Value::Int(-4)),
        ("2 ** 3 ** 2", Value::Int(512)),
        ("2 ** -1", Value::Float(0.5)),
        ("7 / 2", Value::Float(3.5)),
        ("not 1 == 2", Value::Bool(true)),
        ("1 < 2 and 2 < 3", Value::Bool(true)),
        ("1 + 1 == 2 or fail(\"unreachable\")", Value::Bool(true)),
    ])
    .await;
}

#[tokio::test]
async fn floor_division_and_modulo_follow_the_divisor_sign() {
    check_values(&[
        ("7 // 2", Value::Int(3)),
        ("-7 // 2", Value::Int(-4)),
        ("7 // -2", Value::Int(-4)),
        ("-7 // -2", Value::Int(3)),
        ("7 % 3", Value::Int(1)),
        ("-7 % 3", Value::Int(2)),
        ("7 % -3", Value::Int(-2)),
        ("-7 % -3", Value::Int(-1)),
        ("6 % -3", Value::Int(0)),
        ("-7.5 // 2", Value::Float(-4.0)),
        ("-7.5 % 2", Value::Float(0.5)),
    ])
    .await;
}

#[tokio::test]
async fn conditional_and_short_circuit() {
    check_values(&[
        ("1 if true else 2", Value::Int(1)),
        ("1 if 0 else 2", Value::Int(2)),
        ("\"a\" if none else \"b\" if [] else \"c\"", Value::str("c")),
        ("false and fail(\"evaluated\")", Value::Bool(false)),
        ("true or fail(\"evaluated\")", Value::Bool(true)),
        ("0 or 5", Value::Int(5)),
        ("\"\" and 1", Value::str("")),
        ("3 and 4", Value::Int(4)),
        ("fail(\"evaluated\") if false else 9", Value::Int(9)),
    ])
    .await;
}

#[tokio::test]
async fn indexing_supports_negative_positions() {
    check_values(&[
        ("[1, 2, 3][0]", Value::Int(1)),
        ("[1, 2, 3][-1]", Value::Int(3)),
        ("[1, 2, 3][-3]", Value::Int(1)),
        ("\"abc\"[-1]", Value::str("c")),
        ("\"abc\"[1]", Value::str("b")),
    ])
    .await;

    check_faults(&[
        ("[1, 2, 3][3]", "list index out of range"),
        ("[1, 2, 3][-4]", "list index out of range"),
        ("\"abc\"[5]", "string index out of range"),
        ("[1][\"0\"]", "indices must be integers"),
        ("5[0]", "not subscriptable"),
    ])
    .await;
}

#[tokio::test]
async fn runtime_faults_are_raised_not_panics() {
    check_faults(&[
        ("9223372036854775807 + 1", "integer overflow"),
        ("-9223372036854775807 - 2", "integer overflow"),
        ("3037000500 * 3037000500", "integer overflow"),
        ("2 ** 64", "integer overflow"),
        ("1 // 0", "by zero"),
        ("1 % 0", "by zero"),
        ("1.0 / 0", "by zero"),
        ("1 + \"a\"", "unsupported operand types"),
        ("missing + 1", "name 'missing' is not defined"),
        ("fail(\"bad input\")", "bad input"),
        ("fail()", "fail() called"),
        ("sleep(10)", "must be awaited"),
        ("x = delay(10, 1)", "must be awaited"),
        ("await len([1])", "not awaitable"),
        ("\"ab\" * 9223372036854775807", "too large"),
        ("await sleep(1e300)", "too large"),
        ("range(10000000)", "too large"),
        ("5(1)", "not callable"),
    ])
    .await;
}

#[tokio::test]
async fn recursion_is_bounded() {
    let countdown = "fn down(n) = 0 if n == 0 else down(n - 1)\n";

    check_values(&[(&format!("{countdown}down(150)"), Value::Int(0))]).await;
    check_faults(&[
        (&format!("{countdown}down(201)"), "maximum recursion depth exceeded"),
        ("fn forever(n) = forever(n + 1)\nforever(0)", "maximum recursion depth exceeded"),
    ])
    .await;
}

#[tokio::test]
async fn faults_report_the_statement_line() {
    let program = parse("a = 1\nb = a + 1\nc = fail(\"third\")\nd = 4").unwrap();
    match execute(&program, HashMap::new(), &CancellationToken::new()).await {
        Err(Interruption::Raised { error, .. }) => {
            assert_eq!(error.line, Some(3));
            assert_eq!(error.to_string(), "line 3: third");
        }
        other => panic!("expected a raised fault, got {other:?}"),
    }
}

#[test]
fn syntax_errors_carry_line_and_column() {
    // (source, line, column, message fragment)
    let cases = [
        ("a = 1\nb = 2\nc = 3 $ 4", 3, 7, "unexpected character '$'"),
        ("a = 1\nb = (2 +\n3 *)", 3, 4, "expected an expression"),
        ("x = 1 2", 1, 7, "expected end of statement"),
        ("x = \"open", 1, 5, "unterminated string literal"),
        ("a = 1\n  b = )", 2, 7, "unmatched ')'"),
        ("fn f(a, a) = a", 1, 10, "duplicate parameter 'a'"),
    ];

    for (source, line, column, fragment) in cases {
        let err = parse(source).unwrap_err();
        assert_eq!((err.line, err.column), (line, column), "source: {source:?} -> {err}");
        assert!(err.message.contains(fragment), "source: {source:?} -> {err}");
    }
}

#[test]
fn nesting_depth_is_limited() {
    let nested = |depth: usize| format!("x = {}1{}", "(".repeat(depth), ")".repeat(depth));

    assert!(parse(&nested(150)).is_ok());

    let err = parse(&nested(100_000)).unwrap_err();
    assert_eq!(err.message, "expression nested too deeply");
    assert_eq!(err.line, 1);

    let negations = format!("x = {}1", "-".repeat(10_000));
    assert!(parse(&negations).is_err());

    let chain = format!("x = 1{}", " + 1".repeat(10_000));
    assert!(parse(&chain).is_err());

    let calls = format!("x = f{}", "()".repeat(10_000));
    assert!(parse(&calls).is_err());
}
