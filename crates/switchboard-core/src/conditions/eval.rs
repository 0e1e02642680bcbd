//! Expression reduction against a resolved attribute bag.
//!
//! `AND` and `OR` short-circuit left-to-right, and a branch error is
//! absorbed whenever the other branch determines the result on its own
//! (`error OR true` is true, `error AND false` is false). All other
//! operators propagate operand errors.

use crate::conditions::parser::{BinaryOp, Expr, UnaryOp};
use crate::conditions::value::{default_epsilon, float_equal, Value};
use crate::context::AttributeBag;
use crate::errors::{Result, SwitchboardError};

/// Evaluates a predicate expression to a boolean using the process-wide
/// default epsilon for numeric equality.
pub fn evaluate(expr: &Expr, attributes: &AttributeBag) -> Result<bool> {
    evaluate_with_epsilon(expr, attributes, default_epsilon())
}

/// Evaluates a predicate expression with an explicit epsilon.
pub fn evaluate_with_epsilon(expr: &Expr, attributes: &AttributeBag, epsilon: f64) -> Result<bool> {
    match eval_expr(expr, attributes, epsilon)? {
        Value::Bool(b) => Ok(b),
        other => Err(SwitchboardError::type_mismatch(format!(
            "expression must evaluate to a bool, got {}",
            other.kind()
        ))),
    }
}

fn eval_expr(expr: &Expr, attributes: &AttributeBag, epsilon: f64) -> Result<Value> {
    match expr {
        Expr::BoolLit(b) => Ok(Value::Bool(*b)),
        Expr::NumLit(n) => Ok(Value::Number(*n)),
        Expr::StrLit(s) => Ok(Value::String(s.clone())),
        Expr::RegexLit(re) => Ok(Value::Regex(re.clone())),
        Expr::ArrayLit(items) => Ok(Value::Array(items.clone())),
        Expr::Var(name) => attributes
            .get(name)
            .cloned()
            .ok_or_else(|| SwitchboardError::unknown_variable(name.clone())),
        Expr::Unary(UnaryOp::Neg, operand) => {
            match eval_expr(operand, attributes, epsilon)? {
                Value::Number(n) => Ok(Value::Number(-n)),
                other => Err(SwitchboardError::type_mismatch(format!(
                    "cannot negate {}",
                    other.kind()
                ))),
            }
        },
        Expr::Binary(op, lhs, rhs) => eval_binary(*op, lhs, rhs, attributes, epsilon),
    }
}

fn eval_binary(
    op: BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
    attributes: &AttributeBag,
    epsilon: f64,
) -> Result<Value> {
    match op {
        BinaryOp::And => match eval_bool(lhs, attributes, epsilon) {
            Ok(false) => Ok(Value::Bool(false)),
            Ok(true) => Ok(Value::Bool(eval_bool(rhs, attributes, epsilon)?)),
            Err(err) => match eval_bool(rhs, attributes, epsilon) {
                Ok(false) => Ok(Value::Bool(false)),
                _ => Err(err),
            },
        },
        BinaryOp::Or => match eval_bool(lhs, attributes, epsilon) {
            Ok(true) => Ok(Value::Bool(true)),
            Ok(false) => Ok(Value::Bool(eval_bool(rhs, attributes, epsilon)?)),
            Err(err) => match eval_bool(rhs, attributes, epsilon) {
                Ok(true) => Ok(Value::Bool(true)),
                _ => Err(err),
            },
        },
        BinaryOp::Xor => {
            let left = eval_bool(lhs, attributes, epsilon)?;
            let right = eval_bool(rhs, attributes, epsilon)?;
            Ok(Value::Bool(left ^ right))
        },
        BinaryOp::Nand => {
            let left = eval_bool(lhs, attributes, epsilon)?;
            let right = eval_bool(rhs, attributes, epsilon)?;
            Ok(Value::Bool(!(left && right)))
        },
        BinaryOp::Eq => {
            let left = eval_expr(lhs, attributes, epsilon)?;
            let right = eval_expr(rhs, attributes, epsilon)?;
            Ok(Value::Bool(values_equal(&left, &right, epsilon)?))
        },
        BinaryOp::Neq => {
            let left = eval_expr(lhs, attributes, epsilon)?;
            let right = eval_expr(rhs, attributes, epsilon)?;
            Ok(Value::Bool(!values_equal(&left, &right, epsilon)?))
        },
        BinaryOp::Lt | BinaryOp::Lte | BinaryOp::Gt | BinaryOp::Gte => {
            let left = eval_expr(lhs, attributes, epsilon)?;
            let right = eval_expr(rhs, attributes, epsilon)?;
            match (&left, &right) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Bool(match op {
                    BinaryOp::Lt => a < b,
                    BinaryOp::Lte => a <= b,
                    BinaryOp::Gt => a > b,
                    _ => a >= b,
                })),
                _ => Err(SwitchboardError::type_mismatch(format!(
                    "{} requires numbers, got {} and {}",
                    op.as_str(),
                    left.kind(),
                    right.kind()
                ))),
            }
        },
        BinaryOp::In | BinaryOp::NotIn => {
            let left = eval_expr(lhs, attributes, epsilon)?;
            let right = eval_expr(rhs, attributes, epsilon)?;
            let member = membership(&left, &right, op, epsilon)?;
            Ok(Value::Bool(if op == BinaryOp::In { member } else { !member }))
        },
        BinaryOp::Contains | BinaryOp::NotContains => {
            let left = eval_expr(lhs, attributes, epsilon)?;
            let right = eval_expr(rhs, attributes, epsilon)?;
            // CONTAINS mirrors IN with the array on the left.
            let member = membership(&right, &left, op, epsilon)?;
            Ok(Value::Bool(if op == BinaryOp::Contains {
                member
            } else {
                !member
            }))
        },
        BinaryOp::Matches | BinaryOp::NotMatches => {
            let left = eval_expr(lhs, attributes, epsilon)?;
            let right = eval_expr(rhs, attributes, epsilon)?;
            match (&left, &right) {
                (Value::String(s), Value::Regex(re)) => {
                    let matched = re.is_match(s);
                    Ok(Value::Bool(if op == BinaryOp::Matches {
                        matched
                    } else {
                        !matched
                    }))
                },
                _ => Err(SwitchboardError::type_mismatch(format!(
                    "{} requires a string and a regex, got {} and {}",
                    op.as_str(),
                    left.kind(),
                    right.kind()
                ))),
            }
        },
    }
}

fn eval_bool(expr: &Expr, attributes: &AttributeBag, epsilon: f64) -> Result<bool> {
    match eval_expr(expr, attributes, epsilon)? {
        Value::Bool(b) => Ok(b),
        other => Err(SwitchboardError::type_mismatch(format!(
            "logical operand must be a bool, got {}",
            other.kind()
        ))),
    }
}

fn values_equal(left: &Value, right: &Value, epsilon: f64) -> Result<bool> {
    match (left, right) {
        (Value::Bool(a), Value::Bool(b)) => Ok(a == b),
        (Value::Number(a), Value::Number(b)) => Ok(float_equal(*a, *b, epsilon)),
        (Value::String(a), Value::String(b)) => Ok(a == b),
        _ => Err(SwitchboardError::type_mismatch(format!(
            "cannot compare {} with {}",
            left.kind(),
            right.kind()
        ))),
    }
}

fn membership(scalar: &Value, array: &Value, op: BinaryOp, epsilon: f64) -> Result<bool> {
    let items = match array {
        Value::Array(items) => items,
        other => {
            return Err(SwitchboardError::type_mismatch(format!(
                "{} requires an array operand, got {}",
                op.as_str(),
                other.kind()
            )));
        },
    };
    items.contains(scalar, epsilon).ok_or_else(|| {
        SwitchboardError::type_mismatch(format!(
            "{} element type is {}, probe is {}",
            op.as_str(),
            items.element_kind(),
            scalar.kind()
        ))
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::conditions::parser::parse;
    use crate::conditions::value::set_default_epsilon;

    fn bag(object: serde_json::Value) -> AttributeBag {
        AttributeBag::from_json(object.as_object().expect("object context"))
    }

    /// `Some(bool)` is an expected outcome, `None` an expected evaluation error.
    fn corpus() -> Vec<(&'static str, AttributeBag, Option<bool>)> {
        vec![
            ("true", bag(json!({})), Some(true)),
            ("false", bag(json!({})), Some(false)),
            ("false OR true OR false OR false OR true", bag(json!({})), Some(true)),
            ("((false OR true) AND false) OR (false OR true)", bag(json!({})), Some(true)),
            ("[var0]", bag(json!({"var0": true})), Some(true)),
            ("[var0]", bag(json!({"var0": false})), Some(false)),
            ("[var0] > true", bag(json!({})), None),
            ("[var0] > true", bag(json!({"var0": 43})), None),
            ("[var0] > true", bag(json!({"var0": false})), None),
            ("[var0] and [var1]", bag(json!({"var0": true, "var1": true})), Some(true)),
            ("[var0] AND [var1]", bag(json!({"var0": true, "var1": false})), Some(false)),
            ("[var0] AND [var1]", bag(json!({"var0": false, "var1": true})), Some(false)),
            ("[var0] AND [var1]", bag(json!({"var0": false, "var1": false})), Some(false)),
            ("[var0] AND false", bag(json!({"var0": true})), Some(false)),
            ("56.43", bag(json!({})), None),
            ("[var5]", bag(json!({})), None),
            ("[var0] > -100 AND [var0] < -50", bag(json!({"var0": -75.4})), Some(true)),
            ("\"OFF\"", bag(json!({})), None),
            ("[var0] == \"OFF\"", bag(json!({"var0": "OFF"})), Some(true)),
            (
                "[var0] > 10 AND [var1] == \"OFF\"",
                bag(json!({"var0": 14, "var1": "OFF"})),
                Some(true),
            ),
            (
                "([var0] > 10) AND ([var1] == \"OFF\")",
                bag(json!({"var0": 14, "var1": "OFF"})),
                Some(true),
            ),
            (
                "([var0] > 10) AND ([var1] == \"OFF\") OR true",
                bag(json!({"var0": 1, "var1": "ON"})),
                Some(true),
            ),
            (
                "[foo][dfs] == true and [bar] == true",
                bag(json!({"foo.dfs": true, "bar": true})),
                Some(true),
            ),
            (
                "[foo][dfs][a] == true and [bar] == true",
                bag(json!({"foo.dfs.a": true, "bar": true})),
                Some(true),
            ),
            (
                "[@foo][a] == true and [bar] == true",
                bag(json!({"@foo.a": true, "bar": true})),
                Some(true),
            ),
            (
                "[foo][unknow] == true and [bar] == true",
                bag(json!({"foo.dfs": true, "bar": true})),
                None,
            ),
            // OR: a true branch wins even when the other branch has a type error.
            ("[foo] == true OR [foo] > 1", bag(json!({"foo": true})), Some(true)),
            ("[foo] == true OR [foo] == false", bag(json!({"foo": true})), Some(true)),
            ("[foo] > 100 OR [foo] < 99 ", bag(json!({"foo": 100})), Some(false)),
            (
                "[foo][dfs] == true or [bar] == true",
                bag(json!({"foo.dfs": true, "bar": true})),
                Some(true),
            ),
            // XOR
            ("false XOR false", bag(json!({})), Some(false)),
            ("false xor true", bag(json!({})), Some(true)),
            ("true XOR false", bag(json!({})), Some(true)),
            ("true xor true", bag(json!({})), Some(false)),
            // NAND
            ("false NAND false", bag(json!({})), Some(true)),
            ("false nand true", bag(json!({})), Some(true)),
            ("true nand false", bag(json!({})), Some(true)),
            ("true NAND true", bag(json!({})), Some(false)),
            // IN against a context-supplied array
            (
                "[foo] in [foobar]",
                bag(json!({"foo": "findme", "foobar": ["notme", "may", "findme", "lol"]})),
                Some(true),
            ),
            (
                "[foo] not in [foobar]",
                bag(json!({"foo": "dontfindme", "foobar": ["notme", "may", "findme", "lol"]})),
                Some(true),
            ),
            // IN with string array literals
            (
                r#"[foo] in ["bonjour", "le monde", "oui"]"#,
                bag(json!({"foo": "le monde"})),
                Some(true),
            ),
            (
                r#"[foo] in ["bonjour", "le monde", "oui"]"#,
                bag(json!({"foo": "world"})),
                Some(false),
            ),
            (
                r#"[foo] not in ["bonjour", "le monde", "oui"]"#,
                bag(json!({"foo": "le monde"})),
                Some(false),
            ),
            (
                r#"[foo] not in ["bonjour", "le monde", "oui"]"#,
                bag(json!({"foo": "world"})),
                Some(true),
            ),
            // IN with number array literals
            ("[foo] in [2,3,4]", bag(json!({"foo": 4})), Some(true)),
            ("[foo] in [2,3,4] AND [foo] == 4", bag(json!({"foo": 4})), Some(true)),
            ("[foo] in [2,3,4] AND [foo] == 3", bag(json!({"foo": 4})), Some(false)),
            ("[foo] in [2,3,4]", bag(json!({"foo": 5})), Some(false)),
            ("[foo] not in [2,3,4]", bag(json!({"foo": 4})), Some(false)),
            ("[foo] not in [2,3,4]", bag(json!({"foo": 5})), Some(true)),
            // CONTAINS
            (r#"[foo] contains "2""#, bag(json!({"foo": ["1", "2"]})), Some(true)),
            ("[foo] contains 2", bag(json!({"foo": ["1", "2"]})), None),
            (
                r#"[foo] contains "2" and [foo] contains "1""#,
                bag(json!({"foo": ["1", "2"]})),
                Some(true),
            ),
            (
                r#"[foo] contains "2" and [foo] contains "0""#,
                bag(json!({"foo": ["1", "2"]})),
                Some(false),
            ),
            (
                r#"[foo] contains "2" or [foo] contains "0""#,
                bag(json!({"foo": ["1", "2"]})),
                Some(true),
            ),
            (
                "[foo] contains 2 and [foo] contains 1",
                bag(json!({"foo": [1, 2]})),
                Some(true),
            ),
            (
                r#"[foo] contains "2" and [foo] contains 1"#,
                bag(json!({"foo": [1, 2]})),
                None,
            ),
            (
                "[foo] contains [bar]",
                bag(json!({"foo": ["1", "2"], "bar": "1"})),
                Some(true),
            ),
            ("[foo] contains [bar]", bag(json!({"foo": [1, 2], "bar": 1})), Some(true)),
            (
                "[foo] contains [bar]",
                bag(json!({"foo": [1, 2, 3], "bar": 3.0})),
                Some(true),
            ),
            (
                "[foo] contains [bar]",
                bag(json!({"foo": [0.29]})).set("bar", (29.0f32 / 100.0) as f64),
                Some(true),
            ),
            // NOT CONTAINS
            (r#"[foo] not contains "2""#, bag(json!({"foo": ["1", "2"]})), Some(false)),
            (r#"[foo] not contains "0""#, bag(json!({"foo": ["1", "2"]})), Some(true)),
            ("[foo] not contains 0", bag(json!({"foo": ["1", "2"]})), None),
            ("[foo] not contains 0", bag(json!({"bar": ["1", "2"]})), None),
            // Regex match
            (r"[status] =~ /^5\d\d/", bag(json!({"status": "500"})), Some(true)),
            (r"[status] =~ /^4\d\d/", bag(json!({"status": "500"})), Some(false)),
            (r"[status] !~ /^5\d\d/", bag(json!({"status": "500"})), Some(false)),
            (r"[status] !~ /^4\d\d/", bag(json!({"status": "500"})), Some(true)),
        ]
    }

    #[test]
    fn test_evaluation_corpus() {
        for (source, attributes, expected) in corpus() {
            let expr = parse(source)
                .unwrap_or_else(|err| panic!("parse failure for {:?}: {}", source, err));
            let outcome = evaluate(&expr, &attributes);
            match expected {
                Some(want) => {
                    let got = outcome.unwrap_or_else(|err| {
                        panic!("unexpected error for {:?}: {}", source, err)
                    });
                    assert_eq!(got, want, "wrong outcome for {:?}", source);
                },
                None => {
                    assert!(outcome.is_err(), "expected error for {:?}", source);
                },
            }
        }
    }

    #[test]
    fn test_short_circuit_absorbs_unevaluated_errors() {
        // The right branch would fail with an unknown variable, but the left
        // branch decides the result first.
        let expr = parse("true OR [missing] == 1").unwrap();
        assert!(evaluate(&expr, &AttributeBag::new()).unwrap());

        let expr = parse("false AND [missing] == 1").unwrap();
        assert!(!evaluate(&expr, &AttributeBag::new()).unwrap());

        // A failing left branch is recovered when the right branch decides.
        let expr = parse("[missing] == 1 OR true").unwrap();
        assert!(evaluate(&expr, &AttributeBag::new()).unwrap());

        // ...but not when it cannot.
        let expr = parse("[missing] == 1 OR false").unwrap();
        assert!(evaluate(&expr, &AttributeBag::new()).is_err());
    }

    #[test]
    fn test_determinism() {
        let expr = parse(r#"[tier] == "gold" AND [count] > 3"#).unwrap();
        let attributes = bag(json!({"tier": "gold", "count": 10}));
        let first = evaluate(&expr, &attributes).unwrap();
        for _ in 0..100 {
            assert_eq!(evaluate(&expr, &attributes).unwrap(), first);
        }
    }

    #[test]
    fn test_epsilon_equality_scenarios() {
        // All epsilon-global mutation lives in this one test; concurrent
        // tests only ever pass explicit epsilons.
        let expr = parse("[foo] == 0.1").unwrap();

        assert!(evaluate_with_epsilon(&expr, &bag(json!({"foo": 0.1})), 1e-6).unwrap());
        assert!(
            evaluate_with_epsilon(&expr, &bag(json!({"foo": 0.100000000001})), 1e-6).unwrap()
        );
        assert!(!evaluate_with_epsilon(&expr, &bag(json!({"foo": 0.100001})), 1e-6).unwrap());

        // Widening the default epsilon flips the outcome.
        set_default_epsilon(1e-5);
        assert!(evaluate(&expr, &bag(json!({"foo": 0.100001}))).unwrap());
        set_default_epsilon(1e-6);
        assert!(!evaluate(&expr, &bag(json!({"foo": 0.100001}))).unwrap());
    }
}
