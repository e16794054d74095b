//! Operator semantics for snippet values.
#![expect(
    clippy::float_arithmetic,
    reason = "snippet numbers follow JSON double semantics"
)]

use std::cmp::Ordering;

use crate::syntax::ast::BinaryOp;
use crate::value::Value;

/// Applies a binary operator, returning a message on type errors.
pub(crate) fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, String> {
    match op {
        BinaryOp::Equal => Ok(Value::Bool(left == right)),
        BinaryOp::NotEqual => Ok(Value::Bool(left != right)),
        BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual => {
            let ordering = compare(left, right)?;
            let holds = match op {
                BinaryOp::Less => ordering.is_lt(),
                BinaryOp::LessEqual => ordering.is_le(),
                BinaryOp::Greater => ordering.is_gt(),
                _ => ordering.is_ge(),
            };
            Ok(Value::Bool(holds))
        }
        BinaryOp::Add => add(left, right),
        BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Remainder => {
            arithmetic(op, left, right)
        }
    }
}

/// Negates a number.
pub(crate) fn negate(operand: &Value) -> Result<Value, String> {
    match operand {
        Value::Int(number) => Ok(number
            .checked_neg()
            .map_or_else(|| Value::Float(-to_float(*number)), Value::Int)),
        Value::Float(number) => Ok(Value::Float(-number)),
        other => Err(format!("cannot negate a {}", other.type_name())),
    }
}

fn compare(left: &Value, right: &Value) -> Result<Ordering, String> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => left
            .as_f64()
            .zip(right.as_f64())
            .and_then(|(a, b)| a.partial_cmp(&b))
            .ok_or_else(|| "cannot order NaN".to_owned()),
        _ => Err(format!(
            "cannot compare a {} with a {}",
            left.type_name(),
            right.type_name()
        )),
    }
}

fn add(left: &Value, right: &Value) -> Result<Value, String> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
        (Value::String(text), other) if is_scalar(other) => {
            Ok(Value::String(format!("{text}{}", other.render())))
        }
        (other, Value::String(text)) if is_scalar(other) => {
            Ok(Value::String(format!("{}{text}", other.render())))
        }
        (Value::Array(a), Value::Array(b)) => {
            Ok(Value::Array(a.iter().chain(b.iter()).cloned().collect()))
        }
        _ => arithmetic(BinaryOp::Add, left, right),
    }
}

const fn is_scalar(value: &Value) -> bool {
    matches!(
        value,
        Value::Null | Value::Bool(_) | Value::Int(_) | Value::Float(_)
    )
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, String> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => integer_arithmetic(op, *a, *b),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) else {
                return Err(mismatch(op, left, right));
            };
            float_arithmetic(op, a, b)
        }
        _ => Err(mismatch(op, left, right)),
    }
}

fn integer_arithmetic(op: BinaryOp, a: i64, b: i64) -> Result<Value, String> {
    let exact = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Subtract => a.checked_sub(b),
        BinaryOp::Multiply => a.checked_mul(b),
        BinaryOp::Divide | BinaryOp::Remainder if b == 0 => {
            return Err("division by zero".to_owned());
        }
        BinaryOp::Divide => match a.checked_rem(b) {
            Some(0) => a.checked_div(b),
            _ => None,
        },
        BinaryOp::Remainder => a.checked_rem(b),
        _ => return Err(format!("`{}` is not an arithmetic operator", op.symbol())),
    };
    match exact {
        Some(value) => Ok(Value::Int(value)),
        None => float_arithmetic(op, to_float(a), to_float(b)),
    }
}

fn float_arithmetic(op: BinaryOp, a: f64, b: f64) -> Result<Value, String> {
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Subtract => a - b,
        BinaryOp::Multiply => a * b,
        BinaryOp::Divide | BinaryOp::Remainder if b == 0.0 => {
            return Err("division by zero".to_owned());
        }
        BinaryOp::Divide => a / b,
        BinaryOp::Remainder => a % b,
        _ => return Err(format!("`{}` is not an arithmetic operator", op.symbol())),
    };
    Ok(Value::Float(result))
}

#[expect(
    clippy::cast_precision_loss,
    reason = "mixed arithmetic widens to JSON doubles"
)]
fn to_float(number: i64) -> f64 {
    number as f64
}

fn mismatch(op: BinaryOp, left: &Value, right: &Value) -> String {
    format!(
        "cannot apply `{}` to a {} and a {}",
        op.symbol(),
        left.type_name(),
        right.type_name()
    )
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(BinaryOp::Add, Value::Int(2), Value::Int(3), Value::Int(5))]
    #[case(BinaryOp::Add, Value::Float(0.0), Value::Int(10), Value::Float(10.0))]
    #[case(BinaryOp::Divide, Value::Int(6), Value::Int(3), Value::Int(2))]
    #[case(BinaryOp::Divide, Value::Int(7), Value::Int(2), Value::Float(3.5))]
    #[case(BinaryOp::Remainder, Value::Int(7), Value::Int(4), Value::Int(3))]
    fn arithmetic_preserves_integers_when_exact(
        #[case] op: BinaryOp,
        #[case] left: Value,
        #[case] right: Value,
        #[case] expected: Value,
    ) {
        assert_eq!(binary(op, &left, &right), Ok(expected));
    }

    #[test]
    fn integer_overflow_widens_to_float() {
        let product = binary(BinaryOp::Multiply, &Value::Int(i64::MAX), &Value::Int(2));
        assert!(matches!(product, Ok(Value::Float(_))));
    }

    #[test]
    fn integer_results_stay_integers_in_json() {
        let sum = binary(BinaryOp::Add, &Value::Int(30), &Value::Int(3)).expect("addition");
        assert_eq!(sum.to_json(), serde_json::json!(33));
    }

    #[test]
    fn string_concatenation_renders_scalars() {
        let joined = binary(
            BinaryOp::Add,
            &Value::String("n=".to_owned()),
            &Value::Int(4),
        );
        assert_eq!(joined, Ok(Value::String("n=4".to_owned())));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let error = binary(BinaryOp::Divide, &Value::Int(1), &Value::Int(0))
            .expect_err("division by zero");
        assert_eq!(error, "division by zero");
    }

    #[test]
    fn comparisons_cross_numeric_types() {
        assert_eq!(
            binary(BinaryOp::Less, &Value::Int(1), &Value::Float(1.5)),
            Ok(Value::Bool(true))
        );
    }

    #[test]
    fn comparing_unrelated_types_fails() {
        let error = binary(
            BinaryOp::Greater,
            &Value::String("a".to_owned()),
            &Value::Int(1),
        )
        .expect_err("strings and numbers do not order");
        assert!(error.contains("cannot compare"));
    }

    #[test]
    fn negation_handles_overflow() {
        assert_eq!(negate(&Value::Int(5)), Ok(Value::Int(-5)));
        assert!(matches!(negate(&Value::Int(i64::MIN)), Ok(Value::Float(_))));
        assert!(negate(&Value::Bool(true)).is_err());
    }
}
