//! Operator semantics on already-evaluated values.
//!
//! `&&` / `||` are not here: they short-circuit, so the interpreter handles
//! them before the right operand is evaluated.

use std::cmp::Ordering;

use crate::ast::{BinaryOp, UnaryOp};
use crate::error::{ErrorKind, RuntimeError};
use crate::value::Value;

pub fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(left == right)),
        BinaryOp::NotEq => Ok(Value::Bool(left != right)),
        BinaryOp::Add => add(left, right),
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => arithmetic(op, left, right),
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::LtEq | BinaryOp::GtEq => compare(op, left, right),
        BinaryOp::And => Ok(if left.is_truthy() { right.clone() } else { left.clone() }),
        BinaryOp::Or => Ok(if left.is_truthy() { left.clone() } else { right.clone() }),
    }
}

pub fn unary(op: UnaryOp, operand: &Value) -> Result<Value, RuntimeError> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!operand.is_truthy())),
        UnaryOp::Negate => match operand {
            Value::Number(n) => Ok(Value::Number(-n)),
            other => Err(RuntimeError::type_mismatch(format!(
                "Cannot negate a {}",
                other.type_name()
            ))),
        },
    }
}

fn add(left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
        (Value::String(_), _) | (_, Value::String(_)) => {
            Ok(Value::String(format!("{}{}", left.as_string(), right.as_string())))
        }
        _ => Err(operand_mismatch(BinaryOp::Add, left, right)),
    }
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    let (a, b) = match (left, right) {
        (Value::Number(a), Value::Number(b)) => (*a, *b),
        _ => return Err(operand_mismatch(op, left, right)),
    };
    let result = match op {
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div | BinaryOp::Mod if b == 0.0 => {
            return Err(RuntimeError::new(ErrorKind::DivisionByZero, "Division by zero"));
        }
        BinaryOp::Div => a / b,
        BinaryOp::Mod => a % b,
        _ => return Err(operand_mismatch(op, left, right)),
    };
    Ok(Value::Number(result))
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    let ordering = match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => return Err(operand_mismatch(op, left, right)),
    };
    // NaN compares false against everything
    let Some(ordering) = ordering else {
        return Ok(Value::Bool(false));
    };
    let result = match op {
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::Gt => ordering == Ordering::Greater,
        BinaryOp::LtEq => ordering != Ordering::Greater,
        BinaryOp::GtEq => ordering != Ordering::Less,
        _ => return Err(operand_mismatch(op, left, right)),
    };
    Ok(Value::Bool(result))
}

fn operand_mismatch(op: BinaryOp, left: &Value, right: &Value) -> RuntimeError {
    RuntimeError::type_mismatch(format!(
        "Cannot apply '{}' to {} and {}",
        op.symbol(),
        left.type_name(),
        right.type_name()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> Value {
        Value::Number(n)
    }

    #[test]
    fn test_add_numbers_and_strings() {
        assert_eq!(binary(BinaryOp::Add, &num(2.0), &num(3.0)).unwrap(), num(5.0));
        assert_eq!(
            binary(BinaryOp::Add, &Value::from("n="), &num(3.0)).unwrap(),
            Value::from("n=3")
        );
        assert_eq!(
            binary(BinaryOp::Add, &Value::Bool(true), &Value::from("!")).unwrap(),
            Value::from("true!")
        );
        assert_eq!(
            binary(BinaryOp::Add, &Value::from("x"), &Value::Null).unwrap(),
            Value::from("x")
        );
    }

    #[test]
    fn test_add_type_mismatch() {
        let err = binary(BinaryOp::Add, &num(1.0), &Value::Bool(true)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_division_by_zero() {
        let err = binary(BinaryOp::Div, &num(1.0), &num(0.0)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DivisionByZero);
        let err = binary(BinaryOp::Mod, &num(1.0), &num(0.0)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DivisionByZero);
    }

    #[test]
    fn test_arithmetic_requires_numbers() {
        let err = binary(BinaryOp::Mul, &Value::from("2"), &num(2.0)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
        assert_eq!(binary(BinaryOp::Mod, &num(7.0), &num(3.0)).unwrap(), num(1.0));
    }

    #[test]
    fn test_strict_equality() {
        assert_eq!(binary(BinaryOp::Eq, &Value::from("5"), &num(5.0)).unwrap(), Value::Bool(false));
        assert_eq!(binary(BinaryOp::Eq, &num(5.0), &num(5.0)).unwrap(), Value::Bool(true));
        assert_eq!(binary(BinaryOp::NotEq, &Value::Null, &Value::Bool(false)).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(binary(BinaryOp::Lt, &num(1.0), &num(2.0)).unwrap(), Value::Bool(true));
        assert_eq!(binary(BinaryOp::GtEq, &num(2.0), &num(2.0)).unwrap(), Value::Bool(true));
        assert_eq!(
            binary(BinaryOp::Lt, &Value::from("apple"), &Value::from("banana")).unwrap(),
            Value::Bool(true)
        );
        assert!(binary(BinaryOp::Lt, &num(1.0), &Value::from("2")).is_err());
        assert_eq!(binary(BinaryOp::Lt, &num(f64::NAN), &num(1.0)).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_logical_returns_deciding_operand() {
        assert_eq!(binary(BinaryOp::Or, &Value::Null, &Value::from("d")).unwrap(), Value::from("d"));
        assert_eq!(binary(BinaryOp::And, &num(0.0), &num(9.0)).unwrap(), num(0.0));
    }

    #[test]
    fn test_unary() {
        assert_eq!(unary(UnaryOp::Negate, &num(4.0)).unwrap(), num(-4.0));
        assert!(unary(UnaryOp::Negate, &Value::from("4")).is_err());
        assert_eq!(unary(UnaryOp::Not, &Value::from("")).unwrap(), Value::Bool(true));
    }
}
