//! Fixed operator table: arithmetic, bitwise, comparison, membership, identity.

use super::ast::{BinaryOp, CompareOp, UnaryOp};
use super::evaluator::EvalError;
use super::value::{dict_get, Num, Value};
use std::cmp::Ordering;

/// Longest string or sequence a repetition or concatenation may produce
pub const MAX_SEQUENCE_LEN: usize = 100_000;
/// Largest integer exponent accepted by `**`
pub const MAX_INT_EXPONENT: i64 = 64;

fn type_error(op: &str, left: &Value, right: &Value) -> EvalError {
    EvalError::Expression(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op,
        left.type_name(),
        right.type_name()
    ))
}

fn overflow() -> EvalError {
    EvalError::Expression("integer overflow".to_string())
}

fn zero_division() -> EvalError {
    EvalError::Expression("division by zero".to_string())
}

/// Reject results holding more than [`MAX_SEQUENCE_LEN`] elements in total
pub fn check_len(len: usize) -> Result<(), EvalError> {
    if len > MAX_SEQUENCE_LEN {
        return Err(EvalError::Expression(format!(
            "result too large ({} > {} elements)",
            len, MAX_SEQUENCE_LEN
        )));
    }
    Ok(())
}

/// Apply a unary operator
pub fn unary(op: UnaryOp, operand: &Value) -> Result<Value, EvalError> {
    let bad = || {
        let symbol = match op {
            UnaryOp::Neg => "-",
            UnaryOp::Pos => "+",
            UnaryOp::Invert => "~",
            UnaryOp::Not => "not",
        };
        EvalError::Expression(format!(
            "bad operand type for unary {}: '{}'",
            symbol,
            operand.type_name()
        ))
    };
    match op {
        UnaryOp::Not => Ok(Value::Bool(!operand.truthy())),
        UnaryOp::Neg => match operand.as_num().ok_or_else(bad)? {
            Num::Int(i) => i.checked_neg().map(Value::Int).ok_or_else(overflow),
            Num::Float(f) => Ok(Value::Float(-f)),
        },
        UnaryOp::Pos => match operand.as_num().ok_or_else(bad)? {
            Num::Int(i) => Ok(Value::Int(i)),
            Num::Float(f) => Ok(Value::Float(f)),
        },
        UnaryOp::Invert => operand.as_int().map(|i| Value::Int(!i)).ok_or_else(bad),
    }
}

/// Apply a binary arithmetic or bitwise operator
pub fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    match op {
        BinaryOp::Add => add(left, right),
        BinaryOp::Sub => match (left, right) {
            (Value::Set(a), Value::Set(b)) => Ok(Value::Set(
                a.iter().filter(|x| !b.iter().any(|y| y.loose_eq(x))).cloned().collect(),
            )),
            _ => arith(op, left, right),
        },
        BinaryOp::Mul => mul(left, right),
        BinaryOp::Div => {
            let (a, b) = numbers(op, left, right)?;
            if b.as_f64() == 0.0 {
                return Err(zero_division());
            }
            Ok(Value::Float(a.as_f64() / b.as_f64()))
        }
        BinaryOp::FloorDiv | BinaryOp::Mod | BinaryOp::Pow => arith(op, left, right),
        BinaryOp::LShift | BinaryOp::RShift => shift(op, left, right),
        BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor => bitwise(op, left, right),
    }
}

fn numbers(op: BinaryOp, left: &Value, right: &Value) -> Result<(Num, Num), EvalError> {
    match (left.as_num(), right.as_num()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(type_error(op.symbol(), left, right)),
    }
}

fn add(left: &Value, right: &Value) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => {
            check_len(a.chars().count() + b.chars().count())?;
            Ok(Value::Str(format!("{}{}", a, b)))
        }
        (Value::List(a), Value::List(b)) => {
            check_len(left.size().saturating_add(right.size()))?;
            Ok(Value::List(a.iter().chain(b).cloned().collect()))
        }
        (Value::Tuple(a), Value::Tuple(b)) => {
            check_len(left.size().saturating_add(right.size()))?;
            Ok(Value::Tuple(a.iter().chain(b).cloned().collect()))
        }
        _ => arith(BinaryOp::Add, left, right),
    }
}

fn repeat(seq: &Value, count: i64) -> Result<Value, EvalError> {
    let count = count.max(0) as usize;
    match seq {
        Value::Str(s) => {
            check_len(s.chars().count().saturating_mul(count))?;
            Ok(Value::Str(s.repeat(count)))
        }
        Value::List(items) | Value::Tuple(items) => {
            // nested elements are cloned too, so bound the deep size
            check_len(seq.size().saturating_mul(count))?;
            let out: Vec<Value> = std::iter::repeat(items.iter())
                .take(count)
                .flatten()
                .cloned()
                .collect();
            Ok(match seq {
                Value::Tuple(_) => Value::Tuple(out),
                _ => Value::List(out),
            })
        }
        _ => Err(EvalError::Expression(format!(
            "can't multiply sequence of type '{}'",
            seq.type_name()
        ))),
    }
}

fn mul(left: &Value, right: &Value) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::Str(_) | Value::List(_) | Value::Tuple(_), n) if n.as_int().is_some() => {
            repeat(left, n.as_int().unwrap_or(0))
        }
        (n, Value::Str(_) | Value::List(_) | Value::Tuple(_)) if n.as_int().is_some() => {
            repeat(right, n.as_int().unwrap_or(0))
        }
        _ => arith(BinaryOp::Mul, left, right),
    }
}

fn floor_div_int(a: i64, b: i64) -> Result<i64, EvalError> {
    if b == 0 {
        return Err(zero_division());
    }
    let q = a.checked_div(b).ok_or_else(overflow)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        Ok(q - 1)
    } else {
        Ok(q)
    }
}

fn mod_int(a: i64, b: i64) -> Result<i64, EvalError> {
    if b == 0 {
        return Err(zero_division());
    }
    let r = a.checked_rem(b).unwrap_or(0);
    if r != 0 && ((r < 0) != (b < 0)) {
        Ok(r + b)
    } else {
        Ok(r)
    }
}

fn mod_float(a: f64, b: f64) -> Result<f64, EvalError> {
    if b == 0.0 {
        return Err(zero_division());
    }
    let r = a % b;
    if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
        Ok(r + b)
    } else {
        Ok(r)
    }
}

fn int_pow(base: i64, exp: i64) -> Result<Value, EvalError> {
    if exp < 0 {
        if base == 0 {
            return Err(zero_division());
        }
        return Ok(Value::Float((base as f64).powf(exp as f64)));
    }
    if exp > MAX_INT_EXPONENT {
        return Err(EvalError::Expression(format!(
            "exponent too large ({} > {})",
            exp, MAX_INT_EXPONENT
        )));
    }
    base.checked_pow(exp as u32).map(Value::Int).ok_or_else(overflow)
}

fn arith(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    let (a, b) = numbers(op, left, right)?;
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => match op {
            BinaryOp::Add => x.checked_add(y).map(Value::Int).ok_or_else(overflow),
            BinaryOp::Sub => x.checked_sub(y).map(Value::Int).ok_or_else(overflow),
            BinaryOp::Mul => x.checked_mul(y).map(Value::Int).ok_or_else(overflow),
            BinaryOp::FloorDiv => floor_div_int(x, y).map(Value::Int),
            BinaryOp::Mod => mod_int(x, y).map(Value::Int),
            BinaryOp::Pow => int_pow(x, y),
            _ => Err(type_error(op.symbol(), left, right)),
        },
        _ => {
            let (x, y) = (a.as_f64(), b.as_f64());
            match op {
                BinaryOp::Add => Ok(Value::Float(x + y)),
                BinaryOp::Sub => Ok(Value::Float(x - y)),
                BinaryOp::Mul => Ok(Value::Float(x * y)),
                BinaryOp::FloorDiv => {
                    if y == 0.0 {
                        return Err(zero_division());
                    }
                    Ok(Value::Float((x / y).floor()))
                }
                BinaryOp::Mod => mod_float(x, y).map(Value::Float),
                BinaryOp::Pow => {
                    if x == 0.0 && y < 0.0 {
                        return Err(zero_division());
                    }
                    Ok(Value::Float(x.powf(y)))
                }
                _ => Err(type_error(op.symbol(), left, right)),
            }
        }
    }
}

fn shift(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    let (Some(a), Some(n)) = (left.as_int(), right.as_int()) else {
        return Err(type_error(op.symbol(), left, right));
    };
    if n < 0 {
        return Err(EvalError::Expression("negative shift count".to_string()));
    }
    match op {
        BinaryOp::LShift => {
            if a == 0 {
                return Ok(Value::Int(0));
            }
            if n >= 63 {
                return Err(overflow());
            }
            let shifted = a << n;
            if shifted >> n != a {
                return Err(overflow());
            }
            Ok(Value::Int(shifted))
        }
        _ => Ok(Value::Int(if n >= 64 {
            if a < 0 {
                -1
            } else {
                0
            }
        } else {
            a >> n
        })),
    }
}

fn bitwise(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(match op {
            BinaryOp::BitAnd => a & b,
            BinaryOp::BitOr => a | b,
            _ => a ^ b,
        })),
        (Value::Set(a), Value::Set(b)) => {
            let contains = |set: &Vec<Value>, x: &Value| set.iter().any(|y| y.loose_eq(x));
            let out: Vec<Value> = match op {
                BinaryOp::BitAnd => a.iter().filter(|x| contains(b, x)).cloned().collect(),
                BinaryOp::BitOr => a
                    .iter()
                    .cloned()
                    .chain(b.iter().filter(|x| !contains(a, x)).cloned())
                    .collect(),
                _ => a
                    .iter()
                    .filter(|x| !contains(b, x))
                    .chain(b.iter().filter(|x| !contains(a, x)))
                    .cloned()
                    .collect(),
            };
            Ok(Value::Set(out))
        }
        _ => match (left.as_int(), right.as_int()) {
            (Some(a), Some(b)) => Ok(Value::Int(match op {
                BinaryOp::BitAnd => a & b,
                BinaryOp::BitOr => a | b,
                _ => a ^ b,
            })),
            _ => Err(type_error(op.symbol(), left, right)),
        },
    }
}

/// Ordering between two values. `None` means unordered (NaN involved).
pub fn order(left: &Value, right: &Value, op: &str) -> Result<Option<Ordering>, EvalError> {
    if let (Some(a), Some(b)) = (left.as_num(), right.as_num()) {
        return Ok(match (a, b) {
            (Num::Int(x), Num::Int(y)) => Some(x.cmp(&y)),
            _ => a.as_f64().partial_cmp(&b.as_f64()),
        });
    }
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Ok(Some(a.cmp(b))),
        (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => {
            for (x, y) in a.iter().zip(b) {
                if !x.loose_eq(y) {
                    return order(x, y, op);
                }
            }
            Ok(Some(a.len().cmp(&b.len())))
        }
        _ => Err(EvalError::Expression(format!(
            "'{}' not supported between instances of '{}' and '{}'",
            op,
            left.type_name(),
            right.type_name()
        ))),
    }
}

/// Membership test: `item in container`
pub fn contains(container: &Value, item: &Value) -> Result<bool, EvalError> {
    match container {
        Value::Str(haystack) => match item {
            Value::Str(needle) => Ok(haystack.contains(needle.as_str())),
            other => Err(EvalError::Expression(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::List(items) | Value::Tuple(items) | Value::Set(items) => {
            Ok(items.iter().any(|x| x.loose_eq(item)))
        }
        Value::Dict(entries) => Ok(dict_get(entries, item).is_some()),
        other => Err(EvalError::Expression(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

/// Identity for immutable values: same variant and equal
fn identical(left: &Value, right: &Value) -> bool {
    std::mem::discriminant(left) == std::mem::discriminant(right) && left.loose_eq(right)
}

/// Evaluate one link of a comparison chain
pub fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool, EvalError> {
    let ordered = |accept: fn(Ordering) -> bool| -> Result<bool, EvalError> {
        Ok(order(left, right, op.symbol())?.map(accept).unwrap_or(false))
    };
    match op {
        CompareOp::Eq => Ok(left.loose_eq(right)),
        CompareOp::NotEq => Ok(!left.loose_eq(right)),
        CompareOp::Lt => ordered(|o| o == Ordering::Less),
        CompareOp::LtE => ordered(|o| o != Ordering::Greater),
        CompareOp::Gt => ordered(|o| o == Ordering::Greater),
        CompareOp::GtE => ordered(|o| o != Ordering::Less),
        CompareOp::In => contains(right, left),
        CompareOp::NotIn => contains(right, left).map(|found| !found),
        CompareOp::Is => Ok(identical(left, right)),
        CompareOp::IsNot => Ok(!identical(left, right)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(i: i64) -> Value {
        Value::Int(i)
    }

    #[test]
    fn test_floor_semantics() {
        assert_eq!(binary(BinaryOp::FloorDiv, &int(-7), &int(2)).unwrap(), int(-4));
        assert_eq!(binary(BinaryOp::Mod, &int(-7), &int(2)).unwrap(), int(1));
        assert_eq!(binary(BinaryOp::Mod, &int(7), &int(-2)).unwrap(), int(-1));
        assert_eq!(
            binary(BinaryOp::Div, &int(7), &int(2)).unwrap(),
            Value::Float(3.5)
        );
    }

    #[test]
    fn test_division_by_zero() {
        for op in [BinaryOp::Div, BinaryOp::FloorDiv, BinaryOp::Mod] {
            let err = binary(op, &int(1), &int(0)).unwrap_err();
            assert!(matches!(err, EvalError::Expression(_)));
        }
    }

    #[test]
    fn test_checked_integer_arithmetic() {
        assert!(binary(BinaryOp::Add, &int(i64::MAX), &int(1)).is_err());
        assert!(binary(BinaryOp::Pow, &int(2), &int(65)).is_err());
        assert_eq!(binary(BinaryOp::Pow, &int(2), &int(10)).unwrap(), int(1024));
        assert_eq!(
            binary(BinaryOp::Pow, &int(2), &int(-1)).unwrap(),
            Value::Float(0.5)
        );
    }

    #[test]
    fn test_repetition_is_bounded() {
        let s = Value::Str("ab".into());
        assert_eq!(
            binary(BinaryOp::Mul, &s, &int(3)).unwrap(),
            Value::Str("ababab".into())
        );
        assert!(binary(BinaryOp::Mul, &s, &int(1_000_000)).is_err());
    }

    #[test]
    fn test_nested_repetition_counts_inner_elements() {
        let inner = binary(BinaryOp::Mul, &Value::List(vec![int(0)]), &int(1000)).unwrap();
        let outer = Value::List(vec![inner]);
        assert!(binary(BinaryOp::Mul, &outer, &int(10_000)).is_err());
        assert!(binary(BinaryOp::Mul, &int(10_000), &outer).is_err());

        let small = binary(BinaryOp::Mul, &outer, &int(50)).unwrap();
        assert_eq!(small.size(), 50 * 1001);
        assert!(binary(BinaryOp::Add, &small, &small).is_err());
    }

    #[test]
    fn test_mixed_type_errors() {
        let err = binary(BinaryOp::Add, &Value::Str("a".into()), &int(1)).unwrap_err();
        assert!(err.to_string().contains("unsupported operand"));
        assert!(compare(CompareOp::Lt, &Value::Str("a".into()), &int(1)).is_err());
    }

    #[test]
    fn test_comparisons() {
        assert!(compare(CompareOp::Eq, &int(1), &Value::Float(1.0)).unwrap());
        assert!(compare(CompareOp::Lt, &int(1), &Value::Float(1.5)).unwrap());
        assert!(!compare(CompareOp::Lt, &Value::Float(f64::NAN), &int(1)).unwrap());
        assert!(compare(
            CompareOp::In,
            &Value::Str("ell".into()),
            &Value::Str("hello".into())
        )
        .unwrap());
        assert!(compare(CompareOp::NotIn, &int(3), &Value::List(vec![int(1), int(2)])).unwrap());
        assert!(compare(CompareOp::Is, &Value::None, &Value::None).unwrap());
        assert!(!compare(CompareOp::Is, &int(1), &Value::Float(1.0)).unwrap());
    }

    #[test]
    fn test_set_operators() {
        let a = Value::Set(vec![int(1), int(2)]);
        let b = Value::Set(vec![int(2), int(3)]);
        assert_eq!(
            binary(BinaryOp::BitAnd, &a, &b).unwrap(),
            Value::Set(vec![int(2)])
        );
        assert_eq!(
            binary(BinaryOp::BitOr, &a, &b).unwrap(),
            Value::Set(vec![int(1), int(2), int(3)])
        );
        assert_eq!(binary(BinaryOp::Sub, &a, &b).unwrap(), Value::Set(vec![int(1)]));
    }
}
