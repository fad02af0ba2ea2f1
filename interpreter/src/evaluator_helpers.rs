use std::cmp::Ordering;

use pdstemplate::expression::{BinaryOperator, UnaryOperator};

use crate::error::RuntimeError;
use crate::runtime_value::RuntimeValue;

pub fn unary_operation(operator: UnaryOperator, operand: RuntimeValue) -> Result<RuntimeValue, RuntimeError> {
    match operator {
        UnaryOperator::LogicalNot => Ok(RuntimeValue::Boolean(!operand.is_truthy())),
        UnaryOperator::Negation => match operand {
            RuntimeValue::Float(n) => Ok(RuntimeValue::Float(-n)),
            other => match other.as_i64() {
                Some(n) => n.checked_neg().map(RuntimeValue::Integer).ok_or_else(overflow),
                None => Err(bad_operand("-", &other)),
            },
        },
        UnaryOperator::Identity => match operand {
            RuntimeValue::Float(n) => Ok(RuntimeValue::Float(n)),
            other => match other.as_i64() {
                Some(n) => Ok(RuntimeValue::Integer(n)),
                None => Err(bad_operand("+", &other)),
            },
        },
    }
}

pub fn binary_operation(
    operator: BinaryOperator,
    left: &RuntimeValue,
    right: &RuntimeValue,
) -> Result<RuntimeValue, RuntimeError> {
    match operator {
        BinaryOperator::Addition => match (left, right) {
            (RuntimeValue::String(a), RuntimeValue::String(b)) => Ok(RuntimeValue::String(format!("{a}{b}"))),
            (RuntimeValue::List(a), RuntimeValue::List(b)) => {
                Ok(RuntimeValue::List(a.iter().chain(b).cloned().collect()))
            }
            _ => arithmetic(operator, left, right),
        },
        BinaryOperator::Multiplication => match (left, right) {
            (RuntimeValue::String(s), count) | (count, RuntimeValue::String(s)) if count.as_i64().is_some() => {
                let count = repeat_count(s.len(), count)?;
                Ok(RuntimeValue::String(s.repeat(count)))
            }
            (RuntimeValue::List(items), count) | (count, RuntimeValue::List(items)) if count.as_i64().is_some() => {
                let count = repeat_count(items.len(), count)?;
                Ok(RuntimeValue::List(
                    std::iter::repeat_n(items.iter().cloned(), count).flatten().collect(),
                ))
            }
            _ => arithmetic(operator, left, right),
        },
        BinaryOperator::Subtraction
        | BinaryOperator::Division
        | BinaryOperator::FloorDivision
        | BinaryOperator::Modulo => arithmetic(operator, left, right),

        BinaryOperator::Equality => Ok(RuntimeValue::Boolean(left == right)),
        BinaryOperator::Inequality => Ok(RuntimeValue::Boolean(left != right)),
        BinaryOperator::GreaterThan => ordered(operator, left, right, Ordering::is_gt),
        BinaryOperator::LessThan => ordered(operator, left, right, Ordering::is_lt),
        BinaryOperator::GreaterThanOrEqual => ordered(operator, left, right, Ordering::is_ge),
        BinaryOperator::LessThanOrEqual => ordered(operator, left, right, Ordering::is_le),

        BinaryOperator::Membership => contains(right, left).map(RuntimeValue::Boolean),
        BinaryOperator::NonMembership => contains(right, left).map(|found| RuntimeValue::Boolean(!found)),
    }
}

/// Order two values. `None` means unordered (a NaN was involved).
pub fn compare(
    operator: BinaryOperator,
    left: &RuntimeValue,
    right: &RuntimeValue,
) -> Result<Option<Ordering>, RuntimeError> {
    match (left, right) {
        (RuntimeValue::String(a), RuntimeValue::String(b)) => Ok(Some(a.cmp(b))),
        (RuntimeValue::List(a), RuntimeValue::List(b)) => {
            for (x, y) in a.iter().zip(b) {
                if x != y {
                    return compare(operator, x, y);
                }
            }
            Ok(Some(a.len().cmp(&b.len())))
        }
        _ => match (left.as_i64(), right.as_i64()) {
            (Some(a), Some(b)) => Ok(Some(a.cmp(&b))),
            _ => match (left.as_f64(), right.as_f64()) {
                (Some(a), Some(b)) => Ok(a.partial_cmp(&b)),
                _ => Err(RuntimeError::TypeError(format!(
                    "'{}' not supported between instances of '{}' and '{}'",
                    symbol(operator),
                    left.type_name(),
                    right.type_name()
                ))),
            },
        },
    }
}

fn ordered(
    operator: BinaryOperator,
    left: &RuntimeValue,
    right: &RuntimeValue,
    test: fn(Ordering) -> bool,
) -> Result<RuntimeValue, RuntimeError> {
    let ordering = compare(operator, left, right)?;
    Ok(RuntimeValue::Boolean(ordering.is_some_and(test)))
}

fn contains(container: &RuntimeValue, item: &RuntimeValue) -> Result<bool, RuntimeError> {
    match (container, item) {
        (RuntimeValue::String(haystack), RuntimeValue::String(needle)) => Ok(haystack.contains(needle.as_str())),
        (RuntimeValue::String(_), other) => Err(RuntimeError::TypeError(format!(
            "'in <string>' requires string as left operand, not {}",
            other.type_name()
        ))),
        (RuntimeValue::List(items), item) => Ok(items.contains(item)),
        (other, _) => Err(RuntimeError::TypeError(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

// ---------------------------------------------------------------------------
// Arithmetic
// ---------------------------------------------------------------------------

fn arithmetic(
    operator: BinaryOperator,
    left: &RuntimeValue,
    right: &RuntimeValue,
) -> Result<RuntimeValue, RuntimeError> {
    if let (Some(a), Some(b)) = (left.as_i64(), right.as_i64()) {
        return integer_arithmetic(operator, a, b);
    }
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => float_arithmetic(operator, a, b).map(RuntimeValue::Float),
        _ => Err(RuntimeError::TypeError(format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            symbol(operator),
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn integer_arithmetic(operator: BinaryOperator, a: i64, b: i64) -> Result<RuntimeValue, RuntimeError> {
    let result = match operator {
        BinaryOperator::Addition => a.checked_add(b),
        BinaryOperator::Subtraction => a.checked_sub(b),
        BinaryOperator::Multiplication => a.checked_mul(b),
        BinaryOperator::Division => {
            if b == 0 {
                return Err(RuntimeError::ZeroDivisionError("division by zero".into()));
            }
            return Ok(RuntimeValue::Float(a as f64 / b as f64));
        }
        BinaryOperator::FloorDivision | BinaryOperator::Modulo if b == 0 => {
            return Err(RuntimeError::ZeroDivisionError(
                "integer division or modulo by zero".into(),
            ));
        }
        // Python rounds the quotient toward negative infinity and gives the
        // remainder the sign of the divisor
        BinaryOperator::FloorDivision => a.checked_div(b).map(|q| {
            if a % b != 0 && (a < 0) != (b < 0) { q - 1 } else { q }
        }),
        BinaryOperator::Modulo => a.checked_rem(b).map(|r| {
            if r != 0 && (r < 0) != (b < 0) { r + b } else { r }
        }),
        _ => None,
    };
    result.map(RuntimeValue::Integer).ok_or_else(overflow)
}

fn float_arithmetic(operator: BinaryOperator, a: f64, b: f64) -> Result<f64, RuntimeError> {
    let divisor_is_zero = b == 0.0;
    match operator {
        BinaryOperator::Addition => Ok(a + b),
        BinaryOperator::Subtraction => Ok(a - b),
        BinaryOperator::Multiplication => Ok(a * b),
        BinaryOperator::Division if divisor_is_zero => {
            Err(RuntimeError::ZeroDivisionError("float division by zero".into()))
        }
        BinaryOperator::Division => Ok(a / b),
        BinaryOperator::FloorDivision if divisor_is_zero => {
            Err(RuntimeError::ZeroDivisionError("float floor division by zero".into()))
        }
        BinaryOperator::FloorDivision => Ok((a / b).floor()),
        BinaryOperator::Modulo if divisor_is_zero => {
            Err(RuntimeError::ZeroDivisionError("float modulo".into()))
        }
        BinaryOperator::Modulo => {
            let r = a % b;
            Ok(if r != 0.0 && (r < 0.0) != (b < 0.0) { r + b } else { r })
        }
        _ => Err(RuntimeError::TypeError(format!(
            "unsupported operand type(s) for {}: 'float' and 'float'",
            symbol(operator)
        ))),
    }
}

/// Longest string or list a template expression may build.
pub const MAX_SEQUENCE_LEN: usize = 1 << 24;

/// Checks that repeating a sequence of `len` elements stays under [`MAX_SEQUENCE_LEN`].
fn repeat_count(len: usize, count: &RuntimeValue) -> Result<usize, RuntimeError> {
    let count = usize::try_from(count.as_i64().unwrap_or(0).max(0)).map_err(|_| overflow())?;
    match len.checked_mul(count) {
        Some(total) if total <= MAX_SEQUENCE_LEN => Ok(count),
        _ => Err(RuntimeError::OverflowError("repeated sequence is too long".into())),
    }
}

fn overflow() -> RuntimeError {
    RuntimeError::OverflowError("integer overflow".into())
}

fn bad_operand(symbol: &str, operand: &RuntimeValue) -> RuntimeError {
    RuntimeError::TypeError(format!(
        "bad operand type for unary {symbol}: '{}'",
        operand.type_name()
    ))
}

fn symbol(operator: BinaryOperator) -> &'static str {
    match operator {
        BinaryOperator::Addition => "+",
        BinaryOperator::Subtraction => "-",
        BinaryOperator::Multiplication => "*",
        BinaryOperator::Division => "/",
        BinaryOperator::FloorDivision => "//",
        BinaryOperator::Modulo => "%",
        BinaryOperator::Equality => "==",
        BinaryOperator::Inequality => "!=",
        BinaryOperator::GreaterThan => ">",
        BinaryOperator::LessThan => "<",
        BinaryOperator::GreaterThanOrEqual => ">=",
        BinaryOperator::LessThanOrEqual => "<=",
        BinaryOperator::Membership => "in",
        BinaryOperator::NonMembership => "not in",
    }
}

// ---------------------------------------------------------------------------
// Indexing and methods
// ---------------------------------------------------------------------------

pub fn index(value: &RuntimeValue, index: &RuntimeValue) -> Result<RuntimeValue, RuntimeError> {
    let len = match value {
        RuntimeValue::List(items) => items.len(),
        RuntimeValue::String(s) => s.chars().count(),
        other => {
            return Err(RuntimeError::TypeError(format!(
                "'{}' object is not subscriptable",
                other.type_name()
            )));
        }
    };
    let Some(position) = index.as_i64() else {
        return Err(RuntimeError::TypeError(format!(
            "{} indices must be integers, not {}",
            value.type_name(),
            index.type_name()
        )));
    };

    let resolved = if position < 0 { position + len as i64 } else { position };
    let out_of_range = || RuntimeError::IndexError(format!("{} index out of range", value.type_name()));
    let resolved = usize::try_from(resolved).map_err(|_| out_of_range())?;

    match value {
        RuntimeValue::List(items) => items.get(resolved).cloned().ok_or_else(out_of_range),
        RuntimeValue::String(s) => s
            .chars()
            .nth(resolved)
            .map(|c| RuntimeValue::String(c.to_string()))
            .ok_or_else(out_of_range),
        _ => Err(out_of_range()),
    }
}

/// The string methods available as `value.method(...)`.
pub fn call_method(
    receiver: &RuntimeValue,
    method: &str,
    arguments: &[RuntimeValue],
) -> Result<RuntimeValue, RuntimeError> {
    let RuntimeValue::String(s) = receiver else {
        return Err(no_attribute(receiver, method));
    };

    let text_argument = |position: usize| -> Result<&str, RuntimeError> {
        match arguments.get(position) {
            Some(RuntimeValue::String(arg)) => Ok(arg),
            Some(other) => Err(RuntimeError::TypeError(format!(
                "{method}() argument {} must be str, not {}",
                position + 1,
                other.type_name()
            ))),
            None => Err(RuntimeError::TypeError(format!(
                "{method}() missing argument {}",
                position + 1
            ))),
        }
    };
    let expect_arguments = |count: usize| -> Result<(), RuntimeError> {
        if arguments.len() == count {
            Ok(())
        } else {
            Err(RuntimeError::TypeError(format!(
                "{method}() takes exactly {count} argument(s) ({} given)",
                arguments.len()
            )))
        }
    };

    let result = match method {
        "upper" => {
            expect_arguments(0)?;
            RuntimeValue::String(s.to_uppercase())
        }
        "lower" => {
            expect_arguments(0)?;
            RuntimeValue::String(s.to_lowercase())
        }
        "strip" => {
            expect_arguments(0)?;
            RuntimeValue::String(s.trim().to_string())
        }
        "startswith" => {
            expect_arguments(1)?;
            RuntimeValue::Boolean(s.starts_with(text_argument(0)?))
        }
        "endswith" => {
            expect_arguments(1)?;
            RuntimeValue::Boolean(s.ends_with(text_argument(0)?))
        }
        "replace" => {
            expect_arguments(2)?;
            RuntimeValue::String(s.replace(text_argument(0)?, text_argument(1)?))
        }
        _ => return Err(no_attribute(receiver, method)),
    };
    Ok(result)
}

fn no_attribute(receiver: &RuntimeValue, method: &str) -> RuntimeError {
    RuntimeError::AttributeError(format!(
        "'{}' object has no attribute '{method}'",
        receiver.type_name()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn int(n: i64) -> RuntimeValue {
        RuntimeValue::Integer(n)
    }

    #[rstest]
    #[case(BinaryOperator::FloorDivision, -7, 2, -4)]
    #[case(BinaryOperator::FloorDivision, 7, -2, -4)]
    #[case(BinaryOperator::FloorDivision, 7, 2, 3)]
    #[case(BinaryOperator::Modulo, -7, 2, 1)]
    #[case(BinaryOperator::Modulo, 7, -2, -1)]
    #[case(BinaryOperator::Modulo, 6, 3, 0)]
    fn integer_division_rounds_down(
        #[case] operator: BinaryOperator,
        #[case] a: i64,
        #[case] b: i64,
        #[case] expected: i64,
    ) {
        assert_eq!(binary_operation(operator, &int(a), &int(b)).unwrap(), int(expected));
    }

    #[test]
    fn true_division_always_gives_float() {
        let result = binary_operation(BinaryOperator::Division, &int(6), &int(3)).unwrap();
        assert!(matches!(result, RuntimeValue::Float(n) if n == 2.0));
    }

    #[test]
    fn division_by_zero() {
        let err = binary_operation(BinaryOperator::Division, &int(1), &int(0)).unwrap_err();
        assert_eq!(err.kind(), "ZeroDivisionError");
        let err = binary_operation(BinaryOperator::Modulo, &RuntimeValue::Float(1.0), &int(0)).unwrap_err();
        assert_eq!(err.kind(), "ZeroDivisionError");
    }

    #[test]
    fn overflow_is_reported() {
        let err = binary_operation(BinaryOperator::Addition, &int(i64::MAX), &int(1)).unwrap_err();
        assert_eq!(err.kind(), "OverflowError");
    }

    #[test]
    fn repetition_copies_lists_and_strings() {
        let list = RuntimeValue::from(vec![1, 2]);
        assert_eq!(
            binary_operation(BinaryOperator::Multiplication, &list, &int(2)).unwrap(),
            RuntimeValue::from(vec![1, 2, 1, 2])
        );
        assert_eq!(
            binary_operation(BinaryOperator::Multiplication, &int(-1), &list).unwrap(),
            RuntimeValue::from(Vec::<i64>::new())
        );
        assert_eq!(
            binary_operation(BinaryOperator::Multiplication, &RuntimeValue::from("ab"), &int(3)).unwrap(),
            RuntimeValue::from("ababab")
        );
    }

    #[test]
    fn oversized_repetition_is_an_overflow() {
        let err = binary_operation(BinaryOperator::Multiplication, &RuntimeValue::from("xy"), &int(i64::MAX))
            .unwrap_err();
        assert_eq!(err.kind(), "OverflowError");
        let err = binary_operation(BinaryOperator::Multiplication, &int(1 << 40), &RuntimeValue::from(vec![0]))
            .unwrap_err();
        assert_eq!(err.kind(), "OverflowError");
    }

    #[test]
    fn mixed_types() {
        let sum = binary_operation(BinaryOperator::Addition, &int(1), &RuntimeValue::Float(0.5)).unwrap();
        assert_eq!(sum, RuntimeValue::Float(1.5));

        let err = binary_operation(BinaryOperator::Addition, &int(1), &RuntimeValue::from("a")).unwrap_err();
        assert_eq!(
            err,
            RuntimeError::TypeError("unsupported operand type(s) for +: 'int' and 'str'".into())
        );

        let err = binary_operation(BinaryOperator::LessThan, &RuntimeValue::from("a"), &int(1)).unwrap_err();
        assert_eq!(err.kind(), "TypeError");
    }

    #[test]
    fn sequences() {
        let repeated = binary_operation(BinaryOperator::Multiplication, &RuntimeValue::from("ab"), &int(3)).unwrap();
        assert_eq!(repeated, RuntimeValue::from("ababab"));

        let list = RuntimeValue::from(vec!["a", "b"]);
        let found = binary_operation(BinaryOperator::Membership, &RuntimeValue::from("b"), &list).unwrap();
        assert_eq!(found, RuntimeValue::Boolean(true));
        let missing = binary_operation(BinaryOperator::NonMembership, &RuntimeValue::from("c"), &list).unwrap();
        assert_eq!(missing, RuntimeValue::Boolean(true));

        let ordered = binary_operation(
            BinaryOperator::LessThan,
            &RuntimeValue::from(vec![1, 2]),
            &RuntimeValue::from(vec![1, 3]),
        )
        .unwrap();
        assert_eq!(ordered, RuntimeValue::Boolean(true));
    }

    #[test]
    fn nan_is_unordered() {
        let nan = RuntimeValue::Float(f64::NAN);
        for operator in [BinaryOperator::LessThan, BinaryOperator::GreaterThanOrEqual] {
            assert_eq!(binary_operation(operator, &nan, &int(1)).unwrap(), RuntimeValue::Boolean(false));
        }
    }

    #[test]
    fn indexing() {
        let list = RuntimeValue::from(vec![599, 501, 502]);
        assert_eq!(index(&list, &int(1)).unwrap(), int(501));
        assert_eq!(index(&list, &int(-1)).unwrap(), int(502));
        assert_eq!(
            index(&list, &int(3)).unwrap_err(),
            RuntimeError::IndexError("list index out of range".into())
        );
        assert_eq!(index(&list, &int(-4)).unwrap_err().kind(), "IndexError");
        assert_eq!(index(&RuntimeValue::from("abc"), &int(0)).unwrap(), RuntimeValue::from("a"));
        assert_eq!(index(&int(5), &int(0)).unwrap_err().kind(), "TypeError");
        assert_eq!(index(&list, &RuntimeValue::from("x")).unwrap_err().kind(), "TypeError");
    }

    #[test]
    fn string_methods() {
        let s = RuntimeValue::from("  Saturn ");
        assert_eq!(call_method(&s, "strip", &[]).unwrap(), RuntimeValue::from("Saturn"));
        assert_eq!(call_method(&s, "upper", &[]).unwrap(), RuntimeValue::from("  SATURN "));
        assert_eq!(
            call_method(&s, "replace", &[RuntimeValue::from("Sat"), RuntimeValue::from("Nept")]).unwrap(),
            RuntimeValue::from("  Nepturn ")
        );
        assert_eq!(
            call_method(&RuntimeValue::from("COISS"), "startswith", &[RuntimeValue::from("CO")]).unwrap(),
            RuntimeValue::Boolean(true)
        );
        assert_eq!(
            call_method(&int(3), "upper", &[]).unwrap_err(),
            RuntimeError::AttributeError("'int' object has no attribute 'upper'".into())
        );
        assert_eq!(call_method(&s, "title", &[]).unwrap_err().kind(), "AttributeError");
        assert_eq!(call_method(&s, "upper", &[int(1)]).unwrap_err().kind(), "TypeError");
    }
}
