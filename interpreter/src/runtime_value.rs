use std::fmt;

use crate::builtins::Builtin;
use crate::error::RuntimeError;
use crate::number::float_repr;

/// A runtime value produced by evaluating an expression.
#[derive(Debug, Clone)]
pub enum RuntimeValue {
    None,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<RuntimeValue>),
    Builtin(Builtin),
}

impl RuntimeValue {
    pub fn is_truthy(&self) -> bool {
        match self {
            RuntimeValue::None => false,
            RuntimeValue::Boolean(b) => *b,
            RuntimeValue::Integer(n) => *n != 0,
            RuntimeValue::Float(n) => *n != 0.0,
            RuntimeValue::String(s) => !s.is_empty(),
            RuntimeValue::List(items) => !items.is_empty(),
            RuntimeValue::Builtin(_) => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            RuntimeValue::None => "NoneType",
            RuntimeValue::Boolean(_) => "bool",
            RuntimeValue::Integer(_) => "int",
            RuntimeValue::Float(_) => "float",
            RuntimeValue::String(_) => "str",
            RuntimeValue::List(_) => "list",
            RuntimeValue::Builtin(_) => "builtin_function_or_method",
        }
    }

    /// The numeric view of a value; booleans count as 0 and 1.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RuntimeValue::Boolean(b) => Some(f64::from(u8::from(*b))),
            RuntimeValue::Integer(n) => Some(*n as f64),
            RuntimeValue::Float(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            RuntimeValue::Boolean(b) => Some(i64::from(*b)),
            RuntimeValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Materialize an iterable: list elements, or the characters of a string.
    pub fn into_items(self) -> Result<Vec<RuntimeValue>, RuntimeError> {
        match self {
            RuntimeValue::List(items) => Ok(items),
            RuntimeValue::String(s) => Ok(s.chars().map(|c| RuntimeValue::String(c.to_string())).collect()),
            other => Err(RuntimeError::TypeError(format!(
                "'{}' object is not iterable",
                other.type_name()
            ))),
        }
    }

    /// The quoted form used for list elements, as opposed to `Display`.
    pub fn repr(&self) -> String {
        match self {
            RuntimeValue::String(s) => quote(s),
            RuntimeValue::Float(n) => float_repr(*n),
            RuntimeValue::List(items) => format_list(items),
            other => other.to_string(),
        }
    }
}

fn quote(s: &str) -> String {
    let delimiter = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push(delimiter);
    for c in s.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            c if c == delimiter => {
                quoted.push('\\');
                quoted.push(c);
            }
            c => quoted.push(c),
        }
    }
    quoted.push(delimiter);
    quoted
}

fn format_list(items: &[RuntimeValue]) -> String {
    let inner: Vec<String> = items.iter().map(RuntimeValue::repr).collect();
    format!("[{}]", inner.join(", "))
}

impl fmt::Display for RuntimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeValue::None => write!(f, "None"),
            RuntimeValue::Boolean(true) => write!(f, "True"),
            RuntimeValue::Boolean(false) => write!(f, "False"),
            RuntimeValue::Integer(n) => write!(f, "{n}"),
            RuntimeValue::Float(n) => write!(f, "{}", float_repr(*n)),
            RuntimeValue::String(s) => write!(f, "{s}"),
            RuntimeValue::List(items) => write!(f, "{}", format_list(items)),
            RuntimeValue::Builtin(builtin) => write!(f, "<built-in function {}>", builtin.name()),
        }
    }
}

impl PartialEq for RuntimeValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RuntimeValue::None, RuntimeValue::None) => true,
            (RuntimeValue::String(a), RuntimeValue::String(b)) => a == b,
            (RuntimeValue::List(a), RuntimeValue::List(b)) => a == b,
            (RuntimeValue::Builtin(a), RuntimeValue::Builtin(b)) => a == b,
            (a, b) => match (a.as_i64(), b.as_i64()) {
                (Some(x), Some(y)) => x == y,
                // NaN != NaN per IEEE 754
                _ => matches!((a.as_f64(), b.as_f64()), (Some(x), Some(y)) if x == y),
            },
        }
    }
}

impl From<bool> for RuntimeValue {
    fn from(value: bool) -> Self {
        RuntimeValue::Boolean(value)
    }
}

impl From<i64> for RuntimeValue {
    fn from(value: i64) -> Self {
        RuntimeValue::Integer(value)
    }
}

impl From<i32> for RuntimeValue {
    fn from(value: i32) -> Self {
        RuntimeValue::Integer(i64::from(value))
    }
}

impl From<f64> for RuntimeValue {
    fn from(value: f64) -> Self {
        RuntimeValue::Float(value)
    }
}

impl From<&str> for RuntimeValue {
    fn from(value: &str) -> Self {
        RuntimeValue::String(value.to_string())
    }
}

impl From<String> for RuntimeValue {
    fn from(value: String) -> Self {
        RuntimeValue::String(value)
    }
}

impl<T: Into<RuntimeValue>> From<Vec<T>> for RuntimeValue {
    fn from(values: Vec<T>) -> Self {
        RuntimeValue::List(values.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_follows_python_str() {
        assert_eq!(RuntimeValue::None.to_string(), "None");
        assert_eq!(RuntimeValue::Boolean(true).to_string(), "True");
        assert_eq!(RuntimeValue::Float(1.0).to_string(), "1.0");
        assert_eq!(RuntimeValue::from("it's").to_string(), "it's");
        assert_eq!(
            RuntimeValue::from(vec![RuntimeValue::Float(1.0), RuntimeValue::from("a")]).to_string(),
            "[1.0, 'a']"
        );
        assert_eq!(RuntimeValue::from(vec!["it's"]).to_string(), "[\"it's\"]");
        assert_eq!(RuntimeValue::from(Vec::<i64>::new()).to_string(), "[]");
    }

    #[test]
    fn numeric_equality_crosses_types() {
        assert_eq!(RuntimeValue::Integer(1), RuntimeValue::Float(1.0));
        assert_eq!(RuntimeValue::Boolean(true), RuntimeValue::Integer(1));
        assert_ne!(RuntimeValue::Integer(1), RuntimeValue::from("1"));
        assert_ne!(RuntimeValue::Float(f64::NAN), RuntimeValue::Float(f64::NAN));
        assert_ne!(RuntimeValue::None, RuntimeValue::Boolean(false));
    }

    #[test]
    fn truthiness() {
        assert!(!RuntimeValue::None.is_truthy());
        assert!(!RuntimeValue::Integer(0).is_truthy());
        assert!(!RuntimeValue::from("").is_truthy());
        assert!(!RuntimeValue::from(Vec::<i64>::new()).is_truthy());
        assert!(RuntimeValue::from(vec![1.0]).is_truthy());
        assert!(RuntimeValue::from("whatever").is_truthy());
    }

    #[test]
    fn strings_iterate_by_character() {
        let items = RuntimeValue::from("ab").into_items().unwrap();
        assert_eq!(items, vec![RuntimeValue::from("a"), RuntimeValue::from("b")]);

        let err = RuntimeValue::Integer(3).into_items().unwrap_err();
        assert_eq!(err, RuntimeError::TypeError("'int' object is not iterable".into()));
    }
}
