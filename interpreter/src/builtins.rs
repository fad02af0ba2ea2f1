//! Functions predefined in every template's global namespace.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::LazyLock;

use pdstemplate::expression::BinaryOperator;
use regex::{Captures, Regex};

use crate::counters::Counters;
use crate::dates;
use crate::error::RuntimeError;
use crate::evaluator_helpers::{MAX_SEQUENCE_LEN, compare};
use crate::runtime_value::RuntimeValue;

/// Prefix that exempts a value from markup escaping. Removed before output.
pub const NOESCAPE_FLAG: &str = "!!NOESCAPE!!:";

static NEWLINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n+").expect("invalid newline pattern"));

/// Exception kinds that templates may name, e.g. `RAISE(ValueError, "...")`.
/// Each is bound to its own name as a string.
pub const ERROR_KINDS: [&str; 9] = [
    "AttributeError",
    "IndexError",
    "KeyError",
    "NameError",
    "OverflowError",
    "RuntimeError",
    "TypeError",
    "ValueError",
    "ZeroDivisionError",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Range,
    Len,
    Str,
    Int,
    Float,
    Abs,
    Min,
    Max,
    Basename,
    Bool,
    NoEscape,
    Raise,
    ReplaceNa,
    ReplaceUnk,
    VersionId,
    Counter,
    Wrap,
    Datetime,
    DatetimeDoy,
    Daysecs,
    CurrentZulu,
    CurrentTime,
}

impl Builtin {
    pub const ALL: [Builtin; 22] = [
        Builtin::Range,
        Builtin::Len,
        Builtin::Str,
        Builtin::Int,
        Builtin::Float,
        Builtin::Abs,
        Builtin::Min,
        Builtin::Max,
        Builtin::Basename,
        Builtin::Bool,
        Builtin::NoEscape,
        Builtin::Raise,
        Builtin::ReplaceNa,
        Builtin::ReplaceUnk,
        Builtin::VersionId,
        Builtin::Counter,
        Builtin::Wrap,
        Builtin::Datetime,
        Builtin::DatetimeDoy,
        Builtin::Daysecs,
        Builtin::CurrentZulu,
        Builtin::CurrentTime,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Range => "range",
            Builtin::Len => "len",
            Builtin::Str => "str",
            Builtin::Int => "int",
            Builtin::Float => "float",
            Builtin::Abs => "abs",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Basename => "BASENAME",
            Builtin::Bool => "BOOL",
            Builtin::NoEscape => "NOESCAPE",
            Builtin::Raise => "RAISE",
            Builtin::ReplaceNa => "REPLACE_NA",
            Builtin::ReplaceUnk => "REPLACE_UNK",
            Builtin::VersionId => "VERSION_ID",
            Builtin::Counter => "COUNTER",
            Builtin::Wrap => "WRAP",
            Builtin::Datetime => "DATETIME",
            Builtin::DatetimeDoy => "DATETIME_DOY",
            Builtin::Daysecs => "DAYSECS",
            Builtin::CurrentZulu => "CURRENT_ZULU",
            Builtin::CurrentTime => "CURRENT_TIME",
        }
    }

    /// Keyword parameters, in positional order after the required ones.
    fn keywords(self) -> &'static [&'static str] {
        match self {
            Builtin::Bool => &["true", "false"],
            Builtin::ReplaceNa | Builtin::ReplaceUnk => &["flag"],
            Builtin::Counter => &["reset"],
            Builtin::Wrap => &["preserve_single_newlines"],
            Builtin::Datetime | Builtin::DatetimeDoy => &["offset", "digits"],
            Builtin::CurrentZulu | Builtin::CurrentTime => &["date_only"],
            _ => &[],
        }
    }

    /// Call the function. `counters` backs `COUNTER`; the other builtins ignore it.
    pub fn call(
        self,
        arguments: Vec<RuntimeValue>,
        keywords: Vec<(String, RuntimeValue)>,
        counters: &Counters,
    ) -> Result<RuntimeValue, RuntimeError> {
        let args = Arguments::bind(self, arguments, keywords)?;
        match self {
            Builtin::Range => range(&args),
            Builtin::Len => {
                args.exactly(1)?;
                let len = match args.get(0) {
                    RuntimeValue::String(s) => s.chars().count(),
                    RuntimeValue::List(items) => items.len(),
                    other => {
                        return Err(RuntimeError::TypeError(format!(
                            "object of type '{}' has no len()",
                            other.type_name()
                        )));
                    }
                };
                Ok(RuntimeValue::Integer(len as i64))
            }
            Builtin::Str => {
                args.between(0, 1)?;
                Ok(RuntimeValue::String(
                    args.positional.first().map(ToString::to_string).unwrap_or_default(),
                ))
            }
            Builtin::Int => {
                args.exactly(1)?;
                to_int(args.get(0))
            }
            Builtin::Float => {
                args.exactly(1)?;
                to_float(args.get(0))
            }
            Builtin::Abs => {
                args.exactly(1)?;
                match args.get(0) {
                    RuntimeValue::Float(n) => Ok(RuntimeValue::Float(n.abs())),
                    other => match other.as_i64() {
                        Some(n) => n
                            .checked_abs()
                            .map(RuntimeValue::Integer)
                            .ok_or_else(|| RuntimeError::OverflowError("integer overflow".into())),
                        None => Err(RuntimeError::TypeError(format!(
                            "bad operand type for abs(): '{}'",
                            other.type_name()
                        ))),
                    },
                }
            }
            Builtin::Min => extreme(self, args.positional, Ordering::Less),
            Builtin::Max => extreme(self, args.positional, Ordering::Greater),
            Builtin::Basename => {
                args.exactly(1)?;
                let path = args.get(0).to_string();
                let name = path.rsplit('/').next().unwrap_or_default();
                Ok(RuntimeValue::String(name.to_string()))
            }
            Builtin::Bool => {
                args.exactly(1)?;
                let chosen = if args.get(0).is_truthy() {
                    args.keyword("true").cloned().unwrap_or_else(|| "true".into())
                } else {
                    args.keyword("false").cloned().unwrap_or_else(|| "false".into())
                };
                Ok(chosen)
            }
            Builtin::NoEscape => {
                args.exactly(1)?;
                Ok(RuntimeValue::String(format!("{NOESCAPE_FLAG}{}", args.get(0))))
            }
            Builtin::Raise => {
                args.exactly(2)?;
                Err(RuntimeError::Raised {
                    kind: args.get(0).to_string(),
                    message: args.get(1).to_string(),
                })
            }
            Builtin::ReplaceNa => replace_flagged(args, "N/A"),
            Builtin::ReplaceUnk => replace_flagged(args, "UNK"),
            Builtin::VersionId => {
                args.exactly(0)?;
                Ok(RuntimeValue::String(env!("CARGO_PKG_VERSION").to_string()))
            }
            Builtin::Counter => {
                args.exactly(1)?;
                let reset = args.keyword("reset").is_some_and(RuntimeValue::is_truthy);
                Ok(RuntimeValue::Integer(counters.advance(&args.get(0).to_string(), reset)))
            }
            Builtin::Wrap => {
                args.exactly(3)?;
                let left = column(args.get(0))?;
                let right = column(args.get(1))?;
                if left >= right {
                    return Err(RuntimeError::ValueError(format!(
                        "WRAP() right column {right} must exceed left column {left}"
                    )));
                }
                let preserve = args.keyword("preserve_single_newlines").is_none_or(RuntimeValue::is_truthy);
                wrap(left, right, &args.get(2).to_string(), preserve).map(RuntimeValue::String)
            }
            Builtin::Datetime | Builtin::DatetimeDoy => {
                args.exactly(1)?;
                let offset = match args.keyword("offset") {
                    None | Some(RuntimeValue::None) => 0.0,
                    Some(value) => value.as_f64().ok_or_else(|| {
                        RuntimeError::TypeError(format!("offset must be a number, not '{}'", value.type_name()))
                    })?,
                };
                let digits = match args.keyword("digits") {
                    None | Some(RuntimeValue::None) => None,
                    Some(value) => Some(digits(value)?),
                };
                dates::format_datetime(args.get(0), offset, digits, self == Builtin::DatetimeDoy)
            }
            Builtin::Daysecs => {
                args.exactly(1)?;
                dates::day_seconds(args.get(0))
            }
            Builtin::CurrentZulu | Builtin::CurrentTime => {
                args.exactly(0)?;
                let date_only = args.keyword("date_only").is_some_and(RuntimeValue::is_truthy);
                Ok(dates::now(self == Builtin::CurrentZulu, date_only))
            }
        }
    }
}

/// A fresh global namespace: every builtin, plus the exception kind names.
pub fn namespace() -> HashMap<String, RuntimeValue> {
    let mut globals: HashMap<String, RuntimeValue> = Builtin::ALL
        .into_iter()
        .map(|builtin| (builtin.name().to_string(), RuntimeValue::Builtin(builtin)))
        .collect();
    for kind in ERROR_KINDS {
        globals.insert(kind.to_string(), RuntimeValue::String(kind.to_string()));
    }
    globals
}

/// Call arguments after keyword binding.
struct Arguments {
    function: Builtin,
    positional: Vec<RuntimeValue>,
    named: Vec<(&'static str, RuntimeValue)>,
}

impl Arguments {
    fn bind(
        function: Builtin,
        positional: Vec<RuntimeValue>,
        keywords: Vec<(String, RuntimeValue)>,
    ) -> Result<Self, RuntimeError> {
        let allowed = function.keywords();
        let mut named = Vec::with_capacity(keywords.len());
        for (name, value) in keywords {
            let Some(known) = allowed.iter().find(|k| **k == name) else {
                return Err(RuntimeError::TypeError(format!(
                    "{}() got an unexpected keyword argument '{name}'",
                    function.name()
                )));
            };
            named.push((*known, value));
        }
        Ok(Arguments {
            function,
            positional,
            named,
        })
    }

    fn exactly(&self, count: usize) -> Result<(), RuntimeError> {
        self.between(count, count)
    }

    fn between(&self, min: usize, max: usize) -> Result<(), RuntimeError> {
        let given = self.positional.len();
        if (min..=max).contains(&given) {
            return Ok(());
        }
        let expected = if min == max {
            format!("exactly {min}")
        } else {
            format!("{min} to {max}")
        };
        Err(RuntimeError::TypeError(format!(
            "{}() takes {expected} positional argument(s) but {given} were given",
            self.function.name()
        )))
    }

    /// A positional argument already checked to exist.
    fn get(&self, position: usize) -> &RuntimeValue {
        &self.positional[position]
    }

    fn keyword(&self, name: &str) -> Option<&RuntimeValue> {
        self.named.iter().find(|(k, _)| *k == name).map(|(_, v)| v)
    }
}

fn range(args: &Arguments) -> Result<RuntimeValue, RuntimeError> {
    args.between(1, 3)?;
    let mut bounds = Vec::with_capacity(args.positional.len());
    for value in &args.positional {
        let Some(n) = value.as_i64() else {
            return Err(RuntimeError::TypeError(format!(
                "'{}' object cannot be interpreted as an integer",
                value.type_name()
            )));
        };
        bounds.push(n);
    }
    let (start, stop, step) = match bounds.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => return Err(RuntimeError::TypeError("range expected 1 to 3 arguments".into())),
    };
    if step == 0 {
        return Err(RuntimeError::ValueError("range() arg 3 must not be zero".into()));
    }

    let span = if step > 0 {
        i128::from(stop) - i128::from(start)
    } else {
        i128::from(start) - i128::from(stop)
    };
    let len = if span <= 0 { 0 } else { (span - 1) / i128::from(step).abs() + 1 };
    if len > MAX_SEQUENCE_LEN as i128 {
        return Err(RuntimeError::OverflowError("range() result is too long".into()));
    }

    let mut items = Vec::with_capacity(len as usize);
    let mut n = start;
    while (step > 0 && n < stop) || (step < 0 && n > stop) {
        items.push(RuntimeValue::Integer(n));
        match n.checked_add(step) {
            Some(next) => n = next,
            None => break,
        }
    }
    Ok(RuntimeValue::List(items))
}

fn to_int(value: &RuntimeValue) -> Result<RuntimeValue, RuntimeError> {
    match value {
        RuntimeValue::Float(n) if n.is_finite() => Ok(RuntimeValue::Integer(n.trunc() as i64)),
        RuntimeValue::Float(n) => Err(RuntimeError::ValueError(format!(
            "cannot convert float {} to integer",
            crate::number::float_repr(*n)
        ))),
        RuntimeValue::String(s) => s.trim().parse::<i64>().map(RuntimeValue::Integer).map_err(|_| {
            RuntimeError::ValueError(format!("invalid literal for int() with base 10: '{s}'"))
        }),
        other => other.as_i64().map(RuntimeValue::Integer).ok_or_else(|| {
            RuntimeError::TypeError(format!(
                "int() argument must be a string or a number, not '{}'",
                other.type_name()
            ))
        }),
    }
}

fn to_float(value: &RuntimeValue) -> Result<RuntimeValue, RuntimeError> {
    match value {
        RuntimeValue::String(s) => s
            .trim()
            .parse::<f64>()
            .map(RuntimeValue::Float)
            .map_err(|_| RuntimeError::ValueError(format!("could not convert string to float: '{s}'"))),
        other => other.as_f64().map(RuntimeValue::Float).ok_or_else(|| {
            RuntimeError::TypeError(format!(
                "float() argument must be a string or a number, not '{}'",
                other.type_name()
            ))
        }),
    }
}

/// `min`/`max` over the arguments, or over a single iterable argument.
fn extreme(function: Builtin, arguments: Vec<RuntimeValue>, wanted: Ordering) -> Result<RuntimeValue, RuntimeError> {
    let candidates = match <[RuntimeValue; 1]>::try_from(arguments) {
        Ok([single]) => single.into_items()?,
        Err(arguments) => arguments,
    };

    let operator = if wanted == Ordering::Less {
        BinaryOperator::LessThan
    } else {
        BinaryOperator::GreaterThan
    };
    let mut candidates = candidates.into_iter();
    let Some(mut best) = candidates.next() else {
        return Err(RuntimeError::ValueError(format!(
            "{}() arg is an empty sequence",
            function.name()
        )));
    };
    for candidate in candidates {
        if compare(operator, &candidate, &best)? == Some(wanted) {
            best = candidate;
        }
    }
    Ok(best)
}

/// `REPLACE_NA(value, replacement, flag="N/A")` and its `UNK` sibling: the
/// replacement when `value` equals the flag, otherwise `value` unchanged.
fn replace_flagged(args: Arguments, default_flag: &str) -> Result<RuntimeValue, RuntimeError> {
    args.between(2, 3)?;
    let flag = args
        .positional
        .get(2)
        .or_else(|| args.keyword("flag"))
        .cloned()
        .unwrap_or_else(|| default_flag.into());

    let mut positional = args.positional.into_iter();
    let value = positional.next().unwrap_or(RuntimeValue::None);
    let replacement = positional.next().unwrap_or(RuntimeValue::None);

    let matches_flag = match &value {
        RuntimeValue::String(s) => RuntimeValue::String(s.trim().to_string()) == flag,
        other => *other == flag,
    };
    Ok(if matches_flag { replacement } else { value })
}

/// A non-negative column number for `WRAP`.
fn column(value: &RuntimeValue) -> Result<usize, RuntimeError> {
    value
        .as_i64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| RuntimeError::ValueError(format!("WRAP() column must be a non-negative integer, not {}", value.repr())))
}

/// Fractional-second digits requested from `DATETIME`.
fn digits(value: &RuntimeValue) -> Result<usize, RuntimeError> {
    value
        .as_i64()
        .and_then(|n| usize::try_from(n).ok())
        .filter(|n| *n <= dates::MAX_DIGITS)
        .ok_or_else(|| {
            RuntimeError::ValueError(format!("digits must be 0 to {}, not {}", dates::MAX_DIGITS, value.repr()))
        })
}

/// `WRAP(left, right, text)`: fill `text` into lines that end by column
/// `right`. Every line after the first is indented to column `left`; the
/// first is expected to sit there already.
///
/// Newlines are kept unless `preserve_single_newlines` is off. Then a lone
/// newline joins two lines and every longer run loses one newline.
fn wrap(left: usize, right: usize, text: &str, preserve_single_newlines: bool) -> Result<String, RuntimeError> {
    let text = if preserve_single_newlines {
        text.strip_suffix('\n').unwrap_or(text).to_string()
    } else {
        NEWLINES
            .replace_all(text, |caps: &Captures| match caps[0].len() {
                1 => " ".to_string(),
                run => "\n".repeat(run - 1),
            })
            .into_owned()
    };

    let width = right - left;
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut words = paragraph.split_whitespace();
        let Some(first) = words.next() else {
            lines.push(String::new());
            continue;
        };
        let mut line = first.to_string();
        let mut line_width = first.chars().count();
        for word in words {
            let word_width = word.chars().count();
            if line_width + 1 + word_width <= width {
                line.push(' ');
                line.push_str(word);
                line_width += 1 + word_width;
            } else {
                lines.push(std::mem::replace(&mut line, word.to_string()));
                line_width = word_width;
            }
        }
        lines.push(line);
    }

    let indented = lines.len().checked_mul(left).and_then(|n| n.checked_add(text.len()));
    if indented.is_none_or(|n| n > MAX_SEQUENCE_LEN) {
        return Err(RuntimeError::OverflowError("wrapped text is too long".into()));
    }
    let indent = " ".repeat(left);
    let mut wrapped = String::new();
    for (k, line) in lines.iter().enumerate() {
        if k > 0 {
            wrapped.push('\n');
            if !line.is_empty() {
                wrapped.push_str(&indent);
            }
        }
        wrapped.push_str(line);
    }
    Ok(wrapped)
}
