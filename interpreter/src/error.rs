use pdstemplate::ParseError;
use thiserror::Error;

/// A failure while evaluating one expression. Kinds are named after the
/// Python exceptions they correspond to; the message is what appears inside
/// the error marker.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("name '{0}' is not defined")]
    NameError(String),
    #[error("{0}")]
    TypeError(String),
    #[error("{0}")]
    AttributeError(String),
    #[error("{0}")]
    IndexError(String),
    #[error("{0}")]
    ValueError(String),
    #[error("{0}")]
    ZeroDivisionError(String),
    #[error("{0}")]
    OverflowError(String),
    #[error("maximum expression depth exceeded")]
    RecursionError,
    #[error("{0}")]
    SyntaxError(String),
    /// Raised on purpose by the template, through `RAISE`.
    #[error("{message}")]
    Raised { kind: String, message: String },
}

impl RuntimeError {
    pub fn kind(&self) -> &str {
        match self {
            RuntimeError::NameError(_) => "NameError",
            RuntimeError::TypeError(_) => "TypeError",
            RuntimeError::AttributeError(_) => "AttributeError",
            RuntimeError::IndexError(_) => "IndexError",
            RuntimeError::ValueError(_) => "ValueError",
            RuntimeError::ZeroDivisionError(_) => "ZeroDivisionError",
            RuntimeError::OverflowError(_) => "OverflowError",
            RuntimeError::RecursionError => "RecursionError",
            RuntimeError::SyntaxError(_) => "SyntaxError",
            RuntimeError::Raised { kind, .. } => kind,
        }
    }
}

impl From<ParseError> for RuntimeError {
    fn from(error: ParseError) -> Self {
        RuntimeError::SyntaxError(error.to_string())
    }
}

/// A runtime error tied to the template line of the expression that failed.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}({error}) at line {line}", kind = .error.kind())]
pub struct EvaluationFailure {
    pub error: RuntimeError,
    pub line: usize,
}

impl EvaluationFailure {
    pub fn new(error: RuntimeError, line: usize) -> Self {
        EvaluationFailure { error, line }
    }

    /// The in-band replacement written into the output in place of the value.
    pub fn marker(&self) -> String {
        format!("[[[{self}]]]")
    }
}
