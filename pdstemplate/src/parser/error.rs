use thiserror::Error;

use crate::section::Directive;

/// A structural defect in a template, detected while compiling it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("mismatched \"$\" at line {line}")]
    MismatchedDelimiter { line: usize },

    #[error("missing argument for {directive} at line {line}")]
    MissingArgument { directive: Directive, line: usize },

    #[error("extraneous argument for {directive} at line {line}")]
    ExtraneousArgument { directive: Directive, line: usize },

    #[error("unterminated {directive} block starting at line {line}")]
    UnterminatedBlock { directive: Directive, line: usize },

    #[error("{directive} without matching {opener} at line {line}", opener = opener_name(.directive))]
    DanglingTerminator { directive: Directive, line: usize },
}

impl TemplateError {
    /// The 1-based source line the error refers to.
    pub fn line(&self) -> usize {
        match self {
            TemplateError::MismatchedDelimiter { line }
            | TemplateError::MissingArgument { line, .. }
            | TemplateError::ExtraneousArgument { line, .. }
            | TemplateError::UnterminatedBlock { line, .. }
            | TemplateError::DanglingTerminator { line, .. } => *line,
        }
    }
}

fn opener_name(directive: &Directive) -> String {
    directive
        .opener()
        .map(|opener| opener.to_string())
        .unwrap_or_else(|| "opener".to_string())
}

/// A syntax error in an embedded expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (column {column})")]
pub struct ParseError {
    pub message: String,
    /// 1-based character column within the expression.
    pub column: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, column: usize) -> Self {
        ParseError {
            message: message.into(),
            column,
        }
    }
}
