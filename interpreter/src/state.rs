use crate::builtins::NOESCAPE_FLAG;
use crate::environment::Environment;
use crate::error::EvaluationFailure;

/// Everything that changes while one label is generated.
#[derive(Debug)]
pub struct RuntimeState {
    pub env: Environment,
    /// Escape `&`, `<` and `>` in expression output.
    pub escape_markup: bool,
    /// Stop at the first failed expression instead of writing a marker.
    pub fail_fast: bool,
    /// Identifies the document in log messages.
    pub label: String,
    pub error_count: usize,
}

impl RuntimeState {
    pub fn new(env: Environment, escape_markup: bool, fail_fast: bool, label: impl Into<String>) -> Self {
        RuntimeState {
            env,
            escape_markup,
            fail_fast,
            label: label.into(),
            error_count: 0,
        }
    }

    /// Apply the failure policy: hand the failure back when failing fast,
    /// otherwise log and count it and return the marker to write in its place.
    pub fn contain(&mut self, failure: EvaluationFailure) -> Result<String, EvaluationFailure> {
        if self.fail_fast {
            return Err(failure);
        }
        log::error!("{}: {failure}", self.label);
        self.error_count += 1;
        Ok(failure.marker())
    }

    /// Prepare expression output for the document. Text carrying the no-escape
    /// flag loses the flag and is never escaped.
    pub fn escape(&self, text: String) -> String {
        match text.strip_prefix(NOESCAPE_FLAG) {
            Some(raw) => raw.to_string(),
            None if self.escape_markup => html_escape::encode_text(&text).into_owned(),
            None => text,
        }
    }
}
