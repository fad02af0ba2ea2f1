use std::sync::LazyLock;

use regex::Regex;

use crate::parser::TemplateError;

/// The character that opens and closes an embedded expression.
pub const DELIMITER: char = '$';

/// `name = expression`, where `=` is not the start of `==`.
static CAPTURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ *([A-Za-z_]\w*) *=([^=].*)$").expect("invalid capture pattern")
});

/// An embedded expression, optionally capturing its value under a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpressionFragment {
    pub expression: String,
    pub bind_name: Option<String>,
    /// 1-based source line of the opening delimiter.
    pub line: usize,
}

impl ExpressionFragment {
    pub fn parse(text: &str, line: usize) -> Self {
        match CAPTURE.captures(text) {
            Some(caps) => ExpressionFragment {
                expression: caps[2].to_string(),
                bind_name: Some(caps[1].to_string()),
                line,
            },
            None => ExpressionFragment {
                expression: text.to_string(),
                bind_name: None,
                line,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Literal(String),
    Expression(ExpressionFragment),
}

/// A section body split into literal text and expressions, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledBody {
    pub fragments: Vec<Fragment>,
}

impl CompiledBody {
    /// Compile body text produced by the scanner, which writes `<line>:` after every
    /// delimiter. `$$` becomes a literal `$`.
    pub fn compile(body: &str) -> Result<Self, TemplateError> {
        let parts: Vec<&str> = body.split(DELIMITER).collect();
        if parts.len() % 2 == 0 {
            let line = parts.last().map_or(0, |part| split_line_marker(part).0);
            return Err(TemplateError::MismatchedDelimiter { line });
        }

        let mut compiled = CompiledBody::default();
        compiled.push_literal(parts[0]);
        for (k, part) in parts.iter().enumerate().skip(1) {
            let (line, text) = split_line_marker(part);
            if k % 2 == 0 {
                compiled.push_literal(text);
            } else if text.is_empty() {
                compiled.push_literal("$");
            } else {
                compiled
                    .fragments
                    .push(Fragment::Expression(ExpressionFragment::parse(text, line)));
            }
        }
        Ok(compiled)
    }

    fn push_literal(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(Fragment::Literal(previous)) = self.fragments.last_mut() {
            previous.push_str(text);
        } else {
            self.fragments.push(Fragment::Literal(text.to_string()));
        }
    }
}

/// Split `"<line>:<text>"` into its parts. Text without a marker reports line 0.
fn split_line_marker(part: &str) -> (usize, &str) {
    part.split_once(':')
        .and_then(|(line, text)| line.parse().ok().map(|line| (line, text)))
        .unwrap_or((0, part))
}
