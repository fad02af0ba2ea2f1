use crate::block::{ARG_CAPTURE, Contents, reject_argument};
use crate::parser::TemplateError;
use crate::section::{Directive, ScopeAction, Section};

/// Text included exactly once: a literal `$ONCE`, a claimed `$END_FOR`, `$END_IF`
/// or `$END_NOTE`, or the text ahead of the first header.
#[derive(Debug, Clone, PartialEq)]
pub struct OnceBlock {
    pub contents: Contents,
    /// `Once`, or the terminator this block stands for.
    pub directive: Directive,
    /// `Pop` for the terminator of a `$FOR` or `$IF` chain.
    pub scope: ScopeAction,
    /// The expression in `$ONCE(expr)`, evaluated before the body.
    pub expression: Option<String>,
    /// The name in `$ONCE(name=expr)`; the value is bound in the current scope.
    pub bind_name: Option<String>,
}

impl OnceBlock {
    pub(crate) fn build(section: Section) -> Result<Self, TemplateError> {
        let contents = Contents::new(&section)?;
        let (bind_name, expression) = if section.arg.trim().is_empty() {
            (None, None)
        } else {
            match ARG_CAPTURE.captures(&section.arg) {
                Some(caps) => (Some(caps[1].to_string()), Some(caps[2].to_string())),
                None => (None, Some(section.arg.clone())),
            }
        };

        Ok(OnceBlock {
            contents,
            directive: Directive::Once,
            scope: ScopeAction::Keep,
            expression,
            bind_name,
        })
    }

    /// A terminator already claimed by its opener.
    pub(crate) fn closing(section: Section, scope: ScopeAction) -> Result<Self, TemplateError> {
        reject_argument(&section)?;
        Ok(OnceBlock {
            contents: Contents::new(&section)?,
            directive: section.directive,
            scope,
            expression: None,
            bind_name: None,
        })
    }
}
