use std::collections::VecDeque;

use crate::block::{ARG_CAPTURE, Contents, build_children, claim_terminator, reject_argument, require_argument};
use crate::parser::TemplateError;
use crate::section::{Directive, ScopeAction, Section};

const BRANCH_ENDS: [Directive; 3] = [Directive::ElseIf, Directive::Else, Directive::EndIf];

/// `$IF(cond)` or `$ELSE_IF(cond)`, with the rest of its chain.
///
/// Only the chain head (`directive == If`) opens a scope; the `$END_IF` closing
/// the chain pops it whichever branch ran.
#[derive(Debug, Clone, PartialEq)]
pub struct IfBlock {
    pub contents: Contents,
    /// `If` for the chain head, `ElseIf` for later links.
    pub directive: Directive,
    pub expression: String,
    /// The name in `$IF(name=expr)`; bound to the condition's value.
    pub bind_name: Option<String>,
    pub else_if: Option<Box<IfBlock>>,
    pub else_branch: Option<Box<ElseBlock>>,
}

impl IfBlock {
    pub(crate) fn build(section: Section, sections: &mut VecDeque<Section>) -> Result<Self, TemplateError> {
        require_argument(&section)?;
        let mut contents = Contents::new(&section)?;

        let (bind_name, expression) = match ARG_CAPTURE.captures(&section.arg) {
            Some(caps) => (Some(caps[1].to_string()), caps[2].to_string()),
            None => (None, section.arg.clone()),
        };

        let mut block = IfBlock {
            contents: Contents::default(),
            directive: section.directive,
            expression,
            bind_name,
            else_if: None,
            else_branch: None,
        };

        let found = build_children(&section, sections, &BRANCH_ENDS, &mut contents.children)?;
        block.contents = contents;

        match found {
            Directive::ElseIf => {
                if let Some(next) = sections.pop_front() {
                    block.else_if = Some(Box::new(IfBlock::build(next, sections)?));
                }
            }
            Directive::Else => {
                if let Some(next) = sections.pop_front() {
                    block.else_branch = Some(Box::new(ElseBlock::build(next, sections)?));
                }
            }
            _ => claim_terminator(sections, ScopeAction::Pop),
        }
        Ok(block)
    }
}

/// `$ELSE`. Runs in the scope opened by the head of its `$IF` chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ElseBlock {
    pub contents: Contents,
}

impl ElseBlock {
    pub(crate) fn build(section: Section, sections: &mut VecDeque<Section>) -> Result<Self, TemplateError> {
        reject_argument(&section)?;
        let mut contents = Contents::new(&section)?;
        build_children(&section, sections, &[Directive::EndIf], &mut contents.children)?;
        claim_terminator(sections, ScopeAction::Pop);
        Ok(ElseBlock { contents })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(sections: Vec<Section>) -> (IfBlock, VecDeque<Section>) {
        let mut queue: VecDeque<Section> = sections.into();
        let head = queue.pop_front().unwrap();
        let block = IfBlock::build(head, &mut queue).unwrap();
        (block, queue)
    }

    #[test]
    fn else_if_links_form_a_chain() {
        let (head, rest) = chain(vec![
            Section::new(Directive::If, "x==0", 1, "zero\n"),
            Section::new(Directive::ElseIf, "x==1", 3, "one\n"),
            Section::new(Directive::ElseIf, "x==2", 5, "two\n"),
            Section::new(Directive::Else, "", 7, "many\n"),
            Section::new(Directive::EndIf, "", 9, "done\n"),
        ]);

        assert_eq!(head.directive, Directive::If);
        let second = head.else_if.as_deref().unwrap();
        assert_eq!(second.directive, Directive::ElseIf);
        assert_eq!(second.expression, "x==1");
        let third = second.else_if.as_deref().unwrap();
        assert_eq!(third.contents.line, 5);
        assert!(third.else_branch.is_some());
        assert!(head.else_branch.is_none());

        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].directive, Directive::EndIf);
        assert_eq!(rest[0].closing, Some(ScopeAction::Pop));
    }

    #[test]
    fn capture_in_condition() {
        let (head, _) = chain(vec![
            Section::new(Directive::If, "a = x", 1, ""),
            Section::new(Directive::EndIf, "", 2, ""),
        ]);
        assert_eq!(head.bind_name.as_deref(), Some("a"));
        assert_eq!(head.expression, " x");

        let (head, _) = chain(vec![
            Section::new(Directive::If, "a == x", 1, ""),
            Section::new(Directive::EndIf, "", 2, ""),
        ]);
        assert_eq!(head.bind_name, None);
        assert_eq!(head.expression, "a == x");
    }

    #[test]
    fn else_rejects_argument() {
        let mut queue = VecDeque::from([
            Section::new(Directive::Else, "x", 2, ""),
            Section::new(Directive::EndIf, "", 3, ""),
        ]);
        let err = IfBlock::build(Section::new(Directive::If, "c", 1, ""), &mut queue).unwrap_err();
        assert_eq!(
            err,
            TemplateError::ExtraneousArgument { directive: Directive::Else, line: 2 }
        );
    }
}
