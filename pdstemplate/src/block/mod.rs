mod conditional;
mod for_loop;
mod note;
mod once;

use std::collections::VecDeque;
use std::sync::LazyLock;

use regex::Regex;

use crate::body::CompiledBody;
use crate::parser::TemplateError;
use crate::section::{Directive, ScopeAction, Section};

pub use conditional::{ElseBlock, IfBlock};
pub use for_loop::ForBlock;
pub use note::NoteBlock;
pub use once::OnceBlock;

/// `name = expression` inside a header argument. Arguments may span lines.
pub(crate) static ARG_CAPTURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^ *([A-Za-z_]\w*) *=([^=].*)$").expect("invalid argument capture pattern")
});

/// A logically complete piece of a template, from one header up to the point
/// where its definition ends.
///
/// The terminator of a `$FOR` or `$IF` is not a child of that block: it follows it
/// as a sibling `Once` block in the same list, and pops the block's scope when it
/// runs.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    /// `$ONCE`, a matched `$END_*`, or the text before the first header.
    Once(OnceBlock),
    /// `$NOTE`: parsed, never run.
    Note(NoteBlock),
    /// `$FOR`: body and children run once per element.
    For(ForBlock),
    /// `$IF`, owning its `$ELSE_IF`/`$ELSE` chain.
    If(IfBlock),
}

/// What every block owns: its compiled body and nested blocks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Contents {
    /// 1-based source line of the header.
    pub line: usize,
    pub body: CompiledBody,
    pub children: Vec<Block>,
}

impl Contents {
    fn new(section: &Section) -> Result<Self, TemplateError> {
        Ok(Contents {
            line: section.line,
            body: CompiledBody::compile(&section.body)?,
            children: Vec::new(),
        })
    }
}

impl Block {
    /// Build the block that starts with `section`, consuming from `sections` every
    /// further section the block needs, nested blocks included.
    pub fn build(section: Section, sections: &mut VecDeque<Section>) -> Result<Block, TemplateError> {
        if let Some(scope) = section.closing {
            return OnceBlock::closing(section, scope).map(Block::Once);
        }

        let block = match section.directive {
            Directive::Once => Block::Once(OnceBlock::build(section)?),
            Directive::Note => Block::Note(NoteBlock::build(section, sections)?),
            Directive::For => Block::For(ForBlock::build(section, sections)?),
            Directive::If => Block::If(IfBlock::build(section, sections)?),
            Directive::ElseIf
            | Directive::Else
            | Directive::EndFor
            | Directive::EndIf
            | Directive::EndNote => {
                return Err(TemplateError::DanglingTerminator {
                    directive: section.directive,
                    line: section.line,
                });
            }
        };
        log::trace!("built {} block at line {}", block.directive(), block.line());
        Ok(block)
    }

    pub fn contents(&self) -> &Contents {
        match self {
            Block::Once(block) => &block.contents,
            Block::Note(block) => &block.contents,
            Block::For(block) => &block.contents,
            Block::If(block) => &block.contents,
        }
    }

    pub fn line(&self) -> usize {
        self.contents().line
    }

    pub fn children(&self) -> &[Block] {
        &self.contents().children
    }

    pub fn directive(&self) -> Directive {
        match self {
            Block::Once(block) => block.directive,
            Block::Note(_) => Directive::Note,
            Block::For(_) => Directive::For,
            Block::If(block) => block.directive,
        }
    }
}

/// Build nested blocks until the next unclaimed section is one of `until`.
/// Returns the directive found; that section stays at the front of the queue.
fn build_children(
    opener: &Section,
    sections: &mut VecDeque<Section>,
    until: &[Directive],
    children: &mut Vec<Block>,
) -> Result<Directive, TemplateError> {
    loop {
        match sections.pop_front() {
            None => {
                return Err(TemplateError::UnterminatedBlock {
                    directive: opener.directive,
                    line: opener.line,
                });
            }
            Some(next) if next.closing.is_none() && until.contains(&next.directive) => {
                let found = next.directive;
                sections.push_front(next);
                return Ok(found);
            }
            Some(next) => children.push(Block::build(next, sections)?),
        }
    }
}

/// Mark the terminator at the front of the queue as claimed, so it builds as a
/// sibling `Once` block.
fn claim_terminator(sections: &mut VecDeque<Section>, scope: ScopeAction) {
    if let Some(terminator) = sections.front_mut() {
        terminator.closing = Some(scope);
    }
}

fn reject_argument(section: &Section) -> Result<(), TemplateError> {
    if section.arg.trim().is_empty() {
        Ok(())
    } else {
        Err(TemplateError::ExtraneousArgument {
            directive: section.directive,
            line: section.line,
        })
    }
}

fn require_argument(section: &Section) -> Result<(), TemplateError> {
    if section.arg.trim().is_empty() {
        Err(TemplateError::MissingArgument {
            directive: section.directive,
            line: section.line,
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::Fragment;
    use pretty_assertions::assert_eq;

    fn build_all(sections: Vec<Section>) -> Result<Vec<Block>, TemplateError> {
        let mut queue: VecDeque<Section> = sections.into();
        let mut blocks = Vec::new();
        while let Some(section) = queue.pop_front() {
            blocks.push(Block::build(section, &mut queue)?);
        }
        Ok(blocks)
    }

    fn section(directive: Directive, arg: &str, line: usize, body: &str) -> Section {
        Section::new(directive, arg, line, body)
    }

    fn shape(blocks: &[Block]) -> Vec<(Directive, usize, usize)> {
        blocks
            .iter()
            .map(|b| (b.directive(), b.line(), b.children().len()))
            .collect()
    }

    #[test]
    fn terminator_is_a_sibling_once_block() {
        let blocks = build_all(vec![
            section(Directive::Once, "", 1, "head\n"),
            section(Directive::For, "targets", 2, "item\n"),
            section(Directive::EndFor, "", 4, "tail\n"),
        ])
        .unwrap();

        assert_eq!(
            shape(&blocks),
            vec![
                (Directive::Once, 1, 0),
                (Directive::For, 2, 0),
                (Directive::EndFor, 4, 0),
            ]
        );
        let Block::Once(closer) = &blocks[2] else { panic!("expected once block") };
        assert_eq!(closer.scope, ScopeAction::Pop);
        assert_eq!(closer.contents.body.fragments, vec![Fragment::Literal("tail\n".into())]);
    }

    #[test]
    fn nested_blocks_are_children() {
        let blocks = build_all(vec![
            section(Directive::For, "rows", 1, ""),
            section(Directive::If, "x", 2, "yes\n"),
            section(Directive::Else, "", 3, "no\n"),
            section(Directive::EndIf, "", 4, "after if\n"),
            section(Directive::EndFor, "", 5, ""),
        ])
        .unwrap();

        assert_eq!(
            shape(&blocks),
            vec![(Directive::For, 1, 2), (Directive::EndFor, 5, 0)]
        );
        assert_eq!(
            shape(blocks[0].children()),
            vec![(Directive::If, 2, 0), (Directive::EndIf, 4, 0)]
        );
        let Block::If(if_block) = &blocks[0].children()[0] else { panic!("expected if block") };
        assert!(if_block.else_branch.is_some());
        assert!(if_block.else_if.is_none());
    }

    #[test]
    fn note_terminator_keeps_scope() {
        let blocks = build_all(vec![
            section(Directive::Note, "", 1, "hidden $1:x$1:\n"),
            section(Directive::EndNote, "", 2, "shown\n"),
        ])
        .unwrap();
        let Block::Once(closer) = &blocks[1] else { panic!("expected once block") };
        assert_eq!(closer.scope, ScopeAction::Keep);
        assert_eq!(closer.directive, Directive::EndNote);
    }

    #[test]
    fn unterminated_blocks() {
        let err = build_all(vec![section(Directive::For, "x", 3, "")]).unwrap_err();
        assert_eq!(
            err,
            TemplateError::UnterminatedBlock { directive: Directive::For, line: 3 }
        );

        let err = build_all(vec![
            section(Directive::If, "x", 1, ""),
            section(Directive::ElseIf, "y", 2, ""),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            TemplateError::UnterminatedBlock { directive: Directive::ElseIf, line: 2 }
        );

        let err = build_all(vec![section(Directive::Note, "", 7, "")]).unwrap_err();
        assert_eq!(err.line(), 7);
    }

    #[test]
    fn dangling_terminators() {
        for directive in [
            Directive::EndFor,
            Directive::EndNote,
            Directive::EndIf,
            Directive::Else,
            Directive::ElseIf,
        ] {
            let err = build_all(vec![section(directive, "", 9, "")]).unwrap_err();
            assert_eq!(err, TemplateError::DanglingTerminator { directive, line: 9 });
        }
    }

    #[test]
    fn dangling_terminator_message_names_opener() {
        let err = build_all(vec![section(Directive::EndFor, "", 2, "")]).unwrap_err();
        assert_eq!(err.to_string(), "$END_FOR without matching $FOR at line 2");
    }

    #[test]
    fn terminator_of_wrong_kind_inside_block() {
        let err = build_all(vec![
            section(Directive::For, "x", 1, ""),
            section(Directive::EndIf, "", 2, ""),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            TemplateError::DanglingTerminator { directive: Directive::EndIf, line: 2 }
        );
    }

    #[test]
    fn missing_and_extraneous_arguments() {
        let err = build_all(vec![
            section(Directive::For, "", 4, ""),
            section(Directive::EndFor, "", 5, ""),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            TemplateError::MissingArgument { directive: Directive::For, line: 4 }
        );

        let err = build_all(vec![
            section(Directive::If, "  ", 1, ""),
            section(Directive::EndIf, "", 2, ""),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            TemplateError::MissingArgument { directive: Directive::If, line: 1 }
        );

        let err = build_all(vec![
            section(Directive::Note, "why", 1, ""),
            section(Directive::EndNote, "", 2, ""),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            TemplateError::ExtraneousArgument { directive: Directive::Note, line: 1 }
        );

        let err = build_all(vec![
            section(Directive::For, "x", 1, ""),
            section(Directive::EndFor, "x", 2, ""),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            TemplateError::ExtraneousArgument { directive: Directive::EndFor, line: 2 }
        );
    }

    #[test]
    fn mismatched_delimiter_in_nested_body_aborts() {
        let err = build_all(vec![
            section(Directive::If, "x", 1, ""),
            section(Directive::Else, "", 2, "a $3:b\n"),
            section(Directive::EndIf, "", 4, ""),
        ])
        .unwrap_err();
        assert_eq!(err, TemplateError::MismatchedDelimiter { line: 3 });
    }

    #[test]
    fn note_compiles_its_nested_blocks() {
        let blocks = build_all(vec![
            section(Directive::Note, "", 1, ""),
            section(Directive::If, "x", 2, "a\n"),
            section(Directive::Else, "", 3, "b\n"),
            section(Directive::EndIf, "", 4, ""),
            section(Directive::EndNote, "", 5, ""),
        ])
        .unwrap();
        assert_eq!(shape(&blocks), vec![(Directive::Note, 1, 2), (Directive::EndNote, 5, 0)]);
        let Block::If(if_block) = &blocks[0].children()[0] else { panic!("expected if block") };
        assert_eq!(if_block.else_branch.as_ref().map(|b| b.contents.line), Some(3));

        let err = build_all(vec![
            section(Directive::Note, "", 1, ""),
            section(Directive::Once, "", 2, "cost $2:5\n"),
            section(Directive::EndNote, "", 3, ""),
        ])
        .unwrap_err();
        assert_eq!(err, TemplateError::MismatchedDelimiter { line: 2 });
    }
}
