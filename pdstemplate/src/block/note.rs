use std::collections::VecDeque;

use crate::block::{Contents, build_children, claim_terminator, reject_argument};
use crate::parser::TemplateError;
use crate::section::{Directive, ScopeAction, Section};

/// Text between `$NOTE` and `$END_NOTE`. Its children are parsed only so that the
/// headers inside it balance; nothing in it ever runs.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteBlock {
    pub contents: Contents,
}

impl NoteBlock {
    pub(crate) fn build(section: Section, sections: &mut VecDeque<Section>) -> Result<Self, TemplateError> {
        reject_argument(&section)?;
        let mut contents = Contents::new(&section)?;
        build_children(&section, sections, &[Directive::EndNote], &mut contents.children)?;
        claim_terminator(sections, ScopeAction::Keep);
        Ok(NoteBlock { contents })
    }
}
