use std::collections::VecDeque;
use std::sync::LazyLock;

use regex::Regex;

use crate::block::{Contents, build_children, claim_terminator, require_argument};
use crate::parser::TemplateError;
use crate::section::{Directive, ScopeAction, Section};

const WORD: &str = r" *([A-Za-z_]\w*) *";

/// `value=expr`, `value,index=expr` and `value,index,length=expr`.
static LOOP_NAMES: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [1, 2, 3].map(|count| {
        let names = vec![WORD; count].join(",");
        Regex::new(&format!(r"(?s)^{names}=([^=].*)$")).expect("invalid loop pattern")
    })
});

/// A block repeated once per element of its argument.
#[derive(Debug, Clone, PartialEq)]
pub struct ForBlock {
    pub contents: Contents,
    /// The iterable expression.
    pub expression: String,
    pub value_name: String,
    pub index_name: String,
    pub length_name: String,
}

impl ForBlock {
    pub(crate) fn build(section: Section, sections: &mut VecDeque<Section>) -> Result<Self, TemplateError> {
        require_argument(&section)?;
        let mut contents = Contents::new(&section)?;

        let mut value_name = "VALUE".to_string();
        let mut index_name = "INDEX".to_string();
        let mut length_name = "LENGTH".to_string();
        let mut expression = section.arg.clone();
        for (extra, pattern) in LOOP_NAMES.iter().enumerate() {
            if let Some(caps) = pattern.captures(&section.arg) {
                value_name = caps[1].to_string();
                if extra >= 1 {
                    index_name = caps[2].to_string();
                }
                if extra >= 2 {
                    length_name = caps[3].to_string();
                }
                expression = caps[extra + 2].to_string();
                break;
            }
        }

        build_children(&section, sections, &[Directive::EndFor], &mut contents.children)?;
        claim_terminator(sections, ScopeAction::Pop);

        Ok(ForBlock {
            contents,
            expression,
            value_name,
            index_name,
            length_name,
        })
    }
}
