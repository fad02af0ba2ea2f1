pub mod block;
pub mod body;
pub mod expression;
pub mod parser;
pub mod scanner;
pub mod section;

use std::collections::VecDeque;

use crate::block::Block;
use crate::section::Section;

pub use parser::{ParseError, TemplateError};

/// A compiled template: a read-only block tree, safe to share between threads.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    /// Top-level blocks in document order.
    pub blocks: Vec<Block>,
    /// Where the source came from, usually a file path. Used in diagnostics and to
    /// pick the default escaping mode.
    pub name: String,
}

impl Template {
    /// Scan and build `source`. Any structural error aborts compilation.
    pub fn compile(name: impl Into<String>, source: &str) -> Result<Self, TemplateError> {
        let name = name.into();
        log::debug!("compiling template {name}");
        Self::from_sections(name, scanner::scan(source))
    }

    pub fn from_sections(name: impl Into<String>, mut sections: VecDeque<Section>) -> Result<Self, TemplateError> {
        let mut blocks = Vec::new();
        while let Some(section) = sections.pop_front() {
            blocks.push(Block::build(section, &mut sections)?);
        }
        Ok(Template {
            blocks,
            name: name.into(),
        })
    }

    /// True when the template name ends in `.xml`; such output is markup-escaped
    /// unless the caller says otherwise.
    pub fn is_xml(&self) -> bool {
        self.name.to_ascii_lowercase().ends_with(".xml")
    }
}
