pub mod error;
pub mod expression;

pub use error::{ParseError, TemplateError};
pub use expression::parse_expression;
