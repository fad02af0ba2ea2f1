use std::collections::VecDeque;
use std::fmt::Write;

use crate::body::DELIMITER;
use crate::section::{Directive, Section};

/// A recognized header line.
struct Header {
    directive: Directive,
    arg: String,
    /// Byte offset just past the header's line terminator.
    end: usize,
    /// Line terminators consumed by the header, including any inside its argument.
    newlines: usize,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Split template source into sections.
///
/// A header is a line holding only a directive such as `$FOR(targets)`, optionally
/// indented. Header lines are removed from the text entirely; each section's body is
/// the text between its header and the next one. Text ahead of the first header
/// becomes a `$ONCE` section at line 1.
pub fn scan(source: &str) -> VecDeque<Section> {
    let mut sections = VecDeque::new();
    let mut current = Section::new(Directive::Once, "", 1, "");
    let mut leading = true;
    let mut pos = 0;
    let mut line = 1;

    while pos < source.len() {
        if let Some(header) = match_header(source, pos) {
            if !(leading && current.body.is_empty()) {
                sections.push_back(current);
            }
            current = Section::new(header.directive, header.arg, line, "");
            leading = false;
            line += header.newlines;
            pos = header.end;
            continue;
        }

        let end = source[pos..]
            .find('\n')
            .map(|i| pos + i + 1)
            .unwrap_or(source.len());
        annotate_delimiters(&mut current.body, &source[pos..end], line);
        if source[..end].ends_with('\n') {
            line += 1;
        }
        pos = end;
    }

    if !(leading && current.body.is_empty()) {
        sections.push_back(current);
    }
    sections
}

/// Append `text` to `body`, writing `<line>:` after every delimiter.
pub fn annotate_delimiters(body: &mut String, text: &str, line: usize) {
    for c in text.chars() {
        body.push(c);
        if c == DELIMITER {
            let _ = write!(body, "{line}:");
        }
    }
}

// ---------------------------------------------------------------------------
// Header recognition
// ---------------------------------------------------------------------------

fn match_header(source: &str, pos: usize) -> Option<Header> {
    let rest = &source[pos..];
    let unindented = rest.trim_start_matches([' ', '\t']);
    let after_dollar = unindented.strip_prefix(DELIMITER)?;

    let directive = Directive::ALL.into_iter().find(|d| {
        after_dollar
            .strip_prefix(d.keyword())
            .is_some_and(|tail| !tail.starts_with(is_identifier_char))
    })?;

    let mut cursor = pos + (rest.len() - unindented.len()) + 1 + directive.keyword().len();
    let mut arg = String::new();
    let mut newlines = 0;

    if source[cursor..].starts_with('(') {
        let close = matching_paren(source, cursor)?;
        arg = source[cursor + 1..close].to_string();
        newlines += arg.matches('\n').count();
        cursor = close + 1;
    }

    let tail = &source[cursor..];
    let trimmed = tail.trim_start_matches([' ', '\t']);
    cursor += tail.len() - trimmed.len();
    if trimmed.starts_with("\r\n") {
        cursor += 2;
        newlines += 1;
    } else if trimmed.starts_with('\n') {
        cursor += 1;
        newlines += 1;
    } else if !trimmed.is_empty() {
        return None;
    }

    Some(Header {
        directive,
        arg,
        end: cursor,
        newlines,
    })
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Byte offset of the `)` balancing the `(` at `open`. Parentheses inside quoted
/// strings don't count.
fn matching_paren(source: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (offset, c) in source[open..].char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }
    None
}
