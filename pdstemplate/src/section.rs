use std::fmt;

/// The directive keyword that opens a section of template source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Directive {
    Once,
    Note,
    For,
    If,
    ElseIf,
    Else,
    EndFor,
    EndIf,
    EndNote,
}

impl Directive {
    /// Every directive. `ElseIf` precedes `Else` so prefix matching finds the longer keyword.
    pub const ALL: [Directive; 9] = [
        Directive::Once,
        Directive::Note,
        Directive::For,
        Directive::If,
        Directive::ElseIf,
        Directive::Else,
        Directive::EndFor,
        Directive::EndIf,
        Directive::EndNote,
    ];

    /// The keyword as written after the `$`.
    pub fn keyword(self) -> &'static str {
        match self {
            Directive::Once => "ONCE",
            Directive::Note => "NOTE",
            Directive::For => "FOR",
            Directive::If => "IF",
            Directive::ElseIf => "ELSE_IF",
            Directive::Else => "ELSE",
            Directive::EndFor => "END_FOR",
            Directive::EndIf => "END_IF",
            Directive::EndNote => "END_NOTE",
        }
    }

    /// The directive that must precede this one, for directives that continue or close a block.
    pub fn opener(self) -> Option<Directive> {
        match self {
            Directive::EndFor => Some(Directive::For),
            Directive::EndNote => Some(Directive::Note),
            Directive::ElseIf | Directive::Else | Directive::EndIf => Some(Directive::If),
            Directive::Once | Directive::Note | Directive::For | Directive::If => None,
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.keyword())
    }
}

/// What a matched terminator does to the scope stack when it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeAction {
    /// `$END_NOTE`: nothing was pushed.
    Keep,
    /// `$END_FOR` and `$END_IF`: drop the scope pushed by the opener.
    Pop,
}

/// One header-delimited span of template source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub directive: Directive,
    /// The parenthesized argument with its parentheses removed, or empty.
    pub arg: String,
    /// 1-based source line of the header.
    pub line: usize,
    /// Text up to the next header. Every `$` is followed by `<line>:`.
    pub body: String,
    /// Set on a terminator once its opener has claimed it; the section then
    /// compiles as a `$ONCE` block.
    pub closing: Option<ScopeAction>,
}

impl Section {
    pub fn new(
        directive: Directive,
        arg: impl Into<String>,
        line: usize,
        body: impl Into<String>,
    ) -> Self {
        Section {
            directive,
            arg: arg.into(),
            line,
            body: body.into(),
            closing: None,
        }
    }
}
