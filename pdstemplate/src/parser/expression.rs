use crate::expression::{BinaryOperator, Expression, LogicalOperator, UnaryOperator};
use crate::parser::error::ParseError;

// ---------------------------------------------------------------------------
// Token types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    // Literals
    Integer(i64),
    Float(f64),
    StringLit(String),

    Ident(String),

    // Keywords
    True,
    False,
    None,
    And,
    Or,
    Not,
    In,
    If,
    Else,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    SlashSlash,
    Percent,
    Eq,     // =
    EqEq,   // ==
    BangEq, // !=
    Gt,
    Lt,
    GtEq,
    LtEq,
    Comma,
    Dot,

    // Grouping
    LParen,
    RParen,
    LBracket,
    RBracket,
}

/// A token with the 1-based column where it starts.
type Spanned = (Token, usize);

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse the text of one embedded expression.
pub fn parse_expression(text: &str) -> Result<Expression, ParseError> {
    let tokens = tokenize(text)?;
    let end_column = text.chars().count() + 1;
    let mut parser = ExprParser::new(tokens, end_column);
    let expression = parser.parse_expr(0)?;
    if !parser.at_end() {
        return Err(parser.error("unexpected tokens after expression"));
    }
    Ok(expression)
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

fn tokenize(text: &str) -> Result<Vec<Spanned>, ParseError> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < len {
        let c = chars[i];
        let column = i + 1;
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                i += 1;
            }

            // String literal
            '"' | '\'' => {
                i += 1;
                let mut s = String::new();
                loop {
                    if i >= len {
                        return Err(ParseError::new("unterminated string literal", column));
                    }
                    match chars[i] {
                        ch if ch == c => {
                            i += 1;
                            break;
                        }
                        '\\' if i + 1 < len => {
                            s.push(match chars[i + 1] {
                                'n' => '\n',
                                't' => '\t',
                                'r' => '\r',
                                '0' => '\0',
                                other => other,
                            });
                            i += 2;
                        }
                        ch => {
                            s.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push((Token::StringLit(s), column));
            }

            // Numbers
            '0'..='9' => {
                let start = i;
                let mut is_float = false;
                while i < len && chars[i].is_ascii_digit() {
                    i += 1;
                }
                if i < len
                    && chars[i] == '.'
                    && !chars
                        .get(i + 1)
                        .is_some_and(|n| n.is_alphabetic() || *n == '_')
                {
                    is_float = true;
                    i += 1;
                    while i < len && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                if i < len && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < len && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < len && chars[j].is_ascii_digit() {
                        is_float = true;
                        i = j;
                        while i < len && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let num_str: String = chars[start..i].iter().collect();
                let token = if is_float {
                    num_str
                        .parse::<f64>()
                        .map(Token::Float)
                        .map_err(|_| ParseError::new(format!("invalid number '{num_str}'"), column))?
                } else {
                    num_str
                        .parse::<i64>()
                        .map(Token::Integer)
                        .map_err(|_| ParseError::new(format!("integer '{num_str}' is too large"), column))?
                };
                tokens.push((token, column));
            }

            // Identifiers and keywords
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < len && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                let token = match ident.as_str() {
                    "True" => Token::True,
                    "False" => Token::False,
                    "None" => Token::None,
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "in" => Token::In,
                    "if" => Token::If,
                    "else" => Token::Else,
                    _ => Token::Ident(ident),
                };
                tokens.push((token, column));
            }

            // Two-character operators
            '=' | '!' | '<' | '>' | '/' => {
                let next = chars.get(i + 1).copied();
                let (token, width) = match (c, next) {
                    ('=', Some('=')) => (Token::EqEq, 2),
                    ('=', _) => (Token::Eq, 1),
                    ('!', Some('=')) => (Token::BangEq, 2),
                    ('<', Some('=')) => (Token::LtEq, 2),
                    ('<', _) => (Token::Lt, 1),
                    ('>', Some('=')) => (Token::GtEq, 2),
                    ('>', _) => (Token::Gt, 1),
                    ('/', Some('/')) => (Token::SlashSlash, 2),
                    ('/', _) => (Token::Slash, 1),
                    _ => return Err(ParseError::new(format!("unexpected character '{c}'"), column)),
                };
                tokens.push((token, column));
                i += width;
            }

            // Single-character tokens
            _ => {
                let token = match c {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '%' => Token::Percent,
                    ',' => Token::Comma,
                    '.' => Token::Dot,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    _ => return Err(ParseError::new(format!("unexpected character '{c}'"), column)),
                };
                tokens.push((token, column));
                i += 1;
            }
        }
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Pratt parser
// ---------------------------------------------------------------------------

struct ExprParser {
    tokens: Vec<Spanned>,
    pos: usize,
    end_column: usize,
    depth: usize,
}

/// Deepest nesting of sub-expressions the parser accepts.
const MAX_NESTING: usize = 100;

// Binding powers (precedence). Higher = tighter binding.
// Left bp, right bp. For left-assoc: right = left + 1. For right-assoc: right = left.
const BP_CONDITIONAL: u8 = 2; // x if c else y
const BP_OR: u8 = 4; // or
const BP_AND: u8 = 6; // and
const BP_NOT: u8 = 8; // not
const BP_COMPARISON: u8 = 10; // == != < > <= >= in, not in
const BP_ADDITIVE: u8 = 12; // + -
const BP_MULTIPLICATIVE: u8 = 14; // * / // %
const BP_UNARY: u8 = 16; // -x +x
// Calls, indexing and method calls are applied directly in parse_expr and bind tightest.

impl ExprParser {
    fn new(tokens: Vec<Spanned>, end_column: usize) -> Self {
        ExprParser {
            tokens,
            pos: 0,
            end_column,
            depth: 0,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn peek_second(&self) -> Option<&Token> {
        self.tokens.get(self.pos + 1).map(|(token, _)| token)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(token, _)| token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn column(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map_or(self.end_column, |(_, column)| *column)
    }

    fn error(&self, msg: impl Into<String>) -> ParseError {
        ParseError::new(msg, self.column())
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), ParseError> {
        if self.peek() == Some(&expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    // ------------------------------------------------------------------
    // Pratt parser core
    // ------------------------------------------------------------------

    fn parse_expr(&mut self, min_bp: u8) -> Result<Expression, ParseError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error("expression is nested too deeply"));
        }
        self.depth += 1;
        let result = self.parse_operators(min_bp);
        self.depth -= 1;
        result
    }

    fn parse_operators(&mut self, min_bp: u8) -> Result<Expression, ParseError> {
        let mut left = self.parse_prefix()?;

        loop {
            let Some(token) = self.peek().cloned() else { break };

            // Postfix forms bind tighter than anything else
            match token {
                Token::LParen => {
                    self.advance();
                    let (arguments, keywords) = self.parse_arguments()?;
                    left = Expression::Call {
                        function: Box::new(left),
                        arguments,
                        keywords,
                    };
                    continue;
                }
                Token::LBracket => {
                    self.advance();
                    let index = self.parse_expr(0)?;
                    self.expect(Token::RBracket, "']'")?;
                    left = Expression::Index {
                        value: Box::new(left),
                        index: Box::new(index),
                    };
                    continue;
                }
                Token::Dot => {
                    self.advance();
                    let method = match self.advance() {
                        Some(Token::Ident(name)) => name,
                        _ => return Err(self.error("expected method name after '.'")),
                    };
                    if self.peek() != Some(&Token::LParen) {
                        return Err(self.error(format!("attribute '{method}' must be called")));
                    }
                    self.advance();
                    let (arguments, keywords) = self.parse_arguments()?;
                    if !keywords.is_empty() {
                        return Err(self.error("methods take no keyword arguments"));
                    }
                    left = Expression::MethodCall {
                        receiver: Box::new(left),
                        method,
                        arguments,
                    };
                    continue;
                }
                _ => {}
            }

            // Special case: conditional expression (x if c else y)
            if token == Token::If {
                if BP_CONDITIONAL < min_bp {
                    break;
                }
                self.advance();
                let condition = self.parse_expr(BP_OR)?;
                self.expect(Token::Else, "'else' in conditional expression")?;
                let false_branch = self.parse_expr(BP_CONDITIONAL)?;
                left = Expression::Conditional {
                    condition: Box::new(condition),
                    true_branch: Box::new(left),
                    false_branch: Box::new(false_branch),
                };
                continue;
            }

            let Some((l_bp, r_bp)) = infix_bp(&token, self.peek_second()) else { break };
            if l_bp < min_bp {
                break;
            }

            let Some(op) = self.advance() else { break };
            if op == Token::Not {
                // `not in`
                self.advance();
            }
            let right = self.parse_expr(r_bp)?;

            left = match op {
                Token::And => logical(LogicalOperator::And, left, right),
                Token::Or => logical(LogicalOperator::Or, left, right),
                other => {
                    let operator = match other {
                        Token::Plus => BinaryOperator::Addition,
                        Token::Minus => BinaryOperator::Subtraction,
                        Token::Star => BinaryOperator::Multiplication,
                        Token::Slash => BinaryOperator::Division,
                        Token::SlashSlash => BinaryOperator::FloorDivision,
                        Token::Percent => BinaryOperator::Modulo,
                        Token::EqEq => BinaryOperator::Equality,
                        Token::BangEq => BinaryOperator::Inequality,
                        Token::Gt => BinaryOperator::GreaterThan,
                        Token::Lt => BinaryOperator::LessThan,
                        Token::GtEq => BinaryOperator::GreaterThanOrEqual,
                        Token::LtEq => BinaryOperator::LessThanOrEqual,
                        Token::In => BinaryOperator::Membership,
                        Token::Not => BinaryOperator::NonMembership,
                        _ => return Err(self.error("unexpected infix operator")),
                    };
                    Expression::BinaryOperation {
                        operator,
                        left: Box::new(left),
                        right: Box::new(right),
                    }
                }
            };
        }

        Ok(left)
    }

    fn parse_prefix(&mut self) -> Result<Expression, ParseError> {
        let column = self.column();
        let token = self
            .advance()
            .ok_or_else(|| ParseError::new("unexpected end of expression", column))?;

        match token {
            // Literals
            Token::Integer(n) => Ok(Expression::IntegerLiteral(n)),
            Token::Float(n) => Ok(Expression::FloatLiteral(n)),
            Token::StringLit(s) => Ok(Expression::StringLiteral(s)),
            Token::True => Ok(Expression::BooleanLiteral(true)),
            Token::False => Ok(Expression::BooleanLiteral(false)),
            Token::None => Ok(Expression::NoneLiteral),

            Token::Ident(name) => Ok(Expression::Name(name)),

            // Unary operators
            Token::Minus => Ok(unary(UnaryOperator::Negation, self.parse_expr(BP_UNARY)?)),
            Token::Plus => Ok(unary(UnaryOperator::Identity, self.parse_expr(BP_UNARY)?)),
            Token::Not => Ok(unary(UnaryOperator::LogicalNot, self.parse_expr(BP_NOT)?)),

            // Parenthesized expression
            Token::LParen => {
                let expr = self.parse_expr(0)?;
                self.expect(Token::RParen, "')'")?;
                Ok(expr)
            }

            // List literal
            Token::LBracket => {
                let mut items = Vec::new();
                while self.peek() != Some(&Token::RBracket) {
                    items.push(self.parse_expr(0)?);
                    if self.peek() == Some(&Token::Comma) {
                        self.advance();
                    } else {
                        break;
                    }
                }
                self.expect(Token::RBracket, "']'")?;
                Ok(Expression::ListLiteral(items))
            }

            other => Err(ParseError::new(format!("unexpected token {other:?}"), column)),
        }
    }

    /// Parse call arguments after the opening parenthesis, through the closing one.
    fn parse_arguments(&mut self) -> Result<(Vec<Expression>, Vec<(String, Expression)>), ParseError> {
        let mut arguments = Vec::new();
        let mut keywords: Vec<(String, Expression)> = Vec::new();

        while self.peek() != Some(&Token::RParen) {
            if let (Some(Token::Ident(name)), Some(Token::Eq)) = (self.peek(), self.peek_second()) {
                let name = name.clone();
                self.pos += 2;
                keywords.push((name, self.parse_expr(0)?));
            } else if keywords.is_empty() {
                arguments.push(self.parse_expr(0)?);
            } else {
                return Err(self.error("positional argument follows keyword argument"));
            }

            if self.peek() == Some(&Token::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(Token::RParen, "')'")?;
        Ok((arguments, keywords))
    }
}

/// Infix binding powers: returns (left_bp, right_bp) or None if not infix.
fn infix_bp(token: &Token, next: Option<&Token>) -> Option<(u8, u8)> {
    match token {
        Token::Or => Some((BP_OR, BP_OR + 1)),
        Token::And => Some((BP_AND, BP_AND + 1)),
        Token::EqEq
        | Token::BangEq
        | Token::Gt
        | Token::Lt
        | Token::GtEq
        | Token::LtEq
        | Token::In => Some((BP_COMPARISON, BP_COMPARISON + 1)),
        Token::Not if next == Some(&Token::In) => Some((BP_COMPARISON, BP_COMPARISON + 1)),
        Token::Plus | Token::Minus => Some((BP_ADDITIVE, BP_ADDITIVE + 1)),
        Token::Star | Token::Slash | Token::SlashSlash | Token::Percent => {
            Some((BP_MULTIPLICATIVE, BP_MULTIPLICATIVE + 1))
        }
        _ => None,
    }
}

fn unary(operator: UnaryOperator, operand: Expression) -> Expression {
    Expression::UnaryOperation {
        operator,
        operand: Box::new(operand),
    }
}

fn logical(operator: LogicalOperator, left: Expression, right: Expression) -> Expression {
    Expression::Logical {
        operator,
        left: Box::new(left),
        right: Box::new(right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn name(n: &str) -> Expression {
        Expression::Name(n.to_string())
    }

    fn binary(operator: BinaryOperator, left: Expression, right: Expression) -> Expression {
        Expression::BinaryOperation {
            operator,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        assert_eq!(
            parse_expression("1 + 2 * x").unwrap(),
            binary(
                BinaryOperator::Addition,
                Expression::IntegerLiteral(1),
                binary(
                    BinaryOperator::Multiplication,
                    Expression::IntegerLiteral(2),
                    name("x")
                ),
            )
        );
    }

    #[test]
    fn conditional_expression() {
        assert_eq!(
            parse_expression("\"cruise\" if TIME < 2004 else \"saturn\"").unwrap(),
            Expression::Conditional {
                condition: Box::new(binary(
                    BinaryOperator::LessThan,
                    name("TIME"),
                    Expression::IntegerLiteral(2004)
                )),
                true_branch: Box::new(Expression::StringLiteral("cruise".into())),
                false_branch: Box::new(Expression::StringLiteral("saturn".into())),
            }
        );
    }

    #[test]
    fn index_then_comparison() {
        assert_eq!(
            parse_expression("naif_ids[INDEX] == 501").unwrap(),
            binary(
                BinaryOperator::Equality,
                Expression::Index {
                    value: Box::new(name("naif_ids")),
                    index: Box::new(name("INDEX")),
                },
                Expression::IntegerLiteral(501),
            )
        );
    }

    #[test]
    fn keyword_arguments_and_methods() {
        assert_eq!(
            parse_expression("BOOL(test, true='YES').lower()").unwrap(),
            Expression::MethodCall {
                receiver: Box::new(Expression::Call {
                    function: Box::new(name("BOOL")),
                    arguments: vec![name("test")],
                    keywords: vec![("true".into(), Expression::StringLiteral("YES".into()))],
                }),
                method: "lower".into(),
                arguments: vec![],
            }
        );
    }

    #[test]
    fn not_in_is_one_operator() {
        assert_eq!(
            parse_expression("x not in ['a', 'b']").unwrap(),
            binary(
                BinaryOperator::NonMembership,
                name("x"),
                Expression::ListLiteral(vec![
                    Expression::StringLiteral("a".into()),
                    Expression::StringLiteral("b".into()),
                ]),
            )
        );
    }

    #[test]
    fn not_binds_looser_than_comparison() {
        assert_eq!(
            parse_expression("not a == b").unwrap(),
            unary(
                UnaryOperator::LogicalNot,
                binary(BinaryOperator::Equality, name("a"), name("b"))
            )
        );
    }

    #[test]
    fn float_forms() {
        assert_eq!(parse_expression("3.").unwrap(), Expression::FloatLiteral(3.0));
        assert_eq!(parse_expression("2.5e3").unwrap(), Expression::FloatLiteral(2500.0));
        assert_eq!(parse_expression("1e-2").unwrap(), Expression::FloatLiteral(0.01));
    }

    #[test]
    fn errors_report_column() {
        let err = parse_expression("a +").unwrap_err();
        assert_eq!(err.message, "unexpected end of expression");
        assert_eq!(err.column, 4);

        let err = parse_expression("a b").unwrap_err();
        assert_eq!(err.column, 3);

        assert!(parse_expression("'open").is_err());
        assert!(parse_expression("x.upper").is_err());
    }

    #[test]
    fn nesting_depth_is_limited() {
        let within = format!("{}1{}", "(".repeat(50), ")".repeat(50));
        assert_eq!(parse_expression(&within).unwrap(), Expression::IntegerLiteral(1));

        let err = parse_expression(&format!("{}1{}", "[".repeat(300), "]".repeat(300))).unwrap_err();
        assert_eq!(err.message, "expression is nested too deeply");
        assert_eq!(err.column, 101);

        let err = parse_expression(&format!("{}x", "not ".repeat(200_000))).unwrap_err();
        assert_eq!(err.message, "expression is nested too deeply");
    }
}
