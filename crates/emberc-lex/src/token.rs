//! Token definitions.

use emberc_util::Span;

/// The closed set of token kinds.
///
/// Operators, punctuation, keywords, and literal categories; `Eof` is the
/// distinguished end-of-file sentinel the lexer emits exactly once.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Invalid,
    Plus,
    Bang,
    Pipe,
    Minus,
    Slash,
    Caret,
    Tilde,
    Colon,
    Comma,
    Label,
    Equals,
    Period,
    Percent,
    Question,
    Asterisk,
    Exponent,
    Ampersand,
    Attribute,
    Directive,
    LessThan,
    RawBlock,
    NotEquals,
    LeftParen,
    SemiColon,
    Identifier,
    Assignment,
    LogicalOr,
    LogicalAnd,
    RightParen,
    Eof,
    GreaterThan,
    LineComment,
    BlockComment,
    NumberLiteral,
    ScopeOperator,
    StringLiteral,
    LessThanEqual,
    SpreadOperator,
    LeftCurlyBrace,
    RightCurlyBrace,
    CharacterLiteral,
    GreaterThanEqual,
    ConstantAssignment,
    LeftSquareBracket,
    RightSquareBracket,
    // Keywords
    If,
    In,
    For,
    Xor,
    Shl,
    Shr,
    Rol,
    Ror,
    Else,
    True,
    Null,
    Enum,
    Cast,
    From,
    Proc,
    With,
    False,
    Break,
    While,
    Defer,
    Union,
    ElseIf,
    Module,
    Struct,
    Return,
    Import,
    Continue,
    Namespace,
    Transmute,
}

impl TokenKind {
    /// Stable diagnostic name for this kind.
    pub fn name(&self) -> &'static str {
        match self {
            TokenKind::Invalid => "invalid",
            TokenKind::Plus => "plus",
            TokenKind::Bang => "bang",
            TokenKind::Pipe => "pipe",
            TokenKind::Minus => "minus",
            TokenKind::Slash => "slash",
            TokenKind::Caret => "caret",
            TokenKind::Tilde => "tilde",
            TokenKind::Colon => "colon",
            TokenKind::Comma => "comma",
            TokenKind::Label => "label",
            TokenKind::Equals => "equals",
            TokenKind::Period => "period",
            TokenKind::Percent => "percent",
            TokenKind::Question => "question",
            TokenKind::Asterisk => "asterisk",
            TokenKind::Exponent => "exponent",
            TokenKind::Ampersand => "ampersand",
            TokenKind::Attribute => "attribute",
            TokenKind::Directive => "directive",
            TokenKind::LessThan => "less_than",
            TokenKind::RawBlock => "raw_block",
            TokenKind::NotEquals => "not_equals",
            TokenKind::LeftParen => "left_paren",
            TokenKind::SemiColon => "semi_colon",
            TokenKind::Identifier => "identifier",
            TokenKind::Assignment => "assignment",
            TokenKind::LogicalOr => "logical_or",
            TokenKind::LogicalAnd => "logical_and",
            TokenKind::RightParen => "right_paren",
            TokenKind::Eof => "end_of_file",
            TokenKind::GreaterThan => "greater_than",
            TokenKind::LineComment => "line_comment",
            TokenKind::BlockComment => "block_comment",
            TokenKind::NumberLiteral => "number_literal",
            TokenKind::ScopeOperator => "scope_operator",
            TokenKind::StringLiteral => "string_literal",
            TokenKind::LessThanEqual => "less_than_equal",
            TokenKind::SpreadOperator => "spread_operator",
            TokenKind::LeftCurlyBrace => "left_curly_brace",
            TokenKind::RightCurlyBrace => "right_curly_brace",
            TokenKind::CharacterLiteral => "character_literal",
            TokenKind::GreaterThanEqual => "greater_than_equal",
            TokenKind::ConstantAssignment => "constant_assignment",
            TokenKind::LeftSquareBracket => "left_square_bracket",
            TokenKind::RightSquareBracket => "right_square_bracket",
            TokenKind::If => "if_literal",
            TokenKind::In => "in_literal",
            TokenKind::For => "for_literal",
            TokenKind::Xor => "xor_literal",
            TokenKind::Shl => "shl_literal",
            TokenKind::Shr => "shr_literal",
            TokenKind::Rol => "rol_literal",
            TokenKind::Ror => "ror_literal",
            TokenKind::Else => "else_literal",
            TokenKind::True => "true_literal",
            TokenKind::Null => "null_literal",
            TokenKind::Enum => "enum_literal",
            TokenKind::Cast => "cast_literal",
            TokenKind::From => "from_literal",
            TokenKind::Proc => "proc_literal",
            TokenKind::With => "with_literal",
            TokenKind::False => "false_literal",
            TokenKind::Break => "break_literal",
            TokenKind::While => "while_literal",
            TokenKind::Defer => "defer_literal",
            TokenKind::Union => "union_literal",
            TokenKind::ElseIf => "else_if_literal",
            TokenKind::Module => "module_literal",
            TokenKind::Struct => "struct_literal",
            TokenKind::Return => "return_literal",
            TokenKind::Import => "import_literal",
            TokenKind::Continue => "continue_literal",
            TokenKind::Namespace => "namespace_literal",
            TokenKind::Transmute => "transmute_literal",
        }
    }
}

/// Numeric sub-kind of a number literal token.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NumberKind {
    #[default]
    None,
    Integer,
    FloatingPoint,
}

/// A single lexed token.
///
/// Immutable once produced: the parser only ever reads these.
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    /// Kind tag
    pub kind: TokenKind,
    /// Lexeme text (radix prefix and elided underscores removed for numbers)
    pub value: String,
    /// Numeric radix: 2, 8, 10, or 16
    pub radix: u8,
    /// Numeric sub-kind
    pub number_kind: NumberKind,
    /// Source location
    pub span: Span,
}

impl Token {
    /// Create a token with the given kind and lexeme.
    pub fn new(kind: TokenKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
            radix: 10,
            number_kind: NumberKind::None,
            span: Span::DUMMY,
        }
    }

    /// The distinguished end-of-file token.
    pub fn eof() -> Self {
        Self::new(TokenKind::Eof, "")
    }

    /// Diagnostic name of the token's kind.
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }

    pub fn is_label(&self) -> bool {
        self.kind == TokenKind::Label
    }

    pub fn is_comment(&self) -> bool {
        matches!(self.kind, TokenKind::LineComment | TokenKind::BlockComment)
    }

    pub fn is_attribute(&self) -> bool {
        self.kind == TokenKind::Attribute
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self.kind, TokenKind::True | TokenKind::False)
    }

    pub fn is_numeric(&self) -> bool {
        self.kind == TokenKind::NumberLiteral
    }

    /// Boolean value of a `true`/`false` token.
    pub fn as_bool(&self) -> bool {
        self.kind == TokenKind::True
    }

    /// Parse an integer literal using the recorded radix.
    pub fn parse_u64(&self) -> Option<u64> {
        if self.number_kind != NumberKind::Integer {
            return None;
        }
        u64::from_str_radix(&self.value, self.radix as u32).ok()
    }

    /// Parse a floating-point literal.
    pub fn parse_f64(&self) -> Option<f64> {
        if self.number_kind != NumberKind::FloatingPoint {
            return None;
        }
        self.value.parse::<f64>().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(TokenKind::SemiColon.name(), "semi_colon");
        assert_eq!(TokenKind::ConstantAssignment.name(), "constant_assignment");
        assert_eq!(TokenKind::Eof.name(), "end_of_file");
    }

    #[test]
    fn test_parse_u64_radix() {
        let mut token = Token::new(TokenKind::NumberLiteral, "ff");
        token.radix = 16;
        token.number_kind = NumberKind::Integer;
        assert_eq!(token.parse_u64(), Some(255));

        token.value = "101".to_string();
        token.radix = 2;
        assert_eq!(token.parse_u64(), Some(5));

        token.value = "17".to_string();
        token.radix = 8;
        assert_eq!(token.parse_u64(), Some(15));
    }

    #[test]
    fn test_parse_f64() {
        let mut token = Token::new(TokenKind::NumberLiteral, "3.25");
        token.number_kind = NumberKind::FloatingPoint;
        assert_eq!(token.parse_f64(), Some(3.25));
        assert_eq!(token.parse_u64(), None);
    }

    #[test]
    fn test_as_bool() {
        assert!(Token::new(TokenKind::True, "true").as_bool());
        assert!(!Token::new(TokenKind::False, "false").as_bool());
    }
}
