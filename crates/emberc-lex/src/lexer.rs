//! The Ember lexer.
//!
//! Dispatch works off the leading character: [`candidates`] maps it to an
//! ordered list of recognizer functions, each of which either produces a
//! token or fails, in which case the lexer restores the marked position and
//! tries the next candidate. Keyword recognizers verify that the following
//! character is not alphanumeric, which is what keeps `returns` from lexing
//! as the `return` keyword followed by `s`.
//!
//! Numeric literals: `$` introduces hex, `@` octal, `%` binary; a bare
//! digit run is decimal, and a `.` inside it switches the token to the
//! floating-point sub-kind. Underscores are allowed anywhere in the digits
//! and elided from the token value.
//!
//! On an unrecognized leading character the lexer emits the end-of-file
//! sentinel and reports `has_next() == false`; the parser surfaces the
//! failure as a diagnostic at the most recent token's location.

use emberc_util::{SourceBuffer, Span};

use crate::token::{NumberKind, Token, TokenKind};

type Recognizer = for<'s> fn(&mut Lexer<'s>) -> Option<Token>;

/// Ordered candidate recognizers for a leading character.
///
/// More specific candidates come first: `::=` before `:=` before `::`
/// before `:`, keywords before labels before identifiers.
fn candidates(ch: u8) -> &'static [Recognizer] {
    match ch.to_ascii_lowercase() {
        b'@' => &[(|l: &mut Lexer<'_>| Lexer::attribute(l)), (|l: &mut Lexer<'_>| Lexer::number_literal(l))],
        b'#' => &[(|l: &mut Lexer<'_>| Lexer::directive(l))],
        b'+' => &[(|l: &mut Lexer<'_>| Lexer::plus(l))],
        b'-' => &[(|l: &mut Lexer<'_>| Lexer::minus(l))],
        b'/' => &[(|l: &mut Lexer<'_>| Lexer::block_comment(l)), (|l: &mut Lexer<'_>| Lexer::line_comment(l)), (|l: &mut Lexer<'_>| Lexer::slash(l))],
        b',' => &[(|l: &mut Lexer<'_>| Lexer::comma(l))],
        b'^' => &[(|l: &mut Lexer<'_>| Lexer::caret(l))],
        b'~' => &[(|l: &mut Lexer<'_>| Lexer::tilde(l))],
        b'?' => &[(|l: &mut Lexer<'_>| Lexer::question(l))],
        b'!' => &[(|l: &mut Lexer<'_>| Lexer::not_equals_operator(l)), (|l: &mut Lexer<'_>| Lexer::bang(l))],
        b'.' => &[(|l: &mut Lexer<'_>| Lexer::period(l)), (|l: &mut Lexer<'_>| Lexer::spread(l))],
        b':' => &[
            (|l: &mut Lexer<'_>| Lexer::constant_assignment(l)),
            (|l: &mut Lexer<'_>| Lexer::assignment(l)),
            (|l: &mut Lexer<'_>| Lexer::scope_operator(l)),
            (|l: &mut Lexer<'_>| Lexer::colon(l)),
        ],
        b'%' => &[(|l: &mut Lexer<'_>| Lexer::number_literal(l)), (|l: &mut Lexer<'_>| Lexer::percent(l))],
        b'*' => &[(|l: &mut Lexer<'_>| Lexer::exponent(l)), (|l: &mut Lexer<'_>| Lexer::asterisk(l))],
        b'=' => &[(|l: &mut Lexer<'_>| Lexer::equals_operator(l))],
        b'<' => &[(|l: &mut Lexer<'_>| Lexer::less_than_equal_operator(l)), (|l: &mut Lexer<'_>| Lexer::less_than_operator(l))],
        b'>' => &[
            (|l: &mut Lexer<'_>| Lexer::greater_than_equal_operator(l)),
            (|l: &mut Lexer<'_>| Lexer::greater_than_operator(l)),
        ],
        b'&' => &[(|l: &mut Lexer<'_>| Lexer::logical_and_operator(l)), (|l: &mut Lexer<'_>| Lexer::ampersand(l))],
        b'|' => &[(|l: &mut Lexer<'_>| Lexer::logical_or_operator(l)), (|l: &mut Lexer<'_>| Lexer::pipe(l))],
        b'{' => &[(|l: &mut Lexer<'_>| Lexer::raw_block(l)), (|l: &mut Lexer<'_>| Lexer::left_curly_brace(l))],
        b'}' => &[(|l: &mut Lexer<'_>| Lexer::right_curly_brace(l))],
        b'(' => &[(|l: &mut Lexer<'_>| Lexer::left_paren(l))],
        b')' => &[(|l: &mut Lexer<'_>| Lexer::right_paren(l))],
        b'[' => &[(|l: &mut Lexer<'_>| Lexer::left_square_bracket(l))],
        b']' => &[(|l: &mut Lexer<'_>| Lexer::right_square_bracket(l))],
        b';' => &[(|l: &mut Lexer<'_>| Lexer::line_terminator(l))],
        b'\'' => &[(|l: &mut Lexer<'_>| Lexer::character_literal(l))],
        b'"' => &[(|l: &mut Lexer<'_>| Lexer::string_literal(l))],
        b'$' | b'0'..=b'9' => &[(|l: &mut Lexer<'_>| Lexer::number_literal(l))],
        b'b' => &[(|l: &mut Lexer<'_>| Lexer::break_keyword(l)), (|l: &mut Lexer<'_>| Lexer::label(l)), (|l: &mut Lexer<'_>| Lexer::identifier(l))],
        b'c' => &[
            (|l: &mut Lexer<'_>| Lexer::continue_keyword(l)),
            (|l: &mut Lexer<'_>| Lexer::cast_keyword(l)),
            (|l: &mut Lexer<'_>| Lexer::label(l)),
            (|l: &mut Lexer<'_>| Lexer::identifier(l)),
        ],
        b'd' => &[(|l: &mut Lexer<'_>| Lexer::defer_keyword(l)), (|l: &mut Lexer<'_>| Lexer::label(l)), (|l: &mut Lexer<'_>| Lexer::identifier(l))],
        b'e' => &[
            (|l: &mut Lexer<'_>| Lexer::else_if_keyword(l)),
            (|l: &mut Lexer<'_>| Lexer::else_keyword(l)),
            (|l: &mut Lexer<'_>| Lexer::enum_keyword(l)),
            (|l: &mut Lexer<'_>| Lexer::label(l)),
            (|l: &mut Lexer<'_>| Lexer::identifier(l)),
        ],
        b'f' => &[
            (|l: &mut Lexer<'_>| Lexer::false_keyword(l)),
            (|l: &mut Lexer<'_>| Lexer::from_keyword(l)),
            (|l: &mut Lexer<'_>| Lexer::for_keyword(l)),
            (|l: &mut Lexer<'_>| Lexer::label(l)),
            (|l: &mut Lexer<'_>| Lexer::identifier(l)),
        ],
        b'i' => &[
            (|l: &mut Lexer<'_>| Lexer::import_keyword(l)),
            (|l: &mut Lexer<'_>| Lexer::if_keyword(l)),
            (|l: &mut Lexer<'_>| Lexer::in_keyword(l)),
            (|l: &mut Lexer<'_>| Lexer::label(l)),
            (|l: &mut Lexer<'_>| Lexer::identifier(l)),
        ],
        b'm' => &[(|l: &mut Lexer<'_>| Lexer::module_keyword(l)), (|l: &mut Lexer<'_>| Lexer::label(l)), (|l: &mut Lexer<'_>| Lexer::identifier(l))],
        b'n' => &[
            (|l: &mut Lexer<'_>| Lexer::null_keyword(l)),
            (|l: &mut Lexer<'_>| Lexer::ns_keyword(l)),
            (|l: &mut Lexer<'_>| Lexer::label(l)),
            (|l: &mut Lexer<'_>| Lexer::identifier(l)),
        ],
        b'p' => &[(|l: &mut Lexer<'_>| Lexer::proc_keyword(l)), (|l: &mut Lexer<'_>| Lexer::label(l)), (|l: &mut Lexer<'_>| Lexer::identifier(l))],
        b'r' => &[
            (|l: &mut Lexer<'_>| Lexer::return_keyword(l)),
            (|l: &mut Lexer<'_>| Lexer::rol_keyword(l)),
            (|l: &mut Lexer<'_>| Lexer::ror_keyword(l)),
            (|l: &mut Lexer<'_>| Lexer::label(l)),
            (|l: &mut Lexer<'_>| Lexer::identifier(l)),
        ],
        b's' => &[
            (|l: &mut Lexer<'_>| Lexer::struct_keyword(l)),
            (|l: &mut Lexer<'_>| Lexer::shl_keyword(l)),
            (|l: &mut Lexer<'_>| Lexer::shr_keyword(l)),
            (|l: &mut Lexer<'_>| Lexer::label(l)),
            (|l: &mut Lexer<'_>| Lexer::identifier(l)),
        ],
        b't' => &[
            (|l: &mut Lexer<'_>| Lexer::transmute_keyword(l)),
            (|l: &mut Lexer<'_>| Lexer::true_keyword(l)),
            (|l: &mut Lexer<'_>| Lexer::label(l)),
            (|l: &mut Lexer<'_>| Lexer::identifier(l)),
        ],
        b'u' => &[(|l: &mut Lexer<'_>| Lexer::union_keyword(l)), (|l: &mut Lexer<'_>| Lexer::label(l)), (|l: &mut Lexer<'_>| Lexer::identifier(l))],
        b'w' => &[
            (|l: &mut Lexer<'_>| Lexer::while_keyword(l)),
            (|l: &mut Lexer<'_>| Lexer::with_keyword(l)),
            (|l: &mut Lexer<'_>| Lexer::label(l)),
            (|l: &mut Lexer<'_>| Lexer::identifier(l)),
        ],
        b'x' => &[(|l: &mut Lexer<'_>| Lexer::xor_keyword(l)), (|l: &mut Lexer<'_>| Lexer::label(l)), (|l: &mut Lexer<'_>| Lexer::identifier(l))],
        b'a' | b'g' | b'h' | b'j' | b'k' | b'l' | b'o' | b'q' | b'v' | b'y' | b'z' | b'_' => {
            &[(|l: &mut Lexer<'_>| Lexer::label(l)), (|l: &mut Lexer<'_>| Lexer::identifier(l))]
        }
        _ => &[],
    }
}

#[derive(Clone, Copy)]
struct Mark {
    pos: usize,
    line: u32,
    column: u32,
}

/// Single-pass scanner over a borrowed source buffer.
pub struct Lexer<'a> {
    bytes: &'a [u8],
    pos: usize,
    line: u32,
    column: u32,
    mark: Mark,
    has_next: bool,
    invalid: Option<(char, Span)>,
}

impl<'a> Lexer<'a> {
    /// Create a lexer over the given source buffer.
    pub fn new(source: &'a SourceBuffer) -> Self {
        Self {
            bytes: source.content().as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
            mark: Mark {
                pos: 0,
                line: 1,
                column: 1,
            },
            has_next: true,
            invalid: None,
        }
    }

    /// False once the end-of-file sentinel has been emitted.
    pub fn has_next(&self) -> bool {
        self.has_next
    }

    /// The character that stopped the stream, if lexing halted on input no
    /// recognizer claimed.
    pub fn invalid_character(&self) -> Option<(char, Span)> {
        self.invalid
    }

    /// Produce the next token.
    ///
    /// Returns `None` after the end-of-file sentinel has been emitted.
    pub fn next_token(&mut self) -> Option<Token> {
        if !self.has_next {
            return None;
        }

        self.skip_whitespace();

        if self.at_end() {
            self.has_next = false;
            let mut token = Token::eof();
            token.span = Span::point(self.pos, self.line, self.column);
            return Some(token);
        }

        let ch = self.bytes[self.pos];
        self.set_mark();

        for recognize in candidates(ch) {
            if let Some(mut token) = recognize(self) {
                if token.is_eof() {
                    // A recognizer ran off the end of the buffer (e.g. an
                    // unterminated block comment). Stop the stream.
                    self.has_next = false;
                }
                token.span = Span::new(self.mark.pos, self.pos, self.mark.line, self.mark.column);
                return Some(token);
            }
            self.restore_mark();
        }

        // No recognizer claimed the character: emit the sentinel and stop.
        self.has_next = false;
        let span = Span::point(self.pos, self.line, self.column);
        self.invalid = Some((ch as char, span));
        let mut token = Token::eof();
        token.span = span;
        Some(token)
    }

    // ------------------------------------------------------------------
    // cursor plumbing
    // ------------------------------------------------------------------

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek_byte(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_byte_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn read_byte(&mut self) -> Option<u8> {
        let byte = self.peek_byte()?;
        self.pos += 1;
        if byte == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(byte)
    }

    fn set_mark(&mut self) {
        self.mark = Mark {
            pos: self.pos,
            line: self.line,
            column: self.column,
        };
    }

    fn restore_mark(&mut self) {
        self.pos = self.mark.pos;
        self.line = self.mark.line;
        self.column = self.mark.column;
    }

    fn skip_whitespace(&mut self) {
        while let Some(byte) = self.peek_byte() {
            if byte.is_ascii_whitespace() {
                self.read_byte();
            } else {
                break;
            }
        }
    }

    fn match_literal(&mut self, literal: &str) -> bool {
        let literal = literal.as_bytes();
        if self.pos + literal.len() > self.bytes.len() {
            return false;
        }
        if &self.bytes[self.pos..self.pos + literal.len()] != literal {
            return false;
        }
        for _ in 0..literal.len() {
            self.read_byte();
        }
        true
    }

    /// At a keyword boundary when the next character cannot continue an
    /// identifier.
    fn at_word_boundary(&self) -> bool {
        match self.peek_byte() {
            Some(ch) => !ch.is_ascii_alphanumeric() && ch != b'_',
            None => true,
        }
    }

    fn keyword(&mut self, literal: &str, kind: TokenKind) -> Option<Token> {
        if self.match_literal(literal) && self.at_word_boundary() {
            Some(Token::new(kind, literal))
        } else {
            None
        }
    }

    fn read_identifier_text(&mut self) -> Option<String> {
        let first = self.peek_byte()?;
        if first != b'_' && !first.is_ascii_alphabetic() {
            return None;
        }
        let start = self.pos;
        self.read_byte();
        while let Some(ch) = self.peek_byte() {
            if ch == b'_' || ch.is_ascii_alphanumeric() {
                self.read_byte();
            } else {
                break;
            }
        }
        Some(String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned())
    }

    /// Scan to (but not past) the terminator, returning the skipped text.
    /// Fails if the buffer ends first.
    fn read_until(&mut self, terminator: &str) -> Option<String> {
        let start = self.pos;
        let terminator = terminator.as_bytes();
        loop {
            if self.pos + terminator.len() > self.bytes.len() {
                return None;
            }
            if &self.bytes[self.pos..self.pos + terminator.len()] == terminator {
                let text = String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned();
                return Some(text);
            }
            self.read_byte();
        }
    }

    // ------------------------------------------------------------------
    // recognizers
    // ------------------------------------------------------------------

    fn single(&mut self, expected: u8, kind: TokenKind) -> Option<Token> {
        if self.peek_byte()? == expected {
            self.read_byte();
            Some(Token::new(kind, (expected as char).to_string()))
        } else {
            None
        }
    }

    fn plus(&mut self) -> Option<Token> {
        self.single(b'+', TokenKind::Plus)
    }

    fn minus(&mut self) -> Option<Token> {
        self.single(b'-', TokenKind::Minus)
    }

    fn slash(&mut self) -> Option<Token> {
        self.single(b'/', TokenKind::Slash)
    }

    fn comma(&mut self) -> Option<Token> {
        self.single(b',', TokenKind::Comma)
    }

    fn caret(&mut self) -> Option<Token> {
        self.single(b'^', TokenKind::Caret)
    }

    fn tilde(&mut self) -> Option<Token> {
        self.single(b'~', TokenKind::Tilde)
    }

    fn bang(&mut self) -> Option<Token> {
        self.single(b'!', TokenKind::Bang)
    }

    fn question(&mut self) -> Option<Token> {
        self.single(b'?', TokenKind::Question)
    }

    fn percent(&mut self) -> Option<Token> {
        self.single(b'%', TokenKind::Percent)
    }

    fn asterisk(&mut self) -> Option<Token> {
        self.single(b'*', TokenKind::Asterisk)
    }

    fn ampersand(&mut self) -> Option<Token> {
        self.single(b'&', TokenKind::Ampersand)
    }

    fn pipe(&mut self) -> Option<Token> {
        self.single(b'|', TokenKind::Pipe)
    }

    fn colon(&mut self) -> Option<Token> {
        self.single(b':', TokenKind::Colon)
    }

    fn left_paren(&mut self) -> Option<Token> {
        self.single(b'(', TokenKind::LeftParen)
    }

    fn right_paren(&mut self) -> Option<Token> {
        self.single(b')', TokenKind::RightParen)
    }

    fn left_curly_brace(&mut self) -> Option<Token> {
        self.single(b'{', TokenKind::LeftCurlyBrace)
    }

    fn right_curly_brace(&mut self) -> Option<Token> {
        self.single(b'}', TokenKind::RightCurlyBrace)
    }

    fn left_square_bracket(&mut self) -> Option<Token> {
        self.single(b'[', TokenKind::LeftSquareBracket)
    }

    fn right_square_bracket(&mut self) -> Option<Token> {
        self.single(b']', TokenKind::RightSquareBracket)
    }

    fn line_terminator(&mut self) -> Option<Token> {
        self.single(b';', TokenKind::SemiColon)
    }

    fn period(&mut self) -> Option<Token> {
        if self.peek_byte()? != b'.' {
            return None;
        }
        if self.peek_byte_at(1) == Some(b'.') {
            return None;
        }
        self.read_byte();
        Some(Token::new(TokenKind::Period, "."))
    }

    fn spread(&mut self) -> Option<Token> {
        if self.match_literal("...") {
            Some(Token::new(TokenKind::SpreadOperator, "..."))
        } else {
            None
        }
    }

    fn constant_assignment(&mut self) -> Option<Token> {
        if self.match_literal("::=") {
            Some(Token::new(TokenKind::ConstantAssignment, "::="))
        } else {
            None
        }
    }

    fn assignment(&mut self) -> Option<Token> {
        if self.match_literal(":=") {
            Some(Token::new(TokenKind::Assignment, ":="))
        } else {
            None
        }
    }

    fn scope_operator(&mut self) -> Option<Token> {
        if !self.match_literal("::") {
            return None;
        }
        match self.peek_byte() {
            Some(ch) if ch == b'_' || ch.is_ascii_alphabetic() => {
                Some(Token::new(TokenKind::ScopeOperator, "::"))
            }
            _ => None,
        }
    }

    fn equals_operator(&mut self) -> Option<Token> {
        if self.match_literal("==") {
            Some(Token::new(TokenKind::Equals, "=="))
        } else {
            None
        }
    }

    fn not_equals_operator(&mut self) -> Option<Token> {
        if self.match_literal("!=") {
            Some(Token::new(TokenKind::NotEquals, "!="))
        } else {
            None
        }
    }

    fn less_than_operator(&mut self) -> Option<Token> {
        self.single(b'<', TokenKind::LessThan)
    }

    fn less_than_equal_operator(&mut self) -> Option<Token> {
        if self.match_literal("<=") {
            Some(Token::new(TokenKind::LessThanEqual, "<="))
        } else {
            None
        }
    }

    fn greater_than_operator(&mut self) -> Option<Token> {
        self.single(b'>', TokenKind::GreaterThan)
    }

    fn greater_than_equal_operator(&mut self) -> Option<Token> {
        if self.match_literal(">=") {
            Some(Token::new(TokenKind::GreaterThanEqual, ">="))
        } else {
            None
        }
    }

    fn logical_and_operator(&mut self) -> Option<Token> {
        if self.match_literal("&&") {
            Some(Token::new(TokenKind::LogicalAnd, "&&"))
        } else {
            None
        }
    }

    fn logical_or_operator(&mut self) -> Option<Token> {
        if self.match_literal("||") {
            Some(Token::new(TokenKind::LogicalOr, "||"))
        } else {
            None
        }
    }

    fn exponent(&mut self) -> Option<Token> {
        if self.match_literal("**") {
            Some(Token::new(TokenKind::Exponent, "**"))
        } else {
            None
        }
    }

    fn attribute(&mut self) -> Option<Token> {
        if self.peek_byte()? != b'@' {
            return None;
        }
        self.read_byte();
        let name = self.read_identifier_text()?;
        Some(Token::new(TokenKind::Attribute, name))
    }

    fn directive(&mut self) -> Option<Token> {
        if self.peek_byte()? != b'#' {
            return None;
        }
        self.read_byte();
        let name = self.read_identifier_text()?;
        Some(Token::new(TokenKind::Directive, name))
    }

    fn identifier(&mut self) -> Option<Token> {
        let name = self.read_identifier_text()?;
        Some(Token::new(TokenKind::Identifier, name))
    }

    /// Identifier immediately followed by `:`, where the colon does not
    /// begin `::` or `:=`. The colon is consumed.
    fn label(&mut self) -> Option<Token> {
        let name = self.read_identifier_text()?;
        if self.peek_byte()? != b':' {
            return None;
        }
        if matches!(self.peek_byte_at(1), Some(b':') | Some(b'=')) {
            return None;
        }
        self.read_byte();
        Some(Token::new(TokenKind::Label, name))
    }

    fn string_literal(&mut self) -> Option<Token> {
        if self.peek_byte()? != b'"' {
            return None;
        }
        self.read_byte();
        let value = self.read_until("\"")?;
        self.read_byte();
        Some(Token::new(TokenKind::StringLiteral, value))
    }

    fn character_literal(&mut self) -> Option<Token> {
        if self.peek_byte()? != b'\'' {
            return None;
        }
        self.read_byte();
        let value = self.read_byte()?;
        if self.peek_byte()? != b'\'' {
            return None;
        }
        self.read_byte();
        Some(Token::new(
            TokenKind::CharacterLiteral,
            (value as char).to_string(),
        ))
    }

    fn line_comment(&mut self) -> Option<Token> {
        if !self.match_literal("//") {
            return None;
        }
        let start = self.pos;
        while let Some(ch) = self.peek_byte() {
            if ch == b'\n' {
                break;
            }
            self.read_byte();
        }
        let text = String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned();
        Some(Token::new(TokenKind::LineComment, text))
    }

    /// `/* ... */` with nesting support.
    fn block_comment(&mut self) -> Option<Token> {
        if !self.match_literal("/*") {
            return None;
        }
        let start = self.pos;
        let mut depth = 1usize;
        loop {
            if self.at_end() {
                // Unterminated comment: hand back the sentinel so the
                // stream stops here.
                return Some(Token::eof());
            }
            if self.peek_byte() == Some(b'/') && self.peek_byte_at(1) == Some(b'*') {
                depth += 1;
                self.read_byte();
                self.read_byte();
                continue;
            }
            if self.peek_byte() == Some(b'*') && self.peek_byte_at(1) == Some(b'/') {
                depth -= 1;
                if depth == 0 {
                    let text =
                        String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned();
                    self.read_byte();
                    self.read_byte();
                    return Some(Token::new(TokenKind::BlockComment, text));
                }
                self.read_byte();
                self.read_byte();
                continue;
            }
            self.read_byte();
        }
    }

    /// `{{ ... }}` verbatim block, no nesting.
    fn raw_block(&mut self) -> Option<Token> {
        if !self.match_literal("{{") {
            return None;
        }
        let value = match self.read_until("}}") {
            Some(value) => value,
            None => return Some(Token::eof()),
        };
        self.read_byte();
        self.read_byte();
        Some(Token::new(TokenKind::RawBlock, value))
    }

    fn number_literal(&mut self) -> Option<Token> {
        let mut value = String::new();
        let mut radix = 10u8;
        let mut number_kind = NumberKind::Integer;

        match self.peek_byte()? {
            b'$' => {
                radix = 16;
                self.read_byte();
                while let Some(ch) = self.peek_byte() {
                    if ch == b'_' {
                        self.read_byte();
                        continue;
                    }
                    if !ch.is_ascii_hexdigit() {
                        break;
                    }
                    value.push(self.read_byte()? as char);
                }
            }
            b'@' => {
                radix = 8;
                self.read_byte();
                while let Some(ch) = self.peek_byte() {
                    if ch == b'_' {
                        self.read_byte();
                        continue;
                    }
                    if !(b'0'..=b'7').contains(&ch) {
                        break;
                    }
                    value.push(self.read_byte()? as char);
                }
            }
            b'%' => {
                radix = 2;
                self.read_byte();
                while let Some(ch) = self.peek_byte() {
                    if ch == b'_' {
                        self.read_byte();
                        continue;
                    }
                    if ch != b'0' && ch != b'1' {
                        break;
                    }
                    value.push(self.read_byte()? as char);
                }
            }
            b'0'..=b'9' => {
                while let Some(ch) = self.peek_byte() {
                    match ch {
                        b'_' => {
                            self.read_byte();
                        }
                        b'.' => {
                            // A second period would belong to a following
                            // spread or member access, not this literal.
                            if number_kind == NumberKind::FloatingPoint
                                || !matches!(self.peek_byte_at(1), Some(b'0'..=b'9'))
                            {
                                break;
                            }
                            number_kind = NumberKind::FloatingPoint;
                            value.push(self.read_byte()? as char);
                        }
                        b'0'..=b'9' => {
                            value.push(self.read_byte()? as char);
                        }
                        _ => break,
                    }
                }
            }
            _ => return None,
        }

        if value.is_empty() {
            return None;
        }

        let mut token = Token::new(TokenKind::NumberLiteral, value);
        token.radix = radix;
        token.number_kind = number_kind;
        Some(token)
    }

    // keyword recognizers -------------------------------------------------

    fn if_keyword(&mut self) -> Option<Token> {
        self.keyword("if", TokenKind::If)
    }

    fn in_keyword(&mut self) -> Option<Token> {
        self.keyword("in", TokenKind::In)
    }

    fn for_keyword(&mut self) -> Option<Token> {
        self.keyword("for", TokenKind::For)
    }

    fn xor_keyword(&mut self) -> Option<Token> {
        self.keyword("xor", TokenKind::Xor)
    }

    fn shl_keyword(&mut self) -> Option<Token> {
        self.keyword("shl", TokenKind::Shl)
    }

    fn shr_keyword(&mut self) -> Option<Token> {
        self.keyword("shr", TokenKind::Shr)
    }

    fn rol_keyword(&mut self) -> Option<Token> {
        self.keyword("rol", TokenKind::Rol)
    }

    fn ror_keyword(&mut self) -> Option<Token> {
        self.keyword("ror", TokenKind::Ror)
    }

    fn ns_keyword(&mut self) -> Option<Token> {
        self.keyword("ns", TokenKind::Namespace)
    }

    fn else_if_keyword(&mut self) -> Option<Token> {
        self.keyword("else if", TokenKind::ElseIf)
    }

    fn else_keyword(&mut self) -> Option<Token> {
        self.keyword("else", TokenKind::Else)
    }

    fn enum_keyword(&mut self) -> Option<Token> {
        self.keyword("enum", TokenKind::Enum)
    }

    fn true_keyword(&mut self) -> Option<Token> {
        self.keyword("true", TokenKind::True)
    }

    fn false_keyword(&mut self) -> Option<Token> {
        self.keyword("false", TokenKind::False)
    }

    fn null_keyword(&mut self) -> Option<Token> {
        self.keyword("null", TokenKind::Null)
    }

    fn cast_keyword(&mut self) -> Option<Token> {
        self.keyword("cast", TokenKind::Cast)
    }

    fn from_keyword(&mut self) -> Option<Token> {
        self.keyword("from", TokenKind::From)
    }

    fn proc_keyword(&mut self) -> Option<Token> {
        self.keyword("proc", TokenKind::Proc)
    }

    fn with_keyword(&mut self) -> Option<Token> {
        self.keyword("with", TokenKind::With)
    }

    fn break_keyword(&mut self) -> Option<Token> {
        self.keyword("break", TokenKind::Break)
    }

    fn while_keyword(&mut self) -> Option<Token> {
        self.keyword("while", TokenKind::While)
    }

    fn defer_keyword(&mut self) -> Option<Token> {
        self.keyword("defer", TokenKind::Defer)
    }

    fn union_keyword(&mut self) -> Option<Token> {
        self.keyword("union", TokenKind::Union)
    }

    fn module_keyword(&mut self) -> Option<Token> {
        self.keyword("module", TokenKind::Module)
    }

    fn struct_keyword(&mut self) -> Option<Token> {
        self.keyword("struct", TokenKind::Struct)
    }

    fn return_keyword(&mut self) -> Option<Token> {
        self.keyword("return", TokenKind::Return)
    }

    fn import_keyword(&mut self) -> Option<Token> {
        self.keyword("import", TokenKind::Import)
    }

    fn continue_keyword(&mut self) -> Option<Token> {
        self.keyword("continue", TokenKind::Continue)
    }

    fn transmute_keyword(&mut self) -> Option<Token> {
        self.keyword("transmute", TokenKind::Transmute)
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_all(source: &str) -> Vec<Token> {
        let buffer = SourceBuffer::from_string("test.em", source);
        Lexer::new(&buffer).collect()
    }

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex_all(source).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_empty_source_emits_eof_once() {
        let buffer = SourceBuffer::from_string("test.em", "");
        let mut lexer = Lexer::new(&buffer);
        let token = lexer.next_token().unwrap();
        assert_eq!(token.kind, TokenKind::Eof);
        assert!(!lexer.has_next());
        assert!(lexer.next_token().is_none());
    }

    #[test]
    fn test_assignment_statement() {
        assert_eq!(
            kinds("a := 5 + 7 * 2;"),
            vec![
                TokenKind::Identifier,
                TokenKind::Assignment,
                TokenKind::NumberLiteral,
                TokenKind::Plus,
                TokenKind::NumberLiteral,
                TokenKind::Asterisk,
                TokenKind::NumberLiteral,
                TokenKind::SemiColon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_keyword_boundary() {
        // `returns` must not lex as the `return` keyword plus `s`.
        let tokens = lex_all("returns return");
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(tokens[0].value, "returns");
        assert_eq!(tokens[1].kind, TokenKind::Return);
    }

    #[test]
    fn test_colon_family() {
        assert_eq!(
            kinds("a ::= b := c::d : e"),
            vec![
                TokenKind::Identifier,
                TokenKind::ConstantAssignment,
                TokenKind::Identifier,
                TokenKind::Assignment,
                TokenKind::Identifier,
                TokenKind::ScopeOperator,
                TokenKind::Identifier,
                TokenKind::Colon,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_number_radixes() {
        let tokens = lex_all("$ff @17 %1010 42 3.5 1_000");
        assert_eq!(tokens[0].radix, 16);
        assert_eq!(tokens[0].value, "ff");
        assert_eq!(tokens[1].radix, 8);
        assert_eq!(tokens[1].value, "17");
        assert_eq!(tokens[2].radix, 2);
        assert_eq!(tokens[2].value, "1010");
        assert_eq!(tokens[3].radix, 10);
        assert_eq!(tokens[3].number_kind, NumberKind::Integer);
        assert_eq!(tokens[4].number_kind, NumberKind::FloatingPoint);
        assert_eq!(tokens[4].value, "3.5");
        assert_eq!(tokens[5].value, "1000");
    }

    #[test]
    fn test_label() {
        let tokens = lex_all("top: while");
        assert_eq!(tokens[0].kind, TokenKind::Label);
        assert_eq!(tokens[0].value, "top");
        assert_eq!(tokens[1].kind, TokenKind::While);
    }

    #[test]
    fn test_label_does_not_eat_scope_operator() {
        let tokens = lex_all("foo::bar");
        assert_eq!(
            tokens.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![
                TokenKind::Identifier,
                TokenKind::ScopeOperator,
                TokenKind::Identifier,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_typed_declaration_with_spaced_colon() {
        assert_eq!(
            kinds("x : u32 := 5;"),
            vec![
                TokenKind::Identifier,
                TokenKind::Colon,
                TokenKind::Identifier,
                TokenKind::Assignment,
                TokenKind::NumberLiteral,
                TokenKind::SemiColon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_literal_no_escapes() {
        let tokens = lex_all(r#""hello \ world""#);
        assert_eq!(tokens[0].kind, TokenKind::StringLiteral);
        assert_eq!(tokens[0].value, r"hello \ world");
    }

    #[test]
    fn test_line_comment() {
        let tokens = lex_all("a := 1; // trailing\nb := 2;");
        let comment = tokens.iter().find(|t| t.is_comment()).unwrap();
        assert_eq!(comment.kind, TokenKind::LineComment);
        assert_eq!(comment.value, " trailing");
    }

    #[test]
    fn test_nested_block_comment() {
        let tokens = lex_all("/* outer /* inner */ still outer */ a");
        assert_eq!(tokens[0].kind, TokenKind::BlockComment);
        assert_eq!(tokens[0].value, " outer /* inner */ still outer ");
        assert_eq!(tokens[1].kind, TokenKind::Identifier);
    }

    #[test]
    fn test_raw_block() {
        let tokens = lex_all("{{ bytes here }} ;");
        assert_eq!(tokens[0].kind, TokenKind::RawBlock);
        assert_eq!(tokens[0].value, " bytes here ");
        assert_eq!(tokens[1].kind, TokenKind::SemiColon);
    }

    #[test]
    fn test_attribute_vs_octal() {
        let tokens = lex_all("@inline @17");
        assert_eq!(tokens[0].kind, TokenKind::Attribute);
        assert_eq!(tokens[0].value, "inline");
        assert_eq!(tokens[1].kind, TokenKind::NumberLiteral);
        assert_eq!(tokens[1].radix, 8);
    }

    #[test]
    fn test_spread_and_period() {
        assert_eq!(
            kinds("a.b ..."),
            vec![
                TokenKind::Identifier,
                TokenKind::Period,
                TokenKind::Identifier,
                TokenKind::SpreadOperator,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_unknown_character_stops_stream() {
        let buffer = SourceBuffer::from_string("test.em", "a := `;");
        let mut lexer = Lexer::new(&buffer);
        let mut tokens = Vec::new();
        while let Some(token) = lexer.next_token() {
            tokens.push(token);
        }
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
        assert!(!lexer.has_next());
        // Only `a` and `:=` made it out before the backquote.
        assert_eq!(tokens.len(), 3);
    }

    #[test]
    fn test_else_if_fuses() {
        assert_eq!(
            kinds("if a {} else if b {} else {}"),
            vec![
                TokenKind::If,
                TokenKind::Identifier,
                TokenKind::LeftCurlyBrace,
                TokenKind::RightCurlyBrace,
                TokenKind::ElseIf,
                TokenKind::Identifier,
                TokenKind::LeftCurlyBrace,
                TokenKind::RightCurlyBrace,
                TokenKind::Else,
                TokenKind::LeftCurlyBrace,
                TokenKind::RightCurlyBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_spans_track_lines() {
        let tokens = lex_all("a := 1;\nbb := 2;");
        let bb = tokens.iter().find(|t| t.value == "bb").unwrap();
        assert_eq!(bb.span.line, 2);
        assert_eq!(bb.span.column, 1);
        assert_eq!(bb.span.len(), 2);
    }

    // ------------------------------------------------------------------
    // round-trip: rendering lexemes with whitespace re-lexes identically
    // ------------------------------------------------------------------

    fn render(token: &Token) -> String {
        match token.kind {
            TokenKind::NumberLiteral => match token.radix {
                16 => format!("${}", token.value),
                8 => format!("@{}", token.value),
                2 => format!("%{}", token.value),
                _ => token.value.clone(),
            },
            TokenKind::StringLiteral => format!("\"{}\"", token.value),
            TokenKind::CharacterLiteral => format!("'{}'", token.value),
            TokenKind::Label => format!("{}:", token.value),
            TokenKind::Attribute => format!("@{}", token.value),
            TokenKind::Directive => format!("#{}", token.value),
            TokenKind::LineComment => format!("//{}\n", token.value),
            TokenKind::BlockComment => format!("/*{}*/", token.value),
            TokenKind::RawBlock => format!("{{{{{}}}}}", token.value),
            TokenKind::Eof => String::new(),
            _ => token.value.clone(),
        }
    }

    fn assert_round_trip(source: &str) {
        let first = lex_all(source);
        let rendered = first
            .iter()
            .map(render)
            .collect::<Vec<_>>()
            .join(" ");
        let second = lex_all(&rendered);
        let strip = |tokens: &[Token]| {
            tokens
                .iter()
                .map(|t| (t.kind, t.value.clone(), t.radix))
                .collect::<Vec<_>>()
        };
        assert_eq!(strip(&first), strip(&second), "source: {source}");
    }

    #[test]
    fn test_token_round_trip() {
        assert_round_trip("a := 5 + 7 * 2;");
        assert_round_trip("ns foo { ns bar { x := 1; }; };");
        assert_round_trip("sq := proc(x : u32) : u32 { return x * x; };");
        assert_round_trip("if a == 1 { b := $ff; } else if c { d := %101; };");
        assert_round_trip("top: while x < 10 { x := x + 1; };");
        assert_round_trip("s := \"hello\"; t ::= struct { a; b; };");
        assert_round_trip("v := cast<u8>(n); w := transmute<f64>(m);");
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        const KEYWORDS: &[&str] = &[
            "if", "in", "for", "xor", "shl", "shr", "rol", "ror", "else", "true", "null",
            "enum", "cast", "from", "proc", "with", "false", "break", "while", "defer",
            "union", "module", "struct", "return", "import", "continue", "ns", "transmute",
        ];

        fn ident() -> impl Strategy<Value = String> {
            "[a-z][a-z0-9_]{0,8}".prop_filter("not a keyword", |s| !KEYWORDS.contains(&s.as_str()))
        }

        proptest! {
            #[test]
            fn prop_statement_round_trips(name in ident(), lhs in any::<u32>(), rhs in any::<u32>()) {
                assert_round_trip(&format!("{name} := {lhs} + {rhs};"));
            }

            #[test]
            fn prop_hex_literal_value_survives(value in any::<u64>()) {
                let source = format!("x := ${value:x};");
                let tokens = lex_all(&source);
                let number = tokens.iter().find(|t| t.is_numeric()).unwrap();
                prop_assert_eq!(number.radix, 16);
                prop_assert_eq!(number.parse_u64(), Some(value));
            }
        }
    }
}
