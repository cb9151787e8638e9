//! The Pratt parser.
//!
//! `parse_expression(min_precedence)` consumes one token, dispatches it
//! through the prefix table, then loops: while the peeked token's infix
//! precedence exceeds `min_precedence`, consume it and hand the left-hand
//! side to its infix parselet. Left-associative operators parse their
//! right-hand side at their own precedence; right-associative ones
//! (assignment, exponent) at one less.
//!
//! Every parselet reports failures through the shared diagnostic handler
//! and returns `None` to unwind; nothing panics and nothing throws.

use std::collections::VecDeque;

use emberc_lex::{Lexer, Token, TokenKind};
use emberc_util::{Handler, SourceBuffer, Span};

use crate::ast::{AstBuilder, AstKind, AstNode, AstNodeId};

/// The precedence ladder, lowest binding first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Precedence {
    Lowest = 0,
    Assignment,
    KeyValue,
    Conditional,
    Comma,
    Sum,
    Product,
    Logical,
    Relational,
    Bitwise,
    Exponent,
    Prefix,
    Postfix,
    Type,
    Variable,
    PointerDereference,
    Subscript,
    Cast,
    BlockComment,
    Call,
}

impl Precedence {
    #[inline]
    fn level(self) -> u8 {
        self as u8
    }
}

/// Prefix parselets, keyed by the token kind that begins an expression.
#[derive(Clone, Copy, Debug)]
enum PrefixParselet {
    Symbol,
    Number,
    String,
    Character,
    Boolean,
    Null,
    LineComment,
    BlockComment,
    RawBlock,
    Attribute,
    Directive,
    Group,
    Scope,
    Unary(Precedence),
    Import,
    Break,
    Continue,
    If,
    While,
    ForIn,
    Return,
    Proc,
    ModuleRef,
    Cast,
    Transmute,
    Label,
    From,
    Defer,
    With,
    Namespace,
    Struct,
    Union,
    Enum,
    ArraySubscript,
}

fn prefix_parselet(kind: TokenKind) -> Option<PrefixParselet> {
    use TokenKind::*;
    Some(match kind {
        Identifier => PrefixParselet::Symbol,
        NumberLiteral => PrefixParselet::Number,
        StringLiteral => PrefixParselet::String,
        CharacterLiteral => PrefixParselet::Character,
        True | False => PrefixParselet::Boolean,
        Null => PrefixParselet::Null,
        LineComment => PrefixParselet::LineComment,
        BlockComment => PrefixParselet::BlockComment,
        RawBlock => PrefixParselet::RawBlock,
        Attribute => PrefixParselet::Attribute,
        Directive => PrefixParselet::Directive,
        LeftParen => PrefixParselet::Group,
        LeftCurlyBrace => PrefixParselet::Scope,
        Minus => PrefixParselet::Unary(Precedence::Sum),
        Bang | Tilde => PrefixParselet::Unary(Precedence::Prefix),
        Import => PrefixParselet::Import,
        Break => PrefixParselet::Break,
        Continue => PrefixParselet::Continue,
        If => PrefixParselet::If,
        While => PrefixParselet::While,
        For => PrefixParselet::ForIn,
        Return => PrefixParselet::Return,
        Proc => PrefixParselet::Proc,
        Module => PrefixParselet::ModuleRef,
        Cast => PrefixParselet::Cast,
        Transmute => PrefixParselet::Transmute,
        Label => PrefixParselet::Label,
        From => PrefixParselet::From,
        Defer => PrefixParselet::Defer,
        With => PrefixParselet::With,
        Namespace => PrefixParselet::Namespace,
        Struct => PrefixParselet::Struct,
        Union => PrefixParselet::Union,
        Enum => PrefixParselet::Enum,
        LeftSquareBracket => PrefixParselet::ArraySubscript,
        _ => return None,
    })
}

/// Infix parselets, keyed by the token kind that continues an expression.
#[derive(Clone, Copy, Debug)]
enum InfixParselet {
    Binary {
        precedence: Precedence,
        right_associative: bool,
    },
    Assignment {
        constant: bool,
    },
    Comma,
    Call,
    TypeAnnotation,
    Subscript,
    BlockComment,
}

impl InfixParselet {
    fn precedence(&self) -> Precedence {
        match self {
            InfixParselet::Binary { precedence, .. } => *precedence,
            InfixParselet::Assignment { .. } => Precedence::Assignment,
            InfixParselet::Comma => Precedence::Comma,
            InfixParselet::Call => Precedence::Call,
            InfixParselet::TypeAnnotation => Precedence::Type,
            InfixParselet::Subscript => Precedence::Subscript,
            InfixParselet::BlockComment => Precedence::BlockComment,
        }
    }
}

fn infix_parselet(kind: TokenKind) -> Option<InfixParselet> {
    use TokenKind::*;
    let binary = |precedence, right_associative| InfixParselet::Binary {
        precedence,
        right_associative,
    };
    Some(match kind {
        Plus | Minus => binary(Precedence::Sum, false),
        Asterisk | Slash | Percent => binary(Precedence::Product, false),
        Exponent => binary(Precedence::Exponent, true),
        LogicalAnd | LogicalOr => binary(Precedence::Logical, false),
        Equals | NotEquals | LessThan | LessThanEqual | GreaterThan | GreaterThanEqual => {
            binary(Precedence::Relational, false)
        }
        Ampersand | Pipe | Xor | Shl | Shr | Rol | Ror => binary(Precedence::Bitwise, false),
        Assignment => InfixParselet::Assignment { constant: false },
        ConstantAssignment => InfixParselet::Assignment { constant: true },
        Comma => InfixParselet::Comma,
        LeftParen => InfixParselet::Call,
        Colon => InfixParselet::TypeAnnotation,
        LeftSquareBracket => InfixParselet::Subscript,
        BlockComment => InfixParselet::BlockComment,
        _ => return None,
    })
}

/// The parser. Owns the lexer and the AST builder; borrows the diagnostic
/// handler from the session.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    handler: &'a Handler,
    builder: AstBuilder,
    tokens: VecDeque<Token>,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a SourceBuffer, handler: &'a Handler) -> Self {
        Self {
            lexer: Lexer::new(source),
            handler,
            builder: AstBuilder::new(),
            tokens: VecDeque::new(),
        }
    }

    /// Parse the whole buffer into a module node.
    ///
    /// Returns `None` when parsing could not produce a tree at all; partial
    /// failures leave diagnostics behind and return what was built.
    pub fn parse(&mut self) -> Option<AstNodeId> {
        let module = self.parse_scope(Token::eof());
        if let Some((ch, span)) = self.lexer.invalid_character() {
            self.error("B001", format!("unrecognized character '{ch}'."), span);
        }
        module
    }

    /// Hand the finished arena to the caller.
    pub fn into_builder(self) -> AstBuilder {
        self.builder
    }

    pub fn builder(&self) -> &AstBuilder {
        &self.builder
    }

    fn error(&self, code: &'static str, message: impl Into<String>, span: Span) {
        self.handler.error(code, message, span);
    }

    // ------------------------------------------------------------------
    // token plumbing
    // ------------------------------------------------------------------

    fn look_ahead(&mut self, count: usize) {
        while self.tokens.len() <= count && self.lexer.has_next() {
            if let Some(token) = self.lexer.next_token() {
                self.tokens.push_back(token);
            }
        }
    }

    /// Pop the next token; `None` at end of input (the sentinel stays put).
    fn consume(&mut self) -> Option<Token> {
        self.look_ahead(0);
        match self.tokens.front() {
            Some(token) if token.is_eof() => None,
            Some(_) => self.tokens.pop_front(),
            None => None,
        }
    }

    fn current(&mut self) -> Option<Token> {
        self.look_ahead(0);
        self.tokens.front().cloned()
    }

    fn peek(&mut self, kind: TokenKind) -> bool {
        self.look_ahead(0);
        self.tokens
            .front()
            .map(|token| token.kind == kind)
            .unwrap_or(false)
    }

    /// Consume a token of the expected kind or report `B016`.
    fn expect(&mut self, kind: TokenKind) -> Option<Token> {
        self.look_ahead(0);
        match self.tokens.front() {
            Some(token) if token.kind == kind => self.tokens.pop_front(),
            Some(token) => {
                let message = format!(
                    "expected token '{}' but found '{}'.",
                    kind.name(),
                    token.name()
                );
                let span = token.span;
                self.error("B016", message, span);
                None
            }
            None => None,
        }
    }

    fn current_infix_precedence(&mut self) -> u8 {
        self.look_ahead(0);
        self.tokens
            .front()
            .and_then(|token| infix_parselet(token.kind))
            .map(|parselet| parselet.precedence().level())
            .unwrap_or(0)
    }

    // ------------------------------------------------------------------
    // expression core
    // ------------------------------------------------------------------

    /// The Pratt loop.
    pub fn parse_expression(&mut self, precedence: u8) -> Option<AstNodeId> {
        let token = self.consume()?;

        let Some(parselet) = prefix_parselet(token.kind) else {
            self.error(
                "B021",
                format!("prefix parser for token '{}' not found.", token.name()),
                token.span,
            );
            return None;
        };

        let Some(mut lhs) = self.parse_prefix(parselet, token.clone()) else {
            self.error("B021", "unexpected empty ast node.", token.span);
            return None;
        };

        if token.kind == TokenKind::LineComment || token.kind == TokenKind::Label {
            return Some(lhs);
        }

        while precedence < self.current_infix_precedence() {
            let Some(token) = self.consume() else {
                break;
            };

            let Some(parselet) = infix_parselet(token.kind) else {
                self.error(
                    "B021",
                    format!("infix parser for token '{}' not found.", token.name()),
                    token.span,
                );
                break;
            };

            match self.parse_infix(parselet, lhs, token) {
                Some(node) => lhs = node,
                None => break,
            }
            if self.handler.is_failed() {
                break;
            }
        }

        Some(lhs)
    }

    /// Parse an expression and require a specific node kind (`B031`).
    pub fn expect_expression(
        &mut self,
        expected: AstKind,
        precedence: u8,
    ) -> Option<AstNodeId> {
        let node = self.parse_expression(precedence)?;
        let actual = self.builder.node(node).kind;
        if actual != expected {
            let span = self.builder.node(node).span;
            self.error(
                "B031",
                format!("unexpected '{}', wanted '{}'.", actual.name(), expected.name()),
                span,
            );
            return None;
        }
        Some(node)
    }

    fn parse_prefix(&mut self, parselet: PrefixParselet, token: Token) -> Option<AstNodeId> {
        match parselet {
            PrefixParselet::Symbol => self.parse_symbol(token),
            PrefixParselet::Number => Some(self.builder.number_literal_node(token)),
            PrefixParselet::String => Some(self.builder.string_literal_node(token)),
            PrefixParselet::Character => Some(self.builder.character_literal_node(token)),
            PrefixParselet::Boolean => Some(self.builder.boolean_literal_node(token)),
            PrefixParselet::Null => Some(self.builder.null_literal_node(token)),
            PrefixParselet::LineComment => Some(self.builder.line_comment_node(token)),
            PrefixParselet::BlockComment => Some(self.builder.block_comment_node(token)),
            PrefixParselet::RawBlock => Some(self.builder.raw_block_node(token)),
            PrefixParselet::Attribute => self.parse_attribute(token),
            PrefixParselet::Directive => self.parse_directive(token),
            PrefixParselet::Group => self.parse_group(token),
            PrefixParselet::Scope => self.parse_scope(token),
            PrefixParselet::Unary(precedence) => self.parse_unary(token, precedence),
            PrefixParselet::Import => self.parse_import(token),
            PrefixParselet::Break => self.parse_break(token),
            PrefixParselet::Continue => self.parse_continue(token),
            PrefixParselet::If => self.parse_if(token),
            PrefixParselet::While => self.parse_while(token),
            PrefixParselet::ForIn => self.parse_for_in(token),
            PrefixParselet::Return => self.parse_return(token),
            PrefixParselet::Proc => self.parse_proc(token),
            PrefixParselet::ModuleRef => self.parse_module_reference(token),
            PrefixParselet::Cast => self.parse_cast(token, AstKind::CastExpression),
            PrefixParselet::Transmute => self.parse_cast(token, AstKind::TransmuteExpression),
            PrefixParselet::Label => Some(self.builder.label_node(token)),
            PrefixParselet::From => self.parse_from(token),
            PrefixParselet::Defer => self.parse_wrapped(token, AstKind::DeferExpression),
            PrefixParselet::With => self.parse_wrapped(token, AstKind::WithExpression),
            PrefixParselet::Namespace => self.parse_namespace(token),
            PrefixParselet::Struct => self.parse_wrapped(token, AstKind::StructExpression),
            PrefixParselet::Union => self.parse_wrapped(token, AstKind::UnionExpression),
            PrefixParselet::Enum => self.parse_wrapped(token, AstKind::EnumExpression),
            PrefixParselet::ArraySubscript => self.parse_array_subscript(token),
        }
    }

    fn parse_infix(
        &mut self,
        parselet: InfixParselet,
        lhs: AstNodeId,
        token: Token,
    ) -> Option<AstNodeId> {
        match parselet {
            InfixParselet::Binary {
                precedence,
                right_associative,
            } => self.parse_binary(lhs, token, precedence, right_associative),
            InfixParselet::Assignment { constant } => self.parse_assignment(lhs, token, constant),
            InfixParselet::Comma => self.parse_comma(lhs, token),
            InfixParselet::Call => self.parse_call(lhs, token),
            InfixParselet::TypeAnnotation => self.parse_type_annotation(lhs, token),
            InfixParselet::Subscript => self.parse_subscript(lhs, token),
            InfixParselet::BlockComment => {
                let comment = self.builder.block_comment_node(token);
                self.builder.add_child(lhs, comment);
                Some(lhs)
            }
        }
    }

    // ------------------------------------------------------------------
    // prefix parselets
    // ------------------------------------------------------------------

    /// `part` or `part::part::...::name`.
    fn parse_symbol(&mut self, token: Token) -> Option<AstNodeId> {
        let symbol = self.builder.symbol_node();
        self.builder.node_mut(symbol).span = token.span;
        let mut token = token;
        loop {
            let part = self.builder.symbol_part_node(token.clone());
            self.builder.add_child(symbol, part);
            let end = token.span;
            self.builder.node_mut(symbol).span =
                self.builder.node(symbol).span.merge(end);
            if !self.peek(TokenKind::ScopeOperator) {
                break;
            }
            self.consume();
            token = self.expect(TokenKind::Identifier)?;
        }
        Some(symbol)
    }

    fn parse_group(&mut self, _token: Token) -> Option<AstNodeId> {
        let expression = self.builder.expression_node();
        let inner = self.parse_expression(Precedence::Lowest.level())?;
        self.builder.set_lhs(expression, inner);
        self.expect(TokenKind::RightParen)?;
        Some(expression)
    }

    fn parse_unary(&mut self, token: Token, precedence: Precedence) -> Option<AstNodeId> {
        let node = self.builder.unary_operator_node(token.clone());
        let Some(rhs) = self.parse_expression(precedence.level()) else {
            self.error(
                "P019",
                "unary operator expects right-hand-side expression",
                token.span,
            );
            return None;
        };
        self.builder.set_rhs(node, rhs);
        let span = token.span.merge(self.builder.node(rhs).span);
        self.builder.node_mut(node).span = span;
        Some(node)
    }

    fn parse_attribute(&mut self, token: Token) -> Option<AstNodeId> {
        let node = self.builder.attribute_node(token);
        if self.peek(TokenKind::SemiColon) {
            return Some(node);
        }
        let value = self.parse_expression(Precedence::Lowest.level())?;
        self.builder.set_lhs(node, value);
        Some(node)
    }

    fn parse_directive(&mut self, token: Token) -> Option<AstNodeId> {
        let node = self.builder.directive_node(token);
        if self.peek(TokenKind::SemiColon) {
            return Some(node);
        }
        let value = self.parse_expression(Precedence::Lowest.level())?;
        self.builder.set_lhs(node, value);
        Some(node)
    }

    fn parse_import(&mut self, token: Token) -> Option<AstNodeId> {
        let node = self.builder.import_node(token.clone());
        let Some(target) = self.parse_expression(Precedence::Lowest.level()) else {
            self.error("P019", "import expects namespace", token.span);
            return None;
        };
        if self.builder.node(target).kind != AstKind::Symbol {
            let span = self.builder.node(target).span;
            self.error(
                "B031",
                format!(
                    "unexpected '{}', wanted 'symbol'.",
                    self.builder.node(target).kind.name()
                ),
                span,
            );
            return None;
        }
        self.builder.set_lhs(node, target);
        if self.peek(TokenKind::From) {
            let from_token = self.current()?;
            self.consume();
            let Some(source) = self.parse_expression(Precedence::Lowest.level()) else {
                self.error(
                    "P019",
                    "from expects identifier of type module",
                    from_token.span,
                );
                return None;
            };
            self.builder.set_rhs(node, source);
        }
        Some(node)
    }

    fn parse_break(&mut self, token: Token) -> Option<AstNodeId> {
        let node = self.builder.break_node(token);
        if self.peek(TokenKind::Label) {
            let label = self.parse_expression(Precedence::Lowest.level())?;
            self.builder.set_lhs(node, label);
        }
        Some(node)
    }

    fn parse_continue(&mut self, token: Token) -> Option<AstNodeId> {
        let node = self.builder.continue_node(token);
        if self.peek(TokenKind::Label) {
            let label = self.parse_expression(Precedence::Lowest.level())?;
            self.builder.set_lhs(node, label);
        }
        Some(node)
    }

    /// `if` assembles a chain through `else if` / `else` into a
    /// right-linked spine: each branch's `rhs` is the next branch.
    fn parse_if(&mut self, token: Token) -> Option<AstNodeId> {
        let if_node = self.builder.if_node(token);
        let predicate = self.parse_expression(Precedence::Lowest.level())?;
        self.builder.set_lhs(if_node, predicate);
        let body = self.parse_expression(Precedence::Lowest.level())?;
        self.builder.add_child(if_node, body);

        let mut current_branch = if_node;
        while self.peek(TokenKind::ElseIf) {
            let else_if_token = self.current()?;
            self.consume();
            let branch = self.builder.else_if_node(else_if_token);
            let predicate = self.parse_expression(Precedence::Lowest.level())?;
            self.builder.set_lhs(branch, predicate);
            let body = self.parse_expression(Precedence::Lowest.level())?;
            self.builder.add_child(branch, body);
            self.builder.set_rhs(current_branch, branch);
            current_branch = branch;
        }

        if self.peek(TokenKind::Else) {
            let else_token = self.current()?;
            self.consume();
            let branch = self.builder.else_node(else_token);
            let body = self.parse_expression(Precedence::Lowest.level())?;
            self.builder.add_child(branch, body);
            self.builder.set_rhs(current_branch, branch);
        }

        Some(if_node)
    }

    fn parse_while(&mut self, token: Token) -> Option<AstNodeId> {
        let node = self.builder.while_node(token);
        let predicate = self.parse_expression(Precedence::Lowest.level())?;
        self.builder.set_lhs(node, predicate);
        let body = self.parse_expression(Precedence::Lowest.level())?;
        self.builder.add_child(node, body);
        Some(node)
    }

    /// `for <induction> in <iterable> <body>`.
    fn parse_for_in(&mut self, token: Token) -> Option<AstNodeId> {
        let node = self.builder.for_in_node(token);
        let induction = self.parse_expression(Precedence::Lowest.level())?;
        self.builder.set_lhs(node, induction);
        self.expect(TokenKind::In)?;
        let iterable = self.parse_expression(Precedence::Lowest.level())?;
        self.builder.set_rhs(node, iterable);
        let body = self.parse_expression(Precedence::Lowest.level())?;
        self.builder.add_child(node, body);
        Some(node)
    }

    fn parse_return(&mut self, token: Token) -> Option<AstNodeId> {
        let node = self.builder.return_node(token);
        if self.peek(TokenKind::SemiColon) {
            return Some(node);
        }
        let expression = self.parse_expression(Precedence::Lowest.level())?;
        let arguments = self.builder.node(node).rhs.expect("preallocated list");
        self.flatten_pairs(arguments, expression);
        Some(node)
    }

    /// `proc(<params>) [: <returns>] [<body>]`
    fn parse_proc(&mut self, token: Token) -> Option<AstNodeId> {
        let node = self.builder.proc_expression_node(token);
        self.expect(TokenKind::LeftParen)?;
        if !self.peek(TokenKind::RightParen) {
            let params = self.parse_expression(Precedence::Lowest.level())?;
            let list = self.builder.node(node).rhs.expect("preallocated list");
            self.flatten_pairs(list, params);
        }
        self.expect(TokenKind::RightParen)?;
        if self.peek(TokenKind::Colon) {
            self.consume();
            let returns = self.parse_expression(Precedence::Lowest.level())?;
            let list = self.builder.node(node).lhs.expect("preallocated list");
            self.flatten_pairs(list, returns);
        }
        if !self.peek(TokenKind::SemiColon) {
            let body = self.parse_expression(Precedence::Lowest.level())?;
            self.builder.add_child(node, body);
            while self.peek(TokenKind::Attribute) {
                let attribute = self.parse_expression(Precedence::Lowest.level())?;
                self.builder.add_child(node, attribute);
            }
        }
        Some(node)
    }

    /// `module("<path>")` with a required argument.
    fn parse_module_reference(&mut self, token: Token) -> Option<AstNodeId> {
        let node = self.builder.module_expression_node(token);
        self.expect(TokenKind::LeftParen)?;
        let path = self.parse_expression(Precedence::Lowest.level())?;
        self.builder.set_rhs(node, path);
        self.expect(TokenKind::RightParen)?;
        Some(node)
    }

    /// `cast<Type>(expr)` / `transmute<Type>(expr)`.
    fn parse_cast(&mut self, token: Token, kind: AstKind) -> Option<AstNodeId> {
        let node = match kind {
            AstKind::CastExpression => self.builder.cast_node(token.clone()),
            _ => self.builder.transmute_node(token.clone()),
        };
        self.expect(TokenKind::LessThan)?;
        let identifier = self.expect(TokenKind::Identifier)?;
        let type_node = self.builder.type_identifier_node();
        let symbol = self.parse_symbol(identifier)?;
        self.builder.set_lhs(type_node, symbol);
        self.builder.set_lhs(node, type_node);
        self.expect(TokenKind::GreaterThan)?;
        self.expect(TokenKind::LeftParen)?;
        let value = self.parse_expression(Precedence::Lowest.level())?;
        self.builder.set_rhs(node, value);
        self.expect(TokenKind::RightParen)?;
        Some(node)
    }

    /// `ns name { ... }` binds a named namespace; `ns <expr>` wraps an
    /// anonymous one.
    fn parse_namespace(&mut self, token: Token) -> Option<AstNodeId> {
        let node = self.builder.namespace_node(token);
        let inner = self.parse_expression(Precedence::Lowest.level())?;
        if self.builder.node(inner).kind == AstKind::Symbol && self.peek(TokenKind::LeftCurlyBrace)
        {
            let brace = self.current()?;
            self.consume();
            let block = self.parse_scope(brace)?;
            self.builder.set_lhs(node, inner);
            self.builder.set_rhs(node, block);
        } else {
            self.builder.set_rhs(node, inner);
        }
        Some(node)
    }

    fn parse_from(&mut self, token: Token) -> Option<AstNodeId> {
        let node = self.builder.from_node(token);
        let source = self.parse_expression(Precedence::Lowest.level())?;
        self.builder.set_rhs(node, source);
        Some(node)
    }

    /// Keyword expressions of the form `<keyword> <expression>`.
    fn parse_wrapped(&mut self, token: Token, kind: AstKind) -> Option<AstNodeId> {
        let node = match kind {
            AstKind::DeferExpression => self.builder.defer_node(token),
            AstKind::WithExpression => self.builder.with_node(token),
            AstKind::NamespaceExpression => self.builder.namespace_node(token),
            AstKind::StructExpression => self.builder.struct_node(token),
            AstKind::UnionExpression => self.builder.union_node(token),
            _ => self.builder.enum_node(token),
        };
        let inner = self.parse_expression(Precedence::Lowest.level())?;
        self.builder.set_rhs(node, inner);
        Some(node)
    }

    fn parse_array_subscript(&mut self, _token: Token) -> Option<AstNodeId> {
        let node = self.builder.subscript_node();
        if !self.peek(TokenKind::RightSquareBracket) {
            let size = self.parse_expression(Precedence::Lowest.level())?;
            self.builder.set_lhs(node, size);
        }
        self.expect(TokenKind::RightSquareBracket)?;
        Some(node)
    }

    // ------------------------------------------------------------------
    // infix parselets
    // ------------------------------------------------------------------

    fn parse_binary(
        &mut self,
        lhs: AstNodeId,
        token: Token,
        precedence: Precedence,
        right_associative: bool,
    ) -> Option<AstNodeId> {
        let rhs_precedence = precedence.level() - if right_associative { 1 } else { 0 };
        let Some(rhs) = self.parse_expression(rhs_precedence) else {
            self.error(
                "P019",
                "binary operator expects right-hand-side expression",
                token.span,
            );
            return None;
        };
        Some(self.builder.binary_operator_node(lhs, token, rhs))
    }

    /// Right-associative: the right-hand side parses at `precedence - 1`.
    fn parse_assignment(
        &mut self,
        lhs: AstNodeId,
        token: Token,
        constant: bool,
    ) -> Option<AstNodeId> {
        let kind = if constant {
            AstKind::ConstantAssignment
        } else {
            AstKind::Assignment
        };
        let node = self.builder.assignment_node(kind, token.clone());
        let targets = self.builder.node(node).lhs.expect("preallocated list");
        self.flatten_pairs(targets, lhs);

        let Some(rhs) = self.parse_expression(Precedence::Assignment.level() - 1) else {
            self.error(
                "P019",
                "assignment expects right-hand-side expression",
                token.span,
            );
            return None;
        };
        let sources = self.builder.node(node).rhs.expect("preallocated list");
        self.flatten_pairs(sources, rhs);

        let span = self
            .builder
            .node(lhs)
            .span
            .merge(self.builder.node(rhs).span);
        self.builder.node_mut(node).span = span;
        Some(node)
    }

    fn parse_comma(&mut self, lhs: AstNodeId, _token: Token) -> Option<AstNodeId> {
        let pair = self.builder.pair_node();
        self.builder.set_lhs(pair, lhs);
        let rhs = self.parse_expression(Precedence::Comma.level())?;
        self.builder.set_rhs(pair, rhs);
        Some(pair)
    }

    fn parse_call(&mut self, lhs: AstNodeId, token: Token) -> Option<AstNodeId> {
        if self.builder.node(lhs).kind != AstKind::Symbol {
            // Not a call target: treat as a parenthesized group.
            return self.parse_group(token);
        }
        let call = self.builder.proc_call_node();
        self.builder.set_lhs(call, lhs);
        let arguments = self.builder.argument_list_node();
        self.builder.set_rhs(call, arguments);
        if !self.peek(TokenKind::RightParen) {
            let expression = self.parse_expression(Precedence::Lowest.level())?;
            self.flatten_pairs(arguments, expression);
        }
        let close = self.expect(TokenKind::RightParen)?;
        let span = self.builder.node(lhs).span.merge(close.span);
        self.builder.node_mut(call).span = span;
        Some(call)
    }

    /// `lhs : Type` attaches a type identifier to the left-hand side.
    fn parse_type_annotation(&mut self, lhs: AstNodeId, token: Token) -> Option<AstNodeId> {
        let type_node = self.parse_type_identifier(token)?;
        self.builder.set_rhs(lhs, type_node);
        Some(lhs)
    }

    /// `[subscripts...] [^] [...] Name`
    fn parse_type_identifier(&mut self, token: Token) -> Option<AstNodeId> {
        let subscripts = self.builder.array_subscript_list_node();
        while self.peek(TokenKind::LeftSquareBracket) {
            let subscript = self.parse_expression(Precedence::Variable.level())?;
            self.builder.add_child(subscripts, subscript);
        }

        let mut is_pointer = false;
        let mut is_spread = false;
        if self.peek(TokenKind::Caret) {
            self.consume();
            is_pointer = true;
        }
        if self.peek(TokenKind::SpreadOperator) {
            self.consume();
            is_spread = true;
        }

        let Some(identifier) = self.expect(TokenKind::Identifier) else {
            self.error("B031", "type expected.", token.span);
            return None;
        };
        let symbol = self.parse_symbol(identifier)?;

        let type_node = self.builder.type_identifier_node();
        self.builder.set_lhs(type_node, symbol);
        self.builder.set_rhs(type_node, subscripts);

        if !self.builder.node(subscripts).children.is_empty() {
            self.builder.node_mut(type_node).flags |= AstNode::FLAG_ARRAY;
        }
        if is_pointer {
            self.builder.node_mut(type_node).flags |= AstNode::FLAG_POINTER;
        }
        if is_spread {
            self.builder.node_mut(type_node).flags |= AstNode::FLAG_SPREAD;
        }
        Some(type_node)
    }

    fn parse_subscript(&mut self, lhs: AstNodeId, _token: Token) -> Option<AstNodeId> {
        let node = self.builder.subscript_node();
        self.builder.set_lhs(node, lhs);
        if !self.peek(TokenKind::RightSquareBracket) {
            let index = self.parse_expression(Precedence::Lowest.level())?;
            self.builder.set_rhs(node, index);
        }
        self.expect(TokenKind::RightSquareBracket)?;
        Some(node)
    }

    // ------------------------------------------------------------------
    // statements and scopes
    // ------------------------------------------------------------------

    /// Read statements until `}` or end of input.
    fn parse_scope(&mut self, token: Token) -> Option<AstNodeId> {
        let scope = self.builder.begin_scope();
        self.builder.node_mut(scope).span = token.span;

        loop {
            if self.peek(TokenKind::RightCurlyBrace) {
                let close = self.expect(TokenKind::RightCurlyBrace)?;
                let span = self.builder.node(scope).span.merge(close.span);
                self.builder.node_mut(scope).span = span;
                break;
            }
            if self.peek(TokenKind::Eof) || self.current().is_none() {
                break;
            }

            let Some(node) = self.parse_statement() else {
                break;
            };
            self.builder.add_child(scope, node);

            if self.builder.node(node).kind == AstKind::Statement
                && self.expect(TokenKind::SemiColon).is_none()
            {
                self.builder.end_scope();
                return None;
            }

            // Attributes collected while parsing this statement attach to
            // its expression.
            let pending = std::mem::take(&mut self.builder.node_mut(scope).pending_attributes);
            if !pending.is_empty() {
                if let Some(expression) = self.builder.node(node).rhs {
                    for attribute in pending {
                        self.builder.add_child(expression, attribute);
                    }
                }
            }
        }

        // A trailing attribute directly before `}` attaches to the scope.
        if self.peek(TokenKind::Attribute) {
            if let Some(attribute) = self.parse_expression(Precedence::Lowest.level()) {
                self.builder.add_child(scope, attribute);
            }
        }

        self.builder.end_scope()
    }

    /// One statement: optional leading labels, attribute prefixes routed to
    /// the scope's pending list, then exactly one expression.
    fn parse_statement(&mut self) -> Option<AstNodeId> {
        let mut pending_labels = Vec::new();

        let expression = loop {
            let expression = self.parse_expression(Precedence::Lowest.level())?;
            let node = self.builder.node(expression);

            if node.is_comment() {
                return Some(expression);
            }

            if node.is_attribute() {
                if let Some(scope) = self.builder.current_scope() {
                    self.builder
                        .node_mut(scope)
                        .pending_attributes
                        .push(expression);
                }
                self.expect(TokenKind::SemiColon)?;
                continue;
            }

            if node.is_label() {
                pending_labels.push(expression);
                continue;
            }

            break expression;
        };

        let statement = self.builder.statement_node();
        if !pending_labels.is_empty() {
            let label_list = self.builder.label_list_node();
            for label in pending_labels {
                self.builder.add_child(label_list, label);
            }
            self.builder.set_lhs(statement, label_list);
        }
        self.builder.set_rhs(statement, expression);
        self.builder.node_mut(statement).span = self.builder.node(expression).span;
        Some(statement)
    }

    /// Flatten a comma-folded pair spine into ordered children of `target`.
    fn flatten_pairs(&mut self, target: AstNodeId, node: AstNodeId) {
        if self.builder.node(node).kind != AstKind::Pair {
            let span = self
                .builder
                .node(target)
                .span
                .merge(self.builder.node(node).span);
            self.builder.node_mut(target).span = span;
            self.builder.add_child(target, node);
            return;
        }
        let lhs = self.builder.node(node).lhs;
        let rhs = self.builder.node(node).rhs;
        if let Some(lhs) = lhs {
            self.flatten_pairs(target, lhs);
        }
        if let Some(rhs) = rhs {
            self.flatten_pairs(target, rhs);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_source(source: &str) -> (AstBuilder, Option<AstNodeId>, Handler) {
        let buffer = SourceBuffer::from_string("test.em", source);
        let handler = Handler::new();
        let root;
        let builder;
        {
            let mut parser = Parser::new(&buffer, &handler);
            root = parser.parse();
            builder = parser.into_builder();
        }
        (builder, root, handler)
    }

    /// First statement's expression in the module.
    fn first_expression(builder: &AstBuilder, root: AstNodeId) -> AstNodeId {
        let statement = builder.node(root).children[0];
        assert_eq!(builder.node(statement).kind, AstKind::Statement);
        builder.node(statement).rhs.unwrap()
    }

    #[test]
    fn test_assignment_shape() {
        let (builder, root, handler) = parse_source("a := 5 + 7 * 2;");
        assert!(!handler.is_failed());
        let assignment = first_expression(&builder, root.unwrap());
        assert_eq!(builder.node(assignment).kind, AstKind::Assignment);

        let targets = builder.node(assignment).lhs.unwrap();
        assert_eq!(builder.node(targets).children.len(), 1);

        let sources = builder.node(assignment).rhs.unwrap();
        let sum = builder.node(sources).children[0];
        assert_eq!(builder.node(sum).kind, AstKind::BinaryOperator);
        assert_eq!(builder.node(sum).token.value, "+");

        let five = builder.node(sum).lhs.unwrap();
        assert_eq!(builder.node(five).token.value, "5");

        let product = builder.node(sum).rhs.unwrap();
        assert_eq!(builder.node(product).token.value, "*");
        assert_eq!(
            builder.node(builder.node(product).lhs.unwrap()).token.value,
            "7"
        );
        assert_eq!(
            builder.node(builder.node(product).rhs.unwrap()).token.value,
            "2"
        );
    }

    #[test]
    fn test_precedence_pairs() {
        // (lo, hi): parsing `a lo b hi c` must yield (a lo (b hi c)).
        let cases = [
            ("+", "*"),
            ("*", "&&"),
            ("&&", "=="),
            ("==", "&"),
            ("&", "**"),
        ];
        for (lo, hi) in cases {
            let (builder, root, handler) = parse_source(&format!("r := a {lo} b {hi} c;"));
            assert!(!handler.is_failed(), "{lo} {hi}");
            let assignment = first_expression(&builder, root.unwrap());
            let sources = builder.node(assignment).rhs.unwrap();
            let outer = builder.node(sources).children[0];
            assert_eq!(builder.node(outer).token.value, lo, "outer of {lo}/{hi}");
            let inner = builder.node(outer).rhs.unwrap();
            assert_eq!(builder.node(inner).token.value, hi, "inner of {lo}/{hi}");
        }
    }

    #[test]
    fn test_subtraction_is_left_associative() {
        let (builder, root, handler) = parse_source("r := a - b - c;");
        assert!(!handler.is_failed());
        let assignment = first_expression(&builder, root.unwrap());
        let sources = builder.node(assignment).rhs.unwrap();
        let outer = builder.node(sources).children[0];
        assert_eq!(builder.node(outer).token.value, "-");
        // (a - b) - c: the left child is itself the inner subtraction.
        let inner = builder.node(outer).lhs.unwrap();
        assert_eq!(builder.node(inner).kind, AstKind::BinaryOperator);
        assert_eq!(builder.node(inner).token.value, "-");
        let c = builder.node(outer).rhs.unwrap();
        assert_eq!(builder.node(c).token.value, "c");
    }

    #[test]
    fn test_assignment_is_right_associative() {
        let (builder, root, handler) = parse_source("a := b := 1;");
        assert!(!handler.is_failed());
        let outer = first_expression(&builder, root.unwrap());
        assert_eq!(builder.node(outer).kind, AstKind::Assignment);
        let sources = builder.node(outer).rhs.unwrap();
        let inner = builder.node(sources).children[0];
        assert_eq!(builder.node(inner).kind, AstKind::Assignment);
    }

    #[test]
    fn test_scope_stack_balances_after_parse() {
        let (builder, root, handler) =
            parse_source("outer := 1; { inner := 2; mid := { deep := 3; }; };");
        assert!(!handler.is_failed());
        assert_eq!(builder.scope_depth(), 0);
        let root = root.unwrap();
        assert_eq!(builder.node(root).kind, AstKind::Module);
        // Second statement's expression is a nested block.
        let statement = builder.node(root).children[1];
        let block = builder.node(statement).rhs.unwrap();
        assert_eq!(builder.node(block).kind, AstKind::BasicBlock);
    }

    #[test]
    fn test_node_ids_monotonic() {
        let (builder, _, handler) = parse_source("a := 1; b := a + 2;");
        assert!(!handler.is_failed());
        let ids: Vec<_> = builder.iter().map(|node| node.id).collect();
        for window in ids.windows(2) {
            assert!(window[0] < window[1]);
        }
    }

    #[test]
    fn test_if_chain_spine() {
        let (builder, root, handler) =
            parse_source("if a { x := 1; } else if b { x := 2; } else { x := 3; };");
        assert!(!handler.is_failed());
        let if_node = first_expression(&builder, root.unwrap());
        assert_eq!(builder.node(if_node).kind, AstKind::IfExpression);
        let else_if = builder.node(if_node).rhs.unwrap();
        assert_eq!(builder.node(else_if).kind, AstKind::ElseIfExpression);
        let else_node = builder.node(else_if).rhs.unwrap();
        assert_eq!(builder.node(else_node).kind, AstKind::ElseExpression);
    }

    #[test]
    fn test_proc_expression_lists() {
        let (builder, root, handler) =
            parse_source("sq := proc(x : u32) : u32 { return x * x; };");
        assert!(!handler.is_failed());
        let assignment = first_expression(&builder, root.unwrap());
        let sources = builder.node(assignment).rhs.unwrap();
        let proc_node = builder.node(sources).children[0];
        assert_eq!(builder.node(proc_node).kind, AstKind::ProcExpression);

        let returns = builder.node(proc_node).lhs.unwrap();
        assert_eq!(builder.node(returns).kind, AstKind::ReturnArgumentList);
        assert_eq!(builder.node(returns).children.len(), 1);

        let parameters = builder.node(proc_node).rhs.unwrap();
        assert_eq!(builder.node(parameters).kind, AstKind::ParameterList);
        assert_eq!(builder.node(parameters).children.len(), 1);
        let param = builder.node(parameters).children[0];
        assert_eq!(builder.node(param).kind, AstKind::Symbol);
        // The `: u32` annotation hangs off the parameter symbol.
        let annotation = builder.node(param).rhs.unwrap();
        assert_eq!(builder.node(annotation).kind, AstKind::TypeIdentifier);

        // Body block.
        assert_eq!(builder.node(proc_node).children.len(), 1);
        let body = builder.node(proc_node).children[0];
        assert_eq!(builder.node(body).kind, AstKind::BasicBlock);
    }

    #[test]
    fn test_call_arguments_stay_ordered() {
        let (builder, root, handler) = parse_source("r := f(1, 2, 3);");
        assert!(!handler.is_failed());
        let assignment = first_expression(&builder, root.unwrap());
        let sources = builder.node(assignment).rhs.unwrap();
        let call = builder.node(sources).children[0];
        assert_eq!(builder.node(call).kind, AstKind::ProcCall);
        let arguments = builder.node(call).rhs.unwrap();
        let values: Vec<_> = builder
            .node(arguments)
            .children
            .iter()
            .map(|&child| builder.node(child).token.value.clone())
            .collect();
        assert_eq!(values, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_statement_labels() {
        let (builder, root, handler) = parse_source("top: again: x := 1;");
        assert!(!handler.is_failed());
        let statement = builder.node(root.unwrap()).children[0];
        let labels = builder.node(statement).lhs.unwrap();
        assert_eq!(builder.node(labels).kind, AstKind::LabelList);
        let names: Vec<_> = builder
            .node(labels)
            .children
            .iter()
            .map(|&child| builder.node(child).token.value.clone())
            .collect();
        assert_eq!(names, vec!["top", "again"]);
    }

    #[test]
    fn test_pending_attribute_transfers_to_next_statement() {
        let (builder, root, handler) = parse_source("@inline; y := proc() {};");
        assert!(!handler.is_failed());
        let statement = builder.node(root.unwrap()).children[0];
        let expression = builder.node(statement).rhs.unwrap();
        let has_attribute = builder
            .node(expression)
            .children
            .iter()
            .any(|&child| builder.node(child).kind == AstKind::Attribute);
        assert!(has_attribute);
    }

    #[test]
    fn test_nested_namespaces() {
        let (builder, root, handler) = parse_source("ns foo { ns bar { x := 1; }; };");
        assert!(!handler.is_failed());
        let outer = first_expression(&builder, root.unwrap());
        assert_eq!(builder.node(outer).kind, AstKind::NamespaceExpression);
        let outer_block = builder.node(outer).rhs.unwrap();
        assert_eq!(builder.node(outer_block).kind, AstKind::BasicBlock);
        let inner_statement = builder.node(outer_block).children[0];
        let inner = builder.node(inner_statement).rhs.unwrap();
        assert_eq!(builder.node(inner).kind, AstKind::NamespaceExpression);
    }

    #[test]
    fn test_qualified_symbol_parts() {
        let (builder, root, handler) = parse_source("v := foo::bar::x;");
        assert!(!handler.is_failed());
        let assignment = first_expression(&builder, root.unwrap());
        let sources = builder.node(assignment).rhs.unwrap();
        let symbol = builder.node(sources).children[0];
        assert!(builder.node(symbol).is_qualified_symbol());
        let parts: Vec<_> = builder
            .node(symbol)
            .children
            .iter()
            .map(|&child| builder.node(child).token.value.clone())
            .collect();
        assert_eq!(parts, vec!["foo", "bar", "x"]);
    }

    #[test]
    fn test_cast_expression() {
        let (builder, root, handler) = parse_source("v := cast<u8>(n);");
        assert!(!handler.is_failed());
        let assignment = first_expression(&builder, root.unwrap());
        let sources = builder.node(assignment).rhs.unwrap();
        let cast = builder.node(sources).children[0];
        assert_eq!(builder.node(cast).kind, AstKind::CastExpression);
        let type_node = builder.node(cast).lhs.unwrap();
        assert_eq!(builder.node(type_node).kind, AstKind::TypeIdentifier);
    }

    #[test]
    fn test_missing_prefix_reports_b021() {
        let (_, _, handler) = parse_source("a := ;");
        assert!(handler.is_failed());
        assert!(handler.diagnostics().iter().any(|d| d.code == "B021"));
    }

    #[test]
    fn test_missing_terminator_reports_b016() {
        let (_, _, handler) = parse_source("a := 1 b := 2;");
        assert!(handler.is_failed());
        assert!(handler.diagnostics().iter().any(|d| d.code == "B016"));
    }

    #[test]
    fn test_unknown_character_reports_diagnostic() {
        let (_, _, handler) = parse_source("`");
        assert!(handler.is_failed());
        assert!(handler.diagnostics().iter().any(|d| d.code == "B001"));
    }

    #[test]
    fn test_while_statement() {
        let (builder, root, handler) = parse_source("while x < 10 { x := x + 1; };");
        assert!(!handler.is_failed());
        let while_node = first_expression(&builder, root.unwrap());
        assert_eq!(builder.node(while_node).kind, AstKind::WhileStatement);
        let predicate = builder.node(while_node).lhs.unwrap();
        assert_eq!(builder.node(predicate).token.value, "<");
        assert_eq!(builder.node(while_node).children.len(), 1);
    }

    #[test]
    fn test_for_in_statement() {
        let (builder, root, handler) = parse_source("for i in items { use(i); };");
        assert!(!handler.is_failed());
        let for_node = first_expression(&builder, root.unwrap());
        assert_eq!(builder.node(for_node).kind, AstKind::ForInStatement);
        assert!(builder.node(for_node).lhs.is_some());
        assert!(builder.node(for_node).rhs.is_some());
        assert_eq!(builder.node(for_node).children.len(), 1);
    }

    #[test]
    fn test_module_reference_requires_argument() {
        let (builder, root, handler) = parse_source("core := module(\"core.em\");");
        assert!(!handler.is_failed());
        let assignment = first_expression(&builder, root.unwrap());
        let sources = builder.node(assignment).rhs.unwrap();
        let reference = builder.node(sources).children[0];
        assert_eq!(builder.node(reference).kind, AstKind::ModuleExpression);
        let path = builder.node(reference).rhs.unwrap();
        assert_eq!(builder.node(path).kind, AstKind::StringLiteral);
    }
}
