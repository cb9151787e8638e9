//! emberc-lex - Lexical analysis for Ember
//!
//! Transforms UTF-8 source text into a finite token stream. The lexer is a
//! single-pass scanner: for each token it skips whitespace, marks its
//! position, and then tries an ordered list of candidate recognizers keyed
//! by the leading character; a recognizer that fails restores the marked
//! position so the next candidate sees pristine input.
//!
//! Tokens carry their lexeme, numeric radix and sub-kind, and a [`Span`]
//! into the source buffer.
//!
//! [`Span`]: emberc_util::Span

mod lexer;
mod token;

pub use lexer::Lexer;
pub use token::{NumberKind, Token, TokenKind};
