//! emberc-par - Syntax analysis for Ember
//!
//! A Pratt (top-down operator precedence) parser over the token stream.
//! Expression dispatch runs through two tables keyed by token kind: prefix
//! parselets fire when a token begins an expression, infix parselets when a
//! token continues one, with the precedence ladder deciding how far an
//! infix loop may reach.
//!
//! AST nodes live in a session-owned arena ([`AstBuilder`]); nodes refer to
//! each other by [`AstNodeId`], and parent links are maintained by the
//! builder so the finished tree can be walked in either direction.

mod ast;
mod graph;
mod parser;

pub use ast::{AstBuilder, AstKind, AstNode, AstNodeId};
pub use graph::write_ast_graph;
pub use parser::{Parser, Precedence};
