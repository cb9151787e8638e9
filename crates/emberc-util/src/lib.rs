//! emberc-util - Foundation types for the Ember compiler
//!
//! This crate holds the pieces every other crate leans on: source spans,
//! the source buffer with line/column mapping, the diagnostic handler, and
//! typed arena indices. Nothing here knows about tokens, AST nodes, or the
//! VM; the dependency arrow only ever points downward to this crate.

pub mod diagnostic;
pub mod id;
pub mod source;
pub mod span;

pub use diagnostic::{Diagnostic, Handler, Level};
pub use id::{Idx, IndexVec};
pub use source::SourceBuffer;
pub use span::Span;

// Re-export the hashers the workspace standardizes on.
pub use rustc_hash::FxHashMap;
pub use rustc_hash::FxHashSet;
