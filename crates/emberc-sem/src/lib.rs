//! emberc-sem - Semantic analysis for Ember
//!
//! The evaluator walks the AST and produces the semantic element graph: a
//! session-owned arena of typed, parented elements rooted at the program.
//! Scope blocks carry symbol and type tables; the scope manager tracks the
//! open-block, top-level, and module stacks plus the queue of identifier
//! references that could not be resolved at creation time.
//!
//! String literals are interned by content into a table of stable numeric
//! ids which the emitter later uses to generate data labels.

mod element;
mod evaluator;
mod intern;
mod scope;

pub use element::{
    Block, BlockKind, CommentKind, CompositeKind, Element, ElementBuilder, ElementId,
    ElementKind, ElementPayload, IdentifierUsage, IntrinsicKind, OperatorKind, QualifiedSymbol,
};
pub use evaluator::{resolve_references, Evaluator};
pub use intern::StringInternMap;
pub use scope::ScopeManager;
