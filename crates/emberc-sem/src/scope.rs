//! Scope management.
//!
//! Tracks the stack of open blocks, the per-module top-level blocks, the
//! module stack, and the queue of identifier references that were created
//! before their target existed. Qualified lookups walk namespaces from the
//! current top level; unqualified lookups walk the open scope chain
//! outward through parent links.

use crate::element::{
    BlockKind, ElementBuilder, ElementId, ElementKind, ElementPayload, QualifiedSymbol,
};

pub struct ScopeManager {
    scope_stack: Vec<ElementId>,
    top_level_stack: Vec<ElementId>,
    module_stack: Vec<ElementId>,
    unresolved: Vec<ElementId>,
}

impl ScopeManager {
    pub fn new() -> Self {
        Self {
            scope_stack: Vec::new(),
            top_level_stack: Vec::new(),
            module_stack: Vec::new(),
            unresolved: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // stacks
    // ------------------------------------------------------------------

    pub fn current_scope(&self) -> Option<ElementId> {
        self.scope_stack.last().copied()
    }

    pub fn push_scope(&mut self, block: ElementId) {
        self.scope_stack.push(block);
    }

    pub fn pop_scope(&mut self) -> Option<ElementId> {
        self.scope_stack.pop()
    }

    /// Allocate a block parented to the current scope and make it current.
    pub fn push_new_block(&mut self, builder: &mut ElementBuilder, kind: BlockKind) -> ElementId {
        let parent = self.current_scope();
        let block = builder.make_block(parent, kind);
        if let Some(parent) = parent {
            builder.block_mut(parent).blocks.push(block);
        }
        self.push_scope(block);
        block
    }

    pub fn current_top_level(&self) -> Option<ElementId> {
        self.top_level_stack.last().copied()
    }

    pub fn push_top_level(&mut self, block: ElementId) {
        self.top_level_stack.push(block);
    }

    pub fn pop_top_level(&mut self) -> Option<ElementId> {
        self.top_level_stack.pop()
    }

    pub fn current_module(&self) -> Option<ElementId> {
        self.module_stack.last().copied()
    }

    pub fn push_module(&mut self, module: ElementId) {
        self.module_stack.push(module);
    }

    pub fn pop_module(&mut self) -> Option<ElementId> {
        self.module_stack.pop()
    }

    pub fn scope_depth(&self) -> usize {
        self.scope_stack.len()
    }

    // ------------------------------------------------------------------
    // unresolved references
    // ------------------------------------------------------------------

    pub fn add_unresolved_reference(&mut self, reference: ElementId) {
        self.unresolved.push(reference);
    }

    pub fn unresolved_references(&self) -> &[ElementId] {
        &self.unresolved
    }

    pub fn take_unresolved_references(&mut self) -> Vec<ElementId> {
        std::mem::take(&mut self.unresolved)
    }

    // ------------------------------------------------------------------
    // lookup
    // ------------------------------------------------------------------

    /// The enclosing block of an arbitrary element, following parents.
    pub fn enclosing_block(builder: &ElementBuilder, mut id: ElementId) -> Option<ElementId> {
        loop {
            let element = builder.element(id);
            if element.kind() == ElementKind::Block {
                return Some(id);
            }
            id = element.parent?;
        }
    }

    /// Resolve a qualified symbol's namespace path starting at `block`,
    /// returning the block the final name should be looked up in.
    fn walk_namespaces(
        builder: &ElementBuilder,
        mut block: ElementId,
        namespaces: &[String],
    ) -> Option<ElementId> {
        for namespace in namespaces {
            let identifier = builder.block(block).identifier(namespace)?;
            let ElementPayload::Identifier { initializer, .. } = builder.element(identifier).payload
            else {
                return None;
            };
            let initializer = initializer?;
            let ElementPayload::Initializer { expression } = builder.element(initializer).payload
            else {
                return None;
            };
            let ElementPayload::Namespace { block: ns_block } = builder.element(expression).payload
            else {
                return None;
            };
            block = ns_block;
        }
        Some(block)
    }

    /// Find an identifier element for a (possibly qualified) symbol.
    ///
    /// Qualified names resolve from the current top level; unqualified
    /// names walk the current scope chain outward. `scope` overrides the
    /// starting block when supplied.
    pub fn find_identifier(
        &self,
        builder: &ElementBuilder,
        symbol: &QualifiedSymbol,
        scope: Option<ElementId>,
    ) -> Option<ElementId> {
        if symbol.is_qualified() {
            let start = scope.or_else(|| self.current_top_level())?;
            let block = Self::walk_namespaces(builder, start, &symbol.namespaces)?;
            return builder.block(block).identifier(&symbol.name);
        }

        let mut block = scope.or_else(|| self.current_scope())?;
        loop {
            if let Some(identifier) = builder.block(block).identifier(&symbol.name) {
                return Some(identifier);
            }
            let mut cursor = builder.element(block).parent?;
            // Skip over non-block owners (namespaces, modules, types).
            loop {
                if builder.element(cursor).kind() == ElementKind::Block {
                    break;
                }
                cursor = builder.element(cursor).parent?;
            }
            block = cursor;
        }
    }

    /// Find a type element by (possibly qualified) name.
    pub fn find_type(
        &self,
        builder: &ElementBuilder,
        symbol: &QualifiedSymbol,
        scope: Option<ElementId>,
    ) -> Option<ElementId> {
        if symbol.is_qualified() {
            let start = scope.or_else(|| self.current_top_level())?;
            let block = Self::walk_namespaces(builder, start, &symbol.namespaces)?;
            return builder.block(block).types.get(&symbol.name).copied();
        }

        let mut block = scope.or_else(|| self.current_scope())?;
        loop {
            if let Some(&found) = builder.block(block).types.get(&symbol.name) {
                return Some(found);
            }
            let mut cursor = builder.element(block).parent?;
            loop {
                if builder.element(cursor).kind() == ElementKind::Block {
                    break;
                }
                cursor = builder.element(cursor).parent?;
            }
            block = cursor;
        }
    }
}

impl Default for ScopeManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::BlockKind;
    use emberc_util::Span;

    #[test]
    fn test_push_new_block_nests() {
        let mut builder = ElementBuilder::new();
        let mut scopes = ScopeManager::new();
        let program = builder.make_program();
        let ElementPayload::Program { block: root } = builder.element(program).payload else {
            unreachable!()
        };
        scopes.push_scope(root);

        let inner = scopes.push_new_block(&mut builder, BlockKind::Block);
        assert_eq!(scopes.current_scope(), Some(inner));
        assert_eq!(builder.element(inner).parent, Some(root));
        assert_eq!(builder.block(root).blocks, vec![inner]);

        assert_eq!(scopes.pop_scope(), Some(inner));
        assert_eq!(scopes.current_scope(), Some(root));
    }

    #[test]
    fn test_unqualified_lookup_walks_outward() {
        let mut builder = ElementBuilder::new();
        let mut scopes = ScopeManager::new();
        let program = builder.make_program();
        let ElementPayload::Program { block: root } = builder.element(program).payload else {
            unreachable!()
        };
        scopes.push_scope(root);

        let symbol = builder.make_symbol(root, "x", Vec::new(), Span::DUMMY);
        let identifier = builder.make_identifier(root, symbol, None);
        builder.block_mut(root).add_identifier("x", identifier);

        let inner = scopes.push_new_block(&mut builder, BlockKind::Block);
        let _ = inner;
        let found = scopes.find_identifier(&builder, &QualifiedSymbol::new("x"), None);
        assert_eq!(found, Some(identifier));

        let missing = scopes.find_identifier(&builder, &QualifiedSymbol::new("y"), None);
        assert!(missing.is_none());
    }

    #[test]
    fn test_qualified_lookup_walks_namespaces() {
        let mut builder = ElementBuilder::new();
        let mut scopes = ScopeManager::new();
        let program = builder.make_program();
        let ElementPayload::Program { block: root } = builder.element(program).payload else {
            unreachable!()
        };
        scopes.push_scope(root);
        scopes.push_top_level(root);

        // Build foo::x by hand: a namespace identifier `foo` whose
        // initializer is a namespace wrapping a nested block.
        let ns_block = builder.make_block(Some(root), BlockKind::Block);
        let namespace = builder.make_namespace(root, ns_block);
        let ns_symbol = builder.make_symbol(root, "foo", Vec::new(), Span::DUMMY);
        let ns_init = builder.make_initializer(root, namespace);
        let ns_identifier = builder.make_identifier(root, ns_symbol, Some(ns_init));
        builder.block_mut(root).add_identifier("foo", ns_identifier);

        let symbol = builder.make_symbol(ns_block, "x", vec!["foo".into()], Span::DUMMY);
        let identifier = builder.make_identifier(ns_block, symbol, None);
        builder.block_mut(ns_block).add_identifier("x", identifier);

        let mut qualified = QualifiedSymbol::new("x");
        qualified.namespaces = vec!["foo".into()];
        let found = scopes.find_identifier(&builder, &qualified, None);
        assert_eq!(found, Some(identifier));
    }

    #[test]
    fn test_unresolved_queue() {
        let mut scopes = ScopeManager::new();
        scopes.add_unresolved_reference(ElementId(3));
        scopes.add_unresolved_reference(ElementId(9));
        assert_eq!(scopes.unresolved_references().len(), 2);
        let taken = scopes.take_unresolved_references();
        assert_eq!(taken, vec![ElementId(3), ElementId(9)]);
        assert!(scopes.unresolved_references().is_empty());
    }
}
