//! The AST evaluator.
//!
//! Walks the parsed tree and drives the element builder: one handler per
//! AST kind, dispatched from [`Evaluator::evaluate`]. Handlers construct
//! elements, attach them to the current scope, and never panic or throw;
//! failure returns `None` after recording a diagnostic, and evaluation
//! continues wherever meaningful progress is still possible.

use emberc_lex::{NumberKind, TokenKind};
use emberc_par::{AstBuilder, AstKind, AstNode, AstNodeId};
use emberc_util::{Handler, Span};

use crate::element::{
    BlockKind, CommentKind, CompositeKind, ElementBuilder, ElementId, ElementKind,
    ElementPayload, IdentifierUsage, IntrinsicKind, OperatorKind, QualifiedSymbol,
};
use crate::intern::StringInternMap;
use crate::scope::ScopeManager;

fn binary_operator_kind(kind: TokenKind) -> Option<OperatorKind> {
    Some(match kind {
        TokenKind::Plus => OperatorKind::Add,
        TokenKind::Minus => OperatorKind::Subtract,
        TokenKind::Asterisk => OperatorKind::Multiply,
        TokenKind::Slash => OperatorKind::Divide,
        TokenKind::Percent => OperatorKind::Modulo,
        TokenKind::Exponent => OperatorKind::Exponent,
        TokenKind::Equals => OperatorKind::Equals,
        TokenKind::NotEquals => OperatorKind::NotEquals,
        TokenKind::LessThan => OperatorKind::LessThan,
        TokenKind::LessThanEqual => OperatorKind::LessThanEqual,
        TokenKind::GreaterThan => OperatorKind::GreaterThan,
        TokenKind::GreaterThanEqual => OperatorKind::GreaterThanEqual,
        TokenKind::LogicalAnd => OperatorKind::LogicalAnd,
        TokenKind::LogicalOr => OperatorKind::LogicalOr,
        TokenKind::Ampersand => OperatorKind::BinaryAnd,
        TokenKind::Pipe => OperatorKind::BinaryOr,
        TokenKind::Xor => OperatorKind::BinaryXor,
        TokenKind::Shl => OperatorKind::ShiftLeft,
        TokenKind::Shr => OperatorKind::ShiftRight,
        TokenKind::Rol => OperatorKind::RotateLeft,
        TokenKind::Ror => OperatorKind::RotateRight,
        _ => return None,
    })
}

fn unary_operator_kind(kind: TokenKind) -> Option<OperatorKind> {
    Some(match kind {
        TokenKind::Minus => OperatorKind::Negate,
        TokenKind::Bang => OperatorKind::LogicalNot,
        TokenKind::Tilde => OperatorKind::BinaryNot,
        _ => return None,
    })
}

/// Smallest unsigned core type holding `value`.
fn narrow_to_value(value: u64) -> &'static str {
    if value <= u8::MAX as u64 {
        "u8"
    } else if value <= u16::MAX as u64 {
        "u16"
    } else if value <= u32::MAX as u64 {
        "u32"
    } else {
        "u64"
    }
}

/// Bind each queued identifier reference or report `P003`.
///
/// References may precede their declarations at the same scope level, so
/// this runs after all top-level declarations in the surrounding scope
/// have been materialized.
pub fn resolve_references(
    handler: &Handler,
    builder: &mut ElementBuilder,
    scopes: &mut ScopeManager,
) -> bool {
    let pending = scopes.take_unresolved_references();
    let mut resolved_all = true;
    for reference in pending {
        let (symbol, already) = match &builder.element(reference).payload {
            ElementPayload::IdentifierReference { symbol, identifier } => {
                (symbol.clone(), identifier.is_some())
            }
            _ => continue,
        };
        if already {
            continue;
        }

        let start = if symbol.is_qualified() {
            module_block_of(builder, reference)
        } else {
            builder
                .element(reference)
                .parent
                .and_then(|parent| ScopeManager::enclosing_block(builder, parent))
        };

        match scopes.find_identifier(builder, &symbol, start) {
            Some(identifier) => {
                if let ElementPayload::IdentifierReference {
                    identifier: slot, ..
                } = &mut builder.element_mut(reference).payload
                {
                    *slot = Some(identifier);
                }
            }
            None => {
                resolved_all = false;
                handler.error(
                    "P003",
                    format!("unable to resolve identifier: {}", symbol.fully_qualified()),
                    symbol.span,
                );
            }
        }
    }
    resolved_all
}

fn module_block_of(builder: &ElementBuilder, element: ElementId) -> Option<ElementId> {
    let module = builder.element(element).module?;
    match builder.element(module).payload {
        ElementPayload::Module { block, .. } => Some(block),
        _ => None,
    }
}

/// AST-to-element evaluator for one session.
pub struct Evaluator<'a> {
    ast: &'a AstBuilder,
    handler: &'a Handler,
    builder: &'a mut ElementBuilder,
    scopes: &'a mut ScopeManager,
    interner: &'a mut StringInternMap,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        ast: &'a AstBuilder,
        handler: &'a Handler,
        builder: &'a mut ElementBuilder,
        scopes: &'a mut ScopeManager,
        interner: &'a mut StringInternMap,
    ) -> Self {
        Self {
            ast,
            handler,
            builder,
            scopes,
            interner,
        }
    }

    /// Register the built-in types into a block's type table.
    pub fn seed_core_types(builder: &mut ElementBuilder, block: ElementId) {
        let numerics: &[(&str, u8, bool, bool)] = &[
            ("u8", 1, false, false),
            ("u16", 2, false, false),
            ("u32", 4, false, false),
            ("u64", 8, false, false),
            ("s8", 1, true, false),
            ("s16", 2, true, false),
            ("s32", 4, true, false),
            ("s64", 8, true, false),
            ("f32", 4, true, true),
            ("f64", 8, true, true),
        ];
        for &(name, size, signed, float) in numerics {
            let element = builder.make_numeric_type(block, name, size, signed, float);
            builder.block_mut(block).types.insert(name.to_string(), element);
        }
        let bool_type = builder.make(Some(block), Span::DUMMY, ElementPayload::BoolType);
        builder.block_mut(block).types.insert("bool".into(), bool_type);
        let string_type = builder.make(Some(block), Span::DUMMY, ElementPayload::StringType);
        builder
            .block_mut(block)
            .types
            .insert("string".into(), string_type);
        let module_type = builder.make(Some(block), Span::DUMMY, ElementPayload::ModuleType);
        builder
            .block_mut(block)
            .types
            .insert("module".into(), module_type);
        let namespace_type = builder.make(Some(block), Span::DUMMY, ElementPayload::NamespaceType);
        builder
            .block_mut(block)
            .types
            .insert("namespace".into(), namespace_type);
    }

    fn error(&self, code: &'static str, message: impl Into<String>, span: Span) {
        self.handler.error(code, message, span);
    }

    fn node(&self, id: AstNodeId) -> &AstNode {
        self.ast.node(id)
    }

    // ------------------------------------------------------------------
    // entry points
    // ------------------------------------------------------------------

    /// Evaluate one parsed module into the program's block.
    pub fn evaluate_module(
        &mut self,
        program: ElementId,
        node: AstNodeId,
        source_path: &str,
    ) -> Option<ElementId> {
        let ElementPayload::Program { block: program_block } = self.builder.element(program).payload
        else {
            return None;
        };

        let module_block = self
            .builder
            .make_block(Some(program_block), BlockKind::ModuleBlock);
        let module = self.builder.make_module(program_block, module_block, source_path);
        self.builder.block_mut(program_block).blocks.push(module_block);
        self.builder.set_current_module(Some(module));

        self.scopes.push_scope(module_block);
        self.scopes.push_top_level(module_block);
        self.scopes.push_module(module);

        let mut failed = false;
        for &child in &self.node(node).children.clone() {
            match self.evaluate(child, BlockKind::ModuleBlock) {
                Some(expression) => {
                    self.add_expression_to_scope(module_block, expression);
                    self.builder.set_parent(expression, module);
                }
                None => {
                    failed = true;
                    break;
                }
            }
        }

        self.scopes.pop_module();
        self.scopes.pop_top_level();
        self.scopes.pop_scope();
        self.builder.set_current_module(None);

        if failed {
            None
        } else {
            Some(module)
        }
    }

    /// Dispatch one AST node to its handler.
    pub fn evaluate(&mut self, node: AstNodeId, default_block: BlockKind) -> Option<ElementId> {
        let kind = self.node(node).kind;
        match kind {
            AstKind::Module | AstKind::BasicBlock => self.basic_block(node, default_block),
            AstKind::Symbol => Some(self.make_symbol_element(node, false)),
            AstKind::Statement => self.statement(node),
            AstKind::Assignment | AstKind::ConstantAssignment => self.assignment(node),
            AstKind::BinaryOperator => self.binary_operator(node),
            AstKind::UnaryOperator => self.unary_operator(node),
            AstKind::NumberLiteral => self.number_literal(node),
            AstKind::StringLiteral => self.string_literal(node),
            AstKind::BooleanLiteral => self.boolean_literal(node),
            AstKind::CharacterLiteral => self.character_literal(node),
            AstKind::NullLiteral => self.nil_literal(node),
            AstKind::LineComment => self.comment(node, CommentKind::Line),
            AstKind::BlockComment => self.comment(node, CommentKind::Block),
            AstKind::RawBlock => self.raw_block(node),
            AstKind::Attribute => self.attribute(node),
            AstKind::Directive => self.directive(node),
            AstKind::Expression => self.expression(node),
            AstKind::ArgumentList => self.argument_list(node),
            AstKind::IfExpression | AstKind::ElseIfExpression => self.if_expression(node),
            AstKind::ElseExpression => self.else_expression(node),
            AstKind::WhileStatement => self.while_statement(node),
            AstKind::ForInStatement => self.for_in_statement(node),
            AstKind::ReturnStatement => self.return_statement(node),
            AstKind::ImportExpression => self.import_expression(node),
            AstKind::ModuleExpression => self.module_expression(node),
            AstKind::NamespaceExpression => self.namespace_expression(node, default_block),
            AstKind::StructExpression => self.composite_expression(node, CompositeKind::Struct),
            AstKind::UnionExpression => self.composite_expression(node, CompositeKind::Union),
            AstKind::EnumExpression => self.composite_expression(node, CompositeKind::Enum),
            AstKind::ProcExpression => self.proc_expression(node),
            AstKind::ProcCall => self.proc_call(node),
            AstKind::CastExpression => self.cast_expression(node, false),
            AstKind::TransmuteExpression => self.cast_expression(node, true),
            AstKind::DeferExpression => self.defer_expression(node),
            AstKind::WithExpression => self.with_expression(node),
            AstKind::BreakStatement => self.break_statement(node),
            AstKind::ContinueStatement => self.continue_statement(node),

            // Structural kinds are consumed by their parents' handlers and
            // evaluate to nothing on their own.
            AstKind::Label
            | AstKind::SymbolPart
            | AstKind::TypeIdentifier
            | AstKind::SubscriptExpression
            | AstKind::FromExpression => None,

            // List carriers reaching the dispatcher directly means the
            // parent handler failed to consume them.
            AstKind::Pair
            | AstKind::LabelList
            | AstKind::ParameterList
            | AstKind::ReturnArgumentList
            | AstKind::ArraySubscriptList
            | AstKind::AssignmentTargetList
            | AstKind::AssignmentSourceList => {
                let node_ref = self.node(node);
                self.error(
                    "P071",
                    format!(
                        "ast node evaluation failed: id = {}, type = {}",
                        node_ref.id,
                        node_ref.kind.name()
                    ),
                    node_ref.span,
                );
                None
            }
        }
    }

    /// Evaluate with an explicit scope made current for the duration.
    ///
    /// The pop is unconditional on every exit path.
    pub fn evaluate_in_scope(
        &mut self,
        node: AstNodeId,
        scope: ElementId,
        default_block: BlockKind,
    ) -> Option<ElementId> {
        self.scopes.push_scope(scope);
        let result = self.evaluate(node, default_block);
        self.scopes.pop_scope();
        result
    }

    /// Resolve the queued identifier references after all declarations
    /// have been materialized.
    pub fn resolve_unresolved_references(&mut self) -> bool {
        resolve_references(self.handler, self.builder, self.scopes)
    }

    // ------------------------------------------------------------------
    // handlers
    // ------------------------------------------------------------------

    fn basic_block(&mut self, node: AstNodeId, kind: BlockKind) -> Option<ElementId> {
        let block = self.scopes.push_new_block(self.builder, kind);
        let mut failed = false;
        for &child in &self.node(node).children.clone() {
            match self.evaluate(child, kind) {
                Some(expression) => {
                    self.add_expression_to_scope(block, expression);
                    self.builder.set_parent(expression, block);
                }
                None => {
                    let span = self.node(child).span;
                    self.error("C024", "invalid statement", span);
                    failed = true;
                    break;
                }
            }
        }
        self.scopes.pop_scope();
        if failed {
            None
        } else {
            Some(block)
        }
    }

    fn statement(&mut self, node: AstNodeId) -> Option<ElementId> {
        let scope = self.scopes.current_scope()?;

        let mut labels = Vec::new();
        if let Some(label_list) = self.node(node).lhs {
            for &label in &self.node(label_list).children.clone() {
                let name = self.node(label).token.value.clone();
                labels.push(self.builder.make_label(scope, name));
            }
        }

        let expression_node = self.node(node).rhs?;
        let mut expression = self.evaluate(expression_node, BlockKind::Block)?;

        // A bare symbol statement declares an identifier.
        if self.builder.kind(expression) == ElementKind::Symbol {
            let type_node = self.node(expression_node).rhs;
            let explicit_type = self.find_identifier_type(type_node, None);
            expression =
                self.add_identifier_to_scope(expression, explicit_type, None, 0, None)?;
        }

        Some(self.builder.make_statement(scope, labels, expression))
    }

    fn assignment(&mut self, node: AstNodeId) -> Option<ElementId> {
        let mut identifiers = Vec::new();
        if !self.add_assignments_to_scope(node, &mut identifiers, None) {
            return None;
        }
        identifiers.first().copied()
    }

    fn binary_operator(&mut self, node: AstNodeId) -> Option<ElementId> {
        let operator = binary_operator_kind(self.node(node).token.kind)?;
        let scope = self.scopes.current_scope()?;
        let lhs_node = self.node(node).lhs?;
        let rhs_node = self.node(node).rhs?;
        let lhs = self.resolve_symbol_or_evaluate(lhs_node)?;
        let rhs = self.resolve_symbol_or_evaluate(rhs_node)?;
        Some(self.builder.make_binary_operator(scope, operator, lhs, rhs))
    }

    fn unary_operator(&mut self, node: AstNodeId) -> Option<ElementId> {
        let operator = unary_operator_kind(self.node(node).token.kind)?;
        let scope = self.scopes.current_scope()?;
        let operand_node = self.node(node).rhs?;
        let operand = self.resolve_symbol_or_evaluate(operand_node)?;
        Some(self.builder.make_unary_operator(scope, operator, operand))
    }

    fn number_literal(&mut self, node: AstNodeId) -> Option<ElementId> {
        let scope = self.scopes.current_scope()?;
        let token = &self.node(node).token;
        let span = self.node(node).span;
        match token.number_kind {
            NumberKind::Integer => match token.parse_u64() {
                Some(value) => Some(self.builder.make_integer(scope, value, span)),
                None => {
                    self.error("P041", "invalid integer literal", span);
                    None
                }
            },
            NumberKind::FloatingPoint => match token.parse_f64() {
                Some(value) => Some(self.builder.make_float(scope, value, span)),
                None => {
                    self.error("P041", "invalid float literal", span);
                    None
                }
            },
            NumberKind::None => None,
        }
    }

    fn string_literal(&mut self, node: AstNodeId) -> Option<ElementId> {
        let scope = self.scopes.current_scope()?;
        let value = self.node(node).token.value.clone();
        let span = self.node(node).span;
        let element = self.builder.make_string(scope, value.clone(), span);
        self.interner.intern(element, &value);
        Some(element)
    }

    fn boolean_literal(&mut self, node: AstNodeId) -> Option<ElementId> {
        let scope = self.scopes.current_scope()?;
        let value = self.node(node).token.as_bool();
        let span = self.node(node).span;
        Some(self.builder.make_bool(scope, value, span))
    }

    fn character_literal(&mut self, node: AstNodeId) -> Option<ElementId> {
        let scope = self.scopes.current_scope()?;
        let span = self.node(node).span;
        let value = self.node(node).token.value.bytes().next().unwrap_or(0) as u64;
        Some(self.builder.make_integer(scope, value, span))
    }

    fn nil_literal(&mut self, node: AstNodeId) -> Option<ElementId> {
        let scope = self.scopes.current_scope()?;
        let span = self.node(node).span;
        Some(self.builder.make_nil(scope, span))
    }

    fn comment(&mut self, node: AstNodeId, kind: CommentKind) -> Option<ElementId> {
        let scope = self.scopes.current_scope()?;
        let value = self.node(node).token.value.clone();
        Some(self.builder.make_comment(scope, kind, value))
    }

    fn raw_block(&mut self, node: AstNodeId) -> Option<ElementId> {
        let scope = self.scopes.current_scope()?;
        let value = self.node(node).token.value.clone();
        Some(self.builder.make_raw_block(scope, value))
    }

    fn attribute(&mut self, node: AstNodeId) -> Option<ElementId> {
        let scope = self.scopes.current_scope()?;
        let name = self.node(node).token.value.clone();
        let expression = match self.node(node).lhs {
            Some(value_node) => self.evaluate(value_node, BlockKind::Block),
            None => None,
        };
        let attribute = self.builder.make_attribute(scope, name, expression);
        let span = self.node(node).span;
        self.builder.element_mut(attribute).span = span;
        Some(attribute)
    }

    fn directive(&mut self, node: AstNodeId) -> Option<ElementId> {
        let scope = self.scopes.current_scope()?;
        let name = self.node(node).token.value.clone();
        let expression = match self.node(node).lhs {
            Some(value_node) => self.evaluate(value_node, BlockKind::Block),
            None => None,
        };
        let directive = self.builder.make_directive(scope, name, expression);
        let span = self.node(node).span;
        self.builder.element_mut(directive).span = span;
        self.apply_attributes(directive, Some(node));
        Some(directive)
    }

    fn expression(&mut self, node: AstNodeId) -> Option<ElementId> {
        let scope = self.scopes.current_scope()?;
        let inner_node = self.node(node).lhs?;
        let inner = self.resolve_symbol_or_evaluate(inner_node)?;
        Some(self.builder.make_expression(scope, inner))
    }

    fn argument_list(&mut self, node: AstNodeId) -> Option<ElementId> {
        let scope = self.scopes.current_scope()?;
        let list = self.builder.make_argument_list(scope);
        for &argument_node in &self.node(node).children.clone() {
            let argument = self.resolve_symbol_or_evaluate(argument_node)?;
            self.builder.add_argument(list, argument);
        }
        Some(list)
    }

    fn if_expression(&mut self, node: AstNodeId) -> Option<ElementId> {
        let scope = self.scopes.current_scope()?;
        let predicate_node = self.node(node).lhs?;
        let predicate = self.resolve_symbol_or_evaluate(predicate_node)?;
        let body_node = *self.node(node).children.first()?;
        let true_branch = self.evaluate(body_node, BlockKind::Block)?;
        let false_branch = match self.node(node).rhs {
            Some(else_node) => self.evaluate(else_node, BlockKind::Block),
            None => None,
        };
        Some(
            self.builder
                .make_if(scope, predicate, true_branch, false_branch),
        )
    }

    fn else_expression(&mut self, node: AstNodeId) -> Option<ElementId> {
        let body = *self.node(node).children.first()?;
        self.evaluate(body, BlockKind::Block)
    }

    fn while_statement(&mut self, node: AstNodeId) -> Option<ElementId> {
        let scope = self.scopes.current_scope()?;
        let predicate_node = self.node(node).lhs?;
        let predicate = self.resolve_symbol_or_evaluate(predicate_node)?;
        let body_node = *self.node(node).children.first()?;
        let body = self.evaluate(body_node, BlockKind::Block)?;
        Some(self.builder.make_while(scope, predicate, body))
    }

    fn for_in_statement(&mut self, node: AstNodeId) -> Option<ElementId> {
        let scope = self.scopes.current_scope()?;
        let iterable_node = self.node(node).rhs?;
        let iterable = self.resolve_symbol_or_evaluate(iterable_node)?;
        let body_node = *self.node(node).children.first()?;
        let body = self.evaluate(body_node, BlockKind::Block)?;

        // The induction identifier lives in the loop body's scope so body
        // references resolve to it.
        let induction_node = self.node(node).lhs?;
        let induction = if self.node(induction_node).kind == AstKind::Symbol {
            let symbol = self.make_symbol_element_in(body, induction_node, false);
            let identifier = self.builder.make_identifier(body, symbol, None);
            let iterable_type = self.infer_type(iterable);
            self.set_identifier_type(identifier, iterable_type, true);
            let name = self.symbol_name(symbol);
            self.builder.block_mut(body).add_identifier(name, identifier);
            identifier
        } else {
            self.resolve_symbol_or_evaluate(induction_node)?
        };

        Some(self.builder.make_for_in(scope, induction, iterable, body))
    }

    fn return_statement(&mut self, node: AstNodeId) -> Option<ElementId> {
        let scope = self.scopes.current_scope()?;
        let element = self.builder.make_return(scope);
        if let Some(list) = self.node(node).rhs {
            for &argument_node in &self.node(list).children.clone() {
                let argument = self.resolve_symbol_or_evaluate(argument_node)?;
                if let ElementPayload::Return { expressions } =
                    &mut self.builder.element_mut(element).payload
                {
                    expressions.push(argument);
                }
                self.builder.set_parent(argument, element);
            }
        }
        Some(element)
    }

    fn import_expression(&mut self, node: AstNodeId) -> Option<ElementId> {
        let scope = self.scopes.current_scope()?;
        let target_node = self.node(node).lhs?;
        let mut qualified = self.qualified_symbol_from_node(target_node);

        let mut from_reference = None;
        if let Some(from_node) = self.node(node).rhs {
            let reference = self.resolve_symbol_or_evaluate(from_node)?;
            if let ElementPayload::IdentifierReference { symbol, .. } =
                &self.builder.element(reference).payload
            {
                qualified.namespaces.insert(0, symbol.name.clone());
            }
            from_reference = Some(reference);
        }

        let identifier = self
            .scopes
            .find_identifier(self.builder, &qualified, None);
        let reference = self
            .builder
            .make_identifier_reference(scope, qualified, identifier);
        if identifier.is_none() {
            self.scopes.add_unresolved_reference(reference);
        }

        let module = self.scopes.current_module();
        let import = self
            .builder
            .make_import(scope, reference, from_reference, module);
        // Imports register themselves; the wrapping statement is routed
        // separately by the enclosing block.
        self.builder.block_mut(scope).imports.push(import);
        Some(import)
    }

    fn module_expression(&mut self, node: AstNodeId) -> Option<ElementId> {
        let scope = self.scopes.current_scope()?;
        let path_node = self.node(node).rhs?;
        let expression = self.resolve_symbol_or_evaluate(path_node)?;

        let path = match &self.builder.element(expression).payload {
            ElementPayload::StringLiteral { value } => Some(value.clone()),
            _ => None,
        };
        let Some(path) = path else {
            let span = self.node(path_node).span;
            self.error(
                "C021",
                "expected string literal or constant string variable.",
                span,
            );
            return None;
        };

        Some(self.builder.make_module_reference(scope, expression, path))
    }

    /// `ns name { ... }` binds an identifier whose initializer is the
    /// namespace; the anonymous form just wraps its expression.
    fn namespace_expression(
        &mut self,
        node: AstNodeId,
        default_block: BlockKind,
    ) -> Option<ElementId> {
        let scope = self.scopes.current_scope()?;
        let body_node = self.node(node).rhs?;

        let Some(name_node) = self.node(node).lhs else {
            let body = self.evaluate(body_node, default_block)?;
            return Some(self.builder.make_namespace(scope, body));
        };

        let body = self.evaluate(body_node, BlockKind::Block)?;
        let namespace = self.builder.make_namespace(scope, body);
        let symbol = self.make_symbol_element(name_node, false);
        let initializer = self.builder.make_initializer(scope, namespace);
        let identifier = self.builder.make_identifier(scope, symbol, Some(initializer));
        let namespace_type = self.find_core_type("namespace");
        self.set_identifier_type(identifier, namespace_type, true);
        let name = self.symbol_name(symbol);
        self.builder.block_mut(scope).add_identifier(name, identifier);
        Some(namespace)
    }

    fn composite_expression(
        &mut self,
        node: AstNodeId,
        composite: CompositeKind,
    ) -> Option<ElementId> {
        let scope = self.scopes.current_scope()?;
        let type_scope = self.builder.make_block(Some(scope), BlockKind::Block);
        let element = self
            .builder
            .make_composite_type(scope, composite, type_scope);
        let body_node = self.node(node).rhs?;
        self.add_composite_type_fields(element, type_scope, body_node);
        Some(element)
    }

    fn proc_expression(&mut self, node: AstNodeId) -> Option<ElementId> {
        let scope = self.scopes.current_scope()?;
        let block_scope = self
            .builder
            .make_block(Some(scope), BlockKind::ProcTypeBlock);
        let proc_type = self.builder.make_procedure_type(scope, block_scope);

        // Return list first: each entry is a type name symbol.
        let mut counter = 0usize;
        let returns_list = self.node(node).lhs?;
        for &return_node in &self.node(returns_list).children.clone() {
            if self.node(return_node).kind != AstKind::Symbol {
                continue;
            }
            let type_name = self
                .node(*self.node(return_node).children.first()?)
                .token
                .value
                .clone();
            let return_type = self.scopes.find_type(
                self.builder,
                &QualifiedSymbol::new(type_name),
                Some(scope),
            );
            let symbol = self.builder.make_symbol(
                block_scope,
                format!("_{counter}"),
                Vec::new(),
                Span::DUMMY,
            );
            counter += 1;
            let identifier = self.builder.make_identifier(block_scope, symbol, None);
            self.set_identifier_usage(identifier, IdentifierUsage::Stack);
            self.set_identifier_type(identifier, return_type, false);
            let field = self.builder.make_field(proc_type, identifier);
            if let ElementPayload::ProcedureType { returns, .. } =
                &mut self.builder.element_mut(proc_type).payload
            {
                returns.push(field);
            }
        }

        // Then parameters: either full assignments (defaulted) or bare
        // symbol declarations.
        let params_list = self.node(node).rhs?;
        for &param_node in &self.node(params_list).children.clone() {
            let param_identifier = match self.node(param_node).kind {
                AstKind::Assignment | AstKind::ConstantAssignment => {
                    let mut list = Vec::new();
                    if !self.add_assignments_to_scope(param_node, &mut list, Some(block_scope)) {
                        return None;
                    }
                    *list.first()?
                }
                AstKind::Symbol => self.declare_identifier(param_node, block_scope)?,
                _ => continue,
            };
            self.set_identifier_usage(param_identifier, IdentifierUsage::Stack);
            let field = self.builder.make_field(proc_type, param_identifier);
            if let ElementPayload::ProcedureType { parameters, .. } =
                &mut self.builder.element_mut(proc_type).payload
            {
                parameters.push(field);
            }
        }

        Some(proc_type)
    }

    fn proc_call(&mut self, node: AstNodeId) -> Option<ElementId> {
        let scope = self.scopes.current_scope()?;
        let target_node = self.node(node).lhs?;
        let qualified = self.qualified_symbol_from_node(target_node);

        let arguments = match self.node(node).rhs {
            Some(list_node) => self.evaluate(list_node, BlockKind::Block),
            None => None,
        };

        if !qualified.is_qualified() {
            if let Some(intrinsic) = IntrinsicKind::from_name(&qualified.name) {
                return Some(self.builder.make_intrinsic(scope, intrinsic, arguments));
            }
        }

        let identifier = self.scopes.find_identifier(self.builder, &qualified, None);
        let span = qualified.span;
        let reference = self
            .builder
            .make_identifier_reference(scope, qualified, identifier);
        if identifier.is_none() {
            self.scopes.add_unresolved_reference(reference);
        }
        let call = self.builder.make_procedure_call(scope, reference, arguments);
        self.builder.element_mut(call).span = span;
        Some(call)
    }

    fn cast_expression(&mut self, node: AstNodeId, transmute: bool) -> Option<ElementId> {
        let scope = self.scopes.current_scope()?;
        let type_node = self.node(node).lhs?;
        let symbol_node = self.node(type_node).lhs?;
        let qualified = self.qualified_symbol_from_node(symbol_node);

        let Some(target_type) = self.scopes.find_type(self.builder, &qualified, None) else {
            let span = self.node(symbol_node).span;
            self.error(
                "P002",
                format!("unknown type '{}'.", qualified.fully_qualified()),
                span,
            );
            return None;
        };

        let type_reference = self
            .builder
            .make_type_reference(scope, qualified, target_type);
        let value_node = self.node(node).rhs?;
        let value = self.resolve_symbol_or_evaluate(value_node)?;
        let span = self.node(node).span;
        let element = if transmute {
            self.builder.make_transmute(scope, type_reference, value)
        } else {
            self.builder.make_cast(scope, type_reference, value)
        };
        self.builder.element_mut(element).span = span;
        Some(element)
    }

    fn defer_expression(&mut self, node: AstNodeId) -> Option<ElementId> {
        let scope = self.scopes.current_scope()?;
        let body_node = self.node(node).rhs?;
        let body = self.evaluate(body_node, BlockKind::Block)?;
        Some(self.builder.make_defer(scope, body))
    }

    fn with_expression(&mut self, node: AstNodeId) -> Option<ElementId> {
        let scope = self.scopes.current_scope()?;
        let body_node = self.node(node).rhs?;
        let body = self.resolve_symbol_or_evaluate(body_node)?;
        Some(self.builder.make_with(scope, body))
    }

    fn break_statement(&mut self, node: AstNodeId) -> Option<ElementId> {
        let scope = self.scopes.current_scope()?;
        let label = self.node(node).lhs.map(|label_node| {
            let name = self.node(label_node).token.value.clone();
            self.builder.make_label(scope, name)
        });
        Some(self.builder.make_break(scope, label))
    }

    fn continue_statement(&mut self, node: AstNodeId) -> Option<ElementId> {
        let scope = self.scopes.current_scope()?;
        let label = self.node(node).lhs.map(|label_node| {
            let name = self.node(label_node).token.value.clone();
            self.builder.make_label(scope, name)
        });
        Some(self.builder.make_continue(scope, label))
    }

    // ------------------------------------------------------------------
    // construction helpers
    // ------------------------------------------------------------------

    fn qualified_symbol_from_node(&self, node: AstNodeId) -> QualifiedSymbol {
        let parts: Vec<String> = self
            .node(node)
            .children
            .iter()
            .map(|&part| self.node(part).token.value.clone())
            .collect();
        let (name, namespaces) = match parts.split_last() {
            Some((name, namespaces)) => (name.clone(), namespaces.to_vec()),
            None => (String::new(), Vec::new()),
        };
        QualifiedSymbol {
            namespaces,
            name,
            span: self.node(node).span,
        }
    }

    fn make_symbol_element(&mut self, node: AstNodeId, constant: bool) -> ElementId {
        let scope = self.scopes.current_scope().expect("open scope");
        self.make_symbol_element_in(scope, node, constant)
    }

    fn make_symbol_element_in(
        &mut self,
        scope: ElementId,
        node: AstNodeId,
        constant: bool,
    ) -> ElementId {
        let qualified = self.qualified_symbol_from_node(node);
        let symbol = self.builder.make_symbol(
            scope,
            qualified.name,
            qualified.namespaces,
            qualified.span,
        );
        if constant {
            self.set_symbol_constant(symbol, true);
        }
        symbol
    }

    fn symbol_name(&self, symbol: ElementId) -> String {
        match &self.builder.element(symbol).payload {
            ElementPayload::Symbol { name, .. } => name.clone(),
            _ => String::new(),
        }
    }

    fn symbol_qualified(&self, symbol: ElementId) -> QualifiedSymbol {
        match &self.builder.element(symbol).payload {
            ElementPayload::Symbol {
                name, namespaces, ..
            } => QualifiedSymbol {
                namespaces: namespaces.clone(),
                name: name.clone(),
                span: self.builder.element(symbol).span,
            },
            _ => QualifiedSymbol::default(),
        }
    }

    fn symbol_is_constant(&self, symbol: ElementId) -> bool {
        matches!(
            self.builder.element(symbol).payload,
            ElementPayload::Symbol { constant: true, .. }
        )
    }

    fn set_symbol_constant(&mut self, symbol: ElementId, value: bool) {
        if let ElementPayload::Symbol { constant, .. } =
            &mut self.builder.element_mut(symbol).payload
        {
            *constant = value;
        }
    }

    fn set_identifier_type(
        &mut self,
        identifier: ElementId,
        type_element: Option<ElementId>,
        inferred: bool,
    ) {
        if let ElementPayload::Identifier {
            type_element: slot,
            inferred_type,
            ..
        } = &mut self.builder.element_mut(identifier).payload
        {
            *slot = type_element;
            *inferred_type = inferred && type_element.is_some();
        }
    }

    fn set_identifier_usage(&mut self, identifier: ElementId, usage: IdentifierUsage) {
        if let ElementPayload::Identifier { usage: slot, .. } =
            &mut self.builder.element_mut(identifier).payload
        {
            *slot = usage;
        }
    }

    fn identifier_initializer_expression(&self, identifier: ElementId) -> Option<ElementId> {
        let ElementPayload::Identifier { initializer, .. } =
            self.builder.element(identifier).payload
        else {
            return None;
        };
        let ElementPayload::Initializer { expression } =
            self.builder.element(initializer?).payload
        else {
            return None;
        };
        Some(expression)
    }

    /// Symbols in expression position become identifier references; other
    /// nodes evaluate normally.
    fn resolve_symbol_or_evaluate(&mut self, node: AstNodeId) -> Option<ElementId> {
        if self.node(node).kind != AstKind::Symbol {
            return self.evaluate(node, BlockKind::Block);
        }
        let scope = self.scopes.current_scope()?;
        let qualified = self.qualified_symbol_from_node(node);
        let identifier = self.scopes.find_identifier(self.builder, &qualified, None);
        let reference = self
            .builder
            .make_identifier_reference(scope, qualified, identifier);
        if identifier.is_none() {
            self.scopes.add_unresolved_reference(reference);
        }
        Some(reference)
    }

    /// Route an element into the right collection of its scope block.
    fn add_expression_to_scope(&mut self, scope: ElementId, expression: ElementId) {
        match self.builder.kind(expression) {
            ElementKind::Comment => self.builder.block_mut(scope).comments.push(expression),
            ElementKind::Import => {
                // Imports self-register when evaluated; nothing more to do.
            }
            ElementKind::Attribute => self.builder.element_mut(scope).attributes.push(expression),
            ElementKind::Statement => self.builder.block_mut(scope).statements.push(expression),
            _ => {}
        }
    }

    /// Evaluate attribute children of `node` onto `element`.
    fn apply_attributes(&mut self, element: ElementId, node: Option<AstNodeId>) {
        let Some(node) = node else {
            return;
        };
        for &child in &self.node(node).children.clone() {
            if self.node(child).kind != AstKind::Attribute {
                continue;
            }
            if let Some(attribute) = self.attribute(child) {
                self.builder.set_parent(attribute, element);
                self.builder.element_mut(element).attributes.push(attribute);
            }
        }
    }

    /// Walk (creating as needed) the namespace chain of a symbol, returning
    /// the block the identifier itself should land in.
    fn add_namespaces_to_scope(
        &mut self,
        symbol: ElementId,
        node: Option<AstNodeId>,
        parent_scope: ElementId,
    ) -> Option<ElementId> {
        let namespace_type = self.scopes.find_type(
            self.builder,
            &QualifiedSymbol::new("namespace"),
            Some(parent_scope),
        );

        let namespaces = match &self.builder.element(symbol).payload {
            ElementPayload::Symbol { namespaces, .. } => namespaces.clone(),
            _ => return Some(parent_scope),
        };

        let mut scope = parent_scope;
        let mut prefix: Vec<String> = Vec::new();
        for namespace_name in namespaces {
            let existing = self.builder.block(scope).identifier(&namespace_name);
            match existing {
                None => {
                    let new_scope = self.builder.make_block(Some(scope), BlockKind::Block);
                    let namespace = self.builder.make_namespace(scope, new_scope);
                    let ns_symbol = self.builder.make_symbol(
                        scope,
                        namespace_name.clone(),
                        prefix.clone(),
                        Span::DUMMY,
                    );
                    let initializer = self.builder.make_initializer(scope, namespace);
                    let ns_identifier =
                        self.builder
                            .make_identifier(scope, ns_symbol, Some(initializer));
                    self.set_identifier_type(ns_identifier, namespace_type, true);
                    self.builder.block_mut(scope).blocks.push(new_scope);
                    self.builder
                        .block_mut(scope)
                        .add_identifier(namespace_name.clone(), ns_identifier);
                    scope = new_scope;
                }
                Some(identifier) => {
                    let expression = self.identifier_initializer_expression(identifier);
                    match expression.map(|e| self.builder.element(e).payload.clone()) {
                        Some(ElementPayload::Namespace { block }) => {
                            scope = block;
                        }
                        _ => {
                            let span = node
                                .map(|n| self.node(n).span)
                                .unwrap_or(self.builder.element(symbol).span);
                            self.error(
                                "P018",
                                "only a namespace is valid within a qualified name.",
                                span,
                            );
                            return None;
                        }
                    }
                }
            }
            prefix.push(namespace_name);
        }
        Some(scope)
    }

    /// Materialize an identifier from a declaration.
    ///
    /// `decl_node` is the assignment node when the declaration has an
    /// initializer; `source_index` selects which right-hand-side expression
    /// belongs to this target.
    fn add_identifier_to_scope(
        &mut self,
        symbol: ElementId,
        explicit_type: Option<ElementId>,
        decl_node: Option<AstNodeId>,
        source_index: usize,
        parent_scope: Option<ElementId>,
    ) -> Option<ElementId> {
        let qualified = self.symbol_qualified(symbol);

        // 1. pick the target scope
        let scope = if qualified.is_qualified() {
            self.scopes.current_top_level()?
        } else {
            parent_scope.or_else(|| self.scopes.current_scope())?
        };

        // 2. create/verify the namespace chain
        let scope = self.add_namespaces_to_scope(symbol, decl_node, scope)?;

        let source_node = decl_node.and_then(|decl| {
            let sources = self.node(decl).rhs?;
            self.node(sources).children.get(source_index).copied()
        });

        // 3. evaluate the initializer
        let mut init_expr = None;
        let mut initializer = None;
        if let Some(source_node) = source_node {
            init_expr = self.evaluate_in_scope(source_node, scope, BlockKind::Block);
            if let Some(mut expression) = init_expr {
                // 4. a symbol initializer either aliases a type (::= only)
                // or becomes an identifier reference.
                if self.builder.kind(expression) == ElementKind::Symbol {
                    let init_symbol = self.symbol_qualified(expression);
                    match self.scopes.find_identifier(self.builder, &init_symbol, None) {
                        Some(identifier) => {
                            let aliased = self
                                .identifier_initializer_expression(identifier)
                                .filter(|&e| {
                                    self.builder.kind(e) == ElementKind::TypeReference
                                        || self.builder.kind(e).is_type()
                                });
                            match aliased {
                                Some(aliased_type) => {
                                    if self.symbol_is_constant(symbol) {
                                        expression = aliased_type;
                                    } else {
                                        let span = decl_node
                                            .map(|n| self.node(n).span)
                                            .unwrap_or(Span::DUMMY);
                                        self.error(
                                            "P029",
                                            "only constant assignment (::=) may alias types",
                                            span,
                                        );
                                        return None;
                                    }
                                }
                                None => {
                                    expression = self.builder.make_identifier_reference(
                                        scope,
                                        init_symbol,
                                        Some(identifier),
                                    );
                                }
                            }
                        }
                        None => {
                            expression = self.builder.make_identifier_reference(
                                scope,
                                init_symbol,
                                None,
                            );
                            self.scopes.add_unresolved_reference(expression);
                        }
                    }
                    init_expr = Some(expression);
                }
                if self.builder.is_constant(expression) {
                    initializer = Some(self.builder.make_initializer(scope, expression));
                }
            }
        }

        let identifier = self.builder.make_identifier(scope, symbol, initializer);
        self.apply_attributes(identifier, decl_node);
        if initializer.is_none() {
            if let Some(expression) = init_expr {
                self.builder.set_parent(expression, identifier);
            }
        }

        // 5. the identifier's type: explicit, inferred, or unknown
        let mut type_element = explicit_type;
        let mut inferred = false;
        if type_element.is_none() {
            if let Some(expression) = init_expr {
                type_element = self.infer_type(expression);
                inferred = type_element.is_some();
            }
        }

        if initializer.is_none() && init_expr.is_none() && type_element.is_none() {
            self.error(
                "P019",
                format!("unable to infer type: {}", qualified.name),
                self.builder.element(symbol).span,
            );
            return None;
        }

        if type_element.is_none() {
            type_element = Some(
                self.builder
                    .make_unknown_type(scope, format!("__unknown_{}", qualified.name)),
            );
            inferred = false;
        }
        self.set_identifier_type(identifier, type_element, inferred);

        self.builder
            .block_mut(scope)
            .add_identifier(qualified.name.clone(), identifier);

        // Type-valued initializers also register the identifier's name in
        // the scope's type table so `cast<Name>` and annotations resolve.
        if let Some(expression) = init_expr {
            let registered = match self.builder.element(expression).payload {
                ElementPayload::TypeReference { referenced_type, .. } => Some(referenced_type),
                _ if self.builder.kind(expression).is_type() => Some(expression),
                _ => None,
            };
            if let Some(type_id) = registered {
                self.builder
                    .block_mut(scope)
                    .types
                    .insert(qualified.name.clone(), type_id);
            }
        }

        // 7. procedure types get their instances from the source body
        if let Some(expression) = init_expr {
            if initializer.is_some() && self.builder.kind(expression) == ElementKind::ProcedureType
            {
                if let Some(source_node) = source_node {
                    self.add_procedure_instance(expression, source_node);
                }
            }
        }

        // 6. non-constant initializers become synthesized assignments
        if initializer.is_none() {
            if let Some(expression) = init_expr {
                if self.symbol_is_constant(symbol) {
                    self.error(
                        "P028",
                        "constant variables require constant expressions.",
                        self.builder.element(symbol).span,
                    );
                    return None;
                }
                let assignment = self.builder.make_binary_operator(
                    scope,
                    OperatorKind::Assignment,
                    identifier,
                    expression,
                );
                let statement = self.builder.make_statement(scope, Vec::new(), assignment);
                self.builder.block_mut(scope).statements.push(statement);
                self.builder.set_parent(statement, scope);
            }
        }

        Some(identifier)
    }

    /// Targets that already exist become assignments; new names are
    /// declared. `P027` guards the arity; `P028` guards constants.
    fn add_assignments_to_scope(
        &mut self,
        node: AstNodeId,
        identifiers: &mut Vec<ElementId>,
        scope: Option<ElementId>,
    ) -> bool {
        let is_constant = self.node(node).kind == AstKind::ConstantAssignment;
        let Some(target_list) = self.node(node).lhs else {
            return false;
        };
        let Some(source_list) = self.node(node).rhs else {
            return false;
        };

        let targets = self.node(target_list).children.clone();
        let sources = self.node(source_list).children.clone();
        if targets.len() != sources.len() {
            let span = self.node(source_list).span;
            self.error(
                "P027",
                "the number of left-hand-side targets must match the number of \
                 right-hand-side expressions.",
                span,
            );
            return false;
        }

        for (index, &target) in targets.iter().enumerate() {
            let qualified = self.qualified_symbol_from_node(target);
            let existing = self
                .scopes
                .find_identifier(self.builder, &qualified, scope);

            match existing {
                Some(identifier) => {
                    let symbol = match self.builder.element(identifier).payload {
                        ElementPayload::Identifier { symbol, .. } => symbol,
                        _ => continue,
                    };
                    if self.symbol_is_constant(symbol) {
                        let span = self.node(target).span;
                        self.error("P028", "constant variables cannot be modified.", span);
                        return false;
                    }
                    let rhs = match scope {
                        Some(scope) => {
                            self.evaluate_in_scope(sources[index], scope, BlockKind::Block)
                        }
                        None => self.resolve_symbol_or_evaluate(sources[index]),
                    };
                    let Some(rhs) = rhs else {
                        return false;
                    };
                    let current = self.scopes.current_scope().unwrap_or(identifier);
                    let binary = self.builder.make_binary_operator(
                        current,
                        OperatorKind::Assignment,
                        identifier,
                        rhs,
                    );
                    self.apply_attributes(binary, Some(node));
                    identifiers.push(binary);
                }
                None => {
                    let declaration_scope =
                        scope.or_else(|| self.scopes.current_scope());
                    let Some(declaration_scope) = declaration_scope else {
                        return false;
                    };
                    let symbol =
                        self.make_symbol_element_in(declaration_scope, target, is_constant);
                    let explicit_type =
                        self.find_identifier_type(self.node(target).rhs, scope);
                    let Some(identifier) = self.add_identifier_to_scope(
                        symbol,
                        explicit_type,
                        Some(node),
                        index,
                        scope,
                    ) else {
                        return false;
                    };
                    identifiers.push(identifier);
                }
            }
        }

        true
    }

    /// Declare a bare `name [: Type]` identifier into `scope`.
    fn declare_identifier(&mut self, node: AstNodeId, scope: ElementId) -> Option<ElementId> {
        let symbol = self.make_symbol_element_in(scope, node, false);
        let explicit_type = self.find_identifier_type(self.node(node).rhs, Some(scope));
        self.add_identifier_to_scope(symbol, explicit_type, None, 0, Some(scope))
    }

    /// Resolve a type annotation node into a type element, wrapping array,
    /// pointer, and spread markers. Unknown names yield a named
    /// placeholder.
    fn find_identifier_type(
        &mut self,
        type_node: Option<AstNodeId>,
        scope: Option<ElementId>,
    ) -> Option<ElementId> {
        let type_node = type_node?;
        if self.node(type_node).kind != AstKind::TypeIdentifier {
            return None;
        }
        let symbol_node = self.node(type_node).lhs?;
        let qualified = self.qualified_symbol_from_node(symbol_node);
        let parent = scope
            .or_else(|| self.scopes.current_scope())
            .expect("open scope");

        let mut result = match self.scopes.find_type(self.builder, &qualified, scope) {
            Some(found) => found,
            None => self
                .builder
                .make_unknown_type(parent, qualified.fully_qualified()),
        };

        if self.node(type_node).is_array() {
            result = self.builder.make_array_type(parent, result);
        }
        if self.node(type_node).is_pointer() {
            result = self.builder.make_pointer_type(parent, result);
        }
        if self.node(type_node).is_spread() {
            result = self.builder.make_spread(parent, result);
        }
        Some(result)
    }

    /// Composite type bodies admit `name : Type := value` assignment fields
    /// and bare `name` declarations.
    fn add_composite_type_fields(
        &mut self,
        composite: ElementId,
        type_scope: ElementId,
        block_node: AstNodeId,
    ) {
        for &child in &self.node(block_node).children.clone() {
            if self.node(child).kind != AstKind::Statement {
                break;
            }
            let Some(expression_node) = self.node(child).rhs else {
                continue;
            };
            let field_identifier = match self.node(expression_node).kind {
                AstKind::Assignment | AstKind::ConstantAssignment => {
                    let mut list = Vec::new();
                    if !self.add_assignments_to_scope(
                        expression_node,
                        &mut list,
                        Some(type_scope),
                    ) {
                        continue;
                    }
                    list.first().copied()
                }
                AstKind::Symbol => self.declare_identifier(expression_node, type_scope),
                _ => None,
            };
            if let Some(identifier) = field_identifier {
                let field = self.builder.make_field(composite, identifier);
                if let ElementPayload::CompositeType { fields, .. } =
                    &mut self.builder.element_mut(composite).payload
                {
                    fields.push(field);
                }
            }
        }
    }

    /// Attach instances (and attributes) found in a procedure declaration's
    /// source node to its procedure type.
    // TODO: pin whether attributes written after a proc body bind to the
    // type or to the instance; today both orders land on the type (see
    // proc_trailing_attribute_attaches_to_type).
    fn add_procedure_instance(&mut self, proc_type: ElementId, source_node: AstNodeId) {
        let proc_scope = match self.builder.element(proc_type).payload {
            ElementPayload::ProcedureType { scope, .. } => scope,
            _ => return,
        };

        for &child in &self.node(source_node).children.clone() {
            match self.node(child).kind {
                AstKind::Attribute => {
                    if let Some(attribute) = self.attribute(child) {
                        self.builder.set_parent(attribute, proc_type);
                        self.builder
                            .element_mut(proc_type)
                            .attributes
                            .push(attribute);
                    }
                }
                AstKind::BasicBlock => {
                    let Some(instance_block) =
                        self.evaluate_in_scope(child, proc_scope, BlockKind::ProcInstanceBlock)
                    else {
                        continue;
                    };
                    let instance = self.builder.make_procedure_instance(
                        proc_scope,
                        proc_type,
                        instance_block,
                    );
                    self.builder.set_parent(instance, proc_type);
                    if let ElementPayload::ProcedureType { instances, .. } =
                        &mut self.builder.element_mut(proc_type).payload
                    {
                        instances.push(instance);
                    }
                }
                _ => {}
            }
        }
    }

    /// Infer the type element of an expression, if it has one.
    pub fn infer_type(&mut self, expression: ElementId) -> Option<ElementId> {
        let payload = self.builder.element(expression).payload.clone();
        match payload {
            ElementPayload::IntegerLiteral { value } => self.find_core_type(narrow_to_value(value)),
            ElementPayload::FloatLiteral { .. } => self.find_core_type("f64"),
            ElementPayload::BooleanLiteral { .. } => self.find_core_type("bool"),
            ElementPayload::StringLiteral { .. } => self.find_core_type("string"),
            ElementPayload::NilLiteral => None,
            ElementPayload::Identifier { type_element, .. } => type_element,
            ElementPayload::IdentifierReference { identifier, .. } => {
                let identifier = identifier?;
                match self.builder.element(identifier).payload {
                    ElementPayload::Identifier { type_element, .. } => type_element,
                    _ => None,
                }
            }
            ElementPayload::BinaryOperator { operator, lhs, .. } => {
                if operator.is_boolean_valued() {
                    self.find_core_type("bool")
                } else {
                    self.infer_type(lhs)
                }
            }
            ElementPayload::UnaryOperator { operator, operand } => {
                if operator.is_boolean_valued() {
                    self.find_core_type("bool")
                } else {
                    self.infer_type(operand)
                }
            }
            ElementPayload::Expression { inner } => self.infer_type(inner),
            ElementPayload::Cast { type_reference, .. }
            | ElementPayload::Transmute { type_reference, .. } => {
                match self.builder.element(type_reference).payload {
                    ElementPayload::TypeReference { referenced_type, .. } => Some(referenced_type),
                    _ => None,
                }
            }
            ElementPayload::TypeReference { referenced_type, .. } => Some(referenced_type),
            ElementPayload::Namespace { .. } => self.find_core_type("namespace"),
            ElementPayload::ModuleReference { .. } => self.find_core_type("module"),
            ElementPayload::Intrinsic { intrinsic, .. } => match intrinsic {
                IntrinsicKind::SizeOf | IntrinsicKind::AlignOf => self.find_core_type("u32"),
                IntrinsicKind::AddressOf | IntrinsicKind::Alloc => self.find_core_type("u64"),
                _ => None,
            },
            _ if self.builder.kind(expression).is_type() => Some(expression),
            _ => None,
        }
    }

    fn find_core_type(&self, name: &str) -> Option<ElementId> {
        self.scopes
            .find_type(self.builder, &QualifiedSymbol::new(name), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emberc_par::Parser;
    use emberc_util::SourceBuffer;

    struct Evaluated {
        builder: ElementBuilder,
        scopes: ScopeManager,
        interner: StringInternMap,
        handler: Handler,
        program: ElementId,
        module: Option<ElementId>,
    }

    fn evaluate_source(source: &str) -> Evaluated {
        let buffer = SourceBuffer::from_string("test.em", source);
        let handler = Handler::new();
        let mut parser = Parser::new(&buffer, &handler);
        let root = parser.parse().expect("parse produced a module");
        let ast = parser.into_builder();

        let mut builder = ElementBuilder::new();
        let mut scopes = ScopeManager::new();
        let mut interner = StringInternMap::new();
        let program = builder.make_program();
        let ElementPayload::Program { block } = builder.element(program).payload else {
            unreachable!()
        };
        Evaluator::seed_core_types(&mut builder, block);

        let module = {
            let mut evaluator =
                Evaluator::new(&ast, &handler, &mut builder, &mut scopes, &mut interner);
            let module = evaluator.evaluate_module(program, root, "test.em");
            evaluator.resolve_unresolved_references();
            module
        };

        Evaluated {
            builder,
            scopes,
            interner,
            handler,
            program,
            module,
        }
    }

    fn module_block(result: &Evaluated) -> ElementId {
        let module = result.module.expect("module evaluated");
        match result.builder.element(module).payload {
            ElementPayload::Module { block, .. } => block,
            _ => panic!("expected module payload"),
        }
    }

    fn identifier_in(result: &Evaluated, block: ElementId, name: &str) -> ElementId {
        result
            .builder
            .block(block)
            .identifier(name)
            .unwrap_or_else(|| panic!("identifier '{name}' not found"))
    }

    fn codes(result: &Evaluated) -> Vec<&'static str> {
        result
            .handler
            .diagnostics()
            .iter()
            .map(|d| d.code)
            .collect()
    }

    #[test]
    fn test_assignment_produces_identifier_and_statement() {
        let result = evaluate_source("a := 5 + 7 * 2;");
        assert!(!result.handler.is_failed(), "{:?}", codes(&result));

        let block = module_block(&result);
        let a = identifier_in(&result, block, "a");
        assert_eq!(result.builder.kind(a), ElementKind::Identifier);

        // Non-constant initializer: no initializer element, but a
        // synthesized assignment statement in the scope.
        let ElementPayload::Identifier { initializer, .. } = result.builder.element(a).payload
        else {
            panic!("expected identifier payload")
        };
        assert!(initializer.is_none());

        let statements = &result.builder.block(block).statements;
        let synthesized = statements.iter().any(|&statement| {
            let ElementPayload::Statement { expression, .. } =
                result.builder.element(statement).payload
            else {
                return false;
            };
            matches!(
                result.builder.element(expression).payload,
                ElementPayload::BinaryOperator {
                    operator: OperatorKind::Assignment,
                    ..
                }
            )
        });
        assert!(synthesized, "expected a synthesized assignment statement");
    }

    #[test]
    fn test_arithmetic_element_shape() {
        // The right-hand side is `+` over 5 and `*`(7, 2).
        let result = evaluate_source("a := 5 + 7 * 2;");
        let sum = result
            .builder
            .iter()
            .find(|element| {
                matches!(
                    element.payload,
                    ElementPayload::BinaryOperator {
                        operator: OperatorKind::Add,
                        ..
                    }
                )
            })
            .expect("sum operator");
        let ElementPayload::BinaryOperator { lhs, rhs, .. } = sum.payload else {
            unreachable!()
        };
        assert!(matches!(
            result.builder.element(lhs).payload,
            ElementPayload::IntegerLiteral { value: 5 }
        ));
        let ElementPayload::BinaryOperator {
            operator: OperatorKind::Multiply,
            lhs: seven,
            rhs: two,
        } = result.builder.element(rhs).payload
        else {
            panic!("expected multiply on the right")
        };
        assert!(matches!(
            result.builder.element(seven).payload,
            ElementPayload::IntegerLiteral { value: 7 }
        ));
        assert!(matches!(
            result.builder.element(two).payload,
            ElementPayload::IntegerLiteral { value: 2 }
        ));
    }

    #[test]
    fn test_element_ids_monotonic() {
        let result = evaluate_source("a := 1; b := a + 2;");
        let ids: Vec<_> = result.builder.iter().map(|element| element.id).collect();
        for window in ids.windows(2) {
            assert!(window[0] < window[1]);
        }
    }

    #[test]
    fn test_constant_assignment_keeps_initializer() {
        let result = evaluate_source("limit ::= 64;");
        assert!(!result.handler.is_failed(), "{:?}", codes(&result));
        let block = module_block(&result);
        let limit = identifier_in(&result, block, "limit");
        let ElementPayload::Identifier {
            initializer,
            symbol,
            ..
        } = result.builder.element(limit).payload
        else {
            panic!("expected identifier payload")
        };
        assert!(initializer.is_some());
        assert!(matches!(
            result.builder.element(symbol).payload,
            ElementPayload::Symbol { constant: true, .. }
        ));
    }

    #[test]
    fn test_constant_assignment_requires_constant_rhs() {
        let result = evaluate_source("x := 1; y ::= x + 1;");
        assert!(result.handler.is_failed());
        assert!(codes(&result).contains(&"P028"));
    }

    #[test]
    fn test_constant_modification_rejected() {
        let result = evaluate_source("a ::= 5; a := 6;");
        assert!(result.handler.is_failed());
        assert!(codes(&result).contains(&"P028"));
    }

    #[test]
    fn test_arity_mismatch_rejected() {
        let result = evaluate_source("a, b := 1;");
        assert!(result.handler.is_failed());
        assert!(codes(&result).contains(&"P027"));
    }

    #[test]
    fn test_nested_namespaces_qualified_lookup() {
        // Two nested namespaces; x is reachable via foo::bar::x.
        let result = evaluate_source("ns foo { ns bar { x := 1; }; };");
        assert!(!result.handler.is_failed(), "{:?}", codes(&result));

        let block = module_block(&result);
        let mut qualified = QualifiedSymbol::new("x");
        qualified.namespaces = vec!["foo".into(), "bar".into()];
        let found = result
            .scopes
            .find_identifier(&result.builder, &qualified, Some(block));
        assert!(found.is_some(), "foo::bar::x should resolve");
        assert_eq!(
            result.builder.kind(found.unwrap()),
            ElementKind::Identifier
        );

        let namespace_count = result
            .builder
            .iter()
            .filter(|element| element.kind() == ElementKind::Namespace)
            .count();
        assert_eq!(namespace_count, 2);
    }

    #[test]
    fn test_qualified_declaration_creates_namespaces() {
        let result = evaluate_source("geo::area := 100;");
        assert!(!result.handler.is_failed(), "{:?}", codes(&result));
        let block = module_block(&result);
        let mut qualified = QualifiedSymbol::new("area");
        qualified.namespaces = vec!["geo".into()];
        let found = result
            .scopes
            .find_identifier(&result.builder, &qualified, Some(block));
        assert!(found.is_some());
    }

    #[test]
    fn test_namespace_prefix_conflict() {
        let result = evaluate_source("v := 1; v::w := 2;");
        assert!(result.handler.is_failed());
        assert!(codes(&result).contains(&"P018"));
    }

    #[test]
    fn test_forward_reference_resolves() {
        let result = evaluate_source("a := b; b := 9;");
        assert!(!result.handler.is_failed(), "{:?}", codes(&result));
        let resolved = result.builder.iter().all(|element| {
            !matches!(
                element.payload,
                ElementPayload::IdentifierReference {
                    identifier: None,
                    ..
                }
            )
        });
        assert!(resolved, "all references should be bound after the pass");
    }

    #[test]
    fn test_unresolved_identifier_reported() {
        let result = evaluate_source("a := nowhere;");
        assert!(result.handler.is_failed());
        assert!(codes(&result).contains(&"P003"));
    }

    #[test]
    fn test_struct_fields_and_type_alias() {
        let result = evaluate_source("Point ::= struct { x : s32; y : s32; };");
        assert!(!result.handler.is_failed(), "{:?}", codes(&result));

        let block = module_block(&result);
        let composite = result
            .builder
            .block(block)
            .types
            .get("Point")
            .copied()
            .expect("Point registered as a type");
        let ElementPayload::CompositeType {
            composite: kind,
            fields,
            ..
        } = &result.builder.element(composite).payload
        else {
            panic!("expected composite type")
        };
        assert_eq!(*kind, CompositeKind::Struct);
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn test_enum_and_union_composites() {
        let result = evaluate_source(
            "Color ::= enum { red : u8; green : u8; }; Cell ::= union { n : u32; f : f32; };",
        );
        assert!(!result.handler.is_failed(), "{:?}", codes(&result));
        let kinds: Vec<_> = result
            .builder
            .iter()
            .filter_map(|element| match &element.payload {
                ElementPayload::CompositeType { composite, .. } => Some(*composite),
                _ => None,
            })
            .collect();
        assert!(kinds.contains(&CompositeKind::Enum));
        assert!(kinds.contains(&CompositeKind::Union));
    }

    #[test]
    fn test_proc_type_fields_and_instance() {
        let result = evaluate_source("sq := proc(x : u32) : u32 { return x * x; };");
        assert!(!result.handler.is_failed(), "{:?}", codes(&result));

        let proc_type = result
            .builder
            .iter()
            .find(|element| element.kind() == ElementKind::ProcedureType)
            .expect("procedure type");
        let ElementPayload::ProcedureType {
            parameters,
            returns,
            instances,
            ..
        } = &proc_type.payload
        else {
            unreachable!()
        };
        assert_eq!(parameters.len(), 1);
        assert_eq!(returns.len(), 1);
        assert_eq!(instances.len(), 1);

        // Parameters are stack-resident.
        let ElementPayload::Field { identifier } =
            result.builder.element(parameters[0]).payload
        else {
            panic!("expected field payload")
        };
        assert!(matches!(
            result.builder.element(identifier).payload,
            ElementPayload::Identifier {
                usage: IdentifierUsage::Stack,
                ..
            }
        ));
    }

    #[test]
    fn proc_trailing_attribute_attaches_to_type() {
        let result = evaluate_source("sq := proc() {} @inline;");
        assert!(!result.handler.is_failed(), "{:?}", codes(&result));
        let proc_type = result
            .builder
            .iter()
            .find(|element| element.kind() == ElementKind::ProcedureType)
            .expect("procedure type");
        let attached = proc_type.attributes.iter().any(|&attribute| {
            matches!(
                &result.builder.element(attribute).payload,
                ElementPayload::Attribute { name, .. } if name == "inline"
            )
        });
        assert!(attached, "trailing attribute should land on the type");
    }

    #[test]
    fn test_intrinsic_call_recognized() {
        let result = evaluate_source("x := 1; n := size_of(x);");
        assert!(!result.handler.is_failed(), "{:?}", codes(&result));
        let intrinsic = result
            .builder
            .iter()
            .find(|element| element.kind() == ElementKind::SizeOfIntrinsic);
        assert!(intrinsic.is_some());
        // No procedure-call element should have been produced for it.
        let calls = result
            .builder
            .iter()
            .filter(|element| element.kind() == ElementKind::ProcedureCall)
            .count();
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_procedure_call_references_identifier() {
        let result = evaluate_source("f := proc() {}; r := f();");
        assert!(!result.handler.is_failed(), "{:?}", codes(&result));
        let call = result
            .builder
            .iter()
            .find(|element| element.kind() == ElementKind::ProcedureCall)
            .expect("procedure call");
        let ElementPayload::ProcedureCall { reference, .. } = call.payload else {
            unreachable!()
        };
        assert!(matches!(
            result.builder.element(reference).payload,
            ElementPayload::IdentifierReference {
                identifier: Some(_),
                ..
            }
        ));
    }

    #[test]
    fn test_string_literals_interned_by_content() {
        let result = evaluate_source("s := \"hello\"; t := \"hello\"; u := \"world\";");
        assert!(!result.handler.is_failed(), "{:?}", codes(&result));
        assert_eq!(result.interner.len(), 2);
    }

    #[test]
    fn test_cast_with_unknown_type() {
        let result = evaluate_source("v := cast<Wat>(1);");
        assert!(result.handler.is_failed());
        assert!(codes(&result).contains(&"P002"));
    }

    #[test]
    fn test_cast_and_transmute_elements() {
        let result = evaluate_source("n := 1; v := cast<u8>(n); w := transmute<f64>(n);");
        assert!(!result.handler.is_failed(), "{:?}", codes(&result));
        assert!(result
            .builder
            .iter()
            .any(|element| element.kind() == ElementKind::Cast));
        assert!(result
            .builder
            .iter()
            .any(|element| element.kind() == ElementKind::Transmute));
    }

    #[test]
    fn test_while_and_control_flow_elements() {
        let result = evaluate_source(
            "x := 0; top: while x < 3 { x := x + 1; if x == 2 { break; }; };",
        );
        assert!(!result.handler.is_failed(), "{:?}", codes(&result));
        assert!(result
            .builder
            .iter()
            .any(|element| element.kind() == ElementKind::While));
        assert!(result
            .builder
            .iter()
            .any(|element| element.kind() == ElementKind::If));
        assert!(result
            .builder
            .iter()
            .any(|element| element.kind() == ElementKind::Break));
    }

    #[test]
    fn test_for_in_declares_induction() {
        let result = evaluate_source("items := 3; for i in items { x := i; };");
        assert!(!result.handler.is_failed(), "{:?}", codes(&result));
        let for_element = result
            .builder
            .iter()
            .find(|element| element.kind() == ElementKind::ForIn)
            .expect("for element");
        let ElementPayload::ForIn { induction, body, .. } = for_element.payload else {
            unreachable!()
        };
        assert_eq!(result.builder.kind(induction), ElementKind::Identifier);
        assert!(result.builder.block(body).identifier("i").is_some());
    }

    #[test]
    fn test_import_self_registers() {
        let result = evaluate_source("ns foo { x := 1; }; import foo;");
        assert!(!result.handler.is_failed(), "{:?}", codes(&result));
        let block = module_block(&result);
        assert_eq!(result.builder.block(block).imports.len(), 1);
    }

    #[test]
    fn test_module_reference_requires_constant_string() {
        let result = evaluate_source("core := module(\"core.em\");");
        assert!(!result.handler.is_failed(), "{:?}", codes(&result));
        assert!(result
            .builder
            .iter()
            .any(|element| element.kind() == ElementKind::ModuleReference));

        let bad = evaluate_source("p := 1; core := module(p);");
        assert!(bad.handler.is_failed());
        assert!(codes(&bad).contains(&"C021"));
    }

    #[test]
    fn test_number_literal_types_narrow() {
        let result = evaluate_source("small := 7; wide := 70000;");
        assert!(!result.handler.is_failed(), "{:?}", codes(&result));
        let block = module_block(&result);

        let type_name = |name: &str| {
            let identifier = identifier_in(&result, block, name);
            let ElementPayload::Identifier { type_element, .. } =
                result.builder.element(identifier).payload
            else {
                panic!("expected identifier payload")
            };
            result.builder.type_name(type_element.expect("typed"))
        };
        assert_eq!(type_name("small"), "u8");
        assert_eq!(type_name("wide"), "u32");
    }

    #[test]
    fn test_comments_route_to_scope() {
        let result = evaluate_source("// note\na := 1; /* block */ b := 2;");
        assert!(!result.handler.is_failed(), "{:?}", codes(&result));
        let block = module_block(&result);
        assert_eq!(result.builder.block(block).comments.len(), 2);
    }

    #[test]
    fn test_defer_and_with_elements() {
        let result = evaluate_source("r := 1; d := defer { x := 1; }; w := with r;");
        assert!(!result.handler.is_failed(), "{:?}", codes(&result));
        assert!(result
            .builder
            .iter()
            .any(|element| element.kind() == ElementKind::Defer));
        assert!(result
            .builder
            .iter()
            .any(|element| element.kind() == ElementKind::With));
    }

    #[test]
    fn test_program_owns_module() {
        let result = evaluate_source("a := 1;");
        let module = result.module.unwrap();
        let ElementPayload::Program { block } =
            result.builder.element(result.program).payload
        else {
            unreachable!()
        };
        assert_eq!(result.builder.element(module).parent, Some(block));
        assert_eq!(result.builder.block(block).blocks.len(), 1);
    }
}
