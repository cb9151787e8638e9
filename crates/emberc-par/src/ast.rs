//! AST nodes and the builder/arena that allocates them.

use emberc_lex::Token;
use emberc_util::{define_idx, IndexVec, Span};

define_idx!(AstNodeId);

/// Kind tag for AST nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AstKind {
    Pair,
    Label,
    Symbol,
    Module,
    RawBlock,
    ProcCall,
    Statement,
    Attribute,
    Directive,
    Assignment,
    Expression,
    LabelList,
    BasicBlock,
    SymbolPart,
    LineComment,
    NullLiteral,
    BlockComment,
    ArgumentList,
    IfExpression,
    ParameterList,
    NumberLiteral,
    StringLiteral,
    UnaryOperator,
    CastExpression,
    FromExpression,
    ProcExpression,
    EnumExpression,
    BinaryOperator,
    BooleanLiteral,
    ElseExpression,
    WhileStatement,
    BreakStatement,
    WithExpression,
    TypeIdentifier,
    DeferExpression,
    UnionExpression,
    ReturnStatement,
    ForInStatement,
    ModuleExpression,
    StructExpression,
    ImportExpression,
    CharacterLiteral,
    ElseIfExpression,
    ContinueStatement,
    ConstantAssignment,
    TransmuteExpression,
    NamespaceExpression,
    SubscriptExpression,
    ReturnArgumentList,
    ArraySubscriptList,
    AssignmentTargetList,
    AssignmentSourceList,
}

impl AstKind {
    /// Stable name used in diagnostics and graph dumps.
    pub fn name(&self) -> &'static str {
        match self {
            AstKind::Pair => "pair",
            AstKind::Label => "label",
            AstKind::Symbol => "symbol",
            AstKind::Module => "module",
            AstKind::RawBlock => "raw_block",
            AstKind::ProcCall => "proc_call",
            AstKind::Statement => "statement",
            AstKind::Attribute => "attribute",
            AstKind::Directive => "directive",
            AstKind::Assignment => "assignment",
            AstKind::Expression => "expression",
            AstKind::LabelList => "label_list",
            AstKind::BasicBlock => "basic_block",
            AstKind::SymbolPart => "symbol_part",
            AstKind::LineComment => "line_comment",
            AstKind::NullLiteral => "null_literal",
            AstKind::BlockComment => "block_comment",
            AstKind::ArgumentList => "argument_list",
            AstKind::IfExpression => "if_expression",
            AstKind::ParameterList => "parameter_list",
            AstKind::NumberLiteral => "number_literal",
            AstKind::StringLiteral => "string_literal",
            AstKind::UnaryOperator => "unary_operator",
            AstKind::CastExpression => "cast_expression",
            AstKind::FromExpression => "from_expression",
            AstKind::ProcExpression => "proc_expression",
            AstKind::EnumExpression => "enum_expression",
            AstKind::BinaryOperator => "binary_operator",
            AstKind::BooleanLiteral => "boolean_literal",
            AstKind::ElseExpression => "else_expression",
            AstKind::WhileStatement => "while_statement",
            AstKind::BreakStatement => "break_statement",
            AstKind::WithExpression => "with_expression",
            AstKind::TypeIdentifier => "type_identifier",
            AstKind::DeferExpression => "defer_expression",
            AstKind::UnionExpression => "union_expression",
            AstKind::ReturnStatement => "return_statement",
            AstKind::ForInStatement => "for_in_statement",
            AstKind::ModuleExpression => "module_expression",
            AstKind::StructExpression => "struct_expression",
            AstKind::ImportExpression => "import_expression",
            AstKind::CharacterLiteral => "character_literal",
            AstKind::ElseIfExpression => "else_if_expression",
            AstKind::ContinueStatement => "continue_statement",
            AstKind::ConstantAssignment => "constant_assignment",
            AstKind::TransmuteExpression => "transmute_expression",
            AstKind::NamespaceExpression => "namespace_expression",
            AstKind::SubscriptExpression => "subscript_expression",
            AstKind::ReturnArgumentList => "return_argument_list",
            AstKind::ArraySubscriptList => "array_subscript_list",
            AstKind::AssignmentTargetList => "assignment_target_list",
            AstKind::AssignmentSourceList => "assignment_source_list",
        }
    }
}

/// A single AST node.
///
/// Nodes hold their originating token, optional left/right children, an
/// ordered child list, and bit flags. Flags only apply where they are
/// defined: `pointer`/`array`/`spread` on type identifiers and parameters.
#[derive(Clone, Debug)]
pub struct AstNode {
    /// Unique id within the session; strictly increasing allocation order.
    pub id: AstNodeId,
    /// Kind tag
    pub kind: AstKind,
    /// Originating token
    pub token: Token,
    /// Source location; may extend past the token for composite nodes
    pub span: Span,
    /// Optional left child
    pub lhs: Option<AstNodeId>,
    /// Optional right child
    pub rhs: Option<AstNodeId>,
    /// Ordered child list
    pub children: Vec<AstNodeId>,
    /// Flag bits (see `FLAG_*`)
    pub flags: u8,
    /// Parent node, set as the tree is wired together
    pub parent: Option<AstNodeId>,
    /// Attributes waiting to be transferred to the next statement
    pub pending_attributes: Vec<AstNodeId>,
}

impl AstNode {
    pub const FLAG_POINTER: u8 = 0b0000_0001;
    pub const FLAG_ARRAY: u8 = 0b0000_0010;
    pub const FLAG_SPREAD: u8 = 0b0000_0100;

    pub fn is_pointer(&self) -> bool {
        self.flags & Self::FLAG_POINTER != 0
    }

    pub fn is_array(&self) -> bool {
        self.flags & Self::FLAG_ARRAY != 0
    }

    pub fn is_spread(&self) -> bool {
        self.flags & Self::FLAG_SPREAD != 0
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn is_comment(&self) -> bool {
        matches!(self.kind, AstKind::LineComment | AstKind::BlockComment)
    }

    pub fn is_attribute(&self) -> bool {
        self.kind == AstKind::Attribute
    }

    pub fn is_label(&self) -> bool {
        self.kind == AstKind::Label
    }

    /// A symbol with more than one part is namespace-qualified.
    pub fn is_qualified_symbol(&self) -> bool {
        self.kind == AstKind::Symbol && self.children.len() > 1
    }
}

/// Central factory for AST nodes.
///
/// Owns the node arena, hands out monotonically increasing ids, and tracks
/// the lexical scope stack while the parser descends into `{}` blocks.
pub struct AstBuilder {
    nodes: IndexVec<AstNodeId, AstNode>,
    scope_stack: Vec<AstNodeId>,
}

impl AstBuilder {
    pub fn new() -> Self {
        Self {
            nodes: IndexVec::new(),
            scope_stack: Vec::new(),
        }
    }

    /// Number of nodes allocated so far.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: AstNodeId) -> &AstNode {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: AstNodeId) -> &mut AstNode {
        &mut self.nodes[id]
    }

    /// Iterate all nodes in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = &AstNode> {
        self.nodes.iter()
    }

    fn make_node(&mut self, kind: AstKind, token: Token) -> AstNodeId {
        let span = token.span;
        let next = AstNodeId(self.nodes.len() as u32);
        self.nodes.push(AstNode {
            id: next,
            kind,
            token,
            span,
            lhs: None,
            rhs: None,
            children: Vec::new(),
            flags: 0,
            parent: None,
            pending_attributes: Vec::new(),
        })
    }

    // ------------------------------------------------------------------
    // tree wiring
    // ------------------------------------------------------------------

    /// Set the left child, wiring its parent pointer.
    pub fn set_lhs(&mut self, parent: AstNodeId, child: AstNodeId) {
        self.nodes[parent].lhs = Some(child);
        self.nodes[child].parent = Some(parent);
    }

    /// Set the right child, wiring its parent pointer.
    pub fn set_rhs(&mut self, parent: AstNodeId, child: AstNodeId) {
        self.nodes[parent].rhs = Some(child);
        self.nodes[child].parent = Some(parent);
    }

    /// Append an ordered child, wiring its parent pointer.
    pub fn add_child(&mut self, parent: AstNodeId, child: AstNodeId) {
        self.nodes[parent].children.push(child);
        self.nodes[child].parent = Some(parent);
    }

    // ------------------------------------------------------------------
    // scope stack
    // ------------------------------------------------------------------

    /// Open a new lexical scope.
    ///
    /// The outermost scope is the module node; every nested `{` opens a
    /// basic block.
    pub fn begin_scope(&mut self) -> AstNodeId {
        let node = if self.scope_stack.is_empty() {
            self.module_node()
        } else {
            self.basic_block_node()
        };
        self.push_scope(node);
        node
    }

    /// Close the current scope and return it.
    pub fn end_scope(&mut self) -> Option<AstNodeId> {
        self.pop_scope()
    }

    pub fn push_scope(&mut self, node: AstNodeId) {
        self.scope_stack.push(node);
    }

    pub fn pop_scope(&mut self) -> Option<AstNodeId> {
        self.scope_stack.pop()
    }

    pub fn current_scope(&self) -> Option<AstNodeId> {
        self.scope_stack.last().copied()
    }

    /// Depth of the scope stack; zero once parsing has balanced out.
    pub fn scope_depth(&self) -> usize {
        self.scope_stack.len()
    }

    // ------------------------------------------------------------------
    // typed constructors
    // ------------------------------------------------------------------

    pub fn module_node(&mut self) -> AstNodeId {
        self.make_node(AstKind::Module, Token::eof())
    }

    pub fn basic_block_node(&mut self) -> AstNodeId {
        self.make_node(AstKind::BasicBlock, Token::eof())
    }

    pub fn statement_node(&mut self) -> AstNodeId {
        self.make_node(AstKind::Statement, Token::eof())
    }

    pub fn expression_node(&mut self) -> AstNodeId {
        self.make_node(AstKind::Expression, Token::eof())
    }

    pub fn pair_node(&mut self) -> AstNodeId {
        self.make_node(AstKind::Pair, Token::eof())
    }

    pub fn symbol_node(&mut self) -> AstNodeId {
        self.make_node(AstKind::Symbol, Token::eof())
    }

    pub fn label_list_node(&mut self) -> AstNodeId {
        self.make_node(AstKind::LabelList, Token::eof())
    }

    pub fn argument_list_node(&mut self) -> AstNodeId {
        self.make_node(AstKind::ArgumentList, Token::eof())
    }

    pub fn parameter_list_node(&mut self) -> AstNodeId {
        self.make_node(AstKind::ParameterList, Token::eof())
    }

    pub fn return_argument_list_node(&mut self) -> AstNodeId {
        self.make_node(AstKind::ReturnArgumentList, Token::eof())
    }

    pub fn array_subscript_list_node(&mut self) -> AstNodeId {
        self.make_node(AstKind::ArraySubscriptList, Token::eof())
    }

    pub fn assignment_target_list_node(&mut self) -> AstNodeId {
        self.make_node(AstKind::AssignmentTargetList, Token::eof())
    }

    pub fn assignment_source_list_node(&mut self) -> AstNodeId {
        self.make_node(AstKind::AssignmentSourceList, Token::eof())
    }

    pub fn subscript_node(&mut self) -> AstNodeId {
        self.make_node(AstKind::SubscriptExpression, Token::eof())
    }

    pub fn type_identifier_node(&mut self) -> AstNodeId {
        self.make_node(AstKind::TypeIdentifier, Token::eof())
    }

    pub fn proc_call_node(&mut self) -> AstNodeId {
        self.make_node(AstKind::ProcCall, Token::eof())
    }

    /// Assignment nodes pre-allocate their target and source lists so the
    /// parser can flatten comma pairs straight into them.
    pub fn assignment_node(&mut self, kind: AstKind, token: Token) -> AstNodeId {
        debug_assert!(matches!(
            kind,
            AstKind::Assignment | AstKind::ConstantAssignment
        ));
        let node = self.make_node(kind, token);
        let targets = self.assignment_target_list_node();
        let sources = self.assignment_source_list_node();
        self.set_lhs(node, targets);
        self.set_rhs(node, sources);
        node
    }

    pub fn binary_operator_node(
        &mut self,
        lhs: AstNodeId,
        token: Token,
        rhs: AstNodeId,
    ) -> AstNodeId {
        let node = self.make_node(AstKind::BinaryOperator, token);
        self.set_lhs(node, lhs);
        self.set_rhs(node, rhs);
        let span = self.nodes[lhs].span.merge(self.nodes[rhs].span);
        self.nodes[node].span = span;
        node
    }

    pub fn unary_operator_node(&mut self, token: Token) -> AstNodeId {
        self.make_node(AstKind::UnaryOperator, token)
    }

    /// Return statements pre-allocate their argument list.
    pub fn return_node(&mut self, token: Token) -> AstNodeId {
        let node = self.make_node(AstKind::ReturnStatement, token);
        let arguments = self.return_argument_list_node();
        self.set_rhs(node, arguments);
        node
    }

    /// Proc expressions pre-allocate the return list (lhs) and parameter
    /// list (rhs).
    pub fn proc_expression_node(&mut self, token: Token) -> AstNodeId {
        let node = self.make_node(AstKind::ProcExpression, token);
        let returns = self.return_argument_list_node();
        let parameters = self.parameter_list_node();
        self.set_lhs(node, returns);
        self.set_rhs(node, parameters);
        node
    }

    pub fn if_node(&mut self, token: Token) -> AstNodeId {
        self.make_node(AstKind::IfExpression, token)
    }

    pub fn else_if_node(&mut self, token: Token) -> AstNodeId {
        self.make_node(AstKind::ElseIfExpression, token)
    }

    pub fn else_node(&mut self, token: Token) -> AstNodeId {
        self.make_node(AstKind::ElseExpression, token)
    }

    pub fn while_node(&mut self, token: Token) -> AstNodeId {
        self.make_node(AstKind::WhileStatement, token)
    }

    pub fn for_in_node(&mut self, token: Token) -> AstNodeId {
        self.make_node(AstKind::ForInStatement, token)
    }

    pub fn break_node(&mut self, token: Token) -> AstNodeId {
        self.make_node(AstKind::BreakStatement, token)
    }

    pub fn continue_node(&mut self, token: Token) -> AstNodeId {
        self.make_node(AstKind::ContinueStatement, token)
    }

    pub fn defer_node(&mut self, token: Token) -> AstNodeId {
        self.make_node(AstKind::DeferExpression, token)
    }

    pub fn with_node(&mut self, token: Token) -> AstNodeId {
        self.make_node(AstKind::WithExpression, token)
    }

    pub fn namespace_node(&mut self, token: Token) -> AstNodeId {
        self.make_node(AstKind::NamespaceExpression, token)
    }

    pub fn struct_node(&mut self, token: Token) -> AstNodeId {
        self.make_node(AstKind::StructExpression, token)
    }

    pub fn union_node(&mut self, token: Token) -> AstNodeId {
        self.make_node(AstKind::UnionExpression, token)
    }

    pub fn enum_node(&mut self, token: Token) -> AstNodeId {
        self.make_node(AstKind::EnumExpression, token)
    }

    pub fn cast_node(&mut self, token: Token) -> AstNodeId {
        self.make_node(AstKind::CastExpression, token)
    }

    pub fn transmute_node(&mut self, token: Token) -> AstNodeId {
        self.make_node(AstKind::TransmuteExpression, token)
    }

    pub fn import_node(&mut self, token: Token) -> AstNodeId {
        self.make_node(AstKind::ImportExpression, token)
    }

    pub fn from_node(&mut self, token: Token) -> AstNodeId {
        self.make_node(AstKind::FromExpression, token)
    }

    pub fn module_expression_node(&mut self, token: Token) -> AstNodeId {
        self.make_node(AstKind::ModuleExpression, token)
    }

    pub fn label_node(&mut self, token: Token) -> AstNodeId {
        self.make_node(AstKind::Label, token)
    }

    pub fn attribute_node(&mut self, token: Token) -> AstNodeId {
        self.make_node(AstKind::Attribute, token)
    }

    pub fn directive_node(&mut self, token: Token) -> AstNodeId {
        self.make_node(AstKind::Directive, token)
    }

    pub fn symbol_part_node(&mut self, token: Token) -> AstNodeId {
        self.make_node(AstKind::SymbolPart, token)
    }

    pub fn number_literal_node(&mut self, token: Token) -> AstNodeId {
        self.make_node(AstKind::NumberLiteral, token)
    }

    pub fn string_literal_node(&mut self, token: Token) -> AstNodeId {
        self.make_node(AstKind::StringLiteral, token)
    }

    pub fn boolean_literal_node(&mut self, token: Token) -> AstNodeId {
        self.make_node(AstKind::BooleanLiteral, token)
    }

    pub fn character_literal_node(&mut self, token: Token) -> AstNodeId {
        self.make_node(AstKind::CharacterLiteral, token)
    }

    pub fn null_literal_node(&mut self, token: Token) -> AstNodeId {
        self.make_node(AstKind::NullLiteral, token)
    }

    pub fn line_comment_node(&mut self, token: Token) -> AstNodeId {
        self.make_node(AstKind::LineComment, token)
    }

    pub fn block_comment_node(&mut self, token: Token) -> AstNodeId {
        self.make_node(AstKind::BlockComment, token)
    }

    pub fn raw_block_node(&mut self, token: Token) -> AstNodeId {
        self.make_node(AstKind::RawBlock, token)
    }
}

impl Default for AstBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emberc_lex::TokenKind;

    #[test]
    fn test_ids_are_monotonic() {
        let mut builder = AstBuilder::new();
        let a = builder.symbol_node();
        let b = builder.statement_node();
        let c = builder.expression_node();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_scope_stack_balances() {
        let mut builder = AstBuilder::new();
        let module = builder.begin_scope();
        assert_eq!(builder.scope_depth(), 1);
        let inner = builder.begin_scope();
        assert_eq!(builder.node(module).kind, AstKind::Module);
        assert_eq!(builder.node(inner).kind, AstKind::BasicBlock);
        assert_eq!(builder.end_scope(), Some(inner));
        assert_eq!(builder.end_scope(), Some(module));
        assert_eq!(builder.scope_depth(), 0);
    }

    #[test]
    fn test_children_get_parents() {
        let mut builder = AstBuilder::new();
        let parent = builder.statement_node();
        let child = builder.symbol_node();
        builder.set_rhs(parent, child);
        assert_eq!(builder.node(child).parent, Some(parent));
        assert_eq!(builder.node(parent).rhs, Some(child));
    }

    #[test]
    fn test_assignment_preallocates_lists() {
        let mut builder = AstBuilder::new();
        let token = Token::new(TokenKind::Assignment, ":=");
        let node = builder.assignment_node(AstKind::Assignment, token);
        let lhs = builder.node(node).lhs.unwrap();
        let rhs = builder.node(node).rhs.unwrap();
        assert_eq!(builder.node(lhs).kind, AstKind::AssignmentTargetList);
        assert_eq!(builder.node(rhs).kind, AstKind::AssignmentSourceList);
    }

    #[test]
    fn test_proc_preallocates_lists() {
        let mut builder = AstBuilder::new();
        let token = Token::new(TokenKind::Proc, "proc");
        let node = builder.proc_expression_node(token);
        let returns = builder.node(node).lhs.unwrap();
        let parameters = builder.node(node).rhs.unwrap();
        assert_eq!(builder.node(returns).kind, AstKind::ReturnArgumentList);
        assert_eq!(builder.node(parameters).kind, AstKind::ParameterList);
    }

    #[test]
    fn test_flags() {
        let mut builder = AstBuilder::new();
        let node = builder.type_identifier_node();
        builder.node_mut(node).flags |= AstNode::FLAG_POINTER | AstNode::FLAG_ARRAY;
        assert!(builder.node(node).is_pointer());
        assert!(builder.node(node).is_array());
        assert!(!builder.node(node).is_spread());
    }
}
