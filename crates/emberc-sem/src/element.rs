//! Semantic elements.
//!
//! Elements are a tagged variant over a shared header: id, owning module,
//! parent, source location, and attribute set, with per-kind payload. The
//! graph is a DAG rooted at the program element; parent pointers restore
//! tree structure for ownership queries.

use indexmap::IndexMap;

use emberc_util::{define_idx, IndexVec, Span};

define_idx!(ElementId);

/// Element kind tags.
///
/// Derived from the payload; used for dispatch, dumps, and diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Program,
    Module,
    ModuleReference,
    Block,
    Namespace,
    Identifier,
    IdentifierReference,
    Symbol,
    Initializer,
    Comment,
    Attribute,
    Directive,
    Statement,
    Expression,
    ArgumentList,
    BinaryOperator,
    UnaryOperator,
    Label,
    IntegerLiteral,
    FloatLiteral,
    BooleanLiteral,
    StringLiteral,
    NilLiteral,
    ProcedureType,
    ProcedureInstance,
    ProcedureCall,
    CompositeType,
    Field,
    NumericType,
    PointerType,
    ArrayType,
    BoolType,
    StringType,
    ModuleType,
    NamespaceType,
    UnknownType,
    TypeReference,
    Cast,
    Transmute,
    Return,
    If,
    While,
    ForIn,
    Defer,
    With,
    Break,
    Continue,
    Import,
    RawBlock,
    Spread,
    SizeOfIntrinsic,
    AlignOfIntrinsic,
    AddressOfIntrinsic,
    TypeOfIntrinsic,
    AllocIntrinsic,
    FreeIntrinsic,
    CopyIntrinsic,
    FillIntrinsic,
}

impl ElementKind {
    pub fn name(&self) -> &'static str {
        match self {
            ElementKind::Program => "program",
            ElementKind::Module => "module",
            ElementKind::ModuleReference => "module_reference",
            ElementKind::Block => "block",
            ElementKind::Namespace => "namespace",
            ElementKind::Identifier => "identifier",
            ElementKind::IdentifierReference => "identifier_reference",
            ElementKind::Symbol => "symbol",
            ElementKind::Initializer => "initializer",
            ElementKind::Comment => "comment",
            ElementKind::Attribute => "attribute",
            ElementKind::Directive => "directive",
            ElementKind::Statement => "statement",
            ElementKind::Expression => "expression",
            ElementKind::ArgumentList => "argument_list",
            ElementKind::BinaryOperator => "binary_operator",
            ElementKind::UnaryOperator => "unary_operator",
            ElementKind::Label => "label",
            ElementKind::IntegerLiteral => "integer_literal",
            ElementKind::FloatLiteral => "float_literal",
            ElementKind::BooleanLiteral => "boolean_literal",
            ElementKind::StringLiteral => "string_literal",
            ElementKind::NilLiteral => "nil_literal",
            ElementKind::ProcedureType => "procedure_type",
            ElementKind::ProcedureInstance => "procedure_instance",
            ElementKind::ProcedureCall => "procedure_call",
            ElementKind::CompositeType => "composite_type",
            ElementKind::Field => "field",
            ElementKind::NumericType => "numeric_type",
            ElementKind::PointerType => "pointer_type",
            ElementKind::ArrayType => "array_type",
            ElementKind::BoolType => "bool_type",
            ElementKind::StringType => "string_type",
            ElementKind::ModuleType => "module_type",
            ElementKind::NamespaceType => "namespace_type",
            ElementKind::UnknownType => "unknown_type",
            ElementKind::TypeReference => "type_reference",
            ElementKind::Cast => "cast",
            ElementKind::Transmute => "transmute",
            ElementKind::Return => "return",
            ElementKind::If => "if",
            ElementKind::While => "while",
            ElementKind::ForIn => "for_in",
            ElementKind::Defer => "defer",
            ElementKind::With => "with",
            ElementKind::Break => "break",
            ElementKind::Continue => "continue",
            ElementKind::Import => "import",
            ElementKind::RawBlock => "raw_block",
            ElementKind::Spread => "spread",
            ElementKind::SizeOfIntrinsic => "size_of_intrinsic",
            ElementKind::AlignOfIntrinsic => "align_of_intrinsic",
            ElementKind::AddressOfIntrinsic => "address_of_intrinsic",
            ElementKind::TypeOfIntrinsic => "type_of_intrinsic",
            ElementKind::AllocIntrinsic => "alloc_intrinsic",
            ElementKind::FreeIntrinsic => "free_intrinsic",
            ElementKind::CopyIntrinsic => "copy_intrinsic",
            ElementKind::FillIntrinsic => "fill_intrinsic",
        }
    }

    /// True for type-valued elements.
    pub fn is_type(&self) -> bool {
        matches!(
            self,
            ElementKind::ProcedureType
                | ElementKind::CompositeType
                | ElementKind::NumericType
                | ElementKind::PointerType
                | ElementKind::ArrayType
                | ElementKind::BoolType
                | ElementKind::StringType
                | ElementKind::ModuleType
                | ElementKind::NamespaceType
                | ElementKind::UnknownType
        )
    }
}

/// Scope block kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockKind {
    Block,
    ModuleBlock,
    ProcTypeBlock,
    ProcInstanceBlock,
}

/// Comment origin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommentKind {
    Line,
    Block,
}

/// Composite type families.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompositeKind {
    Struct,
    Union,
    Enum,
}

/// Whether an identifier lives on the heap or the stack.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IdentifierUsage {
    #[default]
    Heap,
    Stack,
}

/// The closed intrinsic set recognized in call position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntrinsicKind {
    SizeOf,
    AlignOf,
    AddressOf,
    TypeOf,
    Alloc,
    Free,
    Copy,
    Fill,
}

impl IntrinsicKind {
    /// Map a call-position name to an intrinsic, if it is one.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "size_of" => IntrinsicKind::SizeOf,
            "align_of" => IntrinsicKind::AlignOf,
            "address_of" => IntrinsicKind::AddressOf,
            "type_of" => IntrinsicKind::TypeOf,
            "alloc" => IntrinsicKind::Alloc,
            "free" => IntrinsicKind::Free,
            "copy" => IntrinsicKind::Copy,
            "fill" => IntrinsicKind::Fill,
            _ => return None,
        })
    }

    pub fn element_kind(&self) -> ElementKind {
        match self {
            IntrinsicKind::SizeOf => ElementKind::SizeOfIntrinsic,
            IntrinsicKind::AlignOf => ElementKind::AlignOfIntrinsic,
            IntrinsicKind::AddressOf => ElementKind::AddressOfIntrinsic,
            IntrinsicKind::TypeOf => ElementKind::TypeOfIntrinsic,
            IntrinsicKind::Alloc => ElementKind::AllocIntrinsic,
            IntrinsicKind::Free => ElementKind::FreeIntrinsic,
            IntrinsicKind::Copy => ElementKind::CopyIntrinsic,
            IntrinsicKind::Fill => ElementKind::FillIntrinsic,
        }
    }
}

/// Operator tags shared by unary and binary operator elements.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperatorKind {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Exponent,
    Equals,
    NotEquals,
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,
    LogicalAnd,
    LogicalOr,
    BinaryAnd,
    BinaryOr,
    BinaryXor,
    ShiftLeft,
    ShiftRight,
    RotateLeft,
    RotateRight,
    Negate,
    BinaryNot,
    LogicalNot,
    Assignment,
}

impl OperatorKind {
    /// Relational and logical operators produce booleans.
    pub fn is_boolean_valued(&self) -> bool {
        matches!(
            self,
            OperatorKind::Equals
                | OperatorKind::NotEquals
                | OperatorKind::LessThan
                | OperatorKind::LessThanEqual
                | OperatorKind::GreaterThan
                | OperatorKind::GreaterThanEqual
                | OperatorKind::LogicalAnd
                | OperatorKind::LogicalOr
                | OperatorKind::LogicalNot
        )
    }
}

/// A namespace-qualified name as written in source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QualifiedSymbol {
    pub namespaces: Vec<String>,
    pub name: String,
    pub span: Span,
}

impl QualifiedSymbol {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            namespaces: Vec::new(),
            name: name.into(),
            span: Span::DUMMY,
        }
    }

    pub fn is_qualified(&self) -> bool {
        !self.namespaces.is_empty()
    }

    /// `a::b::name` form.
    pub fn fully_qualified(&self) -> String {
        if self.namespaces.is_empty() {
            self.name.clone()
        } else {
            format!("{}::{}", self.namespaces.join("::"), self.name)
        }
    }
}

/// A scope block: four ordered collections plus symbol and type tables.
#[derive(Clone, Debug)]
pub struct Block {
    pub kind: BlockKind,
    pub statements: Vec<ElementId>,
    pub imports: Vec<ElementId>,
    pub comments: Vec<ElementId>,
    pub blocks: Vec<ElementId>,
    /// identifier name -> identifier element(s), newest last
    pub identifiers: IndexMap<String, Vec<ElementId>>,
    /// type name -> type element
    pub types: IndexMap<String, ElementId>,
}

impl Block {
    pub fn new(kind: BlockKind) -> Self {
        Self {
            kind,
            statements: Vec::new(),
            imports: Vec::new(),
            comments: Vec::new(),
            blocks: Vec::new(),
            identifiers: IndexMap::new(),
            types: IndexMap::new(),
        }
    }

    pub fn identifier(&self, name: &str) -> Option<ElementId> {
        self.identifiers.get(name).and_then(|ids| ids.last().copied())
    }

    pub fn add_identifier(&mut self, name: impl Into<String>, id: ElementId) {
        self.identifiers.entry(name.into()).or_default().push(id);
    }
}

/// Per-kind payload.
#[derive(Clone, Debug)]
pub enum ElementPayload {
    Program {
        block: ElementId,
    },
    Module {
        block: ElementId,
        source_path: String,
    },
    ModuleReference {
        expression: ElementId,
        path: String,
    },
    Block(Block),
    Namespace {
        block: ElementId,
    },
    Identifier {
        symbol: ElementId,
        initializer: Option<ElementId>,
        type_element: Option<ElementId>,
        inferred_type: bool,
        usage: IdentifierUsage,
    },
    IdentifierReference {
        symbol: QualifiedSymbol,
        identifier: Option<ElementId>,
    },
    Symbol {
        name: String,
        namespaces: Vec<String>,
        constant: bool,
    },
    Initializer {
        expression: ElementId,
    },
    Comment {
        kind: CommentKind,
        value: String,
    },
    Attribute {
        name: String,
        expression: Option<ElementId>,
    },
    Directive {
        name: String,
        expression: Option<ElementId>,
    },
    Statement {
        labels: Vec<ElementId>,
        expression: ElementId,
    },
    Expression {
        inner: ElementId,
    },
    ArgumentList {
        arguments: Vec<ElementId>,
    },
    BinaryOperator {
        operator: OperatorKind,
        lhs: ElementId,
        rhs: ElementId,
    },
    UnaryOperator {
        operator: OperatorKind,
        operand: ElementId,
    },
    Label {
        name: String,
    },
    IntegerLiteral {
        value: u64,
    },
    FloatLiteral {
        value: f64,
    },
    BooleanLiteral {
        value: bool,
    },
    StringLiteral {
        value: String,
    },
    NilLiteral,
    ProcedureType {
        scope: ElementId,
        parameters: Vec<ElementId>,
        returns: Vec<ElementId>,
        instances: Vec<ElementId>,
    },
    ProcedureInstance {
        procedure_type: ElementId,
        scope: ElementId,
    },
    ProcedureCall {
        reference: ElementId,
        arguments: Option<ElementId>,
    },
    CompositeType {
        composite: CompositeKind,
        scope: ElementId,
        fields: Vec<ElementId>,
    },
    Field {
        identifier: ElementId,
    },
    NumericType {
        name: String,
        size_in_bytes: u8,
        is_signed: bool,
        is_float: bool,
    },
    PointerType {
        base: ElementId,
    },
    ArrayType {
        base: ElementId,
    },
    BoolType,
    StringType,
    ModuleType,
    NamespaceType,
    UnknownType {
        name: String,
    },
    TypeReference {
        symbol: QualifiedSymbol,
        referenced_type: ElementId,
    },
    Cast {
        type_reference: ElementId,
        expression: ElementId,
    },
    Transmute {
        type_reference: ElementId,
        expression: ElementId,
    },
    Return {
        expressions: Vec<ElementId>,
    },
    If {
        predicate: ElementId,
        true_branch: ElementId,
        false_branch: Option<ElementId>,
    },
    While {
        predicate: ElementId,
        body: ElementId,
    },
    ForIn {
        induction: ElementId,
        iterable: ElementId,
        body: ElementId,
    },
    Defer {
        expression: ElementId,
    },
    With {
        expression: ElementId,
    },
    Break {
        label: Option<ElementId>,
    },
    Continue {
        label: Option<ElementId>,
    },
    Import {
        reference: ElementId,
        from_reference: Option<ElementId>,
        module: Option<ElementId>,
    },
    RawBlock {
        value: String,
    },
    Spread {
        expression: ElementId,
    },
    Intrinsic {
        intrinsic: IntrinsicKind,
        arguments: Option<ElementId>,
    },
}

impl ElementPayload {
    pub fn kind(&self) -> ElementKind {
        match self {
            ElementPayload::Program { .. } => ElementKind::Program,
            ElementPayload::Module { .. } => ElementKind::Module,
            ElementPayload::ModuleReference { .. } => ElementKind::ModuleReference,
            ElementPayload::Block(_) => ElementKind::Block,
            ElementPayload::Namespace { .. } => ElementKind::Namespace,
            ElementPayload::Identifier { .. } => ElementKind::Identifier,
            ElementPayload::IdentifierReference { .. } => ElementKind::IdentifierReference,
            ElementPayload::Symbol { .. } => ElementKind::Symbol,
            ElementPayload::Initializer { .. } => ElementKind::Initializer,
            ElementPayload::Comment { .. } => ElementKind::Comment,
            ElementPayload::Attribute { .. } => ElementKind::Attribute,
            ElementPayload::Directive { .. } => ElementKind::Directive,
            ElementPayload::Statement { .. } => ElementKind::Statement,
            ElementPayload::Expression { .. } => ElementKind::Expression,
            ElementPayload::ArgumentList { .. } => ElementKind::ArgumentList,
            ElementPayload::BinaryOperator { .. } => ElementKind::BinaryOperator,
            ElementPayload::UnaryOperator { .. } => ElementKind::UnaryOperator,
            ElementPayload::Label { .. } => ElementKind::Label,
            ElementPayload::IntegerLiteral { .. } => ElementKind::IntegerLiteral,
            ElementPayload::FloatLiteral { .. } => ElementKind::FloatLiteral,
            ElementPayload::BooleanLiteral { .. } => ElementKind::BooleanLiteral,
            ElementPayload::StringLiteral { .. } => ElementKind::StringLiteral,
            ElementPayload::NilLiteral => ElementKind::NilLiteral,
            ElementPayload::ProcedureType { .. } => ElementKind::ProcedureType,
            ElementPayload::ProcedureInstance { .. } => ElementKind::ProcedureInstance,
            ElementPayload::ProcedureCall { .. } => ElementKind::ProcedureCall,
            ElementPayload::CompositeType { .. } => ElementKind::CompositeType,
            ElementPayload::Field { .. } => ElementKind::Field,
            ElementPayload::NumericType { .. } => ElementKind::NumericType,
            ElementPayload::PointerType { .. } => ElementKind::PointerType,
            ElementPayload::ArrayType { .. } => ElementKind::ArrayType,
            ElementPayload::BoolType => ElementKind::BoolType,
            ElementPayload::StringType => ElementKind::StringType,
            ElementPayload::ModuleType => ElementKind::ModuleType,
            ElementPayload::NamespaceType => ElementKind::NamespaceType,
            ElementPayload::UnknownType { .. } => ElementKind::UnknownType,
            ElementPayload::TypeReference { .. } => ElementKind::TypeReference,
            ElementPayload::Cast { .. } => ElementKind::Cast,
            ElementPayload::Transmute { .. } => ElementKind::Transmute,
            ElementPayload::Return { .. } => ElementKind::Return,
            ElementPayload::If { .. } => ElementKind::If,
            ElementPayload::While { .. } => ElementKind::While,
            ElementPayload::ForIn { .. } => ElementKind::ForIn,
            ElementPayload::Defer { .. } => ElementKind::Defer,
            ElementPayload::With { .. } => ElementKind::With,
            ElementPayload::Break { .. } => ElementKind::Break,
            ElementPayload::Continue { .. } => ElementKind::Continue,
            ElementPayload::Import { .. } => ElementKind::Import,
            ElementPayload::RawBlock { .. } => ElementKind::RawBlock,
            ElementPayload::Spread { .. } => ElementKind::Spread,
            ElementPayload::Intrinsic { intrinsic, .. } => intrinsic.element_kind(),
        }
    }
}

/// One element: shared header plus payload.
#[derive(Clone, Debug)]
pub struct Element {
    pub id: ElementId,
    /// Owning module, once one is open
    pub module: Option<ElementId>,
    /// Parent element for ownership walks
    pub parent: Option<ElementId>,
    pub span: Span,
    pub attributes: Vec<ElementId>,
    pub payload: ElementPayload,
}

impl Element {
    pub fn kind(&self) -> ElementKind {
        self.payload.kind()
    }

    pub fn as_block(&self) -> Option<&Block> {
        match &self.payload {
            ElementPayload::Block(block) => Some(block),
            _ => None,
        }
    }

    pub fn as_block_mut(&mut self) -> Option<&mut Block> {
        match &mut self.payload {
            ElementPayload::Block(block) => Some(block),
            _ => None,
        }
    }
}

/// Sole allocator of semantic elements.
///
/// Sets owning module, parent, id, and location on every construction and
/// wires parent pointers for children so ownership forms a tree.
pub struct ElementBuilder {
    elements: IndexVec<ElementId, Element>,
    current_module: Option<ElementId>,
}

impl ElementBuilder {
    pub fn new() -> Self {
        Self {
            elements: IndexVec::new(),
            current_module: None,
        }
    }

    pub fn element(&self, id: ElementId) -> &Element {
        &self.elements[id]
    }

    pub fn element_mut(&mut self, id: ElementId) -> &mut Element {
        &mut self.elements[id]
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Element> {
        self.elements.iter()
    }

    /// Module stamped onto newly built elements.
    pub fn set_current_module(&mut self, module: Option<ElementId>) {
        self.current_module = module;
    }

    pub fn make(&mut self, parent: Option<ElementId>, span: Span, payload: ElementPayload) -> ElementId {
        let next = ElementId(self.elements.len() as u32);
        self.elements.push(Element {
            id: next,
            module: self.current_module,
            parent,
            span,
            attributes: Vec::new(),
            payload,
        })
    }

    pub fn set_parent(&mut self, child: ElementId, parent: ElementId) {
        self.elements[child].parent = Some(parent);
    }

    pub fn kind(&self, id: ElementId) -> ElementKind {
        self.elements[id].kind()
    }

    pub fn block(&self, id: ElementId) -> &Block {
        self.elements[id].as_block().expect("element is a block")
    }

    pub fn block_mut(&mut self, id: ElementId) -> &mut Block {
        self.elements[id]
            .as_block_mut()
            .expect("element is a block")
    }

    // ------------------------------------------------------------------
    // constructors
    // ------------------------------------------------------------------

    pub fn make_block(&mut self, parent: Option<ElementId>, kind: BlockKind) -> ElementId {
        self.make(parent, Span::DUMMY, ElementPayload::Block(Block::new(kind)))
    }

    pub fn make_program(&mut self) -> ElementId {
        let block = self.make_block(None, BlockKind::ModuleBlock);
        let program = self.make(None, Span::DUMMY, ElementPayload::Program { block });
        self.set_parent(block, program);
        program
    }

    pub fn make_module(
        &mut self,
        parent: ElementId,
        block: ElementId,
        source_path: impl Into<String>,
    ) -> ElementId {
        let module = self.make(
            Some(parent),
            Span::DUMMY,
            ElementPayload::Module {
                block,
                source_path: source_path.into(),
            },
        );
        self.set_parent(block, module);
        module
    }

    pub fn make_namespace(&mut self, parent: ElementId, block: ElementId) -> ElementId {
        let namespace = self.make(Some(parent), Span::DUMMY, ElementPayload::Namespace { block });
        self.set_parent(block, namespace);
        namespace
    }

    pub fn make_symbol(
        &mut self,
        parent: ElementId,
        name: impl Into<String>,
        namespaces: Vec<String>,
        span: Span,
    ) -> ElementId {
        self.make(
            Some(parent),
            span,
            ElementPayload::Symbol {
                name: name.into(),
                namespaces,
                constant: false,
            },
        )
    }

    pub fn make_identifier(
        &mut self,
        parent: ElementId,
        symbol: ElementId,
        initializer: Option<ElementId>,
    ) -> ElementId {
        let span = self.elements[symbol].span;
        let identifier = self.make(
            Some(parent),
            span,
            ElementPayload::Identifier {
                symbol,
                initializer,
                type_element: None,
                inferred_type: false,
                usage: IdentifierUsage::Heap,
            },
        );
        self.set_parent(symbol, identifier);
        if let Some(initializer) = initializer {
            self.set_parent(initializer, identifier);
        }
        identifier
    }

    pub fn make_identifier_reference(
        &mut self,
        parent: ElementId,
        symbol: QualifiedSymbol,
        identifier: Option<ElementId>,
    ) -> ElementId {
        let span = symbol.span;
        self.make(
            Some(parent),
            span,
            ElementPayload::IdentifierReference { symbol, identifier },
        )
    }

    pub fn make_initializer(&mut self, parent: ElementId, expression: ElementId) -> ElementId {
        let span = self.elements[expression].span;
        let initializer = self.make(
            Some(parent),
            span,
            ElementPayload::Initializer { expression },
        );
        self.set_parent(expression, initializer);
        initializer
    }

    pub fn make_comment(
        &mut self,
        parent: ElementId,
        kind: CommentKind,
        value: impl Into<String>,
    ) -> ElementId {
        self.make(
            Some(parent),
            Span::DUMMY,
            ElementPayload::Comment {
                kind,
                value: value.into(),
            },
        )
    }

    pub fn make_attribute(
        &mut self,
        parent: ElementId,
        name: impl Into<String>,
        expression: Option<ElementId>,
    ) -> ElementId {
        let attribute = self.make(
            Some(parent),
            Span::DUMMY,
            ElementPayload::Attribute {
                name: name.into(),
                expression,
            },
        );
        if let Some(expression) = expression {
            self.set_parent(expression, attribute);
        }
        attribute
    }

    pub fn make_directive(
        &mut self,
        parent: ElementId,
        name: impl Into<String>,
        expression: Option<ElementId>,
    ) -> ElementId {
        let directive = self.make(
            Some(parent),
            Span::DUMMY,
            ElementPayload::Directive {
                name: name.into(),
                expression,
            },
        );
        if let Some(expression) = expression {
            self.set_parent(expression, directive);
        }
        directive
    }

    pub fn make_statement(
        &mut self,
        parent: ElementId,
        labels: Vec<ElementId>,
        expression: ElementId,
    ) -> ElementId {
        let span = self.elements[expression].span;
        let statement = self.make(
            Some(parent),
            span,
            ElementPayload::Statement { labels, expression },
        );
        self.set_parent(expression, statement);
        statement
    }

    pub fn make_expression(&mut self, parent: ElementId, inner: ElementId) -> ElementId {
        let span = self.elements[inner].span;
        let expression = self.make(Some(parent), span, ElementPayload::Expression { inner });
        self.set_parent(inner, expression);
        expression
    }

    pub fn make_argument_list(&mut self, parent: ElementId) -> ElementId {
        self.make(
            Some(parent),
            Span::DUMMY,
            ElementPayload::ArgumentList {
                arguments: Vec::new(),
            },
        )
    }

    pub fn add_argument(&mut self, list: ElementId, argument: ElementId) {
        if let ElementPayload::ArgumentList { arguments } = &mut self.elements[list].payload {
            arguments.push(argument);
        }
        self.set_parent(argument, list);
    }

    pub fn make_binary_operator(
        &mut self,
        parent: ElementId,
        operator: OperatorKind,
        lhs: ElementId,
        rhs: ElementId,
    ) -> ElementId {
        let span = self.elements[lhs].span.merge(self.elements[rhs].span);
        let node = self.make(
            Some(parent),
            span,
            ElementPayload::BinaryOperator { operator, lhs, rhs },
        );
        self.set_parent(lhs, node);
        self.set_parent(rhs, node);
        node
    }

    pub fn make_unary_operator(
        &mut self,
        parent: ElementId,
        operator: OperatorKind,
        operand: ElementId,
    ) -> ElementId {
        let span = self.elements[operand].span;
        let node = self.make(
            Some(parent),
            span,
            ElementPayload::UnaryOperator { operator, operand },
        );
        self.set_parent(operand, node);
        node
    }

    pub fn make_label(&mut self, parent: ElementId, name: impl Into<String>) -> ElementId {
        self.make(
            Some(parent),
            Span::DUMMY,
            ElementPayload::Label { name: name.into() },
        )
    }

    pub fn make_integer(&mut self, parent: ElementId, value: u64, span: Span) -> ElementId {
        self.make(Some(parent), span, ElementPayload::IntegerLiteral { value })
    }

    pub fn make_float(&mut self, parent: ElementId, value: f64, span: Span) -> ElementId {
        self.make(Some(parent), span, ElementPayload::FloatLiteral { value })
    }

    pub fn make_bool(&mut self, parent: ElementId, value: bool, span: Span) -> ElementId {
        self.make(Some(parent), span, ElementPayload::BooleanLiteral { value })
    }

    pub fn make_string(&mut self, parent: ElementId, value: impl Into<String>, span: Span) -> ElementId {
        self.make(
            Some(parent),
            span,
            ElementPayload::StringLiteral {
                value: value.into(),
            },
        )
    }

    pub fn make_nil(&mut self, parent: ElementId, span: Span) -> ElementId {
        self.make(Some(parent), span, ElementPayload::NilLiteral)
    }

    pub fn make_procedure_type(&mut self, parent: ElementId, scope: ElementId) -> ElementId {
        let proc_type = self.make(
            Some(parent),
            Span::DUMMY,
            ElementPayload::ProcedureType {
                scope,
                parameters: Vec::new(),
                returns: Vec::new(),
                instances: Vec::new(),
            },
        );
        self.set_parent(scope, proc_type);
        proc_type
    }

    pub fn make_procedure_instance(
        &mut self,
        parent: ElementId,
        procedure_type: ElementId,
        scope: ElementId,
    ) -> ElementId {
        let instance = self.make(
            Some(parent),
            Span::DUMMY,
            ElementPayload::ProcedureInstance {
                procedure_type,
                scope,
            },
        );
        self.set_parent(scope, instance);
        instance
    }

    pub fn make_procedure_call(
        &mut self,
        parent: ElementId,
        reference: ElementId,
        arguments: Option<ElementId>,
    ) -> ElementId {
        let call = self.make(
            Some(parent),
            Span::DUMMY,
            ElementPayload::ProcedureCall {
                reference,
                arguments,
            },
        );
        self.set_parent(reference, call);
        if let Some(arguments) = arguments {
            self.set_parent(arguments, call);
        }
        call
    }

    pub fn make_composite_type(
        &mut self,
        parent: ElementId,
        composite: CompositeKind,
        scope: ElementId,
    ) -> ElementId {
        let element = self.make(
            Some(parent),
            Span::DUMMY,
            ElementPayload::CompositeType {
                composite,
                scope,
                fields: Vec::new(),
            },
        );
        self.set_parent(scope, element);
        element
    }

    pub fn make_field(&mut self, parent: ElementId, identifier: ElementId) -> ElementId {
        let field = self.make(Some(parent), Span::DUMMY, ElementPayload::Field { identifier });
        self.set_parent(identifier, field);
        field
    }

    pub fn make_numeric_type(
        &mut self,
        parent: ElementId,
        name: impl Into<String>,
        size_in_bytes: u8,
        is_signed: bool,
        is_float: bool,
    ) -> ElementId {
        self.make(
            Some(parent),
            Span::DUMMY,
            ElementPayload::NumericType {
                name: name.into(),
                size_in_bytes,
                is_signed,
                is_float,
            },
        )
    }

    pub fn make_pointer_type(&mut self, parent: ElementId, base: ElementId) -> ElementId {
        self.make(Some(parent), Span::DUMMY, ElementPayload::PointerType { base })
    }

    pub fn make_array_type(&mut self, parent: ElementId, base: ElementId) -> ElementId {
        self.make(Some(parent), Span::DUMMY, ElementPayload::ArrayType { base })
    }

    pub fn make_unknown_type(&mut self, parent: ElementId, name: impl Into<String>) -> ElementId {
        self.make(
            Some(parent),
            Span::DUMMY,
            ElementPayload::UnknownType { name: name.into() },
        )
    }

    pub fn make_type_reference(
        &mut self,
        parent: ElementId,
        symbol: QualifiedSymbol,
        referenced_type: ElementId,
    ) -> ElementId {
        self.make(
            Some(parent),
            Span::DUMMY,
            ElementPayload::TypeReference {
                symbol,
                referenced_type,
            },
        )
    }

    pub fn make_cast(
        &mut self,
        parent: ElementId,
        type_reference: ElementId,
        expression: ElementId,
    ) -> ElementId {
        let cast = self.make(
            Some(parent),
            Span::DUMMY,
            ElementPayload::Cast {
                type_reference,
                expression,
            },
        );
        self.set_parent(type_reference, cast);
        self.set_parent(expression, cast);
        cast
    }

    pub fn make_transmute(
        &mut self,
        parent: ElementId,
        type_reference: ElementId,
        expression: ElementId,
    ) -> ElementId {
        let transmute = self.make(
            Some(parent),
            Span::DUMMY,
            ElementPayload::Transmute {
                type_reference,
                expression,
            },
        );
        self.set_parent(type_reference, transmute);
        self.set_parent(expression, transmute);
        transmute
    }

    pub fn make_return(&mut self, parent: ElementId) -> ElementId {
        self.make(
            Some(parent),
            Span::DUMMY,
            ElementPayload::Return {
                expressions: Vec::new(),
            },
        )
    }

    pub fn make_if(
        &mut self,
        parent: ElementId,
        predicate: ElementId,
        true_branch: ElementId,
        false_branch: Option<ElementId>,
    ) -> ElementId {
        let node = self.make(
            Some(parent),
            Span::DUMMY,
            ElementPayload::If {
                predicate,
                true_branch,
                false_branch,
            },
        );
        self.set_parent(predicate, node);
        self.set_parent(true_branch, node);
        if let Some(false_branch) = false_branch {
            self.set_parent(false_branch, node);
        }
        node
    }

    pub fn make_while(&mut self, parent: ElementId, predicate: ElementId, body: ElementId) -> ElementId {
        let node = self.make(
            Some(parent),
            Span::DUMMY,
            ElementPayload::While { predicate, body },
        );
        self.set_parent(predicate, node);
        self.set_parent(body, node);
        node
    }

    pub fn make_for_in(
        &mut self,
        parent: ElementId,
        induction: ElementId,
        iterable: ElementId,
        body: ElementId,
    ) -> ElementId {
        let node = self.make(
            Some(parent),
            Span::DUMMY,
            ElementPayload::ForIn {
                induction,
                iterable,
                body,
            },
        );
        self.set_parent(induction, node);
        self.set_parent(iterable, node);
        self.set_parent(body, node);
        node
    }

    pub fn make_defer(&mut self, parent: ElementId, expression: ElementId) -> ElementId {
        let node = self.make(Some(parent), Span::DUMMY, ElementPayload::Defer { expression });
        self.set_parent(expression, node);
        node
    }

    pub fn make_with(&mut self, parent: ElementId, expression: ElementId) -> ElementId {
        let node = self.make(Some(parent), Span::DUMMY, ElementPayload::With { expression });
        self.set_parent(expression, node);
        node
    }

    pub fn make_break(&mut self, parent: ElementId, label: Option<ElementId>) -> ElementId {
        self.make(Some(parent), Span::DUMMY, ElementPayload::Break { label })
    }

    pub fn make_continue(&mut self, parent: ElementId, label: Option<ElementId>) -> ElementId {
        self.make(Some(parent), Span::DUMMY, ElementPayload::Continue { label })
    }

    pub fn make_import(
        &mut self,
        parent: ElementId,
        reference: ElementId,
        from_reference: Option<ElementId>,
        module: Option<ElementId>,
    ) -> ElementId {
        let import = self.make(
            Some(parent),
            Span::DUMMY,
            ElementPayload::Import {
                reference,
                from_reference,
                module,
            },
        );
        self.set_parent(reference, import);
        import
    }

    pub fn make_module_reference(
        &mut self,
        parent: ElementId,
        expression: ElementId,
        path: impl Into<String>,
    ) -> ElementId {
        let reference = self.make(
            Some(parent),
            Span::DUMMY,
            ElementPayload::ModuleReference {
                expression,
                path: path.into(),
            },
        );
        self.set_parent(expression, reference);
        reference
    }

    pub fn make_raw_block(&mut self, parent: ElementId, value: impl Into<String>) -> ElementId {
        self.make(
            Some(parent),
            Span::DUMMY,
            ElementPayload::RawBlock {
                value: value.into(),
            },
        )
    }

    pub fn make_spread(&mut self, parent: ElementId, expression: ElementId) -> ElementId {
        let node = self.make(Some(parent), Span::DUMMY, ElementPayload::Spread { expression });
        self.set_parent(expression, node);
        node
    }

    pub fn make_intrinsic(
        &mut self,
        parent: ElementId,
        intrinsic: IntrinsicKind,
        arguments: Option<ElementId>,
    ) -> ElementId {
        let node = self.make(
            Some(parent),
            Span::DUMMY,
            ElementPayload::Intrinsic {
                intrinsic,
                arguments,
            },
        );
        if let Some(arguments) = arguments {
            self.set_parent(arguments, node);
        }
        node
    }

    // ------------------------------------------------------------------
    // queries
    // ------------------------------------------------------------------

    /// Whether an element is a compile-time constant.
    pub fn is_constant(&self, id: ElementId) -> bool {
        match self.elements[id].kind() {
            ElementKind::IntegerLiteral
            | ElementKind::FloatLiteral
            | ElementKind::BooleanLiteral
            | ElementKind::StringLiteral
            | ElementKind::NilLiteral
            | ElementKind::Namespace
            | ElementKind::RawBlock
            | ElementKind::TypeReference
            | ElementKind::ModuleReference => true,
            kind if kind.is_type() => true,
            ElementKind::Expression => match &self.elements[id].payload {
                ElementPayload::Expression { inner } => self.is_constant(*inner),
                _ => false,
            },
            _ => false,
        }
    }

    /// Display name for type elements, used by dumps and diagnostics.
    pub fn type_name(&self, id: ElementId) -> String {
        match &self.elements[id].payload {
            ElementPayload::NumericType { name, .. } => name.clone(),
            ElementPayload::BoolType => "bool".to_string(),
            ElementPayload::StringType => "string".to_string(),
            ElementPayload::ModuleType => "module".to_string(),
            ElementPayload::NamespaceType => "namespace".to_string(),
            ElementPayload::UnknownType { name } => name.clone(),
            ElementPayload::PointerType { base } => format!("^{}", self.type_name(*base)),
            ElementPayload::ArrayType { base } => format!("[]{}", self.type_name(*base)),
            ElementPayload::ProcedureType { .. } => "proc".to_string(),
            ElementPayload::CompositeType { composite, .. } => match composite {
                CompositeKind::Struct => "struct".to_string(),
                CompositeKind::Union => "union".to_string(),
                CompositeKind::Enum => "enum".to_string(),
            },
            _ => self.elements[id].kind().name().to_string(),
        }
    }
}

impl Default for ElementBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_monotonic() {
        let mut builder = ElementBuilder::new();
        let program = builder.make_program();
        let block = builder.make_block(Some(program), BlockKind::Block);
        let label = builder.make_label(block, "top");
        assert!(program < block && block < label);
    }

    #[test]
    fn test_program_owns_block() {
        let mut builder = ElementBuilder::new();
        let program = builder.make_program();
        let ElementPayload::Program { block } = builder.element(program).payload else {
            panic!("expected program payload");
        };
        assert_eq!(builder.element(block).parent, Some(program));
        assert_eq!(builder.kind(block), ElementKind::Block);
    }

    #[test]
    fn test_binary_operator_parents_children() {
        let mut builder = ElementBuilder::new();
        let program = builder.make_program();
        let block = builder.make_block(Some(program), BlockKind::Block);
        let lhs = builder.make_integer(block, 1, Span::DUMMY);
        let rhs = builder.make_integer(block, 2, Span::DUMMY);
        let op = builder.make_binary_operator(block, OperatorKind::Add, lhs, rhs);
        assert_eq!(builder.element(lhs).parent, Some(op));
        assert_eq!(builder.element(rhs).parent, Some(op));
    }

    #[test]
    fn test_is_constant() {
        let mut builder = ElementBuilder::new();
        let program = builder.make_program();
        let block = builder.make_block(Some(program), BlockKind::Block);
        let literal = builder.make_integer(block, 7, Span::DUMMY);
        assert!(builder.is_constant(literal));

        let symbol = builder.make_symbol(block, "x", Vec::new(), Span::DUMMY);
        let identifier = builder.make_identifier(block, symbol, None);
        let reference = builder.make_identifier_reference(
            block,
            QualifiedSymbol::new("x"),
            Some(identifier),
        );
        assert!(!builder.is_constant(reference));
    }

    #[test]
    fn test_qualified_symbol_format() {
        let mut symbol = QualifiedSymbol::new("x");
        assert!(!symbol.is_qualified());
        assert_eq!(symbol.fully_qualified(), "x");
        symbol.namespaces = vec!["foo".into(), "bar".into()];
        assert!(symbol.is_qualified());
        assert_eq!(symbol.fully_qualified(), "foo::bar::x");
    }

    #[test]
    fn test_intrinsic_names() {
        assert_eq!(IntrinsicKind::from_name("size_of"), Some(IntrinsicKind::SizeOf));
        assert_eq!(IntrinsicKind::from_name("alloc"), Some(IntrinsicKind::Alloc));
        assert_eq!(IntrinsicKind::from_name("println"), None);
        assert_eq!(
            IntrinsicKind::Fill.element_kind(),
            ElementKind::FillIntrinsic
        );
    }

    #[test]
    fn test_block_identifier_shadowing() {
        let mut block = Block::new(BlockKind::Block);
        block.add_identifier("x", ElementId(1));
        block.add_identifier("x", ElementId(5));
        assert_eq!(block.identifier("x"), Some(ElementId(5)));
        assert_eq!(block.identifiers.get("x").unwrap().len(), 2);
    }
}
