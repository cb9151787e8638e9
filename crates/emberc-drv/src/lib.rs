//! emberc-drv - Session and pipeline orchestration
//!
//! The session owns every collaborator: the source buffers, the diagnostic
//! handler, the AST arenas, the element graph with its scope manager and
//! intern table, the terp, and the assembler. `compile` drives the phases
//! in order (parse, evaluate, resolve, lower, emit) and any diagnostic
//! marks the session failed; later phases are skipped but accumulated
//! output still gets dumped.
//!
//! Code generation here is deliberately thin: a trivial lowering pass
//! turns top-level constant integer arithmetic assignments into terp code
//! so compiled programs actually execute. Everything else stays at the
//! element-graph level.

use std::io::Write;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::debug;

use emberc_par::{write_ast_graph, AstBuilder, AstNodeId, Parser};
use emberc_sem::{
    resolve_references, ElementBuilder, ElementId, ElementKind, ElementPayload, Evaluator,
    OperatorKind, ScopeManager, StringInternMap,
};
use emberc_util::{Handler, SourceBuffer};
use emberc_vm::{Assembler, OpSize, SegmentKind, Terp, TerpError};

pub use emberc_util::Diagnostic;

const DEFAULT_HEAP_SIZE: usize = 2 * 1024 * 1024;
const DEFAULT_STACK_SIZE: usize = 64 * 1024;

/// Scratch registers for expression lowering start here; named bindings
/// allocate upward from I0.
const SCRATCH_REGISTER_BASE: u8 = 32;

/// Session configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub verbose: bool,
    pub ast_graph_file: Option<PathBuf>,
    pub dom_graph_file: Option<PathBuf>,
    pub heap_size: usize,
    pub stack_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            verbose: false,
            ast_graph_file: None,
            dom_graph_file: None,
            heap_size: DEFAULT_HEAP_SIZE,
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

/// One compilation session; exclusively owns all shared state.
pub struct Session {
    config: Config,
    handler: Handler,
    sources: Vec<SourceBuffer>,
    asts: Vec<(AstBuilder, Option<AstNodeId>)>,
    elements: ElementBuilder,
    scopes: ScopeManager,
    interner: StringInternMap,
    terp: Terp,
    assembler: Assembler,
    program: ElementId,
    register_bindings: IndexMap<String, u8>,
    rendered: Vec<String>,
}

impl Session {
    pub fn new(config: Config) -> Result<Self, TerpError> {
        let terp = Terp::new(config.heap_size, config.stack_size)?;
        let assembler = Assembler::new(&terp);

        let mut elements = ElementBuilder::new();
        let program = elements.make_program();
        let ElementPayload::Program { block } = elements.element(program).payload else {
            unreachable!("make_program always yields a program payload");
        };
        Evaluator::seed_core_types(&mut elements, block);

        Ok(Self {
            config,
            handler: Handler::new(),
            sources: Vec::new(),
            asts: Vec::new(),
            elements,
            scopes: ScopeManager::new(),
            interner: StringInternMap::new(),
            terp,
            assembler,
            program,
            register_bindings: IndexMap::new(),
            rendered: Vec::new(),
        })
    }

    // ------------------------------------------------------------------
    // sources
    // ------------------------------------------------------------------

    pub fn add_source_file(&mut self, path: &Path) -> Result<(), emberc_util::source::SourceError> {
        let buffer = SourceBuffer::load(path)?;
        self.sources.push(buffer);
        Ok(())
    }

    pub fn add_source_from_string(&mut self, path: impl Into<PathBuf>, content: impl Into<String>) {
        self.sources.push(SourceBuffer::from_string(path, content));
    }

    // ------------------------------------------------------------------
    // accessors
    // ------------------------------------------------------------------

    pub fn is_failed(&self) -> bool {
        self.handler.is_failed()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.handler.diagnostics()
    }

    /// Diagnostics rendered with source snippets, in emission order.
    pub fn rendered_diagnostics(&self) -> &[String] {
        &self.rendered
    }

    pub fn terp(&self) -> &Terp {
        &self.terp
    }

    pub fn terp_mut(&mut self) -> &mut Terp {
        &mut self.terp
    }

    pub fn assembler(&self) -> &Assembler {
        &self.assembler
    }

    pub fn elements(&self) -> &ElementBuilder {
        &self.elements
    }

    pub fn interner(&self) -> &StringInternMap {
        &self.interner
    }

    /// Integer register the trivial lowering bound a top-level identifier
    /// to, if it did.
    pub fn register_for(&self, name: &str) -> Option<u8> {
        self.register_bindings.get(name).copied()
    }

    // ------------------------------------------------------------------
    // pipeline
    // ------------------------------------------------------------------

    /// Parse, evaluate, resolve, lower, and emit. Returns false once any
    /// fatal diagnostic has been recorded.
    pub fn compile(&mut self) -> bool {
        for index in 0..self.sources.len() {
            let before = self.handler.diagnostics().len();
            let path = self.sources[index].path().display().to_string();

            debug!(source = %path, "parse");
            let (ast, root) = {
                let source = &self.sources[index];
                let mut parser = Parser::new(source, &self.handler);
                let root = parser.parse();
                (parser.into_builder(), root)
            };

            if let Some(root) = root {
                debug!(source = %path, "evaluate");
                let mut evaluator = Evaluator::new(
                    &ast,
                    &self.handler,
                    &mut self.elements,
                    &mut self.scopes,
                    &mut self.interner,
                );
                evaluator.evaluate_module(self.program, root, &path);
            }

            self.asts.push((ast, root));
            self.render_new_diagnostics(index, before);
        }

        debug!("resolve");
        let before = self.handler.diagnostics().len();
        resolve_references(&self.handler, &mut self.elements, &mut self.scopes);
        if !self.sources.is_empty() {
            self.render_new_diagnostics(self.sources.len() - 1, before);
        }

        if self.handler.is_failed() {
            return false;
        }

        debug!("lower");
        if !self.lower_trivial_assignments() {
            return false;
        }

        debug!("emit");
        if !self.emit_interned_strings() {
            return false;
        }

        !self.handler.is_failed()
    }

    /// Step the terp until `exit`, a diagnostic, or the step budget.
    pub fn execute(&mut self) -> bool {
        debug!("execute");
        let mut steps = 0u64;
        while !self.terp.has_exited() {
            if !self.terp.step(&self.handler) {
                return false;
            }
            steps += 1;
            if steps > 10_000_000 {
                return false;
            }
        }
        true
    }

    fn render_new_diagnostics(&mut self, source_index: usize, from: usize) {
        let diagnostics = self.handler.diagnostics();
        for diagnostic in &diagnostics[from..] {
            self.rendered
                .push(diagnostic.render(&self.sources[source_index]));
        }
    }

    // ------------------------------------------------------------------
    // trivial lowering
    // ------------------------------------------------------------------

    fn program_block(&self) -> ElementId {
        match self.elements.element(self.program).payload {
            ElementPayload::Program { block } => block,
            _ => unreachable!("program payload"),
        }
    }

    /// Lower top-level constant-arithmetic assignment statements into terp
    /// code and encode it at the program start. Anything non-constant is
    /// skipped.
    fn lower_trivial_assignments(&mut self) -> bool {
        let program_block = self.program_block();
        let module_blocks = self.elements.block(program_block).blocks.clone();

        let mut bindings: IndexMap<ElementId, u8> = IndexMap::new();
        for module_block in module_blocks {
            for statement in self.elements.block(module_block).statements.clone() {
                let ElementPayload::Statement { expression, .. } =
                    self.elements.element(statement).payload
                else {
                    continue;
                };
                let ElementPayload::BinaryOperator {
                    operator: OperatorKind::Assignment,
                    lhs,
                    rhs,
                } = self.elements.element(expression).payload
                else {
                    continue;
                };
                if self.elements.kind(lhs) != ElementKind::Identifier {
                    continue;
                }
                if !self.is_lowerable(rhs, &bindings) {
                    continue;
                }

                let next = bindings.len() as u8;
                let register = *bindings.entry(lhs).or_insert(next);
                self.emit_expression(rhs, register, SCRATCH_REGISTER_BASE, &bindings);

                if let ElementPayload::Identifier { symbol, .. } =
                    self.elements.element(lhs).payload
                {
                    if let ElementPayload::Symbol { name, .. } =
                        &self.elements.element(symbol).payload
                    {
                        self.register_bindings.insert(name.clone(), register);
                    }
                }
            }
        }

        self.assembler.emitter_mut().exit();
        if !self
            .assembler
            .emitter()
            .encode(&self.handler, &mut self.terp)
        {
            return false;
        }

        // Code segment covers what was just written; the location counter
        // moves past it for the data emission that follows.
        let code_start = self.assembler.emitter().start_address();
        let code_size = self.assembler.emitter().size() as u64;
        self.assembler.define_segment(SegmentKind::Code, code_start);
        if let Some(segment) = self.assembler.segment_mut(SegmentKind::Code) {
            segment.size = code_size;
        }
        self.assembler.set_location_counter(code_start + code_size);
        self.assembler.align(4);
        self.assembler.define_segment(
            SegmentKind::Stack,
            (self.config.heap_size - self.config.stack_size) as u64,
        );
        if let Some(segment) = self.assembler.segment_mut(SegmentKind::Stack) {
            segment.size = self.config.stack_size as u64;
        }
        true
    }

    fn is_lowerable(&self, expression: ElementId, bindings: &IndexMap<ElementId, u8>) -> bool {
        match &self.elements.element(expression).payload {
            ElementPayload::IntegerLiteral { .. } => true,
            ElementPayload::Expression { inner } => self.is_lowerable(*inner, bindings),
            ElementPayload::IdentifierReference { identifier, .. } => {
                matches!(identifier, Some(id) if bindings.contains_key(id))
            }
            ElementPayload::BinaryOperator { operator, lhs, rhs } => {
                matches!(
                    operator,
                    OperatorKind::Add
                        | OperatorKind::Subtract
                        | OperatorKind::Multiply
                        | OperatorKind::Divide
                        | OperatorKind::Modulo
                ) && self.is_lowerable(*lhs, bindings)
                    && self.is_lowerable(*rhs, bindings)
            }
            _ => false,
        }
    }

    fn emit_expression(
        &mut self,
        expression: ElementId,
        target: u8,
        scratch: u8,
        bindings: &IndexMap<ElementId, u8>,
    ) {
        let payload = self.elements.element(expression).payload.clone();
        match payload {
            ElementPayload::IntegerLiteral { value } => {
                self.assembler
                    .emitter_mut()
                    .move_int_constant_to_register(OpSize::Qword, value, target);
            }
            ElementPayload::Expression { inner } => {
                self.emit_expression(inner, target, scratch, bindings);
            }
            ElementPayload::IdentifierReference { identifier, .. } => {
                if let Some(register) = identifier.and_then(|id| bindings.get(&id).copied()) {
                    self.assembler.emitter_mut().move_int_register_to_register(
                        OpSize::Qword,
                        register,
                        target,
                    );
                }
            }
            ElementPayload::BinaryOperator { operator, lhs, rhs } => {
                self.emit_expression(lhs, target, scratch + 1, bindings);
                self.emit_expression(rhs, scratch, scratch + 1, bindings);
                let emitter = self.assembler.emitter_mut();
                match operator {
                    OperatorKind::Add => {
                        emitter.add_int_register_to_register(OpSize::Qword, target, target, scratch)
                    }
                    OperatorKind::Subtract => emitter.subtract_int_register_to_register(
                        OpSize::Qword,
                        target,
                        target,
                        scratch,
                    ),
                    OperatorKind::Multiply => emitter.multiply_int_register_to_register(
                        OpSize::Qword,
                        target,
                        target,
                        scratch,
                    ),
                    OperatorKind::Divide => emitter.divide_int_register_to_register(
                        OpSize::Qword,
                        target,
                        target,
                        scratch,
                    ),
                    OperatorKind::Modulo => emitter.modulo_int_register_to_register(
                        OpSize::Qword,
                        target,
                        target,
                        scratch,
                    ),
                    _ => {}
                }
            }
            _ => {}
        }
    }

    // ------------------------------------------------------------------
    // interned string emission
    // ------------------------------------------------------------------

    /// Write all interned strings, in insertion order, to the read-only
    /// data section: `<base-label>: <length-qword><bytes...>` aligned to
    /// 4, with `<data-label>` pointing at the bytes.
    fn emit_interned_strings(&mut self) -> bool {
        if self.interner.is_empty() {
            return true;
        }

        self.assembler.align(4);
        let section_start = self.assembler.location_counter();
        self.assembler
            .define_segment(SegmentKind::Constant, section_start);

        let entries: Vec<(String, u32)> = self
            .interner
            .iter()
            .map(|(value, id)| (value.to_string(), id))
            .collect();
        for (value, id) in entries {
            self.assembler.align(4);
            let base = self.assembler.location_counter();
            let base_label = self.interner.base_label_for_id(id);
            self.assembler
                .define_label(&base_label, SegmentKind::Constant, base);
            self.assembler.define_data_u64(&mut self.terp, value.len() as u64);
            let data = self.assembler.location_counter();
            let data_label = self.interner.data_label_for_id(id);
            self.assembler
                .define_label(&data_label, SegmentKind::Constant, data);
            self.assembler.define_string(&mut self.terp, &value);
        }

        let section_end = self.assembler.location_counter();
        if let Some(segment) = self.assembler.segment_mut(SegmentKind::Constant) {
            segment.size = section_end - section_start;
        }
        true
    }

    // ------------------------------------------------------------------
    // dumps
    // ------------------------------------------------------------------

    /// Write the Graphviz AST graph(s) for every parsed module.
    pub fn write_ast_graph_file(&self, path: &Path) -> std::io::Result<()> {
        let mut file = std::fs::File::create(path)?;
        for (index, (ast, root)) in self.asts.iter().enumerate() {
            if let Some(root) = root {
                let title = format!(
                    "AST Graph: {}",
                    self.sources
                        .get(index)
                        .map(|source| source.path().display().to_string())
                        .unwrap_or_default()
                );
                write_ast_graph(ast, *root, &title, &mut file)?;
            }
        }
        Ok(())
    }

    /// Write the element-graph dump: one vertex per element, one edge per
    /// parent link.
    pub fn write_dom_graph_file(&self, path: &Path) -> std::io::Result<()> {
        let mut file = std::fs::File::create(path)?;
        writeln!(file, "digraph {{")?;
        writeln!(file, "    labelloc=\"t\";")?;
        writeln!(file, "    label=\"Element Graph\";")?;
        for element in self.elements.iter() {
            writeln!(
                file,
                "    {}{} [ label=\"{} ({}:{})\" ];",
                element.kind().name(),
                element.id,
                element.kind().name(),
                element.span.line,
                element.span.column
            )?;
        }
        for element in self.elements.iter() {
            if let Some(parent) = element.parent {
                writeln!(
                    file,
                    "    {}{} -> {}{};",
                    self.elements.element(parent).kind().name(),
                    self.elements.element(parent).id,
                    element.kind().name(),
                    element.id
                )?;
            }
        }
        writeln!(file, "}}")?;
        Ok(())
    }

    /// Dump-state text for `--verbose` output after execution.
    pub fn state_dump(&self) -> String {
        self.terp.dump_state(8)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
