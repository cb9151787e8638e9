//! Segment, symbol, and label management over the emitter.
//!
//! The location counter initializes from the terp's program-start heap
//! vector. `define_data` variants append little-endian values at the
//! counter; labels resolve in two phases (reserve pending uses, patch once
//! the address is known).

use indexmap::IndexMap;
use rustc_hash::FxHashMap;

use emberc_util::{Handler, Span};

use crate::emitter::InstructionEmitter;
use crate::terp::{HeapVector, Terp};

/// Segment tags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SegmentKind {
    Code,
    Data,
    Stack,
    Constant,
}

impl SegmentKind {
    pub fn name(&self) -> &'static str {
        match self {
            SegmentKind::Code => "code",
            SegmentKind::Data => "data",
            SegmentKind::Stack => "stack",
            SegmentKind::Constant => "constant",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Segment {
    pub address: u64,
    pub size: u64,
    pub kind: SegmentKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AsmSymbol {
    pub name: String,
    pub address: u64,
    pub segment: SegmentKind,
}

/// Pending use of a not-yet-defined label.
#[derive(Clone, Copy, Debug)]
struct LabelUse {
    instruction_index: usize,
    operand_index: usize,
}

pub struct Assembler {
    emitter: InstructionEmitter,
    location_counter: u64,
    symbols: IndexMap<String, AsmSymbol>,
    segments: IndexMap<SegmentKind, Segment>,
    pending_labels: FxHashMap<String, Vec<LabelUse>>,
}

impl Assembler {
    /// The location counter starts at the terp's program-start vector.
    pub fn new(terp: &Terp) -> Self {
        let start = terp.heap_vector(HeapVector::ProgramStart);
        Self {
            emitter: InstructionEmitter::new(start),
            location_counter: start,
            symbols: IndexMap::new(),
            segments: IndexMap::new(),
            pending_labels: FxHashMap::default(),
        }
    }

    pub fn emitter(&self) -> &InstructionEmitter {
        &self.emitter
    }

    pub fn emitter_mut(&mut self) -> &mut InstructionEmitter {
        &mut self.emitter
    }

    pub fn location_counter(&self) -> u64 {
        self.location_counter
    }

    pub fn set_location_counter(&mut self, value: u64) {
        self.location_counter = value;
    }

    /// Round the location counter up to `alignment`.
    pub fn align(&mut self, alignment: u64) {
        let offset = self.location_counter % alignment;
        if offset != 0 {
            self.location_counter += alignment - offset;
        }
    }

    // ------------------------------------------------------------------
    // segments and symbols
    // ------------------------------------------------------------------

    pub fn define_segment(&mut self, kind: SegmentKind, address: u64) {
        self.segments.insert(
            kind,
            Segment {
                address,
                size: 0,
                kind,
            },
        );
    }

    pub fn segment(&self, kind: SegmentKind) -> Option<&Segment> {
        self.segments.get(&kind)
    }

    pub fn segment_mut(&mut self, kind: SegmentKind) -> Option<&mut Segment> {
        self.segments.get_mut(&kind)
    }

    pub fn define_symbol(&mut self, name: &str, segment: SegmentKind, address: u64) {
        self.symbols.insert(
            name.to_string(),
            AsmSymbol {
                name: name.to_string(),
                address,
                segment,
            },
        );
    }

    pub fn symbol(&self, name: &str) -> Option<&AsmSymbol> {
        self.symbols.get(name)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &AsmSymbol> {
        self.symbols.values()
    }

    // ------------------------------------------------------------------
    // data definition
    // ------------------------------------------------------------------

    pub fn define_data_u8(&mut self, terp: &mut Terp, value: u8) {
        let counter = self.location_counter as usize;
        terp.heap_mut()[counter] = value;
        self.location_counter += 1;
    }

    pub fn define_data_u16(&mut self, terp: &mut Terp, value: u16) {
        self.write_bytes(terp, &value.to_le_bytes());
    }

    pub fn define_data_u32(&mut self, terp: &mut Terp, value: u32) {
        self.write_bytes(terp, &value.to_le_bytes());
    }

    pub fn define_data_u64(&mut self, terp: &mut Terp, value: u64) {
        self.write_bytes(terp, &value.to_le_bytes());
    }

    pub fn define_data_f32(&mut self, terp: &mut Terp, value: f32) {
        self.write_bytes(terp, &value.to_le_bytes());
    }

    pub fn define_data_f64(&mut self, terp: &mut Terp, value: f64) {
        self.write_bytes(terp, &value.to_le_bytes());
    }

    /// Raw bytes, no terminator.
    pub fn define_string(&mut self, terp: &mut Terp, value: &str) {
        self.write_bytes(terp, value.as_bytes());
    }

    fn write_bytes(&mut self, terp: &mut Terp, bytes: &[u8]) {
        let counter = self.location_counter as usize;
        terp.heap_mut()[counter..counter + bytes.len()].copy_from_slice(bytes);
        self.location_counter += bytes.len() as u64;
    }

    // ------------------------------------------------------------------
    // two-phase label resolution
    // ------------------------------------------------------------------

    /// Record that `instruction_index`/`operand_index` wants the address of
    /// `name`. Already-defined labels patch immediately.
    pub fn use_label(&mut self, name: &str, instruction_index: usize, operand_index: usize) {
        if let Some(symbol) = self.symbols.get(name) {
            let address = symbol.address;
            self.emitter
                .instruction_mut(instruction_index)
                .patch_branch_address(address, operand_index);
            return;
        }
        self.pending_labels
            .entry(name.to_string())
            .or_default()
            .push(LabelUse {
                instruction_index,
                operand_index,
            });
    }

    /// Define a label at `address`, patching every pending use.
    pub fn define_label(&mut self, name: &str, segment: SegmentKind, address: u64) {
        self.define_symbol(name, segment, address);
        if let Some(uses) = self.pending_labels.remove(name) {
            for pending in uses {
                self.emitter
                    .instruction_mut(pending.instruction_index)
                    .patch_branch_address(address, pending.operand_index);
            }
        }
    }

    /// Labels still pending after assembly are errors.
    pub fn finalize(&self, handler: &Handler) -> bool {
        for name in self.pending_labels.keys() {
            handler.error(
                "B006",
                format!("label '{name}' was referenced but never defined."),
                Span::DUMMY,
            );
        }
        self.pending_labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{OpSize, OperandValue};

    fn terp() -> Terp {
        Terp::new(4096, 1024).unwrap()
    }

    #[test]
    fn test_location_counter_starts_at_program_start() {
        let terp = terp();
        let assembler = Assembler::new(&terp);
        assert_eq!(assembler.location_counter(), Terp::PROGRAM_START as u64);
    }

    #[test]
    fn test_define_data_is_little_endian() {
        let mut terp = terp();
        let mut assembler = Assembler::new(&terp);
        let base = assembler.location_counter() as usize;
        assembler.define_data_u32(&mut terp, 0x1122_3344);
        assert_eq!(&terp.heap()[base..base + 4], &[0x44, 0x33, 0x22, 0x11]);
        assert_eq!(assembler.location_counter() as usize, base + 4);
    }

    #[test]
    fn test_define_string_raw_bytes() {
        let mut terp = terp();
        let mut assembler = Assembler::new(&terp);
        let base = assembler.location_counter() as usize;
        assembler.define_string(&mut terp, "ok");
        assert_eq!(&terp.heap()[base..base + 2], b"ok");
    }

    #[test]
    fn test_align() {
        let terp = terp();
        let mut assembler = Assembler::new(&terp);
        assembler.set_location_counter(193);
        assembler.align(4);
        assert_eq!(assembler.location_counter(), 196);
        assembler.align(4);
        assert_eq!(assembler.location_counter(), 196);
    }

    #[test]
    fn test_segments_and_symbols() {
        let terp = terp();
        let mut assembler = Assembler::new(&terp);
        assembler.define_segment(SegmentKind::Code, 192);
        assembler.define_segment(SegmentKind::Data, 1024);
        assembler.define_symbol("main", SegmentKind::Code, 192);

        assert_eq!(assembler.segment(SegmentKind::Code).unwrap().address, 192);
        let symbol = assembler.symbol("main").unwrap();
        assert_eq!(symbol.segment, SegmentKind::Code);
        assert_eq!(symbol.address, 192);
        assert_eq!(SegmentKind::Constant.name(), "constant");
    }

    #[test]
    fn test_label_patching_forward_reference() {
        let mut terp = terp();
        let mut assembler = Assembler::new(&terp);

        // jmp L; ...; L: exit
        assembler.emitter_mut().jump_direct(0);
        let jmp_index = assembler.emitter().index();
        assembler.use_label("L", jmp_index, 0);

        assembler.emitter_mut().nop();
        let target = assembler.emitter().address_of(assembler.emitter().index())
            + assembler
                .emitter()
                .instruction(assembler.emitter().index())
                .encoding_size() as u64;
        assembler.emitter_mut().exit();
        assembler.define_label("L", SegmentKind::Code, target);

        let patched = assembler.emitter().instruction(jmp_index).operands[0].value;
        assert_eq!(patched, OperandValue::Integer(target));

        let handler = Handler::new();
        assert!(assembler.finalize(&handler));
        assert!(assembler.emitter().encode(&handler, &mut terp));
    }

    #[test]
    fn test_backward_label_patches_immediately() {
        let terp = terp();
        let mut assembler = Assembler::new(&terp);
        assembler.define_label("top", SegmentKind::Code, 192);
        assembler.emitter_mut().jump_direct(0);
        let index = assembler.emitter().index();
        assembler.use_label("top", index, 0);
        assert_eq!(
            assembler.emitter().instruction(index).operands[0].value,
            OperandValue::Integer(192)
        );
    }

    #[test]
    fn test_undefined_label_reported() {
        let terp = terp();
        let mut assembler = Assembler::new(&terp);
        assembler.emitter_mut().jump_direct(0);
        assembler.use_label("nowhere", 0, 0);
        let handler = Handler::new();
        assert!(!assembler.finalize(&handler));
        assert!(handler.is_failed());
    }

    #[test]
    fn test_interned_string_entry_layout() {
        // <base-label>: <length-qword><bytes...> with the data label at the
        // bytes, aligned to 4.
        let mut terp = terp();
        let mut assembler = Assembler::new(&terp);
        assembler.set_location_counter(1024);
        assembler.align(4);

        let base = assembler.location_counter();
        assembler.define_label("_intern_str_lit_1", SegmentKind::Constant, base);
        assembler.define_data_u64(&mut terp, 5);
        let data = assembler.location_counter();
        assembler.define_label("_intern_str_lit_1_data", SegmentKind::Constant, data);
        assembler.define_string(&mut terp, "hello");

        assert_eq!(data, base + 8);
        assert_eq!(&terp.heap()[data as usize..data as usize + 5], b"hello");
        let mut length_bytes = [0u8; 8];
        length_bytes.copy_from_slice(&terp.heap()[base as usize..base as usize + 8]);
        assert_eq!(u64::from_le_bytes(length_bytes), 5);
    }

    #[test]
    fn test_emitter_size_helpers() {
        let terp = terp();
        let mut assembler = Assembler::new(&terp);
        assembler.emitter_mut().nop();
        assembler
            .emitter_mut()
            .push_int_constant(OpSize::Qword, 81);
        assert_eq!(assembler.emitter().len(), 2);
        assert_eq!(assembler.emitter().size(), 16);
    }
}
