//! High-level instruction construction.
//!
//! The emitter buffers an ordered instruction list plus parallel `meta`
//! records (line, column, source file, symbol) keyed to instruction
//! indices, then lays the encodings out contiguously starting at its
//! start address.

use emberc_util::Handler;

use crate::instruction::{Instruction, OpCode, OpSize, Operand};
use crate::terp::Terp;

/// Debug record attached to a `meta` instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetaInfo {
    pub line: u32,
    pub column: u16,
    pub source_file: String,
    pub symbol: String,
}

/// Buffers instructions ahead of encoding.
pub struct InstructionEmitter {
    start_address: u64,
    instructions: Vec<Instruction>,
    meta_records: Vec<(usize, MetaInfo)>,
}

impl InstructionEmitter {
    pub fn new(start_address: u64) -> Self {
        Self {
            start_address,
            instructions: Vec::new(),
            meta_records: Vec::new(),
        }
    }

    pub fn start_address(&self) -> u64 {
        self.start_address
    }

    /// Total encoded size of everything buffered so far.
    pub fn size(&self) -> usize {
        self.instructions
            .iter()
            .map(Instruction::encoding_size)
            .sum()
    }

    pub fn end_address(&self) -> u64 {
        self.start_address + self.size() as u64
    }

    /// Index of the most recently pushed instruction.
    pub fn index(&self) -> usize {
        self.instructions.len() - 1
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn clear(&mut self) {
        self.instructions.clear();
        self.meta_records.clear();
    }

    pub fn instruction(&self, index: usize) -> &Instruction {
        &self.instructions[index]
    }

    pub fn instruction_mut(&mut self, index: usize) -> &mut Instruction {
        &mut self.instructions[index]
    }

    /// Heap address at which instruction `index` will be encoded.
    pub fn address_of(&self, index: usize) -> u64 {
        let offset: usize = self.instructions[..index]
            .iter()
            .map(Instruction::encoding_size)
            .sum();
        self.start_address + offset as u64
    }

    pub fn meta_records(&self) -> &[(usize, MetaInfo)] {
        &self.meta_records
    }

    /// Encode every buffered instruction into the terp's heap.
    pub fn encode(&self, handler: &Handler, terp: &mut Terp) -> bool {
        let mut address = self.start_address;
        for instruction in &self.instructions {
            let size = instruction.encode(handler, terp.heap_mut(), address);
            if size == 0 {
                return false;
            }
            address += size as u64;
        }
        true
    }

    fn push(&mut self, op: OpCode, size: OpSize, operands: Vec<Operand>) -> usize {
        self.instructions.push(Instruction::new(op, size, operands));
        self.instructions.len() - 1
    }

    // ------------------------------------------------------------------
    // one constructor per opcode family
    // ------------------------------------------------------------------

    pub fn nop(&mut self) {
        self.push(OpCode::Nop, OpSize::None, Vec::new());
    }

    pub fn rts(&mut self) {
        self.push(OpCode::Rts, OpSize::None, Vec::new());
    }

    pub fn dup(&mut self) {
        self.push(OpCode::Dup, OpSize::None, Vec::new());
    }

    pub fn exit(&mut self) {
        self.push(OpCode::Exit, OpSize::None, Vec::new());
    }

    /// Interleave a debug record; `meta` is ignored at execution.
    pub fn meta(&mut self, line: u32, column: u16, source_file: &str, symbol: &str) {
        let payload = 6 + source_file.len() as u64 + symbol.len() as u64;
        let index = self.push(
            OpCode::Meta,
            OpSize::Word,
            vec![Operand::integer_constant(payload)],
        );
        self.meta_records.push((
            index,
            MetaInfo {
                line,
                column,
                source_file: source_file.to_string(),
                symbol: symbol.to_string(),
            },
        ));
    }

    pub fn swi(&mut self, index: u8) {
        self.push(
            OpCode::Swi,
            OpSize::Byte,
            vec![Operand::integer_constant(index as u64)],
        );
    }

    pub fn trap(&mut self, index: u8) {
        self.push(
            OpCode::Trap,
            OpSize::Byte,
            vec![Operand::integer_constant(index as u64)],
        );
    }

    pub fn load_with_offset_to_register(
        &mut self,
        size: OpSize,
        target: u8,
        address: u8,
        offset: u64,
    ) {
        self.push(
            OpCode::Load,
            size,
            vec![
                Operand::int_register(target),
                Operand::int_register(address),
                Operand::integer_constant(offset),
            ],
        );
    }

    pub fn load_stack_offset_to_register(&mut self, size: OpSize, target: u8, offset: u64) {
        self.load_with_offset_to_register(size, target, crate::terp::REGISTER_SP, offset);
    }

    pub fn store_with_offset_from_register(
        &mut self,
        size: OpSize,
        source: u8,
        address: u8,
        offset: u64,
    ) {
        self.push(
            OpCode::Store,
            size,
            vec![
                Operand::int_register(source),
                Operand::int_register(address),
                Operand::integer_constant(offset),
            ],
        );
    }

    pub fn store_register_to_stack_offset(&mut self, size: OpSize, source: u8, offset: u64) {
        self.store_with_offset_from_register(size, source, crate::terp::REGISTER_SP, offset);
    }

    pub fn copy_memory(&mut self, size: OpSize, source: u8, target: u8, length: u64) {
        self.push(
            OpCode::Copy,
            size,
            vec![
                Operand::int_register(source),
                Operand::int_register(target),
                Operand::integer_constant(length),
            ],
        );
    }

    pub fn fill_memory(&mut self, size: OpSize, value: u8, address: u8, length: u64) {
        self.push(
            OpCode::Fill,
            size,
            vec![
                Operand::int_register(value),
                Operand::int_register(address),
                Operand::integer_constant(length),
            ],
        );
    }

    pub fn move_int_constant_to_register(&mut self, size: OpSize, value: u64, target: u8) {
        self.push(
            OpCode::Move,
            size,
            vec![
                Operand::integer_constant(value),
                Operand::int_register(target),
            ],
        );
    }

    pub fn move_int_register_to_register(&mut self, size: OpSize, source: u8, target: u8) {
        self.push(
            OpCode::Move,
            size,
            vec![
                Operand::int_register(source),
                Operand::int_register(target),
            ],
        );
    }

    pub fn push_int_constant(&mut self, size: OpSize, value: u64) {
        self.push(
            OpCode::Push,
            size,
            vec![Operand::integer_constant(value)],
        );
    }

    pub fn push_float_constant(&mut self, value: f64) {
        self.push(
            OpCode::Push,
            OpSize::Qword,
            vec![Operand::float_constant(value)],
        );
    }

    pub fn push_int_register(&mut self, size: OpSize, register: u8) {
        self.push(OpCode::Push, size, vec![Operand::int_register(register)]);
    }

    pub fn pop_int_register(&mut self, size: OpSize, register: u8) {
        self.push(OpCode::Pop, size, vec![Operand::int_register(register)]);
    }

    pub fn pop_float_register(&mut self, register: u8) {
        self.push(
            OpCode::Pop,
            OpSize::Qword,
            vec![Operand::float_register(register)],
        );
    }

    pub fn inc(&mut self, size: OpSize, register: u8) {
        self.push(OpCode::Inc, size, vec![Operand::int_register(register)]);
    }

    pub fn dec(&mut self, size: OpSize, register: u8) {
        self.push(OpCode::Dec, size, vec![Operand::int_register(register)]);
    }

    fn three_register_op(&mut self, op: OpCode, size: OpSize, target: u8, lhs: u8, rhs: u8) {
        self.push(
            op,
            size,
            vec![
                Operand::int_register(target),
                Operand::int_register(lhs),
                Operand::int_register(rhs),
            ],
        );
    }

    pub fn add_int_register_to_register(&mut self, size: OpSize, target: u8, lhs: u8, rhs: u8) {
        self.three_register_op(OpCode::Add, size, target, lhs, rhs);
    }

    pub fn subtract_int_register_to_register(
        &mut self,
        size: OpSize,
        target: u8,
        lhs: u8,
        rhs: u8,
    ) {
        self.three_register_op(OpCode::Sub, size, target, lhs, rhs);
    }

    pub fn subtract_int_constant_from_register(
        &mut self,
        size: OpSize,
        target: u8,
        lhs: u8,
        rhs: u64,
    ) {
        self.push(
            OpCode::Sub,
            size,
            vec![
                Operand::int_register(target),
                Operand::int_register(lhs),
                Operand::integer_constant(rhs),
            ],
        );
    }

    pub fn multiply_int_register_to_register(
        &mut self,
        size: OpSize,
        target: u8,
        lhs: u8,
        rhs: u8,
    ) {
        self.three_register_op(OpCode::Mul, size, target, lhs, rhs);
    }

    pub fn divide_int_register_to_register(&mut self, size: OpSize, target: u8, lhs: u8, rhs: u8) {
        self.three_register_op(OpCode::Div, size, target, lhs, rhs);
    }

    pub fn modulo_int_register_to_register(&mut self, size: OpSize, target: u8, lhs: u8, rhs: u8) {
        self.three_register_op(OpCode::Mod, size, target, lhs, rhs);
    }

    pub fn negate_int_register(&mut self, size: OpSize, target: u8, source: u8) {
        self.push(
            OpCode::Neg,
            size,
            vec![
                Operand::int_register(target),
                Operand::int_register(source),
            ],
        );
    }

    pub fn shift_right(&mut self, size: OpSize, target: u8, lhs: u8, rhs: u8) {
        self.three_register_op(OpCode::Shr, size, target, lhs, rhs);
    }

    pub fn shift_left(&mut self, size: OpSize, target: u8, lhs: u8, rhs: u8) {
        self.three_register_op(OpCode::Shl, size, target, lhs, rhs);
    }

    pub fn rotate_right(&mut self, size: OpSize, target: u8, lhs: u8, rhs: u8) {
        self.three_register_op(OpCode::Ror, size, target, lhs, rhs);
    }

    pub fn rotate_left(&mut self, size: OpSize, target: u8, lhs: u8, rhs: u8) {
        self.three_register_op(OpCode::Rol, size, target, lhs, rhs);
    }

    pub fn and_int_registers(&mut self, size: OpSize, target: u8, lhs: u8, rhs: u8) {
        self.three_register_op(OpCode::And, size, target, lhs, rhs);
    }

    pub fn or_int_registers(&mut self, size: OpSize, target: u8, lhs: u8, rhs: u8) {
        self.three_register_op(OpCode::Or, size, target, lhs, rhs);
    }

    pub fn xor_int_registers(&mut self, size: OpSize, target: u8, lhs: u8, rhs: u8) {
        self.three_register_op(OpCode::Xor, size, target, lhs, rhs);
    }

    pub fn not_int_register(&mut self, size: OpSize, target: u8, source: u8) {
        self.push(
            OpCode::Not,
            size,
            vec![
                Operand::int_register(target),
                Operand::int_register(source),
            ],
        );
    }

    pub fn bit_set(&mut self, size: OpSize, target: u8, source: u8, bit: u64) {
        self.push(
            OpCode::Bis,
            size,
            vec![
                Operand::int_register(target),
                Operand::int_register(source),
                Operand::integer_constant(bit),
            ],
        );
    }

    pub fn bit_clear(&mut self, size: OpSize, target: u8, source: u8, bit: u64) {
        self.push(
            OpCode::Bic,
            size,
            vec![
                Operand::int_register(target),
                Operand::int_register(source),
                Operand::integer_constant(bit),
            ],
        );
    }

    pub fn test_mask(&mut self, size: OpSize, value: u8, mask: u64) {
        self.push(
            OpCode::Test,
            size,
            vec![
                Operand::int_register(value),
                Operand::integer_constant(mask),
            ],
        );
    }

    pub fn compare_int_register_to_register(&mut self, size: OpSize, lhs: u8, rhs: u8) {
        self.push(
            OpCode::Cmp,
            size,
            vec![Operand::int_register(lhs), Operand::int_register(rhs)],
        );
    }

    pub fn compare_int_register_to_constant(&mut self, size: OpSize, lhs: u8, rhs: u64) {
        self.push(
            OpCode::Cmp,
            size,
            vec![Operand::int_register(lhs), Operand::integer_constant(rhs)],
        );
    }

    pub fn branch_if_zero(&mut self, size: OpSize, value: u8, address: u64) {
        self.push(
            OpCode::Bz,
            size,
            vec![
                Operand::int_register(value),
                Operand::integer_constant(address),
            ],
        );
    }

    pub fn branch_if_not_zero(&mut self, size: OpSize, value: u8, address: u64) {
        self.push(
            OpCode::Bnz,
            size,
            vec![
                Operand::int_register(value),
                Operand::integer_constant(address),
            ],
        );
    }

    pub fn branch_if_bits_zero(&mut self, size: OpSize, value: u8, mask: u64, address: u64) {
        self.push(
            OpCode::Tbz,
            size,
            vec![
                Operand::int_register(value),
                Operand::integer_constant(mask),
                Operand::integer_constant(address),
            ],
        );
    }

    pub fn branch_if_bits_not_zero(&mut self, size: OpSize, value: u8, mask: u64, address: u64) {
        self.push(
            OpCode::Tbnz,
            size,
            vec![
                Operand::int_register(value),
                Operand::integer_constant(mask),
                Operand::integer_constant(address),
            ],
        );
    }

    fn flag_branch(&mut self, op: OpCode, address: u64) {
        self.push(
            op,
            OpSize::Qword,
            vec![Operand::integer_constant(address)],
        );
    }

    pub fn branch_if_equal(&mut self, address: u64) {
        self.flag_branch(OpCode::Beq, address);
    }

    pub fn branch_if_not_equal(&mut self, address: u64) {
        self.flag_branch(OpCode::Bne, address);
    }

    pub fn branch_if_greater(&mut self, address: u64) {
        self.flag_branch(OpCode::Bg, address);
    }

    pub fn branch_if_greater_or_equal(&mut self, address: u64) {
        self.flag_branch(OpCode::Bge, address);
    }

    pub fn branch_if_lesser(&mut self, address: u64) {
        self.flag_branch(OpCode::Bl, address);
    }

    pub fn branch_if_lesser_or_equal(&mut self, address: u64) {
        self.flag_branch(OpCode::Ble, address);
    }

    pub fn jump_subroutine_direct(&mut self, address: u64) {
        self.push(
            OpCode::Jsr,
            OpSize::Qword,
            vec![Operand::integer_constant(address)],
        );
    }

    pub fn jump_subroutine_indirect(&mut self, register: u8) {
        self.push(
            OpCode::Jsr,
            OpSize::Qword,
            vec![Operand::int_register(register)],
        );
    }

    /// `jsr` with a PC-relative offset; the offset operand also accounts
    /// for the instruction's own size at execution time.
    pub fn jump_subroutine_pc_relative(&mut self, size: OpSize, negative: bool, offset: u64) {
        let mut offset_operand = Operand::integer_constant(offset);
        if negative {
            offset_operand = offset_operand.negative();
        }
        self.push(
            OpCode::Jsr,
            size,
            vec![
                Operand::int_register(crate::terp::REGISTER_PC),
                offset_operand,
            ],
        );
    }

    pub fn jump_direct(&mut self, address: u64) {
        self.push(
            OpCode::Jmp,
            OpSize::Qword,
            vec![Operand::integer_constant(address)],
        );
    }
}
