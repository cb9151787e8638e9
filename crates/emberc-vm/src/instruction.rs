//! Instruction model and bit-exact heap encoding.
//!
//! Layout at `address` (which must be 4-byte aligned):
//!
//! | offset | content |
//! |--------|---------|
//! | 0 | total encoding size in bytes, padding included |
//! | 1 | opcode |
//! | 2 | upper nybble: size tag, lower nybble: operand count |
//! | 3.. | per operand: one flag byte, then a register index byte or a constant of `size` bytes |
//!
//! Constants serialize little-endian: integers at the operand size's
//! width, floats as IEEE-754 single (dword) or double (qword). Integer
//! constants reject the `none` size; float constants reject `none`,
//! `byte`, and `word`. The whole encoding pads to the next 4-byte
//! boundary.

use emberc_util::{Handler, Span};

/// VM opcodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    Nop = 1,
    Load,
    Store,
    Copy,
    Fill,
    Move,
    Push,
    Pop,
    Dup,
    Inc,
    Dec,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,
    Shr,
    Shl,
    Ror,
    Rol,
    And,
    Or,
    Xor,
    Not,
    Bis,
    Bic,
    Test,
    Cmp,
    Bz,
    Bnz,
    Tbz,
    Tbnz,
    Bne,
    Beq,
    Bg,
    Bl,
    Bge,
    Ble,
    Jsr,
    Rts,
    Jmp,
    Swi,
    Trap,
    Meta,
    Exit,
}

impl OpCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            1 => OpCode::Nop,
            2 => OpCode::Load,
            3 => OpCode::Store,
            4 => OpCode::Copy,
            5 => OpCode::Fill,
            6 => OpCode::Move,
            7 => OpCode::Push,
            8 => OpCode::Pop,
            9 => OpCode::Dup,
            10 => OpCode::Inc,
            11 => OpCode::Dec,
            12 => OpCode::Add,
            13 => OpCode::Sub,
            14 => OpCode::Mul,
            15 => OpCode::Div,
            16 => OpCode::Mod,
            17 => OpCode::Neg,
            18 => OpCode::Shr,
            19 => OpCode::Shl,
            20 => OpCode::Ror,
            21 => OpCode::Rol,
            22 => OpCode::And,
            23 => OpCode::Or,
            24 => OpCode::Xor,
            25 => OpCode::Not,
            26 => OpCode::Bis,
            27 => OpCode::Bic,
            28 => OpCode::Test,
            29 => OpCode::Cmp,
            30 => OpCode::Bz,
            31 => OpCode::Bnz,
            32 => OpCode::Tbz,
            33 => OpCode::Tbnz,
            34 => OpCode::Bne,
            35 => OpCode::Beq,
            36 => OpCode::Bg,
            37 => OpCode::Bl,
            38 => OpCode::Bge,
            39 => OpCode::Ble,
            40 => OpCode::Jsr,
            41 => OpCode::Rts,
            42 => OpCode::Jmp,
            43 => OpCode::Swi,
            44 => OpCode::Trap,
            45 => OpCode::Meta,
            46 => OpCode::Exit,
            _ => return None,
        })
    }

    pub fn mnemonic(&self) -> &'static str {
        match self {
            OpCode::Nop => "NOP",
            OpCode::Load => "LOAD",
            OpCode::Store => "STORE",
            OpCode::Copy => "COPY",
            OpCode::Fill => "FILL",
            OpCode::Move => "MOVE",
            OpCode::Push => "PUSH",
            OpCode::Pop => "POP",
            OpCode::Dup => "DUP",
            OpCode::Inc => "INC",
            OpCode::Dec => "DEC",
            OpCode::Add => "ADD",
            OpCode::Sub => "SUB",
            OpCode::Mul => "MUL",
            OpCode::Div => "DIV",
            OpCode::Mod => "MOD",
            OpCode::Neg => "NEG",
            OpCode::Shr => "SHR",
            OpCode::Shl => "SHL",
            OpCode::Ror => "ROR",
            OpCode::Rol => "ROL",
            OpCode::And => "AND",
            OpCode::Or => "OR",
            OpCode::Xor => "XOR",
            OpCode::Not => "NOT",
            OpCode::Bis => "BIS",
            OpCode::Bic => "BIC",
            OpCode::Test => "TEST",
            OpCode::Cmp => "CMP",
            OpCode::Bz => "BZ",
            OpCode::Bnz => "BNZ",
            OpCode::Tbz => "TBZ",
            OpCode::Tbnz => "TBNZ",
            OpCode::Bne => "BNE",
            OpCode::Beq => "BEQ",
            OpCode::Bg => "BG",
            OpCode::Bl => "BL",
            OpCode::Bge => "BGE",
            OpCode::Ble => "BLE",
            OpCode::Jsr => "JSR",
            OpCode::Rts => "RTS",
            OpCode::Jmp => "JMP",
            OpCode::Swi => "SWI",
            OpCode::Trap => "TRAP",
            OpCode::Meta => "META",
            OpCode::Exit => "EXIT",
        }
    }
}

/// Operand size tag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum OpSize {
    #[default]
    None = 0,
    Byte,
    Word,
    Dword,
    Qword,
}

impl OpSize {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => OpSize::None,
            1 => OpSize::Byte,
            2 => OpSize::Word,
            3 => OpSize::Dword,
            4 => OpSize::Qword,
            _ => return None,
        })
    }

    /// Width of a value of this size, in bytes.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            OpSize::None => 0,
            OpSize::Byte => 1,
            OpSize::Word => 2,
            OpSize::Dword => 4,
            OpSize::Qword => 8,
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            OpSize::None => "",
            OpSize::Byte => ".B",
            OpSize::Word => ".W",
            OpSize::Dword => ".DW",
            OpSize::Qword => ".QW",
        }
    }
}

/// Operand value: a register index or a constant.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OperandValue {
    Register(u8),
    Integer(u64),
    Float(f64),
}

/// One operand: a flag byte plus its value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Operand {
    /// See the `FLAG_*` constants; `constant` is the absence of
    /// `FLAG_REGISTER`.
    pub flags: u8,
    pub value: OperandValue,
}

impl Operand {
    pub const FLAG_CONSTANT: u8 = 0b0000_0000;
    pub const FLAG_REGISTER: u8 = 0b0000_0001;
    pub const FLAG_INTEGER: u8 = 0b0000_0010;
    pub const FLAG_NEGATIVE: u8 = 0b0000_0100;
    pub const FLAG_PREFIX: u8 = 0b0000_1000;
    pub const FLAG_POSTFIX: u8 = 0b0001_0000;

    /// An integer register operand (`I0..I63`, `PC`, `SP`, `FR`, `SR`).
    pub fn int_register(index: u8) -> Self {
        Self {
            flags: Self::FLAG_REGISTER | Self::FLAG_INTEGER,
            value: OperandValue::Register(index),
        }
    }

    /// A float register operand (`F0..F63`).
    pub fn float_register(index: u8) -> Self {
        Self {
            flags: Self::FLAG_REGISTER,
            value: OperandValue::Register(index),
        }
    }

    pub fn integer_constant(value: u64) -> Self {
        Self {
            flags: Self::FLAG_INTEGER,
            value: OperandValue::Integer(value),
        }
    }

    pub fn float_constant(value: f64) -> Self {
        Self {
            flags: Self::FLAG_CONSTANT,
            value: OperandValue::Float(value),
        }
    }

    pub fn negative(mut self) -> Self {
        self.flags |= Self::FLAG_NEGATIVE;
        self
    }

    pub fn is_register(&self) -> bool {
        self.flags & Self::FLAG_REGISTER != 0
    }

    pub fn is_integer(&self) -> bool {
        self.flags & Self::FLAG_INTEGER != 0
    }

    pub fn is_negative(&self) -> bool {
        self.flags & Self::FLAG_NEGATIVE != 0
    }

    pub fn is_prefix(&self) -> bool {
        self.flags & Self::FLAG_PREFIX != 0
    }

    pub fn is_postfix(&self) -> bool {
        self.flags & Self::FLAG_POSTFIX != 0
    }

    fn register_index(&self) -> u8 {
        match self.value {
            OperandValue::Register(index) => index,
            _ => 0,
        }
    }
}

/// One decoded (or not-yet-encoded) instruction.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Instruction {
    pub op: Option<OpCode>,
    pub size: OpSize,
    pub operands: Vec<Operand>,
}

impl Instruction {
    /// Header bytes before the first operand.
    pub const BASE_SIZE: usize = 3;
    /// Every encoding is a multiple of this.
    pub const ALIGNMENT: usize = 4;

    pub fn new(op: OpCode, size: OpSize, operands: Vec<Operand>) -> Self {
        debug_assert!(operands.len() <= 4);
        Self {
            op: Some(op),
            size,
            operands,
        }
    }

    fn align(value: usize, alignment: usize) -> usize {
        let offset = value % alignment;
        if offset != 0 {
            value + (alignment - offset)
        } else {
            value
        }
    }

    /// Deterministic on-heap size of this instruction.
    pub fn encoding_size(&self) -> usize {
        let mut size = Self::BASE_SIZE;
        for operand in &self.operands {
            size += 1;
            if operand.is_register() {
                size += 1;
            } else {
                size += self.size.size_in_bytes();
            }
        }
        Self::align(size, Self::ALIGNMENT)
    }

    /// Encode into the heap at `address`. Returns the encoded size, or 0
    /// after reporting a diagnostic.
    pub fn encode(&self, handler: &Handler, heap: &mut [u8], address: u64) -> usize {
        if address as usize % Self::ALIGNMENT != 0 {
            handler.error(
                "B003",
                format!(
                    "instruction alignment violation: alignment = {} bytes, address = ${:016X}",
                    Self::ALIGNMENT,
                    address
                ),
                Span::DUMMY,
            );
            return 0;
        }

        let base = address as usize;
        let Some(op) = self.op else {
            return 0;
        };
        heap[base + 1] = op as u8;
        heap[base + 2] = ((self.size as u8) << 4) | (self.operands.len() as u8 & 0x0f);

        let mut offset = Self::BASE_SIZE;
        for operand in &self.operands {
            heap[base + offset] = operand.flags;
            offset += 1;

            if operand.is_register() {
                heap[base + offset] = operand.register_index();
                offset += 1;
                continue;
            }

            let integer = match operand.value {
                OperandValue::Integer(value) => value,
                OperandValue::Float(value) => value.to_bits(),
                OperandValue::Register(index) => index as u64,
            };

            if !operand.is_integer() && matches!(self.size, OpSize::Byte | OpSize::Word) {
                handler.error(
                    "B009",
                    "constant floats cannot have a size of 'none', 'byte', or 'word'.",
                    Span::DUMMY,
                );
                return 0;
            }

            match self.size {
                OpSize::Byte => {
                    heap[base + offset] = integer as u8;
                    offset += 1;
                }
                OpSize::Word => {
                    heap[base + offset..base + offset + 2]
                        .copy_from_slice(&(integer as u16).to_le_bytes());
                    offset += 2;
                }
                OpSize::Dword => {
                    if operand.is_integer() {
                        heap[base + offset..base + offset + 4]
                            .copy_from_slice(&(integer as u32).to_le_bytes());
                    } else if let OperandValue::Float(value) = operand.value {
                        heap[base + offset..base + offset + 4]
                            .copy_from_slice(&(value as f32).to_le_bytes());
                    }
                    offset += 4;
                }
                OpSize::Qword => {
                    if operand.is_integer() {
                        heap[base + offset..base + offset + 8]
                            .copy_from_slice(&integer.to_le_bytes());
                    } else if let OperandValue::Float(value) = operand.value {
                        heap[base + offset..base + offset + 8]
                            .copy_from_slice(&value.to_le_bytes());
                    }
                    offset += 8;
                }
                OpSize::None => {
                    if operand.is_integer() {
                        handler.error(
                            "B009",
                            "constant integers cannot have a size of 'none'.",
                            Span::DUMMY,
                        );
                    } else {
                        handler.error(
                            "B009",
                            "constant floats cannot have a size of 'none', 'byte', or 'word'.",
                            Span::DUMMY,
                        );
                    }
                    return 0;
                }
            }
        }

        let encoding_size = Self::align(offset, Self::ALIGNMENT);
        for pad in heap.iter_mut().take(base + encoding_size).skip(base + offset) {
            *pad = 0;
        }
        heap[base] = encoding_size as u8;
        encoding_size
    }

    /// Decode from the heap at `address`. Returns the decoded size, or 0
    /// after reporting a diagnostic.
    pub fn decode(&mut self, handler: &Handler, heap: &[u8], address: u64) -> usize {
        if address as usize % Self::ALIGNMENT != 0 {
            handler.error(
                "B003",
                format!(
                    "instruction alignment violation: alignment = {} bytes, address = ${:016X}",
                    Self::ALIGNMENT,
                    address
                ),
                Span::DUMMY,
            );
            return 0;
        }

        let base = address as usize;
        let encoding_size = heap[base] as usize;
        self.op = OpCode::from_u8(heap[base + 1]);
        let size_and_count = heap[base + 2];
        self.size = OpSize::from_u8(size_and_count >> 4).unwrap_or(OpSize::None);
        let operand_count = (size_and_count & 0x0f) as usize;

        self.operands.clear();
        let mut offset = Self::BASE_SIZE;
        for _ in 0..operand_count {
            let flags = heap[base + offset];
            offset += 1;

            let mut operand = Operand {
                flags,
                value: OperandValue::Integer(0),
            };

            if operand.is_register() {
                operand.value = OperandValue::Register(heap[base + offset]);
                offset += 1;
            } else {
                if !operand.is_integer() && matches!(self.size, OpSize::Byte | OpSize::Word) {
                    handler.error(
                        "B010",
                        "constant floats cannot have a size of 'none', 'byte', or 'word'.",
                        Span::DUMMY,
                    );
                    return 0;
                }
                match self.size {
                    OpSize::Byte => {
                        operand.value = OperandValue::Integer(heap[base + offset] as u64);
                        offset += 1;
                    }
                    OpSize::Word => {
                        let mut bytes = [0u8; 2];
                        bytes.copy_from_slice(&heap[base + offset..base + offset + 2]);
                        operand.value = OperandValue::Integer(u16::from_le_bytes(bytes) as u64);
                        offset += 2;
                    }
                    OpSize::Dword => {
                        let mut bytes = [0u8; 4];
                        bytes.copy_from_slice(&heap[base + offset..base + offset + 4]);
                        if operand.is_integer() {
                            operand.value =
                                OperandValue::Integer(u32::from_le_bytes(bytes) as u64);
                        } else {
                            operand.value =
                                OperandValue::Float(f32::from_le_bytes(bytes) as f64);
                        }
                        offset += 4;
                    }
                    OpSize::Qword => {
                        let mut bytes = [0u8; 8];
                        bytes.copy_from_slice(&heap[base + offset..base + offset + 8]);
                        if operand.is_integer() {
                            operand.value = OperandValue::Integer(u64::from_le_bytes(bytes));
                        } else {
                            operand.value = OperandValue::Float(f64::from_le_bytes(bytes));
                        }
                        offset += 8;
                    }
                    OpSize::None => {
                        if operand.is_integer() {
                            handler.error(
                                "B010",
                                "constant integers cannot have a size of 'none'.",
                                Span::DUMMY,
                            );
                        } else {
                            handler.error(
                                "B010",
                                "constant floats cannot have a size of 'none', 'byte', or 'word'.",
                                Span::DUMMY,
                            );
                        }
                        return 0;
                    }
                }
            }
            self.operands.push(operand);
        }

        encoding_size
    }

    /// Patch a branch/jump target once its label address is known.
    pub fn patch_branch_address(&mut self, address: u64, operand_index: usize) {
        if let Some(operand) = self.operands.get_mut(operand_index) {
            operand.value =
                OperandValue::Integer(Self::align(address as usize, Self::ALIGNMENT) as u64);
        }
    }
}
