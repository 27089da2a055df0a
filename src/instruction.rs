//! The decoded-instruction tagged union (§3, §4.4).
//!
//! Grounded on the teacher's `Instruction` enum (`instructions.rs`): one
//! variant per executable shape, carrying everything `execute` needs so it
//! never has to re-decode the opcode word. Unlike the teacher's 68000
//! encoding (dozens of bespoke variants, one per mnemonic), the MSP430's
//! regularity means almost every opcode fits one of three shapes
//! (`TwoOperand`, `SingleOperand`, `Jump`); the stack-manipulating
//! instructions get their own variants because §4.6 calls their cycle costs
//! and bounds-checking out as a distinct executor category.

use crate::addressing::AddressingMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    I,
    II,
    III,
}

/// Format I (two-operand) opcodes, in bit[15:12] order (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwoOperandOp {
    Mov,
    Add,
    Addc,
    Subc,
    Sub,
    Cmp,
    Dadd,
    Bit,
    Bic,
    Bis,
    Xor,
    And,
}

impl TwoOperandOp {
    /// MOV/CMP/BIT never perform a read-modify-write of the destination, so
    /// the cycle table (§4.7) gives them a discount when it lives in memory.
    pub fn is_mov_class(self) -> bool {
        matches!(self, Self::Mov | Self::Cmp | Self::Bit)
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Mov => "MOV",
            Self::Add => "ADD",
            Self::Addc => "ADDC",
            Self::Subc => "SUBC",
            Self::Sub => "SUB",
            Self::Cmp => "CMP",
            Self::Dadd => "DADD",
            Self::Bit => "BIT",
            Self::Bic => "BIC",
            Self::Bis => "BIS",
            Self::Xor => "XOR",
            Self::And => "AND",
        }
    }
}

/// Format II (single-operand) opcodes that are not stack-manipulating
/// (those get their own `Instruction` variants; see module docs).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SingleOperandOp {
    Rrc,
    Swpb,
    Rra,
    Sxt,
}

impl SingleOperandOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Rrc => "RRC",
            Self::Swpb => "SWPB",
            Self::Rra => "RRA",
            Self::Sxt => "SXT",
        }
    }

    /// SWPB and SXT are word-only (§4.4).
    pub fn word_only(self) -> bool {
        matches!(self, Self::Swpb | Self::Sxt)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpCondition {
    Jnz,
    Jz,
    Jnc,
    Jc,
    Jn,
    Jge,
    Jl,
    Jmp,
}

impl JumpCondition {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Jnz => "JNE/JNZ",
            Self::Jz => "JEQ/JZ",
            Self::Jnc => "JNC",
            Self::Jc => "JC",
            Self::Jn => "JN",
            Self::Jge => "JGE",
            Self::Jl => "JL",
            Self::Jmp => "JMP",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperandSpec {
    pub register: usize,
    pub mode: AddressingMode,
}

impl OperandSpec {
    pub fn extension_words_needed(&self) -> u8 {
        self.mode.extension_words_needed()
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Instruction {
    TwoOperand {
        word: u16,
        op: TwoOperandOp,
        is_byte: bool,
        src: OperandSpec,
        dst: OperandSpec,
    },
    SingleOperand {
        word: u16,
        op: SingleOperandOp,
        is_byte: bool,
        dst: OperandSpec,
    },
    Jump {
        word: u16,
        condition: JumpCondition,
        offset: i16,
    },
    /// PUSH src (Format II, real sub-opcode; §4.6).
    Push {
        word: u16,
        is_byte: bool,
        src: OperandSpec,
    },
    /// CALL src (Format II, real sub-opcode; §4.6, §4.7).
    Call {
        word: u16,
        src: OperandSpec,
    },
    /// RETI (Format II, real sub-opcode; fixed 5-cycle cost, §4.7).
    Reti { word: u16 },
    /// RET, recognized as the literal `MOV @SP+, PC` encoding it assembles
    /// to; given its own variant because §4.7 fixes its cost at 4 cycles
    /// independent of the generic Format I MOV table. See DESIGN.md.
    Ret { word: u16 },
    /// POP dst, the literal `MOV @SP+, dst` encoding; costed through the
    /// ordinary Format I MOV table since, unlike RET, §4.7 gives it no
    /// special-cased cost.
    Pop {
        word: u16,
        is_byte: bool,
        dst: OperandSpec,
    },
}

impl Instruction {
    pub fn word(&self) -> u16 {
        match self {
            Self::TwoOperand { word, .. }
            | Self::SingleOperand { word, .. }
            | Self::Jump { word, .. }
            | Self::Push { word, .. }
            | Self::Call { word, .. }
            | Self::Reti { word }
            | Self::Ret { word }
            | Self::Pop { word, .. } => *word,
        }
    }

    pub fn format(&self) -> Format {
        match self {
            Self::TwoOperand { .. } => Format::I,
            Self::Jump { .. } => Format::III,
            _ => Format::II,
        }
    }

    /// Total extension words this instruction consumes, source before
    /// destination (§3, §4.5).
    pub fn extension_word_count(&self) -> u8 {
        match self {
            Self::TwoOperand { src, dst, .. } => {
                src.extension_words_needed() + dst.extension_words_needed()
            }
            Self::SingleOperand { dst, .. } => dst.extension_words_needed(),
            Self::Jump { .. } | Self::Reti { .. } | Self::Ret { .. } => 0,
            Self::Push { src, .. } | Self::Call { src, .. } => src.extension_words_needed(),
            Self::Pop { dst, .. } => dst.extension_words_needed(),
        }
    }
}
