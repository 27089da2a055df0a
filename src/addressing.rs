//! Addressing-mode resolution and constant generators (§4.2, §4.5).
//!
//! Decoding happens in two steps, mirroring the teacher's split between
//! `EAMode` (the addressing-mode tag, `fields.rs`) and `CPU::memory_handle`
//! (the side-effecting resolver, `processor.rs`): `decode_source`/
//! `decode_destination` turn a (register, selector) pair from the opcode
//! word into an `AddressingMode`, folding in R2/R3 constant-generator
//! substitution; `resolve_*` then consumes any extension word and performs
//! auto-increment side effects to produce a concrete `Location` that
//! `executor.rs` reads or writes through.

use crate::error::Result;
use crate::memory::MemoryMap;
use crate::registers::{RegisterFile, CG2, PC, SP, SR};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingMode {
    Register(usize),
    Indexed(usize),
    Indirect(usize),
    IndirectAutoIncrement(usize),
    Immediate,
    Absolute,
    Symbolic,
    /// Already-resolved constant-generator value (§4.2); consumes no
    /// extension word and touches no register or memory.
    Constant(u16),
}

impl AddressingMode {
    pub fn extension_words_needed(&self) -> u8 {
        match self {
            Self::Indexed(_) | Self::Immediate | Self::Absolute | Self::Symbolic => 1,
            _ => 0,
        }
    }
}

/// Decodes a 2-bit `As` source-addressing selector, applying the R2/R3
/// constant-generator substitution table.
pub fn decode_source(register: usize, selector: u8) -> AddressingMode {
    match (register, selector) {
        (CG2, 0) => AddressingMode::Constant(0),
        (CG2, 1) => AddressingMode::Constant(1),
        (CG2, 2) => AddressingMode::Constant(2),
        (CG2, 3) => AddressingMode::Constant(0xffff),
        (SR, 0) => AddressingMode::Register(SR),
        (SR, 1) => AddressingMode::Absolute,
        (SR, 2) => AddressingMode::Constant(4),
        (SR, 3) => AddressingMode::Constant(8),
        (PC, 0) => AddressingMode::Register(PC),
        (PC, 1) => AddressingMode::Symbolic,
        (PC, 2) => AddressingMode::Indirect(PC),
        (PC, 3) => AddressingMode::Immediate,
        (reg, 0) => AddressingMode::Register(reg),
        (reg, 1) => AddressingMode::Indexed(reg),
        (reg, 2) => AddressingMode::Indirect(reg),
        (reg, 3) => AddressingMode::IndirectAutoIncrement(reg),
        _ => unreachable!("selector is a 2-bit field"),
    }
}

/// Decodes a 1-bit `Ad` destination-addressing selector. Destinations never
/// go through the constant generator.
pub fn decode_destination(register: usize, ad: u8) -> AddressingMode {
    match (register, ad) {
        (PC, 0) => AddressingMode::Register(PC),
        (PC, 1) => AddressingMode::Symbolic,
        (SR, 0) => AddressingMode::Register(SR),
        (SR, 1) => AddressingMode::Absolute,
        (reg, 0) => AddressingMode::Register(reg),
        (reg, 1) => AddressingMode::Indexed(reg),
        _ => unreachable!("Ad is a 1-bit field"),
    }
}

/// A fully-resolved operand location, produced after extension words have
/// been consumed and any auto-increment side effect applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Register(usize),
    Memory(u16),
    Immediate(u16),
}

fn autoincrement_step(register: usize, is_byte: bool) -> u16 {
    // SP and PC always move in word steps to stay aligned; §4.5 notes PC
    // never reaches this path (As=3 on R0 decodes to Immediate instead).
    if is_byte && register != SP && register != PC {
        1
    } else {
        2
    }
}

/// Resolves a source operand, applying R2/R3 constant generation and the
/// auto-increment side effect on `regs`. `ext_word` must be `Some` exactly
/// when `mode.extension_words_needed() == 1`.
pub fn resolve_source(
    mode: AddressingMode,
    is_byte: bool,
    regs: &mut RegisterFile,
    ext_word: Option<u16>,
    pc_after: u16,
) -> Location {
    match mode {
        AddressingMode::Constant(value) => Location::Immediate(value),
        AddressingMode::Register(reg) => Location::Register(reg),
        AddressingMode::Indirect(reg) => Location::Memory(regs.read(reg)),
        AddressingMode::IndirectAutoIncrement(reg) => {
            let addr = regs.read(reg);
            let step = autoincrement_step(reg, is_byte);
            regs.write(reg, addr.wrapping_add(step));
            Location::Memory(addr)
        }
        AddressingMode::Indexed(reg) => {
            let offset = ext_word.expect("Indexed source requires an extension word");
            Location::Memory(regs.read(reg).wrapping_add(offset))
        }
        AddressingMode::Absolute => {
            Location::Memory(ext_word.expect("Absolute source requires an extension word"))
        }
        AddressingMode::Symbolic => {
            let offset = ext_word.expect("Symbolic source requires an extension word");
            Location::Memory(pc_after.wrapping_add(offset))
        }
        AddressingMode::Immediate => {
            Location::Immediate(ext_word.expect("Immediate source requires an extension word"))
        }
    }
}

/// Resolves a destination operand. Destinations never auto-increment and
/// never resolve to a constant, so `regs` is read-only here.
pub fn resolve_destination(
    mode: AddressingMode,
    regs: &RegisterFile,
    ext_word: Option<u16>,
    pc_after: u16,
) -> Location {
    match mode {
        AddressingMode::Register(reg) => Location::Register(reg),
        AddressingMode::Indexed(reg) => {
            let offset = ext_word.expect("Indexed destination requires an extension word");
            Location::Memory(regs.read(reg).wrapping_add(offset))
        }
        AddressingMode::Absolute => {
            Location::Memory(ext_word.expect("Absolute destination requires an extension word"))
        }
        AddressingMode::Symbolic => {
            let offset = ext_word.expect("Symbolic destination requires an extension word");
            Location::Memory(pc_after.wrapping_add(offset))
        }
        // Immediate/Indirect/IndirectAutoIncrement/Constant never arise from
        // decode_destination; unreachable defensively rather than panicking
        // the caller with a confusing message elsewhere.
        other => unreachable!("{other:?} cannot be a destination addressing mode"),
    }
}

pub fn read_location(loc: Location, is_byte: bool, regs: &RegisterFile, mem: &MemoryMap) -> Result<u16> {
    let value = match loc {
        Location::Register(reg) => regs.read(reg),
        Location::Memory(addr) => {
            if is_byte {
                mem.read_byte(addr)? as u16
            } else {
                mem.read_word(addr)?
            }
        }
        Location::Immediate(value) => value,
    };
    Ok(if is_byte { value & 0x00ff } else { value })
}

pub fn write_location(
    loc: Location,
    is_byte: bool,
    value: u16,
    regs: &mut RegisterFile,
    mem: &mut MemoryMap,
) -> Result<()> {
    match loc {
        Location::Register(reg) => {
            if is_byte {
                regs.write_byte(reg, value as u8, false);
            } else {
                regs.write(reg, value);
            }
        }
        Location::Memory(addr) => {
            if is_byte {
                mem.write_byte(addr, value as u8)?;
            } else {
                mem.write_word(addr, value)?;
            }
        }
        Location::Immediate(_) => unreachable!("immediate destinations are not representable"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryMap, Permissions, Region, RegionKind};

    fn mem_with_ram() -> MemoryMap {
        MemoryMap::new(vec![
            Region::new(0xff80, 0xffff, Permissions::rx(), RegionKind::InterruptVectorTable),
            Region::new(0x2000, 0x2fff, Permissions::rwx(), RegionKind::Ram),
        ])
        .unwrap()
    }

    #[test]
    fn cg2_constants_cover_all_four_selectors() {
        assert_eq!(decode_source(CG2, 0), AddressingMode::Constant(0));
        assert_eq!(decode_source(CG2, 1), AddressingMode::Constant(1));
        assert_eq!(decode_source(CG2, 2), AddressingMode::Constant(2));
        assert_eq!(decode_source(CG2, 3), AddressingMode::Constant(0xffff));
    }

    #[test]
    fn sr_constants_for_indirect_modes() {
        assert_eq!(decode_source(SR, 1), AddressingMode::Absolute);
        assert_eq!(decode_source(SR, 2), AddressingMode::Constant(4));
        assert_eq!(decode_source(SR, 3), AddressingMode::Constant(8));
    }

    #[test]
    fn pc_autoincrement_selector_is_immediate() {
        assert_eq!(decode_source(PC, 3), AddressingMode::Immediate);
    }

    #[test]
    fn indirect_autoincrement_advances_register_by_operand_width() {
        let mut regs = RegisterFile::new();
        regs.write(4, 0x2000);
        let loc = resolve_source(
            AddressingMode::IndirectAutoIncrement(4),
            false,
            &mut regs,
            None,
            0,
        );
        assert_eq!(loc, Location::Memory(0x2000));
        assert_eq!(regs.read(4), 0x2002);
    }

    #[test]
    fn byte_autoincrement_advances_by_one_except_sp() {
        let mut regs = RegisterFile::new();
        regs.write(4, 0x2000);
        regs.write(SP, 0x2ffe);
        resolve_source(AddressingMode::IndirectAutoIncrement(4), true, &mut regs, None, 0);
        assert_eq!(regs.read(4), 0x2001);
        resolve_source(AddressingMode::IndirectAutoIncrement(SP), true, &mut regs, None, 0);
        assert_eq!(regs.read(SP), 0x3000);
    }

    #[test]
    fn indexed_destination_wraps_on_overflow() {
        let mut regs = RegisterFile::new();
        regs.write(4, 0xfffe);
        let loc = resolve_destination(AddressingMode::Indexed(4), &regs, Some(4), 0);
        assert_eq!(loc, Location::Memory(2));
    }

    #[test]
    fn byte_read_masks_to_low_byte() {
        let mem = mem_with_ram();
        let regs = RegisterFile::new();
        let mut mem = mem;
        mem.write_word(0x2000, 0xabcd).unwrap();
        let value = read_location(Location::Memory(0x2000), true, &regs, &mem).unwrap();
        assert_eq!(value, 0xcd);
    }

    #[test]
    fn symbolic_mode_is_pc_relative() {
        let regs = RegisterFile::new();
        let loc = resolve_destination(AddressingMode::Symbolic, &regs, Some(0x10), 0x8004);
        assert_eq!(loc, Location::Memory(0x8014));
    }
}
