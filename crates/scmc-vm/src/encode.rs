//! Instruction word encoding (spec §4.9): a 64-bit word is `{ type:6,
//! signed:1, encoding:3, payload:54 }`, widened here to `{ type:8,
//! signed:1, encoding:3, payload:52 }` since this taxonomy carries more
//! opcodes than a 6-bit field holds. The payload packs up to three
//! 6-bit register fields and a sign-extendable immediate.

use scmc_ir::{Encoding, Instruction, Operand};

use crate::error::{Result, VmError};
use crate::regcode;

const OPCODE_BITS: u32 = 8;
const SIGNED_BITS: u32 = 1;
const KIND_BITS: u32 = 3;
const REG_BITS: u32 = 6;

const OPCODE_SHIFT: u32 = 0;
const SIGNED_SHIFT: u32 = OPCODE_SHIFT + OPCODE_BITS;
const KIND_SHIFT: u32 = SIGNED_SHIFT + SIGNED_BITS;
const REG_A_SHIFT: u32 = KIND_SHIFT + KIND_BITS;
const REG_B_SHIFT: u32 = REG_A_SHIFT + REG_BITS;
const REG_C_SHIFT: u32 = REG_B_SHIFT + REG_BITS;
const IMM_SHIFT: u32 = REG_C_SHIFT + REG_BITS;
const IMM_BITS: u32 = 64 - IMM_SHIFT;

const REG_MASK: u64 = (1 << REG_BITS) - 1;
const OPCODE_MASK: u64 = (1 << OPCODE_BITS) - 1;
const KIND_MASK: u64 = (1 << KIND_BITS) - 1;
const IMM_RANGE: i64 = 1 << (IMM_BITS - 1);

/// The eight [`Encoding`] shapes, numbered to fit the word's 3-bit
/// `encoding` field.
fn encoding_kind(enc: &Encoding) -> u8 {
    match enc {
        Encoding::None => 0,
        Encoding::Imm { .. } => 1,
        Encoding::Reg1 { .. } => 2,
        Encoding::Reg2 { .. } => 3,
        Encoding::Reg2Imm { .. } => 4,
        Encoding::Reg3 { .. } => 5,
        Encoding::Offset { .. } => 6,
        Encoding::Indexed { .. } => 7,
    }
}

/// A decoded word's fields, register-code form (not yet mapped back to
/// [`scmc_ir::Register`] — the dispatch loop does that lazily per field
/// it actually needs).
#[derive(Debug, Clone, Copy)]
pub struct Decoded {
    pub opcode: u8,
    pub is_signed: bool,
    pub kind: u8,
    pub reg_a: u8,
    pub reg_b: u8,
    pub reg_c: u8,
    pub imm: i64,
}

/// Resolves an [`Operand`] appearing in an `imm`/`reg2imm` slot to the
/// integer the encoded word carries: `Block` resolves to the target
/// block's first-instruction index (the code array's word address,
/// since one instruction occupies exactly one word), `Trap` widens to
/// `i64`, `Immediate` passes through, anything else is a compiler bug.
fn resolve_immediate(op: &Operand, blocks: &scmc_util::IndexVec<scmc_ir::BlockId, scmc_ir::BasicBlock>) -> Result<i64> {
    match op {
        Operand::Immediate(n) => Ok(*n),
        Operand::Trap(n) => Ok(*n as i64),
        Operand::Offset(n) => Ok(*n as i64),
        Operand::Block(id) => Ok(blocks[*id].start.0 as i64),
        Operand::Label(name) => Err(VmError::UnresolvedLabel(name.clone())),
        other => Err(VmError::BadOperand(other.clone())),
    }
}

fn check_imm_range(value: i64) -> Result<()> {
    if value >= -IMM_RANGE && value < IMM_RANGE {
        Ok(())
    } else {
        Err(VmError::ImmediateOverflow(value))
    }
}

/// Encodes one instruction into a 64-bit word, resolving any block-valued
/// operand against `blocks` (the owning function's block table).
pub fn encode_instruction(instr: &Instruction, blocks: &scmc_util::IndexVec<scmc_ir::BlockId, scmc_ir::BasicBlock>) -> Result<u64> {
    let opcode = instr.opcode as u8;
    let kind = encoding_kind(&instr.encoding);
    let (reg_a, reg_b, reg_c, imm) = match &instr.encoding {
        Encoding::None => (regcode::NONE, regcode::NONE, regcode::NONE, 0),
        Encoding::Imm { src, dst } => {
            let imm = resolve_immediate(src, blocks)?;
            (dst.map(regcode::encode).unwrap_or(regcode::NONE), regcode::NONE, regcode::NONE, imm)
        }
        Encoding::Reg1 { dst } => (regcode::encode(*dst), regcode::NONE, regcode::NONE, 0),
        Encoding::Reg2 { src, dst } => (regcode::encode(*src), regcode::encode(*dst), regcode::NONE, 0),
        Encoding::Reg2Imm { a, b, imm } => (regcode::encode(*a), regcode::encode(*b), regcode::NONE, resolve_immediate(imm, blocks)?),
        Encoding::Reg3 { a, b, c } => (regcode::encode(*a), regcode::encode(*b), regcode::encode(*c), 0),
        Encoding::Offset { base, dst, offset } => (regcode::encode(*base), regcode::encode(*dst), regcode::NONE, *offset as i64),
        Encoding::Indexed { base, index, dst, offset } => (regcode::encode(*base), regcode::encode(*index), regcode::encode(*dst), *offset as i64),
    };
    check_imm_range(imm)?;
    let imm_bits = (imm as u64) & ((1 << IMM_BITS) - 1);
    let word = ((opcode as u64) << OPCODE_SHIFT)
        | ((instr.is_signed as u64) << SIGNED_SHIFT)
        | ((kind as u64) << KIND_SHIFT)
        | ((reg_a as u64) << REG_A_SHIFT)
        | ((reg_b as u64) << REG_B_SHIFT)
        | ((reg_c as u64) << REG_C_SHIFT)
        | (imm_bits << IMM_SHIFT);
    Ok(word)
}

/// Splits a word back into its fields; the sign-extension of `imm` is
/// applied eagerly since every reader wants the signed value.
pub fn decode_word(word: u64) -> Decoded {
    let opcode = ((word >> OPCODE_SHIFT) & OPCODE_MASK) as u8;
    let is_signed = ((word >> SIGNED_SHIFT) & 1) != 0;
    let kind = ((word >> KIND_SHIFT) & KIND_MASK) as u8;
    let reg_a = ((word >> REG_A_SHIFT) & REG_MASK) as u8;
    let reg_b = ((word >> REG_B_SHIFT) & REG_MASK) as u8;
    let reg_c = ((word >> REG_C_SHIFT) & REG_MASK) as u8;
    let raw_imm = word >> IMM_SHIFT;
    let imm = if is_signed {
        let shift = 64 - IMM_BITS;
        ((raw_imm << shift) as i64) >> shift
    } else {
        raw_imm as i64
    };
    Decoded { opcode, is_signed, kind, reg_a, reg_b, reg_c, imm }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scmc_ir::{BlockKind, Builder, Opcode, Register};

    #[test]
    fn const_instruction_round_trips_its_immediate() {
        let mut b = Builder::new("f");
        b.emit(Opcode::Const, Encoding::Imm { src: Operand::Immediate(7), dst: Some(Register::R(0)) });
        let func = b.build();
        let word = encode_instruction(&func.instructions[scmc_ir::InstrId(0)], &func.blocks).unwrap();
        let decoded = decode_word(word);
        assert_eq!(decoded.opcode, Opcode::Const as u8);
        assert_eq!(decoded.imm, 7);
        assert_eq!(decoded.reg_a, regcode::encode(Register::R(0)));
    }

    #[test]
    fn block_operand_resolves_to_its_start_instruction_index() {
        let mut b = Builder::new("f");
        b.emit(Opcode::Nop, Encoding::None);
        let target = b.new_block(BlockKind::Code);
        b.set_current_block(target);
        b.emit(Opcode::Nop, Encoding::None);
        let entry = b.function.entry;
        b.set_current_block(entry);
        b.emit(Opcode::Br, Encoding::Imm { src: Operand::Block(target), dst: None });
        let func = b.build();
        let br = func.instructions.iter().find(|i| i.opcode == Opcode::Br).unwrap();
        let word = encode_instruction(br, &func.blocks).unwrap();
        let decoded = decode_word(word);
        assert_eq!(decoded.imm, func.blocks[target].start.0 as i64);
    }
}
