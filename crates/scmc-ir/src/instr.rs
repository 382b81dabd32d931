//! Instruction record (spec §4.6): `{ id, block-id, opcode, encoding,
//! is-signed, mode, aux, operands[0..4] }`. `operands` mirrors the
//! original's flat four-slot layout for disassembly/encoding convenience;
//! [`Encoding`] is the structured view the compiler and encoder actually
//! read from.

use scmc_util::define_idx;

use crate::block::BlockId;
use crate::operand::{Encoding, Operand};

define_idx!(InstrId);

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub id: InstrId,
    pub block: BlockId,
    pub opcode: crate::opcode::Opcode,
    pub encoding: Encoding,
    /// Whether the encoded immediate/offset fields sign-extend.
    pub is_signed: bool,
    /// Per-opcode auxiliary mode bit (e.g. `imm`'s "load vs. load-effective-address" switch).
    pub mode: u8,
    /// `+word-size`/`-word-size` depending on whether the referenced
    /// memory area grows up or down, or `0` when not area-relative.
    pub aux: i32,
    pub operands: [Operand; 4],
}

impl Instruction {
    pub fn new(id: InstrId, block: BlockId, opcode: crate::opcode::Opcode, encoding: Encoding) -> Self {
        Self {
            id,
            block,
            opcode,
            encoding,
            is_signed: false,
            mode: 0,
            aux: 0,
            operands: [Operand::None, Operand::None, Operand::None, Operand::None],
        }
    }
}
