//! A compiled procedure's IR: its flat instruction list and the basic
//! blocks that slice it up, plus the virtual variables live across it.
//! Grounded on the original MIR `Function`/`Builder` pair, narrowed to
//! this spec's instruction/block shape.

use scmc_util::IndexVec;

use crate::block::{BasicBlock, BlockId, BlockKind};
use crate::instr::{InstrId, Instruction};
use crate::opcode::Opcode;
use crate::operand::Encoding;
use crate::vvar::{VarId, VirtualVar};

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub instructions: IndexVec<InstrId, Instruction>,
    pub blocks: IndexVec<BlockId, BasicBlock>,
    pub vars: IndexVec<VarId, VirtualVar>,
    pub entry: BlockId,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: IndexVec::new(),
            blocks: IndexVec::new(),
            vars: IndexVec::new(),
            entry: BlockId(0),
        }
    }
}

/// Accumulates instructions into the current block as the compiler
/// walks a source form, mirroring the original MIR builder's
/// `new_block`/`set_current_block`/`statement` API.
pub struct Builder {
    pub function: Function,
    current: BlockId,
}

impl Builder {
    pub fn new(name: impl Into<String>) -> Self {
        let mut function = Function::new(name);
        let entry = function.blocks.push(BasicBlock::new(BlockId(0), BlockKind::Code));
        function.entry = entry;
        Self { function, current: entry }
    }

    pub fn current_block(&self) -> BlockId {
        self.current
    }

    pub fn new_block(&mut self, kind: BlockKind) -> BlockId {
        let id = self.function.blocks.push(BasicBlock::new(BlockId(0), kind));
        self.function.blocks[id].id = id;
        id
    }

    pub fn set_current_block(&mut self, block: BlockId) {
        self.current = block;
    }

    pub fn declare_var(&mut self, symbol: impl Into<String>) -> VarId {
        self.function.vars.push(VirtualVar::new(symbol))
    }

    /// Appends `instruction` to the current block's instruction range.
    pub fn emit(&mut self, opcode: Opcode, encoding: Encoding) -> InstrId {
        let id = self.function.instructions.push(Instruction::new(InstrId(0), self.current, opcode, encoding));
        let instr = &mut self.function.instructions[id];
        instr.id = id;
        let block = &mut self.function.blocks[self.current];
        if block.start == block.end {
            block.start = id;
        }
        block.end = InstrId(id.0 + 1);
        id
    }

    /// Links `from -> to` directly, for cases (e.g. the compiler's
    /// fall-through between sequential blocks) where the edge isn't
    /// implied by a branch instruction's operand.
    pub fn link(&mut self, from: BlockId, to: BlockId) {
        if !self.function.blocks[from].succs.contains(&to) {
            self.function.blocks[from].succs.push(to);
        }
        if !self.function.blocks[to].preds.contains(&from) {
            self.function.blocks[to].preds.push(from);
        }
    }

    pub fn build(self) -> Function {
        self.function
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operand::Operand;
    use crate::register::Register;

    #[test]
    fn emit_grows_the_current_blocks_range() {
        let mut b = Builder::new("f");
        let entry = b.current_block();
        b.emit(Opcode::Const, Encoding::Imm { src: Operand::Immediate(7), dst: Some(Register::R(0)) });
        b.emit(Opcode::Ret, Encoding::None);
        let func = b.build();
        let block = &func.blocks[entry];
        assert_eq!(block.end.0 - block.start.0, 2);
        assert_eq!(func.instructions.len(), 2);
    }

    #[test]
    fn new_block_starts_with_an_empty_range() {
        let mut b = Builder::new("f");
        let next = b.new_block(BlockKind::Code);
        let func = b.build();
        assert_eq!(func.blocks[next].start, func.blocks[next].end);
    }
}
