//! Control-flow edge derivation (spec §4.6 "predecessor/successor
//! links"). Unlike a classic MIR with a dedicated terminator field,
//! control flow here lives inside ordinary instructions (`br`, `beq`,
//! …) addressed at a block. [`derive_edges`] scans each block's last
//! control-flow instruction and records the block(s) it can reach,
//! grounded on the original MIR's `terminator_targets` walk.

use crate::function::Function;
use crate::operand::Operand;

/// Recomputes every block's `preds`/`succs` from its instructions'
/// `Operand::Block` targets, replacing whatever the builder already
/// linked. Safe to call repeatedly (e.g. after an optimization pass
/// rewrites branches).
pub fn derive_edges(func: &mut Function) {
    for block in func.blocks.iter_mut() {
        block.succs.clear();
    }
    let block_ids: Vec<_> = func.blocks.indices().collect();
    let mut edges = Vec::new();
    for &id in &block_ids {
        let block = &func.blocks[id];
        if block.start == block.end {
            continue;
        }
        for idx in block.start.0..block.end.0 {
            let instr = &func.instructions[crate::instr::InstrId(idx)];
            if !instr.opcode.is_control_flow() {
                continue;
            }
            for operand in &instr.operands {
                if let Operand::Block(target) = operand {
                    edges.push((id, *target));
                }
            }
            if let crate::operand::Encoding::Imm { src: Operand::Block(target), .. } = &instr.encoding {
                edges.push((id, *target));
            }
            // A conditional branch (anything but an unconditional exit)
            // falls through to the physically next block when untaken.
            if !instr.opcode.is_unconditional_exit() {
                if let Some(next) = block_ids.iter().find(|b| b.0 == id.0 + 1) {
                    edges.push((id, *next));
                }
            }
        }
    }
    for (from, to) in edges {
        if !func.blocks[from].succs.contains(&to) {
            func.blocks[from].succs.push(to);
        }
    }
    for block in func.blocks.iter_mut() {
        block.preds.clear();
    }
    let all_edges: Vec<_> =
        func.blocks.iter_enumerated().flat_map(|(id, b)| b.succs.iter().map(move |&s| (id, s))).collect();
    for (from, to) in all_edges {
        if !func.blocks[to].preds.contains(&from) {
            func.blocks[to].preds.push(from);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockKind;
    use crate::function::Builder;
    use crate::opcode::Opcode;
    use crate::operand::{Encoding, Operand};

    #[test]
    fn branch_target_becomes_a_successor() {
        let mut b = Builder::new("f");
        let entry = b.current_block();
        let target = b.new_block(BlockKind::Code);
        b.set_current_block(entry);
        b.emit(Opcode::Br, Encoding::Imm { src: Operand::Block(target), dst: None });
        let mut func = b.build();
        derive_edges(&mut func);
        assert_eq!(func.blocks[entry].succs, vec![target]);
        assert_eq!(func.blocks[target].preds, vec![entry]);
    }
}
