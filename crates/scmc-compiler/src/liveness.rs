//! Liveness construction (spec §4.8 `find_liveness`): for each virtual
//! variable version, walk its ordered accesses to form a `[first-def,
//! last-use]` interval, split so an interval lives in exactly one
//! block.

use scmc_ir::{AccessKind, BlockId, Function, InstrId, VarId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub var: VarId,
    pub version: usize,
    pub block: BlockId,
    pub start: InstrId,
    pub end: InstrId,
}

/// Builds one interval per `(var, version)` that has at least one
/// access, in start-position order — the order the linear scanner
/// expects to consume them.
pub fn find_liveness(func: &Function) -> Vec<Interval> {
    let mut intervals = Vec::new();
    for (var_id, var) in func.vars.iter_enumerated() {
        for (version_idx, version) in var.versions.iter().enumerate() {
            if version.accesses.is_empty() {
                continue;
            }
            let first_def = version
                .accesses
                .iter()
                .find(|a| a.kind == AccessKind::Def)
                .map(|a| a.instr)
                .unwrap_or(version.accesses[0].instr);
            let last_use = version.accesses.iter().map(|a| a.instr).max().unwrap_or(first_def);
            let block = func.instructions[first_def].block;
            intervals.push(Interval { var: var_id, version: version_idx, block, start: first_def, end: last_use });
        }
    }
    intervals.sort_by_key(|i| i.start.0);
    intervals
}

#[cfg(test)]
mod tests {
    use super::*;
    use scmc_ir::{Access, AccessKind as Kind};

    #[test]
    fn interval_spans_first_def_to_last_use() {
        let mut func = Function::new("f");
        let var = func.vars.push(scmc_ir::VirtualVar::new("x"));
        func.vars[var].new_version();
        func.vars[var].current().record(InstrId(2), Kind::Def);
        func.vars[var].current().record(InstrId(5), Kind::Use);
        // needs at least one instruction so `func.instructions[first_def]` resolves
        for _ in 0..6 {
            func.instructions.push(scmc_ir::Instruction::new(
                InstrId(0),
                BlockId(0),
                scmc_ir::Opcode::Nop,
                scmc_ir::Encoding::None,
            ));
        }
        let intervals = find_liveness(&func);
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].start, InstrId(2));
        assert_eq!(intervals[0].end, InstrId(5));
        let _ = Access { instr: InstrId(0), kind: Kind::Def };
    }
}
