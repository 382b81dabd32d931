//! Linear-scan register allocation (spec §4.8 `allocate`), grounded on
//! the original `allocate_registers`: an `active` set sized to the
//! register pool, intervals consumed in start order, expired intervals
//! retiring their register before a new one is claimed.

use scmc_ir::{Function, Register};

use crate::error::{CompileError, Result};
use crate::liveness::Interval;
use crate::regpool::RegPool;

/// `interval -> register` assignments, written back onto each
/// version's `assigned` field by [`allocate`].
pub fn allocate(func: &mut Function, intervals: &[Interval]) -> Result<()> {
    let mut pool = RegPool::new();
    // One slot per possible register, indexed by register number —
    // mirrors the original's `active` array sized to `pool.size`.
    let mut active: Vec<Option<Interval>> = vec![None; scmc_ir::GP_REGISTER_COUNT as usize];
    let mut assigned: Vec<(Interval, Register)> = Vec::new();

    for &interval in intervals {
        // Retire anything in `active` that ended before this interval starts.
        for slot in active.iter_mut() {
            if let Some(expired) = slot {
                if expired.end.0 < interval.start.0 {
                    if let Some((_, reg)) = assigned.iter().find(|(i, _)| i.var == expired.var && i.version == expired.version) {
                        pool.release(*reg);
                    }
                    *slot = None;
                }
            }
        }

        if let Some(reg) = pool.retain() {
            if let Register::R(n) = reg {
                active[n as usize] = Some(interval);
            }
            assigned.push((interval, reg));
        } else {
            // Spill path is a design seam (spec §9): reject rather than
            // silently miscompile until spill bookkeeping is added.
            return Err(CompileError::RegisterPressure);
        }
    }

    for (interval, reg) in assigned {
        func.vars[interval.var].versions[interval.version].assigned = Some(reg);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scmc_ir::{BlockId, InstrId};

    fn interval(var: scmc_ir::VarId, start: u32, end: u32) -> Interval {
        Interval { var, version: 0, block: BlockId(0), start: InstrId(start), end: InstrId(end) }
    }

    #[test]
    fn disjoint_intervals_can_share_a_register() {
        let mut func = Function::new("f");
        let a = func.vars.push(scmc_ir::VirtualVar::new("a"));
        func.vars[a].new_version();
        let b = func.vars.push(scmc_ir::VirtualVar::new("b"));
        func.vars[b].new_version();
        let intervals = vec![interval(a, 0, 2), interval(b, 3, 5)];
        allocate(&mut func, &intervals).unwrap();
        assert_eq!(func.vars[a].versions[0].assigned, func.vars[b].versions[0].assigned);
    }

    #[test]
    fn overlapping_intervals_get_distinct_registers() {
        let mut func = Function::new("f");
        let a = func.vars.push(scmc_ir::VirtualVar::new("a"));
        func.vars[a].new_version();
        let b = func.vars.push(scmc_ir::VirtualVar::new("b"));
        func.vars[b].new_version();
        let intervals = vec![interval(a, 0, 5), interval(b, 1, 4)];
        allocate(&mut func, &intervals).unwrap();
        assert_ne!(func.vars[a].versions[0].assigned, func.vars[b].versions[0].assigned);
    }

    #[test]
    fn exhausting_the_pool_reports_register_pressure() {
        let mut func = Function::new("f");
        let mut intervals = Vec::new();
        for i in 0..17u32 {
            let v = func.vars.push(scmc_ir::VirtualVar::new(format!("v{i}")));
            func.vars[v].new_version();
            intervals.push(interval(v, 0, 100));
        }
        assert!(matches!(allocate(&mut func, &intervals), Err(CompileError::RegisterPressure)));
    }
}
