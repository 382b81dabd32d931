//! Virtual variable (spec §4.6): `{ symbol, versions list, accesses
//! list, live-range list }`. Versions give a single source variable an
//! SSA-like sequence of single-assignment instances, each carrying its
//! own liveness range for [`crate::cfg`] and the register allocator.

use scmc_util::define_idx;

use crate::block::BlockId;
use crate::instr::InstrId;
use crate::register::Register;

define_idx!(VarId);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Def,
    Use,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access {
    pub instr: InstrId,
    pub kind: AccessKind,
}

/// `[first-def, last-use]`, split so an interval lives in exactly one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveRange {
    pub block: BlockId,
    pub first_def: InstrId,
    pub last_use: InstrId,
}

#[derive(Debug, Clone, Default)]
pub struct Version {
    pub accesses: Vec<Access>,
    pub live_range: Option<LiveRange>,
    /// Filled in by the register allocator; `None` until `allocate()` runs.
    pub assigned: Option<Register>,
}

impl Version {
    pub fn record(&mut self, instr: InstrId, kind: AccessKind) {
        self.accesses.push(Access { instr, kind });
    }
}

#[derive(Debug, Clone)]
pub struct VirtualVar {
    pub symbol: String,
    pub versions: Vec<Version>,
}

impl VirtualVar {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self { symbol: symbol.into(), versions: Vec::new() }
    }

    /// Starts a fresh single-assignment version and returns its index,
    /// the way a new `let`/parameter binding shadows the previous one.
    pub fn new_version(&mut self) -> usize {
        self.versions.push(Version::default());
        self.versions.len() - 1
    }

    pub fn current(&mut self) -> &mut Version {
        self.versions.last_mut().expect("new_version called before use")
    }
}
