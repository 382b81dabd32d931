//! Basic block record (spec §4.6): `{ id, kind, label?, instruction-range
//! [s,e), notes-range, comments map, parameters list of virtual vars,
//! predecessor/successor links, assembled address }`.

use rustc_hash::FxHashMap;
use scmc_util::define_idx;

use crate::instr::InstrId;
use crate::vvar::VarId;

define_idx!(BlockId);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Code,
    Data,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    pub id: BlockId,
    pub kind: BlockKind,
    pub label: Option<String>,
    /// Half-open `[start, end)` range into the function's instruction list.
    pub start: InstrId,
    pub end: InstrId,
    pub notes: Vec<String>,
    pub comments: FxHashMap<InstrId, String>,
    pub params: Vec<VarId>,
    pub preds: Vec<BlockId>,
    pub succs: Vec<BlockId>,
    /// Filled in by the encoder's `assemble` pass.
    pub address: Option<u64>,
}

impl BasicBlock {
    pub fn new(id: BlockId, kind: BlockKind) -> Self {
        Self {
            id,
            kind,
            label: None,
            start: InstrId(0),
            end: InstrId(0),
            notes: Vec::new(),
            comments: FxHashMap::default(),
            params: Vec::new(),
            preds: Vec::new(),
            succs: Vec::new(),
            address: None,
        }
    }

    pub fn comment(&mut self, at: InstrId, text: impl Into<String>) {
        self.comments.insert(at, text.into());
    }
}
