//! Procedure and environment descriptors — the side tables a `func`/`macro`/
//! `environment` cell's `ptr` payload indexes into.

use rustc_hash::FxHashMap;
use scmc_util::{define_idx, Idx, IndexVec};

use crate::cell::CellIdx;
use crate::intern::StringId;

define_idx!(
    /// Index into [`crate::Heap::procedures`].
    ProcId
);
define_idx!(
    /// Index into [`crate::Heap::environments`].
    EnvId
);

/// `{ parameter-list, body, captured-environment, is-macro, is-compiled,
/// compiled entry address }`.
#[derive(Debug, Clone)]
pub struct Procedure {
    pub params: CellIdx,
    pub body: CellIdx,
    pub env: EnvId,
    pub is_macro: bool,
    pub is_compiled: bool,
    pub compiled_entry: Option<u32>,
}

/// `{ parent, bindings, gc-protect }`.
///
/// Bindings are keyed by interned-string id rather than by symbol cell, so a
/// lookup never needs to dereference the heap arena. `env_cell` is the
/// arena index of this environment's own cell, filled in once by
/// `Heap::alloc_environment` right after allocation — the mark pass walks
/// `parent` edges through it rather than conflating an `EnvId` with a
/// `CellIdx`.
#[derive(Debug, Clone)]
pub struct Environment {
    pub parent: Option<EnvId>,
    pub bindings: FxHashMap<StringId, CellIdx>,
    pub gc_protect: bool,
    pub env_cell: CellIdx,
}

impl Environment {
    pub fn root(gc_protect: bool) -> Self {
        Environment {
            parent: None,
            bindings: FxHashMap::default(),
            gc_protect,
            env_cell: 0,
        }
    }

    pub fn child(parent: EnvId, gc_protect: bool) -> Self {
        Environment {
            parent: Some(parent),
            bindings: FxHashMap::default(),
            gc_protect,
            env_cell: 0,
        }
    }
}

/// Storage for [`Procedure`] and [`Environment`] descriptors, addressed by
/// the 32-bit index a `func`/`macro`/`environment` cell carries.
#[derive(Default)]
pub struct ObjectTables {
    pub procedures: IndexVec<ProcId, Procedure>,
    pub environments: IndexVec<EnvId, Environment>,
}

impl ObjectTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_procedure(&mut self, proc: Procedure) -> ProcId {
        self.procedures.push(proc)
    }

    pub fn push_environment(&mut self, env: Environment) -> EnvId {
        self.environments.push(env)
    }
}
