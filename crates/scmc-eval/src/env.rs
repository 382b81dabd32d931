//! Environment operations: `get`, `set`, `make`.
//!
//! `scmc-heap::Environment` owns the storage; this module owns the lookup
//! and update policy a tree-walking evaluator needs on top of it.

use scmc_heap::{CellIdx, Environment, Heap};

use crate::error::Result;

/// Creates a fresh child frame of `parent` (or a root frame if `parent` is
/// `heap.nil()`), returning its cell. `gc_protect` should be `true` only for
/// an environment with no other incoming reference that must nonetheless
/// survive collection — the global environment — and `false` for an
/// ordinary per-call frame, which stays reachable for the call's duration
/// via the evaluator's root stack and, for anything that outlives the
/// call, via the closure that captures it as its defining environment.
pub fn make(heap: &mut Heap, parent: CellIdx, gc_protect: bool) -> Result<CellIdx> {
    let env = if heap.is_nil(parent) {
        Environment::root(gc_protect)
    } else {
        Environment::child(heap.env_id_of(parent), gc_protect)
    };
    Ok(heap.alloc_environment(env)?)
}

/// Searches `env`, then its parent chain, for `sym`'s binding. Returns
/// `heap.nil()` if unbound anywhere in the chain — this interpreter has no
/// "unbound variable" error, matching the original's silent-nil contract.
pub fn get(heap: &Heap, sym: CellIdx, env: CellIdx) -> Result<CellIdx> {
    let id = heap.string_id_of(sym);
    let mut cursor = env;
    loop {
        let e = heap.environment(cursor)?;
        if let Some(&v) = e.bindings.get(&id) {
            return Ok(v);
        }
        match e.parent {
            Some(parent) => cursor = heap.env_cell_of(parent),
            None => return Ok(heap.nil()),
        }
    }
}

/// Updates `sym`'s binding in the frame of `env`'s chain where it already
/// exists; if it exists nowhere, inserts it into `env` itself.
pub fn set(heap: &mut Heap, sym: CellIdx, value: CellIdx, env: CellIdx) -> Result<()> {
    let id = heap.string_id_of(sym);
    let mut cursor = env;
    loop {
        let parent = {
            let e = heap.environment(cursor)?;
            if e.bindings.contains_key(&id) {
                heap.environment_mut(cursor)?.bindings.insert(id, value);
                return Ok(());
            }
            e.parent
        };
        match parent {
            Some(p) => cursor = heap.env_cell_of(p),
            None => break,
        }
    }
    heap.environment_mut(env)?.bindings.insert(id, value);
    Ok(())
}

/// Binds a (possibly dotted/variadic) parameter list against an evaluated
/// argument list, the way `args_to_env` does: a symbol tail (or a bare
/// symbol in place of a pair) soaks up the remaining arguments as a list.
pub fn bind_params(heap: &mut Heap, params: CellIdx, args: CellIdx, env: CellIdx) -> Result<()> {
    let mut p = params;
    let mut a = args;
    loop {
        if heap.obj_type(p) != scmc_heap::ObjType::Pair {
            if !heap.is_nil(p) {
                set(heap, p, a, env)?;
            }
            break;
        }
        let (k, p_rest) = heap.get(p).pair_parts();
        let v = if heap.obj_type(a) == scmc_heap::ObjType::Pair {
            heap.get(a).pair_parts().0
        } else {
            heap.nil()
        };
        set(heap, k, v, env)?;
        p = p_rest;
        a = if heap.obj_type(a) == scmc_heap::ObjType::Pair {
            heap.get(a).pair_parts().1
        } else {
            heap.nil()
        };
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_updates_existing_binding_in_parent() {
        let mut heap = Heap::new(8192);
        let root = make(&mut heap, heap.nil(), true).unwrap();
        let child = make(&mut heap, root, false).unwrap();
        let sym = heap.alloc_symbol("x").unwrap();
        let one = heap.alloc_fixnum(1).unwrap();
        set(&mut heap, sym, one, root).unwrap();
        let two = heap.alloc_fixnum(2).unwrap();
        set(&mut heap, sym, two, child).unwrap();
        assert_eq!(heap.get(get(&heap, sym, child).unwrap()).fixnum_value(), 2);
        assert_eq!(heap.get(get(&heap, sym, root).unwrap()).fixnum_value(), 2);
    }

    #[test]
    fn unbound_symbol_resolves_to_nil() {
        let mut heap = Heap::new(8192);
        let root = make(&mut heap, heap.nil(), true).unwrap();
        let sym = heap.alloc_symbol("nope").unwrap();
        assert!(heap.is_nil(get(&heap, sym, root).unwrap()));
    }

    #[test]
    fn rest_parameter_binds_tail_list() {
        let mut heap = Heap::new(8192);
        let env = make(&mut heap, heap.nil(), true).unwrap();
        let rest = heap.alloc_symbol("rest").unwrap();
        let one = heap.alloc_fixnum(1).unwrap();
        let two = heap.alloc_fixnum(2).unwrap();
        let args = heap.alloc_cons(one, heap.alloc_cons(two, heap.nil()).unwrap()).unwrap();
        bind_params(&mut heap, rest, args, env).unwrap();
        let bound = get(&heap, rest, env).unwrap();
        assert_eq!(scmc_heap::to_string(&heap, bound, false), "(1 2)");
    }
}
