//! The object arena and its mark-sweep collector.

use tracing::{debug, trace};

use crate::cell::{Cell, CellIdx, ObjType};
use crate::error::{HeapError, Result};
use crate::intern::{StringId, StringInterner};
use crate::object::{EnvId, Environment, ObjectTables, ProcId, Procedure};

/// An opaque host-pointer handle, addressed by a `ptr`/`cfunc`/`ffi` cell's
/// payload. The interpreter core never dereferences it; an embedder's FFI
/// layer (outside this crate) is the only consumer. Finalization is a
/// single optional hook.
#[derive(Debug, Clone, Copy)]
pub struct NativeHandle(pub u64);

/// The fixed object arena plus its mark-sweep collector, the string/symbol
/// interners, and the procedure/environment side tables every `func`,
/// `macro`, and `environment` cell indexes into.
pub struct Heap {
    arena: Vec<Cell>,
    free_list: Option<CellIdx>,
    used: usize,
    gc_stack: Vec<CellIdx>,

    strings: StringInterner,
    symbols: StringInterner,
    objects: ObjectTables,
    native_ptrs: Vec<NativeHandle>,

    nil_idx: CellIdx,
    true_idx: CellIdx,
    false_idx: CellIdx,

    /// Optional finalizer invoked on an unreachable `ptr` cell during sweep.
    pub on_finalize: Option<fn(NativeHandle)>,
}

/// Opaque mark returned by [`Heap::save_roots`], to be passed back to
/// [`Heap::restore_roots`].
pub type RootMark = usize;

impl Heap {
    /// Builds a heap whose arena holds `heap_bytes / size_of::<Cell>()`
    /// cells (rounded down, minimum 3: nil plus the two boolean sentinels).
    pub fn new(heap_bytes: usize) -> Self {
        let capacity = (heap_bytes / std::mem::size_of::<Cell>()).max(3);
        let mut arena = Vec::with_capacity(capacity);

        // Cell 0 is the unique `nil` sentinel; never placed on the free list.
        arena.push(Cell::nil());

        // Link the remaining cells into a free list, cell i -> cell i+1.
        for i in 1..capacity {
            let next = if i + 1 < capacity { (i + 1) as CellIdx } else { 0 };
            arena.push(Cell::free(next));
        }

        let mut heap = Heap {
            arena,
            free_list: if capacity > 1 { Some(1) } else { None },
            used: 1,
            gc_stack: Vec::new(),
            strings: StringInterner::new(),
            symbols: StringInterner::new(),
            objects: ObjectTables::new(),
            native_ptrs: Vec::new(),
            nil_idx: 0,
            true_idx: 0,
            false_idx: 0,
            on_finalize: None,
        };

        let true_idx = heap.make_object().expect("heap too small for sentinels");
        heap.arena[true_idx as usize] = Cell::boolean(true);
        let false_idx = heap.make_object().expect("heap too small for sentinels");
        heap.arena[false_idx as usize] = Cell::boolean(false);
        heap.true_idx = true_idx;
        heap.false_idx = false_idx;
        heap
    }

    pub fn nil(&self) -> CellIdx {
        self.nil_idx
    }

    pub fn true_cell(&self) -> CellIdx {
        self.true_idx
    }

    pub fn false_cell(&self) -> CellIdx {
        self.false_idx
    }

    pub fn make_bool(&self, value: bool) -> CellIdx {
        if value {
            self.true_idx
        } else {
            self.false_idx
        }
    }

    pub fn capacity(&self) -> usize {
        self.arena.len()
    }

    pub fn used(&self) -> usize {
        self.used
    }

    #[inline]
    pub fn get(&self, idx: CellIdx) -> Cell {
        self.arena[idx as usize]
    }

    #[inline]
    pub fn obj_type(&self, idx: CellIdx) -> ObjType {
        self.arena[idx as usize].obj_type()
    }

    pub fn is_nil(&self, idx: CellIdx) -> bool {
        idx == self.nil_idx || self.get(idx).is_nil()
    }

    // -- GC root stack -----------------------------------------------------

    pub fn push_root(&mut self, idx: CellIdx) {
        debug_assert!((idx as usize) < self.arena.len());
        self.gc_stack.push(idx);
    }

    pub fn save_roots(&self) -> RootMark {
        self.gc_stack.len()
    }

    pub fn restore_roots(&mut self, mark: RootMark) {
        self.gc_stack.truncate(mark);
    }

    // -- Allocation ----------------------------------------------------------

    /// Allocates a fresh `nil` cell, triggering a collection if the free
    /// list is empty, and pushes the result onto the GC root stack (it is
    /// the caller's job to fill in a real value and eventually pop/keep the
    /// root as appropriate).
    pub fn make_object(&mut self) -> Result<CellIdx> {
        if self.free_list.is_none() {
            self.collect();
        }
        let idx = self.free_list.ok_or(HeapError::OutOfMemory {
            used: self.used,
            capacity: self.arena.len(),
        })?;
        let next = self.arena[idx as usize].free_next();
        // Cell 0 is permanently `nil`, never free, so `next == 0` is an
        // unambiguous end-of-list sentinel.
        self.free_list = if next == 0 { None } else { Some(next) };
        self.used += 1;
        self.gc_stack.push(idx);
        Ok(idx)
    }

    pub fn alloc_cons(&mut self, car: CellIdx, cdr: CellIdx) -> Result<CellIdx> {
        let idx = self.make_object()?;
        self.arena[idx as usize] = Cell::pair(car, cdr);
        Ok(idx)
    }

    pub fn alloc_fixnum(&mut self, value: i32) -> Result<CellIdx> {
        let idx = self.make_object()?;
        self.arena[idx as usize] = Cell::fixnum(value);
        Ok(idx)
    }

    pub fn alloc_flonum(&mut self, value: f32) -> Result<CellIdx> {
        let idx = self.make_object()?;
        self.arena[idx as usize] = Cell::flonum(value);
        Ok(idx)
    }

    pub fn alloc_symbol(&mut self, name: &str) -> Result<CellIdx> {
        let id = self.symbols.intern(name);
        let idx = self.make_object()?;
        self.arena[idx as usize] = Cell::symbol(id);
        Ok(idx)
    }

    pub fn alloc_keyword(&mut self, name: &str) -> Result<CellIdx> {
        let id = self.symbols.intern(name);
        let idx = self.make_object()?;
        self.arena[idx as usize] = Cell::keyword(id);
        Ok(idx)
    }

    pub fn alloc_string(&mut self, value: &str) -> Result<CellIdx> {
        let id = self.strings.intern(value);
        let idx = self.make_object()?;
        self.arena[idx as usize] = Cell::string(id);
        Ok(idx)
    }

    pub fn alloc_prim(&mut self, opcode: u32) -> Result<CellIdx> {
        let idx = self.make_object()?;
        self.arena[idx as usize] = Cell::prim(opcode);
        Ok(idx)
    }

    /// Wraps an index into an embedder-owned native-function table (see
    /// `scmc-eval`'s cfunc registry) into a `cfunc` cell.
    pub fn alloc_cfunc(&mut self, index: u32) -> Result<CellIdx> {
        let idx = self.make_object()?;
        self.arena[idx as usize] = Cell::cfunc(index);
        Ok(idx)
    }

    /// Wraps an index into an embedder-owned FFI prototype table into a
    /// `ffi` cell.
    pub fn alloc_ffi(&mut self, index: u32) -> Result<CellIdx> {
        let idx = self.make_object()?;
        self.arena[idx as usize] = Cell::ffi(index);
        Ok(idx)
    }

    pub fn alloc_native_ptr(&mut self, handle: NativeHandle) -> Result<CellIdx> {
        let index = self.native_ptrs.len() as u32;
        self.native_ptrs.push(handle);
        let idx = self.make_object()?;
        self.arena[idx as usize] = Cell::ptr(index);
        Ok(idx)
    }

    pub fn native_ptr(&self, idx: CellIdx) -> Result<NativeHandle> {
        let index = self.get(idx).scalar();
        self.native_ptrs
            .get(index as usize)
            .copied()
            .ok_or(HeapError::UnknownNativePointer(index))
    }

    pub fn alloc_environment(&mut self, env: Environment) -> Result<CellIdx> {
        let env_id = self.objects.push_environment(env);
        let idx = self.make_object()?;
        self.arena[idx as usize] = Cell::environment(env_id.0);
        self.objects.environments[env_id].env_cell = idx;
        Ok(idx)
    }

    pub fn alloc_procedure(&mut self, proc: Procedure, is_macro: bool) -> Result<CellIdx> {
        let proc_id = self.objects.push_procedure(proc);
        let idx = self.make_object()?;
        self.arena[idx as usize] = if is_macro {
            Cell::macro_(proc_id.0)
        } else {
            Cell::func(proc_id.0)
        };
        Ok(idx)
    }

    pub fn alloc_error(&mut self, args: CellIdx, call_stack: CellIdx) -> Result<CellIdx> {
        let idx = self.make_object()?;
        self.arena[idx as usize] = Cell::error(args, call_stack);
        Ok(idx)
    }

    /// Mutates a pair cell's `car` in place, the way `setcar` does.
    pub fn set_car(&mut self, idx: CellIdx, new_car: CellIdx) -> Result<()> {
        let (_, cdr) = self.get(idx).pair_parts();
        self.arena[idx as usize] = Cell::pair(new_car, cdr);
        Ok(())
    }

    /// Mutates a pair cell's `cdr` in place, the way `setcdr` does.
    pub fn set_cdr(&mut self, idx: CellIdx, new_cdr: CellIdx) -> Result<()> {
        let (car, _) = self.get(idx).pair_parts();
        self.arena[idx as usize] = Cell::pair(car, new_cdr);
        Ok(())
    }

    // -- Side table access ---------------------------------------------------

    pub fn procedure(&self, idx: CellIdx) -> Result<&Procedure> {
        let proc_id = ProcId(self.get(idx).scalar());
        self.objects
            .procedures
            .get(proc_id)
            .ok_or(HeapError::UnknownProcedure(proc_id.0))
    }

    pub fn procedure_mut(&mut self, idx: CellIdx) -> Result<&mut Procedure> {
        let proc_id = ProcId(self.get(idx).scalar());
        self.objects
            .procedures
            .get_mut(proc_id)
            .ok_or(HeapError::UnknownProcedure(proc_id.0))
    }

    pub fn environment(&self, idx: CellIdx) -> Result<&Environment> {
        let env_id = EnvId(self.get(idx).scalar());
        self.objects
            .environments
            .get(env_id)
            .ok_or(HeapError::UnknownEnvironment(env_id.0))
    }

    pub fn environment_mut(&mut self, idx: CellIdx) -> Result<&mut Environment> {
        let env_id = EnvId(self.get(idx).scalar());
        self.objects
            .environments
            .get_mut(env_id)
            .ok_or(HeapError::UnknownEnvironment(env_id.0))
    }

    pub fn env_id_of(&self, idx: CellIdx) -> EnvId {
        EnvId(self.get(idx).scalar())
    }

    /// The arena index of `env_id`'s own cell, recorded by
    /// `alloc_environment` at creation time.
    pub fn env_cell_of(&self, env_id: EnvId) -> CellIdx {
        self.objects
            .environments
            .get(env_id)
            .map(|e| e.env_cell)
            .unwrap_or(self.nil_idx)
    }

    pub fn strings(&self) -> &StringInterner {
        &self.strings
    }

    pub fn strings_mut(&mut self) -> &mut StringInterner {
        &mut self.strings
    }

    pub fn symbols(&self) -> &StringInterner {
        &self.symbols
    }

    pub fn symbols_mut(&mut self) -> &mut StringInterner {
        &mut self.symbols
    }

    pub fn string_id_of(&self, idx: CellIdx) -> StringId {
        self.get(idx).scalar()
    }

    // -- Mark-sweep collection ------------------------------------------------

    /// Runs a full mark-sweep cycle. Strong roots are: the GC root stack,
    /// every interned string/symbol, and the bindings of every environment
    /// whose `gc_protect` flag is set.
    pub fn collect(&mut self) {
        let before = self.used;
        let mut work: Vec<CellIdx> = Vec::new();

        for idx in self.gc_stack.clone() {
            work.push(idx);
        }
        // Interned strings/symbols are addressed by id, not by cell, so
        // they have nothing further to mark through this worklist; what
        // needs protecting is any *cell* that refers to them, which is
        // already covered by whatever still holds a live reference.
        for (_, env) in self.objects.environments.iter_enumerated() {
            if env.gc_protect {
                for &v in env.bindings.values() {
                    work.push(v);
                }
                if let Some(parent) = env.parent {
                    work.push(self.env_cell_of(parent));
                }
            }
        }

        self.mark_all(work);

        let mut freed = 0usize;
        for i in 1..self.arena.len() {
            let cell = self.arena[i];
            if cell.obj_type() == ObjType::Free {
                continue;
            }
            if !cell.is_marked() {
                if cell.obj_type() == ObjType::Ptr {
                    if let Some(hook) = self.on_finalize {
                        if let Ok(handle) = self.native_ptr(i as CellIdx) {
                            hook(handle);
                        }
                    }
                }
                if cell.obj_type() == ObjType::Environment {
                    let env_id = EnvId(cell.scalar());
                    if let Some(env) = self.objects.environments.get_mut(env_id) {
                        env.parent = None;
                        env.bindings.clear();
                    }
                }
                let next = self.free_list.unwrap_or(0);
                self.arena[i] = Cell::free(next);
                self.free_list = Some(i as CellIdx);
                self.used -= 1;
                freed += 1;
            } else {
                let mut c = self.arena[i];
                c.set_marked(false);
                self.arena[i] = c;
            }
        }
        debug!(freed, before, after = self.used, "garbage collection cycle");
    }

    /// Iterative worklist mark, so long `car`/`cdr` chains and deep
    /// environment parent chains never risk a stack overflow.
    fn mark_all(&mut self, mut work: Vec<CellIdx>) {
        while let Some(idx) = work.pop() {
            if idx as usize >= self.arena.len() {
                continue;
            }
            let mut cell = self.arena[idx as usize];
            if cell.is_marked() {
                continue;
            }
            cell.set_marked(true);
            self.arena[idx as usize] = cell;

            match cell.obj_type() {
                ObjType::Pair => {
                    let (car, cdr) = cell.pair_parts();
                    work.push(car);
                    work.push(cdr);
                }
                ObjType::Error => {
                    let (args, call_stack) = cell.error_parts();
                    work.push(args);
                    work.push(call_stack);
                }
                ObjType::Func | ObjType::Macro => {
                    let proc_id = ProcId(cell.scalar());
                    if let Some(proc) = self.objects.procedures.get(proc_id) {
                        work.push(proc.params);
                        work.push(proc.body);
                        let env_cell = self.env_cell_of(proc.env);
                        work.push(env_cell);
                    }
                }
                ObjType::Environment => {
                    let env_id = EnvId(cell.scalar());
                    if let Some(env) = self.objects.environments.get(env_id) {
                        for &v in env.bindings.values() {
                            work.push(v);
                        }
                        if let Some(parent) = env.parent {
                            work.push(self.env_cell_of(parent));
                        }
                    }
                }
                _ => {
                    trace!(idx, ty = cell.obj_type().name(), "marked leaf cell");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_are_distinct_and_stable() {
        let heap = Heap::new(4096);
        assert!(heap.is_nil(heap.nil()));
        assert_ne!(heap.true_cell(), heap.false_cell());
        assert!(heap.get(heap.true_cell()).bool_value());
        assert!(!heap.get(heap.false_cell()).bool_value());
    }

    #[test]
    fn alloc_and_collect_reclaims_unrooted_cells() {
        let mut heap = Heap::new(4096);
        let mark = heap.save_roots();
        {
            let a = heap.alloc_fixnum(1).unwrap();
            let _b = heap.alloc_fixnum(2).unwrap();
            heap.restore_roots(mark);
            heap.push_root(a);
        }
        let used_before = heap.used();
        heap.collect();
        // `a` stays alive (rooted), `b` is reclaimed.
        assert!(heap.used() < used_before);
    }

    #[test]
    fn cons_cell_keeps_children_alive_through_gc() {
        let mut heap = Heap::new(4096);
        let mark = heap.save_roots();
        let car = heap.alloc_fixnum(10).unwrap();
        let cdr = heap.alloc_fixnum(20).unwrap();
        let pair = heap.alloc_cons(car, cdr).unwrap();
        heap.restore_roots(mark);
        heap.push_root(pair);

        heap.collect();

        let cell = heap.get(pair);
        let (c, d) = cell.pair_parts();
        assert_eq!(heap.get(c).fixnum_value(), 10);
        assert_eq!(heap.get(d).fixnum_value(), 20);
    }

    #[test]
    fn out_of_memory_reported_when_nothing_can_be_freed() {
        let mut heap = Heap::new(8 * std::mem::size_of::<Cell>());
        // `make_object` itself roots everything it returns, so filling the
        // arena without ever restoring the root stack leaves no slack for
        // `collect()` to reclaim.
        loop {
            match heap.alloc_fixnum(0) {
                Ok(_) => continue,
                Err(HeapError::OutOfMemory { .. }) => break,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert!(matches!(heap.alloc_fixnum(0), Err(HeapError::OutOfMemory { .. })));
    }

    #[test]
    fn gc_protect_false_lets_environment_be_reclaimed() {
        let mut heap = Heap::new(4096);
        let mark = heap.save_roots();
        let _env_cell = heap
            .alloc_environment(Environment {
                parent: None,
                bindings: Default::default(),
                gc_protect: false,
                env_cell: 0,
            })
            .unwrap();
        heap.restore_roots(mark);
        let used_before = heap.used();
        heap.collect();
        assert!(heap.used() < used_before);
    }
}
