//! Embedding API: wires the reader, evaluator, compiler, and VM crates
//! together behind a single `Context` a host program owns for the
//! lifetime of one session.

pub mod error;

pub use error::{DriverError, Result};

use tracing::debug;

use scmc_compiler::compile_program;
use scmc_eval::{Evaluator, NativeFn, Prototype};
use scmc_heap::{CellIdx, Heap};
use scmc_reader::{read, Cursor};
use scmc_vm::{assemble, Vm};

/// Hook invoked with every error an `eval`/`run` call raises before it is
/// returned to the caller, the way the original's single installable
/// error hook observes unwinding without intercepting it.
pub type ErrorHook = Box<dyn FnMut(&DriverError)>;

/// Owns the object heap, the tree-walking evaluator, and the global
/// environment for one embedding session. `scmc_heap::Heap` is
/// `!Send`/`!Sync` by construction (raw indices into a private arena),
/// and so is this — there is nothing here to lock, matching the
/// single-threaded cooperative model.
pub struct Context {
    heap: Heap,
    evaluator: Evaluator,
    global_env: CellIdx,
    error_hook: Option<ErrorHook>,
}

impl Context {
    /// Initializes a context over a heap of `heap_bytes` bytes, the
    /// concrete form of "host initializes a context over a
    /// caller-provided memory region of byte size S" — Rust has no raw
    /// caller-owned arena without `unsafe` ownership games, so the
    /// region is a `Vec<Cell>` the context allocates and owns internally.
    pub fn new(heap_bytes: usize) -> Result<Self> {
        let mut heap = Heap::new(heap_bytes);
        let mut evaluator = Evaluator::new();
        let global_env = scmc_eval::make(&mut heap, heap.nil(), true)?;
        // The root environment's own cell has no incoming reference once
        // its `gc_protect` bindings are marked, so it must sit on the GC
        // root stack permanently or `collect_garbage` would sweep it.
        heap.push_root(global_env);
        evaluator.install_primitives(&mut heap, global_env)?;
        debug!(heap_bytes, "context initialized");
        Ok(Self { heap, evaluator, global_env, error_hook: None })
    }

    /// Installs the hook the embedder's errors unwind through. Only one
    /// hook is active at a time, matching "a single installable hook".
    pub fn set_error_hook(&mut self, hook: ErrorHook) {
        self.error_hook = Some(hook);
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    pub fn global_env(&self) -> CellIdx {
        self.global_env
    }

    /// Reads every top-level form out of `source`, leaving none of it
    /// evaluated.
    pub fn read_all(&mut self, source: &str) -> Result<Vec<CellIdx>> {
        let mut cursor = Cursor::new(source);
        let mut forms = Vec::new();
        loop {
            cursor.skip_whitespace_and_comments();
            if cursor.is_eof() {
                break;
            }
            forms.push(read(&mut self.heap, &mut cursor)?);
        }
        Ok(forms)
    }

    /// Reads and tree-walk evaluates every top-level form in `source`
    /// against the global environment, returning the last form's value.
    pub fn eval_source(&mut self, source: &str) -> Result<CellIdx> {
        let forms = self.read_all(source)?;
        self.eval_forms(&forms)
    }

    /// Tree-walk evaluates `forms` in order against the global
    /// environment, returning the last one's value.
    pub fn eval_forms(&mut self, forms: &[CellIdx]) -> Result<CellIdx> {
        let mut result = self.heap.nil();
        for &form in forms {
            result = self.run_hooked(|ctx| Ok(ctx.evaluator.eval(&mut ctx.heap, form, ctx.global_env)?))?;
        }
        if forms.is_empty() {
            return Err(DriverError::EmptyProgram);
        }
        Ok(result)
    }

    /// Reads, compiles, assembles, and executes `source` on the VM,
    /// returning the value the compiled program's return register (R0)
    /// holds on halt.
    pub fn compile_and_run(&mut self, source: &str) -> Result<CellIdx> {
        let forms = self.read_all(source)?;
        if forms.is_empty() {
            return Err(DriverError::EmptyProgram);
        }
        let env = self.global_env;
        let (func, constants) = compile_program(&mut self.heap, &forms, env)?;
        let words = assemble(&func)?;
        let result = self.run_hooked(|ctx| {
            let mut vm = Vm::new(&mut ctx.heap, &mut ctx.evaluator, words, constants, env);
            vm.run()?;
            Ok(vm.gpr(0))
        })?;
        Ok(result)
    }

    /// Reads and compiles `source` into an assembled word stream without
    /// running it, the way `scmt disasm` needs to print the instruction
    /// stream a `run` would otherwise execute.
    pub fn assemble_source(&mut self, source: &str) -> Result<Vec<u64>> {
        let forms = self.read_all(source)?;
        if forms.is_empty() {
            return Err(DriverError::EmptyProgram);
        }
        let env = self.global_env;
        let (func, _constants) = compile_program(&mut self.heap, &forms, env)?;
        Ok(assemble(&func)?)
    }

    /// Installs a native function as a `cfunc` cell bound to `name` in
    /// the global environment.
    pub fn install_cfunc(&mut self, name: &str, f: NativeFn) -> Result<CellIdx> {
        let cell = self.evaluator.install_cfunc(&mut self.heap, f)?;
        let sym = self.heap.alloc_symbol(name)?;
        scmc_eval::set(&mut self.heap, sym, cell, self.global_env)?;
        Ok(cell)
    }

    /// Installs a native function as an `ffi` cell bound to `name`,
    /// resolved through `scmc-eval`'s overload-matching dispatch.
    pub fn install_ffi(&mut self, name: &str, proto: Prototype) -> Result<CellIdx> {
        let cell = self.evaluator.install_ffi(&mut self.heap, proto)?;
        let sym = self.heap.alloc_symbol(name)?;
        scmc_eval::set(&mut self.heap, sym, cell, self.global_env)?;
        Ok(cell)
    }

    /// Triggers a mark-sweep collection cycle immediately.
    pub fn collect_garbage(&mut self) {
        self.heap.collect();
    }

    fn run_hooked<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        match f(self) {
            Ok(v) => Ok(v),
            Err(e) => {
                if let Some(hook) = self.error_hook.as_mut() {
                    hook(&e);
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eval_source_returns_last_forms_value() {
        let mut ctx = Context::new(1 << 16).unwrap();
        let result = ctx.eval_source("(+ 1 2 3)").unwrap();
        assert_eq!(ctx.heap().get(result).flonum_value(), 6.0);
    }

    #[test]
    fn compile_and_run_executes_a_compiled_procedure() {
        let mut ctx = Context::new(1 << 16).unwrap();
        let result = ctx.compile_and_run("(let sq (fn (x) (* x x))) (sq 7)").unwrap();
        assert_eq!(ctx.heap().get(result).flonum_value(), 49.0);
    }

    #[test]
    fn error_hook_observes_failures_without_swallowing_them() {
        let mut ctx = Context::new(1 << 16).unwrap();
        let seen = std::rc::Rc::new(std::cell::RefCell::new(false));
        let seen_clone = seen.clone();
        ctx.set_error_hook(Box::new(move |_| *seen_clone.borrow_mut() = true));
        let result = ctx.eval_source("(+)");
        assert!(result.is_err());
        assert!(*seen.borrow());
    }

    #[test]
    fn assemble_source_produces_a_nonempty_word_stream() {
        let mut ctx = Context::new(1 << 16).unwrap();
        let words = ctx.assemble_source("(+ 1 2)").unwrap();
        assert!(!words.is_empty());
    }

    #[test]
    fn empty_program_is_rejected_by_compile_and_run() {
        let mut ctx = Context::new(1 << 16).unwrap();
        assert!(matches!(ctx.compile_and_run(""), Err(DriverError::EmptyProgram)));
    }
}
