//! Compile-time-to-bytecode pipeline: lowers parsed Scheme forms into
//! scmc-ir and assigns physical registers.

pub mod error;
pub mod liveness;
pub mod linear_scan;
pub mod lower;
pub mod regpool;

pub use error::{CompileError, Result};
pub use liveness::{find_liveness, Interval};
pub use linear_scan::allocate;
pub use lower::{CompileCtx, CompileOutput, Compiler};
pub use regpool::RegPool;

use scmc_heap::{CellIdx, Heap};
use scmc_ir::Function;

/// Compiles a sequence of top-level forms into a single program-wide
/// [`Function`] and its constant pool, the way the original compiler's
/// driver loop feeds one read form after another into `compile()`
/// before handing the result to `assemble`.
pub fn compile_program(heap: &mut Heap, forms: &[CellIdx], env: CellIdx) -> Result<(Function, Vec<CellIdx>)> {
    let mut compiler = Compiler::new("program");
    compiler.compile_program(heap, forms, env)?;
    let constants = compiler.constants.clone();
    Ok((compiler.finish(), constants))
}
