//! Intermediate representation and control-flow graph: basic blocks of
//! flat, opcode-tagged instructions addressing a small machine register
//! file, plus the virtual-variable bookkeeping the register allocator
//! (scmc-compiler) consumes.

pub mod block;
pub mod cfg;
pub mod function;
pub mod instr;
pub mod opcode;
pub mod operand;
pub mod register;
pub mod vvar;

pub use block::{BasicBlock, BlockId, BlockKind};
pub use cfg::derive_edges;
pub use function::{Builder, Function};
pub use instr::{InstrId, Instruction};
pub use opcode::Opcode;
pub use operand::{Encoding, Operand};
pub use register::{Register, GP_REGISTER_COUNT};
pub use vvar::{Access, AccessKind, LiveRange, VarId, Version, VirtualVar};
