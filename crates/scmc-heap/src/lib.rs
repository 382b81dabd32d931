//! scmc-heap — the tagged object arena, mark-sweep collector, string/symbol
//! interners, and procedure/environment side tables shared by every other
//! crate in the pipeline.

mod cell;
mod error;
mod heap;
mod intern;
mod object;
mod printer;

pub use cell::{Cell, CellIdx, ObjType};
pub use error::{HeapError, Result};
pub use heap::{Heap, NativeHandle, RootMark};
pub use intern::{InternerStats, StringId, StringInterner};
pub use object::{EnvId, Environment, ObjectTables, ProcId, Procedure};
pub use printer::{equal, is, to_string};
