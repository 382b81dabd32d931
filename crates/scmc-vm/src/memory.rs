//! The VM-native memory areas (spec §4.9's four areas). `heap` is realized
//! by delegating straight to the shared [`scmc_heap::Heap`] the compiler
//! and evaluator also share, so only `code`, `data`, and `locals` are
//! genuine arrays here.

use crate::error::{Result, VmError};

/// The assembled instruction stream `Pc` walks.
#[derive(Debug, Default)]
pub struct Code {
    pub words: Vec<u64>,
}

impl Code {
    pub fn fetch(&self, pc: u64) -> Result<u64> {
        self.words.get(pc as usize).copied().ok_or(VmError::PcOutOfBounds(pc))
    }
}

/// A downward-growing LIFO area (spec §4.9's `aux = -word-size` areas):
/// `Dp` for argument/operand marshalling, `Sp` for the call/locals frame
/// stack. Modeled as a plain growable stack rather than fixed-size
/// pointer arithmetic since nothing in this spec inspects raw addresses
/// into these areas.
#[derive(Debug, Default)]
pub struct Stack {
    values: Vec<u64>,
}

impl Stack {
    pub fn push(&mut self, value: u64) {
        self.values.push(value);
    }

    pub fn pop(&mut self) -> Result<u64> {
        self.values.pop().ok_or(VmError::StackUnderflow)
    }

    pub fn depth(&self) -> u64 {
        self.values.len() as u64
    }

    /// Drops entries down to `len`, the way `leave()`'s `move fp, sp`
    /// discards a callee's locals by resetting the stack pointer rather
    /// than popping them one at a time. A `len` at or above the current
    /// depth is a no-op.
    pub fn truncate_to(&mut self, len: usize) {
        self.values.truncate(len);
    }
}
