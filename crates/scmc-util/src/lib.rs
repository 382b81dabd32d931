//! scmc-util - shared index and collection helpers.
//!
//! Every pipeline stage (reader, evaluator, IR, compiler, VM) needs to
//! address its own arena of objects — cells, basic blocks, instructions,
//! virtual variables, register intervals — by a small integer id. This
//! crate provides the one generic piece shared across all of them:
//! [`Idx`] plus [`IndexVec`], a `Vec<T>` that can only be indexed by its own
//! id type, so a `BlockId` can never be used to index a `Vec` of
//! instructions by mistake.

mod index_vec;

pub use index_vec::{Idx, IndexVec};

/// Defines a newtype wrapping `u32` and implements [`Idx`] for it.
#[macro_export]
macro_rules! define_idx {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u32);

        impl $crate::Idx for $name {
            fn from_usize(idx: usize) -> Self {
                assert!(idx <= u32::MAX as usize, "{} index overflow", stringify!($name));
                $name(idx as u32)
            }

            fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}
