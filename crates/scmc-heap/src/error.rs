use thiserror::Error;

#[derive(Debug, Error)]
pub enum HeapError {
    #[error("out of memory: heap exhausted after garbage collection ({used}/{capacity} cells live)")]
    OutOfMemory { used: usize, capacity: usize },

    #[error("cell index {0} is outside the arena")]
    InvalidCellIndex(u32),

    #[error("environment index {0} does not exist")]
    UnknownEnvironment(u32),

    #[error("procedure index {0} does not exist")]
    UnknownProcedure(u32),

    #[error("native pointer index {0} does not exist")]
    UnknownNativePointer(u32),

    #[error("string id {0} is not interned")]
    UnknownStringId(u32),
}

pub type Result<T> = std::result::Result<T, HeapError>;
