use thiserror::Error;

/// Errors the embedding API can return, distinguishing which pipeline
/// stage raised them without flattening everything into one string.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Heap(#[from] scmc_heap::HeapError),

    #[error(transparent)]
    Read(#[from] scmc_reader::ReadError),

    #[error(transparent)]
    Eval(#[from] scmc_eval::EvalError),

    #[error(transparent)]
    Compile(#[from] scmc_compiler::CompileError),

    #[error(transparent)]
    Vm(#[from] scmc_vm::VmError),

    #[error("source contained no top-level form to run")]
    EmptyProgram,
}

pub type Result<T> = std::result::Result<T, DriverError>;
