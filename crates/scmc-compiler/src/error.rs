use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("register pressure: no free register and spill is not yet implemented")]
    RegisterPressure,

    #[error("'{form}' is not yet lowered by the compiler")]
    Unsupported { form: &'static str },

    #[error(transparent)]
    Heap(#[from] scmc_heap::HeapError),

    #[error(transparent)]
    Eval(#[from] scmc_eval::EvalError),
}

pub type Result<T> = std::result::Result<T, CompileError>;
