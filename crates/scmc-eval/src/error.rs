use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("expected {expected}, got {got}")]
    TypeMismatch { expected: &'static str, got: &'static str },

    #[error("too few arguments to {form}")]
    ArityError { form: &'static str },

    #[error("tried to call a non-callable value of type {0}")]
    NotCallable(&'static str),

    #[error("unquote is not valid outside quasiquote")]
    UnquoteOutsideQuasiquote,

    #[error("unquote-splicing is not valid outside a quasiquoted list")]
    UnquoteSplicingOutsideQuasiquote,

    #[error("ffi: no matching overload for '{name}'")]
    FfiNoMatchingOverload { name: String },

    #[error("ffi: cannot convert argument {index} of '{name}'")]
    FfiInvalidConversion { name: String, index: usize },

    #[error("{0}")]
    UserError(String),

    #[error(transparent)]
    Heap(#[from] scmc_heap::HeapError),
}

pub type Result<T> = std::result::Result<T, EvalError>;
