use thiserror::Error;

#[derive(Debug, Error)]
pub enum VmError {
    #[error("encoder could not resolve label {0:?} to a block")]
    UnresolvedLabel(String),

    #[error("instruction immediate {0} does not fit the encoded word")]
    ImmediateOverflow(i64),

    #[error("register {0:?} is not valid for this opcode's operand")]
    InvalidRegister(scmc_ir::Register),

    #[error("'{0}' is not yet implemented by the virtual machine")]
    Unimplemented(&'static str),

    #[error("operand {0:?} cannot be resolved to an immediate value")]
    BadOperand(scmc_ir::Operand),

    #[error("data stack underflow")]
    StackUnderflow,

    #[error("constant pool has no entry {0}")]
    UnknownConstant(i64),

    #[error("program counter {0} is out of bounds of the code area")]
    PcOutOfBounds(u64),

    #[error(transparent)]
    Heap(#[from] scmc_heap::HeapError),

    #[error(transparent)]
    Eval(#[from] scmc_eval::EvalError),
}

pub type Result<T> = std::result::Result<T, VmError>;
