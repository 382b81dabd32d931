mod env;
mod error;
mod eval;
mod ffi;
mod primitives;
mod quasiquote;

pub use env::{bind_params, get, make, set};
pub use error::{EvalError, Result};
pub use eval::{Evaluator, NativeFn};
pub use ffi::{resolve, signature_of, NativeFfiFn, Overload, ParamClass, Prototype};
pub use primitives::{Prim, TABLE};
pub use quasiquote::expand as expand_quasiquote;
