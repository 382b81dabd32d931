//! FFI prototype/overload resolution.
//!
//! Two phases: first the actual arguments are scanned into a
//! `(class, width)` signature, then that signature is matched against each
//! overload's declared parameter classes in order.

use scmc_heap::{CellIdx, Heap, ObjType};

use crate::error::{EvalError, Result};

/// The class an FFI parameter/return value marshals as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamClass {
    Int,
    Float,
    Ptr,
    Str,
    Bool,
    List,
    Object,
    Context,
}

/// One callable signature of an FFI prototype.
pub struct Overload {
    pub params: Vec<ParamClass>,
    pub ret: ParamClass,
    pub call: NativeFfiFn,
}

/// A named, possibly-overloaded host function reachable from a `ffi` cell.
pub struct Prototype {
    pub name: String,
    pub overloads: Vec<Overload>,
}

/// A resolved native FFI implementation: receives already-marshalled
/// argument cells and produces a result cell.
pub type NativeFfiFn = fn(&mut Heap, &[CellIdx]) -> Result<CellIdx>;

/// Scans already-evaluated actual arguments into a signature of parameter
/// classes, the way `make_ffi_signature` builds its `(type, width)` byte
/// pairs before overload matching.
pub fn signature_of(heap: &Heap, args: &[CellIdx]) -> Vec<ParamClass> {
    args.iter().map(|&a| class_of(heap, a)).collect()
}

fn class_of(heap: &Heap, idx: CellIdx) -> ParamClass {
    match heap.obj_type(idx) {
        ObjType::Nil | ObjType::Ptr => ParamClass::Ptr,
        ObjType::Pair => ParamClass::List,
        ObjType::Fixnum => ParamClass::Int,
        ObjType::Flonum => ParamClass::Float,
        ObjType::Symbol | ObjType::String | ObjType::Keyword => ParamClass::Str,
        ObjType::Boolean => ParamClass::Bool,
        _ => ParamClass::Object,
    }
}

/// Selects the first overload whose parameter classes accept `signature`,
/// coercing `Int`/`Float` into one another (matching the original's
/// `to_flonum`/`to_fixnum` argument coercions) but nothing else.
pub fn resolve<'a>(proto: &'a Prototype, signature: &[ParamClass]) -> Result<&'a Overload> {
    proto
        .overloads
        .iter()
        .find(|ol| {
            ol.params.len() == signature.len()
                && ol.params.iter().zip(signature).all(|(want, got)| accepts(*want, *got))
        })
        .ok_or_else(|| EvalError::FfiNoMatchingOverload { name: proto.name.clone() })
}

fn accepts(want: ParamClass, got: ParamClass) -> bool {
    use ParamClass::*;
    match (want, got) {
        (Int, Float) | (Float, Int) => true,
        (Context, _) => true,
        (a, b) => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_call(_: &mut Heap, _: &[CellIdx]) -> Result<CellIdx> {
        unreachable!("not invoked in these tests")
    }

    #[test]
    fn resolve_picks_matching_arity_and_classes() {
        let proto = Prototype {
            name: "add2".into(),
            overloads: vec![
                Overload { params: vec![ParamClass::Int, ParamClass::Int], ret: ParamClass::Int, call: noop_call },
                Overload {
                    params: vec![ParamClass::Float, ParamClass::Float],
                    ret: ParamClass::Float,
                    call: noop_call,
                },
            ],
        };
        let sig = vec![ParamClass::Int, ParamClass::Float];
        // Int/Float coerce into each other, so the first overload still matches.
        assert!(resolve(&proto, &sig).is_ok());
    }

    #[test]
    fn resolve_fails_when_no_overload_fits() {
        let proto = Prototype {
            name: "strlen".into(),
            overloads: vec![Overload { params: vec![ParamClass::Str], ret: ParamClass::Int, call: noop_call }],
        };
        let sig = vec![ParamClass::List];
        assert!(resolve(&proto, &sig).is_err());
    }
}
