//! `to_string`/`write` rendering for cells, and the structural `equal?`
//! helper both the evaluator and the printer rely on.

use std::fmt::Write as _;

use crate::cell::{CellIdx, ObjType};
use crate::heap::Heap;

/// Renders `idx` the way the REPL and `(display ...)`/error messages do.
/// Strings print unquoted; pass `quote = true` from a context (e.g. inside
/// a quoted list) where `"..."` delimiters are wanted instead.
pub fn to_string(heap: &Heap, idx: CellIdx, quote: bool) -> String {
    let mut out = String::new();
    write_cell(heap, idx, quote, &mut out);
    out
}

fn write_cell(heap: &Heap, idx: CellIdx, quote: bool, out: &mut String) {
    match heap.obj_type(idx) {
        ObjType::Nil => out.push_str("nil"),
        ObjType::Pair | ObjType::Func | ObjType::Macro => {
            out.push('(');
            let mut p = idx;
            loop {
                let cell = heap.get(p);
                if cell.obj_type() != ObjType::Pair {
                    break;
                }
                let (car, cdr) = cell.pair_parts();
                write_cell(heap, car, true, out);
                p = cdr;
                if heap.obj_type(p) != ObjType::Pair {
                    break;
                }
                out.push(' ');
            }
            if !heap.is_nil(p) {
                out.push_str(" . ");
                write_cell(heap, p, true, out);
            }
            out.push(')');
        }
        ObjType::Fixnum => {
            let _ = write!(out, "{}", heap.get(idx).fixnum_value());
        }
        ObjType::Flonum => {
            let _ = write!(out, "{}", heap.get(idx).flonum_value());
        }
        ObjType::Keyword => {
            out.push_str("#:");
            let id = heap.string_id_of(idx);
            out.push_str(heap.symbols().lookup(id).unwrap_or("?"));
        }
        ObjType::Symbol => {
            let id = heap.string_id_of(idx);
            out.push_str(heap.symbols().lookup(id).unwrap_or("?"));
        }
        ObjType::String => {
            let id = heap.string_id_of(idx);
            let s = heap.strings().lookup(id).unwrap_or("");
            if quote {
                out.push('"');
                out.push_str(s);
                out.push('"');
            } else {
                out.push_str(s);
            }
        }
        ObjType::Boolean => {
            out.push_str(if heap.get(idx).bool_value() { "#t" } else { "#f" });
        }
        ObjType::Error => {
            let (args, call_stack) = heap.get(idx).error_parts();
            out.push_str("error: ");
            write_cell(heap, args, false, out);
            let mut cs = call_stack;
            while !heap.is_nil(cs) {
                let cell = heap.get(cs);
                if cell.obj_type() != ObjType::Pair {
                    break;
                }
                let (car, cdr) = cell.pair_parts();
                out.push_str("\n=> ");
                write_cell(heap, car, true, out);
                cs = cdr;
            }
        }
        ObjType::Environment => {
            let _ = write!(out, "[environment {}]", heap.string_id_of(idx));
        }
        other => {
            let _ = write!(out, "[{} {}]", other.name(), idx);
        }
    }
}

/// Structural equality: numbers compare by value (with a small epsilon for
/// flonums), strings/symbols/keywords by interned content, pairs
/// element-wise, everything else falls back to cell identity.
pub fn equal(heap: &Heap, a: CellIdx, b: CellIdx) -> bool {
    if a == b {
        return true;
    }
    let ca = heap.get(a);
    let cb = heap.get(b);
    if ca.obj_type() != cb.obj_type() {
        return false;
    }
    match ca.obj_type() {
        ObjType::Fixnum => ca.fixnum_value() == cb.fixnum_value(),
        ObjType::Flonum => {
            let x = ca.flonum_value().abs();
            let y = cb.flonum_value().abs();
            let largest = x.max(y);
            (x - y).abs() <= largest * f32::EPSILON
        }
        ObjType::Boolean => ca.bool_value() == cb.bool_value(),
        ObjType::String | ObjType::Symbol | ObjType::Keyword => {
            let interner = if ca.obj_type() == ObjType::String {
                heap.strings()
            } else {
                heap.symbols()
            };
            interner.lookup(heap.string_id_of(a)) == interner.lookup(heap.string_id_of(b))
        }
        ObjType::Nil => true,
        ObjType::Pair => {
            let (car_a, cdr_a) = ca.pair_parts();
            let (car_b, cdr_b) = cb.pair_parts();
            equal(heap, car_a, car_b) && equal(heap, cdr_a, cdr_b)
        }
        _ => false,
    }
}

/// `is`: identity for every type except pairs/strings, which fall back to
/// structural comparison the way the reader's deduplicated atoms make
/// identity and equality coincide for everything else.
pub fn is(heap: &Heap, a: CellIdx, b: CellIdx) -> bool {
    if a == b {
        return true;
    }
    match heap.obj_type(a) {
        ObjType::Pair | ObjType::String => equal(heap, a, b),
        ObjType::Fixnum | ObjType::Flonum => equal(heap, a, b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::Heap;

    #[test]
    fn prints_nested_list() {
        let mut heap = Heap::new(4096);
        let three = heap.alloc_fixnum(3).unwrap();
        let inner = heap.alloc_cons(three, heap.nil()).unwrap();
        let two = heap.alloc_fixnum(2).unwrap();
        let pair = heap.alloc_cons(two, inner).unwrap();
        assert_eq!(to_string(&heap, pair, false), "(2 3)");
    }

    #[test]
    fn prints_dotted_pair() {
        let mut heap = Heap::new(4096);
        let a = heap.alloc_fixnum(1).unwrap();
        let b = heap.alloc_fixnum(2).unwrap();
        let pair = heap.alloc_cons(a, b).unwrap();
        assert_eq!(to_string(&heap, pair, false), "(1 . 2)");
    }

    #[test]
    fn equal_compares_lists_structurally() {
        let mut heap = Heap::new(4096);
        let a1 = heap.alloc_fixnum(1).unwrap();
        let a2 = heap.alloc_fixnum(2).unwrap();
        let list_a = heap.alloc_cons(a1, heap.alloc_cons(a2, heap.nil()).unwrap()).unwrap();
        let b1 = heap.alloc_fixnum(1).unwrap();
        let b2 = heap.alloc_fixnum(2).unwrap();
        let list_b = heap.alloc_cons(b1, heap.alloc_cons(b2, heap.nil()).unwrap()).unwrap();
        assert!(equal(&heap, list_a, list_b));
        assert!(is(&heap, list_a, list_b));
    }

    #[test]
    fn equal_strings_are_is_equal_too() {
        let mut heap = Heap::new(4096);
        let s1 = heap.alloc_string("hi").unwrap();
        let s2 = heap.alloc_string("hi").unwrap();
        assert!(equal(&heap, s1, s2));
        assert!(is(&heap, s1, s2));
    }
}
