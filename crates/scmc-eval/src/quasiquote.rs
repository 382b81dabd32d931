//! Quasiquotation expansion: rewrites a quasiquoted template into the
//! `cons`/`append`/`quote` calls that build it at eval time.

use scmc_heap::{CellIdx, Heap, ObjType};

use crate::error::{EvalError, Result};

pub fn expand(heap: &mut Heap, obj: CellIdx) -> Result<CellIdx> {
    if heap.obj_type(obj) != ObjType::Pair {
        return quote(heap, obj);
    }
    let (head, rest) = heap.get(obj).pair_parts();

    if is_symbol_named(heap, head, "unquote-splicing") {
        return Err(EvalError::UnquoteSplicingOutsideQuasiquote);
    }
    if is_symbol_named(heap, head, "unquote") {
        return Ok(heap.get(rest).pair_parts().0);
    }

    if heap.obj_type(head) == ObjType::Pair {
        let (head_head, head_rest) = heap.get(head).pair_parts();
        if is_symbol_named(heap, head_head, "unquote-splicing") {
            let spliced = heap.get(head_rest).pair_parts().0;
            let append_sym = heap.alloc_symbol("append")?;
            let tail = expand(heap, rest)?;
            return make_list3(heap, append_sym, spliced, tail);
        }
    }

    let cons_sym = heap.alloc_symbol("cons")?;
    let car_expansion = expand(heap, head)?;
    let cdr_expansion = expand(heap, rest)?;
    make_list3(heap, cons_sym, car_expansion, cdr_expansion)
}

fn quote(heap: &mut Heap, obj: CellIdx) -> Result<CellIdx> {
    let quote_sym = heap.alloc_symbol("quote")?;
    let tail = heap.alloc_cons(obj, heap.nil())?;
    Ok(heap.alloc_cons(quote_sym, tail)?)
}

fn make_list3(heap: &mut Heap, a: CellIdx, b: CellIdx, c: CellIdx) -> Result<CellIdx> {
    let tail2 = heap.alloc_cons(c, heap.nil())?;
    let tail1 = heap.alloc_cons(b, tail2)?;
    Ok(heap.alloc_cons(a, tail1)?)
}

fn is_symbol_named(heap: &Heap, idx: CellIdx, name: &str) -> bool {
    heap.obj_type(idx) == ObjType::Symbol && heap.symbols().lookup(heap.string_id_of(idx)) == Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scmc_reader::{read, Cursor};

    fn read_one(heap: &mut Heap, src: &str) -> CellIdx {
        let mut cursor = Cursor::new(src);
        read(heap, &mut cursor).unwrap()
    }

    #[test]
    fn non_pair_expands_to_quote() {
        let mut heap = Heap::new(8192);
        let n = heap.alloc_fixnum(5).unwrap();
        let expanded = expand(&mut heap, n).unwrap();
        assert_eq!(scmc_heap::to_string(&heap, expanded, false), "(quote 5)");
    }

    #[test]
    fn unquote_unwraps_directly() {
        let mut heap = Heap::new(8192);
        let tmpl = read_one(&mut heap, "(unquote x)");
        let expanded = expand(&mut heap, tmpl).unwrap();
        assert_eq!(scmc_heap::to_string(&heap, expanded, false), "x");
    }

    #[test]
    fn plain_list_expands_to_cons_chain() {
        let mut heap = Heap::new(8192);
        let tmpl = read_one(&mut heap, "(1 2)");
        let expanded = expand(&mut heap, tmpl).unwrap();
        assert_eq!(
            scmc_heap::to_string(&heap, expanded, false),
            "(cons (quote 1) (cons (quote 2) (quote nil)))"
        );
    }

    #[test]
    fn unquote_splicing_head_expands_to_append() {
        let mut heap = Heap::new(8192);
        let tmpl = read_one(&mut heap, "((unquote-splicing xs) 5)");
        let expanded = expand(&mut heap, tmpl).unwrap();
        assert_eq!(
            scmc_heap::to_string(&heap, expanded, false),
            "(append xs (cons (quote 5) (quote nil)))"
        );
    }
}
