//! The tree-walking evaluator: `eval(expr, env) -> value`.
//!
//! Function application trampolines through the outer `loop` in
//! [`Evaluator::eval_loop`] instead of recursing, so a tail call never grows
//! the Rust call stack. Every other sub-evaluation (operands, `if`
//! conditions, loop bodies) goes through [`Evaluator::eval`], which owns its
//! own GC-root and call-trace bookkeeping.

use scmc_heap::{CellIdx, Heap, ObjType, Procedure};

use crate::env;
use crate::error::{EvalError, Result};
use crate::ffi::{self, Prototype};
use crate::primitives::Prim;
use crate::quasiquote;

/// A host function reachable from a `cfunc` cell. Receives the already
/// evaluated argument list as a scheme list, mirroring the original's
/// `cfunc` call convention.
pub type NativeFn = fn(&mut Heap, CellIdx) -> Result<CellIdx>;

/// Evaluator state that must survive across calls: the installed native
/// function/FFI-prototype tables, and the call trace used to build an
/// error's stack snapshot.
#[derive(Default)]
pub struct Evaluator {
    cfuncs: Vec<NativeFn>,
    ffi_protos: Vec<Prototype>,
    call_trace: Vec<CellIdx>,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `f` and returns a fresh `cfunc` cell bound to it.
    pub fn install_cfunc(&mut self, heap: &mut Heap, f: NativeFn) -> Result<CellIdx> {
        let index = self.cfuncs.len() as u32;
        self.cfuncs.push(f);
        Ok(heap.alloc_cfunc(index)?)
    }

    /// Registers `proto` and returns a fresh `ffi` cell bound to it.
    pub fn install_ffi(&mut self, heap: &mut Heap, proto: Prototype) -> Result<CellIdx> {
        let index = self.ffi_protos.len() as u32;
        self.ffi_protos.push(proto);
        Ok(heap.alloc_ffi(index)?)
    }

    /// Installs every entry of [`crate::primitives::TABLE`] as a binding in
    /// `env`, the way the original seeds its root environment at startup.
    pub fn install_primitives(&mut self, heap: &mut Heap, env: CellIdx) -> Result<()> {
        for &(name, prim) in crate::primitives::TABLE {
            let sym = heap.alloc_symbol(name)?;
            let cell = heap.alloc_prim(prim.opcode())?;
            crate::env::set(heap, sym, cell, env)?;
        }
        Ok(())
    }

    /// Evaluates `expr` in `env`, returning its value. This is the
    /// recursion boundary: it owns a GC root mark and a call-trace mark, so
    /// every allocation made while evaluating `expr` (however deep the
    /// trampoline inside it runs) is reclaimed down to just the result once
    /// this call returns.
    pub fn eval(&mut self, heap: &mut Heap, expr: CellIdx, env: CellIdx) -> Result<CellIdx> {
        let root_mark = heap.save_roots();
        let trace_mark = self.call_trace.len();
        let result = self.eval_loop(heap, expr, env);
        self.call_trace.truncate(trace_mark);
        match result {
            Ok(value) => {
                heap.restore_roots(root_mark);
                heap.push_root(value);
                Ok(value)
            }
            Err(e) => {
                heap.restore_roots(root_mark);
                Err(e)
            }
        }
    }

    fn eval_loop(&mut self, heap: &mut Heap, mut expr: CellIdx, mut env: CellIdx) -> Result<CellIdx> {
        let mut iter_mark = heap.save_roots();
        loop {
            // Bound root-stack growth across trampoline iterations: drop
            // everything the previous iteration allocated except the
            // `expr`/`env` we are about to evaluate (whatever they still
            // reach stays alive through the environment's own bindings).
            heap.restore_roots(iter_mark);
            heap.push_root(expr);
            heap.push_root(env);
            iter_mark = heap.save_roots();

            if heap.obj_type(expr) != ObjType::Pair {
                return self.eval_atom(heap, expr, env);
            }
            let (head, args) = heap.get(expr).pair_parts();
            let head_val = self.eval(heap, head, env)?;

            match heap.obj_type(head_val) {
                ObjType::Prim => {
                    let prim = Prim::from_opcode(heap.get(head_val).scalar())
                        .expect("prim cell carries a valid opcode");
                    match self.eval_prim(heap, prim, args, env)? {
                        Step::Done(value) => return Ok(value),
                        Step::Tail { expr: e, env: v } => {
                            expr = e;
                            env = v;
                            continue;
                        }
                    }
                }
                ObjType::Func => {
                    let arg_vals = self.eval_list(heap, args, env)?;
                    let proc = heap.procedure(head_val)?.clone();
                    let parent_cell = heap.env_cell_of(proc.env);
                    self.call_trace.push(head_val);
                    let call_env = env::make(heap, parent_cell, false)?;
                    env::bind_params(heap, proc.params, arg_vals, call_env)?;
                    match self.run_body_tail(heap, proc.body, call_env)? {
                        Some((e, v)) => {
                            expr = e;
                            env = v;
                            continue;
                        }
                        None => return Ok(heap.nil()),
                    }
                }
                ObjType::Macro => {
                    let proc = heap.procedure(head_val)?.clone();
                    let parent_cell = heap.env_cell_of(proc.env);
                    self.call_trace.push(head_val);
                    let call_env = env::make(heap, parent_cell, false)?;
                    env::bind_params(heap, proc.params, args, call_env)?;
                    let expansion = self.eval_body(heap, proc.body, call_env)?;
                    // Macro re-evaluation is observable: overwrite the
                    // caller's own pair in place before re-dispatching,
                    // rather than just substituting a new `expr`.
                    if heap.obj_type(expansion) == ObjType::Pair {
                        let (car, cdr) = heap.get(expansion).pair_parts();
                        heap.set_car(expr, car)?;
                        heap.set_cdr(expr, cdr)?;
                    } else {
                        expr = expansion;
                        continue;
                    }
                    continue;
                }
                ObjType::Cfunc => {
                    let arg_vals = self.eval_list(heap, args, env)?;
                    let index = heap.get(head_val).scalar();
                    let f = *self
                        .cfuncs
                        .get(index as usize)
                        .ok_or(EvalError::NotCallable("cfunc"))?;
                    return f(heap, arg_vals);
                }
                ObjType::Ffi => {
                    let arg_vec = self.eval_vec(heap, args, env)?;
                    let index = heap.get(head_val).scalar();
                    let proto = self
                        .ffi_protos
                        .get(index as usize)
                        .ok_or(EvalError::NotCallable("ffi"))?;
                    let sig = ffi::signature_of(heap, &arg_vec);
                    let overload = ffi::resolve(proto, &sig)?;
                    return (overload.call)(heap, &arg_vec);
                }
                other => return Err(EvalError::NotCallable(other.name())),
            }
        }
    }

    fn eval_atom(&mut self, heap: &Heap, expr: CellIdx, env: CellIdx) -> Result<CellIdx> {
        if heap.obj_type(expr) == ObjType::Symbol {
            env::get(heap, expr, env)
        } else {
            Ok(expr)
        }
    }

    /// Evaluates every form in `body` but the last, in order, for effect;
    /// returns the last form unevaluated along with the environment it
    /// should be evaluated in, so the trampoline can tail-loop into it. An
    /// empty body has no tail expression.
    fn run_body_tail(&mut self, heap: &mut Heap, body: CellIdx, env: CellIdx) -> Result<Option<(CellIdx, CellIdx)>> {
        if heap.is_nil(body) {
            return Ok(None);
        }
        let mut cursor = body;
        loop {
            let (form, rest) = heap.get(cursor).pair_parts();
            if heap.obj_type(rest) != ObjType::Pair {
                return Ok(Some((form, env)));
            }
            self.eval(heap, form, env)?;
            cursor = rest;
        }
    }

    /// Evaluates every form of `body` in order, returning the last value
    /// (`nil` for an empty body). Unlike [`Self::run_body_tail`] this
    /// recurses rather than trampolining — used only for macro expansion,
    /// which is not a hot path.
    fn eval_body(&mut self, heap: &mut Heap, body: CellIdx, env: CellIdx) -> Result<CellIdx> {
        let mut result = heap.nil();
        let mut cursor = body;
        while heap.obj_type(cursor) == ObjType::Pair {
            let (form, rest) = heap.get(cursor).pair_parts();
            result = self.eval(heap, form, env)?;
            cursor = rest;
        }
        Ok(result)
    }

    /// Evaluates each element of the unevaluated list `args` in order.
    fn eval_vec(&mut self, heap: &mut Heap, args: CellIdx, env: CellIdx) -> Result<Vec<CellIdx>> {
        let mut out = Vec::new();
        let mut cursor = args;
        while heap.obj_type(cursor) == ObjType::Pair {
            let (form, rest) = heap.get(cursor).pair_parts();
            out.push(self.eval(heap, form, env)?);
            cursor = rest;
        }
        Ok(out)
    }

    /// Evaluates each element of `args` and rebuilds them into a fresh
    /// scheme list.
    fn eval_list(&mut self, heap: &mut Heap, args: CellIdx, env: CellIdx) -> Result<CellIdx> {
        let values = self.eval_vec(heap, args, env)?;
        list_from_vec(heap, &values)
    }

    fn eval_prim(&mut self, heap: &mut Heap, prim: Prim, args: CellIdx, env: CellIdx) -> Result<Step> {
        match prim {
            Prim::Quote => Ok(Step::Done(nth(heap, args, 0))),

            Prim::If => {
                let cond_form = nth(heap, args, 0);
                let cond = self.eval(heap, cond_form, env)?;
                let rest = cdr(heap, args);
                let else_rest = cdr(heap, rest);
                let branch = if is_truthy(heap, cond) {
                    nth(heap, rest, 0)
                } else if heap.obj_type(else_rest) == ObjType::Pair {
                    nth(heap, else_rest, 0)
                } else {
                    heap.nil()
                };
                Ok(Step::Tail { expr: branch, env })
            }

            Prim::Let => {
                let sym = nth(heap, args, 0);
                let value_form = nth(heap, cdr(heap, args), 0);
                let value = self.eval(heap, value_form, env)?;
                let id = heap.string_id_of(sym);
                heap.environment_mut(env)?.bindings.insert(id, value);
                Ok(Step::Done(value))
            }

            Prim::Set => {
                let sym = nth(heap, args, 0);
                let value_form = nth(heap, cdr(heap, args), 0);
                let value = self.eval(heap, value_form, env)?;
                env::set(heap, sym, value, env)?;
                Ok(Step::Done(value))
            }

            Prim::Fn | Prim::Mac => {
                let params = nth(heap, args, 0);
                let body = cdr(heap, args);
                let proc = Procedure {
                    params,
                    body,
                    env: heap.env_id_of(env),
                    is_macro: prim == Prim::Mac,
                    is_compiled: false,
                    compiled_entry: None,
                };
                let cell = heap.alloc_procedure(proc, prim == Prim::Mac)?;
                Ok(Step::Done(cell))
            }

            Prim::While => {
                let cond_expr = nth(heap, args, 0);
                let body = cdr(heap, args);
                let mut result = heap.nil();
                loop {
                    let cond = self.eval(heap, cond_expr, env)?;
                    if !is_truthy(heap, cond) {
                        break;
                    }
                    result = self.eval_body(heap, body, env)?;
                }
                Ok(Step::Done(result))
            }

            Prim::Do => {
                if heap.is_nil(args) {
                    return Ok(Step::Done(heap.nil()));
                }
                match self.run_body_tail(heap, args, env)? {
                    Some((e, v)) => Ok(Step::Tail { expr: e, env: v }),
                    None => Ok(Step::Done(heap.nil())),
                }
            }

            Prim::And => {
                let mut cursor = args;
                let mut last = heap.true_cell();
                while heap.obj_type(cursor) == ObjType::Pair {
                    let (form, rest) = heap.get(cursor).pair_parts();
                    if heap.obj_type(rest) != ObjType::Pair {
                        return Ok(Step::Tail { expr: form, env });
                    }
                    last = self.eval(heap, form, env)?;
                    if !is_truthy(heap, last) {
                        return Ok(Step::Done(last));
                    }
                    cursor = rest;
                }
                Ok(Step::Done(last))
            }

            Prim::Or => {
                let mut cursor = args;
                while heap.obj_type(cursor) == ObjType::Pair {
                    let (form, rest) = heap.get(cursor).pair_parts();
                    if heap.obj_type(rest) != ObjType::Pair {
                        return Ok(Step::Tail { expr: form, env });
                    }
                    let v = self.eval(heap, form, env)?;
                    if is_truthy(heap, v) {
                        return Ok(Step::Done(v));
                    }
                    cursor = rest;
                }
                Ok(Step::Done(heap.false_cell()))
            }

            Prim::Eval => {
                let data_form = nth(heap, args, 0);
                let data = self.eval(heap, data_form, env)?;
                let env_arg = cdr(heap, args);
                let target_env = if heap.obj_type(env_arg) == ObjType::Pair {
                    let env_form = nth(heap, env_arg, 0);
                    self.eval(heap, env_form, env)?
                } else {
                    env
                };
                Ok(Step::Tail { expr: data, env: target_env })
            }

            Prim::Quasiquote => {
                let template = nth(heap, args, 0);
                let expanded = quasiquote::expand(heap, template)?;
                Ok(Step::Tail { expr: expanded, env })
            }

            Prim::Unquote => Err(EvalError::UnquoteOutsideQuasiquote),
            Prim::UnquoteSplicing => Err(EvalError::UnquoteSplicingOutsideQuasiquote),

            Prim::Error => {
                let arg_list = self.eval_list(heap, args, env)?;
                let call_stack = list_from_vec(heap, &self.call_trace.iter().rev().copied().collect::<Vec<_>>())?;
                Ok(Step::Done(heap.alloc_error(arg_list, call_stack)?))
            }

            Prim::Print => {
                let vals = self.eval_vec(heap, args, env)?;
                for &v in &vals {
                    println!("{}", scmc_heap::to_string(heap, v, false));
                }
                Ok(Step::Done(vals.last().copied().unwrap_or_else(|| heap.nil())))
            }

            _ => {
                let vals = self.eval_vec(heap, args, env)?;
                Ok(Step::Done(self.apply_applicative(heap, prim, &vals)?))
            }
        }
    }

    fn apply_applicative(&self, heap: &mut Heap, prim: Prim, vals: &[CellIdx]) -> Result<CellIdx> {
        match prim {
            Prim::Cons => {
                let (a, b) = two(vals, "cons")?;
                Ok(heap.alloc_cons(a, b)?)
            }
            Prim::Car => Ok(heap.get(one(vals, "car")?).pair_parts().0),
            Prim::Cdr => Ok(heap.get(one(vals, "cdr")?).pair_parts().1),
            Prim::Setcar => {
                let (pair, v) = two(vals, "setcar")?;
                heap.set_car(pair, v)?;
                Ok(v)
            }
            Prim::Setcdr => {
                let (pair, v) = two(vals, "setcdr")?;
                heap.set_cdr(pair, v)?;
                Ok(v)
            }
            Prim::List => list_from_vec(heap, vals),
            Prim::Not => Ok(heap.make_bool(!is_truthy(heap, one(vals, "not")?))),
            Prim::Is => {
                let (a, b) = two(vals, "is")?;
                Ok(heap.make_bool(scmc_heap::is(heap, a, b)))
            }
            Prim::Atom => Ok(heap.make_bool(heap.obj_type(one(vals, "atom")?) != ObjType::Pair)),
            Prim::Gt => numeric_cmp(heap, vals, "gt", |o| o == std::cmp::Ordering::Greater),
            Prim::Gte => numeric_cmp(heap, vals, "gte", |o| o != std::cmp::Ordering::Less),
            Prim::Lt => numeric_cmp(heap, vals, "lt", |o| o == std::cmp::Ordering::Less),
            Prim::Lte => numeric_cmp(heap, vals, "lte", |o| o != std::cmp::Ordering::Greater),
            Prim::Eq => numeric_cmp(heap, vals, "eq", |o| o == std::cmp::Ordering::Equal),
            Prim::Neq => numeric_cmp(heap, vals, "neq", |o| o != std::cmp::Ordering::Equal),
            Prim::Add => arith_fold(heap, vals, "add", |x| x, |a, b| a + b),
            Prim::Sub => arith_fold(heap, vals, "sub", |x| -x, |a, b| a - b),
            Prim::Mul => arith_fold(heap, vals, "mul", |x| x, |a, b| a * b),
            Prim::Div => arith_fold(heap, vals, "div", |x| 1.0 / x, |a, b| a / b),
            Prim::Mod => {
                let (a, b) = two(vals, "mod")?;
                let (x, y) = (fixnum(heap, a)?, fixnum(heap, b)?);
                Ok(heap.alloc_fixnum(if y == 0 { 0 } else { x % y })?)
            }
            _ => unreachable!("special-form prim reached apply_applicative"),
        }
    }
}

/// Either the final value of a primitive form, or the `(expr, env)` to
/// tail-loop into next.
enum Step {
    Done(CellIdx),
    Tail { expr: CellIdx, env: CellIdx },
}

fn is_truthy(heap: &Heap, v: CellIdx) -> bool {
    if heap.is_nil(v) {
        return false;
    }
    !(heap.obj_type(v) == ObjType::Boolean && !heap.get(v).bool_value())
}

fn nth(heap: &Heap, list: CellIdx, n: usize) -> CellIdx {
    let mut cursor = list;
    for _ in 0..n {
        cursor = cdr(heap, cursor);
    }
    if heap.obj_type(cursor) == ObjType::Pair {
        heap.get(cursor).pair_parts().0
    } else {
        heap.nil()
    }
}

fn cdr(heap: &Heap, list: CellIdx) -> CellIdx {
    if heap.obj_type(list) == ObjType::Pair {
        heap.get(list).pair_parts().1
    } else {
        heap.nil()
    }
}

fn list_from_vec(heap: &mut Heap, values: &[CellIdx]) -> Result<CellIdx> {
    let mut acc = heap.nil();
    for &v in values.iter().rev() {
        acc = heap.alloc_cons(v, acc)?;
    }
    Ok(acc)
}

fn one(vals: &[CellIdx], form: &'static str) -> Result<CellIdx> {
    vals.first().copied().ok_or(EvalError::ArityError { form })
}

fn two(vals: &[CellIdx], form: &'static str) -> Result<(CellIdx, CellIdx)> {
    if vals.len() < 2 {
        return Err(EvalError::ArityError { form });
    }
    Ok((vals[0], vals[1]))
}

/// Coerces a fixnum or flonum cell to `f32`, the way every arithmetic
/// primitive "coerces operands through flonum" before computing.
fn as_f32(heap: &Heap, idx: CellIdx) -> Result<f32> {
    match heap.obj_type(idx) {
        ObjType::Fixnum => Ok(heap.get(idx).fixnum_value() as f32),
        ObjType::Flonum => Ok(heap.get(idx).flonum_value()),
        other => Err(EvalError::TypeMismatch { expected: "number", got: other.name() }),
    }
}

/// `mod` is the one arithmetic primitive that requires fixnum operands
/// rather than coercing through flonum.
fn fixnum(heap: &Heap, idx: CellIdx) -> Result<i32> {
    match heap.obj_type(idx) {
        ObjType::Fixnum => Ok(heap.get(idx).fixnum_value()),
        other => Err(EvalError::TypeMismatch { expected: "fixnum", got: other.name() }),
    }
}

/// Left-folds `vals` through `fold`, always producing a flonum result.
/// `unary` covers the single-operand case (`(- x)` negates, `(/ x)`
/// reciprocates) the way a plain binary fold cannot.
fn arith_fold(heap: &mut Heap, vals: &[CellIdx], form: &'static str, unary: fn(f32) -> f32, fold: fn(f32, f32) -> f32) -> Result<CellIdx> {
    if vals.is_empty() {
        return Err(EvalError::ArityError { form });
    }
    let mut acc = as_f32(heap, vals[0])?;
    if vals.len() == 1 {
        acc = unary(acc);
    } else {
        for &v in &vals[1..] {
            acc = fold(acc, as_f32(heap, v)?);
        }
    }
    Ok(heap.alloc_flonum(acc)?)
}

fn numeric_cmp(heap: &Heap, vals: &[CellIdx], form: &'static str, accept: fn(std::cmp::Ordering) -> bool) -> Result<CellIdx> {
    let (a, b) = two(vals, form)?;
    let (x, y) = (as_f32(heap, a)?, as_f32(heap, b)?);
    let ord = x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal);
    Ok(heap.make_bool(accept(ord)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scmc_reader::{read, Cursor};

    fn run(src: &str) -> (Heap, CellIdx) {
        let mut heap = Heap::new(1 << 16);
        let env = env::make(&mut heap, heap.nil(), true).unwrap();
        let mut ev = Evaluator::new();
        ev.install_primitives(&mut heap, env).unwrap();
        let mut cursor = Cursor::new(src);
        let expr = read(&mut heap, &mut cursor).unwrap();
        let result = ev.eval(&mut heap, expr, env).unwrap();
        (heap, result)
    }

    #[test]
    fn arithmetic_and_comparisons() {
        let (heap, v) = run("(+ 2 3)");
        assert_eq!(heap.get(v).flonum_value(), 5.0);
        let (heap, v) = run("(< 2 3)");
        assert!(heap.get(v).bool_value());
    }

    #[test]
    fn if_picks_the_live_branch() {
        let (heap, v) = run("(if (< 1 2) 10 20)");
        assert_eq!(heap.get(v).fixnum_value(), 10);
    }

    #[test]
    fn let_then_set_mutates_binding() {
        let (heap, v) = run("(do (let x 1) (set x 2) x)");
        assert_eq!(heap.get(v).fixnum_value(), 2);
    }

    #[test]
    fn fn_application_runs_body_and_binds_params() {
        let (heap, v) = run("((fn (a b) (+ a b)) 4 5)");
        assert_eq!(heap.get(v).flonum_value(), 9.0);
    }

    #[test]
    fn tail_recursive_loop_does_not_overflow() {
        let (heap, v) = run("(do (let count (fn (n acc) (if (= n 0) acc (count (- n 1) (+ acc 1))))) (count 100000 0))");
        assert_eq!(heap.get(v).flonum_value(), 100000.0);
    }

    #[test]
    fn while_loop_accumulates() {
        let (heap, v) = run("(do (let i 0) (let sum 0) (while (< i 5) (set sum (+ sum i)) (set i (+ i 1))) sum)");
        assert_eq!(heap.get(v).flonum_value(), 10.0);
    }

    #[test]
    fn quote_and_quasiquote_build_data() {
        let (heap, v) = run("(quote (1 2 3))");
        assert_eq!(scmc_heap::to_string(&heap, v, false), "(1 2 3)");
        let (heap, v) = run("(do (let x 9) (quasiquote (a (unquote x) c)))");
        assert_eq!(scmc_heap::to_string(&heap, v, false), "(a 9 c)");
    }

    #[test]
    fn error_primitive_captures_call_trace() {
        let (heap, v) = run("(do (let boom (fn () (error (quote bad)))) (boom))");
        assert_eq!(heap.obj_type(v), ObjType::Error);
        assert!(scmc_heap::to_string(&heap, v, false).starts_with("error: (bad)"));
    }

    #[test]
    fn macro_expands_before_evaluating() {
        let (heap, v) = run("(do (let twice (mac (e) (list (quote do) e e))) (twice (+ 1 1)))");
        assert_eq!(heap.get(v).flonum_value(), 2.0);
    }

    #[test]
    fn macro_expansion_overwrites_the_caller_pair_in_place() {
        let mut heap = Heap::new(1 << 16);
        let env = env::make(&mut heap, heap.nil(), true).unwrap();
        let mut ev = Evaluator::new();
        ev.install_primitives(&mut heap, env).unwrap();
        let mut cursor = Cursor::new("(let m (mac (a b) (list (quote +) a b)))");
        let define = read(&mut heap, &mut cursor).unwrap();
        ev.eval(&mut heap, define, env).unwrap();
        let mut cursor = Cursor::new("(m 3 4)");
        let caller = read(&mut heap, &mut cursor).unwrap();
        let result = ev.eval(&mut heap, caller, env).unwrap();
        assert_eq!(heap.get(result).flonum_value(), 7.0);
        assert_eq!(scmc_heap::to_string(&heap, caller, false), "(+ 3 4)");
    }
}
