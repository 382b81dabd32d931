//! End-to-end scenarios exercised through the public embedding API only,
//! matching the six scenarios a testable-properties review walks through
//! for this pipeline.

use scmc_driver::Context;

#[test]
fn scenario_1_sum_of_three_fixnums_is_a_flonum() {
    let mut ctx = Context::new(1 << 16).unwrap();
    let result = ctx.eval_source("(+ 1 2 3)").unwrap();
    assert_eq!(ctx.heap().get(result).flonum_value(), 6.0);
}

#[test]
fn scenario_2_defining_and_calling_a_function() {
    let mut ctx = Context::new(1 << 16).unwrap();
    let result = ctx.eval_source("(let f (fn (x) (* x x))) (f 5)").unwrap();
    assert_eq!(ctx.heap().get(result).flonum_value(), 25.0);
}

#[test]
fn scenario_3_quasiquote_splices_and_unquotes() {
    let mut ctx = Context::new(1 << 16).unwrap();
    let result = ctx.eval_source("`(1 ,(+ 1 1) ,@(list 3 4) 5)").unwrap();
    assert_eq!(scmc_heap::to_string(ctx.heap(), result, false), "(1 2 3 4 5)");
}

#[test]
fn scenario_4_macro_expansion_rewrites_the_caller_pair() {
    let mut ctx = Context::new(1 << 16).unwrap();
    let forms = ctx.read_all("(let m (mac (a b) (list '+ a b))) (m 3 4)").unwrap();
    let caller = forms[1];
    let result = ctx.eval_forms(&forms).unwrap();
    assert_eq!(ctx.heap().get(result).flonum_value(), 7.0);
    assert_eq!(scmc_heap::to_string(ctx.heap(), caller, false), "(+ 3 4)");
}

#[test]
fn scenario_5_is_compares_lists_structurally() {
    let mut ctx = Context::new(1 << 16).unwrap();
    let result = ctx.eval_source("(is '(1 2 3) (list 1 2 3))").unwrap();
    assert!(ctx.heap().get(result).bool_value());
}

#[test]
fn scenario_6_compiled_procedure_runs_on_the_vm() {
    let mut ctx = Context::new(1 << 16).unwrap();
    let result = ctx.compile_and_run("(let sq (fn (x) (* x x))) (sq 7)").unwrap();
    assert_eq!(ctx.heap().get(result).flonum_value(), 49.0);
}

#[test]
fn scenario_7_recursive_compiled_call_binds_its_own_frame() {
    let mut ctx = Context::new(1 << 16).unwrap();
    let result = ctx.compile_and_run("(let f (fn (n) (if (= n 0) 0 (+ n (f (- n 1)))))) (f 3)").unwrap();
    assert_eq!(ctx.heap().get(result).flonum_value(), 6.0);
}

#[test]
fn collect_garbage_runs_without_invalidating_a_live_global() {
    let mut ctx = Context::new(1 << 16).unwrap();
    ctx.eval_source("(let kept 42)").unwrap();
    ctx.collect_garbage();
    let result = ctx.eval_source("kept").unwrap();
    assert_eq!(ctx.heap().get(result).fixnum_value(), 42);
}
