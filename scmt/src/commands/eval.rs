//! `scmt eval` — read and tree-walk evaluate a source file's top-level
//! forms in order, printing each form's value.

use std::path::PathBuf;

use tracing::info;

use scmc_driver::Context;

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct EvalArgs {
    pub file: PathBuf,
    pub heap_bytes: usize,
    pub verbose: bool,
}

pub fn run_eval(args: EvalArgs) -> Result<()> {
    let source = std::fs::read_to_string(&args.file)?;
    let mut ctx = Context::new(args.heap_bytes)?;
    let forms = ctx.read_all(&source)?;
    for form in forms {
        let value = ctx.eval_forms(std::slice::from_ref(&form))?;
        if args.verbose {
            info!(form = scmc_heap::to_string(ctx.heap(), form, false), "evaluated");
        }
        println!("{}", scmc_heap::to_string(ctx.heap(), value, false));
    }
    Ok(())
}
