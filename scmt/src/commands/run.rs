//! `scmt run` — read, compile, assemble, and execute a source file on the
//! virtual machine, printing the final return register's value.

use std::path::PathBuf;

use scmc_driver::Context;

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct RunArgs {
    pub file: PathBuf,
    pub heap_bytes: usize,
}

pub fn run_run(args: RunArgs) -> Result<()> {
    let source = std::fs::read_to_string(&args.file)?;
    let mut ctx = Context::new(args.heap_bytes)?;
    let result = ctx.compile_and_run(&source)?;
    println!("{}", scmc_heap::to_string(ctx.heap(), result, false));
    Ok(())
}
