//! `scmt repl` — an interactive read-eval-print loop over the tree-walking
//! evaluator, one top-level form per line.

use std::io::{self, Write};

use scmc_driver::Context;

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct ReplArgs {
    pub heap_bytes: usize,
}

pub fn run_repl(args: ReplArgs) -> Result<()> {
    let mut ctx = Context::new(args.heap_bytes)?;
    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("scmt> ");
        io::stdout().flush()?;
        line.clear();
        if stdin.read_line(&mut line)? == 0 {
            println!();
            break;
        }
        if line.trim().is_empty() {
            continue;
        }
        match ctx.eval_source(&line) {
            Ok(value) => println!("{}", scmc_heap::to_string(ctx.heap(), value, false)),
            Err(e) => eprintln!("error: {e}"),
        }
    }
    Ok(())
}
