//! `scmt disasm` — compile a source file to its assembled word stream and
//! print one decoded instruction per line, without executing it.

use std::path::PathBuf;

use scmc_driver::Context;
use scmc_vm::encode::decode_word;
use scmc_vm::opmap::from_u8;

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct DisasmArgs {
    pub file: PathBuf,
    pub heap_bytes: usize,
}

pub fn run_disasm(args: DisasmArgs) -> Result<()> {
    let source = std::fs::read_to_string(&args.file)?;
    let mut ctx = Context::new(args.heap_bytes)?;
    let words = ctx.assemble_source(&source)?;
    for (pc, &word) in words.iter().enumerate() {
        let decoded = decode_word(word);
        let name = from_u8(decoded.opcode).map(|op| op.name()).unwrap_or("???");
        println!(
            "{pc:>5}  {name:<8} a={:<3} b={:<3} c={:<3} imm={}",
            decoded.reg_a, decoded.reg_b, decoded.reg_c, decoded.imm
        );
    }
    Ok(())
}
