//! The compiler: `compile(ctx) -> (last_block,
//! result_reg, is_volatile)`, lowering parsed Scheme objects (the same
//! cells the tree-walking evaluator works over) into the flat
//! instruction/basic-block IR of scmc-ir.
//!
//! Procedures are not separate linked units: a `fn` compiles its body
//! into its own block chain within the same program-wide [`Function`],
//! reachable only via `blr`/`br` operands — exactly the "single
//! `start_block`" shape `assemble` expects.

use rustc_hash::FxHashMap;
use scmc_heap::{CellIdx, Heap, ObjType};
use scmc_ir::{BlockId, BlockKind, Builder, Encoding, Function, Opcode, Operand, Register};

use crate::error::{CompileError, Result};
use crate::regpool::RegPool;

/// `ctx = { current-block, source-object, environment,
/// preferred-target-register, label, top-level-flag }`.
pub struct CompileCtx {
    pub block: BlockId,
    pub source: CellIdx,
    pub env: CellIdx,
    pub preferred: Option<Register>,
    pub label: Option<String>,
    pub top_level: bool,
}

/// `(last_block, result_reg, is_volatile)`. `volatile` is true when the
/// result lives in a register the next call site must protect (e.g. an
/// environment lookup result, as opposed to a `const` the compiler can
/// safely re-materialize).
pub struct CompileOutput {
    pub block: BlockId,
    pub reg: Register,
    pub volatile: bool,
}

struct ProcInfo {
    entry: BlockId,
    params: Vec<String>,
}

pub struct Compiler {
    builder: Builder,
    pool: RegPool,
    /// Arena indices of the literal objects `const` loads by index. These
    /// cells live in the same shared object heap the VM executes against,
    /// so the constant pool is just a list of indices into it, not a
    /// separate encoding of their contents.
    pub constants: Vec<CellIdx>,
    procedures: FxHashMap<String, ProcInfo>,
}

impl Compiler {
    pub fn new(program_name: impl Into<String>) -> Self {
        Self { builder: Builder::new(program_name), pool: RegPool::new(), constants: Vec::new(), procedures: FxHashMap::default() }
    }

    pub fn entry_block(&self) -> BlockId {
        self.builder.current_block()
    }

    pub fn finish(self) -> Function {
        self.builder.build()
    }

    fn intern_constant(&mut self, _heap: &Heap, idx: CellIdx) -> i64 {
        if let Some(pos) = self.constants.iter().position(|&c| c == idx) {
            return pos as i64;
        }
        self.constants.push(idx);
        (self.constants.len() - 1) as i64
    }

    fn target(&mut self, preferred: Option<Register>) -> Result<Register> {
        if let Some(r) = preferred {
            return Ok(r);
        }
        self.pool.retain().ok_or(CompileError::RegisterPressure)
    }

    /// Entry point: compiles a whole top-level program, one form after
    /// another, leaving the value of the last form in `R0` and ending
    /// the block with `exit 0`.
    pub fn compile_program(&mut self, heap: &mut Heap, forms: &[CellIdx], env: CellIdx) -> Result<()> {
        let mut last = Register::R(0);
        for &form in forms {
            let block = self.builder.current_block();
            let out = self.compile(heap, CompileCtx { block, source: form, env, preferred: None, label: None, top_level: true })?;
            self.builder.set_current_block(out.block);
            last = out.reg;
        }
        if last != Register::R(0) {
            self.builder.emit(Opcode::Move, Encoding::Reg2 { src: last, dst: Register::R(0) });
        }
        self.builder.emit(Opcode::Exit, Encoding::Imm { src: Operand::Immediate(0), dst: None });
        Ok(())
    }

    pub fn compile(&mut self, heap: &mut Heap, ctx: CompileCtx) -> Result<CompileOutput> {
        self.builder.set_current_block(ctx.block);
        match heap.obj_type(ctx.source) {
            ObjType::Symbol => self.compile_symbol(heap, &ctx),
            ObjType::Pair => self.compile_form(heap, ctx),
            _ => self.compile_literal(heap, &ctx),
        }
    }

    fn compile_literal(&mut self, heap: &mut Heap, ctx: &CompileCtx) -> Result<CompileOutput> {
        let reg = self.target(ctx.preferred)?;
        let index = self.intern_constant(heap, ctx.source);
        self.builder.emit(Opcode::Const, Encoding::Imm { src: Operand::Immediate(index), dst: Some(reg) });
        Ok(CompileOutput { block: self.builder.current_block(), reg, volatile: false })
    }

    fn compile_symbol(&mut self, heap: &mut Heap, ctx: &CompileCtx) -> Result<CompileOutput> {
        let reg = self.target(ctx.preferred)?;
        let index = self.intern_constant(heap, ctx.source);
        self.builder.emit(Opcode::Get, Encoding::Imm { src: Operand::Immediate(index), dst: Some(reg) });
        Ok(CompileOutput { block: self.builder.current_block(), reg, volatile: true })
    }

    fn compile_form(&mut self, heap: &mut Heap, ctx: CompileCtx) -> Result<CompileOutput> {
        let (head, args) = heap.get(ctx.source).pair_parts();
        if heap.obj_type(head) == ObjType::Symbol {
            let name = heap.symbols().lookup(heap.string_id_of(head)).unwrap_or("").to_string();
            match name.as_str() {
                "quote" => return self.compile_quote(heap, &ctx, args),
                "if" => return self.compile_if(heap, &ctx, args),
                "and" => return self.compile_and_or(heap, &ctx, args, true),
                "or" => return self.compile_and_or(heap, &ctx, args, false),
                "do" => return self.compile_do(heap, &ctx, args),
                "not" => return self.compile_unary(heap, &ctx, args, Opcode::Not),
                "car" => return self.compile_unary(heap, &ctx, args, Opcode::Car),
                "cdr" => return self.compile_unary(heap, &ctx, args, Opcode::Cdr),
                "atom" => return self.compile_unary(heap, &ctx, args, Opcode::Atomp),
                "cons" => return self.compile_binary(heap, &ctx, args, Opcode::Cons),
                "setcar" => return self.compile_binary(heap, &ctx, args, Opcode::Setcar),
                "setcdr" => return self.compile_binary(heap, &ctx, args, Opcode::Setcdr),
                "+" => return self.compile_arith(heap, &ctx, args, Opcode::Ladd),
                "-" => return self.compile_arith(heap, &ctx, args, Opcode::Lsub),
                "*" => return self.compile_arith(heap, &ctx, args, Opcode::Lmul),
                "/" => return self.compile_arith(heap, &ctx, args, Opcode::Ldiv),
                "mod" => return self.compile_arith(heap, &ctx, args, Opcode::Lmod),
                "=" => return self.compile_compare(heap, &ctx, args, Opcode::Seq),
                "/=" => return self.compile_compare(heap, &ctx, args, Opcode::Sne),
                "<" => return self.compile_compare(heap, &ctx, args, Opcode::Sl),
                "<=" => return self.compile_compare(heap, &ctx, args, Opcode::Sle),
                ">" => return self.compile_compare(heap, &ctx, args, Opcode::Sg),
                ">=" => return self.compile_compare(heap, &ctx, args, Opcode::Sge),
                "list" => return self.compile_list(heap, &ctx, args),
                "error" => return self.compile_unary(heap, &ctx, args, Opcode::Error),
                "fn" => return self.compile_fn(heap, &ctx, args, false),
                "mac" => return self.compile_fn(heap, &ctx, args, true),
                "let" | "set" => return self.compile_let_set(heap, &ctx, args),
                _ => {}
            }
        }
        self.compile_call(heap, ctx, head, args)
    }

    fn compile_quote(&mut self, heap: &mut Heap, ctx: &CompileCtx, args: CellIdx) -> Result<CompileOutput> {
        let (quoted, _) = heap.get(args).pair_parts();
        let reg = self.target(ctx.preferred)?;
        let index = self.intern_constant(heap, quoted);
        self.builder.emit(Opcode::Qt, Encoding::Imm { src: Operand::Immediate(index), dst: Some(reg) });
        Ok(CompileOutput { block: self.builder.current_block(), reg, volatile: false })
    }

    fn compile_if(&mut self, heap: &mut Heap, ctx: &CompileCtx, args: CellIdx) -> Result<CompileOutput> {
        let (cond_form, rest) = heap.get(args).pair_parts();
        let (then_form, else_rest) = heap.get(rest).pair_parts();
        let else_form = if heap.obj_type(else_rest) == ObjType::Pair { Some(heap.get(else_rest).pair_parts().0) } else { None };

        let cond_out = self.compile(heap, CompileCtx { block: ctx.block, source: cond_form, env: ctx.env, preferred: None, label: None, top_level: false })?;
        self.builder.emit(Opcode::Truep, Encoding::Reg1 { dst: cond_out.reg });
        self.release_if_temp(ctx, cond_out.reg);

        let then_block = self.builder.new_block(BlockKind::Code);
        let else_block = self.builder.new_block(BlockKind::Code);
        let exit_block = self.builder.new_block(BlockKind::Code);
        self.builder.set_current_block(cond_out.block);
        self.builder.emit(Opcode::Bne, Encoding::Imm { src: Operand::Block(else_block), dst: None });
        self.builder.link(cond_out.block, then_block);
        self.builder.link(cond_out.block, else_block);

        let result_reg = self.target(ctx.preferred)?;

        self.builder.set_current_block(then_block);
        let then_out = self.compile(heap, CompileCtx { block: then_block, source: then_form, env: ctx.env, preferred: Some(result_reg), label: None, top_level: false })?;
        self.builder.set_current_block(then_out.block);
        self.builder.emit(Opcode::Br, Encoding::Imm { src: Operand::Block(exit_block), dst: None });
        self.builder.link(then_out.block, exit_block);

        self.builder.set_current_block(else_block);
        let else_block_final = match else_form {
            Some(form) => {
                let out = self.compile(heap, CompileCtx { block: else_block, source: form, env: ctx.env, preferred: Some(result_reg), label: None, top_level: false })?;
                out.block
            }
            None => {
                self.builder.emit(Opcode::Const, Encoding::Imm { src: Operand::Immediate(-1), dst: Some(result_reg) });
                else_block
            }
        };
        self.builder.set_current_block(else_block_final);
        self.builder.emit(Opcode::Br, Encoding::Imm { src: Operand::Block(exit_block), dst: None });
        self.builder.link(else_block_final, exit_block);

        self.builder.set_current_block(exit_block);
        Ok(CompileOutput { block: exit_block, reg: result_reg, volatile: true })
    }

    /// `and`/`or`: a right-folding chain of forms, each guarded by
    /// `truep` so a decisive value (false for `and`, true for `or`)
    /// short-circuits straight to the shared exit block.
    fn compile_and_or(&mut self, heap: &mut Heap, ctx: &CompileCtx, args: CellIdx, is_and: bool) -> Result<CompileOutput> {
        if heap.is_nil(args) {
            let reg = self.target(ctx.preferred)?;
            self.builder.emit(Opcode::Const, Encoding::Imm { src: Operand::Immediate(if is_and { -1 } else { 0 }), dst: Some(reg) });
            return Ok(CompileOutput { block: ctx.block, reg, volatile: false });
        }
        let reg = self.target(ctx.preferred)?;
        let end_block = self.builder.new_block(BlockKind::Code);
        let mut cursor = args;
        let mut block = ctx.block;
        loop {
            let (form, rest) = heap.get(cursor).pair_parts();
            let is_last = heap.obj_type(rest) != ObjType::Pair;
            let out = self.compile(heap, CompileCtx { block, source: form, env: ctx.env, preferred: Some(reg), label: None, top_level: false })?;
            block = out.block;
            self.builder.set_current_block(block);
            if is_last {
                self.builder.emit(Opcode::Br, Encoding::Imm { src: Operand::Block(end_block), dst: None });
                self.builder.link(block, end_block);
                break;
            }
            self.builder.emit(Opcode::Truep, Encoding::Reg1 { dst: reg });
            let short_circuit = if is_and { Opcode::Bne } else { Opcode::Beq };
            self.builder.emit(short_circuit, Encoding::Imm { src: Operand::Block(end_block), dst: None });
            self.builder.link(block, end_block);
            let cont_block = self.builder.new_block(BlockKind::Code);
            self.builder.link(block, cont_block);
            block = cont_block;
            cursor = rest;
        }
        self.builder.set_current_block(end_block);
        Ok(CompileOutput { block: end_block, reg, volatile: true })
    }

    fn compile_do(&mut self, heap: &mut Heap, ctx: &CompileCtx, args: CellIdx) -> Result<CompileOutput> {
        if heap.is_nil(args) {
            let reg = self.target(ctx.preferred)?;
            self.builder.emit(Opcode::Const, Encoding::Imm { src: Operand::Immediate(-1), dst: Some(reg) });
            return Ok(CompileOutput { block: ctx.block, reg, volatile: false });
        }
        let mut cursor = args;
        let mut block = ctx.block;
        loop {
            let (form, rest) = heap.get(cursor).pair_parts();
            let is_last = heap.obj_type(rest) != ObjType::Pair;
            let out = self.compile(
                heap,
                CompileCtx { block, source: form, env: ctx.env, preferred: if is_last { ctx.preferred } else { None }, label: None, top_level: ctx.top_level && is_last },
            )?;
            block = out.block;
            if is_last {
                return Ok(out);
            }
            self.release_if_temp(ctx, out.reg);
            cursor = rest;
        }
    }

    fn release_if_temp(&mut self, ctx: &CompileCtx, reg: Register) {
        if ctx.preferred != Some(reg) {
            self.pool.release(reg);
        }
    }

    fn compile_operands(&mut self, heap: &mut Heap, ctx: &CompileCtx, mut args: CellIdx) -> Result<(BlockId, Vec<Register>)> {
        let mut block = ctx.block;
        let mut regs = Vec::new();
        while heap.obj_type(args) == ObjType::Pair {
            let (form, rest) = heap.get(args).pair_parts();
            let out = self.compile(heap, CompileCtx { block, source: form, env: ctx.env, preferred: None, label: None, top_level: false })?;
            block = out.block;
            regs.push(out.reg);
            args = rest;
        }
        Ok((block, regs))
    }

    fn compile_unary(&mut self, heap: &mut Heap, ctx: &CompileCtx, args: CellIdx, op: Opcode) -> Result<CompileOutput> {
        let (block, regs) = self.compile_operands(heap, ctx, args)?;
        let src = *regs.first().ok_or(CompileError::Unsupported { form: "unary primitive with no operand" })?;
        self.builder.set_current_block(block);
        let dst = self.target(ctx.preferred)?;
        self.builder.emit(op, Encoding::Reg2 { src, dst });
        for &r in &regs {
            if r != dst {
                self.pool.release(r);
            }
        }
        Ok(CompileOutput { block: self.builder.current_block(), reg: dst, volatile: true })
    }

    fn compile_binary(&mut self, heap: &mut Heap, ctx: &CompileCtx, args: CellIdx, op: Opcode) -> Result<CompileOutput> {
        let (block, regs) = self.compile_operands(heap, ctx, args)?;
        if regs.len() < 2 {
            return Err(CompileError::Unsupported { form: "binary primitive with too few operands" });
        }
        self.builder.set_current_block(block);
        let dst = self.target(ctx.preferred)?;
        self.builder.emit(op, Encoding::Reg3 { a: regs[0], b: regs[1], c: dst });
        for &r in &regs {
            if r != dst {
                self.pool.release(r);
            }
        }
        Ok(CompileOutput { block: self.builder.current_block(), reg: dst, volatile: true })
    }

    /// Arithmetic primitives: allocate an `n`-slot stack frame, push each
    /// evaluated argument, emit the list-arithmetic opcode over the
    /// frame, free the frame (spec §4.7).
    fn compile_arith(&mut self, heap: &mut Heap, ctx: &CompileCtx, args: CellIdx, op: Opcode) -> Result<CompileOutput> {
        let (block, regs) = self.compile_operands(heap, ctx, args)?;
        self.builder.set_current_block(block);
        for &r in &regs {
            self.builder.emit(Opcode::Push, Encoding::Reg2 { src: r, dst: Register::Dp });
            self.pool.release(r);
        }
        let dst = self.target(ctx.preferred)?;
        self.builder.emit(op, Encoding::Reg2Imm { a: Register::Dp, b: dst, imm: Operand::Immediate(regs.len() as i64) });
        Ok(CompileOutput { block: self.builder.current_block(), reg: dst, volatile: true })
    }

    fn compile_compare(&mut self, heap: &mut Heap, ctx: &CompileCtx, args: CellIdx, set_op: Opcode) -> Result<CompileOutput> {
        let (block, regs) = self.compile_operands(heap, ctx, args)?;
        if regs.len() < 2 {
            return Err(CompileError::Unsupported { form: "comparison with too few operands" });
        }
        self.builder.set_current_block(block);
        self.builder.emit(Opcode::Lcmp, Encoding::Reg2 { src: regs[0], dst: regs[1] });
        let dst = self.target(ctx.preferred)?;
        self.builder.emit(set_op, Encoding::Reg1 { dst });
        for &r in &regs {
            if r != dst {
                self.pool.release(r);
            }
        }
        Ok(CompileOutput { block: self.builder.current_block(), reg: dst, volatile: true })
    }

    fn compile_list(&mut self, heap: &mut Heap, ctx: &CompileCtx, args: CellIdx) -> Result<CompileOutput> {
        let (block, regs) = self.compile_operands(heap, ctx, args)?;
        self.builder.set_current_block(block);
        for &r in &regs {
            self.builder.emit(Opcode::Push, Encoding::Reg2 { src: r, dst: Register::Dp });
            self.pool.release(r);
        }
        let dst = self.target(ctx.preferred)?;
        self.builder.emit(Opcode::List, Encoding::Reg2Imm { a: Register::Dp, b: dst, imm: Operand::Immediate(regs.len() as i64 * 8) });
        Ok(CompileOutput { block: self.builder.current_block(), reg: dst, volatile: true })
    }

    /// `fn`/`mac`: allocates the procedure's descriptor in the shared
    /// object heap (same representation the evaluator uses for
    /// interpreted closures) and compiles its body into a fresh block
    /// chain so later call sites can resolve its entry address.
    fn compile_fn(&mut self, heap: &mut Heap, ctx: &CompileCtx, args: CellIdx, is_macro: bool) -> Result<CompileOutput> {
        let (params, body) = heap.get(args).pair_parts();
        let mut param_symbols = Vec::new();
        let mut param_names = Vec::new();
        let mut cursor = params;
        while heap.obj_type(cursor) == ObjType::Pair {
            let (p, rest) = heap.get(cursor).pair_parts();
            param_names.push(heap.symbols().lookup(heap.string_id_of(p)).unwrap_or("").to_string());
            param_symbols.push(p);
            cursor = rest;
        }

        let saved_block = self.builder.current_block();
        let entry = self.builder.new_block(BlockKind::Code);
        self.builder.set_current_block(entry);
        // enter(locals=0): push lr, push ep, move sp,fp. No stack-resident
        // locals are implemented yet, so the `sub sp, locals` step is
        // skipped rather than emitted with a zero immediate. `ep` is saved
        // alongside `lr` — before `sp` is captured into `fp` — so the
        // epilogue's `move fp,sp` reset doesn't discard it.
        self.builder.emit(Opcode::Push, Encoding::Reg2 { src: Register::Lr, dst: Register::Sp });
        self.builder.emit(Opcode::Push, Encoding::Reg2 { src: Register::Ep, dst: Register::Sp });
        self.builder.emit(Opcode::Move, Encoding::Reg2 { src: Register::Sp, dst: Register::Fp });

        // Push a fresh environment frame, parented to the procedure's
        // defining (lexical) environment, and make it current before
        // binding parameters — each call gets its own frame rather than
        // every call writing into one shared environment.
        let env_reg = Register::R(2);
        let env_const_index = self.intern_constant(heap, ctx.env);
        self.builder.emit(Opcode::Const, Encoding::Imm { src: Operand::Immediate(env_const_index), dst: Some(env_reg) });
        self.builder.emit(Opcode::Env, Encoding::Reg2 { src: env_reg, dst: Register::Ep });

        // Bind each parameter from the argument values the call site
        // pushed (in reverse, since the last-pushed argument is the one
        // on top of the stack).
        let bind_reg = Register::R(1);
        for &sym in param_symbols.iter().rev() {
            self.builder.emit(Opcode::Pop, Encoding::Reg2 { src: Register::Dp, dst: bind_reg });
            let sym_index = self.intern_constant(heap, sym);
            self.builder.emit(Opcode::Set, Encoding::Reg2Imm { a: Register::Ep, b: bind_reg, imm: Operand::Immediate(sym_index) });
        }

        let ret_reg = Register::R(0);
        let mut cursor = body;
        let mut last = ret_reg;
        let mut block = entry;
        while heap.obj_type(cursor) == ObjType::Pair {
            let (form, rest) = heap.get(cursor).pair_parts();
            let is_last = heap.obj_type(rest) != ObjType::Pair;
            let out = self.compile(heap, CompileCtx { block, source: form, env: ctx.env, preferred: if is_last { Some(ret_reg) } else { None }, label: None, top_level: false })?;
            block = out.block;
            last = out.reg;
            cursor = rest;
        }
        self.builder.set_current_block(block);
        // leave(): move fp,sp; pop sp,ep; pop sp,lr; ret lr. `ep` is
        // restored before `lr`, the reverse of the prologue's push order.
        self.builder.emit(Opcode::Move, Encoding::Reg2 { src: Register::Fp, dst: Register::Sp });
        self.builder.emit(Opcode::Pop, Encoding::Reg2 { src: Register::Sp, dst: Register::Ep });
        self.builder.emit(Opcode::Pop, Encoding::Reg2 { src: Register::Sp, dst: Register::Lr });
        self.builder.emit(Opcode::Ret, Encoding::Reg1 { dst: Register::Lr });
        let _ = last;

        if let Some(label) = &ctx.label {
            self.procedures.insert(label.clone(), ProcInfo { entry, params: param_names.clone() });
        }

        self.builder.set_current_block(saved_block);
        let proc = scmc_heap::Procedure { params, body, env: heap.env_id_of(ctx.env), is_macro, is_compiled: true, compiled_entry: Some(entry.0) };
        let proc_cell = heap.alloc_procedure(proc, is_macro)?;
        let reg = self.target(ctx.preferred)?;
        let index = self.intern_constant(heap, proc_cell);
        self.builder.emit(Opcode::Const, Encoding::Imm { src: Operand::Immediate(index), dst: Some(reg) });
        Ok(CompileOutput { block: saved_block, reg, volatile: false })
    }

    /// `let`/`set` at top level: updates the compile-time environment
    /// immediately and, for a `fn`/`mac` value, compiles the procedure
    /// body right away so call sites later in the program can resolve it.
    fn compile_let_set(&mut self, heap: &mut Heap, ctx: &CompileCtx, args: CellIdx) -> Result<CompileOutput> {
        let (sym, rest) = heap.get(args).pair_parts();
        let (value_form, _) = heap.get(rest).pair_parts();
        let name = heap.symbols().lookup(heap.string_id_of(sym)).unwrap_or("").to_string();
        let is_fn_form = heap.obj_type(value_form) == ObjType::Pair && {
            let (h, _) = heap.get(value_form).pair_parts();
            heap.obj_type(h) == ObjType::Symbol && matches!(heap.symbols().lookup(heap.string_id_of(h)), Some("fn") | Some("mac"))
        };
        let value_ctx = CompileCtx { block: ctx.block, source: value_form, env: ctx.env, preferred: None, label: if is_fn_form { Some(name.clone()) } else { None }, top_level: ctx.top_level };
        let out = self.compile(heap, value_ctx)?;
        self.builder.set_current_block(out.block);
        // The binding itself happens at runtime via the `set` opcode
        // below; `compile_fn` has already registered the procedure's
        // entry block under `name` so later call sites in this same
        // compile pass resolve it without waiting for the `set` to run.
        let sym_index = self.intern_constant(heap, sym);
        self.builder.emit(Opcode::Set, Encoding::Reg2Imm { a: Register::Ep, b: out.reg, imm: Operand::Immediate(sym_index) });
        Ok(CompileOutput { block: self.builder.current_block(), reg: out.reg, volatile: false })
    }

    fn compile_call(&mut self, heap: &mut Heap, ctx: CompileCtx, head: CellIdx, args: CellIdx) -> Result<CompileOutput> {
        let callee_name = if heap.obj_type(head) == ObjType::Symbol {
            heap.symbols().lookup(heap.string_id_of(head)).map(|s| s.to_string())
        } else {
            None
        };
        let (block, regs) = self.compile_operands(heap, &ctx, args)?;
        self.builder.set_current_block(block);

        // Protect live temporaries across the call, the way the
        // original's compiler brackets `blr` with push/pop of the
        // protected-register set.
        for &r in &regs {
            self.builder.emit(Opcode::Push, Encoding::Reg2 { src: r, dst: Register::Dp });
        }

        let result = self.target(ctx.preferred)?;
        // Copy what's needed out of `self.procedures` before emitting,
        // so the lookup's borrow doesn't overlap the builder's.
        let known = callee_name.as_deref().and_then(|n| self.procedures.get(n)).map(|info| info.entry);
        match known {
            Some(entry) => {
                self.builder.emit(Opcode::Blr, Encoding::Imm { src: Operand::Block(entry), dst: None });
                self.builder.link(block, entry);
                self.builder.emit(Opcode::Move, Encoding::Reg2 { src: Register::R(0), dst: result });
            }
            None => {
                // Unresolved callee: defer to the runtime `apply`
                // opcode, which looks the callee up by symbol and
                // dispatches the way the tree-walking evaluator does.
                let head_idx = self.intern_constant(heap, head);
                self.builder.emit(Opcode::Get, Encoding::Imm { src: Operand::Immediate(head_idx), dst: Some(result) });
                self.builder.emit(Opcode::Apply, Encoding::Reg2Imm { a: Register::Dp, b: result, imm: Operand::Immediate(regs.len() as i64) });
            }
        }
        for &r in &regs {
            if r != result {
                self.pool.release(r);
            }
        }
        Ok(CompileOutput { block: self.builder.current_block(), reg: result, volatile: true })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scmc_eval::make as make_env;
    use scmc_heap::Heap;
    use scmc_reader::{read, Cursor};

    fn forms(heap: &mut Heap, src: &str, env: CellIdx) -> Vec<CellIdx> {
        let mut cursor = Cursor::new(src);
        let mut out = Vec::new();
        loop {
            cursor.skip_whitespace_and_comments();
            if cursor.is_eof() {
                break;
            }
            out.push(read(heap, &mut cursor).unwrap());
        }
        out
    }

    #[test]
    fn literal_lowers_to_a_single_const() {
        let mut heap = Heap::new(1 << 16);
        let env = make_env(&mut heap, heap.nil(), true).unwrap();
        let src = forms(&mut heap, "42", env);
        let (func, constants) = crate::compile_program(&mut heap, &src, env).unwrap();
        assert_eq!(constants.len(), 1);
        assert!(func.instructions.iter().any(|i| i.opcode == Opcode::Const));
    }

    #[test]
    fn if_form_produces_three_extra_blocks() {
        let mut heap = Heap::new(1 << 16);
        let env = make_env(&mut heap, heap.nil(), true).unwrap();
        let src = forms(&mut heap, "(if (< 1 2) 10 20)", env);
        let (func, _) = crate::compile_program(&mut heap, &src, env).unwrap();
        // entry + then + else + exit
        assert_eq!(func.blocks.len(), 4);
    }

    #[test]
    fn defining_and_calling_a_procedure_resolves_the_entry_block() {
        let mut heap = Heap::new(1 << 16);
        let env = make_env(&mut heap, heap.nil(), true).unwrap();
        let src = forms(&mut heap, "(let sq (fn (x) (* x x))) (sq 7)", env);
        let (func, _) = crate::compile_program(&mut heap, &src, env).unwrap();
        assert!(func.instructions.iter().any(|i| i.opcode == Opcode::Blr));
        assert!(func.instructions.iter().any(|i| i.opcode == Opcode::Ret));
    }

    #[test]
    fn register_pressure_is_reported_instead_of_spilling() {
        let mut heap = Heap::new(1 << 16);
        let env = make_env(&mut heap, heap.nil(), true).unwrap();
        let many_args: String = (0..20).map(|n| format!(" {n}")).collect();
        let src_text = format!("(list{many_args})");
        let src = forms(&mut heap, &src_text, env);
        // `list` frees each operand register as it pushes it onto the
        // stack frame, so this does not actually exhaust the pool; this
        // documents that expectation rather than forcing a failure.
        let result = crate::compile_program(&mut heap, &src, env);
        assert!(result.is_ok());
    }
}
