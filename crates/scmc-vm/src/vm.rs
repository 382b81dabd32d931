//! Dispatch loop: fetch a word, decode it, execute. The VM shares the
//! evaluator's object heap directly — there is no separate VM-native
//! object area, only `code`/`dp`/`sp`, with the heap itself backing
//! the rest.

use std::cmp::Ordering;

use tracing::{debug, trace};

use scmc_eval::Evaluator;
use scmc_heap::{CellIdx, Heap, ObjType};
use scmc_ir::{Function, Opcode, Register};

use crate::encode::{decode_word, encode_instruction, Decoded};
use crate::error::{Result, VmError};
use crate::memory::{Code, Stack};
use crate::regs::RegisterFile;

/// Assembles `func`'s instructions into a flat word stream. Block
/// addresses are each block's first-instruction index directly — the
/// builder never revisits a block once it moves on to another, so a
/// block's instructions are always contiguous in `func.instructions`'
/// physical order, the same order the assembled words occupy.
pub fn assemble(func: &Function) -> Result<Vec<u64>> {
    func.instructions.iter().map(|instr| encode_instruction(instr, &func.blocks)).collect()
}

pub struct Vm<'a> {
    heap: &'a mut Heap,
    evaluator: &'a mut Evaluator,
    code: Code,
    constants: Vec<CellIdx>,
    regs: RegisterFile,
    dp: Stack,
    sp: Stack,
    truep_flag: bool,
    cmp: Ordering,
    halted: Option<i64>,
}

impl<'a> Vm<'a> {
    pub fn new(heap: &'a mut Heap, evaluator: &'a mut Evaluator, words: Vec<u64>, constants: Vec<CellIdx>, env: CellIdx) -> Self {
        let mut regs = RegisterFile::default();
        regs.ep = env;
        Self {
            heap,
            evaluator,
            code: Code { words },
            constants,
            regs,
            dp: Stack::default(),
            sp: Stack::default(),
            truep_flag: false,
            cmp: Ordering::Equal,
            halted: None,
        }
    }

    /// Runs from `pc = 0` until an `exit` instruction sets the exit code,
    /// returning it.
    pub fn run(&mut self) -> Result<i64> {
        self.regs.pc = 0;
        loop {
            if let Some(code) = self.halted {
                debug!(code, "vm halted");
                return Ok(code);
            }
            self.step()?;
        }
    }

    pub fn gpr(&self, n: u8) -> CellIdx {
        self.regs.gpr[n as usize]
    }

    fn fetch_decode(&mut self) -> Result<Decoded> {
        let word = self.code.fetch(self.regs.pc)?;
        Ok(decode_word(word))
    }

    fn reg(code: u8) -> Result<Register> {
        RegisterFile::decode_register(code)
    }

    fn read(&self, reg: Register) -> u64 {
        self.regs.read(reg, &self.dp, &self.sp)
    }

    fn write(&mut self, reg: Register, value: u64) -> Result<()> {
        self.regs.write(reg, value, &mut self.dp, &mut self.sp)
    }

    fn cell(&self, reg: Register) -> CellIdx {
        self.read(reg) as CellIdx
    }

    fn constant(&self, index: i64) -> Result<CellIdx> {
        self.constants.get(index as usize).copied().ok_or(VmError::UnknownConstant(index))
    }

    fn as_f32(&self, idx: CellIdx) -> Result<f32> {
        match self.heap.obj_type(idx) {
            ObjType::Fixnum => Ok(self.heap.get(idx).fixnum_value() as f32),
            ObjType::Flonum => Ok(self.heap.get(idx).flonum_value()),
            _ => Err(VmError::Eval(scmc_eval::EvalError::TypeMismatch { expected: "number", got: self.heap.obj_type(idx).name() })),
        }
    }

    fn is_truthy(&self, idx: CellIdx) -> bool {
        if self.heap.is_nil(idx) {
            return false;
        }
        !(self.heap.obj_type(idx) == ObjType::Boolean && !self.heap.get(idx).bool_value())
    }

    /// Pops `count` words off `dp` and returns them in the order they
    /// were pushed (the stack's top is the last-pushed value).
    fn pop_n(&mut self, count: i64) -> Result<Vec<CellIdx>> {
        let mut values = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count {
            values.push(self.dp.pop()? as CellIdx);
        }
        values.reverse();
        Ok(values)
    }

    fn list_from_vec(&mut self, values: &[CellIdx]) -> Result<CellIdx> {
        let mut acc = self.heap.nil();
        for &v in values.iter().rev() {
            acc = self.heap.alloc_cons(v, acc)?;
        }
        Ok(acc)
    }

    /// Builds `(head (quote head-value) (quote arg)...)`, then hands it to
    /// the tree-walking evaluator so a callee unknown at compile time
    /// (an interpreted closure, a primitive, a cfunc) dispatches exactly
    /// the way ordinary source would, without re-evaluating already-
    /// evaluated argument values.
    fn apply_dynamic(&mut self, head: CellIdx, args: &[CellIdx]) -> Result<CellIdx> {
        let quote_sym = self.heap.alloc_symbol("quote")?;
        let mut quoted = Vec::with_capacity(args.len() + 1);
        for &v in std::iter::once(&head).chain(args.iter()) {
            let inner = self.heap.alloc_cons(v, self.heap.nil())?;
            quoted.push(self.heap.alloc_cons(quote_sym, inner)?);
        }
        let form = self.list_from_vec(&quoted)?;
        Ok(self.evaluator.eval(self.heap, form, self.regs.ep)?)
    }

    fn step(&mut self) -> Result<()> {
        let decoded = self.fetch_decode()?;
        let opcode = crate::opmap::from_u8(decoded.opcode).ok_or(VmError::Unimplemented("unknown opcode"))?;
        trace!(pc = self.regs.pc, op = opcode.name(), "dispatch");
        let mut next_pc = self.regs.pc + 1;

        match opcode {
            Opcode::Nop => {}

            Opcode::Const | Opcode::Qt => {
                let value = self.constant(decoded.imm)?;
                self.write(Self::reg(decoded.reg_a)?, value as u64)?;
            }

            Opcode::Get => {
                let sym = self.constant(decoded.imm)?;
                let value = scmc_eval::get(self.heap, sym, self.regs.ep)?;
                self.write(Self::reg(decoded.reg_a)?, value as u64)?;
            }

            Opcode::Set => {
                let sym = self.constant(decoded.imm)?;
                let env_cell = self.cell(Self::reg(decoded.reg_a)?);
                let value = self.cell(Self::reg(decoded.reg_b)?);
                scmc_eval::set(self.heap, sym, value, env_cell)?;
            }

            Opcode::Move => {
                let src = Self::reg(decoded.reg_a)?;
                let dst = Self::reg(decoded.reg_b)?;
                let value = self.read(src);
                self.write(dst, value)?;
            }

            Opcode::Push => {
                let src = Self::reg(decoded.reg_a)?;
                let target = Self::reg(decoded.reg_b)?;
                let value = self.read(src);
                match target {
                    Register::Dp => self.dp.push(value),
                    Register::Sp => self.sp.push(value),
                    other => return Err(VmError::InvalidRegister(other)),
                }
            }

            Opcode::Pop => {
                let source = Self::reg(decoded.reg_a)?;
                let dst = Self::reg(decoded.reg_b)?;
                let value = match source {
                    Register::Dp => self.dp.pop()?,
                    Register::Sp => self.sp.pop()?,
                    other => return Err(VmError::InvalidRegister(other)),
                };
                self.write(dst, value)?;
            }

            Opcode::Truep => {
                let dst = Self::reg(decoded.reg_a)?;
                let value = self.cell(dst);
                self.truep_flag = self.is_truthy(value);
            }

            Opcode::Beq => {
                if self.truep_flag {
                    next_pc = decoded.imm as u64;
                }
            }

            Opcode::Bne => {
                if !self.truep_flag {
                    next_pc = decoded.imm as u64;
                }
            }

            Opcode::Br | Opcode::Bra => {
                next_pc = decoded.imm as u64;
            }

            Opcode::Blr => {
                self.regs.lr = self.regs.pc + 1;
                next_pc = decoded.imm as u64;
            }

            Opcode::Ret => {
                next_pc = self.read(Self::reg(decoded.reg_a)?);
            }

            Opcode::Exit => {
                self.halted = Some(decoded.imm);
                return Ok(());
            }

            Opcode::Not => {
                let src = Self::reg(decoded.reg_a)?;
                let dst = Self::reg(decoded.reg_b)?;
                let value = self.cell(src);
                let result = self.heap.make_bool(!self.is_truthy(value));
                self.write(dst, result as u64)?;
            }

            Opcode::Atomp => {
                let src = Self::reg(decoded.reg_a)?;
                let dst = Self::reg(decoded.reg_b)?;
                let value = self.cell(src);
                let result = self.heap.make_bool(self.heap.obj_type(value) != ObjType::Pair);
                self.write(dst, result as u64)?;
            }

            Opcode::Pairp => {
                let src = Self::reg(decoded.reg_a)?;
                let dst = Self::reg(decoded.reg_b)?;
                let value = self.cell(src);
                let result = self.heap.make_bool(self.heap.obj_type(value) == ObjType::Pair);
                self.write(dst, result as u64)?;
            }

            Opcode::Symp => {
                let src = Self::reg(decoded.reg_a)?;
                let dst = Self::reg(decoded.reg_b)?;
                let value = self.cell(src);
                let result = self.heap.make_bool(self.heap.obj_type(value) == ObjType::Symbol);
                self.write(dst, result as u64)?;
            }

            Opcode::Car => {
                let src = Self::reg(decoded.reg_a)?;
                let dst = Self::reg(decoded.reg_b)?;
                let value = self.cell(src);
                let result = self.heap.get(value).pair_parts().0;
                self.write(dst, result as u64)?;
            }

            Opcode::Cdr => {
                let src = Self::reg(decoded.reg_a)?;
                let dst = Self::reg(decoded.reg_b)?;
                let value = self.cell(src);
                let result = self.heap.get(value).pair_parts().1;
                self.write(dst, result as u64)?;
            }

            Opcode::Cons => {
                let a = self.cell(Self::reg(decoded.reg_a)?);
                let b = self.cell(Self::reg(decoded.reg_b)?);
                let c = Self::reg(decoded.reg_c)?;
                let result = self.heap.alloc_cons(a, b)?;
                self.write(c, result as u64)?;
            }

            Opcode::Setcar => {
                let pair = self.cell(Self::reg(decoded.reg_a)?);
                let value = self.cell(Self::reg(decoded.reg_b)?);
                let dst = Self::reg(decoded.reg_c)?;
                self.heap.set_car(pair, value)?;
                self.write(dst, value as u64)?;
            }

            Opcode::Setcdr => {
                let pair = self.cell(Self::reg(decoded.reg_a)?);
                let value = self.cell(Self::reg(decoded.reg_b)?);
                let dst = Self::reg(decoded.reg_c)?;
                self.heap.set_cdr(pair, value)?;
                self.write(dst, value as u64)?;
            }

            Opcode::List => {
                let count = decoded.imm / 8;
                let values = self.pop_n(count)?;
                let result = self.list_from_vec(&values)?;
                let dst = Self::reg(decoded.reg_b)?;
                self.write(dst, result as u64)?;
            }

            Opcode::Ladd | Opcode::Lsub | Opcode::Lmul | Opcode::Ldiv => {
                let values = self.pop_n(decoded.imm)?;
                let dst = Self::reg(decoded.reg_b)?;
                let result = self.arith_fold(opcode, &values)?;
                self.write(dst, result as u64)?;
            }

            Opcode::Lmod => {
                let values = self.pop_n(decoded.imm)?;
                let dst = Self::reg(decoded.reg_b)?;
                if values.len() < 2 {
                    return Err(VmError::Eval(scmc_eval::EvalError::ArityError { form: "mod" }));
                }
                let x = self.fixnum(values[0])?;
                let y = self.fixnum(values[1])?;
                let result = self.heap.alloc_fixnum(if y == 0 { 0 } else { x % y })?;
                self.write(dst, result as u64)?;
            }

            Opcode::Lcmp => {
                let a = self.cell(Self::reg(decoded.reg_a)?);
                let b = self.cell(Self::reg(decoded.reg_b)?);
                let (x, y) = (self.as_f32(a)?, self.as_f32(b)?);
                self.cmp = x.partial_cmp(&y).unwrap_or(Ordering::Equal);
            }

            Opcode::Seq | Opcode::Sne | Opcode::Sl | Opcode::Sle | Opcode::Sg | Opcode::Sge => {
                let dst = Self::reg(decoded.reg_a)?;
                let accept = match opcode {
                    Opcode::Seq => self.cmp == Ordering::Equal,
                    Opcode::Sne => self.cmp != Ordering::Equal,
                    Opcode::Sl => self.cmp == Ordering::Less,
                    Opcode::Sle => self.cmp != Ordering::Greater,
                    Opcode::Sg => self.cmp == Ordering::Greater,
                    Opcode::Sge => self.cmp != Ordering::Less,
                    _ => unreachable!(),
                };
                let result = self.heap.make_bool(accept);
                self.write(dst, result as u64)?;
            }

            Opcode::Env => {
                let parent = self.cell(Self::reg(decoded.reg_a)?);
                let dst = Self::reg(decoded.reg_b)?;
                let child = scmc_eval::make(self.heap, parent, false)?;
                self.write(dst, child as u64)?;
            }

            Opcode::Error => {
                let src = Self::reg(decoded.reg_a)?;
                let dst = Self::reg(decoded.reg_b)?;
                let args = self.cell(src);
                let nil = self.heap.nil();
                let error = self.heap.alloc_error(args, nil)?;
                self.write(dst, error as u64)?;
            }

            Opcode::Apply => {
                let head = self.cell(Self::reg(decoded.reg_b)?);
                let args = self.pop_n(decoded.imm)?;
                let result = self.apply_dynamic(head, &args)?;
                self.write(Self::reg(decoded.reg_b)?, result as u64)?;
            }

            other => return Err(VmError::Unimplemented(other.name())),
        }

        self.regs.pc = next_pc;
        Ok(())
    }

    fn fixnum(&self, idx: CellIdx) -> Result<i32> {
        match self.heap.obj_type(idx) {
            ObjType::Fixnum => Ok(self.heap.get(idx).fixnum_value()),
            other => Err(VmError::Eval(scmc_eval::EvalError::TypeMismatch { expected: "fixnum", got: other.name() })),
        }
    }

    /// Mirrors the tree-walking evaluator's `arith_fold`: coerces every
    /// operand through flonum and always produces a flonum, with the
    /// single-operand case negating/reciprocating rather than folding.
    fn arith_fold(&mut self, opcode: Opcode, values: &[CellIdx]) -> Result<CellIdx> {
        if values.is_empty() {
            return Err(VmError::Eval(scmc_eval::EvalError::ArityError { form: opcode.name() }));
        }
        let (unary, fold): (fn(f32) -> f32, fn(f32, f32) -> f32) = match opcode {
            Opcode::Ladd => (|x| x, |a, b| a + b),
            Opcode::Lsub => (|x| -x, |a, b| a - b),
            Opcode::Lmul => (|x| x, |a, b| a * b),
            Opcode::Ldiv => (|x| 1.0 / x, |a, b| a / b),
            _ => unreachable!(),
        };
        let mut acc = self.as_f32(values[0])?;
        if values.len() == 1 {
            acc = unary(acc);
        } else {
            for &v in &values[1..] {
                acc = fold(acc, self.as_f32(v)?);
            }
        }
        Ok(self.heap.alloc_flonum(acc)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scmc_heap::Heap;
    use scmc_reader::{read, Cursor};

    fn forms(heap: &mut Heap, src: &str) -> Vec<CellIdx> {
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

    fn run_program(src: &str) -> (Heap, CellIdx) {
        let mut heap = Heap::new(1 << 16);
        let mut evaluator = Evaluator::new();
        let env = scmc_eval::make(&mut heap, heap.nil(), true).unwrap();
        evaluator.install_primitives(&mut heap, env).unwrap();
        let top_forms = forms(&mut heap, src);
        let (func, constants) = scmc_compiler::compile_program(&mut heap, &top_forms, env).unwrap();
        let words = assemble(&func).unwrap();
        let result_idx = {
            let mut vm = Vm::new(&mut heap, &mut evaluator, words, constants, env);
            vm.run().unwrap();
            vm.gpr(0)
        };
        (heap, result_idx)
    }

    #[test]
    fn literal_program_leaves_its_value_in_r0() {
        let (heap, result) = run_program("42");
        assert_eq!(heap.get(result).fixnum_value(), 42);
    }

    #[test]
    fn arithmetic_coerces_through_flonum() {
        let (heap, result) = run_program("(+ 2 3)");
        assert_eq!(heap.get(result).flonum_value(), 5.0);
    }

    #[test]
    fn if_picks_the_taken_branch() {
        let (heap, result) = run_program("(if (< 1 2) 10 20)");
        assert_eq!(heap.get(result).fixnum_value(), 10);
    }

    #[test]
    fn defining_and_calling_a_compiled_procedure() {
        let (heap, result) = run_program("(let sq (fn (x) (* x x))) (sq 7)");
        assert_eq!(heap.get(result).flonum_value(), 49.0);
    }

    #[test]
    fn cons_car_cdr_round_trip() {
        let (heap, result) = run_program("(car (cons 1 2))");
        assert_eq!(heap.get(result).fixnum_value(), 1);
    }

    #[test]
    fn recursive_compiled_call_does_not_stomp_the_caller_s_parameter() {
        let (heap, result) = run_program("(let f (fn (n) (if (= n 0) 0 (+ n (f (- n 1)))))) (f 3)");
        assert_eq!(heap.get(result).flonum_value(), 6.0);
    }

    #[test]
    fn nested_calls_through_blr_do_not_share_a_parameter_frame() {
        // `quad` calls the already-known `double` twice with different
        // arguments; each call must bind its own `x` in its own frame, and
        // `quad`'s own `y` must survive both calls unchanged.
        let (heap, result) = run_program("(let double (fn (x) (+ x x))) (let quad (fn (y) (+ (double y) (double (+ y 1))))) (quad 3)");
        assert_eq!(heap.get(result).flonum_value(), 14.0);
    }
}
