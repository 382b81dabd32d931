//! The VM's register file: sixteen general-purpose registers plus the
//! special scalar registers spec §4.9 names (`Pc`, `Ep`, `Fp`, `Lr`,
//! `Hp`, `M`, `F`, `Lp`). `Dp`/`Sp` are not stored here — reading or
//! writing them means reading/truncating the matching [`crate::memory::Stack`]'s
//! depth, so the dispatch loop handles those two registers specially.

use scmc_heap::CellIdx;
use scmc_ir::Register;

use crate::error::{Result, VmError};
use crate::memory::Stack;

#[derive(Debug, Default)]
pub struct RegisterFile {
    pub gpr: [CellIdx; scmc_ir::GP_REGISTER_COUNT],
    pub pc: u64,
    pub ep: CellIdx,
    pub fp: u64,
    pub lr: u64,
    pub hp: u64,
    pub m: u64,
    pub f: u64,
    pub lp: u64,
}

impl RegisterFile {
    /// Reads `reg`'s value as a raw word. `Dp`/`Sp` read as the matching
    /// stack's current depth, the way `enter()`/`leave()`'s `move sp, fp`
    /// pair treats the stack pointer as a plain integer.
    pub fn read(&self, reg: Register, dp: &Stack, sp: &Stack) -> u64 {
        match reg {
            Register::R(n) => self.gpr[n as usize] as u64,
            Register::Pc => self.pc,
            Register::Ep => self.ep as u64,
            Register::Fp => self.fp,
            Register::Lr => self.lr,
            Register::Hp => self.hp,
            Register::M => self.m,
            Register::F => self.f,
            Register::Lp => self.lp,
            Register::Dp => dp.depth(),
            Register::Sp => sp.depth(),
        }
    }

    pub fn write(&mut self, reg: Register, value: u64, dp: &mut Stack, sp: &mut Stack) -> Result<()> {
        match reg {
            Register::R(n) => self.gpr[n as usize] = value as CellIdx,
            Register::Pc => self.pc = value,
            Register::Ep => self.ep = value as CellIdx,
            Register::Fp => self.fp = value,
            Register::Lr => self.lr = value,
            Register::Hp => self.hp = value,
            Register::M => self.m = value,
            Register::F => self.f = value,
            Register::Lp => self.lp = value,
            Register::Dp => dp.truncate_to(value as usize),
            Register::Sp => sp.truncate_to(value as usize),
        }
        Ok(())
    }

    pub fn get_cell(&self, reg: Register, dp: &Stack, sp: &Stack) -> CellIdx {
        self.read(reg, dp, sp) as CellIdx
    }

    pub fn decode_register(code: u8) -> Result<Register> {
        crate::regcode::decode(code).ok_or(VmError::InvalidRegister(Register::R(code & 0x0f)))
    }
}
