//! `Opcode as u8` is free (the enum is fieldless and declaration-ordered);
//! the reverse direction needs an explicit table since `scmc-ir` doesn't
//! carry one. Order must track `scmc_ir::opcode::Opcode` exactly.

use scmc_ir::Opcode;

const TABLE: &[Opcode] = &[
    Opcode::Nop,
    Opcode::Add,
    Opcode::Sub,
    Opcode::Mul,
    Opcode::Div,
    Opcode::Mod,
    Opcode::Neg,
    Opcode::Not,
    Opcode::Shl,
    Opcode::Shr,
    Opcode::Or,
    Opcode::And,
    Opcode::Xor,
    Opcode::Pow,
    Opcode::Br,
    Opcode::Blr,
    Opcode::Beq,
    Opcode::Bne,
    Opcode::Bl,
    Opcode::Ble,
    Opcode::Bg,
    Opcode::Bge,
    Opcode::Ret,
    Opcode::Bra,
    Opcode::Trap,
    Opcode::Exit,
    Opcode::Cmp,
    Opcode::Seq,
    Opcode::Sne,
    Opcode::Sl,
    Opcode::Sle,
    Opcode::Sg,
    Opcode::Sge,
    Opcode::Lea,
    Opcode::Load,
    Opcode::Store,
    Opcode::Move,
    Opcode::Push,
    Opcode::Pop,
    Opcode::Get,
    Opcode::Set,
    Opcode::Mma,
    Opcode::Car,
    Opcode::Cdr,
    Opcode::Setcar,
    Opcode::Setcdr,
    Opcode::Cons,
    Opcode::List,
    Opcode::Env,
    Opcode::Eval,
    Opcode::Error,
    Opcode::Write,
    Opcode::Qt,
    Opcode::Qq,
    Opcode::Apply,
    Opcode::Gc,
    Opcode::Type,
    Opcode::Const,
    Opcode::Ladd,
    Opcode::Lsub,
    Opcode::Lmul,
    Opcode::Ldiv,
    Opcode::Lmod,
    Opcode::Lnot,
    Opcode::Lcmp,
    Opcode::Pairp,
    Opcode::Symp,
    Opcode::Atomp,
    Opcode::Truep,
    Opcode::Falsep,
    Opcode::Fix,
    Opcode::Flo,
];

pub fn from_u8(code: u8) -> Option<Opcode> {
    TABLE.get(code as usize).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_order_matches_discriminants() {
        for (i, &op) in TABLE.iter().enumerate() {
            assert_eq!(op as u8, i as u8, "{} at wrong index", op.name());
        }
    }
}
