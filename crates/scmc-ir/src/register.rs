//! The register file instructions address: the special-purpose machine
//! registers plus the sixteen general-purpose `R0..R15` the compiler's
//! register pool allocates from.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Register {
    Pc,
    Ep,
    Dp,
    Hp,
    Sp,
    Fp,
    Lp,
    M,
    F,
    Lr,
    R(u8),
}

/// Number of general-purpose registers the compiler's pool draws from.
pub const GP_REGISTER_COUNT: u8 = 16;

impl Register {
    pub fn name(self) -> String {
        match self {
            Register::Pc => "PC".into(),
            Register::Ep => "EP".into(),
            Register::Dp => "DP".into(),
            Register::Hp => "HP".into(),
            Register::Sp => "SP".into(),
            Register::Fp => "FP".into(),
            Register::Lp => "LP".into(),
            Register::M => "M".into(),
            Register::F => "F".into(),
            Register::Lr => "LR".into(),
            Register::R(n) => format!("R{n}"),
        }
    }

    pub fn is_general_purpose(self) -> bool {
        matches!(self, Register::R(n) if n < GP_REGISTER_COUNT)
    }
}
