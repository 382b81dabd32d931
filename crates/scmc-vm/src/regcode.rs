//! Maps [`Register`] to/from the 6-bit register field an encoded
//! instruction word carries (spec §4.9: "register fields are 6 bits").

use scmc_ir::Register;

/// Sentinel meaning "no register" in an encoded operand slot.
pub const NONE: u8 = 63;

pub fn encode(reg: Register) -> u8 {
    match reg {
        Register::Pc => 0,
        Register::Ep => 1,
        Register::Dp => 2,
        Register::Hp => 3,
        Register::Sp => 4,
        Register::Fp => 5,
        Register::Lp => 6,
        Register::M => 7,
        Register::F => 8,
        Register::Lr => 9,
        Register::R(n) => 16 + n,
    }
}

pub fn decode(code: u8) -> Option<Register> {
    match code {
        0 => Some(Register::Pc),
        1 => Some(Register::Ep),
        2 => Some(Register::Dp),
        3 => Some(Register::Hp),
        4 => Some(Register::Sp),
        5 => Some(Register::Fp),
        6 => Some(Register::Lp),
        7 => Some(Register::M),
        8 => Some(Register::F),
        9 => Some(Register::Lr),
        16..=31 => Some(Register::R(code - 16)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn general_purpose_registers_round_trip() {
        for n in 0..16u8 {
            let reg = Register::R(n);
            assert_eq!(decode(encode(reg)), Some(reg));
        }
    }

    #[test]
    fn special_registers_round_trip() {
        for reg in [Register::Pc, Register::Ep, Register::Dp, Register::Hp, Register::Sp, Register::Fp, Register::Lp, Register::M, Register::F, Register::Lr] {
            assert_eq!(decode(encode(reg)), Some(reg));
        }
    }
}
