//! REX prefix construction.
//!
//! Grounded directly in `cranelift-assembler-x64`'s `rex::RexFlags`: a
//! small builder tracking the `W`/`R`/`X`/`B` bits plus whether the prefix
//! must be emitted even when all bits are clear (the 8-bit-register case,
//! irrelevant here since this core only ever addresses 32/64-bit operands
//! and xmm registers, so that corner is omitted).

use crate::isa::regs::Gpr;

/// `0100WRXB` prefix byte builder. `W` selects the 64-bit operand size;
/// `R` extends ModRM.reg; `X` extends SIB.index; `B` extends ModRM.rm or
/// SIB.base or the low bits of an opcode-embedded register.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rex {
    pub w: bool,
    pub r: bool,
    pub x: bool,
    pub b: bool,
    /// Emit the prefix even when `w`/`r`/`x`/`b` are all clear. Needed for
    /// byte-register operands on `rsp`/`rbp`/`rsi`/`rdi`: the mere presence
    /// of a REX prefix (not any bit in it) is what selects their low byte
    /// instead of the legacy `ah`/`ch`/`dh`/`bh` encoding.
    pub force: bool,
}

impl Rex {
    pub fn new() -> Self {
        Rex::default()
    }

    /// See [`Rex::force`].
    pub fn always_emit_for_byte_reg(mut self) -> Self {
        self.force = true;
        self
    }

    pub fn w(mut self) -> Self {
        self.w = true;
        self
    }

    /// Sets `R` from a ModRM.reg-field register.
    pub fn reg(mut self, r: Gpr) -> Self {
        self.r = r.is_extended();
        self
    }

    /// Sets `B` from a ModRM.rm-field or opcode-embedded register.
    pub fn rm(mut self, b: Gpr) -> Self {
        self.b = b.is_extended();
        self
    }

    /// Sets `X` from a SIB.index-field register.
    pub fn index(mut self, x: Gpr) -> Self {
        self.x = x.is_extended();
        self
    }

    pub fn byte(self) -> u8 {
        0x40 | (self.w as u8) << 3 | (self.r as u8) << 2 | (self.x as u8) << 1 | (self.b as u8)
    }

    /// True when this prefix carries no bits beyond the mandatory `0100`
    /// pattern and was not forced, i.e. it could be omitted for operands
    /// that don't need one.
    pub fn is_trivial(self) -> bool {
        !self.w && !self.r && !self.x && !self.b && !self.force
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rex_w_alone_is_0x48() {
        assert_eq!(Rex::new().w().byte(), 0x48);
    }

    #[test]
    fn extended_rm_register_sets_b() {
        assert_eq!(Rex::new().w().rm(Gpr::R8).byte(), 0x49);
    }

    #[test]
    fn extended_reg_field_sets_r() {
        assert_eq!(Rex::new().w().reg(Gpr::R9).byte(), 0x4c);
    }
}
