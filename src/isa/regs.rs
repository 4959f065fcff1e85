//! Register names and the System V AMD64 argument-register orderings.
//!
//! Grounded in the reference implementation's fixed `movs`/`f32_movs`/
//! `f64_movs` register-name tables used when shuffling call arguments, and
//! in `cranelift-assembler-x64`'s register enums (here scoped to exactly
//! the 16 general-purpose and 16 `xmm` registers, since this core never
//! allocates beyond a handful of fixed scratch registers).

/// A general-purpose integer register, numbered as the x86_64 encoding
/// expects (`RexFlags`/ModRM consumers take this numbering directly).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gpr {
    Rax = 0,
    Rcx = 1,
    Rdx = 2,
    Rbx = 3,
    Rsp = 4,
    Rbp = 5,
    Rsi = 6,
    Rdi = 7,
    R8 = 8,
    R9 = 9,
    R10 = 10,
    R11 = 11,
    R12 = 12,
    R13 = 13,
    R14 = 14,
    R15 = 15,
}

impl Gpr {
    /// Raw 4-bit register number (`REX.B`/`REX.R`/`REX.X` combine with the
    /// low 3 bits encoded in ModRM/SIB/opcode to pick one of 16).
    pub fn enc(self) -> u8 {
        self as u8
    }

    /// True when this register's encoding needs `REX.B`/`REX.R`/`REX.X`
    /// set (register numbers 8-15).
    pub fn is_extended(self) -> bool {
        self.enc() >= 8
    }
}

/// One `xmm` register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Xmm(pub u8);

impl Xmm {
    pub fn enc(self) -> u8 {
        self.0
    }

    pub fn is_extended(self) -> bool {
        self.0 >= 8
    }
}

/// System V AMD64 integer argument registers, in calling-convention order:
/// `rdi, rsi, rdx, rcx, r8, r9`.
pub const GP_ARG_REGS: [Gpr; 6] = [Gpr::Rdi, Gpr::Rsi, Gpr::Rdx, Gpr::Rcx, Gpr::R8, Gpr::R9];

/// System V AMD64 SSE argument registers, `xmm0..xmm7`.
pub const SSE_ARG_REGS: [Xmm; 8] = [
    Xmm(0),
    Xmm(1),
    Xmm(2),
    Xmm(3),
    Xmm(4),
    Xmm(5),
    Xmm(6),
    Xmm(7),
];

/// Fixed scratch registers the translator uses for intermediate values
/// that never cross a call (the static stack's top cells, effectively,
/// are materialized into these rather than kept symbolically resident).
pub const SCRATCH_0: Gpr = Gpr::Rax;
pub const SCRATCH_1: Gpr = Gpr::Rcx;
pub const SCRATCH_2: Gpr = Gpr::Rdx;
/// Holds the base pointer to a `MemInst`/`GlobalInst`/`TableInst` while a
/// relocation's immediate is materialized ahead of the access it guards.
pub const SCRATCH_ADDR: Gpr = Gpr::Rsi;
