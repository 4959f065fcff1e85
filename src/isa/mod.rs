//! The x86_64 instruction set layer: registers, REX/ModRM/SIB encoding, and
//! the concrete instruction emitters the translator calls into.
//!
//! Grounded in `cranelift-assembler-x64`'s `rex` module: this crate needs
//! only a slice of that encoder's generality (one ISA, a fixed handful of
//! addressing-mode shapes actually used by the reference implementation's
//! code generator), so the helpers here are freestanding functions rather
//! than a trait-based instruction builder.

pub mod emit;
pub mod modrm;
pub mod regs;
pub mod rex;

pub use emit::*;
pub use regs::{Gpr, Xmm};
