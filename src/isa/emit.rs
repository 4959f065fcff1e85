//! Concrete x86_64 instruction emitters.
//!
//! Each function appends exactly one instruction's bytes to a
//! [`CodeBuffer`]. Grounded instruction-by-instruction in the reference
//! implementation's byte sequences (re-derived here rather than copied,
//! since two of its literal escape sequences are transcription errors --
//! see `DESIGN.md`), using the REX/ModRM/SIB builders in sibling modules
//! the way `cranelift-assembler-x64` composes them.

use crate::buffer::CodeBuffer;
use crate::error::{CodegenError, CodegenResult};
use crate::isa::modrm::{encode_modrm, encode_sib, md, RM_NEEDS_SIB, SIB_NO_INDEX};
use crate::isa::regs::{Gpr, Xmm};
use crate::isa::rex::Rex;

/// Condition codes for `Jcc`/`SETcc`, numbered as the x86_64 opcode
/// encoding expects (`0x0F 0x8{cc}` / `0x0F 0x9{cc}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cc {
    B = 0x2,
    Ae = 0x3,
    E = 0x4,
    Ne = 0x5,
    Be = 0x6,
    A = 0x7,
    S = 0x8,
    P = 0xa,
    Np = 0xb,
    L = 0xc,
    Ge = 0xd,
    Le = 0xe,
    G = 0xf,
}

/// Emits a `mov`-with-displacement addressing byte(s) for `[base + disp]`,
/// choosing the `disp8`/`disp32`/no-disp form and the SIB byte `rsp`/`r12`
/// require as a base.
fn emit_mem_operand(buf: &mut CodeBuffer, reg_field: u8, base: Gpr, disp: i32) {
    let needs_sib = (base.enc() & 0b111) == RM_NEEDS_SIB;
    let m0d = if disp == 0 && (base.enc() & 0b111) != 0b101 {
        md::NO_DISP
    } else if (-128..=127).contains(&disp) {
        md::DISP8
    } else {
        md::DISP32
    };
    let rm = if needs_sib { RM_NEEDS_SIB } else { base.enc() & 0b111 };
    buf.put1(encode_modrm(m0d, reg_field, rm));
    if needs_sib {
        buf.put1(encode_sib(0, SIB_NO_INDEX, base.enc() & 0b111));
    }
    match m0d {
        md::DISP8 => buf.put1(disp as i8 as u8),
        md::DISP32 => buf.put4(disp as u32),
        _ => {}
    }
}

/// `mov dst, src` (register to register), 32- or 64-bit depending on `w`.
pub fn mov_reg_reg(buf: &mut CodeBuffer, dst: Gpr, src: Gpr, w: bool) {
    let mut rex = Rex::new().reg(src).rm(dst);
    if w {
        rex = rex.w();
    }
    if w || !rex.is_trivial() {
        buf.put1(rex.byte());
    }
    buf.put1(0x89);
    buf.put1(encode_modrm(md::REG_DIRECT, src.enc() & 0b111, dst.enc() & 0b111));
}

/// `movsxd dst, src` -- sign-extends the low 32 bits of `src` into the
/// full 64-bit `dst` (opcode `0x63`, always `REX.W`).
pub fn movsxd_reg_reg(buf: &mut CodeBuffer, dst: Gpr, src: Gpr) {
    let rex = Rex::new().w().reg(dst).rm(src);
    buf.put1(rex.byte());
    buf.put1(0x63);
    buf.put1(encode_modrm(md::REG_DIRECT, dst.enc() & 0b111, src.enc() & 0b111));
}

/// `mov dst, imm32`, zero-extending into the 64-bit register (the `B8+rd`
/// form always zeroes the upper 32 bits on this ISA).
pub fn mov_imm32_zext_reg(buf: &mut CodeBuffer, dst: Gpr, imm: u32) {
    let rex = Rex::new().rm(dst);
    if !rex.is_trivial() {
        buf.put1(rex.byte());
    }
    buf.put1(0xb8 + (dst.enc() & 0b111));
    buf.put4(imm);
}

/// `movabs dst, imm64`.
pub fn movabs_imm64_reg(buf: &mut CodeBuffer, dst: Gpr, imm: u64) {
    let rex = Rex::new().w().rm(dst);
    buf.put1(rex.byte());
    buf.put1(0xb8 + (dst.enc() & 0b111));
    buf.put8(imm);
}

/// `movabs dst, <placeholder>` -- emits the instruction with an all-zero
/// immediate and returns the code offset of the 8-byte immediate field, so
/// the caller can record a relocation there for a loader to patch in the
/// real runtime address later.
pub fn movabs_placeholder(buf: &mut CodeBuffer, dst: Gpr) -> u32 {
    let rex = Rex::new().w().rm(dst);
    buf.put1(rex.byte());
    buf.put1(0xb8 + (dst.enc() & 0b111));
    let imm_site = buf.offset();
    buf.put8(0);
    imm_site
}

/// `mov dst, [base + index*scale + disp]`.
pub fn load_mem_sib_to_reg(buf: &mut CodeBuffer, dst: Gpr, base: Gpr, index: Gpr, scale: u8, disp: i32, w: bool) {
    let mut rex = Rex::new().reg(dst).rm(base).index(index);
    if w {
        rex = rex.w();
    }
    if w || !rex.is_trivial() {
        buf.put1(rex.byte());
    }
    buf.put1(0x8b);
    emit_mem_operand_sib(buf, dst.enc() & 0b111, base, index, scale, disp);
}

/// `mov [base + index*scale + disp], src`.
pub fn store_reg_to_mem_sib(buf: &mut CodeBuffer, base: Gpr, index: Gpr, scale: u8, disp: i32, src: Gpr, w: bool) {
    let mut rex = Rex::new().reg(src).rm(base).index(index);
    if w {
        rex = rex.w();
    }
    if w || !rex.is_trivial() {
        buf.put1(rex.byte());
    }
    buf.put1(0x89);
    emit_mem_operand_sib(buf, src.enc() & 0b111, base, index, scale, disp);
}

/// `movsx dst, byte [base + index*scale + disp]`.
pub fn load_mem_sib_to_reg_sext8(buf: &mut CodeBuffer, dst: Gpr, base: Gpr, index: Gpr, scale: u8, disp: i32, w: bool) {
    let mut rex = Rex::new().reg(dst).rm(base).index(index);
    if w {
        rex = rex.w();
    }
    if w || !rex.is_trivial() {
        buf.put1(rex.byte());
    }
    buf.put1(0x0f);
    buf.put1(0xbe);
    emit_mem_operand_sib(buf, dst.enc() & 0b111, base, index, scale, disp);
}

/// `mov byte [base + index*scale + disp], src`.
pub fn store_reg_to_mem_sib8(buf: &mut CodeBuffer, base: Gpr, index: Gpr, scale: u8, disp: i32, src: Gpr) {
    let rex = Rex::new().reg(src).rm(base).index(index).always_emit_for_byte_reg();
    buf.put1(rex.byte());
    buf.put1(0x88);
    emit_mem_operand_sib(buf, src.enc() & 0b111, base, index, scale, disp);
}

/// `mov word [base + index*scale + disp], src`.
pub fn store_reg_to_mem_sib16(buf: &mut CodeBuffer, base: Gpr, index: Gpr, scale: u8, disp: i32, src: Gpr) {
    buf.put1(0x66);
    let rex = Rex::new().reg(src).rm(base).index(index);
    if !rex.is_trivial() {
        buf.put1(rex.byte());
    }
    buf.put1(0x89);
    emit_mem_operand_sib(buf, src.enc() & 0b111, base, index, scale, disp);
}

fn emit_mem_operand_sib(buf: &mut CodeBuffer, reg_field: u8, base: Gpr, index: Gpr, scale: u8, disp: i32) {
    let m0d = if disp == 0 && (base.enc() & 0b111) != 0b101 {
        md::NO_DISP
    } else if (-128..=127).contains(&disp) {
        md::DISP8
    } else {
        md::DISP32
    };
    buf.put1(encode_modrm(m0d, reg_field, RM_NEEDS_SIB));
    buf.put1(encode_sib(scale, index.enc() & 0b111, base.enc() & 0b111));
    match m0d {
        md::DISP8 => buf.put1(disp as i8 as u8),
        md::DISP32 => buf.put4(disp as u32),
        _ => {}
    }
}

/// `mov dst, [base + disp]`.
pub fn load_mem_to_reg(buf: &mut CodeBuffer, dst: Gpr, base: Gpr, disp: i32, w: bool) {
    let mut rex = Rex::new().reg(dst).rm(base);
    if w {
        rex = rex.w();
    }
    if w || !rex.is_trivial() {
        buf.put1(rex.byte());
    }
    buf.put1(0x8b);
    emit_mem_operand(buf, dst.enc() & 0b111, base, disp);
}

/// `mov [base + disp], src`.
pub fn store_reg_to_mem(buf: &mut CodeBuffer, base: Gpr, disp: i32, src: Gpr, w: bool) {
    let mut rex = Rex::new().reg(src).rm(base);
    if w {
        rex = rex.w();
    }
    if w || !rex.is_trivial() {
        buf.put1(rex.byte());
    }
    buf.put1(0x89);
    emit_mem_operand(buf, src.enc() & 0b111, base, disp);
}

/// `movsx dst, byte [base + disp]` (8-bit sign-extending load).
pub fn load_mem_to_reg_sext8(buf: &mut CodeBuffer, dst: Gpr, base: Gpr, disp: i32, w: bool) {
    let mut rex = Rex::new().reg(dst).rm(base);
    if w {
        rex = rex.w();
    }
    if w || !rex.is_trivial() {
        buf.put1(rex.byte());
    }
    buf.put1(0x0f);
    buf.put1(0xbe);
    emit_mem_operand(buf, dst.enc() & 0b111, base, disp);
}

/// `mov byte [base + disp], src` (8-bit truncating store).
pub fn store_reg_to_mem8(buf: &mut CodeBuffer, base: Gpr, disp: i32, src: Gpr) {
    let rex = Rex::new().reg(src).rm(base).always_emit_for_byte_reg();
    buf.put1(rex.byte());
    buf.put1(0x88);
    emit_mem_operand(buf, src.enc() & 0b111, base, disp);
}

/// `mov word [base + disp], src` (16-bit truncating store).
pub fn store_reg_to_mem16(buf: &mut CodeBuffer, base: Gpr, disp: i32, src: Gpr) {
    buf.put1(0x66);
    let rex = Rex::new().reg(src).rm(base);
    if !rex.is_trivial() {
        buf.put1(rex.byte());
    }
    buf.put1(0x89);
    emit_mem_operand(buf, src.enc() & 0b111, base, disp);
}

pub fn push_reg(buf: &mut CodeBuffer, r: Gpr) {
    if r.is_extended() {
        buf.put1(Rex::new().rm(r).byte());
    }
    buf.put1(0x50 + (r.enc() & 0b111));
}

pub fn pop_reg(buf: &mut CodeBuffer, r: Gpr) {
    if r.is_extended() {
        buf.put1(Rex::new().rm(r).byte());
    }
    buf.put1(0x58 + (r.enc() & 0b111));
}

/// A register-register ALU opcode's `MR`-form opcode byte, used by
/// [`alu_reg_reg`]: `dst op= src` (AT&T `op src, dst`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Sub,
    And,
    Or,
    Xor,
    Cmp,
}

impl AluOp {
    fn opcode(self) -> u8 {
        match self {
            AluOp::Add => 0x01,
            AluOp::Sub => 0x29,
            AluOp::And => 0x21,
            AluOp::Or => 0x09,
            AluOp::Xor => 0x31,
            AluOp::Cmp => 0x39,
        }
    }

    /// `/digit` opcode extension used by the imm8/imm32-immediate form
    /// (`0x81 /digit id`).
    fn imm_ext(self) -> u8 {
        match self {
            AluOp::Add => 0,
            AluOp::Or => 1,
            AluOp::And => 4,
            AluOp::Sub => 5,
            AluOp::Xor => 6,
            AluOp::Cmp => 7,
        }
    }
}

/// `dst <op>= src` for a register-register ALU op.
pub fn alu_reg_reg(buf: &mut CodeBuffer, op: AluOp, dst: Gpr, src: Gpr, w: bool) {
    let mut rex = Rex::new().reg(src).rm(dst);
    if w {
        rex = rex.w();
    }
    if w || !rex.is_trivial() {
        buf.put1(rex.byte());
    }
    buf.put1(op.opcode());
    buf.put1(encode_modrm(md::REG_DIRECT, src.enc() & 0b111, dst.enc() & 0b111));
}

/// `dst <op>= imm32` (sign-extended to 64 bits when `w`).
pub fn alu_reg_imm32(buf: &mut CodeBuffer, op: AluOp, dst: Gpr, imm: i32, w: bool) {
    let mut rex = Rex::new().rm(dst);
    if w {
        rex = rex.w();
    }
    if w || !rex.is_trivial() {
        buf.put1(rex.byte());
    }
    buf.put1(0x81);
    buf.put1(encode_modrm(md::REG_DIRECT, op.imm_ext(), dst.enc() & 0b111));
    buf.put4(imm as u32);
}

/// `test dst, src`.
pub fn test_reg_reg(buf: &mut CodeBuffer, dst: Gpr, src: Gpr, w: bool) {
    let mut rex = Rex::new().reg(src).rm(dst);
    if w {
        rex = rex.w();
    }
    if w || !rex.is_trivial() {
        buf.put1(rex.byte());
    }
    buf.put1(0x85);
    buf.put1(encode_modrm(md::REG_DIRECT, src.enc() & 0b111, dst.enc() & 0b111));
}

/// `imul dst, src` (`dst *= src`).
pub fn imul_reg_reg(buf: &mut CodeBuffer, dst: Gpr, src: Gpr, w: bool) {
    let mut rex = Rex::new().reg(dst).rm(src);
    if w {
        rex = rex.w();
    }
    if w || !rex.is_trivial() {
        buf.put1(rex.byte());
    }
    buf.put1(0x0f);
    buf.put1(0xaf);
    buf.put1(encode_modrm(md::REG_DIRECT, dst.enc() & 0b111, src.enc() & 0b111));
}

/// `idiv divisor` (`%rdx:%rax / divisor -> quotient %rax, remainder %rdx`).
pub fn idiv_reg(buf: &mut CodeBuffer, divisor: Gpr, w: bool) {
    div_family(buf, divisor, w, 7);
}

/// `div divisor` (unsigned form of [`idiv_reg`]).
pub fn div_reg(buf: &mut CodeBuffer, divisor: Gpr, w: bool) {
    div_family(buf, divisor, w, 6);
}

fn div_family(buf: &mut CodeBuffer, divisor: Gpr, w: bool, ext: u8) {
    let mut rex = Rex::new().rm(divisor);
    if w {
        rex = rex.w();
    }
    if w || !rex.is_trivial() {
        buf.put1(rex.byte());
    }
    buf.put1(0xf7);
    buf.put1(encode_modrm(md::REG_DIRECT, ext, divisor.enc() & 0b111));
}

/// `cdq` (32-bit) / `cqo` (64-bit): sign-extends `%eax`/`%rax` into
/// `%edx:%eax`/`%rdx:%rax` ahead of a signed divide.
pub fn sign_extend_ax_into_dx(buf: &mut CodeBuffer, w: bool) {
    if w {
        buf.put1(Rex::new().w().byte());
    }
    buf.put1(0x99);
}

/// `xor %edx, %edx` -- zero-extends ahead of an unsigned divide.
pub fn zero_reg(buf: &mut CodeBuffer, r: Gpr) {
    alu_reg_reg(buf, AluOp::Xor, r, r, false);
}

/// Shift opcode extensions for [`shift_reg_cl`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftOp {
    Shl,
    ShrLogical,
    ShrArith,
}

impl ShiftOp {
    fn ext(self) -> u8 {
        match self {
            ShiftOp::Shl => 4,
            ShiftOp::ShrLogical => 5,
            ShiftOp::ShrArith => 7,
        }
    }
}

/// `dst <<= %cl` / `dst >>= %cl` (logical or arithmetic).
pub fn shift_reg_cl(buf: &mut CodeBuffer, op: ShiftOp, dst: Gpr, w: bool) {
    let mut rex = Rex::new().rm(dst);
    if w {
        rex = rex.w();
    }
    if w || !rex.is_trivial() {
        buf.put1(rex.byte());
    }
    buf.put1(0xd3);
    buf.put1(encode_modrm(md::REG_DIRECT, op.ext(), dst.enc() & 0b111));
}

/// `setcc dst8` followed by a zero-extending widen into the full register,
/// matching the reference implementation's "set a byte, then movzx" idiom
/// for materializing a comparison's boolean result.
pub fn setcc_zext(buf: &mut CodeBuffer, cc: Cc, dst: Gpr) {
    // setcc needs a REX prefix even with no extended fields when the
    // byte-register operand is rsp/rbp/rsi/rdi, to select the low byte
    // rather than the legacy ah/ch/dh/bh encoding.
    let rex = Rex::new().rm(dst).always_emit_for_byte_reg();
    buf.put1(rex.byte());
    buf.put1(0x0f);
    buf.put1(0x90 + cc as u8);
    buf.put1(encode_modrm(md::REG_DIRECT, 0, dst.enc() & 0b111));

    let rex = Rex::new().reg(dst).rm(dst);
    buf.put1(rex.byte());
    buf.put1(0x0f);
    buf.put1(0xb6);
    buf.put1(encode_modrm(md::REG_DIRECT, dst.enc() & 0b111, dst.enc() & 0b111));
}

/// `cmovne dst, src`.
pub fn cmovne_reg_reg(buf: &mut CodeBuffer, dst: Gpr, src: Gpr, w: bool) {
    let mut rex = Rex::new().reg(dst).rm(src);
    if w {
        rex = rex.w();
    }
    if w || !rex.is_trivial() {
        buf.put1(rex.byte());
    }
    buf.put1(0x0f);
    buf.put1(0x45);
    buf.put1(encode_modrm(md::REG_DIRECT, dst.enc() & 0b111, src.enc() & 0b111));
}

/// Emits a near conditional jump (`0F 8{cc} rel32`) with a placeholder
/// displacement and returns the offset of the opcode's first byte, for the
/// caller to patch once the jump's target offset is known. Used for
/// `br_if`'s locally-resolved skip-jump, which (unlike a structured-control
/// branch) never needs the deferred [`crate::branch::BranchTable`]
/// machinery because its target is always a few instructions ahead in the
/// same translation step.
pub fn jcc_near_placeholder(buf: &mut CodeBuffer, cc: Cc) -> u32 {
    let site = buf.offset();
    buf.put1(0x0f);
    buf.put1(0x80 + cc as u8);
    buf.put_placeholder4();
    site
}

/// Patches a [`jcc_near_placeholder`] site's displacement to land at
/// `target` -- a purely local resolution, used when the jump's target
/// (a few instructions later in the same straight-line sequence) is known
/// immediately after emitting it, unlike a structured-control branch whose
/// target may not exist yet.
pub fn patch_jcc_near(buf: &mut CodeBuffer, site: u32, target: u32) -> CodegenResult<()> {
    let rel = i64::from(target) - i64::from(site) - 6;
    let rel32 = i32::try_from(rel)
        .map_err(|_| CodegenError::DisplacementOutOfRange { branch_offset: site, displacement: rel })?;
    buf.patch4_at(site + 2, rel32 as u32);
    Ok(())
}

/// Emits a near unconditional jump (`E9 rel32`) with a placeholder
/// displacement and returns its site, for local resolution the same way
/// as [`jcc_near_placeholder`]/[`patch_jcc_near`] (used by `if`'s
/// then-branch skip-over-else jump, whose target -- the join point after
/// the else body -- is filled in once the else body has been emitted).
pub fn jmp_near_placeholder(buf: &mut CodeBuffer) -> u32 {
    let site = buf.offset();
    buf.put1(0xe9);
    buf.put_placeholder4();
    site
}

pub fn patch_jmp_near(buf: &mut CodeBuffer, site: u32, target: u32) -> CodegenResult<()> {
    let rel = i64::from(target) - i64::from(site) - 5;
    let rel32 = i32::try_from(rel)
        .map_err(|_| CodegenError::DisplacementOutOfRange { branch_offset: site, displacement: rel })?;
    buf.patch4_at(site + 1, rel32 as u32);
    Ok(())
}

/// `call dst` (indirect, through a register).
pub fn call_reg(buf: &mut CodeBuffer, dst: Gpr) {
    if dst.is_extended() {
        buf.put1(Rex::new().rm(dst).byte());
    }
    buf.put1(0xff);
    buf.put1(encode_modrm(md::REG_DIRECT, 2, dst.enc() & 0b111));
}

pub fn ret(buf: &mut CodeBuffer) {
    buf.put1(0xc3);
}

/// `int3` -- used for the debug breakpoint the prologue emits when
/// [`crate::settings::Flags::emit_debug_trap`] is set.
pub fn int3(buf: &mut CodeBuffer) {
    buf.put1(0xcc);
}

/// `int $4` -- the overflow/bounds trap the reference implementation uses
/// for out-of-range memory accesses.
pub fn int4(buf: &mut CodeBuffer) {
    buf.put1(0xcd);
    buf.put1(0x04);
}

/// `ud2` -- raises an invalid-opcode fault, used for `unreachable`.
pub fn ud2(buf: &mut CodeBuffer) {
    buf.put1(0x0f);
    buf.put1(0x0b);
}

pub fn nop(buf: &mut CodeBuffer) {
    buf.put1(0x90);
}

// --- SSE2 scalar double-precision ops ---

fn sse_rex(reg: u8, rm_ext: bool, reg_ext: bool) -> Option<u8> {
    let mut rex = Rex::new();
    if reg_ext {
        rex.r = true;
    }
    if rm_ext {
        rex.b = true;
    }
    let _ = reg;
    if rex.is_trivial() {
        None
    } else {
        Some(rex.byte())
    }
}

/// `movsd dst, [base + disp]`.
pub fn movsd_load(buf: &mut CodeBuffer, dst: Xmm, base: Gpr, disp: i32) {
    buf.put1(0xf2);
    if let Some(b) = sse_rex(dst.enc(), base.is_extended(), dst.is_extended()) {
        buf.put1(b);
    }
    buf.put1(0x0f);
    buf.put1(0x10);
    emit_mem_operand_xmm(buf, dst.enc() & 0b111, base, disp);
}

/// `movsd [base + disp], src`.
pub fn movsd_store(buf: &mut CodeBuffer, base: Gpr, disp: i32, src: Xmm) {
    buf.put1(0xf2);
    if let Some(b) = sse_rex(src.enc(), base.is_extended(), src.is_extended()) {
        buf.put1(b);
    }
    buf.put1(0x0f);
    buf.put1(0x11);
    emit_mem_operand_xmm(buf, src.enc() & 0b111, base, disp);
}

fn emit_mem_operand_xmm(buf: &mut CodeBuffer, reg_field: u8, base: Gpr, disp: i32) {
    emit_mem_operand(buf, reg_field, base, disp);
}

/// `movsd dst, [base + index*scale + disp]`.
pub fn movsd_load_sib(buf: &mut CodeBuffer, dst: Xmm, base: Gpr, index: Gpr, scale: u8, disp: i32) {
    buf.put1(0xf2);
    let mut rex = Rex::new();
    if dst.is_extended() {
        rex.r = true;
    }
    if base.is_extended() {
        rex.b = true;
    }
    if index.is_extended() {
        rex.x = true;
    }
    if !rex.is_trivial() {
        buf.put1(rex.byte());
    }
    buf.put1(0x0f);
    buf.put1(0x10);
    emit_mem_operand_sib(buf, dst.enc() & 0b111, base, index, scale, disp);
}

/// `movsd [base + index*scale + disp], src`.
pub fn movsd_store_sib(buf: &mut CodeBuffer, base: Gpr, index: Gpr, scale: u8, disp: i32, src: Xmm) {
    buf.put1(0xf2);
    let mut rex = Rex::new();
    if src.is_extended() {
        rex.r = true;
    }
    if base.is_extended() {
        rex.b = true;
    }
    if index.is_extended() {
        rex.x = true;
    }
    if !rex.is_trivial() {
        buf.put1(rex.byte());
    }
    buf.put1(0x0f);
    buf.put1(0x11);
    emit_mem_operand_sib(buf, src.enc() & 0b111, base, index, scale, disp);
}

/// `movsd dst, src` (register to register, low 64 bits only).
pub fn movsd_reg_reg(buf: &mut CodeBuffer, dst: Xmm, src: Xmm) {
    buf.put1(0xf2);
    if let Some(b) = sse_rex(dst.enc(), src.is_extended(), dst.is_extended()) {
        buf.put1(b);
    }
    buf.put1(0x0f);
    buf.put1(0x10);
    buf.put1(encode_modrm(md::REG_DIRECT, dst.enc() & 0b111, src.enc() & 0b111));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SseOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl SseOp {
    fn opcode(self) -> u8 {
        match self {
            SseOp::Add => 0x58,
            SseOp::Sub => 0x5c,
            SseOp::Mul => 0x59,
            SseOp::Div => 0x5e,
        }
    }
}

/// `dst <op>= src`, scalar double precision.
pub fn sse_reg_reg(buf: &mut CodeBuffer, op: SseOp, dst: Xmm, src: Xmm) {
    buf.put1(0xf2);
    if let Some(b) = sse_rex(dst.enc(), src.is_extended(), dst.is_extended()) {
        buf.put1(b);
    }
    buf.put1(0x0f);
    buf.put1(op.opcode());
    buf.put1(encode_modrm(md::REG_DIRECT, dst.enc() & 0b111, src.enc() & 0b111));
}

/// `ucomisd a, b` -- ordered compare setting `ZF`/`PF`/`CF`, `PF` set on an
/// unordered (NaN) result. The reference implementation's f64 `eq`/`ne`
/// use this plus `setnp`/`setp`/`cmovne` to fold the NaN case in.
pub fn ucomisd(buf: &mut CodeBuffer, a: Xmm, b: Xmm) {
    buf.put1(0x66);
    if let Some(rex) = sse_rex(a.enc(), b.is_extended(), a.is_extended()) {
        buf.put1(rex);
    }
    buf.put1(0x0f);
    buf.put1(0x2e);
    buf.put1(encode_modrm(md::REG_DIRECT, a.enc() & 0b111, b.enc() & 0b111));
}

/// `cvtsi2sd dst, src` (signed integer to double).
pub fn cvtsi2sd(buf: &mut CodeBuffer, dst: Xmm, src: Gpr, w: bool) {
    buf.put1(0xf2);
    let mut rex = Rex::new();
    if dst.is_extended() {
        rex.r = true;
    }
    if src.is_extended() {
        rex.b = true;
    }
    if w {
        rex = rex.w();
    }
    if w || !rex.is_trivial() {
        buf.put1(rex.byte());
    }
    buf.put1(0x0f);
    buf.put1(0x2a);
    buf.put1(encode_modrm(md::REG_DIRECT, dst.enc() & 0b111, src.enc() & 0b111));
}

/// `cvttsd2si dst, src` (double to signed integer, truncating).
pub fn cvttsd2si(buf: &mut CodeBuffer, dst: Gpr, src: Xmm, w: bool) {
    buf.put1(0xf2);
    let mut rex = Rex::new();
    if dst.is_extended() {
        rex.r = true;
    }
    if src.is_extended() {
        rex.b = true;
    }
    if w {
        rex = rex.w();
    }
    if w || !rex.is_trivial() {
        buf.put1(rex.byte());
    }
    buf.put1(0x0f);
    buf.put1(0x2c);
    buf.put1(encode_modrm(md::REG_DIRECT, dst.enc() & 0b111, src.enc() & 0b111));
}

/// `movq dst(xmm), src(gpr)` -- bit-reinterpret a 64-bit integer into an
/// xmm register's low 64 bits.
pub fn movq_gpr_to_xmm(buf: &mut CodeBuffer, dst: Xmm, src: Gpr) {
    buf.put1(0x66);
    let mut rex = Rex::new().w();
    if dst.is_extended() {
        rex.r = true;
    }
    if src.is_extended() {
        rex.b = true;
    }
    buf.put1(rex.byte());
    buf.put1(0x0f);
    buf.put1(0x6e);
    buf.put1(encode_modrm(md::REG_DIRECT, dst.enc() & 0b111, src.enc() & 0b111));
}

/// `movq dst(gpr), src(xmm)` -- the inverse of [`movq_gpr_to_xmm`].
pub fn movq_xmm_to_gpr(buf: &mut CodeBuffer, dst: Gpr, src: Xmm) {
    buf.put1(0x66);
    let mut rex = Rex::new().w();
    if src.is_extended() {
        rex.r = true;
    }
    if dst.is_extended() {
        rex.b = true;
    }
    buf.put1(rex.byte());
    buf.put1(0x0f);
    buf.put1(0x7e);
    buf.put1(encode_modrm(md::REG_DIRECT, src.enc() & 0b111, dst.enc() & 0b111));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mov_reg_reg_64bit_has_rex_w() {
        let mut buf = CodeBuffer::new();
        mov_reg_reg(&mut buf, Gpr::Rax, Gpr::Rcx, true);
        assert_eq!(buf.into_vec(), vec![0x48, 0x89, 0xc8]);
    }

    #[test]
    fn load_mem_disp8() {
        let mut buf = CodeBuffer::new();
        load_mem_to_reg(&mut buf, Gpr::Rax, Gpr::Rbp, -8, true);
        assert_eq!(buf.into_vec(), vec![0x48, 0x8b, 0x45, 0xf8]);
    }

    #[test]
    fn push_pop_round_trip_bytes() {
        let mut buf = CodeBuffer::new();
        push_reg(&mut buf, Gpr::Rbp);
        mov_reg_reg(&mut buf, Gpr::Rbp, Gpr::Rsp, true);
        pop_reg(&mut buf, Gpr::Rbp);
        ret(&mut buf);
        assert_eq!(buf.into_vec(), vec![0x55, 0x48, 0x89, 0xe5, 0x5d, 0xc3]);
    }

    #[test]
    fn alu_imm32_uses_81_ext5_for_sub() {
        let mut buf = CodeBuffer::new();
        alu_reg_imm32(&mut buf, AluOp::Sub, Gpr::Rsp, 32, true);
        assert_eq!(buf.into_vec(), vec![0x48, 0x81, 0xec, 0x20, 0x00, 0x00, 0x00]);
    }
}
