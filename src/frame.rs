//! The Function Driver: per-function frame layout, prologue, and epilogue.
//!
//! Grounded in the reference implementation's `output_function_prologue`/
//! `output_function_epilogue` pair: a standard `rbp`-based frame, spilling
//! register-resident parameters below the frame pointer and zeroing
//! declared locals, with the epilogue reclaiming exactly the bytes the
//! prologue reserved.

use crate::buffer::CodeBuffer;
use crate::isa::emit;
use crate::isa::regs::{Gpr, Xmm, GP_ARG_REGS, SCRATCH_0, SSE_ARG_REGS};
use crate::locals::{layout_locals, LocalsLayout};
use crate::settings::Flags;
use crate::types::ValType;

/// A function's computed frame: where every parameter/local lives, and
/// how many bytes the prologue reserves below the frame pointer.
#[derive(Debug, Clone)]
pub struct FrameInfo {
    pub locals: LocalsLayout,
    /// Bytes subtracted from `%rsp` in the prologue (and added back in the
    /// epilogue), rounded up to a multiple of 16 so that a `call` inside
    /// the function body sees a correctly aligned stack.
    pub frame_bytes: u32,
}

/// Computes a function's frame layout from its parameter types (in
/// declaration order) and its declared-local runs (`(valtype, count)`).
pub fn compute_frame(params: &[ValType], declared: &[(ValType, u32)]) -> FrameInfo {
    let locals = layout_locals(params, declared);
    let raw = locals.n_frame_locals * 8;
    let frame_bytes = (raw + 15) & !15;
    FrameInfo { locals, frame_bytes }
}

/// Emits the standard frame-pointer prologue: save the caller's frame
/// pointer, establish a new one, reserve the frame, spill register-resident
/// parameters into it, and zero declared locals.
pub fn emit_prologue(buf: &mut CodeBuffer, frame: &FrameInfo, flags: &Flags) {
    emit::push_reg(buf, Gpr::Rbp);
    emit::mov_reg_reg(buf, Gpr::Rbp, Gpr::Rsp, true);

    if flags.emit_debug_trap() {
        emit::int3(buf);
    }

    if frame.frame_bytes > 0 {
        emit::alu_reg_imm32(buf, emit::AluOp::Sub, Gpr::Rsp, frame.frame_bytes as i32, true);
    }

    let n_params = frame.locals.n_gp_spills as usize
        + frame.locals.n_sse_spills as usize
        + frame.locals.n_stack_params as usize;
    let mut n_gp = 0usize;
    let mut n_sse = 0usize;
    for slot in &frame.locals.slots[..n_params] {
        // Stack-resident parameters are already in place above %rbp and
        // need no prologue store.
        if slot.fp_offset > 0 {
            continue;
        }
        if !slot.valtype.is_float() {
            emit::store_reg_to_mem(buf, Gpr::Rbp, slot.fp_offset, GP_ARG_REGS[n_gp], true);
            n_gp += 1;
        } else {
            emit::movsd_store(buf, Gpr::Rbp, slot.fp_offset, SSE_ARG_REGS[n_sse]);
            n_sse += 1;
        }
    }

    if !frame.locals.is_empty() {
        zero_declared_locals(buf, frame);
    }
}

fn zero_declared_locals(buf: &mut CodeBuffer, frame: &FrameInfo) {
    let n_params = frame.locals.n_gp_spills as usize
        + frame.locals.n_sse_spills as usize
        + frame.locals.n_stack_params as usize;
    let declared = &frame.locals.slots[n_params..];
    if declared.is_empty() {
        return;
    }
    emit::zero_reg(buf, SCRATCH_0);
    for slot in declared {
        // An all-zero f64 bit pattern is identical to an all-zero i64, so
        // a plain 64-bit GP store zeroes float locals too.
        emit::store_reg_to_mem(buf, Gpr::Rbp, slot.fp_offset, SCRATCH_0, true);
    }
}

/// Emits the epilogue: reclaim the frame, restore the caller's frame
/// pointer, and return. The function's single result (if any) must
/// already be resident in `%rax`/`%xmm0` by the time this runs -- `return`
/// and fallthrough both arrange that before jumping or falling into here.
pub fn emit_epilogue(buf: &mut CodeBuffer, frame: &FrameInfo) {
    if frame.frame_bytes > 0 {
        emit::alu_reg_imm32(buf, emit::AluOp::Add, Gpr::Rsp, frame.frame_bytes as i32, true);
    }
    emit::pop_reg(buf, Gpr::Rbp);
    emit::ret(buf);
}

/// Result register for a given value type's return slot, per base spec
/// §4.5: integer results in `%rax`, float results in `%xmm0`.
pub fn result_gp_reg() -> Gpr {
    Gpr::Rax
}

pub fn result_sse_reg() -> Xmm {
    Xmm(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_bytes_round_up_to_16() {
        let frame = compute_frame(&[ValType::I32], &[]);
        assert_eq!(frame.frame_bytes, 16);
    }

    #[test]
    fn empty_function_has_no_frame() {
        let frame = compute_frame(&[], &[]);
        assert_eq!(frame.frame_bytes, 0);
    }

    #[test]
    fn prologue_then_epilogue_balances_rsp_adjustment() {
        let frame = compute_frame(&[ValType::I32, ValType::I64], &[(ValType::F64, 1)]);
        let flags = Flags::default();
        let mut buf = CodeBuffer::new();
        emit_prologue(&mut buf, &frame, &flags);
        let after_prologue = buf.offset();
        emit_epilogue(&mut buf, &frame);
        assert!(buf.offset() > after_prologue);
    }
}
