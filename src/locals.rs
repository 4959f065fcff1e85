//! Locals metadata: assigns every parameter and declared local a fixed
//! frame-pointer-relative slot before a single byte of the body is
//! translated.
//!
//! Grounded in the reference implementation's locals-metadata computation
//! inside `wasmjit_compile_function` (the loop building `locals_md` ahead
//! of `output_function_prologue`): the first six integer-typed parameters
//! and first eight float-typed parameters arrive in argument registers and
//! are spilled below the frame pointer; any remaining parameters were
//! already pushed by the caller and sit above it; declared locals get
//! further slots below the last spilled parameter.

use crate::types::ValType;

/// Where one local (parameter or declared) lives relative to `%rbp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalSlot {
    pub valtype: ValType,
    /// Signed byte offset from the frame pointer. Negative for spilled
    /// register parameters and declared locals, positive for parameters
    /// left on the caller's stack.
    pub fp_offset: i32,
}

/// Maximum integer-class (i32/i64) arguments passed in registers under the
/// target's calling convention (`%rdi, %rsi, %rdx, %rcx, %r8, %r9`).
pub const MAX_GP_ARG_REGS: u32 = 6;
/// Maximum float-class (f32/f64) arguments passed in registers
/// (`%xmm0`..`%xmm7`).
pub const MAX_SSE_ARG_REGS: u32 = 8;

/// Per-function locals layout: one [`LocalSlot`] per parameter followed by
/// one per declared local, plus the bookkeeping the Function Driver needs
/// to size the frame and balance the prologue/epilogue.
#[derive(Debug, Clone)]
pub struct LocalsLayout {
    pub slots: Vec<LocalSlot>,
    /// Number of parameters spilled from an integer argument register.
    pub n_gp_spills: u32,
    /// Number of parameters spilled from an SSE argument register.
    pub n_sse_spills: u32,
    /// Number of parameters left on the caller's stack (7th+ integer
    /// parameter, or 9th+ float parameter).
    pub n_stack_params: u32,
    /// `n_frame_locals` in the reference implementation: the number of
    /// 8-byte slots below the frame pointer, spanning both spilled
    /// parameters and declared locals. The prologue subtracts this many
    /// slots worth of bytes from `%rsp` and the epilogue adds the same
    /// amount back, so this single count must stay symmetric between them.
    pub n_frame_locals: u32,
}

impl LocalsLayout {
    /// Total count of parameters plus declared locals.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, local_idx: usize) -> LocalSlot {
        self.slots[local_idx]
    }
}

/// Computes frame offsets for `params` (in declaration order) followed by
/// `declared` (each entry a `(valtype, count)` run, expanded in order).
pub fn layout_locals(params: &[ValType], declared: &[(ValType, u32)]) -> LocalsLayout {
    let mut slots = Vec::with_capacity(params.len() + declared.iter().map(|(_, c)| *c as usize).sum::<usize>());

    let mut n_gp = 0u32;
    let mut n_sse = 0u32;
    let mut n_stack = 0u32;

    for &vt in params {
        let fp_offset = if !vt.is_float() && n_gp < MAX_GP_ARG_REGS {
            let off = -((1 + n_gp + n_sse) as i32) * ValType::SLOT_BYTES;
            n_gp += 1;
            off
        } else if vt.is_float() && n_sse < MAX_SSE_ARG_REGS {
            let off = -((1 + n_gp + n_sse) as i32) * ValType::SLOT_BYTES;
            n_sse += 1;
            off
        } else {
            // Caller-pushed: return address at +8, saved rbp at +0, so the
            // first stack parameter lands at +16.
            let off = (2 + n_stack as i32) * ValType::SLOT_BYTES;
            n_stack += 1;
            off
        };
        slots.push(LocalSlot { valtype: vt, fp_offset });
    }

    let mut n_declared = 0u32;
    let spilled_so_far = n_gp + n_sse;
    for &(vt, count) in declared {
        for _ in 0..count {
            let off = -((1 + spilled_so_far + n_declared) as i32) * ValType::SLOT_BYTES;
            slots.push(LocalSlot { valtype: vt, fp_offset: off });
            n_declared += 1;
        }
    }

    LocalsLayout {
        slots,
        n_gp_spills: n_gp,
        n_sse_spills: n_sse,
        n_stack_params: n_stack,
        n_frame_locals: n_gp + n_sse + n_declared,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_six_integer_params_spill_to_negative_offsets() {
        let params = vec![ValType::I32; 6];
        let layout = layout_locals(&params, &[]);
        assert_eq!(layout.n_gp_spills, 6);
        assert_eq!(layout.n_stack_params, 0);
        assert_eq!(layout.slot(0).fp_offset, -8);
        assert_eq!(layout.slot(5).fp_offset, -48);
    }

    #[test]
    fn seventh_integer_param_spills_to_caller_stack() {
        let params = vec![ValType::I32; 7];
        let layout = layout_locals(&params, &[]);
        assert_eq!(layout.n_gp_spills, 6);
        assert_eq!(layout.n_stack_params, 1);
        assert_eq!(layout.slot(6).fp_offset, 16);
    }

    #[test]
    fn mixed_gp_and_sse_params_interleave_negative_slots() {
        let params = vec![ValType::I32, ValType::F64, ValType::I32];
        let layout = layout_locals(&params, &[]);
        assert_eq!(layout.slot(0).fp_offset, -8);
        assert_eq!(layout.slot(1).fp_offset, -16);
        assert_eq!(layout.slot(2).fp_offset, -24);
    }

    #[test]
    fn declared_locals_continue_below_spilled_params() {
        let params = vec![ValType::I32];
        let declared = vec![(ValType::I64, 2)];
        let layout = layout_locals(&params, &declared);
        assert_eq!(layout.slot(0).fp_offset, -8);
        assert_eq!(layout.slot(1).fp_offset, -16);
        assert_eq!(layout.slot(2).fp_offset, -24);
        assert_eq!(layout.n_frame_locals, 3);
    }

    #[test]
    fn ninth_float_param_spills_to_caller_stack_after_eight_sse_regs() {
        let params = vec![ValType::F64; 9];
        let layout = layout_locals(&params, &[]);
        assert_eq!(layout.n_sse_spills, 8);
        assert_eq!(layout.n_stack_params, 1);
        assert_eq!(layout.slot(8).fp_offset, 16);
    }
}
