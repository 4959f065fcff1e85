//! System V AMD64 call-argument classification.
//!
//! Grounded in the reference implementation's `call`/`call_indirect`
//! argument-shuffle logic: walk the callee's declared input types in
//! order, hand integer-class values to the first six `movs`-table
//! registers and float-class values to the first eight SSE registers,
//! and leave everything past those counts to be passed on the stack, with
//! the reference's `n_movs`/`n_xmm_movs`/`n_stack` counters kept here as
//! [`CallAbi`] fields instead of locals re-derived at every call site.

use crate::isa::regs::{Gpr, Xmm, GP_ARG_REGS, SSE_ARG_REGS};
use crate::types::ValType;

/// Where one call argument lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgLocation {
    Gp(Gpr),
    Sse(Xmm),
    /// Byte offset from `%rsp` at the instant of the `call`, i.e. after
    /// any alignment padding and all stack arguments have been pushed.
    Stack(u32),
}

/// The per-callsite argument layout computed by [`classify`].
#[derive(Debug, Clone)]
pub struct CallAbi {
    /// One entry per callee input, in declaration order.
    pub arg_locations: Vec<ArgLocation>,
    /// Total bytes this call pushes onto the stack for stack-resident
    /// arguments, already rounded so that `%rsp` is 16-byte aligned at the
    /// `call` instruction (the System V AMD64 ABI's one hard alignment
    /// requirement at a call site).
    pub stack_bytes: u32,
    /// Whether the callee's single result (if any) comes back in `%xmm0`
    /// rather than `%rax`.
    pub result_in_xmm0: bool,
}

/// Classifies `arg_types` (a callee's input types, in order) into register
/// or stack locations, and records whether `result` (the callee's single
/// output, if any) returns through `%xmm0`.
///
/// `live_value_slots` is the number of 8-byte cells already live on the
/// physical stack above the (16-byte-aligned) frame at the point of this
/// call -- base spec §4.5's "current total stack depth... determines
/// whether an extra 8-byte pad is needed to keep `%rsp` 16-byte aligned at
/// the call site". Only its parity matters.
pub fn classify(arg_types: &[ValType], result: Option<ValType>, live_value_slots: usize) -> CallAbi {
    let mut locations = Vec::with_capacity(arg_types.len());
    let mut n_gp = 0usize;
    let mut n_sse = 0usize;
    let mut n_stack_slots = 0u32;

    for &vt in arg_types {
        let loc = if !vt.is_float() && n_gp < GP_ARG_REGS.len() {
            let l = ArgLocation::Gp(GP_ARG_REGS[n_gp]);
            n_gp += 1;
            l
        } else if vt.is_float() && n_sse < SSE_ARG_REGS.len() {
            let l = ArgLocation::Sse(SSE_ARG_REGS[n_sse]);
            n_sse += 1;
            l
        } else {
            let l = ArgLocation::Stack(n_stack_slots * 8);
            n_stack_slots += 1;
            l
        };
        locations.push(loc);
    }

    // The frame itself is always 16-byte aligned (`frame.rs` rounds up), so
    // alignment at the call instruction depends only on the parity of the
    // live operand slots already on the stack plus the stack-passed
    // arguments this call is about to push. Add one padding slot when that
    // combined count is odd.
    let pad = (live_value_slots + n_stack_slots as usize) % 2;
    let stack_bytes = (n_stack_slots as usize + pad) as u32 * 8;

    CallAbi {
        arg_locations: locations,
        stack_bytes,
        result_in_xmm0: matches!(result, Some(vt) if vt.is_float()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_six_ints_and_eight_floats_go_to_registers() {
        let types = vec![ValType::I32; 6];
        let abi = classify(&types, None, 0);
        assert!(abi.arg_locations.iter().all(|l| matches!(l, ArgLocation::Gp(_))));
        assert_eq!(abi.stack_bytes, 0);
    }

    #[test]
    fn overflow_arguments_go_to_an_aligned_stack_area() {
        let mut types = vec![ValType::I32; 6];
        types.push(ValType::I32);
        let abi = classify(&types, None, 0);
        assert_eq!(abi.arg_locations[6], ArgLocation::Stack(0));
        // One stack slot plus zero live slots is odd: one padding slot
        // keeps %rsp 16-byte aligned.
        assert_eq!(abi.stack_bytes, 16);
    }

    #[test]
    fn odd_live_depth_flips_the_padding_decision() {
        let mut types = vec![ValType::I32; 6];
        types.push(ValType::I32);
        // One live value slot already on the stack plus this call's one
        // stack argument is even: no padding slot needed.
        let abi = classify(&types, None, 1);
        assert_eq!(abi.stack_bytes, 8);
    }

    #[test]
    fn float_result_reports_xmm0() {
        let abi = classify(&[], Some(ValType::F64), 0);
        assert!(abi.result_in_xmm0);
    }

    #[test]
    fn int_and_float_args_consume_independent_register_files() {
        let types = vec![ValType::F64, ValType::I32, ValType::F64];
        let abi = classify(&types, None, 0);
        assert_eq!(abi.arg_locations[0], ArgLocation::Sse(Xmm(0)));
        assert_eq!(abi.arg_locations[1], ArgLocation::Gp(Gpr::Rdi));
        assert_eq!(abi.arg_locations[2], ArgLocation::Sse(Xmm(1)));
    }
}
