//! The static stack: a compile-time model of the operand/control stack.
//!
//! Grounded in the reference implementation's `struct StaticStack` (a
//! growable array of tagged `StackElt`s) and translated into an idiomatic
//! Rust sum type, with pattern-matched emit routines in place of the
//! reference's tag-switch.

use crate::error::{CodegenError, CodegenResult};
use crate::types::{LabelIndex, ValType};

/// One entry on the static stack: either a real 8-byte operand slot, or a
/// non-physical label marker introduced by `block`/`loop`/`if`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackSlot {
    Value(ValType),
    Label { arity: u32, continuation: LabelIndex },
}

/// Compile-time model of the running operand/control stack. Only `Value`
/// slots correspond to real 8-byte cells on `%rsp`; `Label` slots are
/// bookkeeping only.
#[derive(Debug, Clone, Default)]
pub struct StaticStack {
    elts: Vec<StackSlot>,
}

impl StaticStack {
    pub fn new() -> Self {
        StaticStack::default()
    }

    pub fn push_value(&mut self, vt: ValType) {
        self.elts.push(StackSlot::Value(vt));
    }

    pub fn push_label(&mut self, arity: u32, continuation: LabelIndex) {
        self.elts.push(StackSlot::Label { arity, continuation });
    }

    /// Returns the top slot without removing it.
    pub fn peek(&self) -> CodegenResult<StackSlot> {
        self.elts.last().copied().ok_or(CodegenError::StackUnderflow)
    }

    /// Returns the top slot's value type, asserting it is a `Value` slot
    /// of exactly the expected type -- mirrors the reference's
    /// `assert(peek_stack(sstack) == TYPE)` guards.
    pub fn expect_value(&self, expected: ValType) -> CodegenResult<()> {
        match self.peek()? {
            StackSlot::Value(vt) if vt == expected => Ok(()),
            _ => Err(CodegenError::StackUnderflow),
        }
    }

    pub fn pop(&mut self) -> CodegenResult<StackSlot> {
        self.elts.pop().ok_or(CodegenError::StackUnderflow)
    }

    /// Pops a value slot, asserting its type matches `expected`.
    pub fn pop_value(&mut self, expected: ValType) -> CodegenResult<()> {
        match self.pop()? {
            StackSlot::Value(vt) if vt == expected => Ok(()),
            _ => Err(CodegenError::StackUnderflow),
        }
    }

    pub fn len(&self) -> usize {
        self.elts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elts.is_empty()
    }

    pub fn truncate(&mut self, new_len: usize) {
        self.elts.truncate(new_len);
    }

    /// Shifts the top `arity` slots down onto position `from`, then
    /// truncates -- used after a structured block's nested instructions
    /// have been translated, to drop its label slot while keeping its
    /// result values, matching how `block`/`loop`/`if` drop their own
    /// label while keeping whatever the nested body left behind.
    pub fn shift_results_over_label(&mut self, label_pos: usize, arity: usize) {
        let len = self.elts.len();
        for i in 0..arity {
            self.elts[label_pos + i] = self.elts[len - arity + i];
        }
        self.elts.truncate(label_pos + arity);
    }

    /// Walks the stack from the top downward, skipping `label_count` label
    /// slots, and returns the index of the `label_count`-th label from the
    /// top (0-based) together with its arity and continuation id. This is
    /// the core of `emit_br_code`'s "find out bottom of stack to L" walk
    /// in the reference implementation.
    pub fn find_label_from_top(
        &self,
        mut label_count: u32,
    ) -> CodegenResult<(usize, u32, LabelIndex)> {
        let mut j = self.elts.len();
        while j > 0 {
            j -= 1;
            if let StackSlot::Label { arity, continuation } = self.elts[j] {
                if label_count == 0 {
                    return Ok((j, arity, continuation));
                }
                label_count -= 1;
            }
        }
        Err(CodegenError::IndexOutOfRange {
            what: "branch label",
            index: label_count,
        })
    }

    /// Number of `Value` slots above (at a higher stack position than)
    /// index `j`. Used to compute `stack_shift` in `emit_br_code`.
    pub fn value_slots_above(&self, j: usize) -> usize {
        self.elts[j + 1..]
            .iter()
            .filter(|s| matches!(s, StackSlot::Value(_)))
            .count()
    }

    /// Total `Value` slot count anywhere on the stack, ignoring labels.
    /// `return`'s shift-to-result computation needs the count relative to
    /// the whole physical stack rather than to any particular label, since
    /// it exits every enclosing block at once.
    pub fn total_value_slots(&self) -> usize {
        self.elts.iter().filter(|s| matches!(s, StackSlot::Value(_))).count()
    }

    #[cfg(test)]
    pub fn slots(&self) -> &[StackSlot] {
        &self.elts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_round_trips_type() {
        let mut s = StaticStack::new();
        s.push_value(ValType::I32);
        s.expect_value(ValType::I32).unwrap();
        s.pop_value(ValType::I32).unwrap();
        assert!(s.is_empty());
    }

    #[test]
    fn label_slots_do_not_count_as_values() {
        let mut s = StaticStack::new();
        s.push_value(ValType::I32);
        s.push_label(1, LabelIndex(0));
        s.push_value(ValType::I64);
        assert_eq!(s.value_slots_above(0), 1);
    }

    #[test]
    fn find_label_from_top_skips_inner_labels() {
        let mut s = StaticStack::new();
        s.push_label(0, LabelIndex(0));
        s.push_value(ValType::I32);
        s.push_label(1, LabelIndex(1));
        let (idx, arity, cont) = s.find_label_from_top(0).unwrap();
        assert_eq!(idx, 2);
        assert_eq!(arity, 1);
        assert_eq!(cont, LabelIndex(1));

        let (idx, arity, cont) = s.find_label_from_top(1).unwrap();
        assert_eq!(idx, 0);
        assert_eq!(arity, 0);
        assert_eq!(cont, LabelIndex(0));
    }

    #[test]
    fn shift_results_over_label_drops_label_keeps_arity() {
        let mut s = StaticStack::new();
        let label_pos = s.len();
        s.push_label(1, LabelIndex(0));
        s.push_value(ValType::I32);
        s.shift_results_over_label(label_pos, 1);
        assert_eq!(s.len(), 1);
        assert_eq!(s.peek().unwrap(), StackSlot::Value(ValType::I32));
    }
}
