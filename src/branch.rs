//! Branch and label resolution: the two-pass scheme that lets forward
//! branches be emitted before their targets are known.
//!
//! Grounded in `cranelift_codegen::binemit::relaxation` in spirit (compute
//! final offsets, then patch displacements) but simplified: this ISA only
//! ever emits one branch encoding (a 5-byte near `jmp rel32`), so there is
//! no iterative relaxation loop to converge -- one forward pass over the
//! instruction tree records sites, one backward pass patches them, exactly
//! as the reference implementation's `wasmjit_compile_function` does after
//! `wasmjit_compile_instructions` returns.

use crate::buffer::{CodeBuffer, CodeOffset};
use crate::error::{CodegenError, CodegenResult};
use crate::types::LabelIndex;

/// What a recorded branch ultimately jumps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    /// A structured-control label (`block` end, `loop` head, `if` join).
    Label(LabelIndex),
    /// The sentinel for `return`: resolved to the epilogue's offset once
    /// the whole body has been compiled.
    FunctionExit,
}

/// One unresolved forward jump: the position of a near jump's 4-byte
/// relative displacement (immediately after its `0xE9` opcode byte), and
/// what it should eventually point at.
#[derive(Debug, Clone, Copy)]
struct BranchPoint {
    branch_offset: CodeOffset,
    continuation: Continuation,
}

/// Ordered list of unresolved forward jumps, filled in while the body is
/// translated and drained once by [`resolve`] after the whole function has
/// been emitted.
#[derive(Debug, Default)]
pub struct BranchTable {
    points: Vec<BranchPoint>,
}

impl BranchTable {
    pub fn new() -> Self {
        BranchTable::default()
    }

    /// Emits a near unconditional jump with a placeholder displacement at
    /// `buf`'s current offset and records it for later resolution.
    /// Returns the branch's `branch_offset` (position of the opcode byte).
    pub fn emit_jmp(&mut self, buf: &mut CodeBuffer, continuation: Continuation) -> CodeOffset {
        let branch_offset = buf.offset();
        buf.put1(0xe9);
        buf.put_placeholder4();
        self.points.push(BranchPoint {
            branch_offset,
            continuation,
        });
        branch_offset
    }
}

/// Maps a continuation_id (`LabelIndex`) to the code offset of its landing
/// site. For a `block` the landing site is the code after the block; for a
/// `loop` it is the code at the start of the block.
#[derive(Debug, Default)]
pub struct LabelTable {
    offsets: Vec<Option<CodeOffset>>,
}

impl LabelTable {
    pub fn new() -> Self {
        LabelTable::default()
    }

    /// Allocates a fresh, not-yet-resolved label and returns its id.
    pub fn alloc(&mut self) -> LabelIndex {
        let id = self.offsets.len() as u32;
        self.offsets.push(None);
        LabelIndex(id)
    }

    /// Binds a previously allocated label to a concrete code offset.
    pub fn resolve(&mut self, label: LabelIndex, offset: CodeOffset) {
        self.offsets[label.index()] = Some(offset);
    }

    fn get(&self, label: LabelIndex) -> CodegenResult<CodeOffset> {
        self.offsets
            .get(label.index())
            .and_then(|o| *o)
            .ok_or(CodegenError::IndexOutOfRange {
                what: "label",
                index: label.0,
            })
    }
}

/// Back-patches every recorded branch in `branches` against `labels` (or
/// `epilogue_offset` for the function-exit sentinel), writing each
/// resolved relative displacement into `buf` in place.
///
/// Per base spec §4.6: `target - (branch_offset + 5)` as a little-endian
/// signed 32-bit value, where `5` is the length of the `jmp rel32`
/// instruction whose opcode byte sits at `branch_offset`.
pub fn resolve(
    buf: &mut CodeBuffer,
    labels: &LabelTable,
    branches: &BranchTable,
    epilogue_offset: CodeOffset,
) -> CodegenResult<()> {
    for point in &branches.points {
        let target = match point.continuation {
            Continuation::Label(l) => labels.get(l)?,
            Continuation::FunctionExit => epilogue_offset,
        };
        let disp_site = point.branch_offset + 1;
        let rel = i64::from(target) - i64::from(point.branch_offset) - 5;
        let rel32 = i32::try_from(rel).map_err(|_| CodegenError::DisplacementOutOfRange {
            branch_offset: point.branch_offset,
            displacement: rel,
        })?;
        log::trace!("patching branch at {} -> {} (rel32 = {})", point.branch_offset, target, rel32);
        buf.patch4_at(disp_site, rel32 as u32);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_branch_resolves_to_later_label() {
        let mut buf = CodeBuffer::new();
        let mut labels = LabelTable::new();
        let mut branches = BranchTable::new();

        let l = labels.alloc();
        branches.emit_jmp(&mut buf, Continuation::Label(l));
        // Three bytes of filler between the jump and its target.
        buf.put1(0x90);
        buf.put1(0x90);
        buf.put1(0x90);
        labels.resolve(l, buf.offset());

        resolve(&mut buf, &labels, &branches, 0).unwrap();
        let bytes = buf.into_vec();
        assert_eq!(bytes[0], 0xe9);
        let rel = i32::from_le_bytes(bytes[1..5].try_into().unwrap());
        assert_eq!(rel, 3);
    }

    #[test]
    fn function_exit_sentinel_resolves_to_epilogue() {
        let mut buf = CodeBuffer::new();
        let labels = LabelTable::new();
        let mut branches = BranchTable::new();
        branches.emit_jmp(&mut buf, Continuation::FunctionExit);
        resolve(&mut buf, &labels, &branches, 42).unwrap();
        let bytes = buf.into_vec();
        let rel = i32::from_le_bytes(bytes[1..5].try_into().unwrap());
        assert_eq!(rel, 42 - 5);
    }

    #[test]
    fn out_of_range_displacement_is_an_error() {
        let mut buf = CodeBuffer::new();
        let mut labels = LabelTable::new();
        let mut branches = BranchTable::new();
        let l = labels.alloc();
        branches.emit_jmp(&mut buf, Continuation::Label(l));
        labels.resolve(l, i32::MAX as u32 + 100);
        assert!(resolve(&mut buf, &labels, &branches, 0).is_err());
    }
}
