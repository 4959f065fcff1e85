//! The output buffer: a growable byte vector accumulating machine code.
//!
//! Grounded in `cranelift_codegen::binemit::memorysink::MemoryCodeSink` and
//! its `CodeSink` trait, scaled down: `cranelift-codegen`'s `CodeSink` is a
//! trait object boundary because it has to serve many `TargetIsa`
//! implementations. This crate targets exactly one ISA, so the sink is a
//! concrete growable `Vec<u8>` (base spec §9: "bump-style growable byte
//! vector... is the right primitive; no pointer aliasing across growth"),
//! with the same `put1`/`put2`/`put4`/`put8` shape as `CodeSink`.

/// Byte offset from the start of the function's code. Kept as its own type
/// (rather than bare `usize`) the way Cranelift's `CodeOffset` is, so
/// offsets read as offsets rather than arbitrary lengths in signatures.
pub type CodeOffset = u32;

/// Growable code buffer with in-place patching for back-patched sites
/// (branch displacements, jump-table entries, spilled immediates that are
/// filled in after the fact).
#[derive(Debug, Default)]
pub struct CodeBuffer {
    bytes: Vec<u8>,
}

impl CodeBuffer {
    pub fn new() -> Self {
        CodeBuffer { bytes: Vec::new() }
    }

    #[inline]
    pub fn offset(&self) -> CodeOffset {
        self.bytes.len() as CodeOffset
    }

    #[inline]
    pub fn put1(&mut self, b: u8) {
        self.bytes.push(b);
    }

    #[inline]
    pub fn put2(&mut self, v: u16) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    #[inline]
    pub fn put4(&mut self, v: u32) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    #[inline]
    pub fn put8(&mut self, v: u64) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    #[inline]
    pub fn put_bytes(&mut self, bs: &[u8]) {
        self.bytes.extend_from_slice(bs);
    }

    /// Reserves a 4-byte placeholder (conventionally `0x90909090`, four
    /// `nop`s, so a disassembly of an unpatched buffer still reads
    /// sensibly) and returns its offset for later patching.
    pub fn put_placeholder4(&mut self) -> CodeOffset {
        let at = self.offset();
        self.put4(0x9090_9090);
        at
    }

    /// Overwrites the 4-byte little-endian value at `at` in place. Used
    /// for back-patched branch displacements and jump-table entries.
    pub fn patch4_at(&mut self, at: CodeOffset, v: u32) {
        let at = at as usize;
        self.bytes[at..at + 4].copy_from_slice(&v.to_le_bytes());
    }

    /// Overwrites the 8-byte little-endian value at `at` in place. Used to
    /// fill in relocatable absolute-address immediates when the core
    /// itself needs to rewrite one (the loader does the same for the
    /// values it patches post-hand-off).
    pub fn patch8_at(&mut self, at: CodeOffset, v: u64) {
        let at = at as usize;
        self.bytes[at..at + 8].copy_from_slice(&v.to_le_bytes());
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.bytes
    }

    #[cfg(test)]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_and_patch_round_trip() {
        let mut buf = CodeBuffer::new();
        buf.put1(0x90);
        let at = buf.put_placeholder4();
        buf.put1(0xc3);
        assert_eq!(buf.as_slice(), &[0x90, 0x90, 0x90, 0x90, 0x90, 0xc3]);
        buf.patch4_at(at, 0xdead_beef);
        assert_eq!(&buf.as_slice()[1..5], &0xdead_beef_u32.to_le_bytes());
    }

    #[test]
    fn offsets_track_appended_bytes() {
        let mut buf = CodeBuffer::new();
        assert_eq!(buf.offset(), 0);
        buf.put8(0);
        assert_eq!(buf.offset(), 8);
    }
}
