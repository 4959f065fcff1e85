//! Named byte offsets into the runtime object layouts this compiler's
//! generated code reaches through, once a relocation has resolved to a
//! base pointer.
//!
//! Grounded in the reference implementation's `offsetof(struct FuncInst,
//! ...)`/`offsetof(struct MemInst, ...)` expressions scattered through its
//! code generator -- gathered here into one place per base spec §7
//! ("named byte-offset constants, not `offsetof`-style computation",
//! since this core has no C struct definitions to derive offsets from).

/// Offset of a `FuncInst`'s compiled-code entry pointer. `call`/`return`
/// reach through a `Func` relocation to this field to find the callee's
/// first instruction.
pub const FUNC_INST_COMPILED_CODE: i32 = 0;

/// Offset of a `MemInst`'s current size, in bytes, used by every bounds
/// check ahead of a load or store.
pub const MEM_INST_SIZE: i32 = 0;
/// Offset of a `MemInst`'s backing data pointer.
pub const MEM_INST_DATA: i32 = 8;

/// Offset of a `TableInst`'s length, used by `call_indirect`'s bounds
/// check against the callee index.
pub const TABLE_INST_LENGTH: i32 = 0;
/// Offset of a `TableInst`'s backing array of `FuncInst*` entries.
pub const TABLE_INST_DATA: i32 = 8;

/// A `GlobalInst`'s value is a tagged union; `get_global`/`set_global`
/// only ever touch the 8-byte payload, which sits at a fixed offset
/// regardless of which scalar type it holds (the four scalar fields of
/// the reference implementation's `union Value` all start at the same
/// byte, by construction of a C union).
pub const GLOBAL_INST_VALUE: i32 = 0;

/// Offset of a `TableInst` entry's `FuncInst*` within one table slot.
pub const TABLE_ENTRY_FUNC_INST: i32 = 0;
/// Offset of a `TableInst` entry's `FuncType*`, compared against the
/// static callee type at a `call_indirect` site before the call is taken.
pub const TABLE_ENTRY_FUNC_TYPE: i32 = 8;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_inst_size_precedes_data() {
        assert!(MEM_INST_SIZE < MEM_INST_DATA);
    }
}
