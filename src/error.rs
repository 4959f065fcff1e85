//! Compile-time error taxonomy.
//!
//! Grounded in `cranelift_codegen::incremental_cache::RecompileError`: one
//! variant per failure cause, a hand-written `Display` impl, no `thiserror`.
//! The core never retries and never partially succeeds -- every variant
//! here fails the whole function.

use core::fmt;

/// Result type returned by every fallible entry point in this crate.
pub type CodegenResult<T> = Result<T, CodegenError>;

/// Why compiling a function failed.
#[derive(Debug)]
pub enum CodegenError {
    /// The translator encountered an opcode it does not implement.
    UnsupportedOpcode(String),
    /// A [`crate::settings::FlagsBuilder`] toggle name was not recognized.
    UnknownSetting(String),
    /// A function type declared more than one result, which this single
    /// output-register ABI cannot represent.
    TooManyOutputs(usize),
    /// A computation of a frame offset, branch displacement, or stack-shift
    /// quantity overflowed the range it must fit in.
    Overflow(&'static str),
    /// A branch's resolved displacement does not fit in a signed 32-bit
    /// immediate.
    DisplacementOutOfRange {
        /// Code offset of the branch's 4-byte displacement field.
        branch_offset: u32,
        /// The out-of-range value that was computed.
        displacement: i64,
    },
    /// A static-stack or label-table operation was attempted on an empty
    /// or otherwise ill-formed stack -- indicates a malformed or
    /// unvalidated input program.
    StackUnderflow,
    /// A referenced local, label, function, global, table, or type index
    /// is out of bounds for the tables supplied to `compile_function`.
    IndexOutOfRange {
        /// What kind of index (e.g. "local", "global") was out of range.
        what: &'static str,
        index: u32,
    },
    /// A side-table (output buffer, relocation table, branch table, label
    /// table, static stack, or locals metadata) could not grow to
    /// accommodate a new entry.
    Alloc,
}

impl fmt::Display for CodegenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodegenError::UnsupportedOpcode(name) => {
                write!(f, "unsupported or unimplemented opcode: {name}")
            }
            CodegenError::UnknownSetting(name) => write!(f, "unknown setting: {name}"),
            CodegenError::TooManyOutputs(n) => {
                write!(f, "function type declares {n} outputs, at most 1 is supported")
            }
            CodegenError::Overflow(what) => write!(f, "overflow computing {what}"),
            CodegenError::DisplacementOutOfRange {
                branch_offset,
                displacement,
            } => write!(
                f,
                "branch displacement {displacement} at code offset {branch_offset} does not fit in i32"
            ),
            CodegenError::StackUnderflow => write!(f, "static stack underflow"),
            CodegenError::IndexOutOfRange { what, index } => {
                write!(f, "{what} index {index} out of range")
            }
            CodegenError::Alloc => write!(f, "allocation failure while growing a compiler table"),
        }
    }
}

impl std::error::Error for CodegenError {}
