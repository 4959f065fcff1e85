//! The Function Driver's top-level entry point: [`compile_function`].
//!
//! Ties together every other module exactly in the order base spec §2's
//! component list and §4's component design describe: compute the frame
//! layout, emit the prologue, drive the [`crate::translate::Translator`]
//! over the body, emit the epilogue, then back-patch every branch recorded
//! along the way. Grounded in the reference implementation's
//! `wasmjit_compile_function`, which performs exactly these steps in this
//! order around the same four side tables.

use crate::branch::{self, BranchTable, LabelTable};
use crate::buffer::CodeBuffer;
use crate::error::CodegenResult;
use crate::frame;
use crate::reloc::{RelocEntry, RelocTable};
use crate::settings::Flags;
use crate::translate::Translator;
use crate::types::{Body, FuncType, ModuleEnvironment};

/// The result of compiling one function: a contiguous buffer of x86_64
/// machine code and the relocation table the surrounding loader must
/// resolve against it. Base spec §6's "Core entry point" output.
#[derive(Debug, Clone)]
pub struct CompiledFunction {
    pub code: Vec<u8>,
    pub relocs: Vec<RelocEntry>,
}

/// Compiles one already-parsed function body into machine code.
///
/// `env` supplies the enclosing module's type tables; `func_type` is this
/// function's own signature (its `inputs` are the declaration-order
/// parameter types the prologue spills); `body` carries the declared
/// locals and instruction tree; `flags` selects the Open-Question
/// behaviors recorded in DESIGN.md.
pub fn compile_function(
    env: &ModuleEnvironment,
    func_type: &FuncType,
    body: &Body,
    flags: &Flags,
) -> CodegenResult<CompiledFunction> {
    log::debug!(
        "compiling function: {} params, {} declared locals, {} top-level instructions",
        func_type.inputs.len(),
        body.locals.iter().map(|l| l.count).sum::<u32>(),
        body.instructions.len()
    );

    let declared: Vec<(crate::types::ValType, u32)> =
        body.locals.iter().map(|l| (l.valtype, l.count)).collect();
    let frame = frame::compute_frame(&func_type.inputs, &declared);
    log::trace!("frame: {} bytes below rbp", frame.frame_bytes);

    let mut buf = CodeBuffer::new();
    let mut relocs = RelocTable::new();
    let mut branches = BranchTable::new();
    let mut labels = LabelTable::new();

    frame::emit_prologue(&mut buf, &frame, flags);

    {
        let mut translator = Translator::new(
            env,
            &frame,
            flags,
            func_type,
            &mut buf,
            &mut relocs,
            &mut branches,
            &mut labels,
        );
        translator.translate_seq(&body.instructions)?;
        translator.finish()?;
    }

    let epilogue_offset = buf.offset();
    frame::emit_epilogue(&mut buf, &frame);

    branch::resolve(&mut buf, &labels, &branches, epilogue_offset)?;

    let relocs = relocs.into_vec();
    log::debug!("compiled to {} bytes, {} relocations", buf.offset(), relocs.len());

    Ok(CompiledFunction {
        code: buf.into_vec(),
        relocs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FuncType, Instr, LocalIndex, ValType};

    fn identity_body() -> Body {
        Body {
            locals: vec![],
            instructions: vec![Instr::GetLocal(LocalIndex(0)), Instr::Return],
        }
    }

    #[test]
    fn identity_function_compiles_to_nonempty_code() {
        let env = ModuleEnvironment::default();
        let func_type = FuncType::new(vec![ValType::I32], Some(ValType::I32));
        let body = identity_body();
        let flags = Flags::default();
        let compiled = compile_function(&env, &func_type, &body, &flags).unwrap();
        assert!(!compiled.code.is_empty());
        assert!(compiled.relocs.is_empty());
    }

    #[test]
    fn debug_trap_flag_adds_one_byte() {
        let env = ModuleEnvironment::default();
        let func_type = FuncType::new(vec![ValType::I32], Some(ValType::I32));
        let body = identity_body();

        let off = Flags::default();
        let mut on_builder = Flags::builder();
        on_builder.set("emit_debug_trap", true).unwrap();
        let on = on_builder.finish();

        let without = compile_function(&env, &func_type, &body, &off).unwrap();
        let with = compile_function(&env, &func_type, &body, &on).unwrap();
        assert_eq!(with.code.len(), without.code.len() + 1);
    }

    #[test]
    fn void_function_with_no_body_falls_through_to_epilogue() {
        let env = ModuleEnvironment::default();
        let func_type = FuncType::new(vec![], None);
        let body = Body { locals: vec![], instructions: vec![] };
        let flags = Flags::default();
        let compiled = compile_function(&env, &func_type, &body, &flags).unwrap();
        assert!(!compiled.code.is_empty());
    }
}
