//! Compile-time configuration.
//!
//! Grounded in the `cranelift_codegen::settings` builder/flags split that
//! `ancvm-processor`'s `JITUtil::new` drives (`flag_builder.set("...",
//! "...")` then `settings::Flags::new(flag_builder)`): a string-keyed
//! builder collects toggles, then `Flags::new` freezes them into a plain
//! struct the rest of the crate reads by field.

use crate::error::{CodegenError, CodegenResult};

/// Frozen configuration passed into [`crate::compile_function`].
#[derive(Debug, Clone, Copy)]
pub struct Flags {
    /// Emit a one-byte `int3` immediately after frame establishment. A
    /// development artifact in the reference implementation; off by
    /// default in this crate, as the base spec's Open Questions recommend.
    emit_debug_trap: bool,
    /// Use the strict `ea + width > size => trap` bounds-check formulation
    /// instead of the tolerant `+4`-offset comparison described in the
    /// base spec's §4.2 and re-examined in its Open Questions.
    strict_bounds_check: bool,
}

impl Flags {
    /// Returns a builder pre-loaded with this crate's defaults.
    pub fn builder() -> FlagsBuilder {
        FlagsBuilder {
            emit_debug_trap: false,
            strict_bounds_check: false,
        }
    }

    pub fn emit_debug_trap(&self) -> bool {
        self.emit_debug_trap
    }

    pub fn strict_bounds_check(&self) -> bool {
        self.strict_bounds_check
    }
}

impl Default for Flags {
    fn default() -> Self {
        Flags::builder().finish()
    }
}

/// Builds a [`Flags`] value one named toggle at a time.
///
/// Mirrors the `Configurable`-style setters Cranelift's settings builders
/// expose, scaled down to this crate's two toggles.
#[derive(Debug, Clone, Copy)]
pub struct FlagsBuilder {
    emit_debug_trap: bool,
    strict_bounds_check: bool,
}

impl FlagsBuilder {
    /// Sets a named boolean toggle. Returns an error for unknown names so
    /// typos in embedder configuration surface immediately rather than
    /// silently doing nothing.
    pub fn set(&mut self, name: &str, value: bool) -> CodegenResult<&mut Self> {
        match name {
            "emit_debug_trap" => self.emit_debug_trap = value,
            "strict_bounds_check" => self.strict_bounds_check = value,
            other => return Err(CodegenError::UnknownSetting(other.to_string())),
        }
        Ok(self)
    }

    pub fn finish(self) -> Flags {
        Flags {
            emit_debug_trap: self.emit_debug_trap,
            strict_bounds_check: self.strict_bounds_check,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_recommendation() {
        let flags = Flags::default();
        assert!(!flags.emit_debug_trap());
        assert!(!flags.strict_bounds_check());
    }

    #[test]
    fn builder_round_trips_toggles() {
        let mut b = Flags::builder();
        b.set("emit_debug_trap", true).unwrap();
        b.set("strict_bounds_check", true).unwrap();
        let flags = b.finish();
        assert!(flags.emit_debug_trap());
        assert!(flags.strict_bounds_check());
    }

    #[test]
    fn unknown_setting_is_an_error() {
        let mut b = Flags::builder();
        assert!(b.set("bogus", true).is_err());
    }
}
