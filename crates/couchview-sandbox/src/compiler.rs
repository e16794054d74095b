//! Entry point turning snippet source into [`CompiledFunction`] values.

use crate::error::CompileError;
use crate::function::{CompiledFunction, TypedFunction};
use crate::interpreter::DEFAULT_MAX_CALL_DEPTH;
use crate::kind::FunctionKind;
use crate::profile::HostProfile;
use crate::resolve::resolve;
use crate::syntax::Parser;

/// Compiles snippets against the host whitelist.
///
/// Every call parses the source afresh; nothing is cached.
///
/// ```
/// use couchview_sandbox::{Compiler, FunctionKind};
///
/// let compiled = Compiler::new()
///     .compile("func Map(doc) { emit(doc._id, 1) }", Some(FunctionKind::Map))
///     .expect("map compiles");
/// assert_eq!(compiled.kind(), FunctionKind::Map);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compiler {
    max_call_depth: usize,
    profile: Option<HostProfile>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    /// Creates a compiler using each kind's default [`HostProfile`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            profile: None,
        }
    }

    /// Bounds snippet call nesting for functions compiled from now on.
    #[must_use]
    pub const fn with_max_call_depth(mut self, max_call_depth: usize) -> Self {
        self.max_call_depth = max_call_depth;
        self
    }

    /// Resolves every kind against `profile` instead of its default.
    #[must_use]
    pub fn with_profile(mut self, profile: HostProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Compiles `source`, checking the declared kind against `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::UnrecognizedFunctionKind`] when the source
    /// does not start with a known declaration,
    /// [`CompileError::SignatureMismatch`] when it declares another kind, and
    /// [`CompileError::Compilation`] for syntax or resolution problems.
    pub fn compile(
        &self,
        source: &str,
        expected: Option<FunctionKind>,
    ) -> Result<CompiledFunction, CompileError> {
        let found = FunctionKind::detect(source).ok_or(CompileError::UnrecognizedFunctionKind)?;
        if let Some(wanted) = expected.filter(|kind| *kind != found) {
            return Err(CompileError::SignatureMismatch {
                expected: wanted,
                found,
            });
        }
        let program = Parser::new(source)?.parse_program()?;
        let module = match &self.profile {
            Some(profile) => resolve(program, found, profile)?,
            None => resolve(program, found, &HostProfile::for_kind(found))?,
        };
        Ok(CompiledFunction::new(module, self.max_call_depth))
    }

    /// Compiles `source` directly into a typed wrapper.
    ///
    /// # Errors
    ///
    /// Fails as [`Compiler::compile`] does with `F::KIND` expected.
    pub fn compile_as<F: TypedFunction>(&self, source: &str) -> Result<F, CompileError> {
        F::from_compiled(self.compile(source, Some(F::KIND))?)
    }
}
