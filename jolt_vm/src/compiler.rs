//! The compiler collaborator.
//!
//! The runtime never generates code itself. It asks a [`Compiler`] to
//! compile a specialization, then to materialize a native entry point for
//! it. Both calls receive the runtime and may call back into it, including
//! dispatching further calls that need their own compilation.

use crate::runtime::Runtime;
use jolt_runtime::{EntryPoint, Specialization};
use std::sync::Arc;
use thiserror::Error;

/// Compilation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// Compiling the specialization failed.
    #[error("failed to compile {signature}: {reason}")]
    Failed {
        /// Signature of the specialization.
        signature: String,
        /// Compiler message.
        reason: String,
    },

    /// Compiled, but no native entry point could be produced.
    #[error("no entry point for {signature}: {reason}")]
    NoEntryPoint {
        /// Signature of the specialization.
        signature: String,
        /// Compiler message.
        reason: String,
    },
}

impl CompileError {
    /// Compilation of `spec` failed.
    pub fn failed(spec: &Specialization, reason: impl Into<String>) -> Self {
        CompileError::Failed {
            signature: spec.signature().to_string(),
            reason: reason.into(),
        }
    }

    /// Entry point materialization for `spec` failed.
    pub fn no_entry_point(spec: &Specialization, reason: impl Into<String>) -> Self {
        CompileError::NoEntryPoint {
            signature: spec.signature().to_string(),
            reason: reason.into(),
        }
    }
}

/// Code generator interface.
pub trait Compiler: Send + Sync {
    /// Compile `spec`. Called at most once per successful compilation.
    fn compile(&self, rt: &Runtime, spec: &Arc<Specialization>) -> Result<(), CompileError>;

    /// Produce the native entry point of a compiled (or compiling) `spec`.
    fn generate_fptr(
        &self,
        rt: &Runtime,
        spec: &Arc<Specialization>,
    ) -> Result<EntryPoint, CompileError>;
}

/// Compiler for methods whose body already is an [`EntryPoint`].
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeCompiler;

impl NativeCompiler {
    fn body(spec: &Specialization) -> Option<EntryPoint> {
        spec.method().body_as::<EntryPoint>().copied()
    }
}

impl Compiler for NativeCompiler {
    fn compile(&self, _rt: &Runtime, spec: &Arc<Specialization>) -> Result<(), CompileError> {
        match Self::body(spec) {
            Some(_) => Ok(()),
            None => Err(CompileError::failed(spec, "method body is not native code")),
        }
    }

    fn generate_fptr(
        &self,
        _rt: &Runtime,
        spec: &Arc<Specialization>,
    ) -> Result<EntryPoint, CompileError> {
        Self::body(spec)
            .ok_or_else(|| CompileError::no_entry_point(spec, "method body is not native code"))
    }
}
