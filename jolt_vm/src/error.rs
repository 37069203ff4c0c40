//! Runtime error types.

use crate::compiler::CompileError;
use jolt_gc::ConfigError;
use jolt_runtime::{DispatchError, DispatchErrorKind, TypeError, TypeRef, Value};
use std::fmt;
use thiserror::Error;

/// A call that could not be bound to a method.
///
/// Carries the argument values next to the resolution failure so callers
/// can report or retry with them.
#[derive(Debug, Clone)]
pub struct MethodError {
    /// Resolution failure.
    pub error: DispatchError,
    /// Arguments of the failed call, callee excluded.
    pub args: Vec<Value>,
}

impl MethodError {
    /// Failure class.
    #[inline]
    pub fn kind(&self) -> DispatchErrorKind {
        self.error.kind
    }

    /// Argument tuple type of the failed call.
    #[inline]
    pub fn argtypes(&self) -> &TypeRef {
        &self.error.signature
    }

    /// Generic function name.
    #[inline]
    pub fn function(&self) -> &str {
        &self.error.function
    }
}

impl fmt::Display for MethodError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl std::error::Error for MethodError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Errors surfaced by the runtime.
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    /// No unique method for the call.
    #[error(transparent)]
    Method(#[from] MethodError),

    /// Method resolution failed outside a call, e.g. while precompiling.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// The compiler failed; the next call retries.
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// Invalid type or method declaration.
    #[error(transparent)]
    Type(#[from] TypeError),

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// No generic function with this name.
    #[error("undefined function {0}")]
    UndefinedFunction(String),

    /// Callee is not a generic function.
    #[error("objects of type {0} are not callable")]
    NotCallable(String),
}

impl RuntimeError {
    /// Dispatch failure class, if this is a method error.
    pub fn dispatch_kind(&self) -> Option<DispatchErrorKind> {
        match self {
            RuntimeError::Method(e) => Some(e.kind()),
            RuntimeError::Dispatch(e) => Some(e.kind),
            _ => None,
        }
    }
}
