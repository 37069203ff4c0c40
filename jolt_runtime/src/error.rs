//! Errors raised while building types and resolving methods.

use crate::types::{Type, TypeRef};
use std::fmt;
use thiserror::Error;

/// Failure to construct a type or declare a method.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    /// Family applied to the wrong number of parameters.
    #[error("{family} expects {expected} type parameters, got {found}")]
    ParamCount {
        /// Family name.
        family: String,
        /// Declared parameter count.
        expected: usize,
        /// Supplied parameter count.
        found: usize,
    },

    /// Parameter outside its declared bounds.
    #[error("{family}: parameter {param} must satisfy {lower} <: {param} <: {upper}, got {found}")]
    BoundViolation {
        /// Family name.
        family: String,
        /// Formal parameter name.
        param: String,
        /// Declared lower bound.
        lower: String,
        /// Declared upper bound.
        upper: String,
        /// Supplied parameter.
        found: String,
    },

    /// `Vararg` anywhere but the last tuple element.
    #[error("Vararg is only allowed as the last element of a tuple type")]
    MisplacedVararg,

    /// Supertype that is not an abstract nominal type.
    #[error("invalid supertype for {family}: {found}")]
    InvalidSupertype {
        /// Family being declared.
        family: String,
        /// Offending supertype.
        found: String,
    },

    /// Bits type with no storage.
    #[error("bits type {0} must occupy at least one byte")]
    EmptyBits(String),

    /// Method signature that is not a tuple type.
    #[error("method signature must be a tuple type, got {0}")]
    NotATupleType(String),
}

/// Why a call could not be bound to a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchErrorKind {
    /// No declared signature accepts the arguments.
    NoMethod,
    /// Several applicable methods, none strictly most specific.
    Ambiguous,
    /// Specificity ranking produced no maximal candidate.
    CyclicSpecificity,
    /// Argument tuple type is not concrete.
    NotConcrete,
}

/// A failed method resolution.
#[derive(Debug, Clone, Error)]
pub struct DispatchError {
    /// Failure class.
    pub kind: DispatchErrorKind,
    /// Generic function name.
    pub function: String,
    /// Argument tuple type that was resolved.
    pub signature: TypeRef,
    /// Competing candidate signatures, for `Ambiguous` and `CyclicSpecificity`.
    pub candidates: Vec<TypeRef>,
}

impl DispatchError {
    pub(crate) fn new(kind: DispatchErrorKind, function: &str, signature: &TypeRef) -> Self {
        Self {
            kind,
            function: function.to_string(),
            signature: signature.clone(),
            candidates: Vec::new(),
        }
    }

    pub(crate) fn with_candidates(mut self, candidates: Vec<TypeRef>) -> Self {
        self.candidates = candidates;
        self
    }

    /// Fatal-class failures must not be retried.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        self.kind == DispatchErrorKind::CyclicSpecificity
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DispatchErrorKind::NoMethod => f.write_str("no method matching ")?,
            DispatchErrorKind::Ambiguous => f.write_str("ambiguous method call ")?,
            DispatchErrorKind::CyclicSpecificity => {
                f.write_str("cyclic method specificity for ")?
            }
            DispatchErrorKind::NotConcrete => f.write_str("cannot specialize ")?,
        }
        write_call(f, &self.function, self.signature.params())?;
        if !self.candidates.is_empty() {
            f.write_str("; candidates:")?;
            for sig in &self.candidates {
                f.write_str(" ")?;
                write_call(f, &self.function, sig.params())?;
            }
        }
        Ok(())
    }
}

/// Write `f(::A, ::B)`.
pub(crate) fn write_call(f: &mut fmt::Formatter<'_>, name: &str, args: &[Type]) -> fmt::Result {
    write!(f, "{}(", name)?;
    for (i, ty) in args.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "::{}", ty)?;
    }
    f.write_str(")")
}
