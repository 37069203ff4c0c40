//! Type variables.
//!
//! A type variable stands for an unknown type inside a parametric family
//! or a method signature. It carries a lower and an upper bound; a binding
//! is valid when `lb <: binding <: ub`.

use super::Type;
use std::fmt;

/// A bounded type variable.
///
/// Identity is the `id`, handed out by the [`TypeCache`](super::TypeCache)
/// that created the variable. Two variables with the same name and bounds
/// are still distinct.
#[derive(Debug)]
pub struct TypeVar {
    id: u32,
    name: String,
    lb: Type,
    ub: Type,
}

impl TypeVar {
    pub(crate) fn new(id: u32, name: impl Into<String>, lb: Type, ub: Type) -> Self {
        Self {
            id,
            name: name.into(),
            lb,
            ub,
        }
    }

    /// Unique identifier.
    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Display name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lower bound (`Bottom` unless declared).
    #[inline]
    pub fn lower_bound(&self) -> &Type {
        &self.lb
    }

    /// Upper bound (`Any` unless declared).
    #[inline]
    pub fn upper_bound(&self) -> &Type {
        &self.ub
    }
}

impl PartialEq for TypeVar {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeVar {}

impl fmt::Display for TypeVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
