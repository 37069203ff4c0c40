//! Type expressions and the type relation engine.
//!
//! # Architecture
//!
//! ```text
//!   TypeName (family: Box, Tuple, Int64, ...)
//!      │  apply(params)
//!      ▼
//!   DataType ──── canonical, one per structural shape (TypeCache)
//!      │
//!      ▼
//!   Type ──────── Any | Bottom | Data | Union | Var | Vararg
//!      │
//!      ├── is_subtype / tuple_subtype      (subtype.rs)
//!      ├── type_match → TypeEnv            (matching.rs)
//!      └── more_specific / specificity     (specificity.rs)
//! ```
//!
//! Every `DataType` is created through the [`TypeCache`], so two descriptors
//! with the same family and parameters are the same allocation. Structural
//! equality of `Type` values therefore reduces to pointer equality on the
//! descriptor nodes.

mod builtins;
mod cache;
mod datatype;
mod matching;
mod specificity;
mod subtype;
mod typevar;

pub use builtins::Builtins;
pub use cache::TypeCache;
pub use datatype::{DataType, Field, TypeFlags, TypeKind, TypeName, TypeRef};
pub use matching::{TypeEnv, type_match};
pub use specificity::{Specificity, more_specific, signatures_equal, specificity};
pub use subtype::{is_subtype, nth_slot_type, tuple_subtype, types_equal};
pub use typevar::TypeVar;

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

// =============================================================================
// Type Expressions
// =============================================================================

/// A type expression.
///
/// Cheap to clone: every variant is either unit or a reference count bump.
#[derive(Clone)]
pub enum Type {
    /// The top type.
    Any,
    /// The empty union, a subtype of everything.
    Bottom,
    /// A nominal or tuple descriptor.
    Data(TypeRef),
    /// A normalized union: flattened, deduplicated, sorted, two or more members.
    Union(Arc<[Type]>),
    /// A type variable.
    Var(Arc<TypeVar>),
    /// Zero or more trailing tuple elements of the inner type.
    Vararg(Arc<Type>),
}

impl Type {
    /// Build a normalized union.
    ///
    /// Nested unions are flattened, `Bottom` members dropped and duplicates
    /// removed. A union containing `Any` is `Any`; an empty union is
    /// `Bottom`; a single member is returned as is.
    pub fn union(members: impl IntoIterator<Item = Type>) -> Type {
        let mut flat: Vec<Type> = Vec::new();
        for member in members {
            match member {
                Type::Any => return Type::Any,
                Type::Bottom => {}
                Type::Union(inner) => flat.extend(inner.iter().cloned()),
                other => flat.push(other),
            }
        }
        flat.sort_by(Type::canonical_order);
        flat.dedup();

        match flat.len() {
            0 => Type::Bottom,
            1 => flat.pop().unwrap_or(Type::Bottom),
            _ => Type::Union(flat.into()),
        }
    }

    /// Wrap a type as a trailing vararg element.
    #[inline]
    pub fn vararg(element: Type) -> Type {
        Type::Vararg(Arc::new(element))
    }

    /// Get the descriptor, if this is a `Data` type.
    #[inline]
    pub fn as_data(&self) -> Option<&TypeRef> {
        match self {
            Type::Data(dt) => Some(dt),
            _ => None,
        }
    }

    /// Check for a trailing vararg element.
    #[inline]
    pub fn is_vararg(&self) -> bool {
        matches!(self, Type::Vararg(_))
    }

    /// Check if values can have exactly this type.
    #[inline]
    pub fn is_concrete(&self) -> bool {
        matches!(self, Type::Data(dt) if dt.is_leaf())
    }

    /// Check if any type variable occurs in this expression.
    pub fn has_free_vars(&self) -> bool {
        match self {
            Type::Any | Type::Bottom => false,
            Type::Data(dt) => dt.has_vars(),
            Type::Union(members) => members.iter().any(Type::has_free_vars),
            Type::Var(_) => true,
            Type::Vararg(inner) => inner.has_free_vars(),
        }
    }

    /// Total order used to normalize union members.
    fn canonical_order(a: &Type, b: &Type) -> Ordering {
        fn rank(t: &Type) -> u8 {
            match t {
                Type::Any => 0,
                Type::Bottom => 1,
                Type::Data(_) => 2,
                Type::Union(_) => 3,
                Type::Var(_) => 4,
                Type::Vararg(_) => 5,
            }
        }

        match (a, b) {
            (Type::Data(x), Type::Data(y)) => x.serial().cmp(&y.serial()),
            (Type::Var(x), Type::Var(y)) => x.id().cmp(&y.id()),
            (Type::Vararg(x), Type::Vararg(y)) => Type::canonical_order(x, y),
            (Type::Union(xs), Type::Union(ys)) => xs
                .iter()
                .zip(ys.iter())
                .map(|(x, y)| Type::canonical_order(x, y))
                .find(|o| o.is_ne())
                .unwrap_or_else(|| xs.len().cmp(&ys.len())),
            _ => rank(a).cmp(&rank(b)),
        }
    }
}

impl From<TypeRef> for Type {
    #[inline]
    fn from(dt: TypeRef) -> Self {
        Type::Data(dt)
    }
}

impl From<&TypeRef> for Type {
    #[inline]
    fn from(dt: &TypeRef) -> Self {
        Type::Data(dt.clone())
    }
}

impl From<Arc<TypeVar>> for Type {
    #[inline]
    fn from(var: Arc<TypeVar>) -> Self {
        Type::Var(var)
    }
}

impl From<&Arc<TypeVar>> for Type {
    #[inline]
    fn from(var: &Arc<TypeVar>) -> Self {
        Type::Var(var.clone())
    }
}

// =============================================================================
// Structural Identity
// =============================================================================

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Type::Any, Type::Any) | (Type::Bottom, Type::Bottom) => true,
            // Descriptors are canonical.
            (Type::Data(a), Type::Data(b)) => Arc::ptr_eq(a, b),
            (Type::Union(a), Type::Union(b)) => a[..] == b[..],
            (Type::Var(a), Type::Var(b)) => a.id() == b.id(),
            (Type::Vararg(a), Type::Vararg(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Type {}

impl Hash for Type {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Type::Any | Type::Bottom => {}
            Type::Data(dt) => (Arc::as_ptr(dt) as usize).hash(state),
            Type::Union(members) => members.hash(state),
            Type::Var(var) => var.id().hash(state),
            Type::Vararg(inner) => inner.hash(state),
        }
    }
}

// =============================================================================
// Display
// =============================================================================

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Any => f.write_str("Any"),
            Type::Bottom => f.write_str("Union{}"),
            Type::Data(dt) => fmt::Display::fmt(&**dt, f),
            Type::Union(members) => {
                f.write_str("Union{")?;
                write_list(f, members)?;
                f.write_str("}")
            }
            Type::Var(var) => fmt::Display::fmt(&**var, f),
            Type::Vararg(inner) => write!(f, "Vararg{{{}}}", inner),
        }
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Write a comma-separated list of types.
pub(crate) fn write_list(f: &mut fmt::Formatter<'_>, types: &[Type]) -> fmt::Result {
    for (i, ty) in types.iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        write!(f, "{}", ty)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_normalization() {
        let cache = TypeCache::new();
        let b = Builtins::new(&cache).unwrap();
        let int = Type::from(&b.int64);
        let string = Type::from(&b.string);

        assert_eq!(Type::union([]), Type::Bottom);
        assert_eq!(Type::union([int.clone()]), int);
        assert_eq!(Type::union([int.clone(), Type::Any]), Type::Any);
        assert_eq!(Type::union([int.clone(), Type::Bottom]), int);

        let ab = Type::union([int.clone(), string.clone()]);
        let ba = Type::union([string.clone(), int.clone(), int.clone()]);
        assert_eq!(ab, ba);

        let nested = Type::union([ab.clone(), int.clone()]);
        assert_eq!(nested, ab);
    }

    #[test]
    fn test_free_vars() {
        let cache = TypeCache::new();
        let b = Builtins::new(&cache).unwrap();
        let t = cache.typevar("T", Type::Any);

        assert!(!Type::from(&b.int64).has_free_vars());
        assert!(Type::from(&t).has_free_vars());
        assert!(Type::vararg(Type::from(&t)).has_free_vars());

        let boxed = cache.apply(cache.box_name(), &[Type::from(&t)]).unwrap();
        assert!(Type::from(boxed).has_free_vars());
    }

    #[test]
    fn test_display() {
        let cache = TypeCache::new();
        let b = Builtins::new(&cache).unwrap();
        let tuple = cache
            .tuple_type(&[Type::from(&b.int64), Type::vararg(Type::from(&b.string))])
            .unwrap();

        assert_eq!(Type::from(tuple).to_string(), "Tuple{Int64,Vararg{String}}");
        assert_eq!(Type::from(&b.box_any).to_string(), "Box{Any}");
        assert_eq!(Type::Bottom.to_string(), "Union{}");
    }
}
