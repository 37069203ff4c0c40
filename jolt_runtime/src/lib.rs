//! Object model and dispatch core for the jolt runtime.
//!
//! This crate provides:
//! - Tagged heap values (`Value`, `tag`, `type_of`, `newobj`, `newstruct`)
//! - Canonical type descriptors and the builtin hierarchy
//! - The type relation engine (subtyping, matching, specificity)
//! - Method tables with a per-signature specialization cache

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

pub mod error;
pub mod method;
pub mod types;
pub mod value;

// Re-export commonly used items
pub use error::{DispatchError, DispatchErrorKind, TypeError};
pub use method::{
    CompileState, DispatchStats, EntryPoint, Method, MethodBody, MethodMatch, MethodTable,
    NativeFn, Reservation, Specialization,
};
pub use types::{
    Builtins, DataType, Specificity, Type, TypeCache, TypeEnv, TypeName, TypeRef, TypeVar,
    is_subtype, more_specific, signatures_equal, specificity, tuple_subtype, type_match,
    types_equal,
};
pub use value::{Value, newobj, newstruct, tag};
