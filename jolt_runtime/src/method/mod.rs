//! Methods, method tables and specializations.
//!
//! # Dispatch Pipeline
//!
//! ```text
//! lookup(argtypes)
//!    │
//!    ├── cache hit ───────────────────────────────► Specialization
//!    │
//!    └── miss ─► rank applicable methods
//!                   ├── none ──────────► NoMethod
//!                   ├── tie ───────────► Ambiguous
//!                   ├── no maximum ────► CyclicSpecificity
//!                   └── unique best ───► instantiate ─► Specialization
//! ```
//!
//! A specialization is inserted into the cache before anything compiles
//! it, so a re-entrant lookup of the same signature finds the same record.

mod specialization;
mod stats;
mod table;

pub use specialization::{CompileState, EntryPoint, NativeFn, Reservation, Specialization};
pub use stats::DispatchStats;
pub use table::{MethodMatch, MethodTable};

use crate::types::{TypeRef, TypeVar};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Opaque implementation payload handed to the compiler.
pub type MethodBody = Arc<dyn Any + Send + Sync>;

/// One declared implementation of a generic function.
pub struct Method {
    id: u32,
    signature: TypeRef,
    tvars: Box<[Arc<TypeVar>]>,
    body: MethodBody,
}

impl Method {
    /// Create a method.
    pub fn new(id: u32, signature: TypeRef, tvars: Vec<Arc<TypeVar>>, body: MethodBody) -> Self {
        Self {
            id,
            signature,
            tvars: tvars.into(),
            body,
        }
    }

    /// Declaration id within the owning table.
    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Declared tuple signature.
    #[inline]
    pub fn signature(&self) -> &TypeRef {
        &self.signature
    }

    /// Static parameters the signature is generic over.
    #[inline]
    pub fn tvars(&self) -> &[Arc<TypeVar>] {
        &self.tvars
    }

    /// Implementation payload.
    #[inline]
    pub fn body(&self) -> &MethodBody {
        &self.body
    }

    /// Implementation payload, if it has type `T`.
    pub fn body_as<T: Any>(&self) -> Option<&T> {
        self.body.downcast_ref::<T>()
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("id", &self.id)
            .field("signature", &self.signature.to_string())
            .finish_non_exhaustive()
    }
}
