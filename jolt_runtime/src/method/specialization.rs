//! Specializations and their compile state.
//!
//! A [`Specialization`] binds one concrete argument tuple type to the
//! method that handles it. Its compile state only moves forward on
//! success:
//!
//! ```text
//!  Uncompiled ──reserve──► Compiling ──finish──► Compiled ──publish──► Ready(entry)
//!       ▲                      │                    ▲
//!       └──────abort───────────┘                    └── entry failure stays here
//! ```
//!
//! The state lives behind a short mutex that is never held while the
//! compiler runs. A re-entrant call that finds `Compiling` skips straight
//! to materializing an entry point.

use super::Method;
use crate::types::{TypeEnv, TypeRef};
use crate::value::Value;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Native calling convention of compiled code.
///
/// Receives the callee, a pointer to the remaining arguments and their count.
pub type NativeFn = unsafe extern "C" fn(Value, *const Value, u32) -> Value;

/// An invocable native entry point.
#[derive(Clone, Copy)]
pub struct EntryPoint(NativeFn);

impl EntryPoint {
    /// Wrap a native function.
    #[inline]
    pub const fn new(f: NativeFn) -> Self {
        Self(f)
    }

    /// The wrapped function.
    #[inline]
    pub fn as_fn(self) -> NativeFn {
        self.0
    }

    /// Call with `args[0]` as the callee and the rest as arguments.
    ///
    /// # Safety
    ///
    /// The entry point must have been produced for a signature that
    /// `args` satisfies, and `args` must not be empty.
    #[inline]
    pub unsafe fn invoke(self, args: &[Value]) -> Value {
        debug_assert!(!args.is_empty(), "missing callee");
        let rest = &args[1..];
        // SAFETY: guaranteed by the caller.
        unsafe { (self.0)(args[0], rest.as_ptr(), rest.len() as u32) }
    }
}

impl fmt::Debug for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryPoint({:p})", self.0 as *const ())
    }
}

/// Compile progress of a specialization.
#[derive(Debug, Clone, Copy)]
pub enum CompileState {
    /// Nothing done yet.
    Uncompiled,
    /// Compilation in progress further up the stack.
    Compiling,
    /// Compiled, no entry point yet.
    Compiled,
    /// Callable.
    Ready(EntryPoint),
}

impl CompileState {
    /// Check for `Ready`.
    #[inline]
    pub fn is_ready(&self) -> bool {
        matches!(self, CompileState::Ready(_))
    }
}

/// What the caller of [`Specialization::reserve`] has to do next.
#[derive(Debug, Clone, Copy)]
pub enum Reservation {
    /// The caller now owns compilation and must finish or abort it.
    Acquired,
    /// Compilation is running further up the stack.
    InFlight,
    /// Compiled; only the entry point is missing.
    NeedsEntry,
    /// Already callable.
    Ready(EntryPoint),
}

/// A memoized, lazily compiled method instance.
pub struct Specialization {
    id: u32,
    signature: TypeRef,
    method: Arc<Method>,
    env: TypeEnv,
    record: Value,
    state: Mutex<CompileState>,
}

impl Specialization {
    pub(crate) fn new(
        id: u32,
        signature: TypeRef,
        method: Arc<Method>,
        env: TypeEnv,
        record: Value,
    ) -> Self {
        Self {
            id,
            signature,
            method,
            env,
            record,
            state: Mutex::new(CompileState::Uncompiled),
        }
    }

    /// Id, unique within the owning method table.
    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Concrete argument tuple type.
    #[inline]
    pub fn signature(&self) -> &TypeRef {
        &self.signature
    }

    /// Method this specializes.
    #[inline]
    pub fn method(&self) -> &Arc<Method> {
        &self.method
    }

    /// Static parameters bound while matching.
    #[inline]
    pub fn static_params(&self) -> &TypeEnv {
        &self.env
    }

    /// Heap record of type `MethodInstance`.
    #[inline]
    pub fn record(&self) -> Value {
        self.record
    }

    /// Current compile state.
    #[inline]
    pub fn state(&self) -> CompileState {
        *self.state.lock()
    }

    /// Entry point, if ready.
    #[inline]
    pub fn entry_point(&self) -> Option<EntryPoint> {
        match *self.state.lock() {
            CompileState::Ready(entry) => Some(entry),
            _ => None,
        }
    }

    // =========================================================================
    // Two-Phase Protocol
    // =========================================================================

    /// Claim compilation if nobody has, and report what is left to do.
    pub fn reserve(&self) -> Reservation {
        let mut state = self.state.lock();
        match *state {
            CompileState::Uncompiled => {
                *state = CompileState::Compiling;
                Reservation::Acquired
            }
            CompileState::Compiling => Reservation::InFlight,
            CompileState::Compiled => Reservation::NeedsEntry,
            CompileState::Ready(entry) => Reservation::Ready(entry),
        }
    }

    /// Mark compilation done. An entry point published meanwhile is kept.
    pub fn finish_compile(&self) {
        let mut state = self.state.lock();
        if let CompileState::Compiling = *state {
            *state = CompileState::Compiled;
        }
    }

    /// Roll back a failed compilation so the next call retries it.
    ///
    /// Also discards an entry point materialized re-entrantly during the
    /// failed compilation.
    pub fn abort_compile(&self) {
        *self.state.lock() = CompileState::Uncompiled;
    }

    /// Publish the entry point and return the one that won.
    ///
    /// If another entry point was published first, that one is kept.
    pub fn publish(&self, entry: EntryPoint) -> EntryPoint {
        let mut state = self.state.lock();
        match *state {
            CompileState::Ready(existing) => existing,
            _ => {
                *state = CompileState::Ready(entry);
                entry
            }
        }
    }
}

impl fmt::Debug for Specialization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Specialization")
            .field("id", &self.id)
            .field("signature", &self.signature.to_string())
            .field("method", &self.method.id())
            .field("state", &self.state())
            .finish()
    }
}
