//! Lazy compilation trampoline.
//!
//! Every dispatched call goes through [`invoke`]. The first call of a
//! specialization compiles it and materializes its entry point; later calls
//! jump straight to the published entry.
//!
//! ```text
//!  reserve()
//!    ├── Ready(entry) ─────────────────────────────────────────► call
//!    ├── Acquired ──► compile ──► finish ──► generate_fptr ──► call
//!    │                   └── error or panic ──► abort (retryable)
//!    ├── InFlight ───────────────────────────► generate_fptr ──► call
//!    └── NeedsEntry ─────────────────────────► generate_fptr ──► call
//! ```
//!
//! `InFlight` is what a re-entrant call sees while the same specialization
//! is being compiled further up the stack. It never compiles again; it only
//! asks for an entry point.

use crate::compiler::CompileError;
use crate::error::RuntimeError;
use crate::runtime::Runtime;
use jolt_runtime::{EntryPoint, Reservation, Specialization, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Call `spec` with `args[0]` as the callee, compiling it first if needed.
///
/// `args` must satisfy the signature of `spec` and must not be empty.
pub fn invoke(
    rt: &Runtime,
    spec: &Arc<Specialization>,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    debug_assert!(!args.is_empty(), "missing callee");
    let entry = ensure_compiled(rt, spec)?;
    rt.stats().record_call();
    // SAFETY: the entry point was produced for `spec`, whose signature
    // the caller guarantees `args` satisfies.
    Ok(unsafe { entry.invoke(args) })
}

/// Compile `spec` if nobody has and return its entry point.
pub fn ensure_compiled(
    rt: &Runtime,
    spec: &Arc<Specialization>,
) -> Result<EntryPoint, CompileError> {
    match spec.reserve() {
        Reservation::Ready(entry) => Ok(entry),
        Reservation::Acquired => {
            compile(rt, spec)?;
            match spec.entry_point() {
                Some(entry) => Ok(entry),
                None => materialize(rt, spec),
            }
        }
        Reservation::InFlight => {
            tracing::trace!(
                signature = %spec.signature(),
                "re-entrant call during compilation"
            );
            materialize(rt, spec)
        }
        Reservation::NeedsEntry => materialize(rt, spec),
    }
}

/// Run the compiler on a reserved specialization.
fn compile(rt: &Runtime, spec: &Arc<Specialization>) -> Result<(), CompileError> {
    let guard = CompileGuard::new(rt, spec);
    if let Err(err) = rt.compiler().compile(rt, spec) {
        tracing::warn!(signature = %spec.signature(), error = %err, "compilation failed");
        return Err(err);
    }
    let elapsed = guard.finish();

    if rt.config().trace_compile {
        tracing::info!(
            method = spec.method().id(),
            signature = %spec.signature(),
            elapsed_us = elapsed.as_micros() as u64,
            "compiled"
        );
    } else {
        tracing::debug!(
            signature = %spec.signature(),
            elapsed_us = elapsed.as_micros() as u64,
            "compiled"
        );
    }
    Ok(())
}

// =============================================================================
// CompileGuard
// =============================================================================

/// RAII guard over a reserved compilation.
///
/// Dropped without [`CompileGuard::finish`], it rolls the specialization
/// back to uncompiled. That covers both an error from the compiler and a
/// panic unwinding through it.
struct CompileGuard<'a> {
    rt: &'a Runtime,
    spec: &'a Specialization,
    start_time: Instant,
    armed: bool,
}

impl<'a> CompileGuard<'a> {
    fn new(rt: &'a Runtime, spec: &'a Specialization) -> Self {
        Self {
            rt,
            spec,
            start_time: Instant::now(),
            armed: true,
        }
    }

    /// Mark the compilation done and return how long it took.
    fn finish(mut self) -> Duration {
        self.armed = false;
        self.spec.finish_compile();
        self.rt.stats().record_compilation();
        self.start_time.elapsed()
    }
}

impl Drop for CompileGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.spec.abort_compile();
        self.rt.stats().record_compile_failure();
        if std::thread::panicking() {
            tracing::warn!(signature = %self.spec.signature(), "compiler panicked");
        }
    }
}

/// Ask the compiler for an entry point and publish it.
///
/// On failure the compile state is left as it is, so the next call retries
/// only this step.
fn materialize(rt: &Runtime, spec: &Arc<Specialization>) -> Result<EntryPoint, CompileError> {
    let entry = rt.compiler().generate_fptr(rt, spec)?;
    rt.stats().record_entry_point();
    Ok(spec.publish(entry))
}

