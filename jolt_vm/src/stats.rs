//! Runtime-wide counters.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Call and compilation counters of one runtime.
#[derive(Debug, Default)]
pub struct VmStats {
    /// Calls that reached an entry point.
    pub calls: AtomicU64,
    /// Successful compilations.
    pub compilations: AtomicU64,
    /// Failed compilations.
    pub compile_failures: AtomicU64,
    /// Entry points materialized.
    pub entry_points: AtomicU64,
}

impl VmStats {
    /// Create zeroed counters.
    pub const fn new() -> Self {
        Self {
            calls: AtomicU64::new(0),
            compilations: AtomicU64::new(0),
            compile_failures: AtomicU64::new(0),
            entry_points: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_compilation(&self) {
        self.compilations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_compile_failure(&self) {
        self.compile_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_entry_point(&self) {
        self.entry_points.fetch_add(1, Ordering::Relaxed);
    }

    /// Successful compilations so far.
    #[inline]
    pub fn compilations(&self) -> u64 {
        self.compilations.load(Ordering::Relaxed)
    }

    /// Failed compilations so far.
    #[inline]
    pub fn compile_failures(&self) -> u64 {
        self.compile_failures.load(Ordering::Relaxed)
    }

    /// Calls so far.
    #[inline]
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.calls.store(0, Ordering::Relaxed);
        self.compilations.store(0, Ordering::Relaxed);
        self.compile_failures.store(0, Ordering::Relaxed);
        self.entry_points.store(0, Ordering::Relaxed);
    }
}

impl fmt::Display for VmStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "calls={} compilations={} compile_failures={} entry_points={}",
            self.calls(),
            self.compilations(),
            self.compile_failures(),
            self.entry_points.load(Ordering::Relaxed)
        )
    }
}
