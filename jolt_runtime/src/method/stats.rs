//! Dispatch statistics.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-table cache counters.
#[derive(Debug, Default)]
pub struct DispatchStats {
    /// Lookups answered by the specialization cache.
    pub hits: AtomicU64,
    /// Lookups that had to rank candidates.
    pub misses: AtomicU64,
    /// Specializations created.
    pub specializations: AtomicU64,
}

impl DispatchStats {
    /// Create zeroed counters.
    pub const fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            specializations: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_specialization(&self) {
        self.specializations.fetch_add(1, Ordering::Relaxed);
    }

    /// Percentage of signature lookups answered by the specialization cache,
    /// or 0.0 before the first lookup.
    pub fn hit_rate(&self) -> f64 {
        let (hits, misses, _) = self.snapshot();
        match hits + misses {
            0 => 0.0,
            lookups => hits as f64 * 100.0 / lookups as f64,
        }
    }

    /// Get (hits, misses, specializations).
    pub fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
            self.specializations.load(Ordering::Relaxed),
        )
    }
}

impl fmt::Display for DispatchStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (hits, misses, specializations) = self.snapshot();
        write!(
            f,
            "hits={} misses={} specializations={} hit_rate={:.1}%",
            hits,
            misses,
            specializations,
            self.hit_rate()
        )
    }
}
