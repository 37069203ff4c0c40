//! Allocation statistics.
//!
//! Tracks how requests are routed between the word lanes, the general
//! size-class pools and the large object space.

use crate::heap::size_class::WORD_LANES;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics about allocator activity.
#[derive(Debug)]
pub struct AllocStats {
    // =========================================================================
    // Totals
    // =========================================================================
    /// Total bytes handed out (block sizes, headers included).
    pub bytes_allocated: AtomicU64,
    /// Total objects handed out.
    pub objects_allocated: AtomicU64,

    // =========================================================================
    // Routing
    // =========================================================================
    /// Allocations served by each fixed-arity lane.
    pub lane_allocations: [AtomicU64; WORD_LANES],
    /// Allocations served by the general size-class pools.
    pub pool_allocations: AtomicU64,
    /// Allocations delegated to the large object space.
    pub large_allocations: AtomicU64,

    // =========================================================================
    // Memory
    // =========================================================================
    /// Pages grabbed from the system allocator by the pools.
    pub pages_allocated: AtomicU64,
}

impl AllocStats {
    /// Create new empty statistics.
    pub const fn new() -> Self {
        Self {
            bytes_allocated: AtomicU64::new(0),
            objects_allocated: AtomicU64::new(0),
            lane_allocations: [
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
            ],
            pool_allocations: AtomicU64::new(0),
            large_allocations: AtomicU64::new(0),
            pages_allocated: AtomicU64::new(0),
        }
    }

    #[inline]
    fn record(&self, size: usize) {
        self.bytes_allocated
            .fetch_add(size as u64, Ordering::Relaxed);
        self.objects_allocated.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a lane allocation.
    #[inline]
    pub fn record_lane(&self, nfields: usize, block_size: usize) {
        self.record(block_size);
        self.lane_allocations[nfields].fetch_add(1, Ordering::Relaxed);
    }

    /// Record a general pool allocation.
    #[inline]
    pub fn record_pool(&self, block_size: usize) {
        self.record(block_size);
        self.pool_allocations.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a large object allocation.
    pub fn record_large(&self, size: usize) {
        self.record(size);
        self.large_allocations.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a fresh pool page.
    pub fn record_page(&self) {
        self.pages_allocated.fetch_add(1, Ordering::Relaxed);
    }

    /// Allocations served by lane `nfields`.
    pub fn lane_count(&self, nfields: usize) -> u64 {
        self.lane_allocations[nfields].load(Ordering::Relaxed)
    }

    /// Per-lane allocation counts, indexed by field count.
    pub fn lane_counts(&self) -> [u64; WORD_LANES] {
        std::array::from_fn(|n| self.lane_count(n))
    }

    /// Fraction of allocations (0.0 to 1.0) served by the word lanes.
    pub fn lane_ratio(&self) -> f64 {
        let total = self.objects_allocated.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        let lanes: u64 = self.lane_counts().iter().sum();
        lanes as f64 / total as f64
    }

    /// Reset all statistics.
    pub fn reset(&self) {
        self.bytes_allocated.store(0, Ordering::Relaxed);
        self.objects_allocated.store(0, Ordering::Relaxed);
        for lane in &self.lane_allocations {
            lane.store(0, Ordering::Relaxed);
        }
        self.pool_allocations.store(0, Ordering::Relaxed);
        self.large_allocations.store(0, Ordering::Relaxed);
        self.pages_allocated.store(0, Ordering::Relaxed);
    }
}

impl Default for AllocStats {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AllocStats {
    /// One line, e.g. `objects=3 bytes=4200 lanes=[0,0,1,0] pool=1 large=1 pages=2`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [l0, l1, l2, l3] = self.lane_counts();
        write!(
            f,
            "objects={} bytes={} lanes=[{},{},{},{}] pool={} large={} pages={}",
            self.objects_allocated.load(Ordering::Relaxed),
            self.bytes_allocated.load(Ordering::Relaxed),
            l0,
            l1,
            l2,
            l3,
            self.pool_allocations.load(Ordering::Relaxed),
            self.large_allocations.load(Ordering::Relaxed),
            self.pages_allocated.load(Ordering::Relaxed)
        )
    }
}
