//! Heap memory management.
//!
//! The heap routes every request to one of three places:
//! - Word lanes: dedicated pools for objects with 0, 1, 2 or 3 pointer fields
//! - General pools: one pool per size class, up to the small-object threshold
//! - Large Object Space: everything above the threshold

mod large_object_space;
mod pool;
pub mod size_class;

pub use large_object_space::LargeObjectSpace;
pub use pool::{PAGE_ALIGN, Pool};

use crate::alloc::{Allocation, SizeClass};
use crate::config::{ConfigError, GcConfig};
use crate::stats::AllocStats;
use size_class::{
    SIZE_CLASSES, WORD_LANES, WORD_SIZE, block_size_for, lane_block_size, size_class_index,
};

use std::alloc::Layout;

/// Main heap structure owning all pools.
pub struct GcHeap {
    /// Configuration parameters.
    config: GcConfig,

    /// Fixed-arity lanes, indexed by field count.
    lanes: [Pool; WORD_LANES],

    /// General pools, indexed like `SIZE_CLASSES`.
    pools: Box<[Pool]>,

    /// Large object space (direct allocation).
    large_objects: LargeObjectSpace,

    /// Allocation statistics.
    stats: AllocStats,
}

impl GcHeap {
    /// Create a new heap with the given configuration.
    pub fn new(config: GcConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let page_layout = Layout::from_size_align(config.page_size, PAGE_ALIGN)
            .map_err(|_| ConfigError::InvalidPageSize(config.page_size))?;
        let poison = config.poison_fresh_pages;

        let lanes = std::array::from_fn(|n| Pool::new(lane_block_size(n), page_layout, poison));
        let pools = SIZE_CLASSES
            .iter()
            .map(|&block_size| Pool::new(block_size, page_layout, poison))
            .collect();

        Ok(Self {
            config,
            lanes,
            pools,
            large_objects: LargeObjectSpace::new(),
            stats: AllocStats::new(),
        })
    }

    /// Create a heap with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(GcConfig::default()).expect("default GC configuration is valid")
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Allocate an object with `nfields` pointer-sized fields.
    ///
    /// Field counts 0..=3 take their dedicated lane; larger counts fall
    /// through to [`GcHeap::alloc_bytes`].
    #[inline]
    pub fn alloc_words(&self, nfields: usize) -> Allocation {
        match nfields {
            0..=3 => self.alloc_lane(nfields),
            _ => match nfields.checked_mul(WORD_SIZE) {
                Some(size) => self.alloc_bytes(size),
                None => capacity_overflow(nfields, "fields"),
            },
        }
    }

    /// Allocate a zero-field object.
    #[inline]
    pub fn alloc_0w(&self) -> Allocation {
        self.alloc_lane(0)
    }

    /// Allocate a one-field object.
    #[inline]
    pub fn alloc_1w(&self) -> Allocation {
        self.alloc_lane(1)
    }

    /// Allocate a two-field object.
    #[inline]
    pub fn alloc_2w(&self) -> Allocation {
        self.alloc_lane(2)
    }

    /// Allocate a three-field object.
    #[inline]
    pub fn alloc_3w(&self) -> Allocation {
        self.alloc_lane(3)
    }

    #[inline]
    fn alloc_lane(&self, nfields: usize) -> Allocation {
        let pool = &self.lanes[nfields];
        let (block, grew) = pool.alloc();
        if grew {
            self.stats.record_page();
            tracing::trace!(nfields, "word lane grabbed a fresh page");
        }
        self.stats.record_lane(nfields, pool.block_size());
        if self.config.trace {
            tracing::trace!(nfields, block = ?block, "lane allocation");
        }
        Allocation::new(block, pool.block_size(), SizeClass::Lane(nfields as u8))
    }

    /// Allocate a payload of `size` bytes.
    ///
    /// Returns uninitialized memory with a header word in front of it.
    /// Sizes above the small-object threshold bypass the pools.
    pub fn alloc_bytes(&self, size: usize) -> Allocation {
        if size > self.config.max_small_object_size {
            return self.alloc_large(size);
        }

        let Some(block_size) = block_size_for(size) else {
            capacity_overflow(size, "bytes");
        };
        let Some(idx) = size_class_index(block_size) else {
            return self.alloc_large(size);
        };

        let pool = &self.pools[idx];
        let (block, grew) = pool.alloc();
        if grew {
            self.stats.record_page();
            tracing::trace!(block_size = pool.block_size(), "size class grabbed a fresh page");
        }
        self.stats.record_pool(pool.block_size());
        if self.config.trace {
            tracing::trace!(size, class = idx, block = ?block, "pool allocation");
        }
        Allocation::new(block, pool.block_size(), SizeClass::Pool(idx as u8))
    }

    /// Allocate in the large object space.
    fn alloc_large(&self, size: usize) -> Allocation {
        let Some(block_size) = block_size_for(size) else {
            capacity_overflow(size, "bytes");
        };
        let block = self.large_objects.alloc(block_size);
        self.stats.record_large(block_size);
        tracing::trace!(size, "large object allocation");
        Allocation::new(block, block_size, SizeClass::Large)
    }

    // =========================================================================
    // Space Queries
    // =========================================================================

    /// Check if a block start is managed by this heap.
    pub fn contains(&self, block: *const ()) -> bool {
        self.lanes.iter().any(|pool| pool.contains(block))
            || self.pools.iter().any(|pool| pool.contains(block))
            || self.large_objects.contains(block)
    }

    /// Get the pool backing lane `nfields`.
    #[inline]
    pub fn lane(&self, nfields: usize) -> &Pool {
        &self.lanes[nfields]
    }

    /// Get the general pool for size class `idx`.
    #[inline]
    pub fn pool(&self, idx: usize) -> &Pool {
        &self.pools[idx]
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Get the configuration.
    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    /// Get allocation statistics.
    pub fn stats(&self) -> &AllocStats {
        &self.stats
    }

    /// Get the large object space.
    pub fn large_objects(&self) -> &LargeObjectSpace {
        &self.large_objects
    }
}

#[cold]
fn capacity_overflow(request: usize, unit: &str) -> ! {
    panic!("allocation of {} {} overflows the address space", request, unit)
}
