//! Allocator configuration parameters.
//!
//! Sizes are tunable per runtime instance. The defaults match the
//! size-class table in [`crate::heap::size_class`].

use crate::heap::size_class::{HEADER_SIZE, MAX_SMALL_OBJECT_SIZE, WORD_LANES, WORD_SIZE};
use thiserror::Error;

/// Configuration for the allocator.
///
/// # Example
///
/// ```ignore
/// use jolt_gc::GcConfig;
///
/// // Smaller pages, large-object space for anything over 256 bytes
/// let config = GcConfig {
///     page_size: 8 * 1024,
///     max_small_object_size: 256,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct GcConfig {
    // =========================================================================
    // Pools
    // =========================================================================
    /// Size of each page carved into fixed-size blocks by a pool.
    ///
    /// Must be a power of two and hold at least one block of the
    /// largest size class.
    ///
    /// Default: 16KB
    pub page_size: usize,

    /// Largest payload (excluding the type header) served by the
    /// size-class pools.
    ///
    /// Anything larger goes to the large object space. May be lowered
    /// below the table ceiling, never raised above it.
    ///
    /// Default: `MAX_SMALL_OBJECT_SIZE` (2032 bytes minus the header)
    pub max_small_object_size: usize,

    // =========================================================================
    // Debugging
    // =========================================================================
    /// Emit a trace event for every allocation.
    ///
    /// Default: false
    pub trace: bool,

    /// Fill fresh pages with a poison byte.
    ///
    /// Blocks are never zeroed; poisoning makes reads of
    /// uninitialized payload bytes easy to spot.
    ///
    /// Default: true in debug builds
    pub poison_fresh_pages: bool,
}

/// Byte written over fresh pages when poisoning is enabled.
pub const POISON_BYTE: u8 = 0xCB;

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            page_size: 16 * 1024, // 16KB
            max_small_object_size: MAX_SMALL_OBJECT_SIZE,
            trace: false,
            poison_fresh_pages: cfg!(debug_assertions),
        }
    }
}

impl GcConfig {
    /// Create a configuration with small pages.
    pub fn low_memory() -> Self {
        Self {
            page_size: 4 * 1024, // 4KB
            ..Default::default()
        }
    }

    /// Create a configuration for unit tests.
    ///
    /// Small pages so tests exercise page growth quickly.
    pub fn for_testing() -> Self {
        Self {
            page_size: 4 * 1024,
            poison_fresh_pages: true,
            ..Default::default()
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size < 4096 || !self.page_size.is_power_of_two() {
            return Err(ConfigError::InvalidPageSize(self.page_size));
        }
        if self.max_small_object_size > MAX_SMALL_OBJECT_SIZE {
            return Err(ConfigError::SmallObjectLimitTooLarge(
                self.max_small_object_size,
            ));
        }
        // The general path must at least cover what the word lanes cover.
        let min_small = WORD_LANES * WORD_SIZE - HEADER_SIZE;
        if self.max_small_object_size < min_small {
            return Err(ConfigError::SmallObjectLimitTooSmall(
                self.max_small_object_size,
            ));
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Page size is not a power of two or below 4KB.
    #[error("page size must be a power of two, minimum 4KB (got {0})")]
    InvalidPageSize(usize),
    /// Small-object limit exceeds the size-class table.
    #[error("small object limit {0} exceeds the size-class ceiling")]
    SmallObjectLimitTooLarge(usize),
    /// Small-object limit is below the three-word lane.
    #[error("small object limit {0} is smaller than a three-field object")]
    SmallObjectLimitTooSmall(usize),
}
