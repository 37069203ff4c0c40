//! Jolt allocator
//!
//! Size-classed allocation for tagged heap objects.
//!
//! # Architecture
//!
//! Every object is a block made of one header word followed by the payload.
//! The header is reserved for the type tag, which the runtime writes right
//! after allocation. The heap routes requests three ways:
//!
//! - **Word lanes**: dedicated pools for objects with 0, 1, 2 or 3
//!   pointer-sized fields. No size-class lookup on this path.
//!
//! - **General pools**: one pool per size class, for byte-sized requests
//!   and for objects with four or more fields, up to `MAX_SMALL_OBJECT_SIZE`.
//!
//! - **Large Object Space**: anything above the small-object threshold is
//!   allocated directly from the system allocator.
//!
//! Memory is never zeroed here, and allocation failure aborts the process.
//! Reclamation belongs to the collector, which is not part of this crate.
//!
//! # Usage
//!
//! ```ignore
//! use jolt_gc::{GcConfig, GcHeap};
//!
//! let heap = GcHeap::new(GcConfig::default())?;
//!
//! // Pair object: two pointer fields, served by the 2-word lane
//! let pair = heap.alloc_words(2);
//!
//! // Struct with a known byte size
//! let obj = heap.alloc_bytes(40);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod heap;

mod alloc;
mod stats;

// Re-exports for convenient access
pub use alloc::{Allocation, SizeClass};
pub use config::{ConfigError, GcConfig};
pub use heap::GcHeap;
pub use heap::size_class::{HEADER_SIZE, MAX_SMALL_OBJECT_SIZE, WORD_SIZE};
pub use stats::AllocStats;
