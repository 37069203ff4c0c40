//! Blocks above the size-class ceiling.
//!
//! Each block comes straight from the system allocator and is remembered
//! by its start address together with the layout it was allocated with.
//! Blocks live until the space is dropped.

use super::capacity_overflow;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Alignment of large blocks.
const LARGE_ALIGN: usize = 16;

/// Directly allocated blocks, keyed by start address.
pub struct LargeObjectSpace {
    blocks: Mutex<FxHashMap<usize, Layout>>,
    bytes: AtomicUsize,
}

impl LargeObjectSpace {
    /// Create an empty space.
    pub fn new() -> Self {
        Self {
            blocks: Mutex::new(FxHashMap::default()),
            bytes: AtomicUsize::new(0),
        }
    }

    /// Allocate a block of `block_size` bytes, header word included.
    ///
    /// The memory is not zeroed. A size with no valid layout panics and
    /// allocator exhaustion aborts through `handle_alloc_error`.
    pub fn alloc(&self, block_size: usize) -> NonNull<u8> {
        let Ok(layout) = Layout::from_size_align(block_size, LARGE_ALIGN) else {
            capacity_overflow(block_size, "bytes");
        };
        // SAFETY: block sizes always include the header word.
        let raw = unsafe { std::alloc::alloc(layout) };
        let Some(block) = NonNull::new(raw) else {
            std::alloc::handle_alloc_error(layout);
        };

        self.blocks.lock().insert(block.as_ptr() as usize, layout);
        self.bytes.fetch_add(block_size, Ordering::Relaxed);
        block
    }

    /// Check if `block` is the start of a large block.
    pub fn contains(&self, block: *const ()) -> bool {
        self.blocks.lock().contains_key(&(block as usize))
    }

    /// Block size recorded for `block`, header included.
    pub fn block_size(&self, block: *const ()) -> Option<usize> {
        self.blocks.lock().get(&(block as usize)).map(Layout::size)
    }

    /// Bytes held by live large blocks.
    pub fn usage(&self) -> usize {
        self.bytes.load(Ordering::Relaxed)
    }

    /// Number of live large blocks.
    pub fn count(&self) -> usize {
        self.blocks.lock().len()
    }
}

impl Default for LargeObjectSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LargeObjectSpace {
    fn drop(&mut self) {
        for (addr, layout) in self.blocks.get_mut().drain() {
            // SAFETY: `addr` came from `alloc` with this layout.
            unsafe { std::alloc::dealloc(addr as *mut u8, layout) };
        }
    }
}
