//! Fixed-block pools.
//!
//! A pool serves a single block size. It bump-allocates blocks out of the
//! current page and grabs a fresh page from the system allocator when the
//! page runs out:
//!
//! ```text
//!   page:  [blk][blk][blk][blk][ ......... unused ......... ]
//!                             ^cursor                       ^limit
//! ```
//!
//! Blocks are never returned to the pool individually; reclamation belongs
//! to the collector. Pages are released when the pool is dropped.

use crate::config::POISON_BYTE;
use parking_lot::Mutex;
use std::alloc::Layout;
use std::ptr::NonNull;

/// Alignment of every page (and therefore of every block start).
pub const PAGE_ALIGN: usize = 16;

/// A page of raw memory owned by a pool.
struct Page {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl Page {
    /// Grab a fresh page. Allocation failure aborts the process.
    fn new(layout: Layout, poison: bool) -> Self {
        // SAFETY: layout has non-zero size (validated page size).
        let raw = unsafe { std::alloc::alloc(layout) };
        let Some(ptr) = NonNull::new(raw) else {
            std::alloc::handle_alloc_error(layout);
        };
        if poison {
            // SAFETY: the page was just allocated with `layout.size()` bytes.
            unsafe { std::ptr::write_bytes(ptr.as_ptr(), POISON_BYTE, layout.size()) };
        }
        Self { ptr, layout }
    }

    #[inline]
    fn start(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    #[inline]
    fn end(&self) -> usize {
        self.start() + self.layout.size()
    }
}

impl Drop for Page {
    fn drop(&mut self) {
        // SAFETY: allocated in `Page::new` with the same layout.
        unsafe { std::alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

// Safety: a page is plain memory; access is serialized by the pool mutex.
unsafe impl Send for Page {}

/// Mutable part of a pool.
struct PoolState {
    pages: Vec<Page>,
    /// Next free block address in the current page.
    cursor: usize,
    /// End of the current page.
    limit: usize,
    /// Blocks handed out so far.
    blocks: usize,
}

/// Pool of fixed-size blocks.
pub struct Pool {
    /// Block size including the header word.
    block_size: usize,
    /// Layout of each page.
    page_layout: Layout,
    /// Poison fresh pages.
    poison: bool,
    state: Mutex<PoolState>,
}

impl Pool {
    /// Create an empty pool. No memory is reserved until the first block.
    pub fn new(block_size: usize, page_layout: Layout, poison: bool) -> Self {
        debug_assert!(block_size > 0 && block_size <= page_layout.size());
        Self {
            block_size,
            page_layout,
            poison,
            state: Mutex::new(PoolState {
                pages: Vec::new(),
                cursor: 0,
                limit: 0,
                blocks: 0,
            }),
        }
    }

    /// Hand out one block. Returns the block start (the header word).
    ///
    /// The second value is true when a fresh page had to be grabbed.
    #[inline]
    pub fn alloc(&self) -> (NonNull<u8>, bool) {
        let mut state = self.state.lock();
        let mut grew = false;
        if state.cursor + self.block_size > state.limit {
            let page = Page::new(self.page_layout, self.poison);
            state.cursor = page.start();
            state.limit = page.end();
            state.pages.push(page);
            grew = true;
        }

        let addr = state.cursor;
        state.cursor += self.block_size;
        state.blocks += 1;

        // SAFETY: addr lies inside a live page, which is never null.
        (unsafe { NonNull::new_unchecked(addr as *mut u8) }, grew)
    }

    /// Block size including the header word.
    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of pages grabbed so far.
    pub fn page_count(&self) -> usize {
        self.state.lock().pages.len()
    }

    /// Number of blocks handed out so far.
    pub fn blocks_allocated(&self) -> usize {
        self.state.lock().blocks
    }

    /// Check if a pointer falls inside one of this pool's pages.
    pub fn contains(&self, ptr: *const ()) -> bool {
        let addr = ptr as usize;
        self.state
            .lock()
            .pages
            .iter()
            .any(|page| addr >= page.start() && addr < page.end())
    }
}
