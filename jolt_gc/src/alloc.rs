//! Raw allocation handle.
//!
//! An `Allocation` is what the heap hands back: a block whose first word
//! is reserved for the type tag, followed by uninitialized payload bytes.

use crate::heap::size_class::HEADER_SIZE;
use std::ptr::NonNull;

/// Where an allocation was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizeClass {
    /// Fixed-arity lane for objects with this many pointer fields (0..=3).
    Lane(u8),
    /// General pool, by index into [`crate::heap::size_class::SIZE_CLASSES`].
    Pool(u8),
    /// Large object space.
    Large,
}

impl SizeClass {
    /// Check if this allocation came from one of the size-class pools.
    #[inline]
    pub fn is_small(self) -> bool {
        !matches!(self, SizeClass::Large)
    }
}

/// A freshly allocated, untagged block.
///
/// # Safety
///
/// The payload is uninitialized. The header word must be written (tagged)
/// before the object is handed to any other component.
#[derive(Debug, Clone, Copy)]
pub struct Allocation {
    /// Start of the block (the header word).
    block: NonNull<u8>,
    /// Block size including the header.
    block_size: usize,
    /// Lane, pool or large space.
    class: SizeClass,
}

impl Allocation {
    #[inline]
    pub(crate) fn new(block: NonNull<u8>, block_size: usize, class: SizeClass) -> Self {
        debug_assert!(block_size >= HEADER_SIZE);
        Self {
            block,
            block_size,
            class,
        }
    }

    /// Pointer to the header word.
    #[inline]
    pub fn header(&self) -> NonNull<u8> {
        self.block
    }

    /// Pointer to the first payload byte (just past the header word).
    #[inline]
    pub fn payload(&self) -> NonNull<u8> {
        // SAFETY: every block is at least HEADER_SIZE bytes long.
        unsafe { NonNull::new_unchecked(self.block.as_ptr().add(HEADER_SIZE)) }
    }

    /// Bytes usable by the payload.
    #[inline]
    pub fn usable_size(&self) -> usize {
        self.block_size - HEADER_SIZE
    }

    /// Block size including the header word.
    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Where this allocation was served from.
    #[inline]
    pub fn class(&self) -> SizeClass {
        self.class
    }
}
