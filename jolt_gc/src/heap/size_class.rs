//! Size-class table.
//!
//! Every small block carries one header word (the type tag) followed by
//! the payload. Block sizes below include the header.
//!
//! ```text
//!   block start          payload
//!   |                    |
//!   v                    v
//!   +--------------------+-------------------------------+
//!   | type tag (1 word)  | payload (block_size - header) |
//!   +--------------------+-------------------------------+
//! ```

/// Size of a machine word.
pub const WORD_SIZE: usize = std::mem::size_of::<usize>();

/// Bytes reserved in front of every payload for the type tag.
pub const HEADER_SIZE: usize = WORD_SIZE;

/// Largest block served by the size-class pools, header included.
pub const SZCLASS_CEILING: usize = 2032;

/// Largest payload served by the size-class pools.
pub const MAX_SMALL_OBJECT_SIZE: usize = SZCLASS_CEILING - HEADER_SIZE;

/// Number of dedicated fixed-arity lanes (0, 1, 2 and 3 fields).
pub const WORD_LANES: usize = 4;

/// Block sizes of the general pools, ascending.
pub const SIZE_CLASSES: [usize; 44] = [
    8, 16, 24, 32, 40, 48, 56, 64, //
    80, 96, 112, 128, 144, 160, 176, 192, 208, 224, 240, 256, //
    288, 320, 352, 384, 416, 448, 480, 512, //
    576, 640, 704, 768, 832, 896, 960, 1024, //
    1152, 1280, 1408, 1536, 1664, 1792, 1920, 2032,
];

/// Block size of the lane serving objects with `nfields` pointer fields.
#[inline]
pub const fn lane_block_size(nfields: usize) -> usize {
    (nfields + 1) * WORD_SIZE
}

/// Index of the smallest size class that fits `block_size` bytes.
///
/// Returns `None` above [`SZCLASS_CEILING`].
#[inline]
pub fn size_class_index(block_size: usize) -> Option<usize> {
    let idx = SIZE_CLASSES.partition_point(|&class| class < block_size);
    (idx < SIZE_CLASSES.len()).then_some(idx)
}

/// Block size (header included) needed for a payload of `size` bytes.
///
/// Returns `None` when the block size does not fit in a `usize`.
#[inline]
pub const fn block_size_for(size: usize) -> Option<usize> {
    match size.checked_add(HEADER_SIZE + WORD_SIZE - 1) {
        Some(padded) => Some(padded & !(WORD_SIZE - 1)),
        None => None,
    }
}

/// Align a size up to the given alignment.
#[inline]
pub const fn align_up(size: usize, align: usize) -> usize {
    (size + align - 1) & !(align - 1)
}
