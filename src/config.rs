use std::mem;

use crate::utils::{DEFAULT_ALIGNMENT, checked_align};

/// Smallest block a pool hands out. A free block stores the link to the next
/// free block in its first word, so it can't be any smaller.
pub(crate) const MIN_BLOCK_SIZE: usize = mem::size_of::<*mut u8>();

/// Geometry of a [`crate::FixedSizeBlocks`] pool.
///
/// A pool never grows, so this is the whole of its configuration: how big a block
/// is, how many of them there are and how they are aligned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Requested size of one block in bytes.
    pub block_size: usize,
    /// Number of blocks carved out of the region.
    pub block_count: usize,
    /// Alignment of every block. Must be a power of two.
    pub alignment: usize,
}

impl PoolConfig {
    /// Blocks of `block_size` bytes aligned to [`DEFAULT_ALIGNMENT`].
    pub const fn new(block_size: usize, block_count: usize) -> Self {
        Self {
            block_size,
            block_count,
            alignment: DEFAULT_ALIGNMENT,
        }
    }

    /// Blocks able to hold exactly one `T` each.
    pub const fn for_type<T>(block_count: usize) -> Self {
        Self {
            block_size: mem::size_of::<T>(),
            block_count,
            alignment: mem::align_of::<T>(),
        }
    }

    pub const fn with_alignment(mut self, alignment: usize) -> Self {
        self.alignment = alignment;
        self
    }

    /// Alignment actually applied, never below the alignment of the free list link.
    #[inline]
    pub const fn effective_alignment(&self) -> usize {
        if self.alignment > mem::align_of::<*mut u8>() {
            self.alignment
        } else {
            mem::align_of::<*mut u8>()
        }
    }

    /// Distance in bytes between two consecutive blocks.
    ///
    /// The requested size is raised to [`MIN_BLOCK_SIZE`] and rounded up to the
    /// effective alignment so that every block start is aligned. None if that
    /// rounding overflows.
    #[inline]
    pub const fn effective_block_size(&self) -> Option<usize> {
        let size = if self.block_size > MIN_BLOCK_SIZE {
            self.block_size
        } else {
            MIN_BLOCK_SIZE
        };

        checked_align(size, self.effective_alignment())
    }

    /// Bytes needed for every block, or None if that overflows.
    #[inline]
    pub const fn region_size(&self) -> Option<usize> {
        match self.effective_block_size() {
            Some(block_size) => block_size.checked_mul(self.block_count),
            None => None,
        }
    }
}
