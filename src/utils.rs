//! This file contains the alignment helpers shared by every layer of the crate.
//! These are functions that don't particularly belong to any concrete module of the program.

use std::ptr::NonNull;

/// Alignment every handler installed on the [`crate::hook`] is expected to honour,
/// and the granularity used when sizing requests made through it.
pub const DEFAULT_ALIGNMENT: usize = 8;

/// It aligns `to_be_aligned` using `alignment`.
///
/// `alignment` must be a power of two. This is only verified in debug builds,
/// in release builds a wrong alignment silently yields a meaningless size.
///
/// This method is used to size pool blocks so that every block starts at an address
/// suitable for its occupant, and to round region sizes up to whole pages for
/// [`crate::kernel::PageAllocator`].
#[inline]
pub const fn align(to_be_aligned: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    (to_be_aligned + alignment - 1) & !(alignment - 1)
}

/// Same as [`align`], but returns None instead of wrapping when rounding up
/// would go past `usize::MAX`.
#[inline]
pub const fn checked_align(to_be_aligned: usize, alignment: usize) -> Option<usize> {
    debug_assert!(alignment.is_power_of_two());
    match to_be_aligned.checked_add(alignment - 1) {
        Some(padded) => Some(padded & !(alignment - 1)),
        None => None,
    }
}

/// Tells whether `ptr` is a multiple of `alignment`.
#[inline]
pub fn is_aligned(ptr: NonNull<u8>, alignment: usize) -> bool {
    debug_assert!(alignment.is_power_of_two());
    (ptr.as_ptr() as usize) & (alignment - 1) == 0
}
