use std::ptr::NonNull;

use crate::hook;

/// Capability a pool draws its single backing region from.
///
/// Pools call [`Allocator::allocate`] exactly once when they are built and
/// [`Allocator::deallocate`] exactly once when they are dropped or rebuilt, so
/// implementations don't need to be fast, only predictable.
///
/// Memory returned by `allocate` must be aligned to at least
/// [`crate::utils::DEFAULT_ALIGNMENT`]. Pools that need more will over-allocate and
/// align the region start themselves.
pub trait Allocator {
    /// Requests `size` bytes. Returns None if the memory can't be obtained.
    fn allocate(&self, size: usize) -> Option<NonNull<u8>>;

    /// Gives back `memory`, previously returned by `allocate(size)` on this allocator.
    ///
    /// **SAFETY**: `memory` must come from this allocator with the same `size`, and
    /// must not be used or released again afterwards.
    unsafe fn deallocate(&self, memory: NonNull<u8>, size: usize);
}

/// Default [`Allocator`] of every pool. It forwards to whatever handlers
/// are currently installed on the [`crate::hook`].
///
/// The size passed to `deallocate` is ignored since the hook's release handler
/// only takes the address.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HookAllocator;

impl Allocator for HookAllocator {
    #[inline]
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        hook::allocate(size)
    }

    #[inline]
    unsafe fn deallocate(&self, memory: NonNull<u8>, _size: usize) {
        unsafe { hook::release(memory) }
    }
}

impl<A: Allocator + ?Sized> Allocator for &A {
    #[inline]
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        (**self).allocate(size)
    }

    #[inline]
    unsafe fn deallocate(&self, memory: NonNull<u8>, size: usize) {
        unsafe { (**self).deallocate(memory, size) }
    }
}
