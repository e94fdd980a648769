use std::{fmt, ptr::NonNull};

use log::{debug, trace, warn};

use crate::{
    allocator::{Allocator, HookAllocator},
    config::PoolConfig,
    utils::{DEFAULT_ALIGNMENT, align, is_aligned},
};

/// Link stored in the first word of a free block: the next free block or null.
type FreeLink = *mut u8;

/// A pool of equally sized blocks carved out of one region.
///
/// The region is requested from the [`Allocator`] once, when the pool is built,
/// and given back once, when it is dropped. It never grows: when every block is
/// in use [`FixedSizeBlocks::allocate`] returns None.
///
/// Free blocks are chained through their own storage, so keeping track of them
/// costs no extra memory:
///
/// ```text
///              free
///                |
///                v
/// +--------+  +--------+  +--------+  +--------+  +--------+
/// | in use |  | next --|->| in use |  | next --|->|  null  |
/// +--------+  +--------+  +--------+  +--------+  +--------+
///     0           1           2           3           4
/// ```
///
/// The flip side is that the first word of a block means "next free block" only
/// while the block is free. Once handed out it belongs to the caller.
///
/// If the region can't be obtained the pool has no blocks at all and every
/// `allocate` fails. The pool never retries.
pub struct FixedSizeBlocks<A: Allocator = HookAllocator> {
    /// Pointer returned by the allocator, kept to give the region back.
    region: Option<NonNull<u8>>,
    /// Address of the first block. Equal to `region` unless it had to be aligned up.
    start: *mut u8,
    /// Bytes requested from the allocator.
    region_size: usize,
    /// Head of the free list.
    free: FreeLink,
    config: PoolConfig,
    /// Blocks actually available, zero if the region couldn't be obtained.
    block_count: usize,
    available: usize,
    allocator: A,
}

impl FixedSizeBlocks<HookAllocator> {
    /// Creates `block_count` blocks of `block_size` bytes drawn from the [`crate::hook`].
    pub fn new(block_size: usize, block_count: usize) -> Self {
        Self::from_config(PoolConfig::new(block_size, block_count), HookAllocator)
    }
}

impl<A: Allocator> FixedSizeBlocks<A> {
    /// Creates `block_count` blocks of `block_size` bytes drawn from `allocator`.
    pub fn new_in(block_size: usize, block_count: usize, allocator: A) -> Self {
        Self::from_config(PoolConfig::new(block_size, block_count), allocator)
    }

    /// Creates the pool described by `config`, drawing its region from `allocator`.
    pub fn from_config(config: PoolConfig, allocator: A) -> Self {
        let mut blocks = Self {
            region: None,
            start: std::ptr::null_mut(),
            region_size: 0,
            free: std::ptr::null_mut(),
            config,
            block_count: 0,
            available: 0,
            allocator,
        };

        blocks.create_free_list();
        blocks
    }

    /// Requests the region and threads every block into the free list.
    fn create_free_list(&mut self) {
        let alignment = self.config.effective_alignment();
        let count = self.config.block_count;

        let Some(block_size) = self.config.effective_block_size() else {
            warn!(
                "blocks of {} bytes can't be aligned to {alignment} within the address space",
                self.config.block_size
            );
            return;
        };

        // Allocators only promise `DEFAULT_ALIGNMENT`, anything stricter needs
        // room to move the start forward.
        let padding = if alignment > DEFAULT_ALIGNMENT { alignment - 1 } else { 0 };

        let Some(size) = self.config.region_size().and_then(|size| size.checked_add(padding)) else {
            warn!("pool of {count} blocks of {block_size} bytes overflows the address space");
            return;
        };

        if count == 0 {
            return;
        }

        let Some(region) = self.allocator.allocate(size) else {
            warn!("could not obtain a region of {size} bytes for {count} blocks of {block_size} bytes");
            return;
        };

        let offset = align(region.as_ptr() as usize, alignment) - region.as_ptr() as usize;
        if offset > padding {
            warn!("allocator returned {region:p}, which is not aligned to {DEFAULT_ALIGNMENT}");
            unsafe { self.allocator.deallocate(region, size) };
            return;
        }

        let start = unsafe { region.as_ptr().add(offset) };

        unsafe {
            // Every block points to the one after it, the last one ends the list.
            for index in 0..count {
                let block = start.add(index * block_size);
                let next = if index + 1 < count {
                    block.add(block_size)
                } else {
                    std::ptr::null_mut()
                };

                block.cast::<FreeLink>().write(next);
            }
        }

        debug!("created pool of {count} blocks of {block_size} bytes at {start:p}");

        self.region = Some(region);
        self.start = start;
        self.region_size = size;
        self.free = start;
        self.block_count = count;
        self.available = count;
    }

    /// Gives the region back to the allocator. Every outstanding block dangles afterwards.
    fn release_region(&mut self) {
        if let Some(region) = self.region.take() {
            debug!("releasing pool region at {:p} ({} bytes)", self.start, self.region_size);
            unsafe { self.allocator.deallocate(region, self.region_size) };
        }

        self.start = std::ptr::null_mut();
        self.region_size = 0;
        self.free = std::ptr::null_mut();
        self.block_count = 0;
        self.available = 0;
    }

    /// Takes a block from the head of the free list in O(1).
    ///
    /// Returns None when every block is in use. The block's content is
    /// unspecified, its first word still holds a stale free list link.
    #[inline]
    pub fn allocate(&mut self) -> Option<NonNull<u8>> {
        let Some(block) = NonNull::new(self.free) else {
            trace!("pool of {} blocks exhausted", self.block_count);
            return None;
        };

        unsafe {
            self.free = block.cast::<FreeLink>().as_ptr().read();
        }
        self.available -= 1;

        Some(block)
    }

    /// Puts `memory` back at the head of the free list in O(1).
    ///
    /// **SAFETY**: `memory` must have been returned by [`FixedSizeBlocks::allocate`] on
    /// this pool, since the last time its region was rebuilt, and must not have been
    /// deallocated already. Debug builds check that it is a block of this pool; a
    /// double free is not detected and silently corrupts the free list.
    #[inline]
    pub unsafe fn deallocate(&mut self, memory: NonNull<u8>) {
        debug_assert!(self.contains(memory), "{memory:p} is not a block of this pool");
        debug_assert!(self.available < self.block_count);

        unsafe {
            memory.cast::<FreeLink>().as_ptr().write(self.free);
        }
        self.free = memory.as_ptr();
        self.available += 1;
    }

    /// Tells whether `memory` is the start of one of this pool's blocks.
    pub fn contains(&self, memory: NonNull<u8>) -> bool {
        if self.region.is_none() {
            return false;
        }

        let start = self.start as usize;
        let addr = memory.as_ptr() as usize;
        let end = start + self.block_count * self.block_size();

        (start..end).contains(&addr) && (addr - start) % self.block_size() == 0
    }

    /// Distance in bytes between two blocks, at least the requested block size.
    /// Zero if the requested size can't be rounded up to the alignment.
    #[inline]
    pub fn block_size(&self) -> usize {
        self.config.effective_block_size().unwrap_or(0)
    }

    /// Number of usable blocks, zero if the region couldn't be obtained.
    #[inline]
    pub fn block_count(&self) -> usize {
        self.block_count
    }

    /// Blocks currently on the free list.
    #[inline]
    pub fn available(&self) -> usize {
        self.available
    }

    /// Blocks currently handed out.
    #[inline]
    pub fn in_use(&self) -> usize {
        self.block_count - self.available
    }

    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.free.is_null()
    }

    /// Tells whether the region was obtained.
    #[inline]
    pub fn has_region(&self) -> bool {
        self.region.is_some()
    }

    #[inline]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    #[inline]
    pub fn allocator(&self) -> &A {
        &self.allocator
    }
}

/// Cloning a pool does **not** copy its blocks.
///
/// The clone gets a brand new region with the same geometry and every block free.
impl<A: Allocator + Clone> Clone for FixedSizeBlocks<A> {
    fn clone(&self) -> Self {
        Self::from_config(self.config, self.allocator.clone())
    }

    /// Gives back this pool's region, takes the geometry and allocator of `source`
    /// and builds a fresh region with every block free.
    ///
    /// Blocks previously handed out by `self` dangle afterwards.
    fn clone_from(&mut self, source: &Self) {
        self.release_region();
        self.config = source.config;
        self.allocator = source.allocator.clone();
        self.create_free_list();
    }
}

impl<A: Allocator> Drop for FixedSizeBlocks<A> {
    fn drop(&mut self) {
        self.release_region();
    }
}

impl<A: Allocator> fmt::Debug for FixedSizeBlocks<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedSizeBlocks")
            .field("start", &self.start)
            .field("block_size", &self.block_size())
            .field("block_count", &self.block_count)
            .field("available", &self.available)
            .finish()
    }
}
