use std::{fmt, marker::PhantomData, ptr::NonNull};

use crate::{
    allocator::{Allocator, HookAllocator},
    blocks::FixedSizeBlocks,
    config::PoolConfig,
};

/// A [`FixedSizeBlocks`] pool whose blocks are sized and aligned for one `T`.
///
/// The pool only deals in raw storage. [`ObjectPool::allocate`] hands out
/// uninitialized memory and [`ObjectPool::deallocate`] takes it back without
/// running any destructor; [`ObjectPool::construct`] and [`ObjectPool::destroy`]
/// do the placement and the explicit drop on top of that.
pub struct ObjectPool<T, A: Allocator = HookAllocator> {
    blocks: FixedSizeBlocks<A>,
    marker: PhantomData<fn() -> T>,
}

impl<T> ObjectPool<T, HookAllocator> {
    /// Room for `capacity` objects, drawn from the [`crate::hook`].
    pub fn new(capacity: usize) -> Self {
        Self::new_in(capacity, HookAllocator)
    }
}

impl<T, A: Allocator> ObjectPool<T, A> {
    /// Room for `capacity` objects, drawn from `allocator`.
    pub fn new_in(capacity: usize, allocator: A) -> Self {
        Self {
            blocks: FixedSizeBlocks::from_config(PoolConfig::for_type::<T>(capacity), allocator),
            marker: PhantomData,
        }
    }

    /// Uninitialized storage for one `T`, or None if the pool is exhausted.
    #[inline]
    pub fn allocate(&mut self) -> Option<NonNull<T>> {
        self.blocks.allocate().map(NonNull::cast)
    }

    /// Returns storage to the pool. Whatever `T` lived there must already be dropped.
    ///
    /// **SAFETY**: same contract as [`FixedSizeBlocks::deallocate`].
    #[inline]
    pub unsafe fn deallocate(&mut self, object: NonNull<T>) {
        unsafe { self.blocks.deallocate(object.cast()) }
    }

    /// Moves `value` into a free block. If the pool is exhausted `value` is
    /// dropped and None is returned.
    pub fn construct(&mut self, value: T) -> Option<NonNull<T>> {
        let object = self.allocate()?;
        unsafe { object.as_ptr().write(value) };
        Some(object)
    }

    /// Drops the object in place and gives its block back.
    ///
    /// **SAFETY**: `object` must come from [`ObjectPool::construct`] on this pool (or be
    /// storage from [`ObjectPool::allocate`] holding an initialized `T`) and must not
    /// be used afterwards.
    pub unsafe fn destroy(&mut self, object: NonNull<T>) {
        unsafe {
            object.as_ptr().drop_in_place();
            self.deallocate(object);
        }
    }

    /// Number of objects the pool can hold at once.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.blocks.block_count()
    }

    #[inline]
    pub fn available(&self) -> usize {
        self.blocks.available()
    }

    #[inline]
    pub fn has_region(&self) -> bool {
        self.blocks.has_region()
    }

    /// Bytes this pool asks its allocator for.
    pub(crate) fn region_size(&self) -> usize {
        self.blocks.config().region_size().unwrap_or(usize::MAX)
    }

    #[inline]
    pub fn allocator(&self) -> &A {
        self.blocks.allocator()
    }
}

/// Same as [`FixedSizeBlocks`]: the clone is an empty pool of the same capacity.
impl<T, A: Allocator + Clone> Clone for ObjectPool<T, A> {
    fn clone(&self) -> Self {
        Self {
            blocks: self.blocks.clone(),
            marker: PhantomData,
        }
    }

    fn clone_from(&mut self, source: &Self) {
        self.blocks.clone_from(&source.blocks);
    }
}

impl<T, A: Allocator> fmt::Debug for ObjectPool<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPool")
            .field("capacity", &self.capacity())
            .field("available", &self.available())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{kernel::PageAllocator, utils::is_aligned};
    use std::{cell::Cell, mem, rc::Rc};

    struct DropCounter(Rc<Cell<usize>>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn holds_exactly_capacity_objects() {
        let mut pool: ObjectPool<[u64; 3], _> = ObjectPool::new_in(4, PageAllocator);

        let objects: Vec<_> = (0..4u64).map(|i| pool.construct([i; 3]).unwrap()).collect();
        assert!(pool.construct([9; 3]).is_none());

        for (i, object) in objects.iter().enumerate() {
            assert_eq!([i as u64; 3], unsafe { *object.as_ptr() });
        }
    }

    #[test]
    fn storage_is_aligned_for_the_type() {
        #[repr(align(32))]
        struct Aligned(#[allow(dead_code)] u8);

        let mut pool: ObjectPool<Aligned, _> = ObjectPool::new_in(5, PageAllocator);

        while let Some(object) = pool.allocate() {
            assert!(is_aligned(object.cast(), mem::align_of::<Aligned>()));
        }
    }

    #[test]
    fn destroy_drops_and_frees() {
        let drops = Rc::new(Cell::new(0));
        let mut pool = ObjectPool::new_in(1, PageAllocator);

        let object = pool.construct(DropCounter(drops.clone())).unwrap();
        assert_eq!(0, pool.available());

        unsafe { pool.destroy(object) };

        assert_eq!(1, drops.get());
        assert_eq!(1, pool.available());
    }

    #[test]
    fn deallocate_does_not_drop() {
        let drops = Rc::new(Cell::new(0));
        let mut pool = ObjectPool::new_in(1, PageAllocator);

        let object = pool.construct(DropCounter(drops.clone())).unwrap();
        unsafe {
            // Take the value out so the block is raw storage again.
            let value = object.as_ptr().read();
            pool.deallocate(object);
            assert_eq!(0, drops.get());
            drop(value);
        }

        assert_eq!(1, drops.get());
    }

    #[test]
    fn clone_has_full_capacity() {
        let mut pool: ObjectPool<u32, _> = ObjectPool::new_in(2, PageAllocator);
        pool.construct(1).unwrap();

        let copy = pool.clone();

        assert_eq!(2, copy.capacity());
        assert_eq!(2, copy.available());
    }
}
