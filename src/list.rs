use std::{
    fmt,
    marker::PhantomData,
    mem::MaybeUninit,
    ptr::NonNull,
};

use crate::{
    allocator::{Allocator, HookAllocator},
    error::{Error, Result},
    pool::ObjectPool,
};

/// Non-null pointer to `T`.
pub(crate) type Link<T> = Option<NonNull<T>>;

struct Node<T> {
    /// Pointer to the previous node of the list
    prev: Link<Self>,
    /// Pointer to the next node of the list, None only for the sentinel
    next: Link<Self>,
    /// Element of the node. Never initialized for the sentinel.
    value: MaybeUninit<T>,
}

/// Doubly linked list whose nodes come from a fixed size [`ObjectPool`].
///
/// The pool is sized `capacity + 1`: the extra block holds a sentinel node
/// that is always the last node of the chain and marks the "one past the end"
/// position. The sentinel never carries a value.
///
/// ```text
///   head                                     sentinel
///    |                                          |
///    v                                          v
/// +-------+      +-------+      +-------+      +-------+
/// |   a   | <--> |   b   | <--> |   c   | <--> |  end  | --> None
/// +-------+      +-------+      +-------+      +-------+
/// ```
///
/// Nothing ever allocates outside the pool. When every node is in use the
/// operations that need one return [`Error::Exhausted`] and leave the list as it was.
pub struct List<T, A: Allocator = HookAllocator> {
    pool: ObjectPool<Node<T>, A>,
    head: NonNull<Node<T>>,
    sentinel: NonNull<Node<T>>,
    len: usize,
    capacity: usize,
    marker: PhantomData<T>,
}

impl<T> List<T, HookAllocator> {
    /// Creates an empty list able to hold `capacity` values, drawing its
    /// nodes from the [`crate::hook`].
    pub fn new(capacity: usize) -> Result<Self> {
        Self::new_in(capacity, HookAllocator)
    }
}

impl<T, A: Allocator> List<T, A> {
    /// Creates an empty list able to hold `capacity` values, drawing its
    /// nodes from `allocator`.
    ///
    /// Fails if the pool's region, and so the sentinel, can't be obtained.
    pub fn new_in(capacity: usize, allocator: A) -> Result<Self> {
        // One more node for the sentinel.
        let nodes = capacity
            .checked_add(1)
            .ok_or(Error::RegionUnavailable { size: usize::MAX })?;
        let mut pool = ObjectPool::new_in(nodes, allocator);

        let sentinel = pool
            .construct(Node {
                prev: None,
                next: None,
                value: MaybeUninit::uninit(),
            })
            .ok_or(Error::RegionUnavailable {
                size: pool.region_size(),
            })?;

        Ok(Self {
            pool,
            head: sentinel,
            sentinel,
            len: 0,
            capacity,
            marker: PhantomData,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Maximum number of values the list can hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Links a new node holding `value` right before `position` in O(1).
    ///
    /// **SAFETY**: `position` must be a live node of this list (the sentinel included).
    unsafe fn insert_before(&mut self, mut position: NonNull<Node<T>>, value: T) -> Result<NonNull<Node<T>>> {
        let capacity = self.capacity;

        unsafe {
            let prev = position.as_ref().prev;
            let node = self
                .pool
                .construct(Node {
                    prev,
                    next: Some(position),
                    value: MaybeUninit::new(value),
                })
                .ok_or(Error::Exhausted { capacity })?;

            position.as_mut().prev = Some(node);

            // Without a previous node the new one is the first of the list.
            match prev {
                Some(mut prev) => prev.as_mut().next = Some(node),
                None => self.head = node,
            }

            self.len += 1;

            Ok(node)
        }
    }

    /// Unlinks `node` in O(1), gives its block back to the pool and returns its value.
    ///
    /// **SAFETY**: `node` must be a live node of this list other than the sentinel.
    unsafe fn unlink(&mut self, node: NonNull<Node<T>>) -> T {
        debug_assert!(node != self.sentinel);

        unsafe {
            let Node { prev, next, value } = node.as_ptr().read();

            // Every value node has a successor, at worst the sentinel.
            if let Some(mut next) = next {
                next.as_mut().prev = prev;
            }

            match prev {
                Some(mut prev) => prev.as_mut().next = next,
                None => self.head = next.unwrap_or(self.sentinel),
            }

            self.pool.deallocate(node);
            self.len -= 1;

            value.assume_init()
        }
    }

    /// Inserts `value` as the first element.
    pub fn push_front(&mut self, value: T) -> Result<()> {
        unsafe { self.insert_before(self.head, value).map(drop) }
    }

    /// Inserts `value` as the last element.
    pub fn push_back(&mut self, value: T) -> Result<()> {
        unsafe { self.insert_before(self.sentinel, value).map(drop) }
    }

    pub fn pop_front(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }

        unsafe { Some(self.unlink(self.head)) }
    }

    pub fn pop_back(&mut self) -> Option<T> {
        let last = unsafe { self.sentinel.as_ref().prev? };

        unsafe { Some(self.unlink(last)) }
    }

    pub fn front(&self) -> Option<&T> {
        self.iter().next()
    }

    pub fn front_mut(&mut self) -> Option<&mut T> {
        self.iter_mut().next()
    }

    pub fn back(&self) -> Option<&T> {
        self.iter().next_back()
    }

    pub fn back_mut(&mut self) -> Option<&mut T> {
        self.iter_mut().next_back()
    }

    /// Drops every value and gives every node but the sentinel back to the pool.
    pub fn clear(&mut self) {
        let mut current = self.head;

        while current != self.sentinel {
            unsafe {
                let next = current.as_ref().next.unwrap_or(self.sentinel);
                current.as_mut().value.assume_init_drop();
                self.pool.deallocate(current);
                current = next;
            }
        }

        unsafe { self.sentinel.as_mut().prev = None };
        self.head = self.sentinel;
        self.len = 0;
    }

    /// Appends a copy of every value of `other`, in order, to the end of this list.
    ///
    /// Stops at the first value that doesn't fit. The values appended until
    /// then stay in the list.
    pub fn merge<B: Allocator>(&mut self, other: &List<T, B>) -> Result<()>
    where
        T: Clone,
    {
        other.iter().try_for_each(|value| self.push_back(value.clone()))
    }

    /// Deep copy with the same capacity, drawn from a clone of this list's allocator.
    pub fn try_clone(&self) -> Result<Self>
    where
        T: Clone,
        A: Clone,
    {
        let mut copy = Self::new_in(self.capacity, self.pool.allocator().clone())?;
        copy.merge(self)?;
        Ok(copy)
    }

    /// Replaces this list with a deep copy of `source`: its pool is rebuilt to
    /// `source`'s capacity and allocator and then filled value by value.
    ///
    /// On error this list is left untouched.
    pub fn assign_from(&mut self, source: &Self) -> Result<()>
    where
        T: Clone,
        A: Clone,
    {
        *self = source.try_clone()?;
        Ok(())
    }

    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            front: self.head,
            back: self.sentinel,
            remaining: self.len,
            marker: PhantomData,
        }
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, T> {
        IterMut {
            front: self.head,
            back: self.sentinel,
            remaining: self.len,
            marker: PhantomData,
        }
    }

    /// Cursor on the first element, or on the end position if the list is empty.
    pub fn cursor_front_mut(&mut self) -> CursorMut<'_, T, A> {
        CursorMut {
            current: self.head,
            list: self,
        }
    }

    /// Cursor on the end position, one past the last element.
    pub fn cursor_end_mut(&mut self) -> CursorMut<'_, T, A> {
        CursorMut {
            current: self.sentinel,
            list: self,
        }
    }
}

impl<T, A: Allocator> Drop for List<T, A> {
    fn drop(&mut self) {
        self.clear();
        // The sentinel holds no value, only its block goes back.
        unsafe { self.pool.deallocate(self.sentinel) };
    }
}

impl<T: fmt::Debug, A: Allocator> fmt::Debug for List<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T: PartialEq, A: Allocator, B: Allocator> PartialEq<List<T, B>> for List<T, A> {
    fn eq(&self, other: &List<T, B>) -> bool {
        self.len == other.len && self.iter().eq(other.iter())
    }
}

/// Position inside a [`List`] that can insert and remove in O(1).
///
/// The cursor is either on an element or on the end position (the sentinel).
/// It borrows the list mutably, so no position can outlive the node it points to.
pub struct CursorMut<'a, T, A: Allocator = HookAllocator> {
    list: &'a mut List<T, A>,
    current: NonNull<Node<T>>,
}

impl<'a, T, A: Allocator> CursorMut<'a, T, A> {
    /// Element under the cursor, None on the end position.
    pub fn current(&mut self) -> Option<&mut T> {
        if self.is_end() {
            return None;
        }

        unsafe { Some(self.current.as_mut().value.assume_init_mut()) }
    }

    #[inline]
    pub fn is_end(&self) -> bool {
        self.current == self.list.sentinel
    }

    /// Moves to the next position. Returns false, without moving, on the end position.
    pub fn move_next(&mut self) -> bool {
        match unsafe { self.current.as_ref().next } {
            Some(next) => {
                self.current = next;
                true
            }
            None => false,
        }
    }

    /// Moves to the previous position. Returns false, without moving, on the first one.
    pub fn move_prev(&mut self) -> bool {
        match unsafe { self.current.as_ref().prev } {
            Some(prev) => {
                self.current = prev;
                true
            }
            None => false,
        }
    }

    /// Inserts `value` right before the cursor, which stays where it is.
    /// On the end position this appends.
    pub fn insert_before(&mut self, value: T) -> Result<()> {
        unsafe { self.list.insert_before(self.current, value).map(drop) }
    }

    /// Removes the element under the cursor and moves to its successor.
    /// Returns None, removing nothing, on the end position.
    pub fn remove_current(&mut self) -> Option<T> {
        if self.is_end() {
            return None;
        }

        let node = self.current;
        unsafe {
            self.current = node.as_ref().next.unwrap_or(self.list.sentinel);
            Some(self.list.unlink(node))
        }
    }
}

/// Front to back iterator, also walks back to front.
pub struct Iter<'a, T> {
    front: NonNull<Node<T>>,
    /// Exclusive: the node after the last one still to be yielded.
    back: NonNull<Node<T>>,
    remaining: usize,
    marker: PhantomData<&'a T>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        unsafe {
            let node = self.front;
            self.front = node.as_ref().next?;
            self.remaining -= 1;

            Some(node.as_ref().value.assume_init_ref())
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> DoubleEndedIterator for Iter<'_, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        unsafe {
            self.back = self.back.as_ref().prev?;
            self.remaining -= 1;

            Some(self.back.as_ref().value.assume_init_ref())
        }
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}

pub struct IterMut<'a, T> {
    front: NonNull<Node<T>>,
    back: NonNull<Node<T>>,
    remaining: usize,
    marker: PhantomData<&'a mut T>,
}

impl<'a, T> Iterator for IterMut<'a, T> {
    type Item = &'a mut T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        unsafe {
            let mut node = self.front;
            self.front = node.as_ref().next?;
            self.remaining -= 1;

            Some(node.as_mut().value.assume_init_mut())
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> DoubleEndedIterator for IterMut<'_, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        unsafe {
            self.back = self.back.as_ref().prev?;
            self.remaining -= 1;

            Some(self.back.as_mut().value.assume_init_mut())
        }
    }
}

impl<T> ExactSizeIterator for IterMut<'_, T> {}

impl<'a, T, A: Allocator> IntoIterator for &'a List<T, A> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, T, A: Allocator> IntoIterator for &'a mut List<T, A> {
    type Item = &'a mut T;
    type IntoIter = IterMut<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}
