//! Ordered dictionary: a binary search tree for lookups with a second, doubly
//! linked chain threaded through the same nodes that remembers insertion order.
//!
//! ```text
//!  tree (by key)                    chain (by insertion)
//!
//!        c                 head                            sentinel
//!       / \                 |                                  |
//!      a   d                v                                  v
//!       \                  +---+    +---+    +---+    +---+    +---+
//!        b                 | c |<-->| a |<-->| b |<-->| d |<-->|   |
//!                          +---+    +---+    +---+    +---+    +---+
//! ```
//!
//! The tree is never rebalanced. Lookups and inserts cost O(h) with h the tree
//! height, and keys arriving already sorted turn the tree into a list with
//! h == n. That's accepted: the dictionaries this crate is meant for are small
//! and filled once. [`Dictionary::depth`] reports the current height.

use std::{
    borrow::Borrow,
    cmp::Ordering,
    fmt,
    marker::PhantomData,
    mem::MaybeUninit,
    ptr::{self, NonNull},
};

use crate::{
    allocator::{Allocator, HookAllocator},
    error::{Error, Result},
    list::Link,
    pool::ObjectPool,
};

struct Node<K, V> {
    /// Subtree with smaller keys.
    left: Link<Self>,
    /// Subtree with greater keys.
    right: Link<Self>,
    /// Previously inserted node.
    prev: Link<Self>,
    /// Next inserted node, None only for the sentinel.
    next: Link<Self>,
    key: MaybeUninit<K>,
    value: MaybeUninit<V>,
}

impl<K, V> Node<K, V> {
    fn sentinel() -> Self {
        Self {
            left: None,
            right: None,
            prev: None,
            next: None,
            key: MaybeUninit::uninit(),
            value: MaybeUninit::uninit(),
        }
    }
}

/// Key/value map with a fixed capacity, iterated in insertion order.
///
/// Inserting a key that is already present changes nothing: the first value
/// written for a key wins.
pub struct Dictionary<K, V, A: Allocator = HookAllocator> {
    pool: ObjectPool<Node<K, V>, A>,
    root: Link<Node<K, V>>,
    head: NonNull<Node<K, V>>,
    sentinel: NonNull<Node<K, V>>,
    len: usize,
    capacity: usize,
    marker: PhantomData<(K, V)>,
}

impl<K, V> Dictionary<K, V, HookAllocator> {
    /// Creates an empty dictionary able to hold `capacity` entries, drawing its
    /// nodes from the [`crate::hook`].
    pub fn new(capacity: usize) -> Result<Self> {
        Self::new_in(capacity, HookAllocator)
    }
}

impl<K, V, A: Allocator> Dictionary<K, V, A> {
    pub fn new_in(capacity: usize, allocator: A) -> Result<Self> {
        // One more node for the sentinel.
        let nodes = capacity
            .checked_add(1)
            .ok_or(Error::RegionUnavailable { size: usize::MAX })?;
        let mut pool = ObjectPool::new_in(nodes, allocator);

        let sentinel = pool.construct(Node::sentinel()).ok_or(Error::RegionUnavailable {
            size: pool.region_size(),
        })?;

        Ok(Self {
            pool,
            root: None,
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

    /// Maximum number of entries, fixed at construction.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Walks the tree from the root looking for `key`.
    fn find<Q>(&self, key: &Q) -> Link<Node<K, V>>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut current = self.root;

        while let Some(node) = current {
            let node = unsafe { node.as_ref() };

            current = match key.cmp(unsafe { node.key.assume_init_ref() }.borrow()) {
                Ordering::Less => node.left,
                Ordering::Greater => node.right,
                Ordering::Equal => return current,
            };
        }

        None
    }

    /// Returns the tree link that points, or would point, at `key`'s node.
    fn find_slot<Q>(&mut self, key: &Q) -> *mut Link<Node<K, V>>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut slot: *mut Link<Node<K, V>> = &mut self.root;

        unsafe {
            while let Some(node) = *slot {
                let node = node.as_ptr();

                slot = match key.cmp((*node).key.assume_init_ref().borrow()) {
                    Ordering::Less => ptr::addr_of_mut!((*node).left),
                    Ordering::Greater => ptr::addr_of_mut!((*node).right),
                    Ordering::Equal => return slot,
                };
            }
        }

        slot
    }

    /// Inserts `key` with `value` if `key` isn't present yet.
    ///
    /// Returns `Ok(false)`, dropping the arguments and leaving the stored value
    /// alone, when the key already exists. The new entry goes to the end of the
    /// iteration order regardless of where it lands in the tree.
    pub fn insert(&mut self, key: K, value: V) -> Result<bool>
    where
        K: Ord,
    {
        let slot = self.find_slot(&key);
        if unsafe { (*slot).is_some() } {
            return Ok(false);
        }

        let mut sentinel = self.sentinel;
        let last = unsafe { sentinel.as_ref().prev };

        let node = self
            .pool
            .construct(Node {
                left: None,
                right: None,
                prev: last,
                next: Some(sentinel),
                key: MaybeUninit::new(key),
                value: MaybeUninit::new(value),
            })
            .ok_or(Error::Exhausted {
                capacity: self.capacity,
            })?;

        unsafe {
            // Nothing moved since the walk, so the slot is still the right parent link.
            *slot = Some(node);

            sentinel.as_mut().prev = Some(node);
            match last {
                Some(mut last) => last.as_mut().next = Some(node),
                None => self.head = node,
            }
        }

        self.len += 1;
        Ok(true)
    }

    /// Tells whether an entry for `key` exists.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.find(key).is_some()
    }

    /// Value stored for `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.find(key)
            .map(|node| unsafe { (*node.as_ptr()).value.assume_init_ref() })
    }

    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.find(key)
            .map(|node| unsafe { (*node.as_ptr()).value.assume_init_mut() })
    }

    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.find(key).map(|node| unsafe {
            let node = &*node.as_ptr();
            (node.key.assume_init_ref(), node.value.assume_init_ref())
        })
    }

    /// Removes the entry for `key` and returns its value.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.remove_entry(key).map(|(_, value)| value)
    }

    /// Removes the entry for `key` from both the tree and the iteration chain,
    /// gives its node back to the pool and returns the key and value.
    pub fn remove_entry<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let slot = self.find_slot(key);

        unsafe {
            let node = (*slot)?;
            self.detach_from_tree(slot, node);
            self.detach_from_chain(node);

            let Node { key, value, .. } = node.as_ptr().read();
            self.pool.deallocate(node);
            self.len -= 1;

            Some((key.assume_init(), value.assume_init()))
        }
    }

    /// Replaces `node` in the tree by one of its descendants.
    ///
    /// With two children the smallest node of the right subtree is moved into
    /// `node`'s place. Nodes are relinked rather than values swapped, so every
    /// other node keeps its place in the iteration chain.
    ///
    /// **SAFETY**: `slot` must be the tree link pointing at `node`.
    unsafe fn detach_from_tree(&mut self, slot: *mut Link<Node<K, V>>, node: NonNull<Node<K, V>>) {
        unsafe {
            let (left, right) = {
                let node = node.as_ref();
                (node.left, node.right)
            };

            *slot = match (left, right) {
                (None, child) | (child, None) => child,
                (Some(left), Some(right)) => {
                    // Leftmost node of the right subtree and the link pointing at it.
                    let mut successor_slot: *mut Link<Node<K, V>> =
                        ptr::addr_of_mut!((*node.as_ptr()).right);
                    let mut successor = right;
                    while let Some(smaller) = successor.as_ref().left {
                        successor_slot = ptr::addr_of_mut!((*successor.as_ptr()).left);
                        successor = smaller;
                    }

                    if successor != right {
                        *successor_slot = successor.as_ref().right;
                        (*successor.as_ptr()).right = Some(right);
                    }
                    (*successor.as_ptr()).left = Some(left);

                    Some(successor)
                }
            };
        }
    }

    /// **SAFETY**: `node` must be a live entry node of this dictionary.
    unsafe fn detach_from_chain(&mut self, node: NonNull<Node<K, V>>) {
        unsafe {
            let (prev, next) = {
                let node = node.as_ref();
                (node.prev, node.next)
            };

            // Entry nodes always have a successor, at worst the sentinel.
            let mut next = next.unwrap_or(self.sentinel);
            next.as_mut().prev = prev;

            match prev {
                Some(mut prev) => prev.as_mut().next = Some(next),
                None => self.head = next,
            }
        }
    }

    /// Drops every entry and gives every node but the sentinel back to the pool.
    pub fn clear(&mut self) {
        let mut current = self.head;

        while current != self.sentinel {
            unsafe {
                let next = current.as_ref().next.unwrap_or(self.sentinel);
                current.as_mut().key.assume_init_drop();
                current.as_mut().value.assume_init_drop();
                self.pool.deallocate(current);
                current = next;
            }
        }

        unsafe { self.sentinel.as_mut().prev = None };
        self.root = None;
        self.head = self.sentinel;
        self.len = 0;
    }

    /// Inserts a copy of every entry of `other`, in `other`'s iteration order.
    /// Keys already present keep their value.
    ///
    /// Stops at the first entry that doesn't fit; entries merged until then stay.
    pub fn merge<B: Allocator>(&mut self, other: &Dictionary<K, V, B>) -> Result<()>
    where
        K: Ord + Clone,
        V: Clone,
    {
        for (key, value) in other {
            if !self.contains_key(key) {
                self.insert(key.clone(), value.clone())?;
            }
        }

        Ok(())
    }

    /// Deep copy with the same capacity and iteration order.
    pub fn try_clone(&self) -> Result<Self>
    where
        K: Ord + Clone,
        V: Clone,
        A: Clone,
    {
        let mut copy = Self::new_in(self.capacity, self.pool.allocator().clone())?;
        copy.merge(self)?;
        Ok(copy)
    }

    /// Replaces this dictionary with a deep copy of `source`, rebuilding the
    /// pool to `source`'s capacity. On error this dictionary is left untouched.
    pub fn assign_from(&mut self, source: &Self) -> Result<()>
    where
        K: Ord + Clone,
        V: Clone,
        A: Clone,
    {
        *self = source.try_clone()?;
        Ok(())
    }

    /// Height of the tree: 0 when empty, `len()` at worst.
    ///
    /// Walks the tree with an explicit stack, since a degenerate tree is as
    /// deep as it is long.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut pending: Vec<(NonNull<Node<K, V>>, usize)> =
            self.root.map(|root| (root, 1)).into_iter().collect();

        while let Some((node, level)) = pending.pop() {
            deepest = deepest.max(level);

            let node = unsafe { node.as_ref() };
            pending.extend(node.left.map(|left| (left, level + 1)));
            pending.extend(node.right.map(|right| (right, level + 1)));
        }

        deepest
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            front: self.head,
            back: self.sentinel,
            remaining: self.len,
            marker: PhantomData,
        }
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            front: self.head,
            back: self.sentinel,
            remaining: self.len,
            marker: PhantomData,
        }
    }

    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }
}

impl<K, V, A: Allocator> Drop for Dictionary<K, V, A> {
    fn drop(&mut self) {
        self.clear();
        unsafe { self.pool.deallocate(self.sentinel) };
    }
}

impl<K: fmt::Debug, V: fmt::Debug, A: Allocator> fmt::Debug for Dictionary<K, V, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Insertion order iterator over `(&K, &V)`.
pub struct Iter<'a, K, V> {
    front: NonNull<Node<K, V>>,
    /// Exclusive: the node after the last one still to be yielded.
    back: NonNull<Node<K, V>>,
    remaining: usize,
    marker: PhantomData<(&'a K, &'a V)>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        unsafe {
            let node = self.front.as_ptr();
            self.front = (*node).next?;
            self.remaining -= 1;

            Some(((*node).key.assume_init_ref(), (*node).value.assume_init_ref()))
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> DoubleEndedIterator for Iter<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        unsafe {
            self.back = self.back.as_ref().prev?;
            self.remaining -= 1;

            let node = self.back.as_ptr();
            Some(((*node).key.assume_init_ref(), (*node).value.assume_init_ref()))
        }
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

/// Insertion order iterator over `(&K, &mut V)`.
pub struct IterMut<'a, K, V> {
    front: NonNull<Node<K, V>>,
    back: NonNull<Node<K, V>>,
    remaining: usize,
    marker: PhantomData<(&'a K, &'a mut V)>,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        unsafe {
            let node = self.front.as_ptr();
            self.front = (*node).next?;
            self.remaining -= 1;

            Some(((*node).key.assume_init_ref(), (*node).value.assume_init_mut()))
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> DoubleEndedIterator for IterMut<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        unsafe {
            self.back = self.back.as_ref().prev?;
            self.remaining -= 1;

            let node = self.back.as_ptr();
            Some(((*node).key.assume_init_ref(), (*node).value.assume_init_mut()))
        }
    }
}

impl<K, V> ExactSizeIterator for IterMut<'_, K, V> {}

pub struct Keys<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(key, _)| key)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> DoubleEndedIterator for Keys<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(|(key, _)| key)
    }
}

pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, value)| value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> DoubleEndedIterator for Values<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(|(_, value)| value)
    }
}

impl<'a, K, V, A: Allocator> IntoIterator for &'a Dictionary<K, V, A> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, K, V, A: Allocator> IntoIterator for &'a mut Dictionary<K, V, A> {
    type Item = (&'a K, &'a mut V);
    type IntoIter = IterMut<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{hook, kernel::PageAllocator};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serial_test::serial;
    use std::{cell::Cell, collections::BTreeMap, rc::Rc};

    fn dictionary(capacity: usize) -> Dictionary<String, i32, PageAllocator> {
        Dictionary::new_in(capacity, PageAllocator).unwrap()
    }

    fn entries<A: Allocator>(dictionary: &Dictionary<String, i32, A>) -> Vec<(&str, i32)> {
        dictionary.iter().map(|(key, value)| (key.as_str(), *value)).collect()
    }

    /// Checks the search tree ordering below `link` and returns how many nodes it holds.
    fn check_tree<K: Ord, V>(link: Link<Node<K, V>>, low: Option<&K>, high: Option<&K>) -> usize {
        let Some(node) = link else {
            return 0;
        };
        let node = unsafe { node.as_ref() };
        let key = unsafe { node.key.assume_init_ref() };

        assert!(low.is_none_or(|low| low < key));
        assert!(high.is_none_or(|high| key < high));

        1 + check_tree(node.left, low, Some(key)) + check_tree(node.right, Some(key), high)
    }

    #[test]
    fn first_write_wins() {
        let mut dictionary = dictionary(4);

        assert_eq!(Ok(true), dictionary.insert("k".to_string(), 1));
        assert_eq!(Ok(false), dictionary.insert("k".to_string(), 2));

        assert_eq!(Some(&1), dictionary.get("k"));
        assert_eq!(1, dictionary.len());
    }

    #[test]
    fn iteration_follows_insertion_not_keys() {
        let mut dictionary = dictionary(4);
        for (value, key) in ["c", "a", "b"].into_iter().enumerate() {
            dictionary.insert(key.to_string(), value as i32).unwrap();
        }

        assert_eq!(vec![("c", 0), ("a", 1), ("b", 2)], entries(&dictionary));
        assert_eq!(
            vec!["b", "a", "c"],
            dictionary.keys().rev().map(String::as_str).collect::<Vec<_>>()
        );
        assert_eq!(vec![&0, &1, &2], dictionary.values().collect::<Vec<_>>());
    }

    #[test]
    fn lookups() {
        let mut dictionary = dictionary(4);
        dictionary.insert("one".to_string(), 1).unwrap();
        dictionary.insert("two".to_string(), 2).unwrap();

        assert!(dictionary.contains_key("one"));
        assert!(!dictionary.contains_key("three"));
        assert_eq!(None, dictionary.get("three"));
        assert_eq!(Some((&"two".to_string(), &2)), dictionary.get_key_value("two"));

        *dictionary.get_mut("two").unwrap() = 22;
        assert_eq!(Some(&22), dictionary.get("two"));
    }

    #[test]
    fn full_dictionary_rejects_new_keys_only() {
        let mut dictionary = dictionary(2);
        dictionary.insert("a".to_string(), 1).unwrap();
        dictionary.insert("b".to_string(), 2).unwrap();

        assert_eq!(Err(Error::Exhausted { capacity: 2 }), dictionary.insert("c".to_string(), 3));
        assert_eq!(Ok(false), dictionary.insert("a".to_string(), 9));
        assert!(!dictionary.contains_key("c"));
        assert_eq!(2, dictionary.capacity());
    }

    #[test]
    fn remove_a_leaf_a_branch_and_the_root() {
        let mut dictionary = Dictionary::new_in(8, PageAllocator).unwrap();
        for key in [50, 30, 70, 20, 40, 60, 80] {
            dictionary.insert(key, key * 10).unwrap();
        }

        // Leaf.
        assert_eq!(Some(200), dictionary.remove(&20));
        // One child left after that: 30 -> 40.
        assert_eq!(Some(300), dictionary.remove(&30));
        // Root with two children, its successor 60 takes its place.
        assert_eq!(Some(500), dictionary.remove(&50));
        assert_eq!(None, dictionary.remove(&50));

        assert_eq!(4, check_tree(dictionary.root, None, None));
        assert_eq!(
            vec![70, 40, 60, 80],
            dictionary.keys().copied().collect::<Vec<_>>()
        );
        for key in [40, 60, 70, 80] {
            assert_eq!(Some(&(key * 10)), dictionary.get(&key));
        }
    }

    #[test]
    fn successor_deep_in_the_right_subtree() {
        let mut dictionary = Dictionary::new_in(8, PageAllocator).unwrap();
        for key in [10, 5, 20, 15, 25, 12, 17, 13] {
            dictionary.insert(key, ()).unwrap();
        }

        assert_eq!(Some((10, ())), dictionary.remove_entry(&10));

        assert_eq!(7, check_tree(dictionary.root, None, None));
        for key in [5, 12, 13, 15, 17, 20, 25] {
            assert!(dictionary.contains_key(&key));
        }
    }

    #[test]
    fn removed_node_is_reused() {
        let mut dictionary = dictionary(2);
        dictionary.insert("a".to_string(), 1).unwrap();
        dictionary.insert("b".to_string(), 2).unwrap();

        assert_eq!(Some(("a".to_string(), 1)), dictionary.remove_entry("a"));
        dictionary.insert("c".to_string(), 3).unwrap();

        assert_eq!(vec![("b", 2), ("c", 3)], entries(&dictionary));
    }

    #[test]
    fn removing_head_and_tail_of_the_chain() {
        let mut dictionary = dictionary(3);
        for (key, value) in [("x", 1), ("y", 2), ("z", 3)] {
            dictionary.insert(key.to_string(), value).unwrap();
        }

        dictionary.remove("x");
        dictionary.remove("z");

        assert_eq!(vec![("y", 2)], entries(&dictionary));
        assert_eq!(
            vec!["y"],
            dictionary.keys().rev().map(String::as_str).collect::<Vec<_>>()
        );
    }

    #[test]
    fn clear_drops_everything_and_keeps_capacity() {
        let drops = Rc::new(Cell::new(0));
        let mut dictionary = Dictionary::new_in(3, PageAllocator).unwrap();

        struct DropCounter(Rc<Cell<usize>>);
        impl Drop for DropCounter {
            fn drop(&mut self) {
                self.0.set(self.0.get() + 1);
            }
        }

        for key in 0..3 {
            dictionary.insert(key, DropCounter(drops.clone())).unwrap();
        }
        dictionary.clear();

        assert_eq!(3, drops.get());
        assert!(dictionary.is_empty());
        assert_eq!(0, dictionary.depth());
        assert!(!dictionary.contains_key(&1));

        for key in 0..3 {
            dictionary.insert(key, DropCounter(drops.clone())).unwrap();
        }
        drop(dictionary);
        assert_eq!(6, drops.get());
    }

    #[test]
    fn sorted_keys_degenerate_into_a_chain() {
        let mut dictionary = Dictionary::new_in(16, PageAllocator).unwrap();
        for key in 0..16 {
            dictionary.insert(key, key).unwrap();
        }

        assert_eq!(16, dictionary.depth());
    }

    #[test]
    fn depth_of_a_long_chain_fits_a_small_stack() {
        const KEYS: u32 = 20_000;

        let depth = std::thread::Builder::new()
            .stack_size(128 * 1024)
            .spawn(|| {
                let mut dictionary = Dictionary::new_in(KEYS as usize, PageAllocator).unwrap();
                for key in 0..KEYS {
                    dictionary.insert(key, ()).unwrap();
                }
                (dictionary.len(), dictionary.depth())
            })
            .unwrap()
            .join()
            .unwrap();

        assert_eq!((KEYS as usize, KEYS as usize), depth);
    }

    #[test]
    fn depth_of_a_branching_tree() {
        let mut dictionary = Dictionary::new_in(8, PageAllocator).unwrap();
        for key in [4, 2, 6, 1, 3, 5, 7, 8] {
            dictionary.insert(key, ()).unwrap();
        }

        assert_eq!(4, dictionary.depth());
    }

    #[test]
    fn capacity_without_room_for_the_sentinel_is_refused() {
        let unavailable = Some(Error::RegionUnavailable { size: usize::MAX });

        assert_eq!(unavailable, Dictionary::<u8, u8, _>::new_in(usize::MAX, PageAllocator).err());
        assert_eq!(
            unavailable,
            Dictionary::<u8, u8, _>::new_in(usize::MAX - 1, PageAllocator).err()
        );
    }

    #[test]
    fn merge_keeps_existing_values() {
        let mut target = dictionary(4);
        target.insert("a".to_string(), 1).unwrap();

        let mut source = dictionary(4);
        source.insert("b".to_string(), 2).unwrap();
        source.insert("a".to_string(), 10).unwrap();
        source.insert("c".to_string(), 3).unwrap();

        target.merge(&source).unwrap();

        assert_eq!(vec![("a", 1), ("b", 2), ("c", 3)], entries(&target));
    }

    #[test]
    fn merge_into_empty_reproduces_the_source() {
        let mut source = dictionary(3);
        for (key, value) in [("m", 1), ("b", 2), ("x", 3)] {
            source.insert(key.to_string(), value).unwrap();
        }
        let mut copy = dictionary(5);

        copy.merge(&source).unwrap();

        assert_eq!(entries(&source), entries(&copy));
    }

    #[test]
    fn clone_and_assign_are_deep() {
        let mut source = dictionary(3);
        source.insert("a".to_string(), 1).unwrap();

        let mut copy = source.try_clone().unwrap();
        *copy.get_mut("a").unwrap() = 2;
        assert_eq!(Some(&1), source.get("a"));

        let mut target = dictionary(1);
        target.insert("z".to_string(), 26).unwrap();
        target.assign_from(&source).unwrap();

        assert_eq!(3, target.capacity());
        assert_eq!(vec![("a", 1)], entries(&target));
    }

    #[test]
    fn iter_mut_and_debug() {
        let mut dictionary = dictionary(2);
        dictionary.insert("b".to_string(), 1).unwrap();
        dictionary.insert("a".to_string(), 2).unwrap();

        for (_, value) in &mut dictionary {
            *value += 100;
        }

        assert_eq!(r#"{"b": 101, "a": 102}"#, format!("{dictionary:?}"));
    }

    #[test]
    #[serial(hook)]
    fn default_dictionary_draws_from_the_hook() {
        hook::install_system_handlers();

        let mut dictionary = Dictionary::new(4).unwrap();
        dictionary.insert("id", 1u64).unwrap();

        assert_eq!(Some(&1), dictionary.get("id"));
    }

    proptest! {
        #[test]
        fn behaves_like_a_first_write_map(ops in proptest::collection::vec((any::<bool>(), 0u8..32, any::<u16>()), 0..96)) {
            let mut dictionary = Dictionary::new_in(32, PageAllocator).unwrap();
            let mut model: BTreeMap<u8, u16> = BTreeMap::new();
            let mut order: Vec<u8> = Vec::new();

            for (insert, key, value) in ops {
                if insert {
                    let inserted = dictionary.insert(key, value).unwrap();
                    prop_assert_eq!(inserted, !model.contains_key(&key));
                    if inserted {
                        model.insert(key, value);
                        order.push(key);
                    }
                } else {
                    prop_assert_eq!(dictionary.remove(&key), model.remove(&key));
                    order.retain(|&k| k != key);
                }
            }

            prop_assert_eq!(model.len(), check_tree(dictionary.root, None, None));
            prop_assert_eq!(order, dictionary.keys().copied().collect::<Vec<_>>());
            for (key, value) in &model {
                prop_assert_eq!(Some(value), dictionary.get(key));
            }
        }
    }
}
