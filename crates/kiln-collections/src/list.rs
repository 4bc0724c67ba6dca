//! Doubly linked list with one heap block per node.
//!
//! Positions inside the list are reached through [`CursorMut`], which can
//! walk in both directions and insert, remove or replace at its position.
//! A cursor holds the list's only mutable borrow, so the list cannot be
//! changed behind its back.
//!
//! A cursor may also rest on the "ghost" position between the tail and the
//! head. From there `move_next` reaches the head and `move_prev` the tail.

#![allow(unsafe_code)]

use std::fmt;
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::mem::size_of;
use std::ptr::NonNull;
use std::rc::Rc;

use kiln_heap::{Heap, HeapError, HeapPtr, SharedHeap};

use crate::raw::slot;

struct Node<T> {
    value: T,
    prev: Option<HeapPtr>,
    next: Option<HeapPtr>,
}

fn node<T>(heap: &Heap, ptr: HeapPtr) -> NonNull<Node<T>> {
    slot::<Node<T>>(heap, ptr)
}

/// A doubly linked list of `T` on a Kiln heap.
pub struct LinkedList<T> {
    heap: SharedHeap,
    head: Option<HeapPtr>,
    tail: Option<HeapPtr>,
    len: usize,
    _owns: PhantomData<T>,
}

impl<T> LinkedList<T> {
    /// An empty list.
    pub fn new(heap: &SharedHeap) -> Self {
        Self {
            heap: Rc::clone(heap),
            head: None,
            tail: None,
            len: 0,
            _owns: PhantomData,
        }
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the list holds no values.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The heap holding the nodes.
    pub fn heap(&self) -> &SharedHeap {
        &self.heap
    }

    fn node(&self, ptr: HeapPtr) -> NonNull<Node<T>> {
        node(&self.heap, ptr)
    }

    /// Allocate a node for `value` and splice it between `prev` and `next`,
    /// which must be adjacent (or the list ends).
    fn link_between(
        &mut self,
        value: T,
        prev: Option<HeapPtr>,
        next: Option<HeapPtr>,
    ) -> Result<HeapPtr, HeapError> {
        let ptr = self.heap.try_malloc(size_of::<Node<T>>())?;
        // SAFETY: the block was just allocated with room for a node, and
        // every node pointer reachable from the list is live and owned by it.
        unsafe {
            self.node(ptr).as_ptr().write(Node { value, prev, next });
            match prev {
                Some(p) => (*self.node(p).as_ptr()).next = Some(ptr),
                None => self.head = Some(ptr),
            }
            match next {
                Some(n) => (*self.node(n).as_ptr()).prev = Some(ptr),
                None => self.tail = Some(ptr),
            }
        }
        self.len += 1;
        Ok(ptr)
    }

    /// Detach the node at `ptr`, free it, and return its value.
    fn unlink(&mut self, ptr: HeapPtr) -> T {
        // SAFETY: `ptr` is a node of this list. It is read out once, its
        // neighbours are re-linked, and the block is freed without being
        // touched again.
        let Node { value, prev, next } = unsafe { self.node(ptr).as_ptr().read() };
        // SAFETY: the neighbours are live nodes of this list.
        unsafe {
            match prev {
                Some(p) => (*self.node(p).as_ptr()).next = next,
                None => self.head = next,
            }
            match next {
                Some(n) => (*self.node(n).as_ptr()).prev = prev,
                None => self.tail = prev,
            }
        }
        // SAFETY: the node was unlinked and its value moved out.
        unsafe { self.heap.free(ptr) };
        self.len -= 1;
        value
    }

    /// Append `value` at the back.
    pub fn add(&mut self, value: T) -> Result<(), HeapError> {
        self.link_between(value, self.tail, None).map(drop)
    }

    /// Insert `value` at the front.
    pub fn add_first(&mut self, value: T) -> Result<(), HeapError> {
        self.link_between(value, None, self.head).map(drop)
    }

    /// Remove and return the front value.
    pub fn remove_first(&mut self) -> Option<T> {
        self.head.map(|ptr| self.unlink(ptr))
    }

    /// Remove and return the back value.
    pub fn remove_last(&mut self) -> Option<T> {
        self.tail.map(|ptr| self.unlink(ptr))
    }

    /// Remove every value equal to `value`. Returns how many were removed.
    pub fn remove_all(&mut self, value: &T) -> usize
    where
        T: PartialEq,
    {
        self.remove_where(|v| v == value)
    }

    /// Remove every value matching `pred`. Returns how many were removed.
    pub fn remove_where(&mut self, mut pred: impl FnMut(&T) -> bool) -> usize {
        let mut removed = 0;
        let mut cursor = self.cursor_front_mut();
        while let Some(value) = cursor.current() {
            if pred(value) {
                cursor.remove_current();
                removed += 1;
            } else {
                cursor.move_next();
            }
        }
        removed
    }

    /// The front value.
    pub fn first(&self) -> Option<&T> {
        self.iter().next()
    }

    /// The back value.
    pub fn last(&self) -> Option<&T> {
        self.iter().next_back()
    }

    /// The value at `index`, walking from the nearer end.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn get(&self, index: usize) -> &T {
        assert!(
            index < self.len,
            "index {index} out of bounds (len {})",
            self.len
        );
        let found = if index < self.len / 2 {
            self.iter().nth(index)
        } else {
            self.iter().nth_back(self.len - 1 - index)
        };
        match found {
            Some(value) => value,
            None => unreachable!("list shorter than its length"),
        }
    }

    /// Whether any value equals `value`.
    pub fn contains(&self, value: &T) -> bool
    where
        T: PartialEq,
    {
        self.iter().any(|v| v == value)
    }

    /// Drop every value and free every node.
    pub fn clear(&mut self) {
        while self.remove_first().is_some() {}
    }

    /// Iterate front to back (or back to front with `.rev()`).
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            heap: &self.heap,
            front: self.head,
            back: self.tail,
            remaining: self.len,
            _values: PhantomData,
        }
    }

    /// Iterate mutably front to back.
    pub fn iter_mut(&mut self) -> IterMut<'_, T> {
        let this: &Self = self;
        IterMut {
            heap: &this.heap,
            front: this.head,
            back: this.tail,
            remaining: this.len,
            _values: PhantomData,
        }
    }

    /// A cursor on the front value (the ghost position if empty).
    pub fn cursor_front_mut(&mut self) -> CursorMut<'_, T> {
        CursorMut {
            current: self.head,
            list: self,
        }
    }

    /// A cursor on the back value (the ghost position if empty).
    pub fn cursor_back_mut(&mut self) -> CursorMut<'_, T> {
        CursorMut {
            current: self.tail,
            list: self,
        }
    }
}

impl<T: Clone> LinkedList<T> {
    /// Copy every value into new nodes.
    pub fn try_clone(&self) -> Result<Self, HeapError> {
        let mut copy = Self::new(&self.heap);
        for value in self {
            copy.add(value.clone())?;
        }
        Ok(copy)
    }
}

impl<T> Drop for LinkedList<T> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T: Clone> Clone for LinkedList<T> {
    fn clone(&self) -> Self {
        self.try_clone()
            .unwrap_or_else(|e| panic!("LinkedList clone failed: {e}"))
    }
}

impl<T: PartialEq> PartialEq for LinkedList<T> {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().eq(other.iter())
    }
}

impl<T: Eq> Eq for LinkedList<T> {}

impl<T: fmt::Debug> fmt::Debug for LinkedList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<'a, T> IntoIterator for &'a LinkedList<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, T> IntoIterator for &'a mut LinkedList<T> {
    type Item = &'a mut T;
    type IntoIter = IterMut<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

/// Borrowing iterator over a [`LinkedList`].
pub struct Iter<'a, T> {
    heap: &'a Heap,
    front: Option<HeapPtr>,
    back: Option<HeapPtr>,
    remaining: usize,
    _values: PhantomData<&'a T>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        if self.remaining == 0 {
            return None;
        }
        let ptr = self.front?;
        // SAFETY: the list is borrowed for 'a and `remaining` keeps the walk
        // inside its live nodes.
        let node = unsafe { node::<T>(self.heap, ptr).as_ref() };
        self.front = node.next;
        self.remaining -= 1;
        Some(&node.value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, T> DoubleEndedIterator for Iter<'a, T> {
    fn next_back(&mut self) -> Option<&'a T> {
        if self.remaining == 0 {
            return None;
        }
        let ptr = self.back?;
        // SAFETY: as in `next`.
        let node = unsafe { node::<T>(self.heap, ptr).as_ref() };
        self.back = node.prev;
        self.remaining -= 1;
        Some(&node.value)
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}

impl<T> FusedIterator for Iter<'_, T> {}

/// Mutably borrowing iterator over a [`LinkedList`].
pub struct IterMut<'a, T> {
    heap: &'a Heap,
    front: Option<HeapPtr>,
    back: Option<HeapPtr>,
    remaining: usize,
    _values: PhantomData<&'a mut T>,
}

impl<'a, T> Iterator for IterMut<'a, T> {
    type Item = &'a mut T;

    fn next(&mut self) -> Option<&'a mut T> {
        if self.remaining == 0 {
            return None;
        }
        let ptr = self.front?;
        // SAFETY: the list is mutably borrowed for 'a and each node is
        // yielded at most once, so the references never alias.
        let node = unsafe { node::<T>(self.heap, ptr).as_mut() };
        self.front = node.next;
        self.remaining -= 1;
        Some(&mut node.value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, T> DoubleEndedIterator for IterMut<'a, T> {
    fn next_back(&mut self) -> Option<&'a mut T> {
        if self.remaining == 0 {
            return None;
        }
        let ptr = self.back?;
        // SAFETY: as in `next`.
        let node = unsafe { node::<T>(self.heap, ptr).as_mut() };
        self.back = node.prev;
        self.remaining -= 1;
        Some(&mut node.value)
    }
}

impl<T> ExactSizeIterator for IterMut<'_, T> {}

impl<T> FusedIterator for IterMut<'_, T> {}

/// A position in a [`LinkedList`] that can move both ways and edit the list.
pub struct CursorMut<'a, T> {
    list: &'a mut LinkedList<T>,
    current: Option<HeapPtr>,
}

impl<T> CursorMut<'_, T> {
    fn links(&self, ptr: HeapPtr) -> (Option<HeapPtr>, Option<HeapPtr>) {
        // SAFETY: `ptr` is a live node of the borrowed list.
        let node = unsafe { self.list.node(ptr).as_ref() };
        (node.prev, node.next)
    }

    fn value(&self, ptr: Option<HeapPtr>) -> Option<&T> {
        // SAFETY: `ptr` is a live node of the borrowed list.
        ptr.map(|p| unsafe { &self.list.node(p).as_ref().value })
    }

    /// The value under the cursor, or `None` at the ghost position.
    pub fn current(&mut self) -> Option<&mut T> {
        let ptr = self.current?;
        // SAFETY: the cursor holds the list's mutable borrow.
        Some(unsafe { &mut self.list.node(ptr).as_mut().value })
    }

    /// Whether the cursor rests on the ghost position.
    pub fn is_ghost(&self) -> bool {
        self.current.is_none()
    }

    /// Step towards the back. Past the tail is the ghost position.
    pub fn move_next(&mut self) {
        self.current = match self.current {
            Some(ptr) => self.links(ptr).1,
            None => self.list.head,
        };
    }

    /// Step towards the front. Before the head is the ghost position.
    pub fn move_prev(&mut self) {
        self.current = match self.current {
            Some(ptr) => self.links(ptr).0,
            None => self.list.tail,
        };
    }

    /// The value after the cursor.
    pub fn peek_next(&self) -> Option<&T> {
        let next = match self.current {
            Some(ptr) => self.links(ptr).1,
            None => self.list.head,
        };
        self.value(next)
    }

    /// The value before the cursor.
    pub fn peek_prev(&self) -> Option<&T> {
        let prev = match self.current {
            Some(ptr) => self.links(ptr).0,
            None => self.list.tail,
        };
        self.value(prev)
    }

    /// Insert `value` before the cursor (at the back from the ghost
    /// position). The cursor does not move.
    pub fn insert_before(&mut self, value: T) -> Result<(), HeapError> {
        let (prev, next) = match self.current {
            Some(ptr) => (self.links(ptr).0, Some(ptr)),
            None => (self.list.tail, None),
        };
        self.list.link_between(value, prev, next).map(drop)
    }

    /// Insert `value` after the cursor (at the front from the ghost
    /// position). The cursor does not move.
    pub fn insert_after(&mut self, value: T) -> Result<(), HeapError> {
        let (prev, next) = match self.current {
            Some(ptr) => (Some(ptr), self.links(ptr).1),
            None => (None, self.list.head),
        };
        self.list.link_between(value, prev, next).map(drop)
    }

    /// Remove the value under the cursor and move to the next one.
    pub fn remove_current(&mut self) -> Option<T> {
        let ptr = self.current?;
        self.current = self.links(ptr).1;
        Some(self.list.unlink(ptr))
    }

    /// Swap the value under the cursor for `value`, returning the old one.
    /// At the ghost position `value` is handed back as the error.
    pub fn replace(&mut self, value: T) -> Result<T, T> {
        match self.current() {
            Some(slot) => Ok(std::mem::replace(slot, value)),
            None => Err(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_test_utils::{test_heap, DropCounter};

    fn list_of(heap: &SharedHeap, values: &[i32]) -> LinkedList<i32> {
        let mut list = LinkedList::new(heap);
        for &v in values {
            list.add(v).unwrap();
        }
        list
    }

    fn collect(list: &LinkedList<i32>) -> Vec<i32> {
        list.iter().copied().collect()
    }

    #[test]
    fn add_and_add_first() {
        let heap = test_heap();
        let mut list = list_of(&heap, &[2, 3]);
        list.add_first(1).unwrap();
        assert_eq!(collect(&list), [1, 2, 3]);
        assert_eq!(list.first(), Some(&1));
        assert_eq!(list.last(), Some(&3));
        assert_eq!(list.len(), 3);
        assert_eq!(heap.stats().allocated_block_count(), 3);
    }

    #[test]
    fn remove_from_both_ends() {
        let heap = test_heap();
        let mut list = list_of(&heap, &[1, 2, 3]);
        assert_eq!(list.remove_first(), Some(1));
        assert_eq!(list.remove_last(), Some(3));
        assert_eq!(list.remove_last(), Some(2));
        assert_eq!(list.remove_first(), None);
        assert!(list.is_empty());
        assert_eq!(heap.stats().allocated_block_count(), 0);
    }

    #[test]
    fn remove_all_and_remove_where() {
        let heap = test_heap();
        let mut list = list_of(&heap, &[1, 2, 1, 3, 1, 4]);
        assert_eq!(list.remove_all(&1), 3);
        assert_eq!(collect(&list), [2, 3, 4]);
        assert_eq!(list.remove_where(|v| v % 2 == 0), 2);
        assert_eq!(collect(&list), [3]);
        assert_eq!(list.last(), Some(&3));
    }

    #[test]
    fn iterates_both_ways() {
        let heap = test_heap();
        let mut list = list_of(&heap, &[1, 2, 3, 4]);
        let back: Vec<_> = list.iter().rev().copied().collect();
        assert_eq!(back, [4, 3, 2, 1]);
        let mut it = list.iter();
        assert_eq!(it.next(), Some(&1));
        assert_eq!(it.next_back(), Some(&4));
        assert_eq!(it.len(), 2);
        for v in list.iter_mut() {
            *v *= 10;
        }
        assert_eq!(collect(&list), [10, 20, 30, 40]);
    }

    #[test]
    fn get_walks_from_nearer_end() {
        let heap = test_heap();
        let list = list_of(&heap, &[5, 6, 7, 8, 9]);
        assert_eq!(*list.get(0), 5);
        assert_eq!(*list.get(3), 8);
        assert_eq!(*list.get(4), 9);
        assert!(list.contains(&7));
        assert!(!list.contains(&1));
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn get_past_len_panics() {
        let heap = test_heap();
        let list = list_of(&heap, &[1]);
        let _ = list.get(1);
    }

    #[test]
    fn cursor_walks_through_ghost() {
        let heap = test_heap();
        let mut list = list_of(&heap, &[1, 2]);
        let mut cursor = list.cursor_front_mut();
        assert_eq!(cursor.current().copied(), Some(1));
        cursor.move_next();
        cursor.move_next();
        assert!(cursor.is_ghost());
        assert_eq!(cursor.peek_next(), Some(&1));
        assert_eq!(cursor.peek_prev(), Some(&2));
        cursor.move_prev();
        assert_eq!(cursor.current().copied(), Some(2));
    }

    #[test]
    fn cursor_edits_in_place() {
        let heap = test_heap();
        let mut list = list_of(&heap, &[1, 3, 5]);
        {
            let mut cursor = list.cursor_front_mut();
            cursor.move_next();
            cursor.insert_before(2).unwrap();
            cursor.insert_after(4).unwrap();
            assert_eq!(cursor.replace(30), Ok(3));
            assert_eq!(cursor.remove_current(), Some(30));
            assert_eq!(cursor.current().copied(), Some(4));
        }
        assert_eq!(collect(&list), [1, 2, 4, 5]);

        let mut cursor = list.cursor_back_mut();
        cursor.move_next();
        cursor.insert_before(6).unwrap();
        cursor.insert_after(0).unwrap();
        assert_eq!(cursor.replace(9), Err(9));
        assert_eq!(collect(&list), [0, 1, 2, 4, 5, 6]);
    }

    #[test]
    fn remove_current_at_tail_reaches_ghost() {
        let heap = test_heap();
        let mut list = list_of(&heap, &[1, 2]);
        let mut cursor = list.cursor_back_mut();
        assert_eq!(cursor.remove_current(), Some(2));
        assert!(cursor.is_ghost());
        assert_eq!(cursor.remove_current(), None);
        assert_eq!(list.last(), Some(&1));
    }

    #[test]
    fn drop_frees_every_node() {
        let heap = test_heap();
        let counter = DropCounter::new();
        {
            let mut list = LinkedList::new(&heap);
            for id in 0..10 {
                list.add(counter.track(id)).unwrap();
            }
            assert_eq!(list.remove_where(|t| t.id % 3 == 0), 4);
            assert_eq!(counter.count(), 4);
        }
        assert_eq!(counter.count(), 10);
        assert_eq!(heap.stats().allocated_block_count(), 0);
    }

    #[test]
    fn clone_copies_nodes() {
        let heap = test_heap();
        let list = list_of(&heap, &[1, 2]);
        let mut copy = list.clone();
        assert_eq!(copy, list);
        copy.add(3).unwrap();
        assert_ne!(copy, list);
        assert_eq!(format!("{list:?}"), "[1, 2]");
    }

    #[cfg(not(miri))]
    mod proptests {
        use super::*;
        use proptest::prelude::*;
        use std::collections::VecDeque;

        proptest! {
            #[test]
            fn matches_vecdeque_model(ops in prop::collection::vec((0u8..5, -20i32..20), 0..150)) {
                let heap = test_heap();
                let mut list = LinkedList::new(&heap);
                let mut model = VecDeque::new();
                for (kind, v) in ops {
                    match kind {
                        0 => {
                            list.add(v).unwrap();
                            model.push_back(v);
                        }
                        1 => {
                            list.add_first(v).unwrap();
                            model.push_front(v);
                        }
                        2 => {
                            prop_assert_eq!(list.remove_first(), model.pop_front());
                        }
                        3 => {
                            prop_assert_eq!(list.remove_last(), model.pop_back());
                        }
                        _ => {
                            let before = model.len();
                            model.retain(|x| *x != v);
                            prop_assert_eq!(list.remove_all(&v), before - model.len());
                        }
                    }
                    prop_assert!(list.iter().eq(model.iter()));
                    prop_assert!(list.iter().rev().eq(model.iter().rev()));
                }
            }
        }
    }
}
