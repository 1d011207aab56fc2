//! Always-sorted list used for subscriber and service ordering.

use smallvec::SmallVec;
use std::cmp::Ordering;
use std::fmt;

/// A list that keeps its items sorted ascending by a comparator.
///
/// Insertion binary-searches for the position (`O(log n)` comparisons) and
/// then splices the item in (`O(n)` moves). Lists are read far more often
/// than they are written and hold only a handful of entries, so the
/// contents live inline in a [`SmallVec`] for the common case.
///
/// Items that compare equal keep their insertion order.
pub struct SortedList<T> {
    items: SmallVec<[T; 4]>,
    compare: fn(&T, &T) -> Ordering,
}

impl<T: Ord> SortedList<T> {
    /// Creates an empty list ordered by `T`'s natural ordering.
    pub fn new() -> Self {
        Self::with_comparator(T::cmp)
    }
}

impl<T: Ord> Default for SortedList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SortedList<T> {
    /// Creates an empty list ordered by `compare`.
    pub fn with_comparator(compare: fn(&T, &T) -> Ordering) -> Self {
        Self {
            items: SmallVec::new(),
            compare,
        }
    }

    /// Inserts `item` after every existing item that does not compare
    /// greater than it, returning the index it landed at.
    pub fn add(&mut self, item: T) -> usize {
        let compare = self.compare;
        let index = self
            .items
            .partition_point(|existing| compare(existing, &item) != Ordering::Greater);
        self.items.insert(index, item);
        index
    }

    /// The item that sorts first, if any. For equal keys this is the one
    /// added earliest.
    pub fn first(&self) -> Option<&T> {
        self.items.first()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Removes the first item matching `predicate`.
    pub fn remove_first<P>(&mut self, mut predicate: P) -> Option<T>
    where
        P: FnMut(&T) -> bool,
    {
        let index = self.items.iter().position(|item| predicate(item))?;
        Some(self.items.remove(index))
    }

    /// Removes every item matching `predicate`, returning them in list order.
    pub fn remove_where<P>(&mut self, mut predicate: P) -> Vec<T>
    where
        P: FnMut(&T) -> bool,
    {
        let mut removed = Vec::new();
        let mut kept = SmallVec::with_capacity(self.items.len());
        for item in self.items.drain(..) {
            if predicate(&item) {
                removed.push(item);
            } else {
                kept.push(item);
            }
        }
        self.items = kept;
        removed
    }
}

impl<T: Clone> SortedList<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.items.to_vec()
    }
}

impl<'a, T> IntoIterator for &'a SortedList<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T: fmt::Debug> fmt::Debug for SortedList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.items.iter()).finish()
    }
}
