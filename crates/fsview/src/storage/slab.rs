//! Heap slab with a freelist.
//!
//! Removed slots are threaded onto a freelist and reused by later inserts, so
//! indices stay stable for the lifetime of the value they point at.

use std::fmt;
use std::mem;
use std::ops::{Index, IndexMut};

use super::index_types::SlabIndex;

#[derive(Debug, Clone)]
enum Slot<T> {
    /// Index of the next free slot.
    Free(usize),
    Taken(T),
}

pub struct Slab<T> {
    entries: Vec<Slot<T>>,
    /// Occupied slot count.
    len: usize,
    /// Head of the freelist; equals `entries.len()` when there is no free slot.
    next: usize,
}

impl<T> Default for Slab<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Slab<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            len: 0,
            next: 0,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            len: 0,
            next: 0,
        }
    }

    /// Inserts a value, returning its stable index.
    pub fn insert(&mut self, value: T) -> SlabIndex {
        let key = self.next;
        if key == self.entries.len() {
            self.entries.push(Slot::Taken(value));
            self.next = self.entries.len();
        } else {
            let next_free = match self.entries[key] {
                Slot::Free(next) => next,
                Slot::Taken(_) => unreachable!("freelist points at an occupied slot"),
            };
            self.entries[key] = Slot::Taken(value);
            self.next = next_free;
        }
        self.len += 1;
        SlabIndex::new(key)
    }

    pub fn get(&self, index: SlabIndex) -> Option<&T> {
        match self.entries.get(index.get())? {
            Slot::Taken(value) => Some(value),
            Slot::Free(_) => None,
        }
    }

    pub fn get_mut(&mut self, index: SlabIndex) -> Option<&mut T> {
        match self.entries.get_mut(index.get())? {
            Slot::Taken(value) => Some(value),
            Slot::Free(_) => None,
        }
    }

    pub fn contains(&self, index: SlabIndex) -> bool {
        self.get(index).is_some()
    }

    /// Removes the value at `index` if it exists, returning it.
    pub fn try_remove(&mut self, index: SlabIndex) -> Option<T> {
        let key = index.get();
        let entry = self.entries.get_mut(key)?;
        if matches!(entry, Slot::Free(_)) {
            return None;
        }
        match mem::replace(entry, Slot::Free(self.next)) {
            Slot::Taken(value) => {
                self.len -= 1;
                self.next = key;
                Some(value)
            }
            Slot::Free(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> SlabIter<'_, T> {
        SlabIter {
            entries: &self.entries,
            index: 0,
        }
    }
}

impl<T> Index<SlabIndex> for Slab<T> {
    type Output = T;

    fn index(&self, index: SlabIndex) -> &Self::Output {
        match self.get(index) {
            Some(value) => value,
            None => panic!("invalid slab index {}", index.get()),
        }
    }
}

impl<T> IndexMut<SlabIndex> for Slab<T> {
    fn index_mut(&mut self, index: SlabIndex) -> &mut Self::Output {
        match self.get_mut(index) {
            Some(value) => value,
            None => panic!("invalid slab index {}", index.get()),
        }
    }
}

impl<T> fmt::Debug for Slab<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slab")
            .field("len", &self.len)
            .field("next", &self.next)
            .field("slots", &self.entries.len())
            .finish()
    }
}

/// Iterator over occupied entries in a Slab.
pub struct SlabIter<'a, T> {
    entries: &'a [Slot<T>],
    index: usize,
}

impl<'a, T> Iterator for SlabIter<'a, T> {
    type Item = (SlabIndex, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < self.entries.len() {
            let idx = self.index;
            self.index += 1;
            if let Slot::Taken(value) = &self.entries[idx] {
                return Some((SlabIndex::new(idx), value));
            }
        }
        None
    }
}
