//! Bounded most-recently-used list.
//!
//! Backed by `lru::LruCache` with unit values: touching an item promotes it
//! in constant time, and inserting past capacity drops the least recently
//! used one.

use lru::LruCache;
use std::borrow::Borrow;
use std::hash::Hash;
use std::num::NonZeroUsize;

/// Most recent first, no duplicates, never longer than its capacity.
#[derive(Debug)]
pub struct RecencyList<T: Hash + Eq> {
    entries: LruCache<T, ()>,
}

impl<T: Hash + Eq> RecencyList<T> {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
        }
    }

    /// Insert or promote `item` to most recent. Returns the evicted item,
    /// if the list was full.
    pub fn touch(&mut self, item: T) -> Option<T> {
        match self.entries.push(item, ()) {
            // `push` hands back the same key when it only promoted
            Some((old, ())) if !self.entries.contains(&old) => Some(old),
            _ => None,
        }
    }

    /// 0 for the most recent item.
    pub fn rank<Q>(&self, item: &Q) -> Option<usize>
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if !self.entries.contains(item) {
            return None;
        }
        self.entries.iter().position(|(k, _)| k.borrow() == item)
    }

    pub fn contains<Q>(&self, item: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.contains(item)
    }

    /// Items from most to least recent.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }
}
