// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Fixed capacity ring of the deltas of the latest confirmed snapshots.
//!
//! Entries form a chain: each one is the child of the previous one. Pushing
//! beyond the capacity overwrites the oldest entry. Slots are identified by their
//! position in the ring, and a height index gives the slot of a height in O(1).

use onroad_exports::{CacheEntry, OnRoadError, SignedIndex};
use onroad_hash::Hash;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Shared ring of snapshot deltas
pub(crate) struct DeltaCache {
    inner: RwLock<CacheRing>,
}

struct CacheRing {
    slots: Vec<Option<CacheEntry>>,
    /// slot of the newest entry
    position: Option<usize>,
    /// number of occupied slots
    len: usize,
    height_index: HashMap<u64, usize>,
}

impl CacheRing {
    fn new(capacity: usize) -> Self {
        CacheRing {
            slots: vec![None; capacity],
            position: None,
            len: 0,
            height_index: HashMap::with_capacity(capacity),
        }
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn next(&self, slot: usize) -> usize {
        (slot + 1) % self.capacity()
    }

    fn prev(&self, slot: usize) -> usize {
        (slot + self.capacity() - 1) % self.capacity()
    }

    fn head_slot(&self) -> Option<usize> {
        self.position
            .map(|position| (position + self.capacity() + 1 - self.len) % self.capacity())
    }

    /// empty the slot and drop its height from the index
    fn clear_slot(&mut self, slot: usize) -> Option<CacheEntry> {
        let entry = self.slots[slot].take()?;
        if self.height_index.get(&entry.at.height) == Some(&slot) {
            self.height_index.remove(&entry.at.height);
        }
        Some(entry)
    }

    /// number of entries strictly after `slot`
    fn distance_to_position(&self, slot: usize) -> usize {
        match self.position {
            Some(position) => (position + self.capacity() - slot) % self.capacity(),
            None => 0,
        }
    }
}

impl DeltaCache {
    /// Creates an empty cache holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        DeltaCache {
            inner: RwLock::new(CacheRing::new(capacity.max(1))),
        }
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.inner.read().capacity()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.inner.read().len
    }

    /// true if the cache holds no entry
    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.inner.read().len == 0
    }

    /// Drop every entry
    pub fn reset(&self) {
        let mut ring = self.inner.write();
        let capacity = ring.capacity();
        *ring = CacheRing::new(capacity);
    }

    /// Append `entry` after the newest one, overwriting the oldest when full.
    /// Returns the slot of the entry.
    pub fn push(&self, entry: CacheEntry) -> usize {
        let mut ring = self.inner.write();
        let slot = match ring.position {
            Some(position) => ring.next(position),
            None => 0,
        };
        let overwritten = ring.clear_slot(slot).is_some();
        ring.height_index.insert(entry.at.height, slot);
        ring.slots[slot] = Some(entry);
        if !overwritten {
            ring.len += 1;
        }
        ring.position = Some(slot);
        slot
    }

    /// Remove the newest entry
    #[cfg(test)]
    pub fn pop_tail(&self) -> Option<CacheEntry> {
        let mut ring = self.inner.write();
        let position = ring.position?;
        let entry = ring.clear_slot(position);
        ring.len -= 1;
        ring.position = if ring.len == 0 {
            None
        } else {
            Some(ring.prev(position))
        };
        entry
    }

    /// Remove every entry newer than the one in `slot`, making it the newest.
    /// Nothing happens if `slot` is empty or already the newest.
    pub fn remove_after(&self, slot: usize) {
        let mut ring = self.inner.write();
        if ring.position == Some(slot) || ring.slots.get(slot).map_or(true, Option::is_none) {
            return;
        }
        let removed = ring.distance_to_position(slot);
        let mut current = slot;
        for _ in 0..removed {
            current = ring.next(current);
            ring.clear_slot(current);
        }
        ring.len -= removed;
        ring.position = Some(slot);
    }

    /// Slot of the snapshot `(hash, height)`, if cached on the same branch
    pub fn exists(&self, hash: &Hash, height: u64) -> Option<usize> {
        let ring = self.inner.read();
        let slot = *ring.height_index.get(&height)?;
        match &ring.slots[slot] {
            Some(entry) if entry.at.equals(hash, height) => Some(slot),
            _ => None,
        }
    }

    /// Slot of the entry just older than the one in `slot`
    pub fn previous(&self, slot: usize) -> Option<usize> {
        let ring = self.inner.read();
        ring.slots.get(slot)?.as_ref()?;
        if ring.head_slot() == Some(slot) {
            return None;
        }
        Some(ring.prev(slot))
    }

    /// Oldest entry
    pub fn head(&self) -> Option<CacheEntry> {
        let ring = self.inner.read();
        ring.head_slot().and_then(|slot| ring.slots[slot].clone())
    }

    /// Newest entry
    pub fn tail(&self) -> Option<CacheEntry> {
        let ring = self.inner.read();
        ring.position.and_then(|slot| ring.slots[slot].clone())
    }

    /// Deltas of every entry newer than the one at `height`, oldest first
    pub fn deltas_since(&self, height: u64) -> Result<Vec<Arc<SignedIndex>>, OnRoadError> {
        let ring = self.inner.read();
        let slot = *ring
            .height_index
            .get(&height)
            .ok_or(OnRoadError::HeightNotFound(height))?;
        let count = ring.distance_to_position(slot);
        let mut deltas = Vec::with_capacity(count);
        let mut current = slot;
        for _ in 0..count {
            current = ring.next(current);
            if let Some(entry) = &ring.slots[current] {
                deltas.push(entry.delta.clone());
            }
        }
        Ok(deltas)
    }

    /// Every entry, oldest first
    #[cfg(test)]
    pub fn entries(&self) -> Vec<CacheEntry> {
        let ring = self.inner.read();
        let Some(mut current) = ring.head_slot() else {
            return Vec::new();
        };
        let mut entries = Vec::with_capacity(ring.len);
        for _ in 0..ring.len {
            if let Some(entry) = &ring.slots[current] {
                entries.push(entry.clone());
            }
            current = ring.next(current);
        }
        entries
    }
}
