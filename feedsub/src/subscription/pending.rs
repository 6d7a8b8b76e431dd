//! Pending queue with identity deduplication

use std::collections::{HashSet, VecDeque};

use tracing::trace;

use crate::domain::{Item, ItemId};

/// Counts from merging one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub accepted: usize,
    pub duplicates: usize,
}

/// FIFO of undelivered items plus every ID ever enqueued
///
/// The seen-set never shrinks, so an item is enqueued at most once for the
/// lifetime of the queue even after it has been delivered.
#[derive(Debug, Default)]
pub struct PendingQueue {
    items: VecDeque<Item>,
    seen: HashSet<ItemId>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append items not seen before, preserving their order
    pub fn merge(&mut self, items: impl IntoIterator<Item = Item>) -> MergeStats {
        let mut stats = MergeStats::default();
        for item in items {
            if self.seen.insert(item.id.clone()) {
                self.items.push_back(item);
                stats.accepted += 1;
            } else {
                trace!(id = %item.id, "PendingQueue::merge: duplicate dropped");
                stats.duplicates += 1;
            }
        }
        stats
    }

    pub fn front(&self) -> Option<&Item> {
        self.items.front()
    }

    pub fn pop_front(&mut self) -> Option<Item> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of distinct IDs ever enqueued
    pub fn seen_len(&self) -> usize {
        self.seen.len()
    }

    /// Put back an item whose hand-off failed, keeping its place at the front
    pub fn requeue_front(&mut self, item: Item) {
        self.items.push_front(item);
    }
}
