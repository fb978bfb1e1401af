//! In-memory priority queue of refresh work.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::models::WorkItem;

struct Entry {
    priority: f64,
    item: WorkItem,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.priority.total_cmp(&other.priority) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority.total_cmp(&other.priority)
    }
}

/// Max-priority queue. Ties come out in no particular order.
#[derive(Default)]
pub struct PriorityQueue {
    heap: BinaryHeap<Entry>,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, item: WorkItem, priority: f64) {
        self.heap.push(Entry { priority, item });
    }

    /// Enqueue using the item's own computed priority.
    pub fn push(&mut self, item: WorkItem) {
        let priority = item.priority;
        self.enqueue(item, priority);
    }

    /// Remove and return the highest-priority item.
    pub fn dequeue(&mut self) -> Option<WorkItem> {
        self.heap.pop().map(|entry| entry.item)
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Coordinates currently queued.
    pub fn coords(&self) -> impl Iterator<Item = crate::coord::TileCoord> + '_ {
        self.heap.iter().map(|entry| entry.item.coord)
    }
}
