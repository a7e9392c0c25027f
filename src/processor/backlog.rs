use crate::processor::work::WorkItem;
use std::collections::{HashSet, VecDeque};
use std::ops::RangeInclusive;

/// FIFO of pending work items.
///
/// Ids are unique while queued: [`Backlog::push_back`] rejects an id that is
/// already waiting, so one id can never be dispatched twice in the same wave.
#[derive(Debug, Default)]
pub struct Backlog {
    items: VecDeque<WorkItem>,
    queued: HashSet<u64>,
}

impl Backlog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a first attempt for every id in `range`, in increasing order.
    pub fn seeded(range: RangeInclusive<u64>) -> Self {
        let mut backlog = Self::new();
        for id in range {
            backlog.push_back(WorkItem::new(id));
        }
        backlog
    }

    /// Appends `item`; returns `false` (and leaves the backlog unchanged) when
    /// its id is already queued.
    pub fn push_back(&mut self, item: WorkItem) -> bool {
        if !self.queued.insert(item.id()) {
            return false;
        }
        self.items.push_back(item);
        true
    }

    pub fn pop_front(&mut self) -> Option<WorkItem> {
        let item = self.items.pop_front()?;
        self.queued.remove(&item.id());
        Some(item)
    }

    /// Removes up to `max` items from the front.
    pub fn take_wave(&mut self, max: usize) -> Vec<WorkItem> {
        let size = max.min(self.items.len());
        let mut wave = Vec::with_capacity(size);
        while wave.len() < size {
            match self.pop_front() {
                Some(item) => wave.push(item),
                None => break,
            }
        }
        wave
    }

    pub fn contains(&self, id: u64) -> bool {
        self.queued.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkItem> {
        self.items.iter()
    }
}
