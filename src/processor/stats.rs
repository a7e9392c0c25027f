use crate::processor::work::Category;
use std::collections::BTreeMap;
use std::fmt;

/// Per-category outcome tally for one run or one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsCounters {
    counts: BTreeMap<Category, u64>,
}

impl StatsCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, category: Category) {
        *self.counts.entry(category).or_insert(0) += 1;
    }

    pub fn get(&self, category: Category) -> u64 {
        self.counts.get(&category).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn reset(&mut self) {
        self.counts.clear();
    }

    /// Adds every count from `other` into `self`.
    pub fn merge(&mut self, other: &StatsCounters) {
        for (category, count) in &other.counts {
            *self.counts.entry(*category).or_insert(0) += count;
        }
    }

    /// Category/count pairs in category order.
    pub fn report(&self) -> Vec<(Category, u64)> {
        self.counts
            .iter()
            .map(|(category, count)| (*category, *count))
            .collect()
    }
}

impl fmt::Display for StatsCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (category, count) in &self.counts {
            writeln!(f, "{category}: {count}")?;
        }
        Ok(())
    }
}
