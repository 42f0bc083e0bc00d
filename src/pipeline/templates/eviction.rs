//! Capacity hook for template stores.
//!
//! Stores consult their policy after every `put` and remove whatever it
//! returns. The store itself imposes no limit.

/// Usage snapshot of one stored template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryStats {
    pub fingerprint: String,
    /// Monotonic store-local counter of the last put or hit.
    pub last_used: u64,
    pub hit_count: u64,
}

pub trait EvictionPolicy: Send + Sync {
    /// Fingerprints to remove, given the current entries.
    fn select_victims(&self, entries: &[EntryStats]) -> Vec<String>;
}

/// Keep everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unbounded;

impl EvictionPolicy for Unbounded {
    fn select_victims(&self, _entries: &[EntryStats]) -> Vec<String> {
        Vec::new()
    }
}

/// Bound the number of distinct fingerprints, dropping the least recently used.
#[derive(Debug, Clone, Copy)]
pub struct LruCapacity {
    capacity: usize,
}

impl LruCapacity {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl EvictionPolicy for LruCapacity {
    fn select_victims(&self, entries: &[EntryStats]) -> Vec<String> {
        if entries.len() <= self.capacity {
            return Vec::new();
        }
        let mut by_age: Vec<&EntryStats> = entries.iter().collect();
        by_age.sort_by(|a, b| {
            a.last_used
                .cmp(&b.last_used)
                .then_with(|| a.fingerprint.cmp(&b.fingerprint))
        });
        by_age
            .into_iter()
            .take(entries.len() - self.capacity)
            .map(|e| e.fingerprint.clone())
            .collect()
    }
}
