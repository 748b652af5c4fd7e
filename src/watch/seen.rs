use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Process-wide record of listing ids already notified on
#[derive(Debug, Default)]
pub struct SeenSet {
    entries: DashMap<String, DateTime<Utc>>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `id`; `true` if it had not been seen before.
    pub fn insert_if_new(&self, id: &str) -> bool {
        self.insert_at(id, Utc::now())
    }

    fn insert_at(&self, id: &str, at: DateTime<Utc>) -> bool {
        match self.entries.entry(id.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(at);
                true
            }
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget ids first seen before `cutoff`, returning how many were dropped
    pub fn evict_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, seen_at| *seen_at >= cutoff);
        before.saturating_sub(self.entries.len())
    }
}
