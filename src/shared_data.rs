use std::collections::HashMap;

use rustc_hash::FxBuildHasher;
use tokio::time::Instant;

use crate::dns::Question;

/// A query waiting for its response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingQuery {
    pub id: u16,
    pub questions: Vec<Question>,
    pub inserted: Instant,
}

/// Per-shard map from transaction ID to the pending query.
///
/// Holds at most one query per ID. A second query reusing an in-flight ID
/// replaces the first, and the first can never be matched afterwards: its
/// late response will be paired with the newer question, or dropped if the
/// newer one was already answered. This is inherent to keying on a 16-bit
/// ID and is kept as is.
#[derive(Debug, Default)]
pub struct CorrelationTable {
    map: HashMap<u16, PendingQuery, FxBuildHasher>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `query`, returning the entry it replaced, if any.
    pub fn insert(&mut self, query: PendingQuery) -> Option<PendingQuery> {
        self.map.insert(query.id, query)
    }

    /// Removes and returns the pending query for `id`.
    pub fn take(&mut self, id: u16) -> Option<PendingQuery> {
        self.map.remove(&id)
    }

    #[cfg(test)]
    pub fn contains(&self, id: u16) -> bool {
        self.map.contains_key(&id)
    }

    /// Drops every entry inserted at or before `cutoff` and returns their IDs.
    pub fn remove_older_than(&mut self, cutoff: Instant) -> Vec<u16> {
        let mut expired = Vec::new();
        self.map.retain(|id, query| {
            let keep = query.inserted > cutoff;
            if !keep {
                expired.push(*id);
            }
            keep
        });
        expired
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::RecordType;
    use std::time::Duration;

    fn pending(id: u16, name: &str, inserted: Instant) -> PendingQuery {
        PendingQuery {
            id,
            questions: vec![Question { name: name.to_string(), qtype: RecordType::A }],
            inserted,
        }
    }

    #[test]
    fn insert_overwrites_same_id() {
        let now = Instant::now();
        let mut table = CorrelationTable::new();
        assert!(table.insert(pending(1, "first.example", now)).is_none());

        let replaced = table.insert(pending(1, "second.example", now)).unwrap();
        assert_eq!(replaced.questions[0].name, "first.example");
        assert_eq!(table.len(), 1);
        assert_eq!(table.take(1).unwrap().questions[0].name, "second.example");
        assert!(table.is_empty());
    }

    #[test]
    fn take_missing_id_is_none() {
        let mut table = CorrelationTable::new();
        assert!(table.take(99).is_none());
    }

    #[test]
    fn removes_only_stale_entries() {
        let start = Instant::now();
        let mut table = CorrelationTable::new();
        table.insert(pending(1, "old.example", start));
        table.insert(pending(2, "edge.example", start + Duration::from_secs(10)));
        table.insert(pending(3, "new.example", start + Duration::from_secs(20)));

        let mut expired = table.remove_older_than(start + Duration::from_secs(10));
        expired.sort_unstable();
        assert_eq!(expired, vec![1, 2]);
        assert!(table.contains(3));
        assert_eq!(table.len(), 1);
    }
}
