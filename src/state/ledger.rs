//! Run-scoped de-duplication ledger

use crate::state::PostId;
use std::collections::HashSet;

/// Set of post identifiers already seen during a run
///
/// Entries are never removed while the run lasts.
#[derive(Debug, Default, Clone)]
pub struct DedupLedger {
    seen: HashSet<PostId>,
}

impl DedupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a ledger from identifiers recorded in the run journal
    pub fn from_ids<I: IntoIterator<Item = PostId>>(ids: I) -> Self {
        Self {
            seen: ids.into_iter().collect(),
        }
    }

    /// Records an identifier
    ///
    /// Returns true if it had not been seen before.
    pub fn insert(&mut self, id: PostId) -> bool {
        self.seen.insert(id)
    }

    pub fn contains(&self, id: &PostId) -> bool {
        self.seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_reports_novelty() {
        let mut ledger = DedupLedger::new();
        let id = PostId::parse("10").unwrap();

        assert!(ledger.insert(id.clone()));
        assert!(!ledger.insert(id.clone()));
        assert!(ledger.contains(&id));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_from_ids() {
        let ids = ["1", "2", "2", "3"].iter().filter_map(|s| PostId::parse(s));
        let ledger = DedupLedger::from_ids(ids);
        assert_eq!(ledger.len(), 3);
        assert!(ledger.contains(&PostId::parse("002").unwrap()));
    }
}
