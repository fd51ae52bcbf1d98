use std::time::Duration;

use moka::sync::Cache;

use crate::model::{Transaction, TransactionId};

/// Remembers finalized transactions already handed to the history sink so
/// repeat polls can skip the sink lookup. Entries expire after a TTL, after
/// which the sink is asked again.
#[derive(Debug)]
pub struct PublishedCache {
    finalized: Cache<TransactionId, ()>,
}

impl PublishedCache {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);
    pub const DEFAULT_CAPACITY: u64 = 10_000;

    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(ttl: Duration, capacity: u64) -> Self {
        let capacity = capacity.max(1);
        Self {
            finalized: Cache::builder()
                .time_to_live(ttl)
                .max_capacity(capacity)
                .build(),
        }
    }

    pub fn contains(&self, id: &TransactionId) -> bool {
        self.finalized.contains_key(id)
    }

    /// Records the transaction if it is final. Returns whether it was recorded.
    pub fn remember(&self, transaction: &Transaction) -> bool {
        if !transaction.is_final() {
            return false;
        }
        self.finalized.insert(transaction.id.clone(), ());
        true
    }
}

impl Default for PublishedCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn transaction(id: &str, finished: bool) -> Transaction {
        Transaction {
            id: TransactionId::from(id),
            stop_at: finished.then(Utc::now),
            ..Default::default()
        }
    }

    #[test]
    fn remembers_only_final_transactions() {
        let cache = PublishedCache::default();
        assert!(!cache.remember(&transaction("trans1", false)));
        assert!(!cache.contains(&TransactionId::from("trans1")));

        assert!(cache.remember(&transaction("trans2", true)));
        assert!(cache.contains(&TransactionId::from("trans2")));
    }
}
