use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use connector_types::DocId;
use parking_lot::Mutex;

/// Total and unique counts for a single stream of identifiers (docs
/// pushed, or documents requested by a particular class of caller).
#[derive(Default)]
pub struct IdentifierCounter {
    total: AtomicU64,
    seen: Mutex<HashSet<DocId>>,
}

impl IdentifierCounter {
    pub fn record(&self, id: &DocId) {
        self.total.fetch_add(1, Ordering::Relaxed);
        let mut seen = self.seen.lock();
        if !seen.contains(id) {
            seen.insert(id.clone());
        }
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn unique(&self) -> u64 {
        self.seen.lock().len() as u64
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unique_deduplicates_repeated_ids() {
        let counter = IdentifierCounter::default();
        let a = DocId::new("a").unwrap();
        counter.record(&a);
        counter.record(&a);
        counter.record(&DocId::new("b").unwrap());

        assert_eq!(counter.total(), 3);
        assert_eq!(counter.unique(), 2);
    }
}
