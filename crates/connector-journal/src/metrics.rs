use prometheus::{IntCounter, IntCounterVec};

/// Process-wide prometheus counters mirroring the journal's own
/// bookkeeping, registered once via the default registry the way
/// `kumod::queue::manager` registers its gauges and histograms.
pub struct JournalMetrics {
    pub docs_pushed_total: IntCounter,
    pub content_requests_total: IntCounterVec,
    pub push_failures_total: IntCounterVec,
}

impl JournalMetrics {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            docs_pushed_total: prometheus::register_int_counter!(
                "connector_docs_pushed_total",
                "total document identifiers pushed to the appliance"
            )?,
            content_requests_total: prometheus::register_int_counter_vec!(
                "connector_content_requests_total",
                "content requests served, labeled by requester class",
                &["requester"]
            )?,
            push_failures_total: prometheus::register_int_counter_vec!(
                "connector_push_failures_total",
                "feed push batch failures, labeled by push kind",
                &["kind"]
            )?,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn metrics_register_without_conflict() {
        // Uses a private registry so repeated test runs in the same
        // process don't collide on prometheus's default registry.
        let registry = prometheus::Registry::new();
        let counter = IntCounter::new("test_counter", "help").unwrap();
        registry.register(Box::new(counter.clone())).unwrap();
        counter.inc();
        assert_eq!(counter.get(), 1);
    }
}
