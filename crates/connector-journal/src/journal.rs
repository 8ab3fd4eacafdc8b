use std::time::Duration;

use connector_feed::{FailureKind, PushObserver};
use connector_types::{CompletionStatus, DocId, PushKind, PushRunState};

use crate::counters::IdentifierCounter;
use crate::metrics::JournalMetrics;
use crate::push_tracker::PushTracker;
use crate::window::{RequestBucket, RequestWindows, WindowSizes};

/// Who issued a content request, for the appliance-vs-other split
/// required by the journal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Requester {
    Appliance,
    Other,
}

/// The operational journal (C12): push/request counters, the three
/// windowed statistics buffers, and push-run bookkeeping.
pub struct Journal {
    pushed: IdentifierCounter,
    appliance_requests: IdentifierCounter,
    other_requests: IdentifierCounter,
    windows: RequestWindows,
    push_tracker: PushTracker,
    metrics: Option<JournalMetrics>,
}

impl Journal {
    pub fn new(sizes: WindowSizes) -> Self {
        Self {
            pushed: IdentifierCounter::default(),
            appliance_requests: IdentifierCounter::default(),
            other_requests: IdentifierCounter::default(),
            windows: RequestWindows::new(sizes),
            push_tracker: PushTracker::default(),
            metrics: JournalMetrics::new().ok(),
        }
    }

    pub fn record_push(&self, id: &DocId) {
        self.pushed.record(id);
        if let Some(metrics) = &self.metrics {
            metrics.docs_pushed_total.inc();
        }
    }

    pub fn record_request(
        &self,
        id: &DocId,
        requester: Requester,
        failed: bool,
        duration: Duration,
        bytes_produced: u64,
    ) {
        let from_appliance = requester == Requester::Appliance;
        match requester {
            Requester::Appliance => self.appliance_requests.record(id),
            Requester::Other => self.other_requests.record(id),
        }
        self.windows.record(failed, duration, bytes_produced, from_appliance);

        if let Some(metrics) = &self.metrics {
            let label = if from_appliance { "appliance" } else { "other" };
            metrics.content_requests_total.with_label_values(&[label]).inc();
        }
    }

    pub fn docs_pushed_total(&self) -> u64 {
        self.pushed.total()
    }

    pub fn docs_pushed_unique(&self) -> u64 {
        self.pushed.unique()
    }

    pub fn appliance_requests_total(&self) -> u64 {
        self.appliance_requests.total()
    }

    pub fn appliance_requests_unique(&self) -> u64 {
        self.appliance_requests.unique()
    }

    pub fn other_requests_total(&self) -> u64 {
        self.other_requests.total()
    }

    pub fn other_requests_unique(&self) -> u64 {
        self.other_requests.unique()
    }

    pub fn window_seconds(&self) -> RequestBucket {
        self.windows.sum_seconds()
    }

    pub fn window_minutes(&self) -> RequestBucket {
        self.windows.sum_minutes()
    }

    pub fn window_half_hours(&self) -> RequestBucket {
        self.windows.sum_half_hours()
    }

    pub fn start_push_run(&self, kind: PushKind) {
        self.push_tracker.start_run(kind);
    }

    pub fn finish_push_run(&self, kind: PushKind, status: CompletionStatus) {
        self.push_tracker.finish_run(kind, status);
    }

    pub fn push_run_state(&self, kind: PushKind) -> PushRunState {
        self.push_tracker.snapshot(kind)
    }

    pub fn most_recent_push_status(&self) -> Option<(PushKind, CompletionStatus)> {
        self.push_tracker.most_recent_status()
    }
}

impl PushObserver for Journal {
    fn record_batch_success(&self, ids: &[DocId]) {
        for id in ids {
            self.record_push(id);
        }
    }

    fn record_group_batch_success(&self, _item_count: usize) {}

    fn record_batch_failure(&self, kind: FailureKind) {
        if let Some(metrics) = &self.metrics {
            let label = match kind {
                FailureKind::Group => "group",
                FailureKind::Full => "full",
                FailureKind::Incremental => "incremental",
            };
            metrics.push_failures_total.with_label_values(&[label]).inc();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn push_and_request_counters_track_totals_and_uniques() {
        let journal = Journal::new(WindowSizes::default());
        let a = DocId::new("a").unwrap();
        let b = DocId::new("b").unwrap();

        journal.record_push(&a);
        journal.record_push(&a);
        journal.record_push(&b);
        assert_eq!(journal.docs_pushed_total(), 3);
        assert_eq!(journal.docs_pushed_unique(), 2);

        journal.record_request(&a, Requester::Appliance, false, Duration::from_millis(5), 10);
        journal.record_request(&a, Requester::Other, true, Duration::from_millis(8), 20);
        assert_eq!(journal.appliance_requests_total(), 1);
        assert_eq!(journal.other_requests_total(), 1);

        let window = journal.window_seconds();
        assert_eq!(window.request_count, 2);
        assert_eq!(window.failure_count, 1);
        assert!(window.saw_appliance);
    }

    #[test]
    fn push_observer_bridges_batch_outcomes() {
        let journal = Journal::new(WindowSizes::default());
        let ids = [DocId::new("a").unwrap(), DocId::new("b").unwrap(), DocId::new("a").unwrap()];
        PushObserver::record_batch_success(&journal, &ids);
        PushObserver::record_batch_failure(&journal, FailureKind::Full);

        assert_eq!(journal.docs_pushed_total(), 3);
        assert_eq!(journal.docs_pushed_unique(), 2);
    }
}
