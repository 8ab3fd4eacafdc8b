use connector_types::DocId;

/// Which kind of push a batch failure belongs to, for C12 journal
/// classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    Group,
    Full,
    Incremental,
}

/// Collaborator notified of batch outcomes so the journal (C12) can
/// keep its counters and windowed statistics current. Implemented by
/// the journal crate; kept as a trait here so this crate doesn't need
/// to depend on it.
pub trait PushObserver: Send + Sync {
    /// A batch of documents (identified by `ids`) was pushed successfully.
    fn record_batch_success(&self, ids: &[DocId]);
    /// A batch of group memberships was pushed successfully.
    fn record_group_batch_success(&self, item_count: usize);
    fn record_batch_failure(&self, kind: FailureKind);
}

/// A no-op observer, useful for tests and for callers that don't wire
/// up the journal.
pub struct NullObserver;

impl PushObserver for NullObserver {
    fn record_batch_success(&self, _ids: &[DocId]) {}
    fn record_group_batch_success(&self, _item_count: usize) {}
    fn record_batch_failure(&self, _kind: FailureKind) {}
}

/// Whether an archived payload corresponds to a successful or a final
/// (non-retriable) failed send.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArchiveOutcome {
    Success,
    Failure,
}

/// Optional external collaborator that persists the raw payload of
/// every batch that was sent, win or lose.
pub trait FeedArchiver: Send + Sync {
    fn archive(&self, payload: &[u8], outcome: ArchiveOutcome);
}
