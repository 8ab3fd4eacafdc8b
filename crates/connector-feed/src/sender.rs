use std::sync::Arc;

use connector_retry::{NoRetryPolicy, RetryDecision, RetryPolicy};
use connector_types::{DocId, FeedItem};
use tokio_util::sync::CancellationToken;

use crate::encoder::{encode_groups_feed, encode_metadata_and_url_feed, GroupMembership};
use crate::observer::{ArchiveOutcome, FailureKind, FeedArchiver, PushObserver};
use crate::transport::{FeedKind, FeedTransport, TransportError};

pub struct FeedSenderConfig {
    pub datasource: String,
    pub base_url: String,
    pub max_batch_size: usize,
    pub mark_all_docs_as_public: bool,
}

/// Batches items and sends them through the feed transport under a
/// retry policy, recording outcomes to the journal and, optionally, an
/// archiver.
pub struct FeedSender {
    transport: FeedTransport,
    config: FeedSenderConfig,
    default_retry_policy: Arc<dyn RetryPolicy>,
    observer: Arc<dyn PushObserver>,
    archiver: Option<Arc<dyn FeedArchiver>>,
}

impl FeedSender {
    pub fn new(
        transport: FeedTransport,
        config: FeedSenderConfig,
        default_retry_policy: Arc<dyn RetryPolicy>,
        observer: Arc<dyn PushObserver>,
        archiver: Option<Arc<dyn FeedArchiver>>,
    ) -> Self {
        Self {
            transport,
            config,
            default_retry_policy,
            observer,
            archiver,
        }
    }

    fn items_carry_acl(items: &[FeedItem]) -> bool {
        items.iter().any(|item| match item {
            FeedItem::Record(r) => r.acl().is_some(),
            FeedItem::AclItem(_) => true,
        })
    }

    /// Send `items` as a metadata-and-url feed under `feedtype`, in
    /// batches of at most `max_batch_size`. Returns the first item of
    /// whichever batch failed permanently, or was cut short by
    /// cancellation after at least one batch had already gone out, or
    /// `None` on full success. Cancellation before the first batch
    /// completes is reported as an error rather than a graceful
    /// partial result, since nothing has been pushed yet.
    pub async fn push_records(
        &self,
        items: Vec<FeedItem>,
        feedtype: FeedKind,
        handler: Option<Arc<dyn RetryPolicy>>,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Option<FeedItem>> {
        if items.is_empty() {
            return Ok(None);
        }

        if self.config.mark_all_docs_as_public && Self::items_carry_acl(&items) {
            return Ok(None);
        }

        let policy = handler.unwrap_or_else(|| self.default_retry_policy.clone());
        let failure_kind = match feedtype {
            FeedKind::Full => FailureKind::Full,
            FeedKind::Incremental => FailureKind::Incremental,
            FeedKind::MetadataAndUrl => FailureKind::Incremental,
        };

        for (index, batch) in items.chunks(self.config.max_batch_size.max(1)).enumerate() {
            let payload = encode_metadata_and_url_feed(
                &self.config.datasource,
                feedtype,
                &self.config.base_url,
                batch,
            )?;

            match self.send_with_retry("datasource", &self.config.datasource, feedtype, payload, &policy, cancel, failure_kind).await? {
                BatchOutcome::Success => {
                    let ids: Vec<DocId> = batch.iter().map(|item| item.doc_id().clone()).collect();
                    self.observer.record_batch_success(&ids);
                }
                BatchOutcome::Interrupted => {
                    cancel.cancel();
                    if index == 0 {
                        anyhow::bail!("push interrupted before the first batch completed");
                    }
                    return Ok(Some(batch[0].clone()));
                }
                BatchOutcome::Failed => {
                    return Ok(Some(batch[0].clone()));
                }
            }
        }

        Ok(None)
    }

    /// Send group memberships as a groups feed, using the same batching
    /// contract as `push_records`.
    pub async fn push_named_resources(
        &self,
        groupsource: &str,
        feedtype: FeedKind,
        memberships: Vec<GroupMembership>,
        handler: Option<Arc<dyn RetryPolicy>>,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Option<GroupMembership>> {
        // An empty `Full` feed is meaningful on its own: it is how the
        // group double-buffering protocol deletes a stale alias's
        // contents, so it must still reach the transport. An empty
        // `Incremental` feed carries nothing to append and is a no-op.
        if memberships.is_empty() && feedtype != FeedKind::Full {
            return Ok(None);
        }
        if self.config.mark_all_docs_as_public {
            return Ok(None);
        }

        let policy = handler.unwrap_or_else(|| self.default_retry_policy.clone());

        for (index, batch) in Self::chunks_at_least_one(&memberships, self.config.max_batch_size.max(1))
            .into_iter()
            .enumerate()
        {
            let payload = encode_groups_feed(groupsource, feedtype, batch)?;

            match self
                .send_with_retry("groupsource", groupsource, feedtype, payload, &policy, cancel, FailureKind::Group)
                .await?
            {
                BatchOutcome::Success => self.observer.record_group_batch_success(batch.len()),
                BatchOutcome::Interrupted => {
                    cancel.cancel();
                    if index == 0 {
                        anyhow::bail!("push interrupted before the first batch completed");
                    }
                    return Ok(batch.first().cloned());
                }
                BatchOutcome::Failed => return Ok(batch.first().cloned()),
            }
        }

        Ok(None)
    }

    /// Like `[T]::chunks`, but yields a single empty chunk for an empty
    /// slice instead of no chunks at all, so an intentionally-empty
    /// full-replacement feed still reaches the transport.
    fn chunks_at_least_one<T>(items: &[T], size: usize) -> Vec<&[T]> {
        if items.is_empty() {
            vec![&items[0..0]]
        } else {
            items.chunks(size).collect()
        }
    }

    async fn send_with_retry(
        &self,
        source_part: &'static str,
        source_name: &str,
        feedtype: FeedKind,
        payload: Vec<u8>,
        policy: &Arc<dyn RetryPolicy>,
        cancel: &CancellationToken,
        failure_kind: FailureKind,
    ) -> anyhow::Result<BatchOutcome> {
        let mut attempt = 1;
        loop {
            if cancel.is_cancelled() {
                return Ok(BatchOutcome::Interrupted);
            }

            match self
                .transport
                .send(source_part, source_name, feedtype, payload.clone())
                .await
            {
                Ok(()) => {
                    if let Some(archiver) = &self.archiver {
                        archiver.archive(&payload, ArchiveOutcome::Success);
                    }
                    return Ok(BatchOutcome::Success);
                }
                Err(TransportError::FatalUnauthorized) => {
                    self.observer.record_batch_failure(failure_kind);
                    if let Some(archiver) = &self.archiver {
                        archiver.archive(&payload, ArchiveOutcome::Failure);
                    }
                    return Ok(BatchOutcome::Failed);
                }
                Err(other) => {
                    let error = anyhow::Error::new(other);
                    match policy.decide(&error, attempt, cancel).await {
                        RetryDecision::Retry => {
                            attempt += 1;
                            continue;
                        }
                        RetryDecision::GiveUp => {
                            self.observer.record_batch_failure(failure_kind);
                            if let Some(archiver) = &self.archiver {
                                archiver.archive(&payload, ArchiveOutcome::Failure);
                            }
                            return Ok(BatchOutcome::Failed);
                        }
                        RetryDecision::Interrupted => {
                            return Ok(BatchOutcome::Interrupted);
                        }
                    }
                }
            }
        }
    }
}

enum BatchOutcome {
    Success,
    Failed,
    Interrupted,
}

/// A handler with no retries at all, used to bound shutdown draining.
pub fn no_retry_handler() -> Arc<dyn RetryPolicy> {
    Arc::new(NoRetryPolicy)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::observer::{FailureKind, PushObserver};
    use crate::transport::FeedTransport;
    use connector_types::{DocId, Record};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn acl_bearing_records_are_detected() {
        let plain = FeedItem::Record(Record::builder(DocId::new("a").unwrap()).build());
        assert!(!FeedSender::items_carry_acl(&[plain]));

        let with_acl = FeedItem::Record(
            Record::builder(DocId::new("a").unwrap())
                .acl(connector_types::Acl::default())
                .build(),
        );
        assert!(FeedSender::items_carry_acl(&[with_acl]));
    }

    #[derive(Default)]
    struct CountingObserver {
        failures: AtomicUsize,
    }

    impl PushObserver for CountingObserver {
        fn record_batch_success(&self, _ids: &[DocId]) {}
        fn record_group_batch_success(&self, _item_count: usize) {}
        fn record_batch_failure(&self, _kind: FailureKind) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn unreachable_sender(observer: Arc<CountingObserver>) -> FeedSender {
        FeedSender::new(
            FeedTransport::new("http://127.0.0.1:1/feed".parse().unwrap()).unwrap(),
            FeedSenderConfig {
                datasource: "test".into(),
                base_url: "/docs/".into(),
                max_batch_size: 10,
                mark_all_docs_as_public: false,
            },
            Arc::new(NoRetryPolicy),
            observer,
            None,
        )
    }

    // spec.md §4.9: a full group-replacement push ends with an *empty*
    // `Full` feed sent to the stale alias, and that empty feed must
    // still reach the transport (it is what deletes the alias's
    // contents). An empty `Incremental` feed, by contrast, carries
    // nothing to append and should stay a local no-op.
    #[tokio::test]
    async fn empty_full_feed_still_reaches_the_transport() {
        let observer = Arc::new(CountingObserver::default());
        let sender = unreachable_sender(observer.clone());
        let cancel = CancellationToken::new();

        let result = sender
            .push_named_resources("src-FULL2", FeedKind::Full, Vec::new(), None, &cancel)
            .await
            .unwrap();

        assert!(result.is_none());
        assert_eq!(observer.failures.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_incremental_feed_is_a_local_no_op() {
        let observer = Arc::new(CountingObserver::default());
        let sender = unreachable_sender(observer.clone());
        let cancel = CancellationToken::new();

        let result = sender
            .push_named_resources("src", FeedKind::Incremental, Vec::new(), None, &cancel)
            .await
            .unwrap();

        assert!(result.is_none());
        assert_eq!(observer.failures.load(Ordering::SeqCst), 0);
    }

    // spec.md §5: interruption before the first batch has gone out means
    // nothing was pushed, so it must surface as an error rather than a
    // graceful partial result.
    #[tokio::test]
    async fn interruption_on_the_first_batch_is_an_error() {
        let observer = Arc::new(CountingObserver::default());
        let sender = unreachable_sender(observer);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let items = vec![FeedItem::Record(Record::builder(DocId::new("a").unwrap()).build())];
        let result = sender
            .push_records(items, FeedKind::Incremental, None, &cancel)
            .await;

        assert!(result.is_err());
    }
}
