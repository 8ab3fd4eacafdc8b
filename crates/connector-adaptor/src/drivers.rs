use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use connector_cron::CronSchedule;
use connector_feed::{AsyncSender, GroupPusher};
use connector_journal::Journal;
use connector_retry::{RetryDecision, RetryPolicy};
use connector_types::{CompletionStatus, PushKind};
use tokio_util::sync::CancellationToken;

use crate::adaptor::Adaptor;

/// Drives full enumeration (C7): wraps a single call to
/// `Adaptor::enumerate_full` in the retry policy, recording the
/// outcome in the journal. At most one full push may be in flight per
/// process; starting a second one concurrently is a programming error
/// enforced by the journal's push tracker.
pub struct FullPushDriver<A: Adaptor> {
    adaptor: Arc<A>,
    sink: Arc<AsyncSender>,
    journal: Arc<Journal>,
    retry_policy: Arc<dyn RetryPolicy>,
}

impl<A: Adaptor> FullPushDriver<A> {
    pub fn new(
        adaptor: Arc<A>,
        sink: Arc<AsyncSender>,
        journal: Arc<Journal>,
        retry_policy: Arc<dyn RetryPolicy>,
    ) -> Self {
        Self { adaptor, sink, journal, retry_policy }
    }

    pub async fn run(&self, cancel: &CancellationToken) -> anyhow::Result<()> {
        self.journal.start_push_run(PushKind::Full);

        let mut attempt = 1;
        loop {
            if cancel.is_cancelled() {
                self.journal.finish_push_run(PushKind::Full, CompletionStatus::Interruption);
                anyhow::bail!("full push canceled before it started");
            }

            match self.adaptor.enumerate_full(&self.sink).await {
                Ok(()) => {
                    self.journal.finish_push_run(PushKind::Full, CompletionStatus::Success);
                    return Ok(());
                }
                Err(err) => {
                    if cancel.is_cancelled() {
                        self.journal.finish_push_run(PushKind::Full, CompletionStatus::Interruption);
                        return Err(err);
                    }
                    match self.retry_policy.decide(&err, attempt, cancel).await {
                        RetryDecision::Retry => {
                            attempt += 1;
                            continue;
                        }
                        RetryDecision::GiveUp => {
                            self.journal.finish_push_run(PushKind::Full, CompletionStatus::Failure);
                            return Err(err);
                        }
                        RetryDecision::Interrupted => {
                            self.journal.finish_push_run(PushKind::Full, CompletionStatus::Interruption);
                            return Err(err);
                        }
                    }
                }
            }
        }
    }
}

/// Drives incremental enumeration (C8): a fixed-rate periodic timer
/// plus an optional calendar-driven cron schedule, either of which
/// invokes `Adaptor::list_changes` under the retry policy. Overlapping
/// ticks are skipped rather than queued.
pub struct IncrementalPushDriver<A: Adaptor> {
    adaptor: Arc<A>,
    sink: Arc<AsyncSender>,
    journal: Arc<Journal>,
    retry_policy: Arc<dyn RetryPolicy>,
    running: AtomicBool,
}

impl<A: Adaptor> IncrementalPushDriver<A> {
    pub fn new(
        adaptor: Arc<A>,
        sink: Arc<AsyncSender>,
        journal: Arc<Journal>,
        retry_policy: Arc<dyn RetryPolicy>,
    ) -> Self {
        Self {
            adaptor,
            sink,
            journal,
            retry_policy,
            running: AtomicBool::new(false),
        }
    }

    async fn run_once(&self, cancel: &CancellationToken) -> anyhow::Result<()> {
        self.journal.start_push_run(PushKind::Incremental);

        let mut attempt = 1;
        loop {
            match self.adaptor.list_changes(&self.sink).await {
                Ok(()) => {
                    self.journal.finish_push_run(PushKind::Incremental, CompletionStatus::Success);
                    return Ok(());
                }
                Err(err) => {
                    if cancel.is_cancelled() {
                        self.journal.finish_push_run(PushKind::Incremental, CompletionStatus::Interruption);
                        return Err(err);
                    }
                    match self.retry_policy.decide(&err, attempt, cancel).await {
                        RetryDecision::Retry => {
                            attempt += 1;
                            continue;
                        }
                        RetryDecision::GiveUp => {
                            self.journal.finish_push_run(PushKind::Incremental, CompletionStatus::Failure);
                            return Err(err);
                        }
                        RetryDecision::Interrupted => {
                            self.journal.finish_push_run(PushKind::Incremental, CompletionStatus::Interruption);
                            return Err(err);
                        }
                    }
                }
            }
        }
    }

    /// Run on a fixed-rate timer of `period`. A tick that would overlap
    /// a still-running invocation is skipped.
    pub async fn run_periodic(self: Arc<Self>, period: Duration, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = interval.tick() => {
                    if self.running.swap(true, Ordering::AcqRel) {
                        tracing::debug!("skipping incremental push tick: previous run still in progress");
                        continue;
                    }
                    if let Err(err) = self.run_once(&cancel).await {
                        tracing::warn!(%err, "incremental push failed");
                    }
                    self.running.store(false, Ordering::Release);
                }
            }
        }
    }

    /// Run against a calendar cron schedule, evaluated once per minute.
    /// The schedule may be replaced at runtime by whoever holds the
    /// `Arc<CronSchedule>`.
    pub async fn run_cron(self: Arc<Self>, schedule: Arc<CronSchedule>, cancel: CancellationToken) {
        let mut minute_tick = tokio::time::interval(Duration::from_secs(60));
        minute_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = minute_tick.tick() => {
                    if !schedule.matches(&Utc::now()) {
                        continue;
                    }
                    if self.running.swap(true, Ordering::AcqRel) {
                        tracing::debug!("skipping cron tick: previous run still in progress");
                        continue;
                    }
                    if let Err(err) = self.run_once(&cancel).await {
                        tracing::warn!(%err, "cron-triggered incremental push failed");
                    }
                    self.running.store(false, Ordering::Release);
                }
            }
        }
    }
}

/// Drives the group-definition feed (C9): periodically asks the
/// adaptor for its current group memberships and pushes a full
/// replacement through the double-buffered pusher. Overlapping ticks
/// are skipped, matching the incremental driver.
pub struct GroupPushDriver<A: Adaptor> {
    adaptor: Arc<A>,
    pusher: Arc<GroupPusher>,
    source: String,
    running: AtomicBool,
}

impl<A: Adaptor> GroupPushDriver<A> {
    pub fn new(adaptor: Arc<A>, pusher: Arc<GroupPusher>, source: String) -> Self {
        Self {
            adaptor,
            pusher,
            source,
            running: AtomicBool::new(false),
        }
    }

    pub async fn run(&self, cancel: &CancellationToken) -> anyhow::Result<()> {
        let memberships = self.adaptor.list_group_memberships().await?;
        if let Some(first_failed) = self
            .pusher
            .push_full(&self.source, memberships, cancel)
            .await?
        {
            anyhow::bail!("group push failed at group {:?}", first_failed.group.name);
        }
        Ok(())
    }

    /// Run on a fixed-rate timer of `period`.
    pub async fn run_periodic(self: Arc<Self>, period: Duration, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = interval.tick() => {
                    if self.running.swap(true, Ordering::AcqRel) {
                        tracing::debug!("skipping group push tick: previous run still in progress");
                        continue;
                    }
                    if let Err(err) = self.run(&cancel).await {
                        tracing::warn!(%err, "group push failed");
                    }
                    self.running.store(false, Ordering::Release);
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::adaptor::{AuthDecision, DocRequest};
    use crate::doc_response::DocResponse;
    use async_trait::async_trait;
    use connector_journal::WindowSizes;
    use connector_retry::LinearBackoffRetryPolicy;
    use connector_types::DocId;
    use std::sync::atomic::AtomicU32;

    struct FlakyAdaptor {
        failures_before_success: AtomicU32,
    }

    #[async_trait]
    impl Adaptor for FlakyAdaptor {
        async fn enumerate_full(&self, _sink: &AsyncSender) -> anyhow::Result<()> {
            if self.failures_before_success.fetch_sub(1, Ordering::SeqCst) > 0 {
                anyhow::bail!("transient failure");
            }
            Ok(())
        }

        async fn list_changes(&self, _sink: &AsyncSender) -> anyhow::Result<()> {
            self.enumerate_full(_sink).await
        }

        async fn is_user_authorized(
            &self,
            _identity: Option<&str>,
            doc_ids: &[DocId],
        ) -> anyhow::Result<Vec<AuthDecision>> {
            Ok(doc_ids.iter().map(|_| AuthDecision::Permit).collect())
        }

        async fn get_doc_content(
            &self,
            _request: &DocRequest,
            _response: &mut DocResponse,
        ) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn test_sink() -> Arc<AsyncSender> {
        let (sender, _handle) = AsyncSender::spawn(
            Arc::new(connector_feed::FeedSender::new(
                connector_feed::FeedTransport::new("http://127.0.0.1:1/feed".parse().unwrap()).unwrap(),
                connector_feed::FeedSenderConfig {
                    datasource: "test".into(),
                    base_url: "/docs/".into(),
                    max_batch_size: 10,
                    mark_all_docs_as_public: false,
                },
                Arc::new(LinearBackoffRetryPolicy::default()),
                Arc::new(connector_feed::NullObserver),
                None,
            )),
            connector_feed::AsyncSenderConfig {
                queue_capacity: 10,
                max_batch_size: 10,
                max_latency: Duration::from_millis(50),
                feedtype: connector_feed::FeedKind::Full,
            },
            CancellationToken::new(),
        );
        Arc::new(sender)
    }

    #[tokio::test]
    async fn full_push_retries_then_succeeds() {
        tokio::time::pause();
        let adaptor = Arc::new(FlakyAdaptor { failures_before_success: AtomicU32::new(2) });
        let journal = Arc::new(Journal::new(WindowSizes::default()));
        let driver = FullPushDriver::new(
            adaptor,
            test_sink(),
            journal.clone(),
            Arc::new(LinearBackoffRetryPolicy {
                max_attempts: 5,
                backoff_unit: Duration::from_millis(1),
            }),
        );

        let cancel = CancellationToken::new();
        driver.run(&cancel).await.unwrap();

        let state = journal.push_run_state(PushKind::Full);
        assert!(!state.is_active());
        assert_eq!(state.last_status, Some(CompletionStatus::Success));
    }

    struct GroupAdaptor;

    #[async_trait]
    impl Adaptor for GroupAdaptor {
        async fn enumerate_full(&self, _sink: &AsyncSender) -> anyhow::Result<()> {
            Ok(())
        }

        async fn list_changes(&self, _sink: &AsyncSender) -> anyhow::Result<()> {
            Ok(())
        }

        async fn is_user_authorized(
            &self,
            _identity: Option<&str>,
            doc_ids: &[DocId],
        ) -> anyhow::Result<Vec<AuthDecision>> {
            Ok(doc_ids.iter().map(|_| AuthDecision::Permit).collect())
        }

        async fn get_doc_content(
            &self,
            _request: &DocRequest,
            _response: &mut DocResponse,
        ) -> anyhow::Result<()> {
            Ok(())
        }

        async fn list_group_memberships(&self) -> anyhow::Result<Vec<connector_feed::GroupMembership>> {
            Ok(vec![connector_feed::GroupMembership {
                group: connector_types::NamedPrincipal::new("team-a"),
                members: Vec::new(),
            }])
        }
    }

    fn group_sender() -> Arc<connector_feed::FeedSender> {
        Arc::new(connector_feed::FeedSender::new(
            connector_feed::FeedTransport::new("http://127.0.0.1:1/groups".parse().unwrap()).unwrap(),
            connector_feed::FeedSenderConfig {
                datasource: "test-groups".into(),
                base_url: "/docs/".into(),
                max_batch_size: 10,
                mark_all_docs_as_public: false,
            },
            Arc::new(LinearBackoffRetryPolicy::default()),
            Arc::new(connector_feed::NullObserver),
            None,
        ))
    }

    #[tokio::test]
    async fn group_push_is_a_no_op_below_the_version_gate() {
        let driver = GroupPushDriver::new(
            Arc::new(GroupAdaptor),
            Arc::new(GroupPusher::new(
                group_sender(),
                connector_feed::ApplianceVersion { major: 7, minor: 1 },
            )),
            "test-groups".to_string(),
        );

        driver.run(&CancellationToken::new()).await.unwrap();
    }

    #[test]
    #[should_panic(expected = "while one is already running")]
    fn starting_a_second_full_push_is_a_programming_error() {
        let journal = Journal::new(WindowSizes::default());
        journal.start_push_run(PushKind::Full);
        journal.start_push_run(PushKind::Full);
    }
}
