//! Uniform retry/backoff contract used by the feed sender (C5) and the
//! full/incremental push drivers (C7/C8).

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// What a `RetryPolicy` decided to do after examining a failure.
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again; the policy has already slept for the backoff period.
    Retry,
    /// Stop retrying; surface the failure to the caller.
    GiveUp,
    /// The backoff sleep was canceled. Callers must propagate this
    /// rather than attempt again.
    Interrupted,
}

/// A uniform contract: given the error that just occurred and the
/// attempt number (starting at 1), decide whether to retry. May sleep
/// as part of computing the decision (to implement backoff), and that
/// sleep races a `CancellationToken` so callers stay interruptible.
#[async_trait]
pub trait RetryPolicy: Send + Sync {
    async fn decide(
        &self,
        error: &anyhow::Error,
        attempt: u32,
        cancel: &CancellationToken,
    ) -> RetryDecision;
}

/// The default policy: retry up to `max_attempts` times with linear
/// backoff `sleep = backoff_unit * attempt`.
pub struct LinearBackoffRetryPolicy {
    pub max_attempts: u32,
    pub backoff_unit: Duration,
}

impl Default for LinearBackoffRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 12,
            backoff_unit: Duration::from_secs(5),
        }
    }
}

#[async_trait]
impl RetryPolicy for LinearBackoffRetryPolicy {
    async fn decide(
        &self,
        error: &anyhow::Error,
        attempt: u32,
        cancel: &CancellationToken,
    ) -> RetryDecision {
        if attempt >= self.max_attempts {
            tracing::warn!(attempt, %error, "giving up after max attempts");
            return RetryDecision::GiveUp;
        }

        let sleep_for = self.backoff_unit * attempt;
        tracing::debug!(attempt, ?sleep_for, %error, "retrying after backoff");

        tokio::select! {
            _ = tokio::time::sleep(sleep_for) => RetryDecision::Retry,
            _ = cancel.cancelled() => RetryDecision::Interrupted,
        }
    }
}

/// A policy that never retries: used to bound shutdown by pushing
/// whatever remains exactly once.
pub struct NoRetryPolicy;

#[async_trait]
impl RetryPolicy for NoRetryPolicy {
    async fn decide(
        &self,
        _error: &anyhow::Error,
        _attempt: u32,
        _cancel: &CancellationToken,
    ) -> RetryDecision {
        RetryDecision::GiveUp
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn gives_up_at_max_attempts() {
        tokio::time::pause();
        let policy = LinearBackoffRetryPolicy {
            max_attempts: 3,
            backoff_unit: Duration::from_secs(1),
        };
        let cancel = CancellationToken::new();
        let err = anyhow::anyhow!("boom");

        assert_eq!(policy.decide(&err, 1, &cancel).await, RetryDecision::Retry);
        assert_eq!(policy.decide(&err, 2, &cancel).await, RetryDecision::Retry);
        assert_eq!(policy.decide(&err, 3, &cancel).await, RetryDecision::GiveUp);
    }

    #[tokio::test]
    async fn cancellation_is_propagated_without_further_attempts() {
        let policy = LinearBackoffRetryPolicy::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = anyhow::anyhow!("boom");

        assert_eq!(
            policy.decide(&err, 1, &cancel).await,
            RetryDecision::Interrupted
        );
    }

    #[tokio::test]
    async fn no_retry_policy_always_gives_up() {
        let policy = NoRetryPolicy;
        let cancel = CancellationToken::new();
        let err = anyhow::anyhow!("boom");
        assert_eq!(policy.decide(&err, 1, &cancel).await, RetryDecision::GiveUp);
    }
}
