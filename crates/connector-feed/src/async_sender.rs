use std::sync::Arc;
use std::time::Duration;

use connector_types::FeedItem;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::sender::{no_retry_handler, FeedSender};
use crate::transport::FeedKind;

pub struct AsyncSenderConfig {
    pub queue_capacity: usize,
    pub max_batch_size: usize,
    pub max_latency: Duration,
    pub feedtype: FeedKind,
}

/// A bounded FIFO queue plus a single worker task. `enqueue` never
/// blocks: if the queue is full, the item is dropped and a warning is
/// logged.
pub struct AsyncSender {
    tx: mpsc::Sender<FeedItem>,
}

impl AsyncSender {
    pub fn spawn(
        sender: Arc<FeedSender>,
        config: AsyncSenderConfig,
        cancel: CancellationToken,
    ) -> (Self, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let handle = tokio::spawn(worker_loop(sender, config, rx, cancel));
        (Self { tx }, handle)
    }

    pub fn enqueue(&self, item: FeedItem) {
        match self.tx.try_send(item) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(item)) => {
                tracing::warn!(doc_id = %item.doc_id(), "async feed queue is full, dropping item");
            }
            Err(mpsc::error::TrySendError::Closed(item)) => {
                tracing::warn!(doc_id = %item.doc_id(), "async feed queue worker is gone, dropping item");
            }
        }
    }
}

enum WorkerEvent {
    Cancelled,
    QueueClosed,
    Item(FeedItem),
    LatencyElapsed,
}

async fn worker_loop(
    sender: Arc<FeedSender>,
    config: AsyncSenderConfig,
    mut rx: mpsc::Receiver<FeedItem>,
    cancel: CancellationToken,
) {
    let mut batch: Vec<FeedItem> = Vec::new();
    let mut batch_started: Option<Instant> = None;

    loop {
        let deadline = batch_started.map(|start| start + config.max_latency);

        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => WorkerEvent::Cancelled,
            maybe_item = rx.recv() => match maybe_item {
                Some(item) => WorkerEvent::Item(item),
                None => WorkerEvent::QueueClosed,
            },
            _ = sleep_until_or_forever(deadline), if deadline.is_some() => WorkerEvent::LatencyElapsed,
        };

        match event {
            WorkerEvent::Cancelled | WorkerEvent::QueueClosed => {
                // Drain whatever is left and push it once with no
                // retries, so shutdown is bounded.
                while let Ok(item) = rx.try_recv() {
                    batch.push(item);
                }
                if !batch.is_empty() {
                    let inner_cancel = CancellationToken::new();
                    let _ = sender
                        .push_records(
                            std::mem::take(&mut batch),
                            config.feedtype,
                            Some(no_retry_handler()),
                            &inner_cancel,
                        )
                        .await;
                }
                return;
            }
            WorkerEvent::Item(item) => {
                if batch.is_empty() {
                    batch_started = Some(Instant::now());
                }
                batch.push(item);
                if batch.len() >= config.max_batch_size {
                    flush(&sender, &mut batch, &mut batch_started, config.feedtype, &cancel).await;
                }
            }
            WorkerEvent::LatencyElapsed => {
                flush(&sender, &mut batch, &mut batch_started, config.feedtype, &cancel).await;
            }
        }
    }
}

async fn flush(
    sender: &Arc<FeedSender>,
    batch: &mut Vec<FeedItem>,
    batch_started: &mut Option<Instant>,
    feedtype: FeedKind,
    cancel: &CancellationToken,
) {
    if batch.is_empty() {
        *batch_started = None;
        return;
    }
    let items = std::mem::take(batch);
    if let Err(err) = sender.push_records(items, feedtype, None, cancel).await {
        tracing::warn!(%err, "async feed worker batch send failed");
    }
    *batch_started = None;
}

async fn sleep_until_or_forever(deadline: Option<Instant>) {
    match deadline {
        Some(when) => tokio::time::sleep_until(when).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn config_defaults_are_sane_to_construct() {
        let config = AsyncSenderConfig {
            queue_capacity: 300,
            max_batch_size: 100,
            max_latency: Duration::from_millis(500),
            feedtype: FeedKind::Incremental,
        };
        assert_eq!(config.queue_capacity, 300);
    }
}
