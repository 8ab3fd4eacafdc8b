use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use connector_adaptor::{FullPushDriver, GroupPushDriver, IncrementalPushDriver};
use connector_config::Config;
use connector_cron::{CronPattern, CronSchedule};
use connector_feed::{
    AsyncSender, AsyncSenderConfig, FeedKind, FeedSender, FeedSenderConfig, FeedTransport,
    GroupPusher,
};
use connector_journal::{Journal, WindowSizes};
use connector_retry::{LinearBackoffRetryPolicy, RetryPolicy};
use connector_server::{RouterConfig, ShutdownWaiter};
use tokio_util::sync::CancellationToken;

use crate::fs_adaptor::FilesystemAdaptor;
use crate::logging::{DiagnosticFormat, LoggingConfig};

pub struct RunOpts {
    pub config_path: PathBuf,
    pub adaptor_root: PathBuf,
    pub diag_log_dir: Option<PathBuf>,
    pub diag_format: DiagnosticFormat,
    pub tokio_console: bool,
}

pub async fn run(opts: RunOpts) -> anyhow::Result<()> {
    let _log_guard = LoggingConfig {
        log_dir: opts.diag_log_dir,
        format: opts.diag_format,
        default_filter: "connectord=info,connector_server=info".to_string(),
        tokio_console: opts.tokio_console,
    }
    .init()?;

    let config = Config::load(&opts.config_path)?;
    tracing::info!(datasource = %config.feed.name, "connectord starting");

    let cancel = CancellationToken::new();
    let shutdown = ShutdownWaiter::new();
    let journal = Arc::new(Journal::new(WindowSizes {
        second_buckets: config.journal.second_bucket_count,
        minute_buckets: config.journal.minute_bucket_count,
        half_hour_buckets: config.journal.half_hour_bucket_count,
    }));

    let retry_policy: Arc<dyn RetryPolicy> = Arc::new(LinearBackoffRetryPolicy {
        max_attempts: config.retry.max_attempts,
        backoff_unit: Duration::from_secs(config.retry.backoff_unit_secs),
    });

    let feed_sender = Arc::new(FeedSender::new(
        FeedTransport::new(config.gsa.feed_url().parse()?)?,
        FeedSenderConfig {
            datasource: config.feed.name.clone(),
            base_url: config.server.base_url.clone(),
            max_batch_size: config.feed.max_urls,
            mark_all_docs_as_public: config.feed.mark_all_docs_as_public,
        },
        retry_policy.clone(),
        journal.clone(),
        None,
    ));

    let (async_sender, worker_handle) = AsyncSender::spawn(
        feed_sender.clone(),
        AsyncSenderConfig {
            queue_capacity: config.feed.queue_capacity,
            max_batch_size: config.feed.max_urls,
            max_latency: Duration::from_secs(1),
            feedtype: FeedKind::MetadataAndUrl,
        },
        cancel.clone(),
    );
    let sink = Arc::new(async_sender);

    // The group-definition feed (C9) shares the datasource's appliance
    // version gate but posts to the separate groups endpoint.
    let groups_sender = Arc::new(FeedSender::new(
        FeedTransport::new(config.gsa.groups_url().parse()?)?,
        FeedSenderConfig {
            datasource: config.feed.effective_group_source().to_string(),
            base_url: config.server.base_url.clone(),
            max_batch_size: config.feed.max_urls,
            mark_all_docs_as_public: false,
        },
        retry_policy.clone(),
        journal.clone(),
        None,
    ));
    let group_pusher = Arc::new(GroupPusher::new(
        groups_sender,
        connector_feed::ApplianceVersion {
            major: config.feed.appliance_version_major as u32,
            minor: config.feed.appliance_version_minor as u32,
        },
    ));

    let adaptor = Arc::new(FilesystemAdaptor::new(opts.adaptor_root));

    let full_driver = Arc::new(FullPushDriver::new(
        adaptor.clone(),
        sink.clone(),
        journal.clone(),
        retry_policy.clone(),
    ));
    let incremental_driver = Arc::new(IncrementalPushDriver::new(
        adaptor.clone(),
        sink.clone(),
        journal.clone(),
        retry_policy.clone(),
    ));
    let group_driver = Arc::new(GroupPushDriver::new(
        adaptor.clone(),
        group_pusher,
        config.feed.effective_group_source().to_string(),
    ));

    if config.adaptor.push_doc_ids_on_startup {
        let full_driver = full_driver.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = full_driver.run(&cancel).await {
                tracing::error!(%err, "startup full push failed");
            }
        });
    }

    let periodic_handle = {
        let driver = incremental_driver.clone();
        let period = Duration::from_secs(config.adaptor.incremental_poll_period_secs);
        let cancel = cancel.clone();
        tokio::spawn(async move { driver.run_periodic(period, cancel).await })
    };

    let group_push_handle = {
        let driver = group_driver.clone();
        let period = Duration::from_secs(config.adaptor.group_push_period_secs);
        let cancel = cancel.clone();
        tokio::spawn(async move { driver.run_periodic(period, cancel).await })
    };

    let cron_handle = match &config.adaptor.full_listing_schedule {
        Some(expr) => {
            let pattern = CronPattern::parse(expr)?;
            let schedule = Arc::new(CronSchedule::new(pattern));
            let driver = incremental_driver.clone();
            let cancel = cancel.clone();
            Some(tokio::spawn(
                async move { driver.run_cron(schedule, cancel).await },
            ))
        }
        None => None,
    };

    let transformers: Vec<Arc<dyn connector_adaptor::ContentTransformer>> = Vec::new();

    let router = connector_server::build_router(
        adaptor.clone(),
        journal.clone(),
        Arc::new(connector_server::SessionStore::default()),
        Arc::new(connector_server::TrustClassifier::new(
            config.server.full_access_hosts.clone(),
            Vec::new(),
        )),
        shutdown.clone(),
        transformers.clone(),
        None,
        RouterConfig {
            base_url: config.server.base_url.clone(),
            secure: config.server.secure,
            use_compression: config.server.use_compression,
            watchdog_timeout: Duration::from_secs(config.server.watchdog_timeout_secs),
            transform_configured: !transformers.is_empty(),
            transform_max_bytes: config.transform.max_document_bytes,
            transform_required: config.transform.required,
        },
    );

    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), config.server.port);
    let server_handle = connector_server::spawn(router, addr)?;
    tracing::info!(%addr, "document-serving HTTP handler listening");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");

    cancel.cancel();
    shutdown
        .shutdown(Duration::from_secs(config.server.shutdown_grace_secs))
        .await;

    server_handle.abort();
    periodic_handle.abort();
    group_push_handle.abort();
    if let Some(handle) = cron_handle {
        handle.abort();
    }
    let _ = worker_handle.await;

    Ok(())
}
