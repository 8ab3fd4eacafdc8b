//! Diagnostic logging setup (C14): `tracing`/`tracing-subscriber`
//! structured logging with a configurable render format and a runtime
//! filter-reload handle.

use std::path::PathBuf;

use anyhow::Context;
use clap::ValueEnum;
use once_cell::sync::OnceCell;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

static FILTER_RELOAD_HANDLE: OnceCell<Box<dyn Fn(&str) -> anyhow::Result<()> + Send + Sync>> =
    OnceCell::new();

/// Replace the active log filter at runtime, e.g. from an admin
/// endpoint. Fails if logging hasn't been initialized yet.
pub fn set_log_filter(new_filter: &str) -> anyhow::Result<()> {
    let func = FILTER_RELOAD_HANDLE
        .get()
        .ok_or_else(|| anyhow::anyhow!("logging has not been initialized"))?;
    (func)(new_filter)
}

#[derive(Debug, Clone, Copy, ValueEnum)]
#[clap(rename_all = "kebab_case")]
pub enum DiagnosticFormat {
    Pretty,
    Full,
    Compact,
    Json,
}

pub struct LoggingConfig {
    pub log_dir: Option<PathBuf>,
    pub format: DiagnosticFormat,
    pub default_filter: String,
    pub tokio_console: bool,
}

impl LoggingConfig {
    /// Initializes the global subscriber and returns the non-blocking
    /// file writer's flush guard, if logging to a file. The caller must
    /// hold onto the guard for the life of the process: dropping it
    /// stops the background flush thread.
    pub fn init(&self) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
        if self.tokio_console {
            tracing::warn!("--tokio-console was requested but this build has no console subscriber wired in");
        }

        let mut guard = None;
        let writer = if let Some(dir) = &self.log_dir {
            let appender = tracing_appender::rolling::hourly(dir, "connectord.log");
            let (non_blocking, flusher) = tracing_appender::non_blocking(appender);
            guard = Some(flusher);
            BoxMakeWriter::new(non_blocking)
        } else {
            BoxMakeWriter::new(std::io::stderr)
        };

        let layer = fmt::layer().with_thread_names(true).with_writer(writer);
        let layer = match self.format {
            DiagnosticFormat::Pretty => layer.pretty().boxed(),
            DiagnosticFormat::Full => layer.boxed(),
            DiagnosticFormat::Compact => layer.compact().boxed(),
            DiagnosticFormat::Json => layer.json().boxed(),
        };

        let env_filter = EnvFilter::try_new(
            std::env::var("CONNECTOR_LOG")
                .as_deref()
                .unwrap_or(&self.default_filter),
        )?;
        let (env_filter, reload_handle) = tracing_subscriber::reload::Layer::new(env_filter);

        tracing_subscriber::registry()
            .with(layer.with_filter(env_filter))
            .init();

        FILTER_RELOAD_HANDLE
            .set(Box::new(move |new_filter: &str| {
                let filter = EnvFilter::try_new(new_filter)
                    .with_context(|| format!("parsing log filter '{new_filter}'"))?;
                reload_handle.reload(filter).context("applying new log filter")
            }))
            .map_err(|_| anyhow::anyhow!("logging was already initialized"))?;

        Ok(guard)
    }
}
