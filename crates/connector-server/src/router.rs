//! Assembles the axum `Router` for the document-serving handler (C10)
//! plus the trusted-only `/metrics` endpoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use connector_adaptor::{Adaptor, ContentTransformer};
use connector_journal::Journal;

use crate::doc_handler::{serve_doc, DocHandlerState};
use crate::lifecycle::ShutdownWaiter;
use crate::session::{AuthnHandler, SessionStore};
use crate::trust::TrustClassifier;

pub struct RouterConfig {
    pub base_url: String,
    pub secure: bool,
    pub use_compression: bool,
    pub watchdog_timeout: Duration,
    pub transform_configured: bool,
    pub transform_max_bytes: usize,
    pub transform_required: bool,
}

/// Build the complete router: every GET/HEAD request falls through to
/// the document handler (the appliance only ever requests escaped doc
/// paths under `base_url`), with a dedicated `/metrics` endpoint for
/// operational scraping.
pub fn build_router(
    adaptor: Arc<dyn Adaptor>,
    journal: Arc<Journal>,
    sessions: Arc<SessionStore>,
    trust: Arc<TrustClassifier>,
    shutdown: Arc<ShutdownWaiter>,
    transformers: Vec<Arc<dyn ContentTransformer>>,
    authn_handler: Option<Arc<dyn AuthnHandler>>,
    config: RouterConfig,
) -> Router {
    let state = DocHandlerState {
        adaptor,
        journal,
        sessions,
        trust,
        shutdown,
        base_url: config.base_url,
        secure: config.secure,
        use_compression: config.use_compression,
        watchdog_timeout: config.watchdog_timeout,
        transform_configured: config.transform_configured,
        transform_max_bytes: config.transform_max_bytes,
        transform_required: config.transform_required,
        transformers: Arc::new(transformers),
        authn_handler,
    };

    Router::new()
        .route("/metrics", get(report_metrics))
        .fallback(serve_doc)
        .with_state(state)
}

async fn report_metrics() -> impl IntoResponse {
    match prometheus::TextEncoder::new().encode_to_string(&prometheus::default_registry().gather()) {
        Ok(body) => body.into_response(),
        Err(err) => (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to encode metrics: {err}"),
        )
            .into_response(),
    }
}

/// Bind and serve `router` on `addr`, returning the join handle for the
/// server task so the caller can await it at shutdown.
pub fn spawn(router: Router, addr: SocketAddr) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let listener = std::net::TcpListener::bind(addr)
        .map_err(|err| anyhow::anyhow!("binding {addr}: {err}"))?;
    let server = axum_server::from_tcp(listener);
    Ok(tokio::spawn(async move {
        if let Err(err) = server
            .serve(router.into_make_service_with_connect_info::<SocketAddr>())
            .await
        {
            tracing::error!(%err, "http server exited");
        }
    }))
}
