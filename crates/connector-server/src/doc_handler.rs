//! The document-serving HTTP handler (C10): decodes the request path
//! into a `DocId`, runs the authorization gate for non-trusted callers,
//! invokes the adaptor's `get_doc_content`, and frames the response
//! with caching, compression, and the crawl-time header families.

use std::io::Write;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use connector_adaptor::{Adaptor, AuthDecision, ContentTransformer, DocRequest, DocResponse};
use connector_journal::{Journal, Requester};
use connector_types::DocId;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::headers::{format_acl_header, format_anchor_header, format_metadata_header, format_robots_tag};
use crate::lifecycle::{with_watchdog, ShutdownWaiter};
use crate::session::SessionStore;
use crate::trust::{PeerIdentity, TrustClassifier};

pub const SESSION_COOKIE: &str = "connector-session";

/// Everything the handler needs, shared across requests.
#[derive(Clone)]
pub struct DocHandlerState {
    pub adaptor: Arc<dyn Adaptor>,
    pub journal: Arc<Journal>,
    pub sessions: Arc<SessionStore>,
    pub trust: Arc<TrustClassifier>,
    pub shutdown: Arc<ShutdownWaiter>,
    pub base_url: String,
    pub secure: bool,
    pub use_compression: bool,
    pub watchdog_timeout: Duration,
    pub transform_configured: bool,
    pub transform_max_bytes: usize,
    pub transform_required: bool,
    pub transformers: Arc<Vec<Arc<dyn ContentTransformer>>>,
    pub authn_handler: Option<Arc<dyn crate::session::AuthnHandler>>,
}

pub async fn serve_doc(
    State(state): State<DocHandlerState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
) -> Response {
    let Some(_activity) = state.shutdown.processing_starting() else {
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response();
    };

    let timeout = state.watchdog_timeout;
    match with_watchdog(timeout, handle(state, method, uri, headers, remote.ip())).await {
        Ok(response) => response,
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "request exceeded its processing deadline").into_response(),
    }
}

async fn handle(
    state: DocHandlerState,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    remote_ip: IpAddr,
) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let doc_id = match DocId::from_url_path(uri.path(), &state.base_url) {
        Ok(id) => id,
        Err(_) => return StatusCode::NOT_FOUND.into_response(),
    };

    let peer = resolve_peer_identity(state.secure, &headers, remote_ip);
    let trusted = state.trust.is_fully_trusted(&peer);

    if !trusted {
        if let Some(denied) = authorize(&state, &headers, &doc_id).await {
            return denied;
        }
    }

    let started = Instant::now();
    let is_head = method == Method::HEAD;
    let if_modified_since = headers
        .get(axum::http::header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_http_date);

    let request = DocRequest { doc_id: doc_id.clone(), is_head, if_modified_since };
    let mut response = DocResponse::new(
        state.transform_configured,
        state.transform_max_bytes,
        state.transform_required,
    );

    let requester = if trusted { Requester::Appliance } else { Requester::Other };

    if let Err(err) = state.adaptor.get_doc_content(&request, &mut response).await {
        tracing::warn!(doc_id = %doc_id, %err, "adaptor failed to produce document content");
        state.journal.record_request(&doc_id, requester, true, started.elapsed(), 0);
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    if response.is_not_modified() {
        state.journal.record_request(&doc_id, requester, false, started.elapsed(), 0);
        return StatusCode::NOT_MODIFIED.into_response();
    }
    if response.is_not_found() {
        state.journal.record_request(&doc_id, requester, false, started.elapsed(), 0);
        return StatusCode::NOT_FOUND.into_response();
    }

    let content_type = response.content_type().map(str::to_string);
    let robots = format_robots_tag(&response);
    let metadata_header = format_metadata_header(response.metadata());
    let acl_header = response.acl().and_then(format_acl_header);
    let anchor_header = format_anchor_header(response.anchors());
    let has_acl = response.acl().is_some();

    let body = match response.finish(&state.transformers) {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(doc_id = %doc_id, %err, "content transform failed");
            state.journal.record_request(&doc_id, requester, true, started.elapsed(), 0);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let accepts_gzip = headers
        .get(axum::http::header::ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("gzip"))
        .unwrap_or(false);

    let mut builder = Response::builder().status(StatusCode::OK);
    if let Some(ct) = &content_type {
        builder = builder.header(axum::http::header::CONTENT_TYPE, ct);
    }
    if let Some(robots) = &robots {
        builder = builder.header("X-Robots-Tag", robots);
    }
    if trusted {
        builder = builder.header(
            "X-Gsa-Serve-Security",
            if has_acl { "secure" } else { "public" },
        );
        // `Builder::header` appends rather than overwrites, so setting
        // this header twice yields the two occurrences the wire
        // protocol expects: one for metadata, one for the ACL.
        if let Some(metadata_header) = &metadata_header {
            builder = builder.header("X-Gsa-External-Metadata", metadata_header);
        }
        if let Some(acl_header) = &acl_header {
            builder = builder.header("X-Gsa-External-Metadata", acl_header);
        }
        if let Some(anchor_header) = &anchor_header {
            builder = builder.header("X-Gsa-External-Anchor", anchor_header);
        }
    }

    let bytes_produced = if is_head { 0 } else { body.len() as u64 };
    let final_body = if state.use_compression && accepts_gzip && !is_head {
        builder = builder.header(axum::http::header::CONTENT_ENCODING, "gzip");
        match gzip(&body) {
            Ok(compressed) => Bytes::from(compressed),
            Err(err) => {
                tracing::warn!(%err, "gzip compression failed, sending uncompressed body");
                Bytes::from(body)
            }
        }
    } else {
        Bytes::from(body)
    };

    state.journal.record_request(&doc_id, requester, false, started.elapsed(), bytes_produced);

    if is_head {
        builder.body(axum::body::Body::empty()).unwrap().into_response()
    } else {
        builder.body(axum::body::Body::from(final_body)).unwrap().into_response()
    }
}

async fn authorize(state: &DocHandlerState, headers: &HeaderMap, doc_id: &DocId) -> Option<Response> {
    if headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        == Some("SecMgr")
    {
        return Some(StatusCode::FORBIDDEN.into_response());
    }

    let session_token = session_token_from_cookies(headers);
    let identity = session_token.as_deref().and_then(|token| state.sessions.identity(token));

    let decisions = match state
        .adaptor
        .is_user_authorized(identity.as_deref(), std::slice::from_ref(doc_id))
        .await
    {
        Ok(decisions) => decisions,
        Err(err) => {
            tracing::warn!(%doc_id, %err, "adaptor authorization check failed");
            return Some(StatusCode::NOT_FOUND.into_response());
        }
    };
    // No mapping for this doc id defaults to DENY.
    let decision = decisions.into_iter().next().unwrap_or_else(|| {
        tracing::warn!(%doc_id, "no authorization decision for doc id, treating as DENY");
        AuthDecision::Deny
    });

    match decision {
        AuthDecision::Indeterminate => Some(StatusCode::NOT_FOUND.into_response()),
        AuthDecision::Deny => {
            if identity.is_none() {
                if let Some(handler) = &state.authn_handler {
                    let token = session_token.unwrap_or_else(new_session_token);
                    state.sessions.create(&token);
                    return Some(handler.begin_authn(&token));
                }
            }
            Some(StatusCode::FORBIDDEN.into_response())
        }
        AuthDecision::Permit => None,
    }
}

fn new_session_token() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn session_token_from_cookies(headers: &HeaderMap) -> Option<String> {
    let cookie_header = headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
    cookie_header.split(';').find_map(|part| {
        let part = part.trim();
        part.strip_prefix(SESSION_COOKIE)
            .and_then(|rest| rest.strip_prefix('='))
            .map(str::to_string)
    })
}

fn resolve_peer_identity(secure: bool, headers: &HeaderMap, remote_ip: IpAddr) -> PeerIdentity {
    if secure {
        if let Some(cn) = headers
            .get("X-Client-Cert-Cn")
            .and_then(|v| v.to_str().ok())
        {
            return PeerIdentity::TlsCommonName(cn.to_string());
        }
    }
    PeerIdentity::RemoteAddr(remote_ip)
}

fn gzip(body: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body)?;
    encoder.finish()
}

/// Parses `If-Modified-Since`, trying RFC 1123, then RFC 1036, then
/// `asctime()` — the three formats HTTP clients have historically sent.
fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc2822(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(value, "%A, %d-%b-%y %H:%M:%S GMT") {
        return Some(DateTime::from_naive_utc_and_offset(naive, Utc));
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(value, "%a %b %e %H:%M:%S %Y") {
        return Some(DateTime::from_naive_utc_and_offset(naive, Utc));
    }
    None
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_rfc1123() {
        assert!(parse_http_date("Sun, 06 Nov 1994 08:49:37 GMT").is_some());
    }

    #[test]
    fn parses_rfc1036() {
        assert!(parse_http_date("Sunday, 06-Nov-94 08:49:37 GMT").is_some());
    }

    #[test]
    fn parses_asctime() {
        assert!(parse_http_date("Sun Nov  6 08:49:37 1994").is_some());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_http_date("not a date").is_none());
    }

    #[test]
    fn session_token_extracted_from_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("other=1; connector-session=abc123; more=2"),
        );
        assert_eq!(session_token_from_cookies(&headers), Some("abc123".to_string()));
    }

    #[test]
    fn no_cookie_header_yields_no_token() {
        assert_eq!(session_token_from_cookies(&HeaderMap::new()), None);
    }
}
