//! The document-serving HTTP side of the connector framework: trust
//! classification, the session store, the authorization gate and
//! content-delivery handler (C10), and the watchdog/shutdown waiter
//! (C11) that bounds request duration and drains in-flight work.

mod doc_handler;
mod headers;
mod lifecycle;
mod router;
mod session;
mod trust;

pub use doc_handler::{DocHandlerState, SESSION_COOKIE};
pub use headers::{format_acl_header, format_anchor_header, format_metadata_header, format_robots_tag};
pub use lifecycle::{with_watchdog, Activity, ShutdownWaiter, WatchdogError};
pub use router::{build_router, spawn, RouterConfig};
pub use session::{AuthnHandler, Session, SessionStore};
pub use trust::{PeerIdentity, TrustClassifier};
