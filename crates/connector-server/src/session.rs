//! The session store: a map from session token to session, mutated
//! only under a per-session lock via a `DashMap`-keyed handle-resolution
//! pattern.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

/// One browser/crawler session. `identity` is populated once an
/// authentication flow (SAML or otherwise) completes; it starts `None`
/// for an anonymous caller.
#[derive(Clone, Debug, Default)]
pub struct Session {
    pub identity: Option<String>,
}

/// Holds every live session, keyed by an opaque token (e.g. a cookie
/// value). The identity-provider integration that populates
/// `identity` lives outside this crate's scope; this store only
/// tracks the mapping.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<String, Arc<Mutex<Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the session for `token`, if one exists.
    pub fn get(&self, token: &str) -> Option<Arc<Mutex<Session>>> {
        self.sessions.get(token).map(|entry| entry.value().clone())
    }

    /// Create (or replace) a session for `token`.
    pub fn create(&self, token: impl Into<String>) -> Arc<Mutex<Session>> {
        let session = Arc::new(Mutex::new(Session::default()));
        self.sessions.insert(token.into(), session.clone());
        session
    }

    pub fn remove(&self, token: &str) {
        self.sessions.remove(token);
    }

    /// The authenticated identity for `token`, if a session exists and
    /// has completed authentication.
    pub fn identity(&self, token: &str) -> Option<String> {
        self.get(token).and_then(|session| session.lock().identity.clone())
    }
}

/// External collaborator that begins an out-of-band authentication flow
/// (SAML, in the original system) for a caller who was denied access
/// with no established identity. Specified only by interface: the
/// dashboard/SAML glue that implements this lives outside this crate.
pub trait AuthnHandler: Send + Sync {
    /// Produce the response that starts the authentication flow for
    /// `session_token` (e.g. a redirect to an identity provider).
    fn begin_authn(&self, session_token: &str) -> axum::response::Response;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn create_then_lookup_round_trips() {
        let store = SessionStore::new();
        let session = store.create("tok1");
        session.lock().identity = Some("alice".to_string());
        assert_eq!(store.identity("tok1"), Some("alice".to_string()));
    }

    #[test]
    fn missing_session_has_no_identity() {
        let store = SessionStore::new();
        assert_eq!(store.identity("nope"), None);
    }

    #[test]
    fn remove_drops_the_session() {
        let store = SessionStore::new();
        store.create("tok1");
        store.remove("tok1");
        assert!(store.get("tok1").is_none());
    }
}
