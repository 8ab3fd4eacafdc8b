use async_trait::async_trait;
use chrono::{DateTime, Utc};
use connector_feed::{AsyncSender, GroupMembership};
use connector_types::DocId;

use crate::doc_response::DocResponse;

/// The outcome of the adaptor's authorization check for one document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthDecision {
    Permit,
    Deny,
    Indeterminate,
}

/// A parsed request for document content, independent of the transport
/// that carried it.
pub struct DocRequest {
    pub doc_id: DocId,
    pub is_head: bool,
    pub if_modified_since: Option<DateTime<Utc>>,
}

/// The contract every content repository plugs in through: full and
/// incremental enumeration, per-document authorization, and content
/// retrieval.
#[async_trait]
pub trait Adaptor: Send + Sync {
    /// Enumerate every document currently known to the repository,
    /// pushing each one to `sink`. Called under the full-push driver's
    /// retry policy.
    async fn enumerate_full(&self, sink: &AsyncSender) -> anyhow::Result<()>;

    /// Enumerate documents that changed since the last successful
    /// incremental run, pushing each to `sink`.
    async fn list_changes(&self, sink: &AsyncSender) -> anyhow::Result<()>;

    /// Decide whether `identity` (absent for an anonymous caller) may
    /// see each of `doc_ids`, in the same order.
    async fn is_user_authorized(
        &self,
        identity: Option<&str>,
        doc_ids: &[DocId],
    ) -> anyhow::Result<Vec<AuthDecision>>;

    /// Populate `response` for `request`. The adaptor may consult
    /// `request.if_modified_since` to call `respond_not_modified`.
    async fn get_doc_content(
        &self,
        request: &DocRequest,
        response: &mut DocResponse,
    ) -> anyhow::Result<()>;

    /// The full set of group memberships currently known to the
    /// repository, for the group-definition pusher. Repositories with
    /// no group concept leave this at its default.
    async fn list_group_memberships(&self) -> anyhow::Result<Vec<GroupMembership>> {
        Ok(Vec::new())
    }
}
