//! Value types shared by every crate in the connector framework: the
//! document identifier, feed record and ACL model, and push-run
//! bookkeeping types.

mod acl;
mod doc_id;
mod metadata;
mod push_state;
mod record;

pub use acl::{Acl, AclBuilder, InheritanceType, NamedPrincipal, Principal, DEFAULT_NAMESPACE};
pub use doc_id::{DocId, DocIdError};
pub use metadata::Metadata;
pub use push_state::{CompletionStatus, PushKind, PushRunState};
pub use record::{AclItem, FeedItem, Record, RecordBuilder};
