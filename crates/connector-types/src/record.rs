use chrono::{DateTime, Utc};

use crate::acl::Acl;
use crate::doc_id::DocId;
use crate::metadata::Metadata;

/// An immutable feed entry describing a single document to push to the
/// appliance.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    doc_id: DocId,
    last_modified: Option<DateTime<Utc>>,
    result_link: Option<String>,
    delete: bool,
    crawl_immediately: bool,
    crawl_once: bool,
    lock: bool,
    no_follow: bool,
    metadata: Option<Metadata>,
    acl: Option<Acl>,
}

impl Record {
    pub fn builder(doc_id: DocId) -> RecordBuilder {
        RecordBuilder::new(doc_id)
    }

    pub fn doc_id(&self) -> &DocId {
        &self.doc_id
    }

    pub fn last_modified(&self) -> Option<&DateTime<Utc>> {
        self.last_modified.as_ref()
    }

    pub fn result_link(&self) -> Option<&str> {
        self.result_link.as_deref()
    }

    pub fn delete(&self) -> bool {
        self.delete
    }

    pub fn crawl_immediately(&self) -> bool {
        self.crawl_immediately
    }

    pub fn crawl_once(&self) -> bool {
        self.crawl_once
    }

    pub fn lock(&self) -> bool {
        self.lock
    }

    pub fn no_follow(&self) -> bool {
        self.no_follow
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    pub fn acl(&self) -> Option<&Acl> {
        self.acl.as_ref()
    }
}

pub struct RecordBuilder {
    doc_id: DocId,
    last_modified: Option<DateTime<Utc>>,
    result_link: Option<String>,
    delete: bool,
    crawl_immediately: bool,
    crawl_once: bool,
    lock: bool,
    no_follow: bool,
    metadata: Option<Metadata>,
    acl: Option<Acl>,
}

impl RecordBuilder {
    pub fn new(doc_id: DocId) -> Self {
        Self {
            doc_id,
            last_modified: None,
            result_link: None,
            delete: false,
            crawl_immediately: false,
            crawl_once: false,
            lock: false,
            no_follow: false,
            metadata: None,
            acl: None,
        }
    }

    pub fn last_modified(mut self, ts: DateTime<Utc>) -> Self {
        self.last_modified = Some(ts);
        self
    }

    pub fn result_link(mut self, link: impl Into<String>) -> Self {
        self.result_link = Some(link.into());
        self
    }

    pub fn delete(mut self, value: bool) -> Self {
        self.delete = value;
        self
    }

    pub fn crawl_immediately(mut self, value: bool) -> Self {
        self.crawl_immediately = value;
        self
    }

    pub fn crawl_once(mut self, value: bool) -> Self {
        self.crawl_once = value;
        self
    }

    pub fn lock(mut self, value: bool) -> Self {
        self.lock = value;
        self
    }

    pub fn no_follow(mut self, value: bool) -> Self {
        self.no_follow = value;
        self
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn acl(mut self, acl: Acl) -> Self {
        self.acl = Some(acl);
        self
    }

    pub fn build(self) -> Record {
        Record {
            doc_id: self.doc_id,
            last_modified: self.last_modified,
            result_link: self.result_link,
            delete: self.delete,
            crawl_immediately: self.crawl_immediately,
            crawl_once: self.crawl_once,
            lock: self.lock,
            no_follow: self.no_follow,
            metadata: self.metadata,
            acl: self.acl,
        }
    }
}

/// A `DocId` plus an `Acl`, existing purely to carry inheritance
/// information for a node that has no content of its own.
#[derive(Clone, Debug, PartialEq)]
pub struct AclItem {
    doc_id: DocId,
    acl: Acl,
}

impl AclItem {
    pub fn new(doc_id: DocId, acl: Acl) -> Self {
        Self { doc_id, acl }
    }

    pub fn doc_id(&self) -> &DocId {
        &self.doc_id
    }

    pub fn acl(&self) -> &Acl {
        &self.acl
    }
}

/// A single item in a feed batch: either a full record or a
/// content-less ACL entry.
#[derive(Clone, Debug, PartialEq)]
pub enum FeedItem {
    Record(Record),
    AclItem(AclItem),
}

impl FeedItem {
    pub fn doc_id(&self) -> &DocId {
        match self {
            FeedItem::Record(r) => r.doc_id(),
            FeedItem::AclItem(a) => a.doc_id(),
        }
    }
}

impl From<Record> for FeedItem {
    fn from(r: Record) -> Self {
        FeedItem::Record(r)
    }
}

impl From<AclItem> for FeedItem {
    fn from(a: AclItem) -> Self {
        FeedItem::AclItem(a)
    }
}
