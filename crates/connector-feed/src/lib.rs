//! Feed construction and delivery: the XML encoder (C2), the
//! multipart/gzip transport (C3), the batching sender (C5), the bounded
//! async queue worker (C6), and the group-definition pusher (C9).

mod async_sender;
mod encoder;
mod group_pusher;
mod observer;
mod sender;
mod transport;

pub use async_sender::{AsyncSender, AsyncSenderConfig};
pub use encoder::{encode_groups_feed, encode_metadata_and_url_feed, EncodeError, GroupMembership};
pub use group_pusher::{ApplianceVersion, GroupPusher};
pub use observer::{ArchiveOutcome, FailureKind, FeedArchiver, NullObserver, PushObserver};
pub use sender::{no_retry_handler, FeedSender, FeedSenderConfig};
pub use transport::{FeedKind, FeedTransport, TransportError};
