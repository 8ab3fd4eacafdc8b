use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::encoder::GroupMembership;
use crate::sender::FeedSender;
use crate::transport::FeedKind;

/// The appliance version gate for group support, per C9.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ApplianceVersion {
    pub major: u32,
    pub minor: u32,
}

impl ApplianceVersion {
    pub fn supports_groups(&self) -> bool {
        *self >= ApplianceVersion { major: 7, minor: 2 }
    }

    pub fn supports_full_group_mode(&self) -> bool {
        *self >= ApplianceVersion { major: 7, minor: 4 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Alias {
    Full1,
    Full2,
}

impl Alias {
    fn other(self) -> Self {
        match self {
            Alias::Full1 => Alias::Full2,
            Alias::Full2 => Alias::Full1,
        }
    }

    fn source_name(self, source: &str) -> String {
        match self {
            Alias::Full1 => format!("{source}-FULL1"),
            Alias::Full2 => format!("{source}-FULL2"),
        }
    }
}

/// Delivers group membership to an appliance, handling the rotating
/// double-buffer protocol required for full replacement feeds that may
/// exceed the appliance's per-feed size cap.
///
/// Alias selection lives only in process memory: a restart may leave
/// stale entries under one alias for a cycle, which is explicitly
/// acceptable.
pub struct GroupPusher {
    sender: Arc<FeedSender>,
    version: ApplianceVersion,
    last_used: DashMap<String, Alias>,
}

impl GroupPusher {
    pub fn new(sender: Arc<FeedSender>, version: ApplianceVersion) -> Self {
        Self {
            sender,
            version,
            last_used: DashMap::new(),
        }
    }

    pub async fn push_incremental(
        &self,
        source: &str,
        memberships: Vec<GroupMembership>,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Option<GroupMembership>> {
        if !self.version.supports_groups() {
            return Ok(memberships.into_iter().next());
        }

        self.sender
            .push_named_resources(source, FeedKind::Incremental, memberships, None, cancel)
            .await
    }

    pub async fn push_full(
        &self,
        source: &str,
        memberships: Vec<GroupMembership>,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Option<GroupMembership>> {
        if !self.version.supports_groups() {
            return Ok(memberships.into_iter().next());
        }

        if !self.version.supports_full_group_mode() {
            return self.push_incremental(source, memberships, cancel).await;
        }

        let previous = self
            .last_used
            .get(source)
            .map(|entry| *entry.value())
            .unwrap_or(Alias::Full2);
        let next = previous.other();

        let active_alias = next.source_name(source);
        if let Some(first_failed) = self
            .sender
            .push_named_resources(&active_alias, FeedKind::Incremental, memberships, None, cancel)
            .await?
        {
            return Ok(Some(first_failed));
        }

        let stale_alias = previous.source_name(source);
        self.sender
            .push_named_resources(&stale_alias, FeedKind::Full, Vec::new(), None, cancel)
            .await?;

        self.last_used.insert(source.to_string(), next);
        Ok(None)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn version_gates() {
        let v71 = ApplianceVersion { major: 7, minor: 1 };
        let v72 = ApplianceVersion { major: 7, minor: 2 };
        let v74 = ApplianceVersion { major: 7, minor: 4 };
        assert!(!v71.supports_groups());
        assert!(v72.supports_groups());
        assert!(!v72.supports_full_group_mode());
        assert!(v74.supports_full_group_mode());
    }

    #[test]
    fn alias_alternates() {
        assert_eq!(Alias::Full1.other(), Alias::Full2);
        assert_eq!(Alias::Full2.other(), Alias::Full1);
        assert_eq!(Alias::Full1.source_name("src"), "src-FULL1");
    }
}
