//! A small filesystem-backed `Adaptor`, bundled so the daemon is
//! runnable end to end out of the box. Real deployments replace this
//! with a repository-specific plugin; this one treats every regular
//! file under a root directory as a document, keyed by its path
//! relative to that root.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use connector_adaptor::{Adaptor, AuthDecision, DocRequest, DocResponse};
use connector_feed::{AsyncSender, GroupMembership};
use connector_types::{DocId, NamedPrincipal, Principal, Record};

pub struct FilesystemAdaptor {
    root: PathBuf,
    last_incremental_run: AtomicI64,
}

impl FilesystemAdaptor {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            last_incremental_run: AtomicI64::new(0),
        }
    }

    fn doc_path(&self, doc_id: &DocId) -> PathBuf {
        self.root.join(doc_id.as_str())
    }

    fn walk(root: &Path) -> Vec<PathBuf> {
        let mut out = Vec::new();
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else if path.is_file() {
                    out.push(path);
                }
            }
        }
        out
    }

    fn to_doc_id(&self, path: &Path) -> Option<DocId> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let id = relative.to_str()?.replace(std::path::MAIN_SEPARATOR, "/");
        DocId::new(id).ok()
    }

    fn content_type_for(path: &Path) -> &'static str {
        match path.extension().and_then(|e| e.to_str()) {
            Some("html") | Some("htm") => "text/html",
            Some("txt") | Some("md") => "text/plain",
            Some("json") => "application/json",
            Some("pdf") => "application/pdf",
            _ => "application/octet-stream",
        }
    }
}

#[async_trait]
impl Adaptor for FilesystemAdaptor {
    async fn enumerate_full(&self, sink: &AsyncSender) -> anyhow::Result<()> {
        let root = self.root.clone();
        let paths = tokio::task::spawn_blocking(move || Self::walk(&root)).await?;
        for path in paths {
            let Some(doc_id) = self.to_doc_id(&path) else {
                continue;
            };
            let modified = std::fs::metadata(&path)
                .and_then(|m| m.modified())
                .ok()
                .and_then(system_time_to_utc);
            let mut record = Record::builder(doc_id);
            if let Some(modified) = modified {
                record = record.last_modified(modified);
            }
            sink.enqueue(record.build().into());
        }
        self.last_incremental_run
            .store(Utc::now().timestamp(), Ordering::Relaxed);
        Ok(())
    }

    async fn list_changes(&self, sink: &AsyncSender) -> anyhow::Result<()> {
        let since = self.last_incremental_run.load(Ordering::Relaxed);
        let root = self.root.clone();
        let paths = tokio::task::spawn_blocking(move || Self::walk(&root)).await?;
        for path in paths {
            let Ok(metadata) = std::fs::metadata(&path) else {
                continue;
            };
            let Some(modified) = metadata.modified().ok().and_then(system_time_to_utc) else {
                continue;
            };
            if modified.timestamp() <= since {
                continue;
            }
            let Some(doc_id) = self.to_doc_id(&path) else {
                continue;
            };
            let record = Record::builder(doc_id).last_modified(modified).build();
            sink.enqueue(record.into());
        }
        self.last_incremental_run
            .store(Utc::now().timestamp(), Ordering::Relaxed);
        Ok(())
    }

    async fn is_user_authorized(
        &self,
        _identity: Option<&str>,
        doc_ids: &[DocId],
    ) -> anyhow::Result<Vec<AuthDecision>> {
        // Every document under the root is world-readable in this demo
        // adaptor; a real plugin would consult its own ACL source.
        Ok(doc_ids.iter().map(|_| AuthDecision::Permit).collect())
    }

    async fn get_doc_content(
        &self,
        request: &DocRequest,
        response: &mut DocResponse,
    ) -> anyhow::Result<()> {
        let path = self.doc_path(&request.doc_id);
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(_) => {
                response.respond_not_found()?;
                return Ok(());
            }
        };

        if let Some(modified) = metadata.modified().ok().and_then(system_time_to_utc) {
            if let Some(since) = request.if_modified_since {
                if modified <= since {
                    response.respond_not_modified()?;
                    return Ok(());
                }
            }
        }

        response.set_content_type(Self::content_type_for(&path))?;

        let mode = response.get_output_stream(request.is_head)?;
        if mode == connector_adaptor::OutputMode::Head {
            return Ok(());
        }

        let bytes = tokio::fs::read(&path).await?;
        response.write_body_chunk(&bytes)?;
        Ok(())
    }

    async fn list_group_memberships(&self) -> anyhow::Result<Vec<GroupMembership>> {
        // One group per top-level subdirectory; its members are the
        // files directly inside it, named by their path relative to
        // the root. A real plugin would consult its own group source.
        let root = self.root.clone();
        let root_for_ids = self.root.clone();
        let memberships = tokio::task::spawn_blocking(move || {
            let mut groups = Vec::new();
            let Ok(entries) = std::fs::read_dir(&root) else {
                return groups;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_dir() {
                    continue;
                }
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                let members = Self::walk(&path)
                    .into_iter()
                    .filter_map(|file| {
                        let relative = file.strip_prefix(&root_for_ids).ok()?;
                        let id = relative.to_str()?.replace(std::path::MAIN_SEPARATOR, "/");
                        Some(Principal::User(NamedPrincipal::new(id)))
                    })
                    .collect();
                groups.push(GroupMembership {
                    group: NamedPrincipal::new(name.to_string()),
                    members,
                });
            }
            groups
        })
        .await?;
        Ok(memberships)
    }
}

fn system_time_to_utc(time: SystemTime) -> Option<DateTime<Utc>> {
    Some(DateTime::<Utc>::from(time))
}

#[cfg(test)]
mod test {
    use super::*;
    use connector_feed::{FeedKind, FeedSender, FeedSenderConfig, FeedTransport, NullObserver};
    use connector_retry::LinearBackoffRetryPolicy;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn test_sink() -> Arc<AsyncSender> {
        let sender = FeedSender::new(
            FeedTransport::new("http://127.0.0.1:1/feed".parse().unwrap()).unwrap(),
            FeedSenderConfig {
                datasource: "test".into(),
                base_url: "/docs/".into(),
                max_batch_size: 10,
                mark_all_docs_as_public: false,
            },
            Arc::new(LinearBackoffRetryPolicy::default()),
            Arc::new(NullObserver),
            None,
        );
        let (async_sender, _handle) = AsyncSender::spawn(
            Arc::new(sender),
            connector_feed::AsyncSenderConfig {
                queue_capacity: 64,
                max_batch_size: 10,
                max_latency: std::time::Duration::from_millis(50),
                feedtype: FeedKind::Full,
            },
            CancellationToken::new(),
        );
        Arc::new(async_sender)
    }

    #[tokio::test]
    async fn enumerates_files_under_root() {
        let dir = tempdir();
        std::fs::write(dir.join("a.txt"), b"hello").unwrap();
        std::fs::create_dir(dir.join("sub")).unwrap();
        std::fs::write(dir.join("sub/b.txt"), b"world").unwrap();

        let adaptor = FilesystemAdaptor::new(dir.clone());
        let sink = test_sink();
        adaptor.enumerate_full(&sink).await.unwrap();

        let doc_id = adaptor.to_doc_id(&dir.join("sub/b.txt")).unwrap();
        assert_eq!(doc_id.as_str(), "sub/b.txt");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn top_level_directories_become_groups() {
        let dir = tempdir();
        std::fs::create_dir(dir.join("team-a")).unwrap();
        std::fs::write(dir.join("team-a/one.txt"), b"1").unwrap();
        std::fs::write(dir.join("team-a/two.txt"), b"2").unwrap();
        std::fs::write(dir.join("loose.txt"), b"3").unwrap();

        let adaptor = FilesystemAdaptor::new(dir.clone());
        let memberships = adaptor.list_group_memberships().await.unwrap();

        assert_eq!(memberships.len(), 1);
        assert_eq!(memberships[0].group.name, "team-a");
        assert_eq!(memberships[0].members.len(), 2);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn get_doc_content_reads_file_bytes() {
        let dir = tempdir();
        std::fs::write(dir.join("doc.txt"), b"payload").unwrap();
        let adaptor = FilesystemAdaptor::new(dir.clone());

        let doc_id = DocId::new("doc.txt").unwrap();
        let request = DocRequest {
            doc_id: doc_id.clone(),
            is_head: false,
            if_modified_since: None,
        };
        let mut response = DocResponse::new(false, 1024, false);
        adaptor.get_doc_content(&request, &mut response).await.unwrap();
        let body = response.finish(&[]).unwrap();
        assert_eq!(body, b"payload".to_vec());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn missing_file_yields_not_found() {
        let dir = tempdir();
        let adaptor = FilesystemAdaptor::new(dir.clone());
        let doc_id = DocId::new("missing.txt").unwrap();
        let request = DocRequest { doc_id, is_head: false, if_modified_since: None };
        let mut response = DocResponse::new(false, 1024, false);
        adaptor.get_doc_content(&request, &mut response).await.unwrap();
        assert!(response.is_not_found());

        std::fs::remove_dir_all(&dir).ok();
    }

    fn tempdir() -> PathBuf {
        static COUNTER: std::sync::atomic::AtomicU32 = std::sync::atomic::AtomicU32::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!(
            "connectord-fs-adaptor-test-{}-{n}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
