use std::io::Write;
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use thiserror::Error;

const GZIP_THRESHOLD_BYTES: usize = 1024 * 1024;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("i/o error sending feed: {0}")]
    Io(#[from] reqwest::Error),
    #[error("appliance rejected the feed: sender is not on the trusted-feeders list")]
    FatalUnauthorized,
    #[error("appliance returned a non-success reply: {body}")]
    Other { body: String },
}

/// Which of the appliance's three feed shapes this push uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeedKind {
    MetadataAndUrl,
    Incremental,
    Full,
}

impl FeedKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FeedKind::MetadataAndUrl => "metadata-and-url",
            FeedKind::Incremental => "incremental",
            FeedKind::Full => "full",
        }
    }
}

/// Posts a constructed feed payload to the appliance's feed endpoint as
/// `multipart/form-data`.
pub struct FeedTransport {
    client: reqwest::Client,
    feed_endpoint: reqwest::Url,
}

impl FeedTransport {
    pub fn new(feed_endpoint: reqwest::Url) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self { client, feed_endpoint })
    }

    /// `source_part` is `"datasource"` for a metadata-and-url/content
    /// feed or `"groupsource"` for a groups feed.
    pub async fn send(
        &self,
        source_part: &'static str,
        source_name: &str,
        feedtype: FeedKind,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        let data_part = if payload.len() < GZIP_THRESHOLD_BYTES {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder
                .write_all(&payload)
                .expect("writing into an in-memory buffer cannot fail");
            let compressed = encoder
                .finish()
                .expect("writing into an in-memory buffer cannot fail");
            reqwest::multipart::Part::bytes(compressed)
                .file_name("data.gz")
                .mime_str("application/x-gzip")?
        } else {
            reqwest::multipart::Part::bytes(payload)
                .file_name("data.xml")
                .mime_str("text/xml")?
        };

        let form = reqwest::multipart::Form::new()
            .text(source_part, source_name.to_string())
            .text("feedtype", feedtype.as_str())
            .part("data", data_part);

        let response = self
            .client
            .post(self.feed_endpoint.clone())
            .multipart(form)
            .send()
            .await?;

        let body = response.text().await?;
        classify_reply(&body)
    }
}

fn classify_reply(body: &str) -> Result<(), TransportError> {
    if body.eq_ignore_ascii_case("success") {
        return Ok(());
    }
    match body {
        "Error - Unauthorized Request" => Err(TransportError::FatalUnauthorized),
        other => Err(TransportError::Other { body: other.to_string() }),
    }
}
