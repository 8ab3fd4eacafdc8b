//! The command-line adaptor protocol (spec.md §6): a framing for
//! adaptor processes that communicate over stdio instead of linking
//! the `Adaptor` trait directly. The stream opens with a header line
//! `GSA Adaptor Data Version 1 [<delim>]` that announces a delimiter
//! byte sequence, followed by `command=argument` records separated by
//! that delimiter. `content` is terminal: every byte after it, to the
//! end of the stream, is the document body.
//!
//! This module is the wire-level parser/encoder plus a thin `Adaptor`
//! implementation that drives a subprocess speaking it, using
//! `tokio::process::Command` to spawn a child and pipe its stdio.

use std::collections::HashMap;
use std::process::Stdio;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command as ChildCommand;

use connector_feed::AsyncSender;
use connector_types::{DocId, Record};

use crate::adaptor::{Adaptor, AuthDecision, DocRequest};
use crate::doc_response::DocResponse;

const HEADER_PREFIX: &str = "GSA Adaptor Data Version 1 [";
/// Bytes the protocol forbids inside a delimiter, so that a delimiter
/// can never be confused with a `key=value` record or the header's own
/// punctuation.
const RESERVED_DELIM_BYTES: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789:/-_ =+[]";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CmdlineError {
    #[error("stream does not start with the `{HEADER_PREFIX}` header")]
    MissingHeader,
    #[error("header is missing its closing `]`")]
    UnterminatedHeader,
    #[error("delimiter contains a reserved byte")]
    ReservedDelimiterByte,
    #[error("record is not valid UTF-8")]
    InvalidUtf8,
}

/// One parsed `command=argument` (or bare `command`) record. Unknown
/// commands are dropped during parsing (with a logged warning), so
/// every variant here is one the protocol actually defines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Id(String),
    IdList,
    MetaName(String),
    MetaValue(String),
    LastModified(String),
    ResultLink(String),
    CrawlImmediately,
    CrawlOnce,
    Lock,
    Delete,
    UpToDate,
    NotFound,
    MimeType(String),
    AuthzStatus(AuthDecision),
    User(String),
    Password(String),
    Group(String),
    RepositoryUnavailable(String),
}

/// The result of parsing one framed message: the records that preceded
/// `content` (if any), plus the raw content bytes that ran to the end
/// of the stream.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedFrame {
    pub commands: Vec<Command>,
    pub content: Option<Vec<u8>>,
}

fn validate_delimiter(delim: &[u8]) -> Result<(), CmdlineError> {
    if delim.iter().any(|b| RESERVED_DELIM_BYTES.contains(b)) {
        return Err(CmdlineError::ReservedDelimiterByte);
    }
    Ok(())
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Split the stream into `(delimiter, body)`, validating the header.
fn split_header(input: &[u8]) -> Result<(Vec<u8>, &[u8]), CmdlineError> {
    let prefix = HEADER_PREFIX.as_bytes();
    if !input.starts_with(prefix) {
        return Err(CmdlineError::MissingHeader);
    }
    let rest = &input[prefix.len()..];
    let close = rest
        .iter()
        .position(|&b| b == b']')
        .ok_or(CmdlineError::UnterminatedHeader)?;
    let delim = rest[..close].to_vec();
    validate_delimiter(&delim)?;

    let mut body_start = close + 1;
    while body_start < rest.len() && matches!(rest[body_start], b'\n' | b'\r') {
        body_start += 1;
    }
    Ok((delim, &rest[body_start..]))
}

fn parse_command(record: &str) -> Option<Command> {
    if let Some((key, value)) = record.split_once('=') {
        match key {
            "id" => Some(Command::Id(value.to_string())),
            "meta-name" => Some(Command::MetaName(value.to_string())),
            "meta-value" => Some(Command::MetaValue(value.to_string())),
            "last-modified" => Some(Command::LastModified(value.to_string())),
            "result-link" => Some(Command::ResultLink(value.to_string())),
            "mime-type" => Some(Command::MimeType(value.to_string())),
            "authz-status" => match value {
                "PERMIT" => Some(Command::AuthzStatus(AuthDecision::Permit)),
                "DENY" => Some(Command::AuthzStatus(AuthDecision::Deny)),
                "INDETERMINATE" => Some(Command::AuthzStatus(AuthDecision::Indeterminate)),
                _ => None,
            },
            "user" => Some(Command::User(value.to_string())),
            "password" => Some(Command::Password(value.to_string())),
            "group" => Some(Command::Group(value.to_string())),
            "repository-unavailable" => Some(Command::RepositoryUnavailable(value.to_string())),
            _ => None,
        }
    } else {
        match record {
            "id-list" => Some(Command::IdList),
            "crawl-immediately" => Some(Command::CrawlImmediately),
            "crawl-once" => Some(Command::CrawlOnce),
            "lock" => Some(Command::Lock),
            "delete" => Some(Command::Delete),
            "up-to-date" => Some(Command::UpToDate),
            "not-found" => Some(Command::NotFound),
            _ => None,
        }
    }
}

/// Parse a complete framed message: header, then delimiter-separated
/// `command=argument` records, with `content` (if present) terminal.
pub fn parse_frame(input: &[u8]) -> Result<ParsedFrame, CmdlineError> {
    let (delim, body) = split_header(input)?;
    let mut frame = ParsedFrame::default();
    let mut pos = 0;

    while pos < body.len() {
        let (token, next_pos) = match find_subslice(&body[pos..], &delim) {
            Some(offset) => (&body[pos..pos + offset], pos + offset + delim.len()),
            None => (&body[pos..], body.len()),
        };

        let record = std::str::from_utf8(token).map_err(|_| CmdlineError::InvalidUtf8)?;
        if record == "content" {
            frame.content = Some(body[next_pos..].to_vec());
            return Ok(frame);
        }
        match parse_command(record) {
            Some(cmd) => frame.commands.push(cmd),
            None => tracing::warn!(record, "unknown command-line adaptor record, skipping"),
        }
        pos = next_pos;
    }

    Ok(frame)
}

/// Encode a set of records (and, optionally, trailing content bytes)
/// into a framed message using a fixed delimiter. Used by the
/// framework side to issue requests to a stdio adaptor subprocess.
pub fn encode_frame(delim: &[u8], records: &[String]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(HEADER_PREFIX.as_bytes());
    out.extend_from_slice(delim);
    out.push(b']');
    out.push(b'\n');
    for (i, record) in records.iter().enumerate() {
        if i > 0 {
            out.extend_from_slice(delim);
        }
        out.extend_from_slice(record.as_bytes());
    }
    out
}

/// Default delimiter used when talking to a subprocess: a byte
/// sequence guaranteed disjoint from `RESERVED_DELIM_BYTES`.
pub const DEFAULT_DELIMITER: &[u8] = &[0x00, 0x01];

/// Drives a subprocess adaptor over stdio using the command-line
/// protocol. Each call spawns a fresh process with `id=<doc id>`
/// (content requests) or `id-list` (enumeration requests) written to
/// its stdin, and parses its stdout as one framed response.
///
/// A short-lived `tokio::process::Child` per invocation rather than a
/// long-lived worker, because the protocol itself has no multiplexing
/// support.
pub struct CmdlineAdaptor {
    program: std::path::PathBuf,
    args: Vec<String>,
}

impl CmdlineAdaptor {
    pub fn new(program: impl Into<std::path::PathBuf>, args: Vec<String>) -> Self {
        Self { program: program.into(), args }
    }

    async fn invoke(&self, request: &str) -> anyhow::Result<ParsedFrame> {
        let mut child = ChildCommand::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;

        let mut stdin = child.stdin.take().expect("stdin was piped");
        let frame = encode_frame(DEFAULT_DELIMITER, &[request.to_string()]);
        stdin.write_all(&frame).await?;
        drop(stdin);

        let mut stdout = child.stdout.take().expect("stdout was piped");
        let mut buf = Vec::new();
        stdout.read_to_end(&mut buf).await?;
        child.wait().await?;

        Ok(parse_frame(&buf)?)
    }
}

#[async_trait]
impl Adaptor for CmdlineAdaptor {
    async fn enumerate_full(&self, sink: &AsyncSender) -> anyhow::Result<()> {
        let frame = self.invoke("id-list").await?;
        for command in frame.commands {
            if let Command::Id(id) = command {
                if let Ok(doc_id) = DocId::new(id) {
                    sink.enqueue(Record::builder(doc_id).build().into());
                }
            }
        }
        Ok(())
    }

    async fn list_changes(&self, sink: &AsyncSender) -> anyhow::Result<()> {
        self.enumerate_full(sink).await
    }

    async fn is_user_authorized(
        &self,
        _identity: Option<&str>,
        doc_ids: &[DocId],
    ) -> anyhow::Result<Vec<AuthDecision>> {
        let mut decisions = Vec::with_capacity(doc_ids.len());
        for doc_id in doc_ids {
            let frame = self.invoke(&format!("id={}", doc_id.as_str())).await?;
            let decision = frame
                .commands
                .into_iter()
                .find_map(|c| match c {
                    Command::AuthzStatus(d) => Some(d),
                    _ => None,
                })
                .unwrap_or(AuthDecision::Indeterminate);
            decisions.push(decision);
        }
        Ok(decisions)
    }

    async fn get_doc_content(
        &self,
        request: &DocRequest,
        response: &mut DocResponse,
    ) -> anyhow::Result<()> {
        let frame = self.invoke(&format!("id={}", request.doc_id.as_str())).await?;

        let mut meta_names: Vec<String> = Vec::new();
        let mut meta_values: Vec<String> = Vec::new();
        let mut mime_type: Option<String> = None;
        let mut last_modified: Option<DateTime<Utc>> = None;

        for command in &frame.commands {
            match command {
                Command::NotFound => {
                    response.respond_not_found()?;
                    return Ok(());
                }
                Command::UpToDate => {
                    response.respond_not_modified()?;
                    return Ok(());
                }
                Command::MimeType(mime) => mime_type = Some(mime.clone()),
                Command::MetaName(name) => meta_names.push(name.clone()),
                Command::MetaValue(value) => meta_values.push(value.clone()),
                Command::LastModified(raw) => {
                    last_modified = DateTime::parse_from_rfc2822(raw)
                        .ok()
                        .map(|dt| dt.with_timezone(&Utc));
                }
                _ => {}
            }
        }

        if let (Some(since), Some(modified)) = (request.if_modified_since, last_modified) {
            if modified <= since {
                response.respond_not_modified()?;
                return Ok(());
            }
        }

        if let Some(mime) = mime_type {
            response.set_content_type(mime)?;
        }
        for (name, value) in meta_names.into_iter().zip(meta_values.into_iter()) {
            response.add_metadata(name, value)?;
        }

        let mode = response.get_output_stream(request.is_head)?;
        if mode != crate::doc_response::OutputMode::Head {
            if let Some(content) = frame.content {
                response.write_body_chunk(&content)?;
            }
        }
        Ok(())
    }
}

/// Build a lookup of the metadata key/value pairs carried by a parsed
/// frame's `meta-name=`/`meta-value=` record pairs, in record order.
pub fn metadata_pairs(frame: &ParsedFrame) -> HashMap<String, Vec<String>> {
    let mut pending_name: Option<String> = None;
    let mut out: HashMap<String, Vec<String>> = HashMap::new();
    for command in &frame.commands {
        match command {
            Command::MetaName(name) => pending_name = Some(name.clone()),
            Command::MetaValue(value) => {
                if let Some(name) = pending_name.take() {
                    out.entry(name).or_default().push(value.clone());
                }
            }
            _ => {}
        }
    }
    out
}
