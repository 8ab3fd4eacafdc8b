use std::sync::Arc;

use connector_types::{Acl, Metadata};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResponseError {
    #[error("illegal state: {0} is not allowed once the response has left SETUP")]
    IllegalState(&'static str),
    #[error("transform pipeline exceeded transformMaxBytes and transform is required")]
    TransformOverflow,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StateKind {
    Setup,
    NotModified,
    NotFound,
    Head,
    NoTransform,
    Transform,
}

/// How the caller should stream the document body, decided by
/// `get_output_stream`.
#[derive(Debug, PartialEq, Eq)]
pub enum OutputMode {
    /// Request method was HEAD: send headers only.
    Head,
    /// No transform is configured: stream the body directly.
    Direct,
    /// Buffer up to `max_bytes`, then run the transform.
    Buffered { max_bytes: usize, required: bool },
}

/// What happened when the caller tried to write another chunk into a
/// buffered (transforming) response.
#[derive(Debug, PartialEq, Eq)]
pub enum TransformWrite {
    Buffered,
    /// The buffer would have exceeded `transformMaxBytes`; the
    /// transform was bypassed and the chunk is delivered as-is.
    BypassedTooLarge,
}

/// An ordered filter applied to document bytes before they leave the
/// handler. Filters run in reverse declaration order, so the
/// first-configured transform is outermost.
pub trait ContentTransformer: Send + Sync {
    fn transform(&self, input: &[u8]) -> anyhow::Result<Vec<u8>>;
}

/// The small state machine the document-serving handler (C10) drives
/// while the adaptor populates a response to `getDocContent`.
///
/// Every mutator below is only valid in `SETUP`; calling one after a
/// terminal transition fails with `IllegalState`.
pub struct DocResponse {
    state: StateKind,
    content_type: Option<String>,
    metadata: Metadata,
    acl: Option<Acl>,
    no_index: bool,
    no_follow: bool,
    no_archive: bool,
    anchors: Vec<(Option<String>, String)>,
    transform_configured: bool,
    transform_max_bytes: usize,
    transform_required: bool,
    transform_bypassed: bool,
    output: Vec<u8>,
}

impl DocResponse {
    pub fn new(transform_configured: bool, transform_max_bytes: usize, transform_required: bool) -> Self {
        Self {
            state: StateKind::Setup,
            content_type: None,
            metadata: Metadata::new(),
            acl: None,
            no_index: false,
            no_follow: false,
            no_archive: false,
            anchors: Vec::new(),
            transform_configured,
            transform_max_bytes,
            transform_required,
            transform_bypassed: false,
            output: Vec::new(),
        }
    }

    fn ensure_setup(&self, what: &'static str) -> Result<(), ResponseError> {
        if self.state != StateKind::Setup {
            return Err(ResponseError::IllegalState(what));
        }
        Ok(())
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) -> Result<(), ResponseError> {
        self.ensure_setup("setContentType")?;
        self.content_type = Some(content_type.into());
        Ok(())
    }

    pub fn add_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<(), ResponseError> {
        self.ensure_setup("addMetadata")?;
        self.metadata.add(key, value);
        Ok(())
    }

    pub fn set_acl(&mut self, acl: Acl) -> Result<(), ResponseError> {
        self.ensure_setup("setAcl")?;
        self.acl = Some(acl);
        Ok(())
    }

    pub fn set_no_index(&mut self, value: bool) -> Result<(), ResponseError> {
        self.ensure_setup("setNoIndex")?;
        self.no_index = value;
        Ok(())
    }

    pub fn set_no_follow(&mut self, value: bool) -> Result<(), ResponseError> {
        self.ensure_setup("setNoFollow")?;
        self.no_follow = value;
        Ok(())
    }

    pub fn set_no_archive(&mut self, value: bool) -> Result<(), ResponseError> {
        self.ensure_setup("setNoArchive")?;
        self.no_archive = value;
        Ok(())
    }

    pub fn add_anchor(&mut self, text: Option<String>, url: impl Into<String>) -> Result<(), ResponseError> {
        self.ensure_setup("addAnchor")?;
        self.anchors.push((text, url.into()));
        Ok(())
    }

    pub fn respond_not_modified(&mut self) -> Result<(), ResponseError> {
        self.ensure_setup("respondNotModified")?;
        self.state = StateKind::NotModified;
        Ok(())
    }

    pub fn respond_not_found(&mut self) -> Result<(), ResponseError> {
        self.ensure_setup("respondNotFound")?;
        self.state = StateKind::NotFound;
        Ok(())
    }

    pub fn is_not_modified(&self) -> bool {
        self.state == StateKind::NotModified
    }

    pub fn is_not_found(&self) -> bool {
        self.state == StateKind::NotFound
    }

    /// One-shot transition out of `SETUP` into whichever delivery mode
    /// applies: `HEAD` for a HEAD request, `NO_TRANSFORM` when no
    /// transform is configured, `TRANSFORM` otherwise.
    pub fn get_output_stream(&mut self, is_head: bool) -> Result<OutputMode, ResponseError> {
        self.ensure_setup("getOutputStream")?;
        if is_head {
            self.state = StateKind::Head;
            return Ok(OutputMode::Head);
        }
        if self.transform_configured {
            self.state = StateKind::Transform;
            Ok(OutputMode::Buffered {
                max_bytes: self.transform_max_bytes,
                required: self.transform_required,
            })
        } else {
            self.state = StateKind::NoTransform;
            Ok(OutputMode::Direct)
        }
    }

    /// Write a chunk of document body bytes. In `NO_TRANSFORM` the
    /// chunk is appended unconditionally; in `TRANSFORM` it is
    /// accounted against `transformMaxBytes`, bypassing the transform
    /// (and every subsequent chunk) once the budget is exceeded unless
    /// the transform is required, in which case the call fails.
    pub fn write_body_chunk(&mut self, chunk: &[u8]) -> Result<TransformWrite, ResponseError> {
        match self.state {
            StateKind::NoTransform => {
                self.output.extend_from_slice(chunk);
                Ok(TransformWrite::Buffered)
            }
            StateKind::Transform => {
                if self.transform_bypassed {
                    self.output.extend_from_slice(chunk);
                    return Ok(TransformWrite::BypassedTooLarge);
                }
                if self.output.len() + chunk.len() > self.transform_max_bytes {
                    if self.transform_required {
                        return Err(ResponseError::TransformOverflow);
                    }
                    tracing::debug!("transform buffer exceeded transformMaxBytes, bypassing transform");
                    self.transform_bypassed = true;
                    self.output.extend_from_slice(chunk);
                    return Ok(TransformWrite::BypassedTooLarge);
                }
                self.output.extend_from_slice(chunk);
                Ok(TransformWrite::Buffered)
            }
            _ => Err(ResponseError::IllegalState("writeBodyChunk")),
        }
    }

    /// Consumes the response, applying the configured transform chain
    /// (in reverse declaration order, so the first-configured
    /// transform is outermost) unless the transform was bypassed, and
    /// returns the final body bytes.
    pub fn finish(self, transformers: &[Arc<dyn ContentTransformer>]) -> anyhow::Result<Vec<u8>> {
        if self.state == StateKind::Transform && !self.transform_bypassed {
            let mut body = self.output;
            for transformer in transformers.iter().rev() {
                body = transformer.transform(&body)?;
            }
            Ok(body)
        } else {
            Ok(self.output)
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn acl(&self) -> Option<&Acl> {
        self.acl.as_ref()
    }

    pub fn no_index(&self) -> bool {
        self.no_index
    }

    pub fn no_follow(&self) -> bool {
        self.no_follow
    }

    pub fn no_archive(&self) -> bool {
        self.no_archive
    }

    pub fn anchors(&self) -> &[(Option<String>, String)] {
        &self.anchors
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mutators_fail_after_leaving_setup() {
        let mut resp = DocResponse::new(false, 1024, false);
        resp.respond_not_found().unwrap();
        assert!(matches!(
            resp.set_content_type("text/plain"),
            Err(ResponseError::IllegalState("setContentType"))
        ));
    }

    #[test]
    fn head_request_yields_head_mode_without_transform() {
        let mut resp = DocResponse::new(true, 10, false);
        assert_eq!(resp.get_output_stream(true).unwrap(), OutputMode::Head);
    }

    #[test]
    fn no_transform_configured_streams_directly() {
        let mut resp = DocResponse::new(false, 10, false);
        assert_eq!(resp.get_output_stream(false).unwrap(), OutputMode::Direct);
        resp.write_body_chunk(b"hello").unwrap();
        assert_eq!(resp.finish(&[]).unwrap(), b"hello".to_vec());
    }

    #[test]
    fn transform_overflow_bypasses_when_not_required() {
        let mut resp = DocResponse::new(true, 10, false);
        resp.get_output_stream(false).unwrap();
        assert_eq!(resp.write_body_chunk(&[0u8; 5]).unwrap(), TransformWrite::Buffered);
        assert_eq!(
            resp.write_body_chunk(&[0u8; 10]).unwrap(),
            TransformWrite::BypassedTooLarge
        );
        assert_eq!(resp.finish(&[]).unwrap().len(), 15);
    }

    #[test]
    fn transform_overflow_fails_when_required() {
        let mut resp = DocResponse::new(true, 10, true);
        resp.get_output_stream(false).unwrap();
        assert!(matches!(
            resp.write_body_chunk(&[0u8; 11]),
            Err(ResponseError::TransformOverflow)
        ));
    }

    struct Prefix(&'static str);
    impl ContentTransformer for Prefix {
        fn transform(&self, input: &[u8]) -> anyhow::Result<Vec<u8>> {
            let mut out = self.0.as_bytes().to_vec();
            out.extend_from_slice(input);
            Ok(out)
        }
    }

    #[test]
    fn transform_chain_applies_in_reverse_declaration_order() {
        let mut resp = DocResponse::new(true, 100, false);
        resp.get_output_stream(false).unwrap();
        resp.write_body_chunk(b"body").unwrap();
        let transformers: Vec<Arc<dyn ContentTransformer>> =
            vec![Arc::new(Prefix("first:")), Arc::new(Prefix("second:"))];
        // first-configured ("first:") must be outermost, so it appears
        // leftmost in the final output.
        let body = resp.finish(&transformers).unwrap();
        assert_eq!(String::from_utf8(body).unwrap(), "first:second:body");
    }

    #[test]
    fn bypassed_transform_skips_the_chain() {
        let mut resp = DocResponse::new(true, 2, false);
        resp.get_output_stream(false).unwrap();
        resp.write_body_chunk(b"too long").unwrap();
        let transformers: Vec<Arc<dyn ContentTransformer>> = vec![Arc::new(Prefix("x:"))];
        let body = resp.finish(&transformers).unwrap();
        assert_eq!(body, b"too long".to_vec());
    }
}
