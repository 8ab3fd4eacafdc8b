use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DocIdError {
    #[error("DocId must not be empty")]
    Empty,
    #[error("url path {path:?} does not start with the configured base path {base:?}")]
    BaseMismatch { path: String, base: String },
}

/// An opaque, adaptor-chosen identifier for a document in the source
/// repository. Equality and ordering are plain string equality/ordering;
/// the framework never interprets the contents beyond the URL escaping
/// rules below.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocId(String);

impl DocId {
    pub fn new(id: impl Into<String>) -> Result<Self, DocIdError> {
        let id = id.into();
        if id.is_empty() {
            return Err(DocIdError::Empty);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build the URL path at which the appliance will later request this
    /// document: `base` concatenated with this id after the dot-run
    /// transformation described in the wire protocol section of the spec.
    pub fn to_url_path(&self, base: &str) -> String {
        format!("{base}{}", encode_dot_runs(&self.0))
    }

    /// Invert `to_url_path`: strip `base` and undo the dot-run
    /// transformation to recover the original id.
    pub fn from_url_path(path: &str, base: &str) -> Result<Self, DocIdError> {
        let rest = path
            .strip_prefix(base)
            .ok_or_else(|| DocIdError::BaseMismatch {
                path: path.to_string(),
                base: base.to_string(),
            })?;
        DocId::new(decode_dot_runs(rest))
    }
}

/// Every run of only `.` characters between `/` separators gains two
/// extra `.` characters, so that `.` and `..` path segments survive a
/// round trip through an HTTP path without being collapsed by
/// intermediate URL normalization.
fn encode_dot_runs(id: &str) -> String {
    id.split('/')
        .map(|segment| {
            if !segment.is_empty() && segment.bytes().all(|b| b == b'.') {
                format!("{segment}..")
            } else {
                segment.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn decode_dot_runs(escaped: &str) -> String {
    escaped
        .split('/')
        .map(|segment| {
            if !segment.is_empty() && segment.bytes().all(|b| b == b'.') {
                segment[..segment.len() - 2].to_string()
            } else {
                segment.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

impl TryFrom<String> for DocId {
    type Error = DocIdError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        DocId::new(s)
    }
}

impl From<DocId> for String {
    fn from(id: DocId) -> String {
        id.0
    }
}

impl fmt::Debug for DocId {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "DocId({:?})", self.0)
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(&self.0)
    }
}

impl PartialEq for DocId {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for DocId {}

impl PartialOrd for DocId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for DocId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl std::hash::Hash for DocId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_empty() {
        assert_eq!(DocId::new(""), Err(DocIdError::Empty));
    }

    #[test]
    fn round_trip() {
        let base = "/docs/";
        for raw in [
            "a",
            ".",
            "..",
            "a/./b",
            "a/../b",
            "a/.../b",
            "/..",
            "foo%bar",
        ] {
            let id = DocId::new(raw).unwrap();
            let path = id.to_url_path(base);
            let decoded = DocId::from_url_path(&path, base).unwrap();
            assert_eq!(decoded.as_str(), raw, "round trip failed for {raw:?}");
        }
    }

    #[test]
    fn dot_segments_are_escaped_in_the_path() {
        let id = DocId::new("..").unwrap();
        let path = id.to_url_path("/base/");
        assert_eq!(path, "/base/....");
    }

    #[test]
    fn non_dot_segments_pass_through() {
        let id = DocId::new("a/./b").unwrap();
        assert_eq!(id.to_url_path("/base/"), "/base/a/.../b");
    }

    #[test]
    fn base_mismatch_is_an_error() {
        let id = DocId::new("a").unwrap();
        let path = id.to_url_path("/base/");
        assert_eq!(
            DocId::from_url_path(&path, "/other/"),
            Err(DocIdError::BaseMismatch {
                path,
                base: "/other/".to_string()
            })
        );
    }
}
