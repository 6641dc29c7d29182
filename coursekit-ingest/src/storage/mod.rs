//! Object storage
//!
//! Upload-by-key with overwrite semantics. Keys are always forward-slash
//! separated and relative; each backend maps them onto its own namespace.

pub mod http;
pub mod local;

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

pub use http::HttpObjectStore;
pub use local::LocalObjectStore;

/// Fallback when the extension tells us nothing
pub const OCTET_STREAM: &str = "application/octet-stream";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Object store rejected upload ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Where an uploaded object ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    /// Publicly reachable URL, when the backend has one
    pub public_url: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any existing object
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject, StorageError>;

    /// Short backend name for logs
    fn name(&self) -> &'static str;
}

/// Content type from the file extension
pub fn content_type_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// Canonical forward-slash form of a relative path
///
/// Backslashes become `/`; empty and `.` segments are dropped.
pub fn normalize_key_path(raw: &str) -> String {
    raw.replace('\\', "/")
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Reject keys a backend could resolve outside its namespace
pub(crate) fn validate_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|s| s.is_empty() || s == "." || s == "..")
    {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for(Path::new("a/img.png")), "image/png");
        assert_eq!(content_type_for(Path::new("doc.pdf")), "application/pdf");
        assert_eq!(content_type_for(Path::new("blob.weird-ext")), OCTET_STREAM);
        assert_eq!(content_type_for(Path::new("no_extension")), OCTET_STREAM);
    }

    #[test]
    fn test_normalize_key_path() {
        assert_eq!(normalize_key_path("assets\\img.png"), "assets/img.png");
        assert_eq!(normalize_key_path("./assets//img.png"), "assets/img.png");
        assert_eq!(normalize_key_path("a\\b/c"), "a/b/c");
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("courses/bio/modules/intro/img.png").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("/abs").is_err());
        assert!(validate_key("a/../b").is_err());
        assert!(validate_key("a//b").is_err());
        assert!(validate_key("a\\b").is_err());
    }
}
