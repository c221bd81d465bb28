//! Remote collaborator contracts
//!
//! The cache consumes already-parsed listing records and opaque bytes; the
//! transport behind them is anything implementing [`RemoteSource`].

use std::future::Future;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use super::errors::RemoteError;
use crate::key::{normalize_path, Account, ThumbnailParams};

/// One remote entry from a directory listing
///
/// Immutable once built; the next listing of the parent replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Canonical path (see [`normalize_path`])
    pub path: String,
    pub is_directory: bool,
    pub size: u64,
    #[serde(default)]
    pub modified: Option<SystemTime>,
    #[serde(default)]
    pub created: Option<SystemTime>,
    /// Stable server-side identifier
    #[serde(default)]
    pub file_id: Option<String>,
    #[serde(default)]
    pub etag: Option<String>,
}

impl FileRecord {
    pub fn file(path: &str, size: u64) -> Self {
        Self {
            path: path.to_string(),
            is_directory: false,
            size,
            modified: None,
            created: None,
            file_id: None,
            etag: None,
        }
    }

    pub fn directory(path: &str) -> Self {
        Self {
            is_directory: true,
            ..Self::file(path, 0)
        }
    }

    pub fn with_etag(mut self, etag: &str) -> Self {
        self.etag = Some(etag.to_string());
        self
    }

    /// Last path component
    pub fn base_name(&self) -> &str {
        let name = self.path.trim_end_matches('/');
        name.rsplit('/').next().unwrap_or(name)
    }

    /// Rewrite a server-reported path into canonical form
    pub fn canonicalize(mut self, base: Option<&str>) -> Self {
        self.path = normalize_path(&self.path, base);
        self
    }
}

/// Bytes returned by a file fetch, with whatever hints the server sent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fetched {
    pub bytes: Vec<u8>,
    pub etag: Option<String>,
    pub content_type: Option<String>,
}

impl Fetched {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            ..Self::default()
        }
    }
}

/// Remote file-protocol server
///
/// Retries, authentication and cancellation belong to the implementation.
/// A cancelled request resolves to [`RemoteError::Cancelled`].
pub trait RemoteSource: Send + Sync {
    /// Download a file's contents
    fn fetch(
        &self,
        account: &Account,
        path: &str,
    ) -> impl Future<Output = Result<Fetched, RemoteError>> + Send;

    /// Download a rendered thumbnail from the preview service
    fn fetch_thumbnail(
        &self,
        account: &Account,
        path: &str,
        params: &ThumbnailParams,
    ) -> impl Future<Output = Result<Vec<u8>, RemoteError>> + Send;

    /// List a directory's direct children with canonical paths
    fn list_directory(
        &self,
        account: &Account,
        path: &str,
    ) -> impl Future<Output = Result<Vec<FileRecord>, RemoteError>> + Send;
}

/// Turns a PROPFIND multistatus body into records
///
/// Record paths may be raw hrefs; the client canonicalizes them.
pub trait ListingDecoder: Send + Sync {
    fn decode(&self, body: &str) -> Result<Vec<FileRecord>, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_name() {
        assert_eq!(FileRecord::file("photos/alice.jpg", 1).base_name(), "alice.jpg");
        assert_eq!(FileRecord::directory("photos/cats/").base_name(), "cats");
        assert_eq!(FileRecord::file("readme.txt", 1).base_name(), "readme.txt");
    }

    #[test]
    fn test_canonicalize() {
        let base = "https://cloud.example.com/remote.php/dav/files/alice";
        let record = FileRecord::directory("/remote.php/dav/files/alice/My%20Photos/")
            .canonicalize(Some(base));
        assert_eq!(record.path, "My Photos");
        assert!(record.is_directory);
    }

    #[test]
    fn test_record_json_defaults() {
        // Optional fields may be missing from older persisted listings
        let json = r#"{"path": "a/b.txt", "is_directory": false, "size": 7}"#;
        let record: FileRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record, FileRecord::file("a/b.txt", 7));
    }
}
