//! Cache error types

use std::io;
use std::path::{Path, PathBuf};

use crate::remote::RemoteError;

/// Failures of the local cache tiers
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Listing cache is not valid JSON: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl CacheError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        CacheError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Failures of a composed fetch
///
/// `Cache` is returned after the fresh value was already delivered: the
/// caller has usable data, only the write-through failed.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Fetched bytes for {path} could not be decoded")]
    Undecodable { path: String },

    #[error("Fresh value delivered but caching failed: {0}")]
    Cache(#[from] CacheError),
}

impl FetchError {
    /// The remote reported cancellation; nothing was written
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Remote(e) if e.is_cancelled())
    }
}
