//! Cache location settings

use std::path::PathBuf;

/// Directory name under the platform cache dir
const CACHE_DIR_NAME: &str = "davcache";

/// Listing cache file name under the cache root
pub const LISTING_FILE_NAME: &str = "listings.json";

/// Directory under the cache root where in-flight writes are staged
///
/// Account directory names are URL-safe base64, which never contains `.`,
/// so this name can't collide with an account subtree.
pub const STAGING_DIR_NAME: &str = ".staging";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Root holding one subtree per account plus the listing file
    pub root: PathBuf,
    /// Persisted listing cache
    pub listing_file: PathBuf,
}

impl CacheConfig {
    /// Config rooted at `root` with the listing file directly beneath it
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let listing_file = root.join(LISTING_FILE_NAME);
        Self { root, listing_file }
    }

    /// Temp files live here until they are renamed into place
    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR_NAME)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        let root = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(CACHE_DIR_NAME);
        Self::with_root(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_file_under_root() {
        let config = CacheConfig::with_root("/var/cache/x");
        assert_eq!(config.listing_file, PathBuf::from("/var/cache/x/listings.json"));
        assert_eq!(config.staging_dir(), PathBuf::from("/var/cache/x/.staging"));
    }

    #[test]
    fn test_default_root_name() {
        let config = CacheConfig::default();
        assert!(config.root.ends_with(CACHE_DIR_NAME));
    }
}
