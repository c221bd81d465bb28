//! Cache key model
//!
//! Every cache tier is keyed by an account plus a canonical relative path.
//! Thumbnails extend that key with rendering parameters.

pub mod account;
pub mod path;
pub mod thumbnail;

pub use account::{Account, AccountId, AccountPath};
pub use path::normalize_path;
pub use thumbnail::{preview_url, ContentMode, Dimensions, ThumbnailKey, ThumbnailParams};

/// Key for the memory and disk tiers
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Plain file contents
    Path(AccountPath),
    /// A rendered thumbnail variant with non-default parameters
    Thumbnail(ThumbnailKey),
}

impl CacheKey {
    /// The underlying (account, path) key
    pub fn account_path(&self) -> &AccountPath {
        match self {
            CacheKey::Path(key) => key,
            CacheKey::Thumbnail(key) => &key.base,
        }
    }

    pub fn account(&self) -> &AccountId {
        self.account_path().account()
    }
}

impl From<AccountPath> for CacheKey {
    fn from(key: AccountPath) -> Self {
        CacheKey::Path(key)
    }
}

impl From<ThumbnailKey> for CacheKey {
    /// A default thumbnail (fit, server-sized) shares the plain entry's slot.
    fn from(key: ThumbnailKey) -> Self {
        if key.params.is_default() {
            CacheKey::Path(key.base)
        } else {
            CacheKey::Thumbnail(key)
        }
    }
}
