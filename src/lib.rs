//! davcache - two-tier cache for WebDAV files, thumbnails and listings
//!
//! Remote files, thumbnail renderings and directory listings are cached per
//! account in a decoded-value memory tier and a raw-bytes disk tier. Callers
//! get the cached value first and the fresh one afterwards, when it differs.

pub mod cache;
pub mod error;
pub mod key;
pub mod remote;

#[cfg(test)]
mod testing;

pub use cache::{CacheConfig, CacheService, Delivery, FetchOptions, RawBytes};
pub use error::{CacheError, FetchError};
pub use key::{Account, AccountId, AccountPath, CacheKey, ThumbnailKey, ThumbnailParams};
pub use remote::{DavClient, RemoteError, RemoteSource};
