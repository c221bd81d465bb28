//! Cache orchestrator
//!
//! Composes the memory tier, the disk tier and the listing cache. Tier
//! precedence on reads is memory, then disk (promoting into memory), then the
//! caller's remote fetch. Every operation that touches disk may block; callers
//! should run it off any thread that has to stay responsive.
//!
//! Concurrent fetches of the same key are not deduplicated: each caller
//! fetches and writes through on its own and the last writer wins.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::config::CacheConfig;
use super::diagnostics::{BestEffortOp, DiagnosticSink, TracingSink};
use super::disk::DiskCache;
use super::listing::ListingCache;
use super::memory::MemoryCache;
use crate::error::{CacheError, FetchError};
use crate::key::{Account, AccountId, AccountPath, CacheKey, ThumbnailKey};
use crate::remote::{FileRecord, RemoteError, RemoteSource};

/// Converts cached bytes into the value handed to callers
///
/// Used identically for file contents and thumbnail images. Returning None
/// makes the bytes count as absent.
pub trait ByteCodec: Send + Sync {
    type Value: Clone + PartialEq + Send + Sync + 'static;

    fn decode(&self, bytes: &[u8]) -> Option<Self::Value>;
}

/// Identity codec for plain file contents
#[derive(Debug, Default, Clone, Copy)]
pub struct RawBytes;

impl ByteCodec for RawBytes {
    type Value = Vec<u8>;

    fn decode(&self, bytes: &[u8]) -> Option<Vec<u8>> {
        Some(bytes.to_vec())
    }
}

/// How a fetch treats values already in the cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Ignore cached values and go straight to the remote
    pub bypass_cache: bool,
    /// Deliver the cached value, then fetch anyway
    pub always_refetch: bool,
    /// When a fetch stops at the cached value, evict that value afterwards
    pub remove_cached: bool,
}

impl FetchOptions {
    pub fn refetch() -> Self {
        Self {
            always_refetch: true,
            ..Self::default()
        }
    }

    pub fn bypass() -> Self {
        Self {
            bypass_cache: true,
            ..Self::default()
        }
    }
}

/// One value handed to a fetch's caller
///
/// A fetch delivers at most twice: the cached value, then the fresh one. The
/// fresh delivery is skipped when it equals the cached one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery<V> {
    Cached(V),
    Fresh(V),
}

impl<V> Delivery<V> {
    pub fn value(&self) -> &V {
        match self {
            Delivery::Cached(value) | Delivery::Fresh(value) => value,
        }
    }

    pub fn into_value(self) -> V {
        match self {
            Delivery::Cached(value) | Delivery::Fresh(value) => value,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, Delivery::Fresh(_))
    }
}

/// Cache service for one storage root
pub struct CacheService<C: ByteCodec> {
    codec: C,
    memory: MemoryCache<C::Value>,
    disk: DiskCache,
    listings: ListingCache,
    sink: Arc<dyn DiagnosticSink>,
}

impl<C: ByteCodec> CacheService<C> {
    /// Open a service that reports best-effort failures through tracing
    pub fn open(config: &CacheConfig, codec: C) -> Result<Self, CacheError> {
        Self::with_sink(config, codec, Arc::new(TracingSink))
    }

    pub fn with_sink(
        config: &CacheConfig,
        codec: C,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Result<Self, CacheError> {
        let disk = DiskCache::open(config)?;
        let listings = ListingCache::new(
            config.listing_file.clone(),
            disk.staging_dir().to_path_buf(),
            Arc::clone(&sink),
        );

        Ok(Self {
            codec,
            memory: MemoryCache::new(),
            disk,
            listings,
            sink,
        })
    }

    pub fn memory(&self) -> &MemoryCache<C::Value> {
        &self.memory
    }

    pub fn disk(&self) -> &DiskCache {
        &self.disk
    }

    pub fn listings(&self) -> &ListingCache {
        &self.listings
    }

    /// Memory, then disk (promoting a decoded hit into memory)
    ///
    /// Bytes that fail to decode count as a miss.
    pub fn get_cached_value(&self, key: &CacheKey) -> Result<Option<C::Value>, CacheError> {
        if let Some(value) = self.memory.get(key) {
            return Ok(Some(value));
        }

        let location = self.disk.resolve(key);
        let Some(bytes) = self.disk.read(&location)? else {
            return Ok(None);
        };

        match self.codec.decode(&bytes) {
            Some(value) => {
                self.memory.set(key.clone(), value.clone());
                debug!(key = ?key, "Promoted disk entry into memory");
                Ok(Some(value))
            }
            None => {
                debug!(
                    key = ?key,
                    size = bytes.len(),
                    "Cached bytes not decodable, treating as miss"
                );
                Ok(None)
            }
        }
    }

    /// Write `bytes` through disk, then memory
    ///
    /// Returns the decoded value, or None when the bytes don't decode (they
    /// are stored anyway).
    pub fn store(&self, key: &CacheKey, bytes: &[u8]) -> Result<Option<C::Value>, CacheError> {
        let (value, written) = self.write_through(key, bytes);
        written.map(|()| value)
    }

    /// Memory is updated even if the disk write fails; the error comes back
    /// alongside the value.
    fn write_through(
        &self,
        key: &CacheKey,
        bytes: &[u8],
    ) -> (Option<C::Value>, Result<(), CacheError>) {
        let location = self.disk.resolve(key);
        let written = self.disk.write(bytes, &location);
        if let Err(e) = &written {
            warn!(key = ?key, error = %e, "Disk cache write failed");
        }

        let value = self.codec.decode(bytes);
        if let Some(value) = &value {
            self.memory.set(key.clone(), value.clone());
        }
        (value, written)
    }

    /// Cached-then-fresh fetch
    ///
    /// Delivers the cached value (unless bypassed) and stops there unless a
    /// refetch was requested. Otherwise runs `fetch`, writes the bytes through
    /// both tiers and delivers the fresh value unless it equals the cached
    /// one. A remote error (including cancellation) is returned untouched and
    /// nothing is written. A write-through failure is returned as
    /// [`FetchError::Cache`] after the fresh value has been delivered.
    pub async fn fetch_and_cache<F, Fut, D>(
        &self,
        key: &CacheKey,
        options: FetchOptions,
        fetch: F,
        mut deliver: D,
    ) -> Result<(), FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<u8>, RemoteError>>,
        D: FnMut(Delivery<C::Value>),
    {
        let cached = if options.bypass_cache {
            None
        } else {
            self.cached_or_miss(key)
        };

        if let Some(value) = &cached {
            deliver(Delivery::Cached(value.clone()));
            if !options.always_refetch {
                if options.remove_cached {
                    self.delete(key)?;
                }
                return Ok(());
            }
        }

        let bytes = match fetch().await {
            Ok(bytes) => bytes,
            Err(e) => {
                if e.is_cancelled() {
                    debug!(key = ?key, "Fetch cancelled, nothing written");
                }
                return Err(e.into());
            }
        };

        let (value, written) = self.write_through(key, &bytes);
        let Some(value) = value else {
            written?;
            return Err(FetchError::Undecodable {
                path: key.account_path().to_string(),
            });
        };

        if cached.as_ref() == Some(&value) {
            debug!(key = ?key, "Fetched value unchanged, skipping second delivery");
        } else {
            deliver(Delivery::Fresh(value));
        }

        written?;
        Ok(())
    }

    /// Read errors on the cache side fall through to the remote
    fn cached_or_miss(&self, key: &CacheKey) -> Option<C::Value> {
        match self.get_cached_value(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = ?key, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    /// Fetch a file's contents through the cache
    pub async fn fetch_file<R, D>(
        &self,
        remote: &R,
        account: &Account,
        path: &AccountPath,
        options: FetchOptions,
        deliver: D,
    ) -> Result<(), FetchError>
    where
        R: RemoteSource,
        D: FnMut(Delivery<C::Value>),
    {
        let key = CacheKey::Path(path.clone());
        let fetch = || async {
            let fetched = remote.fetch(account, path.path()).await?;
            debug!(
                path = %path,
                etag = ?fetched.etag,
                content_type = ?fetched.content_type,
                "Fetched file"
            );
            Ok::<_, RemoteError>(fetched.bytes)
        };
        self.fetch_and_cache(&key, options, fetch, deliver).await
    }

    /// Fetch a thumbnail through the cache
    ///
    /// Default parameters share the plain file's slot.
    pub async fn fetch_thumbnail<R, D>(
        &self,
        remote: &R,
        account: &Account,
        key: &ThumbnailKey,
        options: FetchOptions,
        deliver: D,
    ) -> Result<(), FetchError>
    where
        R: RemoteSource,
        D: FnMut(Delivery<C::Value>),
    {
        let cache_key = CacheKey::from(key.clone());
        let fetch = || remote.fetch_thumbnail(account, key.base.path(), &key.params);
        self.fetch_and_cache(&cache_key, options, fetch, deliver).await
    }

    /// Replace the cached listing of `directory` and prune stale children
    ///
    /// Memory entries for children no longer reported are evicted too.
    /// Returns the number of disk entries removed.
    pub fn reconcile_directory(
        &self,
        directory: &AccountPath,
        fresh: Vec<FileRecord>,
    ) -> Result<usize, CacheError> {
        let evicted = {
            let keep: HashSet<&str> = fresh.iter().map(|record| record.path.as_str()).collect();
            self.memory.retain_children(directory, &keep)
        };

        self.listings.replace(directory.clone(), fresh.clone());
        let removed = self.disk.cleanup(directory, &fresh)?;

        debug!(
            directory = %directory,
            evicted = evicted,
            removed = removed,
            "Reconciled directory"
        );
        Ok(removed)
    }

    /// Cached-then-fresh directory listing, reconciling on success
    pub async fn refresh_directory<R, D>(
        &self,
        remote: &R,
        account: &Account,
        directory: &AccountPath,
        options: FetchOptions,
        mut deliver: D,
    ) -> Result<(), FetchError>
    where
        R: RemoteSource,
        D: FnMut(Delivery<Vec<FileRecord>>),
    {
        let cached = if options.bypass_cache {
            None
        } else {
            self.listings.get(directory)
        };

        if let Some(records) = &cached {
            deliver(Delivery::Cached(records.clone()));
            if !options.always_refetch {
                if options.remove_cached {
                    self.listings.remove(directory);
                }
                return Ok(());
            }
        }

        let fresh = remote.list_directory(account, directory.path()).await?;
        let reconciled = self.reconcile_directory(directory, fresh.clone());

        if cached.as_ref() == Some(&fresh) {
            debug!(directory = %directory, "Listing unchanged, skipping second delivery");
        } else {
            deliver(Delivery::Fresh(fresh));
        }

        reconciled?;
        Ok(())
    }

    /// Remove one entry from both tiers
    pub fn delete(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.memory.remove(key);
        self.disk.delete(&self.disk.resolve(key))?;
        Ok(())
    }

    /// Remove a path's plain entry and all of its thumbnail variants
    pub fn delete_path(&self, path: &AccountPath) -> Result<usize, CacheError> {
        self.memory.remove_variants(path);
        self.disk.delete_variants(path)
    }

    /// Remove everything cached for `account` from both tiers
    ///
    /// The two removals are independent; a disk failure leaves memory
    /// already cleared. Listings are kept.
    pub fn delete_all(&self, account: &AccountId) -> Result<(), CacheError> {
        self.memory.remove_all(account);
        self.disk.delete_account_tree(account)
    }

    /// Wipe every tier for every account; failures are only reported
    pub fn clear_all(&self) {
        self.memory.clear();
        self.listings.clear();

        let accounts = match self.disk.accounts() {
            Ok(accounts) => accounts,
            Err(e) => {
                self.sink.best_effort_failed(BestEffortOp::ClearAll, &e);
                return;
            }
        };
        for account in &accounts {
            if let Err(e) = self.disk.delete_account_tree(account) {
                self.sink.best_effort_failed(BestEffortOp::ClearAll, &e);
            }
        }
        info!(accounts = accounts.len(), "Cleared all caches");
    }

    pub fn save_listings(&self) {
        self.listings.save();
    }

    pub fn load_listings(&self) -> usize {
        self.listings.load()
    }
}
