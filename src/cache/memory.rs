//! Memory tier
//!
//! Process-lifetime map from [`CacheKey`] to a decoded value, backed by Moka.
//! No TTL and no capacity bound: entries live until explicitly removed.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use moka::sync::Cache;
use tracing::{debug, trace};

use crate::key::{AccountId, AccountPath, CacheKey};

pub struct MemoryCache<V> {
    entries: Cache<CacheKey, V>,
    /// Cache hit counter
    hits: AtomicU64,
    /// Cache miss counter
    misses: AtomicU64,
}

impl<V> MemoryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        let entries = Cache::builder().name("davcache_memory").build();

        Self {
            entries,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<V> {
        match self.entries.get(key) {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(key = ?key, "Memory cache HIT");
                Some(value)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                trace!(key = ?key, "Memory cache MISS");
                None
            }
        }
    }

    /// Insert or overwrite
    pub fn set(&self, key: CacheKey, value: V) {
        trace!(key = ?key, "Memory cache SET");
        self.entries.insert(key, value);
    }

    pub fn remove(&self, key: &CacheKey) {
        self.entries.invalidate(key);
    }

    /// Remove the plain entry for `path` and every thumbnail variant of it
    pub fn remove_variants(&self, path: &AccountPath) -> usize {
        self.remove_where(|key| key.account_path() == path)
    }

    /// Remove every entry belonging to `account`
    pub fn remove_all(&self, account: &AccountId) -> usize {
        let removed = self.remove_where(|key| key.account() == account);
        debug!(account = %account, removed = removed, "Removed account from memory cache");
        removed
    }

    /// Evict everything under `directory` whose direct child is not in `keep`
    ///
    /// A stale child directory takes its whole subtree with it.
    pub fn retain_children(&self, directory: &AccountPath, keep: &HashSet<&str>) -> usize {
        self.remove_where(|key| {
            let key = key.account_path();
            key.account() == directory.account()
                && child_of(directory.path(), key.path()).is_some_and(|child| !keep.contains(child))
        })
    }

    pub fn clear(&self) {
        self.entries.invalidate_all();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        debug!("Cleared memory cache");
    }

    fn remove_where(&self, predicate: impl Fn(&CacheKey) -> bool) -> usize {
        let doomed: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|(key, _)| predicate(key.as_ref()))
            .map(|(key, _)| (*key).clone())
            .collect();

        for key in &doomed {
            self.entries.invalidate(key);
        }
        doomed.len()
    }

    /// Returns (hits, misses, hit_rate)
    pub fn stats(&self) -> (u64, u64, f64) {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        (hits, misses, hit_rate)
    }
}

/// The direct child of `directory` that `path` lives in (or is)
fn child_of<'a>(directory: &str, path: &'a str) -> Option<&'a str> {
    let rest = if directory.is_empty() {
        path
    } else {
        path.strip_prefix(directory)?.strip_prefix('/')?
    };
    if rest.is_empty() {
        return None;
    }
    let end = path.len() - rest.len() + rest.find('/').unwrap_or(rest.len());
    Some(&path[..end])
}

impl<V> Default for MemoryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{ContentMode, ThumbnailKey, ThumbnailParams};

    fn path_key(account: &str, path: &str) -> CacheKey {
        CacheKey::Path(AccountPath::new(AccountId::new(account), path))
    }

    fn thumb_key(account: &str, path: &str, size: u32) -> CacheKey {
        let base = AccountPath::new(AccountId::new(account), path);
        CacheKey::Thumbnail(ThumbnailKey::new(
            base,
            ThumbnailParams::sized(size, size, ContentMode::Fill),
        ))
    }

    #[test]
    fn test_cache_hit_miss() {
        let cache = MemoryCache::new();
        let key = path_key("alice", "a.txt");

        assert!(cache.get(&key).is_none());
        cache.set(key.clone(), b"hello".to_vec());
        assert_eq!(cache.get(&key), Some(b"hello".to_vec()));

        let (hits, misses, hit_rate) = cache.stats();
        assert_eq!(hits, 1);
        assert_eq!(misses, 1);
        assert!(hit_rate > 49.0 && hit_rate < 51.0);
    }

    #[test]
    fn test_overwrite() {
        let cache = MemoryCache::new();
        let key = path_key("alice", "a.txt");
        cache.set(key.clone(), 1u32);
        cache.set(key.clone(), 2u32);
        assert_eq!(cache.get(&key), Some(2));
    }

    #[test]
    fn test_remove_then_get_is_absent() {
        let cache = MemoryCache::new();
        let key = path_key("alice", "a.txt");
        cache.set(key.clone(), 1u32);
        cache.remove(&key);
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn test_thumbnail_sizes_are_distinct_entries() {
        let cache = MemoryCache::new();
        cache.set(thumb_key("alice", "a.png", 64), 64u32);
        cache.set(thumb_key("alice", "a.png", 128), 128u32);
        assert_eq!(cache.get(&thumb_key("alice", "a.png", 64)), Some(64));
        assert_eq!(cache.get(&thumb_key("alice", "a.png", 128)), Some(128));
    }

    #[test]
    fn test_remove_variants() {
        let cache = MemoryCache::new();
        cache.set(path_key("alice", "a.png"), 0u32);
        cache.set(thumb_key("alice", "a.png", 64), 64);
        cache.set(path_key("alice", "b.png"), 1);

        assert_eq!(cache.remove_variants(&AccountPath::new(AccountId::new("alice"), "a.png")), 2);
        assert!(cache.get(&path_key("alice", "a.png")).is_none());
        assert!(cache.get(&thumb_key("alice", "a.png", 64)).is_none());
        assert_eq!(cache.get(&path_key("alice", "b.png")), Some(1));
    }

    #[test]
    fn test_remove_all_for_account() {
        let cache = MemoryCache::new();
        cache.set(path_key("alice", "a.txt"), 1u32);
        cache.set(thumb_key("alice", "b.png", 32), 2);
        cache.set(path_key("bob", "a.txt"), 3);

        assert_eq!(cache.remove_all(&AccountId::new("alice")), 2);
        assert!(cache.get(&path_key("alice", "a.txt")).is_none());
        assert!(cache.get(&thumb_key("alice", "b.png", 32)).is_none());
        assert_eq!(cache.get(&path_key("bob", "a.txt")), Some(3));
    }

    #[test]
    fn test_retain_children() {
        let cache = MemoryCache::new();
        cache.set(path_key("alice", "Photos/keep.jpg"), 1u32);
        cache.set(thumb_key("alice", "Photos/stale.jpg", 64), 2);
        cache.set(path_key("alice", "Photos/Sub/deep.jpg"), 3);
        cache.set(path_key("alice", "Other/stale.jpg"), 4);
        cache.set(path_key("alice", "Photos"), 5);
        cache.set(path_key("alice", "PhotosOld/a.jpg"), 6);

        let directory = AccountPath::new(AccountId::new("alice"), "Photos");
        let keep: HashSet<&str> = ["Photos/keep.jpg", "Photos/Sub"].into_iter().collect();

        assert_eq!(cache.retain_children(&directory, &keep), 1);
        assert!(cache.get(&thumb_key("alice", "Photos/stale.jpg", 64)).is_none());
        assert_eq!(cache.get(&path_key("alice", "Photos/keep.jpg")), Some(1));
        assert_eq!(cache.get(&path_key("alice", "Photos/Sub/deep.jpg")), Some(3));
        assert_eq!(cache.get(&path_key("alice", "Other/stale.jpg")), Some(4));
        assert_eq!(cache.get(&path_key("alice", "Photos")), Some(5));
        assert_eq!(cache.get(&path_key("alice", "PhotosOld/a.jpg")), Some(6));
    }

    #[test]
    fn test_retain_children_drops_stale_subtrees() {
        let cache = MemoryCache::new();
        cache.set(path_key("alice", "Photos/Gone/inner.txt"), 1u32);
        cache.set(thumb_key("alice", "Photos/Gone/Deeper/c.png", 32), 2);
        cache.set(path_key("alice", "Photos/Kept/inner.txt"), 3);

        let directory = AccountPath::new(AccountId::new("alice"), "Photos");
        let keep: HashSet<&str> = ["Photos/Kept"].into_iter().collect();

        assert_eq!(cache.retain_children(&directory, &keep), 2);
        assert!(cache.get(&path_key("alice", "Photos/Gone/inner.txt")).is_none());
        assert_eq!(cache.get(&path_key("alice", "Photos/Kept/inner.txt")), Some(3));
    }

    #[test]
    fn test_retain_children_of_account_root() {
        let cache = MemoryCache::new();
        cache.set(path_key("alice", "a.txt"), 1u32);
        cache.set(path_key("alice", "Old/b.txt"), 2);
        cache.set(path_key("bob", "Old/b.txt"), 3);

        let root = AccountPath::new(AccountId::new("alice"), "");
        let keep: HashSet<&str> = ["a.txt"].into_iter().collect();

        assert_eq!(cache.retain_children(&root, &keep), 1);
        assert_eq!(cache.get(&path_key("alice", "a.txt")), Some(1));
        assert_eq!(cache.get(&path_key("bob", "Old/b.txt")), Some(3));
    }

    #[test]
    fn test_child_of() {
        assert_eq!(child_of("Photos", "Photos/a/b.jpg"), Some("Photos/a"));
        assert_eq!(child_of("Photos", "Photos/a.jpg"), Some("Photos/a.jpg"));
        assert_eq!(child_of("Photos", "Photos"), None);
        assert_eq!(child_of("Photos", "PhotosOld/a.jpg"), None);
        assert_eq!(child_of("", "x/y"), Some("x"));
    }

    #[test]
    fn test_clear() {
        let cache = MemoryCache::new();
        cache.set(path_key("alice", "a.txt"), 1u32);
        let _ = cache.get(&path_key("alice", "a.txt"));

        cache.clear();

        let (hits, misses, _) = cache.stats();
        assert_eq!((hits, misses), (0, 0));
        assert!(cache.get(&path_key("alice", "a.txt")).is_none());
    }
}
