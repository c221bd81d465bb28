//! Persisted directory listings
//!
//! Maps a directory key to the child records last reported by the server.
//! Entries are replaced wholesale, never patched. Persistence is best-effort:
//! failures are reported to the [`DiagnosticSink`] and never propagated.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::diagnostics::{BestEffortOp, DiagnosticSink};
use super::disk::stage_temp_file;
use crate::error::CacheError;
use crate::key::{AccountId, AccountPath};
use crate::remote::FileRecord;

/// On-disk shape of one listing
#[derive(Debug, Serialize, Deserialize)]
struct PersistedListing {
    directory: AccountPath,
    records: Vec<FileRecord>,
}

pub struct ListingCache {
    /// Listing file shared by all accounts
    file: PathBuf,
    /// Temp files for atomic saves; must share a filesystem with `file`
    staging: PathBuf,
    entries: RwLock<HashMap<AccountPath, Vec<FileRecord>>>,
    sink: Arc<dyn DiagnosticSink>,
}

impl ListingCache {
    pub fn new(file: PathBuf, staging: PathBuf, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            file,
            staging,
            entries: RwLock::new(HashMap::new()),
            sink,
        }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn get(&self, directory: &AccountPath) -> Option<Vec<FileRecord>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(directory).cloned()
    }

    /// Replace the listing for `directory`, returning the previous one
    pub fn replace(
        &self,
        directory: AccountPath,
        records: Vec<FileRecord>,
    ) -> Option<Vec<FileRecord>> {
        debug!(directory = %directory, entries = records.len(), "Cached directory listing");
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(directory, records)
    }

    pub fn remove(&self, directory: &AccountPath) -> Option<Vec<FileRecord>> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(directory)
    }

    /// Drop every listing belonging to `account`
    pub fn remove_account(&self, account: &AccountId) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|directory, _| directory.account() != account);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize every account's listings to the listing file
    pub fn save(&self) {
        if let Err(e) = self.try_save() {
            self.sink.best_effort_failed(BestEffortOp::ListingSave, &e);
        }
    }

    /// Merge the listing file into memory; entries already in memory win
    ///
    /// Returns how many listings were added.
    pub fn load(&self) -> usize {
        match self.try_load() {
            Ok(added) => added,
            Err(e) => {
                self.sink.best_effort_failed(BestEffortOp::ListingLoad, &e);
                0
            }
        }
    }

    /// Forget all listings and delete the listing file
    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();

        match fs::remove_file(&self.file) {
            Ok(()) => debug!(file = %self.file.display(), "Deleted listing cache file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => self
                .sink
                .best_effort_failed(BestEffortOp::ListingClear, &CacheError::io(&self.file, e)),
        }
    }

    fn try_save(&self) -> Result<(), CacheError> {
        let mut snapshot: Vec<PersistedListing> = {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            entries
                .iter()
                .map(|(directory, records)| PersistedListing {
                    directory: directory.clone(),
                    records: records.clone(),
                })
                .collect()
        };
        snapshot.sort_by(|a, b| a.directory.cmp(&b.directory));

        let json = serde_json::to_vec(&snapshot)?;

        let parent = self.file.parent().unwrap_or(Path::new("."));
        fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
        let mut tmp = stage_temp_file(&self.staging)?;
        tmp.write_all(&json).map_err(|e| CacheError::io(&self.file, e))?;
        tmp.persist(&self.file).map_err(|e| CacheError::io(&self.file, e.error))?;

        info!(file = %self.file.display(), listings = snapshot.len(), "Saved listing cache");
        Ok(())
    }

    fn try_load(&self) -> Result<usize, CacheError> {
        let bytes = match fs::read(&self.file) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(CacheError::io(&self.file, e)),
        };
        let loaded: Vec<PersistedListing> = serde_json::from_slice(&bytes)?;

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let mut added = 0;
        for listing in loaded {
            if let Entry::Vacant(slot) = entries.entry(listing.directory) {
                slot.insert(listing.records);
                added += 1;
            }
        }

        info!(file = %self.file.display(), added = added, "Loaded listing cache");
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSink;
    use tempfile::TempDir;

    fn dir(account: &str, path: &str) -> AccountPath {
        AccountPath::new(AccountId::new(account), path)
    }

    fn setup() -> (TempDir, Arc<RecordingSink>, ListingCache) {
        let tmp = TempDir::new().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let cache = ListingCache::new(
            tmp.path().join("listings.json"),
            tmp.path().join(".staging"),
            sink.clone(),
        );
        (tmp, sink, cache)
    }

    #[test]
    fn test_replace_is_wholesale() {
        let (_tmp, _sink, cache) = setup();
        let photos = dir("alice", "Photos");
        cache.replace(photos.clone(), vec![FileRecord::file("Photos/a.jpg", 1)]);
        let previous = cache.replace(photos.clone(), vec![FileRecord::file("Photos/b.jpg", 2)]);

        assert_eq!(previous, Some(vec![FileRecord::file("Photos/a.jpg", 1)]));
        assert_eq!(cache.get(&photos), Some(vec![FileRecord::file("Photos/b.jpg", 2)]));
    }

    #[test]
    fn test_save_then_load_into_fresh_cache() {
        let (tmp, sink, cache) = setup();
        let records = vec![
            FileRecord::directory("Photos/Cats"),
            FileRecord::file("Photos/a.jpg", 10).with_etag("abc"),
        ];
        cache.replace(dir("alice", "Photos"), records.clone());
        cache.replace(dir("bob", ""), vec![FileRecord::file("notes.txt", 3)]);
        cache.save();

        let reloaded = ListingCache::new(
            tmp.path().join("listings.json"),
            tmp.path().join(".staging"),
            sink.clone(),
        );
        assert_eq!(reloaded.load(), 2);
        assert_eq!(reloaded.get(&dir("alice", "Photos")), Some(records));
        assert_eq!(reloaded.len(), 2);
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_save_stages_outside_listing_dir() {
        let (tmp, sink, cache) = setup();
        cache.replace(dir("alice", ""), vec![FileRecord::file("a.txt", 1)]);
        cache.save();

        let mut names: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        assert_eq!(names, vec![".staging", "listings.json"]);
        assert_eq!(fs::read_dir(tmp.path().join(".staging")).unwrap().count(), 0);
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_load_keeps_in_memory_entries() {
        let (tmp, sink, cache) = setup();
        cache.replace(dir("alice", "Photos"), vec![FileRecord::file("Photos/old.jpg", 1)]);
        cache.replace(dir("alice", "Docs"), vec![FileRecord::file("Docs/a.txt", 1)]);
        cache.save();

        let fresh = ListingCache::new(
            tmp.path().join("listings.json"),
            tmp.path().join(".staging"),
            sink,
        );
        fresh.replace(dir("alice", "Photos"), vec![FileRecord::file("Photos/new.jpg", 2)]);

        assert_eq!(fresh.load(), 1);
        assert_eq!(
            fresh.get(&dir("alice", "Photos")),
            Some(vec![FileRecord::file("Photos/new.jpg", 2)])
        );
        assert!(fresh.get(&dir("alice", "Docs")).is_some());
    }

    #[test]
    fn test_load_missing_file_is_silent() {
        let (_tmp, sink, cache) = setup();
        assert_eq!(cache.load(), 0);
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_load_corrupt_file_is_reported() {
        let (_tmp, sink, cache) = setup();
        fs::write(cache.file(), b"not json").unwrap();

        assert_eq!(cache.load(), 0);
        assert_eq!(sink.ops(), vec![BestEffortOp::ListingLoad]);
    }

    #[test]
    fn test_save_failure_is_reported() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("blocker");
        fs::write(&blocker, b"file, not a dir").unwrap();
        let sink = Arc::new(RecordingSink::default());
        let cache = ListingCache::new(
            blocker.join("listings.json"),
            tmp.path().join(".staging"),
            sink.clone(),
        );
        cache.replace(dir("alice", ""), vec![]);

        cache.save();

        assert_eq!(sink.ops(), vec![BestEffortOp::ListingSave]);
    }

    #[test]
    fn test_clear_removes_memory_and_file() {
        let (_tmp, sink, cache) = setup();
        cache.replace(dir("alice", "Photos"), vec![]);
        cache.save();
        assert!(cache.file().exists());

        cache.clear();

        assert!(cache.is_empty());
        assert!(!cache.file().exists());
        // Clearing again with no file is not a failure
        cache.clear();
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_remove_account() {
        let (_tmp, _sink, cache) = setup();
        cache.replace(dir("alice", "a"), vec![]);
        cache.replace(dir("alice", "b"), vec![]);
        cache.replace(dir("bob", "a"), vec![]);

        assert_eq!(cache.remove_account(&AccountId::new("alice")), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&dir("bob", "a")).is_some());
    }
}
