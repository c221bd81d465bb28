//! Disk tier
//!
//! Mirrors the memory tier onto `<root>/<account dir>/<canonical path>`.
//! Thumbnail variants sit next to the plain file as `<name>?<suffix>`.
//! Existence on disk is the only state; there are no sidecar metadata files.
//! Writes are staged under the root's staging directory and renamed into
//! place, so nothing inside an account subtree is ever a temp file.

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info, trace};

use super::config::CacheConfig;
use crate::error::CacheError;
use crate::key::thumbnail::{split_file_name, SUFFIX_SEPARATOR};
use crate::key::{AccountId, AccountPath, CacheKey, ThumbnailKey};
use crate::remote::FileRecord;

/// Local disk cache for raw bytes
pub struct DiskCache {
    /// Root directory holding one subtree per account
    root: PathBuf,
    /// Persisted listing cache, never removed by tree operations
    listing_file: PathBuf,
    /// Holds in-flight writes, outside every account subtree
    staging: PathBuf,
}

impl DiskCache {
    /// Open (creating if needed) the cache root described by `config`
    pub fn open(config: &CacheConfig) -> Result<Self, CacheError> {
        fs::create_dir_all(&config.root).map_err(|e| CacheError::io(&config.root, e))?;

        let cache = Self {
            root: config.root.clone(),
            listing_file: config.listing_file.clone(),
            staging: config.staging_dir(),
        };

        // Clean up any temp files from interrupted writes
        cache.sweep_staging()?;

        info!(cache_dir = %cache.root.display(), "Disk cache initialized");
        Ok(cache)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn listing_file(&self) -> &Path {
        &self.listing_file
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging
    }

    /// Subtree holding everything cached for `account`
    pub fn account_dir(&self, account: &AccountId) -> PathBuf {
        self.root.join(account.dir_name())
    }

    /// Location of the plain entry for `key`
    pub fn resolve_path(&self, key: &AccountPath) -> PathBuf {
        let mut location = self.account_dir(key.account());
        for segment in key.path().split('/') {
            // Never let a server path climb out of the account subtree
            match segment {
                "" | "." | ".." => continue,
                segment => location.push(segment),
            }
        }
        location
    }

    /// Location of a thumbnail variant; default parameters share the plain slot
    pub fn resolve_thumbnail(&self, key: &ThumbnailKey) -> PathBuf {
        let location = self.resolve_path(&key.base);
        match key.params.suffix() {
            Some(suffix) => append_suffix(&location, &suffix),
            None => location,
        }
    }

    pub fn resolve(&self, key: &CacheKey) -> PathBuf {
        match key {
            CacheKey::Path(key) => self.resolve_path(key),
            CacheKey::Thumbnail(key) => self.resolve_thumbnail(key),
        }
    }

    /// Reverse of [`DiskCache::resolve_thumbnail`]
    ///
    /// Returns None for locations outside the root or whose first component
    /// is not an account directory.
    pub fn key_for_location(&self, location: &Path) -> Option<ThumbnailKey> {
        let relative = location.strip_prefix(&self.root).ok()?;
        let mut components = relative.components();
        let account = AccountId::from_dir_name(components.next()?.as_os_str().to_str()?)?;

        let mut segments = components
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<Vec<&str>>>()?;

        let (base_name, params) = match segments.pop() {
            Some(name) => split_file_name(name),
            None => ("", Default::default()),
        };
        segments.push(base_name);

        Some(ThumbnailKey::new(
            AccountPath::new(account, segments.join("/")),
            params,
        ))
    }

    /// Read an entry; a missing entry is absence, not an error
    pub fn read(&self, location: &Path) -> Result<Option<Vec<u8>>, CacheError> {
        match fs::read(location) {
            Ok(bytes) => {
                trace!(local = %location.display(), size = bytes.len(), "Disk cache HIT");
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                trace!(local = %location.display(), "Disk cache MISS");
                Ok(None)
            }
            // A directory sits where a file was expected
            Err(_) if location.is_dir() => Ok(None),
            Err(e) => Err(CacheError::io(location, e)),
        }
    }

    /// Write atomically: readers see the old or the new bytes, never a mix
    pub fn write(&self, bytes: &[u8], location: &Path) -> Result<(), CacheError> {
        let parent = location.parent().unwrap_or(&self.root);
        fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;

        let mut tmp = stage_temp_file(&self.staging)?;
        tmp.write_all(bytes).map_err(|e| CacheError::io(location, e))?;
        tmp.persist(location).map_err(|e| CacheError::io(location, e.error))?;

        debug!(
            local = %location.display(),
            size = bytes.len(),
            "Stored entry in disk cache"
        );
        Ok(())
    }

    /// Remove an entry (file or directory); absent entries are a no-op
    ///
    /// Returns whether anything was removed.
    pub fn delete(&self, location: &Path) -> Result<bool, CacheError> {
        let removed = self
            .remove_entry(location)
            .map_err(|e| CacheError::io(location, e))?;
        if removed {
            debug!(local = %location.display(), "Deleted disk cache entry");
        }
        Ok(removed)
    }

    /// Remove the plain entry for `key` and all of its thumbnail variants
    pub fn delete_variants(&self, key: &AccountPath) -> Result<usize, CacheError> {
        let location = self.resolve_path(key);
        let mut removed = usize::from(self.delete(&location)?);

        let (Some(parent), Some(name)) = (location.parent(), location.file_name()) else {
            return Ok(removed);
        };
        let entries = match fs::read_dir(parent) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(removed),
            Err(e) => return Err(CacheError::io(parent, e)),
        };

        for entry in entries {
            let entry = entry.map_err(|e| CacheError::io(parent, e))?;
            if is_variant_of(&entry.file_name(), name) && self.delete(&entry.path())? {
                removed += 1;
            }
        }

        Ok(removed)
    }

    /// Remove everything cached for `account`, keeping the listing file
    pub fn delete_account_tree(&self, account: &AccountId) -> Result<(), CacheError> {
        let dir = self.account_dir(account);
        if self.delete(&dir)? {
            info!(account = %account, "Deleted account disk cache");
        }
        Ok(())
    }

    /// Prune children of `directory` that the server no longer reports
    ///
    /// An entry survives if it is the resolved location of a record in
    /// `authoritative`, or a thumbnail variant of one. The listing file and
    /// in-flight temp files are never touched. Returns the number removed.
    pub fn cleanup(
        &self,
        directory: &AccountPath,
        authoritative: &[FileRecord],
    ) -> Result<usize, CacheError> {
        let dir_location = self.resolve_path(directory);
        if !dir_location.is_dir() {
            return Ok(0);
        }

        let keep: HashSet<PathBuf> = authoritative
            .iter()
            .map(|record| {
                self.resolve_path(&AccountPath::new(
                    directory.account().clone(),
                    record.path.as_str(),
                ))
            })
            .collect();

        let entries = match fs::read_dir(&dir_location) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(CacheError::io(&dir_location, e)),
        };

        let mut removed = 0;
        for entry in entries {
            let entry = entry.map_err(|e| CacheError::io(&dir_location, e))?;
            let path = entry.path();

            if path == self.listing_file || keep.contains(&path) {
                continue;
            }
            if self.is_variant_of_kept(&dir_location, &entry.file_name(), &keep) {
                continue;
            }

            if self.delete(&path)? {
                removed += 1;
            }
        }

        info!(directory = %directory, removed = removed, "Cleaned up stale cache entries");
        Ok(removed)
    }

    /// Accounts that currently have a subtree on disk
    pub fn accounts(&self) -> Result<Vec<AccountId>, CacheError> {
        let entries = fs::read_dir(&self.root).map_err(|e| CacheError::io(&self.root, e))?;

        let mut accounts = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| CacheError::io(&self.root, e))?;
            if !entry.path().is_dir() {
                continue;
            }
            if let Some(account) = entry.file_name().to_str().and_then(AccountId::from_dir_name) {
                accounts.push(account);
            }
        }
        accounts.sort();
        Ok(accounts)
    }

    fn is_variant_of_kept(
        &self,
        dir: &Path,
        file_name: &std::ffi::OsStr,
        keep: &HashSet<PathBuf>,
    ) -> bool {
        let Some(name) = file_name.to_str() else {
            return false;
        };
        let (base, params) = split_file_name(name);
        !params.is_default() && keep.contains(&dir.join(base))
    }

    /// Remove a file or tree, sparing the listing file wherever it lives
    fn remove_entry(&self, path: &Path) -> io::Result<bool> {
        if path == self.listing_file {
            return Ok(false);
        }

        let meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e),
        };

        let result = if !meta.is_dir() {
            fs::remove_file(path)
        } else if !self.listing_file.starts_with(path) {
            fs::remove_dir_all(path)
        } else {
            for entry in fs::read_dir(path)? {
                self.remove_entry(&entry?.path())?;
            }
            Ok(())
        };

        match result {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Empty the staging directory of files left by interrupted writes
    fn sweep_staging(&self) -> Result<(), CacheError> {
        match fs::remove_dir_all(&self.staging) {
            Ok(()) => debug!(staging = %self.staging.display(), "Removed stale staged writes"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(CacheError::io(&self.staging, e)),
        }
        fs::create_dir_all(&self.staging).map_err(|e| CacheError::io(&self.staging, e))
    }
}

/// New temp file in `staging`, recreating the directory if it went missing
pub(crate) fn stage_temp_file(staging: &Path) -> Result<NamedTempFile, CacheError> {
    fs::create_dir_all(staging).map_err(|e| CacheError::io(staging, e))?;
    NamedTempFile::new_in(staging).map_err(|e| CacheError::io(staging, e))
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(SUFFIX_SEPARATOR.to_string());
    name.push(suffix);
    PathBuf::from(name)
}

/// Whether `candidate` is a non-default thumbnail variant of `name`
fn is_variant_of(candidate: &std::ffi::OsStr, name: &std::ffi::OsStr) -> bool {
    let (Some(candidate), Some(name)) = (candidate.to_str(), name.to_str()) else {
        return false;
    };
    let (base, params) = split_file_name(candidate);
    base == name && !params.is_default()
}
