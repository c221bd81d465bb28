//! Account identity and the (account, path) key

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use super::path::normalize_path;

/// WebDAV files root relative to the server base URL
const DAV_FILES_PATH: &str = "remote.php/dav/files";

/// Opaque account identifier
///
/// Usually `"<user> <base url>"`, but any string works. The identifier is
/// also the name of the account's on-disk subtree (URL-safe base64), so two
/// accounts never share cached bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Directory name holding this account's cached files
    pub fn dir_name(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0.as_bytes())
    }

    /// Reverse of [`AccountId::dir_name`]
    ///
    /// Returns None for names that are not an encoded account (listing file,
    /// temp files, anything a user dropped into the cache root).
    pub fn from_dir_name(name: &str) -> Option<Self> {
        let bytes = URL_SAFE_NO_PAD.decode(name).ok()?;
        String::from_utf8(bytes).ok().map(Self)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Credentials and endpoint for one remote account
#[derive(Clone)]
pub struct Account {
    pub id: AccountId,
    /// Server base URL without trailing slash
    pub base_url: String,
    pub username: String,
    pub password: String,
}

impl Account {
    pub fn new(base_url: &str, username: &str, password: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            id: AccountId::new(format!("{} {}", username, base_url)),
            base_url,
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    /// Base URL of this user's WebDAV file tree
    pub fn dav_base(&self) -> String {
        format!("{}/{}/{}", self.base_url, DAV_FILES_PATH, self.username)
    }

    /// Key for a path as reported by the server (href or absolute path)
    pub fn key_for_href(&self, href: &str) -> AccountPath {
        AccountPath::new(self.id.clone(), normalize_path(href, Some(&self.dav_base())))
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Universal cache key: account plus canonical relative path
///
/// The path never starts with a separator, is never percent-encoded and never
/// carries the account's base URL. The empty path is the account root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountPath {
    account: AccountId,
    path: String,
}

impl AccountPath {
    /// Build a key from an already-canonical path
    pub fn new(account: AccountId, path: impl Into<String>) -> Self {
        let path = path.into();
        let path = match path.strip_prefix('/') {
            Some(stripped) => stripped.trim_start_matches('/').to_string(),
            None => path,
        };
        Self { account, path }
    }

    pub fn account(&self) -> &AccountId {
        &self.account
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last path component ("" for the account root)
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Path of the containing directory; None for the account root
    pub fn parent_path(&self) -> Option<&str> {
        if self.path.is_empty() {
            return None;
        }
        Some(self.path.rsplit_once('/').map_or("", |(parent, _)| parent))
    }

    /// Key for a direct child of this directory
    pub fn join(&self, name: &str) -> AccountPath {
        let name = name.trim_matches('/');
        let path = if self.path.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.path, name)
        };
        Self {
            account: self.account.clone(),
            path,
        }
    }
}

impl fmt::Display for AccountPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.account, self.path)
    }
}
