//! Thumbnail keys and their parameter codec
//!
//! The same parameter rendering is used for the on-disk filename suffix
//! (`b.png?x=200&y=200&a=1`) and the preview-service query string, so the
//! two formats cannot drift apart.

use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::account::{Account, AccountPath};

/// Preview endpoint relative to the server base URL
const PREVIEW_PATH: &str = "index.php/core/preview.png";

/// Separates a cached file's base name from its thumbnail parameters
pub const SUFFIX_SEPARATOR: char = '?';

/// Whole-suffix shape: `x=..&y=..`, optionally `&a=1`, or just `a=1`
static SUFFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?s)(?P<base>.*)\?(?P<query>x=\d+&y=\d+(?:&a=1)?|a=1)$").expect("valid regex")
});

static SIZE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"x=(\d+)&y=(\d+)").expect("valid regex"));

/// How the server fits the image into the requested box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentMode {
    /// Crop to fill the box (`a=1`)
    Fill,
    /// Scale to fit inside the box
    #[default]
    Fit,
}

/// Target box; width and height always travel together
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Rendering parameters for a thumbnail
///
/// `size: None` means the server's default dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ThumbnailParams {
    pub size: Option<Dimensions>,
    pub mode: ContentMode,
}

impl ThumbnailParams {
    pub fn sized(width: u32, height: u32, mode: ContentMode) -> Self {
        Self {
            size: Some(Dimensions { width, height }),
            mode,
        }
    }

    /// Server-default size, fit mode: shares the plain file's cache slot
    pub fn is_default(&self) -> bool {
        self.size.is_none() && self.mode == ContentMode::Fit
    }

    /// Append `x=..&y=..` then `a=1`, each joined with `&`
    fn write_params(&self, out: &mut String) {
        if let Some(Dimensions { width, height }) = self.size {
            if !out.is_empty() {
                out.push('&');
            }
            let _ = write!(out, "x={}&y={}", width, height);
        }
        if self.mode == ContentMode::Fill {
            if !out.is_empty() {
                out.push('&');
            }
            out.push_str("a=1");
        }
    }

    /// Filename suffix (without the separator), None for default parameters
    pub fn suffix(&self) -> Option<String> {
        let mut out = String::new();
        self.write_params(&mut out);
        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }

    /// Decode parameters from a suffix or whole filename
    ///
    /// An `a=1` marker means fill; the rightmost `x=<int>&y=<int>` gives the
    /// size. Missing markers mean fit at default size.
    pub fn from_suffix(text: &str) -> Self {
        let mode = if text.contains("a=1") {
            ContentMode::Fill
        } else {
            ContentMode::Fit
        };
        let size = SIZE_RE.captures_iter(text).last().and_then(|caps| {
            let width = caps[1].parse().ok()?;
            let height = caps[2].parse().ok()?;
            Some(Dimensions { width, height })
        });
        Self { size, mode }
    }

    /// Preview-service query: `file, mode=cover[, x, y][, a=1]`
    pub fn preview_query(&self, path: &str) -> String {
        let file = format!("/{}", path.trim_start_matches('/'));
        let mut out = format!("file={}&mode=cover", urlencoding::encode(&file));
        self.write_params(&mut out);
        out
    }
}

/// An [`AccountPath`] plus thumbnail rendering parameters
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThumbnailKey {
    pub base: AccountPath,
    pub params: ThumbnailParams,
}

impl ThumbnailKey {
    pub fn new(base: AccountPath, params: ThumbnailParams) -> Self {
        Self { base, params }
    }

    /// File name of this variant on disk
    pub fn file_name(&self) -> String {
        variant_file_name(self.base.file_name(), &self.params)
    }
}

/// `<name>?<suffix>`, or just `<name>` for default parameters
pub fn variant_file_name(name: &str, params: &ThumbnailParams) -> String {
    match params.suffix() {
        Some(suffix) => format!("{}{}{}", name, SUFFIX_SEPARATOR, suffix),
        None => name.to_string(),
    }
}

/// Split a cached file name into its base name and parameters
pub fn split_file_name(file_name: &str) -> (&str, ThumbnailParams) {
    match SUFFIX_RE.captures(file_name) {
        Some(caps) => {
            let base = caps.name("base").map_or("", |m| m.as_str());
            let query = caps.name("query").map_or("", |m| m.as_str());
            (base, ThumbnailParams::from_suffix(query))
        }
        None => (file_name, ThumbnailParams::default()),
    }
}

/// Full preview-service URL for a thumbnail of `path`
pub fn preview_url(account: &Account, path: &str, params: &ThumbnailParams) -> String {
    format!(
        "{}/{}?{}",
        account.base_url,
        PREVIEW_PATH,
        params.preview_query(path)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::AccountId;

    fn key(path: &str, params: ThumbnailParams) -> ThumbnailKey {
        ThumbnailKey::new(AccountPath::new(AccountId::new("alice"), path), params)
    }

    #[test]
    fn test_fill_suffix_scenario() {
        let params = ThumbnailParams::sized(200, 200, ContentMode::Fill);
        let thumb = key("a/b.png", params);
        assert_eq!(thumb.file_name(), "b.png?x=200&y=200&a=1");

        let (base, decoded) = split_file_name("b.png?x=200&y=200&a=1");
        assert_eq!(base, "b.png");
        assert_eq!(decoded, params);
    }

    #[test]
    fn test_round_trip_variants() {
        let variants = [
            ThumbnailParams::default(),
            ThumbnailParams {
                size: None,
                mode: ContentMode::Fill,
            },
            ThumbnailParams::sized(64, 32, ContentMode::Fit),
            ThumbnailParams::sized(1024, 768, ContentMode::Fill),
        ];
        for params in variants {
            let name = key("dir/photo.jpg", params).file_name();
            let (base, decoded) = split_file_name(&name);
            assert_eq!(base, "photo.jpg", "base for {}", name);
            assert_eq!(decoded, params, "params for {}", name);
        }
    }

    #[test]
    fn test_default_has_no_suffix() {
        assert_eq!(ThumbnailParams::default().suffix(), None);
        assert_eq!(key("a/b.png", ThumbnailParams::default()).file_name(), "b.png");
    }

    #[test]
    fn test_fill_without_size() {
        let params = ThumbnailParams {
            size: None,
            mode: ContentMode::Fill,
        };
        assert_eq!(params.suffix().as_deref(), Some("a=1"));
    }

    #[test]
    fn test_rightmost_size_wins() {
        let params = ThumbnailParams::from_suffix("x=10&y=10&x=300&y=200");
        assert_eq!(
            params.size,
            Some(Dimensions {
                width: 300,
                height: 200
            })
        );
        assert_eq!(params.mode, ContentMode::Fit);
    }

    #[test]
    fn test_name_with_question_mark_is_not_a_variant() {
        let (base, params) = split_file_name("what?.txt");
        assert_eq!(base, "what?.txt");
        assert!(params.is_default());
    }

    #[test]
    fn test_preview_query_order() {
        let params = ThumbnailParams::sized(200, 100, ContentMode::Fill);
        assert_eq!(
            params.preview_query("Photos/cat.jpg"),
            "file=%2FPhotos%2Fcat.jpg&mode=cover&x=200&y=100&a=1"
        );
        assert_eq!(
            ThumbnailParams::default().preview_query("a.png"),
            "file=%2Fa.png&mode=cover"
        );
    }

    #[test]
    fn test_preview_url() {
        let account = Account::new("https://cloud.example.com", "alice", "pw");
        let params = ThumbnailParams::sized(64, 64, ContentMode::Fit);
        assert_eq!(
            preview_url(&account, "My Photos/cat.jpg", &params),
            "https://cloud.example.com/index.php/core/preview.png?file=%2FMy%20Photos%2Fcat.jpg&mode=cover&x=64&y=64"
        );
    }
}
