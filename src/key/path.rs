//! Server path normalization
//!
//! Servers report paths percent-encoded and prefixed with their mount point
//! (`/remote.php/dav/files/<user>/...`). Every cache tier works on the
//! canonical form: decoded, mount prefix removed, no leading separator.

use std::borrow::Cow;

/// Normalize a server-reported path into its canonical relative form
///
/// `base` is the account's known base URL (or any URL ending in the mount
/// point). The longest suffix of `base` that prefixes the decoded path is
/// stripped, so callers don't need to know the exact mount point. A suffix
/// only counts when it starts at a `/` in `base` (or is all of `base`) and
/// ends on a segment boundary in the path.
pub fn normalize_path(raw: &str, base: Option<&str>) -> String {
    let decoded = percent_decode(raw);
    let stripped = match base {
        Some(base) => strip_base(&decoded, &percent_decode(base)),
        None => &decoded,
    };
    stripped.trim_start_matches('/').trim_end_matches('/').to_string()
}

fn percent_decode(raw: &str) -> Cow<'_, str> {
    // Undecodable input (bad escapes, invalid UTF-8) stays as reported
    urlencoding::decode(raw).unwrap_or(Cow::Borrowed(raw))
}

fn strip_base<'a>(path: &'a str, base: &str) -> &'a str {
    let base = base.trim_end_matches('/');
    if base.is_empty() {
        return path;
    }

    // Earlier start index means a longer suffix, so the first hit wins
    let starts = std::iter::once(0).chain(base.match_indices('/').map(|(i, _)| i));
    for start in starts {
        let suffix = &base[start..];
        if let Some(rest) = path.strip_prefix(suffix) {
            if rest.is_empty() || rest.starts_with('/') {
                return rest;
            }
        }
    }

    path
}
