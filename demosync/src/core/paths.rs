//! Canonical paths and download URLs
//!
//! A [`RelativePath`] is the folder name an asset occupies on the remote
//! store and the primary key of the catalog. A [`DownloadUrl`] keeps both
//! the form written in the source table and the normalized absolute form.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Host serving every relative download path
pub const DOWNLOADS_BASE: &str = "https://downloads.scummvm.org";

/// Prefix under which bundled-download rows store their files
pub const EXTRAS_PREFIX: &str = "/frs/extras/";

/// Payloads with this suffix are unpacked into a folder of the same stem
pub const ARCHIVE_SUFFIX: &str = ".zip";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct RelativePath(String);

impl RelativePath {
    /// Validate a folder name. Rejects blanks, separators and dot segments.
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty()
            || trimmed == "."
            || trimmed == ".."
            || trimmed.contains('/')
            || trimmed.contains('\\')
        {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    /// Derive the destination folder from a download URL.
    ///
    /// Only archives identify a folder: the final segment must end in the
    /// archive suffix, which is stripped.
    pub fn from_url(url: &str) -> Option<Self> {
        let without_query = url.split(['?', '#']).next().unwrap_or(url);
        let file_name = without_query.rsplit('/').next().unwrap_or(without_query);
        let stem = file_name.strip_suffix(ARCHIVE_SUFFIX)?;
        Self::new(stem)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lower-cased form used for deterministic ordering
    pub fn sort_key(&self) -> String {
        self.0.to_lowercase()
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RelativePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<RelativePath> for String {
    fn from(path: RelativePath) -> Self {
        path.0
    }
}

impl TryFrom<String> for RelativePath {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        RelativePath::new(&value).ok_or_else(|| format!("invalid relative path: '{}'", value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DownloadUrl {
    /// Path as written in the source (`/frs/...` for hosted files)
    relative: String,
    /// Fully qualified URL
    absolute: String,
}

impl DownloadUrl {
    /// URL column of a demo table: either absolute or relative to the downloads host
    pub fn from_source(raw: &str) -> Option<Self> {
        let value = raw.trim();
        if value.is_empty() {
            return None;
        }
        let relative = if value.starts_with("http://") || value.starts_with("https://") {
            match reqwest::Url::parse(value) {
                Ok(parsed) if !parsed.path().is_empty() && parsed.path() != "/" => {
                    parsed.path().to_string()
                }
                _ => value.to_string(),
            }
        } else {
            value.to_string()
        };
        Some(Self {
            relative,
            absolute: normalize_download_url(value),
        })
    }

    /// URL column of the bundled-downloads table, relative to the extras prefix
    pub fn from_extras(raw: &str) -> Option<Self> {
        let extras_path = raw.trim().trim_start_matches('/');
        if extras_path.is_empty() {
            return None;
        }
        let relative = format!("{}{}", EXTRAS_PREFIX, extras_path);
        let absolute = normalize_download_url(&relative);
        Some(Self { relative, absolute })
    }

    /// A curated URL (override store); the relative form mirrors the absolute one.
    pub fn from_override(raw: &str) -> Option<Self> {
        let value = raw.trim();
        if value.is_empty() {
            return None;
        }
        Self::from_source(value)
    }

    pub fn relative(&self) -> &str {
        &self.relative
    }

    pub fn absolute(&self) -> &str {
        &self.absolute
    }

    /// Final path segment, i.e. the local file name for the payload
    pub fn file_name(&self) -> &str {
        let without_query = self
            .absolute
            .split(['?', '#'])
            .next()
            .unwrap_or(&self.absolute);
        without_query.rsplit('/').next().unwrap_or(without_query)
    }

    pub fn is_archive(&self) -> bool {
        self.file_name().ends_with(ARCHIVE_SUFFIX)
    }
}

/// Normalize a download URL to its absolute form
pub fn normalize_download_url(url: &str) -> String {
    let value = url.trim();
    if value.is_empty() {
        return String::new();
    }
    let bare_host = DOWNLOADS_BASE
        .trim_start_matches("https://")
        .trim_start_matches("http://");

    if value.starts_with("/frs/") {
        format!("{}{}", DOWNLOADS_BASE, value)
    } else if value.starts_with("frs/") {
        format!("{}/{}", DOWNLOADS_BASE, value)
    } else if let Some(rest) = value.strip_prefix("//") {
        format!("https://{}", rest)
    } else if value.starts_with(bare_host) {
        format!("https://{}", value)
    } else {
        value.to_string()
    }
}

/// Sanitize a file path to prevent path traversal attacks
/// Returns None if the path is unsafe (contains `..` or is absolute)
pub fn sanitize_path(path: &Path) -> Option<PathBuf> {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(c) => result.push(c),
            Component::CurDir => {}              // Skip "."
            Component::ParentDir => return None, // Reject ".."
            Component::Prefix(_) | Component::RootDir => return None, // Reject absolute paths
        }
    }
    if result.as_os_str().is_empty() {
        None
    } else {
        Some(result)
    }
}
