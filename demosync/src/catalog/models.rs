use serde::Serialize;
use std::collections::BTreeMap;

use crate::core::{DownloadUrl, GameId, RelativePath};

/// Origin table of a source row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceKind {
    PrimaryDemo,
    SecondaryDemo,
    BundledDownload,
}

impl SourceKind {
    /// Higher wins when two sources produce the same relative path
    pub fn priority(self) -> u8 {
        match self {
            SourceKind::PrimaryDemo => 3,
            SourceKind::SecondaryDemo => 2,
            SourceKind::BundledDownload => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SourceKind::PrimaryDemo => "game demos",
            SourceKind::SecondaryDemo => "director demos",
            SourceKind::BundledDownload => "game downloads",
        }
    }
}

/// One normalized row of a source table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRow {
    pub kind: SourceKind,
    pub identity: Option<GameId>,
    pub url: DownloadUrl,
    pub relative_path: RelativePath,
    pub platform_code: Option<String>,
    /// Platform display name, falling back to the code
    pub platform_name: Option<String>,
    /// Ordered, deduplicated
    pub languages: Vec<String>,
    pub name: Option<String>,
    pub category: Option<String>,
    pub title: Option<String>,
    /// Free-text description column, if the table has one
    pub description: Option<String>,
}

impl SourceRow {
    /// Catalog description derived from the row alone.
    ///
    /// Bundled downloads use their name; director demos become
    /// `"<platform> <title> Demo"`; game demos become `"<platform> <category> Demo"`.
    /// Rows without the per-source hint fall back to any free-text column and
    /// finally to `"<platform> Demo"`.
    pub fn synthesized_description(&self) -> Option<String> {
        let platform = self.platform_name.as_deref().unwrap_or("");
        let described = |hint: &str| -> String {
            if platform.is_empty() {
                hint.to_string()
            } else {
                format!("{} {} Demo", platform, hint)
            }
        };

        let primary = match self.kind {
            SourceKind::BundledDownload => self.name.clone(),
            SourceKind::SecondaryDemo => self.title.as_deref().map(described),
            SourceKind::PrimaryDemo => self.category.as_deref().map(described),
        };
        if primary.is_some() {
            return primary;
        }

        self.description
            .clone()
            .or_else(|| self.name.clone())
            .or_else(|| self.title.clone())
            .or_else(|| (!platform.is_empty()).then(|| format!("{} Demo", platform)))
    }
}

/// Manually curated record from the override store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideEntry {
    pub id: Option<GameId>,
    /// `Some(true)` force-excludes, `Some(false)` force-includes
    pub skip: Option<bool>,
    pub description: Option<String>,
    pub download_url: Option<String>,
    pub languages: Option<Vec<String>>,
    pub platform: Option<String>,
}

/// Explicit override decision for one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipForced {
    Exclude,
    Include,
}

impl SkipForced {
    pub fn from_flag(skip: Option<bool>) -> Option<Self> {
        match skip {
            Some(true) => Some(SkipForced::Exclude),
            Some(false) => Some(SkipForced::Include),
            None => None,
        }
    }
}

/// Canonical catalog entry, one per relative path
#[derive(Debug, Clone)]
pub struct CanonicalEntry {
    pub relative_path: RelativePath,
    pub metadata: Option<OverrideEntry>,
    pub source_row: Option<SourceRow>,
    pub game_id: Option<GameId>,
    pub is_in_compatibility_table: bool,
    pub skip_forced: Option<SkipForced>,
    pub should_sync: bool,
    pub should_publish: bool,
}

impl CanonicalEntry {
    pub fn is_force_excluded(&self) -> bool {
        self.skip_forced == Some(SkipForced::Exclude)
    }

    /// Download source: a curated URL wins over the source row
    pub fn download_url(&self) -> Option<DownloadUrl> {
        self.metadata
            .as_ref()
            .and_then(|m| m.download_url.as_deref())
            .and_then(DownloadUrl::from_override)
            .or_else(|| self.source_row.as_ref().map(|row| row.url.clone()))
    }
}

/// The merged catalog, keyed by relative path
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: BTreeMap<RelativePath, CanonicalEntry>,
}

impl Catalog {
    pub fn insert(&mut self, entry: CanonicalEntry) {
        self.entries.insert(entry.relative_path.clone(), entry);
    }

    pub fn get(&self, path: &RelativePath) -> Option<&CanonicalEntry> {
        self.entries.get(path)
    }

    /// Lookup by raw folder name
    pub fn get_by_name(&self, name: &str) -> Option<&CanonicalEntry> {
        RelativePath::new(name).and_then(|path| self.entries.get(&path))
    }

    pub fn contains(&self, path: &RelativePath) -> bool {
        self.entries.contains_key(path)
    }

    pub fn entries(&self) -> impl Iterator<Item = &CanonicalEntry> {
        self.entries.values()
    }

    pub fn paths(&self) -> impl Iterator<Item = &RelativePath> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One element of the published catalog file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub relative_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub languages: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}
