//! Source row normalization
//!
//! Each origin table has its own column layout. A [`TableAdapter`] maps one
//! raw row of its table to the shared [`SourceRow`] shape.

use crate::catalog::models::{SourceKind, SourceRow};
use crate::catalog::sources::{PlatformLookup, RawRow, SourceSnapshot};
use crate::core::{DownloadUrl, RelativePath};

/// Language columns, in the order their values are kept
const LANGUAGE_COLUMNS: [&str; 5] = ["lang", "language", "language1", "language2", "language3"];

/// Result of normalizing a single raw row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    Row(SourceRow),
    /// No URL at all; the row is ignored without being counted
    NoUrl,
    /// URL present but no destination folder can be derived from it
    NoPath,
}

pub trait TableAdapter: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Download URL as described by this table's url column
    fn download_url(&self, row: &RawRow) -> Option<DownloadUrl>;

    fn normalize(&self, row: &RawRow, platforms: &PlatformLookup) -> Normalized {
        let Some(url) = self.download_url(row) else {
            return Normalized::NoUrl;
        };
        let Some(relative_path) = RelativePath::from_url(url.absolute()) else {
            return Normalized::NoPath;
        };

        let platform_code = row.get_owned("platform");
        let platform_name = platform_code
            .as_deref()
            .map(|code| platforms.name_for(code).to_string());

        Normalized::Row(SourceRow {
            kind: self.kind(),
            identity: row.identity(),
            url,
            relative_path,
            platform_code,
            platform_name,
            languages: extract_languages(row),
            name: row.get_owned("name"),
            category: row.get_owned("category"),
            title: row.get_owned("title"),
            description: row.get_owned("description"),
        })
    }
}

/// `game_demos`: url is absolute or relative to the downloads host
pub struct PrimaryDemoAdapter;

impl TableAdapter for PrimaryDemoAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::PrimaryDemo
    }

    fn download_url(&self, row: &RawRow) -> Option<DownloadUrl> {
        row.get("url").and_then(DownloadUrl::from_source)
    }
}

/// `director_demos`: same url layout as game demos, plus a `title` column
pub struct SecondaryDemoAdapter;

impl TableAdapter for SecondaryDemoAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::SecondaryDemo
    }

    fn download_url(&self, row: &RawRow) -> Option<DownloadUrl> {
        row.get("url").and_then(DownloadUrl::from_source)
    }
}

/// `game_downloads`: url is relative to the extras prefix
pub struct BundledDownloadAdapter;

impl TableAdapter for BundledDownloadAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::BundledDownload
    }

    fn download_url(&self, row: &RawRow) -> Option<DownloadUrl> {
        row.get("url").and_then(DownloadUrl::from_extras)
    }
}

/// Adapters for every source table, highest priority first
pub fn adapters() -> Vec<Box<dyn TableAdapter>> {
    vec![
        Box::new(PrimaryDemoAdapter),
        Box::new(SecondaryDemoAdapter),
        Box::new(BundledDownloadAdapter),
    ]
}

/// Normalize every table of a snapshot, keeping table order
pub fn normalize_snapshot(snapshot: &SourceSnapshot) -> Vec<(SourceKind, Vec<Normalized>)> {
    adapters()
        .iter()
        .map(|adapter| {
            let rows = snapshot
                .rows(adapter.kind())
                .iter()
                .map(|row| adapter.normalize(row, &snapshot.platforms))
                .collect();
            (adapter.kind(), rows)
        })
        .collect()
}

fn extract_languages(row: &RawRow) -> Vec<String> {
    let mut languages: Vec<String> = Vec::new();
    for column in LANGUAGE_COLUMNS {
        if let Some(value) = row.get(column) {
            if !languages.iter().any(|l| l == value) {
                languages.push(value.to_string());
            }
        }
    }
    languages
}
