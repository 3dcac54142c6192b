//! Catalog merger
//!
//! Combines the winning source rows with the override store into one
//! [`CanonicalEntry`] per relative path and derives the publish/sync flags.

use std::collections::{BTreeMap, HashSet};

use crate::catalog::models::{
    CanonicalEntry, Catalog, OverrideEntry, PublishedEntry, SkipForced, SourceRow,
};
use crate::catalog::overrides::OverrideStore;
use crate::core::paths::normalize_download_url;
use crate::core::{GameId, RelativePath};

/// `(should_sync, should_publish)` for one entry
fn decide(skip_forced: Option<SkipForced>, in_compatibility: bool, curated: bool) -> (bool, bool) {
    match skip_forced {
        Some(SkipForced::Exclude) => (false, false),
        Some(SkipForced::Include) => (true, true),
        None => (in_compatibility, curated || in_compatibility),
    }
}

pub fn merge(
    rows: &BTreeMap<RelativePath, SourceRow>,
    overrides: &OverrideStore,
    compatibility: &HashSet<GameId>,
) -> Catalog {
    let mut catalog = Catalog::default();

    for (path, row) in rows {
        let metadata = overrides.get(path).cloned();
        catalog.insert(build_entry(path.clone(), metadata, Some(row.clone()), compatibility));
    }

    for (path, metadata) in overrides.iter() {
        if rows.contains_key(path) {
            continue;
        }
        catalog.insert(build_entry(path.clone(), Some(metadata.clone()), None, compatibility));
    }

    catalog
}

fn build_entry(
    relative_path: RelativePath,
    metadata: Option<OverrideEntry>,
    source_row: Option<SourceRow>,
    compatibility: &HashSet<GameId>,
) -> CanonicalEntry {
    let game_id = metadata
        .as_ref()
        .and_then(|m| m.id.clone())
        .or_else(|| source_row.as_ref().and_then(|r| r.identity.clone()));
    let is_in_compatibility_table = game_id
        .as_ref()
        .is_some_and(|id| compatibility.contains(id));
    let skip_forced = SkipForced::from_flag(metadata.as_ref().and_then(|m| m.skip));
    let (should_sync, should_publish) =
        decide(skip_forced, is_in_compatibility_table, metadata.is_some());

    CanonicalEntry {
        relative_path,
        metadata,
        source_row,
        game_id,
        is_in_compatibility_table,
        skip_forced,
        should_sync,
        should_publish,
    }
}

/// A lone English entry is the assumed default and is not published
fn published_languages(languages: &[String]) -> Option<Vec<String>> {
    match languages {
        [] => None,
        [only] if only.eq_ignore_ascii_case("en") => None,
        _ => Some(languages.to_vec()),
    }
}

/// Field-level merge for the catalog file: curated values win when non-empty
pub fn published_entry(entry: &CanonicalEntry) -> PublishedEntry {
    let metadata = entry.metadata.as_ref();
    let row = entry.source_row.as_ref();

    let description = metadata
        .and_then(|m| m.description.clone())
        .or_else(|| row.and_then(SourceRow::synthesized_description));

    let download_url = metadata
        .and_then(|m| m.download_url.as_deref())
        .map(normalize_download_url)
        .or_else(|| row.map(|r| r.url.absolute().to_string()))
        .filter(|url| !url.is_empty());

    let languages = metadata
        .and_then(|m| m.languages.clone())
        .or_else(|| row.map(|r| r.languages.clone()))
        .and_then(|langs| published_languages(&langs));

    let platform = metadata
        .and_then(|m| m.platform.clone())
        .or_else(|| row.and_then(|r| r.platform_name.clone()));

    PublishedEntry {
        id: entry.game_id.as_ref().map(ToString::to_string),
        relative_path: entry.relative_path.to_string(),
        description,
        download_url,
        languages,
        platform,
    }
}
