//! Published catalog file

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

use crate::catalog::merger::published_entry;
use crate::catalog::models::{CanonicalEntry, PublishedEntry};
use crate::logger;

/// Build the published records, ordered by `(id, relative_path)` case-insensitively
pub fn build_published<'a>(entries: impl IntoIterator<Item = &'a CanonicalEntry>) -> Vec<PublishedEntry> {
    let mut published: Vec<PublishedEntry> = entries
        .into_iter()
        .filter(|entry| entry.should_publish)
        .map(published_entry)
        .collect();
    published.sort_by_cached_key(|p| {
        (
            p.id.as_deref().unwrap_or("").to_lowercase(),
            p.relative_path.to_lowercase(),
        )
    });
    published
}

/// Write the catalog next to its final location, then rename it into place
pub fn write_catalog(path: &Path, entries: &[PublishedEntry]) -> Result<()> {
    let json = serde_json::to_string_pretty(entries).context("Failed to serialize catalog")?;

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create directory {:?}", parent))?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp file in {:?}", parent))?;
    temp.write_all(json.as_bytes())
        .and_then(|_| temp.write_all(b"\n"))
        .context("Failed to write catalog")?;
    temp.persist(path)
        .with_context(|| format!("Failed to move catalog into place at {:?}", path))?;

    logger::log_info(
        &format!("Wrote {} catalog entries to {:?}", entries.len(), path),
        Some("publish"),
    );
    Ok(())
}
