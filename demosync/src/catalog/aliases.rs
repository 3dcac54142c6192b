//! Alias index
//!
//! Operators name assets in whatever form they have at hand: the folder
//! name, the `engine:code` identity, the bare code, or the download URL.
//! Every form resolves to the relative paths it designates.

use std::collections::{BTreeMap, BTreeSet};

use crate::catalog::models::{CanonicalEntry, Catalog};
use crate::core::RelativePath;
use crate::error::{SyncError, SyncResult};

#[derive(Debug, Default)]
pub struct AliasIndex {
    aliases: BTreeMap<String, BTreeSet<RelativePath>>,
}

impl AliasIndex {
    pub fn build(catalog: &Catalog) -> Self {
        let mut index = Self::default();
        for entry in catalog.entries() {
            for alias in aliases_of(entry) {
                index
                    .aliases
                    .entry(alias)
                    .or_default()
                    .insert(entry.relative_path.clone());
            }
        }
        index
    }

    /// Resolve one identifier. A folder name designates just that folder even
    /// when the same string is also some other entry's identity.
    pub fn resolve(&self, identifier: &str) -> SyncResult<BTreeSet<RelativePath>> {
        let key = identifier.trim();
        let paths = self
            .aliases
            .get(key)
            .filter(|paths| !paths.is_empty())
            .ok_or_else(|| SyncError::unknown_identifier(key))?;

        if let Some(exact) = RelativePath::new(key).filter(|p| paths.contains(p)) {
            return Ok(BTreeSet::from([exact]));
        }
        Ok(paths.clone())
    }
}

fn aliases_of(entry: &CanonicalEntry) -> Vec<String> {
    let mut aliases = vec![entry.relative_path.to_string()];

    let mut identities = Vec::new();
    if let Some(id) = &entry.game_id {
        identities.push(id.clone());
    }
    if let Some(id) = entry.source_row.as_ref().and_then(|r| r.identity.as_ref()) {
        if !identities.contains(id) {
            identities.push(id.clone());
        }
    }

    let url = entry.download_url();
    for id in &identities {
        aliases.push(id.to_string());
        aliases.push(id.short().to_string());
        if let Some(url) = &url {
            aliases.push(format!("{}/{}", id, url.file_name()));
            aliases.push(format!("{}/{}", id.short(), url.file_name()));
        }
    }

    if let Some(row) = &entry.source_row {
        aliases.push(row.url.relative().to_string());
        aliases.push(row.url.absolute().to_string());
    }
    if let Some(url) = url {
        aliases.push(url.relative().to_string());
        aliases.push(url.absolute().to_string());
    }

    aliases.sort();
    aliases.dedup();
    aliases
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::merger::merge;
    use crate::catalog::models::{OverrideEntry, SourceKind, SourceRow};
    use crate::catalog::overrides::OverrideStore;
    use crate::core::{DownloadUrl, GameId};
    use crate::error::ErrorCode;
    use std::collections::HashSet;

    fn row(id: &str, url: &str) -> SourceRow {
        let url = DownloadUrl::from_source(url).unwrap();
        SourceRow {
            kind: SourceKind::PrimaryDemo,
            identity: GameId::parse(id),
            relative_path: RelativePath::from_url(url.absolute()).unwrap(),
            url,
            platform_code: None,
            platform_name: None,
            languages: Vec::new(),
            name: None,
            category: None,
            title: None,
            description: None,
        }
    }

    fn index() -> AliasIndex {
        let rows = [
            row("scumm:ft", "/frs/demos/scumm/ft-dos-demo.zip"),
            row("scumm:ft", "/frs/demos/scumm/ft-mac-demo.zip"),
            row("sky:sky", "/frs/demos/sky/sky.zip"),
        ]
        .into_iter()
        .map(|r| (r.relative_path.clone(), r))
        .collect();
        let overrides: OverrideStore = [(
            RelativePath::new("curated").unwrap(),
            OverrideEntry {
                id: GameId::parse("agi:curated"),
                download_url: Some("/frs/extras/curated-v2.zip".into()),
                ..Default::default()
            },
        )]
        .into_iter()
        .collect();
        AliasIndex::build(&merge(&rows, &overrides, &HashSet::new()))
    }

    fn names(paths: BTreeSet<RelativePath>) -> Vec<String> {
        paths.into_iter().map(String::from).collect()
    }

    #[test]
    fn test_identity_forms_resolve_to_all_assets() {
        let index = index();
        let expected = vec!["ft-dos-demo".to_string(), "ft-mac-demo".to_string()];
        assert_eq!(names(index.resolve("scumm:ft").unwrap()), expected);
        assert_eq!(names(index.resolve("ft").unwrap()), expected);
    }

    #[test]
    fn test_url_forms_resolve() {
        let index = index();
        for alias in [
            "ft-mac-demo",
            "/frs/demos/scumm/ft-mac-demo.zip",
            "https://downloads.scummvm.org/frs/demos/scumm/ft-mac-demo.zip",
            "scumm:ft/ft-mac-demo.zip",
            "ft/ft-mac-demo.zip",
        ] {
            assert_eq!(names(index.resolve(alias).unwrap()), vec!["ft-mac-demo"], "{}", alias);
        }
        assert_eq!(
            names(index.resolve("https://downloads.scummvm.org/frs/extras/curated-v2.zip").unwrap()),
            vec!["curated"]
        );
    }

    #[test]
    fn test_folder_name_wins_over_identity() {
        // "sky" is both a folder and the short code of that same folder
        let index = index();
        assert_eq!(names(index.resolve("sky").unwrap()), vec!["sky"]);
    }

    #[test]
    fn test_unknown_identifier_fails() {
        let err = index().resolve("scumm:nope").unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownIdentifier);
        assert_eq!(err.details.as_deref(), Some("scumm:nope"));
    }
}
