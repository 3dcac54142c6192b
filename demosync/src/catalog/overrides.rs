//! Override store and denylist files
//!
//! Both are hand-edited JSON objects keyed by relative path. A missing or
//! unparsable file reads as empty; an override file whose top level parses
//! but is not an object is rejected.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use crate::catalog::models::OverrideEntry;
use crate::core::{GameId, RelativePath};
use crate::error::{SyncError, SyncResult};
use crate::logger;

#[derive(Debug, Clone, Default)]
pub struct OverrideStore {
    entries: BTreeMap<RelativePath, OverrideEntry>,
}

impl OverrideStore {
    pub fn load(path: &Path) -> SyncResult<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                logger::log_info(
                    &format!("No override store at {:?}, using none", path),
                    Some("overrides"),
                );
                return Ok(Self::default());
            }
            Err(e) => {
                logger::log_warn(
                    &format!("Could not read override store {:?}: {}", path, e),
                    Some("overrides"),
                );
                return Ok(Self::default());
            }
        };
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> SyncResult<Self> {
        let raw: Value = match serde_json::from_str(content) {
            Ok(value) => value,
            Err(e) => {
                logger::log_warn(
                    &format!("Override store is malformed, ignoring it: {}", e),
                    Some("overrides"),
                );
                return Ok(Self::default());
            }
        };

        let Value::Object(map) = raw else {
            return Err(SyncError::invalid_override_store(
                "Override store must contain an object at the top level",
            ));
        };

        let mut entries = BTreeMap::new();
        for (key, value) in map {
            let Some(path) = RelativePath::new(&key) else {
                logger::log_warn(
                    &format!("Ignoring override with invalid path '{}'", key),
                    Some("overrides"),
                );
                continue;
            };
            entries.insert(path, parse_entry(&value));
        }
        Ok(Self { entries })
    }

    pub fn get(&self, path: &RelativePath) -> Option<&OverrideEntry> {
        self.entries.get(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RelativePath, &OverrideEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(RelativePath, OverrideEntry)> for OverrideStore {
    fn from_iter<I: IntoIterator<Item = (RelativePath, OverrideEntry)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Lenient field extraction: wrong types read as absent
fn parse_entry(value: &Value) -> OverrideEntry {
    let Value::Object(fields) = value else {
        return OverrideEntry::default();
    };
    let text = |key: &str| -> Option<String> {
        fields
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let languages = fields.get("languages").and_then(Value::as_array).map(|items| {
        items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>()
    });

    OverrideEntry {
        id: text("id").as_deref().and_then(GameId::parse),
        skip: fields.get("skip").and_then(Value::as_bool),
        description: text("description"),
        download_url: text("download_url"),
        languages: languages.filter(|l| !l.is_empty()),
        platform: text("platform"),
    }
}

/// Relative paths that are never transferred
#[derive(Debug, Clone, Default)]
pub struct Denylist(BTreeSet<String>);

impl Denylist {
    pub fn load(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                logger::log_warn(
                    &format!("Could not read denylist {:?}: {}", path, e),
                    Some("overrides"),
                );
                return Self::default();
            }
        };
        match serde_json::from_str::<serde_json::Map<String, Value>>(&content) {
            Ok(map) => Self(map.into_iter().map(|(k, _)| k).collect()),
            Err(e) => {
                logger::log_warn(
                    &format!("Could not load denylist {:?}: {}", path, e),
                    Some("overrides"),
                );
                Self::default()
            }
        }
    }

    pub fn contains(&self, path: &RelativePath) -> bool {
        self.0.contains(path.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for Denylist {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn path(s: &str) -> RelativePath {
        RelativePath::new(s).unwrap()
    }

    #[test]
    fn test_parse_fields() {
        let store = OverrideStore::parse(
            r#"{
                "ft-demo": {
                    "id": "scumm:ft",
                    "skip": false,
                    "description": "Full Throttle Demo",
                    "download_url": "/frs/demos/ft.zip",
                    "languages": ["en", "de", 3],
                    "platform": "DOS"
                }
            }"#,
        )
        .unwrap();
        let entry = store.get(&path("ft-demo")).unwrap();
        assert_eq!(entry.id.as_ref().unwrap().to_string(), "scumm:ft");
        assert_eq!(entry.skip, Some(false));
        assert_eq!(entry.languages.as_deref(), Some(&["en".to_string(), "de".to_string()][..]));
        assert_eq!(entry.platform.as_deref(), Some("DOS"));
    }

    #[test]
    fn test_non_bool_skip_is_unset() {
        let store = OverrideStore::parse(r#"{"a": {"skip": "yes"}, "b": 7}"#).unwrap();
        assert_eq!(store.get(&path("a")).unwrap().skip, None);
        assert_eq!(store.get(&path("b")).unwrap(), &OverrideEntry::default());
    }

    #[test]
    fn test_malformed_store_reads_as_empty() {
        let store = OverrideStore::parse("{ not json").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_non_object_top_level_is_fatal() {
        let err = OverrideStore::parse(r#"["a", "b"]"#).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidOverrideStore);
        assert!(err.is_fatal());
    }

    #[test]
    fn test_missing_files_read_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = OverrideStore::load(&dir.path().join("metadata.json")).unwrap();
        assert!(store.is_empty());
        let denylist = Denylist::load(&dir.path().join("blacklist.json"));
        assert!(denylist.is_empty());
    }

    #[test]
    fn test_denylist_keys() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("blacklist.json");
        fs::write(&file, r#"{"broken-demo": "crashes on start", "other": {}}"#).unwrap();
        let denylist = Denylist::load(&file);
        assert_eq!(denylist.len(), 2);
        assert!(denylist.contains(&path("broken-demo")));
        assert!(!denylist.contains(&path("fine-demo")));
    }
}
