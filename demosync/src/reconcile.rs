//! Remote state reconciler
//!
//! Compares the catalog with one listing of the remote store.

use std::collections::BTreeSet;

use crate::catalog::Catalog;
use crate::core::RelativePath;
use crate::error::SyncError;
use crate::remote::UPLOADING_SUFFIX;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Remote folders with no catalog entry at all
    pub orphaned: Vec<String>,
    /// Entries to sync that the remote store lacks
    pub missing: Vec<RelativePath>,
    /// Leftover temporary upload folders
    pub stale_uploads: Vec<String>,
    /// Present remotely with an entry that is neither publishable nor force-excluded
    pub unpublished: Vec<RelativePath>,
}

impl Reconciliation {
    pub fn orphaned_errors(&self) -> Vec<SyncError> {
        self.orphaned.iter().map(|name| SyncError::orphaned(name)).collect()
    }

    pub fn missing_errors(&self) -> Vec<SyncError> {
        self.missing
            .iter()
            .map(|path| SyncError::missing(path.as_str()))
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        self.orphaned.is_empty() && self.missing.is_empty()
    }
}

pub fn reconcile(catalog: &Catalog, listing: &BTreeSet<String>) -> Reconciliation {
    let mut result = Reconciliation::default();

    for name in listing {
        if name.starts_with('.') {
            continue;
        }
        if name.ends_with(UPLOADING_SUFFIX) {
            result.stale_uploads.push(name.clone());
            continue;
        }
        match catalog.get_by_name(name) {
            None => result.orphaned.push(name.clone()),
            Some(entry) if entry.is_force_excluded() => {}
            Some(entry) if !entry.should_publish => {
                result.unpublished.push(entry.relative_path.clone())
            }
            Some(_) => {}
        }
    }

    result.missing = catalog
        .entries()
        .filter(|entry| entry.should_sync && !listing.contains(entry.relative_path.as_str()))
        .map(|entry| entry.relative_path.clone())
        .collect();

    result
}
