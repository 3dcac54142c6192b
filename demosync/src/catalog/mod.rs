//! Catalog reconciliation engine

pub mod aliases;
pub mod eligibility;
pub mod merger;
pub mod models;
pub mod normalizer;
pub mod overrides;
pub mod publish;
pub mod sources;

pub use aliases::AliasIndex;
pub use models::{CanonicalEntry, Catalog, PublishedEntry};
pub use overrides::{Denylist, OverrideStore};
pub use sources::{SheetClient, SourceSnapshot, SourceTables};

use crate::logger;

/// Normalize, filter and merge one snapshot into the canonical catalog
pub fn build_catalog(snapshot: &SourceSnapshot, overrides: &OverrideStore) -> Catalog {
    let tables = normalizer::normalize_snapshot(snapshot);
    let eligible = eligibility::select(tables, overrides, &snapshot.compatibility);
    eligible.log_counts();

    let catalog = merger::merge(&eligible.rows, overrides, &snapshot.compatibility);
    logger::log_info(
        &format!(
            "Catalog has {} entries ({} to sync, {} to publish)",
            catalog.len(),
            catalog.entries().filter(|e| e.should_sync).count(),
            catalog.entries().filter(|e| e.should_publish).count()
        ),
        Some("catalog"),
    );
    catalog
}
