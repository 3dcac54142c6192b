//! Eligibility filter and source priority resolution

use std::collections::{BTreeMap, HashSet};

use crate::catalog::models::{SourceKind, SourceRow};
use crate::catalog::normalizer::Normalized;
use crate::catalog::overrides::OverrideStore;
use crate::core::{GameId, RelativePath};
use crate::logger;

/// Operator-facing counters for one source kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EligibilityCounts {
    pub added: usize,
    pub rejected: usize,
    pub incompatible: usize,
    pub kept_manually: usize,
    pub skipped_manually: usize,
    pub superseded: usize,
}

#[derive(Debug, Default)]
pub struct Eligible {
    /// Winning row per relative path
    pub rows: BTreeMap<RelativePath, SourceRow>,
    pub counts: BTreeMap<SourceKind, EligibilityCounts>,
}

impl Eligible {
    pub fn counts_for(&self, kind: SourceKind) -> EligibilityCounts {
        self.counts.get(&kind).copied().unwrap_or_default()
    }

    pub fn log_counts(&self) {
        for (kind, counts) in &self.counts {
            logger::log_info(
                &format!(
                    "{}: {} added, {} rejected, {} incompatible, {} kept manually, {} skipped manually, {} superseded",
                    kind.label(),
                    counts.added,
                    counts.rejected,
                    counts.incompatible,
                    counts.kept_manually,
                    counts.skipped_manually,
                    counts.superseded
                ),
                Some("eligibility"),
            );
        }
    }
}

/// Bundled downloads also carry addons and manuals; only games are assets.
fn is_rejected(row: &SourceRow) -> bool {
    if row.kind != SourceKind::BundledDownload {
        return false;
    }
    if let Some(name) = row.name.as_deref() {
        let lower = name.to_lowercase();
        if lower.contains("addon") || lower.contains("manuals") {
            return true;
        }
    }
    matches!(
        row.category.as_deref().map(str::trim),
        Some(category) if !category.is_empty() && !category.eq_ignore_ascii_case("games")
    )
}

/// Filter normalized rows and keep the highest-priority row per path.
///
/// Compatibility is only counted here; the merger decides what it means.
pub fn select(
    tables: Vec<(SourceKind, Vec<Normalized>)>,
    overrides: &OverrideStore,
    compatibility: &HashSet<GameId>,
) -> Eligible {
    let mut eligible = Eligible::default();

    for (kind, rows) in tables {
        eligible.counts.entry(kind).or_default();

        for normalized in rows {
            let row = match normalized {
                Normalized::Row(row) => row,
                Normalized::NoUrl => continue,
                Normalized::NoPath => {
                    bump(&mut eligible, kind, |c| c.rejected += 1);
                    continue;
                }
            };
            if is_rejected(&row) {
                bump(&mut eligible, kind, |c| c.rejected += 1);
                continue;
            }

            let metadata = overrides.get(&row.relative_path);
            let identity = metadata
                .and_then(|m| m.id.as_ref())
                .or(row.identity.as_ref());
            let compatible = identity.is_some_and(|id| compatibility.contains(id));
            match (compatible, metadata.and_then(|m| m.skip)) {
                (false, Some(false)) => bump(&mut eligible, kind, |c| c.kept_manually += 1),
                (false, _) => bump(&mut eligible, kind, |c| c.incompatible += 1),
                (true, Some(true)) => bump(&mut eligible, kind, |c| c.skipped_manually += 1),
                (true, _) => {}
            }

            match eligible.rows.get(&row.relative_path) {
                Some(existing) if existing.kind.priority() >= row.kind.priority() => {
                    crate::log_debug!(
                        &format!(
                            "{} from {} superseded by {}",
                            row.relative_path,
                            kind.label(),
                            existing.kind.label()
                        ),
                        "eligibility"
                    );
                    bump(&mut eligible, kind, |c| c.superseded += 1);
                }
                Some(existing) => {
                    let loser = existing.kind;
                    bump(&mut eligible, loser, |c| {
                        c.superseded += 1;
                        c.added -= 1;
                    });
                    bump(&mut eligible, kind, |c| c.added += 1);
                    eligible.rows.insert(row.relative_path.clone(), row);
                }
                None => {
                    bump(&mut eligible, kind, |c| c.added += 1);
                    eligible.rows.insert(row.relative_path.clone(), row);
                }
            }
        }
    }

    eligible
}

fn bump(eligible: &mut Eligible, kind: SourceKind, update: impl FnOnce(&mut EligibilityCounts)) {
    update(eligible.counts.entry(kind).or_default());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::models::OverrideEntry;
    use crate::core::DownloadUrl;

    fn source_row(kind: SourceKind, id: &str, url: &str) -> SourceRow {
        let url = match kind {
            SourceKind::BundledDownload => DownloadUrl::from_extras(url).unwrap(),
            _ => DownloadUrl::from_source(url).unwrap(),
        };
        SourceRow {
            kind,
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

    fn compat(ids: &[&str]) -> HashSet<GameId> {
        ids.iter().filter_map(|id| GameId::parse(id)).collect()
    }

    #[test]
    fn test_primary_wins_regardless_of_order() {
        let primary = source_row(SourceKind::PrimaryDemo, "scumm:ft", "/frs/demos/ft-demo.zip");
        let secondary = source_row(SourceKind::SecondaryDemo, "director:ft", "/frs/director/ft-demo.zip");

        for tables in [
            vec![
                (SourceKind::PrimaryDemo, vec![Normalized::Row(primary.clone())]),
                (SourceKind::SecondaryDemo, vec![Normalized::Row(secondary.clone())]),
            ],
            vec![
                (SourceKind::SecondaryDemo, vec![Normalized::Row(secondary.clone())]),
                (SourceKind::PrimaryDemo, vec![Normalized::Row(primary.clone())]),
            ],
        ] {
            let eligible = select(tables, &OverrideStore::default(), &compat(&["scumm:ft"]));
            let winner = &eligible.rows[&RelativePath::new("ft-demo").unwrap()];
            assert_eq!(winner.kind, SourceKind::PrimaryDemo);
            assert_eq!(eligible.counts_for(SourceKind::PrimaryDemo).added, 1);
            assert_eq!(eligible.counts_for(SourceKind::SecondaryDemo).added, 0);
            assert_eq!(eligible.counts_for(SourceKind::SecondaryDemo).superseded, 1);
        }
    }

    #[test]
    fn test_tie_keeps_first_seen() {
        let first = source_row(SourceKind::PrimaryDemo, "scumm:a", "/frs/demos/one/x.zip");
        let second = source_row(SourceKind::PrimaryDemo, "scumm:b", "/frs/demos/two/x.zip");
        let eligible = select(
            vec![(
                SourceKind::PrimaryDemo,
                vec![Normalized::Row(first), Normalized::Row(second)],
            )],
            &OverrideStore::default(),
            &HashSet::new(),
        );
        let winner = &eligible.rows[&RelativePath::new("x").unwrap()];
        assert_eq!(winner.identity.as_ref().unwrap().to_string(), "scumm:a");
    }

    #[test]
    fn test_bundled_rejections() {
        let mut addon = source_row(SourceKind::BundledDownload, "scumm:a", "a.zip");
        addon.name = Some("Monkey Island AddOn pack".into());
        let mut manual = source_row(SourceKind::BundledDownload, "scumm:b", "b.zip");
        manual.name = Some("Manuals".into());
        let mut extra = source_row(SourceKind::BundledDownload, "scumm:c", "c.zip");
        extra.category = Some("extras".into());
        let mut game = source_row(SourceKind::BundledDownload, "scumm:d", "d.zip");
        game.category = Some("games".into());

        let eligible = select(
            vec![(
                SourceKind::BundledDownload,
                vec![
                    Normalized::Row(addon),
                    Normalized::Row(manual),
                    Normalized::Row(extra),
                    Normalized::Row(game),
                    Normalized::NoPath,
                    Normalized::NoUrl,
                ],
            )],
            &OverrideStore::default(),
            &compat(&["scumm:d"]),
        );
        assert_eq!(eligible.rows.len(), 1);
        let counts = eligible.counts_for(SourceKind::BundledDownload);
        assert_eq!(counts.rejected, 4);
        assert_eq!(counts.added, 1);
    }

    #[test]
    fn test_category_match_ignores_case_and_padding() {
        let mut upper = source_row(SourceKind::BundledDownload, "scumm:cap", "cap.zip");
        upper.category = Some(" Games ".into());
        let mut blank = source_row(SourceKind::BundledDownload, "scumm:dig", "dig.zip");
        blank.category = Some("  ".into());

        let eligible = select(
            vec![(
                SourceKind::BundledDownload,
                vec![Normalized::Row(upper), Normalized::Row(blank)],
            )],
            &OverrideStore::default(),
            &compat(&["scumm:cap", "scumm:dig"]),
        );
        assert!(eligible.rows.contains_key(&RelativePath::new("cap").unwrap()));
        assert!(eligible.rows.contains_key(&RelativePath::new("dig").unwrap()));
        assert_eq!(eligible.counts_for(SourceKind::BundledDownload).rejected, 0);
    }

    #[test]
    fn test_manual_counters() {
        let kept = source_row(SourceKind::PrimaryDemo, "scumm:kept", "/frs/kept.zip");
        let skipped = source_row(SourceKind::PrimaryDemo, "scumm:skipped", "/frs/skipped.zip");
        let plain = source_row(SourceKind::PrimaryDemo, "scumm:plain", "/frs/plain.zip");
        let overrides: OverrideStore = [
            (
                RelativePath::new("kept").unwrap(),
                OverrideEntry { skip: Some(false), ..Default::default() },
            ),
            (
                RelativePath::new("skipped").unwrap(),
                OverrideEntry { skip: Some(true), ..Default::default() },
            ),
        ]
        .into_iter()
        .collect();

        let eligible = select(
            vec![(
                SourceKind::PrimaryDemo,
                vec![Normalized::Row(kept), Normalized::Row(skipped), Normalized::Row(plain)],
            )],
            &overrides,
            &compat(&["scumm:skipped"]),
        );
        let counts = eligible.counts_for(SourceKind::PrimaryDemo);
        assert_eq!(counts.kept_manually, 1);
        assert_eq!(counts.skipped_manually, 1);
        assert_eq!(counts.incompatible, 1);
        // Counting never drops a row
        assert_eq!(eligible.rows.len(), 3);
    }

    #[test]
    fn test_override_identity_used_for_compatibility() {
        let row = source_row(SourceKind::PrimaryDemo, "scumm:old", "/frs/renamed.zip");
        let overrides: OverrideStore = [(
            RelativePath::new("renamed").unwrap(),
            OverrideEntry { id: GameId::parse("scumm:new"), ..Default::default() },
        )]
        .into_iter()
        .collect();
        let eligible = select(
            vec![(SourceKind::PrimaryDemo, vec![Normalized::Row(row)])],
            &overrides,
            &compat(&["scumm:new"]),
        );
        assert_eq!(eligible.counts_for(SourceKind::PrimaryDemo).incompatible, 0);
    }
}
