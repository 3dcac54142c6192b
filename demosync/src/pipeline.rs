//! End-to-end runs of the `sync` and `catalog` commands

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use crate::catalog::publish::{self, build_published};
use crate::catalog::{
    build_catalog, AliasIndex, Catalog, Denylist, OverrideStore, PublishedEntry, SourceSnapshot,
    SourceTables,
};
use crate::config::{requested_ids, CatalogArgs, SyncArgs};
use crate::core::RelativePath;
use crate::error::{SyncError, SyncResult};
use crate::logger;
use crate::reconcile::{reconcile, Reconciliation};
use crate::remote::{index, RemoteStore};
use crate::transfer::{AssetFetcher, Orchestrator, Outcome, TransferOptions, TransferRequest};

/// Findings collected over one run
#[derive(Debug, Default)]
pub struct RunReport {
    pub errors: Vec<SyncError>,
    pub warnings: Vec<String>,
    pub published: usize,
    pub transferred: usize,
}

impl RunReport {
    pub fn error(&mut self, err: SyncError) {
        logger::log_error(&err.to_string(), Some("pipeline"));
        self.errors.push(err);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        logger::log_warn(&message, Some("pipeline"));
        self.warnings.push(message);
    }

    /// 1 when any error was found, 0 otherwise
    pub fn exit_code(&self) -> i32 {
        if self.errors.is_empty() {
            0
        } else {
            1
        }
    }

    fn log_summary(&self) {
        logger::log_info(
            &format!(
                "Run finished: {} transferred, {} published, {} errors, {} warnings",
                self.transferred,
                self.published,
                self.errors.len(),
                self.warnings.len()
            ),
            Some("pipeline"),
        );
    }
}

/// External collaborators of a run
pub struct Context<'a> {
    pub sources: &'a dyn SourceTables,
    pub store: &'a dyn RemoteStore,
    pub fetcher: &'a dyn AssetFetcher,
}

/// Fetch the sources and merge them with the override store
pub async fn load_catalog(sources: &dyn SourceTables, metadata: &Path) -> SyncResult<Catalog> {
    let snapshot = SourceSnapshot::fetch(sources).await?;
    let overrides = OverrideStore::load(metadata)?;
    logger::log_info(
        &format!("Loaded {} override entries", overrides.len()),
        Some("pipeline"),
    );
    Ok(build_catalog(&snapshot, &overrides))
}

/// Open the session, run `body`, and close the session whatever happened
async fn with_session<T>(
    store: &dyn RemoteStore,
    body: impl std::future::Future<Output = SyncResult<T>>,
) -> SyncResult<T> {
    store
        .open_session()
        .await
        .map_err(|e| SyncError::remote_transport(e.to_string()))?;
    let result = body.await;
    if let Err(e) = store.close_session().await {
        logger::log_warn(&format!("Closing remote session failed: {}", e), Some("pipeline"));
    }
    result
}

/// One listing of the remote store; any failure is fatal
async fn remote_listing(store: &dyn RemoteStore) -> SyncResult<BTreeSet<String>> {
    let listing = store
        .list_dirs()
        .await
        .map_err(|e| SyncError::remote_transport(format!("Listing the remote store failed: {}", e)))?;
    logger::log_info(
        &format!("Remote store holds {} folders", listing.len()),
        Some("pipeline"),
    );
    Ok(listing)
}

fn report_remote_findings(report: &mut RunReport, findings: &Reconciliation) {
    for err in findings.orphaned_errors() {
        report.error(err);
    }
    for name in &findings.stale_uploads {
        report.warn(format!("Stale upload folder '{}' on the remote store", name));
    }
}

/// Entry selection for a sync run: explicit identifiers, or every syncable entry
fn select<'c>(
    catalog: &'c Catalog,
    ids: &[String],
    report: &mut RunReport,
) -> Vec<TransferRequest<'c>> {
    let ids = requested_ids(ids);
    if ids.is_empty() {
        return catalog
            .entries()
            .filter(|entry| entry.should_sync)
            .map(|entry| TransferRequest {
                entry,
                explicit: false,
            })
            .collect();
    }

    let aliases = AliasIndex::build(catalog);
    let mut selected: BTreeSet<RelativePath> = BTreeSet::new();
    for id in &ids {
        match aliases.resolve(id) {
            Ok(paths) => selected.extend(paths),
            Err(err) => report.error(err),
        }
    }
    selected
        .iter()
        .filter_map(|path| catalog.get(path))
        .map(|entry| TransferRequest {
            entry,
            explicit: true,
        })
        .collect()
}

pub async fn run_sync(ctx: &Context<'_>, args: &SyncArgs) -> SyncResult<RunReport> {
    let options = TransferOptions {
        max_transfers: args.max_transfers,
        ..TransferOptions::new(&args.download_dir)
    };
    run_sync_with(ctx, args, &options).await
}

pub async fn run_sync_with(
    ctx: &Context<'_>,
    args: &SyncArgs,
    options: &TransferOptions,
) -> SyncResult<RunReport> {
    let catalog = load_catalog(ctx.sources, &args.metadata).await?;
    let denylist = Denylist::load(&args.denylist);
    let mut report = RunReport::default();
    let requests = select(&catalog, &args.ids, &mut report);

    with_session(ctx.store, async {
        let mut listing = remote_listing(ctx.store).await?;
        report_remote_findings(&mut report, &reconcile(&catalog, &listing));

        let orchestrator = Orchestrator::new(ctx.store, ctx.fetcher, &denylist, options);
        let summary = orchestrator.run(requests, &mut listing).await?;
        for err in summary.failures() {
            report.error(err.clone());
        }
        report.transferred = summary.transferred.len();

        // Still absent after this run's transfers
        for path in reconcile(&catalog, &listing).missing {
            report.warn(format!("'{}' should be synced but is not on the remote store", path));
        }

        match index::rebuild_indexes(ctx.store, &summary.transferred).await {
            Ok(_) => {}
            Err(e) if e.is_connection_level() => return Err(e.into()),
            Err(e) => report.error(SyncError::from(e)),
        }

        let outcomes: HashMap<&RelativePath, &Outcome> = summary.outcomes.iter().collect();
        let published = build_published(catalog.entries().filter(|entry| {
            match outcomes.get(&entry.relative_path) {
                Some(outcome) => outcome.is_present(),
                None => listing.contains(entry.relative_path.as_str()),
            }
        }));
        write_catalog(&mut report, &args.output, &published);
        Ok(())
    })
    .await?;

    report.log_summary();
    Ok(report)
}

pub async fn run_catalog(ctx: &Context<'_>, args: &CatalogArgs) -> SyncResult<RunReport> {
    let catalog = load_catalog(ctx.sources, &args.metadata).await?;
    let mut report = RunReport::default();

    with_session(ctx.store, async {
        let listing = remote_listing(ctx.store).await?;
        let findings = reconcile(&catalog, &listing);
        report_remote_findings(&mut report, &findings);
        for err in findings.missing_errors() {
            report.error(err);
        }
        for path in &findings.unpublished {
            report.warn(format!(
                "'{}' is on the remote store but not publishable; left out of the catalog",
                path
            ));
        }

        let published = build_published(
            catalog
                .entries()
                .filter(|entry| listing.contains(entry.relative_path.as_str())),
        );
        write_catalog(&mut report, &args.output, &published);
        Ok(())
    })
    .await?;

    report.log_summary();
    Ok(report)
}

fn write_catalog(report: &mut RunReport, output: &Path, published: &[PublishedEntry]) {
    match publish::write_catalog(output, published) {
        Ok(()) => report.published = published.len(),
        Err(e) => report.error(SyncError::from(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::sources::tests::{row, FixtureTables};
    use crate::catalog::sources::SourceTable;
    use crate::config::RemoteArgs;
    use crate::error::ErrorCode;
    use crate::remote::LocalStore;
    use crate::transfer::download::tests::FakeFetcher;
    use crate::transfer::extract::tests::zip_bytes;
    use std::fs;
    use std::path::PathBuf;

    const DEMO1_URL: &str = "https://downloads.scummvm.org/frs/extras/demo1.zip";

    struct Workspace {
        _dir: tempfile::TempDir,
        root: PathBuf,
    }

    impl Workspace {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let root = dir.path().to_path_buf();
            fs::create_dir_all(root.join("remote")).unwrap();
            Self { _dir: dir, root }
        }

        fn remote(&self) -> PathBuf {
            self.root.join("remote")
        }

        fn sync_args(&self, ids: &[&str]) -> SyncArgs {
            SyncArgs {
                ids: ids.iter().map(|s| s.to_string()).collect(),
                download_dir: self.root.join("games"),
                output: self.root.join("games.json"),
                max_transfers: None,
                metadata: self.root.join("metadata.json"),
                denylist: self.root.join("blacklist.json"),
                remote: RemoteArgs::default(),
            }
        }

        fn catalog_args(&self) -> CatalogArgs {
            CatalogArgs {
                output: self.root.join("games.json"),
                metadata: self.root.join("metadata.json"),
                remote: RemoteArgs::default(),
            }
        }

        fn published(&self) -> serde_json::Value {
            serde_json::from_str(&fs::read_to_string(self.root.join("games.json")).unwrap()).unwrap()
        }
    }

    fn demo1_tables() -> FixtureTables {
        FixtureTables::default()
            .with(
                SourceTable::Compatibility,
                vec![row(&[("id", "engine:demo1")])],
            )
            .with(
                SourceTable::GameDownloads,
                vec![row(&[
                    ("game_id", "engine:demo1"),
                    ("name", "Demo One"),
                    ("category", "games"),
                    ("url", "demo1.zip"),
                ])],
            )
    }

    fn fetcher() -> FakeFetcher {
        FakeFetcher::default().with(DEMO1_URL, zip_bytes(&[("demo1/", ""), ("demo1/game.dat", "d")]))
    }

    /// Sync with the free-space guard off for scratch directories
    async fn sync(ctx: &Context<'_>, args: &SyncArgs) -> SyncResult<RunReport> {
        let options = TransferOptions {
            max_transfers: args.max_transfers,
            min_free_space: 0,
            ..TransferOptions::new(&args.download_dir)
        };
        run_sync_with(ctx, args, &options).await
    }

    #[tokio::test]
    async fn test_end_to_end_single_bundled_download() {
        let ws = Workspace::new();
        let tables = demo1_tables();
        let store = LocalStore::new(ws.remote());
        let fetcher = fetcher();
        let ctx = Context {
            sources: &tables,
            store: &store,
            fetcher: &fetcher,
        };

        let catalog = load_catalog(&tables, &ws.root.join("metadata.json")).await.unwrap();
        let entry = catalog.get(&RelativePath::new("demo1").unwrap()).unwrap();
        assert!(entry.should_sync && entry.should_publish);

        let report = sync(&ctx, &ws.sync_args(&[])).await.unwrap();
        assert_eq!(report.exit_code(), 0, "{:?}", report.errors);
        assert_eq!(report.transferred, 1);
        assert!(ws.remote().join("demo1/game.dat").is_file());
        assert!(ws.remote().join("demo1/index.json").is_file());
        assert!(ws.remote().join("index.json").is_file());

        assert_eq!(
            ws.published(),
            serde_json::json!([{
                "id": "engine:demo1",
                "relative_path": "demo1",
                "description": "Demo One",
                "download_url": DEMO1_URL,
            }])
        );
    }

    #[tokio::test]
    async fn test_second_run_transfers_nothing() {
        let ws = Workspace::new();
        let tables = demo1_tables();
        let store = LocalStore::new(ws.remote());
        let fetcher = fetcher();
        let ctx = Context {
            sources: &tables,
            store: &store,
            fetcher: &fetcher,
        };

        sync(&ctx, &ws.sync_args(&[])).await.unwrap();
        let first = fs::read_to_string(ws.root.join("games.json")).unwrap();
        let report = sync(&ctx, &ws.sync_args(&[])).await.unwrap();
        assert_eq!(report.transferred, 0);
        assert_eq!(fetcher.request_count(), 1);
        assert_eq!(fs::read_to_string(ws.root.join("games.json")).unwrap(), first);
    }

    #[tokio::test]
    async fn test_unknown_identifier_reported_others_processed() {
        let ws = Workspace::new();
        let tables = demo1_tables();
        let store = LocalStore::new(ws.remote());
        let fetcher = fetcher();
        let ctx = Context {
            sources: &tables,
            store: &store,
            fetcher: &fetcher,
        };

        let report = sync(&ctx, &ws.sync_args(&["scumm:nope", "testbed", "engine:demo1"]))
            .await
            .unwrap();
        assert_eq!(report.exit_code(), 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].code, ErrorCode::UnknownIdentifier);
        assert_eq!(report.transferred, 1);
    }

    #[tokio::test]
    async fn test_orphaned_remote_folder_fails_run() {
        let ws = Workspace::new();
        fs::create_dir_all(ws.remote().join("mystery")).unwrap();
        let tables = demo1_tables();
        let store = LocalStore::new(ws.remote());
        let fetcher = fetcher();
        let ctx = Context {
            sources: &tables,
            store: &store,
            fetcher: &fetcher,
        };

        let report = sync(&ctx, &ws.sync_args(&[])).await.unwrap();
        assert_eq!(report.exit_code(), 1);
        assert_eq!(report.errors[0].code, ErrorCode::OrphanedRemoteAsset);
        // Detection does not stop the transfer of other assets
        assert_eq!(report.transferred, 1);
    }

    #[tokio::test]
    async fn test_source_failure_aborts_before_transfers() {
        let ws = Workspace::new();
        let tables = FixtureTables {
            failing: Some(SourceTable::GameDownloads),
            ..demo1_tables()
        };
        let store = LocalStore::new(ws.remote());
        let fetcher = fetcher();
        let ctx = Context {
            sources: &tables,
            store: &store,
            fetcher: &fetcher,
        };

        let err = sync(&ctx, &ws.sync_args(&[])).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::SourceFetch);
        assert!(err.is_fatal());
        assert_eq!(fetcher.request_count(), 0);
        assert!(!ws.root.join("games.json").exists());
    }

    #[tokio::test]
    async fn test_catalog_command_reports_missing() {
        let ws = Workspace::new();
        fs::write(
            ws.root.join("metadata.json"),
            r#"{"extra": {"id": "engine:extra", "skip": false, "download_url": "/frs/extra.zip"}}"#,
        )
        .unwrap();
        fs::create_dir_all(ws.remote().join("extra")).unwrap();
        let tables = demo1_tables();
        let store = LocalStore::new(ws.remote());
        let fetcher = FakeFetcher::default();
        let ctx = Context {
            sources: &tables,
            store: &store,
            fetcher: &fetcher,
        };

        let report = run_catalog(&ctx, &ws.catalog_args()).await.unwrap();
        assert_eq!(report.exit_code(), 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].code, ErrorCode::MissingRequiredAsset);
        assert_eq!(report.errors[0].details.as_deref(), Some("demo1"));

        let published = ws.published();
        assert_eq!(published.as_array().unwrap().len(), 1);
        assert_eq!(published[0]["relative_path"], "extra");
        assert_eq!(
            published[0]["download_url"],
            "https://downloads.scummvm.org/frs/extra.zip"
        );
    }

    #[tokio::test]
    async fn test_invalid_override_store_is_fatal() {
        let ws = Workspace::new();
        fs::write(ws.root.join("metadata.json"), "[1, 2]").unwrap();
        let tables = demo1_tables();
        let store = LocalStore::new(ws.remote());
        let fetcher = FakeFetcher::default();
        let ctx = Context {
            sources: &tables,
            store: &store,
            fetcher: &fetcher,
        };
        let err = run_catalog(&ctx, &ws.catalog_args()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidOverrideStore);
    }
}
