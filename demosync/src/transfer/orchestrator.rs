//! Per-asset transfer state machine
//!
//! Each asset is checked against the remote listing taken at the start of
//! the run. Absent assets are downloaded, unpacked, uploaded under a
//! temporary name and renamed into place.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::catalog::models::CanonicalEntry;
use crate::catalog::Denylist;
use crate::core::paths::ARCHIVE_SUFFIX;
use crate::core::{DownloadUrl, RelativePath};
use crate::error::{SyncError, SyncResult};
use crate::logger;
use crate::remote::{uploading_name, RemoteError, RemoteStore};

use super::download::{self, AssetFetcher, MIN_FREE_SPACE};
use super::extract::{self, extracting_path};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    AlreadyPresent,
    Transferred,
    /// Transfer cap reached; picked up by a later run
    Deferred,
    Denylisted,
    /// Explicitly requested but force-excluded
    Refused,
    Failed(SyncError),
}

impl Outcome {
    pub fn is_present(&self) -> bool {
        matches!(self, Outcome::AlreadyPresent | Outcome::Transferred)
    }
}

#[derive(Debug, Clone)]
pub struct TransferOptions {
    pub download_dir: PathBuf,
    /// New transfers allowed in this run
    pub max_transfers: Option<usize>,
    /// Free bytes required in `download_dir` before a download; 0 disables the check
    pub min_free_space: u64,
}

impl TransferOptions {
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
            max_transfers: None,
            min_free_space: MIN_FREE_SPACE,
        }
    }
}

/// An entry to process; `explicit` when the operator named it
#[derive(Debug, Clone, Copy)]
pub struct TransferRequest<'a> {
    pub entry: &'a CanonicalEntry,
    pub explicit: bool,
}

#[derive(Debug, Default)]
pub struct TransferSummary {
    pub outcomes: BTreeMap<RelativePath, Outcome>,
    /// Folders placed on the remote store by this run
    pub transferred: Vec<String>,
}

impl TransferSummary {
    pub fn count(&self, predicate: impl Fn(&Outcome) -> bool) -> usize {
        self.outcomes.values().filter(|o| predicate(o)).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &SyncError> {
        self.outcomes.values().filter_map(|o| match o {
            Outcome::Failed(err) => Some(err),
            _ => None,
        })
    }
}

pub struct Orchestrator<'a> {
    store: &'a dyn RemoteStore,
    fetcher: &'a dyn AssetFetcher,
    denylist: &'a Denylist,
    options: &'a TransferOptions,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        store: &'a dyn RemoteStore,
        fetcher: &'a dyn AssetFetcher,
        denylist: &'a Denylist,
        options: &'a TransferOptions,
    ) -> Self {
        Self {
            store,
            fetcher,
            denylist,
            options,
        }
    }

    /// Process every request. `remote` is the listing snapshot and gains
    /// each transferred folder. Only a connection-level failure aborts.
    pub async fn run(
        &self,
        mut requests: Vec<TransferRequest<'_>>,
        remote: &mut BTreeSet<String>,
    ) -> SyncResult<TransferSummary> {
        requests.sort_by_cached_key(|r| r.entry.relative_path.sort_key());
        fs::create_dir_all(&self.options.download_dir)?;

        let mut summary = TransferSummary::default();
        let mut attempted = 0usize;

        for request in requests {
            let entry = request.entry;
            let path = &entry.relative_path;
            let outcome = if self.denylist.contains(path) {
                Outcome::Denylisted
            } else if request.explicit && entry.is_force_excluded() {
                logger::log_warn(
                    &format!("Refusing to transfer '{}': it is force-excluded", path),
                    Some("transfer"),
                );
                Outcome::Refused
            } else if remote.contains(path.as_str()) {
                self.clean_local(path);
                Outcome::AlreadyPresent
            } else if self.options.max_transfers.is_some_and(|max| attempted >= max) {
                Outcome::Deferred
            } else {
                match entry.download_url() {
                    None => Outcome::Failed(SyncError::missing_download_source(path.as_str())),
                    Some(url) => {
                        attempted += 1;
                        match self.transfer(path, &url).await {
                            Ok(()) => {
                                remote.insert(path.to_string());
                                summary.transferred.push(path.to_string());
                                Outcome::Transferred
                            }
                            Err(err) if err.is_fatal() => return Err(err),
                            Err(err) => Outcome::Failed(err),
                        }
                    }
                }
            };

            match &outcome {
                Outcome::Failed(err) => logger::log_error(&err.to_string(), Some("transfer")),
                Outcome::Transferred => {
                    logger::log_info(&format!("Transferred '{}'", path), Some("transfer"))
                }
                other => crate::log_debug!(&format!("'{}': {:?}", path, other), "transfer"),
            }
            summary.outcomes.insert(path.clone(), outcome);
        }

        logger::log_info(
            &format!(
                "{} transferred, {} already present, {} deferred, {} failed",
                summary.count(|o| *o == Outcome::Transferred),
                summary.count(|o| *o == Outcome::AlreadyPresent),
                summary.count(|o| *o == Outcome::Deferred),
                summary.count(|o| matches!(o, Outcome::Failed(_)))
            ),
            Some("transfer"),
        );
        Ok(summary)
    }

    fn local_dir(&self, path: &RelativePath) -> PathBuf {
        self.options.download_dir.join(path.as_str())
    }

    fn local_archive(&self, path: &RelativePath) -> PathBuf {
        self.options
            .download_dir
            .join(format!("{}{}", path.as_str(), ARCHIVE_SUFFIX))
    }

    /// Leftovers of an asset the remote store already has
    fn clean_local(&self, path: &RelativePath) {
        let dir = self.local_dir(path);
        if dir.is_dir() {
            if let Err(e) = fs::remove_dir_all(&dir) {
                logger::log_warn(&format!("Could not remove {:?}: {}", dir, e), Some("transfer"));
            }
        }
        let archive = self.local_archive(path);
        if archive.is_file() {
            if let Err(e) = fs::remove_file(&archive) {
                logger::log_warn(&format!("Could not remove {:?}: {}", archive, e), Some("transfer"));
            }
        }
    }

    async fn transfer(&self, path: &RelativePath, url: &DownloadUrl) -> SyncResult<()> {
        let local = self.local_dir(path);
        if local.is_dir() {
            logger::log_info(&format!("Reusing local copy {:?}", local), Some("transfer"));
        } else {
            self.stage(path, url, &local)
                .await
                .map_err(|e| SyncError::transfer(path.as_str(), format!("{:#}", e)))?;
        }

        self.place(path, &local).await?;

        if let Err(e) = fs::remove_dir_all(&local) {
            logger::log_warn(&format!("Could not remove {:?}: {}", local, e), Some("transfer"));
        }
        Ok(())
    }

    /// Download (and unpack) the payload into `local`
    async fn stage(&self, path: &RelativePath, url: &DownloadUrl, local: &Path) -> anyhow::Result<()> {
        if self.options.min_free_space > 0 {
            download::ensure_free_space(&self.options.download_dir, self.options.min_free_space)?;
        }

        if url.is_archive() {
            let archive = self.local_archive(path);
            download::download_payload(self.fetcher, url, &archive).await?;
            let dest = local.to_path_buf();
            tokio::task::spawn_blocking(move || extract::extract_archive(&archive, &dest))
                .await
                .map_err(|e| anyhow::anyhow!("Extraction task failed: {}", e))??;
        } else {
            let staging = extracting_path(local);
            if staging.exists() {
                fs::remove_dir_all(&staging)?;
            }
            fs::create_dir_all(&staging)?;
            let file = staging.join(url.file_name());
            if let Err(e) = download::download_payload(self.fetcher, url, &file).await {
                let _ = fs::remove_dir_all(&staging);
                return Err(e);
            }
            fs::rename(&staging, local)?;
        }
        Ok(())
    }

    /// Upload under the temporary name, then rename to the final one
    async fn place(&self, path: &RelativePath, local: &Path) -> SyncResult<()> {
        let name = path.as_str();
        let temp = uploading_name(name);
        let remote_err = |e: RemoteError| -> SyncError {
            if e.is_connection_level() {
                SyncError::remote_transport(e.to_string())
            } else {
                SyncError::transfer(name, format!("Upload failed: {}", e))
            }
        };

        self.store.remove(&temp).await.map_err(remote_err)?;
        let placed = match self.store.upload_dir(local, &temp).await {
            Ok(()) => self.store.rename(&temp, name).await,
            Err(e) => Err(e),
        };
        if let Err(e) = placed {
            if !e.is_connection_level() {
                if let Err(cleanup) = self.store.remove(&temp).await {
                    logger::log_warn(
                        &format!("Could not remove remote '{}': {}", temp, cleanup),
                        Some("transfer"),
                    );
                }
            }
            return Err(remote_err(e));
        }

        if !self.store.dir_exists(name).await.map_err(remote_err)? {
            return Err(SyncError::transfer(
                name,
                "Rename reported success but the folder is missing",
            ));
        }
        Ok(())
    }
}
