//! Remote asset store
//!
//! The store is a flat directory of asset folders. Every operation takes
//! names relative to the store base.

pub mod index;
pub mod local;
pub mod ssh;

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;

pub use local::LocalStore;
pub use ssh::SshStore;

/// Suffix of a folder that is still being uploaded
pub const UPLOADING_SUFFIX: &str = ".uploading";

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("connection to remote store failed: {0}")]
    Connection(String),

    #[error("remote command timed out after {0}s")]
    Timeout(u64),

    #[error("remote command failed (exit {code}): {stderr}")]
    CommandFailed { code: i32, stderr: String },

    #[error("remote store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RemoteError {
    /// Errors after which no further remote call can be trusted
    pub fn is_connection_level(&self) -> bool {
        matches!(self, RemoteError::Connection(_) | RemoteError::Timeout(_))
    }
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// One node of a recursive listing
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteNode {
    /// Path relative to the store base, `/`-separated
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
    /// Seconds since the epoch
    pub mtime: f64,
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Called once before any other operation
    async fn open_session(&self) -> RemoteResult<()> {
        Ok(())
    }

    async fn close_session(&self) -> RemoteResult<()> {
        Ok(())
    }

    /// Names of the immediate sub-directories of the store base
    async fn list_dirs(&self) -> RemoteResult<BTreeSet<String>>;

    /// A clean "does not exist" is `Ok(false)`, never an error
    async fn dir_exists(&self, name: &str) -> RemoteResult<bool>;

    /// Copy a local directory to `<base>/<name>`
    async fn upload_dir(&self, local: &Path, name: &str) -> RemoteResult<()>;

    /// Server-side rename; fails if `to` already exists
    async fn rename(&self, from: &str, to: &str) -> RemoteResult<()>;

    /// Delete recursively; a missing path is not an error
    async fn remove(&self, name: &str) -> RemoteResult<()>;

    /// Recursive listing of everything under the base, hidden entries excluded
    async fn walk(&self) -> RemoteResult<Vec<RemoteNode>>;

    /// Write one file at a base-relative path
    async fn write_file(&self, path: &str, contents: &[u8]) -> RemoteResult<()>;
}

pub fn uploading_name(name: &str) -> String {
    format!("{}{}", name, UPLOADING_SUFFIX)
}
