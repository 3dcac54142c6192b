//! Directory-backed store on the local filesystem

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use walkdir::WalkDir;

use super::{RemoteError, RemoteNode, RemoteResult, RemoteStore};

pub struct LocalStore {
    base: PathBuf,
}

impl LocalStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn resolve(&self, name: &str) -> PathBuf {
        self.base.join(name)
    }
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

fn copy_dir_recursive(source: &Path, target: &Path) -> io::Result<()> {
    fs::create_dir_all(target)?;
    for entry in WalkDir::new(source).min_depth(1).follow_links(false) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(io::Error::other)?;
        let dest = target.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}

fn mtime_secs(metadata: &fs::Metadata) -> f64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[async_trait]
impl RemoteStore for LocalStore {
    async fn open_session(&self) -> RemoteResult<()> {
        fs::create_dir_all(&self.base)?;
        Ok(())
    }

    async fn list_dirs(&self) -> RemoteResult<BTreeSet<String>> {
        let mut names = BTreeSet::new();
        for entry in fs::read_dir(&self.base)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    names.insert(name.to_string());
                }
            }
        }
        Ok(names)
    }

    async fn dir_exists(&self, name: &str) -> RemoteResult<bool> {
        Ok(self.resolve(name).is_dir())
    }

    async fn upload_dir(&self, local: &Path, name: &str) -> RemoteResult<()> {
        copy_dir_recursive(local, &self.resolve(name))?;
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> RemoteResult<()> {
        let target = self.resolve(to);
        if target.exists() {
            return Err(RemoteError::CommandFailed {
                code: 1,
                stderr: format!("'{}' already exists", to),
            });
        }
        fs::rename(self.resolve(from), target)?;
        Ok(())
    }

    async fn remove(&self, name: &str) -> RemoteResult<()> {
        let path = self.resolve(name);
        let result = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match result {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    async fn walk(&self) -> RemoteResult<Vec<RemoteNode>> {
        let mut nodes = Vec::new();
        let walker = WalkDir::new(&self.base)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_hidden(e));
        for entry in walker {
            let entry = entry.map_err(io::Error::other)?;
            if entry.file_type().is_symlink() {
                continue;
            }
            let metadata = entry.metadata().map_err(io::Error::other)?;
            let relative = entry
                .path()
                .strip_prefix(&self.base)
                .map_err(io::Error::other)?;
            let path = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            nodes.push(RemoteNode {
                path,
                is_dir: metadata.is_dir(),
                size: if metadata.is_dir() { 0 } else { metadata.len() },
                mtime: mtime_secs(&metadata),
            });
        }
        Ok(nodes)
    }

    async fn write_file(&self, path: &str, contents: &[u8]) -> RemoteResult<()> {
        let target = self.resolve(path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        // Plain write: the file's mtime must follow its siblings'
        fs::write(target, contents)?;
        Ok(())
    }
}
