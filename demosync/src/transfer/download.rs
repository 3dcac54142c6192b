//! Payload download with a `.downloading` staging file

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use crate::core::DownloadUrl;
use crate::logger;

pub const DOWNLOADING_SUFFIX: &str = ".downloading";

/// Free space required in the download directory before each download
pub const MIN_FREE_SPACE: u64 = 1024 * 1024 * 1024;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Writes the payload at a URL to a local file
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Returns the number of bytes written
    async fn fetch(&self, url: &DownloadUrl, dest: &Path) -> Result<u64>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("demosync")
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, url: &DownloadUrl, dest: &Path) -> Result<u64> {
        let response = self
            .client
            .get(url.absolute())
            .send()
            .await
            .with_context(|| format!("Download request failed for '{}'", url.absolute()))?;

        let status = response.status();
        if !status.is_success() {
            bail!("Download failed for '{}': HTTP {}", url.absolute(), status);
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .with_context(|| format!("Failed to create {:?}", dest))?;
        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(next) = stream.next().await {
            let chunk = next
                .map_err(|e| anyhow!("Download read error for '{}': {}", url.absolute(), e))?;
            file.write_all(&chunk)
                .await
                .with_context(|| format!("Failed to write {:?}", dest))?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }
}

pub fn downloading_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(DOWNLOADING_SUFFIX);
    PathBuf::from(name)
}

/// Fail early when the download directory is nearly full
pub fn ensure_free_space(dir: &Path, required: u64) -> Result<()> {
    let free = fs2::available_space(dir)
        .with_context(|| format!("Failed to read free disk space for {:?}", dir))?;
    if free < required {
        bail!(
            "Not enough free space in {:?}: {} MiB available, {} MiB required",
            dir,
            free / (1024 * 1024),
            required / (1024 * 1024)
        );
    }
    Ok(())
}

/// Download `url` to `dest`. A complete file already at `dest` is reused;
/// the final name only ever holds a finished download.
pub async fn download_payload(fetcher: &dyn AssetFetcher, url: &DownloadUrl, dest: &Path) -> Result<()> {
    if dest.is_file() {
        logger::log_info(&format!("Reusing downloaded {:?}", dest), Some("download"));
        return Ok(());
    }

    let partial = downloading_path(dest);
    if partial.exists() {
        crate::log_debug!(&format!("Removing stale {:?}", partial), "download");
        fs::remove_file(&partial).with_context(|| format!("Failed to remove {:?}", partial))?;
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    logger::log_info(&format!("Downloading {}", url.absolute()), Some("download"));
    match fetcher.fetch(url, &partial).await {
        Ok(bytes) => {
            fs::rename(&partial, dest)
                .with_context(|| format!("Failed to move download into place at {:?}", dest))?;
            crate::log_debug!(&format!("Downloaded {} bytes to {:?}", bytes, dest), "download");
            Ok(())
        }
        Err(e) => {
            let _ = fs::remove_file(&partial);
            Err(e)
        }
    }
}
