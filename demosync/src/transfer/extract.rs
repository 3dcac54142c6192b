//! Archive extraction
//!
//! A demo archive often wraps everything in one top-level folder. That
//! level is stripped so the asset folder holds the game files directly.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

use crate::core::paths::sanitize_path;
use crate::logger;

pub const EXTRACTING_SUFFIX: &str = ".extracting";

/// Resource-fork folder added by macOS archivers
const JUNK_FOLDER: &str = "__MACOSX";

pub fn extracting_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(EXTRACTING_SUFFIX);
    PathBuf::from(name)
}

fn is_junk(path: &Path) -> bool {
    path.components()
        .next()
        .is_some_and(|c| c.as_os_str() == JUNK_FOLDER)
}

/// The single top-level folder every entry lives under, if there is one
pub fn single_root<R: io::Read + io::Seek>(archive: &mut ZipArchive<R>) -> Result<Option<String>> {
    let mut folders = BTreeSet::new();
    for i in 0..archive.len() {
        let file = archive.by_index_raw(i)?;
        let Some(path) = file.enclosed_name() else {
            continue;
        };
        if is_junk(&path) {
            continue;
        }
        let mut components = path.components();
        let Some(first) = components.next() else {
            continue;
        };
        let nested = components.next().is_some();
        if !nested && !file.is_dir() {
            // A file at the archive root
            return Ok(None);
        }
        folders.insert(first.as_os_str().to_string_lossy().into_owned());
    }

    if folders.len() == 1 {
        Ok(folders.into_iter().next())
    } else {
        Ok(None)
    }
}

/// Extract `archive_path` into `dest`, via a `.extracting` sibling.
/// The archive is removed once `dest` is in place, and also when it cannot
/// be extracted so the next run downloads it again.
pub fn extract_archive(archive_path: &Path, dest: &Path) -> Result<()> {
    let staging = extracting_path(dest);
    if staging.exists() {
        fs::remove_dir_all(&staging)
            .with_context(|| format!("Failed to remove stale {:?}", staging))?;
    }

    if let Err(e) = extract_into(archive_path, &staging) {
        let _ = fs::remove_dir_all(&staging);
        if let Err(remove) = fs::remove_file(archive_path) {
            logger::log_warn(
                &format!("Could not remove unusable archive {:?}: {}", archive_path, remove),
                Some("extract"),
            );
        }
        return Err(e);
    }

    fs::rename(&staging, dest)
        .with_context(|| format!("Failed to move extracted files into {:?}", dest))?;
    fs::remove_file(archive_path)
        .with_context(|| format!("Failed to remove archive {:?}", archive_path))?;
    Ok(())
}

fn extract_into(archive_path: &Path, target: &Path) -> Result<()> {
    let file = fs::File::open(archive_path)
        .with_context(|| format!("Failed to open archive {:?}", archive_path))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("Failed to read zip archive {:?}", archive_path))?;

    let root = single_root(&mut archive)?;
    if let Some(root) = &root {
        crate::log_debug!(&format!("Stripping top-level folder '{}'", root), "extract");
    }

    fs::create_dir_all(target)?;
    let mut skipped = 0usize;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(path) = entry.enclosed_name() else {
            skipped += 1;
            continue;
        };
        if is_junk(&path) {
            continue;
        }
        let relative = match &root {
            Some(root) => match path.strip_prefix(root) {
                Ok(rest) => rest.to_path_buf(),
                Err(_) => continue,
            },
            None => path,
        };
        // The stripped root itself
        if relative.as_os_str().is_empty() {
            continue;
        }
        let Some(relative) = sanitize_path(&relative) else {
            skipped += 1;
            continue;
        };

        let out_path = target.join(&relative);
        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = fs::File::create(&out_path)
            .with_context(|| format!("Failed to create {:?}", out_path))?;
        io::copy(&mut entry, &mut out)
            .with_context(|| format!("Failed to extract {:?}", relative))?;
    }

    if skipped > 0 {
        logger::log_warn(
            &format!("Skipped {} unsafe entries in {:?}", skipped, archive_path),
            Some("extract"),
        );
    }
    Ok(())
}
