//! Finds browser Local Storage databases on disk.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::BaseDirs;
use tracing::debug;
use walkdir::WalkDir;

/// Where browsers keep their profiles on this platform.
pub fn default_search_root() -> Result<PathBuf> {
    let dirs = BaseDirs::new().context("could not determine home directory")?;

    let root = if cfg!(target_os = "windows") {
        dirs.data_local_dir()
    } else if cfg!(target_os = "macos") {
        // ~/Library/Application Support
        dirs.data_dir()
    } else {
        dirs.home_dir()
    };
    Ok(root.to_path_buf())
}

/// Every `**/Local Storage/leveldb` directory below `root`, sorted.
///
/// Unreadable directories are skipped.
pub fn find_candidate_stores(root: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("skipping unreadable path: {e}");
                None
            }
        })
        .filter(|entry| entry.file_type().is_dir() && is_local_storage_db(entry.path()))
        .map(|entry| entry.into_path())
        .collect();

    found.sort();
    found
}

fn is_local_storage_db(path: &Path) -> bool {
    path.file_name() == Some(OsStr::new("leveldb"))
        && path.parent().and_then(Path::file_name) == Some(OsStr::new("Local Storage"))
}
