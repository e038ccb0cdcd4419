//! Cache module for the persisted catalog snapshot
//!
//! This module provides a generic cache manager that keeps an ordered snapshot of
//! records in memory and persists it as a single JSON file. Records that carry a
//! stable key implement [`Keyed`] so incremental updates can be merged in place.

mod manager;

use std::path::PathBuf;

use directories::ProjectDirs;

pub use manager::{CacheError, CacheManager};

/// File name of the cache inside the application data directory
pub const CACHE_FILE_NAME: &str = "cache.json";

/// Write/merge capability of a cached record
///
/// The key identifies which cached entry an incoming record is a newer version of.
pub trait Keyed {
    type Key: PartialEq;

    fn key(&self) -> Self::Key;
}

/// Per-user application data directory (`~/.local/share/extcatalog` on Linux)
///
/// Returns `None` if no home directory can be determined.
pub fn app_data_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "extcatalog").map(|dirs| dirs.data_dir().to_path_buf())
}

/// Default location of the cache file
///
/// Falls back to a bare file name, which the cache manager resolves against the
/// current directory, when no application data directory is available.
pub fn default_cache_file() -> PathBuf {
    app_data_dir()
        .map(|dir| dir.join(CACHE_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(CACHE_FILE_NAME))
}
