//! Cache manager for a file-persisted snapshot of records
//!
//! Provides a `CacheManager` that holds an ordered in-memory snapshot, stamps every
//! mutation, and reads/writes the whole snapshot as a JSON array on disk.

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tracing::{debug, warn};

use super::Keyed;

/// Errors that can occur when constructing, loading or saving a cache
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache file path was empty, blank or could not be made absolute
    #[error("Invalid cache file path: '{0}'")]
    InvalidPath(String),

    /// Reading or writing the cache file failed
    #[error("Cache file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The cache file did not contain a valid serialized snapshot
    #[error("Cache file is malformed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Snapshot and the stamp of its last mutation, swapped together under one lock
#[derive(Debug)]
struct State<T> {
    items: Arc<Vec<T>>,
    last_update: DateTime<Utc>,
}

/// Owns an ordered snapshot of records and the file it is persisted to
///
/// All mutation goes through `add_range`, `create`, `add_or_update_range` and
/// `load_cache_file`. Each of these builds a new vector and swaps it in, so a
/// reader holding a `snapshot()` never sees a partially merged collection.
#[derive(Debug)]
pub struct CacheManager<T> {
    /// Absolute path of the cache file
    file_path: PathBuf,
    state: RwLock<State<T>>,
}

impl<T> CacheManager<T>
where
    T: Clone + Serialize + DeserializeOwned,
{
    /// Creates an empty cache manager persisted at `path`
    ///
    /// Relative paths are resolved against the current working directory.
    ///
    /// # Returns
    /// * `Err(CacheError::InvalidPath)` if `path` is empty or whitespace-only
    pub fn new(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref();
        let raw = path.to_string_lossy();
        if raw.trim().is_empty() {
            return Err(CacheError::InvalidPath(raw.into_owned()));
        }

        let file_path =
            std::path::absolute(path).map_err(|_| CacheError::InvalidPath(raw.into_owned()))?;

        Ok(Self {
            file_path,
            state: RwLock::new(State {
                items: Arc::new(Vec::new()),
                last_update: Utc::now(),
            }),
        })
    }

    /// Absolute path of the cache file
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Whether a file currently exists at the cache path
    pub fn cache_file_exists(&self) -> bool {
        self.file_path.is_file()
    }

    /// Last-write time of the cache file, or `None` if it does not exist
    ///
    /// Probes the filesystem on every call so external deletes are observed.
    pub fn last_cache_file_update(&self) -> Option<DateTime<Utc>> {
        let metadata = fs::metadata(&self.file_path).ok().filter(|m| m.is_file())?;
        let modified = metadata.modified().ok()?;
        Some(DateTime::<Utc>::from(modified))
    }

    /// When the in-memory snapshot was last mutated (construction counts)
    pub fn last_update(&self) -> DateTime<Utc> {
        self.read_state(|state| state.last_update)
    }

    /// Current snapshot, shared read-only with the caller
    pub fn snapshot(&self) -> Arc<Vec<T>> {
        self.read_state(|state| Arc::clone(&state.items))
    }

    /// Number of records in the snapshot
    pub fn len(&self) -> usize {
        self.read_state(|state| state.items.len())
    }

    /// Whether the snapshot holds no records
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends `items` after the existing entries, without deduplication
    pub fn add_range(&self, items: impl IntoIterator<Item = T>) {
        self.mutate(|current| {
            let mut next = current.clone();
            next.extend(items);
            next
        });
    }

    /// Replaces the whole snapshot with `items`
    pub fn create(&self, items: impl IntoIterator<Item = T>) {
        let next: Vec<T> = items.into_iter().collect();
        self.mutate(|_| next);
    }

    /// Merges `items` into the snapshot by key
    ///
    /// An incoming item whose key equals that of an existing entry replaces the
    /// first such entry in place; any other item is appended. Items later in the
    /// same batch win over earlier ones with the same key.
    pub fn add_or_update_range<K, F>(&self, items: impl IntoIterator<Item = T>, key_selector: F)
    where
        K: PartialEq,
        F: Fn(&T) -> K,
    {
        self.mutate(|current| {
            let mut next = current.clone();
            let mut keys: Vec<K> = next.iter().map(&key_selector).collect();

            for item in items {
                let key = key_selector(&item);
                match keys.iter().position(|existing| *existing == key) {
                    Some(index) => next[index] = item,
                    None => {
                        next.push(item);
                        keys.push(key);
                    }
                }
            }

            next
        });
    }

    /// Reads the cache file and replaces the snapshot with its contents
    ///
    /// # Returns
    /// * `Ok(count)` with the number of records loaded
    /// * `Err` if the file is missing, unreadable or malformed; the snapshot is untouched
    pub fn load_cache_file(&self) -> Result<usize, CacheError> {
        let content = fs::read_to_string(&self.file_path)?;
        let items: Vec<T> = serde_json::from_str(&content)?;
        let count = items.len();
        self.create(items);
        Ok(count)
    }

    /// Like `load_cache_file`, logging the failure instead of returning it
    pub fn try_load_cache_file(&self) -> bool {
        match self.load_cache_file() {
            Ok(count) => {
                debug!(path = %self.file_path.display(), count, "loaded cache file");
                true
            }
            Err(e) => {
                debug!(path = %self.file_path.display(), "cache file not loaded: {}", e);
                false
            }
        }
    }

    /// Writes the current snapshot to the cache file, creating or overwriting it
    ///
    /// The containing directory must already exist. The write is not atomic.
    pub fn save_cache_file(&self) -> Result<(), CacheError> {
        let items = self.snapshot();
        let json = serde_json::to_string_pretty(items.as_ref())?;
        fs::write(&self.file_path, json)?;
        Ok(())
    }

    /// Like `save_cache_file`, logging the failure instead of returning it
    pub fn try_save_cache_file(&self) -> bool {
        match self.save_cache_file() {
            Ok(()) => true,
            Err(e) => {
                warn!(path = %self.file_path.display(), "failed to save cache file: {}", e);
                false
            }
        }
    }

    fn read_state<R>(&self, f: impl FnOnce(&State<T>) -> R) -> R {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Swaps in the vector built by `f` and stamps the mutation
    fn mutate(&self, f: impl FnOnce(&Vec<T>) -> Vec<T>) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let next = f(&state.items);
        state.items = Arc::new(next);

        // Keep the stamp strictly increasing even if the clock has not ticked
        let floor = state.last_update + Duration::microseconds(1);
        state.last_update = Utc::now().max(floor);
    }
}

impl<T> CacheManager<T>
where
    T: Clone + Serialize + DeserializeOwned + Keyed,
{
    /// Merges `items` into the snapshot using each record's own key
    pub fn add_or_update(&self, items: impl IntoIterator<Item = T>) {
        self.add_or_update_range(items, T::key);
    }
}
