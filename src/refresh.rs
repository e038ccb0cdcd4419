//! Background catalog refresh
//!
//! Owns the process-wide catalog cache, decides when it is stale, and refreshes it
//! from a catalog source on a background task. Progress is reported over a tokio
//! channel to whoever holds the receiver.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{self, CacheError, CacheManager};
use crate::catalog::{CatalogSource, ExtensionItem, ExtensionView, FetchError, ProductContext};

/// Age after which the on-disk cache is refreshed
pub const DEFAULT_STALENESS: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors returned by an explicit refresh
#[derive(Debug, Error)]
pub enum RefreshError {
    /// Refresh was requested before the cache was created
    #[error("Cache has not yet been initialized")]
    NotInitialized,

    /// Another refresh is already running
    #[error("A refresh is already in progress")]
    InFlight,

    /// The catalog source failed; the snapshot was left untouched
    #[error("Fetching the catalog failed: {0}")]
    Fetch(#[from] FetchError),
}

/// How a refresh fetched its records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    /// Whole catalog, replacing the (empty) snapshot
    Full,
    /// Records changed since the cache file was last written, merged by key
    Incremental,
}

/// Messages sent from the background refresh
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshMessage {
    /// The cache file was loaded on first initialization
    CacheLoaded(usize),
    /// Refresh started
    RefreshStarted { mode: RefreshMode },
    /// Refresh merged the fetched records into the snapshot
    RefreshCompleted { mode: RefreshMode, fetched: usize },
    /// The fetch failed and the snapshot was kept as it was
    RefreshFailed(String),
    /// The refreshed snapshot could not be written to disk
    PersistFailed(String),
}

/// Configuration for the refresh orchestrator
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Where the cache file lives
    pub cache_file: PathBuf,
    /// Maximum age of the cache file before a refresh is triggered
    pub staleness: Duration,
    /// Product the catalog is fetched for
    pub product: ProductContext,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            cache_file: cache::default_cache_file(),
            staleness: DEFAULT_STALENESS,
            product: ProductContext::default(),
        }
    }
}

/// Clears the in-flight flag when the refresh holding it ends
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct Shared<S> {
    config: RefreshConfig,
    source: S,
    cache: OnceLock<Arc<CacheManager<ExtensionItem>>>,
    in_flight: AtomicBool,
    events: mpsc::UnboundedSender<RefreshMessage>,
}

/// Coordinates the catalog cache and its refreshes
///
/// Create one per process and clone it wherever refreshes are triggered; clones
/// share the same cache. The cache manager is created lazily by the first
/// `ensure_initialized` call, and at most one initialization or refresh runs at a time.
pub struct RefreshOrchestrator<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for RefreshOrchestrator<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S> RefreshOrchestrator<S>
where
    S: CatalogSource + 'static,
{
    /// Creates the orchestrator and the receiving end of its progress channel
    ///
    /// Dropping the receiver is fine; messages are then discarded.
    pub fn new(config: RefreshConfig, source: S) -> (Self, mpsc::UnboundedReceiver<RefreshMessage>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let shared = Shared {
            config,
            source,
            cache: OnceLock::new(),
            in_flight: AtomicBool::new(false),
            events,
        };
        (
            Self {
                shared: Arc::new(shared),
            },
            receiver,
        )
    }

    pub fn config(&self) -> &RefreshConfig {
        &self.shared.config
    }

    /// The cache manager, once the first initialization has created it
    pub fn cache(&self) -> Option<Arc<CacheManager<ExtensionItem>>> {
        self.shared.cache.get().cloned()
    }

    /// Whether an initialization or refresh is currently running
    pub fn is_refreshing(&self) -> bool {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    /// Current snapshot, empty until the cache has been created
    pub fn cached_items(&self) -> Arc<Vec<ExtensionItem>> {
        self.cache()
            .map(|cache| cache.snapshot())
            .unwrap_or_default()
    }

    /// Finds a cached extension by its persistence data (the extension id)
    pub fn find(&self, persistence_data: &str) -> Option<ExtensionItem> {
        self.cached_items()
            .iter()
            .find(|item| item.extension_id() == persistence_data)
            .cloned()
    }

    /// Schedules the initialization/staleness check on a background task
    ///
    /// Returns immediately. The handle may be dropped; awaiting it waits for the
    /// check and any refresh it started. Must be called within a tokio runtime.
    pub fn ensure_initialized(&self) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move { shared.check().await })
    }

    /// Refreshes the cache now, waiting for the result
    pub async fn refresh(&self) -> Result<RefreshMode, RefreshError> {
        let cache = self.cache().ok_or(RefreshError::NotInitialized)?;
        let _guard =
            InFlightGuard::acquire(&self.shared.in_flight).ok_or(RefreshError::InFlight)?;
        self.shared.refresh(&cache).await
    }
}

impl<S: CatalogSource> Shared<S> {
    fn notify(&self, message: RefreshMessage) {
        // Nobody listening is fine
        let _ = self.events.send(message);
    }

    fn is_stale(&self, cache: &CacheManager<ExtensionItem>) -> bool {
        is_stale(cache.last_cache_file_update(), self.config.staleness, Utc::now())
    }

    async fn check(&self) {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            debug!("refresh already in flight, skipping check");
            return;
        };

        let cache = match self.cache.get() {
            Some(cache) => Arc::clone(cache),
            None => match self.initialize() {
                Ok(cache) => cache,
                Err(e) => {
                    warn!("failed to create catalog cache: {}", e);
                    self.notify(RefreshMessage::RefreshFailed(e.to_string()));
                    return;
                }
            },
        };

        if cache.is_empty() || self.is_stale(&cache) {
            // Errors are already logged and reported
            let _ = self.refresh(&cache).await;
        } else {
            debug!("catalog cache is fresh");
        }
    }

    /// Creates the cache manager and loads whatever is on disk
    fn initialize(&self) -> Result<Arc<CacheManager<ExtensionItem>>, CacheError> {
        let cache = Arc::new(CacheManager::new(&self.config.cache_file)?);
        info!(path = %cache.file_path().display(), "initializing catalog cache");

        if cache.try_load_cache_file() {
            self.notify(RefreshMessage::CacheLoaded(cache.len()));
        }

        // Only this task can be here while holding the in-flight guard
        Ok(Arc::clone(self.cache.get_or_init(|| cache)))
    }

    /// Fetches from the source, applies the result and persists it
    ///
    /// The snapshot changes only if the fetch succeeds. A failed save is logged
    /// and leaves the refreshed snapshot in memory.
    async fn refresh(&self, cache: &CacheManager<ExtensionItem>) -> Result<RefreshMode, RefreshError> {
        let (mode, since) = if cache.is_empty() {
            (RefreshMode::Full, DateTime::<Utc>::MIN_UTC)
        } else {
            let since = cache
                .last_cache_file_update()
                .unwrap_or(DateTime::<Utc>::MIN_UTC);
            (RefreshMode::Incremental, since)
        };
        info!(?mode, %since, "refreshing catalog cache");
        self.notify(RefreshMessage::RefreshStarted { mode });

        let mut staged: Vec<ExtensionItem> = Vec::new();
        let mut on_batch = |batch: Vec<ExtensionItem>| {
            staged.extend(batch);
            true
        };
        let result = self
            .source
            .fetch(&self.config.product, since, &mut on_batch)
            .await;

        if let Err(e) = result {
            warn!(?mode, "catalog refresh failed, keeping current snapshot: {}", e);
            self.notify(RefreshMessage::RefreshFailed(e.to_string()));
            return Err(e.into());
        }

        let fetched = staged.len();
        match mode {
            RefreshMode::Full => cache.create(staged),
            RefreshMode::Incremental => cache.add_or_update(staged),
        }
        info!(?mode, fetched, total = cache.len(), "catalog refresh completed");
        self.notify(RefreshMessage::RefreshCompleted { mode, fetched });

        self.persist(cache);
        Ok(mode)
    }

    fn persist(&self, cache: &CacheManager<ExtensionItem>) {
        if let Some(dir) = cache.file_path().parent() {
            if let Err(e) = std::fs::create_dir_all(dir) {
                warn!(dir = %dir.display(), "failed to create cache directory: {}", e);
                self.notify(RefreshMessage::PersistFailed(e.to_string()));
                return;
            }
        }

        if let Err(e) = cache.save_cache_file() {
            warn!(path = %cache.file_path().display(), "failed to save catalog cache: {}", e);
            self.notify(RefreshMessage::PersistFailed(e.to_string()));
        }
    }
}

/// Whether a cache file last written at `written` is older than `staleness`
///
/// A missing file counts as stale.
pub fn is_stale(written: Option<DateTime<Utc>>, staleness: Duration, now: DateTime<Utc>) -> bool {
    let Some(written) = written else {
        return true;
    };
    match chrono::Duration::from_std(staleness) {
        Ok(max_age) => now.signed_duration_since(written) > max_age,
        // Too large to represent: never stale
        Err(_) => false,
    }
}
