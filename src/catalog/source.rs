//! Fetch collaborator contract
//!
//! A catalog source delivers extensions changed at or after a watermark in one or
//! more batches. The refresh orchestrator only ever talks to this trait.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use thiserror::Error;

use super::{ExtensionItem, ProductContext};

/// Receives one batch of fetched extensions; returning `false` asks the source to stop
pub type BatchCallback<'a> = dyn FnMut(Vec<ExtensionItem>) -> bool + Send + 'a;

/// Errors that can occur when fetching from a catalog source
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The marketplace answered with a non-success status
    #[error("Marketplace returned HTTP status {0}")]
    Status(u16),

    /// Failed to parse the response body
    #[error("Failed to parse marketplace response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Something that can fetch catalog records changed since a point in time
pub trait CatalogSource: Send + Sync {
    /// Fetches extensions for `product` modified at or after `since`
    ///
    /// `on_batch` is called once per delivered batch. Passing
    /// `DateTime::<Utc>::MIN_UTC` as `since` requests the whole catalog.
    fn fetch<'a>(
        &'a self,
        product: &'a ProductContext,
        since: DateTime<Utc>,
        on_batch: &'a mut BatchCallback<'a>,
    ) -> BoxFuture<'a, Result<(), FetchError>>;
}

impl<S: CatalogSource + ?Sized> CatalogSource for Arc<S> {
    fn fetch<'a>(
        &'a self,
        product: &'a ProductContext,
        since: DateTime<Utc>,
        on_batch: &'a mut BatchCallback<'a>,
    ) -> BoxFuture<'a, Result<(), FetchError>> {
        (**self).fetch(product, since, on_batch)
    }
}
