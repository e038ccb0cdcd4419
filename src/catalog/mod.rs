//! Extension catalog records and the sources that fetch them
//!
//! This module contains the record type stored in the cache, the read-only view
//! handed to consumers, and the fetch collaborator used to refresh the cache.

pub mod client;
pub mod source;

pub use client::MarketplaceClient;
pub use source::{BatchCallback, CatalogSource, FetchError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::Keyed;

/// Read-only capability of a cached extension
///
/// Consumers that display or search the catalog depend on this trait rather than
/// on the concrete record type.
pub trait ExtensionView {
    /// Unique, stable identifier of the extension
    fn extension_id(&self) -> &str;
    fn title(&self) -> &str;
    fn description(&self) -> &str;
    /// Where the installer package can be downloaded from
    fn installer_url(&self) -> &str;

    /// String that can later be passed back to find this entry again
    fn persistence_data(&self) -> String {
        self.extension_id().to_string()
    }
}

/// An extension as fetched from the marketplace and stored in the cache file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionItem {
    pub extension_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub installer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// When the marketplace last modified this extension
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl ExtensionItem {
    /// Creates an item with the required fields; the rest start empty
    pub fn new(extension_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            extension_id: extension_id.into(),
            title: title.into(),
            description: String::new(),
            installer: String::new(),
            version: None,
            last_updated: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_installer(mut self, installer: impl Into<String>) -> Self {
        self.installer = installer.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

impl ExtensionView for ExtensionItem {
    fn extension_id(&self) -> &str {
        &self.extension_id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn installer_url(&self) -> &str {
        &self.installer
    }
}

impl Keyed for ExtensionItem {
    type Key = String;

    fn key(&self) -> String {
        self.extension_id.clone()
    }
}

/// Host product the catalog is queried for
///
/// Passed through to the catalog source untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductContext {
    /// Product version, e.g. "17.0"
    pub version: String,
    /// Product editions the extensions must support
    pub skus: Vec<String>,
}

impl ProductContext {
    pub fn new(version: impl Into<String>, skus: Vec<String>) -> Self {
        Self {
            version: version.into(),
            skus,
        }
    }
}
