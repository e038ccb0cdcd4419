//! Command-line interface parsing for extcatalog
//!
//! This module handles parsing of CLI arguments using clap and turns them into the
//! refresh configuration the application starts with.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use crate::cache;
use crate::catalog::client::DEFAULT_BASE_URL;
use crate::catalog::ProductContext;
use crate::refresh::RefreshConfig;

/// Product version queried when none is given
pub const DEFAULT_PRODUCT_VERSION: &str = "17.0";

/// Error types for CLI argument validation
#[derive(Debug, Error)]
pub enum CliError {
    /// The cache file path is blank
    #[error("Invalid cache file path: '{0}' (must not be empty or whitespace)")]
    InvalidCachePath(String),

    /// Staleness of zero hours would refresh on every run
    #[error("Invalid staleness: {0} hours (must be at least 1)")]
    InvalidStaleness(u64),

    /// The base URL is not an http(s) URL
    #[error("Invalid base URL: '{0}' (must start with http:// or https://)")]
    InvalidBaseUrl(String),
}

/// extcatalog - keep a local copy of the extension marketplace catalog fresh
#[derive(Parser, Debug)]
#[command(name = "extcatalog")]
#[command(about = "Local, self-refreshing cache of the extension marketplace catalog")]
#[command(version)]
pub struct Cli {
    /// Cache file location (defaults to cache.json in the per-user data directory)
    #[arg(long, value_name = "PATH")]
    pub cache_file: Option<PathBuf>,

    /// Refresh the cache once the file is older than this many hours
    #[arg(long, value_name = "HOURS", default_value_t = 24)]
    pub stale_after_hours: u64,

    /// Marketplace API base URL
    #[arg(long, value_name = "URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Product version to fetch extensions for
    #[arg(long, value_name = "VERSION", default_value = DEFAULT_PRODUCT_VERSION)]
    pub product_version: String,

    /// Product edition the extensions must support (repeatable)
    #[arg(long = "sku", value_name = "SKU")]
    pub skus: Vec<String>,

    /// Print every cached extension
    #[arg(long)]
    pub list: bool,

    /// Print the cached extension with this id
    #[arg(long, value_name = "ID")]
    pub find: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,
}

/// Configuration derived from CLI arguments for application startup
#[derive(Debug, Clone)]
pub struct StartupConfig {
    /// Configuration handed to the refresh orchestrator
    pub refresh: RefreshConfig,
    /// Marketplace API base URL
    pub base_url: String,
    /// Whether to print every cached extension
    pub list: bool,
    /// Extension id to look up
    pub find: Option<String>,
    /// Whether debug logging is enabled
    pub debug: bool,
}

impl StartupConfig {
    /// Creates a StartupConfig from parsed CLI arguments.
    ///
    /// # Returns
    /// * `Ok(StartupConfig)` with appropriate settings
    /// * `Err(CliError)` if a value is out of range
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let cache_file = match &cli.cache_file {
            Some(path) if path.to_string_lossy().trim().is_empty() => {
                return Err(CliError::InvalidCachePath(path.to_string_lossy().into_owned()));
            }
            Some(path) => path.clone(),
            None => cache::default_cache_file(),
        };

        if cli.stale_after_hours == 0 {
            return Err(CliError::InvalidStaleness(cli.stale_after_hours));
        }

        if !(cli.base_url.starts_with("http://") || cli.base_url.starts_with("https://")) {
            return Err(CliError::InvalidBaseUrl(cli.base_url.clone()));
        }

        Ok(StartupConfig {
            refresh: RefreshConfig {
                cache_file,
                staleness: Duration::from_secs(cli.stale_after_hours.saturating_mul(3600)),
                product: ProductContext::new(cli.product_version.clone(), cli.skus.clone()),
            },
            base_url: cli.base_url.clone(),
            list: cli.list,
            find: cli.find.clone(),
            debug: cli.debug,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_no_args() {
        let cli = Cli::parse_from(["extcatalog"]);
        assert!(cli.cache_file.is_none());
        assert_eq!(cli.stale_after_hours, 24);
        assert_eq!(cli.base_url, DEFAULT_BASE_URL);
        assert_eq!(cli.product_version, DEFAULT_PRODUCT_VERSION);
        assert!(cli.skus.is_empty());
        assert!(!cli.list);
        assert!(cli.find.is_none());
        assert!(!cli.debug);
    }

    #[test]
    fn test_cli_parse_repeated_skus() {
        let cli = Cli::parse_from(["extcatalog", "--sku", "Community", "--sku", "Pro"]);
        assert_eq!(cli.skus, ["Community", "Pro"]);
    }

    #[test]
    fn test_startup_config_defaults() {
        let cli = Cli::parse_from(["extcatalog"]);
        let config = StartupConfig::from_cli(&cli).unwrap();

        assert!(config.refresh.cache_file.ends_with(cache::CACHE_FILE_NAME));
        assert_eq!(config.refresh.staleness, Duration::from_secs(24 * 3600));
        assert_eq!(config.refresh.product.version, DEFAULT_PRODUCT_VERSION);
        assert!(!config.list);
    }

    #[test]
    fn test_startup_config_from_cli_all_flags() {
        let cli = Cli::parse_from([
            "extcatalog",
            "--cache-file",
            "/tmp/ext/cache.json",
            "--stale-after-hours",
            "6",
            "--base-url",
            "http://localhost:9000/api",
            "--product-version",
            "16.11",
            "--sku",
            "Enterprise",
            "--list",
            "--find",
            "abc",
            "--debug",
        ]);
        let config = StartupConfig::from_cli(&cli).unwrap();

        assert_eq!(config.refresh.cache_file, PathBuf::from("/tmp/ext/cache.json"));
        assert_eq!(config.refresh.staleness, Duration::from_secs(6 * 3600));
        assert_eq!(
            config.refresh.product,
            ProductContext::new("16.11", vec!["Enterprise".to_string()])
        );
        assert_eq!(config.base_url, "http://localhost:9000/api");
        assert!(config.list);
        assert_eq!(config.find.as_deref(), Some("abc"));
        assert!(config.debug);
    }

    #[test]
    fn test_startup_config_rejects_blank_cache_file() {
        let cli = Cli::parse_from(["extcatalog", "--cache-file", "   "]);
        let err = StartupConfig::from_cli(&cli).unwrap_err();
        assert!(matches!(err, CliError::InvalidCachePath(_)));
    }

    #[test]
    fn test_startup_config_rejects_zero_staleness() {
        let cli = Cli::parse_from(["extcatalog", "--stale-after-hours", "0"]);
        let err = StartupConfig::from_cli(&cli).unwrap_err();
        assert!(err.to_string().contains("Invalid staleness"));
    }

    #[test]
    fn test_startup_config_rejects_non_http_base_url() {
        let cli = Cli::parse_from(["extcatalog", "--base-url", "ftp://example.test"]);
        let result = StartupConfig::from_cli(&cli);
        assert!(matches!(result, Err(CliError::InvalidBaseUrl(_))));
    }
}
