//! extcatalog - keep a local copy of the extension marketplace catalog fresh
//!
//! Loads the cached catalog, refreshes it from the marketplace when it is missing
//! or stale, and prints what the cache now holds.

use clap::{error::ErrorKind, CommandFactory, Parser};
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

use extcatalog::catalog::{ExtensionItem, ExtensionView, MarketplaceClient};
use extcatalog::cli::{Cli, StartupConfig};
use extcatalog::refresh::{RefreshMessage, RefreshOrchestrator};

/// Prints one line for a progress message from the background refresh
fn report(message: &RefreshMessage) {
    match message {
        RefreshMessage::CacheLoaded(count) => println!("Loaded {} cached extensions", count),
        RefreshMessage::RefreshStarted { mode } => println!("Refreshing catalog ({:?})", mode),
        RefreshMessage::RefreshCompleted { mode, fetched } => {
            println!("Refresh complete ({:?}): {} extensions fetched", mode, fetched)
        }
        RefreshMessage::RefreshFailed(reason) => println!("Refresh failed: {}", reason),
        RefreshMessage::PersistFailed(reason) => println!("Could not save cache: {}", reason),
    }
}

fn print_item(item: &ExtensionItem) {
    println!("{}  {}", item.extension_id(), item.title());
    if !item.description().is_empty() {
        println!("    {}", item.description());
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let startup = match StartupConfig::from_cli(&cli) {
        Ok(config) => config,
        Err(e) => Cli::command().error(ErrorKind::ValueValidation, e).exit(),
    };

    // Set up logging
    let log_level = if startup.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let source = MarketplaceClient::with_base_url(startup.base_url.clone());
    debug!(base_url = source.base_url(), "using marketplace");
    let (orchestrator, mut events) = RefreshOrchestrator::new(startup.refresh, source);

    orchestrator.ensure_initialized().await?;
    while let Ok(message) = events.try_recv() {
        report(&message);
    }

    let items = orchestrator.cached_items();
    println!(
        "Cache: {} ({} extensions)",
        orchestrator.config().cache_file.display(),
        items.len()
    );
    if let Some(written) = orchestrator.cache().and_then(|c| c.last_cache_file_update()) {
        println!("Last saved: {}", written.to_rfc3339());
    }

    if let Some(id) = &startup.find {
        match orchestrator.find(id) {
            Some(item) => print_item(&item),
            None => println!("No cached extension with id '{}'", id),
        }
    }

    if startup.list {
        for item in items.iter() {
            print_item(item);
        }
    }

    Ok(())
}
