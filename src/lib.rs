//! extcatalog library
//!
//! This module exposes the cache, catalog, CLI and refresh modules for use in
//! integration tests.

pub mod cache;
pub mod catalog;
pub mod cli;
pub mod refresh;
