//! Termflix - terminal torrent catalog browser
//!
//! Queries several torrent indexes concurrently, merges duplicate releases
//! of the same title into one canonical work, caches the result and keeps
//! loading further pages in the background while the caller browses.
//!
//! # Modules
//!
//! - `models` - Records, works, catalog queries and their line formats
//! - `source` - Source adapters (YTS, TPB, EZTV)
//! - `catalog` - Normalizer, merge engine, cache and prefetch controller
//! - `handoff` - External player launch
//! - `config`, `cli`, `commands` - Application surface

pub mod catalog;
pub mod cli;
pub mod commands;
pub mod config;
pub mod handoff;
pub mod models;
pub mod source;

// Re-export commonly used types
pub use models::{CanonicalWork, CatalogKind, CatalogQuery, Quality, RawRecord};

pub use catalog::{CacheManager, CatalogError, PrefetchController, PrefetchSettings, PrefetchState};
pub use source::{FetchError, SourceFetcher, SourceRegistry};
