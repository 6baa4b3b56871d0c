//! Catalog aggregation engine
//!
//! - `normalize` - release names to grouping keys, seed extraction
//! - `merge` - folds raw records into canonical works
//! - `cache` - TTL file cache with contamination checks
//! - `prefetch` - initial window load and background paging

pub mod cache;
pub mod merge;
pub mod normalize;
pub mod prefetch;

pub use cache::{CacheError, CacheLookup, CacheManager, CachePolicy, CacheStats, Contamination};
pub use merge::{merge_lines, merge_raw, merge_records, Merger, Record};
pub use prefetch::{
    fetch_window, CatalogError, PageCount, PollOutcome, PrefetchController, PrefetchSession,
    PrefetchSettings, PrefetchState,
};
