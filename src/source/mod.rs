//! Upstream torrent index adapters
//!
//! Every provider implements [`SourceFetcher`]. The prefetch controller
//! iterates the [`SourceRegistry`] and treats each adapter as opaque: an
//! error from one source only means that source contributed nothing.

pub mod eztv;
pub mod http;
pub mod tpb;
pub mod yts;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::config::Config;
use crate::models::{CatalogQuery, RawRecord};

pub use eztv::EztvSource;
pub use http::MirrorClient;
pub use tpb::TpbSource;
pub use yts::YtsSource;

/// Source fetch failures. Never fatal to a catalog request.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Rate limited (429), retries exhausted")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(u16),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("All mirrors failed, last error: {0}")]
    AllMirrorsFailed(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Source adapter panicked")]
    Panicked,
}

/// One upstream index
///
/// Implementations must hold no per-call mutable state; the controller calls
/// `fetch` for many pages concurrently.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Short tag written into the SOURCE field of every record
    fn name(&self) -> &str;

    /// Fetch one page (0-based) of `query`. Kinds the source does not serve
    /// yield an empty vector.
    async fn fetch(
        &self,
        query: &CatalogQuery,
        limit: u32,
        page: u32,
    ) -> Result<Vec<RawRecord>, FetchError>;
}

/// Ordered set of enabled fetchers
#[derive(Clone, Default)]
pub struct SourceRegistry {
    fetchers: Vec<Arc<dyn SourceFetcher>>,
}

impl SourceRegistry {
    pub fn with_fetchers(fetchers: Vec<Arc<dyn SourceFetcher>>) -> Self {
        Self { fetchers }
    }

    /// Build the adapters named in `config.sources`; unknown names are skipped
    pub fn from_config(config: &Config) -> Self {
        let timeout = config.catalog.fetch_timeout();
        let retries = config.catalog.max_retries;

        let mut fetchers: Vec<Arc<dyn SourceFetcher>> = Vec::new();
        for name in &config.sources {
            match name.to_lowercase().as_str() {
                "yts" => fetchers.push(Arc::new(YtsSource::new(timeout, retries))),
                "tpb" => fetchers.push(Arc::new(TpbSource::new(timeout, retries))),
                "eztv" => fetchers.push(Arc::new(EztvSource::new(timeout, retries))),
                other => warn!(source = other, "Unknown source in config, skipping"),
            }
        }
        Self { fetchers }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn SourceFetcher>> {
        self.fetchers.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.fetchers.iter().map(|f| f.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.fetchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fetchers.is_empty()
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("fetchers", &self.names())
            .finish()
    }
}
