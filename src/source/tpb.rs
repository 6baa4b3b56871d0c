//! The Pirate Bay adapter (apibay JSON API)
//!
//! Searches go through `q.php`; catalog kinds map onto the precompiled
//! top-100 lists. Neither is paged upstream, so only page 0 returns data.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::http::{lenient_str, lenient_u64, MirrorClient};
use super::{FetchError, SourceFetcher};
use crate::catalog::normalize::quality_from_name;
use crate::models::{format_size, magnet_from_hash, CatalogKind, CatalogQuery, RawRecord};

const TPB_MIRRORS: &[&str] = &[
    "https://apibay.org",
    "https://pirateproxy.live",
    "https://piratebay.live",
];

/// Video category, covers both movies and TV
const SEARCH_CATEGORY: u32 = 200;

const EMPTY_HASH: &str = "0000000000000000000000000000000000000000";

#[derive(Debug, Deserialize)]
struct ApibayTorrent {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    name: String,
    #[serde(default)]
    info_hash: String,
    #[serde(default)]
    seeders: Value,
    #[serde(default)]
    size: Value,
}

impl ApibayTorrent {
    /// apibay answers an empty search with a single fake row
    fn is_placeholder(&self) -> bool {
        lenient_str(&self.id) == "0"
            || self.info_hash.is_empty()
            || self.info_hash == EMPTY_HASH
            || self.name.eq_ignore_ascii_case("No results returned")
    }

    fn into_record(self) -> RawRecord {
        RawRecord {
            source: "TPB".to_string(),
            magnet: magnet_from_hash(&self.info_hash, &self.name),
            quality: quality_from_name(&self.name),
            size: format_size(lenient_u64(&self.size)),
            extra: format!("{} seeds", lenient_u64(&self.seeders)),
            poster: None,
            title: self.name,
        }
    }
}

/// TPB adapter
pub struct TpbSource {
    http: MirrorClient,
}

impl TpbSource {
    pub fn new(timeout: Duration, max_retries: u32) -> Self {
        Self {
            http: MirrorClient::new(
                TPB_MIRRORS.iter().map(|m| m.to_string()).collect(),
                timeout,
                max_retries,
            ),
        }
    }

    /// Create a source with a custom base URL (for testing)
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http: MirrorClient::new(vec![base_url.into()], Duration::from_secs(5), 1)
                .with_retry_delay(Duration::ZERO),
        }
    }

    fn endpoint(query: &CatalogQuery) -> Option<String> {
        let list = match query.kind {
            CatalogKind::Search => {
                let term = query.term.as_deref()?.trim();
                return Some(format!(
                    "/q.php?q={}&cat={}",
                    urlencoding::encode(term),
                    SEARCH_CATEGORY
                ));
            }
            CatalogKind::Latest => "data_top100_recent.json",
            CatalogKind::Trending => "data_top100_48h.json",
            CatalogKind::Popular => "data_top100_207.json",
            CatalogKind::Shows => "data_top100_208.json",
            CatalogKind::Genre => return None,
        };
        Some(format!("/precompiled/{}", list))
    }
}

#[async_trait]
impl SourceFetcher for TpbSource {
    fn name(&self) -> &str {
        "TPB"
    }

    async fn fetch(
        &self,
        query: &CatalogQuery,
        limit: u32,
        page: u32,
    ) -> Result<Vec<RawRecord>, FetchError> {
        if page > 0 {
            return Ok(Vec::new());
        }
        let Some(endpoint) = Self::endpoint(query) else {
            return Ok(Vec::new());
        };

        let torrents: Vec<ApibayTorrent> = self.http.get_json(&endpoint).await?;
        debug!(source = "TPB", rows = torrents.len(), "Fetched list");

        Ok(torrents
            .into_iter()
            .filter(|t| !t.is_placeholder())
            .take(limit as usize)
            .map(ApibayTorrent::into_record)
            .collect())
    }
}
