//! EZTV adapter, TV shows only

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::http::{lenient_u64, MirrorClient};
use super::{FetchError, SourceFetcher};
use crate::catalog::normalize::quality_from_name;
use crate::models::{format_size, magnet_from_hash, CatalogKind, CatalogQuery, RawRecord};

const EZTV_MIRRORS: &[&str] = &["https://eztvx.to", "https://eztv.re", "https://eztv.wf"];

#[derive(Debug, Deserialize)]
struct TorrentsResponse {
    #[serde(default)]
    torrents: Option<Vec<EztvTorrent>>,
}

#[derive(Debug, Deserialize)]
struct EztvTorrent {
    #[serde(default)]
    title: String,
    #[serde(default)]
    hash: String,
    #[serde(default)]
    magnet_url: String,
    #[serde(default)]
    seeds: Value,
    #[serde(default)]
    size_bytes: Value,
}

impl EztvTorrent {
    fn into_record(self) -> Option<RawRecord> {
        let magnet = if !self.magnet_url.trim().is_empty() {
            self.magnet_url
        } else if !self.hash.trim().is_empty() {
            magnet_from_hash(&self.hash, &self.title)
        } else {
            return None;
        };

        Some(RawRecord {
            source: "EZTV".to_string(),
            magnet,
            quality: quality_from_name(&self.title),
            size: format_size(lenient_u64(&self.size_bytes)),
            extra: format!("{} seeds", lenient_u64(&self.seeds)),
            poster: None,
            title: self.title,
        })
    }
}

/// EZTV adapter
pub struct EztvSource {
    http: MirrorClient,
}

impl EztvSource {
    pub fn new(timeout: Duration, max_retries: u32) -> Self {
        Self {
            http: MirrorClient::new(
                EZTV_MIRRORS.iter().map(|m| m.to_string()).collect(),
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
}

#[async_trait]
impl SourceFetcher for EztvSource {
    fn name(&self) -> &str {
        "EZTV"
    }

    async fn fetch(
        &self,
        query: &CatalogQuery,
        limit: u32,
        page: u32,
    ) -> Result<Vec<RawRecord>, FetchError> {
        if query.kind != CatalogKind::Shows {
            return Ok(Vec::new());
        }

        let endpoint = format!(
            "/api/get-torrents?limit={}&page={}",
            limit.clamp(1, 100),
            page + 1
        );
        let response: TorrentsResponse = self.http.get_json(&endpoint).await?;
        let torrents = response.torrents.unwrap_or_default();
        debug!(source = "EZTV", page, torrents = torrents.len(), "Fetched page");

        Ok(torrents
            .into_iter()
            .filter_map(EztvTorrent::into_record)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hash_only_row_builds_magnet() {
        let row: EztvTorrent = serde_json::from_value(json!({
            "title": "Some Show S01E02 720p HDTV",
            "hash": "abc",
            "seeds": 12,
            "size_bytes": "734003200"
        }))
        .unwrap();
        let rec = row.into_record().unwrap();
        assert!(rec.magnet.starts_with("magnet:?xt=urn:btih:abc"));
        assert_eq!(rec.quality, "720p");
        assert_eq!(rec.size, "700MB");
        assert_eq!(rec.extra, "12 seeds");
    }

    #[test]
    fn test_row_without_link_is_skipped() {
        let row: EztvTorrent = serde_json::from_value(json!({ "title": "x" })).unwrap();
        assert!(row.into_record().is_none());
    }
}
