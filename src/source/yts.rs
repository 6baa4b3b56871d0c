//! YTS movie catalog adapter
//!
//! API docs: https://yts.mx/api. Movies only; each movie carries one
//! torrent per quality, emitted best quality first.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::http::MirrorClient;
use super::{FetchError, SourceFetcher};
use crate::models::{format_size, magnet_from_hash, CatalogKind, CatalogQuery, Quality, RawRecord};

const YTS_MIRRORS: &[&str] = &["https://yts.mx", "https://yts.lt", "https://yts.do"];

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    data: Option<ListData>,
}

#[derive(Debug, Deserialize)]
struct ListData {
    #[serde(default)]
    movies: Option<Vec<YtsMovie>>,
}

#[derive(Debug, Deserialize)]
struct YtsMovie {
    title: String,
    #[serde(default)]
    year: Option<u16>,
    #[serde(default)]
    medium_cover_image: Option<String>,
    #[serde(default)]
    torrents: Vec<YtsTorrent>,
}

#[derive(Debug, Deserialize)]
struct YtsTorrent {
    hash: String,
    #[serde(default)]
    quality: String,
    #[serde(default)]
    size: String,
    #[serde(default)]
    size_bytes: u64,
    #[serde(default)]
    seeds: u32,
}

impl YtsMovie {
    fn into_records(self) -> Vec<RawRecord> {
        let name = match self.year {
            Some(year) => format!("{} ({})", self.title, year),
            None => self.title.clone(),
        };

        let mut torrents = self.torrents;
        torrents.sort_by(|a, b| {
            Quality::from_str_loose(&b.quality)
                .cmp(&Quality::from_str_loose(&a.quality))
                .then(b.seeds.cmp(&a.seeds))
        });

        torrents
            .into_iter()
            .filter(|t| !t.hash.trim().is_empty())
            .map(|t| RawRecord {
                source: "YTS".to_string(),
                title: name.clone(),
                magnet: magnet_from_hash(&t.hash, &name),
                quality: if t.quality.is_empty() { "N/A".into() } else { t.quality },
                size: if t.size_bytes > 0 {
                    format_size(t.size_bytes)
                } else {
                    t.size.replace(' ', "")
                },
                extra: format!("{} seeds", t.seeds),
                poster: self.medium_cover_image.clone().filter(|p| !p.is_empty()),
            })
            .collect()
    }
}

/// YTS adapter
pub struct YtsSource {
    http: MirrorClient,
}

impl YtsSource {
    pub fn new(timeout: Duration, max_retries: u32) -> Self {
        Self {
            http: MirrorClient::new(
                YTS_MIRRORS.iter().map(|m| m.to_string()).collect(),
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

    fn endpoint(query: &CatalogQuery, limit: u32, page: u32) -> Option<String> {
        let mut endpoint = format!(
            "/api/v2/list_movies.json?limit={}&page={}",
            limit.clamp(1, 50),
            page + 1
        );
        match query.kind {
            CatalogKind::Latest => endpoint.push_str("&sort_by=date_added"),
            CatalogKind::Trending => endpoint.push_str("&sort_by=download_count"),
            CatalogKind::Popular => endpoint.push_str("&sort_by=like_count"),
            CatalogKind::Genre => {
                let genre = query.term.as_deref()?.trim();
                endpoint.push_str(&format!(
                    "&genre={}&sort_by=download_count",
                    urlencoding::encode(genre)
                ));
            }
            CatalogKind::Search => {
                let term = query.term.as_deref()?.trim();
                endpoint.push_str(&format!(
                    "&query_term={}&sort_by=seeds",
                    urlencoding::encode(term)
                ));
            }
            CatalogKind::Shows => return None,
        }
        Some(endpoint)
    }
}

#[async_trait]
impl SourceFetcher for YtsSource {
    fn name(&self) -> &str {
        "YTS"
    }

    async fn fetch(
        &self,
        query: &CatalogQuery,
        limit: u32,
        page: u32,
    ) -> Result<Vec<RawRecord>, FetchError> {
        let Some(endpoint) = Self::endpoint(query, limit, page) else {
            return Ok(Vec::new());
        };

        let response: ListResponse = self.http.get_json(&endpoint).await?;
        let movies = response.data.and_then(|d| d.movies).unwrap_or_default();
        debug!(source = "YTS", page, movies = movies.len(), "Fetched page");

        Ok(movies.into_iter().flat_map(YtsMovie::into_records).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_per_kind() {
        let latest = YtsSource::endpoint(&CatalogQuery::new(CatalogKind::Latest, 50), 50, 0).unwrap();
        assert!(latest.contains("page=1"));
        assert!(latest.contains("sort_by=date_added"));

        let search = YtsSource::endpoint(&CatalogQuery::search("the matrix", 50), 20, 2).unwrap();
        assert!(search.contains("query_term=the%20matrix"));
        assert!(search.contains("page=3"));
        assert!(search.contains("limit=20"));

        assert!(YtsSource::endpoint(&CatalogQuery::new(CatalogKind::Shows, 50), 50, 0).is_none());
    }

    #[test]
    fn test_movie_records_best_quality_first() {
        let movie = YtsMovie {
            title: "Inception".into(),
            year: Some(2010),
            medium_cover_image: Some("http://p1".into()),
            torrents: vec![
                YtsTorrent {
                    hash: "BBB".into(),
                    quality: "720p".into(),
                    size: "1.1 GB".into(),
                    size_bytes: 0,
                    seeds: 900,
                },
                YtsTorrent {
                    hash: "AAA".into(),
                    quality: "1080p".into(),
                    size: "2.1 GB".into(),
                    size_bytes: 0,
                    seeds: 2000,
                },
            ],
        };

        let records = movie.into_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].quality, "1080p");
        assert_eq!(records[0].title, "Inception (2010)");
        assert_eq!(records[0].size, "2.1GB");
        assert_eq!(records[0].extra, "2000 seeds");
        assert!(records[0].magnet.starts_with("magnet:?xt=urn:btih:AAA"));
        assert_eq!(records[0].poster.as_deref(), Some("http://p1"));
    }
}
