//! Configuration management for Termflix
//!
//! Config is stored at ~/.config/termflix/config.toml. A missing or
//! unparsable file silently falls back to the defaults below.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::CatalogKind;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Source adapters to query, in contribution order
    pub sources: Vec<String>,
    pub catalog: CatalogConfig,
    pub cache: CacheConfig,
    /// Player command; `{magnet}` is replaced with the magnet link
    pub player: Option<String>,
}

/// Paging, prefetch and transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Works per displayed page
    pub page_size: usize,
    /// Pages fetched synchronously when a catalog opens
    pub initial_window: u32,
    /// Pages fetched by each background batch
    pub batch_window: u32,
    /// Hard stop for background prefetching
    pub max_pages: u32,
    /// Records requested from a source per page
    pub fetch_limit: u32,
    pub fetch_timeout_secs: u64,
    pub max_retries: u32,
}

/// Cache location, lifetimes and contamination rules
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache root; defaults to ~/.cache/termflix
    pub dir: Option<PathBuf>,
    pub ttl: TtlConfig,
    /// Source tags that mark a cache file as stale beyond repair
    pub deprecated_sources: Vec<String>,
    /// Substrings identifying a placeholder poster URL
    pub placeholder_markers: Vec<String>,
    /// Placeholder-poster share above which a cache file is discarded
    pub placeholder_ratio: f64,
}

/// Time-to-live per catalog kind, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtlConfig {
    pub latest: u64,
    pub trending: u64,
    pub popular: u64,
    pub shows: u64,
    pub genre: u64,
    pub search: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sources: vec!["yts".into(), "tpb".into(), "eztv".into()],
            catalog: CatalogConfig::default(),
            cache: CacheConfig::default(),
            player: None,
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            initial_window: 10,
            batch_window: 10,
            max_pages: 100,
            fetch_limit: 50,
            fetch_timeout_secs: 8,
            max_retries: 2,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            ttl: TtlConfig::default(),
            deprecated_sources: vec!["1337x".into()],
            placeholder_markers: vec![
                "placeholder".into(),
                "no-poster".into(),
                "noposter".into(),
                "default_poster".into(),
            ],
            placeholder_ratio: 0.5,
        }
    }
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            latest: 3600,
            trending: 3600,
            popular: 14400,
            shows: 3600,
            genre: 14400,
            search: 1800,
        }
    }
}

impl TtlConfig {
    pub fn for_kind(&self, kind: CatalogKind) -> Duration {
        let secs = match kind {
            CatalogKind::Latest => self.latest,
            CatalogKind::Trending => self.trending,
            CatalogKind::Popular => self.popular,
            CatalogKind::Shows => self.shows,
            CatalogKind::Genre => self.genre,
            CatalogKind::Search => self.search,
        };
        Duration::from_secs(secs)
    }
}

impl CatalogConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl Config {
    /// Get config file path (~/.config/termflix/config.toml)
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("termflix").join("config.toml"))
    }

    /// Load config from the default location, or return defaults
    pub fn load() -> Self {
        Self::path()
            .map(|p| Self::load_from(&p))
            .unwrap_or_default()
            .with_env_overrides()
    }

    /// Load config from an explicit file, falling back to defaults
    pub fn load_from(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| toml::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Apply TERMFLIX_CACHE_DIR and TERMFLIX_PLAYER
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = std::env::var("TERMFLIX_CACHE_DIR") {
            if !dir.trim().is_empty() {
                self.cache.dir = Some(PathBuf::from(dir));
            }
        }
        if let Ok(player) = std::env::var("TERMFLIX_PLAYER") {
            if !player.trim().is_empty() {
                self.player = Some(player);
            }
        }
        self
    }

    /// Resolved cache root
    pub fn cache_dir(&self) -> Option<PathBuf> {
        self.cache
            .dir
            .clone()
            .or_else(|| dirs::cache_dir().map(|p| p.join("termflix")))
    }
}
