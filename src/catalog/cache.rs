//! Cache manager
//!
//! One newline-delimited file of record lines per catalog query, stored
//! under `<root>/catalog/<md5>.cache`. Age comes from the file's mtime.
//! Files carrying a deprecated source tag, or too many placeholder posters,
//! are deleted on sight instead of being served.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::merge;
use crate::config::{CacheConfig, TtlConfig};
use crate::models::{CanonicalWork, CatalogQuery};

const CACHE_EXT: &str = "cache";

/// Cache I/O failures
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Could not determine a cache directory")]
    NoCacheDir,

    #[error("Cache I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl CacheError {
    fn io(path: &Path, source: io::Error) -> Self {
        CacheError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Why a cache file was rejected as contaminated
#[derive(Debug, Clone, PartialEq)]
pub enum Contamination {
    DeprecatedSource(String),
    PlaceholderPosters { ratio: f64 },
}

/// Outcome of a cache lookup
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Fresh(Vec<CanonicalWork>),
    Missing,
    Expired { age: Duration },
    /// File was deleted
    Contaminated(Contamination),
    /// Present but undecodable; file was deleted
    Unreadable,
}

impl CacheLookup {
    pub fn into_fresh(self) -> Option<Vec<CanonicalWork>> {
        match self {
            CacheLookup::Fresh(works) => Some(works),
            _ => None,
        }
    }
}

/// Summary for `termflix cache status`
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub dir: PathBuf,
    pub entries: usize,
    pub bytes: u64,
}

/// Validity rules applied on lookup
#[derive(Debug, Clone)]
pub struct CachePolicy {
    pub ttl: TtlConfig,
    pub deprecated_sources: Vec<String>,
    pub placeholder_markers: Vec<String>,
    pub placeholder_ratio: f64,
}

impl Default for CachePolicy {
    fn default() -> Self {
        CachePolicy::from(&CacheConfig::default())
    }
}

impl From<&CacheConfig> for CachePolicy {
    fn from(config: &CacheConfig) -> Self {
        Self {
            ttl: config.ttl,
            deprecated_sources: config.deprecated_sources.clone(),
            placeholder_markers: config.placeholder_markers.clone(),
            placeholder_ratio: config.placeholder_ratio,
        }
    }
}

impl CachePolicy {
    /// Check a decoded work set against the contamination signatures
    pub fn contamination(&self, works: &[CanonicalWork]) -> Option<Contamination> {
        for work in works {
            for source in &work.sources {
                if self
                    .deprecated_sources
                    .iter()
                    .any(|d| d.eq_ignore_ascii_case(source))
                {
                    return Some(Contamination::DeprecatedSource(source.clone()));
                }
            }
        }

        if works.is_empty() || self.placeholder_markers.is_empty() {
            return None;
        }
        let placeholders = works
            .iter()
            .filter(|w| {
                w.poster.as_deref().is_some_and(|p| {
                    let p = p.to_lowercase();
                    self.placeholder_markers
                        .iter()
                        .any(|m| p.contains(&m.to_lowercase()))
                })
            })
            .count();
        let ratio = placeholders as f64 / works.len() as f64;
        if ratio > self.placeholder_ratio {
            Some(Contamination::PlaceholderPosters { ratio })
        } else {
            None
        }
    }
}

/// File-backed catalog cache
#[derive(Debug, Clone)]
pub struct CacheManager {
    root: PathBuf,
    policy: CachePolicy,
}

impl CacheManager {
    pub fn new(root: impl Into<PathBuf>, policy: CachePolicy) -> Self {
        Self {
            root: root.into(),
            policy,
        }
    }

    /// Build from configuration, resolving the default cache root
    pub fn from_config(config: &crate::config::Config) -> Result<Self, CacheError> {
        let root = config.cache_dir().ok_or(CacheError::NoCacheDir)?;
        Ok(Self::new(root, CachePolicy::from(&config.cache)))
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    fn catalog_dir(&self) -> PathBuf {
        self.root.join("catalog")
    }

    /// Stable key for a query: md5 of `kind_arg1_arg2..`
    pub fn key(query: &CatalogQuery) -> String {
        let mut name = query.kind.as_str().to_string();
        for arg in query.cache_args() {
            name.push('_');
            name.push_str(&arg);
        }
        format!("{:x}", md5::compute(name.as_bytes()))
    }

    pub fn path_for(&self, query: &CatalogQuery) -> PathBuf {
        self.catalog_dir()
            .join(format!("{}.{}", Self::key(query), CACHE_EXT))
    }

    pub fn lookup(&self, query: &CatalogQuery) -> CacheLookup {
        self.lookup_at(query, SystemTime::now())
    }

    /// Lookup as if the current time were `now`
    pub fn lookup_at(&self, query: &CatalogQuery, now: SystemTime) -> CacheLookup {
        let path = self.path_for(query);

        let modified = match fs::metadata(&path) {
            Ok(meta) if meta.len() == 0 => return CacheLookup::Missing,
            Ok(meta) => match meta.modified() {
                Ok(m) => m,
                Err(_) => return CacheLookup::Unreadable,
            },
            Err(_) => return CacheLookup::Missing,
        };

        let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
        let ttl = self.policy.ttl.for_kind(query.kind);

        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Cache file unreadable");
                self.discard(&path);
                return CacheLookup::Unreadable;
            }
        };

        // raw-record caches are folded on read; COMBINED lines pass through
        let works = merge::merge_lines(&text);

        // contamination overrides the TTL check
        if let Some(reason) = self.policy.contamination(&works) {
            warn!(query = %query, ?reason, "Discarding contaminated cache");
            self.discard(&path);
            return CacheLookup::Contaminated(reason);
        }

        if age >= ttl {
            debug!(query = %query, age_secs = age.as_secs(), "Cache expired");
            return CacheLookup::Expired { age };
        }

        if works.is_empty() {
            self.discard(&path);
            return CacheLookup::Unreadable;
        }

        info!(query = %query, works = works.len(), "Cache hit");
        CacheLookup::Fresh(works)
    }

    /// Persist a work set via temp file + rename
    pub fn store(&self, query: &CatalogQuery, works: &[CanonicalWork]) -> Result<PathBuf, CacheError> {
        let dir = self.catalog_dir();
        fs::create_dir_all(&dir).map_err(|e| CacheError::io(&dir, e))?;

        let path = self.path_for(query);
        let tmp = dir.join(format!(".{}.{}.tmp", Self::key(query), Uuid::new_v4()));

        let mut body = String::new();
        for work in works {
            body.push_str(&work.to_line());
            body.push('\n');
        }

        fs::write(&tmp, body).map_err(|e| CacheError::io(&tmp, e))?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(CacheError::io(&path, e));
        }

        info!(query = %query, works = works.len(), "Cache written");
        Ok(path)
    }

    /// Remove a single query's cache file
    pub fn invalidate(&self, query: &CatalogQuery) -> Result<bool, CacheError> {
        let path = self.path_for(query);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::io(&path, e)),
        }
    }

    /// Delete every catalog cache file, returning how many were removed
    pub fn clear(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        for path in self.entries()? {
            fs::remove_file(&path).map_err(|e| CacheError::io(&path, e))?;
            removed += 1;
        }
        info!(removed, "Cache cleared");
        Ok(removed)
    }

    pub fn status(&self) -> Result<CacheStats, CacheError> {
        let mut stats = CacheStats {
            dir: self.catalog_dir(),
            ..Default::default()
        };
        for path in self.entries()? {
            stats.entries += 1;
            stats.bytes += fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        }
        Ok(stats)
    }

    fn entries(&self) -> Result<Vec<PathBuf>, CacheError> {
        let dir = self.catalog_dir();
        let read = match fs::read_dir(&dir) {
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CacheError::io(&dir, e)),
        };

        Ok(read
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == CACHE_EXT))
            .collect())
    }

    fn discard(&self, path: &Path) {
        if let Err(e) = fs::remove_file(path) {
            debug!(path = %path.display(), error = %e, "Failed to delete cache file");
        }
    }
}
