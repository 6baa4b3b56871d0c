//! Data structures and types for Termflix
//!
//! Contains the shared models used across the catalog engine:
//! - **Catalog**: catalog kinds and query identity
//! - **Records**: raw releases as reported by one source
//! - **Works**: canonical titles merged across sources
//!
//! The pipe/caret line formats exist only at the edges (fetcher output,
//! cache files). Everything in between works on the typed structs.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::catalog::normalize;

/// Marker in the first field of an already-merged line.
pub const COMBINED_TAG: &str = "COMBINED";

/// Placeholder used on the wire for an absent value.
pub const NOT_AVAILABLE: &str = "N/A";

// =============================================================================
// Catalog Models
// =============================================================================

/// Which catalog listing is being browsed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogKind {
    Latest,
    Trending,
    Popular,
    Shows,
    Genre,
    Search,
}

impl CatalogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CatalogKind::Latest => "latest",
            CatalogKind::Trending => "trending",
            CatalogKind::Popular => "popular",
            CatalogKind::Shows => "shows",
            CatalogKind::Genre => "genre",
            CatalogKind::Search => "search",
        }
    }

    /// Kinds that need a free-text term (genre name or search query)
    pub fn needs_term(&self) -> bool {
        matches!(self, CatalogKind::Genre | CatalogKind::Search)
    }
}

impl fmt::Display for CatalogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity of one catalog request.
///
/// Two queries that compare equal share a cache entry and a prefetch
/// session; anything else starts from scratch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CatalogQuery {
    pub kind: CatalogKind,
    pub term: Option<String>,
    pub limit: u32,
}

impl CatalogQuery {
    pub fn new(kind: CatalogKind, limit: u32) -> Self {
        Self {
            kind,
            term: None,
            limit,
        }
    }

    pub fn search(query: impl Into<String>, limit: u32) -> Self {
        Self {
            kind: CatalogKind::Search,
            term: Some(query.into()),
            limit,
        }
    }

    pub fn genre(genre: impl Into<String>, limit: u32) -> Self {
        Self {
            kind: CatalogKind::Genre,
            term: Some(genre.into()),
            limit,
        }
    }

    /// Ordered argument list used to derive the cache key
    pub fn cache_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(2);
        if let Some(term) = &self.term {
            args.push(term.trim().to_lowercase());
        }
        args.push(self.limit.to_string());
        args
    }
}

impl fmt::Display for CatalogQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.term {
            Some(term) => write!(f, "{} \"{}\"", self.kind, term),
            None => write!(f, "{}", self.kind),
        }
    }
}

// =============================================================================
// Quality
// =============================================================================

/// Quality bucket used to pick a work's display quality.
///
/// Only 1080p and 720p are ranked explicitly; any other label beats a
/// missing one, and ties keep the first contributor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Quality {
    FHD1080p,
    HD720p,
    Other,
    #[default]
    Missing,
}

impl Quality {
    /// Classify a free-text quality label (e.g. "1080p", "720p WEB", "N/A")
    pub fn from_str_loose(s: &str) -> Self {
        let s_lower = s.trim().to_lowercase();
        if s_lower.is_empty() || s_lower == "n/a" {
            Quality::Missing
        } else if s_lower.contains("1080") {
            Quality::FHD1080p
        } else if s_lower.contains("720") {
            Quality::HD720p
        } else {
            Quality::Other
        }
    }

    /// Ranking for display selection (higher = better)
    pub fn rank(&self) -> u8 {
        match self {
            Quality::FHD1080p => 3,
            Quality::HD720p => 2,
            Quality::Other => 1,
            Quality::Missing => 0,
        }
    }
}

impl Ord for Quality {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl PartialOrd for Quality {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

// =============================================================================
// Line Codec Errors
// =============================================================================

/// Why a pipe-delimited line could not be decoded
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("expected at least {expected} fields, found {found}")]
    TooFewFields { expected: usize, found: usize },

    #[error("line is not a COMBINED record")]
    NotCombined,

    #[error("COMBINED record has mismatched array lengths")]
    RaggedArrays,

    #[error("empty line")]
    Empty,
}

// =============================================================================
// Raw Records
// =============================================================================

/// One release as reported by one source for one page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    pub source: String,
    pub title: String,
    pub magnet: String,
    pub quality: String,
    pub size: String,
    pub extra: String,
    pub poster: Option<String>,
}

impl RawRecord {
    /// Minimum field count: SOURCE|TITLE|MAGNET|QUALITY|SIZE|EXTRA
    const MIN_FIELDS: usize = 6;

    /// Decode `SOURCE|Title|MAGNET|QUALITY|SIZE|EXTRA|POSTER`.
    ///
    /// The poster field is optional; fields past the seventh are ignored.
    pub fn parse_line(line: &str) -> Result<Self, RecordError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Err(RecordError::Empty);
        }

        let parts: Vec<&str> = line.split('|').collect();
        if parts.len() < Self::MIN_FIELDS {
            return Err(RecordError::TooFewFields {
                expected: Self::MIN_FIELDS,
                found: parts.len(),
            });
        }

        Ok(Self {
            source: parts[0].trim().to_string(),
            title: parts[1].trim().to_string(),
            magnet: parts[2].trim().to_string(),
            quality: parts[3].trim().to_string(),
            size: parts[4].trim().to_string(),
            extra: parts[5].trim().to_string(),
            poster: parts.get(6).and_then(|p| present(p)),
        })
    }

    /// Encode back to the pipe-delimited wire format
    pub fn to_line(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}|{}",
            field(&self.source),
            field(&self.title),
            field(&self.magnet),
            field(&self.quality),
            field(&self.size),
            field(&self.extra),
            self.poster.as_deref().map(field).unwrap_or_else(|| NOT_AVAILABLE.into())
        )
    }

    /// Records without a magnet or hash can never be played
    pub fn has_magnet(&self) -> bool {
        let m = self.magnet.trim();
        !m.is_empty() && !m.eq_ignore_ascii_case(NOT_AVAILABLE)
    }
}

// =============================================================================
// Canonical Works
// =============================================================================

/// One distinct title, merged across every source that lists it.
///
/// `sources`, `qualities`, `sizes`, `seeds` and `magnets` are parallel:
/// slot `i` of each describes the same contributing release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalWork {
    pub group_key: String,
    pub title: String,
    pub year: Option<u16>,
    pub sources: Vec<String>,
    pub qualities: Vec<String>,
    pub sizes: Vec<String>,
    pub seeds: Vec<u32>,
    pub magnets: Vec<String>,
    pub poster: Option<String>,
    pub display_seeds: u32,
    pub display_quality: String,
}

impl CanonicalWork {
    /// Start a new work from its first contributing release
    pub fn new(
        group_key: String,
        title: String,
        year: Option<u16>,
        poster: Option<String>,
    ) -> Self {
        Self {
            group_key,
            title,
            year,
            sources: Vec::new(),
            qualities: Vec::new(),
            sizes: Vec::new(),
            seeds: Vec::new(),
            magnets: Vec::new(),
            poster,
            display_seeds: 0,
            display_quality: NOT_AVAILABLE.to_string(),
        }
    }

    /// Number of contributing releases
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Append one contributing release and refresh the display fields
    pub fn push_slot(
        &mut self,
        source: String,
        quality: String,
        size: String,
        seeds: u32,
        magnet: String,
    ) {
        self.sources.push(source);
        self.qualities.push(quality);
        self.sizes.push(size);
        self.seeds.push(seeds);
        self.magnets.push(magnet);
        self.recompute();
    }

    /// Recompute `display_seeds` and `display_quality` from the slots
    pub fn recompute(&mut self) {
        self.display_seeds = self.seeds.iter().copied().max().unwrap_or(0);

        // max_by_key keeps the last maximum, so walk in reverse to keep the first
        self.display_quality = self
            .qualities
            .iter()
            .rev()
            .max_by_key(|q| Quality::from_str_loose(q))
            .filter(|q| Quality::from_str_loose(q) != Quality::Missing)
            .cloned()
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());
    }

    /// Whether `source` already contributes to this work
    pub fn has_source(&self, source: &str) -> bool {
        self.sources.iter().any(|s| s == source)
    }

    /// Magnet of the best-seeded release
    pub fn best_magnet(&self) -> Option<&str> {
        self.seeds
            .iter()
            .enumerate()
            .rev()
            .max_by_key(|(_, s)| **s)
            .and_then(|(i, _)| self.magnets.get(i))
            .map(String::as_str)
    }

    /// Title with year, as written to the wire
    pub fn display_name(&self) -> String {
        match self.year {
            Some(year) => format!("{} ({})", self.title, year),
            None => self.title.clone(),
        }
    }

    /// Encode as `COMBINED|Title|Sources|Seeds|Qualities|Sizes|Magnets|Poster`
    pub fn to_line(&self) -> String {
        let seeds: Vec<String> = self.seeds.iter().map(|s| s.to_string()).collect();
        format!(
            "{}|{}|{}|{}|{}|{}|{}|{}",
            COMBINED_TAG,
            field(&self.display_name()),
            join_array(&self.sources),
            seeds.join("^"),
            join_array(&self.qualities),
            join_array(&self.sizes),
            join_array(&self.magnets),
            self.poster.as_deref().map(field).unwrap_or_else(|| NOT_AVAILABLE.into())
        )
    }

    /// Decode a COMBINED line back into a work.
    ///
    /// Trailing fields beyond the poster are ignored.
    pub fn parse_combined(line: &str) -> Result<Self, RecordError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Err(RecordError::Empty);
        }

        let parts: Vec<&str> = line.split('|').collect();
        if parts[0].trim() != COMBINED_TAG {
            return Err(RecordError::NotCombined);
        }
        if parts.len() < 7 {
            return Err(RecordError::TooFewFields {
                expected: 7,
                found: parts.len(),
            });
        }

        let fragment = normalize::title_fragment(parts[1]);
        let sources = split_array(parts[2]);
        let seeds: Vec<u32> = split_array(parts[3])
            .iter()
            .map(|s| s.trim().parse().unwrap_or(0))
            .collect();
        let qualities = split_array(parts[4]);
        let sizes = split_array(parts[5]);
        let magnets = split_array(parts[6]);

        let n = sources.len();
        if seeds.len() != n || qualities.len() != n || sizes.len() != n || magnets.len() != n {
            return Err(RecordError::RaggedArrays);
        }

        let mut work = CanonicalWork {
            group_key: fragment.group_key(),
            title: fragment.display,
            year: fragment.year,
            sources,
            qualities,
            sizes,
            seeds,
            magnets,
            poster: parts.get(7).and_then(|p| present(p)),
            display_seeds: 0,
            display_quality: String::new(),
        };
        work.recompute();
        Ok(work)
    }
}

impl fmt::Display for CanonicalWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] 👤{} ({})",
            self.display_name(),
            self.display_quality,
            self.display_seeds,
            self.sources.join(", ")
        )
    }
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Format a byte count the way upstream catalogs print it ("1.1GB", "700MB")
pub fn format_size(bytes: u64) -> String {
    const GB: u64 = 1024 * 1024 * 1024;
    const MB: u64 = 1024 * 1024;
    if bytes == 0 {
        NOT_AVAILABLE.to_string()
    } else if bytes >= GB {
        format!("{:.1}GB", bytes as f64 / GB as f64)
    } else {
        format!("{}MB", bytes / MB)
    }
}

/// Build a magnet URI from a bare info hash
pub fn magnet_from_hash(info_hash: &str, display_name: &str) -> String {
    format!(
        "magnet:?xt=urn:btih:{}&dn={}",
        info_hash,
        urlencoding::encode(display_name)
    )
}

/// Lower-cased btih hash embedded in a magnet URI, if any
pub fn info_hash(magnet: &str) -> Option<String> {
    let lower = magnet.to_lowercase();
    let start = lower.find("btih:")? + 5;
    let hash: String = lower[start..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect();
    if hash.is_empty() {
        None
    } else {
        Some(hash)
    }
}

/// `None` for empty or "N/A"/"null" wire values
fn present(value: &str) -> Option<String> {
    let v = value.trim();
    if v.is_empty() || v.eq_ignore_ascii_case(NOT_AVAILABLE) || v == "null" {
        None
    } else {
        Some(v.to_string())
    }
}

/// Fields must never carry the delimiters themselves
fn field(value: &str) -> String {
    value.replace(['|', '\n', '\r'], " ")
}

fn join_array(values: &[String]) -> String {
    values
        .iter()
        .map(|v| field(v).replace('^', " "))
        .collect::<Vec<_>>()
        .join("^")
}

fn split_array(value: &str) -> Vec<String> {
    if value.is_empty() {
        return Vec::new();
    }
    value.split('^').map(|s| s.trim().to_string()).collect()
}

// =============================================================================
// Unit Tests
// =============================================================================
