//! Title normalization
//!
//! Turns noisy release names into a stable grouping key so that
//! "The.Matrix.1999.1080p.BluRay.x264-GROUP" and "The Matrix (1999) [1080p]"
//! land in the same bucket. Also pulls seed counts out of the free-text
//! quality/extra fields.
//!
//! All functions are pure and strip terminal escape sequences before any
//! pattern matching.

use regex::Regex;
use std::sync::LazyLock;

static ANSI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").expect("valid ANSI regex"));

static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^A-Za-z0-9])((?:19|20)\d{2})(?:$|[^A-Za-z0-9])").expect("valid year regex")
});

static BRACKET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*\]").expect("valid bracket regex"));

static SEEDS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d[\d,]*)\s*seeds?\b").expect("valid seeds regex"));

static HYPHEN_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:web-?dl|web-?rip|blu-?ray|dts-hd|h-?26[45]|x-?26[45])\b")
        .expect("valid tag regex")
});

static NON_ALNUM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}]+").expect("valid separator regex"));

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{L}\p{N}]+").expect("valid word regex"));

/// Release tags that never belong to a title
const NOISE_TOKENS: &[&str] = &[
    // resolution
    "2160p", "1080p", "1080i", "720p", "480p", "4k", "uhd",
    // source
    "bluray", "bdrip", "brrip", "webdl", "webrip", "hdrip", "dvdrip", "hdtv", "hdcam", "dvdscr",
    // codec
    "x264", "x265", "h264", "h265", "hevc", "avc", "xvid", "10bit", "8bit",
    // audio
    "aac", "ac3", "eac3", "dts", "truehd", "atmos", "ddp5", "dd5",
    // hdr
    "hdr", "hdr10", "dovi",
    // groups
    "yts", "yify", "rarbg", "eztv", "ettv",
    // edition
    "repack", "proper", "extended", "unrated", "remastered", "remux",
];

/// Title portion of a release name, before the year
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleFragment {
    /// Human-readable title with release separators turned into spaces
    pub display: String,
    /// Lower-case, noise-free form used for grouping
    pub normalized: String,
    pub year: Option<u16>,
}

impl TitleFragment {
    /// `normalized_year`, or just `normalized` when no year was found
    pub fn group_key(&self) -> String {
        match self.year {
            Some(year) => format!("{}_{}", self.normalized, year),
            None => self.normalized.clone(),
        }
    }
}

/// Remove terminal color/escape sequences
pub fn strip_ansi(s: &str) -> String {
    ANSI_RE.replace_all(s, "").into_owned()
}

/// First plausible release year and the byte offset where it starts
pub fn extract_year(title: &str) -> Option<(u16, usize)> {
    year_from(title, 0)
}

fn year_from(title: &str, from: usize) -> Option<(u16, usize)> {
    let caps = YEAR_RE.captures(title.get(from..)?)?;
    let m = caps.get(1)?;
    let year = m.as_str().parse().ok()?;
    Some((year, from + m.start()))
}

/// Byte offset of the first release tag (resolution, codec, source...)
fn noise_start(s: &str) -> Option<usize> {
    let token = WORD_RE
        .find_iter(s)
        .find(|m| NOISE_TOKENS.contains(&m.as_str().to_lowercase().as_str()))
        .map(|m| m.start());
    let tag = HYPHEN_TAG_RE.find(s).map(|m| m.start());
    token.into_iter().chain(tag).min()
}

/// Split a release name into its title fragment and year.
///
/// Everything from the year onward is discarded, as are `[...]` groups.
/// A year with no title before it ("1917 (2019)") is part of the title and
/// the next year is used instead. Without a year the name is cut at its first
/// release tag, so a trailing "-GROUP" never reaches the key.
pub fn title_fragment(title: &str) -> TitleFragment {
    let clean = strip_ansi(title);

    let mut from = 0;
    while let Some((year, start)) = year_from(&clean, from) {
        let head = BRACKET_RE.replace_all(&clean[..start], " ");
        let normalized = normalize_title(&head);
        if !normalized.is_empty() {
            return TitleFragment {
                display: display_title(&head),
                normalized,
                year: Some(year),
            };
        }
        from = start + 4;
    }

    let whole = BRACKET_RE.replace_all(&clean, " ");
    let head = match noise_start(&whole) {
        Some(pos) if !normalize_title(&whole[..pos]).is_empty() => &whole[..pos],
        _ => &whole[..],
    };
    TitleFragment {
        display: display_title(head),
        normalized: normalize_title(head),
        year: None,
    }
}

/// Lower-case, collapse non-alphanumeric runs and drop release noise
pub fn normalize_title(fragment: &str) -> String {
    let lower = strip_ansi(fragment).to_lowercase();
    let lower = HYPHEN_TAG_RE.replace_all(&lower, " ");

    NON_ALNUM_RE
        .split(&lower)
        .filter(|t| !t.is_empty() && !NOISE_TOKENS.contains(t))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Grouping key for a release name
pub fn group_key(title: &str) -> String {
    title_fragment(title).group_key()
}

fn display_title(head: &str) -> String {
    let spaced = head.replace(['.', '_'], " ");
    spaced
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| c.is_whitespace() || "([{-:,".contains(c))
        .to_string()
}

// =============================================================================
// Seeds & Quality
// =============================================================================

/// Seed count written as "<n> seeds" anywhere in `text`
pub fn parse_seeds(text: &str) -> Option<u32> {
    let clean = strip_ansi(text);
    let caps = SEEDS_RE.captures(&clean)?;
    caps.get(1)?.as_str().replace(',', "").parse().ok()
}

/// Seed count for a raw record.
///
/// A count embedded in the quality field wins over the extra field; a bare
/// number in the extra field is accepted as a last resort.
pub fn record_seeds(quality: &str, extra: &str) -> u32 {
    parse_seeds(quality)
        .or_else(|| parse_seeds(extra))
        .or_else(|| strip_ansi(extra).trim().replace(',', "").parse().ok())
        .unwrap_or(0)
}

/// Quality label with any embedded seed count removed
pub fn clean_quality(quality: &str) -> String {
    let clean = strip_ansi(quality);
    let stripped = SEEDS_RE.replace_all(&clean, " ");
    let label = stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| c == '-' || c == ',' || c == '|' || c.is_whitespace())
        .to_string();
    if label.is_empty() {
        crate::models::NOT_AVAILABLE.to_string()
    } else {
        label
    }
}

/// Best-effort resolution label from a release name
pub fn quality_from_name(name: &str) -> String {
    let lower = name.to_lowercase();
    let label = if lower.contains("2160p") || lower.contains("4k") || lower.contains("uhd") {
        "2160p"
    } else if lower.contains("1080p") || lower.contains("1080i") {
        "1080p"
    } else if lower.contains("720p") {
        "720p"
    } else if lower.contains("480p") {
        "480p"
    } else if lower.contains("hdtv") {
        "HDTV"
    } else {
        crate::models::NOT_AVAILABLE
    };
    label.to_string()
}

// =============================================================================
// Relevance
// =============================================================================

/// Score how well a title matches a search query.
///
/// 1000 exact, 100 prefix, 10..=50 substring (earlier is higher), 0 otherwise.
pub fn relevance_score(title: &str, query: &str) -> u32 {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return 0;
    }
    let title = title.trim().to_lowercase();

    if title == query {
        1000
    } else if title.starts_with(&query) {
        100
    } else if let Some(pos) = title.find(&query) {
        10 + 40u32.saturating_sub(pos as u32 * 2)
    } else {
        0
    }
}
