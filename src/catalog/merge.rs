//! Grouping / merge engine
//!
//! Folds raw records from every source and page into one `CanonicalWork`
//! per group key. Records that are already COMBINED pass through untouched,
//! so running the engine over its own output is a no-op.

use std::collections::HashMap;

use tracing::debug;

use super::normalize;
use crate::models::{info_hash, CanonicalWork, RawRecord, COMBINED_TAG};

/// A decoded input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Raw(RawRecord),
    Combined(CanonicalWork),
}

impl Record {
    /// Decode one wire line; malformed lines yield `None`
    pub fn parse_line(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() || !trimmed.contains('|') {
            return None;
        }

        let parsed = if trimmed.starts_with(COMBINED_TAG) && trimmed[COMBINED_TAG.len()..].starts_with('|') {
            CanonicalWork::parse_combined(trimmed).map(Record::Combined)
        } else {
            RawRecord::parse_line(trimmed).map(Record::Raw)
        };

        match parsed {
            Ok(record) => Some(record),
            Err(e) => {
                debug!(error = %e, "Dropping malformed record");
                None
            }
        }
    }
}

/// Why a record did not contribute to the output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub missing_magnet: usize,
    pub repeated_source: usize,
    pub duplicate_hash: usize,
}

/// Incremental merger.
///
/// Output order is first-seen order of group keys; contributions within a
/// work are kept in arrival order and are only ever appended.
#[derive(Debug, Default)]
pub struct Merger {
    works: Vec<CanonicalWork>,
    index: HashMap<String, usize>,
    stats: MergeStats,
}

impl Merger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one decoded record
    pub fn push(&mut self, record: Record) {
        match record {
            Record::Raw(raw) => self.push_raw(raw),
            Record::Combined(work) => self.push_combined(work),
        }
    }

    /// Already-merged works are emitted verbatim and never merged again
    pub fn push_combined(&mut self, work: CanonicalWork) {
        self.works.push(work);
    }

    /// Fold one raw release into its work
    pub fn push_raw(&mut self, raw: RawRecord) {
        if !raw.has_magnet() {
            self.stats.missing_magnet += 1;
            return;
        }

        let fragment = normalize::title_fragment(&raw.title);
        let key = fragment.group_key();
        let seeds = normalize::record_seeds(&raw.quality, &raw.extra);
        let quality = normalize::clean_quality(&raw.quality);

        if let Some(&i) = self.index.get(&key) {
            let work = &mut self.works[i];
            if work.has_source(&raw.source) {
                self.stats.repeated_source += 1;
                return;
            }
            if let Some(hash) = info_hash(&raw.magnet) {
                if work
                    .magnets
                    .iter()
                    .any(|m| info_hash(m).as_deref() == Some(hash.as_str()))
                {
                    self.stats.duplicate_hash += 1;
                    return;
                }
            }
            if work.poster.is_none() {
                work.poster = raw.poster;
            }
            work.push_slot(raw.source, quality, raw.size, seeds, raw.magnet);
            return;
        }

        let mut work = CanonicalWork::new(key.clone(), fragment.display, fragment.year, raw.poster);
        work.push_slot(raw.source, quality, raw.size, seeds, raw.magnet);
        self.index.insert(key, self.works.len());
        self.works.push(work);
    }

    pub fn stats(&self) -> MergeStats {
        self.stats
    }

    pub fn works(&self) -> &[CanonicalWork] {
        &self.works
    }

    pub fn finish(self) -> Vec<CanonicalWork> {
        self.works
    }
}

/// Merge a batch of raw records
pub fn merge_raw<I>(records: I) -> Vec<CanonicalWork>
where
    I: IntoIterator<Item = RawRecord>,
{
    let mut merger = Merger::new();
    for raw in records {
        merger.push_raw(raw);
    }
    merger.finish()
}

/// Merge decoded records of either kind
pub fn merge_records<I>(records: I) -> Vec<CanonicalWork>
where
    I: IntoIterator<Item = Record>,
{
    let mut merger = Merger::new();
    for record in records {
        merger.push(record);
    }
    merger.finish()
}

/// Merge newline-delimited wire text, skipping malformed lines
pub fn merge_lines(text: &str) -> Vec<CanonicalWork> {
    merge_records(text.lines().filter_map(Record::parse_line))
}

/// Re-feed works as COMBINED records (identity)
pub fn merge_works(works: Vec<CanonicalWork>) -> Vec<CanonicalWork> {
    merge_records(works.into_iter().map(Record::Combined))
}

/// Order works for a search: relevance first, then seeds
pub fn rank_by_relevance(works: &mut [CanonicalWork], query: &str) {
    works.sort_by_cached_key(|w| {
        (
            std::cmp::Reverse(normalize::relevance_score(&w.title, query)),
            std::cmp::Reverse(w.display_seeds),
        )
    });
}
