//! Prefetch controller
//!
//! Loads an initial window of pages synchronously, then keeps one detached
//! background batch in flight per session. The batch is never awaited by
//! page requests: completion is observed by [`PrefetchController::poll`],
//! which callers run before rendering a page and after a selection.
//!
//! ```text
//! INIT -> LOADING_INITIAL -> READY <-> PREFETCHING -> EXHAUSTED
//! ```
//!
//! The raw buffer is only touched by the foreground after the batch task
//! has exited, and a batch tagged with another session id is dropped.

use std::collections::HashSet;
use std::ops::Range;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::FutureExt;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::cache::{CacheLookup, CacheManager};
use super::merge;
use crate::config::CatalogConfig;
use crate::models::{CanonicalWork, CatalogKind, CatalogQuery, RawRecord};
use crate::source::{FetchError, SourceRegistry};

/// Errors visible outside the engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("No results for {0}, try again")]
    NoResults(String),

    #[error("Catalog controller must be created inside a Tokio runtime")]
    NoRuntime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrefetchState {
    Init,
    LoadingInitial,
    Ready,
    Prefetching,
    Exhausted,
}

/// Paging and batching knobs
#[derive(Debug, Clone, Copy)]
pub struct PrefetchSettings {
    pub page_size: usize,
    pub initial_window: u32,
    pub batch_window: u32,
    pub max_pages: u32,
    pub fetch_limit: u32,
    /// Upper bound on one source call, retries and mirror fallback included
    pub call_timeout: Duration,
}

impl Default for PrefetchSettings {
    fn default() -> Self {
        PrefetchSettings::from(&CatalogConfig::default())
    }
}

impl From<&CatalogConfig> for PrefetchSettings {
    fn from(config: &CatalogConfig) -> Self {
        Self {
            page_size: config.page_size.max(1),
            initial_window: config.initial_window.max(1),
            batch_window: config.batch_window.max(1),
            max_pages: config.max_pages,
            fetch_limit: config.fetch_limit,
            call_timeout: config
                .fetch_timeout()
                .saturating_mul(config.max_retries.saturating_add(2)),
        }
    }
}

/// Total page count; provisional while a batch is in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PageCount {
    pub pages: usize,
    pub provisional: bool,
}

/// Result of a non-blocking poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing in flight
    Idle,
    /// Batch still running
    Pending,
    /// Batch merged and the next one spawned
    Merged { new_records: usize, works: usize },
    /// Batch yielded nothing new; no further batches
    Exhausted,
}

struct BatchOutput {
    session: Uuid,
    window: Range<u32>,
    records: Vec<RawRecord>,
}

/// One progressive-load session, tied to a single query identity
pub struct PrefetchSession {
    pub id: Uuid,
    pub query: CatalogQuery,
    pub pages_loaded: u32,
    pub next_batch_start: u32,
    pub next_batch_end: u32,
    pub from_cache: bool,
    state: PrefetchState,
    raw: Vec<RawRecord>,
    seen: HashSet<(String, String)>,
    works: Vec<CanonicalWork>,
    task: Option<JoinHandle<BatchOutput>>,
    grown: bool,
}

impl PrefetchSession {
    fn new(query: CatalogQuery) -> Self {
        Self {
            id: Uuid::new_v4(),
            query,
            pages_loaded: 0,
            next_batch_start: 0,
            next_batch_end: 0,
            from_cache: false,
            state: PrefetchState::Init,
            raw: Vec::new(),
            seen: HashSet::new(),
            works: Vec::new(),
            task: None,
            grown: false,
        }
    }

    pub fn state(&self) -> PrefetchState {
        self.state
    }

    pub fn raw_len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.state == PrefetchState::Exhausted
    }

    /// Append records not already buffered, keyed by (source, magnet)
    fn absorb(&mut self, records: Vec<RawRecord>) -> usize {
        let mut added = 0;
        for record in records {
            if self
                .seen
                .insert((record.source.clone(), record.magnet.clone()))
            {
                self.raw.push(record);
                added += 1;
            }
        }
        added
    }

    /// Re-run the merge over the full raw buffer
    fn remerge(&mut self) {
        let mut works = merge::merge_raw(self.raw.iter().cloned());
        if self.query.kind == CatalogKind::Search {
            if let Some(term) = &self.query.term {
                merge::rank_by_relevance(&mut works, term);
            }
        }
        self.works = works;
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for PrefetchSession {
    fn drop(&mut self) {
        self.abort();
    }
}

/// Fetch `pages` of `query` from every source in parallel.
///
/// A source that errors, panics or exceeds `call_timeout` contributes
/// nothing. Output is ordered page-major, then by registry order.
pub async fn fetch_window(
    sources: &SourceRegistry,
    query: &CatalogQuery,
    pages: Range<u32>,
    limit: u32,
    call_timeout: Duration,
) -> Vec<RawRecord> {
    let calls = pages.flat_map(|page| sources.iter().map(move |fetcher| (page, fetcher.clone())));

    let futures = calls.map(|(page, fetcher)| async move {
        let name = fetcher.name().to_string();
        let call = tokio::time::timeout(call_timeout, fetcher.fetch(query, limit, page));
        let result = match AssertUnwindSafe(call).catch_unwind().await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(FetchError::Timeout(call_timeout)),
            Err(_) => Err(FetchError::Panicked),
        };

        match result {
            Ok(records) => {
                debug!(source = %name, page, records = records.len(), "Source page fetched");
                records
            }
            Err(e) => {
                warn!(source = %name, page, error = %e, "Source fetch failed");
                Vec::new()
            }
        }
    });

    join_all(futures).await.into_iter().flatten().collect()
}

/// Owns the current session and drives it through its states
pub struct PrefetchController {
    sources: Arc<SourceRegistry>,
    cache: Option<CacheManager>,
    settings: PrefetchSettings,
    runtime: Handle,
    session: Option<PrefetchSession>,
}

impl PrefetchController {
    /// Must be called from within a Tokio runtime
    pub fn new(
        sources: Arc<SourceRegistry>,
        cache: Option<CacheManager>,
        settings: PrefetchSettings,
    ) -> Result<Self, CatalogError> {
        let runtime = Handle::try_current().map_err(|_| CatalogError::NoRuntime)?;
        Ok(Self {
            sources,
            cache,
            settings,
            runtime,
            session: None,
        })
    }

    pub fn settings(&self) -> &PrefetchSettings {
        &self.settings
    }

    pub fn session(&self) -> Option<&PrefetchSession> {
        self.session.as_ref()
    }

    pub fn state(&self) -> PrefetchState {
        self.session
            .as_ref()
            .map(|s| s.state)
            .unwrap_or(PrefetchState::Init)
    }

    /// Open a catalog, replacing any current session.
    ///
    /// Serves a fresh cache entry when one exists (unless `refresh`);
    /// otherwise loads the initial window, writes the cache and starts
    /// background prefetching.
    pub async fn open(&mut self, query: CatalogQuery, refresh: bool) -> Result<PageCount, CatalogError> {
        self.cancel();
        let mut session = PrefetchSession::new(query);

        if !refresh {
            if let Some(works) = self.cached(&session.query) {
                session.works = works;
                session.from_cache = true;
                session.state = PrefetchState::Exhausted;
                self.session = Some(session);
                return Ok(self.total_pages());
            }
        }

        session.state = PrefetchState::LoadingInitial;
        let window = 0..self.settings.initial_window.min(self.settings.max_pages.max(1));
        info!(query = %session.query, pages = ?window, "Loading initial window");

        let records = fetch_window(
            &self.sources,
            &session.query,
            window.clone(),
            self.settings.fetch_limit,
            self.settings.call_timeout,
        )
        .await;

        session.absorb(records);
        session.remerge();
        session.pages_loaded = window.end;

        if session.works.is_empty() {
            session.state = PrefetchState::Exhausted;
            let query = session.query.to_string();
            self.session = Some(session);
            return Err(CatalogError::NoResults(query));
        }

        self.write_cache(&session);
        session.state = PrefetchState::Ready;
        self.session = Some(session);
        self.advance_window();
        Ok(self.total_pages())
    }

    /// Cancel the current session and open another
    pub async fn switch(&mut self, query: CatalogQuery) -> Result<PageCount, CatalogError> {
        self.open(query, false).await
    }

    /// Abort any in-flight batch and drop the session
    pub fn cancel(&mut self) {
        if let Some(mut session) = self.session.take() {
            debug!(session = %session.id, "Cancelling session");
            session.abort();
        }
    }

    /// Non-blocking check for a finished background batch
    pub fn poll(&mut self) -> PollOutcome {
        let Some(session) = self.session.as_mut() else {
            return PollOutcome::Idle;
        };
        let Some(mut task) = session.task.take() else {
            return PollOutcome::Idle;
        };
        if !task.is_finished() {
            session.task = Some(task);
            return PollOutcome::Pending;
        }

        match (&mut task).now_or_never() {
            Some(result) => self.complete_batch(result),
            None => {
                session.task = Some(task);
                PollOutcome::Pending
            }
        }
    }

    /// Await background batches until the session is exhausted
    pub async fn drain(&mut self) -> PageCount {
        loop {
            let task = match self.session.as_mut().and_then(|s| s.task.take()) {
                Some(task) => task,
                None => break,
            };
            let result = task.await;
            self.complete_batch(result);
        }
        self.total_pages()
    }

    /// Works on page `idx` (0-based); empty past the end
    pub fn page(&self, idx: usize) -> &[CanonicalWork] {
        let works = self.works();
        let start = idx.saturating_mul(self.settings.page_size);
        if start >= works.len() {
            return &[];
        }
        let end = (start + self.settings.page_size).min(works.len());
        &works[start..end]
    }

    /// Poll, then return page `idx`
    pub fn turn_to(&mut self, idx: usize) -> &[CanonicalWork] {
        self.poll();
        self.page(idx)
    }

    /// Poll, then return the chosen work
    pub fn select(&mut self, page: usize, idx: usize) -> Option<CanonicalWork> {
        self.poll();
        self.page(page).get(idx).cloned()
    }

    pub fn total_pages(&self) -> PageCount {
        let len = self.works().len();
        PageCount {
            pages: len.div_ceil(self.settings.page_size),
            provisional: self.state() == PrefetchState::Prefetching,
        }
    }

    pub fn works(&self) -> &[CanonicalWork] {
        self.session.as_ref().map(|s| s.works.as_slice()).unwrap_or(&[])
    }

    fn cached(&self, query: &CatalogQuery) -> Option<Vec<CanonicalWork>> {
        match self.cache.as_ref()?.lookup(query) {
            CacheLookup::Fresh(works) => Some(works),
            other => {
                debug!(query = %query, lookup = ?other, "Cache miss");
                None
            }
        }
    }

    fn write_cache(&self, session: &PrefetchSession) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.store(&session.query, &session.works) {
                warn!(error = %e, "Failed to write catalog cache");
            }
        }
    }

    /// Spawn the next batch, or exhaust when the page cap is reached
    fn advance_window(&mut self) {
        let settings = self.settings;
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let start = session.pages_loaded;
        let end = (start + settings.batch_window).min(settings.max_pages);
        session.next_batch_start = start;
        session.next_batch_end = end;

        if start >= end {
            self.exhaust();
            return;
        }

        let sources = self.sources.clone();
        let query = session.query.clone();
        let id = session.id;
        let window = start..end;
        debug!(session = %id, pages = ?window, "Spawning prefetch batch");

        session.task = Some(self.runtime.spawn(async move {
            let records = fetch_window(
                &sources,
                &query,
                window.clone(),
                settings.fetch_limit,
                settings.call_timeout,
            )
            .await;
            BatchOutput {
                session: id,
                window,
                records,
            }
        }));
        session.state = PrefetchState::Prefetching;
    }

    fn complete_batch(&mut self, result: Result<BatchOutput, JoinError>) -> PollOutcome {
        let Some(session) = self.session.as_mut() else {
            return PollOutcome::Idle;
        };

        let output = match result {
            Ok(output) if output.session == session.id => output,
            Ok(output) => {
                debug!(stale = %output.session, "Dropping batch from a previous session");
                return PollOutcome::Idle;
            }
            Err(e) => {
                warn!(error = %e, "Prefetch batch crashed, treating as empty");
                self.exhaust();
                return PollOutcome::Exhausted;
            }
        };

        let new_records = session.absorb(output.records);
        session.pages_loaded = output.window.end;

        if new_records == 0 {
            self.exhaust();
            return PollOutcome::Exhausted;
        }

        session.remerge();
        session.grown = true;
        session.state = PrefetchState::Ready;
        let works = session.works.len();
        info!(pages = ?output.window, new_records, works, "Prefetch batch merged");

        self.advance_window();
        PollOutcome::Merged { new_records, works }
    }

    fn exhaust(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.task = None;
        session.state = PrefetchState::Exhausted;
        info!(query = %session.query, works = session.works.len(), "Catalog exhausted");

        if session.grown {
            session.grown = false;
            if let Some(session) = self.session.as_ref() {
                self.write_cache(session);
            }
        }
    }
}

impl Drop for PrefetchController {
    fn drop(&mut self) {
        self.cancel();
    }
}
