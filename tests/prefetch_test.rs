//! Prefetch controller tests
//!
//! Drives the controller with scripted in-process sources: background
//! batches, session switches, cache short-circuiting and failing sources.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use termflix::catalog::cache::{CacheLookup, CacheManager, CachePolicy};
use termflix::catalog::prefetch::{PollOutcome, PrefetchController, PrefetchSettings, PrefetchState};
use termflix::models::{CatalogKind, CatalogQuery, RawRecord};
use termflix::source::{FetchError, SourceFetcher, SourceRegistry};

// =============================================================================
// Scripted Sources
// =============================================================================

/// One record per page up to `pages`. Pages at or past `gate_from` wait
/// for a permit before answering.
struct Scripted {
    name: &'static str,
    pages: u32,
    gate_from: u32,
    gate: Arc<Semaphore>,
    calls: Arc<AtomicUsize>,
    completed: Arc<AtomicUsize>,
}

impl Scripted {
    fn new(name: &'static str, pages: u32) -> Self {
        Self {
            name,
            pages,
            gate_from: u32::MAX,
            gate: Arc::new(Semaphore::new(0)),
            calls: Arc::new(AtomicUsize::new(0)),
            completed: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn gated(mut self, from: u32) -> Self {
        self.gate_from = from;
        self
    }
}

#[async_trait]
impl SourceFetcher for Scripted {
    fn name(&self) -> &str {
        self.name
    }

    async fn fetch(
        &self,
        query: &CatalogQuery,
        _limit: u32,
        page: u32,
    ) -> Result<Vec<RawRecord>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if page >= self.gate_from {
            let _permit = self.gate.acquire().await;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);

        if page >= self.pages {
            return Ok(Vec::new());
        }
        let label = query.term.clone().unwrap_or_else(|| query.kind.to_string());
        Ok(vec![RawRecord {
            source: self.name.to_string(),
            title: format!("{} {} (2001)", label, page),
            magnet: format!("magnet:?xt=urn:btih:{}{}{}", self.name, label, page),
            quality: "1080p".into(),
            size: "1GB".into(),
            extra: format!("{} seeds", 100 - page),
            poster: Some(format!("http://img/{}.jpg", page)),
        }])
    }
}

struct Failing;

#[async_trait]
impl SourceFetcher for Failing {
    fn name(&self) -> &str {
        "BROKEN"
    }

    async fn fetch(&self, _: &CatalogQuery, _: u32, _: u32) -> Result<Vec<RawRecord>, FetchError> {
        Err(FetchError::ServerError(500))
    }
}

struct Hanging;

#[async_trait]
impl SourceFetcher for Hanging {
    fn name(&self) -> &str {
        "SLOW"
    }

    async fn fetch(&self, _: &CatalogQuery, _: u32, _: u32) -> Result<Vec<RawRecord>, FetchError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(Vec::new())
    }
}

/// Answers pages before `from`, panics on the rest
struct Panicking {
    from: u32,
}

#[async_trait]
impl SourceFetcher for Panicking {
    fn name(&self) -> &str {
        "CRASHY"
    }

    async fn fetch(&self, _: &CatalogQuery, _: u32, page: u32) -> Result<Vec<RawRecord>, FetchError> {
        if page >= self.from {
            panic!("adapter bug on page {}", page);
        }
        Ok(vec![RawRecord {
            source: "CRASHY".into(),
            title: format!("Crash Test {} (1999)", page),
            magnet: format!("magnet:?xt=urn:btih:crash{}", page),
            quality: "720p".into(),
            size: "700MB".into(),
            extra: "5 seeds".into(),
            poster: None,
        }])
    }
}

fn settings() -> PrefetchSettings {
    PrefetchSettings {
        page_size: 2,
        initial_window: 2,
        batch_window: 2,
        max_pages: 100,
        fetch_limit: 50,
        call_timeout: Duration::from_millis(200),
    }
}

fn controller(
    fetchers: Vec<Arc<dyn SourceFetcher>>,
    cache: Option<CacheManager>,
) -> PrefetchController {
    PrefetchController::new(
        Arc::new(SourceRegistry::with_fetchers(fetchers)),
        cache,
        settings(),
    )
    .unwrap()
}

/// Poll until a batch merges or the session exhausts
async fn wait_for_batch(ctl: &mut PrefetchController) -> PollOutcome {
    for _ in 0..200 {
        match ctl.poll() {
            PollOutcome::Pending => tokio::time::sleep(Duration::from_millis(5)).await,
            outcome => return outcome,
        }
    }
    panic!("background batch never finished");
}

// =============================================================================
// Background Batches
// =============================================================================

#[tokio::test]
async fn test_page_requests_never_wait_for_batch() {
    let source = Scripted::new("A", 10).gated(2);
    let gate = source.gate.clone();
    let mut ctl = controller(vec![Arc::new(source)], None);

    let count = ctl.open(CatalogQuery::new(CatalogKind::Latest, 50), false).await.unwrap();
    assert_eq!(count.pages, 1);
    assert!(count.provisional);
    assert_eq!(ctl.state(), PrefetchState::Prefetching);

    // batch is blocked on the gate, page 0 is still served
    assert_eq!(ctl.turn_to(0).len(), 2);
    assert!(ctl.turn_to(1).is_empty());
    assert_eq!(ctl.poll(), PollOutcome::Pending);

    gate.add_permits(1000);
    let outcome = wait_for_batch(&mut ctl).await;
    assert_eq!(outcome, PollOutcome::Merged { new_records: 2, works: 4 });
    assert_eq!(ctl.turn_to(1).len(), 2);
    assert_eq!(ctl.state(), PrefetchState::Prefetching);
}

#[tokio::test]
async fn test_select_after_merge_sees_new_works() {
    let mut ctl = controller(vec![Arc::new(Scripted::new("A", 4))], None);
    ctl.open(CatalogQuery::new(CatalogKind::Latest, 50), false).await.unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    let work = ctl.select(1, 1).expect("page 1 loaded by the first batch");
    assert_eq!(work.title, "latest 3");
    assert_eq!(work.sources, vec!["A"]);
    assert!(ctl.select(9, 0).is_none());
}

#[tokio::test]
async fn test_exhaustion_is_stable() {
    let mut ctl = controller(vec![Arc::new(Scripted::new("A", 5))], None);
    ctl.open(CatalogQuery::new(CatalogKind::Popular, 50), false).await.unwrap();

    let count = ctl.drain().await;
    assert_eq!(ctl.state(), PrefetchState::Exhausted);
    assert_eq!(ctl.works().len(), 5);
    assert_eq!(count.pages, 3);
    assert!(!count.provisional);

    let titles: Vec<_> = ctl.works().iter().map(|w| w.title.clone()).collect();
    for _ in 0..3 {
        assert_eq!(ctl.poll(), PollOutcome::Idle);
        assert_eq!(ctl.total_pages(), count);
        assert_eq!(ctl.drain().await, count);
    }
    let after: Vec<_> = ctl.works().iter().map(|w| w.title.clone()).collect();
    assert_eq!(after, titles);
}

#[tokio::test]
async fn test_max_pages_caps_prefetching() {
    let source = Scripted::new("A", u32::MAX);
    let calls = source.calls.clone();
    let sources = Arc::new(SourceRegistry::with_fetchers(vec![Arc::new(source)]));
    let mut ctl = PrefetchController::new(
        sources,
        None,
        PrefetchSettings {
            max_pages: 5,
            ..settings()
        },
    )
    .unwrap();

    ctl.open(CatalogQuery::new(CatalogKind::Trending, 50), false).await.unwrap();
    ctl.drain().await;

    assert_eq!(ctl.state(), PrefetchState::Exhausted);
    assert_eq!(ctl.works().len(), 5);
    assert_eq!(calls.load(Ordering::SeqCst), 5);
    assert_eq!(ctl.session().unwrap().pages_loaded, 5);
}

// =============================================================================
// Session Switching
// =============================================================================

#[tokio::test]
async fn test_switch_discards_previous_batch() {
    let source = Scripted::new("A", 10).gated(2);
    let gate = source.gate.clone();
    let completed = source.completed.clone();
    let mut ctl = controller(vec![Arc::new(source)], None);

    ctl.open(CatalogQuery::new(CatalogKind::Latest, 50), false).await.unwrap();
    let first = ctl.session().unwrap().id;
    assert_eq!(completed.load(Ordering::SeqCst), 2);

    ctl.switch(CatalogQuery::search("dune", 50)).await.unwrap();
    assert_ne!(ctl.session().unwrap().id, first);
    assert_eq!(completed.load(Ordering::SeqCst), 4);

    gate.add_permits(1000);
    let outcome = wait_for_batch(&mut ctl).await;
    assert!(matches!(outcome, PollOutcome::Merged { .. }));

    // only the live session's two batch calls got through the gate
    assert_eq!(completed.load(Ordering::SeqCst), 6);
    assert!(ctl.works().iter().all(|w| w.title.starts_with("dune")));
    assert_eq!(ctl.works().len(), 4);
}

#[tokio::test]
async fn test_cancel_leaves_no_session() {
    let source = Scripted::new("A", 10).gated(2);
    let gate = source.gate.clone();
    let completed = source.completed.clone();
    let mut ctl = controller(vec![Arc::new(source)], None);

    ctl.open(CatalogQuery::new(CatalogKind::Shows, 50), false).await.unwrap();
    ctl.cancel();
    assert!(ctl.session().is_none());
    assert_eq!(ctl.state(), PrefetchState::Init);
    assert!(ctl.works().is_empty());

    gate.add_permits(1000);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(ctl.poll(), PollOutcome::Idle);
    assert_eq!(completed.load(Ordering::SeqCst), 2);
}

// =============================================================================
// Cache Interaction
// =============================================================================

#[tokio::test]
async fn test_cache_hit_skips_sources() {
    let dir = tempfile::tempdir().unwrap();
    let query = CatalogQuery::new(CatalogKind::Latest, 50);

    let first = Scripted::new("A", 3);
    let mut ctl = controller(
        vec![Arc::new(first)],
        Some(CacheManager::new(dir.path(), CachePolicy::default())),
    );
    ctl.open(query.clone(), false).await.unwrap();
    ctl.drain().await;
    let expected = ctl.works().to_vec();
    drop(ctl);

    let second = Scripted::new("A", 3);
    let calls = second.calls.clone();
    let mut ctl = controller(
        vec![Arc::new(second)],
        Some(CacheManager::new(dir.path(), CachePolicy::default())),
    );

    let count = ctl.open(query, false).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(ctl.session().unwrap().from_cache);
    assert_eq!(ctl.state(), PrefetchState::Exhausted);
    assert!(!count.provisional);
    assert_eq!(ctl.works(), expected.as_slice());
}

#[tokio::test]
async fn test_refresh_bypasses_fresh_cache() {
    let dir = tempfile::tempdir().unwrap();
    let query = CatalogQuery::search("dune", 50);
    let cache = CacheManager::new(dir.path(), CachePolicy::default());

    let mut ctl = controller(vec![Arc::new(Scripted::new("A", 1))], Some(cache.clone()));
    ctl.open(query.clone(), false).await.unwrap();
    drop(ctl);

    let source = Scripted::new("A", 1);
    let calls = source.calls.clone();
    let mut ctl = controller(vec![Arc::new(source)], Some(cache));
    ctl.open(query, true).await.unwrap();

    assert!(calls.load(Ordering::SeqCst) > 0);
    assert!(!ctl.session().unwrap().from_cache);
}

#[tokio::test]
async fn test_exhaustion_rewrites_cache_with_full_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let cache = CacheManager::new(dir.path(), CachePolicy::default());
    let query = CatalogQuery::new(CatalogKind::Popular, 50);

    let mut ctl = controller(vec![Arc::new(Scripted::new("A", 7))], Some(cache.clone()));
    ctl.open(query.clone(), false).await.unwrap();

    // initial window is cached before any batch finishes
    match cache.lookup(&query) {
        CacheLookup::Fresh(works) => assert_eq!(works.len(), 2),
        other => panic!("expected fresh cache, got {:?}", other),
    }

    ctl.drain().await;
    match cache.lookup(&query) {
        CacheLookup::Fresh(works) => assert_eq!(works.len(), 7),
        other => panic!("expected fresh cache, got {:?}", other),
    }
}

// =============================================================================
// Source Failures
// =============================================================================

#[tokio::test]
async fn test_failing_and_hanging_sources_are_skipped() {
    let mut ctl = controller(
        vec![
            Arc::new(Failing),
            Arc::new(Hanging),
            Arc::new(Scripted::new("A", 2)),
        ],
        None,
    );

    let count = ctl.open(CatalogQuery::new(CatalogKind::Latest, 50), false).await.unwrap();
    assert_eq!(count.pages, 1);
    assert_eq!(ctl.works().len(), 2);
    assert!(ctl.works().iter().all(|w| w.sources == vec!["A"]));
}

#[tokio::test]
async fn test_all_sources_failing_is_no_results() {
    let mut ctl = controller(vec![Arc::new(Failing), Arc::new(Hanging)], None);
    let err = ctl
        .open(CatalogQuery::search("anything", 50), false)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("try again"));
    assert_eq!(ctl.state(), PrefetchState::Exhausted);
    assert_eq!(ctl.poll(), PollOutcome::Idle);
}

#[tokio::test]
async fn test_panicking_source_in_initial_window_is_skipped() {
    let mut ctl = controller(
        vec![Arc::new(Panicking { from: 0 }), Arc::new(Scripted::new("A", 2))],
        None,
    );

    let count = ctl.open(CatalogQuery::new(CatalogKind::Trending, 50), false).await.unwrap();
    assert_eq!(count.pages, 1);
    assert_eq!(ctl.works().len(), 2);
    assert!(ctl.works().iter().all(|w| w.sources == vec!["A"]));
}

#[tokio::test]
async fn test_panicking_batch_exhausts_and_keeps_works() {
    let mut ctl = controller(vec![Arc::new(Panicking { from: 2 })], None);

    ctl.open(CatalogQuery::new(CatalogKind::Latest, 50), false).await.unwrap();
    assert_eq!(ctl.works().len(), 2);
    assert_eq!(ctl.state(), PrefetchState::Prefetching);

    assert_eq!(wait_for_batch(&mut ctl).await, PollOutcome::Exhausted);
    assert_eq!(ctl.state(), PrefetchState::Exhausted);
    assert_eq!(ctl.works().len(), 2);
    assert_eq!(ctl.poll(), PollOutcome::Idle);
}
