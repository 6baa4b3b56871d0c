//! Catalog cache tests
//!
//! TTL boundaries, contamination deletion and maintenance commands, all
//! against a temporary cache root.

use std::fs;
use std::time::{Duration, SystemTime};

use termflix::catalog::cache::{CacheLookup, CacheManager, CachePolicy, Contamination};
use termflix::config::{CacheConfig, Config};
use termflix::models::{CanonicalWork, CatalogKind, CatalogQuery};

fn work(title: &str, source: &str, poster: Option<&str>) -> CanonicalWork {
    let line = format!(
        "COMBINED|{} (2010)|{}|100|1080p|2GB|magnet:?xt=urn:btih:{}|{}",
        title,
        source,
        title.to_lowercase(),
        poster.unwrap_or("N/A")
    );
    CanonicalWork::parse_combined(&line).unwrap()
}

fn modified(cache: &CacheManager, query: &CatalogQuery) -> SystemTime {
    fs::metadata(cache.path_for(query))
        .unwrap()
        .modified()
        .unwrap()
}

// =============================================================================
// TTL Tests
// =============================================================================

#[test]
fn test_ttl_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let cache = CacheManager::new(dir.path(), CachePolicy::default());
    let query = CatalogQuery::new(CatalogKind::Trending, 50);
    let works = vec![work("Inception", "YTS", Some("http://p1"))];

    cache.store(&query, &works).unwrap();
    let written = modified(&cache, &query);
    let ttl = Duration::from_secs(3600);

    let before = cache.lookup_at(&query, written + ttl - Duration::from_secs(1));
    assert_eq!(before, CacheLookup::Fresh(works));

    let after = cache.lookup_at(&query, written + ttl + Duration::from_secs(1));
    assert!(matches!(after, CacheLookup::Expired { age } if age > ttl));

    // expired entries stay on disk until overwritten
    assert!(cache.path_for(&query).exists());
}

#[test]
fn test_ttl_depends_on_kind() {
    let dir = tempfile::tempdir().unwrap();
    let cache = CacheManager::new(dir.path(), CachePolicy::default());
    let search = CatalogQuery::search("inception", 50);
    let popular = CatalogQuery::new(CatalogKind::Popular, 50);
    let works = vec![work("Inception", "YTS", None)];

    cache.store(&search, &works).unwrap();
    cache.store(&popular, &works).unwrap();

    let two_hours = Duration::from_secs(7200);
    let search_at = modified(&cache, &search) + two_hours;
    let popular_at = modified(&cache, &popular) + two_hours;

    assert!(matches!(cache.lookup_at(&search, search_at), CacheLookup::Expired { .. }));
    assert!(matches!(cache.lookup_at(&popular, popular_at), CacheLookup::Fresh(_)));
}

#[test]
fn test_configured_ttl_is_used() {
    let mut config = CacheConfig::default();
    config.ttl.latest = 10;

    let dir = tempfile::tempdir().unwrap();
    let cache = CacheManager::new(dir.path(), CachePolicy::from(&config));
    let query = CatalogQuery::new(CatalogKind::Latest, 50);
    cache.store(&query, &[work("Heat", "TPB", None)]).unwrap();

    let at = modified(&cache, &query) + Duration::from_secs(10);
    assert!(matches!(cache.lookup_at(&query, at), CacheLookup::Expired { .. }));
}

// =============================================================================
// Contamination Tests
// =============================================================================

#[test]
fn test_deprecated_source_deletes_file() {
    let dir = tempfile::tempdir().unwrap();
    let cache = CacheManager::new(dir.path(), CachePolicy::default());
    let query = CatalogQuery::new(CatalogKind::Latest, 50);

    cache
        .store(&query, &[work("Inception", "YTS", None), work("Heat", "1337x", None)])
        .unwrap();

    assert_eq!(
        cache.lookup(&query),
        CacheLookup::Contaminated(Contamination::DeprecatedSource("1337x".into()))
    );
    assert!(!cache.path_for(&query).exists());
    assert_eq!(cache.lookup(&query), CacheLookup::Missing);
}

#[test]
fn test_contamination_checked_even_when_expired() {
    let dir = tempfile::tempdir().unwrap();
    let cache = CacheManager::new(dir.path(), CachePolicy::default());
    let query = CatalogQuery::new(CatalogKind::Latest, 50);
    cache.store(&query, &[work("Heat", "1337x", None)]).unwrap();

    let later = modified(&cache, &query) + Duration::from_secs(86_400);
    assert!(matches!(cache.lookup_at(&query, later), CacheLookup::Contaminated(_)));
    assert!(!cache.path_for(&query).exists());
}

#[test]
fn test_placeholder_posters_delete_file() {
    let dir = tempfile::tempdir().unwrap();
    let cache = CacheManager::new(dir.path(), CachePolicy::default());
    let query = CatalogQuery::new(CatalogKind::Popular, 50);

    cache
        .store(
            &query,
            &[
                work("Alpha", "YTS", Some("http://img/placeholder.jpg")),
                work("Beta", "YTS", Some("http://img/no-poster.png")),
                work("Gamma", "YTS", Some("http://img/gamma.jpg")),
            ],
        )
        .unwrap();

    assert!(matches!(
        cache.lookup(&query),
        CacheLookup::Contaminated(Contamination::PlaceholderPosters { .. })
    ));
    assert!(!cache.path_for(&query).exists());
}

#[test]
fn test_garbage_file_is_discarded() {
    let dir = tempfile::tempdir().unwrap();
    let cache = CacheManager::new(dir.path(), CachePolicy::default());
    let query = CatalogQuery::new(CatalogKind::Shows, 50);

    let path = cache.path_for(&query);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, "not a cache line\nYTS|too|short\n").unwrap();

    assert_eq!(cache.lookup(&query), CacheLookup::Unreadable);
    assert!(!path.exists());
}

#[test]
fn test_raw_record_cache_is_merged_on_read() {
    let dir = tempfile::tempdir().unwrap();
    let cache = CacheManager::new(dir.path(), CachePolicy::default());
    let query = CatalogQuery::new(CatalogKind::Latest, 50);

    let path = cache.path_for(&query);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(
        &path,
        "YTS|Inception (2010)|magnet:?xt=urn:btih:AAA|1080p|2.1GB|2000 seeds|http://p1\n\
         TPB|Inception 2010 720p BRRip|magnet:?xt=urn:btih:BBB|720p|1.1GB|500 seeds|N/A\n",
    )
    .unwrap();

    let works = cache.lookup(&query).into_fresh().unwrap();
    assert_eq!(works.len(), 1);
    assert_eq!(works[0].sources, vec!["YTS", "TPB"]);
    assert_eq!(works[0].display_seeds, 2000);
}

// =============================================================================
// Maintenance Tests
// =============================================================================

#[test]
fn test_status_and_clear() {
    let dir = tempfile::tempdir().unwrap();
    let cache = CacheManager::new(dir.path(), CachePolicy::default());
    assert_eq!(cache.status().unwrap().entries, 0);
    assert_eq!(cache.clear().unwrap(), 0);

    let works = vec![work("Inception", "YTS", None)];
    cache.store(&CatalogQuery::new(CatalogKind::Latest, 50), &works).unwrap();
    cache.store(&CatalogQuery::search("inception", 50), &works).unwrap();

    let stats = cache.status().unwrap();
    assert_eq!(stats.entries, 2);
    assert!(stats.bytes > 0);
    assert_eq!(stats.dir, dir.path().join("catalog"));

    assert_eq!(cache.clear().unwrap(), 2);
    assert_eq!(cache.status().unwrap().entries, 0);
}

#[test]
fn test_invalidate_single_query() {
    let dir = tempfile::tempdir().unwrap();
    let cache = CacheManager::new(dir.path(), CachePolicy::default());
    let latest = CatalogQuery::new(CatalogKind::Latest, 50);
    let shows = CatalogQuery::new(CatalogKind::Shows, 50);
    let works = vec![work("Inception", "YTS", None)];

    cache.store(&latest, &works).unwrap();
    cache.store(&shows, &works).unwrap();

    assert!(cache.invalidate(&latest).unwrap());
    assert!(!cache.invalidate(&latest).unwrap());
    assert!(matches!(cache.lookup(&shows), CacheLookup::Fresh(_)));
}

#[test]
fn test_manager_from_config_uses_cache_dir() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.cache.dir = Some(dir.path().to_path_buf());

    let cache = CacheManager::from_config(&config).unwrap();
    let query = CatalogQuery::genre("horror", 50);
    let path = cache.store(&query, &[work("Alien", "YTS", None)]).unwrap();
    assert!(path.starts_with(dir.path()));
}
