//! Unit tests for the QR asset cache
//!
//! Filesystem tests run in temporary directories; age-based tests use the
//! in-memory blob store on a manual clock.

use chrono::Duration;
use pretty_assertions::assert_eq;
use reftrak::clock::ManualClock;
use reftrak::qr::{
    cache_key, BlobStore, CacheError, FsBlobStore, MemoryBlobStore, QrCache, QrEncoder,
    ENTRY_PATTERN,
};
use reftrak::reporting::{LogReporter, RecentErrors};
use std::sync::Arc;
use tempfile::TempDir;

use crate::common::{CountingEncoder, TinyEncoder, UnavailableEncoder};

const BASE_URL: &str = "https://example.com/download";

struct FsHarness {
    dir: TempDir,
    encoder: Arc<CountingEncoder>,
    cache: QrCache,
}

fn fs_harness() -> FsHarness {
    let dir = tempfile::tempdir().unwrap();
    let encoder = Arc::new(CountingEncoder::default());
    let cache = QrCache::new(
        Arc::new(FsBlobStore::new(dir.path())),
        encoder.clone(),
        Arc::new(LogReporter),
    );
    FsHarness {
        dir,
        encoder,
        cache,
    }
}

fn cache_with(encoder: Arc<dyn QrEncoder>, errors: Arc<RecentErrors>) -> (TempDir, QrCache) {
    let dir = tempfile::tempdir().unwrap();
    let cache = QrCache::new(Arc::new(FsBlobStore::new(dir.path())), encoder, errors);
    (dir, cache)
}

// =============================================================================
// get_or_generate
// =============================================================================

#[tokio::test]
async fn test_second_call_is_a_cache_hit_with_identical_bytes() {
    let h = fs_harness();

    let first = h.cache.get_or_generate("summer", BASE_URL, 300).await.unwrap();
    let second = h.cache.get_or_generate("summer", BASE_URL, 300).await.unwrap();

    assert!(!first.cache_hit);
    assert!(second.cache_hit);
    assert_eq!(first.bytes, second.bytes);
    assert_eq!(first.key, second.key);
    assert_eq!(h.encoder.calls(), 1);
}

#[tokio::test]
async fn test_entry_is_written_under_hashed_key() {
    let h = fs_harness();

    let asset = h.cache.get_or_generate("summer", BASE_URL, 300).await.unwrap();

    assert_eq!(asset.key, cache_key("summer", 300));
    let path = h.dir.path().join(&asset.key);
    assert_eq!(asset.location, path.display().to_string());
    assert_eq!(std::fs::read(path).unwrap(), asset.bytes.to_vec());
}

#[tokio::test]
async fn test_encoded_url_carries_referral_code() {
    let h = fs_harness();

    h.cache.get_or_generate("summer_24", BASE_URL, 300).await.unwrap();
    h.cache
        .get_or_generate("spring", "https://example.com/app?utm=qr", 300)
        .await
        .unwrap();

    assert_eq!(
        h.encoder.texts(),
        vec![
            "https://example.com/download/?r=summer_24".to_string(),
            "https://example.com/app?utm=qr&r=spring".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_different_sizes_are_cached_separately() {
    let h = fs_harness();

    let small = h.cache.get_or_generate("summer", BASE_URL, 100).await.unwrap();
    let large = h.cache.get_or_generate("summer", BASE_URL, 500).await.unwrap();

    assert_ne!(small.key, large.key);
    assert_ne!(small.bytes, large.bytes);
    assert_eq!(h.encoder.calls(), 2);
}

/// Known limitation: the base URL is not part of the cache key, so changing it
/// keeps serving the image rendered for the previous URL.
#[tokio::test]
async fn test_changed_base_url_serves_previously_cached_image() {
    let h = fs_harness();

    let original = h
        .cache
        .get_or_generate("summer", "https://old.example.com/download", 300)
        .await
        .unwrap();
    let after_change = h
        .cache
        .get_or_generate("summer", "https://new.example.com/get-app", 300)
        .await
        .unwrap();

    assert!(after_change.cache_hit);
    assert_eq!(after_change.bytes, original.bytes);
    assert_eq!(h.encoder.calls(), 1);
    assert_eq!(
        h.encoder.texts(),
        vec!["https://old.example.com/download/?r=summer".to_string()]
    );
}

#[tokio::test]
async fn test_corrupt_entry_is_deleted_and_regenerated() {
    let errors = Arc::new(RecentErrors::default());
    let encoder = Arc::new(CountingEncoder::default());
    let (dir, cache) = cache_with(encoder.clone(), errors.clone());

    let path = dir.path().join(cache_key("summer", 300));
    std::fs::write(&path, [0u8; 10]).unwrap();

    let asset = cache.get_or_generate("summer", BASE_URL, 300).await.unwrap();

    assert!(!asset.cache_hit);
    assert_eq!(encoder.calls(), 1);
    assert!(asset.bytes.len() > 100);
    assert_eq!(std::fs::read(&path).unwrap(), asset.bytes.to_vec());

    // Recovered locally, only a warning
    let reported = errors.recent();
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].level, "warn");
    assert!(reported[0].message.contains("corrupt"));
}

#[tokio::test]
async fn test_missing_encoder_is_a_failure_not_an_empty_image() {
    let errors = Arc::new(RecentErrors::default());
    let (dir, cache) = cache_with(Arc::new(UnavailableEncoder), errors.clone());

    let result = cache.get_or_generate("summer", BASE_URL, 300).await;

    assert!(matches!(result, Err(CacheError::EncoderUnavailable(_))));
    assert!(!dir.path().join(cache_key("summer", 300)).exists());
    assert_eq!(errors.recent()[0].level, "error");
}

#[tokio::test]
async fn test_undersized_render_is_reported_as_invalid_output() {
    let (_dir, cache) = cache_with(Arc::new(TinyEncoder), Arc::new(RecentErrors::default()));

    let result = cache.get_or_generate("summer", BASE_URL, 300).await;

    assert!(matches!(result, Err(CacheError::InvalidOutput { size: 10 })));
}

// =============================================================================
// invalidate / clear_all
// =============================================================================

#[tokio::test]
async fn test_invalidate_removes_one_entry_and_is_idempotent() {
    let h = fs_harness();
    h.cache.get_or_generate("summer", BASE_URL, 300).await.unwrap();
    h.cache.get_or_generate("winter", BASE_URL, 300).await.unwrap();

    assert!(h.cache.invalidate("summer", 300).await);
    assert!(h.cache.invalidate("summer", 300).await);

    assert_eq!(h.cache.stats().await.unwrap().count, 1);

    let again = h.cache.get_or_generate("summer", BASE_URL, 300).await.unwrap();
    assert!(!again.cache_hit);
    assert_eq!(h.encoder.calls(), 3);
}

#[tokio::test]
async fn test_clear_all_empties_the_cache() {
    let h = fs_harness();
    for code in ["a", "b", "c"] {
        h.cache.get_or_generate(code, BASE_URL, 200).await.unwrap();
    }
    // Files the cache does not own are left alone
    std::fs::write(h.dir.path().join("index.html"), b"<html></html>").unwrap();

    assert_eq!(h.cache.clear_all().await, 3);
    assert_eq!(h.cache.stats().await.unwrap().count, 0);
    assert!(h.dir.path().join("index.html").exists());

    assert_eq!(h.cache.clear_all().await, 0);
}

// =============================================================================
// prune / stats
// =============================================================================

#[tokio::test]
async fn test_prune_removes_only_entries_older_than_threshold() {
    let clock = Arc::new(ManualClock::default());
    let store = Arc::new(MemoryBlobStore::with_clock(clock.clone()));
    let cache = QrCache::new(
        store.clone(),
        Arc::new(CountingEncoder::default()),
        Arc::new(LogReporter),
    )
    .with_clock(clock.clone());

    cache.get_or_generate("old", BASE_URL, 300).await.unwrap();
    clock.advance(Duration::days(35));
    cache.get_or_generate("new", BASE_URL, 300).await.unwrap();
    clock.advance(Duration::days(1));

    assert_eq!(cache.prune(30).await, 1);

    let remaining = store.list(ENTRY_PATTERN).await.unwrap();
    assert_eq!(remaining, vec![cache_key("new", 300)]);
}

#[tokio::test]
async fn test_prune_keeps_everything_younger_than_threshold() {
    let h = fs_harness();
    h.cache.get_or_generate("summer", BASE_URL, 300).await.unwrap();

    assert_eq!(h.cache.prune(90).await, 0);
    assert_eq!(h.cache.prune(1).await, 0);
    assert_eq!(h.cache.stats().await.unwrap().count, 1);
}

#[tokio::test]
async fn test_prune_with_huge_age_keeps_everything() {
    let clock = Arc::new(ManualClock::default());
    let store = Arc::new(MemoryBlobStore::with_clock(clock.clone()));
    let cache = QrCache::new(
        store.clone(),
        Arc::new(CountingEncoder::default()),
        Arc::new(LogReporter),
    )
    .with_clock(clock.clone());

    cache.get_or_generate("summer", BASE_URL, 300).await.unwrap();
    clock.advance(Duration::days(400));

    assert_eq!(cache.prune(u32::MAX).await, 0);
    assert_eq!(cache.prune(1_000_000).await, 0);
    assert_eq!(store.list(ENTRY_PATTERN).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_stats_reports_count_size_and_location() {
    let h = fs_harness();

    let empty = h.cache.stats().await.unwrap();
    assert_eq!(empty.count, 0);
    assert_eq!(empty.total_size_bytes, 0);
    assert_eq!(empty.size_formatted, "0 B");
    assert_eq!(empty.storage_location, h.dir.path().display().to_string());

    let a = h.cache.get_or_generate("a", BASE_URL, 300).await.unwrap();
    let b = h.cache.get_or_generate("b", BASE_URL, 400).await.unwrap();

    let stats = h.cache.stats().await.unwrap();
    assert_eq!(stats.count, 2);
    assert_eq!(stats.total_size_bytes, (a.bytes.len() + b.bytes.len()) as u64);
}
