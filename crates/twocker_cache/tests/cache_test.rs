//! Tests for the TTL cache.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use twocker_cache::{TtlCache, TtlCacheConfig};

fn live_cache(ttl_secs: u64) -> TtlCache<String, bool> {
    TtlCache::new("live_status", &TtlCacheConfig::default().with_ttl_secs(ttl_secs))
}

#[tokio::test(start_paused = true)]
async fn test_entry_expires_after_ttl() {
    let cache = live_cache(300);
    let counter = AtomicUsize::new(0);
    let calls = &counter;
    let fetch = move || async move {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok::<_, String>(true)
    };

    // t=0: miss, fetched
    assert_eq!(cache.get_or_fetch("somechannel".into(), fetch).await, Ok(true));

    // t=100: hit
    tokio::time::advance(Duration::from_secs(100)).await;
    assert_eq!(cache.get_or_fetch("somechannel".into(), fetch).await, Ok(true));

    // t=400: expired, fetched again
    tokio::time::advance(Duration::from_secs(300)).await;
    assert_eq!(cache.get_or_fetch("somechannel".into(), fetch).await, Ok(true));

    assert_eq!(counter.load(Ordering::SeqCst), 2);
    let stats = cache.stats();
    assert_eq!(*stats.hits(), 1);
    assert_eq!(*stats.misses(), 2);
    assert_eq!(*stats.entries(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failures_are_not_cached() {
    let cache = live_cache(300);
    let counter = AtomicUsize::new(0);
    let calls = &counter;

    let first = cache
        .get_or_fetch("somechannel".into(), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<bool, _>("upstream timeout".to_string())
        })
        .await;
    assert!(first.is_err());
    assert!(cache.is_empty());

    let second = cache
        .get_or_fetch("somechannel".into(), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(false)
        })
        .await;
    assert_eq!(second, Ok(false));
    assert_eq!(counter.load(Ordering::SeqCst), 2);
    assert_eq!(*cache.stats().misses(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_lookups_fetch_once() {
    let cache = Arc::new(live_cache(300));
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = Arc::clone(&cache);
        let calls = Arc::clone(&calls);
        handles.push(tokio::spawn(async move {
            cache
                .get_or_fetch("busychannel".to_string(), || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    Ok::<_, String>(true)
                })
                .await
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.expect("task panicked"), Ok(true));
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let stats = cache.stats();
    assert_eq!(*stats.misses(), 1);
    assert_eq!(*stats.hits(), 7);
}

#[tokio::test(start_paused = true)]
async fn test_keys_are_independent() {
    let cache = live_cache(300);
    cache.insert("alpha".into(), true);
    cache.insert("beta".into(), false);

    assert_eq!(cache.get(&"alpha".to_string()), Some(true));
    assert_eq!(cache.get(&"beta".to_string()), Some(false));
    assert_eq!(cache.get(&"gamma".to_string()), None);

    assert!(cache.invalidate(&"alpha".to_string()));
    assert_eq!(cache.get(&"alpha".to_string()), None);
}

#[tokio::test(start_paused = true)]
async fn test_sweep_removes_only_expired() {
    let cache = live_cache(60);
    cache.insert("old".into(), true);
    tokio::time::advance(Duration::from_secs(45)).await;
    cache.insert("fresh".into(), true);
    tokio::time::advance(Duration::from_secs(30)).await;

    assert_eq!(cache.sweep(), 1);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get(&"fresh".to_string()), Some(true));
}

#[tokio::test]
async fn test_idle_cache_stats() {
    let cache = live_cache(300);
    let stats = cache.stats();
    assert_eq!(*stats.hits(), 0);
    assert_eq!(*stats.misses(), 0);
    assert_eq!(*stats.hit_rate(), 0.0);
}

#[test]
fn test_config_deserializes_with_defaults() {
    let config: TtlCacheConfig = serde_json::from_str(r#"{"ttl_secs": 60}"#).expect("valid json");
    assert_eq!(*config.ttl_secs(), 60);
    assert_eq!(*config.max_size(), 1000);
}
