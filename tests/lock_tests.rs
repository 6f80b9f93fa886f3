
use std::sync::Arc;
use std::time::Duration;

use fleet_lite::config::RegistryConfig;
use fleet_lite::store::{CoordinationStore, MemoryStore};
use fleet_lite::Registry;
use test_harness::{test_registry, test_registry_with};

#[tokio::test]
async fn test_lock_blocks_second_caller_until_release() {
    let (_store, registry) = test_registry();

    let a = registry.lock_job("foo", "caller-a").await.unwrap().expect("A acquires");
    assert!(registry.lock_job("foo", "caller-b").await.unwrap().is_none());

    a.release().await.unwrap();
    let b = registry.lock_job("foo", "caller-b").await.unwrap();
    assert!(b.is_some());
}

#[tokio::test]
async fn test_lock_expires_without_renewal() {
    let (_store, registry) = test_registry_with(RegistryConfig::default().with_lock_ttl_ms(50));

    let a = registry.lock_job("foo", "crashed").await.unwrap().unwrap();
    assert!(registry.lock_job("foo", "b").await.unwrap().is_none());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!a.is_held().await.unwrap());

    let b = registry.lock_job("foo", "b").await.unwrap().unwrap();
    assert!(b.is_held().await.unwrap());
    // The stale holder cannot renew over its successor.
    let mut a = a;
    assert!(a.renew().await.is_err());
    assert!(b.is_held().await.unwrap());
}

#[tokio::test]
async fn test_registries_in_separate_processes_share_lock() {
    // Two registry instances over one store stand in for two processes.
    let store: Arc<dyn CoordinationStore> = Arc::new(MemoryStore::new());
    let first = Registry::new(store.clone(), RegistryConfig::default());
    let second = Registry::new(store, RegistryConfig::default());

    let held = first.lock_job("foo", "first").await.unwrap().unwrap();
    assert!(second.lock_job("foo", "second").await.unwrap().is_none());

    let record = second.lock_holder("job", "foo").await.unwrap().unwrap();
    assert_eq!(record.holder, held.holder());
    assert_eq!(record.context, "first");
}

#[tokio::test]
async fn test_contended_acquire_returns_immediately() {
    let (_store, registry) = test_registry_with(RegistryConfig::default().with_lock_ttl_ms(60_000));
    let _held = registry.lock_job("foo", "a").await.unwrap().unwrap();

    // One attempt, no waiting on the holder's lease.
    let started = std::time::Instant::now();
    assert!(registry.lock_job("foo", "b").await.unwrap().is_none());
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[tokio::test]
async fn test_lock_surfaces_store_failure() {
    let (store, registry) = test_registry();
    store.set_available(false);
    let err = registry.lock_job("foo", "a").await.unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_lock_keys_do_not_collide_across_classes() {
    let (_store, registry) = test_registry();
    let job = registry.lock_resource("job", "foo", "a").await.unwrap();
    let machine = registry.lock_resource("machine", "foo", "a").await.unwrap();
    assert!(job.is_some());
    assert!(machine.is_some());
}
