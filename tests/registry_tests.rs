
use std::sync::Arc;

use fleet_lite::config::RegistryConfig;
use fleet_lite::job::{Job, JobPayload};
use fleet_lite::store::{CoordinationStore, StoreError};
use fleet_lite::{Lookup, Registry, RegistryError};
use test_harness::{sample_job, sample_payload, test_registry, RacingWriterStore};

#[tokio::test]
async fn test_create_then_get_job() {
    let (_store, registry) = test_registry();
    let job = sample_job("web.service");

    registry.create_job(&job).await.unwrap();

    match registry.get_job("web.service").await {
        Lookup::Found(found) => assert_eq!(found, job),
        other => panic!("expected job, got {other:?}"),
    }
}

#[tokio::test]
async fn test_create_unscheduled_job_twice_fails() {
    let (_store, registry) = test_registry();
    registry.create_job(&sample_job("web")).await.unwrap();

    let redefined = Job::new("web", JobPayload::new("web-v2", "[Service]"));
    let err = registry.create_job(&redefined).await.unwrap_err();
    assert!(matches!(err, RegistryError::JobExists(name) if name == "web"));

    // First definition is untouched.
    let job = registry.get_job("web").await.into_option().unwrap();
    assert_eq!(job.payload.name, "web");
}

#[tokio::test]
async fn test_create_scheduled_job_redefines_in_place() {
    let (_store, registry) = test_registry();
    registry.create_job(&sample_job("web")).await.unwrap();
    registry.schedule_job("web", "boot-1").await.unwrap();

    let redefined = Job::new("web", JobPayload::new("web-v2", "[Service]\nExecStart=/v2"));
    registry.create_job(&redefined).await.unwrap();

    assert_eq!(registry.get_job("web").await.into_option(), Some(redefined));
    assert_eq!(
        registry.get_job_target("web").await.into_option().as_deref(),
        Some("boot-1")
    );
}

#[tokio::test]
async fn test_concurrent_redefinition_is_not_lost() {
    let (inner, registry) = test_registry();
    registry.create_job(&sample_job("web")).await.unwrap();
    registry.schedule_job("web", "boot-1").await.unwrap();

    let competing = serde_json::to_string(&Job::new("web", JobPayload::new("other", ""))).unwrap();
    let racing = Registry::new(
        Arc::new(RacingWriterStore {
            inner: inner.clone(),
            competing_value: competing,
        }),
        RegistryConfig::default(),
    );

    let err = racing
        .create_job(&Job::new("web", JobPayload::new("v2", "")))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Store(StoreError::CompareFailed { .. })));

    // The competing writer's definition survives; ours was rejected, not applied.
    let job = registry.get_job("web").await.into_option().unwrap();
    assert_eq!(job.payload.name, "other");
}

#[tokio::test]
async fn test_racing_unscheduled_creates_one_wins() {
    let (_store, registry) = test_registry();
    let first = Job::new("web", JobPayload::new("first", ""));
    let second = Job::new("web", JobPayload::new("second", ""));

    let (a, b) = tokio::join!(registry.create_job(&first), registry.create_job(&second));

    let results = [a, b];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(RegistryError::JobExists(name)) if name == "web"))
            .count(),
        1
    );

    let stored = registry.get_job("web").await.into_option().unwrap();
    let winner = if results[0].is_ok() { &first } else { &second };
    assert_eq!(&stored, winner);
}

#[tokio::test]
async fn test_schedule_is_exclusive() {
    let (_store, registry) = test_registry();
    registry.create_job(&sample_job("web")).await.unwrap();

    registry.schedule_job("web", "m1").await.unwrap();
    let err = registry.schedule_job("web", "m2").await.unwrap_err();
    assert!(matches!(err, RegistryError::Store(StoreError::NodeExists(_))));

    assert_eq!(registry.get_job_target("web").await.into_option().as_deref(), Some("m1"));
}

#[tokio::test]
async fn test_unschedule_then_reschedule() {
    let (_store, registry) = test_registry();
    registry.create_job(&sample_job("web")).await.unwrap();
    registry.schedule_job("web", "m1").await.unwrap();

    registry.unschedule_job("web").await.unwrap();
    assert!(!registry.job_scheduled("web").await.unwrap());
    // Definition survives unscheduling.
    assert!(registry.get_job("web").await.is_found());

    registry.schedule_job("web", "m2").await.unwrap();
    assert_eq!(registry.get_job_target("web").await.into_option().as_deref(), Some("m2"));
}

#[tokio::test]
async fn test_unschedule_missing_is_ok() {
    let (_store, registry) = test_registry();
    registry.unschedule_job("ghost").await.unwrap();
}

#[tokio::test]
async fn test_stop_removes_object_and_target() {
    let (_store, registry) = test_registry();
    registry.create_job(&sample_job("web")).await.unwrap();
    registry.schedule_job("web", "m1").await.unwrap();

    registry.stop_job("web").await.unwrap();

    assert!(registry.get_job("web").await.is_not_found());
    assert!(registry.get_job_target("web").await.is_not_found());
    assert!(!registry.job_scheduled("web").await.unwrap());

    // Stopping again tolerates absence.
    registry.stop_job("web").await.unwrap();
    // And the name is free to create again.
    registry.create_job(&sample_job("web")).await.unwrap();
}

#[tokio::test]
async fn test_get_all_jobs_skips_corrupt_entries() {
    let (store, registry) = test_registry();
    registry.create_job(&sample_job("a")).await.unwrap();
    registry.create_job(&sample_job("b")).await.unwrap();
    store
        .create("/fleet/job/broken/object", "not json", None)
        .await
        .unwrap();
    store
        .create("/fleet/job/nopayload/object", r#"{"name":"nopayload"}"#, None)
        .await
        .unwrap();
    // Target without a definition.
    registry.schedule_job("orphan", "m1").await.unwrap();

    let mut names: Vec<String> = registry
        .get_all_jobs()
        .await
        .unwrap()
        .into_iter()
        .map(|j| j.name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["a", "b"]);

    assert!(registry.get_job("broken").await.is_not_found());
    assert!(registry.get_job("nopayload").await.is_not_found());
}

#[tokio::test]
async fn test_get_all_jobs_empty_registry() {
    let (_store, registry) = test_registry();
    assert!(registry.get_all_jobs().await.unwrap().is_empty());
    assert!(registry.get_all_payloads().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_get_all_jobs_by_machine() {
    let (_store, registry) = test_registry();
    for name in ["a", "b", "c", "d"] {
        registry.create_job(&sample_job(name)).await.unwrap();
    }
    registry.schedule_job("a", "m1").await.unwrap();
    registry.schedule_job("b", "m2").await.unwrap();
    registry.schedule_job("c", "m1").await.unwrap();

    let mut on_m1: Vec<String> = registry
        .get_all_jobs_by_machine("m1")
        .await
        .unwrap()
        .into_iter()
        .map(|j| j.name)
        .collect();
    on_m1.sort();
    assert_eq!(on_m1, vec!["a", "c"]);

    assert!(registry.get_all_jobs_by_machine("m3").await.unwrap().is_empty());
    // Unscheduled jobs never match, not even an empty boot ID.
    assert!(registry.get_all_jobs_by_machine("").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_payload_lifecycle() {
    let (_store, registry) = test_registry();
    let payload = sample_payload("web");

    registry.create_payload(&payload).await.unwrap();
    let err = registry.create_payload(&payload).await.unwrap_err();
    assert!(matches!(err, RegistryError::Store(StoreError::NodeExists(_))));

    assert_eq!(registry.get_payload("web").await.into_option(), Some(payload.clone()));
    assert_eq!(registry.get_all_payloads().await.unwrap(), vec![payload]);

    registry.destroy_payload("web").await.unwrap();
    assert!(registry.get_payload("web").await.is_not_found());
    // Destroying a missing payload is not an error.
    registry.destroy_payload("web").await.unwrap();
}

#[tokio::test]
async fn test_payload_independent_of_jobs() {
    let (_store, registry) = test_registry();
    registry.create_payload(&sample_payload("web")).await.unwrap();
    registry.create_job(&sample_job("web")).await.unwrap();

    registry.stop_job("web").await.unwrap();
    assert!(registry.get_payload("web").await.is_found());
}

#[tokio::test]
async fn test_transient_errors_are_not_absence() {
    let (store, registry) = test_registry();
    registry.create_job(&sample_job("web")).await.unwrap();
    registry.schedule_job("web", "m1").await.unwrap();

    store.set_available(false);

    assert!(matches!(registry.get_job("web").await, Lookup::Unavailable(_)));
    assert!(matches!(registry.get_job_target("web").await, Lookup::Unavailable(_)));
    assert!(matches!(registry.get_payload("web").await, Lookup::Unavailable(_)));
    assert!(registry.job_scheduled("web").await.unwrap_err().is_transient());
    assert!(registry.get_all_jobs().await.unwrap_err().is_transient());
    assert!(registry.get_all_payloads().await.unwrap_err().is_transient());
    assert!(registry.create_job(&sample_job("db")).await.unwrap_err().is_transient());
    assert!(registry.stop_job("web").await.unwrap_err().is_transient());

    store.set_available(true);
    assert!(registry.get_job("web").await.is_found());
}

#[tokio::test]
async fn test_invalid_names_rejected() {
    let (_store, registry) = test_registry();
    let err = registry.create_job(&sample_job("a/b")).await.unwrap_err();
    assert!(matches!(err, RegistryError::InvalidName { kind: "job", .. }));

    let err = registry.schedule_job("", "m1").await.unwrap_err();
    assert!(matches!(err, RegistryError::InvalidName { .. }));

    let err = registry.create_payload(&sample_payload("..")).await.unwrap_err();
    assert!(matches!(err, RegistryError::InvalidName { kind: "payload", .. }));
}

#[tokio::test]
async fn test_custom_prefix_layout() {
    let (store, registry) =
        test_harness::test_registry_with(RegistryConfig::new("/coreos.com/fleet"));
    registry.create_job(&sample_job("web")).await.unwrap();
    registry.schedule_job("web", "m1").await.unwrap();

    let target = store
        .get("/coreos.com/fleet/job/web/target", false)
        .await
        .unwrap();
    assert_eq!(target.value.as_deref(), Some("m1"));
}
