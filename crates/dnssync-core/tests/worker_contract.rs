//! Architectural Contract Test: On-Demand Triggers
//!
//! This test verifies that manual triggers are queued to the worker and
//! answered there.
//!
//! Constraints verified:
//! - Submitting a request never runs adapter I/O on the caller
//! - Each request gets exactly one reply
//! - The worker stops once every handle is dropped
//! - Submitting to a stopped worker is an error, not a hang
//!
//! If this test fails, "sync now" can block callers or be silently lost.

mod common;

use common::*;
use dnssync_core::{HubRefresh, SyncWorker};
use std::time::Duration;
use tokio::time::timeout;

fn fleet() -> Harness {
    let h = Harness::new(vec![hub("hub"), spoke("spoke-a"), spoke("spoke-b")]);
    h.server("hub")
        .set_records(records(&["1.2.3.4 nas.home"], &["www.home -> nas.home"]));
    h
}

#[tokio::test]
async fn submit_does_not_run_sync_inline() {
    let h = fleet();
    let (worker, handle) = SyncWorker::new(h.orchestrator.clone(), 8);

    // The worker is not running yet, so nothing can have happened.
    let reply = handle.run_cycle().await.expect("request queued");
    assert_eq!(h.server("hub").get_calls(), 0);

    let task = tokio::spawn(worker.run());
    let report = timeout(Duration::from_secs(1), reply)
        .await
        .expect("reply arrives")
        .expect("worker replied");

    assert!(report.hub.is_fresh());
    assert_eq!(report.spokes.len(), 2);

    drop(handle);
    timeout(Duration::from_secs(1), task)
        .await
        .expect("worker stops after handles drop")
        .unwrap();
}

#[tokio::test]
async fn every_request_kind_is_answered() {
    let h = fleet();
    let (worker, handle) = SyncWorker::new(h.orchestrator.clone(), 8);
    let task = tokio::spawn(worker.run());

    let refresh = handle.refresh_hub().await.unwrap().await.unwrap();
    assert!(matches!(refresh, HubRefresh::Fresh(ref r) if r.len() == 2));

    let all = handle.sync_all().await.unwrap().await.unwrap();
    assert!(all.values().all(|r| r.is_success()));

    h.server("spoke-a")
        .set_records(records(&["9.9.9.9 drift.home"], &[]));
    let one = handle
        .sync_spoke("spoke-a")
        .await
        .unwrap()
        .await
        .unwrap()
        .expect("spoke exists")
        .expect("spoke enabled");
    assert_eq!((one.stats.added, one.stats.removed), (2, 1));

    let cleared = handle
        .clear_spoke("spoke-b")
        .await
        .unwrap()
        .await
        .unwrap()
        .expect("clear succeeds");
    assert_eq!(cleared.removed, 2);
    assert!(h.server("spoke-b").records().is_empty());

    let missing = handle.sync_spoke("nope").await.unwrap().await.unwrap();
    assert!(missing.is_err());

    drop(handle);
    task.await.unwrap();
}

#[tokio::test]
async fn stopped_worker_rejects_requests() {
    let h = fleet();
    let (worker, handle) = SyncWorker::new(h.orchestrator.clone(), 1);
    drop(worker);

    let result = handle.run_cycle().await;
    assert!(result.is_err());
}

#[tokio::test]
async fn cloned_handles_share_one_queue() {
    let h = fleet();
    let (worker, handle) = SyncWorker::new(h.orchestrator.clone(), 8);
    let task = tokio::spawn(worker.run());

    let other = handle.clone();
    let (a, b) = tokio::join!(handle.run_cycle(), other.run_cycle());
    a.unwrap().await.unwrap();
    b.unwrap().await.unwrap();

    assert_eq!(h.server("hub").get_calls(), 2);
    assert_eq!(h.server("spoke-a").max_concurrent_sessions(), 1);

    drop(handle);
    drop(other);
    task.await.unwrap();
}
