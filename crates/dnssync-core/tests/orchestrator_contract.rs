//! Architectural Contract Test: Hub-and-Spoke Orchestration
//!
//! This test verifies how one sync cycle behaves when servers fail.
//!
//! Constraints verified:
//! - No authoritative records means no spoke mutation, only an error row
//! - An unreachable hub degrades to the cached snapshot
//! - One failing spoke never prevents the others from syncing, in a cycle or a batch
//! - Servers removed from the inventory leave no per-server lock or session behind
//! - Disabled spokes are never contacted and leave no history
//! - Spoke state is the hub snapshot that was applied
//! - Store failures never undo a reconciliation
//! - Two operations on the same spoke never interleave
//!
//! If this test fails, a broken server can poison or stall the whole fleet.

mod common;

use common::*;
use dnssync_core::traits::{SyncStatus, SyncStore};
use dnssync_core::{EngineConfig, Error, HubRefresh, Session, SyncEvent, SyncMode};
use std::time::Duration;

fn fleet() -> Harness {
    Harness::new(vec![hub("hub"), spoke("spoke-a"), spoke("spoke-b")])
}

#[tokio::test]
async fn unavailable_cache_skips_spokes_without_mutation() {
    let h = fleet();
    h.server("hub").fail_connect(true);
    h.server("spoke-a")
        .set_records(records(&["9.9.9.9 stale.home"], &[]));

    let report = h.orchestrator.run_cycle().await;

    assert!(matches!(report.hub, HubRefresh::Unavailable { .. }));
    let spoke_a = &report.spokes["spoke-a"];
    assert!(!spoke_a.is_success());
    assert!(
        spoke_a
            .error
            .as_deref()
            .unwrap()
            .contains("Authoritative cache unavailable")
    );

    let server = h.server("spoke-a");
    assert_eq!(server.connect_calls(), 0, "spoke must not be contacted");
    assert_eq!(server.mutation_calls(), 0);

    let row = h
        .store
        .last_sync("spoke-a")
        .await
        .unwrap()
        .expect("error row recorded");
    assert_eq!(row.status, SyncStatus::Error);
    assert_eq!(row.role, SyncMode::Spoke);

    let hub_row = h.store.last_sync("hub").await.unwrap().unwrap();
    assert_eq!(hub_row.status, SyncStatus::Error);
    assert!(hub_row.error.unwrap().contains("no cached records available"));
    assert_eq!(h.notifier.hub_unreachable_count(), 1);
}

#[tokio::test]
async fn unreachable_hub_falls_back_to_cached_snapshot() {
    let h = fleet();
    let hub_records = records(&["1.2.3.4 nas.home"], &["www.home -> nas.home"]);
    h.server("hub").set_records(hub_records.clone());

    let first = h.orchestrator.run_cycle().await;
    assert!(first.hub.is_fresh());

    // Hub goes away and a spoke drifts.
    h.server("hub").fail_connect(true);
    h.server("spoke-a")
        .set_records(records(&["9.9.9.9 drift.home"], &[]));

    let second = h.orchestrator.run_cycle().await;

    match &second.hub {
        HubRefresh::Stale { records, .. } => assert_eq!(records, &hub_records),
        other => panic!("expected stale fallback, got {:?}", other),
    }
    assert!(second.spokes["spoke-a"].is_success());
    assert_eq!(h.server("spoke-a").records(), hub_records);

    let hub_row = h.store.last_sync("hub").await.unwrap().unwrap();
    assert_eq!(hub_row.status, SyncStatus::Error);
    assert_eq!(hub_row.role, SyncMode::Hub);
    assert!(hub_row.error.unwrap().contains("serving cached records from"));
    assert_eq!(hub_row.a_records, 1);
    assert_eq!(hub_row.cname_records, 1);
    assert_eq!(h.notifier.hub_unreachable_count(), 1);
}

#[tokio::test]
async fn one_failing_spoke_does_not_block_others() {
    let h = fleet();
    let hub_records = records(&["1.2.3.4 nas.home", "5.6.7.8 pi.home"], &[]);
    h.server("hub").set_records(hub_records.clone());
    h.server("spoke-a").fail_connect(true);

    let report = h.orchestrator.run_cycle().await;

    assert!(!report.spokes["spoke-a"].is_success());
    assert!(report.spokes["spoke-b"].is_success());
    assert_eq!(report.spokes["spoke-b"].stats.added, 2);
    assert_eq!(h.server("spoke-b").records(), hub_records);
    assert_eq!(h.notifier.sync_failed_count(), 1);

    let failed = h.store.last_sync("spoke-a").await.unwrap().unwrap();
    assert_eq!(failed.status, SyncStatus::Error);
    assert_eq!(failed.added, 0, "counters are zero on error");
}

#[tokio::test]
async fn batch_sync_isolates_a_spoke_whose_fetch_fails() {
    let h = fleet();
    let hub_records = records(&["1.2.3.4 nas.home"], &["www.home -> nas.home"]);
    h.store.save_hub_records("hub", &hub_records).await.unwrap();
    h.server("spoke-b").fail_get(true);

    let results = h.orchestrator.sync_all_enabled_spokes().await;

    assert_eq!(results.len(), 2);
    let good = &results["spoke-a"];
    assert!(good.is_success());
    assert_eq!((good.stats.added, good.stats.removed), (2, 0));
    assert_eq!(h.server("spoke-a").records(), hub_records);

    let bad = &results["spoke-b"];
    assert!(!bad.is_success());
    assert_eq!(bad.stats.added, 0);
    assert_eq!(h.server("spoke-b").mutation_calls(), 0);

    let row = h.store.last_sync("spoke-b").await.unwrap().unwrap();
    assert_eq!(row.status, SyncStatus::Error);
    assert!(row.error.is_some());
    assert_eq!(h.notifier.sync_failed_count(), 1);
    assert_eq!(h.server("hub").get_calls(), 0, "batch sync reads the cache only");
}

#[tokio::test]
async fn removed_servers_release_their_locks_and_sessions() {
    let h = fleet();
    h.store
        .save_hub_records("hub", &records(&["1.2.3.4 nas.home"], &[]))
        .await
        .unwrap();
    h.sessions
        .lock("http://hub.test")
        .await
        .store(Session::new("hub-sid", None));
    h.sessions
        .lock("http://spoke-b.test")
        .await
        .store(Session::new("b-sid", None));

    h.orchestrator.sync_all_enabled_spokes().await;
    assert_eq!(h.orchestrator.spoke_lock_count(), 2);
    assert_eq!(h.sessions.len(), 2);

    h.inventory
        .replace(vec![hub("hub"), spoke("spoke-a")])
        .await
        .unwrap();
    let results = h.orchestrator.sync_all_enabled_spokes().await;

    assert_eq!(results.keys().collect::<Vec<_>>(), vec!["spoke-a"]);
    assert_eq!(h.orchestrator.spoke_lock_count(), 1);
    assert_eq!(h.sessions.len(), 1);
    assert_eq!(h.sessions.get("http://hub.test").await.unwrap().token, "hub-sid");
}

#[tokio::test]
async fn disabled_spoke_is_never_contacted() {
    let mut h = Harness::new(vec![
        hub("hub"),
        spoke("spoke-a"),
        spoke("spoke-off").with_enabled(false),
    ]);
    h.server("hub")
        .set_records(records(&["1.2.3.4 nas.home"], &[]));

    let report = h.orchestrator.run_cycle().await;
    assert!(!report.spokes.contains_key("spoke-off"));

    let hub_gets = h.server("hub").get_calls();
    let direct = h
        .orchestrator
        .perform_sync("spoke-off")
        .await
        .expect("disabled spoke is not an error");
    assert!(direct.is_none());
    assert_eq!(h.server("hub").get_calls(), hub_gets, "no hub refresh");

    assert_eq!(h.server("spoke-off").connect_calls(), 0);
    assert!(h.store.last_sync("spoke-off").await.unwrap().is_none());

    let events = h.drain_events();
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, SyncEvent::SpokeSynced { spoke, .. } if spoke == "spoke-off"))
    );
}

#[tokio::test]
async fn perform_sync_refreshes_hub_first() {
    let h = fleet();
    h.server("hub")
        .set_records(records(&["1.2.3.4 nas.home"], &[]));
    h.orchestrator.run_cycle().await;

    let updated = records(&["1.2.3.4 nas.home", "5.6.7.8 pi.home"], &[]);
    h.server("hub").set_records(updated.clone());

    // From the cache: nothing new.
    let cached = h.orchestrator.sync_spoke("spoke-a").await.unwrap().unwrap();
    assert_eq!(cached.stats.added, 0);

    let fresh = h
        .orchestrator
        .perform_sync("spoke-a")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fresh.stats.added, 1);
    assert_eq!(h.server("spoke-a").records(), updated);
    assert_eq!(
        h.store.get_cached_hub_records("hub").await.unwrap(),
        Some(updated)
    );
}

#[tokio::test]
async fn spoke_state_is_the_applied_hub_snapshot() {
    let h = fleet();
    let hub_records = records(&["10.0.0.1 a.home", "10.0.0.2 b.home"], &[]);
    h.server("hub").set_records(hub_records.clone());
    h.server("spoke-a").reject("10.0.0.2 b.home");

    let report = h.orchestrator.run_cycle().await;
    assert_eq!(report.spokes["spoke-a"].stats.conflicts, 1);

    let state = h.store.get_spoke_records("spoke-a").await.unwrap();
    assert_eq!(state, Some(hub_records));
}

#[tokio::test]
async fn store_failure_does_not_undo_reconciliation() {
    let h = fleet();
    let hub_records = records(&["1.2.3.4 nas.home"], &[]);
    h.server("hub").set_records(hub_records.clone());
    h.store.fail_writes(true);

    let report = h.orchestrator.run_cycle().await;

    assert!(report.hub.is_fresh());
    assert!(report.spokes["spoke-a"].is_success());
    assert_eq!(h.server("spoke-a").records(), hub_records);
    assert!(h.store.history(10, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn clear_spoke_removes_everything() {
    let mut h = fleet();
    h.server("spoke-a").set_records(records(
        &["1.2.3.4 nas.home", "5.6.7.8 pi.home"],
        &["www.home -> nas.home"],
    ));

    let stats = h
        .orchestrator
        .clear_spoke("spoke-a")
        .await
        .expect("clear succeeds");

    assert_eq!(stats.removed, 3);
    assert!(h.server("spoke-a").records().is_empty());
    assert_eq!(
        h.store.get_spoke_records("spoke-a").await.unwrap(),
        Some(Default::default())
    );
    assert!(
        h.drain_events()
            .contains(&SyncEvent::SpokeCleared {
                spoke: "spoke-a".to_string(),
                removed: 3,
            })
    );
}

#[tokio::test]
async fn clear_spoke_failure_is_reported() {
    let h = fleet();
    h.server("spoke-a").fail_connect(true);

    let result = h.orchestrator.clear_spoke("spoke-a").await;

    assert!(matches!(result, Err(Error::Connection(_))));
    assert_eq!(h.notifier.sync_failed_count(), 1);
    let row = h.store.last_sync("spoke-a").await.unwrap().unwrap();
    assert_eq!(row.status, SyncStatus::Error);
}

#[tokio::test]
async fn unknown_spoke_and_missing_hub_are_not_found() {
    let h = Harness::new(vec![spoke("spoke-a")]);

    assert!(matches!(
        h.orchestrator.sync_spoke("nope").await,
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        h.orchestrator.sync_spoke("spoke-a").await,
        Err(Error::NotFound(_))
    ));

    let report = h.orchestrator.run_cycle().await;
    assert_eq!(report.hub, HubRefresh::NoHub);
    assert!(report.spokes.is_empty());
    assert_eq!(h.server("spoke-a").connect_calls(), 0);
}

#[tokio::test]
async fn same_spoke_operations_do_not_interleave() {
    let h = fleet();
    h.server("hub").set_records(records(
        &["10.0.0.1 a.home", "10.0.0.2 b.home", "10.0.0.3 c.home"],
        &[],
    ));
    h.orchestrator.refresh_hub_cache().await;
    h.server("spoke-a").set_op_delay(Duration::from_millis(10));

    let (first, second) = tokio::join!(
        h.orchestrator.sync_spoke("spoke-a"),
        h.orchestrator.sync_spoke("spoke-a"),
    );

    let total_added = first.unwrap().unwrap().stats.added + second.unwrap().unwrap().stats.added;
    assert_eq!(total_added, 3, "the second run sees the converged spoke");
    assert_eq!(h.server("spoke-a").max_concurrent_sessions(), 1);
}

#[tokio::test]
async fn dry_run_records_history_but_not_state() {
    let engine = EngineConfig {
        dry_run: true,
        ..EngineConfig::default()
    };
    let h = Harness::with_engine(vec![hub("hub"), spoke("spoke-a")], engine);
    h.server("hub")
        .set_records(records(&["1.2.3.4 nas.home"], &[]));
    h.server("spoke-a")
        .set_records(records(&["9.9.9.9 stale.home"], &[]));

    let report = h.orchestrator.run_cycle().await;

    let stats = report.spokes["spoke-a"].stats;
    assert_eq!((stats.added, stats.removed), (1, 1));
    assert_eq!(h.server("spoke-a").mutation_calls(), 0);
    assert!(h.store.get_spoke_snapshot("spoke-a").await.unwrap().is_none());
    assert!(h.store.last_sync("spoke-a").await.unwrap().unwrap().is_success());
}

#[tokio::test]
async fn cycle_emits_events_in_order() {
    let mut h = fleet();
    h.server("hub")
        .set_records(records(&["1.2.3.4 nas.home"], &[]));
    h.server("spoke-b").fail_get(true);

    h.orchestrator.run_cycle().await;
    let events = h.drain_events();

    assert_eq!(
        events.first(),
        Some(&SyncEvent::HubRefreshed {
            hub: "hub".to_string(),
            records: 1,
        })
    );
    assert!(events.iter().any(
        |e| matches!(e, SyncEvent::SpokeSynced { spoke, stats } if spoke == "spoke-a" && stats.added == 1)
    ));
    assert!(
        events
            .iter()
            .any(|e| matches!(e, SyncEvent::SpokeFailed { spoke, .. } if spoke == "spoke-b"))
    );
    assert_eq!(
        events.last(),
        Some(&SyncEvent::CycleCompleted {
            succeeded: 1,
            failed: 1,
        })
    );
}

#[tokio::test]
async fn history_is_newest_first_and_filterable() {
    let h = fleet();
    h.server("hub")
        .set_records(records(&["1.2.3.4 nas.home"], &[]));

    h.orchestrator.run_cycle().await;
    h.orchestrator.run_cycle().await;

    let all = h.store.history(100, None).await.unwrap();
    assert_eq!(all.len(), 6);
    assert!(all.windows(2).all(|w| w[0].started_at >= w[1].started_at));

    let only_b = h.store.history(100, Some("spoke-b")).await.unwrap();
    assert_eq!(only_b.len(), 2);
    assert!(only_b.iter().all(|r| r.server_name == "spoke-b"));
}
