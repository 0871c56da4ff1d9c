//! Architectural Contract Test: Diff & Apply
//!
//! This test verifies that reconciling one spoke against a source set
//! converges the spoke and counts every outcome.
//!
//! Constraints verified:
//! - Only missing records are added, only extra records are removed
//! - A rejected or failing record operation is a conflict, not an abort
//! - Dry run never calls a mutating adapter method
//! - A second reconcile of a converged spoke is a no-op
//! - A failed read of the live set applies nothing
//!
//! If this test fails, spokes drift from the hub or get clobbered.

mod common;

use common::*;
use dnssync_core::engine;

#[tokio::test]
async fn missing_record_is_added() {
    let server = ScriptedServer::default();
    server.set_records(records(&["1.2.3.4 nas.home"], &[]));
    let adapter = server.adapter("spoke-a");

    let source = records(&["1.2.3.4 nas.home", "5.6.7.8 pi.home"], &[]);
    let stats = engine::reconcile(&source, &adapter, false)
        .await
        .expect("reconcile succeeds");

    assert_eq!(stats.added, 1);
    assert_eq!(stats.removed, 0);
    assert_eq!(stats.conflicts, 0);
    assert_eq!(server.records(), source);
}

#[tokio::test]
async fn stale_record_is_removed() {
    let server = ScriptedServer::default();
    server.set_records(records(&["1.2.3.4 nas.home", "9.9.9.9 stale.home"], &[]));
    let adapter = server.adapter("spoke-a");

    let source = records(&["1.2.3.4 nas.home"], &[]);
    let stats = engine::reconcile(&source, &adapter, false)
        .await
        .expect("reconcile succeeds");

    assert_eq!(stats.added, 0);
    assert_eq!(stats.removed, 1);
    assert_eq!(server.delete_calls(), 1);
    assert_eq!(server.records(), source);
}

#[tokio::test]
async fn rejected_addition_counts_as_conflict() {
    let server = ScriptedServer::default();
    server.reject("10.0.0.2 b.home");
    let adapter = server.adapter("spoke-a");

    let source = records(&["10.0.0.1 a.home", "10.0.0.2 b.home"], &[]);
    let stats = engine::reconcile(&source, &adapter, false)
        .await
        .expect("reconcile succeeds");

    assert_eq!(stats.added, 1);
    assert_eq!(stats.conflicts, 1);
    assert_eq!(server.add_calls(), 2, "both additions must be attempted");
}

#[tokio::test]
async fn failing_operation_does_not_stop_the_rest() {
    let server = ScriptedServer::default();
    server.set_records(records(&["10.0.0.9 old.home"], &["www.home -> old.home"]));
    server.error_on("10.0.0.1 a.home");
    server.error_on("www.home -> old.home");
    let adapter = server.adapter("spoke-a");

    let source = records(&["10.0.0.1 a.home", "10.0.0.2 b.home"], &["api.home -> b.home"]);
    let stats = engine::reconcile(&source, &adapter, false)
        .await
        .expect("per-record errors are not fatal");

    assert_eq!(stats.added, 2);
    assert_eq!(stats.removed, 1);
    assert_eq!(stats.conflicts, 2);
    assert_eq!(stats.a_records, 2);
    assert_eq!(stats.cname_records, 1);
}

#[tokio::test]
async fn dry_run_issues_no_mutations() {
    let server = ScriptedServer::default();
    server.set_records(records(&["9.9.9.9 stale.home"], &[]));
    let adapter = server.adapter("spoke-a");

    let source = records(&["1.2.3.4 nas.home"], &["www.home -> nas.home"]);
    let stats = engine::reconcile(&source, &adapter, true)
        .await
        .expect("reconcile succeeds");

    assert_eq!(stats.added, 2);
    assert_eq!(stats.removed, 1);
    assert_eq!(server.mutation_calls(), 0, "dry run must not mutate");
    assert_eq!(server.records(), records(&["9.9.9.9 stale.home"], &[]));
}

#[tokio::test]
async fn converged_spoke_is_left_alone() {
    let server = ScriptedServer::default();
    server.set_records(records(&["9.9.9.9 stale.home"], &["old.home -> stale.home"]));
    let adapter = server.adapter("spoke-a");
    let source = records(&["1.2.3.4 nas.home"], &["www.home -> nas.home"]);

    engine::reconcile(&source, &adapter, false)
        .await
        .expect("first reconcile succeeds");
    let mutations = server.mutation_calls();

    let second = engine::reconcile(&source, &adapter, false)
        .await
        .expect("second reconcile succeeds");

    assert_eq!(second.added, 0);
    assert_eq!(second.removed, 0);
    assert_eq!(server.mutation_calls(), mutations, "no further calls");
}

#[tokio::test]
async fn record_types_are_reconciled_independently() {
    let server = ScriptedServer::default();
    // Same name as A on one side and CNAME on the other.
    server.set_records(records(&[], &["nas.home -> pi.home"]));
    let adapter = server.adapter("spoke-a");

    let source = records(&["1.2.3.4 nas.home"], &[]);
    let stats = engine::reconcile(&source, &adapter, false)
        .await
        .expect("reconcile succeeds");

    assert_eq!(stats.added, 1);
    assert_eq!(stats.removed, 1);
    assert_eq!(server.records(), source);
}

#[tokio::test]
async fn unreadable_spoke_is_not_touched() {
    let server = ScriptedServer::default();
    server.fail_get(true);
    let adapter = server.adapter("spoke-a");

    let result = engine::reconcile(&records(&["1.2.3.4 nas.home"], &[]), &adapter, false).await;

    assert!(result.is_err());
    assert_eq!(server.mutation_calls(), 0);
}
