//! Reconciliation engine
//!
//! The engine is responsible for:
//! - Computing the per-type difference between a source and a target set
//! - Applying additions and removals through a [`ServerAdapter`]
//! - Tallying outcomes without letting one record abort the batch
//!
//! ## Architecture
//!
//! ```text
//!   source (hub snapshot)      target (spoke live set)
//!            │                          │
//!            └──────────┬───────────────┘
//!                       ▼
//!                 ┌───────────┐
//!                 │  diff()   │──── DiffPlan (per type: to_add, to_remove)
//!                 └───────────┘
//!                       │
//!                       ▼
//!                 ┌───────────┐
//!                 │  apply()  │──── add_record / delete_record
//!                 └───────────┘
//!                       │
//!                       ▼
//!                   SyncStats
//! ```
//!
//! ## Apply order
//!
//! All additions run before removals, A before CNAME. Nothing depends on
//! this: every record operation is independent.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use crate::error::Result;
use crate::record::{DnsRecord, RecordSet, RecordType};
use crate::traits::ServerAdapter;

/// Outcome counters of one reconciliation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    /// Successful additions (or planned additions in dry-run)
    pub added: usize,
    /// Successful removals (or planned removals in dry-run)
    pub removed: usize,
    /// Add/delete calls that returned false or failed
    pub conflicts: usize,
    /// A records in the source snapshot
    pub a_records: usize,
    /// CNAME records in the source snapshot
    pub cname_records: usize,
}

impl SyncStats {
    /// Stats with only the record counts of a snapshot filled in
    pub fn for_snapshot(records: &RecordSet) -> Self {
        Self {
            a_records: records.count(RecordType::A),
            cname_records: records.count(RecordType::Cname),
            ..Self::default()
        }
    }
}

/// Per-type changes needed to make a target match a source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffPlan {
    to_add: BTreeMap<RecordType, BTreeSet<String>>,
    to_remove: BTreeMap<RecordType, BTreeSet<String>>,
}

impl DiffPlan {
    /// Canonical strings to add for one type
    pub fn additions(&self, record_type: RecordType) -> impl Iterator<Item = &str> {
        self.to_add
            .get(&record_type)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// Canonical strings to remove for one type
    pub fn removals(&self, record_type: RecordType) -> impl Iterator<Item = &str> {
        self.to_remove
            .get(&record_type)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// Total planned additions
    pub fn add_count(&self) -> usize {
        self.to_add.values().map(BTreeSet::len).sum()
    }

    /// Total planned removals
    pub fn remove_count(&self) -> usize {
        self.to_remove.values().map(BTreeSet::len).sum()
    }

    /// Whether the pair is already converged
    pub fn is_empty(&self) -> bool {
        self.add_count() == 0 && self.remove_count() == 0
    }

    /// The target after every planned operation succeeds
    pub fn applied_to(&self, target: &RecordSet) -> Result<RecordSet> {
        let mut result = RecordSet::new();
        for (record_type, canonical) in target.iter() {
            let removed = self
                .to_remove
                .get(&record_type)
                .is_some_and(|set| set.contains(canonical));
            if !removed {
                result.insert_canonical(record_type, canonical)?;
            }
        }
        for record_type in RecordType::ALL {
            for canonical in self.additions(record_type) {
                result.insert_canonical(record_type, canonical)?;
            }
        }
        Ok(result)
    }
}

/// Compute `source - target` and `target - source` for each record type
pub fn diff(source: &RecordSet, target: &RecordSet) -> DiffPlan {
    let mut plan = DiffPlan::default();

    for record_type in RecordType::ALL {
        let src = source.of_type(record_type);
        let dst = target.of_type(record_type);

        let add: BTreeSet<String> = src.difference(dst).cloned().collect();
        let remove: BTreeSet<String> = dst.difference(src).cloned().collect();

        if !add.is_empty() {
            plan.to_add.insert(record_type, add);
        }
        if !remove.is_empty() {
            plan.to_remove.insert(record_type, remove);
        }
    }

    plan
}

/// Apply a plan through an adapter
///
/// Each record is attempted independently. A `false` return, an error or an
/// unparseable canonical string all count as one conflict.
///
/// # Parameters
///
/// - `plan`: Changes to apply
/// - `adapter`: Connected target adapter
/// - `dry_run`: Count planned operations without calling the adapter
pub async fn apply(plan: &DiffPlan, adapter: &dyn ServerAdapter, dry_run: bool) -> SyncStats {
    let mut stats = SyncStats::default();

    if dry_run {
        stats.added = plan.add_count();
        stats.removed = plan.remove_count();
        debug!(
            "Dry run on {}: would add {}, remove {}",
            adapter.server_name(),
            stats.added,
            stats.removed
        );
        return stats;
    }

    for record_type in RecordType::ALL {
        for canonical in plan.additions(record_type) {
            if apply_one(adapter, record_type, canonical, Operation::Add).await {
                stats.added += 1;
            } else {
                stats.conflicts += 1;
            }
        }
    }

    for record_type in RecordType::ALL {
        for canonical in plan.removals(record_type) {
            if apply_one(adapter, record_type, canonical, Operation::Delete).await {
                stats.removed += 1;
            } else {
                stats.conflicts += 1;
            }
        }
    }

    stats
}

/// Fetch the target's live set, diff it against `source` and apply
///
/// # Returns
///
/// - `Ok(SyncStats)`: Reconciliation ran (conflicts may be non-zero)
/// - `Err(Error)`: The live set could not be fetched; nothing was applied
pub async fn reconcile(
    source: &RecordSet,
    adapter: &dyn ServerAdapter,
    dry_run: bool,
) -> Result<SyncStats> {
    let target = adapter.get_records().await?;
    let plan = diff(source, &target);

    debug!(
        "Plan for {}: +{} -{}",
        adapter.server_name(),
        plan.add_count(),
        plan.remove_count()
    );

    let applied = apply(&plan, adapter, dry_run).await;
    Ok(SyncStats {
        a_records: source.count(RecordType::A),
        cname_records: source.count(RecordType::Cname),
        ..applied
    })
}

#[derive(Debug, Clone, Copy)]
enum Operation {
    Add,
    Delete,
}

async fn apply_one(
    adapter: &dyn ServerAdapter,
    record_type: RecordType,
    canonical: &str,
    op: Operation,
) -> bool {
    let record = match DnsRecord::parse(record_type, canonical) {
        Ok(record) => record,
        Err(e) => {
            warn!("Skipping malformed record on {}: {}", adapter.server_name(), e);
            return false;
        }
    };

    let result = match op {
        Operation::Add => adapter.add_record(&record).await,
        Operation::Delete => adapter.delete_record(&record).await,
    };

    match result {
        Ok(true) => true,
        Ok(false) => {
            warn!(
                "{} rejected {:?} of {}",
                adapter.server_name(),
                op,
                record
            );
            false
        }
        Err(e) => {
            warn!(
                "{:?} of {} on {} failed: {}",
                op,
                record,
                adapter.server_name(),
                e
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(a: &[&str], cname: &[&str]) -> RecordSet {
        let mut records = RecordSet::new();
        for s in a {
            records.insert_canonical(RecordType::A, s).unwrap();
        }
        for s in cname {
            records.insert_canonical(RecordType::Cname, s).unwrap();
        }
        records
    }

    #[test]
    fn diff_finds_missing_record() {
        let hub = set(&["1.2.3.4 nas.home", "5.6.7.8 pi.home"], &[]);
        let spoke = set(&["1.2.3.4 nas.home"], &[]);

        let plan = diff(&hub, &spoke);
        assert_eq!(plan.add_count(), 1);
        assert_eq!(plan.remove_count(), 0);
        assert_eq!(
            plan.additions(RecordType::A).collect::<Vec<_>>(),
            vec!["5.6.7.8 pi.home"]
        );
    }

    #[test]
    fn diff_finds_stale_record() {
        let hub = set(&["1.2.3.4 nas.home"], &[]);
        let spoke = set(&["1.2.3.4 nas.home", "9.9.9.9 stale.home"], &[]);

        let plan = diff(&hub, &spoke);
        assert_eq!(plan.add_count(), 0);
        assert_eq!(
            plan.removals(RecordType::A).collect::<Vec<_>>(),
            vec!["9.9.9.9 stale.home"]
        );
    }

    #[test]
    fn types_are_diffed_independently() {
        let hub = set(&["1.2.3.4 nas.home"], &["www.home -> nas.home"]);
        let spoke = set(&[], &["old.home -> nas.home"]);

        let plan = diff(&hub, &spoke);
        assert_eq!(plan.additions(RecordType::A).count(), 1);
        assert_eq!(plan.additions(RecordType::Cname).count(), 1);
        assert_eq!(plan.removals(RecordType::Cname).count(), 1);
        assert_eq!(plan.removals(RecordType::A).count(), 0);
    }

    #[test]
    fn additions_and_removals_are_disjoint_and_close() {
        let hub = set(
            &["1.2.3.4 nas.home", "10.0.0.1 router.home"],
            &["www.home -> nas.home"],
        );
        let spoke = set(
            &["1.2.3.4 nas.home", "9.9.9.9 stale.home"],
            &["www.home -> old.home"],
        );

        let plan = diff(&hub, &spoke);
        for ty in RecordType::ALL {
            let adds: BTreeSet<_> = plan.additions(ty).collect();
            assert!(plan.removals(ty).all(|r| !adds.contains(r)));
        }
        assert_eq!(plan.applied_to(&spoke).unwrap(), hub);
    }

    #[test]
    fn converged_pair_yields_empty_plan() {
        let hub = set(&["1.2.3.4 nas.home"], &["www.home -> nas.home"]);
        assert!(diff(&hub, &hub.clone()).is_empty());
    }

    #[test]
    fn snapshot_stats_count_types() {
        let hub = set(&["1.2.3.4 nas.home", "5.6.7.8 pi.home"], &["www.home -> nas.home"]);
        let stats = SyncStats::for_snapshot(&hub);
        assert_eq!(stats.a_records, 2);
        assert_eq!(stats.cname_records, 1);
        assert_eq!(stats.added, 0);
    }
}
