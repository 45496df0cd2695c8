//! Dependent-collection diff planner
//!
//! Each documentation/coordinating submission is a wholesale restatement of
//! the collection attached to an entity: rows not resubmitted are removed,
//! new keys are created, resubmitted keys with a fresh file are updated in
//! place. The plan is computed purely, applied inside the transaction, and
//! its `cleanup_paths` are deleted from the blob store only after commit.
//! The relational diff is the source of truth; blob cleanup is advisory.

use std::collections::HashMap;
use std::hash::Hash;

use uuid::Uuid;

/// An item currently attached to the entity
#[derive(Debug, Clone)]
pub struct Existing<K> {
    pub key: K,
    pub row_id: Uuid,
    pub collateral_path: Option<String>,
}

/// An item in the submitted set
#[derive(Debug, Clone)]
pub struct Submitted<K> {
    pub key: K,
    /// Whether this submission carries a replacement file
    pub has_new_file: bool,
}

/// Row to update in place because a resubmission carries a new file
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedUpdate<K> {
    pub key: K,
    pub row_id: Uuid,
    /// Path being replaced, scheduled for after-commit cleanup
    pub replaced_path: Option<String>,
}

/// Row to delete because its key was not resubmitted
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedDelete<K> {
    pub key: K,
    pub row_id: Uuid,
    /// Path orphaned by the delete, scheduled for after-commit cleanup
    pub orphaned_path: Option<String>,
}

/// The reconciliation plan for one sync submission
#[derive(Debug, Clone)]
pub struct SyncPlan<K> {
    pub inserts: Vec<K>,
    pub updates: Vec<PlannedUpdate<K>>,
    pub deletes: Vec<PlannedDelete<K>>,
}

impl<K> SyncPlan<K> {
    /// True when applying the plan would change no rows
    pub fn is_noop(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }

    /// Blob paths to delete after the transaction commits
    pub fn cleanup_paths(&self) -> Vec<&str> {
        self.updates
            .iter()
            .filter_map(|u| u.replaced_path.as_deref())
            .chain(self.deletes.iter().filter_map(|d| d.orphaned_path.as_deref()))
            .collect()
    }
}

/// Compute the plan reconciling `existing` with `submitted`.
///
/// Keys are assumed unique on both sides; the caller validates duplicates
/// before planning. Resubmitted keys without a new file are untouched, which
/// makes re-running the same submission a relational no-op.
pub fn plan_sync<K: Eq + Hash + Clone>(
    existing: &[Existing<K>],
    submitted: &[Submitted<K>],
) -> SyncPlan<K> {
    let existing_by_key: HashMap<&K, &Existing<K>> =
        existing.iter().map(|e| (&e.key, e)).collect();
    let submitted_keys: std::collections::HashSet<&K> =
        submitted.iter().map(|s| &s.key).collect();

    let mut inserts = Vec::new();
    let mut updates = Vec::new();
    for item in submitted {
        match existing_by_key.get(&item.key) {
            None => inserts.push(item.key.clone()),
            Some(current) if item.has_new_file => updates.push(PlannedUpdate {
                key: item.key.clone(),
                row_id: current.row_id,
                replaced_path: current.collateral_path.clone(),
            }),
            Some(_) => {}
        }
    }

    let deletes = existing
        .iter()
        .filter(|e| !submitted_keys.contains(&e.key))
        .map(|e| PlannedDelete {
            key: e.key.clone(),
            row_id: e.row_id,
            orphaned_path: e.collateral_path.clone(),
        })
        .collect();

    SyncPlan {
        inserts,
        updates,
        deletes,
    }
}
