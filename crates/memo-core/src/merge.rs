//! Snapshot reconciliation.
//!
//! `merge(base, incoming)` is last-writer-wins per note id with two rules on
//! top:
//!
//! - tombstones from either side are unioned and always beat a note, however
//!   new its `updated_at` looks;
//! - on an exact `updated_at` tie the `incoming` side wins.
//!
//! The tie rule is what makes the directions asymmetric: a push merges the
//! local snapshot *into* the remote one (local wins ties), a pull merges the
//! remote snapshot into the local one (remote wins ties).
//!
//! Everything here is pure; no I/O and no clock reads.

use std::collections::btree_map::Entry;

use crate::models::Snapshot;

/// Which side initiated the reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDirection {
    /// Local changes sent outward; local wins ties
    Push,
    /// Remote changes absorbed inward; remote wins ties
    Pull,
}

impl MergeDirection {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Pull => "pull",
        }
    }
}

/// How a merge changed the base snapshot's note set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Ids present in the result but not in the base
    pub added: usize,
    /// Ids present in both whose note content changed
    pub updated: usize,
    /// Base notes removed by a tombstone
    pub removed: usize,
}

impl MergeReport {
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.added == 0 && self.updated == 0 && self.removed == 0
    }
}

/// Merge `incoming` into `base`, `incoming` winning timestamp ties.
#[must_use]
pub fn merge(base: &Snapshot, incoming: &Snapshot) -> Snapshot {
    merge_with_report(base, incoming).0
}

/// [`merge`] plus a summary of what changed relative to `base`.
#[must_use]
pub fn merge_with_report(base: &Snapshot, incoming: &Snapshot) -> (Snapshot, MergeReport) {
    let tombstones = base
        .tombstones
        .union(&incoming.tombstones)
        .cloned()
        .collect();

    let mut merged = Snapshot {
        notes: base.notes.clone(),
        tombstones,
    };

    for (id, note) in &incoming.notes {
        match merged.notes.entry(id.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(note.clone());
            }
            Entry::Occupied(mut slot) => {
                if note.updated_at >= slot.get().updated_at {
                    slot.insert(note.clone());
                }
            }
        }
    }

    let Snapshot { notes, tombstones } = &mut merged;
    notes.retain(|id, _| !tombstones.contains(id));

    let mut report = MergeReport::default();
    for (id, note) in &merged.notes {
        match base.notes.get(id) {
            None => report.added += 1,
            Some(previous) if previous != note => report.updated += 1,
            Some(_) => {}
        }
    }
    report.removed = base
        .notes
        .keys()
        .filter(|id| merged.tombstones.contains(*id))
        .count();

    (merged, report)
}

/// Merge local changes into the remote snapshot before writing it back.
#[must_use]
pub fn push_merge(local: &Snapshot, remote: &Snapshot) -> Snapshot {
    merge(remote, local)
}

/// Absorb a remote snapshot into the local one.
#[must_use]
pub fn pull_merge(local: &Snapshot, remote: &Snapshot) -> Snapshot {
    merge(local, remote)
}

/// Directional merge returning the report relative to the side being updated.
#[must_use]
pub fn merge_directed(
    direction: MergeDirection,
    local: &Snapshot,
    remote: &Snapshot,
) -> (Snapshot, MergeReport) {
    match direction {
        MergeDirection::Push => merge_with_report(remote, local),
        MergeDirection::Pull => merge_with_report(local, remote),
    }
}
