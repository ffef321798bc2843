//! In-memory note collection and tombstone set.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::models::{Note, NoteId, Snapshot, DEFAULT_TITLE};

/// The single source of truth the sync engine reads and mutates.
///
/// Every mutation is synchronous and leaves the snapshot consistent; callers
/// that share a store across tasks wrap it in a mutex.
pub struct NoteStore {
    snapshot: Snapshot,
    clock: Arc<dyn Clock>,
    revision: u64,
}

impl std::fmt::Debug for NoteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoteStore")
            .field("notes", &self.snapshot.notes.len())
            .field("tombstones", &self.snapshot.tombstones.len())
            .field("revision", &self.revision)
            .finish()
    }
}

impl Default for NoteStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl NoteStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_snapshot(Snapshot::new(), clock)
    }

    pub fn with_snapshot(snapshot: Snapshot, clock: Arc<dyn Clock>) -> Self {
        Self {
            snapshot,
            clock,
            revision: 0,
        }
    }

    /// Current time according to the store's clock.
    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Bumped on every mutation.
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    pub const fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn get(&self, id: &NoteId) -> Option<&Note> {
        self.snapshot.get(id)
    }

    /// Notes newest first.
    pub fn notes(&self) -> Vec<Note> {
        self.snapshot.ordered_notes()
    }

    /// Case-insensitive filter over title and body, newest first.
    pub fn search(&self, query: &str) -> Vec<Note> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return self.notes();
        }
        self.snapshot
            .display_order()
            .into_iter()
            .filter(|note| note.matches(&query))
            .cloned()
            .collect()
    }

    /// Ids deleted locally (or learned from the remote) and not yet cleared.
    pub const fn tombstones(&self) -> &BTreeSet<NoteId> {
        &self.snapshot.tombstones
    }

    /// Create an empty note at the head of the list.
    pub fn create_note(&mut self) -> Note {
        self.create_note_with(DEFAULT_TITLE, "")
    }

    /// Create a note with initial content.
    pub fn create_note_with(&mut self, title: &str, body: &str) -> Note {
        let mut note = Note::new(self.clock.now_ms());
        note.title = normalize_title(title);
        note.body = body.to_string();
        while self.snapshot.notes.contains_key(&note.id) || self.snapshot.is_tombstoned(&note.id) {
            note.id = NoteId::new();
        }

        self.snapshot.notes.insert(note.id.clone(), note.clone());
        self.touch();
        tracing::debug!(id = %note.id, "Created note");
        note
    }

    /// Replace a note's title and body, refreshing `updated_at`.
    ///
    /// Returns `None` without touching the store when the id is unknown.
    pub fn update_note(&mut self, id: &NoteId, title: &str, body: &str) -> Option<Note> {
        let now = self.clock.now_ms();
        let note = self.snapshot.notes.get_mut(id)?;
        note.title = normalize_title(title);
        note.body = body.to_string();
        note.updated_at = now.max(note.updated_at.saturating_add(1));
        let updated = note.clone();
        self.touch();
        Some(updated)
    }

    /// Remove a note and tombstone its id. Returns whether a note was removed.
    pub fn delete_note(&mut self, id: &NoteId) -> bool {
        if self.snapshot.notes.remove(id).is_none() {
            return false;
        }
        self.snapshot.tombstones.insert(id.clone());
        self.touch();
        tracing::debug!(%id, "Deleted note");
        true
    }

    /// Swap in a reconciled snapshot.
    pub fn replace(&mut self, snapshot: Snapshot) {
        if snapshot != self.snapshot {
            self.snapshot = snapshot;
            self.touch();
        }
    }

    /// Drop pending tombstones the remote store has acknowledged.
    pub fn clear_tombstones(&mut self, acknowledged: &BTreeSet<NoteId>) -> usize {
        let before = self.snapshot.tombstones.len();
        self.snapshot
            .tombstones
            .retain(|id| !acknowledged.contains(id));
        let cleared = before - self.snapshot.tombstones.len();
        if cleared > 0 {
            self.touch();
        }
        cleared
    }

    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }
}

fn normalize_title(title: &str) -> String {
    if title.is_empty() {
        DEFAULT_TITLE.to_string()
    } else {
        title.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn store_at(now: i64) -> (NoteStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(now));
        (NoteStore::new(clock.clone()), clock)
    }

    #[test]
    fn create_note_inserts_at_head() {
        let (mut store, clock) = store_at(100);
        let first = store.create_note();
        clock.advance(10);
        let second = store.create_note();

        let notes = store.notes();
        assert_eq!(notes[0].id, second.id);
        assert_eq!(notes[1].id, first.id);
        assert_eq!(first.title, DEFAULT_TITLE);
        assert_eq!(store.revision(), 2);
    }

    #[test]
    fn update_note_refreshes_timestamp() {
        let (mut store, clock) = store_at(100);
        let note = store.create_note();
        clock.advance(5);

        let updated = store.update_note(&note.id, "Groceries", "milk").unwrap();
        assert_eq!(updated.title, "Groceries");
        assert_eq!(updated.body, "milk");
        assert_eq!(updated.updated_at, 105);
    }

    #[test]
    fn update_note_is_monotonic_when_clock_stalls() {
        let (mut store, clock) = store_at(100);
        let note = store.create_note();
        let first = store.update_note(&note.id, "a", "").unwrap();
        clock.set(50);
        let second = store.update_note(&note.id, "b", "").unwrap();

        assert!(first.updated_at > note.updated_at);
        assert!(second.updated_at > first.updated_at);
    }

    #[test]
    fn update_note_empty_title_uses_placeholder() {
        let (mut store, _) = store_at(1);
        let note = store.create_note();
        let updated = store.update_note(&note.id, "", "body").unwrap();
        assert_eq!(updated.title, DEFAULT_TITLE);
    }

    #[test]
    fn update_missing_note_is_noop() {
        let (mut store, _) = store_at(1);
        assert!(store.update_note(&"missing".into(), "t", "b").is_none());
        assert_eq!(store.revision(), 0);
    }

    #[test]
    fn delete_note_tombstones_id() {
        let (mut store, _) = store_at(1);
        let note = store.create_note();

        assert!(store.delete_note(&note.id));
        assert!(store.get(&note.id).is_none());
        assert!(store.tombstones().contains(&note.id));

        let revision = store.revision();
        assert!(!store.delete_note(&note.id));
        assert_eq!(store.revision(), revision);
    }

    #[test]
    fn search_matches_title_and_body_case_insensitively() {
        let (mut store, clock) = store_at(1);
        store.create_note_with("Shopping", "Milk and eggs");
        clock.advance(1);
        store.create_note_with("Work", "Quarterly MILK report");
        clock.advance(1);
        store.create_note_with("Ideas", "none");

        assert_eq!(store.search("milk").len(), 2);
        assert_eq!(store.search("  ").len(), 3);
        assert_eq!(store.search("shop")[0].title, "Shopping");
    }

    #[test]
    fn clear_tombstones_only_drops_acknowledged() {
        let (mut store, _) = store_at(1);
        let a = store.create_note();
        let b = store.create_note();
        store.delete_note(&a.id);
        store.delete_note(&b.id);

        let acknowledged = BTreeSet::from([a.id.clone()]);
        assert_eq!(store.clear_tombstones(&acknowledged), 1);
        assert!(!store.tombstones().contains(&a.id));
        assert!(store.tombstones().contains(&b.id));
    }

    #[test]
    fn replace_with_identical_snapshot_keeps_revision() {
        let (mut store, _) = store_at(1);
        store.create_note();
        let revision = store.revision();
        store.replace(store.snapshot().clone());
        assert_eq!(store.revision(), revision);
    }
}
