//! Note collection plus tombstones, the unit the merge engine works on.

use std::collections::{BTreeMap, BTreeSet};

use super::{Note, NoteId, RawNote};

/// An unordered set of notes keyed by id, plus the ids known to be deleted.
///
/// Equality ignores insertion order; display order is derived on demand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub notes: BTreeMap<NoteId, Note>,
    pub tombstones: BTreeSet<NoteId>,
}

/// Result of building a snapshot from untrusted records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sanitized {
    pub snapshot: Snapshot,
    /// Records dropped for lacking an id
    pub dropped: usize,
}

impl Snapshot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from notes and tombstones. Duplicate ids keep the newer note.
    pub fn from_parts(
        notes: impl IntoIterator<Item = Note>,
        tombstones: impl IntoIterator<Item = NoteId>,
    ) -> Self {
        let mut snapshot = Self {
            notes: BTreeMap::new(),
            tombstones: tombstones.into_iter().collect(),
        };
        for note in notes {
            snapshot.upsert_newer(note);
        }
        snapshot
    }

    /// Build a snapshot from raw records, dropping those without an id and
    /// defaulting the remaining missing fields.
    pub fn from_raw(
        records: impl IntoIterator<Item = RawNote>,
        tombstones: impl IntoIterator<Item = NoteId>,
        now_ms: i64,
    ) -> Sanitized {
        let mut dropped = 0;
        let notes = records
            .into_iter()
            .filter_map(|raw| {
                let note = raw.into_note(now_ms);
                if note.is_none() {
                    dropped += 1;
                }
                note
            })
            .collect::<Vec<_>>();
        let tombstones = tombstones
            .into_iter()
            .filter(|id| !id.as_str().is_empty())
            .collect::<Vec<_>>();

        Sanitized {
            snapshot: Self::from_parts(notes, tombstones),
            dropped,
        }
    }

    fn upsert_newer(&mut self, note: Note) {
        match self.notes.get(&note.id) {
            Some(existing) if existing.updated_at >= note.updated_at => {}
            _ => {
                self.notes.insert(note.id.clone(), note);
            }
        }
    }

    #[must_use]
    pub fn get(&self, id: &NoteId) -> Option<&Note> {
        self.notes.get(id)
    }

    #[must_use]
    pub fn is_tombstoned(&self, id: &NoteId) -> bool {
        self.tombstones.contains(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.notes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Notes sorted newest first; ties fall back to id for a stable listing.
    #[must_use]
    pub fn display_order(&self) -> Vec<&Note> {
        let mut notes = self.notes.values().collect::<Vec<_>>();
        notes.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        notes
    }

    /// Owned copy of [`Self::display_order`].
    #[must_use]
    pub fn ordered_notes(&self) -> Vec<Note> {
        self.display_order().into_iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(id: &str, updated_at: i64) -> Note {
        Note {
            id: id.into(),
            title: id.to_string(),
            body: String::new(),
            updated_at,
        }
    }

    #[test]
    fn from_parts_keeps_newer_duplicate() {
        let snapshot = Snapshot::from_parts([note("a", 10), note("a", 20), note("a", 5)], []);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get(&"a".into()).unwrap().updated_at, 20);
    }

    #[test]
    fn display_order_is_newest_first() {
        let snapshot = Snapshot::from_parts([note("a", 10), note("b", 30), note("c", 20)], []);
        let order = snapshot
            .display_order()
            .iter()
            .map(|note| note.id.to_string())
            .collect::<Vec<_>>();
        assert_eq!(order, vec!["b", "c", "a"]);
    }

    #[test]
    fn from_raw_counts_dropped_records() {
        let records = vec![
            RawNote {
                id: Some("a".into()),
                ..RawNote::default()
            },
            RawNote::default(),
        ];
        let sanitized = Snapshot::from_raw(records, [NoteId::from("")], 7);
        assert_eq!(sanitized.dropped, 1);
        assert_eq!(sanitized.snapshot.len(), 1);
        assert!(sanitized.snapshot.tombstones.is_empty());
        assert_eq!(sanitized.snapshot.get(&"a".into()).unwrap().updated_at, 7);
    }

    #[test]
    fn equality_ignores_insertion_order() {
        let left = Snapshot::from_parts([note("a", 1), note("b", 2)], ["x".into()]);
        let right = Snapshot::from_parts([note("b", 2), note("a", 1)], ["x".into()]);
        assert_eq!(left, right);
    }
}
