//! Note import.
//!
//! Imports accept a JSON array of note records or a JSON object whose values
//! are note records. Missing fields are defaulted, records without an id get
//! a fresh one, and an existing note is only replaced by a strictly newer
//! copy. Anything that is not note-shaped rejects the whole payload.

use std::collections::btree_map::Entry;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{Note, RawNote, Snapshot};

/// Counts reported back to the user after an import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Ids that did not exist locally
    pub added: usize,
    /// Existing notes replaced by a newer imported version
    pub updated: usize,
}

/// Parse an import payload into notes, rejecting malformed payloads outright.
pub fn parse_import(payload: &str, now_ms: i64) -> Result<Vec<Note>> {
    let value: Value = serde_json::from_str(payload)
        .map_err(|error| Error::InvalidImport(format!("payload is not valid JSON: {error}")))?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => map.into_iter().map(|(_, item)| item).collect(),
        _ => {
            return Err(Error::InvalidImport(
                "imported JSON must be an array or object map of notes".to_string(),
            ))
        }
    };

    items
        .into_iter()
        .enumerate()
        .filter(|(_, item)| !item.is_null())
        .map(|(index, item)| {
            if item.is_object() {
                Ok(RawNote::from_value(&item).into_note_with_fresh_id(now_ms))
            } else {
                Err(Error::InvalidImport(format!(
                    "entry {index} is not a note object"
                )))
            }
        })
        .collect()
}

/// Reconcile imported notes into `local`.
///
/// Imported notes never resurrect tombstoned ids, and an existing note is
/// kept unless the imported copy has a strictly newer `updated_at`.
pub fn apply_import(local: &Snapshot, imported: Vec<Note>) -> (Snapshot, ImportReport) {
    let mut merged = local.clone();
    let mut report = ImportReport::default();

    for note in imported {
        if merged.tombstones.contains(&note.id) {
            continue;
        }
        match merged.notes.entry(note.id.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(note);
                report.added += 1;
            }
            Entry::Occupied(mut slot) => {
                if note.updated_at > slot.get().updated_at {
                    slot.insert(note);
                    report.updated += 1;
                }
            }
        }
    }

    (merged, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::render_json_export;
    use crate::models::{NoteId, DEFAULT_TITLE};
    use pretty_assertions::assert_eq;

    fn note(id: &str, title: &str, updated_at: i64) -> Note {
        Note {
            id: id.into(),
            title: title.to_string(),
            body: String::new(),
            updated_at,
        }
    }

    #[test]
    fn parse_accepts_array_and_object_map() {
        let array = parse_import(r#"[{"id": "a", "title": "A"}]"#, 0).unwrap();
        assert_eq!(array.len(), 1);

        let map = parse_import(
            r#"{"a": {"id": "a", "title": "A"}, "b": {"id": "b"}}"#,
            0,
        )
        .unwrap();
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn parse_defaults_missing_fields() {
        let notes = parse_import(r#"[{"body": "no id or title"}, null]"#, 77).unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].title, DEFAULT_TITLE);
        assert_eq!(notes[0].updated_at, 77);
        assert!(!notes[0].id.as_str().is_empty());
    }

    #[test]
    fn parse_rejects_malformed_payloads() {
        for payload in ["not json", "42", r#""text""#, r#"[{"id": "a"}, 5]"#] {
            let error = parse_import(payload, 0).unwrap_err();
            assert!(matches!(error, Error::InvalidImport(_)), "{payload}");
        }
    }

    #[test]
    fn import_counts_added_and_keeps_newer_local() {
        let local = Snapshot::from_parts([note("existing", "local edit", 500)], []);
        let imported = vec![note("fresh", "new", 100), note("existing", "stale copy", 200)];

        let (merged, report) = apply_import(&local, imported);
        assert_eq!(report, ImportReport { added: 1, updated: 0 });
        assert_eq!(merged.get(&"existing".into()).unwrap().title, "local edit");
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn import_updates_older_local_note() {
        let local = Snapshot::from_parts([note("a", "old", 100)], []);
        let (merged, report) = apply_import(&local, vec![note("a", "new", 200)]);
        assert_eq!(report, ImportReport { added: 0, updated: 1 });
        assert_eq!(merged.get(&"a".into()).unwrap().title, "new");
    }

    #[test]
    fn import_keeps_local_note_on_equal_timestamp() {
        let local = Snapshot::from_parts([note("a", "local", 100)], []);
        let (merged, report) = apply_import(&local, vec![note("a", "imported", 100)]);
        assert_eq!(report, ImportReport::default());
        assert_eq!(merged.get(&"a".into()).unwrap().title, "local");
    }

    #[test]
    fn import_does_not_resurrect_deleted_notes() {
        let local = Snapshot::from_parts([], [NoteId::from("gone")]);
        let (merged, report) = apply_import(&local, vec![note("gone", "back?", i64::MAX)]);
        assert_eq!(report, ImportReport::default());
        assert!(merged.is_empty());
    }

    #[test]
    fn export_then_import_is_a_noop() {
        let local = Snapshot::from_parts([note("a", "A", 1_000), note("b", "B", 2_000)], []);
        let exported = render_json_export(&local.ordered_notes()).unwrap();

        let imported = parse_import(&exported, 0).unwrap();
        let (merged, report) = apply_import(&local, imported);
        assert_eq!(report, ImportReport::default());
        assert_eq!(merged, local);
    }
}
