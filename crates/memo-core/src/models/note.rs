//! Note model

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use super::timestamp;

/// Title given to notes saved without one.
pub const DEFAULT_TITLE: &str = "Untitled Note";

/// Opaque, globally unique note identifier.
///
/// Fresh ids are UUID v7 strings, but ids arriving from imports or other
/// devices are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(String);

impl NoteId {
    /// Create a new unique note ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for NoteId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NoteId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for NoteId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A note in the system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Unique identifier, immutable after creation
    pub id: NoteId,
    pub title: String,
    pub body: String,
    /// Last update timestamp (Unix ms)
    #[serde(with = "timestamp")]
    pub updated_at: i64,
}

impl Note {
    /// Create an empty note stamped at `now_ms`.
    #[must_use]
    pub fn new(now_ms: i64) -> Self {
        Self {
            id: NoteId::new(),
            title: DEFAULT_TITLE.to_string(),
            body: String::new(),
            updated_at: now_ms,
        }
    }

    /// Body flattened onto one line, truncated to `max_len` characters
    #[must_use]
    pub fn preview(&self, max_len: usize) -> String {
        self.body
            .replace('\n', " ")
            .chars()
            .take(max_len)
            .collect()
    }

    /// Case-insensitive match against title and body.
    #[must_use]
    pub fn matches(&self, query_lowercase: &str) -> bool {
        self.title.to_lowercase().contains(query_lowercase)
            || self.body.to_lowercase().contains(query_lowercase)
    }
}

/// A note-shaped record as found on disk, on the remote, or in an import.
///
/// Every field is optional so that one corrupt record never fails the
/// collection it arrived in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawNote {
    pub id: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub updated_at: Option<i64>,
}

impl RawNote {
    /// Read whatever note fields a JSON value carries.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        let Value::Object(map) = value else {
            return Self::default();
        };
        let text = |key: &str| {
            map.get(key)
                .and_then(Value::as_str)
                .filter(|text| !text.is_empty())
                .map(str::to_string)
        };

        Self {
            id: text("id"),
            title: text("title"),
            body: text("body"),
            updated_at: map.get("updatedAt").and_then(timestamp::from_value),
        }
    }

    /// Convert into a note, or `None` when the record has no id.
    #[must_use]
    pub fn into_note(self, now_ms: i64) -> Option<Note> {
        let id = self.id?;
        Some(Self::build(NoteId::from(id), self.title, self.body, self.updated_at, now_ms))
    }

    /// Convert into a note, generating an id when the record has none.
    #[must_use]
    pub fn into_note_with_fresh_id(self, now_ms: i64) -> Note {
        let id = self.id.map_or_else(NoteId::new, NoteId::from);
        Self::build(id, self.title, self.body, self.updated_at, now_ms)
    }

    fn build(
        id: NoteId,
        title: Option<String>,
        body: Option<String>,
        updated_at: Option<i64>,
        now_ms: i64,
    ) -> Note {
        Note {
            id,
            title: title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            body: body.unwrap_or_default(),
            updated_at: updated_at.unwrap_or(now_ms),
        }
    }
}

impl From<&Note> for RawNote {
    fn from(note: &Note) -> Self {
        Self {
            id: Some(note.id.to_string()),
            title: Some(note.title.clone()),
            body: Some(note.body.clone()),
            updated_at: Some(note.updated_at),
        }
    }
}

impl<'de> Deserialize<'de> for RawNote {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_note_id_unique() {
        let id1 = NoteId::new();
        let id2 = NoteId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_note_new_uses_placeholder_title() {
        let note = Note::new(42);
        assert_eq!(note.title, DEFAULT_TITLE);
        assert!(note.body.is_empty());
        assert_eq!(note.updated_at, 42);
    }

    #[test]
    fn test_note_serializes_iso_timestamp() {
        let note = Note {
            id: "n1".into(),
            title: "Title".to_string(),
            body: "Body".to_string(),
            updated_at: 1_000,
        };
        let value = serde_json::to_value(&note).unwrap();
        assert_eq!(value["updatedAt"], "1970-01-01T00:00:01.000Z");

        let parsed: Note = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, note);
    }

    #[test]
    fn test_raw_note_defaults_missing_fields() {
        let raw = RawNote::from_value(&json!({ "id": "n1" }));
        let note = raw.into_note(500).unwrap();
        assert_eq!(note.title, DEFAULT_TITLE);
        assert_eq!(note.body, "");
        assert_eq!(note.updated_at, 500);
    }

    #[test]
    fn test_raw_note_without_id_is_dropped() {
        let raw = RawNote::from_value(&json!({ "title": "orphan" }));
        assert!(raw.into_note(0).is_none());
    }

    #[test]
    fn test_raw_note_ignores_wrongly_typed_fields() {
        let raw = RawNote::from_value(&json!({ "id": "n1", "title": 7, "updatedAt": "soon" }));
        assert_eq!(raw.id.as_deref(), Some("n1"));
        assert_eq!(raw.title, None);
        assert_eq!(raw.updated_at, None);

        assert_eq!(RawNote::from_value(&json!("not a note")), RawNote::default());
    }

    #[test]
    fn test_raw_note_fresh_id() {
        let note = RawNote::default().into_note_with_fresh_id(1);
        assert!(!note.id.as_str().is_empty());
    }

    #[test]
    fn test_preview_flattens_lines() {
        let mut note = Note::new(0);
        note.body = "first\nsecond line".to_string();
        assert_eq!(note.preview(8), "first se");
    }
}
