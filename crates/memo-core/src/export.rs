//! Shared note export helpers for CLI and app parity.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::models::timestamp;
use crate::Note;

/// Export output format shared by all clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportFormat {
    Json,
    Markdown,
}

impl ExportFormat {
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Markdown => "md",
        }
    }
}

/// Render notes as pretty-printed JSON, re-importable as-is.
pub fn render_json_export(notes: &[Note]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(notes)
}

/// Render notes in Markdown with frontmatter blocks.
#[must_use]
pub fn render_markdown_export(notes: &[Note]) -> String {
    let mut output = String::new();

    for (index, note) in notes.iter().enumerate() {
        if index > 0 {
            output.push('\n');
        }

        let _ = writeln!(output, "---");
        let _ = writeln!(output, "id: {}", note.id);
        let _ = writeln!(output, "updated_at: {}", timestamp::to_rfc3339(note.updated_at));
        let _ = writeln!(output, "---");
        let _ = writeln!(output);
        let _ = writeln!(output, "# {}", note.title);
        if !note.body.is_empty() {
            let _ = writeln!(output);
            output.push_str(&note.body);
            output.push('\n');
        }
    }

    output
}

/// Render notes based on selected export format.
pub fn render_notes_export(notes: &[Note], format: ExportFormat) -> serde_json::Result<String> {
    match format {
        ExportFormat::Json => render_json_export(notes),
        ExportFormat::Markdown => Ok(render_markdown_export(notes)),
    }
}

/// Build a deterministic default file name for export flows.
#[must_use]
pub fn suggested_export_file_name(format: ExportFormat, timestamp_ms: i64) -> String {
    let stamp = chrono::DateTime::<chrono::Utc>::from_timestamp_millis(timestamp_ms)
        .unwrap_or_default()
        .format("%Y-%m-%dT%H-%M-%S");
    format!("notes_export_{stamp}.{}", format.extension())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Note {
        Note {
            id: "n1".into(),
            title: "Groceries".to_string(),
            body: "milk\neggs".to_string(),
            updated_at: 456,
        }
    }

    #[test]
    fn render_json_export_uses_wire_field_names() {
        let rendered = render_json_export(&[sample()]).unwrap();
        assert!(rendered.contains("\"updatedAt\": \"1970-01-01T00:00:00.456Z\""));
        assert!(rendered.contains("\"title\": \"Groceries\""));
    }

    #[test]
    fn render_markdown_export_includes_frontmatter_and_content() {
        let rendered = render_markdown_export(&[sample()]);
        assert!(rendered.contains("id: n1"));
        assert!(rendered.contains("updated_at: 1970-01-01T00:00:00.456Z"));
        assert!(rendered.contains("# Groceries"));
        assert!(rendered.contains("milk\neggs"));
    }

    #[test]
    fn suggested_export_file_name_uses_format_extension() {
        assert_eq!(
            suggested_export_file_name(ExportFormat::Json, 0),
            "notes_export_1970-01-01T00-00-00.json"
        );
        assert_eq!(
            suggested_export_file_name(ExportFormat::Markdown, 1_000),
            "notes_export_1970-01-01T00-00-01.md"
        );
    }
}
