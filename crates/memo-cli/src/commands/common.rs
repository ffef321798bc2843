use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;
use memo_core::local::JsonFileLocalRepository;
use memo_core::remote::{FileRemoteRepository, MemoryRemoteRepository, RemoteRepository};
use memo_core::util::compact_text;
use memo_core::{Identity, Note, NoteId, SyncEngine, SystemClock};
use serde::Serialize;

use crate::config::{resolve_config_path, CliConfig};
use crate::error::CliError;

const SHORT_ID_LEN: usize = 13;

/// Resolved paths and config for one CLI invocation.
#[derive(Debug, Clone)]
pub struct Context {
    pub config_path: PathBuf,
    pub config: CliConfig,
    pub data_dir: PathBuf,
}

impl Context {
    pub fn resolve(
        config_path: Option<PathBuf>,
        data_dir: Option<PathBuf>,
    ) -> Result<Self, CliError> {
        let config_path = resolve_config_path(config_path).map_err(CliError::Config)?;
        let config = CliConfig::load_from_path(&config_path).map_err(CliError::Config)?;
        let data_dir = config.resolve_data_dir(data_dir).map_err(CliError::Config)?;
        Ok(Self {
            config_path,
            config,
            data_dir,
        })
    }

    pub fn save_config(&self) -> Result<(), CliError> {
        self.config
            .save_to_path(&self.config_path)
            .map_err(CliError::Config)
    }

    /// Identity and remote store, when both are configured.
    pub fn remote_session(&self) -> Result<Option<(Identity, PathBuf)>, CliError> {
        let identity = self.config.identity().map_err(CliError::Config)?;
        Ok(identity.zip(self.config.remote_dir.clone()))
    }
}

#[derive(Debug, Serialize)]
pub struct NoteListItem {
    pub id: String,
    pub title: String,
    pub preview: String,
    pub body: String,
    pub updated_at: i64,
    pub relative_time: String,
}

/// Open the engine over the local data dir. With `connect`, sign in to the
/// configured remote so the invocation starts from a pulled snapshot.
pub async fn open_engine(context: &Context, connect: bool) -> Result<SyncEngine, CliError> {
    let local = Arc::new(JsonFileLocalRepository::new(&context.data_dir));
    let session = if connect {
        context.remote_session()?
    } else {
        None
    };
    let remote: Arc<dyn RemoteRepository> = match &session {
        Some((_, remote_dir)) => Arc::new(FileRemoteRepository::new(remote_dir)),
        None => Arc::new(MemoryRemoteRepository::new()),
    };

    let engine = SyncEngine::open(local, remote, Arc::new(SystemClock), context.config.sync).await;
    if let Some((identity, _)) = session {
        engine.sign_in(identity).await;
    }
    Ok(engine)
}

/// Persist pending changes before exit. Local failures are fatal; a remote
/// failure leaves the change saved locally for the next sync.
pub async fn finish(engine: &SyncEngine) -> Result<(), CliError> {
    if let Err(error) = engine.flush().await {
        if engine.last_save_error().is_some() {
            return Err(error.into());
        }
        tracing::warn!(
            "Saved locally; remote sync failed: {}",
            compact_text(&error.to_string())
        );
    }
    engine.sign_out();
    Ok(())
}

pub async fn resolve_note(engine: &SyncEngine, note_query: &str) -> Result<Note, CliError> {
    if let Some(note) = engine.get(&NoteId::from(note_query)).await {
        return Ok(note);
    }

    let matching = engine
        .notes()
        .await
        .into_iter()
        .filter(|note| note.id.as_str().starts_with(note_query))
        .take(3)
        .collect::<Vec<_>>();

    match matching.as_slice() {
        [] => Err(CliError::NoteNotFound(note_query.to_string())),
        [note] => Ok(note.clone()),
        _ => {
            let options = matching
                .iter()
                .map(|note| short_id(&note.id))
                .collect::<Vec<_>>()
                .join(", ");

            Err(CliError::AmbiguousNoteId(format!(
                "ID prefix '{note_query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn short_id(id: &NoteId) -> String {
    id.as_str().chars().take(SHORT_ID_LEN).collect()
}

pub fn format_note_lines(notes: &[Note]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    notes
        .iter()
        .map(|note| {
            let short_id = short_id(&note.id);
            let title = truncate_line(&note.title, 40);
            let relative_time = format_relative_time(note.updated_at, now_ms);
            format!("{short_id:<13}  {title:<40}  {relative_time}")
        })
        .collect()
}

pub fn note_to_list_item(note: &Note) -> NoteListItem {
    let now_ms = Utc::now().timestamp_millis();

    NoteListItem {
        id: note.id.to_string(),
        title: note.title.clone(),
        preview: note.preview(80),
        body: note.body.clone(),
        updated_at: note.updated_at,
        relative_time: format_relative_time(note.updated_at, now_ms),
    }
}

pub fn print_notes(notes: &[Note], as_json: bool) -> Result<(), CliError> {
    if as_json {
        let json_items = notes
            .iter()
            .map(note_to_list_item)
            .collect::<Vec<NoteListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else {
        for line in format_note_lines(notes) {
            println!("{line}");
        }
    }
    Ok(())
}

/// First line of `text`, whitespace-collapsed and truncated with an ellipsis.
pub fn truncate_line(text: &str, max_chars: usize) -> String {
    let first_line = text.lines().next().unwrap_or("").trim();
    let collapsed = first_line.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn normalize_title(title: &str) -> Result<String, CliError> {
    normalize_content(title).ok_or(CliError::EmptyTitle)
}

pub fn normalize_search_query(query: &str) -> Result<String, CliError> {
    normalize_content(query).ok_or(CliError::EmptySearchQuery)
}

pub fn normalize_note_identifier(id: &str) -> Result<String, CliError> {
    normalize_content(id).ok_or(CliError::EmptyNoteId)
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}

/// Render a note for editing: title on the first line, body after a blank line.
pub fn note_to_editor_text(note: &Note) -> String {
    if note.body.is_empty() {
        format!("{}\n", note.title)
    } else {
        format!("{}\n\n{}\n", note.title, note.body)
    }
}

/// Inverse of [`note_to_editor_text`].
pub fn parse_editor_text(text: &str) -> Option<(String, String)> {
    let text = normalize_content(text)?;
    let (title, body) = text.split_once('\n').unwrap_or((&text, ""));
    Some((title.trim().to_string(), body.trim().to_string()))
}

pub fn capture_editor_input_with_initial(
    initial_content: &str,
) -> Result<Option<String>, CliError> {
    let editor = preferred_editor();
    let temp_file = create_temp_note_file_path();
    std::fs::write(&temp_file, initial_content)?;

    let launch_result = launch_editor(&editor, &temp_file);
    let note_content = std::fs::read_to_string(&temp_file)?;
    let _ = std::fs::remove_file(&temp_file);

    launch_result?;
    Ok(normalize_content(&note_content))
}

pub fn launch_editor(editor: &str, file_path: &Path) -> Result<(), CliError> {
    match Command::new(editor).arg(file_path).status() {
        Ok(status) => {
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let mut parts = editor.split_whitespace();
            let Some(program) = parts.next() else {
                return Err(CliError::EditorFailed("empty EDITOR command".into()));
            };

            let mut command = Command::new(program);
            command.args(parts).arg(file_path);

            let status = command.status()?;
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) => Err(CliError::Io(err)),
    }
}

pub fn preferred_editor() -> String {
    env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .unwrap_or_else(|_| default_editor().to_string())
}

pub const fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

pub fn create_temp_note_file_path() -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    env::temp_dir().join(format!("memo-note-{}-{now}.md", std::process::id()))
}
