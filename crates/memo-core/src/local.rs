//! Durable local persistence of the note collection and tombstone set.
//!
//! The repository stores two independent records. Reading never fails: a
//! missing record is [`RecordState::Absent`], an unreadable or unparsable one
//! is [`RecordState::Corrupt`], and both collapse to an empty collection when
//! the caller asks for a snapshot.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{NoteId, RawNote, Snapshot};

const NOTES_FILE_NAME: &str = "notes.json";
const TOMBSTONES_FILE_NAME: &str = "deleted.json";

/// Outcome of reading one persisted record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordState<T> {
    /// Never written
    Absent,
    /// Present but unreadable or malformed
    Corrupt { reason: String },
    Loaded(T),
}

impl<T: Default> RecordState<T> {
    /// The loaded value, or an empty one for absent/corrupt records.
    pub fn into_value(self) -> T {
        match self {
            Self::Loaded(value) => value,
            Self::Absent | Self::Corrupt { .. } => T::default(),
        }
    }
}

impl<T> RecordState<T> {
    pub const fn is_corrupt(&self) -> bool {
        matches!(self, Self::Corrupt { .. })
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> RecordState<U> {
        match self {
            Self::Absent => RecordState::Absent,
            Self::Corrupt { reason } => RecordState::Corrupt { reason },
            Self::Loaded(value) => RecordState::Loaded(f(value)),
        }
    }
}

/// Both local records as read from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalLoad {
    pub notes: RecordState<Vec<RawNote>>,
    pub tombstones: RecordState<Vec<NoteId>>,
}

impl LocalLoad {
    pub const fn absent() -> Self {
        Self {
            notes: RecordState::Absent,
            tombstones: RecordState::Absent,
        }
    }

    /// Build a snapshot, repairing records without ids and defaulting the
    /// remaining missing fields.
    pub fn into_snapshot(self, now_ms: i64) -> Snapshot {
        if let RecordState::Corrupt { reason } = &self.notes {
            tracing::warn!("Local notes record is corrupt, starting empty: {reason}");
        }
        if let RecordState::Corrupt { reason } = &self.tombstones {
            tracing::warn!("Local tombstone record is corrupt, starting empty: {reason}");
        }

        let notes = self
            .notes
            .into_value()
            .into_iter()
            .map(|raw| raw.into_note_with_fresh_id(now_ms));
        let tombstones = self
            .tombstones
            .into_value()
            .into_iter()
            .filter(|id| !id.as_str().is_empty());
        Snapshot::from_parts(notes, tombstones)
    }
}

/// Local persistence for one device.
#[async_trait]
pub trait LocalRepository: Send + Sync {
    /// Read both records. Never fails; see [`RecordState`].
    async fn load(&self) -> LocalLoad;

    /// Overwrite both records with `snapshot`.
    async fn save(&self, snapshot: &Snapshot) -> Result<()>;
}

/// Stores `notes.json` and `deleted.json` in a directory.
#[derive(Debug, Clone)]
pub struct JsonFileLocalRepository {
    dir: PathBuf,
}

impl JsonFileLocalRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn notes_path(&self) -> PathBuf {
        self.dir.join(NOTES_FILE_NAME)
    }

    fn tombstones_path(&self) -> PathBuf {
        self.dir.join(TOMBSTONES_FILE_NAME)
    }
}

#[async_trait]
impl LocalRepository for JsonFileLocalRepository {
    async fn load(&self) -> LocalLoad {
        let notes = read_array(&self.notes_path()).await.map(|items| {
            items
                .iter()
                .map(RawNote::from_value)
                .collect::<Vec<_>>()
        });
        let tombstones = read_array(&self.tombstones_path()).await.map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(NoteId::from)
                .collect::<Vec<_>>()
        });

        LocalLoad { notes, tombstones }
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|error| local_error(&self.dir, &error))?;

        let notes = serde_json::to_vec(&snapshot.ordered_notes())?;
        write_atomic(&self.notes_path(), &notes).await?;

        let tombstones = serde_json::to_vec(&snapshot.tombstones)?;
        write_atomic(&self.tombstones_path(), &tombstones).await?;

        tracing::debug!(
            notes = snapshot.notes.len(),
            tombstones = snapshot.tombstones.len(),
            "Saved local snapshot to {}",
            self.dir.display()
        );
        Ok(())
    }
}

async fn read_array(path: &Path) -> RecordState<Vec<Value>> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return RecordState::Absent,
        Err(error) => {
            return RecordState::Corrupt {
                reason: format!("failed to read {}: {error}", path.display()),
            }
        }
    };

    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Array(items)) => RecordState::Loaded(items),
        Ok(_) => RecordState::Corrupt {
            reason: format!("{} does not contain a JSON array", path.display()),
        },
        Err(error) => RecordState::Corrupt {
            reason: format!("failed to parse {}: {error}", path.display()),
        },
    }
}

async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, contents)
        .await
        .map_err(|error| local_error(&tmp_path, &error))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|error| local_error(path, &error))
}

fn local_error(path: &Path, error: &std::io::Error) -> Error {
    Error::LocalStore(format!("{}: {error}", path.display()))
}

/// In-memory repository for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryLocalRepository {
    saved: Mutex<Option<Snapshot>>,
    saves: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryLocalRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Repository that starts out holding `snapshot`.
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            saved: Mutex::new(Some(snapshot)),
            ..Self::default()
        }
    }

    /// Last saved snapshot, if any.
    pub fn saved(&self) -> Option<Snapshot> {
        self.saved
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Make subsequent saves fail, simulating a full disk.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl LocalRepository for MemoryLocalRepository {
    async fn load(&self) -> LocalLoad {
        self.saved().map_or_else(LocalLoad::absent, |snapshot| LocalLoad {
            notes: RecordState::Loaded(snapshot.notes.values().map(RawNote::from).collect()),
            tombstones: RecordState::Loaded(snapshot.tombstones.into_iter().collect()),
        })
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::LocalStore("simulated write failure".into()));
        }
        *self
            .saved
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(snapshot.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Note, DEFAULT_TITLE};
    use pretty_assertions::assert_eq;

    fn sample_snapshot() -> Snapshot {
        Snapshot::from_parts(
            [
                Note {
                    id: "a".into(),
                    title: "First".to_string(),
                    body: "one".to_string(),
                    updated_at: 1_000,
                },
                Note {
                    id: "b".into(),
                    title: "Second".to_string(),
                    body: String::new(),
                    updated_at: 2_000,
                },
            ],
            [NoteId::from("gone")],
        )
    }

    #[tokio::test]
    async fn file_repository_round_trips_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonFileLocalRepository::new(dir.path().join("local"));

        repo.save(&sample_snapshot()).await.unwrap();
        let loaded = repo.load().await.into_snapshot(0);
        assert_eq!(loaded, sample_snapshot());
    }

    #[tokio::test]
    async fn file_repository_reports_absent_records() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonFileLocalRepository::new(dir.path());

        let load = repo.load().await;
        assert_eq!(load, LocalLoad::absent());
        assert!(load.into_snapshot(0).is_empty());
    }

    #[tokio::test]
    async fn file_repository_distinguishes_corrupt_records() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(NOTES_FILE_NAME), "{not json").unwrap();
        std::fs::write(dir.path().join(TOMBSTONES_FILE_NAME), r#"{"a": 1}"#).unwrap();
        let repo = JsonFileLocalRepository::new(dir.path());

        let load = repo.load().await;
        assert!(load.notes.is_corrupt());
        assert!(load.tombstones.is_corrupt());
        assert_eq!(load.into_snapshot(0), Snapshot::new());
    }

    #[tokio::test]
    async fn file_repository_repairs_partial_records() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(NOTES_FILE_NAME),
            r#"[{"id": "a"}, {"title": "no id", "updatedAt": "1970-01-01T00:00:01.000Z"}, 42]"#,
        )
        .unwrap();
        std::fs::write(dir.path().join(TOMBSTONES_FILE_NAME), r#"["x", 5, ""]"#).unwrap();
        let repo = JsonFileLocalRepository::new(dir.path());

        let snapshot = repo.load().await.into_snapshot(99);
        assert_eq!(snapshot.len(), 3);
        let a = snapshot.get(&"a".into()).unwrap();
        assert_eq!(a.title, DEFAULT_TITLE);
        assert_eq!(a.updated_at, 99);
        assert!(snapshot.notes.values().any(|note| note.title == "no id"));
        assert_eq!(snapshot.tombstones.len(), 1);
    }

    #[tokio::test]
    async fn file_repository_reports_unwritable_dir_as_local_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();
        let repo = JsonFileLocalRepository::new(&blocker);

        let error = repo.save(&sample_snapshot()).await.unwrap_err();
        assert!(matches!(&error, Error::LocalStore(message) if message.contains("not-a-dir")));
    }

    #[tokio::test]
    async fn memory_repository_can_fail_writes() {
        let repo = MemoryLocalRepository::new();
        repo.set_fail_writes(true);
        assert!(matches!(
            repo.save(&sample_snapshot()).await,
            Err(Error::LocalStore(_))
        ));
        assert_eq!(repo.save_count(), 0);

        repo.set_fail_writes(false);
        repo.save(&sample_snapshot()).await.unwrap();
        assert_eq!(repo.load().await.into_snapshot(0), sample_snapshot());
    }
}
