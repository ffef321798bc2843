//! Remote, per-identity persistence of notes and tombstones.
//!
//! Each identity owns one document with the fields `notes`, `deletedIds` and
//! `lastUpdated`. Writes merge into the document: fields present in the write
//! replace the stored ones, everything else is left untouched. Subscribers
//! get the full record once on subscribe and again after every write.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use crate::error::{Error, Result};
use crate::models::{timestamp, Identity, Note, NoteId, RawNote, Sanitized, Snapshot};

const SUBSCRIPTION_CAPACITY: usize = 16;
const FIELD_NOTES: &str = "notes";
const FIELD_DELETED_IDS: &str = "deletedIds";
const FIELD_LAST_UPDATED: &str = "lastUpdated";

/// The remote document as read back, with lenient field parsing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteRecord {
    pub notes: Vec<RawNote>,
    pub deleted_ids: Vec<NoteId>,
    pub last_updated: Option<i64>,
}

impl RemoteRecord {
    /// Read the known fields of a document, ignoring malformed values.
    pub fn from_document(document: &Map<String, Value>) -> Self {
        let notes = document
            .get(FIELD_NOTES)
            .and_then(Value::as_array)
            .map(|items| items.iter().map(RawNote::from_value).collect())
            .unwrap_or_default();
        let deleted_ids = document
            .get(FIELD_DELETED_IDS)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(NoteId::from)
                    .collect()
            })
            .unwrap_or_default();
        let last_updated = document
            .get(FIELD_LAST_UPDATED)
            .and_then(timestamp::from_value);

        Self {
            notes,
            deleted_ids,
            last_updated,
        }
    }

    /// Convert into a snapshot, dropping notes without ids.
    pub fn into_snapshot(self, now_ms: i64) -> Sanitized {
        let sanitized = Snapshot::from_raw(self.notes, self.deleted_ids, now_ms);
        if sanitized.dropped > 0 {
            tracing::warn!(
                dropped = sanitized.dropped,
                "Dropped remote note records without an id"
            );
        }
        sanitized
    }
}

/// Fields written back to the remote document after a push merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteWrite {
    pub notes: Vec<Note>,
    pub deleted_ids: Vec<NoteId>,
    pub last_updated: i64,
}

impl RemoteWrite {
    pub fn from_snapshot(snapshot: &Snapshot, now_ms: i64) -> Self {
        Self {
            notes: snapshot.ordered_notes(),
            deleted_ids: snapshot.tombstones.iter().cloned().collect(),
            last_updated: now_ms,
        }
    }

    /// Apply this write to a document with set-with-merge semantics.
    pub fn merge_into(&self, document: &mut Map<String, Value>) -> Result<()> {
        document.insert(FIELD_NOTES.to_string(), serde_json::to_value(&self.notes)?);
        document.insert(
            FIELD_DELETED_IDS.to_string(),
            serde_json::to_value(&self.deleted_ids)?,
        );
        document.insert(
            FIELD_LAST_UPDATED.to_string(),
            Value::String(timestamp::to_rfc3339(self.last_updated)),
        );
        Ok(())
    }
}

/// Stream of remote records for one identity.
#[derive(Debug)]
pub struct Subscription {
    initial: Option<RemoteRecord>,
    receiver: broadcast::Receiver<RemoteRecord>,
}

impl Subscription {
    fn new(initial: Option<RemoteRecord>, receiver: broadcast::Receiver<RemoteRecord>) -> Self {
        Self { initial, receiver }
    }

    /// Next delivery, or `None` once the remote side has gone away.
    ///
    /// Every delivery carries the full record, so lagging behind only skips
    /// intermediate states.
    pub async fn next(&mut self) -> Option<RemoteRecord> {
        if let Some(initial) = self.initial.take() {
            return Some(initial);
        }
        loop {
            match self.receiver.recv().await {
                Ok(record) => return Some(record),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Remote subscription lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Remote store for per-identity note documents.
#[async_trait]
pub trait RemoteRepository: Send + Sync {
    /// Current record, or `None` when the document was never created.
    async fn read(&self, identity: &Identity) -> Result<Option<RemoteRecord>>;

    /// Merge the write's fields into the identity's document.
    async fn merge_write(&self, identity: &Identity, write: &RemoteWrite) -> Result<()>;

    /// Subscribe to the identity's document.
    async fn subscribe(&self, identity: &Identity) -> Result<Subscription>;
}

/// Fans out written records to subscribers, per identity.
#[derive(Debug, Default)]
struct SubscriptionHub {
    channels: Mutex<HashMap<Identity, broadcast::Sender<RemoteRecord>>>,
}

impl SubscriptionHub {
    fn receiver(&self, identity: &Identity) -> broadcast::Receiver<RemoteRecord> {
        self.lock()
            .entry(identity.clone())
            .or_insert_with(|| broadcast::channel(SUBSCRIPTION_CAPACITY).0)
            .subscribe()
    }

    fn publish(&self, identity: &Identity, record: RemoteRecord) {
        if let Some(sender) = self.lock().get(identity) {
            // No receivers is fine; nobody is listening right now.
            let _ = sender.send(record);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Identity, broadcast::Sender<RemoteRecord>>> {
        self.channels
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[derive(Debug, Default)]
struct MemoryRemoteInner {
    documents: Mutex<HashMap<Identity, Map<String, Value>>>,
    hub: SubscriptionHub,
    fail: AtomicBool,
    write_delay: Mutex<Option<Duration>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

/// Shared in-process remote. Clones share the same documents, so two
/// engines holding clones behave like two devices on one account.
#[derive(Debug, Clone, Default)]
pub struct MemoryRemoteRepository {
    inner: Arc<MemoryRemoteInner>,
}

impl MemoryRemoteRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail, simulating a network outage.
    pub fn set_offline(&self, offline: bool) {
        self.inner.fail.store(offline, Ordering::SeqCst);
    }

    /// Hold each write for `delay` before committing it.
    pub fn set_write_delay(&self, delay: Option<Duration>) {
        *self
            .inner
            .write_delay
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = delay;
    }

    pub fn read_count(&self) -> usize {
        self.inner.reads.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.inner.writes.load(Ordering::SeqCst)
    }

    /// Raw stored document, for assertions.
    pub fn document(&self, identity: &Identity) -> Option<Map<String, Value>> {
        self.documents().get(identity).cloned()
    }

    /// Replace a stored document wholesale, bypassing merge semantics.
    pub fn put_document(&self, identity: &Identity, document: Map<String, Value>) {
        let record = RemoteRecord::from_document(&document);
        self.documents().insert(identity.clone(), document);
        self.inner.hub.publish(identity, record);
    }

    fn documents(&self) -> std::sync::MutexGuard<'_, HashMap<Identity, Map<String, Value>>> {
        self.inner
            .documents
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn check_online(&self) -> Result<()> {
        if self.inner.fail.load(Ordering::SeqCst) {
            Err(Error::Remote("remote store unreachable".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteRepository for MemoryRemoteRepository {
    async fn read(&self, identity: &Identity) -> Result<Option<RemoteRecord>> {
        self.check_online()?;
        self.inner.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .documents()
            .get(identity)
            .map(RemoteRecord::from_document))
    }

    async fn merge_write(&self, identity: &Identity, write: &RemoteWrite) -> Result<()> {
        self.check_online()?;
        let delay = *self
            .inner
            .write_delay
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
            self.check_online()?;
        }

        let record = {
            let mut documents = self.documents();
            let document = documents.entry(identity.clone()).or_default();
            write.merge_into(document)?;
            RemoteRecord::from_document(document)
        };
        self.inner.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.hub.publish(identity, record);
        Ok(())
    }

    async fn subscribe(&self, identity: &Identity) -> Result<Subscription> {
        self.check_online()?;
        let receiver = self.inner.hub.receiver(identity);
        let initial = self
            .documents()
            .get(identity)
            .map(RemoteRecord::from_document);
        Ok(Subscription::new(initial, receiver))
    }
}

/// Remote backed by a directory of `users/<identity>.json` documents,
/// typically on a shared or synced volume.
///
/// Subscribers are notified of writes made through this repository handle.
#[derive(Debug, Clone)]
pub struct FileRemoteRepository {
    root: PathBuf,
    hub: Arc<SubscriptionHub>,
    write_lock: Arc<tokio::sync::Mutex<()>>,
}

impl FileRemoteRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            hub: Arc::default(),
            write_lock: Arc::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn document_path(&self, identity: &Identity) -> PathBuf {
        self.root
            .join("users")
            .join(format!("{}.json", identity.as_str()))
    }

    async fn read_document(&self, identity: &Identity) -> Result<Option<Map<String, Value>>> {
        let path = self.document_path(identity);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => {
                return Err(Error::Remote(format!(
                    "failed to read {}: {error}",
                    path.display()
                )))
            }
        };

        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(document)) => Ok(Some(document)),
            Ok(_) => Err(Error::Remote(format!(
                "{} is not a JSON object",
                path.display()
            ))),
            Err(error) => Err(Error::Remote(format!(
                "failed to parse {}: {error}",
                path.display()
            ))),
        }
    }
}

#[async_trait]
impl RemoteRepository for FileRemoteRepository {
    async fn read(&self, identity: &Identity) -> Result<Option<RemoteRecord>> {
        Ok(self
            .read_document(identity)
            .await?
            .as_ref()
            .map(RemoteRecord::from_document))
    }

    async fn merge_write(&self, identity: &Identity, write: &RemoteWrite) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.read_document(identity).await?.unwrap_or_default();
        write.merge_into(&mut document)?;

        let path = self.document_path(identity);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|error| Error::Remote(format!("{}: {error}", parent.display())))?;
        }
        let tmp_path = path.with_extension("json.tmp");
        let contents = serde_json::to_vec_pretty(&document)?;
        tokio::fs::write(&tmp_path, contents)
            .await
            .map_err(|error| Error::Remote(format!("{}: {error}", tmp_path.display())))?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|error| Error::Remote(format!("{}: {error}", path.display())))?;

        self.hub
            .publish(identity, RemoteRecord::from_document(&document));
        Ok(())
    }

    async fn subscribe(&self, identity: &Identity) -> Result<Subscription> {
        let receiver = self.hub.receiver(identity);
        let initial = self
            .read_document(identity)
            .await?
            .as_ref()
            .map(RemoteRecord::from_document);
        Ok(Subscription::new(initial, receiver))
    }
}
