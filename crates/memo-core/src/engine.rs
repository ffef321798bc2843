//! Sync engine wiring the note store to local and remote persistence.
//!
//! Data flow:
//!
//! - a mutation updates the [`NoteStore`] synchronously, then schedules a
//!   debounced local save;
//! - a successful local save schedules a debounced remote push, but only
//!   while an identity is signed in;
//! - a push reads the remote record, push-merges the local snapshot into it,
//!   writes the result back and clears acknowledged tombstones;
//! - every remote subscription delivery is pull-merged into the store and
//!   saved locally.
//!
//! Merges only ever see committed store snapshots, never an editor's
//! unsaved input.

use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Mutex as AsyncMutex;

use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::error::Result;
use crate::export::{render_notes_export, ExportFormat};
use crate::import::{apply_import, parse_import, ImportReport};
use crate::local::LocalRepository;
use crate::merge::{merge_directed, MergeDirection, MergeReport};
use crate::models::{Identity, Note, NoteId, Snapshot};
use crate::remote::{RemoteRecord, RemoteRepository, RemoteWrite, Subscription};
use crate::scheduler::SyncScheduler;
use crate::session::SyncSession;
use crate::state::SyncStatus;
use crate::store::NoteStore;

type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

struct EngineInner {
    store: AsyncMutex<NoteStore>,
    local: Arc<dyn LocalRepository>,
    remote: Arc<dyn RemoteRepository>,
    scheduler: SyncScheduler,
    session: Mutex<SyncSession>,
    /// Tombstones last seen in the remote record
    remote_tombstones: Mutex<BTreeSet<NoteId>>,
    push_status: Mutex<SyncStatus>,
    last_save_error: Mutex<Option<String>>,
}

/// Offline-first note engine for one device.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("identity", &self.identity())
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    /// Load the local snapshot and build an engine around it.
    pub async fn open(
        local: Arc<dyn LocalRepository>,
        remote: Arc<dyn RemoteRepository>,
        clock: Arc<dyn Clock>,
        config: SyncConfig,
    ) -> Self {
        let snapshot = local.load().await.into_snapshot(clock.now_ms());
        tracing::info!(
            notes = snapshot.len(),
            tombstones = snapshot.tombstones.len(),
            "Loaded local notes"
        );
        Self::with_store(NoteStore::with_snapshot(snapshot, clock), local, remote, config)
    }

    pub fn with_store(
        store: NoteStore,
        local: Arc<dyn LocalRepository>,
        remote: Arc<dyn RemoteRepository>,
        config: SyncConfig,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                store: AsyncMutex::new(store),
                local,
                remote,
                scheduler: SyncScheduler::new(&config),
                session: Mutex::new(SyncSession::new()),
                remote_tombstones: Mutex::default(),
                push_status: Mutex::new(SyncStatus::Synced),
                last_save_error: Mutex::default(),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Notes newest first.
    pub async fn notes(&self) -> Vec<Note> {
        self.inner.store.lock().await.notes()
    }

    pub async fn search(&self, query: &str) -> Vec<Note> {
        self.inner.store.lock().await.search(query)
    }

    pub async fn get(&self, id: &NoteId) -> Option<Note> {
        self.inner.store.lock().await.get(id).cloned()
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.inner.store.lock().await.snapshot().clone()
    }

    /// Local deletions the remote store has not acknowledged yet.
    pub async fn pending_deletes(&self) -> BTreeSet<NoteId> {
        let tombstones = self.inner.store.lock().await.tombstones().clone();
        let acknowledged = lock(&self.inner.remote_tombstones);
        tombstones
            .into_iter()
            .filter(|id| !acknowledged.contains(id))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    pub async fn create_note(&self) -> Note {
        let note = self.inner.store.lock().await.create_note();
        self.inner.schedule_local_save();
        note
    }

    pub async fn create_note_with(&self, title: &str, body: &str) -> Note {
        let note = self.inner.store.lock().await.create_note_with(title, body);
        self.inner.schedule_local_save();
        note
    }

    /// Update a note; unknown ids are ignored and return `None`.
    pub async fn update_note(&self, id: &NoteId, title: &str, body: &str) -> Option<Note> {
        let updated = self.inner.store.lock().await.update_note(id, title, body);
        if updated.is_some() {
            self.inner.schedule_local_save();
        }
        updated
    }

    /// Delete a note; unknown ids are ignored and return `false`.
    pub async fn delete_note(&self, id: &NoteId) -> bool {
        let deleted = self.inner.store.lock().await.delete_note(id);
        if deleted {
            self.inner.schedule_local_save();
        }
        deleted
    }

    /// Merge an import payload into the store. Malformed payloads change nothing.
    pub async fn import_json(&self, payload: &str) -> Result<ImportReport> {
        let report = {
            let mut store = self.inner.store.lock().await;
            let imported = parse_import(payload, store.now_ms())?;
            let (merged, report) = apply_import(store.snapshot(), imported);
            store.replace(merged);
            report
        };
        tracing::info!(
            added = report.added,
            updated = report.updated,
            "Imported notes"
        );
        self.inner.schedule_local_save();
        Ok(report)
    }

    /// Render the current notes, newest first.
    pub async fn export(&self, format: ExportFormat) -> Result<String> {
        let notes = self.notes().await;
        Ok(render_notes_export(&notes, format)?)
    }

    // -----------------------------------------------------------------------
    // Session
    // -----------------------------------------------------------------------

    pub fn identity(&self) -> Option<Identity> {
        lock(&self.inner.session).identity().cloned()
    }

    pub fn status(&self) -> SyncStatus {
        if self.identity().is_none() {
            return SyncStatus::Offline;
        }
        if self.inner.scheduler.is_push_pending() {
            return SyncStatus::Syncing;
        }
        *lock(&self.inner.push_status)
    }

    /// Error from the most recent failed local save, cleared on success.
    pub fn last_save_error(&self) -> Option<String> {
        lock(&self.inner.last_save_error).clone()
    }

    /// Start syncing for `identity`: subscribe to remote changes, pull the
    /// current remote record (or seed it when absent), then schedule a push
    /// for changes made while offline.
    ///
    /// Remote failures are logged; the session stays up and later pushes
    /// retry.
    pub async fn sign_in(&self, identity: Identity) {
        if self.identity().as_ref() == Some(&identity) {
            return;
        }
        self.inner.scheduler.cancel_remote_push();
        let generation = lock(&self.inner.session).begin(identity.clone());
        lock(&self.inner.remote_tombstones).clear();

        match self.inner.remote.subscribe(&identity).await {
            Ok(subscription) => {
                let task = tokio::spawn(
                    Arc::clone(&self.inner).run_subscription(generation, subscription),
                );
                lock(&self.inner.session).attach_subscription(generation, task);
            }
            Err(error) => tracing::warn!("Failed to subscribe to remote changes: {error}"),
        }

        match self.inner.remote.read(&identity).await {
            Ok(Some(record)) => {
                if let Err(error) = self.inner.apply_remote(generation, record).await {
                    tracing::warn!("Initial pull could not be saved locally: {error}");
                }
            }
            Ok(None) => {
                tracing::info!(%identity, "No remote record yet, seeding from local notes");
                if let Err(error) = self.inner.push_now(generation).await {
                    tracing::debug!("Seeding push failed; scheduled push will retry: {error}");
                }
            }
            Err(error) => tracing::warn!("Initial pull failed: {error}"),
        }

        self.inner.schedule_push();
    }

    /// Stop syncing. Local notes stay untouched and usable offline.
    pub fn sign_out(&self) {
        self.inner.scheduler.cancel_remote_push();
        lock(&self.inner.remote_tombstones).clear();
        if let Some(identity) = lock(&self.inner.session).end() {
            tracing::info!(%identity, "Signed out; continuing offline");
        }
    }

    // -----------------------------------------------------------------------
    // Explicit sync
    // -----------------------------------------------------------------------

    /// Save locally and, when signed in, push right away instead of waiting
    /// for the debounce timers. Unlike scheduled pushes, failures are
    /// returned to the caller.
    pub async fn flush(&self) -> Result<()> {
        self.inner.scheduler.cancel_local_save();
        self.inner.save_local().await?;

        if let Some(generation) = self.inner.current_generation() {
            self.inner.scheduler.cancel_remote_push();
            self.inner.push_now(generation).await?;
        }
        Ok(())
    }

    /// Pull the remote record now. Returns whether local notes changed.
    pub async fn pull_now(&self) -> Result<bool> {
        let Some(generation) = self.inner.current_generation() else {
            return Ok(false);
        };
        let Some(identity) = self.identity() else {
            return Ok(false);
        };
        match self.inner.remote.read(&identity).await? {
            Some(record) => self.inner.apply_remote(generation, record).await,
            None => Ok(false),
        }
    }

    /// Wait until no save or push is pending or running.
    pub async fn wait_idle(&self) {
        self.inner.scheduler.wait_idle().await;
    }
}

impl EngineInner {
    fn current_generation(&self) -> Option<u64> {
        let session = lock(&self.session);
        session.identity().map(|_| session.generation())
    }

    fn is_current(&self, generation: u64) -> bool {
        lock(&self.session).is_current(generation)
    }

    fn set_push_status(&self, status: SyncStatus) {
        *lock(&self.push_status) = status;
    }

    fn schedule_local_save(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        self.scheduler.schedule_local_save(async move {
            if inner.save_local().await.is_ok() {
                inner.schedule_push();
            }
        });
    }

    fn schedule_push(self: &Arc<Self>) {
        let Some(generation) = self.current_generation() else {
            tracing::debug!("Signed out; change stays local");
            return;
        };
        self.scheduler
            .schedule_remote_push(self.push_task(generation));
    }

    /// Scheduled push; re-arms itself while deletes remain unacknowledged.
    fn push_task(self: &Arc<Self>, generation: u64) -> BoxedTask {
        let inner = Arc::clone(self);
        Box::pin(async move {
            if inner.push_now(generation).await.is_ok() || !inner.is_current(generation) {
                return;
            }
            if inner.has_pending_deletes().await {
                let retry = inner.push_task(generation);
                if inner.scheduler.schedule_pending_delete_retry(retry) {
                    tracing::info!("Pending deletes not acknowledged; push retry scheduled");
                }
            }
        })
    }

    async fn has_pending_deletes(&self) -> bool {
        let tombstones = self.store.lock().await.tombstones().clone();
        let acknowledged = lock(&self.remote_tombstones);
        tombstones.iter().any(|id| !acknowledged.contains(id))
    }

    async fn save_local(&self) -> Result<()> {
        let snapshot = self.store.lock().await.snapshot().clone();
        match self.local.save(&snapshot).await {
            Ok(()) => {
                *lock(&self.last_save_error) = None;
                Ok(())
            }
            Err(error) => {
                tracing::error!("Failed to save notes locally: {error}");
                *lock(&self.last_save_error) = Some(error.to_string());
                Err(error)
            }
        }
    }

    async fn push_now(&self, generation: u64) -> Result<usize> {
        match self.push_cycle(generation).await {
            Ok(pushed) => Ok(pushed),
            Err(error) => {
                tracing::warn!("Remote push failed: {error}");
                if self.is_current(generation) {
                    self.set_push_status(SyncStatus::Error);
                }
                Err(error)
            }
        }
    }

    /// Read, push-merge, write back, then clear acknowledged tombstones.
    async fn push_cycle(&self, generation: u64) -> Result<usize> {
        let Some(identity) = lock(&self.session).identity_for(generation) else {
            return Ok(0);
        };

        let remote_record = self.remote.read(&identity).await?;
        let (local, now) = {
            let store = self.store.lock().await;
            (store.snapshot().clone(), store.now_ms())
        };
        let remote = remote_record
            .map(|record| record.into_snapshot(now).snapshot)
            .unwrap_or_default();

        let (merged, report) = merge_directed(MergeDirection::Push, &local, &remote);
        let write = RemoteWrite::from_snapshot(&merged, now);
        self.remote.merge_write(&identity, &write).await?;

        if !self.is_current(generation) {
            tracing::info!(%identity, "Session ended during push; result not applied");
            return Ok(0);
        }

        lock(&self.remote_tombstones).clone_from(&merged.tombstones);
        let cleared = self.store.lock().await.clear_tombstones(&merged.tombstones);
        if cleared > 0 {
            // Acknowledged deletes no longer need to be kept locally.
            if let Err(error) = self.save_local().await {
                tracing::debug!("Tombstones stay on disk until the next save: {error}");
            }
        }
        self.set_push_status(SyncStatus::Synced);

        log_merge(MergeDirection::Push, &report);
        tracing::info!(
            %identity,
            notes = merged.len(),
            cleared,
            "Pushed merged notes to remote"
        );
        Ok(merged.len())
    }

    /// Pull-merge a remote record into the store and persist the result.
    async fn apply_remote(&self, generation: u64, record: RemoteRecord) -> Result<bool> {
        let (changed, report) = {
            let mut store = self.store.lock().await;
            if !self.is_current(generation) {
                return Ok(false);
            }
            let remote = record.into_snapshot(store.now_ms()).snapshot;
            let (merged, report) = merge_directed(MergeDirection::Pull, store.snapshot(), &remote);
            lock(&self.remote_tombstones).clone_from(&remote.tombstones);

            let changed = merged != *store.snapshot();
            store.replace(merged);
            (changed, report)
        };

        if !changed {
            return Ok(false);
        }
        log_merge(MergeDirection::Pull, &report);
        self.save_local().await?;
        Ok(true)
    }

    async fn run_subscription(self: Arc<Self>, generation: u64, mut subscription: Subscription) {
        while let Some(record) = subscription.next().await {
            if !self.is_current(generation) {
                break;
            }
            if let Err(error) = self.apply_remote(generation, record).await {
                tracing::warn!("Failed to apply remote change: {error}");
            }
        }
        tracing::debug!(generation, "Remote subscription closed");
    }
}

fn log_merge(direction: MergeDirection, report: &MergeReport) {
    if report.is_noop() {
        return;
    }
    tracing::debug!(
        direction = direction.label(),
        added = report.added,
        updated = report.updated,
        removed = report.removed,
        "Merged snapshots"
    );
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
