//! Sync engine configuration.
//!
//! Intervals default to the values the note clients have always shipped
//! with. Clients may override them from a JSON document; unknown keys are
//! rejected so typos surface instead of silently falling back to defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_LOCAL_SAVE_DEBOUNCE_MS: u64 = 350;
const DEFAULT_REMOTE_PUSH_DEBOUNCE_MS: u64 = 900;
const DEFAULT_PENDING_DELETE_RETRY_MS: u64 = 5_000;

/// Timing knobs for the sync engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Quiet period after a mutation before the local snapshot is persisted
    pub local_save_debounce_ms: u64,
    /// Quiet period after a local save before a remote push runs
    pub remote_push_debounce_ms: u64,
    /// Delay before re-pushing after a failed push that left deletes pending.
    /// Zero disables the retry.
    pub pending_delete_retry_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            local_save_debounce_ms: DEFAULT_LOCAL_SAVE_DEBOUNCE_MS,
            remote_push_debounce_ms: DEFAULT_REMOTE_PUSH_DEBOUNCE_MS,
            pending_delete_retry_ms: DEFAULT_PENDING_DELETE_RETRY_MS,
        }
    }
}

impl SyncConfig {
    pub const fn local_save_debounce(&self) -> Duration {
        Duration::from_millis(self.local_save_debounce_ms)
    }

    pub const fn remote_push_debounce(&self) -> Duration {
        Duration::from_millis(self.remote_push_debounce_ms)
    }

    pub const fn pending_delete_retry(&self) -> Option<Duration> {
        if self.pending_delete_retry_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.pending_delete_retry_ms))
        }
    }
}
