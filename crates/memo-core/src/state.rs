//! Shared cross-platform state types.

/// Sync status surfaced to clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncStatus {
    /// No identity signed in; changes stay local
    Offline,
    /// A push is scheduled or in flight
    Syncing,
    /// Last push succeeded and nothing is pending
    Synced,
    /// Last push failed; retried on the next change
    Error,
}

impl SyncStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Error => "error",
        }
    }
}
