//! Remote session lifecycle.
//!
//! A session is either signed out or syncing for exactly one identity. Every
//! transition bumps a generation counter; asynchronous work started under an
//! older generation (a push whose round trip outlived a sign-out, a stale
//! subscription delivery) checks it before touching local state.

use tokio::task::JoinHandle;

use crate::models::Identity;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    SignedOut,
    Syncing { identity: Identity },
}

#[derive(Debug)]
pub struct SyncSession {
    state: SessionState,
    generation: u64,
    subscription: Option<JoinHandle<()>>,
}

impl Default for SyncSession {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncSession {
    pub const fn new() -> Self {
        Self {
            state: SessionState::SignedOut,
            generation: 0,
            subscription: None,
        }
    }

    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    pub const fn identity(&self) -> Option<&Identity> {
        match &self.state {
            SessionState::SignedOut => None,
            SessionState::Syncing { identity } => Some(identity),
        }
    }

    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether work started under `generation` may still apply its results.
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation && matches!(self.state, SessionState::Syncing { .. })
    }

    /// Identity for `generation`, or `None` once that session has ended.
    pub fn identity_for(&self, generation: u64) -> Option<Identity> {
        if self.is_current(generation) {
            self.identity().cloned()
        } else {
            None
        }
    }

    /// Enter `Syncing` for `identity`, tearing down any previous session.
    /// Returns the new generation.
    pub fn begin(&mut self, identity: Identity) -> u64 {
        self.stop_subscription();
        self.generation += 1;
        tracing::info!(%identity, generation = self.generation, "Sync session started");
        self.state = SessionState::Syncing { identity };
        self.generation
    }

    /// Keep the subscription task for `generation`; aborts it if that
    /// session already ended.
    pub fn attach_subscription(&mut self, generation: u64, task: JoinHandle<()>) {
        if self.is_current(generation) {
            self.stop_subscription();
            self.subscription = Some(task);
        } else {
            task.abort();
        }
    }

    /// Return to `SignedOut`, cancelling the subscription. Returns the
    /// identity that was signed out.
    pub fn end(&mut self) -> Option<Identity> {
        self.stop_subscription();
        let previous = std::mem::replace(&mut self.state, SessionState::SignedOut);
        match previous {
            SessionState::SignedOut => None,
            SessionState::Syncing { identity } => {
                self.generation += 1;
                tracing::info!(%identity, "Sync session ended");
                Some(identity)
            }
        }
    }

    fn stop_subscription(&mut self) {
        if let Some(task) = self.subscription.take() {
            task.abort();
        }
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        self.stop_subscription();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(uid: &str) -> Identity {
        Identity::parse(uid).unwrap()
    }

    #[test]
    fn starts_signed_out() {
        let session = SyncSession::new();
        assert_eq!(session.state(), &SessionState::SignedOut);
        assert!(session.identity().is_none());
        assert!(!session.is_current(session.generation()));
    }

    #[test]
    fn begin_and_end_bump_generation() {
        let mut session = SyncSession::new();
        let generation = session.begin(identity("alice"));
        assert!(session.is_current(generation));
        assert_eq!(session.identity_for(generation), Some(identity("alice")));

        assert_eq!(session.end(), Some(identity("alice")));
        assert!(!session.is_current(generation));
        assert_eq!(session.identity_for(generation), None);
        assert_eq!(session.end(), None);
    }

    #[test]
    fn switching_identity_invalidates_previous_generation() {
        let mut session = SyncSession::new();
        let first = session.begin(identity("alice"));
        let second = session.begin(identity("bob"));
        assert!(!session.is_current(first));
        assert!(session.is_current(second));
        assert_eq!(session.identity(), Some(&identity("bob")));
    }

    #[tokio::test]
    async fn end_aborts_subscription_task() {
        let mut session = SyncSession::new();
        let generation = session.begin(identity("alice"));
        let task = tokio::spawn(std::future::pending::<()>());
        let abort = task.abort_handle();
        session.attach_subscription(generation, task);

        session.end();
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        assert!(abort.is_finished());
    }

    #[tokio::test]
    async fn stale_subscription_is_aborted_on_attach() {
        let mut session = SyncSession::new();
        let stale = session.begin(identity("alice"));
        session.begin(identity("bob"));

        let task = tokio::spawn(std::future::pending::<()>());
        let abort = task.abort_handle();
        session.attach_subscription(stale, task);
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        assert!(abort.is_finished());
    }
}
