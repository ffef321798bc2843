//! Debounced task scheduling.
//!
//! A [`Debouncer`] runs at most one pending task: scheduling again before the
//! quiet period elapses replaces the pending task (trailing edge). Once a task
//! has fired it is detached from the debouncer, so cancelling or rescheduling
//! never interrupts work that is already under way.

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::config::SyncConfig;

/// Cancel handle for a scheduled task that has not fired yet.
#[derive(Debug)]
pub struct TaskHandle {
    generation: u64,
    join: Option<JoinHandle<()>>,
}

impl TaskHandle {
    /// Abort the task if it is still waiting out its delay.
    pub fn cancel(self) {
        if let Some(join) = self.join {
            join.abort();
        }
    }
}

#[derive(Debug, Default)]
struct DebouncerState {
    pending: Mutex<Option<TaskHandle>>,
    generation: AtomicU64,
    running: AtomicUsize,
    /// Signalled whenever this debouncer may have become idle
    settled: Arc<Notify>,
}

impl DebouncerState {
    fn pending(&self) -> MutexGuard<'_, Option<TaskHandle>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Decrements the running count even when the task is aborted mid-flight.
struct RunningGuard(Arc<DebouncerState>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.running.fetch_sub(1, Ordering::SeqCst);
        self.0.settled.notify_waiters();
    }
}

/// Trailing-edge debouncer over tokio timers.
#[derive(Debug, Clone)]
pub struct Debouncer {
    name: &'static str,
    delay: Duration,
    state: Arc<DebouncerState>,
}

impl Debouncer {
    pub fn new(name: &'static str, delay: Duration) -> Self {
        Self::with_signal(name, delay, Arc::default())
    }

    /// Debouncer that wakes `settled` waiters when it may have gone idle.
    pub fn with_signal(name: &'static str, delay: Duration, settled: Arc<Notify>) -> Self {
        Self {
            name,
            delay,
            state: Arc::new(DebouncerState {
                settled,
                ..DebouncerState::default()
            }),
        }
    }

    /// Run `task` after the default quiet period, replacing any pending task.
    pub fn schedule<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.schedule_after(self.delay, task);
    }

    /// Run `task` after `delay`, replacing any pending task.
    pub fn schedule_after<F>(&self, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let generation = self.state.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let replaced = self.state.pending().replace(TaskHandle {
            generation,
            join: None,
        });
        if let Some(replaced) = replaced {
            replaced.cancel();
        }

        let deadline = tokio::time::Instant::now() + delay;
        let state = Arc::clone(&self.state);
        let name = self.name;
        let join = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            {
                let mut pending = state.pending();
                match pending.as_ref() {
                    Some(handle) if handle.generation == generation => {
                        *pending = None;
                    }
                    _ => return,
                }
                state.running.fetch_add(1, Ordering::SeqCst);
            }
            let _running = RunningGuard(Arc::clone(&state));
            tracing::debug!(task = name, "Debounced task fired");
            task.await;
        });

        let mut pending = self.state.pending();
        match pending.as_mut() {
            Some(handle) if handle.generation == generation => handle.join = Some(join),
            // Already fired; leave it running.
            _ => {}
        }
    }

    /// Cancel the pending task, if any. Returns whether one was cancelled.
    pub fn cancel(&self) -> bool {
        let cancelled = self.state.pending().take();
        let cancelled = cancelled.is_some_and(|handle| {
            handle.cancel();
            tracing::debug!(task = self.name, "Debounced task cancelled");
            true
        });
        if cancelled {
            self.state.settled.notify_waiters();
        }
        cancelled
    }

    pub fn is_pending(&self) -> bool {
        self.state.pending().is_some()
    }

    /// Whether a fired task is still running.
    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst) > 0
    }

    pub fn is_idle(&self) -> bool {
        !self.is_pending() && !self.is_running()
    }
}

/// The two debounced tasks of the sync pipeline: local save, then remote push.
#[derive(Debug, Clone)]
pub struct SyncScheduler {
    local_save: Debouncer,
    remote_push: Debouncer,
    pending_delete_retry: Option<Duration>,
    settled: Arc<Notify>,
}

impl SyncScheduler {
    pub fn new(config: &SyncConfig) -> Self {
        let settled = Arc::new(Notify::new());
        Self {
            local_save: Debouncer::with_signal(
                "local-save",
                config.local_save_debounce(),
                Arc::clone(&settled),
            ),
            remote_push: Debouncer::with_signal(
                "remote-push",
                config.remote_push_debounce(),
                Arc::clone(&settled),
            ),
            pending_delete_retry: config.pending_delete_retry(),
            settled,
        }
    }

    pub fn schedule_local_save<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.local_save.schedule(task);
    }

    pub fn schedule_remote_push<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.remote_push.schedule(task);
    }

    /// Re-arm the push after a failure that left deletes pending.
    /// Returns false when the retry is disabled.
    pub fn schedule_pending_delete_retry<F>(&self, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Some(delay) = self.pending_delete_retry else {
            return false;
        };
        self.remote_push.schedule_after(delay, task);
        true
    }

    pub fn cancel_local_save(&self) -> bool {
        self.local_save.cancel()
    }

    pub fn cancel_remote_push(&self) -> bool {
        self.remote_push.cancel()
    }

    pub fn is_push_pending(&self) -> bool {
        !self.remote_push.is_idle()
    }

    pub fn is_idle(&self) -> bool {
        self.local_save.is_idle() && self.remote_push.is_idle()
    }

    /// Resolve once neither debouncer has a pending or running task.
    pub async fn wait_idle(&self) {
        loop {
            let settled = self.settled.notified();
            tokio::pin!(settled);
            // Register before checking so a wakeup between the two is not lost.
            settled.as_mut().enable();
            if self.is_idle() {
                return;
            }
            settled.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    fn bump(count: &Arc<AtomicUsize>) -> impl Future<Output = ()> + Send + 'static {
        let count = Arc::clone(count);
        async move {
            count.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_quiet_period() {
        let debouncer = Debouncer::new("test", Duration::from_millis(100));
        let count = counter();

        debouncer.schedule(bump(&count));
        tokio::time::advance(Duration::from_millis(99)).await;
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(debouncer.is_pending());

        tokio::time::advance(Duration::from_millis(1)).await;
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(debouncer.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn bursts_collapse_into_one_run() {
        let debouncer = Debouncer::new("test", Duration::from_millis(100));
        let count = counter();

        for _ in 0..5 {
            debouncer.schedule(bump(&count));
            tokio::time::advance(Duration::from_millis(60)).await;
            settle().await;
        }
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_millis(100)).await;
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_pending_run() {
        let debouncer = Debouncer::new("test", Duration::from_millis(100));
        let count = counter();

        debouncer.schedule(bump(&count));
        assert!(debouncer.cancel());
        assert!(!debouncer.cancel());

        tokio::time::advance(Duration::from_millis(500)).await;
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_does_not_interrupt_running_task() {
        let debouncer = Debouncer::new("test", Duration::from_millis(10));
        let count = counter();
        let task_count = Arc::clone(&count);

        debouncer.schedule(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            task_count.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::advance(Duration::from_millis(10)).await;
        settle().await;
        assert!(debouncer.is_running());
        assert!(!debouncer.cancel());

        tokio::time::advance(Duration::from_millis(100)).await;
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(debouncer.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn pending_delete_retry_respects_config() {
        let disabled = SyncScheduler::new(&SyncConfig {
            pending_delete_retry_ms: 0,
            ..SyncConfig::default()
        });
        assert!(!disabled.schedule_pending_delete_retry(async {}));
        assert!(disabled.is_idle());

        let enabled = SyncScheduler::new(&SyncConfig::default());
        let count = counter();
        assert!(enabled.schedule_pending_delete_retry(bump(&count)));
        assert!(enabled.is_push_pending());

        tokio::time::advance(Duration::from_millis(4_999)).await;
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        tokio::time::advance(Duration::from_millis(1)).await;
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_idle_resolves_after_chained_tasks() {
        let scheduler = SyncScheduler::new(&SyncConfig::default());
        let count = counter();
        let push = scheduler.clone();
        let push_count = Arc::clone(&count);
        scheduler.schedule_local_save(async move {
            push.schedule_remote_push(bump(&push_count));
        });

        scheduler.wait_idle().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(scheduler.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_idle_resolves_when_pending_task_is_cancelled() {
        let scheduler = SyncScheduler::new(&SyncConfig::default());
        let count = counter();
        scheduler.schedule_remote_push(bump(&count));

        let waiter = scheduler.clone();
        let idle = tokio::spawn(async move { waiter.wait_idle().await });
        settle().await;
        assert!(!idle.is_finished());

        assert!(scheduler.cancel_remote_push());
        idle.await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
