//! Coalescing timer: bursts of triggers collapse into one deferred action.
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Runs an action once the triggers have been quiet for `delay`.
///
/// Every [`trigger`](Debouncer::trigger) arms the timer, or re-arms it if it is
/// already running. The action runs on a dedicated task and must not touch the
/// owner's state directly; the repository uses it to post a message to its own
/// command queue.
///
/// Dropping the debouncer cancels any pending firing.
#[derive(Debug)]
pub struct Debouncer {
    notify: Arc<Notify>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    _guard: DropGuard,
}

impl Debouncer {
    /// Spawns the timer task. Must be called from within a tokio runtime.
    pub fn new<F, Fut>(delay: Duration, action: F) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let notify = Arc::new(Notify::new());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(delay, Arc::clone(&notify), cancel.clone(), action));

        Self {
            notify,
            _guard: cancel.clone().drop_guard(),
            cancel,
            task,
        }
    }

    /// Arms or re-arms the timer.
    pub fn trigger(&self) {
        self.notify.notify_one();
    }

    /// Cancels any pending firing and waits for the timer task to finish.
    ///
    /// Once this returns the action will not run again. A firing that is already
    /// in progress is cancelled at its next await point.
    pub async fn stop(self) {
        self.cancel.cancel();
        let Self { task, .. } = self;
        if let Err(err) = task.await {
            if err.is_panic() {
                log::error!("debouncer action panicked: {err}");
            }
        }
    }
}

async fn run<F, Fut>(delay: Duration, notify: Arc<Notify>, cancel: CancellationToken, action: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = ()>,
{
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = notify.notified() => {}
        }

        // Quiet period: every trigger restarts the delay.
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = notify.notified() => continue,
                _ = tokio::time::sleep(delay) => break,
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = action() => {}
        }
    }
}
