use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::{Error, Result};

type Command<T> = Box<dyn FnOnce(&mut T) + Send>;

/// Handle to a value owned by a single task.
///
/// Every read and read-modify-write of the value runs as a command on the
/// owning [`AgentService`] loop, one at a time, so no lock is involved.
/// Handles are cheap to clone.
#[derive(Debug)]
pub struct Agent<T> {
    commands: mpsc::UnboundedSender<Command<T>>,
}

impl<T> Clone for Agent<T> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
        }
    }
}

/// The loop that owns the value. Run it with [`AgentService::serve`].
pub struct AgentService<T> {
    value: T,
    commands: mpsc::UnboundedReceiver<Command<T>>,
}

impl<T: Send + 'static> Agent<T> {
    pub fn new(value: T) -> (Self, AgentService<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { commands: tx }, AgentService { value, commands: rx })
    }

    /// Runs `update` against the value on the agent loop and returns its result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] if the agent loop is no longer running.
    pub async fn update<R, F>(&self, update: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut T) -> R + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.post(move |value| {
            let _ = tx.send(update(value));
        })?;
        rx.await.map_err(|_| Error::Closed)
    }

    /// Returns a copy of the current value.
    pub async fn get(&self) -> Result<T>
    where
        T: Clone,
    {
        self.update(|value| value.clone()).await
    }

    /// Queues `update` without waiting for it to run.
    ///
    /// Never blocks, so it is usable from `Drop`.
    pub fn post<F>(&self, update: F) -> Result<()>
    where
        F: FnOnce(&mut T) + Send + 'static,
    {
        self.commands
            .send(Box::new(update))
            .map_err(|_| Error::Closed)
    }
}

impl<T> AgentService<T> {
    /// Executes commands until cancelled or until every handle is dropped.
    pub async fn serve(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => cmd(&mut self.value),
                    None => return,
                },
            }
        }
    }
}
