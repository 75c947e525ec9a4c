//! Feeds the runtime's event stream into the repository.
use std::future::Future;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::pool::{self, Pool, PooledConnection};
use crate::repository::{self, Repository};
use crate::runtime::{self, Connection as _, Factory, RawEvent};
use crate::supervisor::Service;

const LOG_TARGET: &str = "docker_graph::listener";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Pool(#[from] pool::Error),
    #[error("runtime event stream failed: {0}")]
    Runtime(#[from] runtime::Error),
    #[error("failed to forward event: {0}")]
    Repository(#[from] repository::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Streams runtime events into a [`Repository`].
///
/// The first run primes the repository with every existing container. The
/// watermark is kept on the listener, so running [`serve`](Listener::serve)
/// again after a failure resumes the stream instead of priming again.
pub struct Listener<F: Factory> {
    pool: Pool<F>,
    repository: Repository,
    watermark: Option<DateTime<Utc>>,
}

impl<F: Factory> Listener<F> {
    pub fn new(pool: Pool<F>, repository: Repository) -> Self {
        Self {
            pool,
            repository,
            watermark: None,
        }
    }

    /// Time of the latest event forwarded so far.
    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        self.watermark
    }

    /// Forwards events until cancelled.
    ///
    /// # Errors
    ///
    /// Fails when the connection cannot be established, the event stream breaks
    /// or ends, or the repository is gone. The connection is not reused after
    /// a stream failure.
    pub async fn serve(&mut self, cancel: CancellationToken) -> Result<()> {
        let mut conn = self.pool.get().await?;

        if self.watermark.is_none() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                res = self.prime(&mut conn) => res?,
            }
        }

        log::info!(target: LOG_TARGET, "listening for events since {:?}", self.watermark);
        let mut events = conn.events(self.watermark);
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                next = events.next() => next,
            };
            let event = match next {
                Some(Ok(event)) => event,
                Some(Err(err)) => {
                    conn.mark_broken();
                    return Err(err.into());
                }
                None => {
                    conn.mark_broken();
                    return Err(runtime::Error::StreamClosed.into());
                }
            };

            let time = event.time;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                res = self.repository.process(event) => res?,
            }
            self.advance(time);
        }
    }

    /// Replays every existing container as a `create` event.
    async fn prime(&mut self, conn: &mut PooledConnection<F>) -> Result<()> {
        let listed = conn.list_containers().await;
        let containers = conn.check(listed)?;
        log::info!(target: LOG_TARGET, "priming with {} container(s)", containers.len());

        let mut watermark = None;
        for summary in containers {
            watermark = watermark.max(Some(summary.created));
            self.repository
                .process(RawEvent::synthetic_create(summary.id, summary.created))
                .await?;
        }
        self.watermark = Some(watermark.unwrap_or_else(Utc::now));
        Ok(())
    }

    fn advance(&mut self, time: DateTime<Utc>) {
        self.watermark = self.watermark.max(Some(time));
    }
}

impl<F: Factory> Service for Listener<F> {
    type Error = Error;

    fn serve(&mut self, cancel: CancellationToken) -> impl Future<Output = Result<()>> + Send {
        Self::serve(self, cancel)
    }
}
