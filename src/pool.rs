//! Reuse of runtime connections.
//!
//! A connection is checked out exclusively with [`Pool::get`] and goes back to
//! the pool when the [`PooledConnection`] is dropped. Idle connections are
//! evicted after a period of inactivity by a per-connection timer that only
//! runs while the connection sits in the pool.
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;

use crate::config::PoolConfig;
use crate::runtime::{self, Factory};

const LOG_TARGET: &str = "docker_graph::pool";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to create runtime connection: {0}")]
    Create(#[source] runtime::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

struct IdleEntry<C> {
    conn: C,
    evictor: JoinHandle<()>,
}

struct PoolInner<F: Factory> {
    factory: F,
    idle: DashMap<u64, IdleEntry<F::Conn>>,
    // Idle slots taken, reserved before an insert into `idle`.
    slots: AtomicUsize,
    next_key: AtomicU64,
    max_idle: usize,
    idle_timeout: Duration,
}

/// A pool of runtime connections. Cheap to clone.
pub struct Pool<F: Factory> {
    inner: Arc<PoolInner<F>>,
}

impl<F: Factory> Clone for Pool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: Factory> Pool<F> {
    pub fn new(factory: F, config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                factory,
                idle: DashMap::default(),
                slots: AtomicUsize::new(0),
                next_key: AtomicU64::new(0),
                max_idle: config.max_idle,
                idle_timeout: config.idle_timeout,
            }),
        }
    }

    /// Checks out an idle connection, or creates a new one if none is idle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Create`] if a new connection was needed and could not be
    /// established.
    pub async fn get(&self) -> Result<PooledConnection<F>> {
        if let Some(conn) = self.take_idle() {
            log::debug!(target: LOG_TARGET, "reusing idle connection");
            return Ok(PooledConnection::new(conn, &self.inner));
        }

        let conn = self
            .inner
            .factory
            .create_conn()
            .await
            .map_err(Error::Create)?;
        log::debug!(target: LOG_TARGET, "created new connection");
        Ok(PooledConnection::new(conn, &self.inner))
    }

    /// Number of connections currently waiting in the pool.
    pub fn idle_count(&self) -> usize {
        self.inner.idle.len()
    }

    fn take_idle(&self) -> Option<F::Conn> {
        loop {
            // The shard guard held by the iterator must be released before removing.
            let key = self.inner.idle.iter().next().map(|entry| *entry.key())?;
            if let Some((_, entry)) = self.inner.idle.remove(&key) {
                entry.evictor.abort();
                self.inner.release_slot();
                return Some(entry.conn);
            }
        }
    }
}

impl<F: Factory> PoolInner<F> {
    fn check_in(self: &Arc<Self>, conn: F::Conn) {
        let reserved = self
            .slots
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |taken| {
                (taken < self.max_idle).then_some(taken + 1)
            });
        if reserved.is_err() {
            log::debug!(target: LOG_TARGET, "pool saturated, closing connection");
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            self.release_slot();
            log::debug!(target: LOG_TARGET, "no runtime to evict from, closing connection");
            return;
        };

        let key = self.next_key.fetch_add(1, Ordering::Relaxed);
        let evictor = handle.spawn(evict_after(
            Arc::downgrade(self),
            key,
            self.idle_timeout,
        ));
        self.idle.insert(key, IdleEntry { conn, evictor });
        log::debug!(target: LOG_TARGET, "connection returned to pool ({} idle)", self.idle.len());
    }

    fn release_slot(&self) {
        self.slots.fetch_sub(1, Ordering::AcqRel);
    }
}

async fn evict_after<F: Factory>(pool: Weak<PoolInner<F>>, key: u64, timeout: Duration) {
    tokio::time::sleep(timeout).await;
    let Some(pool) = pool.upgrade() else {
        return;
    };
    if pool.idle.remove(&key).is_some() {
        pool.release_slot();
        log::debug!(target: LOG_TARGET, "evicted idle connection after {timeout:?}");
    }
}

/// A connection checked out of a [`Pool`].
///
/// Dereferences to the underlying connection. Dropping it hands the connection
/// back, unless it was marked broken.
pub struct PooledConnection<F: Factory> {
    // Only `None` while dropping.
    conn: Option<F::Conn>,
    pool: Arc<PoolInner<F>>,
    broken: bool,
}

impl<F: Factory> PooledConnection<F> {
    fn new(conn: F::Conn, pool: &Arc<PoolInner<F>>) -> Self {
        Self {
            conn: Some(conn),
            pool: Arc::clone(pool),
            broken: false,
        }
    }

    /// Makes sure the connection is closed instead of reused.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Passes `result` through, marking the connection broken if it failed in a
    /// way that puts the connection itself in doubt.
    pub fn check<T>(&mut self, result: runtime::Result<T>) -> runtime::Result<T> {
        if let Err(err) = &result {
            if !err.is_benign() {
                log::debug!(target: LOG_TARGET, "discarding connection after error: {err}");
                self.mark_broken();
            }
        }
        result
    }
}

impl<F: Factory> Deref for PooledConnection<F> {
    type Target = F::Conn;

    fn deref(&self) -> &F::Conn {
        self.conn
            .as_ref()
            .expect("pooled connection is present until dropped")
    }
}

impl<F: Factory> Drop for PooledConnection<F> {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        if self.broken {
            log::debug!(target: LOG_TARGET, "closing broken connection");
            return;
        }
        self.pool.check_in(conn);
    }
}
