//! Connection pool implementation

use std::collections::{HashMap, VecDeque};
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use quarry_core::{Connection, QuarryError, Result};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::config::PoolConfig;
use super::entry::{ConnectionId, PoolEntry, Reservation};
use super::maintenance::{self, SweepReport};
use super::stats::PoolStats;
use crate::factory::ConnectionFactory;

/// Everything guarded by the pool lock
pub(crate) struct PoolState {
    /// Back is the most recently released entry
    pub(crate) idle: VecDeque<PoolEntry>,
    pub(crate) in_use: HashMap<ConnectionId, PoolEntry>,
    /// Slots reserved for connections being opened or probed outside the lock
    pub(crate) pending: usize,
    /// The part of `pending` held by idle entries a sweep is probing
    pub(crate) probing: usize,
    pub(crate) closed: bool,
}

impl PoolState {
    pub(crate) fn total(&self) -> usize {
        self.idle.len() + self.in_use.len() + self.pending
    }
}

pub(crate) struct PoolInner {
    pub(crate) config: PoolConfig,
    pub(crate) factory: Arc<dyn ConnectionFactory>,
    pub(crate) state: Mutex<PoolState>,
    /// Signalled whenever capacity may have been freed
    pub(crate) released: Notify,
    /// Set once a connection has been created or probed successfully;
    /// cleared by the first failure
    pub(crate) healthy: AtomicBool,
    pub(crate) cancel: CancellationToken,
    maintenance: Mutex<Option<JoinHandle<()>>>,
    next_id: AtomicU64,
    waiting: AtomicUsize,
}

impl PoolInner {
    pub(crate) fn next_id(&self) -> ConnectionId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Open one connection into `idle` if the pool holds fewer than `floor`.
    ///
    /// Returns `Ok(None)` when no connection was needed.
    pub(crate) async fn open_idle(&self, floor: usize) -> Result<Option<ConnectionId>> {
        let reservation = {
            let mut state = self.state.lock();
            if state.closed || state.total() >= floor.min(self.config.max_size()) {
                return Ok(None);
            }
            state.pending += 1;
            Reservation::holding(self, 1)
        };

        let connection = match self.factory.create().await {
            Ok(connection) => connection,
            Err(e) => {
                self.healthy.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };
        self.healthy.store(true, Ordering::SeqCst);

        let id = self.next_id();
        let entry = PoolEntry::new(id, connection);
        let rejected = reservation.settle(|state| {
            if state.closed {
                Some(entry)
            } else {
                state.idle.push_back(entry);
                None
            }
        });

        match rejected {
            Some(entry) => {
                let _ = entry.connection.close().await;
                Ok(None)
            }
            None => Ok(Some(id)),
        }
    }

    /// Check a connection back in.
    ///
    /// `shutdown` empties `in_use` under the same lock that sets `closed`,
    /// and `pending` keeps idle + in_use within `max_size`, so any entry
    /// still tracked here goes straight back to `idle`.
    fn check_in(&self, id: ConnectionId) {
        {
            let mut state = self.state.lock();
            let Some(mut entry) = state.in_use.remove(&id) else {
                tracing::trace!(connection_id = id, "release of unknown connection ignored");
                return;
            };

            if entry.connection.is_closed() {
                tracing::debug!(connection_id = id, "dropping connection closed by caller");
            } else {
                entry.touch();
                state.idle.push_back(entry);
            }
        }
        self.released.notify_waiters();
    }
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

enum Checkout {
    Reused(ConnectionId, Arc<dyn Connection>),
    Create,
    /// Every free slot is an idle entry out for a liveness probe
    Probing,
}

/// A bounded pool of engine connections
///
/// Cloning is cheap: every clone shares the same pool. All mutations of the
/// idle and in-use collections happen under one lock that is never held
/// across an `.await`.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Create a pool, open `min_size` connections, and start maintenance.
    ///
    /// Creation failures during warm-up are logged and skipped so the pool
    /// can start degraded; the maintenance loop fills the gap later.
    pub async fn new<F: ConnectionFactory>(config: PoolConfig, factory: F) -> Self {
        let inner = Arc::new(PoolInner {
            state: Mutex::new(PoolState {
                idle: VecDeque::with_capacity(config.max_size()),
                in_use: HashMap::with_capacity(config.max_size()),
                pending: 0,
                probing: 0,
                closed: false,
            }),
            config,
            factory: Arc::new(factory),
            released: Notify::new(),
            healthy: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            maintenance: Mutex::new(None),
            next_id: AtomicU64::new(1),
            waiting: AtomicUsize::new(0),
        });

        let min_size = inner.config.min_size();
        let mut opened = 0;
        for attempt in 1..=min_size {
            match inner.open_idle(min_size).await {
                Ok(Some(_)) => opened += 1,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "failed to open initial connection");
                }
            }
        }
        tracing::info!(
            opened,
            min_size,
            max_size = inner.config.max_size(),
            "connection pool initialized"
        );

        let handle = maintenance::spawn(&inner);
        *inner.maintenance.lock() = Some(handle);

        Self { inner }
    }

    /// Acquire a connection using the configured acquire timeout.
    ///
    /// Without a configured timeout this fails with `PoolExhausted` as soon
    /// as the pool is at capacity.
    pub async fn acquire(&self) -> Result<PooledConnection> {
        match self.inner.config.acquire_timeout() {
            Some(timeout) => self.acquire_timeout(timeout).await,
            None => self.try_acquire().await,
        }
    }

    /// Acquire without waiting for capacity.
    ///
    /// Idle entries withheld by a running sweep still count as available:
    /// if nothing else is free this waits for the sweep to hand them back.
    pub async fn try_acquire(&self) -> Result<PooledConnection> {
        loop {
            let notified = self.inner.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.checkout().await? {
                Some(conn) => return Ok(conn),
                None => notified.await,
            }
        }
    }

    /// Acquire, waiting up to `timeout` for a connection to be released
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<PooledConnection> {
        let deadline = Instant::now() + timeout;
        let _waiting = WaitingGuard::enter(&self.inner.waiting);

        loop {
            // Register interest before looking so a release between the
            // check and the wait is not missed.
            let notified = self.inner.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.checkout().await {
                Ok(Some(conn)) => return Ok(conn),
                Ok(None) | Err(QuarryError::PoolExhausted { .. }) => {}
                Err(e) => return Err(e),
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(QuarryError::Timeout(format!(
                    "Timed out waiting for connection (timeout: {:?})",
                    timeout
                )));
            }
        }
    }

    /// `Ok(None)` when the only free capacity is held by a probing sweep
    async fn checkout(&self) -> Result<Option<PooledConnection>> {
        let step = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Err(QuarryError::PoolClosed);
            }
            if let Some(mut entry) = state.idle.pop_back() {
                entry.touch();
                let step = Checkout::Reused(entry.id, entry.connection.clone());
                state.in_use.insert(entry.id, entry);
                step
            } else if state.total() < self.inner.config.max_size() {
                state.pending += 1;
                Checkout::Create
            } else if state.probing > 0 {
                Checkout::Probing
            } else {
                return Err(QuarryError::PoolExhausted {
                    max_connections: self.inner.config.max_size(),
                });
            }
        };

        match step {
            Checkout::Reused(id, connection) => {
                tracing::trace!(connection_id = id, "reusing idle connection");
                Ok(Some(PooledConnection::new(id, connection, self.inner.clone())))
            }
            Checkout::Create => self.create_checked_out().await.map(Some),
            Checkout::Probing => {
                tracing::trace!("idle connections are being probed, waiting for the sweep");
                Ok(None)
            }
        }
    }

    /// Open a connection for a slot reserved by `checkout`
    async fn create_checked_out(&self) -> Result<PooledConnection> {
        let reservation = Reservation::holding(&self.inner, 1);

        let connection = match self.inner.factory.create().await {
            Ok(connection) => connection,
            Err(e) => {
                self.inner.healthy.store(false, Ordering::SeqCst);
                tracing::warn!(error = %e, "failed to open connection on demand");
                return Err(e);
            }
        };
        self.inner.healthy.store(true, Ordering::SeqCst);

        let id = self.inner.next_id();
        let entry = PoolEntry::new(id, connection.clone());
        let rejected = reservation.settle(|state| {
            if state.closed {
                Some(entry)
            } else {
                state.in_use.insert(id, entry);
                None
            }
        });

        if rejected.is_some() {
            let _ = connection.close().await;
            return Err(QuarryError::PoolClosed);
        }

        tracing::debug!(connection_id = id, "opened connection on demand");
        Ok(PooledConnection::new(id, connection, self.inner.clone()))
    }

    /// Return a connection to the pool.
    ///
    /// Connections the caller closed are dropped, and a handle the pool no
    /// longer tracks (for example after `shutdown`) is ignored. Handles from
    /// a different pool are left to return to their own pool on drop.
    pub async fn release(&self, mut conn: PooledConnection) {
        if !Arc::ptr_eq(&conn.pool, &self.inner) {
            tracing::warn!(
                connection_id = conn.id,
                "connection released to a pool that does not own it"
            );
            return;
        }
        conn.returned = true;
        self.inner.check_in(conn.id);
    }

    /// Run one maintenance sweep now
    pub async fn maintain(&self) -> SweepReport {
        self.inner.sweep().await
    }

    /// Stop maintenance, then close every idle and checked-out connection.
    ///
    /// Safe to call more than once. Afterwards `acquire` fails with
    /// `PoolClosed`, including for callers already waiting.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        let handle = self.inner.maintenance.lock().take();
        if let Some(mut handle) = handle {
            let grace = self.inner.config.shutdown_timeout();
            if tokio::time::timeout(grace, &mut handle).await.is_err() {
                tracing::warn!(?grace, "maintenance loop did not stop in time, aborting it");
                handle.abort();
            }
        }

        let entries: Vec<PoolEntry> = {
            let mut state = self.inner.state.lock();
            if state.closed && state.idle.is_empty() && state.in_use.is_empty() {
                return;
            }
            state.closed = true;
            let mut entries: Vec<PoolEntry> = state.idle.drain(..).collect();
            entries.extend(state.in_use.drain().map(|(_, entry)| entry));
            entries
        };
        self.inner.released.notify_waiters();

        let count = entries.len();
        for entry in entries {
            if let Err(e) = entry.connection.close().await {
                tracing::warn!(connection_id = entry.id, error = %e, "error closing connection during shutdown");
            }
        }
        tracing::info!(closed = count, "connection pool shut down");
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        PoolStats::new(
            state.total(),
            state.idle.len(),
            state.in_use.len(),
            self.inner.waiting.load(Ordering::SeqCst),
            self.inner.config.max_size(),
        )
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Whether the last creation or probe succeeded
    pub fn is_healthy(&self) -> bool {
        self.inner.healthy.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("stats", &self.stats())
            .field("closed", &self.is_closed())
            .finish()
    }
}

struct WaitingGuard<'a>(&'a AtomicUsize);

impl<'a> WaitingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A connection checked out of the pool
///
/// Hand it back with [`ConnectionPool::release`]. Dropping it without
/// releasing returns it to the pool as well.
pub struct PooledConnection {
    id: ConnectionId,
    connection: Arc<dyn Connection>,
    pool: Arc<PoolInner>,
    returned: bool,
}

impl PooledConnection {
    fn new(id: ConnectionId, connection: Arc<dyn Connection>, pool: Arc<PoolInner>) -> Self {
        Self {
            id,
            connection,
            pool,
            returned: false,
        }
    }

    /// Pool-assigned identity of the underlying connection
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Deref for PooledConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.connection.as_ref()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if !self.returned {
            self.pool.check_in(self.id);
        }
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("driver", &self.connection.driver_name())
            .finish()
    }
}
