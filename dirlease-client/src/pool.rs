// SPDX-License-Identifier: EUPL-1.2 OR MIT

//! Bounded pool of directory sessions.
//!
//! - **Invariant**: `active + idle ≤ capacity`
//! - **Resource safety**: every acquired connection comes back exactly once,
//!   through [`Lease::release`], [`Lease::invalidate`] or by dropping the lease
//! - **Observability**: optional Prometheus metrics
//!
//! # Example
//!
//! ```ignore
//! use dirlease_client::{ConnectionFactory, ConnectionPool, LdapTransport, PoolConfig};
//!
//! let factory = ConnectionFactory::new(LdapTransport::new(), &config, false, Default::default())?;
//! let pool = ConnectionPool::new(factory, PoolConfig::default());
//! let mut lease = pool.acquire().await?;
//! let entries = lease.execute_query(&query, timeout).await?;
//! lease.release();
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use dirlease_mapper::AttributeDelta;
use tokio::sync::Notify;
use tracing::{debug, trace, warn};

use crate::error::ConnectionError;
use crate::factory::{ConnectionFactory, RawConnection};
use crate::metrics::PoolMetrics;
use crate::transport::{DirectoryTransport, Entry, Query, TransportError};

/// Configuration for the connection pool.
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Maximum number of connections in the pool
    pub max_size: usize,
    /// Maximum time a connection can be idle before being closed
    pub max_idle_time: Duration,
    /// Timeout for acquiring a connection from the pool
    pub acquire_timeout: Duration,
    /// Timeout for establishing a new connection
    pub connection_timeout: Duration,
    /// Optional metrics for monitoring
    pub metrics: Option<Arc<PoolMetrics>>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let max_size = std::thread::available_parallelism()
            .map(|n| n.get() + 1)
            .unwrap_or(5);

        Self {
            max_size,
            max_idle_time: Duration::from_secs(300),
            acquire_timeout: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(10),
            metrics: None,
        }
    }
}

/// Point-in-time view of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub idle: usize,
    pub active: usize,
    pub capacity: usize,
    /// Leases handed out
    pub acquired: u64,
    /// Leases that came back, by release, invalidation or drop
    pub released: u64,
    /// Sessions opened
    pub created: u64,
    /// Sessions closed
    pub destroyed: u64,
}

struct IdleConnection<S> {
    conn: RawConnection<S>,
    last_used: Instant,
}

impl<S> IdleConnection<S> {
    fn is_expired(&self, max_idle_time: Duration) -> bool {
        self.last_used.elapsed() > max_idle_time
    }
}

struct PoolState<S> {
    /// Idle connections available for reuse
    idle: VecDeque<IdleConnection<S>>,
    /// Count of connections currently leased or being opened
    active_count: usize,
    /// Maximum pool capacity
    capacity: usize,
    /// Count of tasks waiting for a connection
    waiting_count: usize,
    closed: bool,
}

impl<S> PoolState<S> {
    fn invariant(&self) -> bool {
        self.active_count + self.idle.len() <= self.capacity && self.capacity > 0
    }

    fn update_metrics(&self, metrics: &PoolMetrics) {
        metrics.idle_sessions.set(self.idle.len() as i64);
        metrics.leased_sessions.set(self.active_count as i64);
    }
}

#[derive(Default)]
struct Counters {
    acquired: AtomicU64,
    released: AtomicU64,
    created: AtomicU64,
    destroyed: AtomicU64,
}

/// What an acquire attempt does once the lock is released.
enum Plan<S> {
    /// Lease this idle connection after checking it is alive
    Reuse(RawConnection<S>),
    /// A slot was reserved; open a new session for it
    Create,
    /// Pool at capacity
    Wait,
}

struct PoolInner<X: DirectoryTransport> {
    factory: ConnectionFactory<X>,
    state: Mutex<PoolState<X::Session>>,
    config: PoolConfig,
    available_notify: Notify,
    counters: Counters,
}

impl<X: DirectoryTransport> PoolInner<X> {
    /// The state is never left inconsistent while locked, so a poisoned lock
    /// is still usable.
    ///
    /// Callers are synchronous; a guard must never live across an await.
    fn lock(&self) -> MutexGuard<'_, PoolState<X::Session>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn metrics(&self) -> Option<&PoolMetrics> {
        self.config.metrics.as_deref()
    }

    /// Take a slot or register as a waiter. Expired idle connections found on
    /// the way are handed back for destruction.
    fn plan_acquire(
        &self,
    ) -> Result<(Plan<X::Session>, Vec<RawConnection<X::Session>>), ConnectionError> {
        let mut state = self.lock();
        debug_assert!(state.invariant());

        if state.closed {
            return Err(ConnectionError::PoolClosed);
        }

        let max_idle = self.config.max_idle_time;
        let mut expired = Vec::new();
        let plan = loop {
            match state.idle.pop_front() {
                Some(idle) if idle.is_expired(max_idle) => expired.push(idle.conn),
                // Reuse the oldest idle connection
                Some(idle) => {
                    state.active_count += 1;
                    break Plan::Reuse(idle.conn);
                }
                None if state.active_count < state.capacity => {
                    state.active_count += 1;
                    break Plan::Create;
                }
                None => {
                    state.waiting_count += 1;
                    trace!(
                        "Pool at capacity ({}/{}), waiting",
                        state.active_count, state.capacity
                    );
                    break Plan::Wait;
                }
            }
        };
        debug_assert!(state.invariant());

        if let Some(metrics) = self.metrics() {
            state.update_metrics(metrics);
        }
        Ok((plan, expired))
    }

    fn stop_waiting(&self) {
        let mut state = self.lock();
        state.waiting_count = state.waiting_count.saturating_sub(1);
    }

    /// Mark the pool closed and take its idle connections. `None` if it was
    /// already closed.
    fn shut(&self) -> Option<Vec<RawConnection<X::Session>>> {
        let mut state = self.lock();
        if state.closed {
            return None;
        }
        state.closed = true;
        let idle = state.idle.drain(..).map(|idle| idle.conn).collect();
        if let Some(metrics) = self.metrics() {
            state.update_metrics(metrics);
        }
        Some(idle)
    }

    async fn destroy(&self, conn: RawConnection<X::Session>, reason: &'static str) {
        trace!(connection = conn.id, reason, "Destroying connection");
        self.factory.destroy_connection(conn).await;
        self.counters.destroyed.fetch_add(1, Ordering::Relaxed);
        if let Some(metrics) = self.metrics() {
            metrics.sessions_closed.with_label_values(&[reason]).inc();
        }
    }

    /// Give back a slot and, if the connection is still usable and the pool
    /// open, park it as idle. Returns the connection if it has to be
    /// destroyed instead.
    fn check_in(
        &self,
        conn: Option<RawConnection<X::Session>>,
    ) -> Option<RawConnection<X::Session>> {
        let mut state = self.lock();
        debug_assert!(state.invariant());

        state.active_count = state.active_count.saturating_sub(1);
        let leftover = match conn {
            Some(conn) if !state.closed => {
                state.idle.push_back(IdleConnection {
                    conn,
                    last_used: Instant::now(),
                });
                None
            }
            other => other,
        };
        debug_assert!(state.invariant());

        if let Some(metrics) = self.metrics() {
            state.update_metrics(metrics);
        }

        let notify = state.waiting_count > 0;
        drop(state);
        if notify {
            self.available_notify.notify_one();
        }
        leftover
    }
}

/// Result of an acquire attempt
enum AcquireResult<X: DirectoryTransport> {
    /// Successfully acquired a connection
    Success(Lease<X>),
    /// Must wait for a connection to become available
    WaitRequired,
    /// An idle connection turned out to be dead, try again
    Retry,
}

/// A bounded pool of directory sessions.
///
/// The pool maintains the invariant `active + idle ≤ capacity` at all times.
pub struct ConnectionPool<X: DirectoryTransport> {
    inner: Arc<PoolInner<X>>,
}

impl<X: DirectoryTransport> Clone for ConnectionPool<X> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<X: DirectoryTransport> ConnectionPool<X> {
    /// # Panics
    /// Panics if `config.max_size` is 0.
    pub fn new(factory: ConnectionFactory<X>, config: PoolConfig) -> Self {
        assert!(config.max_size > 0, "Pool capacity must be positive");

        let state = PoolState {
            idle: VecDeque::new(),
            active_count: 0,
            capacity: config.max_size,
            waiting_count: 0,
            closed: false,
        };

        debug_assert!(state.invariant());

        Self {
            inner: Arc::new(PoolInner {
                factory,
                state: Mutex::new(state),
                config,
                available_notify: Notify::new(),
                counters: Counters::default(),
            }),
        }
    }

    pub fn factory(&self) -> &ConnectionFactory<X> {
        &self.inner.factory
    }

    pub fn metrics(&self) -> Option<&Arc<PoolMetrics>> {
        self.inner.config.metrics.as_ref()
    }

    /// Lease a connection, reusing an idle one when possible.
    ///
    /// Waits at most `acquire_timeout` for a free slot.
    pub async fn acquire(&self) -> Result<Lease<X>, ConnectionError> {
        let start = Instant::now();
        let deadline = start + self.inner.config.acquire_timeout;

        loop {
            match self.try_acquire(start).await? {
                AcquireResult::Success(lease) => {
                    self.inner.counters.acquired.fetch_add(1, Ordering::Relaxed);
                    trace!(connection = lease.id(), "Leased connection");
                    return Ok(lease);
                }
                AcquireResult::Retry => continue,
                AcquireResult::WaitRequired => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    let woken = tokio::time::timeout(
                        remaining,
                        self.inner.available_notify.notified(),
                    )
                    .await;
                    self.inner.stop_waiting();

                    if woken.is_err() {
                        if let Some(metrics) = self.inner.metrics() {
                            metrics.record_lease("timeout", start.elapsed().as_secs_f64());
                        }
                        return Err(ConnectionError::PoolTimeout(
                            self.inner.config.acquire_timeout,
                        ));
                    }
                }
            }
        }
    }

    async fn try_acquire(
        &self,
        start_time: Instant,
    ) -> Result<AcquireResult<X>, ConnectionError> {
        let inner = &self.inner;
        let (plan, expired) = inner.plan_acquire()?;

        // The slot is held by the lease from here on, so a cancelled acquire
        // gives it back. A lease without a connection only reserves the slot.
        let mut lease = match plan {
            Plan::Wait => {
                for conn in expired {
                    inner.destroy(conn, "expired").await;
                }
                return Ok(AcquireResult::WaitRequired);
            }
            Plan::Reuse(conn) => Lease {
                conn: Some(conn),
                pool: Arc::clone(inner),
            },
            Plan::Create => Lease {
                conn: None,
                pool: Arc::clone(inner),
            },
        };
        for conn in expired {
            inner.destroy(conn, "expired").await;
        }

        if let Some(conn) = lease.conn.as_mut() {
            if !inner.factory.transport().is_alive(&mut conn.session) {
                // The slot goes back without a connection.
                if let Some(conn) = lease.conn.take() {
                    debug!(connection = conn.id, "Idle connection is dead, discarding");
                    drop(lease);
                    inner.destroy(conn, "dead").await;
                }
                return Ok(AcquireResult::Retry);
            }

            if let Some(metrics) = inner.metrics() {
                metrics.record_lease("reused", start_time.elapsed().as_secs_f64());
            }
            trace!(connection = lease.id(), "Reusing idle connection");
            return Ok(AcquireResult::Success(lease));
        }

        match self.create_connection().await {
            Ok(conn) => {
                lease.conn = Some(conn);
                inner.counters.created.fetch_add(1, Ordering::Relaxed);
                if let Some(metrics) = inner.metrics() {
                    metrics.sessions_opened.with_label_values(&["success"]).inc();
                    metrics.record_lease("created", start_time.elapsed().as_secs_f64());
                }
                Ok(AcquireResult::Success(lease))
            }
            Err(e) => {
                drop(lease);
                if let Some(metrics) = inner.metrics() {
                    let status = match e {
                        ConnectionError::ConnectTimeout(_) => "timeout",
                        _ => "error",
                    };
                    metrics.sessions_opened.with_label_values(&[status]).inc();
                }
                warn!("Failed to create connection: {e}");
                Err(e)
            }
        }
    }

    async fn create_connection(&self) -> Result<RawConnection<X::Session>, ConnectionError> {
        let timeout = self.inner.config.connection_timeout;
        tokio::time::timeout(timeout, self.inner.factory.create_connection())
            .await
            .map_err(|_| ConnectionError::ConnectTimeout(timeout))?
            .map_err(ConnectionError::Open)
    }

    /// Close all idle connections and refuse further acquires.
    ///
    /// Leases still out are destroyed when they come back.
    pub async fn close(&self) {
        let Some(idle) = self.inner.shut() else {
            return;
        };

        // Wake waiters so they observe the closed pool.
        self.inner.available_notify.notify_waiters();
        self.inner.available_notify.notify_one();

        debug!(idle = idle.len(), "Closing connection pool");
        for conn in idle {
            self.inner.destroy(conn, "shutdown").await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.inner.lock();
        let counters = &self.inner.counters;
        PoolStats {
            idle: state.idle.len(),
            active: state.active_count,
            capacity: state.capacity,
            acquired: counters.acquired.load(Ordering::Relaxed),
            released: counters.released.load(Ordering::Relaxed),
            created: counters.created.load(Ordering::Relaxed),
            destroyed: counters.destroyed.load(Ordering::Relaxed),
        }
    }
}

/// Exclusive use of one pooled connection.
///
/// The connection goes back to the pool exactly once: through
/// [`Lease::release`], [`Lease::invalidate`], or when the lease is dropped.
pub struct Lease<X: DirectoryTransport> {
    conn: Option<RawConnection<X::Session>>,
    pool: Arc<PoolInner<X>>,
}

impl<X: DirectoryTransport> fmt::Debug for Lease<X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("connection", &self.id())
            .finish_non_exhaustive()
    }
}

impl<X: DirectoryTransport> Lease<X> {
    pub fn id(&self) -> u64 {
        self.conn.as_ref().map_or(0, RawConnection::id)
    }

    /// Get the underlying session.
    pub fn session(&mut self) -> &mut X::Session {
        &mut self.conn.as_mut().expect("Connection already taken").session
    }

    pub async fn execute_query(
        &mut self,
        query: &Query,
        timeout: Duration,
    ) -> Result<Vec<Entry>, TransportError> {
        let conn = self.conn.as_mut().expect("Connection already taken");
        self.pool
            .factory
            .transport()
            .execute_query(&mut conn.session, query, timeout)
            .await
    }

    pub async fn apply_update(
        &mut self,
        dn: &str,
        delta: &AttributeDelta,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        let conn = self.conn.as_mut().expect("Connection already taken");
        self.pool
            .factory
            .transport()
            .apply_update(&mut conn.session, dn, delta, timeout)
            .await
    }

    /// Return the connection to the pool for reuse.
    pub fn release(self) {
        drop(self);
    }

    /// Discard the connection instead of returning it, after a failure that
    /// leaves the session in an unknown state.
    pub async fn invalidate(mut self) {
        let conn = self.conn.take();
        let pool = Arc::clone(&self.pool);
        if let Some(conn) = conn {
            pool.counters.released.fetch_add(1, Ordering::Relaxed);
            drop(self);
            pool.destroy(conn, "invalidated").await;
        }
    }
}

impl<X: DirectoryTransport> Drop for Lease<X> {
    fn drop(&mut self) {
        let conn = self.conn.take();
        if conn.is_some() {
            self.pool.counters.released.fetch_add(1, Ordering::Relaxed);
        }

        let Some(conn) = self.pool.check_in(conn) else {
            return;
        };

        // The pool was closed while this lease was out.
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let pool = Arc::clone(&self.pool);
                handle.spawn(async move { pool.destroy(conn, "shutdown").await });
            }
            Err(_) => {
                self.pool.counters.destroyed.fetch_add(1, Ordering::Relaxed);
                trace!(connection = conn.id, "No runtime, dropping session");
            }
        }
    }
}
