//! Endpoint-keyed connection pool
//!
//! Connections are dialed lazily on a miss and kept for reuse. Idle
//! connections live in a concurrent map keyed by endpoint, each with its
//! own short-held lock, so walker threads hitting different shards never
//! contend on one lock.
//! There is no eviction: a connection stays pooled for the life of the
//! pool once it has been returned. A connection whose call failed at the
//! transport layer is discarded instead of returned.

use crate::config::Endpoint;
use crate::error::TransportError;
use crate::mds::transport::Transport;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, trace};

/// A pooled connection with automatic return to pool on drop
pub struct PooledConnection<'a, T: Transport> {
    /// The connection (Option for taking on drop)
    conn: Option<T::Conn>,
    endpoint: &'a Endpoint,
    pool: &'a ConnectionPool<T>,
}

impl<T: Transport> PooledConnection<'_, T> {
    pub fn endpoint(&self) -> &Endpoint {
        self.endpoint
    }

    /// Drop a connection known to be broken instead of returning it
    pub fn discard(mut self) {
        if self.conn.take().is_some() {
            self.pool.stats.discarded.fetch_add(1, Ordering::Relaxed);
            debug!(endpoint = %self.endpoint, "discarded broken connection");
        }
    }
}

impl<T: Transport> Deref for PooledConnection<'_, T> {
    type Target = T::Conn;

    fn deref(&self) -> &Self::Target {
        // Only None after drop
        self.conn.as_ref().expect("connection already returned")
    }
}

impl<T: Transport> DerefMut for PooledConnection<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("connection already returned")
    }
}

impl<T: Transport> Drop for PooledConnection<'_, T> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.put(self.endpoint, conn);
        }
    }
}

/// Pool counters
#[derive(Debug, Default)]
pub struct PoolStats {
    /// Connections created by dialing
    pub dialed: AtomicU64,

    /// Checkouts served from an idle connection
    pub reused: AtomicU64,

    /// Dial attempts that failed
    pub dial_failures: AtomicU64,

    /// Connections dropped after a transport failure
    pub discarded: AtomicU64,
}

impl PoolStats {
    pub fn dialed(&self) -> u64 {
        self.dialed.load(Ordering::Relaxed)
    }

    pub fn reused(&self) -> u64 {
        self.reused.load(Ordering::Relaxed)
    }

    pub fn dial_failures(&self) -> u64 {
        self.dial_failures.load(Ordering::Relaxed)
    }

    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }
}

/// Pool of metadata connections shared by all walker threads
pub struct ConnectionPool<T: Transport> {
    transport: T,
    /// Idle connections per endpoint
    idle: DashMap<Endpoint, Mutex<Vec<T::Conn>>>,
    stats: PoolStats,
}

impl<T: Transport> ConnectionPool<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            idle: DashMap::new(),
            stats: PoolStats::default(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }

    /// Borrow a connection to `endpoint`, dialing one if none is idle
    ///
    /// The caller must hand it back with [`put`](Self::put).
    pub fn get(&self, endpoint: &Endpoint, timeout: Duration) -> Result<T::Conn, TransportError> {
        let idle = match self.idle.get(endpoint) {
            Some(slot) => {
                let conn = slot.lock().pop();
                conn
            }
            None => None,
        };
        if let Some(conn) = idle {
            self.stats.reused.fetch_add(1, Ordering::Relaxed);
            trace!(%endpoint, "reusing pooled connection");
            return Ok(conn);
        }

        match self.transport.dial(endpoint, timeout) {
            Ok(conn) => {
                self.stats.dialed.fetch_add(1, Ordering::Relaxed);
                debug!(%endpoint, "dialed new connection");
                Ok(conn)
            }
            Err(e) => {
                self.stats.dial_failures.fetch_add(1, Ordering::Relaxed);
                debug!(%endpoint, error = %e, "dial failed");
                Err(e)
            }
        }
    }

    /// Return a borrowed connection
    pub fn put(&self, endpoint: &Endpoint, conn: T::Conn) {
        if let Some(slot) = self.idle.get(endpoint) {
            slot.lock().push(conn);
            return;
        }
        self.idle.entry(endpoint.clone()).or_default().lock().push(conn);
    }

    /// Borrow a connection that goes back to the pool when dropped
    pub fn checkout<'a>(
        &'a self,
        endpoint: &'a Endpoint,
        timeout: Duration,
    ) -> Result<PooledConnection<'a, T>, TransportError> {
        let conn = self.get(endpoint, timeout)?;
        Ok(PooledConnection {
            conn: Some(conn),
            endpoint,
            pool: self,
        })
    }

    /// Number of idle connections for an endpoint
    pub fn idle_count(&self, endpoint: &Endpoint) -> usize {
        match self.idle.get(endpoint) {
            Some(slot) => {
                let len = slot.lock().len();
                len
            }
            None => 0,
        }
    }
}
