//! Resilient RPC execution
//!
//! One logical RPC = up to `1 + retries` attempts against one endpoint,
//! with a fixed delay between attempts. Transport failures and retryable
//! status codes use the budget; a permanent status ends the call at once.
//!
//! The candidate list is ordered but only its first endpoint is ever
//! attempted. Callers still pass the full list so a failover policy can
//! be added here without touching call sites.

use crate::config::{Endpoint, RpcConfig};
use crate::error::{AttemptError, RpcError, RpcResult};
use crate::mds::pool::ConnectionPool;
use crate::mds::rpc::MetaRpc;
use crate::mds::transport::Transport;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Timeout and retry budget applied to every call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Per-attempt timeout
    pub timeout: Duration,

    /// Retries after the first attempt
    pub retries: u32,

    /// Fixed sleep before each retry
    pub delay: Duration,
}

impl From<RpcConfig> for RetryPolicy {
    fn from(config: RpcConfig) -> Self {
        Self {
            timeout: config.timeout,
            retries: config.retry_times,
            delay: config.retry_delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RpcConfig::default().into()
    }
}

/// Invoker counters
#[derive(Debug, Default)]
pub struct InvokerStats {
    /// Logical calls started
    pub calls: AtomicU64,

    /// Attempts issued (first tries and retries)
    pub attempts: AtomicU64,

    /// Attempts that were retries
    pub retries: AtomicU64,

    /// Calls that ended in an error
    pub failures: AtomicU64,
}

impl InvokerStats {
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

/// Runs typed RPCs through the connection pool with bounded retry
pub struct ResilientInvoker<T: Transport> {
    pool: ConnectionPool<T>,
    policy: RetryPolicy,
    stats: InvokerStats,
}

impl<T: Transport> ResilientInvoker<T> {
    pub fn new(transport: T, policy: RetryPolicy) -> Self {
        Self {
            pool: ConnectionPool::new(transport),
            policy,
            stats: InvokerStats::default(),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn pool(&self) -> &ConnectionPool<T> {
        &self.pool
    }

    pub fn stats(&self) -> &InvokerStats {
        &self.stats
    }

    /// Execute `rpc` against the first of `endpoints`
    ///
    /// The retry loop is not interruptible: a walk cancelled while a call
    /// is retrying sees the cancellation once the call returns.
    pub fn invoke<R: MetaRpc>(&self, endpoints: &[Endpoint], rpc: &R) -> RpcResult<R::Output> {
        self.stats.calls.fetch_add(1, Ordering::Relaxed);

        let Some(endpoint) = endpoints.first() else {
            self.stats.failures.fetch_add(1, Ordering::Relaxed);
            return Err(RpcError::NoEndpoint { rpc: R::NAME });
        };
        if endpoints.len() > 1 {
            debug!(
                rpc = R::NAME,
                %endpoint,
                skipped = endpoints.len() - 1,
                "only the first endpoint is attempted"
            );
        }

        let max_attempts = self.policy.retries.saturating_add(1);
        let mut attempt: u32 = 1;
        loop {
            self.stats.attempts.fetch_add(1, Ordering::Relaxed);

            let err = match self.attempt(endpoint, rpc) {
                Ok(output) => {
                    debug!(rpc = R::NAME, %endpoint, attempt, outcome = "ok", "rpc attempt");
                    return Ok(output);
                }
                Err(e) => e,
            };

            if !err.is_retryable() {
                debug!(rpc = R::NAME, %endpoint, attempt, outcome = "rejected", error = %err, "rpc attempt");
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                return Err(match err {
                    AttemptError::Status(status) => RpcError::Rejected {
                        rpc: R::NAME,
                        endpoint: endpoint.clone(),
                        status,
                    },
                    // Transport errors are always retryable
                    transport => RpcError::Exhausted {
                        rpc: R::NAME,
                        endpoint: endpoint.clone(),
                        attempts: attempt,
                        last: transport,
                    },
                });
            }

            if attempt >= max_attempts {
                warn!(rpc = R::NAME, %endpoint, attempts = attempt, error = %err, "retry budget exhausted");
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                return Err(RpcError::Exhausted {
                    rpc: R::NAME,
                    endpoint: endpoint.clone(),
                    attempts: attempt,
                    last: err,
                });
            }

            debug!(rpc = R::NAME, %endpoint, attempt, outcome = "retry", error = %err, "rpc attempt");
            self.stats.retries.fetch_add(1, Ordering::Relaxed);
            thread::sleep(self.policy.delay);
            attempt += 1;
        }
    }

    fn attempt<R: MetaRpc>(&self, endpoint: &Endpoint, rpc: &R) -> Result<R::Output, AttemptError> {
        let mut conn = self.pool.checkout(endpoint, self.policy.timeout)?;
        match rpc.issue(&mut *conn, self.policy.timeout) {
            // A status answer leaves the connection usable
            Ok(reply) => Ok(reply?),
            Err(e) => {
                conn.discard();
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StatusCode;
    use crate::mds::memory::InMemoryMds;
    use crate::mds::rpc::{GetFsInfoRequest, ListEntriesRequest};
    use crate::mds::types::ROOT_INODE_ID;
    use std::time::Instant;

    fn ep(addr: &str) -> Endpoint {
        Endpoint::parse(addr).unwrap()
    }

    fn policy(retries: u32, delay_ms: u64) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_secs(1),
            retries,
            delay: Duration::from_millis(delay_ms),
        }
    }

    fn list_root(mds: &InMemoryMds) -> ListEntriesRequest {
        ListEntriesRequest {
            fs_id: mds.fs_id(),
            parent: ROOT_INODE_ID,
            epoch: mds.epoch(),
        }
    }

    #[test]
    fn test_success_first_try() {
        let mds = InMemoryMds::new(1, "fs1");
        mds.create_file(ROOT_INODE_ID, "f", 3).unwrap();
        let invoker = ResilientInvoker::new(mds.clone(), policy(3, 1));

        let entries = invoker.invoke(&[ep("10.0.0.1:7400")], &list_root(&mds)).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(invoker.stats().attempts(), 1);
        assert_eq!(invoker.stats().retries(), 0);
    }

    #[test]
    fn test_retry_then_succeed() {
        let mds = InMemoryMds::new(1, "fs1");
        let invoker = ResilientInvoker::new(mds.clone(), policy(3, 20));

        // Attempts 1 and 2 fail, attempt 3 succeeds
        mds.fail_next_calls(2, StatusCode::StaleEpoch);
        let start = Instant::now();
        invoker.invoke(&[ep("10.0.0.1:7400")], &list_root(&mds)).unwrap();

        assert!(start.elapsed() >= Duration::from_millis(40));
        assert_eq!(invoker.stats().attempts(), 3);
        assert_eq!(invoker.stats().retries(), 2);
    }

    #[test]
    fn test_transport_errors_retried() {
        let mds = InMemoryMds::new(1, "fs1");
        let invoker = ResilientInvoker::new(mds.clone(), policy(2, 1));

        mds.fail_next_transport(2);
        assert!(invoker.invoke(&[ep("10.0.0.1:7400")], &list_root(&mds)).is_ok());
        assert_eq!(invoker.stats().attempts(), 3);
    }

    #[test]
    fn test_broken_connection_redialed() {
        let mds = InMemoryMds::new(1, "fs1");
        let endpoint = ep("10.0.0.1:7400");
        let invoker = ResilientInvoker::new(mds.clone(), policy(3, 1));

        // The first connection fails every call; only a new dial helps
        mds.break_next_connections(1);
        invoker.invoke(&[endpoint.clone()], &list_root(&mds)).unwrap();

        assert_eq!(invoker.stats().attempts(), 2);
        assert_eq!(invoker.pool().stats().dialed(), 2);
        assert_eq!(invoker.pool().stats().discarded(), 1);
        assert_eq!(invoker.pool().idle_count(&endpoint), 1);
    }

    #[test]
    fn test_status_reply_keeps_connection() {
        let mds = InMemoryMds::new(1, "fs1");
        let invoker = ResilientInvoker::new(mds.clone(), policy(3, 1));

        mds.fail_next_calls(1, StatusCode::Busy);
        invoker.invoke(&[ep("10.0.0.1:7400")], &list_root(&mds)).unwrap();

        assert_eq!(invoker.stats().attempts(), 2);
        assert_eq!(invoker.pool().stats().dialed(), 1);
        assert_eq!(invoker.pool().stats().reused(), 1);
        assert_eq!(invoker.pool().stats().discarded(), 0);
    }

    #[test]
    fn test_budget_exhausted() {
        let mds = InMemoryMds::new(1, "fs1");
        let invoker = ResilientInvoker::new(mds.clone(), policy(2, 1));

        mds.fail_next_calls(10, StatusCode::Busy);
        let err = invoker
            .invoke(&[ep("10.0.0.1:7400")], &list_root(&mds))
            .unwrap_err();

        match err {
            RpcError::Exhausted { attempts, rpc, .. } => {
                assert_eq!(attempts, 3);
                assert_eq!(rpc, "ListEntries");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(mds.stats().list_calls(), 3);
    }

    #[test]
    fn test_permanent_not_retried() {
        let mds = InMemoryMds::new(1, "fs1");
        let invoker = ResilientInvoker::new(mds.clone(), policy(5, 1));

        let req = GetFsInfoRequest { fs_id: 99 };
        let err = invoker.invoke(&[ep("10.0.0.1:7400")], &req).unwrap_err();
        assert!(matches!(err, RpcError::Rejected { .. }));
        assert_eq!(err.status().map(|s| s.code), Some(StatusCode::NoSuchFilesystem));
        assert_eq!(invoker.stats().attempts(), 1);
    }

    #[test]
    fn test_only_first_endpoint_attempted() {
        let mds = InMemoryMds::new(1, "fs1");
        let first = ep("10.0.0.1:7400");
        let second = ep("10.0.0.2:7400");
        mds.set_unreachable(&first);
        let invoker = ResilientInvoker::new(mds.clone(), policy(2, 1));

        let err = invoker
            .invoke(&[first.clone(), second.clone()], &list_root(&mds))
            .unwrap_err();
        assert!(matches!(err, RpcError::Exhausted { attempts: 3, .. }));
        assert_eq!(mds.dials_to(&first), 3);
        assert_eq!(mds.dials_to(&second), 0);
    }

    #[test]
    fn test_no_endpoint() {
        let mds = InMemoryMds::new(1, "fs1");
        let invoker = ResilientInvoker::new(mds.clone(), policy(2, 1));

        let err = invoker.invoke(&[], &list_root(&mds)).unwrap_err();
        assert!(matches!(err, RpcError::NoEndpoint { rpc: "ListEntries" }));
        assert_eq!(mds.stats().total_calls(), 0);
    }
}
