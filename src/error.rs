//! Error types for meta-walker
//!
//! This module defines the error hierarchy for bulk namespace walks:
//! - Transport errors (dial and network failures, always retried)
//! - Server status codes (retryable or permanent, decided by the code)
//! - RPC errors (what the invoker reports after its retry budget)
//! - Router, configuration, logic and worker errors
//!
//! Design philosophy:
//! - Use thiserror for structured error types in library code
//! - Errors should be actionable - include the rpc, endpoint and inode
//! - Preserve error chains for debugging

use crate::config::Endpoint;
use crate::mds::types::{FsId, InodeId};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Top-level error type for meta-walker
#[derive(Error, Debug, Clone)]
pub enum WalkerError {
    /// RPC failed (after retries, or permanently)
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    /// Shard routing errors
    #[error("Router error: {0}")]
    Router(#[from] RouterError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Request rejected before any RPC was issued
    #[error("Rejected: {0}")]
    Logic(#[from] LogicError),

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// A path component does not exist
    #[error("'{name}' not found under inode {parent}")]
    NotFound { parent: InodeId, name: String },

    /// No filesystem with this name
    #[error("Filesystem '{name}' not found")]
    UnknownFilesystem { name: String },

    /// A path component is not a directory
    #[error("'{path}' is not a directory")]
    NotADirectory { path: String },

    /// Walk stopped by an external cancellation request
    #[error("Walk cancelled")]
    Cancelled,
}

impl WalkerError {
    /// Check if this error came from the server rejecting the request
    pub fn is_permanent(&self) -> bool {
        matches!(self, WalkerError::Rpc(RpcError::Rejected { .. }))
    }

    /// Server status carried by this error, if any
    pub fn status(&self) -> Option<&ServerStatus> {
        match self {
            WalkerError::Rpc(e) => e.status(),
            _ => None,
        }
    }
}

/// Transport-level failures: dialing or talking to an endpoint
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Could not establish a connection
    #[error("Failed to connect to '{endpoint}': {reason}")]
    ConnectFailed { endpoint: Endpoint, reason: String },

    /// Call did not complete within the per-RPC timeout
    #[error("RPC to '{endpoint}' timed out after {timeout:?}")]
    Timeout { endpoint: Endpoint, timeout: Duration },

    /// Connection broke mid-call
    #[error("Connection to '{endpoint}' lost: {reason}")]
    Disconnected { endpoint: Endpoint, reason: String },
}

/// Status codes a metadata server can answer with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// Request epoch is older than the namespace generation
    StaleEpoch,
    /// Namespace id moved to another shard
    ShardMoved,
    /// Server busy, try again
    Busy,
    /// No such inode or dentry
    NotFound,
    /// Operation needs a directory
    NotDirectory,
    /// Operation needs a file
    IsDirectory,
    /// Directory still has children
    NotEmpty,
    /// Filesystem id unknown
    NoSuchFilesystem,
    /// Anything else
    Internal,
}

impl StatusCode {
    /// Retryable codes are retried by the invoker within the same budget
    /// as transport errors
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StatusCode::StaleEpoch | StatusCode::ShardMoved | StatusCode::Busy
        )
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatusCode::StaleEpoch => "stale epoch",
            StatusCode::ShardMoved => "shard moved",
            StatusCode::Busy => "server busy",
            StatusCode::NotFound => "not found",
            StatusCode::NotDirectory => "not a directory",
            StatusCode::IsDirectory => "is a directory",
            StatusCode::NotEmpty => "directory not empty",
            StatusCode::NoSuchFilesystem => "no such filesystem",
            StatusCode::Internal => "internal error",
        };
        f.write_str(s)
    }
}

/// Application-level error returned in an RPC response
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct ServerStatus {
    pub code: StatusCode,
    pub message: String,
}

impl ServerStatus {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

/// Why a single attempt failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttemptError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("server returned {0}")]
    Status(#[from] ServerStatus),
}

impl AttemptError {
    pub fn is_retryable(&self) -> bool {
        match self {
            AttemptError::Transport(_) => true,
            AttemptError::Status(status) => status.is_retryable(),
        }
    }
}

/// Outcome of a logical RPC after the invoker is done with it
#[derive(Error, Debug, Clone)]
pub enum RpcError {
    /// Router returned no candidate endpoint
    #[error("{rpc}: no endpoint to send the request to")]
    NoEndpoint { rpc: &'static str },

    /// Server answered with a permanent error, no retry was attempted
    #[error("{rpc} on '{endpoint}' rejected: {status}")]
    Rejected {
        rpc: &'static str,
        endpoint: Endpoint,
        status: ServerStatus,
    },

    /// Retry budget exhausted on the attempted endpoint
    #[error("{rpc} on '{endpoint}' failed after {attempts} attempts: {last}")]
    Exhausted {
        rpc: &'static str,
        endpoint: Endpoint,
        attempts: u32,
        #[source]
        last: AttemptError,
    },
}

impl RpcError {
    /// Server status behind this error, if the server answered at all
    pub fn status(&self) -> Option<&ServerStatus> {
        match self {
            RpcError::Rejected { status, .. } => Some(status),
            RpcError::Exhausted {
                last: AttemptError::Status(status),
                ..
            } => Some(status),
            _ => None,
        }
    }
}

/// Shard routing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    /// resolve() called before init_for_filesystem()
    #[error("Router not initialized - call init_for_filesystem first")]
    NotInitialized,

    /// Router table has no shards
    #[error("No shards configured for filesystem {fs_id}")]
    NoShards { fs_id: FsId },

    /// Filesystem id is not routable
    #[error("Invalid filesystem id {fs_id}")]
    InvalidFilesystem { fs_id: FsId },
}

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Invalid thread count
    #[error("Invalid thread count {count}: must be between 1 and {max}")]
    InvalidThreadCount { count: usize, max: usize },

    /// Endpoint address failed to parse
    #[error("Invalid endpoint '{addr}': {reason}")]
    InvalidEndpoint { addr: String, reason: String },

    /// RPC timeout must be positive
    #[error("Invalid RPC timeout {0:?}: must be greater than zero")]
    InvalidTimeout(Duration),

    /// No coordinator address configured
    #[error("No coordinator address configured")]
    NoCoordinator,
}

/// Requests rejected before any RPC is issued
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LogicError {
    /// Attempt to delete the namespace root
    #[error("Root directory can not be deleted")]
    RootDeletion,

    /// Concurrency bound out of range
    #[error("Invalid concurrency bound {threads}: must be between 1 and {max}")]
    InvalidConcurrency { threads: usize, max: usize },

    /// Path is not absolute
    #[error("Path '{0}' is not absolute")]
    RelativePath(String),

    /// Entry name is empty
    #[error("Entry name must not be empty")]
    EmptyName,
}

/// Worker thread errors
#[derive(Error, Debug, Clone)]
pub enum WorkerError {
    /// Worker panicked
    #[error("Worker {name} panicked: {message}")]
    Panicked { name: String, message: String },
}

/// Result type alias for WalkerError
pub type Result<T> = std::result::Result<T, WalkerError>;

/// Result type alias for RpcError
pub type RpcResult<T> = std::result::Result<T, RpcError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn ep() -> Endpoint {
        Endpoint::parse("10.0.0.1:7400").unwrap()
    }

    #[test]
    fn test_status_retryable() {
        assert!(StatusCode::StaleEpoch.is_retryable());
        assert!(StatusCode::ShardMoved.is_retryable());
        assert!(!StatusCode::NotFound.is_retryable());
        assert!(!StatusCode::NotEmpty.is_retryable());
    }

    #[test]
    fn test_attempt_retryable() {
        let transport: AttemptError = TransportError::Timeout {
            endpoint: ep(),
            timeout: Duration::from_secs(1),
        }
        .into();
        assert!(transport.is_retryable());

        let permanent: AttemptError = ServerStatus::new(StatusCode::NotDirectory, "ino 5").into();
        assert!(!permanent.is_retryable());
    }

    #[test]
    fn test_error_conversion() {
        let rpc_err = RpcError::Rejected {
            rpc: "ListEntries",
            endpoint: ep(),
            status: ServerStatus::new(StatusCode::NotFound, "ino 9"),
        };
        let walker_err: WalkerError = rpc_err.into();
        assert!(walker_err.is_permanent());
        assert_eq!(walker_err.status().map(|s| s.code), Some(StatusCode::NotFound));

        let logic: WalkerError = LogicError::RootDeletion.into();
        assert!(!logic.is_permanent());
        assert!(logic.status().is_none());
    }

    #[test]
    fn test_exhausted_keeps_last_status() {
        let err = RpcError::Exhausted {
            rpc: "GetInodeAttr",
            endpoint: ep(),
            attempts: 4,
            last: ServerStatus::new(StatusCode::StaleEpoch, "epoch 3 < 4").into(),
        };
        assert_eq!(err.status().map(|s| s.code), Some(StatusCode::StaleEpoch));
        assert!(err.to_string().contains("4 attempts"));
    }
}
