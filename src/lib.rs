//! meta-walker - Bulk Walks over a Sharded Metadata Namespace
//!
//! A client-side engine for tree-shaped bulk operations against a remote,
//! horizontally sharded namespace that is only reachable through RPC:
//! recursive size/inode accounting and recursive deletion of subtrees of
//! unbounded size and depth.
//!
//! # Features
//!
//! - **Bounded Fan-out**: at most K subtree workers per walk; when every
//!   slot is taken the walk recurses inline instead of blocking.
//!
//! - **Resilient RPC**: per-attempt timeouts, a fixed-delay retry budget
//!   and immediate failure on permanent server errors.
//!
//! - **First Error Cancels**: the first failure in any branch stops every
//!   other branch before its next RPC and is the error the call returns.
//!
//! - **Hardlink-Aware Accounting**: optional dedup counts a file linked
//!   under several names once.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │              usage / delete / fs_usage / delete_path             │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         TreeWalker                               │
//! │  ┌──────────────┐  ┌──────────────────┐  ┌──────────────────┐   │
//! │  │ WalkContext  │  │BoundedDispatcher │  │ Visitor          │   │
//! │  │ epoch,cancel │  │ K slots or inline│  │ summarize/delete │   │
//! │  └──────────────┘  └──────────────────┘  └──────────────────┘   │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ MetadataOps
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         MetaClient                               │
//! │   RouterResolver ──► ResilientInvoker ──► ConnectionPool         │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ Transport
//!                               ▼
//!                    ┌──────────────────────┐
//!                    │  Metadata shards     │
//!                    │  (or InMemoryMds)    │
//!                    └──────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use meta_walker::config::Endpoint;
//! use meta_walker::mds::{InMemoryMds, MetaClient};
//!
//! let mds = InMemoryMds::new(1, "fs1");
//! let client = MetaClient::builder(mds)
//!     .coordinators(vec![Endpoint::parse("127.0.0.1:7400")?])
//!     .build()?;
//!
//! let totals = meta_walker::fs_usage(&client, 1, 8)?;
//! println!("{} bytes in {} inodes", totals.total_bytes, totals.total_inodes);
//! # Ok::<(), meta_walker::WalkerError>(())
//! ```

pub mod bulk;
pub mod config;
pub mod error;
pub mod logging;
pub mod mds;
pub mod namespace;
pub mod walker;

pub use bulk::{
    delete, delete_path, delete_with, find_filesystem, fs_usage, fs_usage_all, usage, usage_with,
    DeleteSummary,
};
pub use config::{Endpoint, RpcConfig, WalkConfig};
pub use error::{Result, WalkerError};
pub use namespace::{inode_path, resolve_dir_path};
pub use walker::{SummaryTotals, WalkContext};
