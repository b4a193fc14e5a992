//! Metadata service access
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                     MetaClient                       │
//! │  - MetadataOps used by the walker                    │
//! │  - routes each call, caches filesystem info          │
//! └──────────────┬──────────────────────┬───────────────┘
//!                │                      │
//!                ▼                      ▼
//! ┌──────────────────────────┐  ┌──────────────────────┐
//! │    ResilientInvoker      │  │   RouterResolver     │
//! │  - typed MetaRpc calls   │  │  - inode -> shard    │
//! │  - fixed-delay retries   │  │    replica list      │
//! └────────────┬─────────────┘  └──────────────────────┘
//!              │
//!              ▼
//! ┌─────────────────────────────────────────────────────┐
//! │                  ConnectionPool                      │
//! │  - lazy dial, per-endpoint idle lists                │
//! └────────────────────────┬────────────────────────────┘
//!                          │
//!                          ▼
//! ┌─────────────────────────────────────────────────────┐
//! │            Transport / MetadataConnection            │
//! │  - wire encoding lives with the implementor          │
//! │  - InMemoryMds for tests and dry runs                │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod client;
pub mod invoker;
pub mod memory;
pub mod pool;
pub mod router;
pub mod rpc;
pub mod transport;
pub mod types;

pub use client::{FsInfoCache, MetaClient, MetaClientBuilder, MetadataOps};
pub use invoker::{InvokerStats, ResilientInvoker, RetryPolicy};
pub use memory::{InMemoryConnection, InMemoryMds, MdsStats};
pub use pool::{ConnectionPool, PoolStats, PooledConnection};
pub use router::{RouterResolver, StaticShardRouter};
pub use rpc::MetaRpc;
pub use transport::{CallResult, MetadataConnection, Reply, Transport};
pub use types::{
    DirNode, EntryType, Epoch, FsId, FsInfo, InodeAttr, InodeId, NamespaceEntry, ROOT_INODE_ID,
};
