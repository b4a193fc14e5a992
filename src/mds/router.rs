//! Shard routing
//!
//! Maps a namespace id (an inode) to the ordered replica list of the shard
//! that owns it. A resolver must be initialized for a filesystem before
//! the first routed call.

use crate::config::Endpoint;
use crate::error::RouterError;
use crate::mds::types::{FsId, InodeId};
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::debug;

/// Routes namespace ids to shard endpoints
pub trait RouterResolver: Send + Sync {
    /// Prepare routing for `fs_id`; must succeed before `resolve`
    fn init_for_filesystem(&self, fs_id: FsId) -> Result<(), RouterError>;

    /// Ordered endpoints of the shard owning `id`
    fn resolve(&self, id: InodeId) -> Result<Vec<Endpoint>, RouterError>;
}

/// Resolver over a fixed shard table
///
/// Shard `i` owns every id with `id % shards.len() == i`.
#[derive(Debug)]
pub struct StaticShardRouter {
    shards: Vec<Vec<Endpoint>>,
    /// Filesystem routing was initialized for, 0 when uninitialized
    active_fs: AtomicU32,
}

impl StaticShardRouter {
    pub fn new(shards: Vec<Vec<Endpoint>>) -> Self {
        Self {
            shards,
            active_fs: AtomicU32::new(0),
        }
    }

    /// Single shard served by the given replicas
    pub fn single(replicas: Vec<Endpoint>) -> Self {
        Self::new(vec![replicas])
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn active_filesystem(&self) -> Option<FsId> {
        match self.active_fs.load(Ordering::Acquire) {
            0 => None,
            fs_id => Some(fs_id),
        }
    }
}

impl RouterResolver for StaticShardRouter {
    fn init_for_filesystem(&self, fs_id: FsId) -> Result<(), RouterError> {
        if fs_id == 0 {
            return Err(RouterError::InvalidFilesystem { fs_id });
        }
        if self.shards.is_empty() || self.shards.iter().all(Vec::is_empty) {
            return Err(RouterError::NoShards { fs_id });
        }

        let previous = self.active_fs.swap(fs_id, Ordering::AcqRel);
        if previous != fs_id {
            debug!(fs_id, shards = self.shards.len(), "router initialized");
        }
        Ok(())
    }

    fn resolve(&self, id: InodeId) -> Result<Vec<Endpoint>, RouterError> {
        if self.active_fs.load(Ordering::Acquire) == 0 {
            return Err(RouterError::NotInitialized);
        }
        let shard = (id % self.shards.len() as u64) as usize;
        Ok(self.shards[shard].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ep(addr: &str) -> Endpoint {
        Endpoint::parse(addr).unwrap()
    }

    fn two_shards() -> StaticShardRouter {
        StaticShardRouter::new(vec![
            vec![ep("10.0.0.1:7400"), ep("10.0.0.2:7400")],
            vec![ep("10.0.1.1:7400")],
        ])
    }

    #[test]
    fn test_resolve_before_init() {
        let router = two_shards();
        assert_eq!(router.resolve(5), Err(RouterError::NotInitialized));
        assert_eq!(router.active_filesystem(), None);
    }

    #[test]
    fn test_modulo_routing() {
        let router = two_shards();
        router.init_for_filesystem(3).unwrap();
        assert_eq!(router.active_filesystem(), Some(3));

        assert_eq!(router.resolve(4).unwrap().len(), 2);
        assert_eq!(router.resolve(7).unwrap(), vec![ep("10.0.1.1:7400")]);
    }

    #[test]
    fn test_init_errors() {
        assert_eq!(
            two_shards().init_for_filesystem(0),
            Err(RouterError::InvalidFilesystem { fs_id: 0 })
        );
        assert_eq!(
            StaticShardRouter::new(Vec::new()).init_for_filesystem(1),
            Err(RouterError::NoShards { fs_id: 1 })
        );
        assert_eq!(
            StaticShardRouter::single(Vec::new()).init_for_filesystem(1),
            Err(RouterError::NoShards { fs_id: 1 })
        );
    }
}
