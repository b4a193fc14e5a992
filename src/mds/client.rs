//! Routed metadata client
//!
//! `MetaClient` ties the router, the invoker and the filesystem info cache
//! together behind [`MetadataOps`], the interface the walker is written
//! against. Routing rules:
//! - listing, dentry lookup and deletes go to the shard of the parent
//! - attribute fetch goes to the shard of the parent hint when there is
//!   one, else to the shard of the inode itself
//! - filesystem info and the filesystem listing go to the coordinators

use crate::config::{Endpoint, RpcConfig, WalkConfig};
use crate::error::{ConfigError, Result};
use crate::mds::invoker::{InvokerStats, ResilientInvoker, RetryPolicy};
use crate::mds::pool::PoolStats;
use crate::mds::router::{RouterResolver, StaticShardRouter};
use crate::mds::rpc::{
    DeleteDirRequest, DeleteFileRequest, GetDentryRequest, GetFsInfoRequest, GetInodeAttrRequest,
    ListEntriesRequest, ListFsInfoRequest,
};
use crate::mds::transport::Transport;
use crate::mds::types::{Epoch, FsId, FsInfo, InodeAttr, InodeId, NamespaceEntry};
use dashmap::DashMap;
use std::time::Duration;
use tracing::debug;

/// Metadata calls the walker and the bulk operations need
pub trait MetadataOps: Sync {
    /// Prepare routing for a filesystem
    fn init_for_filesystem(&self, _fs_id: FsId) -> Result<()> {
        Ok(())
    }

    fn get_fs_info(&self, fs_id: FsId) -> Result<FsInfo>;

    /// Every filesystem the cluster serves
    fn list_fs_info(&self) -> Result<Vec<FsInfo>>;

    fn list_entries(&self, fs_id: FsId, parent: InodeId, epoch: Epoch)
        -> Result<Vec<NamespaceEntry>>;

    /// `parent_hint` is 0 when the parent is unknown
    fn get_inode_attr(
        &self,
        fs_id: FsId,
        inode: InodeId,
        parent_hint: InodeId,
        epoch: Epoch,
    ) -> Result<InodeAttr>;

    fn delete_file_entry(&self, fs_id: FsId, parent: InodeId, name: &str, epoch: Epoch)
        -> Result<()>;

    fn delete_directory_entry(
        &self,
        fs_id: FsId,
        parent: InodeId,
        name: &str,
        epoch: Epoch,
    ) -> Result<()>;

    fn get_dentry(
        &self,
        fs_id: FsId,
        parent: InodeId,
        name: &str,
        epoch: Epoch,
    ) -> Result<NamespaceEntry>;
}

/// Filesystem info by id
///
/// Entries never expire; `invalidate` drops one explicitly.
#[derive(Debug, Default)]
pub struct FsInfoCache {
    entries: DashMap<FsId, FsInfo>,
}

impl FsInfoCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, fs_id: FsId) -> Option<FsInfo> {
        self.entries.get(&fs_id).map(|info| info.value().clone())
    }

    pub fn insert(&self, info: FsInfo) {
        self.entries.insert(info.fs_id, info);
    }

    pub fn invalidate(&self, fs_id: FsId) {
        self.entries.remove(&fs_id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Metadata client over a transport
pub struct MetaClient<T: Transport> {
    invoker: ResilientInvoker<T>,
    router: Box<dyn RouterResolver>,
    coordinators: Vec<Endpoint>,
    fs_cache: FsInfoCache,
}

impl<T: Transport> MetaClient<T> {
    pub fn builder(transport: T) -> MetaClientBuilder<T> {
        MetaClientBuilder::new(transport)
    }

    pub fn fs_cache(&self) -> &FsInfoCache {
        &self.fs_cache
    }

    pub fn pool_stats(&self) -> &PoolStats {
        self.invoker.pool().stats()
    }

    pub fn invoker_stats(&self) -> &InvokerStats {
        self.invoker.stats()
    }

    pub fn transport(&self) -> &T {
        self.invoker.pool().transport()
    }

    /// Current epoch of a filesystem, through the cache
    pub fn fs_epoch(&self, fs_id: FsId) -> Result<Epoch> {
        Ok(self.get_fs_info(fs_id)?.epoch)
    }

    fn routed(&self, id: InodeId) -> Result<Vec<Endpoint>> {
        Ok(self.router.resolve(id)?)
    }
}

impl<T: Transport> MetadataOps for MetaClient<T> {
    fn init_for_filesystem(&self, fs_id: FsId) -> Result<()> {
        Ok(self.router.init_for_filesystem(fs_id)?)
    }

    fn get_fs_info(&self, fs_id: FsId) -> Result<FsInfo> {
        if let Some(info) = self.fs_cache.get(fs_id) {
            return Ok(info);
        }
        let info = self
            .invoker
            .invoke(&self.coordinators, &GetFsInfoRequest { fs_id })?;
        debug!(fs_id, fs_name = %info.fs_name, epoch = %info.epoch, "cached filesystem info");
        self.fs_cache.insert(info.clone());
        Ok(info)
    }

    /// Always asks the coordinators; the answers refresh the cache
    fn list_fs_info(&self) -> Result<Vec<FsInfo>> {
        let filesystems = self.invoker.invoke(&self.coordinators, &ListFsInfoRequest)?;
        debug!(count = filesystems.len(), "listed filesystems");
        for info in &filesystems {
            self.fs_cache.insert(info.clone());
        }
        Ok(filesystems)
    }

    fn list_entries(
        &self,
        fs_id: FsId,
        parent: InodeId,
        epoch: Epoch,
    ) -> Result<Vec<NamespaceEntry>> {
        let req = ListEntriesRequest {
            fs_id,
            parent,
            epoch,
        };
        Ok(self.invoker.invoke(&self.routed(parent)?, &req)?)
    }

    fn get_inode_attr(
        &self,
        fs_id: FsId,
        inode: InodeId,
        parent_hint: InodeId,
        epoch: Epoch,
    ) -> Result<InodeAttr> {
        let route_by = if parent_hint > 0 { parent_hint } else { inode };
        let req = GetInodeAttrRequest {
            fs_id,
            inode,
            parent_hint,
            epoch,
        };
        Ok(self.invoker.invoke(&self.routed(route_by)?, &req)?)
    }

    fn delete_file_entry(
        &self,
        fs_id: FsId,
        parent: InodeId,
        name: &str,
        epoch: Epoch,
    ) -> Result<()> {
        let req = DeleteFileRequest {
            fs_id,
            parent,
            name: name.to_string(),
            epoch,
        };
        Ok(self.invoker.invoke(&self.routed(parent)?, &req)?)
    }

    fn delete_directory_entry(
        &self,
        fs_id: FsId,
        parent: InodeId,
        name: &str,
        epoch: Epoch,
    ) -> Result<()> {
        let req = DeleteDirRequest {
            fs_id,
            parent,
            name: name.to_string(),
            epoch,
        };
        Ok(self.invoker.invoke(&self.routed(parent)?, &req)?)
    }

    fn get_dentry(
        &self,
        fs_id: FsId,
        parent: InodeId,
        name: &str,
        epoch: Epoch,
    ) -> Result<NamespaceEntry> {
        let req = GetDentryRequest {
            fs_id,
            parent,
            name: name.to_string(),
            epoch,
        };
        Ok(self.invoker.invoke(&self.routed(parent)?, &req)?)
    }
}

/// Builder for metadata clients
pub struct MetaClientBuilder<T: Transport> {
    transport: T,
    rpc: RpcConfig,
    router: Option<Box<dyn RouterResolver>>,
    coordinators: Vec<Endpoint>,
}

impl<T: Transport> MetaClientBuilder<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            rpc: RpcConfig::default(),
            router: None,
            coordinators: Vec::new(),
        }
    }

    /// Start from a validated walk configuration
    pub fn from_config(transport: T, config: &WalkConfig) -> Self {
        Self::new(transport)
            .rpc_config(config.rpc)
            .coordinators(config.coordinator_addrs.clone())
    }

    /// Set per-attempt timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.rpc.timeout = timeout;
        self
    }

    /// Set retry count
    pub fn retries(mut self, retries: u32) -> Self {
        self.rpc.retry_times = retries;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.rpc.retry_delay = delay;
        self
    }

    pub fn rpc_config(mut self, rpc: RpcConfig) -> Self {
        self.rpc = rpc;
        self
    }

    pub fn coordinators(mut self, coordinators: Vec<Endpoint>) -> Self {
        self.coordinators = coordinators;
        self
    }

    /// Shard resolver; defaults to one shard served by the coordinators
    pub fn router(mut self, router: impl RouterResolver + 'static) -> Self {
        self.router = Some(Box::new(router));
        self
    }

    pub fn build(self) -> std::result::Result<MetaClient<T>, ConfigError> {
        self.rpc.validate()?;
        if self.coordinators.is_empty() {
            return Err(ConfigError::NoCoordinator);
        }

        let router = match self.router {
            Some(router) => router,
            None => Box::new(StaticShardRouter::single(self.coordinators.clone())),
        };

        Ok(MetaClient {
            invoker: ResilientInvoker::new(self.transport, RetryPolicy::from(self.rpc)),
            router,
            coordinators: self.coordinators,
            fs_cache: FsInfoCache::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RouterError, StatusCode, WalkerError};
    use crate::mds::memory::InMemoryMds;
    use crate::mds::types::ROOT_INODE_ID;

    fn ep(addr: &str) -> Endpoint {
        Endpoint::parse(addr).unwrap()
    }

    fn sharded_client(mds: &InMemoryMds) -> MetaClient<InMemoryMds> {
        MetaClient::builder(mds.clone())
            .coordinators(vec![ep("10.0.9.1:7400")])
            .router(StaticShardRouter::new(vec![
                vec![ep("10.0.0.1:7400")],
                vec![ep("10.0.1.1:7400")],
            ]))
            .retries(1)
            .retry_delay(Duration::from_millis(1))
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_requires_coordinator() {
        let result = MetaClient::builder(InMemoryMds::new(1, "fs1")).build();
        assert!(matches!(result, Err(ConfigError::NoCoordinator)));

        let result = MetaClient::builder(InMemoryMds::new(1, "fs1"))
            .coordinators(vec![ep("10.0.9.1:7400")])
            .timeout(Duration::ZERO)
            .build();
        assert!(matches!(result, Err(ConfigError::InvalidTimeout(_))));
    }

    #[test]
    fn test_routed_call_needs_init() {
        let mds = InMemoryMds::new(1, "fs1");
        let client = sharded_client(&mds);

        let err = client
            .list_entries(1, ROOT_INODE_ID, mds.epoch())
            .unwrap_err();
        assert!(matches!(err, WalkerError::Router(RouterError::NotInitialized)));
        assert_eq!(mds.stats().total_calls(), 0);
    }

    #[test]
    fn test_routing_rules() {
        let mds = InMemoryMds::new(1, "fs1");
        // Root is inode 1, the file is inode 2
        let file = mds.create_file(ROOT_INODE_ID, "f", 7).unwrap();
        assert_eq!(file, 2);
        let client = sharded_client(&mds);
        client.init_for_filesystem(1).unwrap();
        let epoch = mds.epoch();

        let shard0 = ep("10.0.0.1:7400");
        let shard1 = ep("10.0.1.1:7400");

        // Listing routes by the parent (1 -> shard 1)
        client.list_entries(1, ROOT_INODE_ID, epoch).unwrap();
        assert_eq!(mds.dials_to(&shard1), 1);
        assert_eq!(mds.dials_to(&shard0), 0);

        // Attr without hint routes by the inode (2 -> shard 0)
        let attr = client.get_inode_attr(1, file, 0, epoch).unwrap();
        assert_eq!(attr.length, 7);
        assert_eq!(mds.dials_to(&shard0), 1);

        // Attr with hint routes by the parent, reusing the shard 1 connection
        client.get_inode_attr(1, file, ROOT_INODE_ID, epoch).unwrap();
        assert_eq!(mds.dials_to(&shard1), 1);
        assert_eq!(client.pool_stats().reused(), 1);
    }

    #[test]
    fn test_fs_info_cached() {
        let mds = InMemoryMds::new(1, "fs1");
        let client = sharded_client(&mds);

        let info = client.get_fs_info(1).unwrap();
        assert_eq!(info.fs_name, "fs1");
        assert_eq!(client.fs_epoch(1).unwrap(), mds.epoch());
        assert_eq!(mds.stats().fs_info_calls.load(std::sync::atomic::Ordering::Relaxed), 1);
        assert_eq!(mds.dials_to(&ep("10.0.9.1:7400")), 1);

        let bumped = mds.bump_epoch();
        assert_ne!(client.fs_epoch(1).unwrap(), bumped);

        client.fs_cache().invalidate(1);
        assert_eq!(client.fs_epoch(1).unwrap(), bumped);
    }

    #[test]
    fn test_permanent_error_surfaces() {
        let mds = InMemoryMds::new(1, "fs1");
        let client = sharded_client(&mds);
        client.init_for_filesystem(1).unwrap();

        let err = client
            .get_dentry(1, ROOT_INODE_ID, "missing", mds.epoch())
            .unwrap_err();
        assert!(err.is_permanent());
        assert_eq!(err.status().map(|s| s.code), Some(StatusCode::NotFound));
    }
}
