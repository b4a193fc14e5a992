//! In-process metadata service
//!
//! `InMemoryMds` implements [`Transport`] over a namespace held in memory.
//! It serves every metadata call with the same status codes a real shard
//! would, and lets tests inject faults:
//! - unreachable endpoints (dial fails)
//! - bursts of transport failures or status answers
//! - permanent failures on one inode's listing or attribute fetch
//! - connections that fail every call at the transport layer
//! - per-call latency, turned into a timeout when it exceeds the call budget
//!
//! One service can hold several filesystems, each with its own namespace
//! and epoch. All endpoints serve all of them; routing only decides which
//! endpoint a call is counted against.

use crate::config::Endpoint;
use crate::error::{ServerStatus, StatusCode, TransportError};
use crate::mds::rpc::{
    DeleteDirRequest, DeleteFileRequest, GetDentryRequest, GetFsInfoRequest, GetInodeAttrRequest,
    ListEntriesRequest, ListFsInfoRequest,
};
use crate::mds::transport::{CallResult, MetadataConnection, Reply, Transport};
use crate::mds::types::{
    EntryType, Epoch, FsId, FsInfo, InodeAttr, InodeId, NamespaceEntry, ROOT_INODE_ID,
};
use dashmap::{DashMap, DashSet};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug)]
struct Node {
    attr: InodeAttr,
    children: BTreeMap<String, InodeId>,
}

#[derive(Debug)]
struct Namespace {
    nodes: HashMap<InodeId, Node>,
    next_inode: InodeId,
}

impl Namespace {
    fn new() -> Self {
        let root = Node {
            attr: InodeAttr {
                inode: ROOT_INODE_ID,
                length: 0,
                nlink: 2,
                entry_type: EntryType::Directory,
                parents: Vec::new(),
            },
            children: BTreeMap::new(),
        };
        let mut nodes = HashMap::new();
        nodes.insert(ROOT_INODE_ID, root);
        Self {
            nodes,
            next_inode: ROOT_INODE_ID + 1,
        }
    }

    fn dir(&self, inode: InodeId) -> Reply<&Node> {
        let node = self
            .nodes
            .get(&inode)
            .ok_or_else(|| ServerStatus::new(StatusCode::NotFound, format!("inode {}", inode)))?;
        if !node.attr.entry_type.is_dir() {
            return Err(ServerStatus::new(
                StatusCode::NotDirectory,
                format!("inode {}", inode),
            ));
        }
        Ok(node)
    }

    fn child(&self, parent: InodeId, name: &str) -> Reply<InodeId> {
        self.dir(parent)?
            .children
            .get(name)
            .copied()
            .ok_or_else(|| {
                ServerStatus::new(
                    StatusCode::NotFound,
                    format!("'{}' under inode {}", name, parent),
                )
            })
    }

    fn entry(&self, parent: InodeId, name: &str, inode: InodeId) -> NamespaceEntry {
        let entry_type = self
            .nodes
            .get(&inode)
            .map(|n| n.attr.entry_type)
            .unwrap_or(EntryType::File);
        NamespaceEntry {
            name: name.to_string(),
            inode,
            parent,
            entry_type,
        }
    }

    fn insert(
        &mut self,
        parent: InodeId,
        name: &str,
        entry_type: EntryType,
        length: u64,
    ) -> Reply<InodeId> {
        if name.is_empty() || name.contains('/') {
            return Err(ServerStatus::new(
                StatusCode::Internal,
                format!("invalid name '{}'", name),
            ));
        }
        if self.dir(parent)?.children.contains_key(name) {
            return Err(ServerStatus::new(
                StatusCode::Internal,
                format!("'{}' already exists under inode {}", name, parent),
            ));
        }

        let inode = self.next_inode;
        self.next_inode += 1;
        let nlink = if entry_type.is_dir() { 2 } else { 1 };
        self.nodes.insert(
            inode,
            Node {
                attr: InodeAttr {
                    inode,
                    length,
                    nlink,
                    entry_type,
                    parents: vec![parent],
                },
                children: BTreeMap::new(),
            },
        );
        if let Some(dir) = self.nodes.get_mut(&parent) {
            dir.children.insert(name.to_string(), inode);
        }
        Ok(inode)
    }
}

/// One filesystem served by the service
#[derive(Debug)]
struct Filesystem {
    fs_id: FsId,
    fs_name: String,
    epoch: AtomicU64,
    ns: RwLock<Namespace>,
}

impl Filesystem {
    fn new(fs_id: FsId, fs_name: String) -> Self {
        Self {
            fs_id,
            fs_name,
            epoch: AtomicU64::new(1),
            ns: RwLock::new(Namespace::new()),
        }
    }

    fn info(&self) -> FsInfo {
        FsInfo {
            fs_id: self.fs_id,
            fs_name: self.fs_name.clone(),
            epoch: Epoch(self.epoch.load(Ordering::Acquire)),
        }
    }
}

/// Call counters kept by the service
#[derive(Debug, Default)]
pub struct MdsStats {
    pub list_calls: AtomicU64,
    pub attr_calls: AtomicU64,
    pub delete_file_calls: AtomicU64,
    pub delete_dir_calls: AtomicU64,
    pub dentry_calls: AtomicU64,
    pub fs_info_calls: AtomicU64,
    pub list_fs_calls: AtomicU64,

    /// Listings currently being served
    pub active_lists: AtomicU64,

    /// Highest value `active_lists` reached
    pub peak_lists: AtomicU64,
}

impl MdsStats {
    pub fn list_calls(&self) -> u64 {
        self.list_calls.load(Ordering::Relaxed)
    }

    pub fn attr_calls(&self) -> u64 {
        self.attr_calls.load(Ordering::Relaxed)
    }

    pub fn delete_calls(&self) -> u64 {
        self.delete_file_calls.load(Ordering::Relaxed)
            + self.delete_dir_calls.load(Ordering::Relaxed)
    }

    pub fn peak_lists(&self) -> u64 {
        self.peak_lists.load(Ordering::Relaxed)
    }

    /// Every call issued on a connection, of any kind
    pub fn total_calls(&self) -> u64 {
        self.list_calls()
            + self.attr_calls()
            + self.delete_calls()
            + self.dentry_calls.load(Ordering::Relaxed)
            + self.fs_info_calls.load(Ordering::Relaxed)
            + self.list_fs_calls.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
struct Faults {
    transport_burst: u32,
    broken_dials: u32,
    status_burst: u32,
    status_code: Option<StatusCode>,
    list_failures: HashMap<InodeId, StatusCode>,
    attr_failures: HashMap<InodeId, StatusCode>,
}

#[derive(Debug)]
struct Inner {
    filesystems: RwLock<BTreeMap<FsId, Arc<Filesystem>>>,
    unreachable: DashSet<Endpoint>,
    dials: DashMap<Endpoint, u64>,
    faults: Mutex<Faults>,
    latency: Mutex<Duration>,
    deleted: Mutex<Vec<String>>,
    stats: MdsStats,
}

impl Inner {
    /// Transport faults and latency, applied before the server looks at
    /// the request
    fn preflight(&self, endpoint: &Endpoint, timeout: Duration) -> Result<(), TransportError> {
        {
            let mut faults = self.faults.lock();
            if faults.transport_burst > 0 {
                faults.transport_burst -= 1;
                return Err(TransportError::Disconnected {
                    endpoint: endpoint.clone(),
                    reason: "injected transport failure".into(),
                });
            }
        }

        let latency = *self.latency.lock();
        if latency.is_zero() {
            return Ok(());
        }
        if latency > timeout {
            thread::sleep(timeout);
            return Err(TransportError::Timeout {
                endpoint: endpoint.clone(),
                timeout,
            });
        }
        thread::sleep(latency);
        Ok(())
    }

    fn take_status_fault(&self) -> Option<ServerStatus> {
        let mut faults = self.faults.lock();
        if faults.status_burst == 0 {
            return None;
        }
        faults.status_burst -= 1;
        let code = faults.status_code.unwrap_or(StatusCode::Busy);
        Some(ServerStatus::new(code, "injected status"))
    }

    fn filesystem(&self, fs_id: FsId) -> Reply<Arc<Filesystem>> {
        self.filesystems
            .read()
            .get(&fs_id)
            .cloned()
            .ok_or_else(|| ServerStatus::new(StatusCode::NoSuchFilesystem, format!("fs {}", fs_id)))
    }

    /// The addressed filesystem, if it exists and `epoch` is current
    fn check_request(&self, fs_id: FsId, epoch: Epoch) -> Reply<Arc<Filesystem>> {
        let fs = self.filesystem(fs_id)?;
        let current = fs.epoch.load(Ordering::Acquire);
        if epoch.get() != current {
            return Err(ServerStatus::new(
                StatusCode::StaleEpoch,
                format!("epoch {} != {}", epoch, current),
            ));
        }
        Ok(fs)
    }

    fn call<T>(
        &self,
        endpoint: &Endpoint,
        timeout: Duration,
        counter: &AtomicU64,
        serve: impl FnOnce(&Inner) -> Reply<T>,
    ) -> CallResult<T> {
        counter.fetch_add(1, Ordering::Relaxed);
        self.preflight(endpoint, timeout)?;
        if let Some(status) = self.take_status_fault() {
            return Ok(Err(status));
        }
        Ok(serve(self))
    }
}

/// Metadata service held in process memory
///
/// A handle builds and inspects one filesystem; clones and the handles
/// returned by [`add_filesystem`](Self::add_filesystem) share the service.
#[derive(Debug, Clone)]
pub struct InMemoryMds {
    inner: Arc<Inner>,
    fs: Arc<Filesystem>,
}

impl InMemoryMds {
    /// Service with one empty filesystem holding only the root directory,
    /// at epoch 1
    pub fn new(fs_id: FsId, fs_name: impl Into<String>) -> Self {
        let fs = Arc::new(Filesystem::new(fs_id, fs_name.into()));
        let mut filesystems = BTreeMap::new();
        filesystems.insert(fs_id, Arc::clone(&fs));

        Self {
            fs,
            inner: Arc::new(Inner {
                filesystems: RwLock::new(filesystems),
                unreachable: DashSet::new(),
                dials: DashMap::new(),
                faults: Mutex::new(Faults::default()),
                latency: Mutex::new(Duration::ZERO),
                deleted: Mutex::new(Vec::new()),
                stats: MdsStats::default(),
            }),
        }
    }

    /// Handle to filesystem `fs_id` on the same service, created empty if
    /// it does not exist yet
    pub fn add_filesystem(&self, fs_id: FsId, fs_name: impl Into<String>) -> InMemoryMds {
        let fs = Arc::clone(
            self.inner
                .filesystems
                .write()
                .entry(fs_id)
                .or_insert_with(|| Arc::new(Filesystem::new(fs_id, fs_name.into()))),
        );
        Self {
            inner: Arc::clone(&self.inner),
            fs,
        }
    }

    pub fn fs_id(&self) -> FsId {
        self.fs.fs_id
    }

    pub fn fs_name(&self) -> &str {
        &self.fs.fs_name
    }

    pub fn epoch(&self) -> Epoch {
        Epoch(self.fs.epoch.load(Ordering::Acquire))
    }

    /// Advance the namespace generation; requests carrying the old epoch
    /// are answered with `StaleEpoch`
    pub fn bump_epoch(&self) -> Epoch {
        Epoch(self.fs.epoch.fetch_add(1, Ordering::AcqRel) + 1)
    }

    pub fn mkdir(&self, parent: InodeId, name: &str) -> Reply<InodeId> {
        self.fs
            .ns
            .write()
            .insert(parent, name, EntryType::Directory, 0)
    }

    pub fn create_file(&self, parent: InodeId, name: &str, length: u64) -> Reply<InodeId> {
        self.fs
            .ns
            .write()
            .insert(parent, name, EntryType::File, length)
    }

    /// Add another name for an existing file
    pub fn link(&self, parent: InodeId, name: &str, target: InodeId) -> Reply<()> {
        let mut ns = self.fs.ns.write();
        match ns.nodes.get(&target) {
            None => {
                return Err(ServerStatus::new(
                    StatusCode::NotFound,
                    format!("inode {}", target),
                ))
            }
            Some(node) if node.attr.entry_type.is_dir() => {
                return Err(ServerStatus::new(
                    StatusCode::IsDirectory,
                    format!("inode {}", target),
                ))
            }
            Some(_) => {}
        }
        if ns.dir(parent)?.children.contains_key(name) {
            return Err(ServerStatus::new(
                StatusCode::Internal,
                format!("'{}' already exists under inode {}", name, parent),
            ));
        }

        if let Some(dir) = ns.nodes.get_mut(&parent) {
            dir.children.insert(name.to_string(), target);
        }
        if let Some(node) = ns.nodes.get_mut(&target) {
            node.attr.nlink += 1;
            node.attr.parents.push(parent);
        }
        Ok(())
    }

    /// Create every missing directory along an absolute path
    pub fn mkdir_p(&self, path: &str) -> Reply<InodeId> {
        let mut current = ROOT_INODE_ID;
        for component in path.split('/').filter(|c| !c.is_empty()) {
            let existing = self.fs.ns.read().child(current, component).ok();
            current = match existing {
                Some(inode) => inode,
                None => self.mkdir(current, component)?,
            };
        }
        Ok(current)
    }

    /// Inode at an absolute path, if present
    pub fn lookup_path(&self, path: &str) -> Option<InodeId> {
        let ns = self.fs.ns.read();
        let mut current = ROOT_INODE_ID;
        for component in path.split('/').filter(|c| !c.is_empty()) {
            current = ns.child(current, component).ok()?;
        }
        Some(current)
    }

    pub fn exists(&self, inode: InodeId) -> bool {
        self.fs.ns.read().nodes.contains_key(&inode)
    }

    /// Number of inodes, root included
    pub fn inode_count(&self) -> usize {
        self.fs.ns.read().nodes.len()
    }

    /// Names of removed entries, in the order they were removed
    pub fn deleted_log(&self) -> Vec<String> {
        self.inner.deleted.lock().clone()
    }

    pub fn stats(&self) -> &MdsStats {
        &self.inner.stats
    }

    /// Dials made to one endpoint
    pub fn dials_to(&self, endpoint: &Endpoint) -> u64 {
        self.inner.dials.get(endpoint).map(|n| *n).unwrap_or(0)
    }

    /// Make dials to `endpoint` fail
    pub fn set_unreachable(&self, endpoint: &Endpoint) {
        self.inner.unreachable.insert(endpoint.clone());
    }

    /// Answer the next `n` calls of any kind with `code`
    pub fn fail_next_calls(&self, n: u32, code: StatusCode) {
        let mut faults = self.inner.faults.lock();
        faults.status_burst = n;
        faults.status_code = Some(code);
    }

    /// Break the next `n` calls of any kind at the transport layer
    pub fn fail_next_transport(&self, n: u32) {
        self.inner.faults.lock().transport_burst = n;
    }

    /// Hand out `n` connections on which every call fails at the
    /// transport layer; later dials are healthy
    pub fn break_next_connections(&self, n: u32) {
        self.inner.faults.lock().broken_dials = n;
    }

    /// Answer every listing of `inode` with `code`
    pub fn fail_listing(&self, inode: InodeId, code: StatusCode) {
        self.inner.faults.lock().list_failures.insert(inode, code);
    }

    /// Answer every attribute fetch of `inode` with `code`
    pub fn fail_attr(&self, inode: InodeId, code: StatusCode) {
        self.inner.faults.lock().attr_failures.insert(inode, code);
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        *self.inner.latency.lock() = latency;
    }
}

impl Transport for InMemoryMds {
    type Conn = InMemoryConnection;

    fn dial(&self, endpoint: &Endpoint, _timeout: Duration) -> Result<Self::Conn, TransportError> {
        *self.inner.dials.entry(endpoint.clone()).or_insert(0) += 1;
        if self.inner.unreachable.contains(endpoint) {
            return Err(TransportError::ConnectFailed {
                endpoint: endpoint.clone(),
                reason: "connection refused".into(),
            });
        }
        let broken = {
            let mut faults = self.inner.faults.lock();
            let broken = faults.broken_dials > 0;
            faults.broken_dials = faults.broken_dials.saturating_sub(1);
            broken
        };
        Ok(InMemoryConnection {
            inner: Arc::clone(&self.inner),
            endpoint: endpoint.clone(),
            broken,
        })
    }
}

/// Connection handed out by [`InMemoryMds`]
#[derive(Debug)]
pub struct InMemoryConnection {
    inner: Arc<Inner>,
    endpoint: Endpoint,
    broken: bool,
}

impl InMemoryConnection {
    fn call<T>(
        &self,
        timeout: Duration,
        counter: &AtomicU64,
        serve: impl FnOnce(&Inner) -> Reply<T>,
    ) -> CallResult<T> {
        if self.broken {
            counter.fetch_add(1, Ordering::Relaxed);
            return Err(TransportError::Disconnected {
                endpoint: self.endpoint.clone(),
                reason: "connection reset by peer".into(),
            });
        }
        self.inner.call(&self.endpoint, timeout, counter, serve)
    }
}

impl MetadataConnection for InMemoryConnection {
    fn list_entries(
        &mut self,
        req: &ListEntriesRequest,
        timeout: Duration,
    ) -> CallResult<Vec<NamespaceEntry>> {
        let stats = &self.inner.stats;
        let active = stats.active_lists.fetch_add(1, Ordering::AcqRel) + 1;
        stats.peak_lists.fetch_max(active, Ordering::AcqRel);

        let result = self.call(timeout, &stats.list_calls, |inner| {
            let fs = inner.check_request(req.fs_id, req.epoch)?;
            if let Some(code) = inner.faults.lock().list_failures.get(&req.parent) {
                return Err(ServerStatus::new(*code, format!("inode {}", req.parent)));
            }
            let ns = fs.ns.read();
            let dir = ns.dir(req.parent)?;
            Ok(dir
                .children
                .iter()
                .map(|(name, inode)| ns.entry(req.parent, name, *inode))
                .collect())
        });

        stats.active_lists.fetch_sub(1, Ordering::AcqRel);
        result
    }

    fn get_inode_attr(
        &mut self,
        req: &GetInodeAttrRequest,
        timeout: Duration,
    ) -> CallResult<InodeAttr> {
        let stats = &self.inner.stats;
        self.call(timeout, &stats.attr_calls, |inner| {
            let fs = inner.check_request(req.fs_id, req.epoch)?;
            if let Some(code) = inner.faults.lock().attr_failures.get(&req.inode) {
                return Err(ServerStatus::new(*code, format!("inode {}", req.inode)));
            }
            let ns = fs.ns.read();
            ns.nodes
                .get(&req.inode)
                .map(|node| node.attr.clone())
                .ok_or_else(|| {
                    ServerStatus::new(StatusCode::NotFound, format!("inode {}", req.inode))
                })
        })
    }

    fn delete_file_entry(&mut self, req: &DeleteFileRequest, timeout: Duration) -> CallResult<()> {
        let stats = &self.inner.stats;
        self.call(timeout, &stats.delete_file_calls, |inner| {
            let fs = inner.check_request(req.fs_id, req.epoch)?;
            let mut ns = fs.ns.write();
            let inode = ns.child(req.parent, &req.name)?;
            let is_dir = ns
                .nodes
                .get(&inode)
                .map(|n| n.attr.entry_type.is_dir())
                .unwrap_or(false);
            if is_dir {
                return Err(ServerStatus::new(
                    StatusCode::IsDirectory,
                    format!("'{}' under inode {}", req.name, req.parent),
                ));
            }

            if let Some(dir) = ns.nodes.get_mut(&req.parent) {
                dir.children.remove(&req.name);
            }
            let orphaned = match ns.nodes.get_mut(&inode) {
                Some(node) => {
                    node.attr.nlink = node.attr.nlink.saturating_sub(1);
                    if let Some(pos) = node.attr.parents.iter().position(|p| *p == req.parent)
                    {
                        node.attr.parents.remove(pos);
                    }
                    node.attr.nlink == 0
                }
                None => false,
            };
            if orphaned {
                ns.nodes.remove(&inode);
            }
            inner.deleted.lock().push(req.name.clone());
            Ok(())
        })
    }

    fn delete_directory_entry(
        &mut self,
        req: &DeleteDirRequest,
        timeout: Duration,
    ) -> CallResult<()> {
        let stats = &self.inner.stats;
        self.call(timeout, &stats.delete_dir_calls, |inner| {
            let fs = inner.check_request(req.fs_id, req.epoch)?;
            let mut ns = fs.ns.write();
            let inode = ns.child(req.parent, &req.name)?;
            let node = ns.dir(inode)?;
            if !node.children.is_empty() {
                return Err(ServerStatus::new(
                    StatusCode::NotEmpty,
                    format!("'{}' has {} entries", req.name, node.children.len()),
                ));
            }

            ns.nodes.remove(&inode);
            if let Some(dir) = ns.nodes.get_mut(&req.parent) {
                dir.children.remove(&req.name);
            }
            inner.deleted.lock().push(req.name.clone());
            Ok(())
        })
    }

    fn get_dentry(
        &mut self,
        req: &GetDentryRequest,
        timeout: Duration,
    ) -> CallResult<NamespaceEntry> {
        let stats = &self.inner.stats;
        self.call(timeout, &stats.dentry_calls, |inner| {
            let fs = inner.check_request(req.fs_id, req.epoch)?;
            let ns = fs.ns.read();
            let inode = ns.child(req.parent, &req.name)?;
            Ok(ns.entry(req.parent, &req.name, inode))
        })
    }

    fn get_fs_info(&mut self, req: &GetFsInfoRequest, timeout: Duration) -> CallResult<FsInfo> {
        let stats = &self.inner.stats;
        self.call(timeout, &stats.fs_info_calls, |inner| {
            Ok(inner.filesystem(req.fs_id)?.info())
        })
    }

    fn list_fs_info(
        &mut self,
        _req: &ListFsInfoRequest,
        timeout: Duration,
    ) -> CallResult<Vec<FsInfo>> {
        let stats = &self.inner.stats;
        self.call(timeout, &stats.list_fs_calls, |inner| {
            let filesystems = inner.filesystems.read();
            Ok(filesystems.values().map(|fs| fs.info()).collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn connect(mds: &InMemoryMds) -> InMemoryConnection {
        mds.dial(&Endpoint::parse("127.0.0.1:7400").unwrap(), TIMEOUT)
            .unwrap()
    }

    fn list(conn: &mut InMemoryConnection, parent: InodeId, epoch: Epoch) -> Reply<Vec<String>> {
        let req = ListEntriesRequest {
            fs_id: 1,
            parent,
            epoch,
        };
        conn.list_entries(&req, TIMEOUT)
            .unwrap()
            .map(|entries| entries.into_iter().map(|e| e.name).collect())
    }

    #[test]
    fn test_build_and_list() {
        let mds = InMemoryMds::new(1, "fs1");
        let a = mds.mkdir(ROOT_INODE_ID, "a").unwrap();
        mds.create_file(a, "z", 5).unwrap();
        mds.create_file(a, "f", 10).unwrap();
        mds.mkdir(a, "b").unwrap();

        let mut conn = connect(&mds);
        assert_eq!(list(&mut conn, a, mds.epoch()).unwrap(), vec!["b", "f", "z"]);
        assert_eq!(mds.lookup_path("/a/f").map(|i| mds.exists(i)), Some(true));
        assert!(mds.lookup_path("/a/missing").is_none());
        assert_eq!(mds.mkdir_p("/a/b").unwrap(), mds.lookup_path("/a/b").unwrap());
    }

    #[test]
    fn test_stale_epoch() {
        let mds = InMemoryMds::new(1, "fs1");
        let old = mds.epoch();
        let new = mds.bump_epoch();
        assert_eq!(new.get(), old.get() + 1);

        let mut conn = connect(&mds);
        let err = list(&mut conn, ROOT_INODE_ID, old).unwrap_err();
        assert_eq!(err.code, StatusCode::StaleEpoch);
        assert!(list(&mut conn, ROOT_INODE_ID, new).is_ok());
    }

    #[test]
    fn test_hardlink_and_unlink() {
        let mds = InMemoryMds::new(1, "fs1");
        let d1 = mds.mkdir(ROOT_INODE_ID, "d1").unwrap();
        let d2 = mds.mkdir(ROOT_INODE_ID, "d2").unwrap();
        let f = mds.create_file(d1, "data", 100).unwrap();
        mds.link(d2, "alias", f).unwrap();

        let mut conn = connect(&mds);
        let attr_req = GetInodeAttrRequest {
            fs_id: 1,
            inode: f,
            parent_hint: d1,
            epoch: mds.epoch(),
        };
        let attr = conn.get_inode_attr(&attr_req, TIMEOUT).unwrap().unwrap();
        assert_eq!(attr.nlink, 2);
        assert_eq!(attr.parents, vec![d1, d2]);

        let del = DeleteFileRequest {
            fs_id: 1,
            parent: d1,
            name: "data".into(),
            epoch: mds.epoch(),
        };
        conn.delete_file_entry(&del, TIMEOUT).unwrap().unwrap();
        assert!(mds.exists(f));
        let attr = conn.get_inode_attr(&attr_req, TIMEOUT).unwrap().unwrap();
        assert_eq!(attr.nlink, 1);
        assert_eq!(attr.parents, vec![d2]);
    }

    #[test]
    fn test_delete_semantics() {
        let mds = InMemoryMds::new(1, "fs1");
        let a = mds.mkdir(ROOT_INODE_ID, "a").unwrap();
        mds.create_file(a, "f", 1).unwrap();
        let mut conn = connect(&mds);
        let epoch = mds.epoch();

        let rmdir = DeleteDirRequest {
            fs_id: 1,
            parent: ROOT_INODE_ID,
            name: "a".into(),
            epoch,
        };
        let err = conn.delete_directory_entry(&rmdir, TIMEOUT).unwrap().unwrap_err();
        assert_eq!(err.code, StatusCode::NotEmpty);

        let unlink_dir = DeleteFileRequest {
            fs_id: 1,
            parent: ROOT_INODE_ID,
            name: "a".into(),
            epoch,
        };
        let err = conn.delete_file_entry(&unlink_dir, TIMEOUT).unwrap().unwrap_err();
        assert_eq!(err.code, StatusCode::IsDirectory);

        let unlink = DeleteFileRequest {
            fs_id: 1,
            parent: a,
            name: "f".into(),
            epoch,
        };
        conn.delete_file_entry(&unlink, TIMEOUT).unwrap().unwrap();
        conn.delete_directory_entry(&rmdir, TIMEOUT).unwrap().unwrap();

        assert_eq!(mds.deleted_log(), vec!["f", "a"]);
        assert_eq!(mds.inode_count(), 1);
    }

    #[test]
    fn test_injected_faults() {
        let mds = InMemoryMds::new(1, "fs1");
        let mut conn = connect(&mds);
        let epoch = mds.epoch();

        mds.fail_next_transport(1);
        let req = ListEntriesRequest {
            fs_id: 1,
            parent: ROOT_INODE_ID,
            epoch,
        };
        assert!(conn.list_entries(&req, TIMEOUT).is_err());

        mds.fail_next_calls(1, StatusCode::ShardMoved);
        let err = list(&mut conn, ROOT_INODE_ID, epoch).unwrap_err();
        assert_eq!(err.code, StatusCode::ShardMoved);

        assert!(list(&mut conn, ROOT_INODE_ID, epoch).is_ok());
        assert_eq!(mds.stats().list_calls(), 3);
    }

    #[test]
    fn test_latency_over_timeout() {
        let mds = InMemoryMds::new(1, "fs1");
        let mut conn = connect(&mds);
        mds.set_latency(Duration::from_millis(50));

        let req = ListEntriesRequest {
            fs_id: 1,
            parent: ROOT_INODE_ID,
            epoch: mds.epoch(),
        };
        let err = conn
            .list_entries(&req, Duration::from_millis(10))
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout { .. }));
    }

    #[test]
    fn test_broken_connection_stays_broken() {
        let mds = InMemoryMds::new(1, "fs1");
        mds.break_next_connections(1);
        let mut broken = connect(&mds);
        let mut healthy = connect(&mds);

        let req = ListEntriesRequest {
            fs_id: 1,
            parent: ROOT_INODE_ID,
            epoch: mds.epoch(),
        };
        for _ in 0..3 {
            assert!(matches!(
                broken.list_entries(&req, TIMEOUT),
                Err(TransportError::Disconnected { .. })
            ));
        }
        assert!(healthy.list_entries(&req, TIMEOUT).unwrap().is_ok());
    }

    #[test]
    fn test_filesystems_are_separate() {
        let mds = InMemoryMds::new(1, "fs1");
        let other = mds.add_filesystem(2, "fs2");
        other.mkdir(ROOT_INODE_ID, "only-in-fs2").unwrap();
        other.bump_epoch();

        let mut conn = connect(&mds);
        assert!(list(&mut conn, ROOT_INODE_ID, mds.epoch()).unwrap().is_empty());

        let req = ListEntriesRequest {
            fs_id: 2,
            parent: ROOT_INODE_ID,
            epoch: other.epoch(),
        };
        let names: Vec<String> = conn
            .list_entries(&req, TIMEOUT)
            .unwrap()
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["only-in-fs2"]);

        let infos = conn.list_fs_info(&ListFsInfoRequest, TIMEOUT).unwrap().unwrap();
        let summary: Vec<_> = infos.iter().map(|i| (i.fs_id, i.epoch.get())).collect();
        assert_eq!(summary, vec![(1, 1), (2, 2)]);

        // Existing filesystems are not replaced
        assert_eq!(mds.add_filesystem(2, "renamed").fs_name(), "fs2");
    }

    #[test]
    fn test_unreachable_counts_dial() {
        let mds = InMemoryMds::new(1, "fs1");
        let ep = Endpoint::parse("10.0.0.9:7400").unwrap();
        mds.set_unreachable(&ep);
        assert!(mds.dial(&ep, TIMEOUT).is_err());
        assert_eq!(mds.dials_to(&ep), 1);
    }
}
