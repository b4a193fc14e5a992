//! Typed metadata RPCs
//!
//! Each request type knows its name, its response type and which
//! connection method issues it, so the invoker stays generic and every
//! call site gets a statically typed result.

use crate::mds::transport::{CallResult, MetadataConnection};
use crate::mds::types::{Epoch, FsId, FsInfo, InodeAttr, InodeId, NamespaceEntry};
use std::time::Duration;

/// One kind of metadata RPC
pub trait MetaRpc {
    /// Decoded success value
    type Output;

    /// Name used in logs and errors
    const NAME: &'static str;

    /// Issue the call on an open connection
    fn issue<C: MetadataConnection>(&self, conn: &mut C, timeout: Duration)
        -> CallResult<Self::Output>;
}

/// List the children of a directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntriesRequest {
    pub fs_id: FsId,
    pub parent: InodeId,
    pub epoch: Epoch,
}

impl MetaRpc for ListEntriesRequest {
    type Output = Vec<NamespaceEntry>;
    const NAME: &'static str = "ListEntries";

    fn issue<C: MetadataConnection>(&self, conn: &mut C, timeout: Duration)
        -> CallResult<Self::Output> {
        conn.list_entries(self, timeout)
    }
}

/// Fetch attributes of one inode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetInodeAttrRequest {
    pub fs_id: FsId,
    pub inode: InodeId,
    /// Parent directory, 0 when unknown
    pub parent_hint: InodeId,
    pub epoch: Epoch,
}

impl MetaRpc for GetInodeAttrRequest {
    type Output = InodeAttr;
    const NAME: &'static str = "GetInodeAttr";

    fn issue<C: MetadataConnection>(&self, conn: &mut C, timeout: Duration)
        -> CallResult<Self::Output> {
        conn.get_inode_attr(self, timeout)
    }
}

/// Unlink a file entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteFileRequest {
    pub fs_id: FsId,
    pub parent: InodeId,
    pub name: String,
    pub epoch: Epoch,
}

impl MetaRpc for DeleteFileRequest {
    type Output = ();
    const NAME: &'static str = "DeleteFileEntry";

    fn issue<C: MetadataConnection>(&self, conn: &mut C, timeout: Duration)
        -> CallResult<Self::Output> {
        conn.delete_file_entry(self, timeout)
    }
}

/// Remove an empty directory entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteDirRequest {
    pub fs_id: FsId,
    pub parent: InodeId,
    pub name: String,
    pub epoch: Epoch,
}

impl MetaRpc for DeleteDirRequest {
    type Output = ();
    const NAME: &'static str = "DeleteDirectoryEntry";

    fn issue<C: MetadataConnection>(&self, conn: &mut C, timeout: Duration)
        -> CallResult<Self::Output> {
        conn.delete_directory_entry(self, timeout)
    }
}

/// Look up one name in a directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetDentryRequest {
    pub fs_id: FsId,
    pub parent: InodeId,
    pub name: String,
    pub epoch: Epoch,
}

impl MetaRpc for GetDentryRequest {
    type Output = NamespaceEntry;
    const NAME: &'static str = "GetDentry";

    fn issue<C: MetadataConnection>(&self, conn: &mut C, timeout: Duration)
        -> CallResult<Self::Output> {
        conn.get_dentry(self, timeout)
    }
}

/// Fetch filesystem info (name, current epoch)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetFsInfoRequest {
    pub fs_id: FsId,
}

impl MetaRpc for GetFsInfoRequest {
    type Output = FsInfo;
    const NAME: &'static str = "GetFsInfo";

    fn issue<C: MetadataConnection>(&self, conn: &mut C, timeout: Duration)
        -> CallResult<Self::Output> {
        conn.get_fs_info(self, timeout)
    }
}

/// Fetch info of every filesystem the cluster serves
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListFsInfoRequest;

impl MetaRpc for ListFsInfoRequest {
    type Output = Vec<FsInfo>;
    const NAME: &'static str = "ListFsInfo";

    fn issue<C: MetadataConnection>(&self, conn: &mut C, timeout: Duration)
        -> CallResult<Self::Output> {
        conn.list_fs_info(self, timeout)
    }
}
