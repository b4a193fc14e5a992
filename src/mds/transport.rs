//! Transport seam between the walker and the metadata service
//!
//! The wire encoding is owned by whoever implements these traits. The
//! walker only needs a way to dial an endpoint and, on the resulting
//! connection, issue the metadata calls with a per-call timeout.
//!
//! Every call has two failure layers:
//! - the outer `Result` is the transport (dial, timeout, broken pipe)
//! - the inner [`Reply`] is the server's answer (ok or a status code)

use crate::config::Endpoint;
use crate::error::{ServerStatus, TransportError};
use crate::mds::rpc::{
    DeleteDirRequest, DeleteFileRequest, GetDentryRequest, GetFsInfoRequest, GetInodeAttrRequest,
    ListEntriesRequest, ListFsInfoRequest,
};
use crate::mds::types::{FsInfo, InodeAttr, NamespaceEntry};
use std::time::Duration;

/// Server answer to one call
pub type Reply<T> = std::result::Result<T, ServerStatus>;

/// Transport outcome of one call
pub type CallResult<T> = std::result::Result<Reply<T>, TransportError>;

/// An open connection to one metadata endpoint
///
/// A connection is used by one caller at a time; the pool hands out
/// exclusive borrows.
pub trait MetadataConnection: Send {
    fn list_entries(
        &mut self,
        req: &ListEntriesRequest,
        timeout: Duration,
    ) -> CallResult<Vec<NamespaceEntry>>;

    fn get_inode_attr(&mut self, req: &GetInodeAttrRequest, timeout: Duration)
        -> CallResult<InodeAttr>;

    fn delete_file_entry(&mut self, req: &DeleteFileRequest, timeout: Duration) -> CallResult<()>;

    /// Fails with `NotEmpty` if the directory still has children
    fn delete_directory_entry(&mut self, req: &DeleteDirRequest, timeout: Duration)
        -> CallResult<()>;

    fn get_dentry(&mut self, req: &GetDentryRequest, timeout: Duration)
        -> CallResult<NamespaceEntry>;

    fn get_fs_info(&mut self, req: &GetFsInfoRequest, timeout: Duration) -> CallResult<FsInfo>;

    /// Every filesystem, ordered by id
    fn list_fs_info(&mut self, req: &ListFsInfoRequest, timeout: Duration)
        -> CallResult<Vec<FsInfo>>;
}

/// Dials connections to metadata endpoints
pub trait Transport: Send + Sync {
    type Conn: MetadataConnection;

    fn dial(&self, endpoint: &Endpoint, timeout: Duration) -> Result<Self::Conn, TransportError>;
}
