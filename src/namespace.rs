//! Path and inode lookups over the remote namespace
//!
//! The metadata service has no path-based calls. Paths are resolved one
//! component at a time with dentry lookups, and an inode's path is rebuilt
//! by climbing primary parents.

use crate::error::{LogicError, Result, WalkerError};
use crate::mds::client::MetadataOps;
use crate::mds::types::{Epoch, FsId, InodeId, ROOT_INODE_ID};
use tracing::trace;

/// Split an absolute path into its components
///
/// Empty components and `.` are dropped and `..` removes the previous
/// component, so `/a//b/./c/..` yields `["a", "b"]`. `/` yields nothing.
pub fn path_components(path: &str) -> std::result::Result<Vec<&str>, LogicError> {
    let path = path.trim();
    if !path.starts_with('/') {
        return Err(LogicError::RelativePath(path.to_string()));
    }

    let mut components = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                components.pop();
            }
            name => components.push(name),
        }
    }
    Ok(components)
}

/// Resolve an absolute directory path to its inode
///
/// `/` resolves to the root without any RPC. Every component must be a
/// directory.
pub fn resolve_dir_path<M: MetadataOps + ?Sized>(
    meta: &M,
    fs_id: FsId,
    path: &str,
    epoch: Epoch,
) -> Result<InodeId> {
    let mut inode = ROOT_INODE_ID;
    let mut walked = String::new();

    for component in path_components(path)? {
        walked.push('/');
        walked.push_str(component);

        let entry = meta.get_dentry(fs_id, inode, component, epoch)?;
        if !entry.is_dir() {
            return Err(WalkerError::NotADirectory { path: walked });
        }
        trace!(path = %walked, inode = entry.inode, "resolved component");
        inode = entry.inode;
    }

    Ok(inode)
}

/// Rebuild the absolute path of `inode` by following primary parents
pub fn inode_path<M: MetadataOps + ?Sized>(
    meta: &M,
    fs_id: FsId,
    inode: InodeId,
    epoch: Epoch,
) -> Result<String> {
    let mut names = Vec::new();
    let mut current = inode;

    while current != ROOT_INODE_ID {
        let attr = meta.get_inode_attr(fs_id, current, 0, epoch)?;
        let Some(&parent) = attr.parents.first() else {
            return Err(WalkerError::NotFound {
                parent: 0,
                name: format!("parent of inode {}", current),
            });
        };

        let name = meta
            .list_entries(fs_id, parent, epoch)?
            .into_iter()
            .find(|e| e.inode == current)
            .map(|e| e.name)
            .ok_or_else(|| WalkerError::NotFound {
                parent,
                name: format!("inode {}", current),
            })?;

        names.push(name);
        current = parent;
    }

    names.reverse();
    Ok(format!("/{}", names.join("/")))
}
