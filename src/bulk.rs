//! Bulk operations over a subtree
//!
//! - `usage`: total bytes and inodes under a directory
//! - `delete`: remove a directory and everything under it, post-order
//! - `fs_usage` and `delete_path`: the same, starting from a filesystem id
//!   and a path instead of a pinned epoch and inode
//! - `fs_usage_all`: `fs_usage` of every filesystem in the cluster
//!
//! Each call validates its arguments before the first RPC, runs one walk
//! with its own concurrency bound and returns either the totals or the
//! first error. There is no rollback: entries removed before a failure
//! stay removed, and partial counts are only logged.

use crate::error::{LogicError, Result, WalkerError};
use crate::mds::client::MetadataOps;
use crate::mds::types::{DirNode, Epoch, FsId, FsInfo, InodeId, ROOT_INODE_ID};
use crate::namespace::{path_components, resolve_dir_path};
use crate::walker::context::{check_concurrency, WalkContext};
use crate::walker::tree::TreeWalker;
use crate::walker::visitor::{DeleteVisitor, SummarizeVisitor, SummaryTotals};
use humansize::{format_size, BINARY};
use std::time::Instant;
use tracing::{info, warn};

/// Outcome of a recursive delete
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteSummary {
    /// Entries removed, the target directory included
    pub deleted_inodes: u64,
}

/// Bytes and inodes under `root_inode`, the root itself counted once
///
/// With `check_mode` a file linked under several names adds its length
/// once; every name still counts as an inode.
pub fn usage<M: MetadataOps + ?Sized>(
    meta: &M,
    fs_id: FsId,
    root_inode: InodeId,
    check_mode: bool,
    epoch: Epoch,
    threads: usize,
) -> Result<SummaryTotals> {
    let ctx = WalkContext::new(fs_id, epoch, threads)?;
    usage_with(meta, &ctx, root_inode, check_mode)
}

/// [`usage`] with a caller-built context, e.g. one sharing a cancel flag
pub fn usage_with<M: MetadataOps + ?Sized>(
    meta: &M,
    ctx: &WalkContext,
    root_inode: InodeId,
    check_mode: bool,
) -> Result<SummaryTotals> {
    info!(fs_id = ctx.fs_id(), inode = root_inode, "summarizing directory");
    let start = Instant::now();

    let visitor = SummarizeVisitor::new(check_mode);
    let walker = TreeWalker::new(meta, &visitor, ctx);
    if let Err(e) = walker.run(&DirNode::new(root_inode, 0, "")) {
        let partial = visitor.totals();
        warn!(
            inode = root_inode,
            inodes = partial.total_inodes,
            size = %format_size(partial.total_bytes, BINARY),
            error = %e,
            "usage walk failed"
        );
        return Err(e);
    }

    let mut totals = visitor.totals();
    totals.total_inodes += 1;

    info!(
        inode = root_inode,
        inodes = totals.total_inodes,
        size = %format_size(totals.total_bytes, BINARY),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "usage complete"
    );
    Ok(totals)
}

/// Delete directory `target` (entry `name` under `parent`) and its subtree
///
/// The root and empty names are rejected before any RPC.
pub fn delete<M: MetadataOps + ?Sized>(
    meta: &M,
    fs_id: FsId,
    parent: InodeId,
    target: InodeId,
    name: &str,
    epoch: Epoch,
    threads: usize,
) -> Result<DeleteSummary> {
    check_delete_target(target, name)?;
    let ctx = WalkContext::new(fs_id, epoch, threads)?;
    delete_with(meta, &ctx, parent, target, name)
}

/// [`delete`] with a caller-built context
pub fn delete_with<M: MetadataOps + ?Sized>(
    meta: &M,
    ctx: &WalkContext,
    parent: InodeId,
    target: InodeId,
    name: &str,
) -> Result<DeleteSummary> {
    check_delete_target(target, name)?;
    info!(fs_id = ctx.fs_id(), parent, inode = target, name, "deleting directory");
    let start = Instant::now();

    let visitor = DeleteVisitor::new();
    let walker = TreeWalker::new(meta, &visitor, ctx);
    if let Err(e) = walker.run(&DirNode::new(target, parent, name)) {
        warn!(
            inode = target,
            name,
            deleted = visitor.deleted(),
            error = %e,
            "delete walk failed, already deleted entries stay deleted"
        );
        return Err(e);
    }

    let summary = DeleteSummary {
        deleted_inodes: visitor.deleted(),
    };
    info!(
        inode = target,
        name,
        deleted = summary.deleted_inodes,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "delete complete"
    );
    Ok(summary)
}

fn check_delete_target(target: InodeId, name: &str) -> std::result::Result<(), LogicError> {
    if target == ROOT_INODE_ID || name.trim() == "/" {
        return Err(LogicError::RootDeletion);
    }
    if name.is_empty() {
        return Err(LogicError::EmptyName);
    }
    Ok(())
}

/// Usage of a whole filesystem with hardlink dedup, at its current epoch
pub fn fs_usage<M: MetadataOps + ?Sized>(meta: &M, fs_id: FsId, threads: usize) -> Result<SummaryTotals> {
    check_concurrency(threads)?;
    let info = meta.get_fs_info(fs_id)?;
    meta.init_for_filesystem(fs_id)?;
    usage(meta, fs_id, ROOT_INODE_ID, true, info.epoch, threads)
}

/// Usage of every filesystem, in the order the coordinators list them
///
/// Stops at the first filesystem that fails; totals of the filesystems
/// before it are only logged.
pub fn fs_usage_all<M: MetadataOps + ?Sized>(
    meta: &M,
    threads: usize,
) -> Result<Vec<(FsInfo, SummaryTotals)>> {
    check_concurrency(threads)?;
    let filesystems = meta.list_fs_info()?;

    let mut usages = Vec::with_capacity(filesystems.len());
    for info in filesystems {
        meta.init_for_filesystem(info.fs_id)?;
        let totals = usage(meta, info.fs_id, ROOT_INODE_ID, true, info.epoch, threads)?;
        info!(fs_id = info.fs_id, fs_name = %info.fs_name, inodes = totals.total_inodes, "filesystem usage");
        usages.push((info, totals));
    }
    Ok(usages)
}

/// Look a filesystem up by name
pub fn find_filesystem<M: MetadataOps + ?Sized>(meta: &M, fs_name: &str) -> Result<FsInfo> {
    meta.list_fs_info()?
        .into_iter()
        .find(|info| info.fs_name == fs_name)
        .ok_or_else(|| WalkerError::UnknownFilesystem {
            name: fs_name.to_string(),
        })
}

/// Delete the directory at an absolute path, at the filesystem's current
/// epoch
pub fn delete_path<M: MetadataOps + ?Sized>(
    meta: &M,
    fs_id: FsId,
    path: &str,
    threads: usize,
) -> Result<DeleteSummary> {
    let mut components = path_components(path)?;
    let Some(name) = components.pop() else {
        return Err(LogicError::RootDeletion.into());
    };
    check_concurrency(threads)?;

    let epoch = meta.get_fs_info(fs_id)?.epoch;
    meta.init_for_filesystem(fs_id)?;

    let parent_path = format!("/{}", components.join("/"));
    let parent = resolve_dir_path(meta, fs_id, &parent_path, epoch)?;

    let target = meta
        .list_entries(fs_id, parent, epoch)?
        .into_iter()
        .find(|e| e.name == name)
        .ok_or_else(|| WalkerError::NotFound {
            parent,
            name: name.to_string(),
        })?;
    if !target.is_dir() {
        return Err(WalkerError::NotADirectory {
            path: path.trim().to_string(),
        });
    }

    delete(meta, fs_id, parent, target.inode, name, epoch, threads)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delete_target_checks() {
        assert_eq!(check_delete_target(ROOT_INODE_ID, "x"), Err(LogicError::RootDeletion));
        assert_eq!(check_delete_target(7, " / "), Err(LogicError::RootDeletion));
        assert_eq!(check_delete_target(7, ""), Err(LogicError::EmptyName));
        assert!(check_delete_target(7, "logs").is_ok());
    }
}
