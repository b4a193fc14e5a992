//! Per-entry actions applied by the tree walker
//!
//! - `SummarizeVisitor`: bytes and inode occurrences, optional hardlink dedup
//! - `DeleteVisitor`: unlink files as they are listed, remove each
//!   directory after its subtree (post-order)

use crate::error::{LogicError, Result};
use crate::mds::client::MetadataOps;
use crate::mds::types::{DirNode, InodeId, NamespaceEntry};
use crate::walker::context::WalkContext;
use dashmap::DashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

/// Action applied by [`TreeWalker`](crate::walker::TreeWalker) to every node
///
/// Called concurrently from walker threads.
pub trait Visitor: Sync {
    /// Called once per listed entry of `dir`, before any recursion into it
    fn visit_entry<M: MetadataOps + ?Sized>(
        &self,
        meta: &M,
        ctx: &WalkContext,
        dir: &DirNode,
        entry: &NamespaceEntry,
    ) -> Result<()>;

    /// Called once the whole subtree of `dir` finished without error
    fn leave_dir<M: MetadataOps + ?Sized>(
        &self,
        _meta: &M,
        _ctx: &WalkContext,
        _dir: &DirNode,
    ) -> Result<()> {
        Ok(())
    }
}

/// Usage totals at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SummaryTotals {
    pub total_bytes: u64,
    pub total_inodes: u64,
}

/// Usage counters updated from every walker thread
#[derive(Debug, Default)]
pub struct Summary {
    bytes: AtomicU64,
    inodes: AtomicU64,
}

impl Summary {
    pub fn add_bytes(&self, bytes: u64) {
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn add_inodes(&self, count: u64) {
        self.inodes.fetch_add(count, Ordering::Relaxed);
    }

    pub fn totals(&self) -> SummaryTotals {
        SummaryTotals {
            total_bytes: self.bytes.load(Ordering::Relaxed),
            total_inodes: self.inodes.load(Ordering::Relaxed),
        }
    }
}

/// Physical inodes already counted
#[derive(Debug, Default)]
pub struct SeenSet {
    inodes: DashSet<InodeId>,
}

impl SeenSet {
    /// True the first time `inode` is offered
    pub fn first_sighting(&self, inode: InodeId) -> bool {
        self.inodes.insert(inode)
    }

    pub fn len(&self) -> usize {
        self.inodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inodes.is_empty()
    }
}

/// Size and inode accounting
#[derive(Debug, Default)]
pub struct SummarizeVisitor {
    summary: Summary,
    /// Present in hardlink-aware mode
    seen: Option<SeenSet>,
}

impl SummarizeVisitor {
    /// `dedup_hardlinks` counts a multiply-linked file's bytes once
    pub fn new(dedup_hardlinks: bool) -> Self {
        Self {
            summary: Summary::default(),
            seen: dedup_hardlinks.then(SeenSet::default),
        }
    }

    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    pub fn totals(&self) -> SummaryTotals {
        self.summary.totals()
    }

    /// Distinct multiply-linked inodes seen so far
    pub fn seen_hardlinks(&self) -> usize {
        self.seen.as_ref().map(SeenSet::len).unwrap_or(0)
    }
}

impl Visitor for SummarizeVisitor {
    fn visit_entry<M: MetadataOps + ?Sized>(
        &self,
        meta: &M,
        ctx: &WalkContext,
        dir: &DirNode,
        entry: &NamespaceEntry,
    ) -> Result<()> {
        self.summary.add_inodes(1);
        if entry.is_dir() {
            return Ok(());
        }

        let attr = meta.get_inode_attr(ctx.fs_id(), entry.inode, dir.inode, ctx.epoch())?;
        if let Some(seen) = &self.seen {
            // A file with one link cannot show up twice
            if attr.is_hardlinked() && !seen.first_sighting(attr.inode) {
                trace!(inode = attr.inode, name = %entry.name, "hardlink already counted");
                return Ok(());
            }
        }
        self.summary.add_bytes(attr.length);
        Ok(())
    }
}

/// Post-order subtree removal
#[derive(Debug, Default)]
pub struct DeleteVisitor {
    deleted: AtomicU64,
}

impl DeleteVisitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries removed so far, directories included
    pub fn deleted(&self) -> u64 {
        self.deleted.load(Ordering::Relaxed)
    }
}

impl Visitor for DeleteVisitor {
    fn visit_entry<M: MetadataOps + ?Sized>(
        &self,
        meta: &M,
        ctx: &WalkContext,
        dir: &DirNode,
        entry: &NamespaceEntry,
    ) -> Result<()> {
        // Directories are removed in leave_dir, after their children
        if entry.is_dir() {
            return Ok(());
        }

        meta.delete_file_entry(ctx.fs_id(), dir.inode, &entry.name, ctx.epoch())?;
        self.deleted.fetch_add(1, Ordering::Relaxed);
        debug!(parent = dir.inode, inode = entry.inode, name = %entry.name, "deleted file");
        Ok(())
    }

    fn leave_dir<M: MetadataOps + ?Sized>(
        &self,
        meta: &M,
        ctx: &WalkContext,
        dir: &DirNode,
    ) -> Result<()> {
        if dir.is_root() {
            return Err(LogicError::RootDeletion.into());
        }

        meta.delete_directory_entry(ctx.fs_id(), dir.parent, &dir.name, ctx.epoch())?;
        self.deleted.fetch_add(1, Ordering::Relaxed);
        debug!(parent = dir.parent, inode = dir.inode, name = %dir.name, "deleted directory");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_accumulates() {
        let summary = Summary::default();
        summary.add_bytes(10);
        summary.add_bytes(20);
        summary.add_inodes(3);
        assert_eq!(
            summary.totals(),
            SummaryTotals {
                total_bytes: 30,
                total_inodes: 3
            }
        );
    }

    #[test]
    fn test_seen_set() {
        let seen = SeenSet::default();
        assert!(seen.first_sighting(42));
        assert!(!seen.first_sighting(42));
        assert!(seen.first_sighting(43));
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_dedup_mode_flag() {
        assert_eq!(SummarizeVisitor::new(true).seen_hardlinks(), 0);
        assert!(SummarizeVisitor::new(true).seen.is_some());
        assert!(SummarizeVisitor::new(false).seen.is_none());
    }
}
