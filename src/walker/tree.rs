//! Bounded-concurrency recursive traversal
//!
//! Per directory:
//! 1. List its entries (one RPC)
//! 2. Visit each entry; for a subdirectory, take a dispatcher slot and
//!    hand it to a new scoped thread, or descend into it on the current
//!    thread if none is free
//! 3. Join every thread spawned at this level
//! 4. Run the visitor's post-order action if nothing failed
//!
//! Descent on the current thread uses an explicit stack of frames, so a
//! thread's stack size never limits how deep a tree can be.
//!
//! The first error anywhere cancels the walk. Every branch checks the
//! cancellation flag before each RPC it would issue, so once a failure is
//! recorded only calls already in flight complete.

use crate::error::{Result, WalkerError, WorkerError};
use crate::mds::client::MetadataOps;
use crate::mds::types::{DirNode, NamespaceEntry};
use crate::walker::context::WalkContext;
use crate::walker::dispatch::{BoundedDispatcher, DispatchStats, Slot};
use crate::walker::visitor::Visitor;
use std::any::Any;
use std::thread::{self, Scope, ScopedJoinHandle};
use tracing::{debug, trace, warn};

/// Stack size for spawned walker threads
pub const WORKER_STACK_SIZE: usize = 8 * 1024 * 1024;

/// A listed directory whose entries are still being visited
struct Frame<'scope> {
    dir: DirNode,
    entries: std::vec::IntoIter<NamespaceEntry>,
    workers: Vec<(String, ScopedJoinHandle<'scope, ()>)>,
}

/// Walks one subtree, applying a visitor to every node
pub struct TreeWalker<'a, M: MetadataOps + ?Sized, V: Visitor> {
    meta: &'a M,
    visitor: &'a V,
    ctx: &'a WalkContext,
    dispatcher: BoundedDispatcher,
}

impl<'a, M: MetadataOps + ?Sized, V: Visitor> TreeWalker<'a, M, V> {
    pub fn new(meta: &'a M, visitor: &'a V, ctx: &'a WalkContext) -> Self {
        Self {
            meta,
            visitor,
            ctx,
            dispatcher: BoundedDispatcher::new(ctx.concurrency()),
        }
    }

    /// Walk the subtree under `root`, root included in the post-order step
    ///
    /// Returns the first error recorded by any branch.
    pub fn run(&self, root: &DirNode) -> Result<()> {
        debug!(
            fs_id = self.ctx.fs_id(),
            root = root.inode,
            epoch = %self.ctx.epoch(),
            threads = self.ctx.concurrency(),
            "walk starting"
        );

        self.walk_subtree(root);
        let result = self.ctx.finish();

        let stats = self.dispatcher.stats();
        debug!(
            root = root.inode,
            spawned = stats.spawned,
            inlined = stats.inlined,
            peak = stats.peak,
            ok = result.is_ok(),
            "walk finished"
        );
        result
    }

    pub fn dispatch_stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    /// Walk `root` and everything under it that is not handed to another
    /// thread; failures are recorded in the context
    fn walk_subtree(&self, root: &DirNode) {
        thread::scope(|scope| {
            let Some(first) = self.open(root.clone()) else {
                return;
            };
            let mut stack = vec![first];

            while let Some(frame) = stack.last_mut() {
                let Some(child) = self.next_subdir(frame) else {
                    if let Some(done) = stack.pop() {
                        self.close(done);
                    }
                    continue;
                };

                let worker = match self.dispatcher.try_acquire() {
                    Some(slot) => self.spawn_child(scope, &child, slot),
                    None => None,
                };
                match worker {
                    Some(worker) => frame.workers.push(worker),
                    None => {
                        if let Some(next) = self.open(child) {
                            stack.push(next);
                        }
                    }
                }
            }
        });
    }

    /// List `dir`; `None` if the walk is cancelled or the listing failed
    fn open<'scope>(&self, dir: DirNode) -> Option<Frame<'scope>> {
        if self.ctx.is_cancelled() {
            return None;
        }

        match self
            .meta
            .list_entries(self.ctx.fs_id(), dir.inode, self.ctx.epoch())
        {
            Ok(entries) => {
                trace!(dir = dir.inode, entries = entries.len(), "listed directory");
                Some(Frame {
                    dir,
                    entries: entries.into_iter(),
                    workers: Vec::new(),
                })
            }
            Err(e) => {
                self.abort(e);
                None
            }
        }
    }

    /// Visit the frame's entries up to and including the next
    /// subdirectory, which is returned
    fn next_subdir(&self, frame: &mut Frame<'_>) -> Option<DirNode> {
        for entry in frame.entries.by_ref() {
            if self.ctx.is_cancelled() {
                return None;
            }
            if let Err(e) = self.visitor.visit_entry(self.meta, self.ctx, &frame.dir, &entry) {
                self.abort(e);
                return None;
            }
            if entry.is_dir() {
                return Some(DirNode::from_entry(&entry));
            }
        }
        None
    }

    /// Join the frame's workers, then run the post-order step
    fn close(&self, frame: Frame<'_>) {
        for (name, handle) in frame.workers {
            if let Err(payload) = handle.join() {
                self.abort(
                    WorkerError::Panicked {
                        name,
                        message: panic_message(payload.as_ref()),
                    }
                    .into(),
                );
            }
        }

        if self.ctx.is_cancelled() {
            return;
        }
        if let Err(e) = self.visitor.leave_dir(self.meta, self.ctx, &frame.dir) {
            self.abort(e);
        }
    }

    /// Spawn a named worker for `child`; `None` if the thread could not be
    /// created, in which case the slot is already released
    fn spawn_child<'scope>(
        &'scope self,
        scope: &'scope Scope<'scope, '_>,
        child: &DirNode,
        slot: Slot<'scope>,
    ) -> Option<(String, ScopedJoinHandle<'scope, ()>)> {
        let name = format!("walker-{}", child.inode);
        let task = child.clone();

        let spawned = thread::Builder::new()
            .name(name.clone())
            .stack_size(WORKER_STACK_SIZE)
            .spawn_scoped(scope, move || {
                let _slot = slot;
                self.walk_subtree(&task);
            });

        match spawned {
            Ok(handle) => Some((name, handle)),
            Err(e) => {
                warn!(dir = child.inode, error = %e, "failed to spawn worker, walking inline");
                None
            }
        }
    }

    fn abort(&self, err: WalkerError) {
        self.ctx.fail(err);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker thread panicked".into()
    }
}
