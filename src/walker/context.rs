//! Per-walk shared state
//!
//! A `WalkContext` is created for one top-level walk and shared by every
//! thread of it. It pins the filesystem and epoch, carries the concurrency
//! bound, and holds the cancellation flag plus a single-slot error holder:
//! the first failure wins, later ones are dropped.

use crate::config::{WalkConfig, MAX_THREADS};
use crate::error::{LogicError, Result, WalkerError};
use crate::mds::types::{Epoch, FsId};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Shared state of one walk
#[derive(Debug)]
pub struct WalkContext {
    fs_id: FsId,
    epoch: Epoch,
    concurrency: usize,
    cancel: Arc<AtomicBool>,
    error_tx: Sender<WalkerError>,
    error_rx: Receiver<WalkerError>,
}

impl WalkContext {
    /// Fails if `concurrency` is 0 or above [`MAX_THREADS`]
    pub fn new(fs_id: FsId, epoch: Epoch, concurrency: usize) -> std::result::Result<Self, LogicError> {
        check_concurrency(concurrency)?;

        let (error_tx, error_rx) = bounded(1);
        Ok(Self {
            fs_id,
            epoch,
            concurrency,
            cancel: Arc::new(AtomicBool::new(false)),
            error_tx,
            error_rx,
        })
    }

    /// Context bounded by the configured thread count
    pub fn from_config(
        fs_id: FsId,
        epoch: Epoch,
        config: &WalkConfig,
    ) -> std::result::Result<Self, LogicError> {
        Self::new(fs_id, epoch, config.threads)
    }

    /// Use an externally owned cancellation flag (e.g. set by a signal
    /// handler)
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = flag;
        self
    }

    pub fn fs_id(&self) -> FsId {
        self.fs_id
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Handle that stops the walk when set
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    /// Record a fatal error and cancel the walk
    ///
    /// Returns true if this was the first error recorded.
    pub fn fail(&self, err: WalkerError) -> bool {
        let first = match self.error_tx.try_send(err) {
            Ok(()) => true,
            Err(TrySendError::Full(dropped)) | Err(TrySendError::Disconnected(dropped)) => {
                debug!(error = %dropped, "dropping error, walk already failed");
                false
            }
        };
        if first {
            warn!(fs_id = self.fs_id, "walk failed, cancelling");
        }
        self.cancel();
        first
    }

    /// Check if an error has been recorded
    pub fn has_error(&self) -> bool {
        !self.error_rx.is_empty()
    }

    /// Take the recorded error, if any
    pub fn take_error(&self) -> Option<WalkerError> {
        self.error_rx.try_recv().ok()
    }

    /// Outcome of the walk once every thread has joined
    pub fn finish(&self) -> Result<()> {
        if let Some(err) = self.take_error() {
            return Err(err);
        }
        if self.is_cancelled() {
            return Err(WalkerError::Cancelled);
        }
        Ok(())
    }
}

/// Reject a concurrency bound outside `1..=MAX_THREADS`
pub fn check_concurrency(threads: usize) -> std::result::Result<(), LogicError> {
    if threads == 0 || threads > MAX_THREADS {
        return Err(LogicError::InvalidConcurrency {
            threads,
            max: MAX_THREADS,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WorkerError;
    use std::thread;

    #[test]
    fn test_concurrency_bounds() {
        assert_eq!(
            WalkContext::new(1, Epoch(1), 0).unwrap_err(),
            LogicError::InvalidConcurrency {
                threads: 0,
                max: MAX_THREADS
            }
        );
        assert!(WalkContext::new(1, Epoch(1), MAX_THREADS + 1).is_err());
        assert_eq!(WalkContext::new(1, Epoch(1), 8).unwrap().concurrency(), 8);
    }

    #[test]
    fn test_from_config() {
        let config = WalkConfig::new(Vec::new()).threads(6);
        let ctx = WalkContext::from_config(3, Epoch(9), &config).unwrap();
        assert_eq!(ctx.concurrency(), 6);
        assert_eq!(ctx.fs_id(), 3);
        assert_eq!(ctx.epoch(), Epoch(9));

        let config = config.threads(0);
        assert!(WalkContext::from_config(3, Epoch(9), &config).is_err());
    }

    #[test]
    fn test_first_error_wins() {
        let ctx = WalkContext::new(1, Epoch(1), 4).unwrap();
        assert!(ctx.fail(LogicError::EmptyName.into()));
        assert!(!ctx.fail(LogicError::RootDeletion.into()));
        assert!(ctx.is_cancelled());
        assert!(ctx.has_error());

        assert!(matches!(
            ctx.finish(),
            Err(WalkerError::Logic(LogicError::EmptyName))
        ));
    }

    #[test]
    fn test_first_error_wins_across_threads() {
        let ctx = WalkContext::new(1, Epoch(1), 4).unwrap();
        let firsts: usize = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let ctx = &ctx;
                    s.spawn(move || {
                        ctx.fail(
                            WorkerError::Panicked {
                                name: format!("walker-{}", i),
                                message: "boom".into(),
                            }
                            .into(),
                        )
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap() as usize)
                .sum()
        });
        assert_eq!(firsts, 1);
        assert!(ctx.take_error().is_some());
        assert!(ctx.take_error().is_none());
    }

    #[test]
    fn test_external_cancel() {
        let flag = Arc::new(AtomicBool::new(false));
        let ctx = WalkContext::new(1, Epoch(7), 2)
            .unwrap()
            .with_cancel_flag(Arc::clone(&flag));
        assert!(ctx.finish().is_ok());

        flag.store(true, Ordering::SeqCst);
        assert!(ctx.is_cancelled());
        assert!(matches!(ctx.finish(), Err(WalkerError::Cancelled)));
        assert_eq!(ctx.epoch(), Epoch(7));
    }
}
