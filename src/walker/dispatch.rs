//! Acquire-or-inline fan-out limiter
//!
//! A bounded token channel of capacity K stands in for a counting
//! semaphore. A subdirectory gets its own thread only if a token can be
//! taken without blocking; otherwise the caller recurses into it inline.
//! Spawned workers are therefore bounded by K and no thread ever waits
//! for a slot, so the walk cannot deadlock on its own limiter.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Dispatcher counters at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Slot capacity K
    pub capacity: usize,

    /// Highest number of slots held at once
    pub peak: usize,

    /// Slots handed out
    pub spawned: u64,

    /// Acquisitions refused because every slot was taken
    pub inlined: u64,
}

/// Counting limiter for spawned subtree workers
#[derive(Debug)]
pub struct BoundedDispatcher {
    capacity: usize,
    tokens_tx: Sender<()>,
    tokens_rx: Receiver<()>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    spawned: AtomicU64,
    inlined: AtomicU64,
}

impl BoundedDispatcher {
    pub fn new(capacity: usize) -> Self {
        let (tokens_tx, tokens_rx) = bounded(capacity);
        Self {
            capacity,
            tokens_tx,
            tokens_rx,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            spawned: AtomicU64::new(0),
            inlined: AtomicU64::new(0),
        }
    }

    /// Take a slot without blocking
    pub fn try_acquire(&self) -> Option<Slot<'_>> {
        match self.tokens_tx.try_send(()) {
            Ok(()) => {
                let now = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
                self.peak.fetch_max(now, Ordering::AcqRel);
                self.spawned.fetch_add(1, Ordering::Relaxed);
                Some(Slot { dispatcher: self })
            }
            // Disconnected is unreachable while we hold the receiver
            Err(TrySendError::Full(())) | Err(TrySendError::Disconnected(())) => {
                self.inlined.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently held
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            capacity: self.capacity,
            peak: self.peak(),
            spawned: self.spawned.load(Ordering::Relaxed),
            inlined: self.inlined.load(Ordering::Relaxed),
        }
    }
}

/// A held slot, released on drop
#[derive(Debug)]
pub struct Slot<'a> {
    dispatcher: &'a BoundedDispatcher,
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        self.dispatcher.in_flight.fetch_sub(1, Ordering::AcqRel);
        let _ = self.dispatcher.tokens_rx.try_recv();
    }
}
