//! Cooperative cancellation.
//!
//! A `CancelSource` owns the right to cancel; any number of `CancelSignal`s
//! observe it. Cancelling raises a flag and disconnects a channel, so waiters
//! blocked in `crossbeam_channel::select!` wake up immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{bounded, never, Receiver, Sender};

/// Owner side of a cancellation pair.
#[derive(Debug)]
pub struct CancelSource {
    flag: Arc<AtomicBool>,
    tx: Mutex<Option<Sender<()>>>,
    rx: Receiver<()>,
}

impl CancelSource {
    /// Create a fresh, uncancelled source.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = bounded::<()>(0);
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            tx: Mutex::new(Some(tx)),
            rx,
        }
    }

    /// Observer handle for this source.
    #[must_use]
    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            flag: Arc::clone(&self.flag),
            rx: self.rx.clone(),
        }
    }

    /// Request cancellation. Returns true on the first call only.
    pub fn cancel(&self) -> bool {
        if self.flag.swap(true, Ordering::AcqRel) {
            return false;
        }
        // The flag is set before the wake-up, so woken waiters always observe it.
        match self.tx.lock() {
            Ok(mut guard) => drop(guard.take()),
            Err(poisoned) => drop(poisoned.into_inner().take()),
        }
        true
    }

    /// Returns true once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side of a cancellation pair.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    flag: Arc<AtomicBool>,
    rx: Receiver<()>,
}

impl CancelSignal {
    /// A signal that is never cancelled.
    #[must_use]
    pub fn never() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            rx: never(),
        }
    }

    /// Returns true once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Channel that becomes ready (disconnected) on cancellation.
    /// Only useful as a `select!` arm.
    #[must_use]
    pub const fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}
