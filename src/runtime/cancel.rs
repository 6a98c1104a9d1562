//! Cancellation token handed to each background task instance.
//!
//! Cancelling drops the token's sender, which disconnects the channel every clone waits
//! on, so a task sleeping out its poll interval wakes up immediately. A token is never
//! reset: the lifecycle manager makes a fresh one for every start.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, bounded};
use parking_lot::Mutex;

#[derive(Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    wake_tx: Arc<Mutex<Option<Sender<()>>>>,
    wake_rx: Receiver<()>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            wake_tx: Arc::new(Mutex::new(Some(tx))),
            wake_rx: rx,
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        // Dropping the only sender disconnects every waiting receiver.
        self.wake_tx.lock().take();
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Sleeps until `deadline` or cancellation. Returns `true` if cancelled.
    pub fn wait_until(&self, deadline: Instant) -> bool {
        loop {
            if self.is_cancelled() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            match self.wake_rx.recv_timeout(deadline - now) {
                Err(RecvTimeoutError::Timeout) => return self.is_cancelled(),
                Err(RecvTimeoutError::Disconnected) => return true,
                // Nothing is ever sent; treat a stray message as a spurious wakeup.
                Ok(()) => continue,
            }
        }
    }

    pub fn wait(&self, timeout: Duration) -> bool {
        self.wait_until(Instant::now() + timeout)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
