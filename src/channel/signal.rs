//! Single-slot readiness signal.

use std::{
    io,
    pin::pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio::sync::Notify;

use super::ChannelError;

#[derive(Debug)]
enum Slot {
    Empty,
    Signalled,
    Closed(Option<Arc<io::Error>>),
}

/// Conflated readiness notification.
///
/// Holds at most one pending signal: offering while a signal is pending
/// overwrites it. Closing wakes every waiter and makes later receives fail.
#[derive(Debug)]
pub struct ConflatedSignal {
    slot: Mutex<Slot>,
    notify: Notify,
}

impl Default for ConflatedSignal {
    fn default() -> Self {
        Self {
            slot: Mutex::new(Slot::Empty),
            notify: Notify::new(),
        }
    }
}

impl ConflatedSignal {
    /// Create an empty, open signal.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    fn lock(&self) -> MutexGuard<'_, Slot> { self.slot.lock().unwrap_or_else(PoisonError::into_inner) }

    /// Publish a signal. Returns `false` if the signal is closed.
    pub fn offer(&self) -> bool {
        {
            let mut slot = self.lock();
            if matches!(*slot, Slot::Closed(_)) {
                return false;
            }
            *slot = Slot::Signalled;
        }
        self.notify.notify_waiters();
        true
    }

    /// Close the signal, optionally recording the failure that caused it.
    ///
    /// The first close wins; later calls are ignored.
    pub fn close(&self, error: Option<io::Error>) {
        {
            let mut slot = self.lock();
            if matches!(*slot, Slot::Closed(_)) {
                return;
            }
            *slot = Slot::Closed(error.map(Arc::new));
        }
        self.notify.notify_waiters();
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool { matches!(*self.lock(), Slot::Closed(_)) }

    /// Fail if the signal is closed, without consuming a pending signal.
    ///
    /// # Errors
    ///
    /// Returns the close reason once the signal is closed.
    pub fn ensure_open(&self) -> Result<(), ChannelError> {
        match &*self.lock() {
            Slot::Closed(error) => Err(closed_error(error.as_ref())),
            Slot::Empty | Slot::Signalled => Ok(()),
        }
    }

    /// Take a pending signal without waiting.
    ///
    /// Returns `Ok(true)` if a signal was consumed and `Ok(false)` if none was
    /// pending.
    ///
    /// # Errors
    ///
    /// Returns the close reason once the signal is closed.
    pub fn try_take(&self) -> Result<bool, ChannelError> {
        let mut slot = self.lock();
        match &*slot {
            Slot::Empty => return Ok(false),
            Slot::Closed(error) => return Err(closed_error(error.as_ref())),
            Slot::Signalled => {}
        }
        *slot = Slot::Empty;
        Ok(true)
    }

    /// Wait for the next signal and consume it.
    ///
    /// Cancel-safe: a dropped receive consumes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`], or [`ChannelError::Failed`] when the
    /// signal was closed with an error.
    pub async fn receive(&self) -> Result<(), ChannelError> {
        loop {
            let mut notified = pin!(self.notify.notified());
            notified.as_mut().enable();
            if self.try_take()? {
                return Ok(());
            }
            notified.await;
        }
    }
}

fn closed_error(error: Option<&Arc<io::Error>>) -> ChannelError {
    match error {
        Some(error) => ChannelError::Failed(Arc::clone(error)),
        None => ChannelError::Closed,
    }
}
