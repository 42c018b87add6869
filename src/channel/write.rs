//! Write channel over a readiness-callback output transport.

#[cfg(not(loom))]
use std::sync::atomic::{AtomicBool, Ordering};
use std::{
    io,
    sync::{Arc, Mutex, PoisonError, Weak},
};

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
#[cfg(loom)]
use loom::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace};

use super::{ConflatedSignal, OutputTransport, Result, WriteChannel, WriteListener};

/// One-shot flag guarding listener installation.
///
/// Exactly one caller of [`try_install`](Self::try_install) observes `true`,
/// however many race for it.
#[derive(Debug, Default)]
pub struct InstallGate(AtomicBool);

impl InstallGate {
    /// Create a gate that has not been passed yet.
    #[must_use]
    pub fn new() -> Self { Self(AtomicBool::new(false)) }

    /// Claim the gate. Returns `true` for the single winning caller.
    pub fn try_install(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Returns `true` once the gate has been claimed.
    #[must_use]
    pub fn is_installed(&self) -> bool { self.0.load(Ordering::Acquire) }
}

struct Shared<T> {
    transport: T,
    signal: ConflatedSignal,
    gate: InstallGate,
    scratch: Mutex<BytesMut>,
}

impl<T: OutputTransport> Shared<T> {
    /// Hand the remaining bytes of `src` to the transport in one call.
    fn submit(&self, src: &mut (dyn Buf + Send)) -> Result<()> {
        let len = src.remaining();
        if src.chunk().len() >= len {
            self.transport.write(&src.chunk()[..len])?;
            src.advance(len);
            return Ok(());
        }

        let mut scratch = self.scratch.lock().unwrap_or_else(PoisonError::into_inner);
        scratch.clear();
        scratch.reserve(len);
        while src.has_remaining() {
            let chunk = src.chunk();
            let n = chunk.len();
            scratch.extend_from_slice(chunk);
            src.advance(n);
        }
        trace!(len, "copied non-contiguous buffer into scratch");
        self.transport.write(&scratch)?;
        Ok(())
    }

    /// Wait until the transport reports readiness.
    async fn await_ready(&self) -> Result<()> {
        while !self.transport.is_ready() {
            self.signal.receive().await?;
        }
        Ok(())
    }
}

struct ReadinessListener<T> {
    shared: Weak<Shared<T>>,
}

impl<T: OutputTransport> WriteListener for ReadinessListener<T> {
    fn on_write_possible(&self) {
        if let Some(shared) = self.shared.upgrade()
            && shared.transport.is_ready()
        {
            shared.signal.offer();
        }
    }

    fn on_error(&self, error: io::Error) {
        if let Some(shared) = self.shared.upgrade() {
            debug!(error = %error, "output transport reported an error");
            shared.signal.close(Some(error));
        }
    }
}

/// [`WriteChannel`] over an [`OutputTransport`].
///
/// The readiness listener is installed by the first `write`. A write that
/// finds the transport busy suspends until the listener reports readiness;
/// after handing bytes to the transport it waits for one more readiness
/// report if the transport is still holding them.
pub struct ReadinessWriteChannel<T> {
    shared: Arc<Shared<T>>,
}

impl<T: OutputTransport> ReadinessWriteChannel<T> {
    /// Wrap `transport`.
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport,
                signal: ConflatedSignal::new(),
                gate: InstallGate::new(),
                scratch: Mutex::new(BytesMut::new()),
            }),
        }
    }

    /// The wrapped transport.
    #[must_use]
    pub fn transport(&self) -> &T { &self.shared.transport }

    /// Returns `true` once the readiness listener has been installed.
    #[must_use]
    pub fn is_listener_installed(&self) -> bool { self.shared.gate.is_installed() }

    /// Returns `true` once the channel has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.shared.signal.is_closed() }

    fn install_listener(&self) {
        if self.shared.gate.try_install() {
            trace!("installing output readiness listener");
            let listener = ReadinessListener {
                shared: Arc::downgrade(&self.shared),
            };
            self.shared.transport.set_write_listener(Arc::new(listener));
        }
    }
}

#[async_trait]
impl<T: OutputTransport> WriteChannel for ReadinessWriteChannel<T> {
    async fn write(&self, src: &mut (dyn Buf + Send)) -> Result<()> {
        let shared = &self.shared;
        shared.signal.ensure_open()?;
        if !src.has_remaining() {
            return Ok(());
        }
        self.install_listener();

        loop {
            if shared.transport.is_ready() {
                shared.submit(src)?;
                return shared.await_ready().await;
            }
            trace!(len = src.remaining(), "output not ready; suspending write");
            shared.signal.receive().await?;
        }
    }

    async fn flush(&self) -> Result<()> {
        let shared = &self.shared;
        if !shared.gate.is_installed() {
            return Ok(());
        }
        shared.signal.ensure_open()?;
        shared.await_ready().await?;
        shared.transport.flush()?;
        Ok(())
    }

    fn close(&self) {
        self.shared.signal.close(None);
        if let Err(error) = self.shared.transport.close() {
            debug!(error = %error, "closing output transport failed");
        }
    }
}

impl<T> std::fmt::Debug for ReadinessWriteChannel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadinessWriteChannel")
            .field("signal", &self.shared.signal)
            .field("gate", &self.shared.gate)
            .finish_non_exhaustive()
    }
}
