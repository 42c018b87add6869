//! Read channel over a readiness-callback input transport.

use std::{
    io,
    sync::{Arc, Weak},
};

use async_trait::async_trait;
use tracing::{debug, trace};

use super::{ConflatedSignal, InputTransport, InstallGate, ReadChannel, ReadListener, Result};

struct Shared<T> {
    transport: T,
    signal: ConflatedSignal,
    gate: InstallGate,
}

struct ReadinessListener<T> {
    shared: Weak<Shared<T>>,
}

impl<T: InputTransport> ReadListener for ReadinessListener<T> {
    fn on_data_available(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.signal.offer();
        }
    }

    fn on_all_data_read(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.signal.offer();
        }
    }

    fn on_error(&self, error: io::Error) {
        if let Some(shared) = self.shared.upgrade() {
            debug!(error = %error, "input transport reported an error");
            shared.signal.close(Some(error));
        }
    }
}

/// [`ReadChannel`] over an [`InputTransport`].
///
/// Reads consume bytes only after the wait has finished, so a pending
/// `read` may be dropped (for example by `tokio::select!`) without losing
/// data.
pub struct ReadinessReadChannel<T> {
    shared: Arc<Shared<T>>,
}

impl<T: InputTransport> ReadinessReadChannel<T> {
    /// Wrap `transport`.
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport,
                signal: ConflatedSignal::new(),
                gate: InstallGate::new(),
            }),
        }
    }

    /// The wrapped transport.
    #[must_use]
    pub fn transport(&self) -> &T { &self.shared.transport }

    fn install_listener(&self) {
        if self.shared.gate.try_install() {
            trace!("installing input readiness listener");
            let listener = ReadinessListener {
                shared: Arc::downgrade(&self.shared),
            };
            self.shared.transport.set_read_listener(Arc::new(listener));
        }
    }
}

#[async_trait]
impl<T: InputTransport> ReadChannel for ReadinessReadChannel<T> {
    async fn read(&self, dst: &mut [u8]) -> Result<usize> {
        let shared = &self.shared;
        shared.signal.ensure_open()?;
        if dst.is_empty() {
            return Ok(0);
        }
        self.install_listener();

        loop {
            shared.signal.ensure_open()?;
            if shared.transport.is_ready() {
                return Ok(shared.transport.read(dst)?);
            }
            if shared.transport.is_finished() {
                return Ok(0);
            }
            shared.signal.receive().await?;
        }
    }

    fn close(&self) {
        self.shared.signal.close(None);
        if let Err(error) = self.shared.transport.close() {
            debug!(error = %error, "closing input transport failed");
        }
    }
}

impl<T> std::fmt::Debug for ReadinessReadChannel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadinessReadChannel")
            .field("signal", &self.shared.signal)
            .finish_non_exhaustive()
    }
}
