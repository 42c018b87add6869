//! Suspend-capable byte channels over readiness-callback transports.
//!
//! Host engines expose output and input primitives that are driven by
//! "ready" callbacks instead of futures. The adapters here turn those
//! primitives into [`WriteChannel`] and [`ReadChannel`] implementations whose
//! operations suspend while the transport is busy.
//!
//! A [`WriteChannel::write`] returns only once the transport has released the
//! bytes it was handed, so callers may reuse their buffers immediately.

mod read;
mod signal;
mod transport;
mod write;

use std::{io, sync::Arc};

use async_trait::async_trait;
use bytes::Buf;
pub use read::ReadinessReadChannel;
pub use signal::ConflatedSignal;
use thiserror::Error;
pub use transport::{InputTransport, OutputTransport, ReadListener, WriteListener};
pub use write::{InstallGate, ReadinessWriteChannel};

/// Errors raised by channel operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ChannelError {
    /// The channel was closed, locally or by the transport.
    #[error("channel closed")]
    Closed,
    /// The transport failed while performing an operation.
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),
    /// The transport reported an asynchronous failure through its listener.
    #[error("transport failed: {0}")]
    Failed(#[source] Arc<io::Error>),
}

/// Result alias for channel operations.
pub type Result<T> = std::result::Result<T, ChannelError>;

/// Non-blocking byte sink.
#[async_trait]
pub trait WriteChannel: Send + Sync {
    /// Write every remaining byte of `src`, suspending while the transport is
    /// not ready.
    ///
    /// Returns once the transport has released the submitted bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] if the channel is or becomes closed
    /// while the write is pending, or the transport failure otherwise.
    async fn write(&self, src: &mut (dyn Buf + Send)) -> Result<()>;

    /// Write the whole of `bytes`.
    ///
    /// # Errors
    ///
    /// See [`write`](Self::write).
    async fn write_all(&self, bytes: &[u8]) -> Result<()> {
        let mut src = bytes;
        self.write(&mut src).await
    }

    /// Flush buffered bytes to the peer.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] if the channel closes while waiting
    /// for readiness.
    async fn flush(&self) -> Result<()>;

    /// Close the channel and the underlying transport.
    ///
    /// Pending and later operations fail with [`ChannelError::Closed`].
    fn close(&self);
}

/// Non-blocking byte source.
#[async_trait]
pub trait ReadChannel: Send + Sync {
    /// Read up to `dst.len()` bytes, returning `0` at end of stream.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] if the channel is closed while the
    /// read is pending, or the transport failure otherwise.
    async fn read(&self, dst: &mut [u8]) -> Result<usize>;

    /// Close the channel and the underlying transport.
    fn close(&self);
}
