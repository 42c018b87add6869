//! Host-side readiness primitives wrapped by the channel adapters.

use std::{io, sync::Arc};

/// Callback receiver for output readiness.
pub trait WriteListener: Send + Sync {
    /// The transport can accept another write.
    fn on_write_possible(&self);

    /// The transport failed asynchronously.
    fn on_error(&self, error: io::Error);
}

/// Callback receiver for input readiness.
pub trait ReadListener: Send + Sync {
    /// Bytes are available to read without blocking.
    fn on_data_available(&self);

    /// The peer finished sending; later reads report end of stream.
    fn on_all_data_read(&self);

    /// The transport failed asynchronously.
    fn on_error(&self, error: io::Error);
}

/// Readiness-driven output primitive provided by a host engine.
///
/// Implementations must invoke the installed listener's
/// [`on_write_possible`](WriteListener::on_write_possible) whenever
/// [`is_ready`](Self::is_ready) turns from `false` to `true`.
pub trait OutputTransport: Send + Sync + 'static {
    /// Returns `true` if a write would complete without blocking.
    fn is_ready(&self) -> bool;

    /// Hand `bytes` to the transport.
    ///
    /// The transport may keep a reference to the submitted bytes until it
    /// reports readiness again.
    ///
    /// # Errors
    ///
    /// Returns the transport's I/O error.
    fn write(&self, bytes: &[u8]) -> io::Result<()>;

    /// Push buffered output to the peer.
    ///
    /// # Errors
    ///
    /// Returns the transport's I/O error.
    fn flush(&self) -> io::Result<()>;

    /// Release the transport.
    ///
    /// # Errors
    ///
    /// Returns the transport's I/O error.
    fn close(&self) -> io::Result<()>;

    /// Install the readiness listener. Called at most once per transport.
    fn set_write_listener(&self, listener: Arc<dyn WriteListener>);
}

/// Readiness-driven input primitive provided by a host engine.
pub trait InputTransport: Send + Sync + 'static {
    /// Returns `true` if a read would complete without blocking.
    fn is_ready(&self) -> bool;

    /// Returns `true` once every byte sent by the peer was read.
    fn is_finished(&self) -> bool;

    /// Read available bytes into `dst`.
    ///
    /// # Errors
    ///
    /// Returns the transport's I/O error.
    fn read(&self, dst: &mut [u8]) -> io::Result<usize>;

    /// Release the transport.
    ///
    /// # Errors
    ///
    /// Returns the transport's I/O error.
    fn close(&self) -> io::Result<()>;

    /// Install the readiness listener. Called at most once per transport.
    fn set_read_listener(&self, listener: Arc<dyn ReadListener>);
}
