//! Scriptable readiness transports.
//!
//! Both streams are cheap handles over shared state: hand one clone to a
//! channel adapter and keep another in the test to drive readiness and
//! inspect what happened.

use std::{
    collections::VecDeque,
    io,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use weft::channel::{InputTransport, OutputTransport, ReadListener, WriteListener};

#[derive(Default)]
struct OutputState {
    ready: bool,
    gated: bool,
    closed: bool,
    written: Vec<u8>,
    writes: usize,
    flushes: usize,
    listener: Option<Arc<dyn WriteListener>>,
}

/// [`OutputTransport`] recording every byte written to it.
///
/// An *open* stream is always ready. A *gated* stream becomes busy after each
/// write and stays busy until the test calls [`release`](Self::release),
/// modelling a transport that holds on to submitted buffers.
#[derive(Clone)]
pub struct TestOutputStream {
    state: Arc<Mutex<OutputState>>,
}

impl TestOutputStream {
    /// A stream that is always ready.
    #[must_use]
    pub fn open() -> Self { Self::with(true, false) }

    /// A ready stream that becomes busy after every write.
    #[must_use]
    pub fn gated() -> Self { Self::with(true, true) }

    /// A gated stream that starts busy.
    #[must_use]
    pub fn blocked() -> Self { Self::with(false, true) }

    fn with(ready: bool, gated: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(OutputState {
                ready,
                gated,
                ..OutputState::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, OutputState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark the stream ready and notify the listener, as a host would once
    /// the previous buffer was released.
    pub fn release(&self) {
        let listener = {
            let mut state = self.lock();
            state.ready = true;
            state.listener.clone()
        };
        if let Some(listener) = listener {
            listener.on_write_possible();
        }
    }

    /// Notify the listener without changing readiness.
    pub fn spurious_wakeup(&self) {
        let listener = self.lock().listener.clone();
        if let Some(listener) = listener {
            listener.on_write_possible();
        }
    }

    /// Report an asynchronous transport failure to the listener.
    pub fn fail(&self, error: io::Error) {
        let listener = self.lock().listener.clone();
        if let Some(listener) = listener {
            listener.on_error(error);
        }
    }

    /// Every byte written so far.
    #[must_use]
    pub fn written(&self) -> Vec<u8> { self.lock().written.clone() }

    /// Remove and return the bytes written so far.
    #[must_use]
    pub fn take_written(&self) -> Vec<u8> { std::mem::take(&mut self.lock().written) }

    /// Number of `write` calls the transport received.
    #[must_use]
    pub fn write_calls(&self) -> usize { self.lock().writes }

    #[must_use]
    pub fn flush_calls(&self) -> usize { self.lock().flushes }

    #[must_use]
    pub fn is_ready(&self) -> bool { self.lock().ready }

    #[must_use]
    pub fn is_closed(&self) -> bool { self.lock().closed }

    #[must_use]
    pub fn has_listener(&self) -> bool { self.lock().listener.is_some() }
}

impl OutputTransport for TestOutputStream {
    fn is_ready(&self) -> bool { self.lock().ready }

    fn write(&self, bytes: &[u8]) -> io::Result<()> {
        let mut state = self.lock();
        if state.closed {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        state.written.extend_from_slice(bytes);
        state.writes += 1;
        if state.gated {
            state.ready = false;
        }
        Ok(())
    }

    fn flush(&self) -> io::Result<()> {
        self.lock().flushes += 1;
        Ok(())
    }

    fn close(&self) -> io::Result<()> {
        self.lock().closed = true;
        Ok(())
    }

    fn set_write_listener(&self, listener: Arc<dyn WriteListener>) {
        self.lock().listener = Some(listener);
    }
}

#[derive(Default)]
struct InputState {
    buffer: VecDeque<u8>,
    finished: bool,
    closed: bool,
    listener: Option<Arc<dyn ReadListener>>,
}

/// [`InputTransport`] fed by the test.
#[derive(Clone, Default)]
pub struct TestInputStream {
    state: Arc<Mutex<InputState>>,
}

impl TestInputStream {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    fn lock(&self) -> MutexGuard<'_, InputState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make `bytes` available and notify the listener.
    pub fn push(&self, bytes: impl AsRef<[u8]>) {
        let listener = {
            let mut state = self.lock();
            state.buffer.extend(bytes.as_ref());
            state.listener.clone()
        };
        if let Some(listener) = listener {
            listener.on_data_available();
        }
    }

    /// Signal that the peer sent everything.
    pub fn finish(&self) {
        let listener = {
            let mut state = self.lock();
            state.finished = true;
            state.listener.clone()
        };
        if let Some(listener) = listener {
            listener.on_all_data_read();
        }
    }

    /// Report an asynchronous transport failure to the listener.
    pub fn fail(&self, error: io::Error) {
        let listener = self.lock().listener.clone();
        if let Some(listener) = listener {
            listener.on_error(error);
        }
    }

    /// Bytes pushed but not read yet.
    #[must_use]
    pub fn pending(&self) -> usize { self.lock().buffer.len() }

    #[must_use]
    pub fn is_closed(&self) -> bool { self.lock().closed }
}

impl InputTransport for TestInputStream {
    fn is_ready(&self) -> bool { !self.lock().buffer.is_empty() }

    fn is_finished(&self) -> bool {
        let state = self.lock();
        state.finished && state.buffer.is_empty()
    }

    fn read(&self, dst: &mut [u8]) -> io::Result<usize> {
        let mut state = self.lock();
        let n = dst.len().min(state.buffer.len());
        for (slot, byte) in dst.iter_mut().zip(state.buffer.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn close(&self) -> io::Result<()> {
        self.lock().closed = true;
        Ok(())
    }

    fn set_read_listener(&self, listener: Arc<dyn ReadListener>) {
        self.lock().listener = Some(listener);
    }
}
