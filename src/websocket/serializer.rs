//! Incremental frame serializer.

use std::collections::VecDeque;

use bytes::{Buf, BufMut, Bytes};

use super::{
    Frame,
    codec::{MAX_HEADER_LEN, encode_header},
};

/// Frame partially written to a previous destination buffer.
struct Pending {
    header: [u8; MAX_HEADER_LEN],
    header_len: usize,
    header_pos: usize,
    payload: Bytes,
}

impl Pending {
    fn new(frame: Frame) -> Self {
        let (header, header_len) = encode_header(&frame);
        Self {
            header,
            header_len,
            header_pos: 0,
            payload: frame.into_payload(),
        }
    }

    /// Write as much of the frame as fits. Returns `true` once it is complete.
    fn write_to<B: BufMut + ?Sized>(&mut self, dst: &mut B) -> bool {
        if self.header_pos < self.header_len {
            let n = dst.remaining_mut().min(self.header_len - self.header_pos);
            dst.put_slice(&self.header[self.header_pos..self.header_pos + n]);
            self.header_pos += n;
            if self.header_pos < self.header_len {
                return false;
            }
        }
        let n = dst.remaining_mut().min(self.payload.len());
        dst.put_slice(&self.payload[..n]);
        self.payload.advance(n);
        self.payload.is_empty()
    }
}

/// Queue of outbound frames drained into caller-supplied buffers.
///
/// A frame that does not fit the destination is written partially and
/// resumed by the next [`serialize`](Self::serialize) call, so any buffer
/// size makes progress.
///
/// ```
/// use weft::websocket::{Frame, Serializer};
///
/// let mut serializer = Serializer::new();
/// serializer.enqueue(Frame::text("Hello"));
///
/// let mut first = [0u8; 3];
/// serializer.serialize(&mut &mut first[..]);
/// assert_eq!(first, [0x81, 0x05, b'H']);
/// assert!(serializer.has_outstanding());
///
/// let mut rest = Vec::new();
/// serializer.serialize(&mut rest);
/// assert_eq!(rest, b"ello");
/// assert!(!serializer.has_outstanding());
/// ```
#[derive(Default)]
pub struct Serializer {
    queue: VecDeque<Frame>,
    current: Option<Pending>,
}

impl Serializer {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Append `frame` to the outbound queue.
    ///
    /// Frames are written as given; control frame limits are enforced by
    /// [`WebSocketSession::send`](super::WebSocketSession::send) and
    /// [`WebSocketCodec`](super::WebSocketCodec).
    pub fn enqueue(&mut self, frame: Frame) { self.queue.push_back(frame); }

    /// Returns `true` while any queued or partially written bytes remain.
    #[must_use]
    pub fn has_outstanding(&self) -> bool { self.current.is_some() || !self.queue.is_empty() }

    /// Number of frames not yet started.
    #[must_use]
    pub fn queued(&self) -> usize { self.queue.len() }

    /// Write queued frames into `dst` until it is full or the queue is empty.
    ///
    /// Returns the number of bytes written.
    pub fn serialize<B: BufMut + ?Sized>(&mut self, dst: &mut B) -> usize {
        let start = dst.remaining_mut();
        while dst.has_remaining_mut() {
            if self.current.is_none() {
                let Some(frame) = self.queue.pop_front() else {
                    break;
                };
                self.current = Some(Pending::new(frame));
            }
            let Some(pending) = self.current.as_mut() else {
                break;
            };
            if !pending.write_to(dst) {
                break;
            }
            self.current = None;
        }
        start - dst.remaining_mut()
    }
}

impl std::fmt::Debug for Serializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Serializer")
            .field("queued", &self.queue.len())
            .field("in_progress", &self.current.is_some())
            .finish()
    }
}
