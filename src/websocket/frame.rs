//! WebSocket frame model.

use std::str::Utf8Error;

use bytes::Bytes;

use super::{CloseReason, FrameError};

/// Frame kinds defined by RFC 6455.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// UTF-8 text payload.
    Text,
    /// Opaque binary payload.
    Binary,
    /// Connection close, optionally carrying a [`CloseReason`].
    Close,
    /// Keepalive request.
    Ping,
    /// Keepalive answer.
    Pong,
}

impl FrameType {
    /// Wire opcode.
    #[must_use]
    pub const fn opcode(self) -> u8 {
        match self {
            Self::Text => 0x1,
            Self::Binary => 0x2,
            Self::Close => 0x8,
            Self::Ping => 0x9,
            Self::Pong => 0xA,
        }
    }

    /// Map a wire opcode to a frame type.
    #[must_use]
    pub const fn from_opcode(opcode: u8) -> Option<Self> {
        match opcode {
            0x1 => Some(Self::Text),
            0x2 => Some(Self::Binary),
            0x8 => Some(Self::Close),
            0x9 => Some(Self::Ping),
            0xA => Some(Self::Pong),
            _ => None,
        }
    }

    /// Returns `true` for close, ping and pong frames.
    #[must_use]
    pub const fn is_control(self) -> bool { matches!(self, Self::Close | Self::Ping | Self::Pong) }
}

/// A single WebSocket frame.
///
/// Frames are immutable; the payload is reference counted so cloning a frame
/// does not copy its bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    frame_type: FrameType,
    fin: bool,
    payload: Bytes,
}

impl Frame {
    /// Construct a frame from its parts.
    #[must_use]
    pub fn new(frame_type: FrameType, fin: bool, payload: impl Into<Bytes>) -> Self {
        Self {
            frame_type,
            fin,
            payload: payload.into(),
        }
    }

    /// Final text frame.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(FrameType::Text, true, text.into())
    }

    /// Binary frame.
    #[must_use]
    pub fn binary(fin: bool, payload: impl Into<Bytes>) -> Self {
        Self::new(FrameType::Binary, fin, payload)
    }

    /// Ping carrying `payload`.
    #[must_use]
    pub fn ping(payload: impl Into<Bytes>) -> Self { Self::new(FrameType::Ping, true, payload) }

    /// Pong carrying `payload`.
    #[must_use]
    pub fn pong(payload: impl Into<Bytes>) -> Self { Self::new(FrameType::Pong, true, payload) }

    /// Close frame without a status code.
    #[must_use]
    pub fn close() -> Self { Self::new(FrameType::Close, true, Bytes::new()) }

    /// Close frame carrying `reason`.
    #[must_use]
    pub fn close_with(reason: &CloseReason) -> Self {
        Self::new(FrameType::Close, true, reason.encode())
    }

    #[must_use]
    pub fn frame_type(&self) -> FrameType { self.frame_type }

    /// Returns `true` if this is the last frame of a message.
    #[must_use]
    pub fn is_fin(&self) -> bool { self.fin }

    #[must_use]
    pub fn payload(&self) -> &Bytes { &self.payload }

    /// Consume the frame, returning its payload.
    #[must_use]
    pub fn into_payload(self) -> Bytes { self.payload }

    /// Decode the payload as UTF-8.
    ///
    /// # Errors
    ///
    /// Returns the UTF-8 error if the payload is not valid text.
    pub fn read_text(&self) -> Result<&str, Utf8Error> { std::str::from_utf8(&self.payload) }

    /// Decode the close reason carried by a close frame.
    ///
    /// Returns `Ok(None)` for frames of other types and for close frames
    /// without a status code.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::InvalidClosePayload`] if the payload is malformed.
    pub fn read_reason(&self) -> Result<Option<CloseReason>, FrameError> {
        if self.frame_type != FrameType::Close {
            return Ok(None);
        }
        CloseReason::parse(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{Frame, FrameType};
    use crate::websocket::{CloseCode, CloseReason};

    #[rstest]
    #[case(FrameType::Text, 0x1)]
    #[case(FrameType::Binary, 0x2)]
    #[case(FrameType::Close, 0x8)]
    #[case(FrameType::Ping, 0x9)]
    #[case(FrameType::Pong, 0xA)]
    fn opcodes_map_both_ways(#[case] frame_type: FrameType, #[case] opcode: u8) {
        assert_eq!(frame_type.opcode(), opcode);
        assert_eq!(FrameType::from_opcode(opcode), Some(frame_type));
    }

    #[rstest]
    #[case(0x0)]
    #[case(0x3)]
    #[case(0xB)]
    #[case(0xF)]
    fn unknown_opcodes_are_rejected(#[case] opcode: u8) {
        assert_eq!(FrameType::from_opcode(opcode), None);
    }

    #[test]
    fn text_frame_reads_back() {
        let frame = Frame::text("Hello");
        assert!(frame.is_fin());
        assert_eq!(frame.read_text().expect("utf-8"), "Hello");
        assert_eq!(frame.read_reason().expect("not a close frame"), None);
    }

    #[test]
    fn close_frame_carries_reason() {
        let reason = CloseReason::new(CloseCode::Normal, "bye");
        let frame = Frame::close_with(&reason);
        assert!(frame.frame_type().is_control());
        assert_eq!(frame.read_reason().expect("valid reason"), Some(reason));
        assert_eq!(Frame::close().read_reason().expect("empty close"), None);
    }
}
