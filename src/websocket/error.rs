//! Errors raised while decoding WebSocket frames.

use std::io;

use thiserror::Error;

use super::FrameType;

/// Framing protocol violations.
///
/// Every variant except [`FrameError::Io`] is a peer error answered with a
/// `1002 Protocol error` close.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FrameError {
    /// The opcode is not one of the five defined frame types.
    #[error("invalid opcode {0:#x}")]
    InvalidOpcode(u8),

    /// Reserved bits are set but no extension was negotiated.
    #[error("reserved bits set: {0:#05b}")]
    ReservedBits(u8),

    /// The declared payload length exceeds the configured maximum.
    #[error("frame exceeds max size: {size} > {max}")]
    FrameTooLarge {
        /// Declared payload length.
        size: u64,
        /// Configured maximum.
        max: usize,
    },

    /// A control frame is fragmented or longer than 125 bytes.
    #[error("invalid {frame_type:?} control frame: fin={fin}, len={len}")]
    InvalidControlFrame {
        /// Offending frame type.
        frame_type: FrameType,
        /// FIN bit as received.
        fin: bool,
        /// Declared payload length.
        len: u64,
    },

    /// A close payload is one byte long or its reason is not UTF-8.
    #[error("invalid close frame payload")]
    InvalidClosePayload,

    /// The underlying stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl FrameError {
    /// Returns `true` if the peer sent a malformed frame.
    #[must_use]
    pub fn is_protocol_violation(&self) -> bool { !matches!(self, Self::Io(_)) }
}
