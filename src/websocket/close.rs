//! Close frame payloads.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::FrameError;

/// Well-known close status codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CloseCode {
    Normal,
    GoingAway,
    ProtocolError,
    CannotAccept,
    NotConsistent,
    ViolatedPolicy,
    TooBig,
    NoExtension,
    InternalError,
    ServiceRestart,
    TryAgainLater,
}

impl CloseCode {
    /// Numeric status code.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::Normal => 1000,
            Self::GoingAway => 1001,
            Self::ProtocolError => 1002,
            Self::CannotAccept => 1003,
            Self::NotConsistent => 1007,
            Self::ViolatedPolicy => 1008,
            Self::TooBig => 1009,
            Self::NoExtension => 1010,
            Self::InternalError => 1011,
            Self::ServiceRestart => 1012,
            Self::TryAgainLater => 1013,
        }
    }

    /// Look up a known code.
    #[must_use]
    pub const fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            1000 => Self::Normal,
            1001 => Self::GoingAway,
            1002 => Self::ProtocolError,
            1003 => Self::CannotAccept,
            1007 => Self::NotConsistent,
            1008 => Self::ViolatedPolicy,
            1009 => Self::TooBig,
            1010 => Self::NoExtension,
            1011 => Self::InternalError,
            1012 => Self::ServiceRestart,
            1013 => Self::TryAgainLater,
            _ => return None,
        })
    }
}

/// Status code and message carried by a close frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseReason {
    code: u16,
    message: String,
}

/// Longest message that fits a control frame next to the status code.
const MAX_MESSAGE_LEN: usize = 123;

impl CloseReason {
    /// Create a reason from a known code.
    #[must_use]
    pub fn new(code: CloseCode, message: impl Into<String>) -> Self {
        Self::from_raw(code.code(), message)
    }

    /// Create a reason from a raw status code.
    ///
    /// Messages longer than a control frame allows are truncated on a
    /// character boundary.
    #[must_use]
    pub fn from_raw(code: u16, message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.len() > MAX_MESSAGE_LEN {
            let mut end = MAX_MESSAGE_LEN;
            while !message.is_char_boundary(end) {
                end -= 1;
            }
            message.truncate(end);
        }
        Self { code, message }
    }

    #[must_use]
    pub fn code(&self) -> u16 { self.code }

    /// The code as a [`CloseCode`], if it is a known one.
    #[must_use]
    pub fn known_code(&self) -> Option<CloseCode> { CloseCode::from_code(self.code) }

    #[must_use]
    pub fn message(&self) -> &str { &self.message }

    /// Encode as a close frame payload.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(2 + self.message.len());
        buf.put_u16(self.code);
        buf.put_slice(self.message.as_bytes());
        buf.freeze()
    }

    /// Decode a close frame payload.
    ///
    /// An empty payload carries no reason.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::InvalidClosePayload`] for a one-byte payload or a
    /// message that is not valid UTF-8.
    pub fn parse(mut payload: &[u8]) -> Result<Option<Self>, FrameError> {
        match payload.len() {
            0 => return Ok(None),
            1 => return Err(FrameError::InvalidClosePayload),
            _ => {}
        }
        let code = payload.get_u16();
        let message =
            std::str::from_utf8(payload).map_err(|_| FrameError::InvalidClosePayload)?;
        Ok(Some(Self {
            code,
            message: message.to_owned(),
        }))
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.known_code() {
            Some(code) => write!(f, "{code:?} ({}): {}", self.code, self.message),
            None => write!(f, "{}: {}", self.code, self.message),
        }
    }
}
