//! WebSocket frame header encoding and decoding.
//!
//! [`read_frame`] decodes one frame from an accumulating buffer and is the
//! primitive used by the session reader. [`WebSocketCodec`] wraps the same
//! logic in `tokio_util`'s [`Decoder`] and [`Encoder`] traits for hosts that
//! drive framed streams directly.
//!
//! Server frames are never masked; client frames may be, and are unmasked in
//! place while decoding.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::{Frame, FrameError, FrameType};

/// Largest payload a control frame may carry.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// Default maximum payload length accepted by the decoder (16 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Longest possible unmasked frame header.
pub const MAX_HEADER_LEN: usize = 10;

const FIN: u8 = 0x80;
const RSV: u8 = 0x70;
const OPCODE: u8 = 0x0F;
const MASK: u8 = 0x80;
const LEN7: u8 = 0x7F;
const LEN16_MARKER: u8 = 126;
const LEN64_MARKER: u8 = 127;

/// Reject control frames that are fragmented or carry more than
/// [`MAX_CONTROL_PAYLOAD`] bytes.
pub(crate) fn check_control(frame: &Frame) -> Result<(), FrameError> {
    let len = frame.payload().len();
    if frame.frame_type().is_control() && (!frame.is_fin() || len > MAX_CONTROL_PAYLOAD) {
        return Err(FrameError::InvalidControlFrame {
            frame_type: frame.frame_type(),
            fin: frame.is_fin(),
            len: len as u64,
        });
    }
    Ok(())
}

/// Encode the header of an unmasked frame into a fixed buffer.
///
/// Returns the buffer and the number of header bytes used.
pub(crate) fn encode_header(frame: &Frame) -> ([u8; MAX_HEADER_LEN], usize) {
    let mut header = [0u8; MAX_HEADER_LEN];
    header[0] = frame.frame_type().opcode() | if frame.is_fin() { FIN } else { 0 };
    let len = frame.payload().len();
    let used = match u16::try_from(len) {
        Ok(short) if len < usize::from(LEN16_MARKER) => {
            header[1] = u8::try_from(short).unwrap_or(LEN7);
            2
        }
        Ok(short) => {
            header[1] = LEN16_MARKER;
            header[2..4].copy_from_slice(&short.to_be_bytes());
            4
        }
        Err(_) => {
            header[1] = LEN64_MARKER;
            header[2..10].copy_from_slice(&(len as u64).to_be_bytes());
            10
        }
    };
    (header, used)
}

/// Decode one frame from the front of `src`.
///
/// Returns `Ok(None)` without consuming anything when `src` does not yet
/// hold a complete frame.
///
/// # Errors
///
/// Returns a [`FrameError`] describing the first protocol violation found in
/// the header.
pub fn read_frame(src: &mut BytesMut, max_frame_size: usize) -> Result<Option<Frame>, FrameError> {
    if src.len() < 2 {
        return Ok(None);
    }
    let (b0, b1) = (src[0], src[1]);
    if b0 & RSV != 0 {
        return Err(FrameError::ReservedBits((b0 & RSV) >> 4));
    }
    let fin = b0 & FIN != 0;
    let opcode = b0 & OPCODE;
    let frame_type = FrameType::from_opcode(opcode).ok_or(FrameError::InvalidOpcode(opcode))?;
    let masked = b1 & MASK != 0;

    let (len, mut header_len) = match b1 & LEN7 {
        LEN16_MARKER => match src.get(2..4) {
            Some(bytes) => (u64::from(u16::from_be_bytes([bytes[0], bytes[1]])), 4),
            None => return Ok(None),
        },
        LEN64_MARKER => match src.get(2..10) {
            Some(mut bytes) => (bytes.get_u64(), 10),
            None => return Ok(None),
        },
        short => (u64::from(short), 2),
    };

    if frame_type.is_control() && (!fin || len > MAX_CONTROL_PAYLOAD as u64) {
        return Err(FrameError::InvalidControlFrame {
            frame_type,
            fin,
            len,
        });
    }
    if frame_type == FrameType::Close && len == 1 {
        return Err(FrameError::InvalidClosePayload);
    }
    let too_large = FrameError::FrameTooLarge {
        size: len,
        max: max_frame_size,
    };
    let len = match usize::try_from(len) {
        Ok(len) if len <= max_frame_size => len,
        _ => return Err(too_large),
    };

    let mask = if masked {
        let Some(key) = src.get(header_len..header_len + 4) else {
            return Ok(None);
        };
        header_len += 4;
        Some([key[0], key[1], key[2], key[3]])
    } else {
        None
    };

    let total = header_len + len;
    if src.len() < total {
        src.reserve(total - src.len());
        return Ok(None);
    }

    src.advance(header_len);
    let mut payload = src.split_to(len);
    if let Some(key) = mask {
        for (byte, k) in payload.iter_mut().zip(key.iter().cycle()) {
            *byte ^= k;
        }
    }
    Ok(Some(Frame::new(frame_type, fin, payload.freeze())))
}

/// `tokio_util` codec for WebSocket frames.
#[derive(Clone, Copy, Debug)]
pub struct WebSocketCodec {
    max_frame_size: usize,
}

impl WebSocketCodec {
    /// Create a codec accepting payloads up to `max_frame_size` bytes.
    #[must_use]
    pub fn new(max_frame_size: usize) -> Self { Self { max_frame_size } }

    #[must_use]
    pub fn max_frame_size(&self) -> usize { self.max_frame_size }
}

impl Default for WebSocketCodec {
    fn default() -> Self { Self::new(DEFAULT_MAX_FRAME_SIZE) }
}

impl Decoder for WebSocketCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        read_frame(src, self.max_frame_size)
    }
}

impl Encoder<Frame> for WebSocketCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        check_control(&frame)?;
        let len = frame.payload().len();
        let (header, used) = encode_header(&frame);
        dst.reserve(used + len);
        dst.put_slice(&header[..used]);
        dst.put_slice(frame.payload());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use rstest::rstest;

    use super::{DEFAULT_MAX_FRAME_SIZE, read_frame};
    use crate::websocket::{Frame, FrameError, FrameType};

    fn buffer(bytes: &[u8]) -> BytesMut { BytesMut::from(bytes) }

    #[test]
    fn decodes_unmasked_hello() {
        let mut src = buffer(&[0x81, 0x05, b'H', b'e', b'l', b'l', b'o']);
        let frame = read_frame(&mut src, DEFAULT_MAX_FRAME_SIZE)
            .expect("valid frame")
            .expect("complete frame");
        assert_eq!(frame, Frame::text("Hello"));
        assert!(src.is_empty());
    }

    #[test]
    fn decodes_masked_hello() {
        // RFC 6455 section 5.7 example.
        let mut src = buffer(&[
            0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58,
        ]);
        let frame = read_frame(&mut src, DEFAULT_MAX_FRAME_SIZE)
            .expect("valid frame")
            .expect("complete frame");
        assert_eq!(frame.read_text().expect("utf-8"), "Hello");
    }

    #[rstest]
    #[case::empty(&[])]
    #[case::one_byte(&[0x81])]
    #[case::short_extended_length(&[0x82, 126, 0x01])]
    #[case::missing_mask(&[0x81, 0x85, 0x37])]
    #[case::partial_payload(&[0x81, 0x05, b'H', b'e'])]
    fn incomplete_input_consumes_nothing(#[case] bytes: &[u8]) {
        let mut src = buffer(bytes);
        assert!(
            read_frame(&mut src, DEFAULT_MAX_FRAME_SIZE)
                .expect("no error")
                .is_none()
        );
        assert_eq!(&src[..], bytes);
    }

    #[test]
    fn rejects_unknown_opcode() {
        let mut src = buffer(&[0x83, 0x00]);
        assert!(matches!(
            read_frame(&mut src, DEFAULT_MAX_FRAME_SIZE),
            Err(FrameError::InvalidOpcode(0x3))
        ));
    }

    #[test]
    fn rejects_reserved_bits() {
        let mut src = buffer(&[0xC1, 0x00]);
        assert!(matches!(
            read_frame(&mut src, DEFAULT_MAX_FRAME_SIZE),
            Err(FrameError::ReservedBits(0b100))
        ));
    }

    #[test]
    fn rejects_oversized_frames() {
        let mut src = buffer(&[0x82, 126, 0x01, 0x00]);
        assert!(matches!(
            read_frame(&mut src, 255),
            Err(FrameError::FrameTooLarge { size: 256, max: 255 })
        ));
    }

    #[rstest]
    #[case::fragmented_ping(&[0x09, 0x00], FrameType::Ping)]
    #[case::long_pong(&[0x8A, 126, 0x00, 0x7e], FrameType::Pong)]
    fn rejects_invalid_control_frames(#[case] bytes: &[u8], #[case] expected: FrameType) {
        let mut src = buffer(bytes);
        assert!(matches!(
            read_frame(&mut src, DEFAULT_MAX_FRAME_SIZE),
            Err(FrameError::InvalidControlFrame { frame_type, .. }) if frame_type == expected
        ));
    }

    #[test]
    fn rejects_one_byte_close_payload() {
        let mut src = buffer(&[0x88, 0x01, 0x03]);
        assert!(matches!(
            read_frame(&mut src, DEFAULT_MAX_FRAME_SIZE),
            Err(FrameError::InvalidClosePayload)
        ));
    }
}
