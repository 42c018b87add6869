//! Client-side frame encoding.
//!
//! Clients mask every frame they send, so tests feeding a server session
//! need the masked form the server itself never produces.

use weft::websocket::Frame;

/// Mask applied by [`client_frame`].
pub const CLIENT_MASK: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];

/// Encode `frame` as a client would, masked with [`CLIENT_MASK`].
#[must_use]
pub fn client_frame(frame: &Frame) -> Vec<u8> {
    let payload = frame.payload();
    let mut out = Vec::with_capacity(payload.len() + 14);
    out.push(u8::from(frame.is_fin()) << 7 | frame.frame_type().opcode());
    match payload.len() {
        len @ 0..=125 => out.push(0x80 | len as u8),
        len @ 126..=0xffff => {
            out.push(0x80 | 126);
            out.extend_from_slice(&(len as u16).to_be_bytes());
        }
        len => {
            out.push(0x80 | 127);
            out.extend_from_slice(&(len as u64).to_be_bytes());
        }
    }
    out.extend_from_slice(&CLIENT_MASK);
    out.extend(
        payload
            .iter()
            .zip(CLIENT_MASK.iter().cycle())
            .map(|(byte, mask)| byte ^ mask),
    );
    out
}

/// Concatenate the client encodings of `frames`.
#[must_use]
pub fn client_frames(frames: &[Frame]) -> Vec<u8> { frames.iter().flat_map(client_frame).collect() }
