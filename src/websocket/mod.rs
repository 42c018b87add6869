//! WebSocket protocol support.
//!
//! The framing layer ([`Frame`], [`read_frame`], [`Serializer`],
//! [`WebSocketCodec`]) is pure and transport-free. [`WebSockets`] performs the
//! opening handshake for an [`ApplicationCall`](crate::call::ApplicationCall)
//! and drives a [`WebSocketSession`] over the call's readiness channels.

mod close;
mod codec;
mod error;
mod feature;
mod frame;
mod serializer;
mod session;

pub use close::{CloseCode, CloseReason};
pub use codec::{DEFAULT_MAX_FRAME_SIZE, MAX_CONTROL_PAYLOAD, MAX_HEADER_LEN, WebSocketCodec, read_frame};
pub use error::FrameError;
pub use feature::{WEBSOCKET_GUID, WebSocketOptions, WebSockets, WebSocketsConfig, websocket_accept};
pub use frame::{Frame, FrameType};
pub use serializer::Serializer;
pub use session::WebSocketSession;
