//! Test doubles for exercising `weft` without a host engine.
//!
//! [`TestOutputStream`] and [`TestInputStream`] are scriptable readiness
//! transports; [`TestCallTransport`] records committed responses and exposes
//! those streams behind a call's channels.
//!
//! ```rust
//! use http::Method;
//! use weft_testing::test_call;
//!
//! let call = test_call(Method::GET, "/hello?name=weft", &[]);
//! assert_eq!(call.call.request().parameter("name"), Some("weft"));
//! assert!(call.transport.response().is_none());
//! ```

mod call;
mod frames;
pub mod logging;
mod streams;

pub use call::{TestCall, TestCallTransport, WEBSOCKET_KEY, test_call, test_call_with, websocket_call};
pub use frames::{CLIENT_MASK, client_frame, client_frames};
pub use logging::{LoggerHandle, logger};
pub use streams::{TestInputStream, TestOutputStream};
