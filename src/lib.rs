#![doc(html_root_url = "https://docs.rs/weft/latest")]
//! Public API for the `weft` library.
//!
//! `weft` is the host-agnostic core of a web server framework. Host bindings
//! turn requests into [`ApplicationCall`](call::ApplicationCall)s and hand them
//! to [`host::dispatch`]; applications describe their behaviour as
//! interceptors in a phased [`Pipeline`](pipeline::Pipeline) and install
//! reusable [`Feature`](feature::Feature)s. Readiness-driven transports are
//! adapted to async byte channels by the [`channel`] module, over which the
//! [`websocket`] module runs RFC 6455 sessions.

pub mod attributes;
pub mod call;
pub mod channel;
pub mod error;
pub mod feature;
pub mod host;
pub mod metrics;
pub mod panic;
pub mod pipeline;
pub mod prelude;
pub mod websocket;

/// Result type alias re-exported for interceptors and handlers.
pub use error::{CallError, Result};
