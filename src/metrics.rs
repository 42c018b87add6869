//! Metric names and helpers for `weft`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. With the `metrics` cargo
//! feature disabled the helpers compile to no-ops.

#[cfg(feature = "metrics")]
use metrics::counter;

/// Name of the gauge tracking calls currently in the pipeline.
pub const CALLS_ACTIVE: &str = "weft_calls_active";
/// Name of the histogram of call durations in seconds.
pub const CALL_DURATION: &str = "weft_call_duration_seconds";
/// Name of the counter tracking calls that ended with an error.
pub const CALL_EXCEPTIONS: &str = "weft_call_exceptions_total";
/// Name of the counter tracking panicking call tasks.
pub const CALL_PANICS: &str = "weft_call_panics_total";
/// Name of the counter tracking WebSocket frames.
pub const WEBSOCKET_FRAMES: &str = "weft_websocket_frames_total";
/// Name of the counter tracking malformed WebSocket frames.
pub const WEBSOCKET_PROTOCOL_ERRORS: &str = "weft_websocket_protocol_errors_total";

/// Direction of frame processing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Frames received from the peer.
    Inbound,
    /// Frames sent to the peer.
    Outbound,
}

impl Direction {
    /// Label value used for this direction.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Record a WebSocket frame for the given direction.
pub fn inc_frames(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(WEBSOCKET_FRAMES, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record a malformed inbound WebSocket frame.
pub fn inc_protocol_errors() {
    #[cfg(feature = "metrics")]
    counter!(WEBSOCKET_PROTOCOL_ERRORS).increment(1);
}

/// Record a call task that panicked.
pub fn inc_call_panics() {
    #[cfg(feature = "metrics")]
    counter!(CALL_PANICS).increment(1);
}
