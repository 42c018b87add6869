//! Canonical error and result types for call processing.
//!
//! This module defines [`CallError`], the error that travels back through
//! every [`proceed`](crate::pipeline::PipelineContext::proceed) when an
//! interceptor fails. Layer-specific errors convert into it with `?`.

use std::error::Error as StdError;

use thiserror::Error;

use crate::{
    call::{RequestError, ResponseError},
    channel::ChannelError,
    pipeline::PipelineError,
    websocket::FrameError,
};

/// Error raised while processing a single call.
///
/// Setup-time wiring mistakes surface as [`PipelineError`] directly; this type
/// covers failures that happen while a call is in flight.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CallError {
    /// Reading from or writing to a call channel failed.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),
    /// A WebSocket peer violated the framing protocol.
    #[error("websocket protocol error: {0}")]
    Frame(#[from] FrameError),
    /// The request body could not be received.
    #[error("request error: {0}")]
    Request(#[from] RequestError),
    /// The response facade rejected an operation.
    #[error("response error: {0}")]
    Response(#[from] ResponseError),
    /// A pipeline operation performed mid-call failed.
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
    /// Application code failed.
    #[error("handler error: {0}")]
    Handler(#[source] Box<dyn StdError + Send + Sync>),
}

impl CallError {
    /// Wrap an application error.
    #[must_use]
    pub fn handler(error: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::Handler(error.into())
    }

    /// Returns `true` if the call failed because a channel was closed.
    #[must_use]
    pub fn is_closed_channel(&self) -> bool { matches!(self, Self::Channel(ChannelError::Closed)) }
}

/// Result alias used by interceptors and handlers.
pub type Result<T = ()> = std::result::Result<T, CallError>;
