//! Host-side response plumbing for a call.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};

use crate::channel::{ChannelError, ReadChannel, WriteChannel};

/// Status line and headers of a response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl ResponseHead {
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
        }
    }
}

/// Connection to the host engine that owns a call.
///
/// Host bindings implement this trait once per engine. The response facade
/// calls [`respond`](Self::respond) exactly once per call, or
/// [`respond_upgrade`](Self::respond_upgrade) when switching protocols.
#[async_trait]
pub trait CallTransport: Send + Sync + 'static {
    /// Commit the response head and body.
    ///
    /// # Errors
    ///
    /// Returns the channel error raised while writing the response.
    async fn respond(&self, head: ResponseHead, body: Bytes) -> Result<(), ChannelError>;

    /// Commit a `101 Switching Protocols` head; the connection's channels then
    /// carry the upgraded protocol.
    ///
    /// # Errors
    ///
    /// Returns the channel error raised while writing the head.
    async fn respond_upgrade(&self, head: ResponseHead) -> Result<(), ChannelError>;

    /// Channel delivering the request body or upgraded inbound bytes.
    fn request_channel(&self) -> Arc<dyn ReadChannel>;

    /// Channel accepting the response body or upgraded outbound bytes.
    fn response_channel(&self) -> Arc<dyn WriteChannel>;
}
