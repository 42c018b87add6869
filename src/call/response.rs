//! Response facade.
//!
//! Status, headers and body are staged on the facade and committed to the
//! host in one step by [`ApplicationResponse::send`]. After that, every
//! mutation fails with [`ResponseError::AlreadySent`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use http::{
    HeaderMap,
    HeaderName,
    HeaderValue,
    StatusCode,
    header::{CONTENT_TYPE, LOCATION},
};
use thiserror::Error;
use tracing::debug;

use super::{CallTransport, ResponseHead};
use crate::error::CallError;

/// Errors raised by the response facade.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ResponseError {
    /// The response was already committed to the host.
    #[error("response has already been sent")]
    AlreadySent,
    /// A header name or value is not valid HTTP.
    #[error("invalid header: {0}")]
    InvalidHeader(String),
}

const TEXT_PLAIN_UTF8: &str = "text/plain; charset=utf-8";

#[derive(Default)]
struct Staged {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Bytes,
    sent: bool,
}

impl Staged {
    fn ensure_unsent(&self) -> Result<(), ResponseError> {
        if self.sent {
            return Err(ResponseError::AlreadySent);
        }
        Ok(())
    }

    /// Mark the response as sent and return what to commit.
    fn take(&mut self, default_status: StatusCode) -> Result<(ResponseHead, Bytes), ResponseError> {
        self.ensure_unsent()?;
        self.sent = true;
        let status = *self.status.get_or_insert(default_status);
        let head = ResponseHead {
            status,
            headers: self.headers.clone(),
        };
        Ok((head, std::mem::take(&mut self.body)))
    }
}

/// Response half of an [`ApplicationCall`](super::ApplicationCall).
pub struct ApplicationResponse {
    staged: Mutex<Staged>,
    transport: Arc<dyn CallTransport>,
}

impl ApplicationResponse {
    pub(crate) fn new(transport: Arc<dyn CallTransport>) -> Self {
        Self {
            staged: Mutex::new(Staged::default()),
            transport,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Staged> {
        self.staged.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the response status.
    ///
    /// # Errors
    ///
    /// Returns [`ResponseError::AlreadySent`] after [`send`](Self::send).
    pub fn status(&self, status: StatusCode) -> Result<(), ResponseError> {
        let mut staged = self.lock();
        staged.ensure_unsent()?;
        staged.status = Some(status);
        Ok(())
    }

    /// Status set so far, if any.
    #[must_use]
    pub fn current_status(&self) -> Option<StatusCode> { self.lock().status }

    /// Append a header value.
    ///
    /// # Errors
    ///
    /// Returns [`ResponseError::InvalidHeader`] for an invalid name or value,
    /// or [`ResponseError::AlreadySent`] after [`send`](Self::send).
    pub fn header(&self, name: &str, value: &str) -> Result<(), ResponseError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ResponseError::InvalidHeader(name.to_owned()))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| ResponseError::InvalidHeader(format!("{name}: {value}")))?;
        let mut staged = self.lock();
        staged.ensure_unsent()?;
        staged.headers.append(name, value);
        Ok(())
    }

    /// Snapshot of the staged headers.
    #[must_use]
    pub fn headers(&self) -> HeaderMap { self.lock().headers.clone() }

    /// Replace the `Content-Type` header.
    ///
    /// # Errors
    ///
    /// See [`header`](Self::header).
    pub fn content_type(&self, content_type: &str) -> Result<(), ResponseError> {
        let value = HeaderValue::from_str(content_type)
            .map_err(|_| ResponseError::InvalidHeader(content_type.to_owned()))?;
        let mut staged = self.lock();
        staged.ensure_unsent()?;
        staged.headers.insert(CONTENT_TYPE, value);
        Ok(())
    }

    /// Stage a text body, defaulting the content type to UTF-8 plain text.
    ///
    /// # Errors
    ///
    /// Returns [`ResponseError::AlreadySent`] after [`send`](Self::send).
    pub fn text(&self, text: impl Into<String>) -> Result<(), ResponseError> {
        let mut staged = self.lock();
        staged.ensure_unsent()?;
        staged
            .headers
            .entry(CONTENT_TYPE)
            .or_insert(HeaderValue::from_static(TEXT_PLAIN_UTF8));
        staged.body = Bytes::from(text.into());
        Ok(())
    }

    /// Stage a binary body.
    ///
    /// # Errors
    ///
    /// Returns [`ResponseError::AlreadySent`] after [`send`](Self::send).
    pub fn bytes(&self, body: impl Into<Bytes>) -> Result<(), ResponseError> {
        let mut staged = self.lock();
        staged.ensure_unsent()?;
        staged.body = body.into();
        Ok(())
    }

    /// Commit the staged response. The status defaults to `200 OK`.
    ///
    /// # Errors
    ///
    /// Returns [`ResponseError::AlreadySent`] on a second send, or the
    /// transport failure.
    pub async fn send(&self) -> Result<(), CallError> {
        let (head, body) = self.lock().take(StatusCode::OK)?;
        debug!(status = %head.status, len = body.len(), "sending response");
        self.transport.respond(head, body).await?;
        Ok(())
    }

    /// Stage `text` and send it with `status`.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn respond_text(&self, status: StatusCode, text: impl Into<String>) -> Result<(), CallError> {
        self.status(status)?;
        self.text(text)?;
        self.send().await
    }

    /// Send a redirect to `location`: `301` when `permanent`, else `302`.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn send_redirect(&self, location: &str, permanent: bool) -> Result<(), CallError> {
        let value = HeaderValue::from_str(location)
            .map_err(|_| ResponseError::InvalidHeader(location.to_owned()))?;
        {
            let mut staged = self.lock();
            staged.ensure_unsent()?;
            staged.status = Some(if permanent {
                StatusCode::MOVED_PERMANENTLY
            } else {
                StatusCode::FOUND
            });
            staged.headers.insert(LOCATION, value);
        }
        self.send().await
    }

    /// Commit a `101 Switching Protocols` head with the staged headers.
    ///
    /// # Errors
    ///
    /// Returns [`ResponseError::AlreadySent`] if a response was already sent,
    /// or the transport failure.
    pub async fn send_upgrade(&self) -> Result<(), CallError> {
        let (head, _) = {
            let mut staged = self.lock();
            staged.ensure_unsent()?;
            staged.status = Some(StatusCode::SWITCHING_PROTOCOLS);
            staged.take(StatusCode::SWITCHING_PROTOCOLS)?
        };
        debug!("switching protocols");
        self.transport.respond_upgrade(head).await?;
        Ok(())
    }

    /// Returns `true` once the response was committed.
    #[must_use]
    pub fn is_sent(&self) -> bool { self.lock().sent }
}

impl std::fmt::Debug for ApplicationResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let staged = self.lock();
        f.debug_struct("ApplicationResponse")
            .field("status", &staged.status)
            .field("headers", &staged.headers)
            .field("sent", &staged.sent)
            .finish_non_exhaustive()
    }
}
