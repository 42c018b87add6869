//! In-memory [`CallTransport`] and call builders.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Uri};
use weft::{
    call::{ApplicationCall, ApplicationRequest, CallTransport, ResponseHead},
    channel::{ChannelError, ReadChannel, ReadinessReadChannel, ReadinessWriteChannel, WriteChannel},
};

use crate::{TestInputStream, TestOutputStream};

/// Client key used by [`websocket_call`].
pub const WEBSOCKET_KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";

#[derive(Default)]
struct Recorded {
    responses: Vec<(ResponseHead, Bytes)>,
    upgrades: Vec<ResponseHead>,
}

/// Transport that records committed responses and exposes scriptable
/// streams behind the call's channels.
pub struct TestCallTransport {
    recorded: Mutex<Recorded>,
    input: TestInputStream,
    output: TestOutputStream,
    request_channel: Arc<ReadinessReadChannel<TestInputStream>>,
    response_channel: Arc<ReadinessWriteChannel<TestOutputStream>>,
}

impl TestCallTransport {
    /// Transport over an empty input stream and an always-ready output.
    #[must_use]
    pub fn new() -> Arc<Self> { Self::with_streams(TestInputStream::new(), TestOutputStream::open()) }

    #[must_use]
    pub fn with_streams(input: TestInputStream, output: TestOutputStream) -> Arc<Self> {
        Arc::new(Self {
            recorded: Mutex::new(Recorded::default()),
            request_channel: Arc::new(ReadinessReadChannel::new(input.clone())),
            response_channel: Arc::new(ReadinessWriteChannel::new(output.clone())),
            input,
            output,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handle feeding the request channel.
    #[must_use]
    pub fn input(&self) -> &TestInputStream { &self.input }

    /// Handle observing the response channel.
    #[must_use]
    pub fn output(&self) -> &TestOutputStream { &self.output }

    /// The last committed response.
    #[must_use]
    pub fn response(&self) -> Option<(ResponseHead, Bytes)> { self.lock().responses.last().cloned() }

    /// Number of committed responses.
    #[must_use]
    pub fn response_count(&self) -> usize { self.lock().responses.len() }

    /// The last committed upgrade head.
    #[must_use]
    pub fn upgrade(&self) -> Option<ResponseHead> { self.lock().upgrades.last().cloned() }
}

#[async_trait]
impl CallTransport for TestCallTransport {
    async fn respond(&self, head: ResponseHead, body: Bytes) -> Result<(), ChannelError> {
        self.lock().responses.push((head, body));
        Ok(())
    }

    async fn respond_upgrade(&self, head: ResponseHead) -> Result<(), ChannelError> {
        self.lock().upgrades.push(head);
        Ok(())
    }

    fn request_channel(&self) -> Arc<dyn ReadChannel> { self.request_channel.clone() }

    fn response_channel(&self) -> Arc<dyn WriteChannel> { self.response_channel.clone() }
}

/// A call paired with the transport answering it.
pub struct TestCall {
    pub call: Arc<ApplicationCall>,
    pub transport: Arc<TestCallTransport>,
}

/// Build a call for `method uri` carrying `headers`.
///
/// # Panics
///
/// Panics if `uri` or a header is invalid.
#[must_use]
pub fn test_call(method: Method, uri: &str, headers: &[(&str, &str)]) -> TestCall {
    test_call_with(TestCallTransport::new(), method, uri, headers)
}

/// Like [`test_call`], answering through `transport`.
///
/// # Panics
///
/// Panics if `uri` or a header is invalid.
#[must_use]
pub fn test_call_with(
    transport: Arc<TestCallTransport>,
    method: Method,
    uri: &str,
    headers: &[(&str, &str)],
) -> TestCall {
    let uri: Uri = uri.parse().expect("valid test URI");
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        map.append(
            HeaderName::from_bytes(name.as_bytes()).expect("valid header name"),
            HeaderValue::from_str(value).expect("valid header value"),
        );
    }
    let request = ApplicationRequest::new(method, uri, map);
    let call = Arc::new(ApplicationCall::new(request, transport.clone()));
    TestCall { call, transport }
}

/// A `GET` call carrying a valid WebSocket opening handshake.
#[must_use]
pub fn websocket_call(uri: &str) -> TestCall {
    test_call(
        Method::GET,
        uri,
        &[
            ("upgrade", "websocket"),
            ("connection", "Upgrade"),
            ("sec-websocket-version", "13"),
            ("sec-websocket-key", WEBSOCKET_KEY),
        ],
    )
}
