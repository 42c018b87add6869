//! Read-only request facade.

use std::net::SocketAddr;

use bytes::BytesMut;
use http::{HeaderMap, Method, Uri, header, request::Parts};
use thiserror::Error;

use crate::{channel::ReadChannel, error::CallError};

/// Media type of URL-encoded form bodies.
pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Largest form body [`receive_parameters`](super::ApplicationCall::receive_parameters)
/// will buffer.
pub const MAX_FORM_SIZE: usize = 1024 * 1024;

const BODY_CHUNK: usize = 4096;

/// Errors raised while reading a request body.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RequestError {
    /// The body is larger than the reader accepts.
    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge {
        /// Maximum accepted size in bytes.
        limit: usize,
    },
}

/// Decoded `application/x-www-form-urlencoded` name/value pairs, in order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Parameters(Vec<(String, String)>);

impl Parameters {
    /// Decode URL-encoded `input`.
    #[must_use]
    pub fn parse(input: &[u8]) -> Self { Self(url::form_urlencoded::parse(input).into_owned().collect()) }

    /// First value of `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Every value of `name`, in input order.
    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

/// Read `channel` to end of stream, failing once more than `limit` bytes
/// arrive.
pub(crate) async fn read_body(channel: &dyn ReadChannel, limit: usize) -> Result<BytesMut, CallError> {
    let mut body = BytesMut::new();
    let mut chunk = [0u8; BODY_CHUNK];
    loop {
        let n = channel.read(&mut chunk).await?;
        if n == 0 {
            return Ok(body);
        }
        if body.len() + n > limit {
            return Err(RequestError::BodyTooLarge { limit }.into());
        }
        body.extend_from_slice(&chunk[..n]);
    }
}

/// Request half of an [`ApplicationCall`](super::ApplicationCall).
///
/// Query parameters are decoded once, when the request is constructed.
#[derive(Debug)]
pub struct ApplicationRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    remote_addr: Option<SocketAddr>,
    query: Parameters,
}

impl ApplicationRequest {
    /// Build a request from its method, target and headers.
    #[must_use]
    pub fn new(method: Method, uri: Uri, headers: HeaderMap) -> Self {
        let query = uri
            .query()
            .map(|query| Parameters::parse(query.as_bytes()))
            .unwrap_or_default();
        Self {
            method,
            uri,
            headers,
            remote_addr: None,
            query,
        }
    }

    /// Record the peer address reported by the host.
    #[must_use]
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    #[must_use]
    pub fn method(&self) -> &Method { &self.method }

    #[must_use]
    pub fn uri(&self) -> &Uri { &self.uri }

    /// Request path without the query string.
    #[must_use]
    pub fn path(&self) -> &str { self.uri.path() }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap { &self.headers }

    /// First value of header `name` that is valid visible ASCII.
    ///
    /// Header names are case-insensitive.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> { self.header(header::CONTENT_TYPE.as_str()) }

    /// Returns `true` if the body is declared as [`FORM_URLENCODED`].
    ///
    /// Media type parameters such as `charset` are ignored.
    #[must_use]
    pub fn is_form(&self) -> bool {
        self.content_type()
            .and_then(|value| value.split(';').next())
            .is_some_and(|media| media.trim().eq_ignore_ascii_case(FORM_URLENCODED))
    }

    /// First value of query parameter `name`.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&str> { self.query.get(name) }

    /// Every value of query parameter `name`, in request order.
    #[must_use]
    pub fn parameter_all(&self, name: &str) -> Vec<&str> { self.query.get_all(name) }

    /// Decoded query parameters in request order.
    pub fn parameters(&self) -> impl Iterator<Item = (&str, &str)> { self.query.iter() }

    #[must_use]
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }
}

impl From<Parts> for ApplicationRequest {
    fn from(parts: Parts) -> Self { Self::new(parts.method, parts.uri, parts.headers) }
}

#[cfg(test)]
mod tests {
    use http::{HeaderMap, HeaderValue, Method, Request};
    use rstest::rstest;

    use super::{ApplicationRequest, Parameters};

    #[test]
    fn query_parameters_are_decoded() {
        let request = ApplicationRequest::new(
            Method::GET,
            "/search?q=rust%20lang&tag=a&tag=b&empty=".parse().expect("uri"),
            HeaderMap::new(),
        );
        assert_eq!(request.path(), "/search");
        assert_eq!(request.parameter("q"), Some("rust lang"));
        assert_eq!(request.parameter("tag"), Some("a"));
        assert_eq!(request.parameter_all("tag"), ["a", "b"]);
        assert_eq!(request.parameter("empty"), Some(""));
        assert_eq!(request.parameter("missing"), None);
    }

    #[rstest]
    #[case("application/x-www-form-urlencoded", true)]
    #[case("Application/X-WWW-Form-URLEncoded; charset=UTF-8", true)]
    #[case("multipart/form-data; boundary=x", false)]
    #[case("text/plain", false)]
    fn form_content_type_is_detected(#[case] content_type: &'static str, #[case] expected: bool) {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static(content_type));
        let request = ApplicationRequest::new(Method::POST, "/".parse().expect("uri"), headers);
        assert_eq!(request.is_form(), expected);
    }

    #[test]
    fn form_without_content_type_is_not_a_form() {
        let request = ApplicationRequest::new(Method::POST, "/".parse().expect("uri"), HeaderMap::new());
        assert!(!request.is_form());
    }

    #[test]
    fn parameters_decode_plus_and_percent_escapes() {
        let params = Parameters::parse(b"name=J%C3%BCrgen+Smith&tag=a&tag=b");
        assert_eq!(params.get("name"), Some("J\u{fc}rgen Smith"));
        assert_eq!(params.get_all("tag"), ["a", "b"]);
        assert_eq!(params.iter().count(), 3);
        assert!(Parameters::parse(b"").is_empty());
    }

    #[test]
    fn headers_are_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("text/plain"));
        let request = ApplicationRequest::new(Method::POST, "/".parse().expect("uri"), headers);
        assert_eq!(request.header("Content-Type"), Some("text/plain"));
        assert_eq!(request.content_type(), Some("text/plain"));
    }

    #[test]
    fn builds_from_http_parts() {
        let (parts, ()) = Request::builder()
            .method(Method::PUT)
            .uri("/items/7?force=true")
            .body(())
            .expect("request")
            .into_parts();
        let request = ApplicationRequest::from(parts)
            .with_remote_addr("127.0.0.1:9000".parse().expect("addr"));
        assert_eq!(request.method(), Method::PUT);
        assert_eq!(request.parameter("force"), Some("true"));
        assert!(request.remote_addr().is_some());
    }
}
