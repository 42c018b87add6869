//! The `WebSockets` feature and the RFC 6455 opening handshake.

use std::{future::Future, sync::Arc, time::Duration};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use http::{Method, StatusCode, header};
use serde::Deserialize;
use sha1::{Digest, Sha1};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{DEFAULT_MAX_FRAME_SIZE, WebSocketSession, session::run_session};
use crate::{
    attributes::AttributeKey,
    call::{ApplicationCall, ApplicationRequest},
    error::CallError,
    feature::Feature,
    pipeline::{Pipeline, PipelineError},
};

/// GUID appended to the client key when computing `Sec-WebSocket-Accept`.
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

const SUPPORTED_VERSION: &str = "13";

/// Compute the `Sec-WebSocket-Accept` value for a client's
/// `Sec-WebSocket-Key`.
///
/// ```
/// assert_eq!(
///     weft::websocket::websocket_accept("dGhlIHNhbXBsZSBub25jZQ=="),
///     "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
/// );
/// ```
#[must_use]
pub fn websocket_accept(key: &str) -> String {
    let mut sha = Sha1::new();
    sha.update(key.trim().as_bytes());
    sha.update(WEBSOCKET_GUID.as_bytes());
    STANDARD.encode(sha.finalize())
}

/// Configuration for [`WebSockets`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebSocketsConfig {
    /// Period between keepalive pings; `None` disables them.
    pub ping_interval: Option<Duration>,
    /// How long a ping may go unanswered before the session is closed.
    pub timeout: Duration,
    /// Largest accepted inbound frame payload.
    pub max_frame_size: usize,
    /// Frames buffered between the session and its handler in each direction.
    pub channel_capacity: usize,
}

impl Default for WebSocketsConfig {
    fn default() -> Self {
        Self {
            ping_interval: None,
            timeout: Duration::from_secs(15),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            channel_capacity: 32,
        }
    }
}

impl WebSocketsConfig {
    pub fn ping_interval(&mut self, period: Duration) -> &mut Self {
        self.ping_interval = Some(period);
        self
    }

    pub fn timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = timeout;
        self
    }

    pub fn max_frame_size(&mut self, max: usize) -> &mut Self {
        self.max_frame_size = max;
        self
    }

    /// Overlay the values present in `options`.
    pub fn apply(&mut self, options: &WebSocketOptions) -> &mut Self {
        if let Some(ms) = options.ping_interval_ms {
            self.ping_interval = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(ms) = options.timeout_ms {
            self.timeout = Duration::from_millis(ms);
        }
        if let Some(max) = options.max_frame_size {
            self.max_frame_size = max;
        }
        self
    }
}

/// File-loadable WebSocket options. Absent fields keep their defaults.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WebSocketOptions {
    /// Keepalive period in milliseconds; `0` disables pings.
    pub ping_interval_ms: Option<u64>,
    pub timeout_ms: Option<u64>,
    pub max_frame_size: Option<usize>,
}

/// WebSocket support for an application pipeline.
///
/// The feature installs no interceptors. Handlers call
/// [`upgrade`](Self::upgrade) on the installed instance to switch a call over
/// to the WebSocket protocol.
#[derive(Debug)]
pub struct WebSockets {
    config: WebSocketsConfig,
    shutdown: CancellationToken,
}

impl WebSockets {
    #[must_use]
    pub fn config(&self) -> &WebSocketsConfig { &self.config }

    /// Close every running session with `1001 Going away`.
    pub fn shutdown(&self) { self.shutdown.cancel(); }

    /// Upgrade `call` and run `handler` over the resulting session.
    ///
    /// Requests that are not valid RFC 6455 upgrades are answered with
    /// `400 Bad Request` and the handler is not run.
    ///
    /// # Errors
    ///
    /// Returns the handler's error, a [`FrameError`](super::FrameError) when
    /// the peer violated the protocol, or the channel failure that ended the
    /// session.
    pub async fn upgrade<H, Fut>(&self, call: &Arc<ApplicationCall>, handler: H) -> Result<(), CallError>
    where
        H: FnOnce(WebSocketSession) -> Fut,
        Fut: Future<Output = Result<(), CallError>>,
    {
        let key = match validate_upgrade(call.request()) {
            Ok(key) => key,
            Err(reason) => {
                debug!(call_id = %call.id(), reason, "rejected websocket upgrade");
                return call
                    .response()
                    .respond_text(StatusCode::BAD_REQUEST, reason)
                    .await;
            }
        };

        let response = call.response();
        response.header(header::UPGRADE.as_str(), "websocket")?;
        response.header(header::CONNECTION.as_str(), "Upgrade")?;
        response.header(header::SEC_WEBSOCKET_ACCEPT.as_str(), &websocket_accept(key))?;
        response.send_upgrade().await?;
        debug!(call_id = %call.id(), path = call.request().path(), "websocket session started");

        run_session(Arc::clone(call), &self.config, self.shutdown.child_token(), handler).await
    }
}

fn header_has_token(request: &ApplicationRequest, name: &header::HeaderName, token: &str) -> bool {
    request
        .headers()
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|item| item.trim().eq_ignore_ascii_case(token))
}

/// Check the opening handshake and return the client's key.
fn validate_upgrade(request: &ApplicationRequest) -> Result<&str, &'static str> {
    if request.method() != Method::GET {
        return Err("WebSocket upgrade requires GET");
    }
    if !header_has_token(request, &header::UPGRADE, "websocket") {
        return Err("missing Upgrade: websocket");
    }
    if !header_has_token(request, &header::CONNECTION, "upgrade") {
        return Err("missing Connection: upgrade");
    }
    if request.header(header::SEC_WEBSOCKET_VERSION.as_str()).map(str::trim) != Some(SUPPORTED_VERSION) {
        return Err("unsupported Sec-WebSocket-Version");
    }
    let key = request
        .header(header::SEC_WEBSOCKET_KEY.as_str())
        .ok_or("missing Sec-WebSocket-Key")?;
    match STANDARD.decode(key.trim()) {
        Ok(nonce) if nonce.len() == 16 => Ok(key),
        _ => Err("malformed Sec-WebSocket-Key"),
    }
}

impl Feature<ApplicationCall> for WebSockets {
    type Config = WebSocketsConfig;
    const KEY: AttributeKey<Self> = AttributeKey::new("WebSockets");

    fn install(
        _pipeline: &mut Pipeline<ApplicationCall>,
        config: WebSocketsConfig,
    ) -> Result<Arc<Self>, PipelineError> {
        Ok(Arc::new(Self {
            config,
            shutdown: CancellationToken::new(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use http::{HeaderMap, HeaderValue, Method, Uri};
    use rstest::rstest;

    use super::*;

    fn request(method: Method, pairs: &[(&'static str, &'static str)]) -> ApplicationRequest {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.append(*name, HeaderValue::from_static(value));
        }
        ApplicationRequest::new(method, Uri::from_static("/ws"), headers)
    }

    const VALID: &[(&str, &str)] = &[
        ("upgrade", "websocket"),
        ("connection", "keep-alive, Upgrade"),
        ("sec-websocket-version", "13"),
        ("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ=="),
    ];

    #[test]
    fn accept_matches_rfc_example() {
        assert_eq!(
            websocket_accept("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn valid_handshake_yields_key() {
        let req = request(Method::GET, VALID);
        assert_eq!(validate_upgrade(&req), Ok("dGhlIHNhbXBsZSBub25jZQ=="));
    }

    #[rstest]
    #[case::post(Method::POST, 4)]
    #[case::no_upgrade(Method::GET, 0)]
    #[case::no_connection(Method::GET, 1)]
    #[case::no_version(Method::GET, 2)]
    #[case::no_key(Method::GET, 3)]
    fn incomplete_handshake_is_rejected(#[case] method: Method, #[case] skip: usize) {
        let pairs: Vec<_> = VALID
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != skip)
            .map(|(_, pair)| *pair)
            .collect();
        assert!(validate_upgrade(&request(method, &pairs)).is_err());
    }

    #[test]
    fn short_key_is_rejected() {
        let req = request(
            Method::GET,
            &[
                ("upgrade", "websocket"),
                ("connection", "upgrade"),
                ("sec-websocket-version", "13"),
                ("sec-websocket-key", "c2hvcnQ="),
            ],
        );
        assert_eq!(validate_upgrade(&req), Err("malformed Sec-WebSocket-Key"));
    }

    #[test]
    fn options_overlay_config() {
        let mut config = WebSocketsConfig::default();
        config.apply(&WebSocketOptions {
            ping_interval_ms: Some(250),
            timeout_ms: None,
            max_frame_size: Some(1024),
        });
        assert_eq!(config.ping_interval, Some(Duration::from_millis(250)));
        assert_eq!(config.timeout, Duration::from_secs(15));
        assert_eq!(config.max_frame_size, 1024);

        config.apply(&WebSocketOptions {
            ping_interval_ms: Some(0),
            ..WebSocketOptions::default()
        });
        assert_eq!(config.ping_interval, None);
    }
}
