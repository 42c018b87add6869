//! The per-request call object and its facades.
//!
//! An [`ApplicationCall`] is created by a host binding for every request and
//! executed through a [`Pipeline<ApplicationCall>`]. Interceptors share state
//! through the call's [`Attributes`].

mod request;
mod response;
mod transport;

use std::{
    fmt,
    sync::{
        Arc,
        OnceLock,
        atomic::{AtomicU64, Ordering},
    },
};

pub use request::{ApplicationRequest, FORM_URLENCODED, MAX_FORM_SIZE, Parameters, RequestError};
pub use response::{ApplicationResponse, ResponseError};
pub use transport::{CallTransport, ResponseHead};

use tokio::sync::OnceCell;

use crate::{
    attributes::Attributes,
    channel::{ReadChannel, WriteChannel},
    error::CallError,
    pipeline::{Phase, Pipeline},
};

/// Phase for cross-cutting concerns such as metrics, logging and
/// authentication.
pub const INFRASTRUCTURE: Phase = Phase::new("Infrastructure");
/// Phase where application handlers run.
pub const CALL: Phase = Phase::new("Call");
/// Phase for handling calls nothing else answered.
pub const FALLBACK: Phase = Phase::new("Fallback");

/// Process-unique identifier of a call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CallId(u64);

impl CallId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Return the inner `u64` representation.
    #[must_use]
    pub fn as_u64(&self) -> u64 { self.0 }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "CallId({})", self.0) }
}

/// A single request/response exchange.
pub struct ApplicationCall {
    id: CallId,
    request: ApplicationRequest,
    response: OnceLock<ApplicationResponse>,
    form: OnceCell<Parameters>,
    attributes: Attributes,
    transport: Arc<dyn CallTransport>,
}

impl ApplicationCall {
    /// Create a call for `request`, answered through `transport`.
    #[must_use]
    pub fn new(request: ApplicationRequest, transport: Arc<dyn CallTransport>) -> Self {
        Self {
            id: CallId::next(),
            request,
            response: OnceLock::new(),
            form: OnceCell::new(),
            attributes: Attributes::default(),
            transport,
        }
    }

    #[must_use]
    pub fn id(&self) -> CallId { self.id }

    #[must_use]
    pub fn request(&self) -> &ApplicationRequest { &self.request }

    /// The response facade, created on first access.
    #[must_use]
    pub fn response(&self) -> &ApplicationResponse {
        self.response
            .get_or_init(|| ApplicationResponse::new(Arc::clone(&self.transport)))
    }

    /// Returns `true` once a response has been committed.
    #[must_use]
    pub fn is_response_sent(&self) -> bool {
        self.response.get().is_some_and(ApplicationResponse::is_sent)
    }

    /// Parameters of a URL-encoded form body.
    ///
    /// The body is read from the request channel on first use and the result
    /// is kept for later calls. Requests that are not
    /// [`FORM_URLENCODED`] yield no parameters and their body is left unread.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::BodyTooLarge`] past [`MAX_FORM_SIZE`] bytes,
    /// or the channel error if reading fails.
    pub async fn receive_parameters(&self) -> Result<&Parameters, CallError> {
        self.form
            .get_or_try_init(|| async {
                if !self.request.is_form() {
                    return Ok::<_, CallError>(Parameters::default());
                }
                let channel = self.request_channel();
                let body = request::read_body(channel.as_ref(), MAX_FORM_SIZE).await?;
                Ok(Parameters::parse(&body))
            })
            .await
    }

    #[must_use]
    pub fn attributes(&self) -> &Attributes { &self.attributes }

    #[must_use]
    pub fn transport(&self) -> &Arc<dyn CallTransport> { &self.transport }

    /// Inbound byte channel of the underlying connection.
    #[must_use]
    pub fn request_channel(&self) -> Arc<dyn ReadChannel> { self.transport.request_channel() }

    /// Outbound byte channel of the underlying connection.
    #[must_use]
    pub fn response_channel(&self) -> Arc<dyn WriteChannel> { self.transport.response_channel() }
}

impl fmt::Debug for ApplicationCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationCall")
            .field("id", &self.id)
            .field("method", self.request.method())
            .field("uri", self.request.uri())
            .field("attributes", &self.attributes)
            .finish_non_exhaustive()
    }
}

impl Pipeline<ApplicationCall> {
    /// Pipeline with the standard [`INFRASTRUCTURE`], [`CALL`] and
    /// [`FALLBACK`] phases.
    #[must_use]
    pub fn application() -> Self {
        let mut pipeline = Self::new();
        for phase in [INFRASTRUCTURE, CALL, FALLBACK] {
            // The three phases are distinct, so appending cannot fail.
            let _ = pipeline.add_phase(phase);
        }
        pipeline
    }
}
