//! Entry points for host bindings.
//!
//! A host engine turns each incoming request into an
//! [`ApplicationCall`] and hands it to [`dispatch`] or [`spawn_call`]. The
//! host owns the connection; `weft` only decides what to answer.

use std::{any::Any, sync::Arc};

use futures::FutureExt;
use http::StatusCode;
use log::error;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::{
    call::{ApplicationCall, CallId},
    error::CallError,
    pipeline::Pipeline,
};

/// Run `call` through `pipeline` and make sure the client gets an answer.
///
/// A call that completes without sending a response is answered with
/// `404 Not Found`. A failing call is answered with `500 Internal Server
/// Error` when nothing was sent yet; otherwise its response channel is closed
/// so the client sees a truncated response.
///
/// # Errors
///
/// Returns the pipeline's error after the failure response was attempted.
pub async fn dispatch(pipeline: &Pipeline<ApplicationCall>, call: Arc<ApplicationCall>) -> Result<(), CallError> {
    let result = pipeline.execute(Arc::clone(&call)).await;
    match &result {
        Ok(()) if !call.is_response_sent() => {
            debug!(call_id = %call.id(), path = call.request().path(), "no handler answered the call");
            if let Err(error) = call.response().respond_text(StatusCode::NOT_FOUND, "Not Found").await {
                debug!(call_id = %call.id(), error = %error, "failed to send 404");
            }
        }
        Ok(()) => {}
        Err(error) if !call.is_response_sent() => {
            warn!(call_id = %call.id(), error = %error, "call failed");
            if let Err(send_error) = call
                .response()
                .respond_text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
                .await
            {
                debug!(call_id = %call.id(), error = %send_error, "failed to send 500");
            }
        }
        Err(error) => {
            warn!(call_id = %call.id(), error = %error, "call failed after the response was sent");
            call.response_channel().close();
        }
    }
    result
}

/// Spawn [`dispatch`] for `call` on `tracker`.
///
/// A panicking call is logged with its id and, if nothing was sent yet,
/// answered with `500 Internal Server Error`.
pub fn spawn_call(tracker: &TaskTracker, pipeline: Arc<Pipeline<ApplicationCall>>, call: Arc<ApplicationCall>) {
    let call_id = call.id();
    tracker.spawn(async move {
        let fut = std::panic::AssertUnwindSafe(dispatch(&pipeline, Arc::clone(&call))).catch_unwind();

        if let Err(panic) = fut.await {
            crate::metrics::inc_call_panics();
            log_panic(call_id, panic.as_ref());
            if !call.is_response_sent()
                && let Err(error) = call
                    .response()
                    .respond_text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
                    .await
            {
                debug!(call_id = %call_id, error = %error, "failed to send 500 after panic");
            }
        }
    });
}

fn log_panic(call_id: CallId, panic: &(dyn Any + Send)) {
    let panic_msg = crate::panic::format_panic(panic);
    // Emit via both `log` and `tracing` for tests that capture either.
    error!("call task panicked: panic={panic_msg}, call_id={call_id}");
    tracing::error!(panic = %panic_msg, call_id = %call_id, "call task panicked");
}
