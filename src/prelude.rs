//! Optional convenience imports for writing interceptors and handlers.
//!
//! This module is intentionally small. Import feature configuration and the
//! WebSocket framing types from their owning modules.
//!
//! # Examples
//!
//! ```rust
//! use weft::prelude::*;
//!
//! let mut pipeline = Pipeline::<ApplicationCall>::application();
//! pipeline
//!     .intercept(&CALL, |mut ctx: PipelineContext<ApplicationCall>| async move {
//!         ctx.proceed().await
//!     })
//!     .expect("Call phase exists");
//! ```

pub use crate::{
    call::{ApplicationCall, CALL, FALLBACK, INFRASTRUCTURE},
    error::{CallError, Result},
    feature::Feature,
    pipeline::{Phase, Pipeline, PipelineContext},
};
