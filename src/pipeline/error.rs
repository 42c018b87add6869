//! Setup-time errors raised while assembling a pipeline.

use thiserror::Error;

use super::Phase;

/// Errors raised while registering phases, interceptors or features.
///
/// These indicate a wiring mistake in the application and are returned
/// before any call is dispatched.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum PipelineError {
    /// The referenced phase was never added to the pipeline.
    #[error("phase `{0}` is not registered in this pipeline")]
    PhaseNotFound(Phase),
    /// A phase with the same name already exists.
    #[error("phase `{0}` is already registered")]
    DuplicatePhase(Phase),
    /// A feature with the same key is already installed.
    #[error("feature `{0}` is already installed")]
    DuplicateFeature(&'static str),
}
