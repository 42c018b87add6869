//! Feature installation protocol.
//!
//! A [`Feature`] is a self-contained unit that wires phases and interceptors
//! into a pipeline. Each feature type is identified by its
//! [`KEY`](Feature::KEY); installing the same key twice on one pipeline is
//! rejected. Installed instances live in a registry owned by the pipeline, so
//! independent pipelines never share feature state.

mod auth;
mod call_logging;
#[cfg(feature = "metrics")]
mod call_metrics;

use std::sync::Arc;

pub use auth::{
    AUTHENTICATE,
    AuthConfigError,
    Authentication,
    AuthenticationConfig,
    Authenticator,
    DEFAULT_SALT,
    Digester,
    HashedUser,
    HashedUsersConfig,
    PRINCIPAL,
    UserHashedTableAuth,
    UserIdPrincipal,
    UserPasswordCredential,
    basic_credentials,
    sha256_digester,
};
pub use call_logging::{CallLogging, CallLoggingConfig, LOGGING};
#[cfg(feature = "metrics")]
pub use call_metrics::{CALL_MEASURE, CallMeasure, METRICS, Metrics, MetricsConfig};
use tracing::debug;

use crate::{
    attributes::AttributeKey,
    pipeline::{Pipeline, PipelineError},
};

/// A pluggable unit of pipeline behaviour.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use weft::{
///     attributes::AttributeKey,
///     feature::Feature,
///     pipeline::{Phase, Pipeline, PipelineError},
/// };
///
/// const AUDIT: Phase = Phase::new("Audit");
///
/// #[derive(Default)]
/// struct AuditConfig {
///     label: String,
/// }
///
/// struct Audit {
///     label: String,
/// }
///
/// impl Feature<String> for Audit {
///     type Config = AuditConfig;
///     const KEY: AttributeKey<Self> = AttributeKey::new("Audit");
///
///     fn install(
///         pipeline: &mut Pipeline<String>,
///         config: AuditConfig,
///     ) -> Result<Arc<Self>, PipelineError> {
///         pipeline.add_phase(AUDIT)?;
///         pipeline.intercept(&AUDIT, |mut ctx| async move { ctx.proceed().await })?;
///         Ok(Arc::new(Self { label: config.label }))
///     }
/// }
///
/// let mut pipeline = Pipeline::<String>::new();
/// let audit = pipeline
///     .install::<Audit>(|config| config.label = "edge".into())
///     .expect("first install");
/// assert_eq!(audit.label, "edge");
/// assert!(pipeline.install::<Audit>(|_| {}).is_err());
/// ```
pub trait Feature<C>: Sized + Send + Sync + 'static {
    /// Configuration built by the caller of [`Pipeline::install`].
    type Config: Default;

    /// Identity of the feature within a pipeline.
    const KEY: AttributeKey<Self>;

    /// Wire the feature into `pipeline` and return the installed instance.
    ///
    /// # Errors
    ///
    /// Returns a [`PipelineError`] if the phases the feature depends on are
    /// missing or its own phases already exist.
    fn install(pipeline: &mut Pipeline<C>, config: Self::Config) -> Result<Arc<Self>, PipelineError>;
}

impl<C> Pipeline<C>
where
    C: Send + Sync + 'static,
{
    /// Install feature `F`, letting `configure` adjust its default config.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DuplicateFeature`] if `F` is already installed,
    /// or the error raised by [`Feature::install`].
    pub fn install<F>(&mut self, configure: impl FnOnce(&mut F::Config)) -> Result<Arc<F>, PipelineError>
    where
        F: Feature<C>,
    {
        if self.features().contains(&F::KEY) {
            return Err(PipelineError::DuplicateFeature(F::KEY.name()));
        }
        let mut config = F::Config::default();
        configure(&mut config);
        let feature = F::install(self, config)?;
        self.features().put_arc(&F::KEY, Arc::clone(&feature));
        debug!(feature = F::KEY.name(), "installed feature");
        Ok(feature)
    }

    /// The installed instance of feature `F`, if any.
    #[must_use]
    pub fn feature<F>(&self) -> Option<Arc<F>>
    where
        F: Feature<C>,
    {
        self.features().get(&F::KEY)
    }
}
