//! Per-call request logging.

use std::{fmt, sync::Arc};

use tracing::Level;

use super::Feature;
use crate::{
    attributes::AttributeKey,
    call::{ApplicationCall, CallId, INFRASTRUCTURE},
    pipeline::{Phase, Pipeline, PipelineError},
};

/// Phase inserted before [`INFRASTRUCTURE`].
pub const LOGGING: Phase = Phase::new("Logging");

type CallFilter = Arc<dyn Fn(&ApplicationCall) -> bool + Send + Sync>;

/// Configuration for [`CallLogging`].
pub struct CallLoggingConfig {
    /// Level of the per-call line. Failures are always logged at `WARN`.
    pub level: Level,
    filter: Option<CallFilter>,
}

impl Default for CallLoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            filter: None,
        }
    }
}

impl CallLoggingConfig {
    pub fn level(&mut self, level: Level) -> &mut Self {
        self.level = level;
        self
    }

    /// Only log calls for which `filter` returns `true`.
    pub fn filter<F>(&mut self, filter: F) -> &mut Self
    where
        F: Fn(&ApplicationCall) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }
}

impl fmt::Debug for CallLoggingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallLoggingConfig")
            .field("level", &self.level)
            .field("filtered", &self.filter.is_some())
            .finish()
    }
}

/// Logs `"<status>: <METHOD> - <path>"` once each call has been processed.
#[derive(Debug)]
pub struct CallLogging {
    level: Level,
}

impl CallLogging {
    #[must_use]
    pub fn level(&self) -> Level { self.level }
}

fn emit(level: Level, call_id: CallId, line: &str) {
    if level == Level::ERROR {
        tracing::error!(call_id = %call_id, "{line}");
    } else if level == Level::WARN {
        tracing::warn!(call_id = %call_id, "{line}");
    } else if level == Level::INFO {
        tracing::info!(call_id = %call_id, "{line}");
    } else if level == Level::DEBUG {
        tracing::debug!(call_id = %call_id, "{line}");
    } else {
        tracing::trace!(call_id = %call_id, "{line}");
    }
}

impl Feature<ApplicationCall> for CallLogging {
    type Config = CallLoggingConfig;
    const KEY: AttributeKey<Self> = AttributeKey::new("CallLogging");

    fn install(
        pipeline: &mut Pipeline<ApplicationCall>,
        config: CallLoggingConfig,
    ) -> Result<Arc<Self>, PipelineError> {
        pipeline.insert_phase_before(&INFRASTRUCTURE, LOGGING)?;
        let CallLoggingConfig { level, filter } = config;

        pipeline.intercept(&LOGGING, move |mut ctx| {
            let filter = filter.clone();
            async move {
                let result = ctx.proceed().await;
                let call = ctx.call();
                if filter.as_ref().is_none_or(|filter| filter(call)) {
                    let request = call.request();
                    match &result {
                        Ok(()) => {
                            let status = call
                                .response()
                                .current_status()
                                .filter(|_| call.is_response_sent())
                                .map_or_else(|| "Unhandled".to_owned(), |status| status.to_string());
                            let line = format!("{status}: {} - {}", request.method(), request.path());
                            emit(level, call.id(), &line);
                        }
                        Err(error) => tracing::warn!(
                            call_id = %call.id(),
                            error = %error,
                            "Failed: {} - {}",
                            request.method(),
                            request.path()
                        ),
                    }
                }
                result
            }
        })?;

        Ok(Arc::new(Self { level }))
    }
}
