//! Call metrics feature.
//!
//! Adds a `Metrics` phase ahead of [`INFRASTRUCTURE`] that tracks active
//! calls, call duration and failed calls through the `metrics` facade.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use metrics::{Counter, Gauge, Histogram, Key, Level, Metadata, Recorder, counter, gauge, histogram};

use super::Feature;
use crate::{
    attributes::AttributeKey,
    call::{ApplicationCall, INFRASTRUCTURE},
    metrics::{CALL_DURATION, CALL_EXCEPTIONS, CALLS_ACTIVE},
    pipeline::{Phase, Pipeline, PipelineError},
};

/// Phase inserted before [`INFRASTRUCTURE`].
pub const METRICS: Phase = Phase::new("Metrics");

/// Call attribute holding the [`CallMeasure`] of the current call.
pub const CALL_MEASURE: AttributeKey<CallMeasure> = AttributeKey::new("CallMeasure");

/// Start time of a call, stored in its attributes while it is measured.
#[derive(Clone, Copy, Debug)]
pub struct CallMeasure {
    started: Instant,
}

impl CallMeasure {
    #[must_use]
    pub fn started(&self) -> Instant { self.started }

    #[must_use]
    pub fn elapsed(&self) -> Duration { self.started.elapsed() }
}

/// Configuration for [`Metrics`].
#[derive(Default)]
pub struct MetricsConfig {
    /// Recorder to register metrics with. Defaults to the global recorder,
    /// which must then be installed before the feature.
    pub recorder: Option<Arc<dyn Recorder + Send + Sync>>,
}

impl MetricsConfig {
    /// Record into `recorder` instead of the global recorder.
    pub fn recorder(&mut self, recorder: impl Recorder + Send + Sync + 'static) -> &mut Self {
        self.recorder = Some(Arc::new(recorder));
        self
    }
}

impl std::fmt::Debug for MetricsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsConfig")
            .field("recorder", &self.recorder.as_ref().map(|_| "custom"))
            .finish()
    }
}

struct CallHandles {
    active: Gauge,
    duration: Histogram,
    exceptions: Counter,
}

impl CallHandles {
    fn register(recorder: Option<&(dyn Recorder + Send + Sync)>) -> Self {
        let Some(recorder) = recorder else {
            return Self {
                active: gauge!(CALLS_ACTIVE),
                duration: histogram!(CALL_DURATION),
                exceptions: counter!(CALL_EXCEPTIONS),
            };
        };
        let metadata = Metadata::new(module_path!(), Level::INFO, Some(module_path!()));
        Self {
            active: recorder.register_gauge(&Key::from_static_name(CALLS_ACTIVE), &metadata),
            duration: recorder.register_histogram(&Key::from_static_name(CALL_DURATION), &metadata),
            exceptions: recorder.register_counter(&Key::from_static_name(CALL_EXCEPTIONS), &metadata),
        }
    }
}

/// RAII guard counting a call as active until dropped.
struct ActiveCall {
    handles: Arc<CallHandles>,
    measure: CallMeasure,
}

impl ActiveCall {
    fn new(handles: Arc<CallHandles>) -> Self {
        handles.active.increment(1.0);
        Self {
            handles,
            measure: CallMeasure {
                started: Instant::now(),
            },
        }
    }
}

impl Drop for ActiveCall {
    fn drop(&mut self) {
        self.handles.active.decrement(1.0);
        self.handles
            .duration
            .record(self.measure.elapsed().as_secs_f64());
    }
}

/// Per-call metrics.
pub struct Metrics {
    handles: Arc<CallHandles>,
}

impl Metrics {
    /// Record a failed call that did not pass through the pipeline.
    pub fn mark_exception(&self) { self.handles.exceptions.increment(1); }
}

impl Feature<ApplicationCall> for Metrics {
    type Config = MetricsConfig;
    const KEY: AttributeKey<Self> = AttributeKey::new("Metrics");

    fn install(
        pipeline: &mut Pipeline<ApplicationCall>,
        config: MetricsConfig,
    ) -> Result<Arc<Self>, PipelineError> {
        let handles = Arc::new(CallHandles::register(config.recorder.as_deref()));
        pipeline.insert_phase_before(&INFRASTRUCTURE, METRICS)?;

        let shared = Arc::clone(&handles);
        pipeline.intercept(&METRICS, move |mut ctx| {
            let guard = ActiveCall::new(Arc::clone(&shared));
            async move {
                ctx.call().attributes().put(&CALL_MEASURE, guard.measure);
                let result = ctx.proceed().await;
                if result.is_err() {
                    guard.handles.exceptions.increment(1);
                }
                drop(guard);
                result
            }
        })?;

        Ok(Arc::new(Self { handles }))
    }
}
