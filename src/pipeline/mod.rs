//! Phased interception pipeline.
//!
//! A [`Pipeline`] is an ordered list of [`Phase`]s, each holding interceptors
//! in registration order. [`Pipeline::execute`] runs them as one continuation
//! chain: every interceptor receives a [`PipelineContext`] whose
//! [`proceed`](PipelineContext::proceed) runs the remainder of the chain and
//! returns once it has finished. Returning without proceeding short-circuits
//! the call, and errors travel back up through every enclosing `proceed`.
//!
//! The phase structure is mutated through `&mut Pipeline` during setup only.
//! Execution reads a flattened snapshot of the chain that is cached until the
//! next mutation, so concurrent calls share it without locking.

mod context;
mod error;
mod phase;
#[cfg(test)]
mod tests;

use std::{fmt, future::Future, sync::Arc, sync::OnceLock};

pub use context::{Interceptor, PipelineContext};
use context::{Link, run_chain};
pub use error::PipelineError;
pub use phase::Phase;
use phase::PhaseRelation;

use crate::{attributes::Attributes, error::CallError};

struct PhaseEntry<C> {
    phase: Phase,
    relation: PhaseRelation,
    interceptors: Vec<Arc<dyn Interceptor<C>>>,
}

impl<C> PhaseEntry<C> {
    fn new(phase: Phase, relation: PhaseRelation) -> Self {
        Self {
            phase,
            relation,
            interceptors: Vec::new(),
        }
    }
}

/// Ordered set of phases executed for every call of subject type `C`.
pub struct Pipeline<C> {
    phases: Vec<PhaseEntry<C>>,
    chain: OnceLock<Arc<[Link<C>]>>,
    features: Attributes,
}

impl<C> Default for Pipeline<C> {
    fn default() -> Self {
        Self {
            phases: Vec::new(),
            chain: OnceLock::new(),
            features: Attributes::default(),
        }
    }
}

impl<C> Pipeline<C>
where
    C: Send + Sync + 'static,
{
    /// Create a pipeline without phases.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Create a pipeline with the given phases appended in order.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DuplicatePhase`] if a phase is listed twice.
    pub fn with_phases(phases: impl IntoIterator<Item = Phase>) -> Result<Self, PipelineError> {
        let mut pipeline = Self::new();
        for phase in phases {
            pipeline.add_phase(phase)?;
        }
        Ok(pipeline)
    }

    /// Append `phase` after all existing phases.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DuplicatePhase`] if `phase` already exists.
    pub fn add_phase(&mut self, phase: Phase) -> Result<(), PipelineError> {
        self.ensure_absent(&phase)?;
        self.phases.push(PhaseEntry::new(phase, PhaseRelation::Last));
        self.invalidate();
        Ok(())
    }

    /// Insert `phase` directly before `reference`.
    ///
    /// Phases inserted before the same reference keep their registration
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DuplicatePhase`] if `phase` already exists, or
    /// [`PipelineError::PhaseNotFound`] if `reference` does not.
    pub fn insert_phase_before(
        &mut self,
        reference: &Phase,
        phase: Phase,
    ) -> Result<(), PipelineError> {
        self.ensure_absent(&phase)?;
        let index = self.position(reference)?;
        self.phases.insert(
            index,
            PhaseEntry::new(phase, PhaseRelation::Before(reference.clone())),
        );
        self.invalidate();
        Ok(())
    }

    /// Insert `phase` after `reference` and after any phase previously
    /// inserted after `reference`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DuplicatePhase`] if `phase` already exists, or
    /// [`PipelineError::PhaseNotFound`] if `reference` does not.
    pub fn insert_phase_after(
        &mut self,
        reference: &Phase,
        phase: Phase,
    ) -> Result<(), PipelineError> {
        self.ensure_absent(&phase)?;
        let anchor = PhaseRelation::After(reference.clone());
        let mut index = self.position(reference)? + 1;
        while self
            .phases
            .get(index)
            .is_some_and(|entry| entry.relation == anchor)
        {
            index += 1;
        }
        self.phases.insert(index, PhaseEntry::new(phase, anchor));
        self.invalidate();
        Ok(())
    }

    /// Append an interceptor closure to `phase`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::PhaseNotFound`] if `phase` was never added.
    ///
    /// # Examples
    ///
    /// ```
    /// use weft::pipeline::{Phase, Pipeline};
    ///
    /// const WORK: Phase = Phase::new("Work");
    ///
    /// let mut pipeline: Pipeline<String> = Pipeline::with_phases([WORK]).expect("phases");
    /// pipeline
    ///     .intercept(&WORK, |mut ctx| async move {
    ///         tracing::info!(subject = %ctx.call(), "before");
    ///         ctx.proceed().await
    ///     })
    ///     .expect("phase exists");
    /// ```
    pub fn intercept<F, Fut>(&mut self, phase: &Phase, interceptor: F) -> Result<(), PipelineError>
    where
        F: Fn(PipelineContext<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), CallError>> + Send + 'static,
    {
        self.install_interceptor(phase, interceptor)
    }

    /// Append an [`Interceptor`] implementation to `phase`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::PhaseNotFound`] if `phase` was never added.
    pub fn install_interceptor<I>(&mut self, phase: &Phase, interceptor: I) -> Result<(), PipelineError>
    where
        I: Interceptor<C>,
    {
        let index = self.position(phase)?;
        self.phases[index].interceptors.push(Arc::new(interceptor));
        self.invalidate();
        Ok(())
    }

    /// Phases in execution order.
    pub fn phases(&self) -> impl Iterator<Item = &Phase> + '_ {
        self.phases.iter().map(|entry| &entry.phase)
    }

    /// Returns `true` if `phase` is registered.
    #[must_use]
    pub fn has_phase(&self, phase: &Phase) -> bool { self.position(phase).is_ok() }

    /// Number of interceptors across all phases.
    #[must_use]
    pub fn interceptor_count(&self) -> usize {
        self.phases.iter().map(|entry| entry.interceptors.len()).sum()
    }

    /// Returns `true` if no interceptor is installed.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.interceptor_count() == 0 }

    /// Run every interceptor for `call` in phase order.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by an interceptor. Cleanup performed by
    /// enclosing interceptors has already run by the time it is returned.
    pub async fn execute(&self, call: impl Into<Arc<C>>) -> Result<(), CallError> {
        run_chain(call.into(), self.chain(), 0).await
    }

    pub(crate) fn features(&self) -> &Attributes { &self.features }

    fn chain(&self) -> Arc<[Link<C>]> {
        Arc::clone(self.chain.get_or_init(|| {
            self.phases
                .iter()
                .flat_map(|entry| {
                    entry.interceptors.iter().map(|interceptor| Link {
                        phase: entry.phase.clone(),
                        interceptor: Arc::clone(interceptor),
                    })
                })
                .collect()
        }))
    }

    fn invalidate(&mut self) { self.chain = OnceLock::new(); }

    fn position(&self, phase: &Phase) -> Result<usize, PipelineError> {
        self.phases
            .iter()
            .position(|entry| &entry.phase == phase)
            .ok_or_else(|| PipelineError::PhaseNotFound(phase.clone()))
    }

    fn ensure_absent(&self, phase: &Phase) -> Result<(), PipelineError> {
        if self.position(phase).is_ok() {
            return Err(PipelineError::DuplicatePhase(phase.clone()));
        }
        Ok(())
    }
}

impl<C> fmt::Debug for Pipeline<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field(
                "phases",
                &self
                    .phases
                    .iter()
                    .map(|entry| (entry.phase.name(), entry.interceptors.len()))
                    .collect::<Vec<_>>(),
            )
            .field("features", &self.features)
            .finish()
    }
}
