//! Named pipeline phases and their ordering relations.

use std::{borrow::Cow, fmt};

/// A named slot in a [`Pipeline`](super::Pipeline) holding interceptors.
///
/// Phases compare by name. Declare well-known phases as constants:
///
/// ```
/// use weft::pipeline::Phase;
///
/// const AUDIT: Phase = Phase::new("Audit");
/// assert_eq!(AUDIT.name(), "Audit");
/// assert_eq!(AUDIT, Phase::named(String::from("Audit")));
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Phase(Cow<'static, str>);

impl Phase {
    /// Create a phase from a static name.
    #[must_use]
    pub const fn new(name: &'static str) -> Self { Self(Cow::Borrowed(name)) }

    /// Create a phase from a runtime name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self { Self(Cow::Owned(name.into())) }

    /// The phase name.
    #[must_use]
    pub fn name(&self) -> &str { &self.0 }
}

impl fmt::Debug for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Phase").field(&self.name()).finish()
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

/// How a phase was placed when it was registered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) enum PhaseRelation {
    /// Appended after every phase known at the time.
    Last,
    /// Inserted directly before the named phase.
    Before(Phase),
    /// Inserted after the named phase and any phase already anchored after it.
    After(Phase),
}
