//! Rules: a consequence plus the scheduling attributes the agenda honors.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::agenda::Activation;
use crate::error::ConsequenceError;
use crate::tuple::Tuple;
use crate::working_memory::WorkingMemory;

/// Action body executed when a rule fires.
///
/// Runs on the caller's thread for immediate activations and on the scheduler
/// thread for timed ones.
pub type Consequence =
    Arc<dyn Fn(&Activation, &WorkingMemory) -> Result<(), ConsequenceError> + Send + Sync>;

/// Delay before a matched rule fires.
pub trait RuleDuration: Send + Sync {
    /// Delay for the given tuple. A zero delay means fire immediately.
    fn duration(&self, tuple: &Tuple) -> Duration;
}

impl<F> RuleDuration for F
where
    F: Fn(&Tuple) -> Duration + Send + Sync,
{
    fn duration(&self, tuple: &Tuple) -> Duration {
        self(tuple)
    }
}

/// The same delay for every tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDuration(Duration);

impl FixedDuration {
    #[must_use]
    pub const fn new(duration: Duration) -> Self {
        Self(duration)
    }

    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(Duration::from_millis(millis))
    }
}

impl RuleDuration for FixedDuration {
    fn duration(&self, _tuple: &Tuple) -> Duration {
        self.0
    }
}

/// A production rule as seen by the agenda.
#[derive(Clone)]
pub struct Rule {
    name: String,
    consequence: Consequence,
    duration: Option<Arc<dyn RuleDuration>>,
    no_loop: bool,
    load_order: u64,
}

impl Rule {
    /// Creates a rule with an immediate consequence and load order 0.
    pub fn new<F>(name: impl Into<String>, consequence: F) -> Self
    where
        F: Fn(&Activation, &WorkingMemory) -> Result<(), ConsequenceError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            consequence: Arc::new(consequence),
            duration: None,
            no_loop: false,
            load_order: 0,
        }
    }

    /// Sets the delay before firing.
    #[must_use]
    pub fn with_duration(mut self, duration: impl RuleDuration + 'static) -> Self {
        self.duration = Some(Arc::new(duration));
        self
    }

    /// Suppresses reactivation from this rule's own consequence.
    #[must_use]
    pub fn with_no_loop(mut self, no_loop: bool) -> Self {
        self.no_loop = no_loop;
        self
    }

    #[must_use]
    pub fn with_load_order(mut self, load_order: u64) -> Self {
        self.load_order = load_order;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn consequence(&self) -> &Consequence {
        &self.consequence
    }

    #[must_use]
    pub const fn is_no_loop(&self) -> bool {
        self.no_loop
    }

    #[must_use]
    pub const fn load_order(&self) -> u64 {
        self.load_order
    }

    #[must_use]
    pub fn has_duration(&self) -> bool {
        self.duration.is_some()
    }

    /// Delay for `tuple`, or `None` if the rule fires immediately.
    #[must_use]
    pub fn duration_for(&self, tuple: &Tuple) -> Option<Duration> {
        self.duration
            .as_ref()
            .map(|d| d.duration(tuple))
            .filter(|d| !d.is_zero())
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("has_duration", &self.duration.is_some())
            .field("no_loop", &self.no_loop)
            .field("load_order", &self.load_order)
            .finish_non_exhaustive()
    }
}
