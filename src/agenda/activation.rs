use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::PropagationContext;
use crate::rule::Rule;
use crate::tuple::Tuple;

/// Unique identifier for an activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivationId(Uuid);

impl ActivationId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ActivationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActivationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A rule matched against a tuple, waiting to fire.
///
/// Also called an agenda item.
#[derive(Debug)]
pub struct Activation {
    id: ActivationId,
    tuple: Tuple,
    context: PropagationContext,
    rule: Arc<Rule>,
    created_at: DateTime<Utc>,
    cancelled: AtomicBool,
}

impl Activation {
    #[must_use]
    pub fn new(tuple: Tuple, context: PropagationContext, rule: Arc<Rule>) -> Self {
        Self {
            id: ActivationId::new(),
            tuple,
            context,
            rule,
            created_at: Utc::now(),
            cancelled: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub const fn id(&self) -> ActivationId {
        self.id
    }

    #[must_use]
    pub const fn tuple(&self) -> &Tuple {
        &self.tuple
    }

    /// Context of the propagation that created this activation.
    #[must_use]
    pub const fn context(&self) -> &PropagationContext {
        &self.context
    }

    #[must_use]
    pub const fn rule(&self) -> &Arc<Rule> {
        &self.rule
    }

    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Marks a scheduled activation so the scheduler skips it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
