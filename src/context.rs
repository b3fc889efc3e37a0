//! Propagation contexts.
//!
//! A context is created per propagation call and carries what kind of change is
//! flowing through the network, plus the rule and activation that caused it
//! when the change originates inside a consequence.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agenda::{Activation, ActivationId};
use crate::rule::Rule;

/// Kind of change being propagated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropagationKind {
    Assertion,
    Retraction,
    Modification,
}

impl fmt::Display for PropagationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Assertion => f.write_str("assertion"),
            Self::Retraction => f.write_str("retraction"),
            Self::Modification => f.write_str("modification"),
        }
    }
}

/// Per-call propagation metadata.
#[derive(Clone)]
pub struct PropagationContext {
    id: Uuid,
    kind: PropagationKind,
    rule_origin: Option<Arc<Rule>>,
    activation_origin: Option<ActivationId>,
}

impl PropagationContext {
    #[must_use]
    pub fn new(
        kind: PropagationKind,
        rule_origin: Option<Arc<Rule>>,
        activation_origin: Option<ActivationId>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            rule_origin,
            activation_origin,
        }
    }

    /// A context for a change made outside any consequence.
    #[must_use]
    pub fn external(kind: PropagationKind) -> Self {
        Self::new(kind, None, None)
    }

    /// A context for a change made from inside `activation`'s consequence.
    #[must_use]
    pub fn from_activation(kind: PropagationKind, activation: &Activation) -> Self {
        Self::new(
            kind,
            Some(Arc::clone(activation.rule())),
            Some(activation.id()),
        )
    }

    /// Unique id of this context; two clones share it.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub const fn kind(&self) -> PropagationKind {
        self.kind
    }

    #[must_use]
    pub fn rule_origin(&self) -> Option<&Arc<Rule>> {
        self.rule_origin.as_ref()
    }

    #[must_use]
    pub const fn activation_origin(&self) -> Option<ActivationId> {
        self.activation_origin
    }

    /// Returns true if this change was caused by `rule`'s own consequence.
    #[must_use]
    pub fn originates_from(&self, rule: &Rule) -> bool {
        self.rule_origin
            .as_ref()
            .is_some_and(|origin| origin.name() == rule.name())
    }
}

impl fmt::Debug for PropagationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropagationContext")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("rule_origin", &self.rule_origin.as_ref().map(|r| r.name()))
            .field("activation_origin", &self.activation_origin)
            .finish()
    }
}
