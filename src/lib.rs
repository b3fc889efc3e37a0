//! # KyroRete - Incremental Rete Propagation Core
//!
//! KyroRete matches facts against rules incrementally. Facts asserted into a
//! working memory flow through a shared network of filter nodes; every rule
//! whose conditions hold produces an activation on the agenda. Rules with a
//! duration fire later on a dedicated scheduler thread.
//!
//! ## Core Concepts
//!
//! - **FactHandle**: Identity of one asserted fact
//! - **AlphaNode**: Single-fact filter with optional memory
//! - **TestNode**: Tuple filter
//! - **WorkingMemory**: Facts, per-node memory, and the agenda for one session
//! - **Scheduler**: Fires timed activations in the background
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use kyrorete::network::{
//!     AlphaNode, LeftInputAdapterNode, ObjectSourceNode, TerminalNode, TupleSourceNode,
//! };
//! use kyrorete::{LiteralConstraint, Rule, RuleBase, RuleBaseConfig, Value};
//!
//! let rule_base = RuleBase::new(RuleBaseConfig::default())?;
//! let rule = rule_base.add_rule(Rule::new("cheddar", |_, _| Ok(())))?;
//!
//! let alpha = Arc::new(AlphaNode::new(
//!     rule_base.next_node_id(),
//!     Some(Arc::new(LiteralConstraint::field_equals("type", "cheddar"))),
//!     true,
//!     Some(Arc::clone(rule_base.rete()) as Arc<dyn ObjectSourceNode>),
//! ));
//! alpha.attach();
//! let adapter = Arc::new(LeftInputAdapterNode::new(
//!     rule_base.next_node_id(),
//!     0,
//!     Arc::clone(&alpha) as Arc<dyn ObjectSourceNode>,
//! ));
//! adapter.attach();
//! let terminal = Arc::new(TerminalNode::new(
//!     rule_base.next_node_id(),
//!     Some(Arc::clone(&adapter) as Arc<dyn TupleSourceNode>),
//!     rule,
//! ));
//! terminal.attach();
//! let root = Arc::clone(rule_base.rete()) as Arc<dyn ObjectSourceNode>;
//! rule_base.complete_attachment(&[root], &[])?;
//!
//! let memory = rule_base.new_working_memory()?;
//! memory.assert_object(Value::record([("type", Value::from("cheddar"))]))?;
//! assert_eq!(memory.fire_all_rules()?, 1);
//! # Ok::<(), kyrorete::ReteError>(())
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod context;
pub mod error;
pub mod fact;
pub mod tuple;
pub mod value;

// Matching
pub mod constraint;
pub mod memory;
pub mod network;
pub mod rule;

// Runtime
pub mod agenda;
pub mod rule_base;
pub mod scheduler;
pub mod working_memory;

#[cfg(test)]
pub(crate) mod testing;

// Re-export primary types at crate root for convenience
pub use agenda::{Activation, ActivationId, Agenda, ConflictResolver, LoadOrderConflictResolver};
pub use constraint::{
    Comparator, Condition, Constraint, Extractor, LiteralConstraint, PredicateCondition,
    PredicateConstraint, ReturnValueConstraint,
};
pub use context::{PropagationContext, PropagationKind};
pub use error::{
    ConsequenceError, EvaluationError, FactError, ReteError, ReteResult, SchedulerError,
};
pub use fact::{FactHandle, FactHandleFactory};
pub use memory::{MemoryNode, NodeMemory};
pub use network::NodeId;
pub use rule::{Consequence, FixedDuration, Rule, RuleDuration};
pub use rule_base::{RuleBase, RuleBaseConfig};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use tuple::{Tuple, TupleKey};
pub use value::Value;
pub use working_memory::{AsyncExceptionHandler, WorkingMemory, WorkingMemoryConfig};
