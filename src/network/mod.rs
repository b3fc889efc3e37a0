//! The Rete propagation network.
//!
//! Facts enter at the [`Rete`] root and flow through object sources and sinks
//! ([`AlphaNode`]s) to a [`LeftInputAdapterNode`], which turns them into tuples.
//! Tuples flow through [`TestNode`]s to a [`TerminalNode`], which places
//! activations on the agenda.
//!
//! Propagation is synchronous on the caller's thread. Sinks are notified in the
//! order they were added and the first sink error aborts the rest.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::context::PropagationContext;
use crate::error::ReteResult;
use crate::fact::FactHandle;
use crate::tuple::{Tuple, TupleKey};
use crate::value::Value;
use crate::working_memory::WorkingMemory;

/// Adapts facts into single-column tuples.
pub mod adapter;
/// Single-fact filter node.
pub mod alpha;
/// Ordered object sink fan-out.
pub mod object_source;
/// Network root.
pub mod rete;
/// Rule terminal node.
pub mod terminal;
/// Tuple filter node.
pub mod test_node;
/// Ordered tuple sink fan-out.
pub mod tuple_source;

pub use adapter::LeftInputAdapterNode;
pub use alpha::AlphaNode;
pub use object_source::ObjectSource;
pub use rete::Rete;
pub use terminal::TerminalNode;
pub use test_node::TestNode;
pub use tuple_source::TupleSource;

/// Unique node id; also the node's slot in a working memory's memory arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(usize);

impl NodeId {
    /// Id of the network root.
    pub const ROOT: Self = Self(0);

    #[must_use]
    pub const fn new(id: usize) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node:{}", self.0)
    }
}

/// Sinks of one source in insertion order, plus where the ones added since
/// the source last completed an attachment begin.
pub(crate) struct SinkList<S: ?Sized> {
    sinks: Vec<Arc<S>>,
    new_from: Option<usize>,
}

impl<S: ?Sized> SinkList<S> {
    pub(crate) const fn new() -> Self {
        Self {
            sinks: Vec::new(),
            new_from: None,
        }
    }

    pub(crate) fn push(&mut self, sink: Arc<S>) {
        if self.new_from.is_none() {
            self.new_from = Some(self.sinks.len());
        }
        self.sinks.push(sink);
    }

    pub(crate) fn all(&self) -> Vec<Arc<S>> {
        self.sinks.clone()
    }

    /// Sinks added since the last [`complete`](Self::complete); empty when
    /// not attaching.
    pub(crate) fn added(&self) -> Vec<Arc<S>> {
        self.new_from
            .map_or_else(Vec::new, |from| self.sinks[from..].to_vec())
    }

    pub(crate) fn len(&self) -> usize {
        self.sinks.len()
    }

    pub(crate) const fn is_attaching(&self) -> bool {
        self.new_from.is_some()
    }

    pub(crate) fn complete(&mut self) {
        self.new_from = None;
    }
}

/// Receives fact assertions and retractions.
pub trait ObjectSink: Send + Sync {
    fn assert_object(
        &self,
        fact: &Value,
        handle: FactHandle,
        context: &PropagationContext,
        memory: &WorkingMemory,
    ) -> ReteResult<()>;

    fn retract_object(
        &self,
        handle: FactHandle,
        context: &PropagationContext,
        memory: &WorkingMemory,
    ) -> ReteResult<()>;

    /// Takes this node and everything below it out of attach mode.
    fn rule_attached(&self) {}
}

/// Receives tuple assertions and retractions.
pub trait TupleSink: Send + Sync {
    fn assert_tuple(
        &self,
        tuple: &Tuple,
        context: &PropagationContext,
        memory: &WorkingMemory,
    ) -> ReteResult<()>;

    fn retract_tuples(
        &self,
        key: &TupleKey,
        context: &PropagationContext,
        memory: &WorkingMemory,
    ) -> ReteResult<()>;

    /// Takes this node and everything below it out of attach mode.
    fn rule_attached(&self) {}
}

/// A node that feeds object sinks.
pub trait ObjectSourceNode: Send + Sync {
    fn object_source(&self) -> &ObjectSource;

    /// Brings a sink added after facts were asserted up to date in `memory`.
    fn update_new_node(
        &self,
        memory: &WorkingMemory,
        context: &PropagationContext,
    ) -> ReteResult<()>;

    fn node_id(&self) -> NodeId {
        self.object_source().id()
    }
}

/// A node that feeds tuple sinks.
pub trait TupleSourceNode: Send + Sync {
    fn tuple_source(&self) -> &TupleSource;

    /// Brings a sink added after tuples were asserted up to date in `memory`.
    fn update_new_node(
        &self,
        memory: &WorkingMemory,
        context: &PropagationContext,
    ) -> ReteResult<()>;

    fn node_id(&self) -> NodeId {
        self.tuple_source().id()
    }
}
