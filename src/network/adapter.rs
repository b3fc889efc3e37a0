use std::sync::Arc;

use crate::context::PropagationContext;
use crate::error::ReteResult;
use crate::fact::FactHandle;
use crate::tuple::{Tuple, TupleKey};
use crate::value::Value;
use crate::working_memory::WorkingMemory;

use super::{NodeId, ObjectSink, ObjectSourceNode, TupleSource, TupleSourceNode};

/// Bridges the object side to the tuple side: each fact becomes a tuple
/// binding that fact at a fixed column.
pub struct LeftInputAdapterNode {
    source: TupleSource,
    column: usize,
    parent: Arc<dyn ObjectSourceNode>,
}

impl LeftInputAdapterNode {
    #[must_use]
    pub fn new(id: NodeId, column: usize, parent: Arc<dyn ObjectSourceNode>) -> Self {
        Self {
            source: TupleSource::new(id),
            column,
            parent,
        }
    }

    #[must_use]
    pub const fn column(&self) -> usize {
        self.column
    }

    pub fn attach(self: &Arc<Self>) {
        self.parent
            .object_source()
            .add_object_sink(Arc::clone(self) as Arc<dyn ObjectSink>);
        self.source.attach();
    }
}

impl ObjectSink for LeftInputAdapterNode {
    fn assert_object(
        &self,
        _fact: &Value,
        handle: FactHandle,
        context: &PropagationContext,
        memory: &WorkingMemory,
    ) -> ReteResult<()> {
        let tuple = Tuple::new(self.column, handle);
        self.source.propagate_assert_tuple(&tuple, context, memory)
    }

    fn retract_object(
        &self,
        handle: FactHandle,
        context: &PropagationContext,
        memory: &WorkingMemory,
    ) -> ReteResult<()> {
        let key = TupleKey::new(self.column, handle);
        self.source.propagate_retract_tuples(&key, context, memory)
    }

    fn rule_attached(&self) {
        self.source.rule_attached();
    }
}

impl TupleSourceNode for LeftInputAdapterNode {
    fn tuple_source(&self) -> &TupleSource {
        &self.source
    }

    /// The adapter keeps no memory, so the parent replays its facts.
    fn update_new_node(
        &self,
        memory: &WorkingMemory,
        context: &PropagationContext,
    ) -> ReteResult<()> {
        self.parent.update_new_node(memory, context)
    }
}
