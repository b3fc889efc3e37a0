use std::sync::Arc;

use tracing::trace;

use crate::constraint::Condition;
use crate::context::PropagationContext;
use crate::error::ReteResult;
use crate::memory::{MemoryNode, NodeMemory};
use crate::tuple::{Tuple, TupleKey};
use crate::working_memory::WorkingMemory;

use super::{NodeId, TupleSink, TupleSource, TupleSourceNode};

/// Filters tuples through a condition.
///
/// Passing tuple keys are remembered per working memory so a sink attached
/// later can be brought up to date. Retractions are forwarded without
/// evaluating the condition.
pub struct TestNode {
    source: TupleSource,
    condition: Arc<dyn Condition>,
    parent: Option<Arc<dyn TupleSourceNode>>,
}

impl TestNode {
    #[must_use]
    pub fn new(
        id: NodeId,
        parent: Option<Arc<dyn TupleSourceNode>>,
        condition: Arc<dyn Condition>,
    ) -> Self {
        Self {
            source: TupleSource::new(id),
            condition,
            parent,
        }
    }

    #[must_use]
    pub fn condition(&self) -> &Arc<dyn Condition> {
        &self.condition
    }

    pub fn attach(self: &Arc<Self>) {
        if let Some(parent) = &self.parent {
            parent
                .tuple_source()
                .add_tuple_sink(Arc::clone(self) as Arc<dyn TupleSink>);
        }
        self.source.attach();
    }
}

impl MemoryNode for TestNode {
    fn id(&self) -> NodeId {
        self.source.id()
    }

    fn create_memory(&self) -> NodeMemory {
        NodeMemory::tuples()
    }
}

impl TupleSink for TestNode {
    fn assert_tuple(
        &self,
        tuple: &Tuple,
        context: &PropagationContext,
        memory: &WorkingMemory,
    ) -> ReteResult<()> {
        if !self.condition.evaluate(tuple, memory)? {
            trace!(node = %self.source.id(), key = %tuple.key(), "condition rejected tuple");
            return Ok(());
        }

        let key = tuple.key().clone();
        memory.with_node_memory(self, |m| {
            if let NodeMemory::Tuples(set) = m {
                set.insert(key);
            }
        })?;
        self.source.propagate_assert_tuple(tuple, context, memory)
    }

    fn retract_tuples(
        &self,
        key: &TupleKey,
        context: &PropagationContext,
        memory: &WorkingMemory,
    ) -> ReteResult<()> {
        memory.with_node_memory(self, |m| {
            if let NodeMemory::Tuples(set) = m {
                set.retain(|remembered| !remembered.contains_key(key));
            }
        })?;
        self.source.propagate_retract_tuples(key, context, memory)
    }

    fn rule_attached(&self) {
        self.source.rule_attached();
    }
}

impl TupleSourceNode for TestNode {
    fn tuple_source(&self) -> &TupleSource {
        &self.source
    }

    fn update_new_node(
        &self,
        memory: &WorkingMemory,
        context: &PropagationContext,
    ) -> ReteResult<()> {
        let sinks = self.source.new_sinks();
        if sinks.is_empty() {
            return Ok(());
        }
        let mut keys = memory.node_memory(self)?.tuple_keys();
        keys.sort_by(|a, b| a.iter().cmp(b.iter()));
        for key in keys {
            let tuple = Tuple::from_key(key);
            for sink in &sinks {
                sink.assert_tuple(&tuple, context, memory)?;
            }
        }
        Ok(())
    }
}
