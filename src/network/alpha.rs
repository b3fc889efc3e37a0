use std::sync::Arc;

use tracing::trace;

use crate::constraint::Constraint;
use crate::context::PropagationContext;
use crate::error::{ReteError, ReteResult};
use crate::fact::FactHandle;
use crate::memory::{MemoryNode, NodeMemory};
use crate::value::Value;
use crate::working_memory::WorkingMemory;

use super::{NodeId, ObjectSink, ObjectSource, ObjectSourceNode};

/// Filters single facts through an optional constraint.
///
/// With memory enabled the node remembers which handles passed, so repeated
/// assertions of the same handle propagate once and retractions of handles it
/// never passed are dropped. Without memory it forwards every retraction.
pub struct AlphaNode {
    source: ObjectSource,
    constraint: Option<Arc<dyn Constraint>>,
    has_memory: bool,
    parent: Option<Arc<dyn ObjectSourceNode>>,
}

impl AlphaNode {
    #[must_use]
    pub fn new(
        id: NodeId,
        constraint: Option<Arc<dyn Constraint>>,
        has_memory: bool,
        parent: Option<Arc<dyn ObjectSourceNode>>,
    ) -> Self {
        Self {
            source: ObjectSource::new(id),
            constraint,
            has_memory,
            parent,
        }
    }

    #[must_use]
    pub const fn has_memory(&self) -> bool {
        self.has_memory
    }

    /// Registers this node as a sink of its parent.
    pub fn attach(self: &Arc<Self>) {
        if let Some(parent) = &self.parent {
            parent
                .object_source()
                .add_object_sink(Arc::clone(self) as Arc<dyn ObjectSink>);
        }
        self.source.attach();
    }

    fn passes(&self, fact: &Value, handle: FactHandle, memory: &WorkingMemory) -> ReteResult<bool> {
        match &self.constraint {
            Some(constraint) => Ok(constraint.evaluate(fact, handle, memory)?),
            None => Ok(true),
        }
    }
}

impl MemoryNode for AlphaNode {
    fn id(&self) -> NodeId {
        self.source.id()
    }

    fn create_memory(&self) -> NodeMemory {
        NodeMemory::facts()
    }
}

impl ObjectSink for AlphaNode {
    fn assert_object(
        &self,
        fact: &Value,
        handle: FactHandle,
        context: &PropagationContext,
        memory: &WorkingMemory,
    ) -> ReteResult<()> {
        if !self.passes(fact, handle, memory)? {
            trace!(node = %self.source.id(), %handle, "constraint rejected fact");
            return Ok(());
        }

        if self.has_memory {
            let inserted = memory.with_node_memory(self, |m| match m {
                NodeMemory::Facts(set) => set.insert(handle),
                NodeMemory::Tuples(_) => false,
            })?;
            if !inserted {
                trace!(node = %self.source.id(), %handle, "already remembered");
                return Ok(());
            }
        }

        self.source.propagate_assert_object(fact, handle, context, memory)
    }

    fn retract_object(
        &self,
        handle: FactHandle,
        context: &PropagationContext,
        memory: &WorkingMemory,
    ) -> ReteResult<()> {
        if self.has_memory {
            let removed = memory.with_node_memory(self, |m| match m {
                NodeMemory::Facts(set) => set.remove(&handle),
                NodeMemory::Tuples(_) => false,
            })?;
            if !removed {
                return Ok(());
            }
        }

        self.source.propagate_retract_object(handle, context, memory)
    }

    fn rule_attached(&self) {
        self.source.rule_attached();
    }
}

impl ObjectSourceNode for AlphaNode {
    fn object_source(&self) -> &ObjectSource {
        &self.source
    }

    /// With memory, replays remembered facts to the sinks added since the last
    /// completed attachment. Without, asks the parent to replay.
    fn update_new_node(
        &self,
        memory: &WorkingMemory,
        context: &PropagationContext,
    ) -> ReteResult<()> {
        if !self.has_memory {
            return match &self.parent {
                Some(parent) => parent.update_new_node(memory, context),
                None => Ok(()),
            };
        }

        let sinks = self.source.new_sinks();
        if sinks.is_empty() {
            return Ok(());
        }
        let handles = memory.node_memory(self)?.fact_handles();
        for handle in handles {
            let fact = memory
                .get_object(handle)?
                .ok_or_else(|| ReteError::no_such_fact_handle(handle))?;
            for sink in &sinks {
                sink.assert_object(&fact, handle, context, memory)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::{LiteralConstraint, PredicateConstraint};
    use crate::context::PropagationKind;
    use crate::error::EvaluationError;
    use crate::network::mock::{MockObjectSink, MockObjectSource};
    use crate::testing::test_memory as new_test_memory;

    fn cheese(kind: &str, price: i64) -> Value {
        Value::record([("type", Value::from(kind)), ("price", Value::from(price))])
    }

    fn cheddar_node(has_memory: bool) -> Arc<AlphaNode> {
        Arc::new(AlphaNode::new(
            NodeId::new(2),
            Some(Arc::new(LiteralConstraint::field_equals("type", "cheddar"))),
            has_memory,
            None,
        ))
    }

    #[test]
    fn test_attach() {
        let source = Arc::new(MockObjectSource::new(15));
        let node = Arc::new(AlphaNode::new(
            NodeId::new(1),
            None,
            false,
            Some(source.clone() as Arc<dyn ObjectSourceNode>),
        ));
        assert_eq!(node.id(), NodeId::new(1));
        assert_eq!(source.object_source().sink_count(), 0);

        node.attach();
        let sinks = source.object_source().object_sinks();
        assert_eq!(sinks.len(), 1);
        assert_eq!(
            Arc::as_ptr(&sinks[0]).cast::<()>(),
            Arc::as_ptr(&node).cast::<()>()
        );
        assert_eq!(node.object_source().attached(), 1);
    }

    #[test]
    fn test_memory() {
        let wm = new_test_memory();
        let node = AlphaNode::new(NodeId::new(2), None, true, None);
        assert!(wm.node_memory(&node).unwrap().is_empty());
        assert!(matches!(wm.node_memory(&node).unwrap(), NodeMemory::Facts(_)));
    }

    #[test]
    fn test_literal_constraint_assert_with_memory() {
        let wm = new_test_memory();
        let context = PropagationContext::external(PropagationKind::Assertion);
        let node = cheddar_node(true);
        let sink = Arc::new(MockObjectSink::default());
        node.object_source().add_object_sink(sink.clone());
        node.object_source().rule_attached();

        let cheddar = cheese("cheddar", 5);
        let h0 = FactHandle::new(0);
        wm.put_object(h0, cheddar.clone()).unwrap();

        assert!(sink.asserted().is_empty());
        assert!(wm.node_memory(node.as_ref()).unwrap().is_empty());

        node.assert_object(&cheddar, h0, &context, &wm).unwrap();
        assert_eq!(sink.asserted().len(), 1);
        assert_eq!(sink.asserted()[0].handle, h0);
        assert_eq!(sink.asserted()[0].fact, cheddar);
        assert!(wm.node_memory(node.as_ref()).unwrap().contains_fact(h0));

        // Same handle again: remembered, not propagated.
        node.assert_object(&cheddar, h0, &context, &wm).unwrap();
        assert_eq!(sink.asserted().len(), 1);
        assert_eq!(wm.node_memory(node.as_ref()).unwrap().len(), 1);

        let stilton = cheese("stilton", 6);
        let h1 = FactHandle::new(1);
        node.assert_object(&stilton, h1, &context, &wm).unwrap();
        assert_eq!(sink.asserted().len(), 1);
        assert_eq!(wm.node_memory(node.as_ref()).unwrap().len(), 1);
    }

    #[test]
    fn test_literal_constraint_assert_without_memory() {
        let wm = new_test_memory();
        let context = PropagationContext::external(PropagationKind::Assertion);
        let node = cheddar_node(false);
        let sink = Arc::new(MockObjectSink::default());
        node.object_source().add_object_sink(sink.clone());
        node.object_source().rule_attached();

        let cheddar = cheese("cheddar", 5);
        node.assert_object(&cheddar, FactHandle::new(0), &context, &wm).unwrap();
        assert_eq!(sink.asserted().len(), 1);
        assert!(wm.node_memory(node.as_ref()).unwrap().is_empty());

        // No memory: the same handle propagates again.
        node.assert_object(&cheddar, FactHandle::new(0), &context, &wm).unwrap();
        assert_eq!(sink.asserted().len(), 2);

        node.assert_object(&cheese("stilton", 6), FactHandle::new(1), &context, &wm)
            .unwrap();
        assert_eq!(sink.asserted().len(), 2);
    }

    #[test]
    fn test_retract_with_memory() {
        let wm = new_test_memory();
        let context = PropagationContext::external(PropagationKind::Assertion);
        let node = cheddar_node(true);
        let sink = Arc::new(MockObjectSink::default());
        node.object_source().add_object_sink(sink.clone());
        node.object_source().rule_attached();

        let cheddar = cheese("cheddar", 5);
        let h0 = FactHandle::new(0);
        node.assert_object(&cheddar, h0, &context, &wm).unwrap();
        assert_eq!(wm.node_memory(node.as_ref()).unwrap().len(), 1);

        // Never passed: dropped silently.
        node.retract_object(FactHandle::new(1), &context, &wm).unwrap();
        assert!(sink.retracted().is_empty());
        assert_eq!(wm.node_memory(node.as_ref()).unwrap().len(), 1);

        node.retract_object(h0, &context, &wm).unwrap();
        assert_eq!(sink.retracted().len(), 1);
        assert_eq!(sink.retracted()[0].handle, h0);
        assert!(wm.node_memory(node.as_ref()).unwrap().is_empty());
    }

    #[test]
    fn test_retract_without_memory_always_propagates() {
        let wm = new_test_memory();
        let context = PropagationContext::external(PropagationKind::Retraction);
        let node = cheddar_node(false);
        let sink = Arc::new(MockObjectSink::default());
        node.object_source().add_object_sink(sink.clone());

        node.retract_object(FactHandle::new(9), &context, &wm).unwrap();
        assert_eq!(sink.retracted().len(), 1);
        assert!(wm.node_memory(node.as_ref()).unwrap().is_empty());
    }

    #[test]
    fn test_constraint_error_propagates() {
        let wm = new_test_memory();
        let context = PropagationContext::external(PropagationKind::Assertion);
        let node = AlphaNode::new(
            NodeId::new(2),
            Some(Arc::new(PredicateConstraint::new(|_| {
                Err(EvaluationError::failed("bad fact"))
            }))),
            true,
            None,
        );
        let err = node
            .assert_object(&Value::Null, FactHandle::new(0), &context, &wm)
            .unwrap_err();
        assert!(err.is_evaluation());
        assert!(wm.node_memory(&node).unwrap().is_empty());
    }

    #[test]
    fn test_update_new_node_with_memory() {
        let wm = new_test_memory();
        let context = PropagationContext::external(PropagationKind::Assertion);
        let source = Arc::new(MockObjectSource::new(1));
        let node = Arc::new(AlphaNode::new(
            NodeId::new(2),
            None,
            true,
            Some(source.clone() as Arc<dyn ObjectSourceNode>),
        ));
        node.attach();

        let sink1 = Arc::new(MockObjectSink::default());
        node.object_source().add_object_sink(sink1.clone());
        node.object_source().rule_attached();

        let h0 = FactHandle::new(0);
        let h1 = FactHandle::new(1);
        wm.put_object(h0, cheese("cheddar", 5)).unwrap();
        wm.put_object(h1, cheese("stilton", 6)).unwrap();
        node.assert_object(&cheese("cheddar", 5), h0, &context, &wm).unwrap();
        node.assert_object(&cheese("stilton", 6), h1, &context, &wm).unwrap();
        assert_eq!(sink1.asserted().len(), 2);

        let sink2 = Arc::new(MockObjectSink::default());
        node.object_source().add_object_sink(sink2.clone());
        node.update_new_node(&wm, &context).unwrap();

        assert_eq!(sink1.asserted().len(), 2);
        assert_eq!(sink2.asserted().len(), 2);
        assert_eq!(source.updated(), 0);
    }

    #[test]
    fn test_update_new_node_without_memory_asks_parent() {
        let wm = new_test_memory();
        let context = PropagationContext::external(PropagationKind::Assertion);
        let source = Arc::new(MockObjectSource::new(1));
        let node = Arc::new(AlphaNode::new(
            NodeId::new(2),
            None,
            false,
            Some(source.clone() as Arc<dyn ObjectSourceNode>),
        ));
        node.attach();

        assert_eq!(source.updated(), 0);
        node.update_new_node(&wm, &context).unwrap();
        assert_eq!(source.updated(), 1);
    }
}
