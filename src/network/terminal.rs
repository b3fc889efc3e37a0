use std::sync::Arc;

use tracing::debug;

use crate::context::PropagationContext;
use crate::error::ReteResult;
use crate::rule::Rule;
use crate::tuple::{Tuple, TupleKey};
use crate::working_memory::WorkingMemory;

use super::{NodeId, TupleSink, TupleSourceNode};

/// End of a rule's path: matched tuples become agenda activations.
pub struct TerminalNode {
    id: NodeId,
    rule: Arc<Rule>,
    parent: Option<Arc<dyn TupleSourceNode>>,
}

impl TerminalNode {
    #[must_use]
    pub fn new(id: NodeId, parent: Option<Arc<dyn TupleSourceNode>>, rule: Arc<Rule>) -> Self {
        Self { id, rule, parent }
    }

    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.id
    }

    #[must_use]
    pub fn rule(&self) -> &Arc<Rule> {
        &self.rule
    }

    pub fn attach(self: &Arc<Self>) {
        if let Some(parent) = &self.parent {
            parent
                .tuple_source()
                .add_tuple_sink(Arc::clone(self) as Arc<dyn TupleSink>);
        }
    }
}

impl TupleSink for TerminalNode {
    fn assert_tuple(
        &self,
        tuple: &Tuple,
        context: &PropagationContext,
        memory: &WorkingMemory,
    ) -> ReteResult<()> {
        memory
            .agenda()
            .add_to_agenda(tuple.clone(), context.clone(), Arc::clone(&self.rule))
    }

    /// Cancels this rule's pending activations addressed by `key`.
    fn retract_tuples(
        &self,
        key: &TupleKey,
        _context: &PropagationContext,
        memory: &WorkingMemory,
    ) -> ReteResult<()> {
        let cancelled = memory
            .agenda()
            .cancel_activations(Some(self.rule.name()), key)?;
        if cancelled > 0 {
            debug!(rule = self.rule.name(), %key, cancelled, "cancelled activations");
        }
        Ok(())
    }
}
