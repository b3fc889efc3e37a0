use tracing::debug;

use crate::context::PropagationContext;
use crate::error::{ReteError, ReteResult};
use crate::fact::FactHandle;
use crate::value::Value;
use crate::working_memory::WorkingMemory;

use super::{NodeId, ObjectSource, ObjectSourceNode};

/// Root of the network. Every fact enters here.
pub struct Rete {
    source: ObjectSource,
}

impl Rete {
    #[must_use]
    pub fn new() -> Self {
        Self {
            source: ObjectSource::new(NodeId::ROOT),
        }
    }

    pub fn assert_object(
        &self,
        fact: &Value,
        handle: FactHandle,
        context: &PropagationContext,
        memory: &WorkingMemory,
    ) -> ReteResult<()> {
        self.source.propagate_assert_object(fact, handle, context, memory)
    }

    pub fn retract_object(
        &self,
        handle: FactHandle,
        context: &PropagationContext,
        memory: &WorkingMemory,
    ) -> ReteResult<()> {
        self.source.propagate_retract_object(handle, context, memory)
    }
}

impl Default for Rete {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectSourceNode for Rete {
    fn object_source(&self) -> &ObjectSource {
        &self.source
    }

    /// Replays every fact in `memory`. In attach mode only the new sinks see them.
    fn update_new_node(
        &self,
        memory: &WorkingMemory,
        context: &PropagationContext,
    ) -> ReteResult<()> {
        let handles = memory.fact_handles()?;
        debug!(facts = handles.len(), "replaying facts from root");
        for handle in handles {
            let fact = memory
                .get_object(handle)?
                .ok_or_else(|| ReteError::no_such_fact_handle(handle))?;
            self.source.propagate_assert_object(&fact, handle, context, memory)?;
        }
        Ok(())
    }
}
