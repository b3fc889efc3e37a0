use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::trace;

use crate::context::PropagationContext;
use crate::error::ReteResult;
use crate::fact::FactHandle;
use crate::value::Value;
use crate::working_memory::WorkingMemory;

use super::{NodeId, ObjectSink, SinkList};

/// Ordered fan-out of facts to object sinks.
///
/// Adding a sink puts the source in attach mode: until [`rule_attached`] is
/// called, assertions reach only the sinks added since the last attachment
/// completed, so they can catch up without replaying facts into sinks that
/// have already seen them. A source that has never completed an attachment
/// treats all of its sinks as new. Retractions always reach every sink.
///
/// [`rule_attached`]: ObjectSource::rule_attached
pub struct ObjectSource {
    id: NodeId,
    sinks: RwLock<SinkList<dyn ObjectSink>>,
    attached: AtomicUsize,
}

impl ObjectSource {
    #[must_use]
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            sinks: RwLock::new(SinkList::new()),
            attached: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.id
    }

    fn read(&self) -> RwLockReadGuard<'_, SinkList<dyn ObjectSink>> {
        self.sinks.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SinkList<dyn ObjectSink>> {
        self.sinks.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a sink and enters attach mode.
    pub fn add_object_sink(&self, sink: Arc<dyn ObjectSink>) {
        self.write().push(sink);
    }

    /// Sinks in insertion order.
    #[must_use]
    pub fn object_sinks(&self) -> Vec<Arc<dyn ObjectSink>> {
        self.read().all()
    }

    /// Sinks added since the last [`rule_attached`](Self::rule_attached).
    #[must_use]
    pub fn new_sinks(&self) -> Vec<Arc<dyn ObjectSink>> {
        self.read().added()
    }

    #[must_use]
    pub fn sink_count(&self) -> usize {
        self.read().len()
    }

    /// Counts one attachment of the owning node.
    pub fn attach(&self) {
        self.attached.fetch_add(1, Ordering::AcqRel);
    }

    #[must_use]
    pub fn attached(&self) -> usize {
        self.attached.load(Ordering::Acquire)
    }

    /// Leaves attach mode here and in every node below.
    pub fn rule_attached(&self) {
        let sinks = {
            let mut list = self.write();
            list.complete();
            list.all()
        };
        for sink in &sinks {
            sink.rule_attached();
        }
    }

    #[must_use]
    pub fn is_attaching_new_node(&self) -> bool {
        self.read().is_attaching()
    }

    /// Forwards an assertion to the sinks.
    pub fn propagate_assert_object(
        &self,
        fact: &Value,
        handle: FactHandle,
        context: &PropagationContext,
        memory: &WorkingMemory,
    ) -> ReteResult<()> {
        let sinks = {
            let list = self.read();
            if list.is_attaching() {
                trace!(node = %self.id, %handle, "assert to new sinks only");
                list.added()
            } else {
                list.all()
            }
        };

        trace!(node = %self.id, %handle, sinks = sinks.len(), "propagate assert");
        for sink in &sinks {
            sink.assert_object(fact, handle, context, memory)?;
        }
        Ok(())
    }

    /// Forwards a retraction to every sink.
    pub fn propagate_retract_object(
        &self,
        handle: FactHandle,
        context: &PropagationContext,
        memory: &WorkingMemory,
    ) -> ReteResult<()> {
        let sinks = self.object_sinks();
        trace!(node = %self.id, %handle, sinks = sinks.len(), "propagate retract");
        for sink in &sinks {
            sink.retract_object(handle, context, memory)?;
        }
        Ok(())
    }
}
