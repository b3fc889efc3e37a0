use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::trace;

use crate::context::PropagationContext;
use crate::error::ReteResult;
use crate::tuple::{Tuple, TupleKey};
use crate::working_memory::WorkingMemory;

use super::{NodeId, SinkList, TupleSink};

/// Ordered fan-out of tuples to tuple sinks.
///
/// Follows the same attach mode as [`ObjectSource`](super::ObjectSource):
/// between adding a sink and [`rule_attached`](Self::rule_attached), only the
/// sinks added since the last completed attachment receive assertions.
pub struct TupleSource {
    id: NodeId,
    sinks: RwLock<SinkList<dyn TupleSink>>,
    attached: AtomicUsize,
}

impl TupleSource {
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

    fn read(&self) -> RwLockReadGuard<'_, SinkList<dyn TupleSink>> {
        self.sinks.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SinkList<dyn TupleSink>> {
        self.sinks.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_tuple_sink(&self, sink: Arc<dyn TupleSink>) {
        self.write().push(sink);
    }

    #[must_use]
    pub fn tuple_sinks(&self) -> Vec<Arc<dyn TupleSink>> {
        self.read().all()
    }

    #[must_use]
    pub fn new_sinks(&self) -> Vec<Arc<dyn TupleSink>> {
        self.read().added()
    }

    #[must_use]
    pub fn sink_count(&self) -> usize {
        self.read().len()
    }

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

    pub fn propagate_assert_tuple(
        &self,
        tuple: &Tuple,
        context: &PropagationContext,
        memory: &WorkingMemory,
    ) -> ReteResult<()> {
        let sinks = {
            let list = self.read();
            if list.is_attaching() {
                list.added()
            } else {
                list.all()
            }
        };

        trace!(node = %self.id, key = %tuple.key(), sinks = sinks.len(), "propagate tuple");
        for sink in &sinks {
            sink.assert_tuple(tuple, context, memory)?;
        }
        Ok(())
    }

    pub fn propagate_retract_tuples(
        &self,
        key: &TupleKey,
        context: &PropagationContext,
        memory: &WorkingMemory,
    ) -> ReteResult<()> {
        let sinks = self.tuple_sinks();
        trace!(node = %self.id, %key, sinks = sinks.len(), "propagate tuple retract");
        for sink in &sinks {
            sink.retract_tuples(key, context, memory)?;
        }
        Ok(())
    }
}
