//! Working memory: facts, per-node memory, and the agenda for one session.
//!
//! A working memory is always held in an `Arc` so its agenda can hand weak
//! references to the scheduler. Propagation runs on the caller's thread; none of
//! the internal locks are held while a downstream node runs.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, ThreadId};

use tracing::{debug, error};

use crate::agenda::{Activation, ActivationId, Agenda, ConflictResolver, LoadOrderConflictResolver};
use crate::context::{PropagationContext, PropagationKind};
use crate::error::{lock_err, ConsequenceError, ReteError, ReteResult};
use crate::fact::{FactHandle, FactHandleFactory};
use crate::memory::{MemoryNode, NodeMemory};
use crate::network::Rete;
use crate::rule::Rule;
use crate::scheduler::Scheduler;
use crate::value::Value;

/// Receives consequence failures raised on the scheduler thread.
pub trait AsyncExceptionHandler: Send + Sync {
    fn handle_exception(&self, memory: &WorkingMemory, error: &ConsequenceError);
}

impl<F> AsyncExceptionHandler for F
where
    F: Fn(&WorkingMemory, &ConsequenceError) + Send + Sync,
{
    fn handle_exception(&self, memory: &WorkingMemory, error: &ConsequenceError) {
        self(memory, error);
    }
}

#[allow(missing_docs)]
#[derive(Debug, Clone)]
pub struct WorkingMemoryConfig {
    /// Orders immediate activations.
    pub resolver: Arc<dyn ConflictResolver>,
}

impl Default for WorkingMemoryConfig {
    fn default() -> Self {
        Self {
            resolver: Arc::new(LoadOrderConflictResolver),
        }
    }
}

/// One session of facts matched against a shared network.
pub struct WorkingMemory {
    rete: Arc<Rete>,
    handles: FactHandleFactory,
    facts: Mutex<BTreeMap<FactHandle, Value>>,
    node_memories: Mutex<Vec<Option<NodeMemory>>>,
    agenda: Agenda,
    async_handler: RwLock<Option<Arc<dyn AsyncExceptionHandler>>>,
    firing: Mutex<HashMap<ThreadId, Vec<(Arc<Rule>, ActivationId)>>>,
}

/// Marks an activation as firing on the current thread until dropped.
pub(crate) struct FiringGuard<'a> {
    memory: &'a WorkingMemory,
}

impl Drop for FiringGuard<'_> {
    fn drop(&mut self) {
        let mut firing = self.memory.firing.lock().unwrap_or_else(PoisonError::into_inner);
        let thread = thread::current().id();
        if let Some(stack) = firing.get_mut(&thread) {
            stack.pop();
            if stack.is_empty() {
                firing.remove(&thread);
            }
        }
    }
}

impl WorkingMemory {
    #[must_use]
    pub fn new(
        rete: Arc<Rete>,
        scheduler: Arc<Scheduler>,
        config: WorkingMemoryConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            rete,
            handles: FactHandleFactory::new(),
            facts: Mutex::new(BTreeMap::new()),
            node_memories: Mutex::new(Vec::new()),
            agenda: Agenda::new(weak.clone(), scheduler, config.resolver),
            async_handler: RwLock::new(None),
            firing: Mutex::new(HashMap::new()),
        })
    }

    #[must_use]
    pub fn rete(&self) -> &Arc<Rete> {
        &self.rete
    }

    #[must_use]
    pub const fn agenda(&self) -> &Agenda {
        &self.agenda
    }

    /// Snapshot of `node`'s memory, created empty on first access.
    pub fn node_memory<N: MemoryNode + ?Sized>(&self, node: &N) -> ReteResult<NodeMemory> {
        self.with_node_memory(node, |memory| memory.clone())
    }

    /// Runs `f` on `node`'s memory under the arena lock.
    ///
    /// `f` must not call back into this working memory.
    pub fn with_node_memory<N, R>(
        &self,
        node: &N,
        f: impl FnOnce(&mut NodeMemory) -> R,
    ) -> ReteResult<R>
    where
        N: MemoryNode + ?Sized,
    {
        let index = node.id().index();
        let mut arena = self.node_memories.lock().map_err(|_| lock_err("node memory"))?;
        if arena.len() <= index {
            arena.resize_with(index + 1, || None);
        }
        let memory = arena[index].get_or_insert_with(|| node.create_memory());
        Ok(f(memory))
    }

    /// Records `activation` as firing on this thread. Changes made through
    /// the plain assert, retract and modify calls are attributed to it until
    /// the guard drops.
    pub(crate) fn enter_consequence(&self, activation: &Activation) -> ReteResult<FiringGuard<'_>> {
        self.firing
            .lock()
            .map_err(|_| lock_err("firing activations"))?
            .entry(thread::current().id())
            .or_default()
            .push((Arc::clone(activation.rule()), activation.id()));
        Ok(FiringGuard { memory: self })
    }

    /// A context for `kind`, originating from the activation firing on this
    /// thread, if any.
    pub fn current_context(&self, kind: PropagationKind) -> ReteResult<PropagationContext> {
        let firing = self.firing.lock().map_err(|_| lock_err("firing activations"))?;
        let origin = firing
            .get(&thread::current().id())
            .and_then(|stack| stack.last());
        Ok(match origin {
            Some((rule, id)) => PropagationContext::new(kind, Some(Arc::clone(rule)), Some(*id)),
            None => PropagationContext::external(kind),
        })
    }

    /// Asserts a fact. Inside a consequence the assertion originates from the
    /// firing activation.
    pub fn assert_object(&self, fact: impl Into<Value>) -> ReteResult<FactHandle> {
        let context = self.current_context(PropagationKind::Assertion)?;
        self.assert_object_with_context(fact, &context)
    }

    /// Stores `fact` under a fresh handle and propagates it from the root.
    ///
    /// The fact stays stored if a node rejects the assertion.
    pub fn assert_object_with_context(
        &self,
        fact: impl Into<Value>,
        context: &PropagationContext,
    ) -> ReteResult<FactHandle> {
        let fact = fact.into();
        let handle = self.handles.next_handle();
        self.facts
            .lock()
            .map_err(|_| lock_err("facts"))?
            .insert(handle, fact.clone());

        debug!(%handle, context = %context.id(), "assert");
        self.rete.assert_object(&fact, handle, context, self)?;
        Ok(handle)
    }

    pub fn retract_object(&self, handle: FactHandle) -> ReteResult<()> {
        let context = self.current_context(PropagationKind::Retraction)?;
        self.retract_object_with_context(handle, &context)
    }

    /// Propagates the retraction, then forgets the fact.
    pub fn retract_object_with_context(
        &self,
        handle: FactHandle,
        context: &PropagationContext,
    ) -> ReteResult<()> {
        if !self.contains_object(handle)? {
            return Err(ReteError::no_such_fact_handle(handle));
        }

        debug!(%handle, context = %context.id(), "retract");
        self.rete.retract_object(handle, context, self)?;
        self.facts.lock().map_err(|_| lock_err("facts"))?.remove(&handle);
        Ok(())
    }

    pub fn modify_object(&self, handle: FactHandle, fact: impl Into<Value>) -> ReteResult<()> {
        let context = self.current_context(PropagationKind::Modification)?;
        self.modify_object_with_context(handle, fact, &context)
    }

    /// Replaces the fact behind `handle`: a retraction followed by an assertion
    /// of the new value under the same handle.
    pub fn modify_object_with_context(
        &self,
        handle: FactHandle,
        fact: impl Into<Value>,
        context: &PropagationContext,
    ) -> ReteResult<()> {
        if !self.contains_object(handle)? {
            return Err(ReteError::no_such_fact_handle(handle));
        }

        let fact = fact.into();
        debug!(%handle, context = %context.id(), "modify");
        self.rete.retract_object(handle, context, self)?;
        self.facts
            .lock()
            .map_err(|_| lock_err("facts"))?
            .insert(handle, fact.clone());
        self.rete.assert_object(&fact, handle, context, self)
    }

    /// Stores `fact` under `handle` without propagating it.
    ///
    /// Handles chosen here are not reserved from the allocator.
    pub fn put_object(
        &self,
        handle: FactHandle,
        fact: impl Into<Value>,
    ) -> ReteResult<Option<Value>> {
        Ok(self
            .facts
            .lock()
            .map_err(|_| lock_err("facts"))?
            .insert(handle, fact.into()))
    }

    pub fn get_object(&self, handle: FactHandle) -> ReteResult<Option<Value>> {
        Ok(self
            .facts
            .lock()
            .map_err(|_| lock_err("facts"))?
            .get(&handle)
            .cloned())
    }

    pub fn contains_object(&self, handle: FactHandle) -> ReteResult<bool> {
        Ok(self
            .facts
            .lock()
            .map_err(|_| lock_err("facts"))?
            .contains_key(&handle))
    }

    /// Live handles in allocation order.
    pub fn fact_handles(&self) -> ReteResult<Vec<FactHandle>> {
        Ok(self
            .facts
            .lock()
            .map_err(|_| lock_err("facts"))?
            .keys()
            .copied()
            .collect())
    }

    pub fn fact_count(&self) -> ReteResult<usize> {
        Ok(self.facts.lock().map_err(|_| lock_err("facts"))?.len())
    }

    pub fn set_async_exception_handler(&self, handler: impl AsyncExceptionHandler + 'static) {
        *self
            .async_handler
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(handler));
    }

    pub fn clear_async_exception_handler(&self) {
        *self
            .async_handler
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Routes a scheduler-thread consequence failure to the registered handler,
    /// or logs it when there is none.
    pub fn handle_async_exception(&self, err: &ConsequenceError) {
        let handler = self
            .async_handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match handler {
            Some(handler) => handler.handle_exception(self, err),
            None => error!(rule = %err.rule, error = %err, "unhandled consequence failure"),
        }
    }

    /// Fires the next immediate activation. Returns false when the queue is empty.
    pub fn fire_next_item(&self) -> ReteResult<bool> {
        let Some(activation) = self.agenda.next_activation()? else {
            return Ok(false);
        };
        self.agenda.fire_activation(&activation, self)?;
        Ok(true)
    }

    /// Fires immediate activations until none remain, including those created
    /// by the consequences themselves. Returns how many fired.
    ///
    /// The first consequence error stops the loop.
    pub fn fire_all_rules(&self) -> ReteResult<usize> {
        let mut fired = 0;
        while self.fire_next_item()? {
            fired += 1;
        }
        Ok(fired)
    }
}

impl fmt::Debug for WorkingMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkingMemory")
            .field("facts", &self.fact_count().ok())
            .field("activations", &self.agenda.size().ok())
            .finish_non_exhaustive()
    }
}
