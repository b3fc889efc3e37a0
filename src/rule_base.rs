//! Rule base: the shared network, its rules, and the working memories built on it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use tracing::{debug, info};

use crate::context::{PropagationContext, PropagationKind};
use crate::error::{lock_err, ReteError, ReteResult};
use crate::network::{NodeId, ObjectSourceNode, Rete, TupleSourceNode};
use crate::rule::Rule;
use crate::scheduler::{Scheduler, SchedulerConfig};
use crate::working_memory::{WorkingMemory, WorkingMemoryConfig};

#[allow(missing_docs)]
#[derive(Debug, Clone, Default)]
pub struct RuleBaseConfig {
    /// Used when the rule base builds its own scheduler.
    pub scheduler: SchedulerConfig,
    /// Applied to every working memory created by the rule base.
    pub working_memory: WorkingMemoryConfig,
}

/// Owns the network root and tracks the working memories that share it.
///
/// Nodes are built and attached by the caller. Once a rule's nodes are
/// attached, [`complete_attachment`](Self::complete_attachment) brings existing
/// working memories up to date and takes the touched sources out of attach mode.
pub struct RuleBase {
    rete: Arc<Rete>,
    scheduler: Arc<Scheduler>,
    config: RuleBaseConfig,
    rules: RwLock<Vec<Arc<Rule>>>,
    next_node_id: AtomicUsize,
    memories: Mutex<Vec<Weak<WorkingMemory>>>,
}

impl RuleBase {
    /// Creates a rule base with its own scheduler.
    pub fn new(config: RuleBaseConfig) -> ReteResult<Self> {
        let scheduler = Arc::new(Scheduler::new(config.scheduler.clone())?);
        Ok(Self::with_scheduler(scheduler, config))
    }

    /// Creates a rule base sharing an existing scheduler.
    #[must_use]
    pub fn with_scheduler(scheduler: Arc<Scheduler>, config: RuleBaseConfig) -> Self {
        Self {
            rete: Arc::new(Rete::new()),
            scheduler,
            config,
            rules: RwLock::new(Vec::new()),
            next_node_id: AtomicUsize::new(NodeId::ROOT.index() + 1),
            memories: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn rete(&self) -> &Arc<Rete> {
        &self.rete
    }

    #[must_use]
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Allocates a node id. The root owns id 0.
    pub fn next_node_id(&self) -> NodeId {
        NodeId::new(self.next_node_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Registers `rule` and assigns its load order.
    pub fn add_rule(&self, rule: Rule) -> ReteResult<Arc<Rule>> {
        let mut rules = self.rules.write().map_err(|_| lock_err("rules"))?;
        if rules.iter().any(|r| r.name() == rule.name()) {
            return Err(ReteError::DuplicateRule {
                name: rule.name().to_string(),
            });
        }

        let load_order = rules.len() as u64;
        let rule = Arc::new(rule.with_load_order(load_order));
        rules.push(Arc::clone(&rule));
        debug!(rule = rule.name(), load_order, "rule added");
        Ok(rule)
    }

    /// Rules in load order.
    pub fn rules(&self) -> ReteResult<Vec<Arc<Rule>>> {
        Ok(self.rules.read().map_err(|_| lock_err("rules"))?.clone())
    }

    pub fn rule(&self, name: &str) -> ReteResult<Option<Arc<Rule>>> {
        Ok(self
            .rules
            .read()
            .map_err(|_| lock_err("rules"))?
            .iter()
            .find(|r| r.name() == name)
            .cloned())
    }

    pub fn new_working_memory(&self) -> ReteResult<Arc<WorkingMemory>> {
        let memory = WorkingMemory::new(
            Arc::clone(&self.rete),
            Arc::clone(&self.scheduler),
            self.config.working_memory.clone(),
        );
        let mut memories = self.memories.lock().map_err(|_| lock_err("working memories"))?;
        memories.retain(|m| m.strong_count() > 0);
        memories.push(Arc::downgrade(&memory));
        info!(live = memories.len(), "working memory created");
        Ok(memory)
    }

    /// Working memories created here that are still alive.
    pub fn working_memories(&self) -> ReteResult<Vec<Arc<WorkingMemory>>> {
        Ok(self
            .memories
            .lock()
            .map_err(|_| lock_err("working memories"))?
            .iter()
            .filter_map(Weak::upgrade)
            .collect())
    }

    /// Finishes attaching a rule's nodes.
    ///
    /// `object_sources` and `tuple_sources` are the pre-existing nodes the new
    /// paths were attached under. Each live working memory replays its state
    /// from them into the sinks added since their last attachment, which
    /// carries it down the new paths. Then every listed source and the root
    /// leave attach mode, together with every node below them.
    ///
    /// Nodes created for the new paths must not be listed; they are filled by
    /// the replay itself.
    pub fn complete_attachment(
        &self,
        object_sources: &[Arc<dyn ObjectSourceNode>],
        tuple_sources: &[Arc<dyn TupleSourceNode>],
    ) -> ReteResult<()> {
        let memories = self.working_memories()?;
        for memory in &memories {
            let context = PropagationContext::external(PropagationKind::Assertion);
            for node in object_sources {
                node.update_new_node(memory, &context)?;
            }
            for node in tuple_sources {
                node.update_new_node(memory, &context)?;
            }
        }

        for node in object_sources {
            node.object_source().rule_attached();
        }
        for node in tuple_sources {
            node.tuple_source().rule_attached();
        }
        self.rete.object_source().rule_attached();

        debug!(
            memories = memories.len(),
            object_sources = object_sources.len(),
            tuple_sources = tuple_sources.len(),
            "attachment complete"
        );
        Ok(())
    }
}
