//! Shared fixtures for unit tests.

use std::sync::Arc;

use crate::network::Rete;
use crate::scheduler::{Scheduler, SchedulerConfig};
use crate::working_memory::{WorkingMemory, WorkingMemoryConfig};

pub(crate) fn test_scheduler() -> Arc<Scheduler> {
    Arc::new(Scheduler::new(SchedulerConfig::default()).unwrap())
}

/// A working memory over an empty network.
pub(crate) fn test_memory() -> Arc<WorkingMemory> {
    test_memory_with(Arc::new(Rete::new()))
}

pub(crate) fn test_memory_with(rete: Arc<Rete>) -> Arc<WorkingMemory> {
    WorkingMemory::new(rete, test_scheduler(), WorkingMemoryConfig::default())
}

pub(crate) fn test_memory_with_scheduler(scheduler: Arc<Scheduler>) -> Arc<WorkingMemory> {
    WorkingMemory::new(Arc::new(Rete::new()), scheduler, WorkingMemoryConfig::default())
}
