//! Per-node memory containers.
//!
//! Working memories store one slot per node id. Each slot is typed by the kind
//! of node that owns it.

use std::collections::HashSet;

use crate::fact::FactHandle;
use crate::network::NodeId;
use crate::tuple::TupleKey;

/// Memory owned by one node inside one working memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeMemory {
    /// Handles remembered by an alpha node.
    Facts(HashSet<FactHandle>),
    /// Tuple keys remembered by a test node.
    Tuples(HashSet<TupleKey>),
}

impl NodeMemory {
    #[must_use]
    pub fn facts() -> Self {
        Self::Facts(HashSet::new())
    }

    #[must_use]
    pub fn tuples() -> Self {
        Self::Tuples(HashSet::new())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Facts(set) => set.len(),
            Self::Tuples(set) => set.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn contains_fact(&self, handle: FactHandle) -> bool {
        matches!(self, Self::Facts(set) if set.contains(&handle))
    }

    #[must_use]
    pub fn contains_tuple(&self, key: &TupleKey) -> bool {
        matches!(self, Self::Tuples(set) if set.contains(key))
    }

    /// Remembered fact handles in handle order; empty for tuple memories.
    #[must_use]
    pub fn fact_handles(&self) -> Vec<FactHandle> {
        match self {
            Self::Facts(set) => {
                let mut handles: Vec<_> = set.iter().copied().collect();
                handles.sort_unstable();
                handles
            }
            Self::Tuples(_) => Vec::new(),
        }
    }

    /// Remembered tuple keys; empty for fact memories.
    #[must_use]
    pub fn tuple_keys(&self) -> Vec<TupleKey> {
        match self {
            Self::Tuples(set) => set.iter().cloned().collect(),
            Self::Facts(_) => Vec::new(),
        }
    }
}

/// A node that owns a memory slot.
pub trait MemoryNode {
    /// Slot index.
    fn id(&self) -> NodeId;

    /// An empty memory of the right kind, used on first access.
    fn create_memory(&self) -> NodeMemory;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fact_memory() {
        let mut memory = NodeMemory::facts();
        assert!(memory.is_empty());
        if let NodeMemory::Facts(set) = &mut memory {
            set.insert(FactHandle::new(3));
            set.insert(FactHandle::new(1));
        }
        assert_eq!(memory.len(), 2);
        assert!(memory.contains_fact(FactHandle::new(1)));
        assert!(!memory.contains_tuple(&TupleKey::new(0, FactHandle::new(1))));
        assert_eq!(memory.fact_handles(), vec![FactHandle::new(1), FactHandle::new(3)]);
    }

    #[test]
    fn test_tuple_memory() {
        let mut memory = NodeMemory::tuples();
        let key = TupleKey::new(0, FactHandle::new(1));
        if let NodeMemory::Tuples(set) = &mut memory {
            set.insert(key.clone());
        }
        assert!(memory.contains_tuple(&key));
        assert!(memory.fact_handles().is_empty());
        assert_eq!(memory.tuple_keys(), vec![key]);
    }
}
