//! Fact identity.
//!
//! A `FactHandle` is the identity of one asserted fact inside a working memory.
//! Two handles are equal iff they name the same assertion; fact values are never
//! compared to decide identity.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Identity token for a fact instance.
///
/// # Examples
///
/// ```
/// use kyrorete::FactHandle;
///
/// let handle = FactHandle::new(2);
/// assert_eq!(handle.id(), 2);
/// assert_eq!(handle, FactHandle::new(2));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactHandle(u64);

impl FactHandle {
    /// Wraps a raw handle id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw handle id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for FactHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fact:{}", self.0)
    }
}

/// Allocates handles that are never reused for the lifetime of the factory.
#[derive(Debug, Default)]
pub struct FactHandleFactory {
    next: AtomicU64,
}

impl FactHandleFactory {
    /// Creates a factory whose first handle is `fact:0`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(0),
        }
    }

    /// Allocates the next handle.
    pub fn next_handle(&self) -> FactHandle {
        FactHandle(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_identity() {
        assert_eq!(FactHandle::new(1), FactHandle::new(1));
        assert_ne!(FactHandle::new(1), FactHandle::new(2));
        assert_eq!(format!("{}", FactHandle::new(9)), "fact:9");
    }

    #[test]
    fn test_factory_never_reuses() {
        let factory = FactHandleFactory::new();
        let a = factory.next_handle();
        let b = factory.next_handle();
        let c = factory.next_handle();
        assert_eq!(a.id(), 0);
        assert_eq!(b.id(), 1);
        assert_eq!(c.id(), 2);
    }

    #[test]
    fn test_handle_serialization() {
        let json = serde_json::to_string(&FactHandle::new(42)).unwrap();
        assert_eq!(json, "42");
    }
}
