use std::cmp::Ordering;
use std::fmt::Debug;

use super::Activation;

/// Orders competing immediate activations.
///
/// `Ordering::Less` means `a` fires before `b`. Ties fire in insertion order.
pub trait ConflictResolver: Debug + Send + Sync {
    fn compare(&self, a: &Activation, b: &Activation) -> Ordering;
}

/// Rules loaded earlier fire first.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOrderConflictResolver;

impl ConflictResolver for LoadOrderConflictResolver {
    fn compare(&self, a: &Activation, b: &Activation) -> Ordering {
        a.rule().load_order().cmp(&b.rule().load_order())
    }
}
