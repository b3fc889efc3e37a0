//! Tuples: partial matches flowing through the tuple side of the network.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::fact::FactHandle;

/// Address of a tuple: the bindings of column index to fact handle.
///
/// A key addresses every tuple whose bindings include all of its own, so a
/// single-column key retracts every tuple built on top of that fact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TupleKey(BTreeMap<usize, FactHandle>);

impl TupleKey {
    /// A key binding a single column.
    #[must_use]
    pub fn new(column: usize, handle: FactHandle) -> Self {
        let mut bindings = BTreeMap::new();
        bindings.insert(column, handle);
        Self(bindings)
    }

    /// Returns the handle bound at `column`.
    #[must_use]
    pub fn get(&self, column: usize) -> Option<FactHandle> {
        self.0.get(&column).copied()
    }

    /// Returns true if every binding of `other` is also bound here.
    #[must_use]
    pub fn contains_key(&self, other: &TupleKey) -> bool {
        other.0.iter().all(|(col, h)| self.0.get(col) == Some(h))
    }

    /// Returns true if `handle` is bound at any column.
    #[must_use]
    pub fn contains_handle(&self, handle: FactHandle) -> bool {
        self.0.values().any(|h| *h == handle)
    }

    /// Number of bound columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no column is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates `(column, handle)` bindings in column order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, FactHandle)> + '_ {
        self.0.iter().map(|(c, h)| (*c, *h))
    }
}

impl fmt::Display for TupleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, (col, handle)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{col}={handle}")?;
        }
        write!(f, "]")
    }
}

/// An ordered partial match across facts. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tuple {
    key: TupleKey,
}

impl Tuple {
    /// A tuple binding one fact at `column`.
    #[must_use]
    pub fn new(column: usize, handle: FactHandle) -> Self {
        Self {
            key: TupleKey::new(column, handle),
        }
    }

    /// Rebuilds the tuple addressed by a full key.
    #[must_use]
    pub fn from_key(key: TupleKey) -> Self {
        Self { key }
    }

    /// Returns a new tuple with `handle` additionally bound at `column`.
    #[must_use]
    pub fn with(&self, column: usize, handle: FactHandle) -> Self {
        let mut key = self.key.clone();
        key.0.insert(column, handle);
        Self { key }
    }

    #[must_use]
    pub const fn key(&self) -> &TupleKey {
        &self.key
    }

    /// Returns the handle bound at `column`.
    #[must_use]
    pub fn get(&self, column: usize) -> Option<FactHandle> {
        self.key.get(column)
    }

    /// Handles in column order.
    #[must_use]
    pub fn handles(&self) -> Vec<FactHandle> {
        self.key.0.values().copied().collect()
    }

    /// Returns true if this tuple is addressed by `key`.
    #[must_use]
    pub fn matches_key(&self, key: &TupleKey) -> bool {
        self.key.contains_key(key)
    }
}
