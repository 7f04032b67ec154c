//! Reference mutability lattice: `Immutable ≤ LazilyInitialized ≤ Mutable`

use super::{Lattice, PropertyValue};
use serde::{Deserialize, Serialize};

/// Whether a field reference can change after construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReferenceMutability {
    /// Declared or effectively final
    Immutable,
    /// Written once, lazily, behind a default-value guard
    LazilyInitialized,
    /// May be reassigned at any time
    Mutable,
}

impl ReferenceMutability {
    /// Whether the reference never changes once observed
    pub fn is_immutable_reference(&self) -> bool {
        !matches!(self, ReferenceMutability::Mutable)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceMutabilityLattice;

impl ReferenceMutabilityLattice {
    fn unwrap(value: &PropertyValue) -> ReferenceMutability {
        value.as_mutability().unwrap_or(ReferenceMutability::Mutable)
    }
}

impl Lattice for ReferenceMutabilityLattice {
    fn name(&self) -> &'static str {
        "ReferenceMutability"
    }

    fn accepts(&self, value: &PropertyValue) -> bool {
        matches!(value, PropertyValue::Mutability(_))
    }

    fn leq(&self, a: &PropertyValue, b: &PropertyValue) -> bool {
        Self::unwrap(a) <= Self::unwrap(b)
    }

    fn join(&self, a: &PropertyValue, b: &PropertyValue) -> PropertyValue {
        Self::unwrap(a).max(Self::unwrap(b)).into()
    }

    fn bottom(&self) -> PropertyValue {
        ReferenceMutability::Immutable.into()
    }

    fn fallback(&self) -> PropertyValue {
        ReferenceMutability::Mutable.into()
    }
}
