//! Property lattices
//!
//! Every property kind is backed by exactly one lattice. All lattices share a
//! single orientation:
//! - Bottom (⊥) = most optimistic, the seed of a freshly requested record
//! - Fallback (⊤) = most pessimistic, used for failures and cycle breaking
//! - `join` moves toward pessimism, and stored values only ever move up
//!
//! Values of every lattice travel through the store as [`PropertyValue`];
//! a lattice only accepts the variant it owns.

mod chain;
mod immutability;
mod mutability;
mod strings;

pub use chain::ChainLattice;
pub use immutability::{Immutability, ImmutabilityLattice, TypeParamFormula};
pub use mutability::{ReferenceMutability, ReferenceMutabilityLattice};
pub use strings::{StringConstancy, StringConstancyLattice, StringLevel, StringTree};

use serde::{Deserialize, Serialize};
use std::fmt;

/// How missing information is approximated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SoundnessMode {
    /// Favor precision; may under-approximate
    Low,
    /// Favor safety; always over-approximate conservatively
    #[default]
    High,
}

/// A value of one of the built-in lattices
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyValue {
    Mutability(ReferenceMutability),
    Immutability(Immutability),
    Strings(StringConstancy),
    Level(u32),
}

impl PropertyValue {
    pub fn as_mutability(&self) -> Option<ReferenceMutability> {
        match self {
            PropertyValue::Mutability(m) => Some(*m),
            _ => None,
        }
    }

    pub fn as_immutability(&self) -> Option<&Immutability> {
        match self {
            PropertyValue::Immutability(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_strings(&self) -> Option<&StringConstancy> {
        match self {
            PropertyValue::Strings(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_level(&self) -> Option<u32> {
        match self {
            PropertyValue::Level(l) => Some(*l),
            _ => None,
        }
    }
}

impl From<ReferenceMutability> for PropertyValue {
    fn from(value: ReferenceMutability) -> Self {
        PropertyValue::Mutability(value)
    }
}

impl From<Immutability> for PropertyValue {
    fn from(value: Immutability) -> Self {
        PropertyValue::Immutability(value)
    }
}

impl From<StringConstancy> for PropertyValue {
    fn from(value: StringConstancy) -> Self {
        PropertyValue::Strings(value)
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Mutability(m) => write!(f, "{m:?}"),
            PropertyValue::Immutability(i) => write!(f, "{i}"),
            PropertyValue::Strings(s) => write!(f, "{s}"),
            PropertyValue::Level(l) => write!(f, "Level({l})"),
        }
    }
}

/// Contract every property lattice fulfils
///
/// Implementations may assume that the arguments of `leq` and `join` were
/// checked with [`accepts`](Lattice::accepts); the store never hands a
/// foreign value to a lattice.
pub trait Lattice: Send + Sync + fmt::Debug {
    /// Human-readable lattice name, used in diagnostics
    fn name(&self) -> &'static str;

    /// Whether the value belongs to this lattice
    fn accepts(&self, value: &PropertyValue) -> bool;

    /// Partial order: `a` is at least as precise as `b`
    fn leq(&self, a: &PropertyValue, b: &PropertyValue) -> bool;

    /// Least upper bound
    fn join(&self, a: &PropertyValue, b: &PropertyValue) -> PropertyValue;

    /// Most optimistic value
    fn bottom(&self) -> PropertyValue;

    /// Most pessimistic value
    fn fallback(&self) -> PropertyValue;

    /// A value that can never be refined further
    fn is_final(&self, value: &PropertyValue) -> bool {
        *value == self.fallback()
    }

    /// Value joined into every member of a closed dependency cycle
    fn cycle_fallback(&self, mode: SoundnessMode) -> PropertyValue {
        match mode {
            SoundnessMode::High => self.fallback(),
            SoundnessMode::Low => self.bottom(),
        }
    }

    /// Normalize a value before it is stored; used to bound lattice height
    fn widen(&self, value: PropertyValue) -> PropertyValue {
        value
    }

    /// Strictly below in the order
    fn lt(&self, a: &PropertyValue, b: &PropertyValue) -> bool {
        a != b && self.leq(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_lattices() -> Vec<Box<dyn Lattice>> {
        vec![
            Box::new(ReferenceMutabilityLattice),
            Box::new(ImmutabilityLattice),
            Box::new(StringConstancyLattice::default()),
            Box::new(ChainLattice::new(4)),
        ]
    }

    #[test]
    fn test_bottom_below_fallback() {
        for lattice in all_lattices() {
            let bottom = lattice.bottom();
            let top = lattice.fallback();
            assert!(lattice.leq(&bottom, &top), "{}", lattice.name());
            assert!(lattice.lt(&bottom, &top), "{}", lattice.name());
            assert!(lattice.is_final(&top), "{}", lattice.name());
            assert!(!lattice.is_final(&bottom), "{}", lattice.name());
        }
    }

    #[test]
    fn test_join_with_bottom_is_identity() {
        for lattice in all_lattices() {
            let top = lattice.fallback();
            assert_eq!(lattice.join(&lattice.bottom(), &top), top);
            assert_eq!(lattice.join(&top, &lattice.bottom()), top);
        }
    }

    #[test]
    fn test_cycle_fallback_depends_on_soundness() {
        for lattice in all_lattices() {
            assert_eq!(lattice.cycle_fallback(SoundnessMode::High), lattice.fallback());
            assert_eq!(lattice.cycle_fallback(SoundnessMode::Low), lattice.bottom());
        }
    }

    #[test]
    fn test_accepts_only_own_variant() {
        let mutability = ReferenceMutabilityLattice;
        assert!(mutability.accepts(&ReferenceMutability::Mutable.into()));
        assert!(!mutability.accepts(&PropertyValue::Level(0)));
    }
}
