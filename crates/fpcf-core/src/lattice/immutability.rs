//! Object/class immutability lattice
//!
//! `DeepImmutable ≤ DependentImmutable(F) ≤ ShallowImmutable ≤ Mutable`
//!
//! A dependent value carries a formula over generic type parameters: the
//! object is deeply immutable exactly when every parameter in the formula is
//! instantiated with a deeply immutable type. Joining two dependent values
//! conjoins their formulas.

use super::{Lattice, PropertyValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Conjunction of "type parameter is immutable" conditions
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeParamFormula(BTreeSet<String>);

impl TypeParamFormula {
    pub fn new<I, S>(params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(params.into_iter().map(Into::into).collect())
    }

    pub fn single(param: impl Into<String>) -> Self {
        Self::new([param])
    }

    pub fn params(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Conjunction of both formulas
    pub fn and(&self, other: &TypeParamFormula) -> TypeParamFormula {
        Self(self.0.union(&other.0).cloned().collect())
    }

    /// Every condition of `self` is also required by `other`
    pub fn is_weaker_than(&self, other: &TypeParamFormula) -> bool {
        self.0.is_subset(&other.0)
    }
}

impl fmt::Display for TypeParamFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<&str> = self.params().collect();
        write!(f, "{}", params.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Immutability {
    DeepImmutable,
    DependentImmutable(TypeParamFormula),
    ShallowImmutable,
    Mutable,
}

impl Immutability {
    /// Dependent value, normalized to `DeepImmutable` for an empty formula
    pub fn dependent(formula: TypeParamFormula) -> Self {
        if formula.is_empty() {
            Immutability::DeepImmutable
        } else {
            Immutability::DependentImmutable(formula)
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Immutability::DeepImmutable => 0,
            Immutability::DependentImmutable(_) => 1,
            Immutability::ShallowImmutable => 2,
            Immutability::Mutable => 3,
        }
    }

    pub fn leq(&self, other: &Immutability) -> bool {
        match (self, other) {
            (Immutability::DependentImmutable(f), Immutability::DependentImmutable(g)) => {
                f.is_weaker_than(g)
            }
            _ => self.rank() <= other.rank(),
        }
    }

    pub fn join(&self, other: &Immutability) -> Immutability {
        match (self, other) {
            (Immutability::DependentImmutable(f), Immutability::DependentImmutable(g)) => {
                Immutability::dependent(f.and(g))
            }
            _ if self.rank() >= other.rank() => self.clone(),
            _ => other.clone(),
        }
    }

    /// Resolve a dependent value against concrete type-argument immutability
    ///
    /// A parameter bound to a mutable type makes the holder shallowly
    /// immutable at best; non-dependent values are returned unchanged.
    pub fn instantiate(&self, resolve: impl Fn(&str) -> Option<Immutability>) -> Immutability {
        let Immutability::DependentImmutable(formula) = self else {
            return self.clone();
        };
        formula
            .params()
            .map(|param| match resolve(param) {
                Some(Immutability::Mutable) => Immutability::ShallowImmutable,
                Some(resolved) => resolved,
                None => Immutability::DependentImmutable(TypeParamFormula::single(param)),
            })
            .fold(Immutability::DeepImmutable, |acc, next| acc.join(&next))
    }

    /// Collapse dependent formulas for analyses that cannot track generics
    pub fn without_generics(&self) -> Immutability {
        match self {
            Immutability::DependentImmutable(_) => Immutability::ShallowImmutable,
            other => other.clone(),
        }
    }
}

impl fmt::Display for Immutability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Immutability::DeepImmutable => write!(f, "DeepImmutable"),
            Immutability::DependentImmutable(formula) => write!(f, "DependentImmutable({formula})"),
            Immutability::ShallowImmutable => write!(f, "ShallowImmutable"),
            Immutability::Mutable => write!(f, "Mutable"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImmutabilityLattice;

impl ImmutabilityLattice {
    fn unwrap(value: &PropertyValue) -> Immutability {
        value
            .as_immutability()
            .cloned()
            .unwrap_or(Immutability::Mutable)
    }
}

impl Lattice for ImmutabilityLattice {
    fn name(&self) -> &'static str {
        "Immutability"
    }

    fn accepts(&self, value: &PropertyValue) -> bool {
        match value {
            PropertyValue::Immutability(Immutability::DependentImmutable(f)) => !f.is_empty(),
            PropertyValue::Immutability(_) => true,
            _ => false,
        }
    }

    fn leq(&self, a: &PropertyValue, b: &PropertyValue) -> bool {
        Self::unwrap(a).leq(&Self::unwrap(b))
    }

    fn join(&self, a: &PropertyValue, b: &PropertyValue) -> PropertyValue {
        Self::unwrap(a).join(&Self::unwrap(b)).into()
    }

    fn bottom(&self) -> PropertyValue {
        Immutability::DeepImmutable.into()
    }

    fn fallback(&self) -> PropertyValue {
        Immutability::Mutable.into()
    }
}
