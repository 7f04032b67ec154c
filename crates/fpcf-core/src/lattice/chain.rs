//! Finite linear lattice `Level(0) ≤ Level(1) ≤ … ≤ Level(height)`
//!
//! Useful for client-defined ordinal properties (purity grades, escape
//! levels) that do not warrant a dedicated value type.

use super::{Lattice, PropertyValue};

#[derive(Debug, Clone, Copy)]
pub struct ChainLattice {
    height: u32,
}

impl ChainLattice {
    pub fn new(height: u32) -> Self {
        Self {
            height: height.max(1),
        }
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Clamp a raw level into the chain
    pub fn level(&self, level: u32) -> PropertyValue {
        PropertyValue::Level(level.min(self.height))
    }

    fn unwrap(&self, value: &PropertyValue) -> u32 {
        value.as_level().unwrap_or(self.height).min(self.height)
    }
}

impl Lattice for ChainLattice {
    fn name(&self) -> &'static str {
        "Chain"
    }

    fn accepts(&self, value: &PropertyValue) -> bool {
        matches!(value, PropertyValue::Level(l) if *l <= self.height)
    }

    fn leq(&self, a: &PropertyValue, b: &PropertyValue) -> bool {
        self.unwrap(a) <= self.unwrap(b)
    }

    fn join(&self, a: &PropertyValue, b: &PropertyValue) -> PropertyValue {
        PropertyValue::Level(self.unwrap(a).max(self.unwrap(b)))
    }

    fn bottom(&self) -> PropertyValue {
        PropertyValue::Level(0)
    }

    fn fallback(&self) -> PropertyValue {
        PropertyValue::Level(self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_is_clamped() {
        let chain = ChainLattice::new(3);
        assert_eq!(chain.level(10), PropertyValue::Level(3));
        assert!(!chain.accepts(&PropertyValue::Level(4)));
    }

    #[test]
    fn test_zero_height_becomes_two_point_chain() {
        let chain = ChainLattice::new(0);
        assert_eq!(chain.height(), 1);
        assert_ne!(chain.bottom(), chain.fallback());
    }
}
