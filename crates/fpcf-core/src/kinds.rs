//! Property kinds and their lattices

use crate::error::{FpcfError, Result};
use crate::lattice::Lattice;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identifies a category of fact; dense index into [`PropertyKinds`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropertyKindId(u16);

impl PropertyKindId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PropertyKindId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "kind#{}", self.0)
    }
}

/// Registry binding every property kind to exactly one lattice
#[derive(Debug, Clone, Default)]
pub struct PropertyKinds {
    kinds: IndexMap<String, Arc<dyn Lattice>>,
}

impl PropertyKinds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        lattice: impl Lattice + 'static,
    ) -> Result<PropertyKindId> {
        self.register_shared(name, Arc::new(lattice))
    }

    pub fn register_shared(
        &mut self,
        name: impl Into<String>,
        lattice: Arc<dyn Lattice>,
    ) -> Result<PropertyKindId> {
        let name = name.into();
        if self.kinds.contains_key(&name) {
            return Err(FpcfError::DuplicateKind(name));
        }
        if self.kinds.len() >= u16::MAX as usize {
            return Err(FpcfError::Config("too many property kinds".to_string()));
        }
        let (index, _) = self.kinds.insert_full(name, lattice);
        Ok(PropertyKindId(index as u16))
    }

    pub fn lookup(&self, name: &str) -> Option<PropertyKindId> {
        self.kinds
            .get_index_of(name)
            .map(|index| PropertyKindId(index as u16))
    }

    pub fn resolve(&self, name: &str) -> Result<PropertyKindId> {
        self.lookup(name)
            .ok_or_else(|| FpcfError::UnknownKind(name.to_string()))
    }

    pub fn lattice(&self, kind: PropertyKindId) -> Result<&Arc<dyn Lattice>> {
        self.kinds
            .get_index(kind.index())
            .map(|(_, lattice)| lattice)
            .ok_or(FpcfError::UnknownKindId(kind))
    }

    pub fn name(&self, kind: PropertyKindId) -> &str {
        self.kinds
            .get_index(kind.index())
            .map(|(name, _)| name.as_str())
            .unwrap_or("<unknown>")
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = PropertyKindId> {
        (0..self.kinds.len()).map(|index| PropertyKindId(index as u16))
    }
}
