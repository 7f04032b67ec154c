//! Entity universe: stable identities for classes, fields and methods
//!
//! The universe is populated once, before a session starts. Entity ids are
//! dense indices, which lets the store lay out its records as a flat table.

use crate::error::{FpcfError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of program element an entity stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Class,
    Field,
    Method,
    Other,
}

/// Opaque, stable reference to an entity of the universe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    id: u32,
    kind: EntityKind,
}

impl EntityRef {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub(crate) fn index(&self) -> usize {
        self.id as usize
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}#{}", self.kind, self.id)
    }
}

/// Closed set of analyzable entities, keyed by fully qualified name
#[derive(Debug, Clone, Default)]
pub struct EntityUniverse {
    entities: IndexMap<String, EntityKind>,
}

impl EntityUniverse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity; names must be unique
    pub fn add(&mut self, name: impl Into<String>, kind: EntityKind) -> Result<EntityRef> {
        let name = name.into();
        if self.entities.contains_key(&name) {
            return Err(FpcfError::DuplicateEntity(name));
        }
        let (index, _) = self.entities.insert_full(name, kind);
        Ok(EntityRef {
            id: index as u32,
            kind,
        })
    }

    /// Look up an entity by name
    pub fn lookup(&self, name: &str) -> Option<EntityRef> {
        self.entities.get_full(name).map(|(index, _, kind)| EntityRef {
            id: index as u32,
            kind: *kind,
        })
    }

    /// Like [`lookup`](Self::lookup), but unknown names are an error
    pub fn resolve(&self, name: &str) -> Result<EntityRef> {
        self.lookup(name)
            .ok_or_else(|| FpcfError::UnknownEntity(name.to_string()))
    }

    pub fn name(&self, entity: EntityRef) -> &str {
        self.entities
            .get_index(entity.index())
            .map(|(name, _)| name.as_str())
            .unwrap_or("<unknown>")
    }

    pub fn contains(&self, entity: EntityRef) -> bool {
        self.entities
            .get_index(entity.index())
            .is_some_and(|(_, kind)| *kind == entity.kind)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// All entities in insertion order
    pub fn iter(&self) -> impl Iterator<Item = EntityRef> + '_ {
        self.entities
            .values()
            .enumerate()
            .map(|(index, kind)| EntityRef {
                id: index as u32,
                kind: *kind,
            })
    }

    /// All entities of the given element kind
    pub fn of_kind(&self, kind: EntityKind) -> impl Iterator<Item = EntityRef> + '_ {
        self.iter().filter(move |entity| entity.kind == kind)
    }
}
