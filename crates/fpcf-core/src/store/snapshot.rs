//! Sealed, read-only view of a finished fixpoint

use super::record::Resolution;
use crate::entity::{EntityRef, EntityUniverse};
use crate::kinds::{PropertyKindId, PropertyKinds};
use crate::lattice::PropertyValue;
use crate::task::PropertyKey;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Counters of one session, cumulative across `await_fixpoint` calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub rounds: usize,
    pub tasks_started: usize,
    pub continuations_resumed: usize,
    pub updates_accepted: usize,
    pub cycles_resolved: usize,
    pub cycle_members: usize,
    pub failures: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub entity: String,
    pub kind: String,
    pub value: PropertyValue,
    pub resolution: Resolution,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<PropertyValue>,
}

/// Final values of every record the session computed
#[derive(Debug, Clone)]
pub struct SealedSnapshot {
    universe: Arc<EntityUniverse>,
    kinds: Arc<PropertyKinds>,
    entries: IndexMap<PropertyKey, SnapshotEntry>,
    stats: SessionStats,
}

#[derive(Serialize)]
struct SnapshotReport<'a> {
    stats: &'a SessionStats,
    properties: Vec<&'a SnapshotEntry>,
}

impl SealedSnapshot {
    pub(crate) fn new(
        universe: Arc<EntityUniverse>,
        kinds: Arc<PropertyKinds>,
        entries: IndexMap<PropertyKey, SnapshotEntry>,
        stats: SessionStats,
    ) -> Self {
        Self {
            universe,
            kinds,
            entries,
            stats,
        }
    }

    pub fn get(&self, entity: EntityRef, kind: PropertyKindId) -> Option<&PropertyValue> {
        self.entry(entity, kind).map(|entry| &entry.value)
    }

    pub fn entry(&self, entity: EntityRef, kind: PropertyKindId) -> Option<&SnapshotEntry> {
        self.entries.get(&PropertyKey::new(entity, kind))
    }

    /// Look up by entity and kind name
    pub fn get_named(&self, entity: &str, kind: &str) -> Option<&PropertyValue> {
        let entity = self.universe.lookup(entity)?;
        let kind = self.kinds.lookup(kind)?;
        self.get(entity, kind)
    }

    pub fn resolution(&self, entity: EntityRef, kind: PropertyKindId) -> Option<&Resolution> {
        self.entry(entity, kind).map(|entry| &entry.resolution)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&PropertyKey, &SnapshotEntry)> {
        self.entries.iter()
    }

    /// Records whose task failed, with the recorded cause
    pub fn failures(&self) -> impl Iterator<Item = (&SnapshotEntry, &str)> {
        self.entries.values().filter_map(|entry| match &entry.resolution {
            Resolution::Failed(reason) => Some((entry, reason.as_str())),
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn universe(&self) -> &EntityUniverse {
        &self.universe
    }

    pub fn kinds(&self) -> &PropertyKinds {
        &self.kinds
    }

    /// Final values keyed by key, comparable across sessions
    pub fn values(&self) -> Vec<(PropertyKey, PropertyValue)> {
        self.entries
            .iter()
            .map(|(key, entry)| (*key, entry.value.clone()))
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&SnapshotReport {
            stats: &self.stats,
            properties: self.entries.values().collect(),
        })
    }
}
