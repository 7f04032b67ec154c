//! Property store
//!
//! Records live in a flat table indexed by `entity * kinds + kind`; dependency
//! edges are pairs of such indices. Each record has its own lock, so readers of
//! different records never contend, and all writes go through the scheduler,
//! which holds the session lock while it drives a fixpoint.

mod record;
mod snapshot;

pub use record::{Resolution, Status};
pub use snapshot::{SealedSnapshot, SessionStats, SnapshotEntry};

pub(crate) use record::{Edges, Slot};

use crate::config::EngineConfig;
use crate::entity::{EntityRef, EntityUniverse};
use crate::error::{FpcfError, Result};
use crate::kinds::{PropertyKindId, PropertyKinds};
use crate::lattice::{Lattice, PropertyValue};
use crate::profile::ConfigurationProfile;
use crate::scheduler::{AbortHandle, Scheduler, SchedulerState};
use crate::task::{Observation, PropertyKey};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, info_span};

/// Session-scoped store of property values
///
/// Several stores can coexist in one process; nothing is global.
pub struct PropertyStore {
    universe: Arc<EntityUniverse>,
    kinds: Arc<PropertyKinds>,
    profile: ConfigurationProfile,
    config: EngineConfig,
    keys: Vec<PropertyKey>,
    slots: Vec<Slot>,
    scheduler: Mutex<SchedulerState>,
    abort: AbortHandle,
    pool: Option<rayon::ThreadPool>,
}

impl PropertyStore {
    pub fn new(
        universe: impl Into<Arc<EntityUniverse>>,
        kinds: impl Into<Arc<PropertyKinds>>,
        profile: ConfigurationProfile,
        config: EngineConfig,
    ) -> Result<Self> {
        let universe = universe.into();
        let kinds = kinds.into();
        if profile.kind_count() != kinds.len() {
            return Err(FpcfError::Config(format!(
                "profile was resolved for {} kinds, store has {}",
                profile.kind_count(),
                kinds.len()
            )));
        }
        let record_count = universe.len() * kinds.len();
        if record_count > u32::MAX as usize {
            return Err(FpcfError::Config(format!(
                "{record_count} records exceed the store capacity"
            )));
        }

        let mut keys = Vec::with_capacity(record_count);
        let mut slots = Vec::with_capacity(record_count);
        for entity in universe.iter() {
            for kind in kinds.ids() {
                keys.push(PropertyKey::new(entity, kind));
                slots.push(Slot::new(kinds.lattice(kind)?.bottom()));
            }
        }

        let pool = match config.worker_threads {
            1 => None,
            threads => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("fpcf-worker-{i}"))
                    .build()
                    .map_err(|e| FpcfError::Config(e.to_string()))?,
            ),
        };

        Ok(Self {
            universe,
            kinds,
            profile,
            config,
            keys,
            slots,
            scheduler: Mutex::new(SchedulerState::default()),
            abort: AbortHandle::default(),
            pool,
        })
    }

    pub fn universe(&self) -> &EntityUniverse {
        &self.universe
    }

    pub fn kinds(&self) -> &PropertyKinds {
        &self.kinds
    }

    pub fn profile(&self) -> &ConfigurationProfile {
        &self.profile
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn stats(&self) -> SessionStats {
        self.scheduler.lock().stats
    }

    /// Key for an entity and kind given by name
    pub fn key(&self, entity: &str, kind: &str) -> Result<PropertyKey> {
        Ok(PropertyKey::new(
            self.universe.resolve(entity)?,
            self.kinds.resolve(kind)?,
        ))
    }

    /// Non-blocking read of current knowledge
    ///
    /// Unrequested records report the lattice bottom.
    pub fn get(&self, entity: EntityRef, kind: PropertyKindId) -> Result<Observation> {
        Ok(self.observe(self.index(entity, kind)?))
    }

    /// Ensure the record is scheduled; idempotent
    ///
    /// The computation itself runs on the next `await_fixpoint`.
    pub fn request(&self, entity: EntityRef, kind: PropertyKindId) -> Result<()> {
        let index = self.index(entity, kind)?;
        let mut state = self.scheduler.lock();
        Self::check_poisoned(&state)?;
        Scheduler::new(self, &mut state).request(index)
    }

    /// Drive the session until everything reachable from `roots` is final
    ///
    /// Configuration and consistency errors leave the session unusable;
    /// an abort leaves it resumable by calling this again.
    pub fn await_fixpoint(&self, roots: &[PropertyKey]) -> Result<SealedSnapshot> {
        let span = info_span!("await_fixpoint", roots = roots.len());
        let _enter = span.enter();

        let roots = roots
            .iter()
            .map(|key| self.index(key.entity, key.kind))
            .collect::<Result<Vec<_>>>()?;

        let mut state = self.scheduler.lock();
        Self::check_poisoned(&state)?;
        let outcome = Scheduler::new(self, &mut state).run(&roots);
        if let Err(err) = &outcome {
            if err.is_fatal() {
                state.poisoned = Some(err.to_string());
            }
        }
        outcome?;

        let stats = state.stats;
        debug_assert!(!state.has_work());
        drop(state);

        info!(
            rounds = stats.rounds,
            tasks = stats.tasks_started,
            cycles = stats.cycles_resolved,
            failures = stats.failures,
            "fixpoint reached"
        );
        Ok(self.snapshot(stats))
    }

    /// Every value a record has held, oldest first; empty unless history is on
    pub fn history(&self, entity: EntityRef, kind: PropertyKindId) -> Result<Vec<PropertyValue>> {
        let index = self.index(entity, kind)?;
        Ok(self.slot(index).record.read().history.clone())
    }

    fn check_poisoned(state: &SchedulerState) -> Result<()> {
        match &state.poisoned {
            Some(cause) => Err(FpcfError::Poisoned(cause.clone())),
            None => Ok(()),
        }
    }

    fn snapshot(&self, stats: SessionStats) -> SealedSnapshot {
        let mut entries = IndexMap::new();
        for (key, slot) in self.keys.iter().zip(&self.slots) {
            let record = slot.record.read();
            let Some(resolution) = record.resolution.clone() else {
                continue;
            };
            entries.insert(
                *key,
                SnapshotEntry {
                    entity: self.universe.name(key.entity).to_string(),
                    kind: self.kinds.name(key.kind).to_string(),
                    value: record.value.clone(),
                    resolution,
                    history: record.history.clone(),
                },
            );
        }
        SealedSnapshot::new(self.universe.clone(), self.kinds.clone(), entries, stats)
    }

    pub(crate) fn index(&self, entity: EntityRef, kind: PropertyKindId) -> Result<u32> {
        if !self.universe.contains(entity) {
            return Err(FpcfError::UnknownEntity(entity.to_string()));
        }
        if kind.index() >= self.kinds.len() {
            return Err(FpcfError::UnknownKindId(kind));
        }
        Ok((entity.index() * self.kinds.len() + kind.index()) as u32)
    }

    pub(crate) fn key_of(&self, index: u32) -> PropertyKey {
        self.keys[index as usize]
    }

    pub(crate) fn slot(&self, index: u32) -> &Slot {
        &self.slots[index as usize]
    }

    pub(crate) fn lattice(&self, kind: PropertyKindId) -> Result<&Arc<dyn Lattice>> {
        self.kinds.lattice(kind)
    }

    pub(crate) fn pool(&self) -> Option<&rayon::ThreadPool> {
        self.pool.as_ref()
    }

    pub(crate) fn observe(&self, index: u32) -> Observation {
        let record = self.slot(index).record.read();
        Observation {
            key: self.key_of(index),
            value: record.value.clone(),
            status: record.status,
            version: record.version,
        }
    }
}

impl std::fmt::Debug for PropertyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyStore")
            .field("entities", &self.universe.len())
            .field("kinds", &self.kinds.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
