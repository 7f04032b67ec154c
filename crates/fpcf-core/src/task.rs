//! Analysis task contract
//!
//! A task computes one property kind for one entity. It reads other
//! properties through its [`TaskContext`] and either completes with a final
//! value or suspends with an intermediate value, the dependencies it observed,
//! and a way to resume once any of them changes. Tasks never block waiting for
//! another computation; the scheduler resumes them.

use crate::entity::{EntityRef, EntityUniverse};
use crate::error::Result;
use crate::kinds::{PropertyKindId, PropertyKinds};
use crate::lattice::{Lattice, PropertyValue, SoundnessMode};
use crate::profile::PrecisionLevel;
use crate::store::{PropertyStore, Status};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// (entity, kind) pair addressing one store record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropertyKey {
    pub entity: EntityRef,
    pub kind: PropertyKindId,
}

impl PropertyKey {
    pub fn new(entity: EntityRef, kind: PropertyKindId) -> Self {
        Self { entity, kind }
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.entity, self.kind)
    }
}

/// What a reader saw of a record at one point in time
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub key: PropertyKey,
    pub value: PropertyValue,
    pub status: Status,
    pub version: u64,
}

impl Observation {
    pub fn is_final(&self) -> bool {
        self.status == Status::Final
    }
}

/// Continuation invoked with the observation that woke the task
pub type Continuation = Box<
    dyn FnOnce(&mut TaskContext<'_>, &Observation) -> Result<ComputationResult> + Send + 'static,
>;

/// How a suspended task is resumed
pub enum Resume {
    /// Run the task's `compute` again from scratch
    Rerun,
    /// Run a captured continuation
    With(Continuation),
}

impl fmt::Debug for Resume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resume::Rerun => write!(f, "Rerun"),
            Resume::With(_) => write!(f, "With(<continuation>)"),
        }
    }
}

/// Outcome of one task step
#[derive(Debug)]
pub enum ComputationResult {
    Final(PropertyValue),
    Intermediate {
        value: PropertyValue,
        dependencies: Vec<Observation>,
        resume: Resume,
    },
    /// Contained failure; the record is finalized at the lattice fallback
    Failure(String),
}

impl ComputationResult {
    pub fn final_value(value: impl Into<PropertyValue>) -> Self {
        ComputationResult::Final(value.into())
    }

    /// Intermediate result resumed by re-running the task
    ///
    /// Dependencies that are already final are dropped; with none left the
    /// result is final.
    pub fn intermediate(value: impl Into<PropertyValue>, dependencies: Vec<Observation>) -> Self {
        Self::suspend_with(value.into(), dependencies, Resume::Rerun)
    }

    /// Intermediate result resumed through an explicit continuation
    pub fn suspend<F>(value: impl Into<PropertyValue>, dependencies: Vec<Observation>, continuation: F) -> Self
    where
        F: FnOnce(&mut TaskContext<'_>, &Observation) -> Result<ComputationResult> + Send + 'static,
    {
        Self::suspend_with(value.into(), dependencies, Resume::With(Box::new(continuation)))
    }

    fn suspend_with(value: PropertyValue, mut dependencies: Vec<Observation>, resume: Resume) -> Self {
        dependencies.retain(|dep| !dep.is_final());
        if dependencies.is_empty() {
            ComputationResult::Final(value)
        } else {
            ComputationResult::Intermediate {
                value,
                dependencies,
                resume,
            }
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        ComputationResult::Failure(reason.into())
    }

    pub fn value(&self) -> Option<&PropertyValue> {
        match self {
            ComputationResult::Final(value) | ComputationResult::Intermediate { value, .. } => Some(value),
            ComputationResult::Failure(_) => None,
        }
    }
}

/// A pluggable computation of one property kind
///
/// Implementations must be side-effect free functions of the entity and the
/// store contents they read; they run concurrently on worker threads.
pub trait AnalysisTask: Send + Sync {
    fn name(&self) -> &str;

    /// Entity kinds this task can compute; others finalize at the fallback
    fn applies_to(&self, _entity: EntityRef) -> bool {
        true
    }

    fn compute(&self, entity: EntityRef, ctx: &mut TaskContext<'_>) -> Result<ComputationResult>;
}

impl fmt::Debug for dyn AnalysisTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AnalysisTask({})", self.name())
    }
}

/// Store handle passed to a running task
///
/// Reads go straight to the store records; requests for unrequested records
/// are buffered and applied by the scheduler once the task step returns.
pub struct TaskContext<'a> {
    store: &'a PropertyStore,
    key: PropertyKey,
    requested: Vec<PropertyKey>,
}

impl<'a> TaskContext<'a> {
    pub(crate) fn new(store: &'a PropertyStore, key: PropertyKey) -> Self {
        Self {
            store,
            key,
            requested: Vec::new(),
        }
    }

    pub(crate) fn into_requests(self) -> Vec<PropertyKey> {
        self.requested
    }

    /// Entity being computed
    pub fn entity(&self) -> EntityRef {
        self.key.entity
    }

    /// Kind being computed
    pub fn kind(&self) -> PropertyKindId {
        self.key.kind
    }

    pub fn soundness(&self) -> SoundnessMode {
        self.store.profile().soundness(self.key.kind)
    }

    pub fn level(&self) -> PrecisionLevel {
        self.store.profile().level(self.key.kind)
    }

    /// Soundness mode selected for another kind
    pub fn soundness_of(&self, kind: PropertyKindId) -> SoundnessMode {
        self.store.profile().soundness(kind)
    }

    pub fn universe(&self) -> &EntityUniverse {
        self.store.universe()
    }

    pub fn kinds(&self) -> &PropertyKinds {
        self.store.kinds()
    }

    pub fn lattice(&self, kind: PropertyKindId) -> Result<&Arc<dyn Lattice>> {
        self.store.kinds().lattice(kind)
    }

    /// Read another record, requesting it if nobody has yet
    pub fn get(&mut self, entity: EntityRef, kind: PropertyKindId) -> Result<Observation> {
        let observation = self.store.get(entity, kind)?;
        if observation.status == Status::Unrequested {
            let key = PropertyKey::new(entity, kind);
            if !self.requested.contains(&key) {
                self.requested.push(key);
            }
        }
        Ok(observation)
    }

    /// Read by entity name
    pub fn get_named(&mut self, entity: &str, kind: PropertyKindId) -> Result<Observation> {
        let entity = self.store.universe().resolve(entity)?;
        self.get(entity, kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityKind, EntityUniverse};
    use crate::kinds::PropertyKinds;
    use crate::lattice::ChainLattice;

    fn observation(status: Status) -> Observation {
        let mut universe = EntityUniverse::new();
        let entity = universe.add("A", EntityKind::Class).unwrap();
        let mut kinds = PropertyKinds::new();
        let kind = kinds.register("K", ChainLattice::new(2)).unwrap();
        Observation {
            key: PropertyKey::new(entity, kind),
            value: PropertyValue::Level(0),
            status,
            version: 1,
        }
    }

    #[test]
    fn test_intermediate_without_open_dependencies_is_final() {
        let result = ComputationResult::intermediate(
            crate::lattice::ReferenceMutability::Immutable,
            vec![observation(Status::Final)],
        );
        assert!(matches!(result, ComputationResult::Final(_)));
    }

    #[test]
    fn test_intermediate_keeps_open_dependencies() {
        let result = ComputationResult::intermediate(
            PropertyValue::Level(1),
            vec![observation(Status::Intermediate), observation(Status::Final)],
        );
        match result {
            ComputationResult::Intermediate { dependencies, .. } => assert_eq!(dependencies.len(), 1),
            other => panic!("unexpected {other:?}"),
        }
    }
}
