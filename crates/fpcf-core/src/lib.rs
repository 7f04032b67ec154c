//! # FPCF Core
//!
//! Fixpoint property-computation engine for whole-program static analysis.
//!
//! Analyses are pluggable [`AnalysisTask`]s that compute one property kind per
//! entity. Each kind is backed by a [`Lattice`]; the [`PropertyStore`] keeps
//! one monotonically growing record per (entity, kind), and the scheduler
//! drives all requested computations to a deterministic fixpoint, breaking
//! dependency cycles with the lattice's soundness-dependent fallback.
//!
//! ## Modules
//!
//! - **[`entity`]** - Closed universe of classes, fields and methods
//! - **[`lattice`]** - Lattice contract and the built-in lattices
//! - **[`kinds`]** - Property kind registry
//! - **[`task`]** - Task contract, results and continuations
//! - **[`profile`]** - Precision levels, soundness modes, task selection
//! - **[`store`]** - Property store and sealed snapshots
//!
//! ## Quick Start
//!
//! ```rust
//! use fpcf_core::prelude::*;
//!
//! struct Depth;
//!
//! impl AnalysisTask for Depth {
//!     fn name(&self) -> &str {
//!         "depth"
//!     }
//!
//!     fn compute(&self, _entity: EntityRef, _ctx: &mut TaskContext<'_>) -> Result<ComputationResult> {
//!         Ok(ComputationResult::final_value(PropertyValue::Level(1)))
//!     }
//! }
//!
//! let mut universe = EntityUniverse::new();
//! let class = universe.add("pkg.A", EntityKind::Class).unwrap();
//!
//! let mut kinds = PropertyKinds::new();
//! let depth = kinds.register("Depth", ChainLattice::new(3)).unwrap();
//!
//! let mut tasks = TaskRegistry::new();
//! tasks.register(&kinds, depth, PrecisionLevel::L0, Depth).unwrap();
//!
//! let spec = ProfileSpec::new(SoundnessMode::High).with_kind("Depth", PrecisionLevel::L0);
//! let profile = ConfigurationProfile::resolve(&spec, &kinds, &tasks).unwrap();
//! let store = PropertyStore::new(universe, kinds, profile, EngineConfig::sequential()).unwrap();
//!
//! let snapshot = store.await_fixpoint(&[PropertyKey::new(class, depth)]).unwrap();
//! assert_eq!(snapshot.get(class, depth), Some(&PropertyValue::Level(1)));
//! ```

pub mod config;
pub mod entity;
pub mod error;
pub mod kinds;
pub mod lattice;
pub mod profile;
mod scheduler;
pub mod store;
pub mod task;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::EngineConfig;
    pub use crate::entity::{EntityKind, EntityRef, EntityUniverse};
    pub use crate::error::{FpcfError, Result};
    pub use crate::kinds::{PropertyKindId, PropertyKinds};
    pub use crate::lattice::{
        ChainLattice, Immutability, ImmutabilityLattice, Lattice, PropertyValue, ReferenceMutability,
        ReferenceMutabilityLattice, SoundnessMode, StringConstancy, StringConstancyLattice, StringLevel,
        StringTree, TypeParamFormula,
    };
    pub use crate::profile::{ConfigurationProfile, KindSelection, PrecisionLevel, ProfileSpec, TaskRegistry};
    pub use crate::scheduler::AbortHandle;
    pub use crate::store::{PropertyStore, Resolution, SealedSnapshot, SessionStats, Status};
    pub use crate::task::{AnalysisTask, ComputationResult, Observation, PropertyKey, TaskContext};
}

pub use config::EngineConfig;
pub use entity::{EntityKind, EntityRef, EntityUniverse};
pub use error::{FpcfError, Result};
pub use kinds::{PropertyKindId, PropertyKinds};
pub use lattice::{Lattice, PropertyValue, SoundnessMode};
pub use profile::{ConfigurationProfile, PrecisionLevel, ProfileSpec, TaskRegistry};
pub use scheduler::AbortHandle;
pub use store::{PropertyStore, SealedSnapshot};
pub use task::{AnalysisTask, ComputationResult, Observation, PropertyKey, TaskContext};
