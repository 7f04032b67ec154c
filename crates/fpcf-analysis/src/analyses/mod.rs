//! Hosted analyses and their standard registration
//!
//! | kind                 | lattice               | levels     |
//! |----------------------|-----------------------|------------|
//! | `FieldAssignability` | reference mutability  | L0, L1, L2 |
//! | `FieldImmutability`  | immutability          | L0, L1     |
//! | `ClassImmutability`  | immutability          | L0, L1     |
//! | `TypeImmutability`   | immutability          | L0         |
//! | `StringConstancy`    | string constancy      | L0, L1     |

mod assignability;
mod immutability;
mod strings;

pub use assignability::FieldAssignabilityAnalysis;
pub use immutability::{ClassImmutabilityAnalysis, FieldImmutabilityAnalysis, TypeImmutabilityAnalysis};
pub use strings::StringConstancyAnalysis;

use crate::ir::ProgramModel;
use crate::program::Program;
use fpcf_core::lattice::{ImmutabilityLattice, ReferenceMutabilityLattice, StringConstancyLattice};
use fpcf_core::{
    ConfigurationProfile, EngineConfig, EntityUniverse, PrecisionLevel, ProfileSpec, PropertyKey, PropertyKindId, PropertyKinds,
    PropertyStore, Result, SealedSnapshot, SoundnessMode, TaskRegistry,
};
use std::sync::Arc;

pub const FIELD_ASSIGNABILITY: &str = "FieldAssignability";
pub const FIELD_IMMUTABILITY: &str = "FieldImmutability";
pub const CLASS_IMMUTABILITY: &str = "ClassImmutability";
pub const TYPE_IMMUTABILITY: &str = "TypeImmutability";
pub const STRING_CONSTANCY: &str = "StringConstancy";

/// Ids of the standard property kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StandardKinds {
    pub field_assignability: PropertyKindId,
    pub field_immutability: PropertyKindId,
    pub class_immutability: PropertyKindId,
    pub type_immutability: PropertyKindId,
    pub string_constancy: PropertyKindId,
}

impl StandardKinds {
    pub fn register(kinds: &mut PropertyKinds) -> Result<Self> {
        Ok(Self {
            field_assignability: kinds.register(FIELD_ASSIGNABILITY, ReferenceMutabilityLattice)?,
            field_immutability: kinds.register(FIELD_IMMUTABILITY, ImmutabilityLattice)?,
            class_immutability: kinds.register(CLASS_IMMUTABILITY, ImmutabilityLattice)?,
            type_immutability: kinds.register(TYPE_IMMUTABILITY, ImmutabilityLattice)?,
            string_constancy: kinds.register(STRING_CONSTANCY, StringConstancyLattice::default())?,
        })
    }

    /// Register every task variant of every standard kind
    pub fn register_tasks(
        &self,
        program: Arc<dyn ProgramModel>,
        kinds: &PropertyKinds,
        tasks: &mut TaskRegistry,
    ) -> Result<()> {
        for level in [PrecisionLevel::L0, PrecisionLevel::L1, PrecisionLevel::L2] {
            tasks.register(
                kinds,
                self.field_assignability,
                level,
                FieldAssignabilityAnalysis::new(program.clone(), level),
            )?;
        }
        for level in [PrecisionLevel::L0, PrecisionLevel::L1] {
            tasks.register(
                kinds,
                self.field_immutability,
                level,
                FieldImmutabilityAnalysis::new(program.clone(), *self, level),
            )?;
            tasks.register(
                kinds,
                self.class_immutability,
                level,
                ClassImmutabilityAnalysis::new(program.clone(), *self, level),
            )?;
            tasks.register(
                kinds,
                self.string_constancy,
                level,
                StringConstancyAnalysis::new(program.clone(), *self, level),
            )?;
        }
        tasks.register(
            kinds,
            self.type_immutability,
            PrecisionLevel::L0,
            TypeImmutabilityAnalysis::new(program, *self),
        )?;
        Ok(())
    }

    /// Highest level registered for a kind
    pub fn max_level(&self, kind: PropertyKindId) -> PrecisionLevel {
        if kind == self.field_assignability {
            PrecisionLevel::L2
        } else if kind == self.type_immutability {
            PrecisionLevel::L0
        } else {
            PrecisionLevel::L1
        }
    }

    pub fn all(&self) -> [PropertyKindId; 5] {
        [
            self.field_assignability,
            self.field_immutability,
            self.class_immutability,
            self.type_immutability,
            self.string_constancy,
        ]
    }
}

/// Profile running every standard kind at `level`, capped per kind
pub fn standard_profile(level: PrecisionLevel, soundness: SoundnessMode) -> ProfileSpec {
    let caps = [
        (FIELD_ASSIGNABILITY, PrecisionLevel::L2),
        (FIELD_IMMUTABILITY, PrecisionLevel::L1),
        (CLASS_IMMUTABILITY, PrecisionLevel::L1),
        (TYPE_IMMUTABILITY, PrecisionLevel::L0),
        (STRING_CONSTANCY, PrecisionLevel::L1),
    ];
    caps.into_iter()
        .fold(ProfileSpec::new(soundness), |spec, (kind, cap)| spec.with_kind(kind, level.min(cap)))
}

/// A store over a program with the standard kinds and tasks registered
pub struct AnalysisSession {
    pub store: PropertyStore,
    pub kinds: StandardKinds,
}

impl AnalysisSession {
    pub fn open(
        program: Arc<dyn ProgramModel>,
        universe: EntityUniverse,
        spec: &ProfileSpec,
        config: EngineConfig,
    ) -> Result<Self> {
        let mut kinds = PropertyKinds::new();
        let standard = StandardKinds::register(&mut kinds)?;
        let mut tasks = TaskRegistry::new();
        standard.register_tasks(program, &kinds, &mut tasks)?;
        let profile = ConfigurationProfile::resolve(spec, &kinds, &tasks)?;
        Ok(Self {
            store: PropertyStore::new(universe, kinds, profile, config)?,
            kinds: standard,
        })
    }

    /// Open a session over an in-memory program
    pub fn for_program(program: Program, spec: &ProfileSpec, config: EngineConfig) -> Result<Self> {
        let universe = program.universe().clone();
        Self::open(Arc::new(program), universe, spec, config)
    }

    pub fn key(&self, entity: &str, kind: PropertyKindId) -> Result<PropertyKey> {
        Ok(PropertyKey::new(self.store.universe().resolve(entity)?, kind))
    }

    /// Compute `kind` for each named entity
    pub fn run(&self, roots: &[(&str, PropertyKindId)]) -> Result<SealedSnapshot> {
        let keys = roots
            .iter()
            .map(|(entity, kind)| self.key(entity, *kind))
            .collect::<Result<Vec<_>>>()?;
        self.store.await_fixpoint(&keys)
    }
}
