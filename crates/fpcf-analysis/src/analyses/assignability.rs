//! Field assignability: can a field's reference change after construction?

use crate::ir::ProgramModel;
use fpcf_core::lattice::ReferenceMutability;
use fpcf_core::{AnalysisTask, ComputationResult, EntityKind, EntityRef, PrecisionLevel, Result, SoundnessMode, TaskContext};
use std::sync::Arc;
use tracing::trace;

/// Classifies fields as immutable, lazily initialized or mutable references
///
/// - L0: only declared-final fields are immutable
/// - L1: fields only written by constructors of their own class are
///   effectively final, provided no code outside the program can write them
///   (private fields, or any field under low soundness)
/// - L2: additionally recognizes a single method performing guarded lazy
///   initialization
pub struct FieldAssignabilityAnalysis {
    program: Arc<dyn ProgramModel>,
    level: PrecisionLevel,
}

impl FieldAssignabilityAnalysis {
    pub fn new(program: Arc<dyn ProgramModel>, level: PrecisionLevel) -> Self {
        Self { program, level }
    }
}

impl AnalysisTask for FieldAssignabilityAnalysis {
    fn name(&self) -> &str {
        "field-assignability"
    }

    fn applies_to(&self, entity: EntityRef) -> bool {
        entity.kind() == EntityKind::Field
    }

    fn compute(&self, entity: EntityRef, ctx: &mut TaskContext<'_>) -> Result<ComputationResult> {
        let name = ctx.universe().name(entity);
        let Some(field) = self.program.field(name) else {
            return Ok(ComputationResult::failure(format!("no declaration for field `{name}`")));
        };

        if field.is_final {
            return Ok(ComputationResult::final_value(ReferenceMutability::Immutable));
        }
        if self.level == PrecisionLevel::L0 {
            return Ok(ComputationResult::final_value(ReferenceMutability::Mutable));
        }
        if !field.is_private && ctx.soundness() == SoundnessMode::High {
            trace!(field = %field.name, "visible outside the program, assuming writes");
            return Ok(ComputationResult::final_value(ReferenceMutability::Mutable));
        }

        let mut lazy_initializers = 0;
        for method in self.program.field_writers(&field.name) {
            if method.is_constructor && method.owner == field.owner {
                continue;
            }
            let guarded = method
                .field_writes()
                .into_iter()
                .filter(|(written, _)| *written == field.name)
                .all(|(_, lazy_guard)| lazy_guard);
            if self.level >= PrecisionLevel::L2 && guarded {
                lazy_initializers += 1;
                continue;
            }
            trace!(field = %field.name, writer = %method.name, "reassigned outside construction");
            return Ok(ComputationResult::final_value(ReferenceMutability::Mutable));
        }

        let value = match lazy_initializers {
            0 => ReferenceMutability::Immutable,
            1 => ReferenceMutability::LazilyInitialized,
            _ => ReferenceMutability::Mutable,
        };
        Ok(ComputationResult::final_value(value))
    }
}
