//! Field, class and type immutability
//!
//! The three kinds feed each other: a field is as immutable as its reference
//! and the type it holds, a class joins its fields and its superclass, and a
//! type joins a class with every subclass that may stand in for it. Class
//! types referenced from fields close the loop, so recursive data structures
//! show up as dependency cycles.

use super::StandardKinds;
use crate::ir::{FieldType, ProgramModel};
use fpcf_core::lattice::{Immutability, ReferenceMutability, TypeParamFormula};
use fpcf_core::{
    AnalysisTask, ComputationResult, EntityKind, EntityRef, Observation, PrecisionLevel, PropertyKindId, Result,
    SoundnessMode, TaskContext,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Immutability of the values a declared type admits
struct TypeResolver<'p> {
    program: &'p dyn ProgramModel,
    kinds: StandardKinds,
    level: PrecisionLevel,
    soundness: SoundnessMode,
}

impl TypeResolver<'_> {
    /// Stand-in for classes outside the program
    fn unknown(&self) -> Immutability {
        match self.soundness {
            SoundnessMode::High => Immutability::Mutable,
            SoundnessMode::Low => Immutability::DeepImmutable,
        }
    }

    fn of_type(&self, ty: &FieldType, ctx: &mut TaskContext<'_>, open: &mut Vec<Observation>) -> Result<Immutability> {
        match ty {
            FieldType::Primitive | FieldType::String => Ok(Immutability::DeepImmutable),
            FieldType::TypeParam(param) => Ok(Immutability::dependent(TypeParamFormula::single(param.as_str()))),
            // elements stay assignable
            FieldType::Array(_) => Ok(Immutability::Mutable),
            FieldType::Class { name, args } => {
                let Some(class) = ctx.universe().lookup(name) else {
                    return Ok(self.unknown());
                };
                let value = observe(ctx, class, self.kinds.type_immutability, open)?;
                self.instantiate(name, &value, args, ctx, open)
            }
        }
    }

    /// Bind the type parameters of `class` in a dependent value
    fn instantiate(
        &self,
        class: &str,
        value: &Immutability,
        args: &[FieldType],
        ctx: &mut TaskContext<'_>,
        open: &mut Vec<Observation>,
    ) -> Result<Immutability> {
        if !matches!(value, Immutability::DependentImmutable(_)) {
            return Ok(value.clone());
        }
        if self.level == PrecisionLevel::L0 {
            return Ok(value.without_generics());
        }

        let params = self
            .program
            .class(class)
            .map(|decl| decl.type_params.clone())
            .unwrap_or_default();
        let mut bound = BTreeMap::new();
        for (position, param) in params.into_iter().enumerate() {
            let resolved = match args.get(position) {
                Some(arg) => self.of_type(arg, ctx, open)?,
                None => self.unknown(),
            };
            bound.insert(param, resolved);
        }
        Ok(value.instantiate(|param| Some(bound.get(param).cloned().unwrap_or_else(|| self.unknown()))))
    }
}

fn observe(
    ctx: &mut TaskContext<'_>,
    entity: EntityRef,
    kind: PropertyKindId,
    open: &mut Vec<Observation>,
) -> Result<Immutability> {
    let observation = ctx.get(entity, kind)?;
    let value = observation
        .value
        .as_immutability()
        .cloned()
        .unwrap_or(Immutability::Mutable);
    open.push(observation);
    Ok(value)
}

pub struct FieldImmutabilityAnalysis {
    program: Arc<dyn ProgramModel>,
    kinds: StandardKinds,
    level: PrecisionLevel,
}

impl FieldImmutabilityAnalysis {
    pub fn new(program: Arc<dyn ProgramModel>, kinds: StandardKinds, level: PrecisionLevel) -> Self {
        Self { program, kinds, level }
    }
}

impl AnalysisTask for FieldImmutabilityAnalysis {
    fn name(&self) -> &str {
        "field-immutability"
    }

    fn applies_to(&self, entity: EntityRef) -> bool {
        entity.kind() == EntityKind::Field
    }

    fn compute(&self, entity: EntityRef, ctx: &mut TaskContext<'_>) -> Result<ComputationResult> {
        let name = ctx.universe().name(entity).to_string();
        let Some(field) = self.program.field(&name) else {
            return Ok(ComputationResult::failure(format!("no declaration for field `{name}`")));
        };

        let reference = ctx.get(entity, self.kinds.field_assignability)?;
        if reference.value.as_mutability() == Some(ReferenceMutability::Mutable) {
            return Ok(ComputationResult::final_value(Immutability::Mutable));
        }
        let mut open = vec![reference];

        let resolver = TypeResolver {
            program: self.program.as_ref(),
            kinds: self.kinds,
            level: self.level,
            soundness: ctx.soundness(),
        };
        let value = match resolver.of_type(&field.ty, ctx, &mut open)? {
            // the reference is fixed but the object behind it is not
            Immutability::Mutable => Immutability::ShallowImmutable,
            other if self.level == PrecisionLevel::L0 => other.without_generics(),
            other => other,
        };
        Ok(ComputationResult::intermediate(value, open))
    }
}

/// Joins a class's own fields with its superclass
pub struct ClassImmutabilityAnalysis {
    program: Arc<dyn ProgramModel>,
    kinds: StandardKinds,
    level: PrecisionLevel,
}

impl ClassImmutabilityAnalysis {
    pub fn new(program: Arc<dyn ProgramModel>, kinds: StandardKinds, level: PrecisionLevel) -> Self {
        Self { program, kinds, level }
    }
}

impl AnalysisTask for ClassImmutabilityAnalysis {
    fn name(&self) -> &str {
        "class-immutability"
    }

    fn applies_to(&self, entity: EntityRef) -> bool {
        entity.kind() == EntityKind::Class
    }

    fn compute(&self, entity: EntityRef, ctx: &mut TaskContext<'_>) -> Result<ComputationResult> {
        let name = ctx.universe().name(entity).to_string();
        let Some(class) = self.program.class(&name) else {
            return Ok(ComputationResult::failure(format!("no declaration for class `{name}`")));
        };
        let resolver = TypeResolver {
            program: self.program.as_ref(),
            kinds: self.kinds,
            level: self.level,
            soundness: ctx.soundness(),
        };

        let mut open = Vec::new();
        let mut value = Immutability::DeepImmutable;
        for field in &class.fields {
            let field = ctx.universe().resolve(field)?;
            let immutability = observe(ctx, field, self.kinds.field_immutability, &mut open)?;
            value = value.join(&immutability);
        }

        if let Some(superclass) = &class.superclass {
            let inherited = match ctx.universe().lookup(&superclass.name) {
                Some(parent) => {
                    let parent_value = observe(ctx, parent, self.kinds.class_immutability, &mut open)?;
                    resolver.instantiate(&superclass.name, &parent_value, &superclass.args, ctx, &mut open)?
                }
                None => resolver.unknown(),
            };
            value = value.join(&inherited);
        }

        if self.level == PrecisionLevel::L0 {
            value = value.without_generics();
        }
        Ok(ComputationResult::intermediate(value, open))
    }
}

/// Joins a class with all of its subclasses
///
/// Under high soundness a non-final class may gain unseen subclasses, so it
/// is mutable as a type.
pub struct TypeImmutabilityAnalysis {
    program: Arc<dyn ProgramModel>,
    kinds: StandardKinds,
}

impl TypeImmutabilityAnalysis {
    pub fn new(program: Arc<dyn ProgramModel>, kinds: StandardKinds) -> Self {
        Self { program, kinds }
    }
}

impl AnalysisTask for TypeImmutabilityAnalysis {
    fn name(&self) -> &str {
        "type-immutability"
    }

    fn applies_to(&self, entity: EntityRef) -> bool {
        entity.kind() == EntityKind::Class
    }

    fn compute(&self, entity: EntityRef, ctx: &mut TaskContext<'_>) -> Result<ComputationResult> {
        let name = ctx.universe().name(entity).to_string();
        let Some(class) = self.program.class(&name) else {
            return Ok(ComputationResult::failure(format!("no declaration for class `{name}`")));
        };
        if !class.is_final && ctx.soundness() == SoundnessMode::High {
            return Ok(ComputationResult::final_value(Immutability::Mutable));
        }

        let mut open = Vec::new();
        let mut value = observe(ctx, entity, self.kinds.class_immutability, &mut open)?;
        for subclass in self.program.subclasses(&name) {
            if let Some(subclass) = ctx.universe().lookup(subclass) {
                value = value.join(&observe(ctx, subclass, self.kinds.class_immutability, &mut open)?);
            }
        }
        Ok(ComputationResult::intermediate(value, open))
    }
}
