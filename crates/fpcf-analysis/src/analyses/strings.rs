//! String constancy of method return values and fields
//!
//! Method bodies are interpreted abstractly: every local variable maps to a
//! [`StringConstancy`], concatenations and branches compose the values, and
//! the return statements are joined. Calls and field reads become
//! dependencies at L1; at L0 the interpretation stays inside one method and
//! gives up on branch merges and loops altogether.

use super::StandardKinds;
use crate::ir::{Expr, FieldDecl, MethodDecl, ProgramModel, Stmt};
use fpcf_core::lattice::{StringConstancy, StringTree};
use fpcf_core::{
    AnalysisTask, ComputationResult, EntityKind, EntityRef, Observation, PrecisionLevel, Result, SoundnessMode,
    TaskContext,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::trace;

type Env = BTreeMap<String, StringConstancy>;

pub struct StringConstancyAnalysis {
    program: Arc<dyn ProgramModel>,
    kinds: StandardKinds,
    level: PrecisionLevel,
}

impl StringConstancyAnalysis {
    pub fn new(program: Arc<dyn ProgramModel>, kinds: StandardKinds, level: PrecisionLevel) -> Self {
        Self { program, kinds, level }
    }

    fn method_value(&self, method: &MethodDecl, ctx: &mut TaskContext<'_>) -> Result<ComputationResult> {
        let mut interpreter = Interpreter::new(self, ctx);
        let mut env = Env::new();
        interpreter.block(&method.body, &mut env)?;
        Ok(interpreter.finish(|interpreter| interpreter.returned.clone()))
    }

    fn field_value(&self, field: &FieldDecl, ctx: &mut TaskContext<'_>) -> Result<ComputationResult> {
        let open_world = !field.is_private && !field.is_final && ctx.soundness() == SoundnessMode::High;
        let mut interpreter = Interpreter::new(self, ctx);
        interpreter.watched = Some(field.name.clone());

        if let Some(initializer) = &field.initializer {
            let value = interpreter.eval(initializer, &Env::new())?;
            interpreter.stored = interpreter.stored.or(&value);
        }
        for writer in self.program.field_writers(&field.name) {
            let mut env = Env::new();
            interpreter.block(&writer.body, &mut env)?;
        }

        Ok(interpreter.finish(|interpreter| {
            if open_world {
                interpreter.stored.or(&StringConstancy::Dynamic)
            } else {
                interpreter.stored.clone()
            }
        }))
    }
}

impl AnalysisTask for StringConstancyAnalysis {
    fn name(&self) -> &str {
        "string-constancy"
    }

    fn applies_to(&self, entity: EntityRef) -> bool {
        matches!(entity.kind(), EntityKind::Method | EntityKind::Field)
    }

    fn compute(&self, entity: EntityRef, ctx: &mut TaskContext<'_>) -> Result<ComputationResult> {
        let name = ctx.universe().name(entity).to_string();
        match entity.kind() {
            EntityKind::Method => match self.program.method(&name) {
                Some(method) => self.method_value(method, ctx),
                None => Ok(ComputationResult::failure(format!("no body for method `{name}`"))),
            },
            EntityKind::Field => match self.program.field(&name) {
                Some(field) => self.field_value(field, ctx),
                None => Ok(ComputationResult::failure(format!("no declaration for field `{name}`"))),
            },
            other => Ok(ComputationResult::failure(format!("no strings flow into {other:?} `{name}`"))),
        }
    }
}

/// Abstract interpreter over one or more method bodies
struct Interpreter<'s, 'c, 'a> {
    analysis: &'s StringConstancyAnalysis,
    ctx: &'c mut TaskContext<'a>,
    open: Vec<Observation>,
    /// Join of all returned values
    returned: StringConstancy,
    /// Field whose writes are collected, if any
    watched: Option<String>,
    stored: StringConstancy,
    /// Construct the current level cannot summarize
    unsupported: Option<&'static str>,
}

impl<'s, 'c, 'a> Interpreter<'s, 'c, 'a> {
    fn new(analysis: &'s StringConstancyAnalysis, ctx: &'c mut TaskContext<'a>) -> Self {
        Self {
            analysis,
            ctx,
            open: Vec::new(),
            returned: StringConstancy::NoFlow,
            watched: None,
            stored: StringConstancy::NoFlow,
            unsupported: None,
        }
    }

    fn finish(self, value: impl FnOnce(&Self) -> StringConstancy) -> ComputationResult {
        if let Some(construct) = self.unsupported {
            trace!(entity = %self.ctx.entity(), construct, "not summarized at this level");
            return ComputationResult::final_value(StringConstancy::Dynamic);
        }
        let value = value(&self);
        ComputationResult::intermediate(value, self.open)
    }

    fn intraprocedural(&self) -> bool {
        self.analysis.level == PrecisionLevel::L0
    }

    /// Contribution of a part whose strings cannot be known
    fn unknown(&self) -> StringConstancy {
        match self.ctx.soundness() {
            SoundnessMode::High => StringConstancy::Dynamic,
            SoundnessMode::Low => StringConstancy::NoFlow,
        }
    }

    /// Interpret a block; returns whether every path through it returned
    fn block(&mut self, stmts: &[Stmt], env: &mut Env) -> Result<bool> {
        for stmt in stmts {
            if self.unsupported.is_some() {
                return Ok(true);
            }
            if self.stmt(stmt, env)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn stmt(&mut self, stmt: &Stmt, env: &mut Env) -> Result<bool> {
        match stmt {
            Stmt::Assign { var, value } => {
                let value = self.eval(value, env)?;
                env.insert(var.clone(), value);
            }
            Stmt::FieldWrite { field, value, .. } => {
                if self.watched.as_deref() == Some(field.as_str()) {
                    let value = self.eval(value, env)?;
                    self.stored = self.stored.or(&value);
                }
            }
            Stmt::Return(value) => {
                let value = self.eval(value, env)?;
                self.returned = self.returned.or(&value);
                return Ok(true);
            }
            Stmt::If { then, otherwise } => {
                let mut then_env = env.clone();
                let mut else_env = env.clone();
                let then_returned = self.block(then, &mut then_env)?;
                let else_returned = self.block(otherwise, &mut else_env)?;
                match (then_returned, else_returned) {
                    (true, true) => return Ok(true),
                    (true, false) => *env = else_env,
                    (false, true) => *env = then_env,
                    (false, false) => *env = self.merge(then_env, else_env),
                }
            }
            Stmt::Loop { body } => {
                if self.intraprocedural() {
                    self.unsupported = Some("loop");
                    return Ok(true);
                }
                let before = env.clone();
                let mut after = env.clone();
                self.block(body, &mut after)?;
                for (var, value) in after {
                    let entry = before.get(&var).cloned().unwrap_or(StringConstancy::NoFlow);
                    if entry != value {
                        env.insert(var, loop_summary(&entry, &value));
                    }
                }
            }
        }
        Ok(false)
    }

    fn merge(&mut self, left: Env, mut right: Env) -> Env {
        let mut merged = Env::new();
        for (var, value) in left {
            let other = right.remove(&var).unwrap_or(StringConstancy::NoFlow);
            if value != other && self.intraprocedural() {
                self.unsupported = Some("branch merge");
            }
            merged.insert(var, value.or(&other));
        }
        if !right.is_empty() && self.intraprocedural() {
            self.unsupported = Some("branch merge");
        }
        merged.extend(right);
        merged
    }

    fn eval(&mut self, expr: &Expr, env: &Env) -> Result<StringConstancy> {
        Ok(match expr {
            Expr::Str(value) => StringConstancy::constant(value.as_str()),
            Expr::Var(var) => env.get(var).cloned().unwrap_or(StringConstancy::Dynamic),
            Expr::Param(_) => StringConstancy::Dynamic,
            Expr::Concat(left, right) => {
                let left = self.eval(left, env)?;
                let right = self.eval(right, env)?;
                left.concat(&right)
            }
            Expr::Cond(then, otherwise) => {
                if self.intraprocedural() {
                    self.unsupported = Some("conditional");
                    return Ok(StringConstancy::Dynamic);
                }
                let then = self.eval(then, env)?;
                let otherwise = self.eval(otherwise, env)?;
                then.or(&otherwise)
            }
            Expr::Call(method) => self.call(method)?,
            Expr::ExternalCall(_) | Expr::ReflectiveFieldRead { .. } => self.unknown(),
            Expr::FieldRead(field) => self.field_read(field)?,
            Expr::ArrayRead { elements, index } => match index.and_then(|index| elements.get(index)) {
                Some(element) => self.eval(element, env)?,
                None => self.unknown(),
            },
        })
    }

    fn call(&mut self, method: &str) -> Result<StringConstancy> {
        if self.intraprocedural() {
            return Ok(self.unknown());
        }
        let analysis = self.analysis;
        let targets = analysis.program.call_targets(method);
        if targets.is_empty() {
            return Ok(self.unknown());
        }
        let mut value = StringConstancy::NoFlow;
        for target in targets {
            let Some(target) = self.ctx.universe().lookup(target) else {
                value = value.or(&self.unknown());
                continue;
            };
            value = value.or(&self.observe(target)?);
        }
        Ok(value)
    }

    fn field_read(&mut self, field: &str) -> Result<StringConstancy> {
        if self.intraprocedural() {
            return Ok(self.unknown());
        }
        match self.ctx.universe().lookup(field) {
            Some(field) => self.observe(field),
            None => Ok(self.unknown()),
        }
    }

    fn observe(&mut self, entity: EntityRef) -> Result<StringConstancy> {
        let observation = self.ctx.get(entity, self.analysis.kinds.string_constancy)?;
        let value = observation
            .value
            .as_strings()
            .cloned()
            .unwrap_or(StringConstancy::Dynamic);
        self.open.push(observation);
        Ok(value)
    }
}

/// Value of a variable after any number of loop iterations
///
/// When one iteration appends a suffix to the entry value the result is
/// `entry (suffix)*`; anything else is unknown.
fn loop_summary(entry: &StringConstancy, once: &StringConstancy) -> StringConstancy {
    // zero and one iterations are always part of the summary
    entry.or(once).or(&repetition(entry, once))
}

/// `entry(suffix)*` when one iteration appends `suffix` to `entry`
fn repetition(entry: &StringConstancy, once: &StringConstancy) -> StringConstancy {
    let (Some(entry_tree), Some(once_tree)) = (entry.tree(), once.tree()) else {
        return StringConstancy::NoFlow;
    };
    let prefix = parts(&entry_tree);
    let whole = parts(&once_tree);
    let n = prefix.len();
    if whole.len() < n || whole[..n - 1] != prefix[..n - 1] {
        return StringConstancy::Dynamic;
    }

    let mut suffix = Vec::new();
    match (&prefix[n - 1], &whole[n - 1]) {
        (a, b) if a == b => {}
        (StringTree::Const(a), StringTree::Const(b)) if b.starts_with(a.as_str()) => {
            suffix.push(StringTree::constant(&b[a.len()..]));
        }
        _ => return StringConstancy::Dynamic,
    }
    suffix.extend(whole[n..].iter().cloned());
    StringConstancy::from_tree(StringTree::concat([entry_tree, StringTree::repeat(StringTree::concat(suffix))]))
}

fn parts(tree: &StringTree) -> Vec<StringTree> {
    match tree {
        StringTree::Concat(parts) => parts.clone(),
        other => vec![other.clone()],
    }
}
