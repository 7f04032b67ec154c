//! Fixpoint scheduler
//!
//! The scheduler works in rounds. Every round takes the whole ready queue,
//! runs those task steps (in parallel when a worker pool is configured)
//! against the store as it was at the start of the round, then applies the
//! results one by one in record order. Because tasks never see each other's
//! writes within a round and results are applied in a fixed order, the final
//! values do not depend on thread interleaving.
//!
//! When the ready queue runs dry while records are still suspended, every
//! suspended record is waiting on another suspended record. The dependency
//! graph restricted to those records is split into strongly connected
//! components; each component with no edge leaving it is closed and its members
//! are finalized at `join(last value, cycle_fallback)`. Records upstream of it
//! are then woken normally.

use crate::error::{FpcfError, Result};
use crate::lattice::{Lattice, PropertyValue};
use crate::store::{Edges, PropertyStore, Resolution, SessionStats, Status};
use crate::task::{ComputationResult, Observation, PropertyKey, Resume, TaskContext};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Cloneable handle to stop a running `await_fixpoint` between rounds
///
/// Aborting keeps every record and queued step, so a later call resumes the
/// session where it stopped.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Consume a pending abort request
    fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

#[derive(Debug)]
enum Work {
    Start,
    Resume(Observation),
}

/// Queue and bookkeeping guarded by the store's scheduler lock
#[derive(Debug, Default)]
pub(crate) struct SchedulerState {
    ready: BTreeMap<u32, Work>,
    /// Records suspended in `Intermediate`
    pending: BTreeSet<u32>,
    pub stats: SessionStats,
    pub poisoned: Option<String>,
}

impl SchedulerState {
    pub fn has_work(&self) -> bool {
        !self.ready.is_empty() || !self.pending.is_empty()
    }
}

enum Step {
    Start,
    Resume(Resume, Observation),
}

struct Job {
    index: u32,
    key: PropertyKey,
    step: Step,
}

struct Outcome {
    index: u32,
    result: Result<ComputationResult>,
    requests: Vec<PropertyKey>,
}

pub(crate) struct Scheduler<'a> {
    store: &'a PropertyStore,
    state: &'a mut SchedulerState,
}

impl<'a> Scheduler<'a> {
    pub fn new(store: &'a PropertyStore, state: &'a mut SchedulerState) -> Self {
        Self { store, state }
    }

    /// Drive the session until nothing is ready or suspended
    pub fn run(&mut self, roots: &[u32]) -> Result<()> {
        for &root in roots {
            self.request(root)?;
        }
        self.request_eager()?;

        let max_rounds = self.store.config().max_rounds;
        let mut rounds = 0;
        loop {
            if self.store.abort_handle().take() {
                info!(
                    ready = self.state.ready.len(),
                    pending = self.state.pending.len(),
                    "session aborted between rounds"
                );
                return Err(FpcfError::Aborted);
            }
            if self.state.ready.is_empty() {
                if self.state.pending.is_empty() {
                    return Ok(());
                }
                self.resolve_cycles()?;
                continue;
            }
            rounds += 1;
            if rounds > max_rounds {
                return Err(FpcfError::Stalled {
                    rounds: max_rounds,
                    pending: self.state.pending.len() + self.state.ready.len(),
                });
            }
            self.run_round()?;
        }
    }

    fn request_eager(&mut self) -> Result<()> {
        let store = self.store;
        for kind in store.kinds().ids() {
            if !store.profile().is_eager(kind) {
                continue;
            }
            let Some(task) = store.profile().task(kind) else {
                continue;
            };
            for entity in store.universe().iter() {
                if task.applies_to(entity) {
                    self.request(store.index(entity, kind)?)?;
                }
            }
        }
        Ok(())
    }

    /// Create the record at bottom and queue its task; idempotent
    pub fn request(&mut self, index: u32) -> Result<()> {
        let store = self.store;
        let key = store.key_of(index);
        {
            let mut record = store.slot(index).record.write();
            if record.status != Status::Unrequested {
                return Ok(());
            }
            record.status = Status::Scheduled;
            if store.config().record_history {
                let seed = record.value.clone();
                record.history.push(seed);
            }
        }

        match store.profile().task(key.kind) {
            Some(task) if task.applies_to(key.entity) => {
                debug!(
                    entity = store.universe().name(key.entity),
                    kind = store.kinds().name(key.kind),
                    task = task.name(),
                    "scheduled"
                );
                self.state.ready.insert(index, Work::Start);
                Ok(())
            }
            _ => {
                let fallback = store.lattice(key.kind)?.fallback();
                self.finalize(index, fallback, Resolution::NotComputed)
            }
        }
    }

    fn run_round(&mut self) -> Result<()> {
        let store = self.store;
        let ready = std::mem::take(&mut self.state.ready);
        let mut jobs = Vec::with_capacity(ready.len());
        for (index, work) in ready {
            let step = match work {
                Work::Start => {
                    self.state.stats.tasks_started += 1;
                    Step::Start
                }
                Work::Resume(observation) => {
                    self.state.stats.continuations_resumed += 1;
                    let resume = store.slot(index).resume.lock().take().unwrap_or(Resume::Rerun);
                    Step::Resume(resume, observation)
                }
            };
            jobs.push(Job {
                index,
                key: store.key_of(index),
                step,
            });
        }
        self.state.stats.rounds += 1;
        debug!(round = self.state.stats.rounds, jobs = jobs.len(), "running round");

        let outcomes: Vec<Outcome> = match store.pool() {
            Some(pool) => pool.install(|| {
                jobs.into_par_iter()
                    .map(|job| execute(store, job))
                    .collect()
            }),
            None => jobs.into_iter().map(|job| execute(store, job)).collect(),
        };

        for outcome in outcomes {
            for key in outcome.requests {
                self.request(store.index(key.entity, key.kind)?)?;
            }
            self.set(outcome.index, outcome.result?)?;
        }
        Ok(())
    }

    /// Apply one task result to its record
    pub fn set(&mut self, index: u32, result: ComputationResult) -> Result<()> {
        let store = self.store;
        match result {
            ComputationResult::Final(value) => {
                store.check_accepts(index, &value)?;
                self.finalize(index, value, Resolution::Computed)
            }
            ComputationResult::Failure(reason) => {
                let key = store.key_of(index);
                warn!(
                    entity = store.universe().name(key.entity),
                    kind = store.kinds().name(key.kind),
                    %reason,
                    "task failed; finalizing at fallback"
                );
                self.state.stats.failures += 1;
                let fallback = store.lattice(key.kind)?.fallback();
                self.finalize(index, fallback, Resolution::Failed(reason))
            }
            ComputationResult::Intermediate {
                value,
                dependencies,
                resume,
            } => {
                store.check_accepts(index, &value)?;
                self.suspend(index, value, dependencies, resume)
            }
        }
    }

    fn suspend(
        &mut self,
        index: u32,
        value: PropertyValue,
        dependencies: Vec<Observation>,
        resume: Resume,
    ) -> Result<()> {
        let store = self.store;
        let open: Vec<Observation> = dependencies.into_iter().filter(|d| !d.is_final()).collect();
        if open.is_empty() {
            return self.finalize(index, value, Resolution::Computed);
        }

        let key = store.key_of(index);
        let lattice = store.lattice(key.kind)?;
        let slot = store.slot(index);
        let (merged, changed, dependents) = {
            let mut record = slot.record.write();
            if record.status == Status::Final {
                return Err(store.final_overwrite(index));
            }
            let merged = store.merge(index, &record.value, value)?;
            let changed = merged != record.value;
            if changed {
                record.value = merged.clone();
                record.version += 1;
                if store.config().record_history {
                    record.history.push(merged.clone());
                }
            }
            (merged, changed, record.dependents.clone())
        };
        if lattice.is_final(&merged) {
            return self.finalize(index, merged, Resolution::Computed);
        }
        if changed {
            self.state.stats.updates_accepted += 1;
        }

        let mut dependees = Edges::new();
        for dep in &open {
            let dep_index = store.index(dep.key.entity, dep.key.kind)?;
            if !dependees.contains(&dep_index) {
                dependees.push(dep_index);
            }
        }
        {
            let mut record = slot.record.write();
            record.status = Status::Intermediate;
            record.dependees = dependees.clone();
        }
        for &dep_index in &dependees {
            store.slot(dep_index).record.write().add_dependent(index);
        }
        *slot.resume.lock() = Some(resume);
        self.state.pending.insert(index);
        debug!(
            entity = store.universe().name(key.entity),
            kind = store.kinds().name(key.kind),
            value = %merged,
            dependencies = dependees.len(),
            "suspended"
        );

        for &dep_index in &dependees {
            self.request(dep_index)?;
        }

        // A dependency that moved since the task read it wakes the task at once
        for dep in &open {
            let current = store.observe(store.index(dep.key.entity, dep.key.kind)?);
            if current.version != dep.version {
                self.wake(index, current);
                break;
            }
        }

        if changed {
            let observation = store.observe(index);
            for dependent in dependents {
                if dependent != index {
                    self.wake(dependent, observation.clone());
                }
            }
        }
        Ok(())
    }

    fn finalize(
        &mut self,
        index: u32,
        value: PropertyValue,
        resolution: Resolution,
    ) -> Result<()> {
        let store = self.store;
        let slot = store.slot(index);
        let (dependents, dependees) = {
            let mut record = slot.record.write();
            if record.status == Status::Final {
                return Err(store.final_overwrite(index));
            }
            let merged = store.merge(index, &record.value, value)?;
            record.value = merged;
            record.version += 1;
            record.status = Status::Final;
            record.resolution = Some(resolution);
            if store.config().record_history {
                let value = record.value.clone();
                record.history.push(value);
            }
            (
                std::mem::take(&mut record.dependents),
                std::mem::take(&mut record.dependees),
            )
        };
        *slot.resume.lock() = None;
        self.state.pending.remove(&index);
        self.state.stats.updates_accepted += 1;

        for dependee in dependees {
            store.slot(dependee).record.write().remove_dependent(index);
        }

        let observation = store.observe(index);
        debug!(
            entity = store.universe().name(observation.key.entity),
            kind = store.kinds().name(observation.key.kind),
            value = %observation.value,
            "finalized"
        );
        let mut dependents = dependents.into_vec();
        dependents.sort_unstable();
        for dependent in dependents {
            self.wake(dependent, observation.clone());
        }
        Ok(())
    }

    /// Move a suspended record back to the ready queue
    fn wake(&mut self, index: u32, observation: Observation) {
        let store = self.store;
        let dependees = {
            let mut record = store.slot(index).record.write();
            if record.status != Status::Intermediate {
                return;
            }
            record.status = Status::Scheduled;
            std::mem::take(&mut record.dependees)
        };
        for dependee in dependees {
            store.slot(dependee).record.write().remove_dependent(index);
        }
        self.state.pending.remove(&index);
        self.state.ready.insert(index, Work::Resume(observation));
    }

    /// Finalize every closed component of the suspended-record graph
    fn resolve_cycles(&mut self) -> Result<()> {
        let store = self.store;
        let mut graph: DiGraph<u32, ()> = DiGraph::new();
        let nodes: HashMap<u32, NodeIndex> = self
            .state
            .pending
            .iter()
            .map(|&index| (index, graph.add_node(index)))
            .collect();
        for &index in &self.state.pending {
            let dependees = store.slot(index).record.read().dependees.clone();
            for dependee in dependees {
                if let Some(&target) = nodes.get(&dependee) {
                    graph.add_edge(nodes[&index], target, ());
                }
            }
        }

        let mut members = Vec::new();
        let mut closed = 0;
        for component in tarjan_scc(&graph) {
            let inside: HashSet<NodeIndex> = component.iter().copied().collect();
            let is_closed = component
                .iter()
                .all(|&node| graph.neighbors(node).all(|next| inside.contains(&next)));
            if is_closed {
                closed += 1;
                members.extend(component.iter().map(|&node| graph[node]));
            }
        }
        if members.is_empty() {
            return Err(FpcfError::Stalled {
                rounds: self.state.stats.rounds,
                pending: self.state.pending.len(),
            });
        }
        members.sort_unstable();

        for &member in &members {
            store.slot(member).record.write().status = Status::CycleMember;
            self.state.pending.remove(&member);
        }
        for &member in &members {
            let key = store.key_of(member);
            let lattice = store.lattice(key.kind)?;
            let last = store.slot(member).record.read().value.clone();
            let fallback = lattice.cycle_fallback(store.profile().soundness(key.kind));
            let value = lattice.join(&last, &fallback);
            debug!(
                entity = store.universe().name(key.entity),
                kind = store.kinds().name(key.kind),
                last = %last,
                value = %value,
                "cycle member"
            );
            self.finalize(member, value, Resolution::CycleFallback)?;
        }

        warn!(
            components = closed,
            members = members.len(),
            "resolved dependency cycles with fallback values"
        );
        self.state.stats.cycles_resolved += closed;
        self.state.stats.cycle_members += members.len();
        Ok(())
    }
}

fn execute(store: &PropertyStore, job: Job) -> Outcome {
    let mut ctx = TaskContext::new(store, job.key);
    let result = match store.profile().task(job.key.kind) {
        Some(task) => match job.step {
            Step::Start | Step::Resume(Resume::Rerun, _) => task.compute(job.key.entity, &mut ctx),
            Step::Resume(Resume::With(continuation), observation) => continuation(&mut ctx, &observation),
        },
        None => Err(FpcfError::Config(format!(
            "no task selected for kind `{}`",
            store.kinds().name(job.key.kind)
        ))),
    };
    Outcome {
        index: job.index,
        result,
        requests: ctx.into_requests(),
    }
}

impl PropertyStore {
    /// Monotone merge of a new value into the stored one
    ///
    /// Values above the current one replace it, incomparable ones are joined,
    /// and anything strictly below is a consistency violation.
    pub(crate) fn merge(
        &self,
        index: u32,
        current: &PropertyValue,
        new: PropertyValue,
    ) -> Result<PropertyValue> {
        let key = self.key_of(index);
        let lattice: &dyn Lattice = self.lattice(key.kind)?.as_ref();
        let new = lattice.widen(new);
        if lattice.leq(current, &new) {
            return Ok(new);
        }
        if lattice.leq(&new, current) {
            let entity = self.universe().name(key.entity).to_string();
            let kind = self.kinds().name(key.kind).to_string();
            error!(%entity, %kind, previous = %current, rejected = %new, "non-monotonic update");
            return Err(FpcfError::ConsistencyViolation {
                entity,
                kind,
                previous: current.clone(),
                rejected: new,
            });
        }
        Ok(lattice.widen(lattice.join(current, &new)))
    }

    fn final_overwrite(&self, index: u32) -> FpcfError {
        let key = self.key_of(index);
        FpcfError::FinalOverwrite {
            entity: self.universe().name(key.entity).to_string(),
            kind: self.kinds().name(key.kind).to_string(),
        }
    }

    fn check_accepts(&self, index: u32, value: &PropertyValue) -> Result<()> {
        let key = self.key_of(index);
        let lattice = self.lattice(key.kind)?;
        if lattice.accepts(value) {
            Ok(())
        } else {
            Err(FpcfError::ValueMismatch {
                kind: self.kinds().name(key.kind).to_string(),
                lattice: lattice.name(),
                value: value.clone(),
            })
        }
    }
}
