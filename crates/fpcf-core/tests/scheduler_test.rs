use fpcf_core::prelude::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

const HEIGHT: u32 = 5;

/// Level of an entity = max(own base, levels of the entities it reads)
struct Reach {
    base: HashMap<String, u32>,
    reads: HashMap<String, Vec<String>>,
}

impl Reach {
    fn new(base: &[(&str, u32)], reads: &[(&str, &[&str])]) -> Self {
        Self {
            base: base.iter().map(|(n, l)| (n.to_string(), *l)).collect(),
            reads: reads
                .iter()
                .map(|(n, deps)| (n.to_string(), deps.iter().map(|d| d.to_string()).collect()))
                .collect(),
        }
    }
}

impl AnalysisTask for Reach {
    fn name(&self) -> &str {
        "reach"
    }

    fn compute(&self, entity: EntityRef, ctx: &mut TaskContext<'_>) -> Result<ComputationResult> {
        let name = ctx.universe().name(entity).to_string();
        let kind = ctx.kind();
        let mut level = self.base.get(&name).copied().unwrap_or(0);
        let mut open = Vec::new();
        for dep in self.reads.get(&name).into_iter().flatten() {
            let observation = ctx.get_named(dep, kind)?;
            level = level.max(observation.value.as_level().unwrap_or(HEIGHT));
            open.push(observation);
        }
        Ok(ComputationResult::intermediate(PropertyValue::Level(level.min(HEIGHT)), open))
    }
}

struct Session {
    store: PropertyStore,
    kind: PropertyKindId,
}

impl Session {
    fn root(&self, name: &str) -> PropertyKey {
        PropertyKey::new(self.store.universe().resolve(name).unwrap(), self.kind)
    }

    fn level(&self, snapshot: &SealedSnapshot, name: &str) -> u32 {
        snapshot
            .get_named(name, "Reach")
            .and_then(PropertyValue::as_level)
            .unwrap()
    }
}

fn session_with(
    names: &[&str],
    task: impl AnalysisTask + 'static,
    spec: ProfileSpec,
    config: EngineConfig,
) -> Session {
    let mut universe = EntityUniverse::new();
    for name in names {
        universe.add(*name, EntityKind::Method).unwrap();
    }
    let mut kinds = PropertyKinds::new();
    let kind = kinds.register("Reach", ChainLattice::new(HEIGHT)).unwrap();
    let mut tasks = TaskRegistry::new();
    tasks.register(&kinds, kind, PrecisionLevel::L0, task).unwrap();
    let profile = ConfigurationProfile::resolve(&spec, &kinds, &tasks).unwrap();
    Session {
        store: PropertyStore::new(universe, kinds, profile, config).unwrap(),
        kind,
    }
}

fn session(names: &[&str], task: impl AnalysisTask + 'static, soundness: SoundnessMode) -> Session {
    session_with(
        names,
        task,
        ProfileSpec::new(soundness).with_kind("Reach", PrecisionLevel::L0),
        EngineConfig::sequential().with_history(),
    )
}

#[test]
fn test_acyclic_chain_finalizes_without_cycle_resolution() {
    let s = session(
        &["a", "b", "c"],
        Reach::new(&[("c", 3)], &[("a", &["b"]), ("b", &["c"])]),
        SoundnessMode::High,
    );
    let snapshot = s.store.await_fixpoint(&[s.root("a")]).unwrap();

    for name in ["a", "b", "c"] {
        assert_eq!(s.level(&snapshot, name), 3, "{name}");
    }
    let a = s.root("a");
    assert_eq!(snapshot.resolution(a.entity, a.kind), Some(&Resolution::Computed));
    assert_eq!(snapshot.stats().cycles_resolved, 0);
    assert_eq!(snapshot.stats().tasks_started, 3);
}

#[test]
fn test_mutual_dependency_uses_pessimistic_fallback_under_high() {
    let s = session(
        &["a", "b"],
        Reach::new(&[("a", 1), ("b", 2)], &[("a", &["b"]), ("b", &["a"])]),
        SoundnessMode::High,
    );
    let snapshot = s.store.await_fixpoint(&[s.root("a")]).unwrap();

    assert_eq!(s.level(&snapshot, "a"), HEIGHT);
    assert_eq!(s.level(&snapshot, "b"), HEIGHT);
    let b = s.root("b");
    assert_eq!(snapshot.resolution(b.entity, b.kind), Some(&Resolution::CycleFallback));
    assert_eq!(snapshot.stats().cycles_resolved, 1);
    assert_eq!(snapshot.stats().cycle_members, 2);
}

#[test]
fn test_mutual_dependency_commits_last_value_under_low() {
    let s = session(
        &["a", "b"],
        Reach::new(&[("a", 1), ("b", 2)], &[("a", &["b"]), ("b", &["a"])]),
        SoundnessMode::Low,
    );
    let snapshot = s.store.await_fixpoint(&[s.root("a")]).unwrap();

    assert_eq!(s.level(&snapshot, "a"), 2);
    assert_eq!(s.level(&snapshot, "b"), 2);
}

#[test]
fn test_upstream_of_cycle_is_computed_after_cycle_closes() {
    let s = session(
        &["top", "a", "b"],
        Reach::new(&[("a", 1)], &[("top", &["a"]), ("a", &["b"]), ("b", &["a"])]),
        SoundnessMode::Low,
    );
    let snapshot = s.store.await_fixpoint(&[s.root("top")]).unwrap();

    assert_eq!(s.level(&snapshot, "top"), 1);
    let top = s.root("top");
    assert_eq!(snapshot.resolution(top.entity, top.kind), Some(&Resolution::Computed));
    assert_eq!(snapshot.stats().cycle_members, 2);
}

#[test]
fn test_self_dependency_is_a_cycle() {
    let s = session(&["a"], Reach::new(&[("a", 2)], &[("a", &["a"])]), SoundnessMode::Low);
    let snapshot = s.store.await_fixpoint(&[s.root("a")]).unwrap();
    assert_eq!(s.level(&snapshot, "a"), 2);
    assert_eq!(snapshot.stats().cycles_resolved, 1);
}

#[test]
fn test_history_is_monotone() {
    let s = session(
        &["a", "b", "c"],
        Reach::new(&[("a", 1), ("c", 4)], &[("a", &["b"]), ("b", &["a", "c"])]),
        SoundnessMode::Low,
    );
    s.store.await_fixpoint(&[s.root("a")]).unwrap();

    let lattice = ChainLattice::new(HEIGHT);
    for name in ["a", "b", "c"] {
        let key = s.root(name);
        let history = s.store.history(key.entity, key.kind).unwrap();
        assert!(history.len() >= 2, "{name}: {history:?}");
        assert!(history.windows(2).all(|w| lattice.leq(&w[0], &w[1])), "{name}: {history:?}");
    }
}

#[test]
fn test_rerequest_of_final_record_does_not_rerun_task() {
    let s = session(
        &["a", "b"],
        Reach::new(&[("b", 2)], &[("a", &["b"])]),
        SoundnessMode::High,
    );
    let first = s.store.await_fixpoint(&[s.root("a")]).unwrap();
    let started = first.stats().tasks_started;

    s.store.request(s.root("a").entity, s.kind).unwrap();
    let second = s.store.await_fixpoint(&[s.root("a"), s.root("b")]).unwrap();

    assert_eq!(second.stats().tasks_started, started);
    assert_eq!(first.values(), second.values());
}

#[test]
fn test_get_reports_bottom_for_unrequested() {
    let s = session(&["a"], Reach::new(&[], &[]), SoundnessMode::High);
    let observation = s.store.get(s.root("a").entity, s.kind).unwrap();
    assert_eq!(observation.status, Status::Unrequested);
    assert_eq!(observation.value, PropertyValue::Level(0));
    assert_eq!(observation.version, 0);
}

struct Failing;

impl AnalysisTask for Failing {
    fn name(&self) -> &str {
        "failing"
    }

    fn compute(&self, entity: EntityRef, ctx: &mut TaskContext<'_>) -> Result<ComputationResult> {
        if ctx.universe().name(entity) == "broken" {
            return Ok(ComputationResult::failure("unsupported instruction"));
        }
        let kind = ctx.kind();
        let dep = ctx.get_named("broken", kind)?;
        let level = dep.value.as_level().unwrap_or(0);
        Ok(ComputationResult::intermediate(PropertyValue::Level(level), vec![dep]))
    }
}

#[test]
fn test_failure_is_contained() {
    let s = session(&["ok", "broken"], Failing, SoundnessMode::High);
    let snapshot = s.store.await_fixpoint(&[s.root("ok")]).unwrap();

    assert_eq!(s.level(&snapshot, "broken"), HEIGHT);
    assert_eq!(s.level(&snapshot, "ok"), HEIGHT);

    let failures: Vec<_> = snapshot.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0.entity, "broken");
    assert_eq!(failures[0].1, "unsupported instruction");
    assert_eq!(snapshot.stats().failures, 1);
}

/// Reports a lower value the second time it runs
struct Shrinking {
    runs: AtomicU32,
}

impl AnalysisTask for Shrinking {
    fn name(&self) -> &str {
        "shrinking"
    }

    fn compute(&self, entity: EntityRef, ctx: &mut TaskContext<'_>) -> Result<ComputationResult> {
        if ctx.universe().name(entity) == "leaf" {
            return Ok(ComputationResult::final_value(PropertyValue::Level(1)));
        }
        let kind = ctx.kind();
        let leaf = ctx.get_named("leaf", kind)?;
        if self.runs.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(ComputationResult::intermediate(PropertyValue::Level(3), vec![leaf]))
        } else {
            Ok(ComputationResult::final_value(PropertyValue::Level(1)))
        }
    }
}

#[test]
fn test_non_monotonic_update_is_fatal() {
    let s = session(
        &["root", "leaf"],
        Shrinking {
            runs: AtomicU32::new(0),
        },
        SoundnessMode::High,
    );
    let err = s.store.await_fixpoint(&[s.root("root")]).unwrap_err();
    match &err {
        FpcfError::ConsistencyViolation {
            entity,
            previous,
            rejected,
            ..
        } => {
            assert_eq!(entity, "root");
            assert_eq!(previous, &PropertyValue::Level(3));
            assert_eq!(rejected, &PropertyValue::Level(1));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(err.is_fatal());
    assert!(matches!(
        s.store.await_fixpoint(&[s.root("leaf")]),
        Err(FpcfError::Poisoned(_))
    ));
}

struct WrongLattice;

impl AnalysisTask for WrongLattice {
    fn name(&self) -> &str {
        "wrong-lattice"
    }

    fn compute(&self, _entity: EntityRef, _ctx: &mut TaskContext<'_>) -> Result<ComputationResult> {
        Ok(ComputationResult::final_value(ReferenceMutability::Mutable))
    }
}

#[test]
fn test_foreign_value_is_rejected() {
    let s = session(&["a"], WrongLattice, SoundnessMode::High);
    assert!(matches!(
        s.store.await_fixpoint(&[s.root("a")]),
        Err(FpcfError::ValueMismatch { lattice: "Chain", .. })
    ));
}

/// Adds ten to whatever its dependency finalizes at
struct PlusTen;

impl AnalysisTask for PlusTen {
    fn name(&self) -> &str {
        "plus-ten"
    }

    fn compute(&self, entity: EntityRef, ctx: &mut TaskContext<'_>) -> Result<ComputationResult> {
        if ctx.universe().name(entity) == "leaf" {
            return Ok(ComputationResult::final_value(PropertyValue::Level(4)));
        }
        let kind = ctx.kind();
        let leaf = ctx.get_named("leaf", kind)?;
        Ok(ComputationResult::suspend(
            PropertyValue::Level(0),
            vec![leaf],
            |_ctx, observation| {
                let level = observation.value.as_level().unwrap_or(0);
                Ok(ComputationResult::final_value(PropertyValue::Level(level + 10)))
            },
        ))
    }
}

#[test]
fn test_explicit_continuation_receives_wake_observation() {
    let mut universe = EntityUniverse::new();
    let root = universe.add("root", EntityKind::Method).unwrap();
    universe.add("leaf", EntityKind::Method).unwrap();
    let mut kinds = PropertyKinds::new();
    let kind = kinds.register("Sum", ChainLattice::new(20)).unwrap();
    let mut tasks = TaskRegistry::new();
    tasks.register(&kinds, kind, PrecisionLevel::L1, PlusTen).unwrap();
    let spec = ProfileSpec::default().with_kind("Sum", PrecisionLevel::L1);
    let profile = ConfigurationProfile::resolve(&spec, &kinds, &tasks).unwrap();
    let store = PropertyStore::new(universe, kinds, profile, EngineConfig::sequential()).unwrap();

    let snapshot = store.await_fixpoint(&[PropertyKey::new(root, kind)]).unwrap();
    assert_eq!(snapshot.get(root, kind), Some(&PropertyValue::Level(14)));
    assert_eq!(snapshot.stats().continuations_resumed, 1);
}

#[test]
fn test_fallback_only_kind_is_not_computed() {
    let s = session_with(
        &["a"],
        Reach::new(&[("a", 1)], &[]),
        ProfileSpec::new(SoundnessMode::High).with_fallback("Reach"),
        EngineConfig::sequential(),
    );
    let snapshot = s.store.await_fixpoint(&[s.root("a")]).unwrap();
    let a = s.root("a");

    assert_eq!(s.level(&snapshot, "a"), HEIGHT);
    assert_eq!(snapshot.resolution(a.entity, a.kind), Some(&Resolution::NotComputed));
    assert_eq!(snapshot.stats().tasks_started, 0);
}

#[test]
fn test_eager_kind_covers_every_entity() {
    let spec = ProfileSpec::new(SoundnessMode::High).with_selection(
        "Reach",
        KindSelection {
            eager: true,
            ..KindSelection::default()
        },
    );
    let s = session_with(
        &["a", "b", "c"],
        Reach::new(&[("b", 2)], &[]),
        spec,
        EngineConfig::sequential(),
    );
    let snapshot = s.store.await_fixpoint(&[]).unwrap();

    assert_eq!(snapshot.len(), 3);
    assert_eq!(s.level(&snapshot, "b"), 2);
}

#[test]
fn test_abort_keeps_session_resumable() {
    let s = session(
        &["a", "b"],
        Reach::new(&[("b", 2)], &[("a", &["b"])]),
        SoundnessMode::High,
    );
    let handle = s.store.abort_handle();
    handle.abort();
    assert!(matches!(
        s.store.await_fixpoint(&[s.root("a")]),
        Err(FpcfError::Aborted)
    ));
    assert!(!handle.is_aborted());
    assert_eq!(s.store.get(s.root("a").entity, s.kind).unwrap().status, Status::Scheduled);

    let snapshot = s.store.await_fixpoint(&[s.root("a")]).unwrap();
    assert_eq!(s.level(&snapshot, "a"), 2);
}

#[test]
fn test_unknown_entity_is_rejected() {
    let s = session(&["a"], Reach::new(&[], &[]), SoundnessMode::High);
    let mut other = EntityUniverse::new();
    other.add("x", EntityKind::Class).unwrap();
    let stranger = other.add("y", EntityKind::Class).unwrap();
    assert!(matches!(
        s.store.await_fixpoint(&[PropertyKey::new(stranger, s.kind)]),
        Err(FpcfError::UnknownEntity(_))
    ));
}

#[test]
fn test_parallel_workers_match_sequential() {
    let reads: &[(&str, &[&str])] = &[
        ("a", &["b", "c"]),
        ("b", &["d"]),
        ("c", &["d", "a"]),
        ("d", &["e"]),
        ("e", &[]),
    ];
    let base = &[("e", 2), ("c", 1)];
    let names = ["a", "b", "c", "d", "e"];

    let sequential = session_with(
        &names,
        Reach::new(base, reads),
        ProfileSpec::new(SoundnessMode::Low).with_kind("Reach", PrecisionLevel::L0),
        EngineConfig::sequential(),
    );
    let parallel = session_with(
        &names,
        Reach::new(base, reads),
        ProfileSpec::new(SoundnessMode::Low).with_kind("Reach", PrecisionLevel::L0),
        EngineConfig {
            worker_threads: 4,
            ..EngineConfig::default()
        },
    );

    let a = sequential.store.await_fixpoint(&[sequential.root("a")]).unwrap();
    let b = parallel.store.await_fixpoint(&[parallel.root("a")]).unwrap();
    assert_eq!(a.values(), b.values());
    assert_eq!(a.stats(), b.stats());
}

#[test]
fn test_sessions_are_independent() {
    let make = || {
        session(
            &["a", "b"],
            Reach::new(&[("b", 3)], &[("a", &["b"])]),
            SoundnessMode::High,
        )
    };
    let first = Arc::new(make());
    let second = make();
    first.store.await_fixpoint(&[first.root("a")]).unwrap();

    let untouched = second.store.get(second.root("a").entity, second.kind).unwrap();
    assert_eq!(untouched.status, Status::Unrequested);
}

#[test]
fn test_snapshot_json_report() {
    let s = session(&["a"], Reach::new(&[("a", 1)], &[]), SoundnessMode::High);
    let snapshot = s.store.await_fixpoint(&[s.root("a")]).unwrap();
    let json: serde_json::Value = serde_json::from_str(&snapshot.to_json().unwrap()).unwrap();

    assert_eq!(json["properties"][0]["entity"], "a");
    assert_eq!(json["properties"][0]["kind"], "Reach");
    assert_eq!(json["properties"][0]["resolution"]["resolution"], "computed");
    assert_eq!(json["stats"]["tasks_started"], 1);
}
