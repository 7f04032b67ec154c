//! Configuration profile
//!
//! Selects, per property kind, which task variant computes it (precision
//! level) and how missing information is approximated (soundness mode).
//! Selection is a table lookup resolved once, before any computation, so
//! every pairing error surfaces up front, all of them at once.

use crate::error::{FpcfError, Result};
use crate::kinds::{PropertyKindId, PropertyKinds};
use crate::lattice::SoundnessMode;
use crate::task::AnalysisTask;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Precision level of a task variant; higher means more reasoning attempted
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PrecisionLevel(pub u8);

impl PrecisionLevel {
    pub const L0: PrecisionLevel = PrecisionLevel(0);
    pub const L1: PrecisionLevel = PrecisionLevel(1);
    pub const L2: PrecisionLevel = PrecisionLevel(2);
    pub const L3: PrecisionLevel = PrecisionLevel(3);
}

impl fmt::Display for PrecisionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Registry of task variants keyed by (kind, precision level)
#[derive(Default)]
pub struct TaskRegistry {
    variants: IndexMap<(PropertyKindId, PrecisionLevel), Arc<dyn AnalysisTask>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task variant; a second variant for the same pairing is rejected
    pub fn register(
        &mut self,
        kinds: &PropertyKinds,
        kind: PropertyKindId,
        level: PrecisionLevel,
        task: impl AnalysisTask + 'static,
    ) -> Result<()> {
        self.register_shared(kinds, kind, level, Arc::new(task))
    }

    pub fn register_shared(
        &mut self,
        kinds: &PropertyKinds,
        kind: PropertyKindId,
        level: PrecisionLevel,
        task: Arc<dyn AnalysisTask>,
    ) -> Result<()> {
        kinds.lattice(kind)?;
        if self.variants.contains_key(&(kind, level)) {
            return Err(FpcfError::DuplicateTask {
                kind: kinds.name(kind).to_string(),
                level,
            });
        }
        debug!(kind = kinds.name(kind), %level, task = task.name(), "registered task variant");
        self.variants.insert((kind, level), task);
        Ok(())
    }

    pub fn get(&self, kind: PropertyKindId, level: PrecisionLevel) -> Option<&Arc<dyn AnalysisTask>> {
        self.variants.get(&(kind, level))
    }

    /// Levels registered for a kind, ascending
    pub fn levels(&self, kind: PropertyKindId) -> Vec<PrecisionLevel> {
        let mut levels: Vec<_> = self
            .variants
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, level)| *level)
            .collect();
        levels.sort();
        levels
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }
}

/// Whether a kind is computed by a task or pinned to its fallback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    #[default]
    Computed,
    Fallback,
}

/// Per-kind entry of a [`ProfileSpec`]
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KindSelection {
    #[serde(default)]
    pub level: PrecisionLevel,
    /// Overrides the profile-wide soundness mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soundness: Option<SoundnessMode>,
    #[serde(default)]
    pub mode: SelectionMode,
    /// Compute for every applicable entity, not only what roots reach
    #[serde(default)]
    pub eager: bool,
}

/// Serializable description of a profile, resolved into a [`ConfigurationProfile`]
///
/// ```json
/// {
///   "soundness": "High",
///   "kinds": {
///     "StringConstancy": { "level": 1 },
///     "FieldAssignability": { "mode": "fallback" }
///   }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProfileSpec {
    #[serde(default)]
    pub soundness: SoundnessMode,
    #[serde(default)]
    pub kinds: IndexMap<String, KindSelection>,
}

impl ProfileSpec {
    pub fn new(soundness: SoundnessMode) -> Self {
        Self {
            soundness,
            kinds: IndexMap::new(),
        }
    }

    /// Compute `kind` with the task variant at `level`
    pub fn with_kind(mut self, kind: impl Into<String>, level: PrecisionLevel) -> Self {
        self.kinds.insert(
            kind.into(),
            KindSelection {
                level,
                ..KindSelection::default()
            },
        );
        self
    }

    /// Pin `kind` to its lattice fallback
    pub fn with_fallback(mut self, kind: impl Into<String>) -> Self {
        self.kinds.insert(
            kind.into(),
            KindSelection {
                mode: SelectionMode::Fallback,
                ..KindSelection::default()
            },
        );
        self
    }

    pub fn with_selection(mut self, kind: impl Into<String>, selection: KindSelection) -> Self {
        self.kinds.insert(kind.into(), selection);
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}

#[derive(Debug, Clone)]
struct ResolvedSelection {
    level: PrecisionLevel,
    soundness: SoundnessMode,
    task: Option<Arc<dyn AnalysisTask>>,
    eager: bool,
}

/// A profile validated against the kind and task registries
#[derive(Debug, Clone)]
pub struct ConfigurationProfile {
    default_soundness: SoundnessMode,
    selections: Vec<ResolvedSelection>,
}

impl ConfigurationProfile {
    /// Resolve every selection of `spec`
    ///
    /// Kinds the spec does not mention are pinned to their fallback. All
    /// invalid selections are reported together: a single one as itself,
    /// several as [`FpcfError::InvalidProfile`] in spec order.
    pub fn resolve(spec: &ProfileSpec, kinds: &PropertyKinds, tasks: &TaskRegistry) -> Result<Self> {
        let mut selections: Vec<ResolvedSelection> = kinds
            .ids()
            .map(|_| ResolvedSelection {
                level: PrecisionLevel::L0,
                soundness: spec.soundness,
                task: None,
                eager: false,
            })
            .collect();

        let mut errors = Vec::new();
        for (name, selection) in &spec.kinds {
            match Self::resolve_selection(spec, name, selection, kinds, tasks) {
                Ok((kind, resolved)) => selections[kind.index()] = resolved,
                Err(error) => errors.push(error),
            }
        }
        match errors.len() {
            0 => {}
            1 => return Err(errors.remove(0)),
            _ => return Err(FpcfError::InvalidProfile(errors)),
        }

        for kind in kinds.ids() {
            if selections[kind.index()].task.is_none() {
                debug!(kind = kinds.name(kind), "kind resolves to its fallback");
            }
        }

        Ok(Self {
            default_soundness: spec.soundness,
            selections,
        })
    }

    fn resolve_selection(
        spec: &ProfileSpec,
        name: &str,
        selection: &KindSelection,
        kinds: &PropertyKinds,
        tasks: &TaskRegistry,
    ) -> Result<(PropertyKindId, ResolvedSelection)> {
        let kind = kinds.resolve(name)?;
        let task = match selection.mode {
            SelectionMode::Computed => Some(tasks.get(kind, selection.level).cloned().ok_or_else(|| {
                FpcfError::MissingTask {
                    kind: name.to_string(),
                    level: selection.level,
                }
            })?),
            SelectionMode::Fallback => None,
        };
        if selection.eager && task.is_none() {
            return Err(FpcfError::Config(format!(
                "kind `{name}` is pinned to its fallback and cannot be eager"
            )));
        }
        let resolved = ResolvedSelection {
            level: selection.level,
            soundness: selection.soundness.unwrap_or(spec.soundness),
            task,
            eager: selection.eager,
        };
        Ok((kind, resolved))
    }

    pub fn default_soundness(&self) -> SoundnessMode {
        self.default_soundness
    }

    pub fn soundness(&self, kind: PropertyKindId) -> SoundnessMode {
        self.selections
            .get(kind.index())
            .map_or(self.default_soundness, |s| s.soundness)
    }

    pub fn level(&self, kind: PropertyKindId) -> PrecisionLevel {
        self.selections
            .get(kind.index())
            .map_or(PrecisionLevel::L0, |s| s.level)
    }

    /// Selected task; `None` for fallback-only kinds
    pub fn task(&self, kind: PropertyKindId) -> Option<&Arc<dyn AnalysisTask>> {
        self.selections.get(kind.index()).and_then(|s| s.task.as_ref())
    }

    pub fn is_eager(&self, kind: PropertyKindId) -> bool {
        self.selections.get(kind.index()).is_some_and(|s| s.eager)
    }

    pub(crate) fn kind_count(&self) -> usize {
        self.selections.len()
    }
}
