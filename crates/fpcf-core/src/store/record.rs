//! Per-(entity, kind) record state

use crate::lattice::PropertyValue;
use crate::task::Resume;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// Lifecycle of a record
///
/// `Unrequested → Scheduled → (Intermediate ⇄ Scheduled)* → Final`, or
/// `… → Intermediate → CycleMember → Final` when a closed cycle is broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Unrequested,
    Scheduled,
    Intermediate,
    CycleMember,
    Final,
}

/// How a final value came about
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "resolution", content = "reason", rename_all = "snake_case")]
pub enum Resolution {
    /// Returned by the selected task
    Computed,
    /// Joined with the cycle fallback when its dependency cycle closed
    CycleFallback,
    /// The task failed; the value is the lattice fallback
    Failed(String),
    /// No task computes this kind; the value is the lattice fallback
    NotComputed,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Computed => write!(f, "computed"),
            Resolution::CycleFallback => write!(f, "cycle fallback"),
            Resolution::Failed(reason) => write!(f, "failed: {reason}"),
            Resolution::NotComputed => write!(f, "not computed"),
        }
    }
}

/// Dependency edges are record indices into the store's flat table
pub(crate) type Edges = SmallVec<[u32; 4]>;

#[derive(Debug, Clone)]
pub(crate) struct StoreRecord {
    pub value: PropertyValue,
    pub status: Status,
    pub version: u64,
    /// Records waiting on this one
    pub dependents: Edges,
    /// Records this one waits on
    pub dependees: Edges,
    pub resolution: Option<Resolution>,
    pub history: Vec<PropertyValue>,
}

impl StoreRecord {
    pub fn unrequested(bottom: PropertyValue) -> Self {
        Self {
            value: bottom,
            status: Status::Unrequested,
            version: 0,
            dependents: Edges::new(),
            dependees: Edges::new(),
            resolution: None,
            history: Vec::new(),
        }
    }

    pub fn add_dependent(&mut self, index: u32) {
        if !self.dependents.contains(&index) {
            self.dependents.push(index);
        }
    }

    pub fn remove_dependent(&mut self, index: u32) {
        self.dependents.retain(|d| *d != index);
    }
}

/// One lock per record, plus the parked continuation
#[derive(Debug)]
pub(crate) struct Slot {
    pub record: RwLock<StoreRecord>,
    pub resume: Mutex<Option<Resume>>,
}

impl Slot {
    pub fn new(bottom: PropertyValue) -> Self {
        Self {
            record: RwLock::new(StoreRecord::unrequested(bottom)),
            resume: Mutex::new(None),
        }
    }
}
