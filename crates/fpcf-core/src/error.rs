//! Error taxonomy for the property store
//!
//! Only configuration and consistency problems are errors. Unanalyzable code
//! and cyclic dependencies are resolved inside the engine and never surface
//! here; per-entity task failures are contained and recorded in the snapshot.

use crate::kinds::PropertyKindId;
use crate::lattice::PropertyValue;
use crate::profile::PrecisionLevel;
use thiserror::Error;

/// Convenience alias used throughout the engine
pub type Result<T> = std::result::Result<T, FpcfError>;

#[derive(Debug, Error)]
pub enum FpcfError {
    #[error("property kind `{0}` is already registered")]
    DuplicateKind(String),

    #[error("unknown property kind `{0}`")]
    UnknownKind(String),

    #[error("property kind id {0} is not registered in this store")]
    UnknownKindId(PropertyKindId),

    #[error("unknown entity `{0}`")]
    UnknownEntity(String),

    #[error("entity `{0}` is declared twice")]
    DuplicateEntity(String),

    #[error("no task variant registered for kind `{kind}` at precision {level}")]
    MissingTask { kind: String, level: PrecisionLevel },

    #[error("task variant for kind `{kind}` at precision {level} is registered twice")]
    DuplicateTask { kind: String, level: PrecisionLevel },

    #[error("value {value:?} does not belong to the `{lattice}` lattice of kind `{kind}`")]
    ValueMismatch {
        kind: String,
        lattice: &'static str,
        value: PropertyValue,
    },

    #[error(
        "non-monotonic update of {kind} for `{entity}`: {rejected:?} is not above the stored {previous:?}"
    )]
    ConsistencyViolation {
        entity: String,
        kind: String,
        previous: PropertyValue,
        rejected: PropertyValue,
    },

    #[error("final value of {kind} for `{entity}` cannot be replaced")]
    FinalOverwrite { entity: String, kind: String },

    #[error("scheduler stalled after {rounds} rounds with {pending} unresolved records")]
    Stalled { rounds: usize, pending: usize },

    #[error("session aborted; pending work is retained and the session may be resumed")]
    Aborted,

    #[error("session is unusable after an earlier fatal error: {0}")]
    Poisoned(String),

    #[error("{}", render_all(.0))]
    InvalidProfile(Vec<FpcfError>),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

fn render_all(errors: &[FpcfError]) -> String {
    let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
    format!("{} invalid profile selections: {}", errors.len(), messages.join("; "))
}

impl FpcfError {
    /// Whether the error ends the session instead of a single computation
    pub fn is_fatal(&self) -> bool {
        !matches!(self, FpcfError::Aborted)
    }
}
