//! Results comparison against externalized expectation tables
//!
//! Expected results live in JSON tables keyed by scenario, precision level
//! and soundness mode rather than in the analyzed fixtures. A table is
//! checked against a sealed snapshot, one row at a time.

use anyhow::Context;
use fpcf_core::lattice::{Immutability, StringConstancy};
use fpcf_core::{PrecisionLevel, PropertyValue, SealedSnapshot, SoundnessMode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("no expectations for scenario `{scenario}` at {level} / {soundness:?}")]
    NoRows {
        scenario: String,
        level: PrecisionLevel,
        soundness: SoundnessMode,
    },

    #[error("{failed} of {total} expectations failed for scenario `{scenario}`")]
    Mismatch {
        scenario: String,
        failed: usize,
        total: usize,
    },
}

/// Classification of a property value: a level name plus an optional detail
///
/// The detail is the regex-like pattern for string constancy, the type
/// parameter formula for dependent immutability, and the ordinal for chain
/// levels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedValue {
    pub level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

impl ExpectedValue {
    pub fn of(value: &PropertyValue) -> Self {
        let (level, pattern) = match value {
            PropertyValue::Mutability(mutability) => (format!("{mutability:?}"), None),
            PropertyValue::Immutability(immutability) => match immutability {
                Immutability::DependentImmutable(formula) => {
                    ("DependentImmutable".to_string(), Some(formula.to_string()))
                }
                other => (other.to_string(), None),
            },
            PropertyValue::Strings(strings) => {
                let pattern = match strings {
                    StringConstancy::NoFlow | StringConstancy::Dynamic => None,
                    other => Some(other.pattern()),
                };
                (format!("{:?}", strings.level()), pattern)
            }
            PropertyValue::Level(level) => ("Level".to_string(), Some(level.to_string())),
        };
        Self { level, pattern }
    }

    /// A missing expected pattern matches any actual one
    pub fn matches(&self, actual: &ExpectedValue) -> bool {
        self.level == actual.level && self.pattern.as_ref().map_or(true, |p| actual.pattern.as_ref() == Some(p))
    }
}

/// One expected result for an (entity, kind) in one configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expectation {
    pub scenario: String,
    pub level: PrecisionLevel,
    pub soundness: SoundnessMode,
    pub entity: String,
    pub kind: String,
    pub expected: ExpectedValue,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpectationTable {
    rows: Vec<Expectation>,
}

impl ExpectationTable {
    pub fn new(rows: Vec<Expectation>) -> Self {
        Self { rows }
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("Failed to parse expectation table")
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read expectation table {}", path.display()))?;
        Self::from_json(&content).with_context(|| format!("Invalid expectation table {}", path.display()))
    }

    pub fn rows(&self) -> &[Expectation] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows for one scenario in one configuration
    pub fn select<'t>(
        &'t self,
        scenario: &'t str,
        level: PrecisionLevel,
        soundness: SoundnessMode,
    ) -> impl Iterator<Item = &'t Expectation> + 't {
        self.rows
            .iter()
            .filter(move |row| row.scenario == scenario && row.level == level && row.soundness == soundness)
    }

    /// Distinct configurations a scenario has expectations for, in table order
    pub fn configurations(&self, scenario: &str) -> Vec<(PrecisionLevel, SoundnessMode)> {
        let mut found = Vec::new();
        for row in self.rows.iter().filter(|row| row.scenario == scenario) {
            if !found.contains(&(row.level, row.soundness)) {
                found.push((row.level, row.soundness));
            }
        }
        found
    }

    /// (entity, kind) pairs to request for a scenario
    pub fn roots<'t>(
        &'t self,
        scenario: &'t str,
        level: PrecisionLevel,
        soundness: SoundnessMode,
    ) -> Vec<(&'t str, &'t str)> {
        self.select(scenario, level, soundness)
            .map(|row| (row.entity.as_str(), row.kind.as_str()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowOutcome {
    pub entity: String,
    pub kind: String,
    pub expected: ExpectedValue,
    /// `None` when the snapshot holds no value for the row
    pub actual: Option<ExpectedValue>,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComparisonReport {
    pub scenario: String,
    pub level: PrecisionLevel,
    pub soundness: SoundnessMode,
    pub rows: Vec<RowOutcome>,
}

impl ComparisonReport {
    pub fn success(&self) -> bool {
        self.rows.iter().all(|row| row.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &RowOutcome> {
        self.rows.iter().filter(|row| !row.passed)
    }

    pub fn into_result(self) -> Result<Self, HarnessError> {
        let failed = self.failures().count();
        if failed == 0 {
            Ok(self)
        } else {
            Err(HarnessError::Mismatch {
                scenario: self.scenario,
                failed,
                total: self.rows.len(),
            })
        }
    }
}

/// Check every row of a scenario configuration against a snapshot
pub fn compare(
    table: &ExpectationTable,
    snapshot: &SealedSnapshot,
    scenario: &str,
    level: PrecisionLevel,
    soundness: SoundnessMode,
) -> Result<ComparisonReport, HarnessError> {
    let rows: Vec<RowOutcome> = table
        .select(scenario, level, soundness)
        .map(|row| {
            let actual = snapshot.get_named(&row.entity, &row.kind).map(ExpectedValue::of);
            let passed = actual.as_ref().is_some_and(|actual| row.expected.matches(actual));
            RowOutcome {
                entity: row.entity.clone(),
                kind: row.kind.clone(),
                expected: row.expected.clone(),
                actual,
                passed,
            }
        })
        .collect();

    if rows.is_empty() {
        return Err(HarnessError::NoRows {
            scenario: scenario.to_string(),
            level,
            soundness,
        });
    }
    Ok(ComparisonReport {
        scenario: scenario.to_string(),
        level,
        soundness,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fpcf_core::lattice::{ReferenceMutability, StringTree, TypeParamFormula};

    fn expected(level: &str, pattern: Option<&str>) -> ExpectedValue {
        ExpectedValue {
            level: level.to_string(),
            pattern: pattern.map(str::to_string),
        }
    }

    #[test]
    fn test_classify_values() {
        let partial = StringConstancy::from_tree(StringTree::concat([
            StringTree::constant("a"),
            StringTree::or([StringTree::constant("b"), StringTree::constant("c")]),
        ]));
        assert_eq!(
            ExpectedValue::of(&partial.into()),
            expected("PartiallyConstant", Some("a(b|c)"))
        );
        assert_eq!(
            ExpectedValue::of(&StringConstancy::Dynamic.into()),
            expected("Dynamic", None)
        );
        assert_eq!(
            ExpectedValue::of(&Immutability::dependent(TypeParamFormula::single("T1")).into()),
            expected("DependentImmutable", Some("T1"))
        );
        assert_eq!(
            ExpectedValue::of(&ReferenceMutability::LazilyInitialized.into()),
            expected("LazilyInitialized", None)
        );
        assert_eq!(ExpectedValue::of(&PropertyValue::Level(3)), expected("Level", Some("3")));
    }

    #[test]
    fn test_missing_pattern_matches_any() {
        let actual = expected("PartiallyConstant", Some("a.*"));
        assert!(expected("PartiallyConstant", None).matches(&actual));
        assert!(!expected("PartiallyConstant", Some("b.*")).matches(&actual));
        assert!(!expected("Dynamic", None).matches(&actual));
    }

    #[test]
    fn test_table_parses_and_selects() {
        let table = ExpectationTable::from_json(
            r#"[
                {"scenario": "s", "level": 1, "soundness": "High", "entity": "A", "kind": "K",
                 "expected": {"level": "Constant", "pattern": "x"}},
                {"scenario": "s", "level": 0, "soundness": "High", "entity": "A", "kind": "K",
                 "expected": {"level": "Dynamic"}},
                {"scenario": "t", "level": 0, "soundness": "Low", "entity": "B", "kind": "K",
                 "expected": {"level": "NoFlow"}}
            ]"#,
        )
        .unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.select("s", PrecisionLevel::L1, SoundnessMode::High).count(), 1);
        assert_eq!(
            table.configurations("s"),
            vec![(PrecisionLevel::L1, SoundnessMode::High), (PrecisionLevel::L0, SoundnessMode::High)]
        );
        let scenario = String::from("t");
        let roots = table.roots(&scenario, PrecisionLevel::L0, SoundnessMode::Low);
        assert_eq!(roots, vec![("B", "K")]);
    }

    #[test]
    fn test_malformed_table_is_reported() {
        let error = ExpectationTable::from_json("{\"rows\": 3}").unwrap_err();
        assert!(error.to_string().contains("expectation table"));
    }
}
