//! Engine configuration

use crate::error::{FpcfError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 0 = one per CPU, 1 = run every round on the calling thread
    pub worker_threads: usize,
    /// Safety valve; exceeding it is reported as a stalled scheduler
    pub max_rounds: usize,
    /// Keep every accepted value per record
    pub record_history: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            max_rounds: 1_000_000,
            record_history: false,
        }
    }
}

impl EngineConfig {
    pub fn sequential() -> Self {
        Self {
            worker_threads: 1,
            ..Self::default()
        }
    }

    pub fn with_history(mut self) -> Self {
        self.record_history = true;
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    fn validate(&self) -> Result<()> {
        if self.max_rounds == 0 {
            return Err(FpcfError::Config("max_rounds must be positive".to_string()));
        }
        Ok(())
    }
}
