//! Engine configuration.
//!
//! Built once at start-up and passed by reference. Every section falls back
//! to the built-in tables when absent from the JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};

use ctp_compiler::DiscoverySettings;
use ctp_ir::domain::DomainTable;
use ctp_ir::flags::FlagTable;
use ctp_ir::provider::SourceTable;
use ctp_ir::types::{TargetInfo, ToleranceSettings};
use ctp_model::{default_relations, RelationError, SlaveRelation, SlaveRelations};

use crate::limits::RunLimits;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid slave relations: {0}")]
    Relation(#[from] RelationError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub domains: DomainTable,
    pub flags: FlagTable,
    pub sources: SourceTable,
    pub relations: Vec<SlaveRelation>,
    pub discovery: DiscoverySettings,
    pub tolerance: ToleranceSettings,
    pub limits: RunLimits,
    pub target: TargetInfo,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            domains: DomainTable::default(),
            flags: FlagTable::default(),
            sources: SourceTable::default(),
            relations: default_relations(),
            discovery: DiscoverySettings::default(),
            tolerance: ToleranceSettings::default(),
            limits: RunLimits::default(),
            target: TargetInfo::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.slave_relations()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Relations resolved against this configuration's domain table.
    pub fn slave_relations(&self) -> Result<SlaveRelations, ConfigError> {
        Ok(SlaveRelations::resolve(&self.relations, &self.domains)?)
    }
}
