use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::Domain;

// ── Trial options ────────────────────────────────────────────────────

/// How a trial walks its iteration range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderMode {
    #[default]
    Sequential,
    /// Uniform index re-drawn at every step, without de-duplication.
    Random,
}

impl FromStr for OrderMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sequential" | "seq" => Ok(OrderMode::Sequential),
            "random" | "rand" => Ok(OrderMode::Random),
            other => Err(format!("unknown order '{other}', expected sequential/random")),
        }
    }
}

/// Path used by the execution sink to program a target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Direct,
    RmApi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RamType {
    Sdram,
    Ddr3,
    Ddr4,
    Ddr5,
    Lpddr4,
    Lpddr5,
    Gddr5,
    Gddr6,
    Gddr6x,
    Gddr7,
    Hbm2,
    Hbm3,
}

const RAM_TYPES: &[(&str, RamType)] = &[
    ("sdram", RamType::Sdram),
    ("ddr3", RamType::Ddr3),
    ("ddr4", RamType::Ddr4),
    ("ddr5", RamType::Ddr5),
    ("lpddr4", RamType::Lpddr4),
    ("lpddr5", RamType::Lpddr5),
    ("gddr5", RamType::Gddr5),
    ("gddr6", RamType::Gddr6),
    ("gddr6x", RamType::Gddr6x),
    ("gddr7", RamType::Gddr7),
    ("hbm2", RamType::Hbm2),
    ("hbm3", RamType::Hbm3),
];

impl FromStr for RamType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        RAM_TYPES
            .iter()
            .find(|(name, _)| *name == s)
            .map(|&(_, ram)| ram)
            .ok_or_else(|| format!("unknown ram type '{s}'"))
    }
}

impl fmt::Display for RamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = RAM_TYPES
            .iter()
            .find(|(_, ram)| ram == self)
            .map(|(name, _)| *name)
            .unwrap_or("?");
        f.write_str(name)
    }
}

// ── Tolerance ────────────────────────────────────────────────────────

/// Allowed deviation between target and measured values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToleranceSettings {
    /// Default frequency tolerance in percent.
    pub freq_percent: f64,
    /// Per-domain overrides in percent.
    pub per_domain: BTreeMap<Domain, f64>,
    /// Absolute voltage tolerance in µV.
    pub volt_uv: u32,
}

impl ToleranceSettings {
    pub fn percent_for(&self, domain: Domain) -> f64 {
        self.per_domain
            .get(&domain)
            .copied()
            .unwrap_or(self.freq_percent)
    }
}

impl Default for ToleranceSettings {
    fn default() -> Self {
        Self {
            freq_percent: 2.0,
            per_domain: BTreeMap::new(),
            volt_uv: 10_000,
        }
    }
}

// ── Target description ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    #[default]
    Hardware,
    Emulation,
    Simulation,
}

/// The device under test, as far as profile selection is concerned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetInfo {
    /// Exact chip id, e.g. `ga102`.
    pub chip: String,
    /// Family name, e.g. `ampere`.
    pub family: String,
    pub platform: Platform,
    /// Features present on the target.
    pub features: BTreeSet<String>,
    pub ram_type: Option<RamType>,
}

impl TargetInfo {
    pub fn has_feature(&self, name: &str) -> bool {
        self.features.contains(&name.to_lowercase())
    }
}
