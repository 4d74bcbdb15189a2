//! External data sources: baseline configurations, sampled curves and
//! clock-source names.
//!
//! The engine only consumes these through traits. The `Static*` types are
//! in-memory implementations that can be loaded from JSON for off-target
//! runs and tests.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{Domain, DomainKind, DomainTable};
use crate::pstate::{BaselineKey, ClockEntry, Configuration};

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Unknown domain '{0}'")]
    UnknownDomain(String),

    #[error("Domain '{name}' is not a {expected:?} domain")]
    WrongKind { name: String, expected: DomainKind },

    #[error("No sampled curve for domain '{domain}' at baseline '{key}'")]
    NoCurve { domain: String, key: BaselineKey },
}

/// Supplies fully-populated baseline configurations.
pub trait BaselineProvider {
    /// `None` if the baseline is not defined on this target.
    fn baseline(&self, key: BaselineKey) -> Option<Configuration>;
}

/// One sampled point of a frequency/voltage curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub freq_khz: u32,
    pub volt_uv: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampledCurveData {
    pub points: Vec<CurvePoint>,
    /// Highest voltage the domain's rail supports.
    pub max_volt_uv: u32,
}

/// Supplies sampled frequency/voltage curves per clock domain.
pub trait CurveProvider {
    fn sample_curve(
        &self,
        domain: Domain,
        key: BaselineKey,
    ) -> Result<SampledCurveData, ProviderError>;
}

/// Clock-source name ↔ code lookup.
pub trait ClockSourceLookup {
    fn code(&self, name: &str) -> Option<u8>;
    fn name(&self, code: u8) -> Option<&str>;
}

// ── Clock sources ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceTable {
    sources: BTreeMap<String, u8>,
}

impl SourceTable {
    pub fn new(sources: impl IntoIterator<Item = (String, u8)>) -> Self {
        Self {
            sources: sources
                .into_iter()
                .map(|(name, code)| (name.to_lowercase(), code))
                .collect(),
        }
    }
}

impl Default for SourceTable {
    fn default() -> Self {
        Self::new(
            [
                ("pll", 1),
                ("nafll", 2),
                ("onesrc", 3),
                ("bypass", 4),
                ("xtal", 5),
                ("spll", 6),
            ]
            .iter()
            .map(|&(name, code)| (name.to_string(), code)),
        )
    }
}

impl ClockSourceLookup for SourceTable {
    fn code(&self, name: &str) -> Option<u8> {
        self.sources.get(&name.trim().to_lowercase()).copied()
    }

    fn name(&self, code: u8) -> Option<&str> {
        self.sources
            .iter()
            .find(|(_, &c)| c == code)
            .map(|(name, _)| name.as_str())
    }
}

// ── In-memory baselines ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
struct ClockSpec {
    freq: Option<u32>,
    #[serde(default)]
    source: Option<u8>,
    #[serde(default)]
    flags: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct BaselineSpec {
    key: BaselineKey,
    #[serde(default)]
    clocks: BTreeMap<String, ClockSpec>,
    #[serde(default)]
    volts: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, Deserialize)]
struct BaselineFile {
    baselines: Vec<BaselineSpec>,
}

/// Baselines held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticBaselines {
    configs: HashMap<BaselineKey, Configuration>,
}

impl StaticBaselines {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, config: Configuration) {
        if let Some(key) = config.baseline {
            self.configs.insert(key, config);
        }
    }

    /// Load from `{"baselines": [{"key": "init", "clocks": {"gpc": {"freq": 1000}}, "volts": {"logic": 800000}}]}`.
    pub fn from_json_str(json: &str, domains: &DomainTable) -> Result<Self, ProviderError> {
        let file: BaselineFile = serde_json::from_str(json)?;
        let mut baselines = Self::new();
        for spec in file.baselines {
            let mut config = Configuration::for_baseline(spec.key);
            for (name, clock) in spec.clocks {
                let domain = expect_domain(domains, &name, DomainKind::Clock)?;
                *config.clock_mut(domain) = ClockEntry {
                    freq: clock.freq,
                    source: clock.source,
                    flags: clock.flags,
                };
            }
            for (name, volt) in spec.volts {
                let rail = expect_domain(domains, &name, DomainKind::Voltage)?;
                config.set_volt(rail, volt);
            }
            baselines.insert(config);
        }
        Ok(baselines)
    }

    pub fn from_json_file(path: &Path, domains: &DomainTable) -> Result<Self, ProviderError> {
        let json = read_file(path)?;
        Self::from_json_str(&json, domains)
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}

impl BaselineProvider for StaticBaselines {
    fn baseline(&self, key: BaselineKey) -> Option<Configuration> {
        self.configs.get(&key).cloned()
    }
}

// ── In-memory curves ─────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
struct CurveSpec {
    domain: String,
    key: BaselineKey,
    max_volt: u32,
    points: Vec<(u32, u32)>,
}

#[derive(Debug, Clone, Deserialize)]
struct CurveFile {
    curves: Vec<CurveSpec>,
}

/// Sampled curves held in memory, keyed by domain and baseline.
#[derive(Debug, Clone, Default)]
pub struct StaticCurves {
    curves: HashMap<(Domain, BaselineKey), SampledCurveData>,
}

impl StaticCurves {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, domain: Domain, key: BaselineKey, data: SampledCurveData) {
        self.curves.insert((domain, key), data);
    }

    /// Load from `{"curves": [{"domain": "gpc", "key": "init", "max_volt": 1000000, "points": [[freq, volt], ...]}]}`.
    pub fn from_json_str(json: &str, domains: &DomainTable) -> Result<Self, ProviderError> {
        let file: CurveFile = serde_json::from_str(json)?;
        let mut curves = Self::new();
        for spec in file.curves {
            let domain = expect_domain(domains, &spec.domain, DomainKind::Clock)?;
            let points = spec
                .points
                .into_iter()
                .map(|(freq_khz, volt_uv)| CurvePoint { freq_khz, volt_uv })
                .collect();
            curves.insert(
                domain,
                spec.key,
                SampledCurveData {
                    points,
                    max_volt_uv: spec.max_volt,
                },
            );
        }
        Ok(curves)
    }

    pub fn from_json_file(path: &Path, domains: &DomainTable) -> Result<Self, ProviderError> {
        let json = read_file(path)?;
        Self::from_json_str(&json, domains)
    }
}

impl CurveProvider for StaticCurves {
    fn sample_curve(
        &self,
        domain: Domain,
        key: BaselineKey,
    ) -> Result<SampledCurveData, ProviderError> {
        self.curves
            .get(&(domain, key))
            .cloned()
            .ok_or_else(|| ProviderError::NoCurve {
                domain: format!("#{}", domain.index()),
                key,
            })
    }
}

fn expect_domain(
    domains: &DomainTable,
    name: &str,
    expected: DomainKind,
) -> Result<Domain, ProviderError> {
    let domain = domains
        .lookup(name)
        .ok_or_else(|| ProviderError::UnknownDomain(name.to_string()))?;
    let matches = match (domains.kind(domain), expected) {
        (Some(kind), DomainKind::Voltage) => kind == DomainKind::Voltage,
        (Some(kind), _) => kind.is_clock(),
        (None, _) => false,
    };
    if !matches {
        return Err(ProviderError::WrongKind {
            name: name.to_string(),
            expected,
        });
    }
    Ok(domain)
}

fn read_file(path: &Path) -> Result<String, ProviderError> {
    std::fs::read_to_string(path).map_err(|source| ProviderError::Io {
        path: path.display().to_string(),
        source,
    })
}
