//! Compiled profile definitions.
//!
//! A definition is the typed result of one block: the per-domain settings of
//! an offset table, sine generator or sampled curve, or the options of a
//! trial. Definitions carry names and locations only; turning them into
//! enumerable variation sources happens in the model layer.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::diag::SourceLocation;
use crate::domain::{Domain, DomainBitmap, DomainTable};
use crate::flags::FlagTable;
use crate::operator::{FlagOperator, ValueSpec};
use crate::pstate::BaselineKey;
use crate::types::{ExecutionMode, OrderMode, RamType, ToleranceSettings};

// ── Shared per-domain overrides ──────────────────────────────────────

/// Clock-source and flag overrides attached to one domain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainOverrides {
    pub source: Option<u8>,
    #[serde(default)]
    pub flags: FlagOperator,
}

// ── Offset table ─────────────────────────────────────────────────────

/// Settings for one domain of an offset table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OffsetColumnDef {
    pub values: Vec<ValueSpec>,
    #[serde(default)]
    pub overrides: DomainOverrides,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OffsetDef {
    pub name: String,
    pub location: Option<SourceLocation>,
    /// Clock and link-speed domains.
    pub clocks: BTreeMap<Domain, OffsetColumnDef>,
    /// Voltage rails.
    pub volts: BTreeMap<Domain, Vec<ValueSpec>>,
}

impl OffsetDef {
    pub fn domains(&self) -> DomainBitmap {
        self.clocks.keys().chain(self.volts.keys()).copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.clocks.is_empty() && self.volts.is_empty()
    }
}

// ── Sine generator ───────────────────────────────────────────────────

/// `alpha + beta * i^omega * sin(gamma * i)` for one domain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SineParams {
    /// Offset in kHz.
    pub alpha: Option<f64>,
    /// Amplitude in kHz.
    pub beta: Option<f64>,
    pub gamma: Option<f64>,
    pub omega: Option<f64>,
    #[serde(default)]
    pub overrides: DomainOverrides,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SineDef {
    pub name: String,
    pub location: Option<SourceLocation>,
    pub iterations: Option<u32>,
    pub domains: BTreeMap<Domain, SineParams>,
}

// ── Sampled curve ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurveDef {
    pub name: String,
    pub location: Option<SourceLocation>,
    /// Baseline whose sampled curve each domain follows.
    pub curves: BTreeMap<Domain, BaselineKey>,
    #[serde(default)]
    pub overrides: BTreeMap<Domain, DomainOverrides>,
}

// ── Trial ────────────────────────────────────────────────────────────

/// Tolerance values set inside a trial; unset entries inherit defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToleranceOverrides {
    pub freq_percent: Option<f64>,
    #[serde(default)]
    pub per_domain: BTreeMap<Domain, f64>,
    pub volt_uv: Option<u32>,
}

impl ToleranceOverrides {
    pub fn merged(&self, defaults: &ToleranceSettings) -> ToleranceSettings {
        let mut merged = defaults.clone();
        if let Some(percent) = self.freq_percent {
            merged.freq_percent = percent;
        }
        if let Some(volt) = self.volt_uv {
            merged.volt_uv = volt;
        }
        merged
            .per_domain
            .extend(self.per_domain.iter().map(|(&d, &p)| (d, p)));
        merged
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrialDef {
    pub name: String,
    pub location: Option<SourceLocation>,
    /// Colon-chained references, e.g. `init:offsets:sweep`.
    pub references: Vec<String>,
    pub tolerance: ToleranceOverrides,
    pub order: OrderMode,
    pub seed: Option<u64>,
    pub begin: Option<u64>,
    pub end: Option<u64>,
    pub enable: BTreeSet<String>,
    pub disable: BTreeSet<String>,
    pub ram_type: Option<RamType>,
    pub prune: DomainBitmap,
    pub mode: ExecutionMode,
}

// ── Definitions ──────────────────────────────────────────────────────

/// Kind of a compiled definition block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionKind {
    Offset,
    Sine,
    Curve,
    Trial,
}

impl fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DefinitionKind::Offset => "offset table",
            DefinitionKind::Sine => "sine generator",
            DefinitionKind::Curve => "sampled curve",
            DefinitionKind::Trial => "trial",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Definition {
    Offset(OffsetDef),
    Sine(SineDef),
    Curve(CurveDef),
    Trial(TrialDef),
}

impl Definition {
    pub fn empty(kind: DefinitionKind) -> Self {
        match kind {
            DefinitionKind::Offset => Definition::Offset(OffsetDef::default()),
            DefinitionKind::Sine => Definition::Sine(SineDef::default()),
            DefinitionKind::Curve => Definition::Curve(CurveDef::default()),
            DefinitionKind::Trial => Definition::Trial(TrialDef::default()),
        }
    }

    pub fn kind(&self) -> DefinitionKind {
        match self {
            Definition::Offset(_) => DefinitionKind::Offset,
            Definition::Sine(_) => DefinitionKind::Sine,
            Definition::Curve(_) => DefinitionKind::Curve,
            Definition::Trial(_) => DefinitionKind::Trial,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Definition::Offset(d) => &d.name,
            Definition::Sine(d) => &d.name,
            Definition::Curve(d) => &d.name,
            Definition::Trial(d) => &d.name,
        }
    }

    pub fn set_name(&mut self, name: String) {
        match self {
            Definition::Offset(d) => d.name = name,
            Definition::Sine(d) => d.name = name,
            Definition::Curve(d) => d.name = name,
            Definition::Trial(d) => d.name = name,
        }
    }

    pub fn location(&self) -> Option<&SourceLocation> {
        match self {
            Definition::Offset(d) => d.location.as_ref(),
            Definition::Sine(d) => d.location.as_ref(),
            Definition::Curve(d) => d.location.as_ref(),
            Definition::Trial(d) => d.location.as_ref(),
        }
    }

    pub fn set_location(&mut self, location: SourceLocation) {
        let slot = match self {
            Definition::Offset(d) => &mut d.location,
            Definition::Sine(d) => &mut d.location,
            Definition::Curve(d) => &mut d.location,
            Definition::Trial(d) => &mut d.location,
        };
        *slot = Some(location);
    }

    /// Multi-line rendering used by the session dump.
    pub fn describe(&self, domains: &DomainTable, flags: &FlagTable) -> String {
        let mut out = format!("{} '{}'", self.kind(), self.name());
        if let Some(location) = self.location() {
            out.push_str(&format!(" ({location})"));
        }
        out.push('\n');
        match self {
            Definition::Offset(def) => {
                for (&domain, column) in &def.clocks {
                    let values: Vec<String> =
                        column.values.iter().map(|v| v.describe(flags)).collect();
                    out.push_str(&format!(
                        "  {:<8} [{}]{}\n",
                        domains.name(domain),
                        values.join(", "),
                        describe_overrides(&column.overrides, flags)
                    ));
                }
                for (&rail, values) in &def.volts {
                    let values: Vec<String> = values.iter().map(|v| v.describe(flags)).collect();
                    out.push_str(&format!(
                        "  {:<8} [{}]\n",
                        domains.name(rail),
                        values.join(", ")
                    ));
                }
            }
            Definition::Sine(def) => {
                out.push_str(&format!(
                    "  iterations {}\n",
                    def.iterations
                        .map(|n| n.to_string())
                        .unwrap_or_else(|| "-".to_string())
                ));
                for (&domain, params) in &def.domains {
                    out.push_str(&format!(
                        "  {:<8} alpha={} beta={} gamma={} omega={}{}\n",
                        domains.name(domain),
                        opt(params.alpha),
                        opt(params.beta),
                        opt(params.gamma),
                        opt(params.omega),
                        describe_overrides(&params.overrides, flags)
                    ));
                }
            }
            Definition::Curve(def) => {
                for (&domain, key) in &def.curves {
                    let overrides = def.overrides.get(&domain).copied().unwrap_or_default();
                    out.push_str(&format!(
                        "  {:<8} curve {}{}\n",
                        domains.name(domain),
                        key,
                        describe_overrides(&overrides, flags)
                    ));
                }
            }
            Definition::Trial(def) => {
                for reference in &def.references {
                    out.push_str(&format!("  test {reference}\n"));
                }
                out.push_str(&format!("  order {:?}", def.order));
                if let Some(seed) = def.seed {
                    out.push_str(&format!(" seed {seed}"));
                }
                if def.begin.is_some() || def.end.is_some() {
                    out.push_str(&format!(
                        " range {}..{}",
                        def.begin.unwrap_or(0),
                        def.end.map(|e| e.to_string()).unwrap_or_default()
                    ));
                }
                if !def.prune.is_empty() {
                    out.push_str(&format!(" prune {}", domains.format(def.prune)));
                }
                out.push('\n');
            }
        }
        out
    }
}

fn opt(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn describe_overrides(overrides: &DomainOverrides, flags: &FlagTable) -> String {
    let mut out = String::new();
    if let Some(source) = overrides.source {
        out.push_str(&format!(" src={source}"));
    }
    if !overrides.flags.is_empty() {
        out.push_str(&format!(" flags={}", overrides.flags.describe(flags)));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tolerance_merge() {
        let defaults = ToleranceSettings::default();
        let gpc = Domain::new(0).unwrap();
        let mut overrides = ToleranceOverrides {
            freq_percent: Some(5.0),
            ..Default::default()
        };
        overrides.per_domain.insert(gpc, 1.0);
        let merged = overrides.merged(&defaults);
        assert_eq!(merged.freq_percent, 5.0);
        assert_eq!(merged.percent_for(gpc), 1.0);
        assert_eq!(merged.volt_uv, defaults.volt_uv);
    }

    #[test]
    fn test_definition_name_and_kind() {
        let mut def = Definition::empty(DefinitionKind::Sine);
        def.set_name("sweep".to_string());
        assert_eq!(def.kind(), DefinitionKind::Sine);
        assert_eq!(def.name(), "sweep");
    }
}
