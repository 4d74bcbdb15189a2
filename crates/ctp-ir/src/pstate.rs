//! Fully specified clock/voltage configuration ("full p-state").

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::{Domain, DomainBitmap, DomainTable, MAX_DOMAINS};
use crate::flags::FlagTable;

/// Identity of a baseline configuration supplied by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BaselineKey {
    /// The state the device booted into.
    Init,
    /// A numbered baseline (e.g. a factory-defined operating point).
    Index(u32),
}

impl FromStr for BaselineKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        if s == "init" {
            return Ok(BaselineKey::Init);
        }
        s.parse::<u32>()
            .map(BaselineKey::Index)
            .map_err(|_| format!("invalid baseline '{s}', expected 'init' or an index"))
    }
}

impl TryFrom<String> for BaselineKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BaselineKey> for String {
    fn from(key: BaselineKey) -> Self {
        key.to_string()
    }
}

impl fmt::Display for BaselineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BaselineKey::Init => write!(f, "init"),
            BaselineKey::Index(i) => write!(f, "{i}"),
        }
    }
}

/// Per-domain clock programming.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockEntry {
    /// Frequency in kHz (or link generation for link-speed domains).
    pub freq: Option<u32>,
    pub source: Option<u8>,
    pub flags: u32,
}

impl ClockEntry {
    pub fn is_set(&self) -> bool {
        self.freq.is_some()
    }
}

/// A complete per-domain assignment of frequency, source, flags and voltage.
///
/// Created empty and invalid; chained variation sources mutate it in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    pub baseline: Option<BaselineKey>,
    clocks: [ClockEntry; MAX_DOMAINS],
    volts: [Option<u32>; MAX_DOMAINS],
    valid: bool,
}

impl Configuration {
    pub fn new() -> Self {
        Self {
            baseline: None,
            clocks: [ClockEntry::default(); MAX_DOMAINS],
            volts: [None; MAX_DOMAINS],
            valid: false,
        }
    }

    /// An empty configuration marked valid, ready to be filled by a provider.
    pub fn for_baseline(key: BaselineKey) -> Self {
        Self {
            baseline: Some(key),
            valid: true,
            ..Self::new()
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    pub fn clock(&self, domain: Domain) -> &ClockEntry {
        &self.clocks[domain.index()]
    }

    pub fn clock_mut(&mut self, domain: Domain) -> &mut ClockEntry {
        &mut self.clocks[domain.index()]
    }

    pub fn freq(&self, domain: Domain) -> Option<u32> {
        self.clocks[domain.index()].freq
    }

    pub fn set_freq(&mut self, domain: Domain, freq: u32) {
        self.clocks[domain.index()].freq = Some(freq);
    }

    pub fn set_source(&mut self, domain: Domain, source: u8) {
        self.clocks[domain.index()].source = Some(source);
    }

    pub fn set_flags(&mut self, domain: Domain, flags: u32) {
        self.clocks[domain.index()].flags = flags;
    }

    pub fn volt(&self, domain: Domain) -> Option<u32> {
        self.volts[domain.index()]
    }

    pub fn set_volt(&mut self, domain: Domain, volt: u32) {
        self.volts[domain.index()] = Some(volt);
    }

    /// Domains with a programmed frequency.
    pub fn populated_clocks(&self) -> DomainBitmap {
        self.domains_where(|i| self.clocks[i].freq.is_some())
    }

    /// Rails with a programmed voltage.
    pub fn populated_volts(&self) -> DomainBitmap {
        self.domains_where(|i| self.volts[i].is_some())
    }

    fn domains_where(&self, pred: impl Fn(usize) -> bool) -> DomainBitmap {
        (0..MAX_DOMAINS as u8)
            .filter(|&i| pred(i as usize))
            .filter_map(Domain::new)
            .collect()
    }

    /// Drop clock programming for every domain outside `mask`.
    pub fn retain_clocks(&mut self, mask: DomainBitmap) {
        for domain in self.populated_clocks().iter() {
            if !mask.contains(domain) {
                self.clocks[domain.index()] = ClockEntry::default();
            }
        }
    }

    /// Human-readable one-domain-per-line rendering.
    pub fn describe(&self, domains: &DomainTable, flags: &FlagTable) -> String {
        let mut out = String::new();
        let baseline = self
            .baseline
            .map(|b| b.to_string())
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "baseline {baseline}{}\n",
            if self.valid { "" } else { " (invalid)" }
        ));
        for domain in self.populated_clocks().iter() {
            let entry = self.clock(domain);
            out.push_str(&format!(
                "  {:<8} {:>10}",
                domains.name(domain),
                entry.freq.unwrap_or_default()
            ));
            if let Some(source) = entry.source {
                out.push_str(&format!(" src={source}"));
            }
            if entry.flags != 0 {
                out.push_str(&format!(" flags={}", flags.names(entry.flags).join("|")));
            }
            out.push('\n');
        }
        for rail in self.populated_volts().iter() {
            out.push_str(&format!(
                "  {:<8} {:>10}uV\n",
                domains.name(rail),
                self.volt(rail).unwrap_or_default()
            ));
        }
        out
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}
