//! Clock and voltage domain tables.
//!
//! A [`Domain`] is a bit index below [`MAX_DOMAINS`]; clock domains and
//! voltage rails share one index space so a single [`DomainBitmap`] can
//! address any mix of them. The [`DomainTable`] maps names to indices and is
//! built once (from defaults or configuration) and passed by reference.

use std::collections::HashMap;
use std::fmt;
use std::ops::{BitAnd, BitOr, Not};

use serde::{Deserialize, Serialize};

use crate::units::Dimension;

pub const MAX_DOMAINS: usize = 32;

/// Index of one clock domain or voltage rail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8")]
pub struct Domain(u8);

impl TryFrom<u8> for Domain {
    type Error = String;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        Domain::new(index).ok_or_else(|| format!("domain index {index} out of range"))
    }
}

impl Domain {
    pub fn new(index: u8) -> Option<Self> {
        ((index as usize) < MAX_DOMAINS).then_some(Self(index))
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn bit(self) -> u32 {
        1u32 << self.0
    }
}

/// Set of domains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DomainBitmap(u32);

impl DomainBitmap {
    pub const EMPTY: DomainBitmap = DomainBitmap(0);
    pub const ALL: DomainBitmap = DomainBitmap(u32::MAX);

    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn single(domain: Domain) -> Self {
        Self(domain.bit())
    }

    pub fn contains(self, domain: Domain) -> bool {
        self.0 & domain.bit() != 0
    }

    pub fn insert(&mut self, domain: Domain) {
        self.0 |= domain.bit();
    }

    pub fn remove(&mut self, domain: Domain) {
        self.0 &= !domain.bit();
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn count(self) -> u32 {
        self.0.count_ones()
    }

    /// Domains in ascending index order.
    pub fn iter(self) -> impl Iterator<Item = Domain> {
        (0..MAX_DOMAINS as u8)
            .filter(move |&i| self.0 & (1u32 << i) != 0)
            .map(Domain)
    }
}

impl BitOr for DomainBitmap {
    type Output = DomainBitmap;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitAnd for DomainBitmap {
    type Output = DomainBitmap;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Not for DomainBitmap {
    type Output = DomainBitmap;

    fn not(self) -> Self {
        Self(!self.0)
    }
}

impl FromIterator<Domain> for DomainBitmap {
    fn from_iter<T: IntoIterator<Item = Domain>>(iter: T) -> Self {
        let mut bitmap = DomainBitmap::EMPTY;
        for domain in iter {
            bitmap.insert(domain);
        }
        bitmap
    }
}

/// What a domain carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainKind {
    /// Clock domain, frequency in kHz.
    Clock,
    /// Link-speed domain, unit-less generation number.
    LinkSpeed,
    /// Voltage rail, voltage in µV.
    Voltage,
}

impl DomainKind {
    pub fn is_clock(self) -> bool {
        matches!(self, DomainKind::Clock | DomainKind::LinkSpeed)
    }

    pub fn dimension(self) -> Dimension {
        match self {
            DomainKind::Clock => Dimension::Frequency,
            DomainKind::LinkSpeed => Dimension::Count,
            DomainKind::Voltage => Dimension::Voltage,
        }
    }
}

/// One row of the domain table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainInfo {
    pub name: String,
    pub index: u8,
    pub kind: DomainKind,
    /// Upper bound used to clamp derived values (kHz, generation or µV).
    #[serde(default)]
    pub max: Option<u32>,
    /// Voltage rail supplying a clock domain.
    #[serde(default)]
    pub rail: Option<String>,
}

impl DomainInfo {
    fn new(name: &str, index: u8, kind: DomainKind, max: u32, rail: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            index,
            kind,
            max: Some(max),
            rail: rail.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DomainTableError {
    #[error("Domain index {index} for '{name}' is out of range (max {})", MAX_DOMAINS - 1)]
    IndexOutOfRange { name: String, index: u8 },

    #[error("Duplicate domain name '{name}'")]
    DuplicateName { name: String },

    #[error("Duplicate domain index {index} ('{first}' and '{second}')")]
    DuplicateIndex {
        index: u8,
        first: String,
        second: String,
    },

    #[error("Domain '{domain}' names unknown or non-voltage rail '{rail}'")]
    BadRail { domain: String, rail: String },

    #[error("Invalid domain name '{name}'")]
    InvalidName { name: String },
}

/// Name ↔ index map for every registered domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<DomainInfo>", into = "Vec<DomainInfo>")]
pub struct DomainTable {
    entries: Vec<DomainInfo>,
    by_name: HashMap<String, Domain>,
    by_index: HashMap<u8, usize>,
}

impl DomainTable {
    pub fn new(entries: Vec<DomainInfo>) -> Result<Self, DomainTableError> {
        let mut by_name = HashMap::new();
        let mut by_index: HashMap<u8, usize> = HashMap::new();
        let mut entries = entries;
        for entry in &mut entries {
            entry.name = entry.name.to_lowercase();
        }

        for (pos, entry) in entries.iter().enumerate() {
            let domain = Domain::new(entry.index).ok_or_else(|| {
                DomainTableError::IndexOutOfRange {
                    name: entry.name.clone(),
                    index: entry.index,
                }
            })?;
            if entry.name.is_empty()
                || !entry
                    .name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                return Err(DomainTableError::InvalidName {
                    name: entry.name.clone(),
                });
            }
            if by_name.insert(entry.name.clone(), domain).is_some() {
                return Err(DomainTableError::DuplicateName {
                    name: entry.name.clone(),
                });
            }
            if let Some(&first) = by_index.get(&entry.index) {
                return Err(DomainTableError::DuplicateIndex {
                    index: entry.index,
                    first: entries[first].name.clone(),
                    second: entry.name.clone(),
                });
            }
            by_index.insert(entry.index, pos);
        }

        for entry in &entries {
            if let Some(rail) = &entry.rail {
                let rail = rail.to_lowercase();
                let ok = by_name
                    .get(&rail)
                    .and_then(|d| by_index.get(&(d.index() as u8)))
                    .is_some_and(|&pos| entries[pos].kind == DomainKind::Voltage);
                if !ok {
                    return Err(DomainTableError::BadRail {
                        domain: entry.name.clone(),
                        rail,
                    });
                }
            }
        }

        Ok(Self {
            entries,
            by_name,
            by_index,
        })
    }

    pub fn lookup(&self, name: &str) -> Option<Domain> {
        self.by_name.get(&name.to_lowercase()).copied()
    }

    pub fn info(&self, domain: Domain) -> Option<&DomainInfo> {
        self.by_index
            .get(&(domain.index() as u8))
            .map(|&pos| &self.entries[pos])
    }

    pub fn name(&self, domain: Domain) -> &str {
        self.info(domain).map(|i| i.name.as_str()).unwrap_or("?")
    }

    pub fn kind(&self, domain: Domain) -> Option<DomainKind> {
        self.info(domain).map(|i| i.kind)
    }

    /// Upper bound for values of this domain, falling back to the physical
    /// limit of its dimension.
    pub fn max_value(&self, domain: Domain) -> u32 {
        match self.info(domain) {
            Some(info) => info
                .max
                .unwrap_or_else(|| info.kind.dimension().range().max),
            None => 0,
        }
    }

    pub fn rail_of(&self, domain: Domain) -> Option<Domain> {
        self.info(domain)
            .and_then(|i| i.rail.as_deref())
            .and_then(|rail| self.lookup(rail))
    }

    pub fn entries(&self) -> &[DomainInfo] {
        &self.entries
    }

    /// All registered domains of the given kinds.
    pub fn of_kind(&self, pred: impl Fn(DomainKind) -> bool) -> DomainBitmap {
        self.entries
            .iter()
            .filter(|e| pred(e.kind))
            .filter_map(|e| Domain::new(e.index))
            .collect()
    }

    pub fn clocks(&self) -> DomainBitmap {
        self.of_kind(DomainKind::is_clock)
    }

    pub fn voltages(&self) -> DomainBitmap {
        self.of_kind(|k| k == DomainKind::Voltage)
    }

    /// Parse a list of domain names separated by `.`, `,` or whitespace.
    pub fn parse_list(&self, text: &str) -> Result<DomainBitmap, String> {
        let mut bitmap = DomainBitmap::EMPTY;
        for name in text
            .split(|c: char| c == '.' || c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
        {
            let domain = self
                .lookup(name)
                .ok_or_else(|| format!("unknown domain '{name}'"))?;
            bitmap.insert(domain);
        }
        if bitmap.is_empty() {
            return Err("empty domain list".to_string());
        }
        Ok(bitmap)
    }

    /// Render a bitmap as `name.name.name`.
    pub fn format(&self, bitmap: DomainBitmap) -> String {
        bitmap
            .iter()
            .map(|d| self.name(d).to_string())
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl Default for DomainTable {
    fn default() -> Self {
        use DomainKind::{Clock, LinkSpeed, Voltage};
        let entries = vec![
            DomainInfo::new("gpc", 0, Clock, 3_000_000, Some("logic")),
            DomainInfo::new("sys", 1, Clock, 2_500_000, Some("logic")),
            DomainInfo::new("xbar", 2, Clock, 2_500_000, Some("logic")),
            DomainInfo::new("ltc", 3, Clock, 2_500_000, Some("logic")),
            DomainInfo::new("nvd", 4, Clock, 2_000_000, Some("logic")),
            DomainInfo::new("host", 5, Clock, 1_000_000, None),
            DomainInfo::new("disp", 6, Clock, 2_000_000, None),
            DomainInfo::new("hub", 7, Clock, 1_500_000, None),
            DomainInfo::new("dram", 8, Clock, 12_000_000, Some("msvdd")),
            DomainInfo::new("util", 9, Clock, 500_000, None),
            DomainInfo::new("pwr", 10, Clock, 1_000_000, None),
            DomainInfo::new("pcigen", 11, LinkSpeed, 5, None),
            DomainInfo::new("logic", 24, Voltage, 1_200_000, None),
            DomainInfo::new("sram", 25, Voltage, 1_250_000, None),
            DomainInfo::new("msvdd", 26, Voltage, 1_350_000, None),
        ];
        // The built-in rows are consistent by construction.
        match DomainTable::new(entries) {
            Ok(table) => table,
            Err(e) => unreachable!("default domain table is invalid: {e}"),
        }
    }
}

impl TryFrom<Vec<DomainInfo>> for DomainTable {
    type Error = DomainTableError;

    fn try_from(entries: Vec<DomainInfo>) -> Result<Self, Self::Error> {
        DomainTable::new(entries)
    }
}

impl From<DomainTable> for Vec<DomainInfo> {
    fn from(table: DomainTable) -> Self {
        table.entries
    }
}

impl fmt::Display for DomainBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}
