//! Signal-path flag names.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagInfo {
    pub name: String,
    pub bit: u8,
}

/// Name ↔ bit map for per-domain flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlagTable {
    entries: Vec<FlagInfo>,
}

impl FlagTable {
    pub fn new(entries: Vec<FlagInfo>) -> Self {
        let entries = entries
            .into_iter()
            .filter(|e| e.bit < 32)
            .map(|e| FlagInfo {
                name: e.name.to_lowercase(),
                bit: e.bit,
            })
            .collect();
        Self { entries }
    }

    /// Mask for a flag name.
    pub fn lookup(&self, name: &str) -> Option<u32> {
        let name = name.to_lowercase();
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| 1u32 << e.bit)
    }

    /// Names of the flags set in `mask`, in table order. Unnamed bits are
    /// rendered as `bitN`.
    pub fn names(&self, mask: u32) -> Vec<String> {
        let mut names = Vec::new();
        let mut rest = mask;
        for entry in &self.entries {
            let bit = 1u32 << entry.bit;
            if mask & bit != 0 {
                names.push(entry.name.clone());
                rest &= !bit;
            }
        }
        for i in 0..32 {
            if rest & (1u32 << i) != 0 {
                names.push(format!("bit{i}"));
            }
        }
        names
    }

    pub fn entries(&self) -> &[FlagInfo] {
        &self.entries
    }
}

impl Default for FlagTable {
    fn default() -> Self {
        let named = [
            ("ffr", 0),
            ("fr", 1),
            ("vr", 2),
            ("pll", 3),
            ("bypass", 4),
            ("noramp", 5),
            ("nocm", 6),
            ("slowdown", 7),
        ];
        Self::new(
            named
                .iter()
                .map(|&(name, bit)| FlagInfo {
                    name: name.to_string(),
                    bit,
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_and_names() {
        let table = FlagTable::default();
        let noramp = table.lookup("NoRamp").unwrap();
        let ffr = table.lookup("ffr").unwrap();
        assert_eq!(table.names(noramp | ffr), vec!["ffr", "noramp"]);
        assert_eq!(table.names(1 << 20), vec!["bit20"]);
        assert!(table.lookup("warp").is_none());
    }
}
