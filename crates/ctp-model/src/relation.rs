//! Master/slave clock-domain relationships.
//!
//! Programming a master domain from a sampled curve also fixes the
//! frequency of its slaves, either as a percentage of the master or by a
//! step table keyed on the master frequency.

use serde::{Deserialize, Serialize};

use ctp_ir::domain::{Domain, DomainBitmap, DomainTable};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RelationError {
    #[error("Unknown domain '{0}' in slave relation")]
    UnknownDomain(String),

    #[error("Domain '{0}' in slave relation is not a clock domain")]
    NotClock(String),

    #[error("Domain '{0}' cannot be its own slave")]
    SelfRelation(String),

    #[error("Domain '{slave}' is a slave of both '{first}' and '{second}'")]
    OverlappingSlave {
        slave: String,
        first: String,
        second: String,
    },

    #[error("Step table for '{0}' is empty")]
    EmptyTable(String),
}

/// One relationship as written in configuration, with domains by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SlaveRelation {
    /// `slave = master * percent / 100`.
    Ratio {
        master: String,
        slave: String,
        percent: u32,
    },
    /// `slave` takes the value of the last step whose threshold does not
    /// exceed the master frequency.
    Table {
        master: String,
        slave: String,
        steps: Vec<(u32, u32)>,
    },
}

impl SlaveRelation {
    fn names(&self) -> (&str, &str) {
        match self {
            SlaveRelation::Ratio { master, slave, .. } => (master, slave),
            SlaveRelation::Table { master, slave, .. } => (master, slave),
        }
    }
}

/// Relationships shipped with the built-in domain table.
pub fn default_relations() -> Vec<SlaveRelation> {
    vec![
        SlaveRelation::Ratio {
            master: "gpc".to_string(),
            slave: "xbar".to_string(),
            percent: 80,
        },
        SlaveRelation::Ratio {
            master: "gpc".to_string(),
            slave: "ltc".to_string(),
            percent: 75,
        },
        SlaveRelation::Table {
            master: "dram".to_string(),
            slave: "pcigen".to_string(),
            steps: vec![(0, 1), (5_000_000, 2), (8_000_000, 3), (10_000_000, 4)],
        },
    ]
}

#[derive(Debug, Clone, PartialEq)]
enum Rule {
    Ratio(u32),
    Table(Vec<(u32, u32)>),
}

#[derive(Debug, Clone, PartialEq)]
struct Resolved {
    master: Domain,
    slave: Domain,
    slave_max: u32,
    rule: Rule,
}

impl Resolved {
    fn derive(&self, master_freq: u32) -> u32 {
        let value = match &self.rule {
            Rule::Ratio(percent) => {
                (master_freq as u64 * *percent as u64 / 100).min(u32::MAX as u64) as u32
            }
            Rule::Table(steps) => steps
                .iter()
                .take_while(|(threshold, _)| *threshold <= master_freq)
                .last()
                .or_else(|| steps.first())
                .map_or(0, |&(_, value)| value),
        };
        value.min(self.slave_max)
    }
}

/// Relationships resolved against a domain table. A slave has exactly one
/// master.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlaveRelations {
    rules: Vec<Resolved>,
}

impl SlaveRelations {
    pub fn resolve(
        relations: &[SlaveRelation],
        domains: &DomainTable,
    ) -> Result<Self, RelationError> {
        let clock = |name: &str| -> Result<Domain, RelationError> {
            let domain = domains
                .lookup(name)
                .ok_or_else(|| RelationError::UnknownDomain(name.to_string()))?;
            match domains.kind(domain) {
                Some(kind) if kind.is_clock() => Ok(domain),
                _ => Err(RelationError::NotClock(name.to_string())),
            }
        };

        let mut rules: Vec<Resolved> = Vec::with_capacity(relations.len());
        for relation in relations {
            let (master_name, slave_name) = relation.names();
            let master = clock(master_name)?;
            let slave = clock(slave_name)?;
            if master == slave {
                return Err(RelationError::SelfRelation(slave_name.to_string()));
            }
            if let Some(existing) = rules.iter().find(|r| r.slave == slave) {
                return Err(RelationError::OverlappingSlave {
                    slave: slave_name.to_string(),
                    first: domains.name(existing.master).to_string(),
                    second: master_name.to_string(),
                });
            }
            let rule = match relation {
                SlaveRelation::Ratio { percent, .. } => Rule::Ratio(*percent),
                SlaveRelation::Table { steps, .. } => {
                    if steps.is_empty() {
                        return Err(RelationError::EmptyTable(slave_name.to_string()));
                    }
                    let mut steps = steps.clone();
                    steps.sort_by_key(|&(threshold, _)| threshold);
                    Rule::Table(steps)
                }
            };
            rules.push(Resolved {
                master,
                slave,
                slave_max: domains.max_value(slave),
                rule,
            });
        }
        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Every domain that is the slave of some master in `masters`.
    pub fn slaves_of(&self, masters: DomainBitmap) -> DomainBitmap {
        self.rules
            .iter()
            .filter(|r| masters.contains(r.master))
            .map(|r| r.slave)
            .collect()
    }

    /// Slave frequencies implied by programming `master` at `freq`.
    pub fn derive(&self, master: Domain, freq: u32) -> Vec<(Domain, u32)> {
        self.rules
            .iter()
            .filter(|r| r.master == master)
            .map(|r| (r.slave, r.derive(freq)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_relations_resolve() {
        let table = DomainTable::default();
        let relations = SlaveRelations::resolve(&default_relations(), &table).unwrap();
        assert_eq!(relations.len(), 3);
        let gpc = table.lookup("gpc").unwrap();
        let xbar = table.lookup("xbar").unwrap();
        let ltc = table.lookup("ltc").unwrap();
        let derived = relations.derive(gpc, 2_000_000);
        assert!(derived.contains(&(xbar, 1_600_000)));
        assert!(derived.contains(&(ltc, 1_500_000)));
    }

    #[test]
    fn test_ratio_clamped_to_slave_max() {
        let table = DomainTable::default();
        let relations = SlaveRelations::resolve(
            &[SlaveRelation::Ratio {
                master: "dram".to_string(),
                slave: "host".to_string(),
                percent: 50,
            }],
            &table,
        )
        .unwrap();
        let dram = table.lookup("dram").unwrap();
        let host = table.lookup("host").unwrap();
        assert_eq!(relations.derive(dram, 9_000_000), vec![(host, 1_000_000)]);
    }

    #[test]
    fn test_table_is_unitless_and_stepped() {
        let table = DomainTable::default();
        let relations = SlaveRelations::resolve(&default_relations(), &table).unwrap();
        let dram = table.lookup("dram").unwrap();
        let pcigen = table.lookup("pcigen").unwrap();
        assert_eq!(relations.derive(dram, 4_000_000), vec![(pcigen, 1)]);
        assert_eq!(relations.derive(dram, 8_000_000), vec![(pcigen, 3)]);
        assert_eq!(relations.derive(dram, 11_000_000), vec![(pcigen, 4)]);
    }

    #[test]
    fn test_overlapping_slave_rejected() {
        let table = DomainTable::default();
        let mut relations = default_relations();
        relations.push(SlaveRelation::Table {
            master: "sys".to_string(),
            slave: "xbar".to_string(),
            steps: vec![(0, 1_000_000)],
        });
        let err = SlaveRelations::resolve(&relations, &table).unwrap_err();
        assert!(matches!(err, RelationError::OverlappingSlave { ref first, .. } if first == "gpc"));
    }

    #[test]
    fn test_voltage_domain_rejected() {
        let table = DomainTable::default();
        let err = SlaveRelations::resolve(
            &[SlaveRelation::Ratio {
                master: "gpc".to_string(),
                slave: "logic".to_string(),
                percent: 10,
            }],
            &table,
        )
        .unwrap_err();
        assert_eq!(err, RelationError::NotClock("logic".to_string()));
    }

    #[test]
    fn test_relation_json_shape() {
        let json = r#"[{"kind":"table","master":"dram","slave":"pcigen","steps":[[0,1],[6000000,2]]}]"#;
        let parsed: Vec<SlaveRelation> = serde_json::from_str(json).unwrap();
        assert!(matches!(&parsed[0], SlaveRelation::Table { steps, .. } if steps.len() == 2));
    }
}
