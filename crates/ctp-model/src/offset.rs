//! Offset tables: per-domain lists of operators combined as a cartesian
//! product.

use ctp_ir::defs::{DomainOverrides, OffsetDef};
use ctp_ir::diag::{Exception, ExceptionList, ResultCode};
use ctp_ir::domain::{Domain, DomainBitmap, DomainTable};
use ctp_ir::operator::{OperatorError, ValueSpec};
use ctp_ir::pstate::Configuration;
use ctp_ir::units::ValueRange;

use crate::source::Variation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Clock,
    Voltage,
}

#[derive(Debug, Clone)]
struct Column {
    domain: Domain,
    name: String,
    target: Target,
    range: ValueRange,
    values: Vec<ValueSpec>,
    overrides: DomainOverrides,
}

impl Column {
    /// A column with only source/flag overrides still counts once.
    fn len(&self) -> u64 {
        self.values.len().max(1) as u64
    }
}

#[derive(Debug, Clone)]
pub struct OffsetTable {
    name: String,
    columns: Vec<Column>,
    domains: DomainBitmap,
    cardinality: u64,
}

impl OffsetTable {
    pub fn build(def: &OffsetDef, table: &DomainTable, diags: &mut ExceptionList) -> Option<Self> {
        if def.is_empty() {
            diags.push(Exception::error(format!(
                "offset table '{}' defines no domains",
                def.name
            )));
            return None;
        }

        let range_for = |domain: Domain| {
            let dimension = table
                .kind(domain)
                .map(|k| k.dimension().range())
                .unwrap_or(ValueRange::new(0, 0));
            ValueRange::new(dimension.min, table.max_value(domain).min(dimension.max))
        };

        let mut columns: Vec<Column> = def
            .clocks
            .iter()
            .map(|(&domain, column)| Column {
                domain,
                name: table.name(domain).to_string(),
                target: Target::Clock,
                range: range_for(domain),
                values: column.values.clone(),
                overrides: column.overrides,
            })
            .collect();
        columns.extend(def.volts.iter().map(|(&rail, values)| Column {
            domain: rail,
            name: table.name(rail).to_string(),
            target: Target::Voltage,
            range: range_for(rail),
            values: values.clone(),
            overrides: DomainOverrides::default(),
        }));

        let Some(cardinality) = columns
            .iter()
            .try_fold(1u64, |acc, c| acc.checked_mul(c.len()))
        else {
            diags.push(
                Exception::error(format!(
                    "offset table '{}': variation count overflows",
                    def.name
                ))
                .with_code(ResultCode::InvalidArgument),
            );
            return None;
        };

        Some(Self {
            name: def.name.clone(),
            domains: def.domains(),
            columns,
            cardinality,
        })
    }

    /// Per-column lengths in decomposition order.
    pub fn radices(&self) -> Vec<u64> {
        self.columns.iter().map(Column::len).collect()
    }
}

impl Variation for OffsetTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn cardinality(&self) -> u64 {
        self.cardinality
    }

    fn domains(&self) -> DomainBitmap {
        self.domains
    }

    fn apply(
        &self,
        config: &mut Configuration,
        index: u64,
        mask: DomainBitmap,
        diags: &mut ExceptionList,
    ) {
        if index >= self.cardinality {
            diags.push(
                Exception::error(format!(
                    "index {index} out of range for offset table '{}' ({} variations)",
                    self.name, self.cardinality
                ))
                .with_code(ResultCode::IndexOutOfRange),
            );
            return;
        }

        let mut rest = index;
        for column in &self.columns {
            let len = column.len();
            let sub = (rest % len) as usize;
            rest /= len;
            // Pruned columns still consume their digit.
            if !mask.contains(column.domain) {
                continue;
            }
            match column.target {
                Target::Clock => apply_clock(&self.name, column, sub, config, diags),
                Target::Voltage => apply_volt(&self.name, column, sub, config, diags),
            }
        }
        if rest != 0 {
            diags.push(
                Exception::error(format!(
                    "offset table '{}': index {index} leaves remainder {rest}",
                    self.name
                ))
                .with_code(ResultCode::IndexOutOfRange),
            );
        }
    }
}

fn apply_clock(
    table: &str,
    column: &Column,
    sub: usize,
    config: &mut Configuration,
    diags: &mut ExceptionList,
) {
    let domain = column.domain;
    let entry = column.values.get(sub);
    if let Some(spec) = entry {
        match settle(table, column, spec, config.freq(domain)) {
            Ok(freq) => config.set_freq(domain, freq),
            Err(e) => {
                diags.push(e);
                return;
            }
        }
    }
    if let Some(source) = column.overrides.source {
        config.set_source(domain, source);
    }
    let flags = entry.map_or(column.overrides.flags, |spec| {
        column.overrides.flags.then(&spec.flags)
    });
    if !flags.is_empty() {
        let prior = config.clock(domain).flags;
        config.set_flags(domain, flags.apply(prior));
    }
}

fn apply_volt(
    table: &str,
    column: &Column,
    sub: usize,
    config: &mut Configuration,
    diags: &mut ExceptionList,
) {
    let Some(spec) = column.values.get(sub) else {
        return;
    };
    match settle(table, column, spec, config.volt(column.domain)) {
        Ok(volt) => config.set_volt(column.domain, volt),
        Err(e) => diags.push(e),
    }
}

fn settle(
    table: &str,
    column: &Column,
    spec: &ValueSpec,
    prior: Option<u32>,
) -> Result<u32, Exception> {
    let value = spec.op.evaluate(prior).map_err(|e| match e {
        OperatorError::PriorValueRequired(_) => Exception::error(format!(
            "{table}: {} has no prior value for relative operator {}",
            column.name, spec.op
        ))
        .with_code(ResultCode::PriorValueRequired),
        other => Exception::error(format!("{table}: {}: {other}", column.name))
            .with_code(ResultCode::InvalidArgument),
    })?;
    column.range.settle(value).ok_or_else(|| {
        Exception::skipped(format!(
            "{table}: {} value {value} outside [{}, {}]",
            column.name, column.range.min, column.range.max
        ))
        .with_code(ResultCode::OutOfRange)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctp_ir::flags::FlagTable;
    use ctp_ir::pstate::BaselineKey;
    use ctp_ir::units::Dimension;

    fn spec(text: &str) -> ValueSpec {
        ValueSpec::parse(text, Dimension::Frequency, &FlagTable::default()).unwrap()
    }

    #[test]
    fn test_relative_without_prior() {
        let table = DomainTable::default();
        let gpc = table.lookup("gpc").unwrap();
        let mut def = OffsetDef {
            name: "t".to_string(),
            ..Default::default()
        };
        def.clocks.entry(gpc).or_default().values.push(spec("+10%"));
        let mut diags = ExceptionList::new();
        let offsets = OffsetTable::build(&def, &table, &mut diags).unwrap();

        let mut config = Configuration::for_baseline(BaselineKey::Init);
        offsets.apply(&mut config, 0, DomainBitmap::ALL, &mut diags);
        assert_eq!(diags.result_code(), Some(ResultCode::PriorValueRequired));
        assert_eq!(config.freq(gpc), None);
    }

    #[test]
    fn test_overrides_only_column_counts_once() {
        let table = DomainTable::default();
        let gpc = table.lookup("gpc").unwrap();
        let sys = table.lookup("sys").unwrap();
        let mut def = OffsetDef {
            name: "t".to_string(),
            ..Default::default()
        };
        def.clocks.entry(gpc).or_default().values = vec![spec("1GHz"), spec("2GHz")];
        def.clocks.entry(sys).or_default().overrides.source = Some(4);
        let mut diags = ExceptionList::new();
        let offsets = OffsetTable::build(&def, &table, &mut diags).unwrap();
        assert_eq!(offsets.cardinality(), 2);

        let mut config = Configuration::for_baseline(BaselineKey::Init);
        offsets.apply(&mut config, 1, DomainBitmap::ALL, &mut diags);
        assert!(diags.is_empty());
        assert_eq!(config.freq(gpc), Some(2_000_000));
        assert_eq!(config.clock(sys).source, Some(4));
    }

    #[test]
    fn test_overflowing_product_rejected() {
        let table = DomainTable::default();
        let mut def = OffsetDef {
            name: "huge".to_string(),
            ..Default::default()
        };
        let values: Vec<ValueSpec> = (1..=64).map(|i| spec(&format!("+{i}"))).collect();
        for name in ["gpc", "sys", "xbar", "ltc", "nvd", "host", "disp", "hub", "dram", "util", "pwr"] {
            let domain = table.lookup(name).unwrap();
            def.clocks.entry(domain).or_default().values = values.clone();
        }
        let mut diags = ExceptionList::new();
        assert!(OffsetTable::build(&def, &table, &mut diags).is_none());
        assert_eq!(diags.severity(), Some(ctp_ir::Severity::Error));
        assert_eq!(diags.result_code(), Some(ResultCode::InvalidArgument));
        assert!(diags.iter().any(|e| e.message.contains("overflows")));
    }

    #[test]
    fn test_domain_max_bounds_result() {
        let table = DomainTable::default();
        let host = table.lookup("host").unwrap();
        let mut def = OffsetDef {
            name: "t".to_string(),
            ..Default::default()
        };
        def.clocks.entry(host).or_default().values.push(spec("2GHz"));
        let mut diags = ExceptionList::new();
        let offsets = OffsetTable::build(&def, &table, &mut diags).unwrap();
        let mut config = Configuration::for_baseline(BaselineKey::Init);
        offsets.apply(&mut config, 0, DomainBitmap::ALL, &mut diags);
        assert_eq!(diags.severity(), Some(ctp_ir::Severity::Skipped));
        assert_eq!(config.freq(host), None);
    }
}
