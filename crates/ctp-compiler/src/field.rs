//! Typed fields.
//!
//! A [`Field`] is a classified statement with its value parsed into a
//! [`Payload`]. Parsing looks at the statement alone; applying a field
//! writes its payload into the definition of the block that owns it.

use std::collections::BTreeSet;

use ctp_ir::defs::Definition;
use ctp_ir::diag::{Exception, ResultCode};
use ctp_ir::domain::{DomainBitmap, DomainTable};
use ctp_ir::flags::FlagTable;
use ctp_ir::operator::{parse_magnitude, parse_scalar, FlagOperator, OperatorError, ValueSpec};
use ctp_ir::provider::ClockSourceLookup;
use ctp_ir::pstate::BaselineKey;
use ctp_ir::types::{ExecutionMode, OrderMode, RamType};
use ctp_ir::units::{split_unit, Dimension, Unit};

use crate::statement::{keyword_info, BlockKinds, Keyword, KeywordInfo, Statement, StatementKind};

/// Tables a field needs to parse its value.
#[derive(Clone, Copy)]
pub struct ParseContext<'a> {
    pub domains: &'a DomainTable,
    pub flags: &'a FlagTable,
    pub sources: &'a dyn ClockSourceLookup,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToleranceValue {
    Percent(f64),
    Voltage(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Include { group: String, optional: bool },
    DryRun(bool),
    Name(String),
    Freq(Vec<ValueSpec>),
    Volt(Vec<ValueSpec>),
    Source(u8),
    Flags(FlagOperator),
    Alpha(f64),
    Beta(f64),
    Gamma(f64),
    Omega(f64),
    Iterations(u32),
    Curve(BaselineKey),
    Test(String),
    RmApi(bool),
    Tolerance(ToleranceValue),
    Order(OrderMode),
    Seed(u64),
    Begin(u64),
    End(u64),
    Enable(BTreeSet<String>),
    Disable(BTreeSet<String>),
    RamType(RamType),
    Prune(DomainBitmap),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub statement: Statement,
    pub payload: Payload,
}

impl Field {
    pub fn parse(statement: Statement, ctx: &ParseContext<'_>) -> Result<Field, Exception> {
        let StatementKind::Keyword(keyword) = statement.kind else {
            return Err(Exception::error("only keyword statements carry fields")
                .at(statement.location.clone()));
        };
        let payload = parse_payload(keyword, &statement, ctx)
            .map_err(|e| e.or_at(&statement.location))?;
        Ok(Field { statement, payload })
    }

    pub fn keyword(&self) -> Keyword {
        match self.statement.kind {
            StatementKind::Keyword(keyword) => keyword,
            // Fields are only built from keyword statements.
            _ => unreachable!("field without keyword"),
        }
    }

    pub fn info(&self) -> &'static KeywordInfo {
        keyword_info(self.keyword())
    }

    /// Block kind this field pins down, if any.
    pub fn defines(&self) -> BlockKinds {
        self.info().defines
    }

    /// Write this field's payload into `def`.
    pub fn apply(&self, def: &mut Definition) -> Result<(), Exception> {
        let domains = self.statement.domains;
        let fail = |message: String| {
            Exception::syntax(message).at(self.statement.location.clone())
        };
        match (&self.payload, def) {
            (Payload::Name(name), def) => def.set_name(name.clone()),

            (Payload::Freq(values), Definition::Offset(def)) => {
                for domain in domains.iter() {
                    let column = def.clocks.entry(domain).or_default();
                    column.values.extend_from_slice(values);
                }
            }
            (Payload::Volt(values), Definition::Offset(def)) => {
                for rail in domains.iter() {
                    def.volts.entry(rail).or_default().extend_from_slice(values);
                }
            }
            (Payload::Source(code), Definition::Offset(def)) => {
                for domain in domains.iter() {
                    def.clocks.entry(domain).or_default().overrides.source = Some(*code);
                }
            }
            (Payload::Flags(op), Definition::Offset(def)) => {
                for domain in domains.iter() {
                    let overrides = &mut def.clocks.entry(domain).or_default().overrides;
                    overrides.flags = overrides.flags.then(op);
                }
            }

            (Payload::Source(code), Definition::Sine(def)) => {
                for domain in domains.iter() {
                    def.domains.entry(domain).or_default().overrides.source = Some(*code);
                }
            }
            (Payload::Flags(op), Definition::Sine(def)) => {
                for domain in domains.iter() {
                    let overrides = &mut def.domains.entry(domain).or_default().overrides;
                    overrides.flags = overrides.flags.then(op);
                }
            }
            (Payload::Alpha(v), Definition::Sine(def)) => {
                for domain in domains.iter() {
                    def.domains.entry(domain).or_default().alpha = Some(*v);
                }
            }
            (Payload::Beta(v), Definition::Sine(def)) => {
                for domain in domains.iter() {
                    def.domains.entry(domain).or_default().beta = Some(*v);
                }
            }
            (Payload::Gamma(v), Definition::Sine(def)) => {
                for domain in domains.iter() {
                    def.domains.entry(domain).or_default().gamma = Some(*v);
                }
            }
            (Payload::Omega(v), Definition::Sine(def)) => {
                for domain in domains.iter() {
                    def.domains.entry(domain).or_default().omega = Some(*v);
                }
            }
            (Payload::Iterations(n), Definition::Sine(def)) => def.iterations = Some(*n),

            (Payload::Curve(key), Definition::Curve(def)) => {
                for domain in domains.iter() {
                    def.curves.insert(domain, *key);
                }
            }
            (Payload::Source(code), Definition::Curve(def)) => {
                for domain in domains.iter() {
                    def.overrides.entry(domain).or_default().source = Some(*code);
                }
            }
            (Payload::Flags(op), Definition::Curve(def)) => {
                for domain in domains.iter() {
                    let overrides = def.overrides.entry(domain).or_default();
                    overrides.flags = overrides.flags.then(op);
                }
            }

            (Payload::Test(reference), Definition::Trial(def)) => {
                def.references.push(reference.clone())
            }
            (Payload::RmApi(on), Definition::Trial(def)) => {
                def.mode = if *on {
                    ExecutionMode::RmApi
                } else {
                    ExecutionMode::Direct
                }
            }
            (Payload::Tolerance(value), Definition::Trial(def)) => match value {
                ToleranceValue::Percent(p) if domains.is_empty() => {
                    def.tolerance.freq_percent = Some(*p)
                }
                ToleranceValue::Percent(p) => {
                    for domain in domains.iter() {
                        def.tolerance.per_domain.insert(domain, *p);
                    }
                }
                ToleranceValue::Voltage(_) if !domains.is_empty() => {
                    return Err(fail(
                        "voltage tolerance cannot be set per clock domain".to_string(),
                    ));
                }
                ToleranceValue::Voltage(uv) => def.tolerance.volt_uv = Some(*uv),
            },
            (Payload::Order(order), Definition::Trial(def)) => def.order = *order,
            (Payload::Seed(seed), Definition::Trial(def)) => def.seed = Some(*seed),
            (Payload::Begin(begin), Definition::Trial(def)) => def.begin = Some(*begin),
            (Payload::End(end), Definition::Trial(def)) => def.end = Some(*end),
            (Payload::Enable(names), Definition::Trial(def)) => {
                def.enable.extend(names.iter().cloned())
            }
            (Payload::Disable(names), Definition::Trial(def)) => {
                def.disable.extend(names.iter().cloned())
            }
            (Payload::RamType(ram), Definition::Trial(def)) => def.ram_type = Some(*ram),
            (Payload::Prune(mask), Definition::Trial(def)) => def.prune = def.prune | *mask,

            (_, def) => {
                return Err(fail(format!(
                    "'{}' is not valid in a {} block",
                    self.info().name,
                    def.kind()
                )));
            }
        }
        Ok(())
    }
}

fn parse_payload(
    keyword: Keyword,
    statement: &Statement,
    ctx: &ParseContext<'_>,
) -> Result<Payload, Exception> {
    let value = statement.value.as_str();
    let syntax = |message: String| Exception::syntax(message);
    let operator = |e: OperatorError| {
        let code = match e {
            OperatorError::OutOfRange(_) => ResultCode::OutOfRange,
            _ => ResultCode::SyntaxError,
        };
        Exception::syntax(format!("'{}': {e}", keyword_info(keyword).name)).with_code(code)
    };
    let require_value = || {
        if value.is_empty() {
            Err(syntax(format!("'{}' requires a value", keyword_info(keyword).name)))
        } else {
            Ok(value)
        }
    };

    let payload = match keyword {
        Keyword::Include => {
            let group = require_value()?;
            match group.strip_prefix('?') {
                Some(rest) => Payload::Include {
                    group: rest.trim().to_string(),
                    optional: true,
                },
                None => Payload::Include {
                    group: group.to_string(),
                    optional: false,
                },
            }
        }
        Keyword::DryRun => Payload::DryRun(if value.is_empty() {
            true
        } else {
            parse_bool(value).map_err(syntax)?
        }),
        Keyword::Name => {
            let name = require_value()?;
            if !is_identifier(name) {
                return Err(syntax(format!("invalid name '{name}'")));
            }
            Payload::Name(name.to_string())
        }
        Keyword::Freq => {
            let dimension = dimension_of(statement.domains, ctx.domains)?;
            Payload::Freq(parse_values(require_value()?, dimension, ctx.flags).map_err(operator)?)
        }
        Keyword::Volt => Payload::Volt(
            parse_values(require_value()?, Dimension::Voltage, ctx.flags).map_err(operator)?,
        ),
        Keyword::Source => {
            let name = require_value()?;
            let code = ctx
                .sources
                .code(name)
                .or_else(|| name.parse::<u8>().ok())
                .ok_or_else(|| {
                    syntax(format!("unknown clock source '{name}'")).with_code(ResultCode::NotFound)
                })?;
            Payload::Source(code)
        }
        Keyword::Flags => {
            Payload::Flags(FlagOperator::parse(require_value()?, ctx.flags).map_err(operator)?)
        }
        Keyword::Alpha => Payload::Alpha(
            parse_magnitude(require_value()?, Dimension::Frequency).map_err(operator)?,
        ),
        Keyword::Beta => Payload::Beta(
            parse_magnitude(require_value()?, Dimension::Frequency).map_err(operator)?,
        ),
        Keyword::Gamma => Payload::Gamma(parse_scalar(require_value()?).map_err(operator)?),
        Keyword::Omega => Payload::Omega(parse_scalar(require_value()?).map_err(operator)?),
        Keyword::Iterations => Payload::Iterations(parse_int(require_value()?).map_err(syntax)?),
        Keyword::Vflwrve => Payload::Curve(require_value()?.parse().map_err(syntax)?),
        Keyword::Test => {
            let reference = require_value()?;
            if reference.split(':').any(|part| part.trim().is_empty()) {
                return Err(syntax(format!("malformed test reference '{reference}'")));
            }
            Payload::Test(
                reference
                    .split(':')
                    .map(str::trim)
                    .collect::<Vec<_>>()
                    .join(":"),
            )
        }
        Keyword::RmApi => Payload::RmApi(parse_bool(require_value()?).map_err(syntax)?),
        Keyword::Tolerance => Payload::Tolerance(parse_tolerance(require_value()?).map_err(operator)?),
        Keyword::Order => Payload::Order(require_value()?.parse().map_err(syntax)?),
        Keyword::Seed => Payload::Seed(parse_int(require_value()?).map_err(syntax)?),
        Keyword::Begin => Payload::Begin(parse_int(require_value()?).map_err(syntax)?),
        Keyword::End => Payload::End(parse_int(require_value()?).map_err(syntax)?),
        Keyword::Enable => Payload::Enable(parse_names(require_value()?)),
        Keyword::Disable => Payload::Disable(parse_names(require_value()?)),
        Keyword::RamType => Payload::RamType(require_value()?.parse().map_err(syntax)?),
        Keyword::Prune => Payload::Prune(ctx.domains.parse_list(require_value()?).map_err(syntax)?),
    };
    Ok(payload)
}

/// Comma-separated list of value specs: `+10%, -10%:ffr`.
fn parse_values(
    text: &str,
    dimension: Dimension,
    flags: &FlagTable,
) -> Result<Vec<ValueSpec>, OperatorError> {
    text.split(',')
        .map(|part| ValueSpec::parse(part, dimension, flags))
        .collect()
}

fn dimension_of(domains: DomainBitmap, table: &DomainTable) -> Result<Dimension, Exception> {
    let mut dimensions = domains
        .iter()
        .filter_map(|d| table.kind(d))
        .map(|k| k.dimension());
    let first = dimensions
        .next()
        .ok_or_else(|| Exception::syntax("missing domain"))?;
    if dimensions.any(|d| d != first) {
        return Err(Exception::syntax(
            "cannot mix clock and link-speed domains in one statement",
        ));
    }
    Ok(first)
}

fn parse_tolerance(text: &str) -> Result<ToleranceValue, OperatorError> {
    let (number, suffix) = split_unit(text);
    match suffix.and_then(Unit::lookup) {
        Some(Unit::Percent) => {
            let percent = parse_scalar(number)?;
            if percent < 0.0 {
                return Err(OperatorError::OutOfRange(text.to_string()));
            }
            Ok(ToleranceValue::Percent(percent))
        }
        Some(unit) if unit.dimension() == Some(Dimension::Voltage) => {
            let uv = parse_magnitude(text, Dimension::Voltage)?;
            if uv < 0.0 || uv > u32::MAX as f64 {
                return Err(OperatorError::OutOfRange(text.to_string()));
            }
            Ok(ToleranceValue::Voltage(uv.round() as u32))
        }
        Some(unit) => Err(OperatorError::UnitMismatch {
            unit: unit.suffix().to_string(),
            expected: Dimension::Voltage,
        }),
        None => match suffix {
            Some(s) => Err(OperatorError::UnknownUnit(s.to_string())),
            None => Err(OperatorError::InvalidNumber(format!(
                "{text} (tolerance needs '%' or a voltage unit)"
            ))),
        },
    }
}

fn parse_bool(text: &str) -> Result<bool, String> {
    match text {
        "yes" | "true" | "on" | "1" => Ok(true),
        "no" | "false" | "off" | "0" => Ok(false),
        other => Err(format!("expected yes/no, found '{other}'")),
    }
}

fn parse_int<T: std::str::FromStr>(text: &str) -> Result<T, String> {
    text.parse::<T>()
        .map_err(|_| format!("invalid integer '{text}'"))
}

fn parse_names(text: &str) -> BTreeSet<String> {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_identifier(name: &str) -> bool {
    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::Classifier;
    use ctp_ir::diag::SourceLocation;
    use ctp_ir::provider::SourceTable;

    fn field(line: &str) -> Result<Field, Exception> {
        let domains = DomainTable::default();
        let flags = FlagTable::default();
        let sources = SourceTable::default();
        let ctx = ParseContext {
            domains: &domains,
            flags: &flags,
            sources: &sources,
        };
        let statement = Classifier::new(&domains)
            .classify(line, SourceLocation::new("t.ctp", 3))
            .unwrap();
        Field::parse(statement, &ctx)
    }

    #[test]
    fn test_freq_list() {
        let f = field("gpc.freq = +10%, -10%:ffr").unwrap();
        let Payload::Freq(values) = &f.payload else {
            panic!("expected freq payload");
        };
        assert_eq!(values.len(), 2);
        assert!(!values[1].flags.is_empty());
    }

    #[test]
    fn test_link_speed_is_unitless() {
        let f = field("pcigen.freq = 4").unwrap();
        let Payload::Freq(values) = &f.payload else {
            panic!("expected freq payload");
        };
        assert_eq!(values[0].op.dimension, Dimension::Count);
        assert!(field("pcigen.freq = 4GHz").is_err());
    }

    #[test]
    fn test_optional_include() {
        let f = field("include = ?extra").unwrap();
        assert_eq!(
            f.payload,
            Payload::Include {
                group: "extra".to_string(),
                optional: true
            }
        );
    }

    #[test]
    fn test_source_by_name() {
        let f = field("gpc.source = nafll").unwrap();
        assert_eq!(f.payload, Payload::Source(2));
        let e = field("gpc.source = warp").unwrap_err();
        assert_eq!(e.code, Some(ResultCode::NotFound));
    }

    #[test]
    fn test_tolerance_forms() {
        assert_eq!(
            field("tolerance = 5%").unwrap().payload,
            Payload::Tolerance(ToleranceValue::Percent(5.0))
        );
        assert_eq!(
            field("tolerance = 25mV").unwrap().payload,
            Payload::Tolerance(ToleranceValue::Voltage(25_000))
        );
        assert!(field("tolerance = 5MHz").is_err());
    }

    #[test]
    fn test_error_carries_location() {
        let e = field("gpc.freq = +10parsec").unwrap_err();
        assert_eq!(e.location, Some(SourceLocation::new("t.ctp", 3)));
    }

    #[test]
    fn test_apply_rejects_wrong_block() {
        let f = field("test = init:a").unwrap();
        let mut def = Definition::empty(ctp_ir::DefinitionKind::Offset);
        assert!(f.apply(&mut def).is_err());
    }
}
