//! Value expressions: numeric operators and flag operators.
//!
//! A numeric operator is absolute (`1GHz`), additive (`+50MHz`) or
//! multiplicative (`-10%`). Relative operators need a prior value to act on.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::flags::FlagTable;
use crate::units::{split_unit, Dimension, Unit};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OperatorError {
    #[error("Empty value")]
    Empty,

    #[error("Invalid number '{0}'")]
    InvalidNumber(String),

    #[error("Unknown unit '{0}'")]
    UnknownUnit(String),

    #[error("Unit '{unit}' is not a {expected} unit")]
    UnitMismatch { unit: String, expected: Dimension },

    #[error("Value '{0}' is out of range")]
    OutOfRange(String),

    #[error("Unknown flag '{0}'")]
    UnknownFlag(String),

    #[error("Prior value required for relative operator '{0}'")]
    PriorValueRequired(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum OperatorKind {
    /// Replace the prior value.
    Absolute(u32),
    /// Add a signed delta to the prior value.
    Additive(i64),
    /// Scale the prior value by `(100 + percent) / 100`.
    Scale(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericOperator {
    pub dimension: Dimension,
    pub kind: OperatorKind,
}

impl NumericOperator {
    pub fn absolute(dimension: Dimension, value: u32) -> Self {
        Self {
            dimension,
            kind: OperatorKind::Absolute(value),
        }
    }

    /// Parse `["+"|"-"] number [unit]`.
    ///
    /// A leading sign makes the operator relative. `N%` without a sign scales
    /// to N percent of the prior value.
    pub fn parse(text: &str, dimension: Dimension) -> Result<Self, OperatorError> {
        let (sign, body) = split_sign(text)?;
        let (number, suffix) = split_unit(body);
        let magnitude = parse_unsigned(number)?;
        let unit = suffix.map(parse_unit).transpose()?;

        if unit == Some(Unit::Percent) {
            let percent = match sign {
                Some(sign) => sign * magnitude,
                None => magnitude - 100.0,
            };
            return Ok(Self {
                dimension,
                kind: OperatorKind::Scale(percent),
            });
        }

        let value = magnitude * unit_scale(unit, dimension)?;
        if value > u32::MAX as f64 {
            return Err(OperatorError::OutOfRange(text.trim().to_string()));
        }
        let kind = match sign {
            None => OperatorKind::Absolute(value.round() as u32),
            Some(sign) => OperatorKind::Additive((sign * value).round() as i64),
        };
        Ok(Self { dimension, kind })
    }

    pub fn is_absolute(&self) -> bool {
        matches!(self.kind, OperatorKind::Absolute(_))
    }

    /// Exact result of applying the operator to `prior`.
    pub fn evaluate(&self, prior: Option<u32>) -> Result<f64, OperatorError> {
        match (self.kind, prior) {
            (OperatorKind::Absolute(value), _) => Ok(value as f64),
            (OperatorKind::Additive(delta), Some(prior)) => Ok(prior as f64 + delta as f64),
            (OperatorKind::Scale(percent), Some(prior)) => {
                Ok(prior as f64 * (100.0 + percent) / 100.0)
            }
            (_, None) => Err(OperatorError::PriorValueRequired(self.to_string())),
        }
    }

    /// Apply to `prior` and settle within the dimension's valid range.
    ///
    /// `Ok(None)` means the result fell outside the range.
    pub fn apply(&self, prior: Option<u32>) -> Result<Option<u32>, OperatorError> {
        let value = self.evaluate(prior)?;
        Ok(self.dimension.range().settle(value))
    }
}

impl fmt::Display for NumericOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let suffix = self.dimension.base_unit().map(Unit::suffix).unwrap_or("");
        match self.kind {
            OperatorKind::Absolute(value) => write!(f, "{value}{suffix}"),
            OperatorKind::Additive(delta) if delta >= 0 => write!(f, "+{delta}{suffix}"),
            OperatorKind::Additive(delta) => write!(f, "{delta}{suffix}"),
            OperatorKind::Scale(percent) => {
                let percent = if percent == 0.0 { 0.0 } else { percent };
                if percent >= 0.0 {
                    write!(f, "+{percent}%")
                } else {
                    write!(f, "{percent}%")
                }
            }
        }
    }
}

/// Parse a signed magnitude with an optional unit into internal units.
pub fn parse_magnitude(text: &str, dimension: Dimension) -> Result<f64, OperatorError> {
    let (sign, body) = split_sign(text)?;
    let (number, suffix) = split_unit(body);
    let magnitude = parse_unsigned(number)?;
    let unit = suffix.map(parse_unit).transpose()?;
    if unit == Some(Unit::Percent) {
        return Err(OperatorError::UnitMismatch {
            unit: "%".to_string(),
            expected: dimension,
        });
    }
    Ok(sign.unwrap_or(1.0) * magnitude * unit_scale(unit, dimension)?)
}

/// Parse a signed unit-less real number.
pub fn parse_scalar(text: &str) -> Result<f64, OperatorError> {
    let (sign, body) = split_sign(text)?;
    Ok(sign.unwrap_or(1.0) * parse_unsigned(body.trim())?)
}

fn split_sign(text: &str) -> Result<(Option<f64>, &str), OperatorError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(OperatorError::Empty);
    }
    Ok(if let Some(rest) = text.strip_prefix('+') {
        (Some(1.0), rest)
    } else if let Some(rest) = text.strip_prefix('-') {
        (Some(-1.0), rest)
    } else {
        (None, text)
    })
}

fn parse_unsigned(number: &str) -> Result<f64, OperatorError> {
    let valid = !number.is_empty()
        && number.chars().all(|c| c.is_ascii_digit() || c == '.')
        && number.chars().filter(|&c| c == '.').count() <= 1
        && number.chars().any(|c| c.is_ascii_digit());
    if !valid {
        return Err(OperatorError::InvalidNumber(number.to_string()));
    }
    number
        .parse::<f64>()
        .map_err(|_| OperatorError::InvalidNumber(number.to_string()))
}

fn parse_unit(suffix: &str) -> Result<Unit, OperatorError> {
    Unit::lookup(suffix).ok_or_else(|| OperatorError::UnknownUnit(suffix.to_string()))
}

fn unit_scale(unit: Option<Unit>, dimension: Dimension) -> Result<f64, OperatorError> {
    match unit {
        None => Ok(1.0),
        Some(unit) if unit.dimension() == Some(dimension) => Ok(unit.scale()),
        Some(unit) => Err(OperatorError::UnitMismatch {
            unit: unit.suffix().to_string(),
            expected: dimension,
        }),
    }
}

/// Bitmask flag operator: `(prior & !clear) | set`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagOperator {
    pub set: u32,
    pub clear: u32,
}

impl FlagOperator {
    /// Parse terms separated by whitespace, `,` or `|`. `-name` clears,
    /// `+name` or `name` sets.
    pub fn parse(text: &str, table: &FlagTable) -> Result<Self, OperatorError> {
        let mut op = FlagOperator::default();
        let terms: Vec<&str> = text
            .split(|c: char| c == ',' || c == '|' || c.is_whitespace())
            .filter(|t| !t.is_empty())
            .collect();
        if terms.is_empty() {
            return Err(OperatorError::Empty);
        }
        for term in terms {
            let (clear, name) = match term.strip_prefix('-') {
                Some(name) => (true, name),
                None => (false, term.strip_prefix('+').unwrap_or(term)),
            };
            let mask = table
                .lookup(name)
                .ok_or_else(|| OperatorError::UnknownFlag(name.to_string()))?;
            if clear {
                op.clear |= mask;
                op.set &= !mask;
            } else {
                op.set |= mask;
                op.clear &= !mask;
            }
        }
        Ok(op)
    }

    pub fn is_empty(&self) -> bool {
        self.set == 0 && self.clear == 0
    }

    pub fn apply(&self, prior: u32) -> u32 {
        (prior & !self.clear) | self.set
    }

    /// Operator equivalent to applying `self` and then `next`.
    pub fn then(&self, next: &FlagOperator) -> FlagOperator {
        FlagOperator {
            set: (self.set & !next.clear) | next.set,
            clear: (self.clear & !next.set) | next.clear,
        }
    }

    pub fn describe(&self, table: &FlagTable) -> String {
        let mut terms: Vec<String> = table
            .names(self.set)
            .into_iter()
            .map(|n| format!("+{n}"))
            .collect();
        terms.extend(table.names(self.clear).into_iter().map(|n| format!("-{n}")));
        terms.join(" ")
    }
}

/// A numeric operator with optional trailing `:flags`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueSpec {
    pub op: NumericOperator,
    #[serde(default)]
    pub flags: FlagOperator,
}

impl ValueSpec {
    pub fn parse(
        text: &str,
        dimension: Dimension,
        table: &FlagTable,
    ) -> Result<Self, OperatorError> {
        let (value, flags) = match text.split_once(':') {
            Some((value, flags)) => (value, Some(flags)),
            None => (text, None),
        };
        Ok(Self {
            op: NumericOperator::parse(value, dimension)?,
            flags: flags
                .map(|f| FlagOperator::parse(f, table))
                .transpose()?
                .unwrap_or_default(),
        })
    }

    pub fn describe(&self, table: &FlagTable) -> String {
        if self.flags.is_empty() {
            self.op.to_string()
        } else {
            format!("{}:{}", self.op, self.flags.describe(table))
        }
    }
}
