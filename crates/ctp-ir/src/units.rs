//! Unit suffixes and value ranges.
//!
//! Frequencies are held internally in kHz and voltages in µV; link speed
//! is a plain count.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Physical upper bound for any frequency, in kHz.
pub const FREQ_MAX_KHZ: u32 = 100_000_000;
/// Physical upper bound for any voltage, in µV.
pub const VOLT_MAX_UV: u32 = 2_000_000;

/// What a numeric value measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Frequency,
    Voltage,
    Count,
}

impl Dimension {
    /// Valid range for settled values of this dimension.
    pub fn range(self) -> ValueRange {
        match self {
            Dimension::Frequency => ValueRange::new(1, FREQ_MAX_KHZ),
            Dimension::Voltage => ValueRange::new(0, VOLT_MAX_UV),
            Dimension::Count => ValueRange::new(1, u32::MAX),
        }
    }

    /// Suffix used when printing internal values.
    pub fn base_unit(self) -> Option<Unit> {
        match self {
            Dimension::Frequency => Some(Unit::KHz),
            Dimension::Voltage => Some(Unit::MicroVolt),
            Dimension::Count => None,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Frequency => write!(f, "frequency"),
            Dimension::Voltage => write!(f, "voltage"),
            Dimension::Count => write!(f, "count"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    Hz,
    KHz,
    MHz,
    GHz,
    MicroVolt,
    MilliVolt,
    Volt,
    Percent,
}

/// Suffix table; matched case-insensitively.
const UNITS: &[(&str, Unit)] = &[
    ("hz", Unit::Hz),
    ("khz", Unit::KHz),
    ("mhz", Unit::MHz),
    ("ghz", Unit::GHz),
    ("uv", Unit::MicroVolt),
    ("mv", Unit::MilliVolt),
    ("v", Unit::Volt),
    ("%", Unit::Percent),
];

impl Unit {
    pub fn lookup(suffix: &str) -> Option<Unit> {
        let suffix = suffix.to_ascii_lowercase();
        UNITS
            .iter()
            .find(|(text, _)| *text == suffix)
            .map(|&(_, unit)| unit)
    }

    /// Dimension this unit measures; `None` for percent.
    pub fn dimension(self) -> Option<Dimension> {
        match self {
            Unit::Hz | Unit::KHz | Unit::MHz | Unit::GHz => Some(Dimension::Frequency),
            Unit::MicroVolt | Unit::MilliVolt | Unit::Volt => Some(Dimension::Voltage),
            Unit::Percent => None,
        }
    }

    /// Multiplier from this unit to the internal unit of its dimension.
    pub fn scale(self) -> f64 {
        match self {
            Unit::Hz => 0.001,
            Unit::KHz => 1.0,
            Unit::MHz => 1_000.0,
            Unit::GHz => 1_000_000.0,
            Unit::MicroVolt => 1.0,
            Unit::MilliVolt => 1_000.0,
            Unit::Volt => 1_000_000.0,
            Unit::Percent => 1.0,
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            Unit::Hz => "Hz",
            Unit::KHz => "KHz",
            Unit::MHz => "MHz",
            Unit::GHz => "GHz",
            Unit::MicroVolt => "uV",
            Unit::MilliVolt => "mV",
            Unit::Volt => "V",
            Unit::Percent => "%",
        }
    }
}

/// Split `"1.5GHz"` into `("1.5", Some("GHz"))`.
pub fn split_unit(text: &str) -> (&str, Option<&str>) {
    let text = text.trim();
    match text.find(|c: char| c.is_ascii_alphabetic() || c == '%') {
        Some(pos) => {
            let suffix = text[pos..].trim();
            (text[..pos].trim(), Some(suffix))
        }
        None => (text, None),
    }
}

/// Inclusive range of settled values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: u32,
    pub max: u32,
}

impl ValueRange {
    pub fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    /// Round a real value to an integer unit if it lies within the range.
    ///
    /// The range check is done on the exact value, before rounding.
    pub fn settle(self, value: f64) -> Option<u32> {
        if !value.is_finite() || value < self.min as f64 || value > self.max as f64 {
            return None;
        }
        Some(value.round() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_case_insensitive() {
        assert_eq!(Unit::lookup("MHz"), Some(Unit::MHz));
        assert_eq!(Unit::lookup("mhz"), Some(Unit::MHz));
        assert_eq!(Unit::lookup("MV"), Some(Unit::MilliVolt));
        assert_eq!(Unit::lookup("furlong"), None);
    }

    #[test]
    fn test_split_unit() {
        assert_eq!(split_unit("1.5GHz"), ("1.5", Some("GHz")));
        assert_eq!(split_unit(" 10 % "), ("10", Some("%")));
        assert_eq!(split_unit("1000"), ("1000", None));
    }

    #[test]
    fn test_settle_checks_before_rounding() {
        let range = ValueRange::new(1, 100);
        assert_eq!(range.settle(100.0), Some(100));
        assert_eq!(range.settle(100.2), None);
        assert_eq!(range.settle(0.6), None);
        assert_eq!(range.settle(f64::NAN), None);
    }
}
