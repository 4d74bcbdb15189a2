//! Readback checking.
//!
//! The device reports what it was programmed to (`actual`) and what it
//! measured (`measured`). Programmed frequency and source must match the
//! target exactly; measured values must lie within tolerance.

use serde::Serialize;

use ctp_ir::diag::{Exception, ExceptionList, ResultCode};
use ctp_ir::domain::{Domain, DomainTable};
use ctp_ir::pstate::Configuration;
use ctp_ir::types::ToleranceSettings;

/// What the execution sink returns for one target.
#[derive(Debug, Clone, PartialEq)]
pub struct Readback {
    pub actual: Configuration,
    pub measured: Configuration,
}

/// Clock-monitor window for one domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClockMonitorThreshold {
    pub domain: Domain,
    pub low: u32,
    pub high: u32,
}

pub struct ResultChecker<'a> {
    domains: &'a DomainTable,
}

impl<'a> ResultChecker<'a> {
    pub fn new(domains: &'a DomainTable) -> Self {
        Self { domains }
    }

    /// Monitor windows for every programmed clock of `target`.
    pub fn thresholds(
        &self,
        target: &Configuration,
        tolerance: &ToleranceSettings,
    ) -> Vec<ClockMonitorThreshold> {
        target
            .populated_clocks()
            .iter()
            .filter_map(|domain| {
                let freq = target.freq(domain)? as f64;
                let spread = freq * tolerance.percent_for(domain) / 100.0;
                Some(ClockMonitorThreshold {
                    domain,
                    low: (freq - spread).max(0.0).floor() as u32,
                    high: (freq + spread).min(u32::MAX as f64).ceil() as u32,
                })
            })
            .collect()
    }

    /// Compare a readback against `target`. Every violation is pushed as a
    /// Failure; returns whether the step passed.
    pub fn check(
        &self,
        target: &Configuration,
        readback: &Readback,
        tolerance: &ToleranceSettings,
        diags: &mut ExceptionList,
    ) -> bool {
        let before = diags.len();
        let mut fail = |code: ResultCode, message: String| {
            let e = Exception::failure(message).with_code(code);
            e.emit();
            diags.push(e);
        };

        for domain in target.populated_clocks().iter() {
            let name = self.domains.name(domain);
            let wanted = target.clock(domain);
            let actual = readback.actual.clock(domain);
            if actual.freq != wanted.freq {
                fail(
                    ResultCode::ReadbackMismatch,
                    format!(
                        "{name}: programmed {} but device reports {}",
                        show(wanted.freq),
                        show(actual.freq)
                    ),
                );
            }
            if wanted.source.is_some() && actual.source != wanted.source {
                fail(
                    ResultCode::ReadbackMismatch,
                    format!(
                        "{name}: source {} but device reports {}",
                        show(wanted.source),
                        show(actual.source)
                    ),
                );
            }

            let Some(freq) = wanted.freq else { continue };
            match readback.measured.freq(domain) {
                None => fail(
                    ResultCode::ReadbackMismatch,
                    format!("{name}: no frequency measurement"),
                ),
                Some(measured) => {
                    let percent = tolerance.percent_for(domain);
                    let allowed = freq as f64 * percent / 100.0;
                    let delta = (measured as f64 - freq as f64).abs();
                    if delta > allowed {
                        fail(
                            ResultCode::ToleranceExceeded,
                            format!(
                                "{name}: measured {measured} kHz, target {freq} kHz (tolerance {percent}%)"
                            ),
                        );
                    }
                }
            }
        }

        for rail in target.populated_volts().iter() {
            let name = self.domains.name(rail);
            let Some(volt) = target.volt(rail) else { continue };
            match readback.measured.volt(rail) {
                None => fail(
                    ResultCode::ReadbackMismatch,
                    format!("{name}: no voltage measurement"),
                ),
                Some(measured) if measured.abs_diff(volt) > tolerance.volt_uv => fail(
                    ResultCode::ToleranceExceeded,
                    format!(
                        "{name}: measured {measured} uV, target {volt} uV (tolerance {} uV)",
                        tolerance.volt_uv
                    ),
                ),
                Some(_) => {}
            }
        }

        diags.len() == before
    }
}

fn show<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "nothing".to_string(), |v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctp_ir::pstate::BaselineKey;
    use ctp_ir::Severity;

    fn setup() -> (DomainTable, Domain, Domain, Configuration) {
        let table = DomainTable::default();
        let gpc = table.lookup("gpc").unwrap();
        let logic = table.lookup("logic").unwrap();
        let mut target = Configuration::for_baseline(BaselineKey::Init);
        target.set_freq(gpc, 1_000_000);
        target.set_source(gpc, 2);
        target.set_volt(logic, 800_000);
        (table, gpc, logic, target)
    }

    #[test]
    fn test_exact_readback_passes() {
        let (table, _, _, target) = setup();
        let readback = Readback {
            actual: target.clone(),
            measured: target.clone(),
        };
        let mut diags = ExceptionList::new();
        let checker = ResultChecker::new(&table);
        assert!(checker.check(&target, &readback, &ToleranceSettings::default(), &mut diags));
        assert!(diags.is_empty());
    }

    #[test]
    fn test_measured_outside_tolerance() {
        let (table, gpc, logic, target) = setup();
        let mut measured = target.clone();
        measured.set_freq(gpc, 1_030_000);
        measured.set_volt(logic, 805_000);
        let readback = Readback {
            actual: target.clone(),
            measured,
        };
        let mut diags = ExceptionList::new();
        let checker = ResultChecker::new(&table);
        assert!(!checker.check(&target, &readback, &ToleranceSettings::default(), &mut diags));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags.severity(), Some(Severity::Failure));
        assert_eq!(diags.result_code(), Some(ResultCode::ToleranceExceeded));
    }

    #[test]
    fn test_actual_mismatch_and_missing_voltage() {
        let (table, gpc, _, target) = setup();
        let mut actual = target.clone();
        actual.set_source(gpc, 1);
        let mut measured = Configuration::for_baseline(BaselineKey::Init);
        measured.set_freq(gpc, 1_000_000);
        let readback = Readback { actual, measured };
        let mut diags = ExceptionList::new();
        let checker = ResultChecker::new(&table);
        assert!(!checker.check(&target, &readback, &ToleranceSettings::default(), &mut diags));
        assert_eq!(diags.len(), 2);
        assert_eq!(diags.result_code(), Some(ResultCode::ReadbackMismatch));
    }

    #[test]
    fn test_thresholds_use_per_domain_tolerance() {
        let (table, gpc, _, target) = setup();
        let mut tolerance = ToleranceSettings::default();
        tolerance.per_domain.insert(gpc, 5.0);
        let checker = ResultChecker::new(&table);
        let windows = checker.thresholds(&target, &tolerance);
        assert_eq!(
            windows,
            vec![ClockMonitorThreshold {
                domain: gpc,
                low: 950_000,
                high: 1_050_000,
            }]
        );
    }
}
