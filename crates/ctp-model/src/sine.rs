//! Sine generators: `alpha + beta * i^omega * sin(gamma * i)` per domain.

use ctp_ir::defs::{DomainOverrides, SineDef};
use ctp_ir::diag::{Exception, ExceptionList, ResultCode};
use ctp_ir::domain::{Domain, DomainBitmap, DomainTable};
use ctp_ir::pstate::Configuration;
use ctp_ir::units::ValueRange;

use crate::source::Variation;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Waveform {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    pub omega: f64,
}

impl Waveform {
    /// Exact value at iteration `i`.
    pub fn at(&self, i: u64) -> f64 {
        let i = i as f64;
        self.alpha + self.beta * i.powf(self.omega) * (self.gamma * i).sin()
    }
}

#[derive(Debug, Clone)]
struct Channel {
    domain: Domain,
    name: String,
    range: ValueRange,
    wave: Waveform,
    overrides: DomainOverrides,
}

#[derive(Debug, Clone)]
pub struct SineGenerator {
    name: String,
    iterations: u64,
    channels: Vec<Channel>,
    domains: DomainBitmap,
}

impl SineGenerator {
    pub fn build(def: &SineDef, table: &DomainTable, diags: &mut ExceptionList) -> Option<Self> {
        let before = diags.len();
        let invalid = |message: String| {
            Exception::error(format!("sine '{}': {message}", def.name))
                .with_code(ResultCode::InvalidArgument)
        };

        let iterations = match def.iterations {
            Some(n) if n > 0 => n as u64,
            Some(_) => {
                diags.push(invalid("iterations must be positive".to_string()));
                0
            }
            None => {
                diags.push(invalid("iterations not set".to_string()));
                0
            }
        };
        if def.domains.is_empty() {
            diags.push(invalid("no domains".to_string()));
        }

        let mut channels = Vec::new();
        for (&domain, params) in &def.domains {
            let name = table.name(domain).to_string();
            let mut required = |label: &str, value: Option<f64>| match value {
                Some(v) if v != 0.0 && v.is_finite() => v,
                Some(_) => {
                    diags.push(invalid(format!("{name}.{label} must be nonzero")));
                    0.0
                }
                None => {
                    diags.push(invalid(format!("{name}.{label} not set")));
                    0.0
                }
            };
            let alpha = required("alpha", params.alpha);
            let beta = required("beta", params.beta);
            let gamma = required("gamma", params.gamma);
            let omega = params.omega.unwrap_or(0.0);
            if !(0.0..=1.0).contains(&omega) {
                diags.push(invalid(format!("{name}.omega must lie in [0, 1]")));
            }
            let dimension = table
                .kind(domain)
                .map(|k| k.dimension().range())
                .unwrap_or(ValueRange::new(0, 0));
            channels.push(Channel {
                domain,
                name,
                range: ValueRange::new(dimension.min, table.max_value(domain).min(dimension.max)),
                wave: Waveform {
                    alpha,
                    beta,
                    gamma,
                    omega,
                },
                overrides: params.overrides,
            });
        }

        if diags.len() > before {
            return None;
        }
        Some(Self {
            name: def.name.clone(),
            iterations,
            domains: channels.iter().map(|c| c.domain).collect(),
            channels,
        })
    }
}

impl Variation for SineGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    fn cardinality(&self) -> u64 {
        self.iterations
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
        if index >= self.iterations {
            diags.push(
                Exception::error(format!(
                    "iteration {index} out of range for sine '{}' ({} iterations)",
                    self.name, self.iterations
                ))
                .with_code(ResultCode::IndexOutOfRange),
            );
            return;
        }
        for channel in self.channels.iter().filter(|c| mask.contains(c.domain)) {
            let value = channel.wave.at(index);
            let Some(freq) = channel.range.settle(value) else {
                diags.push(
                    Exception::skipped(format!(
                        "{}: {} iteration {index} gives {value:.4}, outside [{}, {}]",
                        self.name, channel.name, channel.range.min, channel.range.max
                    ))
                    .with_code(ResultCode::OutOfRange),
                );
                continue;
            };
            config.set_freq(channel.domain, freq);
            if let Some(source) = channel.overrides.source {
                config.set_source(channel.domain, source);
            }
            if !channel.overrides.flags.is_empty() {
                let prior = config.clock(channel.domain).flags;
                config.set_flags(channel.domain, channel.overrides.flags.apply(prior));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_waveform_at_zero_is_alpha() {
        let wave = Waveform {
            alpha: 1000.0,
            beta: 10.0,
            gamma: 0.5,
            omega: 0.0,
        };
        assert_eq!(wave.at(0), 1000.0);
    }

    #[test]
    fn test_zero_parameter_rejected() {
        let table = DomainTable::default();
        let gpc = table.lookup("gpc").unwrap();
        let mut def = SineDef {
            name: "w".to_string(),
            iterations: Some(4),
            ..Default::default()
        };
        let params = def.domains.entry(gpc).or_default();
        params.alpha = Some(1000.0);
        params.beta = Some(0.0);
        params.gamma = Some(1.0);
        let mut diags = ExceptionList::new();
        assert!(SineGenerator::build(&def, &table, &mut diags).is_none());
        assert_eq!(diags.len(), 1);
        assert!(diags.iter().next().unwrap().message.contains("beta"));
    }

    #[test]
    fn test_omega_bounds() {
        let table = DomainTable::default();
        let gpc = table.lookup("gpc").unwrap();
        let mut def = SineDef {
            name: "w".to_string(),
            iterations: Some(4),
            ..Default::default()
        };
        let params = def.domains.entry(gpc).or_default();
        params.alpha = Some(1000.0);
        params.beta = Some(1.0);
        params.gamma = Some(1.0);
        params.omega = Some(1.5);
        let mut diags = ExceptionList::new();
        assert!(SineGenerator::build(&def, &table, &mut diags).is_none());
    }
}
