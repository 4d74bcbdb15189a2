//! Sampled frequency/voltage curves.
//!
//! Each index selects one sampled point per curve domain. The rail of each
//! domain is programmed with the point's voltage and slave domains follow
//! through [`SlaveRelations`].

use ctp_ir::defs::{CurveDef, DomainOverrides};
use ctp_ir::diag::{Exception, ExceptionList, ResultCode};
use ctp_ir::domain::{Domain, DomainBitmap, DomainTable};
use ctp_ir::provider::{CurvePoint, CurveProvider};
use ctp_ir::pstate::Configuration;

use crate::relation::SlaveRelations;
use crate::source::Variation;

#[derive(Debug, Clone)]
struct Channel {
    domain: Domain,
    rail: Option<Domain>,
    points: Vec<CurvePoint>,
    overrides: DomainOverrides,
}

#[derive(Debug, Clone)]
pub struct SampledCurve {
    name: String,
    channels: Vec<Channel>,
    domains: DomainBitmap,
    relations: SlaveRelations,
    cardinality: u64,
}

impl SampledCurve {
    pub fn build(
        def: &CurveDef,
        table: &DomainTable,
        provider: &dyn CurveProvider,
        relations: &SlaveRelations,
        diags: &mut ExceptionList,
    ) -> Option<Self> {
        if def.curves.is_empty() {
            diags.push(
                Exception::error(format!("curve '{}' names no domains", def.name))
                    .with_code(ResultCode::InvalidArgument),
            );
            return None;
        }

        let mut channels = Vec::with_capacity(def.curves.len());
        let mut failed = false;
        for (&domain, &key) in &def.curves {
            let data = match provider.sample_curve(domain, key) {
                Ok(data) => data,
                Err(e) => {
                    diags.push(
                        Exception::error(format!("curve '{}': {e}", def.name))
                            .with_code(ResultCode::NotFound),
                    );
                    failed = true;
                    continue;
                }
            };
            let points: Vec<CurvePoint> = data
                .points
                .into_iter()
                .filter(|p| p.volt_uv <= data.max_volt_uv)
                .collect();
            tracing::debug!(
                curve = %def.name,
                domain = table.name(domain),
                baseline = %key,
                points = points.len(),
                "sampled curve loaded"
            );
            channels.push(Channel {
                domain,
                rail: table.rail_of(domain),
                points,
                overrides: def.overrides.get(&domain).copied().unwrap_or_default(),
            });
        }
        if failed {
            return None;
        }

        let len = channels[0].points.len();
        if len == 0 {
            diags.push(
                Exception::error(format!(
                    "curve '{}': no sampled points within the voltage limit",
                    def.name
                ))
                .with_code(ResultCode::InvalidArgument),
            );
            return None;
        }
        if let Some(other) = channels.iter().find(|c| c.points.len() != len) {
            diags.push(
                Exception::error(format!(
                    "curve '{}': {} has {} points but {} has {len}",
                    def.name,
                    table.name(other.domain),
                    other.points.len(),
                    table.name(channels[0].domain),
                ))
                .with_code(ResultCode::InvalidArgument),
            );
            return None;
        }

        let domains: DomainBitmap = channels.iter().map(|c| c.domain).collect();
        Some(Self {
            name: def.name.clone(),
            channels,
            domains,
            relations: relations.clone(),
            cardinality: len as u64,
        })
    }

    /// Domains written indirectly through slave relations.
    pub fn slave_domains(&self) -> DomainBitmap {
        self.relations.slaves_of(self.domains) & !self.domains
    }
}

impl Variation for SampledCurve {
    fn name(&self) -> &str {
        &self.name
    }

    fn cardinality(&self) -> u64 {
        self.cardinality
    }

    fn domains(&self) -> DomainBitmap {
        self.domains | self.slave_domains()
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
                    "index {index} out of range for curve '{}' ({} points)",
                    self.name, self.cardinality
                ))
                .with_code(ResultCode::IndexOutOfRange),
            );
            return;
        }
        let index = index as usize;
        for channel in self.channels.iter().filter(|c| mask.contains(c.domain)) {
            let point = channel.points[index];
            config.set_freq(channel.domain, point.freq_khz);
            if let Some(source) = channel.overrides.source {
                config.set_source(channel.domain, source);
            }
            if !channel.overrides.flags.is_empty() {
                let prior = config.clock(channel.domain).flags;
                config.set_flags(channel.domain, channel.overrides.flags.apply(prior));
            }
            if let Some(rail) = channel.rail {
                config.set_volt(rail, point.volt_uv);
            }
            for (slave, freq) in self.relations.derive(channel.domain, point.freq_khz) {
                if self.domains.contains(slave) || !mask.contains(slave) {
                    continue;
                }
                config.set_freq(slave, freq);
            }
        }
    }
}
