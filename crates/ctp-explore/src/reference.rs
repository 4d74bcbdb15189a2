//! Test references: a baseline configuration chained with variation
//! sources, written `baseline[:source...]`.

use serde::Serialize;

use ctp_ir::diag::{Exception, ExceptionList, ResultCode};
use ctp_ir::domain::DomainBitmap;
use ctp_ir::provider::BaselineProvider;
use ctp_ir::pstate::{BaselineKey, Configuration};

use ctp_model::{SourceId, SourceSet, Variation};

/// How chained sources share the reference's index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CombinationMode {
    /// Every source sees the same index; cardinality is the largest member.
    Synchronized,
    /// Cartesian product; the first source varies fastest.
    Permuted,
}

#[derive(Debug, Clone)]
pub struct TestReference {
    pub text: String,
    pub baseline_key: BaselineKey,
    baseline: Configuration,
    sources: Vec<SourceId>,
    pub mode: CombinationMode,
    cardinality: u64,
}

impl TestReference {
    /// Resolve `text` against the built sources and the baseline provider.
    ///
    /// Returns `None` when the reference cannot be used; the reason is
    /// pushed to `diags`. A baseline missing on this target is
    /// `Unsupported`, an unknown source name is an `Error`.
    pub fn resolve(
        text: &str,
        sources: &SourceSet,
        baselines: &dyn BaselineProvider,
        diags: &mut ExceptionList,
    ) -> Option<Self> {
        let mut parts = text.split(':').map(str::trim);
        let head = parts.next().unwrap_or_default();
        let baseline_key: BaselineKey = match head.parse() {
            Ok(key) => key,
            Err(e) => {
                diags.push(
                    Exception::error(format!("test '{text}': {e}"))
                        .with_code(ResultCode::InvalidArgument),
                );
                return None;
            }
        };

        let mut ids = Vec::new();
        let mut missing = false;
        for name in parts {
            match sources.lookup(name) {
                Some(id) => ids.push(id),
                None => {
                    diags.push(
                        Exception::error(format!(
                            "test '{text}': unknown variation source '{name}'"
                        ))
                        .with_code(ResultCode::NotFound),
                    );
                    missing = true;
                }
            }
        }
        if missing {
            return None;
        }

        let Some(baseline) = baselines.baseline(baseline_key) else {
            diags.push(
                Exception::unsupported(format!(
                    "test '{text}': baseline '{baseline_key}' is not defined on this target"
                ))
                .with_code(ResultCode::NotSupported),
            );
            return None;
        };

        let mode = if !ids.is_empty() && ids.iter().all(|&id| sources.get(id).is_sine()) {
            CombinationMode::Synchronized
        } else {
            CombinationMode::Permuted
        };
        let mut cards = ids.iter().map(|&id| sources.get(id).cardinality());
        let cardinality = match mode {
            CombinationMode::Synchronized => Some(cards.max().unwrap_or(1)),
            CombinationMode::Permuted => cards.try_fold(1u64, u64::checked_mul),
        };
        let Some(cardinality) = cardinality else {
            diags.push(
                Exception::error(format!("test '{text}': variation count overflows"))
                    .with_code(ResultCode::InvalidArgument),
            );
            return None;
        };

        tracing::debug!(
            reference = text,
            mode = ?mode,
            cardinality,
            "resolved test reference"
        );
        Some(Self {
            text: text.to_string(),
            baseline_key,
            baseline,
            sources: ids,
            mode,
            cardinality,
        })
    }

    pub fn cardinality(&self) -> u64 {
        self.cardinality
    }

    pub fn sources(&self) -> &[SourceId] {
        &self.sources
    }

    /// Build configuration `index`: the baseline with clocks outside `mask`
    /// dropped, then every chained source applied in order.
    ///
    /// Per-source problems are pushed to `diags` and invalidate the result.
    /// An index that does not decompose exactly is fatal.
    pub fn full_pstate(
        &self,
        index: u64,
        sources: &SourceSet,
        mask: DomainBitmap,
        diags: &mut ExceptionList,
    ) -> Result<Configuration, Exception> {
        if index >= self.cardinality {
            return Err(Exception::fatal(format!(
                "index {index} out of range for test '{}' ({} variations)",
                self.text, self.cardinality
            ))
            .with_code(ResultCode::IndexOutOfRange));
        }

        let mut config = self.baseline.clone();
        config.retain_clocks(mask);

        match self.mode {
            CombinationMode::Synchronized => {
                for &id in &self.sources {
                    let source = sources.get(id);
                    if index >= source.cardinality() {
                        tracing::debug!(
                            source = source.name(),
                            index,
                            "synchronized source exhausted"
                        );
                        continue;
                    }
                    source.apply_checked(&mut config, index, mask, diags);
                }
            }
            CombinationMode::Permuted => {
                let mut rest = index;
                for &id in &self.sources {
                    let source = sources.get(id);
                    let card = source.cardinality();
                    if card == 0 {
                        return Err(Exception::fatal(format!(
                            "test '{}': source '{}' has no variations",
                            self.text,
                            source.name()
                        ))
                        .with_code(ResultCode::IndexOutOfRange));
                    }
                    source.apply_checked(&mut config, rest % card, mask, diags);
                    rest /= card;
                }
                if rest != 0 {
                    return Err(Exception::fatal(format!(
                        "test '{}': index {index} leaves remainder {rest}",
                        self.text
                    ))
                    .with_code(ResultCode::IndexOutOfRange));
                }
            }
        }
        Ok(config)
    }
}
