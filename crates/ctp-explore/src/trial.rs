//! Trial resolution.
//!
//! A [`TrialSpec`] is a [`TrialDef`] bound to resolved test references, with
//! its iteration range clamped to the combined cardinality.

use ctp_ir::defs::TrialDef;
use ctp_ir::diag::{Exception, ExceptionList, ResultCode, SourceLocation};
use ctp_ir::domain::DomainBitmap;
use ctp_ir::provider::BaselineProvider;
use ctp_ir::pstate::Configuration;
use ctp_ir::types::{ExecutionMode, OrderMode, TargetInfo, ToleranceSettings};

use ctp_model::SourceSet;

use crate::iterator::TrialIterator;
use crate::reference::TestReference;

/// Seed used by random-order trials that do not set one.
pub const DEFAULT_SEED: u64 = 0;

/// Everything trial resolution reads besides the definition.
pub struct TrialContext<'a> {
    pub sources: &'a SourceSet,
    pub baselines: &'a dyn BaselineProvider,
    pub target: &'a TargetInfo,
    pub tolerance: &'a ToleranceSettings,
}

#[derive(Debug, Clone)]
pub struct TrialSpec {
    pub name: String,
    pub location: Option<SourceLocation>,
    pub references: Vec<TestReference>,
    pub tolerance: ToleranceSettings,
    pub order: OrderMode,
    pub seed: u64,
    pub begin: u64,
    pub end: u64,
    /// Clock domains kept from the baseline and written by sources.
    pub mask: DomainBitmap,
    pub mode: ExecutionMode,
    cardinality: u64,
}

impl TrialSpec {
    /// Resolve `def`.
    ///
    /// `Ok(None)` means the trial is skipped on this target; the reason is
    /// in `diags`. A `begin` past the last iteration is fatal.
    pub fn resolve(
        def: &TrialDef,
        ctx: &TrialContext<'_>,
        diags: &mut ExceptionList,
    ) -> Result<Option<Self>, Exception> {
        let located = |e: Exception| match &def.location {
            Some(location) => e.or_at(location),
            None => e,
        };
        let report = |diags: &mut ExceptionList, e: Exception| {
            let e = located(e);
            e.emit();
            diags.push(e);
        };

        if let Some(reason) = gate(def, ctx.target) {
            report(
                diags,
                Exception::unsupported(format!("trial '{}': {reason}", def.name))
                    .with_code(ResultCode::NotSupported),
            );
            return Ok(None);
        }

        let mut references = Vec::with_capacity(def.references.len());
        for text in &def.references {
            let mut local = ExceptionList::new();
            if let Some(reference) =
                TestReference::resolve(text, ctx.sources, ctx.baselines, &mut local)
            {
                references.push(reference);
            }
            for e in &local {
                report(diags, e.clone());
            }
        }
        if references.is_empty() {
            report(
                diags,
                Exception::error(format!("trial '{}' has no usable test references", def.name))
                    .with_code(ResultCode::InvalidArgument),
            );
            return Ok(None);
        }

        let Some(cardinality) = references
            .iter()
            .try_fold(0u64, |acc, r| acc.checked_add(r.cardinality()))
        else {
            report(
                diags,
                Exception::error(format!("trial '{}': variation count overflows", def.name))
                    .with_code(ResultCode::InvalidArgument),
            );
            return Ok(None);
        };
        if cardinality == 0 {
            report(
                diags,
                Exception::error(format!("trial '{}' has no variations", def.name))
                    .with_code(ResultCode::InvalidArgument),
            );
            return Ok(None);
        }

        let last = cardinality - 1;
        let end = def.end.map_or(last, |end| end.min(last));
        let begin = def.begin.unwrap_or(0);
        if begin > end {
            let e = located(
                Exception::fatal(format!(
                    "trial '{}': begin after last iteration ({begin} > {end})",
                    def.name
                ))
                .with_code(ResultCode::IndexOutOfRange),
            );
            e.emit();
            diags.push(e.clone());
            return Err(e);
        }

        tracing::info!(
            trial = %def.name,
            references = references.len(),
            cardinality,
            begin,
            end,
            order = ?def.order,
            "resolved trial"
        );
        Ok(Some(Self {
            name: def.name.clone(),
            location: def.location.clone(),
            references,
            tolerance: def.tolerance.merged(ctx.tolerance),
            order: def.order,
            seed: def.seed.unwrap_or(DEFAULT_SEED),
            begin,
            end,
            mask: !def.prune,
            mode: def.mode,
            cardinality,
        }))
    }

    /// Sum of the references' cardinalities.
    pub fn cardinality(&self) -> u64 {
        self.cardinality
    }

    /// Number of steps a full pass yields.
    pub fn span(&self) -> u64 {
        self.end - self.begin + 1
    }

    /// Reference owning trial index `index` and the index within it.
    pub fn locate(&self, index: u64) -> Option<(usize, u64)> {
        let mut rest = index;
        for (i, reference) in self.references.iter().enumerate() {
            if rest < reference.cardinality() {
                return Some((i, rest));
            }
            rest -= reference.cardinality();
        }
        None
    }

    /// Target configuration for trial index `index`.
    pub fn target(
        &self,
        index: u64,
        sources: &SourceSet,
        diags: &mut ExceptionList,
    ) -> Result<Configuration, Exception> {
        let Some((reference, local)) = self.locate(index) else {
            return Err(Exception::fatal(format!(
                "trial '{}': index {index} beyond {} variations",
                self.name, self.cardinality
            ))
            .with_code(ResultCode::IndexOutOfRange));
        };
        self.references[reference].full_pstate(local, sources, self.mask, diags)
    }

    /// Walk the trial's range in its configured order.
    pub fn steps<'a>(&'a self, sources: &'a SourceSet) -> TrialIterator<'a> {
        TrialIterator::new(self, sources)
    }
}

fn gate(def: &TrialDef, target: &TargetInfo) -> Option<String> {
    if let Some(feature) = def.enable.iter().find(|f| !target.has_feature(f)) {
        return Some(format!("requires feature '{feature}'"));
    }
    if let Some(feature) = def.disable.iter().find(|f| target.has_feature(f)) {
        return Some(format!("requires feature '{feature}' to be absent"));
    }
    match (def.ram_type, target.ram_type) {
        (Some(wanted), Some(actual)) if wanted != actual => {
            Some(format!("requires {wanted} memory, target has {actual}"))
        }
        (Some(wanted), None) => Some(format!("requires {wanted} memory, target type unknown")),
        _ => None,
    }
}
