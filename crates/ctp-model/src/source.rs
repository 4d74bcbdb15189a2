//! Variation sources and the arena that owns them.

use std::collections::HashMap;

use ctp_ir::defs::{Definition, DefinitionKind};
use ctp_ir::diag::{Exception, ExceptionList, ResultCode};
use ctp_ir::domain::{DomainBitmap, DomainTable};
use ctp_ir::flags::FlagTable;
use ctp_ir::provider::CurveProvider;
use ctp_ir::pstate::Configuration;

use ctp_compiler::Profile;

use crate::curve::SampledCurve;
use crate::offset::OffsetTable;
use crate::relation::SlaveRelations;
use crate::sine::SineGenerator;

/// An indexed, lazily evaluated set of modifications to a configuration.
pub trait Variation {
    fn name(&self) -> &str;

    /// Number of distinct variations.
    fn cardinality(&self) -> u64;

    /// Domains this source writes.
    fn domains(&self) -> DomainBitmap;

    /// Write variation `index` into `config` for domains in `mask`. Domains
    /// outside `mask` or not populated by this source are left untouched.
    fn apply(
        &self,
        config: &mut Configuration,
        index: u64,
        mask: DomainBitmap,
        diags: &mut ExceptionList,
    );
}

#[derive(Debug, Clone)]
pub enum VariationSource {
    Offset(OffsetTable),
    Sine(SineGenerator),
    Curve(SampledCurve),
}

impl VariationSource {
    pub fn kind(&self) -> DefinitionKind {
        match self {
            VariationSource::Offset(_) => DefinitionKind::Offset,
            VariationSource::Sine(_) => DefinitionKind::Sine,
            VariationSource::Curve(_) => DefinitionKind::Curve,
        }
    }

    pub fn is_sine(&self) -> bool {
        matches!(self, VariationSource::Sine(_))
    }

    fn inner(&self) -> &dyn Variation {
        match self {
            VariationSource::Offset(s) => s,
            VariationSource::Sine(s) => s,
            VariationSource::Curve(s) => s,
        }
    }

    /// Apply and invalidate `config` if the variation produced any
    /// diagnostic.
    pub fn apply_checked(
        &self,
        config: &mut Configuration,
        index: u64,
        mask: DomainBitmap,
        diags: &mut ExceptionList,
    ) {
        let before = diags.len();
        self.apply(config, index, mask, diags);
        if diags.len() > before {
            config.invalidate();
        }
    }

    pub fn describe(&self, domains: &DomainTable) -> String {
        format!(
            "{} '{}': {} variations over {}",
            self.kind(),
            self.name(),
            self.cardinality(),
            domains.format(self.domains())
        )
    }
}

impl Variation for VariationSource {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn cardinality(&self) -> u64 {
        self.inner().cardinality()
    }

    fn domains(&self) -> DomainBitmap {
        self.inner().domains()
    }

    fn apply(
        &self,
        config: &mut Configuration,
        index: u64,
        mask: DomainBitmap,
        diags: &mut ExceptionList,
    ) {
        self.inner().apply(config, index, mask, diags)
    }
}

/// Handle into a [`SourceSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(usize);

/// What building sources needs besides the definitions.
pub struct BuildContext<'a> {
    pub domains: &'a DomainTable,
    pub flags: &'a FlagTable,
    pub curves: &'a dyn CurveProvider,
    pub relations: &'a SlaveRelations,
}

/// Arena of variation sources addressed by [`SourceId`] or name.
#[derive(Debug, Clone, Default)]
pub struct SourceSet {
    sources: Vec<VariationSource>,
    by_name: HashMap<String, SourceId>,
}

impl SourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: VariationSource) -> Result<SourceId, Exception> {
        if self.by_name.contains_key(source.name()) {
            return Err(Exception::error(format!(
                "duplicate variation source '{}'",
                source.name()
            ))
            .with_code(ResultCode::InvalidArgument));
        }
        let id = SourceId(self.sources.len());
        self.by_name.insert(source.name().to_string(), id);
        self.sources.push(source);
        Ok(id)
    }

    pub fn lookup(&self, name: &str) -> Option<SourceId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: SourceId) -> &VariationSource {
        &self.sources[id.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = (SourceId, &VariationSource)> {
        self.sources
            .iter()
            .enumerate()
            .map(|(i, s)| (SourceId(i), s))
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Build every source definition of `profile`. Definitions that fail
    /// validation are reported and left out.
    pub fn build(profile: &Profile, ctx: &BuildContext<'_>, diags: &mut ExceptionList) -> Self {
        let mut set = SourceSet::new();
        for def in profile.sources() {
            let mut local = ExceptionList::new();
            let built = match def {
                Definition::Offset(def) => {
                    OffsetTable::build(def, ctx.domains, &mut local).map(VariationSource::Offset)
                }
                Definition::Sine(def) => {
                    SineGenerator::build(def, ctx.domains, &mut local).map(VariationSource::Sine)
                }
                Definition::Curve(def) => {
                    SampledCurve::build(def, ctx.domains, ctx.curves, ctx.relations, &mut local)
                        .map(VariationSource::Curve)
                }
                Definition::Trial(_) => None,
            };
            for e in &local {
                let e = match def.location() {
                    Some(location) => e.clone().or_at(location),
                    None => e.clone(),
                };
                e.emit();
                diags.push(e);
            }
            if let Some(source) = built {
                tracing::debug!(
                    name = source.name(),
                    cardinality = source.cardinality(),
                    "built variation source"
                );
                if let Err(e) = set.insert(source) {
                    e.emit();
                    diags.push(e);
                }
            }
        }
        set
    }
}
