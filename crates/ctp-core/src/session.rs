//! A profile session: scan, resolve, iterate and report.

use std::fmt;
use std::path::Path;

use serde::Serialize;

use ctp_compiler::field::ParseContext;
use ctp_compiler::{FileLocator, Profile, Scanner};
use ctp_ir::diag::{Exception, ExceptionList, Summary};
use ctp_ir::provider::{BaselineProvider, CurveProvider};
use ctp_model::{BuildContext, SlaveRelations, SourceSet};
use ctp_explore::{TrialContext, TrialIterator, TrialSpec};

use crate::config::{ConfigError, EngineConfig};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("No search root configured for group '{0}'")]
    NoSearchRoot(String),

    #[error("Fatal: {0}")]
    Fatal(Exception),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub struct Session<'a> {
    config: &'a EngineConfig,
    relations: SlaveRelations,
    locator: Option<FileLocator>,
    profile: Profile,
    sources: SourceSet,
    trials: Vec<TrialSpec>,
    diags: ExceptionList,
}

impl<'a> Session<'a> {
    pub fn new(config: &'a EngineConfig) -> Result<Self, SessionError> {
        Ok(Self {
            relations: config.slave_relations()?,
            config,
            locator: None,
            profile: Profile::new(),
            sources: SourceSet::new(),
            trials: Vec::new(),
            diags: ExceptionList::new(),
        })
    }

    /// Resolve groups and includes relative to `root`.
    pub fn with_root(mut self, root: &Path) -> Self {
        self.locator = Some(FileLocator::new(
            self.config.discovery.clone(),
            root,
            self.config.target.clone(),
        ));
        self
    }

    fn parse_context(&self) -> ParseContext<'a> {
        let config = self.config;
        ParseContext {
            domains: &config.domains,
            flags: &config.flags,
            sources: &config.sources,
        }
    }

    /// Scan the named groups in order. Every group is required.
    pub fn scan_groups(&mut self, groups: &[&str]) -> Result<(), SessionError> {
        let Some(locator) = self.locator.clone() else {
            let group = groups.first().copied().unwrap_or_default();
            return Err(SessionError::NoSearchRoot(group.to_string()));
        };
        let mut scanner = Scanner::new(self.parse_context()).with_locator(&locator);
        let mut diags = ExceptionList::new();
        let mut result = Ok(());
        for group in groups {
            if let Err(e) = scanner.scan_group(group, true, &mut diags) {
                result = Err(SessionError::Fatal(e));
                break;
            }
        }
        let scanned = scanner.into_profile();
        self.absorb(scanned, diags);
        result
    }

    /// Scan profile text directly.
    pub fn scan_str(&mut self, file: &str, text: &str) -> Result<(), SessionError> {
        let locator = self.locator.clone();
        let mut scanner = Scanner::new(self.parse_context());
        if let Some(locator) = &locator {
            scanner = scanner.with_locator(locator);
        }
        let mut diags = ExceptionList::new();
        let result = scanner
            .scan_source(file, text, &mut diags)
            .map_err(SessionError::Fatal);
        let scanned = scanner.into_profile();
        self.absorb(scanned, diags);
        result
    }

    fn absorb(&mut self, scanned: Profile, diags: ExceptionList) {
        self.diags.append(diags);
        self.profile.dry_run |= scanned.dry_run;
        for def in scanned.definitions() {
            if let Err(e) = self.profile.insert(def.clone()) {
                e.emit();
                self.diags.push(e);
            }
        }
    }

    /// Build variation sources and resolve every trial. Returns the number
    /// of trials that can run.
    pub fn resolve(
        &mut self,
        baselines: &dyn BaselineProvider,
        curves: &dyn CurveProvider,
    ) -> Result<usize, SessionError> {
        let build = BuildContext {
            domains: &self.config.domains,
            flags: &self.config.flags,
            curves,
            relations: &self.relations,
        };
        self.sources = SourceSet::build(&self.profile, &build, &mut self.diags);
        self.trials.clear();

        let ctx = TrialContext {
            sources: &self.sources,
            baselines,
            target: &self.config.target,
            tolerance: &self.config.tolerance,
        };
        for def in self.profile.trials() {
            match TrialSpec::resolve(def, &ctx, &mut self.diags) {
                Ok(Some(trial)) => self.trials.push(trial),
                Ok(None) => {}
                Err(e) => return Err(SessionError::Fatal(e)),
            }
        }
        tracing::info!(
            sources = self.sources.len(),
            trials = self.trials.len(),
            defined = self.profile.trials().count(),
            "session resolved"
        );
        Ok(self.trials.len())
    }

    pub fn config(&self) -> &EngineConfig {
        self.config
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn sources(&self) -> &SourceSet {
        &self.sources
    }

    pub fn trials(&self) -> &[TrialSpec] {
        &self.trials
    }

    pub fn trial(&self, name: &str) -> Option<&TrialSpec> {
        self.trials.iter().find(|t| t.name == name)
    }

    pub fn diagnostics(&self) -> &ExceptionList {
        &self.diags
    }

    pub fn is_dry_run(&self) -> bool {
        self.profile.dry_run
    }

    /// Steps of `trial` in its configured order.
    pub fn iter<'s>(&'s self, trial: &'s TrialSpec) -> TrialIterator<'s> {
        trial.steps(&self.sources)
    }

    /// Human-readable listing of every definition and resolved trial.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for def in self.profile.definitions() {
            out.push_str(&def.describe(&self.config.domains, &self.config.flags));
        }
        if !self.sources.is_empty() {
            out.push_str("sources:\n");
            for (_, source) in self.sources.iter() {
                out.push_str(&format!("  {}\n", source.describe(&self.config.domains)));
            }
        }
        for trial in &self.trials {
            out.push_str(&format!(
                "trial '{}': {} variations, range [{}, {}], {:?} order, seed {}\n",
                trial.name,
                trial.cardinality(),
                trial.begin,
                trial.end,
                trial.order,
                trial.seed
            ));
            for reference in &trial.references {
                out.push_str(&format!(
                    "  {} ({:?}, {} variations)\n",
                    reference.text,
                    reference.mode,
                    reference.cardinality()
                ));
            }
        }
        out
    }

    /// JSON dump of definitions, resolved trials and the summary.
    pub fn dump_json(&self) -> Result<String, SessionError> {
        let trials: Vec<TrialDump<'_>> = self
            .trials
            .iter()
            .map(|trial| TrialDump {
                name: &trial.name,
                cardinality: trial.cardinality(),
                begin: trial.begin,
                end: trial.end,
                references: trial
                    .references
                    .iter()
                    .map(|r| ReferenceDump {
                        text: &r.text,
                        mode: r.mode,
                        cardinality: r.cardinality(),
                    })
                    .collect(),
            })
            .collect();
        let dump = SessionDump {
            profile: &self.profile,
            trials,
            summary: self.summary(),
        };
        Ok(serde_json::to_string_pretty(&dump)?)
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            diagnostics: self.diags.summary(),
            trials_defined: self.profile.trials().count(),
            trials_resolved: self.trials.len(),
            success: self.is_success(),
        }
    }

    /// A session fails when no trial resolved or anything was fatal.
    pub fn is_success(&self) -> bool {
        !self.trials.is_empty() && !self.diags.is_fatal()
    }
}

#[derive(Serialize)]
struct ReferenceDump<'a> {
    text: &'a str,
    mode: ctp_explore::CombinationMode,
    cardinality: u64,
}

#[derive(Serialize)]
struct TrialDump<'a> {
    name: &'a str,
    cardinality: u64,
    begin: u64,
    end: u64,
    references: Vec<ReferenceDump<'a>>,
}

#[derive(Serialize)]
struct SessionDump<'a> {
    profile: &'a Profile,
    trials: Vec<TrialDump<'a>>,
    summary: SessionSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub diagnostics: Summary,
    pub trials_defined: usize,
    pub trials_resolved: usize,
    pub success: bool,
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} trials resolved; {}; {}",
            self.trials_resolved,
            self.trials_defined,
            self.diagnostics,
            if self.success { "PASS" } else { "FAIL" }
        )
    }
}
