//! Trial iteration.
//!
//! Sequential order walks `[begin, end]` one index at a time. Random order
//! takes the same number of steps, each drawing a fresh uniform index in
//! `[0, cardinality)`. Draws are not de-duplicated.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use ctp_ir::diag::ExceptionList;
use ctp_ir::pstate::Configuration;
use ctp_ir::types::OrderMode;

use ctp_model::SourceSet;

use crate::rng::trial_rng;
use crate::trial::TrialSpec;

/// One produced configuration.
#[derive(Debug, Clone)]
pub struct TrialStep {
    /// Position in the walk, starting at 0.
    pub ordinal: u64,
    /// Trial index the configuration was built from.
    pub index: u64,
    /// `None` when building the configuration failed fatally.
    pub target: Option<Configuration>,
    pub exceptions: ExceptionList,
}

impl TrialStep {
    /// A step can be sent to the device when it produced a valid target.
    pub fn is_runnable(&self) -> bool {
        self.target.as_ref().is_some_and(Configuration::is_valid)
    }
}

pub struct TrialIterator<'a> {
    trial: &'a TrialSpec,
    sources: &'a SourceSet,
    rng: Option<ChaCha8Rng>,
    next: u64,
    ordinal: u64,
    done: bool,
}

impl<'a> TrialIterator<'a> {
    pub fn new(trial: &'a TrialSpec, sources: &'a SourceSet) -> Self {
        let rng = match trial.order {
            OrderMode::Random => Some(trial_rng(trial.seed, trial.begin)),
            OrderMode::Sequential => None,
        };
        Self {
            trial,
            sources,
            rng,
            next: trial.begin,
            ordinal: 0,
            done: false,
        }
    }

    fn next_index(&mut self) -> u64 {
        match &mut self.rng {
            Some(rng) => rng.gen_range(0..self.trial.cardinality()),
            None => {
                let index = self.next;
                self.next += 1;
                index
            }
        }
    }
}

impl Iterator for TrialIterator<'_> {
    type Item = TrialStep;

    fn next(&mut self) -> Option<TrialStep> {
        if self.done || self.ordinal >= self.trial.span() {
            return None;
        }
        let index = self.next_index();
        let ordinal = self.ordinal;
        self.ordinal += 1;

        let mut exceptions = ExceptionList::new();
        let target = match self.trial.target(index, self.sources, &mut exceptions) {
            Ok(config) => Some(config),
            Err(e) => {
                e.emit();
                exceptions.push(e);
                self.done = true;
                None
            }
        };
        tracing::debug!(
            trial = %self.trial.name,
            ordinal,
            index,
            diagnostics = exceptions.len(),
            "trial step"
        );
        Some(TrialStep {
            ordinal,
            index,
            target,
            exceptions,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            return (0, Some(0));
        }
        let left = usize::try_from(self.trial.span() - self.ordinal).unwrap_or(usize::MAX);
        (0, Some(left))
    }
}
