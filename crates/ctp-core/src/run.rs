//! Run driver: walk every resolved trial and drive targets through an
//! execution sink.

use std::fmt;

use serde::Serialize;

use ctp_ir::diag::{Exception, ExceptionList, ResultCode};
use ctp_ir::pstate::Configuration;
use ctp_ir::types::ExecutionMode;
use ctp_explore::{ClockMonitorThreshold, Readback, ResultChecker, TrialSpec};

use crate::limits::{LimitChecker, StopReason};
use crate::session::Session;

/// Programs the device and reads it back.
pub trait ExecutionSink {
    /// Program `target` and return the readback. An `Err` is recorded and
    /// counted as a failed step.
    fn execute(
        &mut self,
        target: &Configuration,
        mode: ExecutionMode,
        thresholds: &[ClockMonitorThreshold],
    ) -> Result<Readback, Exception>;
}

/// Per-trial outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrialReport {
    pub name: String,
    pub steps: u64,
    pub passed: u64,
    pub failed: u64,
    /// Steps whose target was invalid and never sent.
    pub skipped: u64,
    /// Steps recorded instead of executed in dry-run mode.
    pub dry_run: u64,
    pub stop: StopReason,
}

impl TrialReport {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            steps: 0,
            passed: 0,
            failed: 0,
            skipped: 0,
            dry_run: 0,
            stop: StopReason::Complete,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub trials: Vec<TrialReport>,
    pub exceptions: ExceptionList,
    pub stop: StopReason,
}

impl RunReport {
    pub fn passed(&self) -> u64 {
        self.trials.iter().map(|t| t.passed).sum()
    }

    pub fn failed(&self) -> u64 {
        self.trials.iter().map(|t| t.failed).sum()
    }

    /// No failed step, nothing fatal, and at least one trial ran.
    pub fn is_success(&self) -> bool {
        !self.trials.is_empty() && self.failed() == 0 && !self.exceptions.is_fatal()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for t in &self.trials {
            writeln!(
                f,
                "{:<20} steps {:>6}  passed {:>6}  failed {:>6}  skipped {:>6}  dry-run {:>6}  {:?}",
                t.name, t.steps, t.passed, t.failed, t.skipped, t.dry_run, t.stop
            )?;
        }
        write!(f, "{}", self.exceptions.summary())
    }
}

/// Run every resolved trial of `session` against `sink`.
pub fn run(session: &Session<'_>, sink: &mut dyn ExecutionSink) -> RunReport {
    let config = session.config();
    let limits = LimitChecker::new(config.limits.clone());
    let checker = ResultChecker::new(&config.domains);
    let mut exceptions = ExceptionList::new();
    let mut reports = Vec::with_capacity(session.trials().len());
    let mut failures: u32 = 0;
    let mut stop = StopReason::Complete;

    for trial in session.trials() {
        let report = run_trial(
            session,
            trial,
            sink,
            &checker,
            &limits,
            &mut failures,
            &mut exceptions,
        );
        tracing::info!(
            trial = %report.name,
            steps = report.steps,
            passed = report.passed,
            failed = report.failed,
            stop = ?report.stop,
            "trial finished"
        );
        let trial_stop = report.stop;
        reports.push(report);
        // A step limit only ends its own trial.
        if !matches!(trial_stop, StopReason::Complete | StopReason::StepLimitExceeded) {
            stop = trial_stop;
            break;
        }
    }

    RunReport {
        trials: reports,
        exceptions,
        stop,
    }
}

fn run_trial(
    session: &Session<'_>,
    trial: &TrialSpec,
    sink: &mut dyn ExecutionSink,
    checker: &ResultChecker<'_>,
    limits: &LimitChecker,
    failures: &mut u32,
    exceptions: &mut ExceptionList,
) -> TrialReport {
    let mut report = TrialReport::new(&trial.name);

    for step in session.iter(trial) {
        if let Some(reason) = limits.check(report.steps, *failures) {
            report.stop = reason;
            break;
        }
        report.steps += 1;
        let fatal = step.exceptions.is_fatal();
        let runnable = step.is_runnable();
        let target = step.target;
        exceptions.append(step.exceptions);
        if fatal {
            report.stop = StopReason::Fatal;
            break;
        }
        let Some(target) = target.filter(|_| runnable) else {
            report.skipped += 1;
            continue;
        };

        if session.is_dry_run() {
            let e = Exception::dry_run(format!(
                "trial '{}' step {} (index {}) not executed",
                trial.name, step.ordinal, step.index
            ));
            e.emit();
            exceptions.push(e);
            report.dry_run += 1;
            continue;
        }

        let thresholds = checker.thresholds(&target, &trial.tolerance);
        let passed = match sink.execute(&target, trial.mode, &thresholds) {
            Ok(readback) => {
                let mut local = ExceptionList::new();
                let passed = checker.check(&target, &readback, &trial.tolerance, &mut local);
                for e in &local {
                    exceptions.push(e.clone().with_context(&trial.name, step.index));
                }
                passed
            }
            Err(e) => {
                let e = e.with_context(&trial.name, step.index);
                e.emit();
                exceptions.push(e);
                false
            }
        };
        if passed {
            report.passed += 1;
        } else {
            report.failed += 1;
            *failures += 1;
        }
    }
    report
}

trait StepContext {
    fn with_context(self, trial: &str, index: u64) -> Self;
}

impl StepContext for Exception {
    fn with_context(mut self, trial: &str, index: u64) -> Self {
        self.message = format!("trial '{trial}' index {index}: {}", self.message);
        if self.code.is_none() {
            self.code = Some(ResultCode::ExecutionFailed);
        }
        self
    }
}
