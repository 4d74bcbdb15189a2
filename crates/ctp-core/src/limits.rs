//! Run limits.
//!
//! Caps on steps, failures and wall time for a run. When a limit is hit
//! the run stops and reports what it completed so far.

use serde::{Deserialize, Serialize};

/// Limits applied while running trials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunLimits {
    /// Maximum steps taken from a single trial.
    pub max_steps_per_trial: u64,
    /// Maximum failed steps across the run before stopping.
    pub max_failures: u32,
    /// Maximum wall-clock seconds for the whole run.
    pub max_wall_secs: u64,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            max_steps_per_trial: 1_000_000,
            max_failures: 1000,
            max_wall_secs: 3600,
        }
    }
}

/// Reason a trial or run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Every step was taken.
    Complete,
    /// Per-trial step limit reached.
    StepLimitExceeded,
    /// Failure limit reached (device too broken to continue).
    FailureLimitExceeded,
    /// Wall-clock time limit exceeded.
    WallTimeExceeded,
    /// A fatal diagnostic ended the run.
    Fatal,
}

/// Check progress against limits.
pub struct LimitChecker {
    limits: RunLimits,
    start_time: std::time::Instant,
}

impl LimitChecker {
    pub fn new(limits: RunLimits) -> Self {
        Self {
            limits,
            start_time: std::time::Instant::now(),
        }
    }

    /// `None` if all ok, or the reason for stopping.
    pub fn check(&self, trial_steps: u64, failures: u32) -> Option<StopReason> {
        if self.wall_time_exceeded() {
            return Some(StopReason::WallTimeExceeded);
        }
        if trial_steps >= self.limits.max_steps_per_trial {
            return Some(StopReason::StepLimitExceeded);
        }
        if failures >= self.limits.max_failures {
            return Some(StopReason::FailureLimitExceeded);
        }
        None
    }

    pub fn wall_time_exceeded(&self) -> bool {
        self.start_time.elapsed().as_secs() >= self.limits.max_wall_secs
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    pub fn limits(&self) -> &RunLimits {
        &self.limits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = RunLimits::default();
        assert_eq!(limits.max_steps_per_trial, 1_000_000);
        assert_eq!(limits.max_failures, 1000);
    }

    #[test]
    fn test_all_ok() {
        let checker = LimitChecker::new(RunLimits::default());
        assert!(checker.check(100, 5).is_none());
    }

    #[test]
    fn test_step_limit() {
        let checker = LimitChecker::new(RunLimits {
            max_steps_per_trial: 100,
            ..Default::default()
        });
        assert_eq!(checker.check(100, 0), Some(StopReason::StepLimitExceeded));
    }

    #[test]
    fn test_failure_limit() {
        let checker = LimitChecker::new(RunLimits {
            max_failures: 5,
            ..Default::default()
        });
        assert_eq!(checker.check(50, 5), Some(StopReason::FailureLimitExceeded));
    }

    #[test]
    fn test_zero_wall_time_stops_immediately() {
        let checker = LimitChecker::new(RunLimits {
            max_wall_secs: 0,
            ..Default::default()
        });
        assert_eq!(checker.check(0, 0), Some(StopReason::WallTimeExceeded));
        assert!(checker.elapsed_secs() < 1.0);
    }
}
