pub mod config;
pub mod limits;
pub mod run;
pub mod session;

pub use config::{ConfigError, EngineConfig};
pub use limits::{LimitChecker, RunLimits, StopReason};
pub use run::{run, ExecutionSink, RunReport, TrialReport};
pub use session::{Session, SessionError, SessionSummary};
