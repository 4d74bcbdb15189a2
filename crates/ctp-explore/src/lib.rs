pub mod checker;
pub mod iterator;
pub mod reference;
pub mod rng;
pub mod trial;

pub use checker::{ClockMonitorThreshold, Readback, ResultChecker};
pub use iterator::{TrialIterator, TrialStep};
pub use reference::{CombinationMode, TestReference};
pub use trial::{TrialContext, TrialSpec};
