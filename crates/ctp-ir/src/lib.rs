pub mod defs;
pub mod diag;
pub mod domain;
pub mod flags;
pub mod operator;
pub mod provider;
pub mod pstate;
pub mod types;
pub mod units;

pub use defs::{Definition, DefinitionKind};
pub use diag::{Exception, ExceptionList, ResultCode, Severity, SourceLocation};
pub use domain::{Domain, DomainBitmap, DomainKind, DomainTable};
pub use pstate::{BaselineKey, Configuration};
