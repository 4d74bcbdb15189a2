pub mod block;
pub mod compile;
pub mod discovery;
pub mod field;
pub mod scan;
pub mod statement;

pub use compile::{compile_block, Compiled, Directive, Profile};
pub use discovery::{DiscoveryError, DiscoverySettings, FileLocator};
pub use field::ParseContext;
pub use scan::Scanner;
