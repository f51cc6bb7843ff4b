//! ccert core - foundational types for container certification.
//!
//! Errors, run configuration, policies and the check/result data model
//! shared by the runtime and the CLI.

pub mod check;
pub mod config;
pub mod error;
pub mod policy;

// Re-export commonly used types
pub use check::{CheckInfo, CheckMetadata, CheckOutcome, HelpText, Level, OutcomeKind, RunResult};
pub use config::{CertConfig, LogLevel};
pub use error::{CertError, Result};
pub use policy::Policy;

/// ccert version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
